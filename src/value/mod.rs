pub mod serializer;

use crate::error::Error;
use indexmap::IndexMap;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

/// Insertion-ordered mapping used for objects.
pub type Map = IndexMap<String, Value>;

/// JSON-shaped data a template is rendered against.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    Str(String),
    /// Ordered list of values (arrays, tuples)
    List(Vec<Value>),
    /// Key-value map (structs, JSON objects); keeps insertion order for iteration
    Map(Map),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Template truthiness: null, `false`, zero, `""` and empty collections are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::I64(n) => *n != 0,
            Value::U64(n) => *n != 0,
            Value::F64(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Map(m) => !m.is_empty(),
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Value::I64(n) => *n == 0,
            Value::U64(n) => *n == 0,
            Value::F64(n) => *n == 0.0,
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::I64(n) => u64::try_from(*n).ok(),
            Value::U64(n) => Some(*n),
            Value::F64(n) if n.fract() == 0.0 && *n >= 0.0 => Some(*n as u64),
            _ => None,
        }
    }

    /// Looks up one path segment: a key in a map, or a non-negative index in a list.
    pub fn get(&self, segment: &str) -> Option<&Value> {
        match self {
            Value::Map(m) => m.get(segment),
            Value::List(l) => segment.parse::<usize>().ok().and_then(|i| l.get(i)),
            _ => None,
        }
    }

    /// Converts the value to the text a template writes for it.
    pub fn render(&self) -> Cow<'_, str> {
        match self {
            Value::Null => Cow::Borrowed(""),
            Value::Bool(true) => Cow::Borrowed("true"),
            Value::Bool(false) => Cow::Borrowed("false"),
            Value::I64(n) => Cow::Owned(n.to_string()),
            Value::U64(n) => Cow::Owned(n.to_string()),
            Value::F64(n) => Cow::Owned(render_f64(*n)),
            Value::Str(s) => Cow::Borrowed(s),
            Value::List(l) => Cow::Owned(
                l.iter()
                    .map(|v| v.render().into_owned())
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            Value::Map(_) => Cow::Borrowed("[object]"),
        }
    }
}

/// Writes a float the way JavaScript prints numbers: exponent form outside
/// `[1e-6, 1e21)`, `NaN`, `Infinity` and no negative zero.
fn render_f64(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let magnitude = n.abs();
    if magnitude >= 1e21 || magnitude < 1e-6 {
        let s = format!("{n:e}");
        return match s.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
            _ => s,
        };
    }
    n.to_string()
}

/// Converts any `Serialize` type into a [`Value`].
pub fn to_value<T: Serialize + ?Sized>(data: &T) -> Result<Value, Error> {
    data.serialize(serializer::ValueSerializer)
}

/// Anything that can serve as render data.
pub trait ToValue {
    fn to_value(&self) -> Value;
}

// --- primitives ---
macro_rules! impl_to_value_primitive {
    ($rust_type:ty, $variant:ident, $as:ty) => {
        impl ToValue for $rust_type {
            fn to_value(&self) -> Value {
                Value::$variant(*self as $as)
            }
        }

        impl From<$rust_type> for Value {
            fn from(v: $rust_type) -> Self {
                Value::$variant(v as $as)
            }
        }
    };
}

impl_to_value_primitive!(i8, I64, i64);
impl_to_value_primitive!(i16, I64, i64);
impl_to_value_primitive!(i32, I64, i64);
impl_to_value_primitive!(i64, I64, i64);
impl_to_value_primitive!(isize, I64, i64);
impl_to_value_primitive!(u8, I64, i64);
impl_to_value_primitive!(u16, I64, i64);
impl_to_value_primitive!(u32, I64, i64);
impl_to_value_primitive!(f32, F64, f64);
impl_to_value_primitive!(f64, F64, f64);

// Unsigned values only use `U64` when they do not fit in `I64`, matching serde_json.
macro_rules! impl_to_value_unsigned {
    ($rust_type:ty) => {
        impl ToValue for $rust_type {
            fn to_value(&self) -> Value {
                Value::from(*self)
            }
        }

        impl From<$rust_type> for Value {
            fn from(v: $rust_type) -> Self {
                match i64::try_from(v) {
                    Ok(n) => Value::I64(n),
                    Err(_) => Value::U64(v as u64),
                }
            }
        }
    };
}

impl_to_value_unsigned!(u64);
impl_to_value_unsigned!(usize);

impl ToValue for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl ToValue for char {
    fn to_value(&self) -> Value {
        Value::Str(self.to_string())
    }
}

impl ToValue for str {
    fn to_value(&self) -> Value {
        Value::Str(self.to_string())
    }
}

impl ToValue for String {
    fn to_value(&self) -> Value {
        Value::Str(self.clone())
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<Map> for Value {
    fn from(v: Map) -> Self {
        Value::Map(v)
    }
}

impl ToValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl ToValue for () {
    fn to_value(&self) -> Value {
        Value::Null
    }
}

impl<T> ToValue for &T
where
    T: ToValue + ?Sized,
{
    fn to_value(&self) -> Value {
        (**self).to_value()
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }
}

// --- collections ---
impl<T: ToValue> ToValue for [T] {
    fn to_value(&self) -> Value {
        Value::List(self.iter().map(|v| v.to_value()).collect())
    }
}

impl<T: ToValue> ToValue for Vec<T> {
    fn to_value(&self) -> Value {
        self.as_slice().to_value()
    }
}

macro_rules! impl_to_value_map {
    ($map:ident) => {
        impl<T: ToValue> ToValue for $map<String, T> {
            fn to_value(&self) -> Value {
                Value::Map(
                    self.iter()
                        .map(|(k, v)| (k.clone(), v.to_value()))
                        .collect(),
                )
            }
        }
    };
}

impl_to_value_map!(HashMap);
impl_to_value_map!(BTreeMap);
impl_to_value_map!(IndexMap);

// --- serde_json interop ---
impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::I64(i)
                } else if let Some(u) = n.as_u64() {
                    Value::U64(u)
                } else {
                    Value::F64(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(a) => Value::List(a.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(o) => {
                Value::Map(o.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl ToValue for serde_json::Value {
    fn to_value(&self) -> Value {
        Value::from(self.clone())
    }
}
