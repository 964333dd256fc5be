use crate::error::RenderError;
use crate::tpl::ast::Node;
use crate::tpl::render_context::{Frame, RenderContext};
use crate::value::Value;
use std::borrow::Cow;
use std::cmp::Ordering;

/// A user-supplied helper.
///
/// Value helpers implement [`HelperDef::call_value`]; the default
/// [`HelperDef::call`] writes that value. Block helpers implement `call`
/// and decide themselves whether, how often and against which frame the
/// body and inverse are rendered.
pub trait HelperDef: Send + Sync {
    fn call_value<'a>(
        &self,
        _h: &Helper<'a, '_>,
        _rc: &RenderContext<'_, 'a>,
    ) -> Result<Option<Value>, RenderError> {
        Ok(None)
    }

    fn call<'a>(&self, h: &Helper<'a, '_>, rc: &mut RenderContext<'_, 'a>) -> Result<(), RenderError> {
        if let Some(value) = self.call_value(h, rc)? {
            rc.write_value(&value, h.escape());
        }
        Ok(())
    }
}

/// Adapts a closure over the resolved arguments into a value helper.
pub(crate) struct FnHelper<F>(pub F);

impl<F> HelperDef for FnHelper<F>
where
    F: Fn(&Helper<'_, '_>) -> Result<Value, RenderError> + Send + Sync,
{
    fn call_value<'a>(
        &self,
        h: &Helper<'a, '_>,
        _rc: &RenderContext<'_, 'a>,
    ) -> Result<Option<Value>, RenderError> {
        (self.0)(h).map(Some)
    }
}

/// One invocation: the resolved arguments plus the unevaluated body and inverse.
#[derive(Debug, Clone)]
pub struct Helper<'a, 't> {
    pub(crate) name: &'t str,
    pub(crate) params: Vec<Cow<'a, Value>>,
    pub(crate) hash: Vec<(&'t str, Cow<'a, Value>)>,
    pub(crate) body: &'t [Node],
    pub(crate) inverse: Option<&'t [Node]>,
    pub(crate) block_params: &'t [String],
    pub(crate) block: bool,
    pub(crate) escape: bool,
}

impl<'a, 't> Helper<'a, 't> {
    pub fn name(&self) -> &'t str {
        self.name
    }

    pub fn params(&self) -> &[Cow<'a, Value>] {
        &self.params
    }

    pub fn param(&self, index: usize) -> Option<&Value> {
        self.params.get(index).map(|v| v.as_ref())
    }

    /// The argument together with its borrow of the render data, for pushing as a frame.
    pub fn scoped_param(&self, index: usize) -> Option<&Cow<'a, Value>> {
        self.params.get(index)
    }

    pub fn hash(&self) -> &[(&'t str, Cow<'a, Value>)] {
        &self.hash
    }

    pub fn hash_get(&self, key: &str) -> Option<&Value> {
        self.hash
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_ref())
    }

    /// The body; empty for expression helpers.
    pub fn body(&self) -> &'t [Node] {
        self.body
    }

    pub fn inverse(&self) -> Option<&'t [Node]> {
        self.inverse
    }

    pub fn is_block(&self) -> bool {
        self.block
    }

    pub fn block_param(&self, index: usize) -> Option<&'t str> {
        self.block_params.get(index).map(String::as_str)
    }

    /// Whether output written for this call should be escaped.
    pub fn escape(&self) -> bool {
        self.escape
    }

    /// The same invocation with a single positional argument.
    pub(crate) fn with_subject(&self, subject: Cow<'a, Value>) -> Helper<'a, 't> {
        Helper {
            params: vec![subject],
            ..self.clone()
        }
    }

    /// Renders the inverse if there is one.
    pub fn render_inverse(&self, rc: &mut RenderContext<'_, 'a>) -> Result<(), RenderError> {
        match self.inverse {
            Some(nodes) => rc.render(nodes),
            None => Ok(()),
        }
    }
}

/// Helpers every registry understands. A user helper of the same name wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    If,
    Unless,
    Each,
    With,
    Lookup,
    Log,
    /// Renders its body as is; the helper behind `{{{{raw}}}}...{{{{/raw}}}}`.
    Raw,
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    And,
    Or,
    Not,
    Len,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Builtin> {
        Some(match name {
            "if" => Builtin::If,
            "unless" => Builtin::Unless,
            "each" => Builtin::Each,
            "with" => Builtin::With,
            "lookup" => Builtin::Lookup,
            "log" => Builtin::Log,
            "raw" => Builtin::Raw,
            "eq" => Builtin::Eq,
            "ne" => Builtin::Ne,
            "gt" => Builtin::Gt,
            "gte" => Builtin::Gte,
            "lt" => Builtin::Lt,
            "lte" => Builtin::Lte,
            "and" => Builtin::And,
            "or" => Builtin::Or,
            "not" => Builtin::Not,
            "len" => Builtin::Len,
            _ => return None,
        })
    }

    pub(crate) fn call<'a>(
        self,
        h: &Helper<'a, '_>,
        rc: &mut RenderContext<'_, 'a>,
    ) -> Result<(), RenderError> {
        match self {
            Builtin::If => conditional(h, rc, false),
            Builtin::Unless => conditional(h, rc, true),
            Builtin::Each => each(h, rc),
            Builtin::With => with(h, rc),
            Builtin::Raw => rc.render(h.body()),
            Builtin::Lookup | Builtin::Log | Builtin::Len => {
                if let Some(value) = self.call_value(h, rc)? {
                    rc.write_value(&value, h.escape());
                }
                Ok(())
            }
            // Predicates choose between body and inverse as blocks and print
            // `true`/`false` as expressions.
            _ => {
                let value = self.call_value(h, rc)?.unwrap_or_default();
                if !h.is_block() {
                    rc.write_value(&value, h.escape());
                    Ok(())
                } else if value.is_truthy() {
                    rc.render(h.body())
                } else {
                    h.render_inverse(rc)
                }
            }
        }
    }

    /// The value form, used by sub-expressions.
    pub(crate) fn call_value<'a>(
        self,
        h: &Helper<'a, '_>,
        rc: &RenderContext<'_, 'a>,
    ) -> Result<Option<Value>, RenderError> {
        match self {
            Builtin::If | Builtin::Unless => {
                let Some(value) = h.param(0) else {
                    return missing_argument(h, rc).map(|_| None);
                };
                let truthy = test(value, h);
                Ok(Some(Value::Bool(truthy != (self == Builtin::Unless))))
            }
            Builtin::Lookup => lookup(h, rc),
            Builtin::Log => {
                log_params(h);
                Ok(None)
            }
            Builtin::Eq | Builtin::Ne => {
                let (Some(a), Some(b)) = (h.param(0), h.param(1)) else {
                    return missing_argument(h, rc).map(|_| Some(Value::Bool(false)));
                };
                Ok(Some(Value::Bool(equals(a, b) == (self == Builtin::Eq))))
            }
            Builtin::Gt | Builtin::Gte | Builtin::Lt | Builtin::Lte => {
                let (Some(a), Some(b)) = (h.param(0), h.param(1)) else {
                    return missing_argument(h, rc).map(|_| Some(Value::Bool(false)));
                };
                let holds = compare(a, b).is_some_and(|ordering| match self {
                    Builtin::Gt => ordering.is_gt(),
                    Builtin::Gte => ordering.is_ge(),
                    Builtin::Lt => ordering.is_lt(),
                    _ => ordering.is_le(),
                });
                Ok(Some(Value::Bool(holds)))
            }
            Builtin::And | Builtin::Or => {
                if h.params().is_empty() {
                    missing_argument(h, rc)?;
                }
                let mut truthy = h.params().iter().map(|v| v.is_truthy());
                Ok(Some(Value::Bool(if self == Builtin::And {
                    truthy.all(|t| t)
                } else {
                    truthy.any(|t| t)
                })))
            }
            Builtin::Not => {
                let Some(value) = h.param(0) else {
                    return missing_argument(h, rc).map(|_| Some(Value::Bool(true)));
                };
                Ok(Some(Value::Bool(!value.is_truthy())))
            }
            Builtin::Len => {
                let Some(value) = h.param(0) else {
                    return missing_argument(h, rc).map(|_| Some(Value::from(0)));
                };
                let len = match value {
                    Value::List(items) => items.len(),
                    Value::Map(map) => map.len(),
                    Value::Str(s) => s.len(),
                    _ => 0,
                };
                Ok(Some(Value::from(len)))
            }
            Builtin::Each | Builtin::With | Builtin::Raw => Ok(None),
        }
    }
}

/// Numbers compare by value whatever their representation; everything else
/// structurally.
fn equals(a: &Value, b: &Value) -> bool {
    if is_number(a) && is_number(b) {
        compare(a, b) == Some(Ordering::Equal)
    } else {
        a == b
    }
}

fn is_number(value: &Value) -> bool {
    matches!(value, Value::I64(_) | Value::U64(_) | Value::F64(_))
}

/// Orders numbers numerically, strings lexicographically and booleans with
/// `false` first. A string compared with a number is read as a number.
/// Anything else is unordered.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::I64(x), Value::I64(y)) => Some(x.cmp(y)),
        (Value::U64(x), Value::U64(y)) => Some(x.cmp(y)),
        (Value::I64(x), Value::U64(y)) => Some(compare_signed(*x, *y)),
        (Value::U64(x), Value::I64(y)) => Some(compare_signed(*y, *x).reverse()),
        _ => as_number(a)?.partial_cmp(&as_number(b)?),
    }
}

fn compare_signed(x: i64, y: u64) -> Ordering {
    match u64::try_from(x) {
        Ok(x) => x.cmp(&y),
        Err(_) => Ordering::Less,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::I64(n) => Some(*n as f64),
        Value::U64(n) => Some(*n as f64),
        Value::F64(n) => Some(*n),
        Value::Str(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn missing_argument(h: &Helper<'_, '_>, rc: &RenderContext<'_, '_>) -> Result<(), RenderError> {
    if rc.config().strict {
        Err(RenderError::helper(h.name(), "missing required argument"))
    } else {
        Ok(())
    }
}

fn test(value: &Value, h: &Helper<'_, '_>) -> bool {
    let include_zero = h.hash_get("includeZero").is_some_and(Value::is_truthy);
    value.is_truthy() || (include_zero && value.is_zero())
}

fn conditional<'a>(
    h: &Helper<'a, '_>,
    rc: &mut RenderContext<'_, 'a>,
    negate: bool,
) -> Result<(), RenderError> {
    let Some(value) = h.param(0) else {
        missing_argument(h, rc)?;
        return h.render_inverse(rc);
    };
    if test(value, h) != negate {
        rc.render(h.body())
    } else {
        h.render_inverse(rc)
    }
}

/// Children of a list or map with their keys; empty for anything else.
fn children(value: &Value) -> Vec<(Option<&str>, &Value)> {
    match value {
        Value::List(items) => items.iter().map(|v| (None, v)).collect(),
        Value::Map(map) => map.iter().map(|(k, v)| (Some(k.as_str()), v)).collect(),
        _ => Vec::new(),
    }
}

fn each<'a>(h: &Helper<'a, '_>, rc: &mut RenderContext<'_, 'a>) -> Result<(), RenderError> {
    let Some(collection) = h.scoped_param(0) else {
        missing_argument(h, rc)?;
        return h.render_inverse(rc);
    };

    let entries: Vec<(Option<String>, Cow<'a, Value>)> = match collection {
        Cow::Borrowed(v) => children(*v)
            .into_iter()
            .map(|(k, item)| (k.map(str::to_string), Cow::Borrowed(item)))
            .collect(),
        Cow::Owned(v) => children(v)
            .into_iter()
            .map(|(k, item)| (k.map(str::to_string), Cow::Owned(item.clone())))
            .collect(),
    };
    if entries.is_empty() {
        return h.render_inverse(rc);
    }

    let last = entries.len() - 1;
    for (index, (key, item)) in entries.into_iter().enumerate() {
        let mut frame = Frame::new(item.clone())
            .with_local("index", index)
            .with_local("first", index == 0)
            .with_local("last", index == last);
        if let Some(key) = &key {
            frame = frame.with_local("key", key.as_str());
        }
        if let Some(name) = h.block_param(0) {
            frame = frame.with_block_param(name, item);
        }
        if let Some(name) = h.block_param(1) {
            let position = match key {
                Some(key) => Value::Str(key),
                None => Value::from(index),
            };
            frame = frame.with_block_param(name, Cow::Owned(position));
        }
        rc.render_with(h.body(), frame)?;
    }
    Ok(())
}

fn with<'a>(h: &Helper<'a, '_>, rc: &mut RenderContext<'_, 'a>) -> Result<(), RenderError> {
    let Some(value) = h.scoped_param(0) else {
        missing_argument(h, rc)?;
        return h.render_inverse(rc);
    };
    if !value.is_truthy() {
        return h.render_inverse(rc);
    }
    let mut frame = Frame::new(value.clone());
    if let Some(name) = h.block_param(0) {
        frame = frame.with_block_param(name, value.clone());
    }
    rc.render_with(h.body(), frame)
}

fn lookup<'a>(h: &Helper<'a, '_>, rc: &RenderContext<'_, 'a>) -> Result<Option<Value>, RenderError> {
    let (Some(target), Some(key)) = (h.param(0), h.param(1)) else {
        missing_argument(h, rc)?;
        return Ok(Some(Value::Null));
    };
    Ok(Some(target.get(&key.render()).cloned().unwrap_or_default()))
}

fn log_params(h: &Helper<'_, '_>) {
    let level = h
        .hash_get("level")
        .and_then(Value::as_str)
        .and_then(|level| level.parse::<log::Level>().ok())
        .unwrap_or(log::Level::Info);
    let message = h
        .params()
        .iter()
        .map(|v| v.render().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    log::log!(level, "{}", message);
}

/// Replaces `& < > " '` with HTML entities.
pub fn html_escape(data: &str) -> String {
    let mut escaped = String::with_capacity(data.len());
    for c in data.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub fn no_escape(data: &str) -> String {
    data.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_escape() {
        assert_eq!(
            html_escape(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#x27;Jerry&#x27;&lt;/a&gt;"
        );
        assert_eq!(html_escape("plain"), "plain");
        assert_eq!(no_escape("<b>"), "<b>");
    }

    #[test]
    fn test_builtin_names() {
        assert_eq!(Builtin::from_name("each"), Some(Builtin::Each));
        assert_eq!(Builtin::from_name("lookup"), Some(Builtin::Lookup));
        assert_eq!(Builtin::from_name("gte"), Some(Builtin::Gte));
        assert_eq!(Builtin::from_name("raw"), Some(Builtin::Raw));
        assert_eq!(Builtin::from_name("Each"), None);
        assert_eq!(Builtin::from_name("user.name"), None);
    }

    #[test]
    fn test_compare_values() {
        assert_eq!(compare(&Value::from(5), &Value::from(3)), Some(Ordering::Greater));
        assert_eq!(compare(&Value::I64(-1), &Value::U64(u64::MAX)), Some(Ordering::Less));
        assert_eq!(compare(&Value::U64(u64::MAX), &Value::I64(1)), Some(Ordering::Greater));
        assert_eq!(compare(&Value::F64(2.5), &Value::from(2)), Some(Ordering::Greater));
        assert_eq!(compare(&Value::from("10"), &Value::from(9)), Some(Ordering::Greater));
        assert_eq!(compare(&Value::from("abc"), &Value::from("abd")), Some(Ordering::Less));
        assert_eq!(compare(&Value::Bool(false), &Value::Bool(true)), Some(Ordering::Less));
        assert_eq!(compare(&Value::from("x"), &Value::from(1)), None);
        assert_eq!(compare(&Value::Null, &Value::from(1)), None);
        assert_eq!(compare(&Value::F64(f64::NAN), &Value::from(1)), None);
    }

    #[test]
    fn test_equality_across_number_kinds() {
        assert!(equals(&Value::I64(5), &Value::F64(5.0)));
        assert!(equals(&Value::I64(5), &Value::U64(5)));
        assert!(!equals(&Value::from(5), &Value::from("5")));
        assert!(equals(&Value::from("a"), &Value::from("a")));
        assert!(equals(&Value::Null, &Value::Null));
    }
}
