use crate::tpl::render_context::Frame;
use crate::value::Value;
use std::borrow::Cow;

/// A parsed path expression such as `user.name`, `../title`, `@index` or `@root.site`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Path {
    /// Resolved against a frame of the scope stack. `up` counts leading `../`;
    /// `explicit` is set by `this`/`./`/`../`, which bypass block parameters.
    Context {
        up: usize,
        explicit: bool,
        segments: Vec<String>,
    },
    /// A data variable (`@index`, `@key`, `@first`, `@last`, ...).
    Local { name: String, segments: Vec<String> },
    /// `@root`: the outermost context.
    Root { segments: Vec<String> },
}

impl Path {
    /// Parses a path expression. Returns `None` for malformed input.
    pub fn parse(raw: &str) -> Option<Path> {
        if let Some(rest) = raw.strip_prefix('@') {
            let mut segments = split_segments(rest)?;
            if segments.is_empty() {
                return None;
            }
            let name = segments.remove(0);
            return Some(if name == "root" {
                Path::Root { segments }
            } else {
                Path::Local { name, segments }
            });
        }

        let mut rest = raw;
        let mut up = 0;
        loop {
            if let Some(r) = rest.strip_prefix("../") {
                up += 1;
                rest = r;
            } else if rest == ".." {
                up += 1;
                rest = "";
            } else {
                break;
            }
        }

        if rest == "this" || rest == "." || (rest.is_empty() && up > 0) {
            return Some(Path::Context {
                up,
                explicit: true,
                segments: Vec::new(),
            });
        }

        let mut explicit = up > 0;
        for prefix in ["this.", "this/", "./", "."] {
            if let Some(r) = rest.strip_prefix(prefix) {
                explicit = true;
                rest = r;
                break;
            }
        }

        let segments = split_segments(rest)?;
        if segments.is_empty() {
            return None;
        }
        Some(Path::Context {
            up,
            explicit,
            segments,
        })
    }
}

/// Splits on `.` or `/`; `[...]` quotes a segment verbatim.
fn split_segments(s: &str) -> Option<Vec<String>> {
    let mut segments = Vec::new();
    if s.is_empty() {
        return Some(segments);
    }

    let mut chars = s.chars();
    let mut current = String::new();
    let mut bracketed = false;
    loop {
        match chars.next() {
            Some('[') if current.is_empty() && !bracketed => {
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    current.push(c);
                }
                if !closed {
                    return None;
                }
                bracketed = true;
            }
            Some('.' | '/') => {
                if current.is_empty() && !bracketed {
                    return None;
                }
                segments.push(std::mem::take(&mut current));
                bracketed = false;
            }
            Some(c) => {
                if bracketed || matches!(c, '"' | '\'' | '(' | ')' | '=' | '|' | '[' | ']' | '@')
                    || c.is_whitespace()
                {
                    return None;
                }
                current.push(c);
            }
            None => {
                if current.is_empty() && !bracketed {
                    return None;
                }
                segments.push(current);
                break;
            }
        }
    }
    Some(segments)
}

/// Walks `segments` from `value`: map keys, or non-negative list indexes.
pub fn lookup<'v>(value: &'v Value, segments: &[String]) -> Option<&'v Value> {
    segments
        .iter()
        .try_fold(value, |current, segment| current.get(segment))
}

fn descend<'a>(base: &Cow<'a, Value>, segments: &[String]) -> Option<Cow<'a, Value>> {
    match base {
        Cow::Borrowed(v) => lookup(*v, segments).map(Cow::Borrowed),
        Cow::Owned(v) => lookup(v, segments).cloned().map(Cow::Owned),
    }
}

/// Resolves a path against the scope stack (innermost frame last).
///
/// Never fails: anything that cannot be reached resolves to `Value::Null`.
pub fn resolve<'a>(path: &Path, scopes: &[Frame<'a>]) -> Cow<'a, Value> {
    let found = match path {
        Path::Root { segments } => scopes
            .first()
            .and_then(|frame| descend(frame.scoped_value(), segments)),
        Path::Local { name, segments } => scopes
            .iter()
            .rev()
            .find_map(|frame| frame.local(name))
            .and_then(|v| lookup(v, segments))
            .cloned()
            .map(Cow::Owned),
        Path::Context {
            up,
            explicit,
            segments,
        } => {
            let bound = match segments.split_first() {
                Some((first, rest)) if !explicit => scopes
                    .iter()
                    .rev()
                    .find_map(|frame| frame.block_param(first))
                    .map(|value| (value, rest)),
                _ => None,
            };
            match bound {
                Some((value, rest)) => descend(value, rest),
                None => scopes
                    .len()
                    .checked_sub(up + 1)
                    .and_then(|i| descend(scopes[i].scoped_value(), segments)),
            }
        }
    };
    found.unwrap_or(Cow::Owned(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(up: usize, explicit: bool, segments: &[&str]) -> Path {
        Path::Context {
            up,
            explicit,
            segments: segments.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_parse_forms() {
        assert_eq!(Path::parse("a.b.0"), Some(context(0, false, &["a", "b", "0"])));
        assert_eq!(Path::parse("a/b"), Some(context(0, false, &["a", "b"])));
        assert_eq!(Path::parse("this"), Some(context(0, true, &[])));
        assert_eq!(Path::parse("."), Some(context(0, true, &[])));
        assert_eq!(Path::parse("this.a"), Some(context(0, true, &["a"])));
        assert_eq!(Path::parse("./a"), Some(context(0, true, &["a"])));
        assert_eq!(Path::parse(".a"), Some(context(0, true, &["a"])));
        assert_eq!(Path::parse("../../x"), Some(context(2, true, &["x"])));
        assert_eq!(Path::parse(".."), Some(context(1, true, &[])));
        assert_eq!(Path::parse("../this"), Some(context(1, true, &[])));
        assert_eq!(Path::parse("a.[b c].d"), Some(context(0, false, &["a", "b c", "d"])));
        assert_eq!(
            Path::parse("@index"),
            Some(Path::Local {
                name: "index".to_string(),
                segments: vec![]
            })
        );
        assert_eq!(
            Path::parse("@root.site.name"),
            Some(Path::Root {
                segments: vec!["site".to_string(), "name".to_string()]
            })
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for raw in ["", "a..b", "a.", "this.", "@", "a b", "a.[b", "x=y", "(a)"] {
            assert_eq!(Path::parse(raw), None, "{raw:?} should be rejected");
        }
    }

    #[test]
    fn test_resolve_against_scopes() {
        let root = Value::from(json!({
            "title": "T",
            "users": [{"name": "ann", "tags": ["x", "y"]}]
        }));
        let user = root.get("users").and_then(|u| u.get("0")).unwrap();
        let scopes = vec![
            Frame::borrowed(&root),
            Frame::borrowed(user).with_local("index", 0usize),
        ];

        let get = |raw: &str| resolve(&Path::parse(raw).unwrap(), &scopes).into_owned();
        assert_eq!(get("name"), Value::from("ann"));
        assert_eq!(get("tags.1"), Value::from("y"));
        assert_eq!(get("../title"), Value::from("T"));
        assert_eq!(get("@root.title"), Value::from("T"));
        assert_eq!(get("@index"), Value::from(0));
        assert_eq!(get("this.name"), Value::from("ann"));

        assert_eq!(get("missing.deep"), Value::Null);
        assert_eq!(get("tags.9"), Value::Null);
        assert_eq!(get("name.first"), Value::Null);
        assert_eq!(get("../../../x"), Value::Null);
        assert_eq!(get("@key"), Value::Null);
    }

    #[test]
    fn test_block_params_shadow_context() {
        let root = Value::from(json!({"item": "ctx", "other": {"item": "inner"}}));
        let bound = Value::from(json!({"label": "bound"}));
        let scopes = vec![
            Frame::borrowed(&root),
            Frame::borrowed(root.get("other").unwrap())
                .with_block_param("item", Cow::Borrowed(&bound)),
        ];

        let get = |raw: &str| resolve(&Path::parse(raw).unwrap(), &scopes).into_owned();
        assert_eq!(get("item.label"), Value::from("bound"));
        assert_eq!(get("this.item"), Value::from("inner"));
        assert_eq!(get("../item"), Value::from("ctx"));
    }
}
