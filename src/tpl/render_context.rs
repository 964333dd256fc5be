use crate::config::RenderConfig;
use crate::registry::{EscapeFn, Registry};
use crate::tpl::ast::Node;
use crate::tpl::path::{self, Path};
use crate::value::Value;
use std::borrow::Cow;
use std::sync::Arc;

/// One level of the scope stack.
///
/// `value` is what `this` refers to. `locals` hold data variables (`@index`,
/// `@key`, ...) and `block_params` the names bound with `as |x|`.
#[derive(Debug, Clone)]
pub struct Frame<'a> {
    value: Cow<'a, Value>,
    locals: Vec<(String, Value)>,
    block_params: Vec<(String, Cow<'a, Value>)>,
}

impl<'a> Frame<'a> {
    pub fn new(value: Cow<'a, Value>) -> Self {
        Self {
            value,
            locals: Vec::new(),
            block_params: Vec::new(),
        }
    }

    pub fn borrowed(value: &'a Value) -> Self {
        Self::new(Cow::Borrowed(value))
    }

    pub fn owned(value: Value) -> Self {
        Self::new(Cow::Owned(value))
    }

    pub fn with_local(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.locals.push((name.into(), value.into()));
        self
    }

    pub fn with_block_param(mut self, name: impl Into<String>, value: Cow<'a, Value>) -> Self {
        self.block_params.push((name.into(), value));
        self
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub(crate) fn scoped_value(&self) -> &Cow<'a, Value> {
        &self.value
    }

    pub fn local(&self, name: &str) -> Option<&Value> {
        self.locals.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn block_param(&self, name: &str) -> Option<&Cow<'a, Value>> {
        self.block_params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }
}

/// State of a single render call: the scope stack and the output buffer.
///
/// Helpers receive it to write output and to render their bodies against a
/// frame of their choosing. Nothing here outlives the call, so concurrent
/// renders never share one.
pub struct RenderContext<'r, 'a> {
    pub(crate) registry: &'r Registry,
    pub(crate) config: &'r RenderConfig,
    escape: EscapeFn,
    scopes: Vec<Frame<'a>>,
    out: String,
    /// Partials currently being expanded, outermost first.
    pub(crate) partials: Vec<String>,
    /// Inline partials and `@partial-block` bodies in scope, innermost last.
    pub(crate) inlines: Vec<(String, Arc<[Node]>)>,
    /// Node lists currently being rendered inside each other.
    pub(crate) depth: usize,
}

impl<'r, 'a> RenderContext<'r, 'a> {
    pub(crate) fn new(
        registry: &'r Registry,
        config: &'r RenderConfig,
        data: &'a Value,
        capacity: usize,
    ) -> Self {
        Self {
            registry,
            config,
            escape: registry.escape_fn(),
            scopes: vec![Frame::borrowed(data)],
            out: String::with_capacity(capacity),
            partials: Vec::new(),
            inlines: Vec::new(),
            depth: 0,
        }
    }

    pub fn config(&self) -> &RenderConfig {
        self.config
    }

    pub fn scopes(&self) -> &[Frame<'a>] {
        &self.scopes
    }

    /// The value `this` refers to.
    pub fn current(&self) -> &Value {
        self.scopes.last().map(Frame::value).unwrap_or(&Value::Null)
    }

    pub(crate) fn current_scoped(&self) -> Cow<'a, Value> {
        self.scopes
            .last()
            .map(|frame| frame.scoped_value().clone())
            .unwrap_or_default()
    }

    pub fn resolve(&self, path: &Path) -> Cow<'a, Value> {
        path::resolve(path, &self.scopes)
    }

    pub fn push_frame(&mut self, frame: Frame<'a>) {
        self.scopes.push(frame);
    }

    /// Pops the innermost frame; the root frame is never removed.
    pub fn pop_frame(&mut self) -> Option<Frame<'a>> {
        if self.scopes.len() > 1 {
            self.scopes.pop()
        } else {
            None
        }
    }

    pub fn write(&mut self, s: &str) {
        self.out.push_str(s);
    }

    /// Writes the text form of `value`, through the escape function when `escape` is set.
    pub fn write_value(&mut self, value: &Value, escape: bool) {
        let text = value.render();
        if escape {
            let escaped = (self.escape)(&text);
            self.out.push_str(&escaped);
        } else {
            self.out.push_str(&text);
        }
    }

    /// Output written so far.
    pub fn output(&self) -> &str {
        &self.out
    }

    /// Prefixes `indent` to each line written since byte `start`. A trailing
    /// newline does not open another line.
    pub(crate) fn indent_since(&mut self, start: usize, indent: &str) {
        let written = self.out.split_off(start);
        for line in written.split_inclusive('\n') {
            self.out.push_str(indent);
            self.out.push_str(line);
        }
    }

    pub(crate) fn into_output(self) -> String {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indent_since() {
        let registry = Registry::new();
        let config = RenderConfig::default();
        let data = Value::Null;
        let mut rc = RenderContext::new(&registry, &config, &data, 0);
        rc.write("head\n");
        rc.write("a\n\nb\n");
        rc.indent_since(5, "  ");
        assert_eq!(rc.output(), "head\n  a\n  \n  b\n");

        let start = rc.output().len();
        rc.write("tail");
        rc.indent_since(start, "\t");
        assert_eq!(rc.output(), "head\n  a\n  \n  b\n\ttail");
    }
}
