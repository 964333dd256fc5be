use crate::error::SyntaxError;
use crate::tpl::ast::Node;
use crate::tpl::parser::parse_template;

/// A parsed template. Immutable once built; shared between renders through `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub(crate) name: String,
    pub(crate) nodes: Vec<Node>,
    pub(crate) source_len: usize,
}

impl Template {
    /// Parses `source`. Errors carry `name` and the position of the offending marker.
    pub fn compile(name: &str, source: &str) -> Result<Template, SyntaxError> {
        let nodes = parse_template(source).map_err(|e| e.in_template(name))?;
        Ok(Template {
            name: name.to_string(),
            nodes,
            source_len: source.len(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Byte length of the source this template was compiled from.
    pub fn source_len(&self) -> usize {
        self.source_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_keeps_metadata() {
        let template = Template::compile("greeting", "Hello {{name}}!").unwrap();
        assert_eq!(template.name(), "greeting");
        assert_eq!(template.source_len(), 15);
        assert_eq!(template.nodes().len(), 3);
    }

    #[test]
    fn test_compile_error_names_template() {
        let err = Template::compile("page", "{{#if x}}").unwrap_err();
        assert_eq!(err.template.as_deref(), Some("page"));
    }
}
