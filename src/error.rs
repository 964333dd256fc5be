use crate::tpl::lexer::Position;
use thiserror::Error;

/// What went wrong while compiling a template.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyntaxErrorKind {
    #[error("unterminated marker, expected a closing `}}}}`")]
    UnterminatedMarker,
    #[error("block `{open}` is closed by `{close}`")]
    MismatchedBlock { open: String, close: String },
    #[error("`{name}` closes a block that was never opened")]
    UnexpectedClose { name: String },
    #[error("block `{name}` is never closed")]
    UnclosedBlock { name: String },
    #[error("`else` outside of a block")]
    MisplacedElse,
    #[error("invalid expression: {0}")]
    InvalidExpression(String),
    #[error("blocks or sub-expressions nested deeper than {limit}")]
    NestingTooDeep { limit: usize },
}

/// A compile-time failure, located in the template source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} at line {line}, column {column}")]
pub struct SyntaxError {
    pub kind: SyntaxErrorKind,
    pub line: usize,
    pub column: usize,
    /// Byte offset of the offending marker.
    pub offset: usize,
    /// Name of the template being compiled, when known.
    pub template: Option<String>,
}

impl SyntaxError {
    pub fn new(kind: SyntaxErrorKind, position: Position) -> Self {
        Self {
            kind,
            line: position.line,
            column: position.column,
            offset: position.offset,
            template: None,
        }
    }

    pub(crate) fn in_template(mut self, name: &str) -> Self {
        self.template = Some(name.to_string());
        self
    }
}

/// A render-time failure.
///
/// Apart from `TemplateNotFound`, `RecursionLimitExceeded` and `NestingTooDeep`, these are only
/// raised in strict mode; the default mode renders the offending node as empty.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("template `{0}` is not compiled")]
    TemplateNotFound(String),
    #[error("unknown helper `{0}`")]
    UnknownHelper(String),
    #[error("unknown partial `{0}`")]
    UnknownPartial(String),
    #[error("partial `{name}` exceeds the expansion limit of {limit}")]
    RecursionLimitExceeded { name: String, limit: usize },
    #[error("helper `{name}`: {message}")]
    Helper { name: String, message: String },
    #[error("output nested deeper than {limit} levels")]
    NestingTooDeep { limit: usize },
}

impl RenderError {
    pub fn helper(name: &str, message: impl Into<String>) -> Self {
        RenderError::Helper {
            name: name.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("Serialization Error: {0}")]
    Serialization(String),
    /// Every asset of a batch that failed; the others were registered.
    #[error("{} template asset(s) failed to compile, first: {}", .0.len(), .0.first().map(ToString::to_string).unwrap_or_default())]
    Assets(Vec<SyntaxError>),
}

impl serde::ser::Error for Error {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        Error::Serialization(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_error_reports_location() {
        let err = SyntaxError::new(
            SyntaxErrorKind::UnclosedBlock {
                name: "if".to_string(),
            },
            Position {
                line: 3,
                column: 7,
                offset: 20,
            },
        );
        assert_eq!(err.to_string(), "block `if` is never closed at line 3, column 7");
        assert_eq!(
            SyntaxErrorKind::UnterminatedMarker.to_string(),
            "unterminated marker, expected a closing `}}`"
        );
    }

    #[test]
    fn assets_error_reports_count_and_first() {
        let first = SyntaxError::new(SyntaxErrorKind::MisplacedElse, Position::default()).in_template("a");
        let second = SyntaxError::new(SyntaxErrorKind::UnterminatedMarker, Position::default());
        let err = Error::Assets(vec![first, second]);
        assert_eq!(
            err.to_string(),
            "2 template asset(s) failed to compile, first: `else` outside of a block at line 0, column 0"
        );
    }
}
