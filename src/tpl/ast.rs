use crate::tpl::lexer::Position;
use crate::tpl::path::Path;
use crate::value::Value;
use std::sync::Arc;

/// An argument: a literal, a path into the scope stack, or a nested helper call.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Literal(Value),
    Path(Path),
    SubExpr(Box<Call>),
}

/// `head arg... key=value...` as written inside a marker or a sub-expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    /// Source text of the head; the name helpers are looked up by.
    pub name: String,
    pub head: Param,
    pub params: Vec<Param>,
    pub hash: Vec<(String, Param)>,
}

impl Call {
    /// A bare value reference without arguments.
    pub fn is_plain(&self) -> bool {
        self.params.is_empty() && self.hash.is_empty()
    }

    /// Whether the head may name a helper (literals never do).
    pub fn names_helper(&self) -> bool {
        matches!(self.head, Param::Path(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub call: Call,
    /// Names declared with `as |a b|`.
    pub block_params: Vec<String>,
    pub body: Vec<Node>,
    pub inverse: Option<Vec<Node>>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Partial {
    pub name: String,
    /// Explicit context, replacing the current one.
    pub context: Option<Param>,
    pub hash: Vec<(String, Param)>,
    /// Body of `{{#> name}}...{{/name}}`: rendered by `{{> @partial-block}}`
    /// inside the partial, or in its place when the partial does not exist.
    pub block: Option<Arc<[Node]>>,
    /// Prefixed to every output line when the partial stands alone on its line.
    pub indent: String,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Expression { call: Call, escape: bool },
    Block(Box<Block>),
    Partial(Partial),
    /// `{{#*inline "name"}}...{{/inline}}`: a partial visible to the
    /// enclosing node list and everything it renders.
    Inline { name: String, body: Arc<[Node]> },
}
