use crate::error::{SyntaxError, SyntaxErrorKind};
use crate::tpl::ast::{Block, Call, Node, Param, Partial};
use crate::tpl::lexer::{Position, Token, TokenKind, tokenize};
use crate::tpl::path::Path;
use crate::value::Value;

/// How many blocks, partial blocks and sub-expressions may enclose each other.
pub const MAX_NESTING: usize = 256;

/// What a block marker opened.
enum Opener {
    Helper { call: Call, block_params: Vec<String> },
    /// `{{#> name}}`
    Partial(Partial),
    /// `{{#*inline "name"}}`
    Inline(String),
}

/// A block that has been opened and not yet closed.
///
/// Children accumulate into `body` until an `else` flips them into `inverse`;
/// blocks opened with `^` start out accumulating into `inverse`.
struct BlockFrame {
    /// The name its close marker must repeat.
    name: String,
    opener: Opener,
    position: Position,
    body: Vec<Node>,
    inverse: Vec<Node>,
    in_inverse: bool,
    inverted: bool,
    seen_else: bool,
    /// Opened by `{{else if ...}}`; closed by its parent's close marker.
    chained: bool,
}

impl BlockFrame {
    fn new(name: String, opener: Opener, position: Position) -> Self {
        Self {
            name,
            opener,
            position,
            body: Vec::new(),
            inverse: Vec::new(),
            in_inverse: false,
            inverted: false,
            seen_else: false,
            chained: false,
        }
    }

    fn target(&mut self) -> &mut Vec<Node> {
        if self.in_inverse {
            &mut self.inverse
        } else {
            &mut self.body
        }
    }

    fn finish(self) -> Node {
        match self.opener {
            Opener::Helper { call, block_params } => Node::Block(Box::new(Block {
                call,
                block_params,
                body: self.body,
                inverse: (self.inverted || self.seen_else).then_some(self.inverse),
                position: self.position,
            })),
            Opener::Partial(mut partial) => {
                partial.block = Some(self.body.into());
                Node::Partial(partial)
            }
            Opener::Inline(name) => Node::Inline {
                name,
                body: self.body.into(),
            },
        }
    }
}

/// Builds the tree from the token stream with a single stack of open blocks.
struct Parser {
    root: Vec<Node>,
    open: Vec<BlockFrame>,
}

impl Parser {
    fn new() -> Self {
        Self {
            root: Vec::new(),
            open: Vec::new(),
        }
    }

    fn parse(mut self, tokens: &[Token<'_>]) -> Result<Vec<Node>, SyntaxError> {
        for token in tokens {
            let at = |kind: SyntaxErrorKind| SyntaxError::new(kind, token.position);
            match token.kind {
                TokenKind::Text => self.append_text(token.content),
                TokenKind::Comment => {}
                TokenKind::Expression if token.is_else() => {
                    self.handle_else(token.content, token.position).map_err(at)?
                }
                TokenKind::Expression | TokenKind::RawExpression => {
                    let call = parse_expression(token.content).map_err(at)?;
                    self.append_node(Node::Expression {
                        call,
                        escape: token.kind == TokenKind::Expression,
                    });
                }
                TokenKind::BlockOpen => {
                    let frame = open_block(token.content, token.position).map_err(at)?;
                    self.push_open(frame).map_err(at)?;
                }
                TokenKind::InverseOpen => {
                    let mut frame = open_helper_block(token.content, token.position).map_err(at)?;
                    frame.in_inverse = true;
                    frame.inverted = true;
                    self.push_open(frame).map_err(at)?;
                }
                TokenKind::BlockClose => self.handle_close(token.content).map_err(at)?,
                TokenKind::Partial => {
                    let mut partial = parse_partial(token.content, token.position).map_err(at)?;
                    partial.indent = token.indent.to_string();
                    self.append_node(Node::Partial(partial));
                }
            }
        }

        if let Some(frame) = self.open.iter().rev().find(|f| !f.chained) {
            return Err(SyntaxError::new(
                SyntaxErrorKind::UnclosedBlock {
                    name: frame.name.clone(),
                },
                frame.position,
            ));
        }
        Ok(self.root)
    }

    fn push_open(&mut self, frame: BlockFrame) -> Result<(), SyntaxErrorKind> {
        if self.open.len() >= MAX_NESTING {
            return Err(SyntaxErrorKind::NestingTooDeep { limit: MAX_NESTING });
        }
        self.open.push(frame);
        Ok(())
    }

    /// `{{else}}` flips the innermost block to its inverse; `{{else if x}}`
    /// additionally opens a chained block inside that inverse.
    fn handle_else(&mut self, content: &str, position: Position) -> Result<(), SyntaxErrorKind> {
        let frame = self.open.last_mut().ok_or(SyntaxErrorKind::MisplacedElse)?;
        if frame.seen_else || !matches!(frame.opener, Opener::Helper { .. }) {
            return Err(SyntaxErrorKind::MisplacedElse);
        }
        frame.seen_else = true;
        frame.in_inverse = !frame.in_inverse;

        let rest = content["else".len()..].trim();
        if !rest.is_empty() {
            let mut chained = open_helper_block(rest, position)?;
            chained.chained = true;
            self.push_open(chained)?;
        }
        Ok(())
    }

    fn handle_close(&mut self, content: &str) -> Result<(), SyntaxErrorKind> {
        let name = content.trim();
        loop {
            let frame = self.open.pop().ok_or_else(|| SyntaxErrorKind::UnexpectedClose {
                name: name.to_string(),
            })?;
            let chained = frame.chained;
            if !chained && frame.name != name {
                return Err(SyntaxErrorKind::MismatchedBlock {
                    open: frame.name,
                    close: name.to_string(),
                });
            }
            self.append_node(frame.finish());
            if !chained {
                return Ok(());
            }
        }
    }

    /// Append a node to the current accumulation target.
    fn append_node(&mut self, node: Node) {
        match self.open.last_mut() {
            Some(frame) => frame.target().push(node),
            None => self.root.push(node),
        }
    }

    /// Append text, merging with the previous text node when possible.
    fn append_text(&mut self, text: &str) {
        let nodes = match self.open.last_mut() {
            Some(frame) => frame.target(),
            None => &mut self.root,
        };
        if let Some(Node::Text(last)) = nodes.last_mut() {
            last.push_str(text);
        } else {
            nodes.push(Node::Text(text.to_string()));
        }
    }
}

/// Builds the AST for a token stream.
pub fn parse(tokens: &[Token<'_>]) -> Result<Vec<Node>, SyntaxError> {
    Parser::new().parse(tokens)
}

/// Main entry point: tokenize and parse a template string.
pub fn parse_template(source: &str) -> Result<Vec<Node>, SyntaxError> {
    parse(&tokenize(source)?)
}

fn invalid(message: String) -> SyntaxErrorKind {
    SyntaxErrorKind::InvalidExpression(message)
}

fn parse_expression(content: &str) -> Result<Call, SyntaxErrorKind> {
    parse_call(&split_args(content)?)
}

/// `{{#...}}`: a helper block, a partial block (`#>`) or an inline partial (`#*inline`).
fn open_block(content: &str, position: Position) -> Result<BlockFrame, SyntaxErrorKind> {
    if let Some(rest) = content.strip_prefix('>') {
        let partial = parse_partial(rest.trim_start(), position)?;
        return Ok(BlockFrame::new(
            partial.name.clone(),
            Opener::Partial(partial),
            position,
        ));
    }
    if let Some(rest) = content.strip_prefix('*') {
        let args = split_args(rest.trim_start())?;
        return match args.as_slice() {
            ["inline", name] => {
                let name = unquote(name)
                    .ok_or_else(|| invalid(format!("inline partial name `{name}` must be a string")))?;
                Ok(BlockFrame::new(
                    "inline".to_string(),
                    Opener::Inline(name.to_string()),
                    position,
                ))
            }
            ["inline", ..] => Err(invalid("inline partial takes exactly one name".to_string())),
            _ => Err(invalid(format!("unsupported decorator `{}`", rest.trim()))),
        };
    }
    open_helper_block(content, position)
}

fn open_helper_block(content: &str, position: Position) -> Result<BlockFrame, SyntaxErrorKind> {
    let mut args = split_args(content)?;
    let block_params = take_block_params(&mut args)?;
    let call = parse_call(&args)?;
    Ok(BlockFrame::new(
        call.name.clone(),
        Opener::Helper { call, block_params },
        position,
    ))
}

fn parse_partial(content: &str, position: Position) -> Result<Partial, SyntaxErrorKind> {
    let args = split_args(content)?;
    let Some((&name, rest)) = args.split_first() else {
        return Err(invalid("partial without a name".to_string()));
    };
    if name.starts_with('(') {
        return Err(invalid(format!("dynamic partial name `{name}` is not supported")));
    }
    let name = unquote(name).unwrap_or(name).to_string();

    let mut context = None;
    let mut hash = Vec::new();
    for arg in rest {
        if let Some((key, value)) = split_hash(arg) {
            hash.push((key.to_string(), parse_param(value)?));
        } else if context.is_none() && hash.is_empty() {
            context = Some(parse_param(arg)?);
        } else {
            return Err(invalid(format!(
                "partial `{name}` takes at most one context argument"
            )));
        }
    }
    Ok(Partial {
        name,
        context,
        hash,
        block: None,
        indent: String::new(),
        position,
    })
}

/// Splits marker content on whitespace, keeping string literals, `[...]` path
/// segments, `( ... )` sub-expressions and `|a b|` block parameter lists whole.
fn split_args(content: &str) -> Result<Vec<&str>, SyntaxErrorKind> {
    let mut args = Vec::new();
    let mut start: Option<usize> = None;
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut in_pipes = false;
    let mut in_brackets = false;

    for (i, c) in content.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        if in_brackets {
            in_brackets = c != ']';
            continue;
        }
        match c {
            '[' => {
                in_brackets = true;
                start.get_or_insert(i);
            }
            '"' | '\'' => {
                quote = Some(c);
                start.get_or_insert(i);
            }
            '(' => {
                depth += 1;
                if depth > MAX_NESTING {
                    return Err(SyntaxErrorKind::NestingTooDeep { limit: MAX_NESTING });
                }
                start.get_or_insert(i);
            }
            ')' => {
                if depth == 0 {
                    return Err(invalid("unbalanced `)`".to_string()));
                }
                depth -= 1;
            }
            '|' if depth == 0 => {
                in_pipes = !in_pipes;
                start.get_or_insert(i);
            }
            c if c.is_whitespace() && depth == 0 && !in_pipes => {
                if let Some(s) = start.take() {
                    args.push(&content[s..i]);
                }
            }
            _ => {
                start.get_or_insert(i);
            }
        }
    }

    if quote.is_some() {
        return Err(invalid("unterminated string literal".to_string()));
    }
    if depth > 0 {
        return Err(invalid("unbalanced `(`".to_string()));
    }
    if in_pipes {
        return Err(invalid("unterminated block parameters".to_string()));
    }
    if in_brackets {
        return Err(invalid("unterminated `[`".to_string()));
    }
    if let Some(s) = start {
        args.push(&content[s..]);
    }
    Ok(args)
}

/// Removes a trailing `as |a b|` and returns the declared names.
fn take_block_params(args: &mut Vec<&str>) -> Result<Vec<String>, SyntaxErrorKind> {
    let Some(last) = args.last() else {
        return Ok(Vec::new());
    };
    if !last.starts_with('|') {
        return Ok(Vec::new());
    }
    let n = args.len();
    if n < 3 || args[n - 2] != "as" || last.len() < 2 || !last.ends_with('|') {
        return Err(invalid(format!("malformed block parameters `{last}`")));
    }
    let names: Vec<String> = last[1..last.len() - 1]
        .split_whitespace()
        .map(str::to_string)
        .collect();
    let valid = |name: &String| {
        name.chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '$')
    };
    if names.is_empty() || !names.iter().all(valid) {
        return Err(invalid(format!("malformed block parameters `{last}`")));
    }
    args.truncate(n - 2);
    Ok(names)
}

fn parse_call(args: &[&str]) -> Result<Call, SyntaxErrorKind> {
    let Some((head, rest)) = args.split_first() else {
        return Err(invalid("empty expression".to_string()));
    };
    if split_hash(head).is_some() {
        return Err(invalid(format!("`{head}` is a hash argument without a helper")));
    }

    let mut params = Vec::new();
    let mut hash = Vec::new();
    for arg in rest {
        match split_hash(arg) {
            Some((key, value)) => hash.push((key.to_string(), parse_param(value)?)),
            None if hash.is_empty() => params.push(parse_param(arg)?),
            None => {
                return Err(invalid(format!(
                    "positional argument `{arg}` after hash arguments"
                )));
            }
        }
    }
    Ok(Call {
        name: head.to_string(),
        head: parse_param(head)?,
        params,
        hash,
    })
}

/// `key=value`, when the `=` comes before any quote or parenthesis.
fn split_hash(arg: &str) -> Option<(&str, &str)> {
    let eq = arg.find(['=', '"', '\'', '('])?;
    if !arg[eq..].starts_with('=') {
        return None;
    }
    let (key, value) = (&arg[..eq], &arg[eq + 1..]);
    let is_key = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '$');
    (is_key && !value.is_empty()).then_some((key, value))
}

fn unquote(arg: &str) -> Option<&str> {
    let quote = arg.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    (arg.len() >= 2 && arg.ends_with(quote)).then(|| &arg[1..arg.len() - 1])
}

fn parse_param(arg: &str) -> Result<Param, SyntaxErrorKind> {
    if let Some(inner) = arg.strip_prefix('(') {
        let inner = inner
            .strip_suffix(')')
            .ok_or_else(|| invalid(format!("malformed sub-expression `{arg}`")))?;
        let call = parse_call(&split_args(inner)?)?;
        return Ok(Param::SubExpr(Box::new(call)));
    }
    if let Some(s) = unquote(arg) {
        return Ok(Param::Literal(Value::Str(s.to_string())));
    }
    match arg {
        "true" => return Ok(Param::Literal(Value::Bool(true))),
        "false" => return Ok(Param::Literal(Value::Bool(false))),
        "null" | "undefined" => return Ok(Param::Literal(Value::Null)),
        _ => {}
    }
    if let Some(number) = parse_number(arg) {
        return Ok(Param::Literal(number));
    }
    Path::parse(arg)
        .map(Param::Path)
        .ok_or_else(|| invalid(format!("invalid path `{arg}`")))
}

fn parse_number(arg: &str) -> Option<Value> {
    let digits = arg.strip_prefix('-').unwrap_or(arg);
    if !digits.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    if let Ok(n) = arg.parse::<i64>() {
        return Some(Value::I64(n));
    }
    arg.parse::<f64>().ok().map(Value::F64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(raw: &str) -> Param {
        Param::Path(Path::parse(raw).unwrap())
    }

    fn kind(src: &str) -> SyntaxErrorKind {
        parse_template(src).unwrap_err().kind
    }

    #[test]
    fn test_parse_simple_text() {
        let nodes = parse_template("hello world").unwrap();
        assert_eq!(nodes, vec![Node::Text("hello world".to_string())]);
    }

    #[test]
    fn test_parse_merged_text() {
        // The escaped marker arrives as two text tokens.
        let nodes = parse_template(r"a \{{b}}").unwrap();
        assert_eq!(nodes, vec![Node::Text("a {{b}}".to_string())]);
    }

    #[test]
    fn test_parse_expression_arguments() {
        let nodes = parse_template(r#"{{fmt user.name "a b" 42 -1.5 true null key=(up x) n=1}}"#)
            .unwrap();
        let Node::Expression { call, escape } = &nodes[0] else {
            panic!("Expected Expression, got {:?}", nodes[0]);
        };
        assert!(*escape);
        assert_eq!(call.name, "fmt");
        assert_eq!(
            call.params,
            vec![
                path("user.name"),
                Param::Literal(Value::from("a b")),
                Param::Literal(Value::I64(42)),
                Param::Literal(Value::F64(-1.5)),
                Param::Literal(Value::Bool(true)),
                Param::Literal(Value::Null),
            ]
        );
        assert_eq!(call.hash[0].0, "key");
        let Param::SubExpr(sub) = &call.hash[0].1 else {
            panic!("Expected sub-expression");
        };
        assert_eq!(sub.name, "up");
        assert_eq!(sub.params, vec![path("x")]);
        assert_eq!(call.hash[1], ("n".to_string(), Param::Literal(Value::I64(1))));
    }

    #[test]
    fn test_parse_raw_expression() {
        let nodes = parse_template("{{{v}}}{{& w}}").unwrap();
        assert!(matches!(&nodes[0], Node::Expression { escape: false, .. }));
        assert!(matches!(&nodes[1], Node::Expression { escape: false, .. }));
    }

    #[test]
    fn test_parse_block_with_else() {
        let nodes = parse_template("{{#if x}}A{{else}}B{{/if}}").unwrap();
        let Node::Block(block) = &nodes[0] else {
            panic!("Expected Block");
        };
        assert_eq!(block.call.name, "if");
        assert_eq!(block.call.params, vec![path("x")]);
        assert_eq!(block.body, vec![Node::Text("A".to_string())]);
        assert_eq!(block.inverse, Some(vec![Node::Text("B".to_string())]));
    }

    #[test]
    fn test_parse_nested() {
        let nodes = parse_template("{{#if x}}{{#each list}}{{this}}{{/each}}{{/if}}").unwrap();
        let Node::Block(outer) = &nodes[0] else {
            panic!("Expected Block");
        };
        assert_eq!(outer.inverse, None);
        let Node::Block(inner) = &outer.body[0] else {
            panic!("Expected nested Block");
        };
        assert_eq!(inner.call.name, "each");
        assert_eq!(inner.body.len(), 1);
    }

    #[test]
    fn test_parse_inverse_section() {
        let nodes = parse_template("{{^items}}none{{else}}some{{/items}}").unwrap();
        let Node::Block(block) = &nodes[0] else {
            panic!("Expected Block");
        };
        assert_eq!(block.body, vec![Node::Text("some".to_string())]);
        assert_eq!(block.inverse, Some(vec![Node::Text("none".to_string())]));
    }

    #[test]
    fn test_parse_else_chain() {
        let nodes = parse_template("{{#if a}}A{{else if b}}B{{else}}C{{/if}}").unwrap();
        let Node::Block(block) = &nodes[0] else {
            panic!("Expected Block");
        };
        let inverse = block.inverse.as_ref().unwrap();
        let Node::Block(chained) = &inverse[0] else {
            panic!("Expected chained Block");
        };
        assert_eq!(chained.call.name, "if");
        assert_eq!(chained.call.params, vec![path("b")]);
        assert_eq!(chained.body, vec![Node::Text("B".to_string())]);
        assert_eq!(chained.inverse, Some(vec![Node::Text("C".to_string())]));
    }

    #[test]
    fn test_parse_block_params() {
        let nodes = parse_template("{{#each users as |user idx|}}{{user.name}}{{/each}}").unwrap();
        let Node::Block(block) = &nodes[0] else {
            panic!("Expected Block");
        };
        assert_eq!(block.block_params, vec!["user", "idx"]);
        assert_eq!(block.call.params, vec![path("users")]);
    }

    #[test]
    fn test_parse_partials() {
        let nodes = parse_template(r#"{{> header}}{{> "side-bar" user title="Hi"}}"#).unwrap();
        let Node::Partial(plain) = &nodes[0] else {
            panic!("Expected Partial");
        };
        assert_eq!(plain.name, "header");
        assert!(plain.context.is_none());
        let Node::Partial(full) = &nodes[1] else {
            panic!("Expected Partial");
        };
        assert_eq!(full.name, "side-bar");
        assert_eq!(full.context, Some(path("user")));
        assert_eq!(full.hash, vec![("title".to_string(), Param::Literal(Value::from("Hi")))]);
    }

    #[test]
    fn test_comments_produce_no_nodes() {
        let nodes = parse_template("a{{! note }}b{{!-- {{x}} --}}c").unwrap();
        assert_eq!(nodes, vec![Node::Text("abc".to_string())]);
    }

    #[test]
    fn test_block_errors() {
        assert_eq!(
            kind("{{#if x}}A{{/unless}}"),
            SyntaxErrorKind::MismatchedBlock {
                open: "if".to_string(),
                close: "unless".to_string()
            }
        );
        assert_eq!(
            kind("A{{/if}}"),
            SyntaxErrorKind::UnexpectedClose {
                name: "if".to_string()
            }
        );
        assert_eq!(
            kind("{{#each xs}}{{#if x}}{{/if}}"),
            SyntaxErrorKind::UnclosedBlock {
                name: "each".to_string()
            }
        );
        assert_eq!(
            kind("{{#if a}}{{else if b}}B"),
            SyntaxErrorKind::UnclosedBlock {
                name: "if".to_string()
            }
        );
    }

    #[test]
    fn test_misplaced_else() {
        assert_eq!(kind("{{else}}"), SyntaxErrorKind::MisplacedElse);
        assert_eq!(kind("{{#if a}}1{{else}}2{{else}}3{{/if}}"), SyntaxErrorKind::MisplacedElse);
    }

    #[test]
    fn test_invalid_expressions() {
        for src in [
            "{{}}",
            "{{a..b}}",
            "{{f x)}}",
            "{{f (g x}}",
            "{{f k=1 x}}",
            "{{k=1}}",
            "{{#each xs as |a}}{{/each}}",
            "{{#each xs |a|}}{{/each}}",
            "{{>}}",
        ] {
            assert!(
                matches!(kind(src), SyntaxErrorKind::InvalidExpression(_)),
                "{src} should be rejected"
            );
        }
    }

    #[test]
    fn test_nesting_limit() {
        let depth = MAX_NESTING + 1;
        let src = format!("{}x{}", "{{#if a}}".repeat(depth), "{{/if}}".repeat(depth));
        let err = parse_template(&src).unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::NestingTooDeep { limit: MAX_NESTING });
        assert_eq!(err.offset, MAX_NESTING * "{{#if a}}".len());

        let src = format!("{}x{}", "{{#if a}}".repeat(MAX_NESTING), "{{/if}}".repeat(MAX_NESTING));
        assert!(parse_template(&src).is_ok());

        let src = format!("{{{{f {}x{}}}}}", "(g ".repeat(depth), ")".repeat(depth));
        assert_eq!(kind(&src), SyntaxErrorKind::NestingTooDeep { limit: MAX_NESTING });

        // Every `else if` opens one more level.
        let src = format!("{{{{#if a}}}}{}{{{{/if}}}}", "{{else if b}}".repeat(MAX_NESTING));
        assert_eq!(kind(&src), SyntaxErrorKind::NestingTooDeep { limit: MAX_NESTING });
    }

    #[test]
    fn test_parse_partial_block() {
        let nodes = parse_template("{{#> layout title=t}}body {{x}}{{/layout}}").unwrap();
        let Node::Partial(partial) = &nodes[0] else {
            panic!("Expected Partial, got {:?}", nodes[0]);
        };
        assert_eq!(partial.name, "layout");
        assert_eq!(partial.hash, vec![("title".to_string(), path("t"))]);
        let block = partial.block.as_deref().unwrap();
        assert_eq!(block.len(), 2);
        assert_eq!(block[0], Node::Text("body ".to_string()));

        assert_eq!(
            kind("{{#> layout}}a{{/other}}"),
            SyntaxErrorKind::MismatchedBlock {
                open: "layout".to_string(),
                close: "other".to_string()
            }
        );
        assert_eq!(kind("{{#> layout}}a{{else}}b{{/layout}}"), SyntaxErrorKind::MisplacedElse);
    }

    #[test]
    fn test_parse_inline_partial() {
        let nodes = parse_template(r#"{{#*inline "row"}}<tr/>{{/inline}}{{> row}}"#).unwrap();
        let Node::Inline { name, body } = &nodes[0] else {
            panic!("Expected Inline, got {:?}", nodes[0]);
        };
        assert_eq!(name, "row");
        assert_eq!(&body[..], &[Node::Text("<tr/>".to_string())]);
        assert!(matches!(&nodes[1], Node::Partial(p) if p.name == "row"));

        for src in [
            "{{#*inline row}}x{{/inline}}",
            "{{#*inline}}x{{/inline}}",
            r#"{{#*other "x"}}x{{/other}}"#,
        ] {
            assert!(
                matches!(kind(src), SyntaxErrorKind::InvalidExpression(_)),
                "{src} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_raw_block() {
        let nodes = parse_template("{{{{raw}}}}{{x}}{{/y}}{{{{/raw}}}}").unwrap();
        let Node::Block(block) = &nodes[0] else {
            panic!("Expected Block, got {:?}", nodes[0]);
        };
        assert_eq!(block.call.name, "raw");
        assert_eq!(block.body, vec![Node::Text("{{x}}{{/y}}".to_string())]);
    }

    #[test]
    fn test_standalone_partial_indent() {
        let nodes = parse_template("<ul>\n  {{> item}}\n</ul>").unwrap();
        let Node::Partial(partial) = &nodes[1] else {
            panic!("Expected Partial, got {:?}", nodes[1]);
        };
        assert_eq!(partial.indent, "  ");
    }

    #[test]
    fn test_error_position() {
        let err = parse_template("line one\n  {{#if x}}").unwrap_err();
        assert_eq!((err.line, err.column), (2, 3));
    }
}
