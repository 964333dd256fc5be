use crate::error::{SyntaxError, SyntaxErrorKind};

/// A location in template source. Lines and columns start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Text,
    /// `{{expr}}`, including `{{else}}` which the parser interprets.
    Expression,
    /// `{{{expr}}}` or `{{& expr}}`
    RawExpression,
    /// `{{#name ...}}`
    BlockOpen,
    /// `{{^name ...}}`
    InverseOpen,
    /// `{{/name}}`
    BlockClose,
    /// `{{> name ...}}`
    Partial,
    /// `{{! ...}}` and `{{!-- ... --}}`
    Comment,
}

/// One lexical unit. `content` is the literal text for `Text` tokens and the
/// marker body with its sigil and delimiters removed for everything else.
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'s> {
    pub kind: TokenKind,
    pub content: &'s str,
    pub position: Position,
    /// `{{~`: strip whitespace at the end of the preceding text.
    pub trim_before: bool,
    /// `~}}`: strip whitespace at the start of the following text.
    pub trim_after: bool,
    /// Leading whitespace of a partial that stands alone on its line.
    pub indent: &'s str,
}

impl Token<'_> {
    pub fn is_else(&self) -> bool {
        self.kind == TokenKind::Expression
            && (self.content == "else" || self.content.starts_with("else "))
    }

    /// Markers that vanish together with their line when alone on it.
    fn may_stand_alone(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::BlockOpen
                | TokenKind::InverseOpen
                | TokenKind::BlockClose
                | TokenKind::Comment
                | TokenKind::Partial
        ) || self.is_else()
    }
}

/// Splits template source into text runs and markers.
///
/// Scans left to right once. `\{{` produces a literal `{{`; `\\{{` produces a
/// single backslash followed by a live marker.
pub fn tokenize(source: &str) -> Result<Vec<Token<'_>>, SyntaxError> {
    let mut lexer = Lexer {
        src: source,
        tokens: Vec::new(),
        cursor: Position {
            line: 1,
            column: 1,
            offset: 0,
        },
    };
    lexer.run()?;

    let mut tokens = lexer.tokens;
    strip_standalone(&mut tokens);
    apply_trim_markers(&mut tokens);
    tokens.retain(|t| t.kind != TokenKind::Text || !t.content.is_empty());
    Ok(tokens)
}

struct Lexer<'s> {
    src: &'s str,
    tokens: Vec<Token<'s>>,
    /// Position of the last offset handed to `position_at`; only moves forward.
    cursor: Position,
}

impl<'s> Lexer<'s> {
    fn run(&mut self) -> Result<(), SyntaxError> {
        let mut text_start = 0;
        let mut search_from = 0;

        while let Some(found) = self.src[search_from..].find("{{") {
            let open = search_from + found;
            let backslashes = self.src.as_bytes()[text_start..open]
                .iter()
                .rev()
                .take_while(|b| **b == b'\\')
                .count();
            if backslashes > 0 {
                // The backslash right before `{{` is consumed. A lone one
                // escapes the marker; after another backslash the marker stays live.
                self.push_text(text_start, open - 1);
                if backslashes == 1 {
                    text_start = open;
                    search_from = open + self.src[open..].len()
                        - self.src[open..].trim_start_matches('{').len();
                    continue;
                }
            } else {
                self.push_text(text_start, open);
            }
            let end = if self.src[open..].starts_with("{{{{") {
                self.lex_raw_block(open)?
            } else {
                self.lex_marker(open)?
            };
            text_start = end;
            search_from = end;
        }
        self.push_text(text_start, self.src.len());
        Ok(())
    }

    fn push_text(&mut self, start: usize, end: usize) {
        if start < end {
            let src = self.src;
            let position = self.position_at(start);
            self.tokens.push(Token {
                kind: TokenKind::Text,
                content: &src[start..end],
                position,
                trim_before: false,
                trim_after: false,
                indent: "",
            });
        }
    }

    /// Lexes `{{{{name args}}}}verbatim{{{{/name}}}}` into a block whose body
    /// is a single text token, and returns the offset just past it.
    fn lex_raw_block(&mut self, open: usize) -> Result<usize, SyntaxError> {
        let src = self.src;
        let position = self.position_at(open);
        let unterminated = || SyntaxError::new(SyntaxErrorKind::UnterminatedMarker, position);

        let head_start = open + 4;
        let head_len = src[head_start..].find("}}}}").ok_or_else(unterminated)?;
        let head = src[head_start..head_start + head_len].trim();
        let name = head.split_whitespace().next().unwrap_or("");
        let body_start = head_start + head_len + 4;

        let mut search = body_start;
        let (body_end, end) = loop {
            let found = src[search..].find("{{{{/").ok_or_else(|| {
                SyntaxError::new(
                    SyntaxErrorKind::UnclosedBlock {
                        name: name.to_string(),
                    },
                    position,
                )
            })?;
            let close = search + found;
            let rest = &src[close + 5..];
            match rest.find("}}}}") {
                Some(n) if rest[..n].trim() == name => break (close, close + 5 + n + 4),
                _ => search = close + 5,
            }
        };

        self.tokens.push(Token {
            kind: TokenKind::BlockOpen,
            content: head,
            position,
            trim_before: false,
            trim_after: false,
            indent: "",
        });
        self.push_text(body_start, body_end);
        let close_position = self.position_at(body_end);
        self.tokens.push(Token {
            kind: TokenKind::BlockClose,
            content: name,
            position: close_position,
            trim_before: false,
            trim_after: false,
            indent: "",
        });
        Ok(end)
    }

    /// Lexes the marker opening at `open` and returns the offset just past it.
    fn lex_marker(&mut self, open: usize) -> Result<usize, SyntaxError> {
        let src = self.src;
        let position = self.position_at(open);
        let unterminated = || SyntaxError::new(SyntaxErrorKind::UnterminatedMarker, position);

        let mut start = open + 2;
        let mut trim_before = src[start..].starts_with('~');
        if trim_before {
            start += 1;
        }
        let rest = &src[start..];

        let (kind, content, trim_after, end) = if let Some(body) = rest.strip_prefix("!--") {
            // Long comments may contain `}}`.
            let body_start = start + 3;
            let (close, matched) = find_first(body, &["--~}}", "--}}"]).ok_or_else(unterminated)?;
            (
                TokenKind::Comment,
                &body[..close],
                matched.contains('~'),
                body_start + close + matched.len(),
            )
        } else if rest.starts_with('{') {
            // Both `{{~{x}~}}` and `{{{~x~}}}` are accepted.
            let mut body_start = start + 1;
            if src[body_start..].starts_with('~') {
                trim_before = true;
                body_start += 1;
            }
            let (close, matched) = find_close(&src[body_start..], &["~}}}", "}~}}", "}}}"])
                .ok_or_else(unterminated)?;
            (
                TokenKind::RawExpression,
                src[body_start..body_start + close].trim(),
                matched.contains('~'),
                body_start + close + matched.len(),
            )
        } else if rest.trim_start().starts_with('!') {
            let (close, matched) = find_first(rest, &["~}}", "}}"]).ok_or_else(unterminated)?;
            let body = rest[..close].trim_start();
            (
                TokenKind::Comment,
                &body[1..],
                matched.contains('~'),
                start + close + matched.len(),
            )
        } else {
            let (close, matched) = find_close(rest, &["~}}", "}}"]).ok_or_else(unterminated)?;
            let body = rest[..close].trim();
            let (kind, content) = classify(body);
            (kind, content, matched.contains('~'), start + close + matched.len())
        };

        self.tokens.push(Token {
            kind,
            content,
            position,
            trim_before,
            trim_after,
            indent: "",
        });
        Ok(end)
    }

    fn position_at(&mut self, offset: usize) -> Position {
        for c in self.src[self.cursor.offset..offset].chars() {
            if c == '\n' {
                self.cursor.line += 1;
                self.cursor.column = 1;
            } else {
                self.cursor.column += 1;
            }
        }
        self.cursor.offset = offset;
        self.cursor
    }
}

/// Classifies a marker body by its head sigil.
fn classify(body: &str) -> (TokenKind, &str) {
    let Some(sigil) = body.chars().next() else {
        return (TokenKind::Expression, body);
    };
    let rest = body[sigil.len_utf8()..].trim_start();
    match sigil {
        '#' => (TokenKind::BlockOpen, rest),
        '/' => (TokenKind::BlockClose, rest),
        '>' => (TokenKind::Partial, rest),
        '&' => (TokenKind::RawExpression, rest),
        '^' if rest.is_empty() => (TokenKind::Expression, "else"),
        '^' => (TokenKind::InverseOpen, rest),
        _ => (TokenKind::Expression, body),
    }
}

/// Earliest occurrence of any of `patterns` in `s`; quotes are not special here.
fn find_first<'p>(s: &str, patterns: &[&'p str]) -> Option<(usize, &'p str)> {
    patterns
        .iter()
        .filter_map(|p| s.find(*p).map(|i| (i, *p)))
        .min_by_key(|(i, _)| *i)
}

/// Finds the closing delimiter of a marker, skipping over quoted string literals.
fn find_close<'p>(s: &str, closers: &[&'p str]) -> Option<(usize, &'p str)> {
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None => {
                if let Some(closer) = closers
                    .iter()
                    .copied()
                    .find(|closer| s[i..].starts_with(*closer))
                {
                    return Some((i, closer));
                }
            }
        }
    }
    None
}

/// Removes lines that contain nothing but a block, else, comment or partial
/// marker. A standalone partial remembers the indentation it sat at.
///
/// Standalone status is decided on the untouched text first so that adjacent
/// standalone markers do not affect each other.
fn strip_standalone(tokens: &mut [Token<'_>]) {
    let last = tokens.len().saturating_sub(1);
    let mut cut_end = vec![false; tokens.len()];
    let mut cut_start = vec![false; tokens.len()];

    for i in 0..tokens.len() {
        if !tokens[i].may_stand_alone() {
            continue;
        }
        let before_ok = i == 0 || {
            let prev = &tokens[i - 1];
            prev.kind == TokenKind::Text && {
                let tail = prev.content.rsplit('\n').next().unwrap_or("");
                is_inline_space(tail) && (prev.content.contains('\n') || i - 1 == 0)
            }
        };
        let after_ok = i == last || {
            let next = &tokens[i + 1];
            next.kind == TokenKind::Text && {
                let head = next.content.split('\n').next().unwrap_or("");
                let head = head.strip_suffix('\r').unwrap_or(head);
                is_inline_space(head) && (next.content.contains('\n') || i + 1 == last)
            }
        };
        if before_ok && after_ok {
            if i > 0 {
                cut_end[i - 1] = true;
                if tokens[i].kind == TokenKind::Partial {
                    let prev = tokens[i - 1].content;
                    tokens[i].indent = &prev[prev.rfind('\n').map(|n| n + 1).unwrap_or(0)..];
                }
            }
            if i < last {
                cut_start[i + 1] = true;
            }
        }
    }

    for (i, token) in tokens.iter_mut().enumerate() {
        if token.kind != TokenKind::Text || !(cut_start[i] || cut_end[i]) {
            continue;
        }
        let text = token.content;
        let start = if cut_start[i] {
            text.find('\n').map(|n| n + 1).unwrap_or(text.len())
        } else {
            0
        };
        let end = if cut_end[i] {
            text.rfind('\n').map(|n| n + 1).unwrap_or(0)
        } else {
            text.len()
        };
        token.content = if start < end { &text[start..end] } else { "" };
    }
}

/// Applies `{{~` and `~}}` to neighbouring text tokens.
fn apply_trim_markers(tokens: &mut [Token<'_>]) {
    for i in 0..tokens.len() {
        if tokens[i].kind == TokenKind::Text {
            continue;
        }
        if tokens[i].trim_before && i > 0 && tokens[i - 1].kind == TokenKind::Text {
            tokens[i - 1].content = tokens[i - 1].content.trim_end();
        }
        if tokens[i].trim_after && i + 1 < tokens.len() && tokens[i + 1].kind == TokenKind::Text {
            tokens[i + 1].content = tokens[i + 1].content.trim_start();
        }
    }
}

fn is_inline_space(s: &str) -> bool {
    s.chars().all(|c| c == ' ' || c == '\t')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<(TokenKind, String)> {
        tokenize(src)
            .unwrap()
            .into_iter()
            .map(|t| (t.kind, t.content.to_string()))
            .collect()
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(
            kinds("hello\nworld"),
            vec![(TokenKind::Text, "hello\nworld".to_string())]
        );
        assert!(tokenize("").unwrap().is_empty());
    }

    #[test]
    fn test_marker_kinds() {
        let tokens = kinds("a{{ name }}{{#if x}}{{/if}}{{> p ctx}}{{! note }}{{{raw}}}{{& amp}}{{^}}{{^ none}}");
        assert_eq!(
            tokens,
            vec![
                (TokenKind::Text, "a".to_string()),
                (TokenKind::Expression, "name".to_string()),
                (TokenKind::BlockOpen, "if x".to_string()),
                (TokenKind::BlockClose, "if".to_string()),
                (TokenKind::Partial, "p ctx".to_string()),
                (TokenKind::Comment, " note ".to_string()),
                (TokenKind::RawExpression, "raw".to_string()),
                (TokenKind::RawExpression, "amp".to_string()),
                (TokenKind::Expression, "else".to_string()),
                (TokenKind::InverseOpen, "none".to_string()),
            ]
        );
    }

    #[test]
    fn test_long_comment_may_contain_braces() {
        assert_eq!(
            kinds("a{{!-- {{x}} --}}b"),
            vec![
                (TokenKind::Text, "a".to_string()),
                (TokenKind::Comment, " {{x}} ".to_string()),
                (TokenKind::Text, "b".to_string()),
            ]
        );
    }

    #[test]
    fn test_quoted_braces_do_not_close() {
        assert_eq!(
            kinds(r#"{{lookup this "}}"}}"#),
            vec![(TokenKind::Expression, r#"lookup this "}}""#.to_string())]
        );
    }

    #[test]
    fn test_escaped_marker() {
        assert_eq!(
            kinds(r"a\{{b}}c"),
            vec![
                (TokenKind::Text, "a".to_string()),
                (TokenKind::Text, "{{b}}c".to_string()),
            ]
        );
    }

    #[test]
    fn test_backslash_runs_before_marker() {
        assert_eq!(
            kinds(r"a\\{{b}}"),
            vec![
                (TokenKind::Text, r"a\".to_string()),
                (TokenKind::Expression, "b".to_string()),
            ]
        );
        assert_eq!(
            kinds(r"\\\{{b}}"),
            vec![
                (TokenKind::Text, r"\\".to_string()),
                (TokenKind::Expression, "b".to_string()),
            ]
        );
        // A backslash away from `{{` is plain text.
        assert_eq!(kinds(r"a\b \\ c"), vec![(TokenKind::Text, r"a\b \\ c".to_string())]);
    }

    #[test]
    fn test_escaped_raw_block_is_text() {
        let tokens = tokenize(r"\{{{{raw}}}}x\{{{{/raw}}}}").unwrap();
        assert!(tokens.iter().all(|t| t.kind == TokenKind::Text));
        let text: String = tokens.iter().map(|t| t.content).collect();
        assert_eq!(text, "{{{{raw}}}}x{{{{/raw}}}}");
    }

    #[test]
    fn test_raw_block_body_is_verbatim() {
        assert_eq!(
            kinds("a{{{{raw}}}} {{x}} {{#if y}}{{{{/raw}}}}b"),
            vec![
                (TokenKind::Text, "a".to_string()),
                (TokenKind::BlockOpen, "raw".to_string()),
                (TokenKind::Text, " {{x}} {{#if y}}".to_string()),
                (TokenKind::BlockClose, "raw".to_string()),
                (TokenKind::Text, "b".to_string()),
            ]
        );
        // Closers of another name stay in the body.
        assert_eq!(
            kinds("{{{{raw}}}}{{{{/other}}}}{{{{/raw}}}}"),
            vec![
                (TokenKind::BlockOpen, "raw".to_string()),
                (TokenKind::Text, "{{{{/other}}}}".to_string()),
                (TokenKind::BlockClose, "raw".to_string()),
            ]
        );
        let err = tokenize("{{{{raw}}}} open").unwrap_err();
        assert_eq!(
            err.kind,
            SyntaxErrorKind::UnclosedBlock {
                name: "raw".to_string()
            }
        );
        let err = tokenize("{{{{raw}} x").unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::UnterminatedMarker);
    }

    #[test]
    fn test_unterminated_marker() {
        let err = tokenize("line\n  {{name").unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::UnterminatedMarker);
        assert_eq!((err.line, err.column, err.offset), (2, 3, 7));

        let err = tokenize("{{{raw}}").unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::UnterminatedMarker);
        let err = tokenize("{{!-- open").unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::UnterminatedMarker);
    }

    #[test]
    fn test_positions() {
        let tokens = tokenize("ab\ncd{{x}}\n{{y}}").unwrap();
        let x = tokens.iter().find(|t| t.content == "x").unwrap();
        let y = tokens.iter().find(|t| t.content == "y").unwrap();
        assert_eq!(x.position, Position { line: 2, column: 3, offset: 5 });
        assert_eq!(y.position, Position { line: 3, column: 1, offset: 11 });
    }

    #[test]
    fn test_trim_markers() {
        assert_eq!(
            kinds("a  {{~x~}}  \n b"),
            vec![
                (TokenKind::Text, "a".to_string()),
                (TokenKind::Expression, "x".to_string()),
                (TokenKind::Text, "b".to_string()),
            ]
        );
        let tokens = tokenize("a {{{~ raw ~}}} b").unwrap();
        assert_eq!(tokens[1].kind, TokenKind::RawExpression);
        assert_eq!(tokens[1].content, "raw");
        assert!(tokens[1].trim_before && tokens[1].trim_after);
        assert_eq!(tokens[2].content, "b");
    }

    #[test]
    fn test_standalone_lines_are_removed() {
        assert_eq!(
            kinds("<ul>\n  {{#each xs}}\n  <li/>\n  {{/each}}\n</ul>"),
            vec![
                (TokenKind::Text, "<ul>\n".to_string()),
                (TokenKind::BlockOpen, "each xs".to_string()),
                (TokenKind::Text, "  <li/>\n".to_string()),
                (TokenKind::BlockClose, "each".to_string()),
                (TokenKind::Text, "</ul>".to_string()),
            ]
        );
    }

    #[test]
    fn test_standalone_partial_keeps_indent() {
        let tokens = tokenize("<ul>\n  {{> item}}\n</ul>").unwrap();
        let partial = tokens.iter().find(|t| t.kind == TokenKind::Partial).unwrap();
        assert_eq!(partial.indent, "  ");
        let texts: Vec<&str> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Text)
            .map(|t| t.content)
            .collect();
        assert_eq!(texts, vec!["<ul>\n", "</ul>"]);

        // Partials sharing a line with other content are left alone.
        let tokens = tokenize("<p>{{> item}}</p>\n").unwrap();
        assert_eq!(tokens[1].indent, "");
        assert_eq!(tokens[0].content, "<p>");
    }

    #[test]
    fn test_inline_blocks_keep_whitespace() {
        assert_eq!(
            kinds("x {{#if a}} y {{/if}} z"),
            vec![
                (TokenKind::Text, "x ".to_string()),
                (TokenKind::BlockOpen, "if a".to_string()),
                (TokenKind::Text, " y ".to_string()),
                (TokenKind::BlockClose, "if".to_string()),
                (TokenKind::Text, " z".to_string()),
            ]
        );
    }
}
