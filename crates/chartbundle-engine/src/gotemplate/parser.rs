//! Go template parser
//!
//! Splits a Helm template into text and `{{ }}` actions, then parses each
//! action with a small recursive-descent parser over a token stream.

use thiserror::Error;

use super::ast::*;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Parser error
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    /// Byte offset in the template source
    pub offset: usize,
}

impl ParseError {
    pub(crate) fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

pub type Result<T> = std::result::Result<T, ParseError>;

/// Parse a Go template string into an AST
///
/// Trim markers are applied to the neighbouring text while parsing, so
/// the returned text nodes are exactly what Go would print around them.
pub fn parse(source: &str) -> Result<Template> {
    let mut nodes = Vec::new();
    let mut pos = 0;
    let mut trim_next = false;

    while let Some(found) = source[pos..].find(OPEN) {
        let start = pos + found;
        let (action, end) = parse_action(source, start)?;

        let mut text = &source[pos..start];
        if trim_next {
            text = text.trim_start();
        }
        if action.trim_left {
            text = text.trim_end();
        }
        if !text.is_empty() {
            nodes.push(Node::Text(text.to_string()));
        }

        trim_next = action.trim_right;
        pos = end;
        nodes.push(Node::Action(action));
    }

    let mut text = &source[pos..];
    if trim_next {
        text = text.trim_start();
    }
    if !text.is_empty() {
        nodes.push(Node::Text(text.to_string()));
    }

    Ok(Template { nodes })
}

/// Parse the action opening at `start`; returns it with the offset past `}}`
fn parse_action(source: &str, start: usize) -> Result<(Action, usize)> {
    let mut pos = start + OPEN.len();
    let bytes = source.as_bytes();

    let trim_left = bytes.get(pos) == Some(&b'-')
        && bytes.get(pos + 1).is_some_and(|b| b.is_ascii_whitespace());
    if trim_left {
        pos += 1;
    }

    let body_start = pos + (source[pos..].len() - source[pos..].trim_start().len());
    if source[body_start..].starts_with("/*") {
        return parse_comment(source, start, body_start, trim_left);
    }

    let (tokens, trim_right, end) = Lexer::new(source, pos, start).action_tokens()?;

    let kind = ActionParser {
        tokens,
        pos: 0,
        offset: start,
    }
    .action()?;

    Ok((
        Action {
            trim_left,
            trim_right,
            kind,
            offset: start,
        },
        end,
    ))
}

fn parse_comment(
    source: &str,
    start: usize,
    body_start: usize,
    trim_left: bool,
) -> Result<(Action, usize)> {
    let text_start = body_start + 2;
    let close = source[text_start..]
        .find("*/")
        .ok_or_else(|| ParseError::new("unclosed comment", start))?;
    let text = source[text_start..text_start + close].to_string();

    let after = text_start + close + 2;
    let rest = &source[after..];
    let (trim_right, skip) = if let Some(r) = rest.strip_prefix(" -}}") {
        (true, rest.len() - r.len())
    } else if let Some(r) = rest.strip_prefix(CLOSE) {
        (false, rest.len() - r.len())
    } else {
        return Err(ParseError::new("comment ends before closing delimiter", start));
    };

    Ok((
        Action {
            trim_left,
            trim_right,
            kind: ActionKind::Comment(text),
            offset: start,
        },
        after + skip,
    ))
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// `.` or `.a.b`
    Field(Vec<String>),
    /// `$`, `$x`, `$x.a`; the name is empty for `$`
    Variable(String, Vec<String>),
    Ident(String),
    Str(String),
    Number(String),
    /// `.a.b` glued to a closing parenthesis
    Chain(Vec<String>),
    Pipe,
    LParen,
    RParen,
    Comma,
    Declare,
    Assign,
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    /// Offset of the enclosing `{{`
    start: usize,
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str, pos: usize, start: usize) -> Self {
        Self { src, pos, start }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let rest = self.rest();
        let len = rest.find(|c: char| !pred(c)).unwrap_or(rest.len());
        self.pos += len;
        &rest[..len]
    }

    /// Tokens up to the closing delimiter, whether it trims, and the end offset
    fn action_tokens(&mut self) -> Result<(Vec<(Token, usize)>, bool, usize)> {
        let mut tokens = Vec::new();
        loop {
            let before = self.pos;
            self.take_while(char::is_whitespace);
            let spaced = self.pos > before;
            let at = self.pos;
            let rest = self.rest();

            if rest.starts_with(CLOSE) {
                return Ok((tokens, false, at + CLOSE.len()));
            }
            if spaced && rest.starts_with("-}}") {
                return Ok((tokens, true, at + 3));
            }

            let Some(c) = self.peek() else {
                return Err(ParseError::new("unclosed action", self.start));
            };

            let token = match c {
                '.' => {
                    let path = self.field_path();
                    match tokens.last() {
                        Some((Token::RParen, _)) if !spaced => Token::Chain(path),
                        _ => Token::Field(path),
                    }
                }
                '$' => {
                    self.pos += 1;
                    let name = self.take_while(is_ident_char).to_string();
                    let path = if self.peek() == Some('.') {
                        self.field_path()
                    } else {
                        Vec::new()
                    };
                    Token::Variable(name, path)
                }
                '"' => Token::Str(self.quoted(at)?),
                '`' => Token::Str(self.raw_string(at)?),
                '\'' => Token::Str(self.char_literal(at)?),
                '|' => {
                    self.pos += 1;
                    Token::Pipe
                }
                '(' => {
                    self.pos += 1;
                    Token::LParen
                }
                ')' => {
                    self.pos += 1;
                    Token::RParen
                }
                ',' => {
                    self.pos += 1;
                    Token::Comma
                }
                ':' if rest.starts_with(":=") => {
                    self.pos += 2;
                    Token::Declare
                }
                '=' => {
                    self.pos += 1;
                    Token::Assign
                }
                c if c.is_ascii_digit() || ((c == '-' || c == '+') && self.signed_number()) => {
                    self.pos += c.len_utf8();
                    let digits = self.take_while(|c| c.is_alphanumeric() || c == '.' || c == '_');
                    Token::Number(format!("{}{}", c, digits))
                }
                c if c.is_alphabetic() || c == '_' => {
                    Token::Ident(self.take_while(is_ident_char).to_string())
                }
                other => {
                    return Err(ParseError::new(format!("unexpected character `{}` in action", other), at));
                }
            };
            tokens.push((token, at));
        }
    }

    fn signed_number(&self) -> bool {
        self.rest()[1..].starts_with(|c: char| c.is_ascii_digit())
    }

    /// `.a.b` (or a lone `.`), consuming every segment
    fn field_path(&mut self) -> Vec<String> {
        let mut path = Vec::new();
        while self.peek() == Some('.') {
            let next = self.rest()[1..].chars().next();
            if !next.is_some_and(is_ident_char) {
                self.pos += 1;
                break;
            }
            self.pos += 1;
            path.push(self.take_while(is_ident_char).to_string());
        }
        path
    }

    fn quoted(&mut self, at: usize) -> Result<String> {
        self.pos += 1;
        let mut out = String::new();
        let mut chars = self.rest().char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos += i + 1;
                    return Ok(out);
                }
                '\\' => match chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, 'r')) => out.push('\r'),
                    Some((_, other)) => out.push(other),
                    None => break,
                },
                '\n' => break,
                c => out.push(c),
            }
        }
        Err(ParseError::new("unterminated quoted string", at))
    }

    fn raw_string(&mut self, at: usize) -> Result<String> {
        self.pos += 1;
        let rest = self.rest();
        let end = rest
            .find('`')
            .ok_or_else(|| ParseError::new("unterminated raw string", at))?;
        self.pos += end + 1;
        Ok(rest[..end].to_string())
    }

    fn char_literal(&mut self, at: usize) -> Result<String> {
        self.pos += 1;
        let rest = self.rest();
        let end = rest
            .find('\'')
            .ok_or_else(|| ParseError::new("unterminated character constant", at))?;
        self.pos += end + 1;
        Ok(rest[..end].to_string())
    }
}

struct ActionParser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    /// Offset of the action, for errors without a token
    offset: usize,
}

impl ActionParser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.pos + ahead).map(|(t, _)| t)
    }

    fn here(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|(_, offset)| *offset)
            .unwrap_or(self.offset)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        self.pos += 1;
        token
    }

    fn error<T>(&self, message: impl Into<String>) -> Result<T> {
        Err(ParseError::new(message, self.here()))
    }

    fn keyword(&self) -> Option<&str> {
        match self.peek() {
            Some(Token::Ident(name)) => Some(name.as_str()),
            _ => None,
        }
    }

    fn action(mut self) -> Result<ActionKind> {
        if self.tokens.is_empty() {
            return self.error("missing value for command");
        }

        let kind = match self.keyword() {
            Some("if") => {
                self.pos += 1;
                ActionKind::If(self.pipeline()?)
            }
            Some("else") => {
                self.pos += 1;
                match self.keyword() {
                    Some("if") => {
                        self.pos += 1;
                        ActionKind::ElseIf(self.pipeline()?)
                    }
                    Some("with") => {
                        self.pos += 1;
                        ActionKind::ElseWith(self.pipeline()?)
                    }
                    _ => ActionKind::Else,
                }
            }
            Some("end") => {
                self.pos += 1;
                ActionKind::End
            }
            Some("break") => {
                self.pos += 1;
                ActionKind::Break
            }
            Some("continue") => {
                self.pos += 1;
                ActionKind::Continue
            }
            Some("range") => {
                self.pos += 1;
                let vars = self.range_vars();
                ActionKind::Range {
                    vars,
                    pipeline: self.pipeline()?,
                }
            }
            Some("with") => {
                self.pos += 1;
                ActionKind::With(self.pipeline()?)
            }
            Some("define") => {
                self.pos += 1;
                ActionKind::Define(self.name("define")?)
            }
            Some("template") => {
                self.pos += 1;
                let name = self.name("template")?;
                let arg = match self.peek() {
                    Some(_) => Some(self.pipeline()?),
                    None => None,
                };
                ActionKind::Template { name, arg }
            }
            Some("block") => {
                self.pos += 1;
                let name = self.name("block")?;
                ActionKind::Block {
                    name,
                    arg: self.pipeline()?,
                }
            }
            _ => ActionKind::Output(self.pipeline()?),
        };

        match self.peek() {
            None => Ok(kind),
            Some(_) => self.error("unexpected token after action"),
        }
    }

    fn name(&mut self, keyword: &str) -> Result<String> {
        match self.next() {
            Some(Token::Str(name)) => Ok(name),
            _ => {
                self.pos -= 1;
                self.error(format!("{} requires a quoted template name", keyword))
            }
        }
    }

    /// `$v :=` or `$i, $v :=` ahead of a range pipeline
    fn range_vars(&mut self) -> Vec<String> {
        let mut vars = Vec::new();
        let mut ahead = 0;
        loop {
            match self.peek_at(ahead) {
                Some(Token::Variable(name, path)) if !name.is_empty() && path.is_empty() => {
                    vars.push(name.clone());
                }
                _ => return Vec::new(),
            }
            match self.peek_at(ahead + 1) {
                Some(Token::Comma) => ahead += 2,
                Some(Token::Declare) | Some(Token::Assign) => {
                    self.pos += ahead + 2;
                    return vars;
                }
                _ => return Vec::new(),
            }
        }
    }

    fn pipeline(&mut self) -> Result<Pipeline> {
        let declared = match (self.peek(), self.peek_at(1)) {
            (Some(Token::Variable(name, path)), Some(Token::Declare | Token::Assign))
                if !name.is_empty() && path.is_empty() =>
            {
                Some(name.clone())
            }
            _ => None,
        };
        let mut decl = Vec::new();
        if let Some(name) = declared {
            decl.push(name);
            self.pos += 2;
        }

        let mut commands = vec![self.command()?];
        while self.peek() == Some(&Token::Pipe) {
            self.pos += 1;
            commands.push(self.command()?);
        }

        Ok(Pipeline { decl, commands })
    }

    fn at_command_end(&self) -> bool {
        matches!(self.peek(), None | Some(Token::Pipe) | Some(Token::RParen))
    }

    fn command(&mut self) -> Result<Command> {
        if self.at_command_end() {
            return self.error("missing value for command");
        }

        let function = match self.peek() {
            Some(Token::Ident(name)) if !matches!(name.as_str(), "true" | "false" | "nil") => {
                Some(name.clone())
            }
            _ => None,
        };
        if let Some(name) = function {
            self.pos += 1;
            let args = self.operands()?;
            return Ok(Command::Call { name, args });
        }

        let head = self.operand()?;
        let args = self.operands()?;
        if args.is_empty() {
            return Ok(Command::Value(head));
        }

        match split_method(head) {
            Some((receiver, method)) => Ok(Command::Method {
                receiver,
                method,
                args,
            }),
            None => self.error("can't give argument to non-function"),
        }
    }

    fn operands(&mut self) -> Result<Vec<Operand>> {
        let mut args = Vec::new();
        while !self.at_command_end() {
            args.push(self.operand()?);
        }
        Ok(args)
    }

    fn operand(&mut self) -> Result<Operand> {
        let at = self.here();
        match self.next() {
            Some(Token::Field(path)) => Ok(Operand::Field(path)),
            Some(Token::Variable(name, path)) if name.is_empty() => Ok(Operand::Root(path)),
            Some(Token::Variable(name, path)) => Ok(Operand::Variable { name, path }),
            Some(Token::Str(s)) => Ok(Operand::Literal(Literal::Str(s))),
            Some(Token::Number(n)) => parse_number(&n)
                .map(Operand::Literal)
                .ok_or_else(|| ParseError::new(format!("invalid number `{}`", n), at)),
            Some(Token::Ident(name)) => Ok(match name.as_str() {
                "true" => Operand::Literal(Literal::Bool(true)),
                "false" => Operand::Literal(Literal::Bool(false)),
                "nil" => Operand::Literal(Literal::Nil),
                _ => Operand::Ident(name),
            }),
            Some(Token::LParen) => {
                let pipeline = self.pipeline()?;
                if self.next() != Some(Token::RParen) {
                    return Err(ParseError::new("unclosed left paren", at));
                }
                let path = match self.peek() {
                    Some(Token::Chain(path)) => {
                        let path = path.clone();
                        self.pos += 1;
                        path
                    }
                    _ => Vec::new(),
                };
                Ok(Operand::Group {
                    pipeline: Box::new(pipeline),
                    path,
                })
            }
            _ => Err(ParseError::new("unexpected token in operand", at)),
        }
    }
}

/// `.Capabilities.APIVersions.Has` into the receiver and `Has`
fn split_method(head: Operand) -> Option<(Operand, String)> {
    match head {
        Operand::Field(mut path) => {
            let method = path.pop()?;
            Some((Operand::Field(path), method))
        }
        Operand::Root(mut path) => {
            let method = path.pop()?;
            Some((Operand::Root(path), method))
        }
        Operand::Variable { name, mut path } => {
            let method = path.pop()?;
            Some((Operand::Variable { name, path }, method))
        }
        _ => None,
    }
}

fn parse_number(text: &str) -> Option<Literal> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let digits = digits.replace('_', "");

    let radix = [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)]
        .iter()
        .find_map(|(prefix, radix)| digits.strip_prefix(prefix).map(|d| (d.to_string(), *radix)));

    let value = match radix {
        Some((body, radix)) => Literal::Int(i64::from_str_radix(&body, radix).ok()?),
        None if digits.contains(['.', 'e', 'E']) => Literal::Float(digits.parse().ok()?),
        None => Literal::Int(digits.parse().ok()?),
    };

    Some(match (negative, value) {
        (true, Literal::Int(n)) => Literal::Int(-n),
        (true, Literal::Float(f)) => Literal::Float(-f),
        (_, other) => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_action(source: &str) -> Action {
        let template = parse(source).unwrap();
        match template.nodes.as_slice() {
            [Node::Action(action)] => action.clone(),
            other => panic!("expected one action, got {:?}", other),
        }
    }

    fn output(source: &str) -> Pipeline {
        match single_action(source).kind {
            ActionKind::Output(pipeline) => pipeline,
            other => panic!("expected output, got {:?}", other),
        }
    }

    #[test]
    fn test_field_access() {
        let pipeline = output("{{ .Values.image.tag }}");
        assert_eq!(
            pipeline.commands,
            vec![Command::Value(Operand::Field(vec![
                "Values".into(),
                "image".into(),
                "tag".into()
            ]))]
        );
    }

    #[test]
    fn test_trim_markers_eat_neighbouring_whitespace() {
        let template = parse("a:  \n  {{- .Values.x -}}  \n b").unwrap();
        assert_eq!(template.nodes.len(), 3);
        assert_eq!(template.nodes[0], Node::Text("a:".to_string()));
        assert_eq!(template.nodes[2], Node::Text("b".to_string()));
    }

    #[test]
    fn test_dash_without_space_is_a_number() {
        let pipeline = output("{{-3}}");
        assert_eq!(pipeline.commands, vec![Command::Value(Operand::Literal(Literal::Int(-3)))]);
    }

    #[test]
    fn test_pipeline_with_call_arguments() {
        let pipeline = output("{{ .Values.name | default \"app\" | quote }}");
        assert_eq!(pipeline.commands.len(), 3);
        assert_eq!(
            pipeline.commands[1],
            Command::Call {
                name: "default".to_string(),
                args: vec![Operand::Literal(Literal::Str("app".to_string()))]
            }
        );
    }

    #[test]
    fn test_variable_declaration() {
        let pipeline = output("{{ $tag := .Values.tag | toString }}");
        assert_eq!(pipeline.decl, vec!["tag".to_string()]);
        assert_eq!(pipeline.commands.len(), 2);
    }

    #[test]
    fn test_range_with_key_and_value() {
        match single_action("{{- range $name, $svc := .Values.services }}").kind {
            ActionKind::Range { vars, pipeline } => {
                assert_eq!(vars, vec!["name".to_string(), "svc".to_string()]);
                assert_eq!(pipeline.commands.len(), 1);
            }
            other => panic!("expected range, got {:?}", other),
        }
    }

    #[test]
    fn test_define_and_include() {
        assert_eq!(
            single_action("{{- define \"app.fullname\" -}}").kind,
            ActionKind::Define("app.fullname".to_string())
        );

        let pipeline = output("{{ include \"app.fullname\" . | nindent 4 }}");
        assert_eq!(
            pipeline.commands[0],
            Command::Call {
                name: "include".to_string(),
                args: vec![
                    Operand::Literal(Literal::Str("app.fullname".to_string())),
                    Operand::Field(vec![])
                ]
            }
        );
    }

    #[test]
    fn test_nested_parentheses_and_root() {
        let pipeline = output("{{ and (eq $.Values.a \"x\") (or .b .c) }}");
        match &pipeline.commands[0] {
            Command::Call { name, args } => {
                assert_eq!(name, "and");
                assert_eq!(args.len(), 2);
                assert!(matches!(&args[0], Operand::Group { .. }));
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_method_call_on_capabilities() {
        let pipeline = output("{{ .Capabilities.APIVersions.Has \"apps/v1\" }}");
        assert_eq!(
            pipeline.commands[0],
            Command::Method {
                receiver: Operand::Field(vec!["Capabilities".into(), "APIVersions".into()]),
                method: "Has".to_string(),
                args: vec![Operand::Literal(Literal::Str("apps/v1".to_string()))]
            }
        );
    }

    #[test]
    fn test_comment_with_trim() {
        let template = parse("a\n{{- /* note */ -}}\nb").unwrap();
        assert_eq!(template.nodes[0], Node::Text("a".to_string()));
        assert!(matches!(
            &template.nodes[1],
            Node::Action(Action { kind: ActionKind::Comment(text), .. }) if text.trim() == "note"
        ));
        assert_eq!(template.nodes[2], Node::Text("b".to_string()));
    }

    #[test]
    fn test_braces_inside_strings() {
        let pipeline = output("{{ printf \"{{%s}}\" .x }}");
        assert_eq!(
            pipeline.commands[0],
            Command::Call {
                name: "printf".to_string(),
                args: vec![
                    Operand::Literal(Literal::Str("{{%s}}".to_string())),
                    Operand::Field(vec!["x".into()])
                ]
            }
        );
    }

    #[test]
    fn test_unclosed_action_reports_offset() {
        let err = parse("ok\nimage: {{ .Values.image").unwrap_err();
        assert_eq!(err.offset, 10);
        assert!(err.message.contains("unclosed action"));
    }

    #[test]
    fn test_argument_to_literal_is_rejected() {
        let err = parse("{{ \"a\" \"b\" }}").unwrap_err();
        assert!(err.message.contains("non-function"));
    }
}
