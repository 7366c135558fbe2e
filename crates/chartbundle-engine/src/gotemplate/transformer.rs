//! Go template to MiniJinja transformer
//!
//! Go templates evaluate everything against a moving "dot". The output keeps
//! that model: the dot lives in `_dot`, `$` in `_root`, and `range`, `with`
//! and `define` rebind `_dot` the way Go does.
//!
//! | Helm (Go template)                 | MiniJinja                                  |
//! |------------------------------------|--------------------------------------------|
//! | `{{ .Values.image.tag }}`          | `{{ _dot.Values.image.tag }}`              |
//! | `{{ .Values.x \| default "a" }}`   | `{{ (_dot.Values.x or "a") }}`             |
//! | `{{ printf "%s:%s" .a .b }}`       | `{{ (_dot.a ~ ":" ~ _dot.b) }}`            |
//! | `{{- range .Values.list }}`        | `{% for _key, _dot in range_pairs(...) %}` |
//! | `{{ include "app.name" . }}`       | `{{ tpl_app_name(_dot) }}`                 |
//!
//! `define` bodies are emitted separately as macros so that every template
//! of a chart tree can call them, as Helm shares defines across the tree.

use phf::phf_map;

use super::ast::*;
use super::parser::ParseError;

/// Variable holding the current dot
pub const DOT: &str = "_dot";
/// Variable holding `$`
pub const ROOT: &str = "_root";

/// Helm functions that map to a MiniJinja filter applied to their last argument
static FILTER_MAP: phf::Map<&'static str, &'static str> = phf_map! {
    "toYaml" => "toyaml",
    "toJson" => "tojson",
    "toPrettyJson" => "tojson",
    "toString" => "string",
    "quote" => "quote",
    "squote" => "squote",
    "indent" => "indent",
    "nindent" => "nindent",
    "trunc" => "trunc",
    "trim" => "trim",
    "trimAll" => "trim",
    "trimPrefix" => "trimprefix",
    "trimSuffix" => "trimsuffix",
    "upper" => "upper",
    "lower" => "lower",
    "title" => "title",
    "replace" => "replace",
    "b64enc" => "b64encode",
    "sha256sum" => "sha256sum",
    "required" => "required",
    "int" => "int",
    "int64" => "int",
    "float64" => "float",
    "first" => "first",
    "last" => "last",
    "join" => "join",
    "splitList" => "split",
    "uniq" => "unique",
    "sortAlpha" => "sort",
};

/// Comparison and arithmetic helpers that become infix operators
static OPERATORS: phf::Map<&'static str, &'static str> = phf_map! {
    "eq" => "==",
    "ne" => "!=",
    "lt" => "<",
    "le" => "<=",
    "gt" => ">",
    "ge" => ">=",
    "add" => "+",
    "sub" => "-",
    "mul" => "*",
    "div" => "//",
    "mod" => "%",
};

/// One template after conversion
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Converted {
    /// The template with its defines removed
    pub body: String,
    /// Macro definitions for every `define` and `block`
    pub macros: String,
    /// Names of the macros in `macros`
    pub defines: Vec<String>,
}

#[derive(Debug)]
enum Block {
    If,
    Range,
    With { has_else: bool },
    /// A `define`, or a `block` whose call is emitted at its end
    Define { call: Option<String> },
}

/// A transformed argument, keeping the raw text of string literals
struct Arg {
    expr: String,
    literal: Option<String>,
}

/// Transformer for converting a Go template AST to MiniJinja
#[derive(Default)]
pub struct Transformer {
    out: Converted,
    blocks: Vec<(Block, usize)>,
    in_define: bool,
}

impl Transformer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transform a parsed template
    pub fn transform(mut self, template: &Template) -> Result<Converted, ParseError> {
        for node in &template.nodes {
            match node {
                Node::Text(text) => {
                    let text = escape_text(text);
                    self.emit(&text);
                }
                Node::Action(action) => self.action(action)?,
            }
        }

        match self.blocks.last() {
            Some((_, offset)) => Err(ParseError::new("unexpected EOF: missing {{ end }}", *offset)),
            None => Ok(self.out),
        }
    }

    fn emit(&mut self, text: &str) {
        if self.in_define {
            self.out.macros.push_str(text);
        } else {
            self.out.body.push_str(text);
        }
    }

    fn action(&mut self, action: &Action) -> Result<(), ParseError> {
        let offset = action.offset;
        match &action.kind {
            ActionKind::Comment(_) => {}

            ActionKind::If(pipeline) => {
                let cond = self.pipeline(pipeline);
                self.emit(&format!("{{% if {} %}}", cond));
                self.blocks.push((Block::If, offset));
            }

            ActionKind::ElseIf(pipeline) => match self.blocks.last() {
                Some((Block::If, _)) => {
                    let cond = self.pipeline(pipeline);
                    self.emit(&format!("{{% elif {} %}}", cond));
                }
                _ => return Err(ParseError::new("unexpected {{ else if }}", offset)),
            },

            ActionKind::ElseWith(_) => {
                return Err(ParseError::new("{{ else with }} is not supported", offset));
            }

            ActionKind::Else => match self.blocks.last_mut() {
                Some((Block::If, _)) | Some((Block::Range, _)) => self.emit("{% else %}"),
                Some((Block::With { has_else }, _)) if !*has_else => {
                    *has_else = true;
                    self.emit("{% endwith %}{% else %}");
                }
                _ => return Err(ParseError::new("unexpected {{ else }}", offset)),
            },

            ActionKind::End => match self.blocks.pop() {
                Some((Block::If, _)) => self.emit("{% endif %}"),
                Some((Block::Range, _)) => self.emit("{% endfor %}"),
                Some((Block::With { has_else: true }, _)) => self.emit("{% endif %}"),
                Some((Block::With { has_else: false }, _)) => self.emit("{% endwith %}{% endif %}"),
                Some((Block::Define { call }, _)) => {
                    self.emit("{% endmacro %}");
                    self.in_define = false;
                    if let Some(call) = call {
                        self.emit(&call);
                    }
                }
                None => return Err(ParseError::new("unexpected {{ end }}", offset)),
            },

            ActionKind::Range { vars, pipeline } => {
                let collection = self.pipeline(pipeline);
                let (key, value) = match vars.as_slice() {
                    [] => (None, None),
                    [value] => (None, Some(value)),
                    [key, value, ..] => (Some(key), Some(value)),
                };
                let key = key.map(|k| variable(k)).unwrap_or_else(|| "_key".to_string());
                self.emit(&format!(
                    "{{% for {}, {} in range_pairs({}) %}}",
                    key, DOT, collection
                ));
                if let Some(value) = value {
                    self.emit(&format!("{{% set {} = {} %}}", variable(value), DOT));
                }
                self.blocks.push((Block::Range, offset));
            }

            ActionKind::With(pipeline) => {
                let value = self.pipeline(&Pipeline {
                    decl: Vec::new(),
                    commands: pipeline.commands.clone(),
                });
                self.emit(&format!(
                    "{{% if {value} %}}{{% with {dot} = {value} %}}",
                    value = value,
                    dot = DOT
                ));
                if let Some(name) = pipeline.decl.first() {
                    self.emit(&format!("{{% set {} = {} %}}", variable(name), DOT));
                }
                self.blocks.push((Block::With { has_else: false }, offset));
            }

            ActionKind::Define(name) => {
                self.open_define(name, None, offset)?;
            }

            ActionKind::Block { name, arg } => {
                let call = format!("{{{{ {}({}) }}}}", macro_name(name), self.pipeline(arg));
                self.open_define(name, Some(call), offset)?;
            }

            ActionKind::Template { name, arg } => {
                let arg = match arg {
                    Some(pipeline) => self.pipeline(pipeline),
                    None => "none".to_string(),
                };
                self.emit(&format!("{{{{ {}({}) }}}}", macro_name(name), arg));
            }

            ActionKind::Break => self.emit("{% break %}"),
            ActionKind::Continue => self.emit("{% continue %}"),

            ActionKind::Output(pipeline) => {
                let value = self.pipeline(&Pipeline {
                    decl: Vec::new(),
                    commands: pipeline.commands.clone(),
                });
                match pipeline.decl.first() {
                    Some(name) => self.emit(&format!("{{% set {} = {} %}}", variable(name), value)),
                    None => self.emit(&format!("{{{{ {} }}}}", value)),
                }
            }
        }
        Ok(())
    }

    fn open_define(&mut self, name: &str, call: Option<String>, offset: usize) -> Result<(), ParseError> {
        if self.in_define {
            return Err(ParseError::new("unexpected define inside a define", offset));
        }
        self.in_define = true;
        self.out.defines.push(macro_name(name));
        self.emit(&format!(
            "{{% macro {}({}) %}}{{% set {} = {} %}}",
            macro_name(name),
            DOT,
            ROOT,
            DOT
        ));
        self.blocks.push((Block::Define { call }, offset));
        Ok(())
    }

    /// A pipeline as one expression; each stage receives the previous
    /// result as its last argument
    fn pipeline(&self, pipeline: &Pipeline) -> String {
        let mut piped: Option<String> = None;
        for command in &pipeline.commands {
            piped = Some(self.command(command, piped.take()));
        }
        piped.unwrap_or_else(|| "none".to_string())
    }

    fn command(&self, command: &Command, piped: Option<String>) -> String {
        match command {
            Command::Call { name, args } => {
                let mut args: Vec<Arg> = args.iter().map(|a| self.arg(a)).collect();
                if let Some(expr) = piped {
                    args.push(Arg { expr, literal: None });
                }
                self.call(name, args)
            }
            Command::Method {
                receiver,
                method,
                args,
            } => {
                if method == "Has"
                    && let Some(arg) = args.first()
                {
                    return format!("({} in {})", self.operand(arg), self.operand(receiver));
                }
                tracing::debug!(method = %method, "unsupported method call rendered empty");
                "\"\"".to_string()
            }
            Command::Value(operand) => self.operand(operand),
        }
    }

    fn arg(&self, operand: &Operand) -> Arg {
        let literal = match operand {
            Operand::Literal(Literal::Str(s)) => Some(s.clone()),
            _ => None,
        };
        Arg {
            expr: self.operand(operand),
            literal,
        }
    }

    fn operand(&self, operand: &Operand) -> String {
        match operand {
            Operand::Field(path) => with_path(DOT, path),
            Operand::Root(path) => with_path(ROOT, path),
            Operand::Variable { name, path } => with_path(&variable(name), path),
            Operand::Literal(literal) => transform_literal(literal),
            Operand::Ident(name) => self.call(name, Vec::new()),
            Operand::Group { pipeline, path } => {
                with_path(&format!("({})", self.pipeline(pipeline)), path)
            }
        }
    }

    /// Helm function call with already transformed arguments
    fn call(&self, name: &str, args: Vec<Arg>) -> String {
        let exprs: Vec<String> = args.iter().map(|a| a.expr.clone()).collect();

        if let Some(op) = OPERATORS.get(name) {
            return match exprs.as_slice() {
                [] => "none".to_string(),
                [only] => only.clone(),
                [first, rest @ ..] if name == "eq" => {
                    let alternatives: Vec<String> =
                        rest.iter().map(|r| format!("{} == {}", first, r)).collect();
                    format!("({})", alternatives.join(" or "))
                }
                all => format!("({})", all.join(&format!(" {} ", op))),
            };
        }

        if let Some(filter) = FILTER_MAP.get(name) {
            return match exprs.split_last() {
                Some((subject, [])) => format!("({} | {})", subject, filter),
                Some((subject, rest)) => format!("({} | {}({}))", subject, filter, rest.join(", ")),
                None => "none".to_string(),
            };
        }

        match (name, exprs.as_slice()) {
            ("and", all) if !all.is_empty() => format!("({})", all.join(" and ")),
            ("or", all) | ("coalesce", all) if !all.is_empty() => format!("({})", all.join(" or ")),
            ("not", [value]) => format!("(not {})", value),
            ("empty", [value]) => format!("(not {})", value),
            ("default", [fallback, value]) => format!("({} or {})", value, fallback),
            ("default", [fallback]) => fallback.clone(),
            ("ternary", [yes, no, cond]) => format!("({} if {} else {})", yes, cond, no),
            ("index", [base, keys @ ..]) => {
                let keys: String = keys.iter().map(|k| format!("[{}]", k)).collect();
                format!("{}{}", base, keys)
            }
            ("hasKey", [map, key]) => format!("({} in {})", key, map),
            ("contains", [needle, haystack]) => format!("({} in {})", needle, haystack),
            ("hasPrefix", [prefix, s]) => format!("({} is startingwith({}))", s, prefix),
            ("hasSuffix", [suffix, s]) => format!("({} is endingwith({}))", s, suffix),
            ("len", [value]) => format!("({} | length)", value),
            ("add1", [value]) => format!("({} + 1)", value),
            ("max", all) if all.len() > 1 => format!("([{}] | max)", all.join(", ")),
            ("min", all) if all.len() > 1 => format!("([{}] | min)", all.join(", ")),
            ("list", all) => format!("[{}]", all.join(", ")),
            ("dict", all) => {
                let pairs: Vec<String> = all
                    .chunks(2)
                    .map(|pair| match pair {
                        [k, v] => format!("{}: {}", k, v),
                        [k] => format!("{}: none", k),
                        _ => String::new(),
                    })
                    .collect();
                format!("{{{}}}", pairs.join(", "))
            }
            ("print", all) if !all.is_empty() => format!("({})", all.join(" ~ ")),
            ("println", all) => format!("({} ~ \"\\n\")", all.join(" ~ ")),
            ("printf", _) => self.printf(&args),
            ("include", _) | ("template", _) => include(&args),
            ("tpl", [template, context]) => format!("tpl({}, {})", template, context),
            ("fail", [message]) => format!("fail({})", message),
            ("semverCompare", [constraint, version]) => {
                format!("semver_compare({}, {})", constraint, version)
            }
            ("lookup", _) => "{}".to_string(),
            ("until", [n]) => format!("range({})", n),
            (other, all) => format!("{}({})", other, all.join(", ")),
        }
    }

    /// `printf` as string concatenation
    fn printf(&self, args: &[Arg]) -> String {
        let Some((format, values)) = args.split_first() else {
            return "\"\"".to_string();
        };
        let Some(format) = &format.literal else {
            return format.expr.clone();
        };

        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut values = values.iter();
        let mut chars = format.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '%' {
                literal.push(c);
                continue;
            }
            match chars.next() {
                Some('%') => literal.push('%'),
                Some(_) => {
                    if !literal.is_empty() {
                        parts.push(quote_str(&literal));
                        literal.clear();
                    }
                    if let Some(value) = values.next() {
                        parts.push(value.expr.clone());
                    }
                }
                None => literal.push('%'),
            }
        }
        if !literal.is_empty() {
            parts.push(quote_str(&literal));
        }

        match parts.len() {
            0 => "\"\"".to_string(),
            _ => format!("({})", parts.join(" ~ ")),
        }
    }
}

/// `include "name" arg`; a computed name cannot be resolved ahead of time
fn include(args: &[Arg]) -> String {
    let Some(name) = args.first().and_then(|a| a.literal.as_deref()) else {
        tracing::debug!("include with a computed template name rendered empty");
        return "\"\"".to_string();
    };
    let arg = args
        .get(1)
        .map(|a| a.expr.clone())
        .unwrap_or_else(|| "none".to_string());
    format!("{}({})", macro_name(name), arg)
}

/// Macro name for a Helm define, e.g. `app.fullname` to `tpl_app_fullname`
pub fn macro_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("tpl_{}", sanitized)
}

fn variable(name: &str) -> String {
    format!("v_{}", name)
}

fn with_path(base: &str, path: &[String]) -> String {
    path.iter().fold(base.to_string(), |acc, key| format!("{}.{}", acc, key))
}

fn transform_literal(literal: &Literal) -> String {
    match literal {
        Literal::Str(s) => quote_str(s),
        Literal::Int(n) => n.to_string(),
        Literal::Float(f) => format!("{:?}", f),
        Literal::Bool(b) => b.to_string(),
        Literal::Nil => "none".to_string(),
    }
}

fn quote_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Plain text that would read as MiniJinja syntax is wrapped in a raw block
fn escape_text(text: &str) -> String {
    if text.contains("{%") || text.contains("{#") || text.ends_with('{') {
        format!("{{% raw %}}{}{{% endraw %}}", text)
    } else {
        text.to_string()
    }
}
