//! Syntax tree for Helm (Go `text/template`) sources

/// A parsed template file
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub nodes: Vec<Node>,
}

/// Text outside of `{{ }}`, or one action
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Action(Action),
}

/// One `{{ ... }}` action with its trim markers
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    /// `{{-`
    pub trim_left: bool,
    /// `-}}`
    pub trim_right: bool,
    pub kind: ActionKind,
    /// Byte offset of the opening `{{` in the source
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    Comment(String),
    If(Pipeline),
    ElseIf(Pipeline),
    ElseWith(Pipeline),
    Else,
    End,
    /// `range [$i, $v :=] pipeline`
    Range {
        vars: Vec<String>,
        pipeline: Pipeline,
    },
    With(Pipeline),
    Define(String),
    /// `template "name" [pipeline]`
    Template {
        name: String,
        arg: Option<Pipeline>,
    },
    /// `block "name" pipeline`, a define invoked in place
    Block {
        name: String,
        arg: Pipeline,
    },
    Break,
    Continue,
    /// Anything that prints or declares a variable
    Output(Pipeline),
}

/// Commands joined by `|`, with an optional `$x :=` declaration
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub decl: Vec<String>,
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `name arg...`
    Call { name: String, args: Vec<Operand> },
    /// `.Receiver.Method arg...`
    Method {
        receiver: Operand,
        method: String,
        args: Vec<Operand>,
    },
    Value(Operand),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// `.` or `.a.b`, relative to the current dot
    Field(Vec<String>),
    /// `$` or `$.a.b`
    Root(Vec<String>),
    /// `$name` or `$name.a.b`
    Variable { name: String, path: Vec<String> },
    Literal(Literal),
    /// A function named in argument position, called without arguments
    Ident(String),
    /// `(pipeline)` optionally followed by `.a.b`
    Group { pipeline: Box<Pipeline>, path: Vec<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Nil,
}

impl Pipeline {
    pub fn of(command: Command) -> Self {
        Self {
            decl: Vec::new(),
            commands: vec![command],
        }
    }
}
