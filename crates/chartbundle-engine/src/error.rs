//! Engine error types

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::filters::AVAILABLE_FILTERS;
use crate::gotemplate::ParseError;

/// Main engine error type
#[derive(Error, Debug, Diagnostic)]
pub enum EngineError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Template(#[from] TemplateError),
}

/// Error kind for categorizing template errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TemplateErrorKind {
    UndefinedVariable,
    UnknownFilter,
    UnknownFunction,
    SyntaxError,
    TypeError,
    InvalidOperation,
    Other,
}

impl TemplateErrorKind {
    /// Convert to a code string for diagnostics
    pub fn to_code_string(&self) -> &'static str {
        match self {
            Self::UndefinedVariable => "undefined_variable",
            Self::UnknownFilter => "unknown_filter",
            Self::UnknownFunction => "unknown_function",
            Self::SyntaxError => "syntax",
            Self::TypeError => "type",
            Self::InvalidOperation => "invalid_operation",
            Self::Other => "render",
        }
    }
}

/// Template-specific error with source information
#[derive(Error, Debug, Diagnostic, Clone)]
#[error("{message}")]
#[diagnostic(code(chartbundle::template::render))]
pub struct TemplateError {
    /// Error message
    pub message: String,

    /// Error kind for categorization
    pub kind: TemplateErrorKind,

    /// Template source code
    #[source_code]
    pub src: NamedSource<String>,

    /// Error location in source
    #[label("error occurred here")]
    pub span: Option<SourceSpan>,

    /// Suggestion for fixing the error
    #[help]
    pub suggestion: Option<String>,
}

impl TemplateError {
    /// Create a template error from a MiniJinja error
    pub fn from_minijinja(err: minijinja::Error, template_name: &str, template_source: &str) -> Self {
        let (kind, message) = categorize_minijinja_error(&err);
        let span = err
            .line()
            .and_then(|line_num| calculate_span(template_source, line_num));
        let suggestion = generate_suggestion(&err, kind);

        Self {
            message: format!("{}: {}", template_name, message),
            kind,
            src: NamedSource::new(template_name, template_source.to_string()),
            span,
            suggestion,
        }
    }

    /// Create a template error from a Go template parse failure
    pub fn from_parse(err: ParseError, template_name: &str, template_source: &str) -> Self {
        let offset = err.offset.min(template_source.len());
        let width = template_source
            .get(offset..)
            .map(|rest| rest.find('\n').unwrap_or(rest.len()))
            .unwrap_or(0)
            .max(1);

        Self {
            message: format!("{}: {}", template_name, err.message),
            kind: TemplateErrorKind::SyntaxError,
            src: NamedSource::new(template_name, template_source.to_string()),
            span: Some(SourceSpan::new(offset.into(), width)),
            suggestion: Some("Check that every `{{` has a matching `}}` and every block its `{{ end }}`".to_string()),
        }
    }

    /// Create a simple error without source mapping
    pub fn simple(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: TemplateErrorKind::Other,
            src: NamedSource::new("<unknown>", String::new()),
            span: None,
            suggestion: None,
        }
    }

    /// Add a suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> TemplateErrorKind {
        self.kind
    }
}

/// Categorize a MiniJinja error into our error kinds
fn categorize_minijinja_error(err: &minijinja::Error) -> (TemplateErrorKind, String) {
    let msg = err.to_string();
    let detailed = format!("{:#}", err);

    let kind = match err.kind() {
        minijinja::ErrorKind::UndefinedError => TemplateErrorKind::UndefinedVariable,
        minijinja::ErrorKind::UnknownFilter => TemplateErrorKind::UnknownFilter,
        minijinja::ErrorKind::UnknownFunction => TemplateErrorKind::UnknownFunction,
        minijinja::ErrorKind::SyntaxError => TemplateErrorKind::SyntaxError,
        minijinja::ErrorKind::InvalidOperation => TemplateErrorKind::InvalidOperation,
        minijinja::ErrorKind::NonPrimitive | minijinja::ErrorKind::NonKey => {
            TemplateErrorKind::TypeError
        }
        _ => TemplateErrorKind::Other,
    };

    // MiniJinja's alternate display shows: "   8 >   typo: {{ value.app.name }}"
    let enhanced_msg = match kind {
        TemplateErrorKind::UndefinedVariable => match extract_expression_from_display(&detailed) {
            Some(expr) => format!("undefined variable `{}`", expr),
            None => msg.replace("undefined value", "undefined variable"),
        },
        TemplateErrorKind::UnknownFilter => match extract_filter_from_display(&detailed) {
            Some(filter) => format!("unknown filter `{}`", filter),
            None => msg,
        },
        _ => msg
            .replace("invalid operation: ", "")
            .replace("syntax error: ", "")
            .replace("undefined value", "undefined variable"),
    };

    (kind, enhanced_msg)
}

/// The `{{ ... }}` expression on the line marked `>`, without filters
fn extract_expression_from_display(display: &str) -> Option<String> {
    display
        .lines()
        .filter(|line| is_error_line(line))
        .find_map(|line| {
            let expr = expression_on_line(line)?;
            let expr = expr.split('|').next().unwrap_or(expr).trim();
            (!expr.is_empty()).then(|| expr.to_string())
        })
}

/// The last filter applied on the line marked `>`
fn extract_filter_from_display(display: &str) -> Option<String> {
    display
        .lines()
        .filter(|line| is_error_line(line))
        .find_map(|line| {
            let expr = expression_on_line(line)?;
            let (_, filter) = expr.rsplit_once('|')?;
            let name = filter.split_whitespace().next()?;
            let name = name.split('(').next().unwrap_or(name);
            (!name.is_empty()).then(|| name.to_string())
        })
}

fn is_error_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.contains(" > ") || trimmed.starts_with("> ")
}

fn expression_on_line(line: &str) -> Option<&str> {
    let start = line.find("{{")?;
    let end = line[start..].find("}}")?;
    Some(line[start + 2..start + end].trim())
}

/// Calculate the source span for a given line number
fn calculate_span(source: &str, line_num: usize) -> Option<SourceSpan> {
    let mut offset = 0;

    for (index, line) in source.lines().enumerate() {
        if index + 1 == line_num {
            return Some(SourceSpan::new(offset.into(), line.len()));
        }
        offset += line.len() + 1;
    }

    None
}

fn generate_suggestion(err: &minijinja::Error, kind: TemplateErrorKind) -> Option<String> {
    let msg = err.to_string();

    match kind {
        TemplateErrorKind::UndefinedVariable => {
            let detailed = format!("{:#}", err);
            match extract_expression_from_display(&detailed) {
                Some(var) if var == "value" || var.starts_with("value.") => Some(format!(
                    "Did you mean `{}`? Use `values` (plural) to access the values object.",
                    var.replacen("value", "values", 1)
                )),
                Some(var) => Some(format!(
                    "Variable `{}` is not defined. Check spelling or use `| default(\"fallback\")`.",
                    var
                )),
                None => Some("Variable is not defined. Check spelling or use the `default` filter.".to_string()),
            }
        }
        TemplateErrorKind::UnknownFilter => Some(format!(
            "Available filters: {}",
            AVAILABLE_FILTERS.join(", ")
        )),
        TemplateErrorKind::SyntaxError if msg.contains('}') || msg.contains('%') => Some(
            "Check bracket matching: `{{ }}` for expressions, `{% %}` for statements, `{# #}` for comments"
                .to_string(),
        ),
        TemplateErrorKind::SyntaxError => {
            Some("Syntax error. Check for missing closing tags or mismatched brackets.".to_string())
        }
        _ => None,
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
