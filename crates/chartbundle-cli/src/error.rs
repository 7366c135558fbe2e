//! CLI error types with exit code handling
//!
//! Every failure of a command is turned into a `CliError`, which knows the
//! exit code to report and renders through miette.

use chartbundle_core::{CoreError, TranslateError};
use chartbundle_engine::EngineError;
use chartbundle_repo::RepoError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// Invalid option value or server configuration
    #[error("{message}")]
    #[diagnostic(code(chartbundle::cli::validation))]
    Validation {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Chart rendering failed
    #[error(transparent)]
    #[diagnostic(transparent)]
    Template(#[from] EngineError),

    /// Chart archive could not be loaded
    #[error("{message}")]
    #[diagnostic(code(chartbundle::cli::chart))]
    Chart {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Artifactory or Distribution request failed
    #[error("{message}")]
    #[diagnostic(code(chartbundle::cli::server))]
    Server {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(chartbundle::cli::io))]
    Io { message: String },

    /// Anything else
    #[error("{message}")]
    #[diagnostic(code(chartbundle::cli::error))]
    Other { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Validation { .. } => exit_codes::VALIDATION_ERROR,
            CliError::Template(_) => exit_codes::TEMPLATE_ERROR,
            CliError::Chart { .. } => exit_codes::CHART_ERROR,
            CliError::Server { .. } => exit_codes::SERVER_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Other { .. } => exit_codes::ERROR,
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            help: None,
        }
    }

    /// Create a validation error with help text
    pub fn validation_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a server error
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
            help: None,
        }
    }

    /// Create an IO error naming the file involved
    pub fn io_at(path: impl std::fmt::Display, err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{}: {}", path, err),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        CliError::Chart {
            message: err.to_string(),
            help: Some("A chart archive is a gzipped tar holding <chart>/Chart.yaml".to_string()),
        }
    }
}

impl From<RepoError> for CliError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::InvalidConfig { .. } | RepoError::ReservedServerId { .. } => {
                CliError::validation(err.to_string())
            }
            RepoError::ServerNotFound { .. } => CliError::validation_with_help(
                err.to_string(),
                "Run 'chartbundle config show' to list configured servers",
            ),
            RepoError::AuthRequired { .. } | RepoError::AuthFailed { .. } => CliError::Server {
                message: err.to_string(),
                help: Some(
                    "Check --user/--password, --apikey or --access-token for this server"
                        .to_string(),
                ),
            },
            RepoError::Io(e) => CliError::from(e),
            _ => CliError::server(err.to_string()),
        }
    }
}

impl From<TranslateError> for CliError {
    fn from(err: TranslateError) -> Self {
        match err {
            TranslateError::InvalidChartPath { .. } => CliError::validation_with_help(
                err.to_string(),
                "Example: --chart-path helm-local/charts/app-1.0.0.tgz",
            ),
            TranslateError::Load { path, source } => CliError::Chart {
                message: format!("Failed to load chart {}: {}", path, source),
                help: None,
            },
            TranslateError::Render(source) => match source.downcast::<EngineError>() {
                Ok(engine) => CliError::Template(*engine),
                Err(other) => CliError::Other {
                    message: other.to_string(),
                },
            },
            TranslateError::Fetch { .. } | TranslateError::Bundle(_) | TranslateError::Search(_) => {
                CliError::server(err.to_string())
            }
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
