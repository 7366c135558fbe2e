//! Chartbundle Engine - renders chart trees with MiniJinja
//!
//! This crate renders every template of a loaded chart and its bundled
//! sub-charts with:
//! - Helm charts written in Go template syntax, converted to MiniJinja
//!   before rendering (`define`/`include` shared across the whole tree)
//! - Helm-compatible filters (toyaml, b64encode, nindent, etc.)
//! - Per sub-chart value scoping (`global` plus the sub-chart's own section)
//! - Error diagnostics pointing at the failing template line

pub mod context;
pub mod engine;
pub mod error;
pub mod filters;
pub mod functions;
pub mod gotemplate;

pub use context::{ChartInfo, ReleaseInfo, RenderContext};
pub use engine::{Engine, EngineBuilder, RenderResult, TemplateSyntax};
pub use error::{EngineError, Result, TemplateError, TemplateErrorKind};
pub use filters::AVAILABLE_FILTERS;
