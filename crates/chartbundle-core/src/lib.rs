//! Chartbundle Core - chart model and translation logic
//!
//! This crate turns a packaged chart into the list of artifacts a release
//! bundle needs:
//! - `Chart`: a loaded chart tree with its nested dependencies
//! - `images`: image references found in rendered manifests
//! - `crawl`: every chart in the dependency tree
//! - `filespec`: search patterns for the expected artifacts
//! - `reconcile`: expected versus found artifacts
//! - `translate`: the end-to-end flow over pluggable collaborators

pub mod archive;
pub mod chart;
pub mod crawl;
pub mod error;
pub mod filespec;
pub mod images;
pub mod reconcile;
pub mod translate;
pub mod values;

pub use archive::{load_archive, write_archive};
pub use chart::{Chart, ChartMetadata};
pub use crawl::crawl_dependencies;
pub use error::{CoreError, Result};
pub use filespec::{ArtifactKind, ExpectedArtifact, FileSpec, FileSpecEntry, FileSpecPlan, build_filespec};
pub use images::{extract_images, extract_images_from_text};
pub use reconcile::{Reconciliation, match_fragment, reconcile};
pub use translate::{
    ArtifactSearch, BoxError, BundleCreator, ChartSource, TemplateRenderer, TranslateError,
    TranslateRequest, TranslationReport, Translator, chart_repo_of, plan_chart,
};
pub use values::Values;
