//! Chart to release bundle translation
//!
//! The translation itself is pure; downloading the chart, rendering its
//! templates, creating the bundle and searching the artifact store are
//! delegated to the collaborators below. Each step is awaited before the
//! next one starts.

use async_trait::async_trait;
use indexmap::IndexMap;
use thiserror::Error;

use crate::archive::load_archive;
use crate::chart::Chart;
use crate::crawl::crawl_dependencies;
use crate::error::CoreError;
use crate::filespec::{FileSpec, FileSpecPlan, build_filespec};
use crate::images::extract_images;
use crate::reconcile::{Reconciliation, reconcile};
use crate::values::Values;

/// Error type returned by collaborators
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Fetches packaged chart archives
#[async_trait]
pub trait ChartSource: Send + Sync {
    async fn fetch_chart(&self, path: &str) -> Result<Vec<u8>, BoxError>;
}

/// Renders a chart tree to manifests keyed by template path
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, chart: &Chart, values: &Values) -> Result<IndexMap<String, String>, BoxError>;
}

/// Searches the artifact store, returning matching repository paths
#[async_trait]
pub trait ArtifactSearch: Send + Sync {
    async fn search(&self, spec: &FileSpec) -> Result<Vec<String>, BoxError>;
}

/// Assembles a release bundle from a file specification
#[async_trait]
pub trait BundleCreator: Send + Sync {
    async fn create_bundle(&self, spec: &FileSpec) -> Result<(), BoxError>;
}

/// Translation failure, by stage
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("Invalid chart path '{path}': expected <repository>/<path to chart>")]
    InvalidChartPath { path: String },

    #[error("Failed to download chart {path}: {source}")]
    Fetch {
        path: String,
        #[source]
        source: BoxError,
    },

    #[error("Failed to load chart {path}: {source}")]
    Load {
        path: String,
        #[source]
        source: CoreError,
    },

    #[error("{0}")]
    Render(#[source] BoxError),

    #[error("Failed to create release bundle: {0}")]
    Bundle(#[source] BoxError),

    #[error("Failed to search artifacts: {0}")]
    Search(#[source] BoxError),
}

/// What to translate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslateRequest {
    /// `<chart repository>/<path>/<chart>.tgz`
    pub chart_path: String,

    /// Repository holding the chart's images
    pub docker_repo: String,

    /// Skip release bundle creation
    pub dry_run: bool,
}

impl TranslateRequest {
    /// Repository holding the chart and its dependencies
    ///
    /// This is the first segment of the chart path.
    pub fn chart_repo(&self) -> Result<&str, TranslateError> {
        chart_repo_of(&self.chart_path).ok_or_else(|| TranslateError::InvalidChartPath {
            path: self.chart_path.clone(),
        })
    }
}

/// First path segment, ignoring one leading `/`
pub fn chart_repo_of(chart_path: &str) -> Option<&str> {
    let path = chart_path.strip_prefix('/').unwrap_or(chart_path);
    let repo = path.split('/').next().unwrap_or_default();
    if repo.is_empty() { None } else { Some(repo) }
}

/// Outcome of a successful translation
#[derive(Debug, Clone)]
pub struct TranslationReport {
    pub plan: FileSpecPlan,
    pub actual: Vec<String>,
    pub reconciliation: Reconciliation,
}

/// Plan the artifacts for an already loaded chart
///
/// Renders the chart with empty values, extracts its images and crawls its
/// dependencies.
pub fn plan_chart(
    chart: &Chart,
    renderer: &dyn TemplateRenderer,
    docker_repo: &str,
    chart_repo: &str,
) -> Result<FileSpecPlan, TranslateError> {
    let rendered = renderer
        .render(chart, &Values::new())
        .map_err(TranslateError::Render)?;
    let images = extract_images(&rendered);
    let charts = crawl_dependencies(chart);

    tracing::debug!(
        images = images.len(),
        charts = charts.len(),
        "collected expected artifacts"
    );

    Ok(build_filespec(&images, &charts, docker_repo, chart_repo))
}

/// Runs a translation against its collaborators
pub struct Translator<'a> {
    pub source: &'a dyn ChartSource,
    pub renderer: &'a dyn TemplateRenderer,
    pub bundler: &'a dyn BundleCreator,
    pub search: &'a dyn ArtifactSearch,
}

impl Translator<'_> {
    pub async fn run(&self, request: &TranslateRequest) -> Result<TranslationReport, TranslateError> {
        let chart_repo = request.chart_repo()?;

        tracing::debug!(path = %request.chart_path, "downloading chart");
        let data = self
            .source
            .fetch_chart(&request.chart_path)
            .await
            .map_err(|source| TranslateError::Fetch {
                path: request.chart_path.clone(),
                source,
            })?;

        let chart = load_archive(&data).map_err(|source| TranslateError::Load {
            path: request.chart_path.clone(),
            source,
        })?;

        let plan = plan_chart(&chart, self.renderer, &request.docker_repo, chart_repo)?;

        if request.dry_run {
            tracing::info!("dry run, release bundle not created");
        } else {
            self.bundler
                .create_bundle(&plan.spec)
                .await
                .map_err(TranslateError::Bundle)?;
        }

        let actual = self
            .search
            .search(&plan.spec)
            .await
            .map_err(TranslateError::Search)?;

        let reconciliation = reconcile(&plan.artifacts, &actual);

        Ok(TranslationReport {
            plan,
            actual,
            reconciliation,
        })
    }
}
