//! File specification construction
//!
//! Every expected artifact is searched for with two patterns: one directly
//! under the repository and one a folder deeper, which covers virtual and
//! remote repositories that nest their content.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::chart::Chart;
use crate::error::Result;

/// What an expected artifact is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Image,
    Chart,
}

/// An artifact predicted to exist in the artifact store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedArtifact {
    pub kind: ArtifactKind,

    /// Display name: `app/1.0/` for images, `sub-2.0.tgz` for charts
    pub name: String,

    /// `<repo>/<path>`
    pub direct_pattern: String,

    /// `<repo>/*/<path>`
    pub nested_pattern: String,
}

impl ExpectedArtifact {
    fn new(kind: ArtifactKind, repo: &str, path: String) -> Self {
        Self {
            kind,
            direct_pattern: format!("{}/{}", repo, path),
            nested_pattern: format!("{}/*/{}", repo, path),
            name: path,
        }
    }

    /// Image artifact for a raw image reference
    pub fn image(docker_repo: &str, reference: &str) -> Self {
        Self::new(ArtifactKind::Image, docker_repo, image_path(reference))
    }

    /// Chart package artifact
    pub fn chart(chart_repo: &str, chart: &Chart) -> Self {
        Self::new(ArtifactKind::Chart, chart_repo, chart.package_name())
    }

    /// Both search patterns, direct first
    pub fn patterns(&self) -> [&str; 2] {
        [&self.direct_pattern, &self.nested_pattern]
    }
}

/// Repository path of an image: last path segment, tag as a folder
///
/// `registry/team/app:1.0` becomes `app/1.0/`.
pub fn image_path(reference: &str) -> String {
    let segment = reference.rsplit('/').next().unwrap_or(reference);
    format!("{}/", segment.replace(':', "/"))
}

/// One entry of a file specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSpecEntry {
    pub pattern: String,
}

/// The combined pattern document handed to search and bundle creation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSpec {
    pub files: Vec<FileSpecEntry>,
}

impl FileSpec {
    /// Patterns in document order
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.pattern.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Expected artifacts together with the document that finds them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSpecPlan {
    pub artifacts: Vec<ExpectedArtifact>,
    pub spec: FileSpec,
}

impl FileSpecPlan {
    /// Display names in expected order
    pub fn names(&self) -> Vec<&str> {
        self.artifacts.iter().map(|a| a.name.as_str()).collect()
    }
}

/// Build the ordered artifact list and its file specification
///
/// Images come first, sorted by raw reference, then charts sorted by name.
pub fn build_filespec(
    images: &BTreeSet<String>,
    charts: &IndexMap<String, &Chart>,
    docker_repo: &str,
    chart_repo: &str,
) -> FileSpecPlan {
    let mut artifacts = Vec::with_capacity(images.len() + charts.len());

    for reference in images {
        artifacts.push(ExpectedArtifact::image(docker_repo, reference));
    }

    let mut chart_names: Vec<&String> = charts.keys().collect();
    chart_names.sort();
    for name in chart_names {
        artifacts.push(ExpectedArtifact::chart(chart_repo, charts[name]));
    }

    let files = artifacts
        .iter()
        .flat_map(|a| a.patterns())
        .map(|pattern| FileSpecEntry {
            pattern: pattern.to_string(),
        })
        .collect();

    FileSpecPlan {
        artifacts,
        spec: FileSpec { files },
    }
}
