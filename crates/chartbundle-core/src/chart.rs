//! Chart model
//!
//! A [`Chart`] is one node of a chart tree: its `Chart.yaml` metadata, its
//! template files, its default values and the sub-charts bundled with it.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{CoreError, Result};
use crate::values::Values;

/// `Chart.yaml` contents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    /// API version (v1 or v2)
    #[serde(default)]
    pub api_version: Option<String>,

    /// Chart name
    pub name: String,

    /// Chart version, kept verbatim
    #[serde(deserialize_with = "scalar_string")]
    pub version: String,

    /// Chart description
    #[serde(default)]
    pub description: Option<String>,

    /// Chart type (application or library)
    #[serde(default, rename = "type")]
    pub chart_type: Option<String>,

    /// App version
    #[serde(default, deserialize_with = "optional_scalar_string")]
    pub app_version: Option<String>,

    /// Annotations
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl ChartMetadata {
    /// Parse and validate `Chart.yaml`
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let metadata: Self = serde_yaml::from_str(yaml).map_err(|e| CoreError::InvalidChart {
            message: format!("Chart.yaml: {}", e),
        })?;

        if metadata.name.trim().is_empty() {
            return Err(CoreError::MissingField {
                field: "name".to_string(),
            });
        }
        if metadata.version.trim().is_empty() {
            return Err(CoreError::MissingField {
                field: "version".to_string(),
            });
        }

        Ok(metadata)
    }
}

/// A loaded chart and its bundled dependencies
#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    pub metadata: ChartMetadata,

    /// Template files by path relative to the chart directory
    pub templates: IndexMap<String, String>,

    /// Default values (`values.yaml`)
    pub values: Values,

    /// Bundled sub-charts, in archive order
    pub dependencies: Vec<Chart>,
}

impl Chart {
    /// Create an empty chart with the given name and version
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            metadata: ChartMetadata {
                api_version: Some("v2".to_string()),
                name: name.into(),
                version: version.into(),
                description: None,
                chart_type: None,
                app_version: None,
                annotations: BTreeMap::new(),
            },
            templates: IndexMap::new(),
            values: Values::new(),
            dependencies: Vec::new(),
        }
    }

    /// Add a template file
    pub fn with_template(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.templates.insert(path.into(), content.into());
        self
    }

    /// Add a bundled sub-chart
    pub fn with_dependency(mut self, chart: Chart) -> Self {
        self.dependencies.push(chart);
        self
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn version(&self) -> &str {
        &self.metadata.version
    }

    /// Identity used to detect a chart nested inside itself
    pub fn identity(&self) -> (&str, &str) {
        (self.name(), self.version())
    }

    /// Package file name as stored in a chart repository
    #[must_use]
    pub fn package_name(&self) -> String {
        format!("{}-{}.tgz", self.metadata.name, self.metadata.version)
    }

    /// Whether this is a library chart (renders no manifests)
    pub fn is_library(&self) -> bool {
        self.metadata.chart_type.as_deref() == Some("library")
    }
}

/// Accept YAML scalars (`1.0`, `2`, `"1.0.0"`) as strings
fn scalar_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_yaml::Value::deserialize(deserializer)? {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a scalar, found {:?}",
            other
        ))),
    }
}

fn optional_scalar_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<serde_yaml::Value>::deserialize(deserializer)? {
        None | Some(serde_yaml::Value::Null) => Ok(None),
        Some(serde_yaml::Value::String(s)) => Ok(Some(s)),
        Some(serde_yaml::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(serde_yaml::Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a scalar, found {:?}",
            other
        ))),
    }
}
