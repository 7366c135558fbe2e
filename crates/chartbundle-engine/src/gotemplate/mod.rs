//! Helm (Go template) support
//!
//! Charts pulled from a Helm repository are written in Go's `text/template`
//! dialect. Each template is parsed and rewritten to MiniJinja before
//! rendering; see [`transformer`] for the mapping.

pub mod ast;
pub mod parser;
pub mod transformer;

use chartbundle_core::Chart;
use indexmap::IndexMap;

use crate::error::{Result, TemplateError};
pub use parser::{ParseError, parse};
pub use transformer::{Converted, Transformer};

/// Kubernetes version reported through `.Capabilities`
const KUBE_VERSION: (&str, &str) = ("1", "30");

/// Convert one Go template source
pub fn convert(source: &str) -> std::result::Result<Converted, ParseError> {
    Transformer::new().transform(&parse(source)?)
}

/// A chart tree with every template converted, plus the shared macros
#[derive(Debug)]
pub struct ConvertedTree {
    pub chart: Chart,
    /// Macros from every `define` in the tree, sub-charts first so that a
    /// parent's define wins over a sub-chart's of the same name
    pub defines: String,
    /// Macro names defined in `defines`, without duplicates
    pub names: Vec<String>,
}

impl ConvertedTree {
    /// Statement importing every define from the template named `from`
    pub fn import_statement(&self, from: &str) -> String {
        if self.names.is_empty() {
            return String::new();
        }
        format!("{{% from {:?} import {} %}}", from, self.names.join(", "))
    }
}

/// Convert every template of a chart and its sub-charts
pub fn convert_tree(chart: &Chart) -> Result<ConvertedTree> {
    let mut tree = ConvertedTree {
        chart: Chart::new(chart.name(), chart.version()),
        defines: String::new(),
        names: Vec::new(),
    };
    tree.chart = convert_chart(chart, &mut tree)?;
    Ok(tree)
}

fn convert_chart(chart: &Chart, tree: &mut ConvertedTree) -> Result<Chart> {
    let dependencies = chart
        .dependencies
        .iter()
        .map(|sub| convert_chart(sub, tree))
        .collect::<Result<Vec<_>>>()?;

    let mut templates = IndexMap::new();
    for (path, source) in &chart.templates {
        let converted = convert(source).map_err(|e| TemplateError::from_parse(e, path, source))?;
        tree.defines.push_str(&converted.macros);
        for name in converted.defines {
            if !tree.names.contains(&name) {
                tree.names.push(name);
            }
        }
        templates.insert(path.clone(), converted.body);
    }

    Ok(Chart {
        metadata: chart.metadata.clone(),
        templates,
        values: chart.values.clone(),
        dependencies,
    })
}

/// Statements binding `$` and the dot to Helm's top-level objects
///
/// `name` is the template's full name (`app/templates/x.yaml`) and
/// `base_path` its directory (`app/templates`).
pub fn prelude(name: &str, base_path: &str) -> String {
    let (major, minor) = KUBE_VERSION;
    format!(
        concat!(
            "{{% set {root} = {{",
            "\"Values\": values, ",
            "\"Chart\": {{\"Name\": chart.name, \"Version\": chart.version, \"AppVersion\": chart.appVersion}}, ",
            "\"Release\": {{\"Name\": release.name, \"Namespace\": release.namespace, \"Service\": \"Helm\", ",
            "\"IsInstall\": true, \"IsUpgrade\": false, \"Revision\": 1}}, ",
            "\"Template\": {{\"Name\": {name:?}, \"BasePath\": {base:?}}}, ",
            "\"Capabilities\": {{\"KubeVersion\": {{\"Version\": \"v{major}.{minor}.0\", ",
            "\"GitVersion\": \"v{major}.{minor}.0\", \"Major\": \"{major}\", \"Minor\": \"{minor}\"}}, ",
            "\"APIVersions\": []}}",
            "}} %}}{{% set {dot} = {root} %}}"
        ),
        root = transformer::ROOT,
        dot = transformer::DOT,
        name = name,
        base = base_path,
        major = major,
        minor = minor,
    )
}
