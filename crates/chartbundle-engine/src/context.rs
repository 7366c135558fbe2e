//! Template rendering context

use chartbundle_core::{Chart, Values};
use serde::Serialize;
use serde_json::Value as JsonValue;

const DEFAULT_NAMESPACE: &str = "default";

/// Context available to every template of one chart
#[derive(Debug, Clone, Serialize)]
pub struct RenderContext {
    /// Chart values (defaults merged with caller values)
    pub values: JsonValue,

    /// Chart metadata
    pub chart: ChartInfo,

    /// Release information, shared by the whole tree
    pub release: ReleaseInfo,
}

/// Chart information for templates
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartInfo {
    pub name: String,
    pub version: String,
    pub app_version: Option<String>,
}

impl From<&Chart> for ChartInfo {
    fn from(chart: &Chart) -> Self {
        Self {
            name: chart.name().to_string(),
            version: chart.version().to_string(),
            app_version: chart.metadata.app_version.clone(),
        }
    }
}

/// Release information for templates
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseInfo {
    pub name: String,
    pub namespace: String,
}

impl ReleaseInfo {
    /// Release named after the root chart, in the default namespace
    pub fn for_chart(root: &Chart) -> Self {
        Self {
            name: root.name().to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl RenderContext {
    pub fn new(chart: &Chart, values: Values, release: ReleaseInfo) -> Self {
        Self {
            values: values.0,
            chart: ChartInfo::from(chart),
            release,
        }
    }

    /// Context for a bundled sub-chart
    ///
    /// The sub-chart's defaults are overlaid with the parent's `global`
    /// section and the parent's section named after the sub-chart.
    pub fn for_subchart(&self, subchart: &Chart) -> Self {
        let parent = Values(self.values.clone());
        let values = Values::for_subchart(subchart.values.clone(), &parent, subchart.name());
        Self::new(subchart, values, self.release.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subchart_values_are_scoped() {
        let root = Chart::new("root", "1.0");
        let mut sub = Chart::new("redis", "17.3.2");
        sub.values = Values::from_yaml("port: 6379\nimage:\n  tag: \"7.0\"\n").unwrap();

        let parent_values = Values::from_yaml(
            "global:\n  registry: r.io\nredis:\n  image:\n    tag: \"7.2\"\nother: 1\n",
        )
        .unwrap();
        let ctx = RenderContext::new(&root, parent_values, ReleaseInfo::for_chart(&root));
        let sub_ctx = ctx.for_subchart(&sub);

        assert_eq!(sub_ctx.values["port"], 6379);
        assert_eq!(sub_ctx.values["image"]["tag"], "7.2");
        assert_eq!(sub_ctx.values["global"]["registry"], "r.io");
        assert!(sub_ctx.values.get("other").is_none());
        assert_eq!(sub_ctx.chart.name, "redis");
        assert_eq!(sub_ctx.release.name, "root");
    }

    #[test]
    fn test_chart_info_uses_camel_case() {
        let mut chart = Chart::new("app", "1.0");
        chart.metadata.app_version = Some("2.3".to_string());
        let json = serde_json::to_value(ChartInfo::from(&chart)).unwrap();
        assert_eq!(json["appVersion"], "2.3");
    }
}
