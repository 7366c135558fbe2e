//! Chart values and the way layers of them combine

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::Result;

const GLOBAL_KEY: &str = "global";

/// A values document (`values.yaml`, or values supplied by the caller)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Values(pub JsonValue);

impl Values {
    /// An empty mapping
    pub fn new() -> Self {
        Self(JsonValue::Object(Map::new()))
    }

    /// Parse a YAML document; a blank or `null` document is an empty mapping
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::new());
        }
        match serde_yaml::from_str::<JsonValue>(yaml)? {
            JsonValue::Null => Ok(Self::new()),
            parsed => Ok(Self(parsed)),
        }
    }

    /// Layer `overlay` on top of these values
    ///
    /// Mappings merge key by key; any other overlay value replaces what is
    /// underneath, lists included. An explicit `null` removes the key.
    pub fn merge(&mut self, overlay: &Values) {
        overlay_onto(&mut self.0, &overlay.0);
    }

    pub fn inner(&self) -> &JsonValue {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        match &self.0 {
            JsonValue::Null => true,
            JsonValue::Object(map) => map.is_empty(),
            _ => false,
        }
    }

    /// Values a bundled sub-chart renders with
    ///
    /// The sub-chart's own defaults, overlaid with the parent's section named
    /// after the sub-chart. `global` is shared: the parent's `global` is
    /// overlaid on the sub-chart's and nothing else of the parent leaks in.
    pub fn for_subchart(defaults: Values, parent: &Values, name: &str) -> Values {
        let mut values = defaults;

        if let JsonValue::Object(parent_map) = &parent.0 {
            if let Some(section @ JsonValue::Object(_)) = parent_map.get(name) {
                overlay_onto(&mut values.0, section);
            }
            if let Some(global) = parent_map.get(GLOBAL_KEY) {
                let mut wrapped = Map::new();
                wrapped.insert(GLOBAL_KEY.to_string(), global.clone());
                overlay_onto(&mut values.0, &JsonValue::Object(wrapped));
            }
        }

        values
    }
}

fn overlay_onto(target: &mut JsonValue, overlay: &JsonValue) {
    match (target, overlay) {
        (JsonValue::Object(target_map), JsonValue::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                if value.is_null() {
                    target_map.remove(key);
                } else if let Some(existing) = target_map.get_mut(key) {
                    overlay_onto(existing, value);
                } else {
                    target_map.insert(key.clone(), value.clone());
                }
            }
        }
        (target, overlay) => *target = overlay.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn yaml(source: &str) -> Values {
        Values::from_yaml(source).unwrap()
    }

    #[test]
    fn test_blank_documents_are_empty() {
        assert!(yaml("").is_empty());
        assert!(yaml("# nothing to see\n").is_empty());
        assert!(yaml("~\n").is_empty());
        assert!(!yaml("replicas: 1\n").is_empty());
    }

    #[test]
    fn test_merge_layers_mappings() {
        let mut values = yaml("image:\n  repository: nginx\n  tag: \"1.25\"\nports: [80, 443]\n");
        values.merge(&yaml("image:\n  tag: \"1.27\"\nports: [8080]\nreplicas: 2\n"));

        assert_eq!(
            values.inner(),
            &json!({
                "image": {"repository": "nginx", "tag": "1.27"},
                "ports": [8080],
                "replicas": 2
            })
        );
    }

    #[test]
    fn test_merge_null_removes_key() {
        let mut values = yaml("resources:\n  limits:\n    cpu: 1\n  requests:\n    cpu: 100m\n");
        values.merge(&yaml("resources:\n  limits: null\n"));

        assert_eq!(values.inner(), &json!({"resources": {"requests": {"cpu": "100m"}}}));
    }

    #[test]
    fn test_subchart_sees_its_section_and_globals() {
        let defaults = yaml("enabled: false\nimage: redis:7.0\nglobal:\n  storageClass: standard\n  debug: false\n");
        let parent = yaml(concat!(
            "global:\n  storageClass: fast\n",
            "redis:\n  enabled: true\n",
            "postgresql:\n  enabled: true\n",
            "replicas: 3\n",
        ));

        let values = Values::for_subchart(defaults, &parent, "redis");

        assert_eq!(
            values.inner(),
            &json!({
                "enabled": true,
                "image": "redis:7.0",
                "global": {"storageClass": "fast", "debug": false}
            })
        );
    }

    #[test]
    fn test_subchart_without_parent_section_keeps_defaults() {
        let values = Values::for_subchart(yaml("port: 6379\n"), &Values::new(), "redis");
        assert_eq!(values, yaml("port: 6379\n"));
    }
}
