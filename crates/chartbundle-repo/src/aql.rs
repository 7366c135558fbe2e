//! Artifactory Query Language builder for file specifications
//!
//! A pattern `repo/some/path/name*` is split into a repository, a path and
//! a file name. Files directly in the path match, and so do files in any
//! folder below it.

use chartbundle_core::FileSpec;
use serde::Deserialize;
use serde_json::{Value, json};

const INCLUDED_FIELDS: &str = r#".include("repo","path","name","type")"#;
const ROOT_PATH: &str = ".";

/// One pattern split into its AQL parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternQuery {
    pub repo: String,
    pub path: String,
    pub name: String,
}

impl PatternQuery {
    /// Split a file-spec pattern
    ///
    /// A pattern ending in `/` matches everything in that folder.
    pub fn parse(pattern: &str) -> Option<Self> {
        let pattern = pattern.trim_start_matches('/');
        let (repo, rest) = match pattern.split_once('/') {
            Some((repo, rest)) => (repo, rest),
            None => (pattern, ""),
        };
        if repo.is_empty() {
            return None;
        }

        let rest = if rest.is_empty() {
            "*".to_string()
        } else if rest.ends_with('/') {
            format!("{}*", rest)
        } else {
            rest.to_string()
        };

        let (path, name) = match rest.rsplit_once('/') {
            Some((path, name)) => (path.to_string(), name.to_string()),
            None => (ROOT_PATH.to_string(), rest),
        };

        Some(Self {
            repo: repo.to_string(),
            path,
            name,
        })
    }

    /// Path pattern matching every folder below `path`
    fn recursive_path(&self) -> String {
        if self.path == ROOT_PATH {
            "*".to_string()
        } else {
            format!("{}/*", self.path)
        }
    }

    /// AQL criteria object for this pattern
    pub fn criteria(&self) -> Value {
        json!({
            "repo": self.repo,
            "$or": [
                { "$and": [{ "path": { "$match": self.path }, "name": { "$match": self.name } }] },
                { "$and": [{ "path": { "$match": self.recursive_path() }, "name": { "$match": self.name } }] },
            ]
        })
    }

    /// Complete `items.find` query for this pattern alone
    pub fn to_aql(&self) -> String {
        format!("items.find({}){}", self.criteria(), INCLUDED_FIELDS)
    }
}

/// Build one query matching any pattern of the spec
///
/// Returns `None` when the spec has no usable pattern.
pub fn build_search_query(spec: &FileSpec) -> Option<String> {
    let mut criteria: Vec<Value> = spec
        .patterns()
        .filter_map(PatternQuery::parse)
        .map(|q| q.criteria())
        .collect();

    let combined = match criteria.len() {
        0 => return None,
        1 => criteria.remove(0),
        _ => json!({ "$or": criteria }),
    };

    Some(format!("items.find({}){}", combined, INCLUDED_FIELDS))
}

/// Response of `api/search/aql`
#[derive(Debug, Clone, Deserialize)]
pub struct AqlResponse {
    #[serde(default)]
    pub results: Vec<AqlItem>,
}

/// One search hit
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AqlItem {
    pub repo: String,
    pub path: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub item_type: Option<String>,
}

impl AqlItem {
    /// Whether this is a file (folders are reported too)
    pub fn is_file(&self) -> bool {
        self.item_type.as_deref().is_none_or(|t| t == "file")
    }

    /// `<repo>/<path>/<name>`, or `<repo>/<name>` at the repository root
    pub fn full_path(&self) -> String {
        if self.path == ROOT_PATH || self.path.is_empty() {
            format!("{}/{}", self.repo, self.name)
        } else {
            format!("{}/{}/{}", self.repo, self.path, self.name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chartbundle_core::FileSpecEntry;

    fn spec(patterns: &[&str]) -> FileSpec {
        FileSpec {
            files: patterns
                .iter()
                .map(|p| FileSpecEntry {
                    pattern: p.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_parse_folder_pattern() {
        let q = PatternQuery::parse("docker-local/app/1.0/").unwrap();
        assert_eq!(q.repo, "docker-local");
        assert_eq!(q.path, "app/1.0");
        assert_eq!(q.name, "*");
    }

    #[test]
    fn test_parse_nested_folder_pattern() {
        let q = PatternQuery::parse("docker-local/*/app/1.0/").unwrap();
        assert_eq!(q.path, "*/app/1.0");
        assert_eq!(q.name, "*");
    }

    #[test]
    fn test_parse_root_file_pattern() {
        let q = PatternQuery::parse("helm/sub-2.0.tgz").unwrap();
        assert_eq!(q.path, ".");
        assert_eq!(q.name, "sub-2.0.tgz");
        assert_eq!(q.recursive_path(), "*");
    }

    #[test]
    fn test_parse_repo_only() {
        let q = PatternQuery::parse("helm").unwrap();
        assert_eq!((q.path.as_str(), q.name.as_str()), (".", "*"));
        assert!(PatternQuery::parse("").is_none());
        assert!(PatternQuery::parse("/").is_none());
    }

    #[test]
    fn test_criteria_shape() {
        let q = PatternQuery::parse("helm/*/sub-2.0.tgz").unwrap();
        let criteria = q.criteria();
        assert_eq!(criteria["repo"], "helm");
        assert_eq!(criteria["$or"][0]["$and"][0]["path"]["$match"], "*");
        assert_eq!(criteria["$or"][0]["$and"][0]["name"]["$match"], "sub-2.0.tgz");
        assert_eq!(criteria["$or"][1]["$and"][0]["path"]["$match"], "*/*");
    }

    #[test]
    fn test_single_pattern_query() {
        let query = build_search_query(&spec(&["helm/root-1.0.tgz"])).unwrap();
        assert!(query.starts_with("items.find({"));
        assert!(query.ends_with(r#".include("repo","path","name","type")"#));
        assert!(query.contains(r#""repo":"helm""#));
    }

    #[test]
    fn test_multiple_patterns_are_or_combined() {
        let query = build_search_query(&spec(&["docker/app/1.0/", "docker/*/app/1.0/"])).unwrap();
        let inner = query
            .strip_prefix("items.find(")
            .and_then(|q| q.strip_suffix(&format!("){}", INCLUDED_FIELDS)))
            .unwrap();
        let parsed: Value = serde_json::from_str(inner).unwrap();
        assert_eq!(parsed["$or"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_empty_spec_has_no_query() {
        assert!(build_search_query(&FileSpec::default()).is_none());
    }

    #[test]
    fn test_item_paths() {
        let response: AqlResponse = serde_json::from_str(
            r#"{"results":[
                {"repo":"docker","path":"app/1.0","name":"manifest.json","type":"file"},
                {"repo":"helm","path":".","name":"sub-2.0.tgz","type":"file"},
                {"repo":"docker","path":"app","name":"1.0","type":"folder"}
            ],"range":{"total":3}}"#,
        )
        .unwrap();

        let files: Vec<_> = response
            .results
            .iter()
            .filter(|i| i.is_file())
            .map(AqlItem::full_path)
            .collect();
        assert_eq!(files, vec!["docker/app/1.0/manifest.json", "helm/sub-2.0.tgz"]);
    }
}
