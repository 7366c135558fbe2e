//! Expected versus actual artifact reconciliation

use serde::Serialize;
use std::fmt;

use crate::filespec::ExpectedArtifact;

const PACKAGE_EXTENSION: &str = ".tgz";

/// Found/missing classification, both in expected order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub found: Vec<String>,
    pub missing: Vec<String>,
}

impl Reconciliation {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

impl fmt::Display for Reconciliation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Found:")?;
        for name in &self.found {
            writeln!(f, "- {}", name)?;
        }
        writeln!(f, "Missing:")?;
        if self.missing.is_empty() {
            writeln!(f, "- none")?;
        }
        for name in &self.missing {
            writeln!(f, "- {}", name)?;
        }
        Ok(())
    }
}

/// Substring an actual repository path must contain for `name` to count as present
///
/// Chart packages match on `/<file name>`. Anything else is treated as an
/// image folder: colons become path separators and the fragment ends in `/`.
pub fn match_fragment(name: &str) -> String {
    if name.ends_with(PACKAGE_EXTENSION) {
        return format!("/{}", name);
    }

    let mut fragment = format!("/{}", name.replace(':', "/"));
    if !fragment.ends_with('/') {
        fragment.push('/');
    }
    fragment
}

/// Classify each expected artifact as found or missing
///
/// Matching is plain substring containment so that repository layout
/// prefixes in the actual paths do not matter.
pub fn reconcile(expected: &[ExpectedArtifact], actual: &[String]) -> Reconciliation {
    let mut result = Reconciliation::default();

    for artifact in expected {
        let fragment = match_fragment(&artifact.name);
        if actual.iter().any(|path| path.contains(&fragment)) {
            result.found.push(artifact.name.clone());
        } else {
            tracing::debug!(artifact = %artifact.name, %fragment, "no matching path");
            result.missing.push(artifact.name.clone());
        }
    }

    result
}
