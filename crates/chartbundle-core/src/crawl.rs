//! Transitive chart dependency discovery

use indexmap::IndexMap;

use crate::chart::Chart;

/// Collect every chart in the tree, the root included, keyed by name
///
/// The tree is walked depth-first in pre-order, children in declaration
/// order. When a name occurs more than once the entry visited last wins.
/// Sub-charts are owned by their parent, so the walk always terminates.
pub fn crawl_dependencies(root: &Chart) -> IndexMap<String, &Chart> {
    let mut found = IndexMap::new();
    visit(root, &mut found);
    found
}

fn visit<'a>(chart: &'a Chart, found: &mut IndexMap<String, &'a Chart>) {
    found.insert(chart.name().to_string(), chart);
    for child in &chart.dependencies {
        visit(child, found);
    }
}
