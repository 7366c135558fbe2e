//! Container image discovery in rendered manifests
//!
//! Only lines of the form `image: <reference>` are considered. The reference
//! is taken verbatim apart from one matching pair of surrounding quotes; no
//! attempt is made to validate it as an image coordinate.

use indexmap::IndexMap;
use std::collections::BTreeSet;

const IMAGE_KEY: &str = "image:";

/// Collect the unique image references declared across rendered files
pub fn extract_images(files: &IndexMap<String, String>) -> BTreeSet<String> {
    let mut images = BTreeSet::new();
    for content in files.values() {
        collect_images(content, &mut images);
    }
    images
}

/// Collect the unique image references declared in a single document
pub fn extract_images_from_text(content: &str) -> BTreeSet<String> {
    let mut images = BTreeSet::new();
    collect_images(content, &mut images);
    images
}

fn collect_images(content: &str, images: &mut BTreeSet<String>) {
    for line in content.lines() {
        if let Some(reference) = parse_image_line(line) {
            images.insert(reference.to_string());
        }
    }
}

/// Parse one line, returning the image reference it declares
fn parse_image_line(line: &str) -> Option<&str> {
    let value = line.trim().strip_prefix(IMAGE_KEY)?.trim();
    if value.is_empty() {
        return None;
    }
    Some(strip_matching_quotes(value))
}

/// Remove exactly one pair of matching `'` or `"` quotes
fn strip_matching_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
