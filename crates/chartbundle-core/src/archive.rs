//! Chart archive loading and creation
//!
//! Charts are distributed as `.tgz` archives with a single top-level
//! directory:
//!
//! ```text
//! mychart/Chart.yaml
//! mychart/values.yaml
//! mychart/templates/*.yaml
//! mychart/charts/redis-17.3.2.tgz      (packaged sub-chart)
//! mychart/charts/common/Chart.yaml     (unpacked sub-chart)
//! ```

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use indexmap::IndexMap;
use std::io::{Cursor, Read, Write};
use tar::{Archive, Builder, Header};

use crate::chart::{Chart, ChartMetadata};
use crate::error::{CoreError, Result};
use crate::values::Values;

const CHART_FILE: &str = "Chart.yaml";
const VALUES_FILE: &str = "values.yaml";
const TEMPLATES_DIR: &str = "templates/";
const CHARTS_DIR: &str = "charts/";

/// Where a bundled sub-chart comes from
enum SubchartSource {
    Archive(Vec<u8>),
    Directory(IndexMap<String, Vec<u8>>),
}

/// Load a chart tree from the bytes of a `.tgz` chart archive
pub fn load_archive(data: &[u8]) -> Result<Chart> {
    let entries = read_entries(data)?;
    if entries.is_empty() {
        return Err(CoreError::Archive {
            message: "archive contains no files".to_string(),
        });
    }

    // Every file lives under the chart directory; drop that first component.
    let mut files = IndexMap::new();
    for (path, content) in entries {
        if let Some((_, rest)) = path.split_once('/') {
            if !rest.is_empty() {
                files.insert(rest.to_string(), content);
            }
        }
    }

    build_chart(files)
}

/// Read all regular files of a gzipped tarball in a single pass
fn read_entries(data: &[u8]) -> Result<IndexMap<String, Vec<u8>>> {
    let decoder = GzDecoder::new(Cursor::new(data));
    let mut archive = Archive::new(decoder);
    let mut contents = IndexMap::new();

    let entries = archive.entries().map_err(archive_error)?;
    for entry in entries {
        let mut entry = entry.map_err(archive_error)?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let path = entry.path().map_err(archive_error)?;
        let path = path.to_string_lossy();
        let path = path.trim_start_matches("./").to_string();

        let mut data = Vec::new();
        entry.read_to_end(&mut data).map_err(archive_error)?;
        contents.insert(path, data);
    }

    Ok(contents)
}

/// Build a chart from files keyed by path relative to the chart directory
fn build_chart(files: IndexMap<String, Vec<u8>>) -> Result<Chart> {
    let chart_yaml = files.get(CHART_FILE).ok_or_else(|| CoreError::InvalidChart {
        message: "Chart.yaml file is missing".to_string(),
    })?;
    let metadata = ChartMetadata::from_yaml(&utf8(CHART_FILE, chart_yaml)?)?;

    let values = match files.get(VALUES_FILE) {
        Some(content) => Values::from_yaml(&utf8(VALUES_FILE, content)?)?,
        None => Values::new(),
    };

    let mut templates = IndexMap::new();
    let mut subcharts: IndexMap<String, SubchartSource> = IndexMap::new();

    for (path, content) in &files {
        if path.starts_with(TEMPLATES_DIR) {
            templates.insert(path.clone(), utf8(path, content)?);
        } else if let Some(rest) = path.strip_prefix(CHARTS_DIR) {
            match rest.split_once('/') {
                Some((dir, inner)) if !inner.is_empty() => {
                    let entry = subcharts
                        .entry(dir.to_string())
                        .or_insert_with(|| SubchartSource::Directory(IndexMap::new()));
                    if let SubchartSource::Directory(dir_files) = entry {
                        dir_files.insert(inner.to_string(), content.clone());
                    }
                }
                None if rest.ends_with(".tgz") => {
                    subcharts.insert(rest.to_string(), SubchartSource::Archive(content.clone()));
                }
                _ => {}
            }
        }
    }

    let mut dependencies = Vec::with_capacity(subcharts.len());
    for (name, source) in subcharts {
        let chart = match source {
            SubchartSource::Archive(bytes) => load_archive(&bytes),
            SubchartSource::Directory(dir_files) => build_chart(dir_files),
        }
        .map_err(|e| CoreError::Archive {
            message: format!("{}{}: {}", CHARTS_DIR, name, e),
        })?;
        dependencies.push(chart);
    }

    tracing::debug!(
        chart = %metadata.name,
        version = %metadata.version,
        templates = templates.len(),
        dependencies = dependencies.len(),
        "loaded chart"
    );

    Ok(Chart {
        metadata,
        templates,
        values,
        dependencies,
    })
}

/// Package a chart tree as a `.tgz` archive
///
/// Sub-charts are written as nested archives under `charts/`.
pub fn write_archive(chart: &Chart) -> Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = Builder::new(encoder);
    let root = chart.name();

    let chart_yaml = serde_yaml::to_string(&chart.metadata)?;
    add_bytes_to_archive(&mut builder, &format!("{}/{}", root, CHART_FILE), chart_yaml.as_bytes())?;

    if !chart.values.is_empty() {
        let values_yaml = serde_yaml::to_string(chart.values.inner())?;
        add_bytes_to_archive(
            &mut builder,
            &format!("{}/{}", root, VALUES_FILE),
            values_yaml.as_bytes(),
        )?;
    }

    for (path, content) in &chart.templates {
        add_bytes_to_archive(&mut builder, &format!("{}/{}", root, path), content.as_bytes())?;
    }

    for dependency in &chart.dependencies {
        let nested = write_archive(dependency)?;
        add_bytes_to_archive(
            &mut builder,
            &format!("{}/{}{}", root, CHARTS_DIR, dependency.package_name()),
            &nested,
        )?;
    }

    let encoder = builder.into_inner()?;
    Ok(encoder.finish()?)
}

/// Add bytes to a tar archive with a given path
fn add_bytes_to_archive<W: Write>(
    builder: &mut Builder<W>,
    archive_path: &str,
    content: &[u8],
) -> Result<()> {
    let mut header = Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0); // Reproducible builds: use epoch time
    header.set_cksum();

    builder.append_data(&mut header, archive_path, content)?;

    Ok(())
}

fn utf8(path: &str, content: &[u8]) -> Result<String> {
    String::from_utf8(content.to_vec()).map_err(|e| CoreError::Archive {
        message: format!("Invalid UTF-8 in {}: {}", path, e),
    })
}

fn archive_error(e: std::io::Error) -> CoreError {
    CoreError::Archive {
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tarball(files: &[(&str, &[u8])]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = Builder::new(encoder);
        for (path, content) in files {
            add_bytes_to_archive(&mut builder, path, content).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_load_minimal_chart() {
        let data = tarball(&[
            ("root/Chart.yaml", b"apiVersion: v2\nname: root\nversion: 1.0.0\n"),
            ("root/templates/deployment.yaml", b"kind: Deployment\n"),
        ]);

        let chart = load_archive(&data).unwrap();
        assert_eq!(chart.name(), "root");
        assert_eq!(chart.version(), "1.0.0");
        assert!(chart.values.is_empty());
        assert_eq!(
            chart.templates.get("templates/deployment.yaml").map(String::as_str),
            Some("kind: Deployment\n")
        );
        assert!(chart.dependencies.is_empty());
    }

    #[test]
    fn test_load_nested_and_unpacked_subcharts_in_archive_order() {
        let nested = tarball(&[
            ("redis/Chart.yaml", b"name: redis\nversion: 17.3.2\n"),
            ("redis/templates/sts.yaml", b"image: redis:7\n"),
        ]);

        let data = tarball(&[
            ("app/Chart.yaml", b"name: app\nversion: 0.1.0\n"),
            ("app/values.yaml", b"replicas: 2\n"),
            ("app/charts/redis-17.3.2.tgz", nested.as_slice()),
            ("app/charts/common/Chart.yaml", b"name: common\nversion: 2.0\n"),
            ("app/charts/common/templates/_helpers.tpl", b"{# helpers #}\n"),
            ("app/charts/README.md", b"ignored"),
        ]);

        let chart = load_archive(&data).unwrap();
        assert_eq!(chart.values.inner()["replicas"], 2);

        let names: Vec<_> = chart.dependencies.iter().map(|c| c.package_name()).collect();
        assert_eq!(names, vec!["redis-17.3.2.tgz", "common-2.0.tgz"]);

        let common = &chart.dependencies[1];
        assert!(common.templates.contains_key("templates/_helpers.tpl"));
    }

    #[test]
    fn test_missing_chart_yaml() {
        let data = tarball(&[("root/values.yaml", b"a: 1\n")]);
        let err = load_archive(&data).unwrap_err();
        assert!(matches!(err, CoreError::InvalidChart { .. }));
    }

    #[test]
    fn test_garbage_bytes_are_an_archive_error() {
        let err = load_archive(b"definitely not gzip").unwrap_err();
        assert!(matches!(err, CoreError::Archive { .. }));
    }

    #[test]
    fn test_broken_nested_archive_names_the_file() {
        let data = tarball(&[
            ("app/Chart.yaml", b"name: app\nversion: 0.1.0\n"),
            ("app/charts/broken-1.0.0.tgz", b"oops"),
        ]);

        let err = load_archive(&data).unwrap_err().to_string();
        assert!(err.contains("charts/broken-1.0.0.tgz"), "{}", err);
    }

    #[test]
    fn test_write_archive_is_loadable() {
        let chart = Chart::new("app", "1.0.0")
            .with_template("templates/pod.yaml", "image: nginx:1.25\n")
            .with_dependency(Chart::new("sub", "2.0"));

        let data = write_archive(&chart).unwrap();
        let loaded = load_archive(&data).unwrap();

        assert_eq!(loaded.name(), "app");
        assert_eq!(loaded.templates.len(), 1);
        assert_eq!(loaded.dependencies.len(), 1);
        assert_eq!(loaded.dependencies[0].package_name(), "sub-2.0.tgz");
    }
}
