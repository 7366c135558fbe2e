//! Global functions called by converted Helm templates

use minijinja::value::ValueKind;
use minijinja::{Error, ErrorKind, State, Value, context};
use semver::{Version, VersionReq};

use crate::gotemplate::{self, transformer};

/// Name under which the chart tree's defines are registered
pub(crate) const DEFINES_TEMPLATE: &str = "@defines";

/// Items of a Go `range` as `[key, value]` pairs
///
/// Maps iterate in key order, sequences by index and an integer `n` over
/// `0..n`. Nil and undefined values iterate nothing.
pub fn range_pairs(value: Value) -> Result<Vec<Value>, Error> {
    match value.kind() {
        ValueKind::Undefined | ValueKind::None => Ok(Vec::new()),
        ValueKind::Map => {
            let mut keys: Vec<Value> = value.try_iter()?.collect();
            keys.sort();
            keys.into_iter()
                .map(|key| {
                    let item = value.get_item(&key)?;
                    Ok(Value::from(vec![key, item]))
                })
                .collect()
        }
        ValueKind::Seq | ValueKind::Iterable => Ok(value
            .try_iter()?
            .enumerate()
            .map(|(i, item)| Value::from(vec![Value::from(i), item]))
            .collect()),
        ValueKind::Number => {
            let n = i64::try_from(value.clone()).map_err(|_| {
                Error::new(ErrorKind::InvalidOperation, format!("range can't iterate over {}", value))
            })?;
            Ok((0..n.max(0)).map(|i| Value::from(vec![Value::from(i), Value::from(i)])).collect())
        }
        _ => Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("range can't iterate over {}", value),
        )),
    }
}

/// Fail with a custom error message
///
/// Usage: {{ fail("image.tag is required") }}
pub fn fail(message: String) -> Result<Value, Error> {
    Err(Error::new(ErrorKind::InvalidOperation, message))
}

/// Render a Go template string against `context`, like Helm's `tpl`
///
/// Defines of the chart tree being rendered are available to the string.
pub fn tpl(state: &State, template: String, context: Value) -> Result<String, Error> {
    if !template.contains("{{") {
        return Ok(template);
    }

    let converted = gotemplate::convert(&template).map_err(|e| {
        Error::new(ErrorKind::SyntaxError, format!("tpl: {} in {:?}", e, template))
    })?;
    let defines = state
        .env()
        .get_template(DEFINES_TEMPLATE)
        .map(|t| t.source().to_string())
        .unwrap_or_default();

    let source = format!(
        "{{% set {root} = ctx %}}{{% set {dot} = ctx %}}{defines}{macros}{body}",
        root = transformer::ROOT,
        dot = transformer::DOT,
        defines = defines,
        macros = converted.macros,
        body = converted.body,
    );
    state.env().render_str(&source, context! { ctx => context })
}

/// Helm's `semverCompare`
///
/// Accepts a leading `v` on the version and Kubernetes-style pre-release
/// suffixes such as `1.30.0-0` on both sides. `||` separates alternatives.
///
/// Usage: {{ semver_compare(">=1.21.0-0", "v1.30.0") }}
pub fn semver_compare(constraint: String, version: String) -> Result<bool, Error> {
    let version = parse_version(&version)?;

    for alternative in constraint.split("||") {
        let req = parse_constraint(alternative)?;
        if req.matches(&version) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn parse_version(raw: &str) -> Result<Version, Error> {
    let cleaned = raw.trim().trim_start_matches('v');
    if let Ok(version) = Version::parse(cleaned) {
        return Ok(Version::new(version.major, version.minor, version.patch));
    }

    let core = cleaned.split(['-', '+']).next().unwrap_or(cleaned);
    let mut parts = core.split('.').map(str::parse::<u64>);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(Ok(major)), Some(Ok(minor)), Some(Ok(patch))) => Ok(Version::new(major, minor, patch)),
        (Some(Ok(major)), Some(Ok(minor)), None) => Ok(Version::new(major, minor, 0)),
        (Some(Ok(major)), None, None) => Ok(Version::new(major, 0, 0)),
        _ => Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("invalid version: {}", raw),
        )),
    }
}

/// Helm constraints separate comparators with spaces or commas and allow
/// a `-0` suffix meaning "including pre-releases"
fn parse_constraint(raw: &str) -> Result<VersionReq, Error> {
    let comparators: Vec<String> = raw
        .split([',', ' '])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let part = part.strip_suffix("-0").unwrap_or(part);
            let (op, rest) = part.split_at(part.find(|c: char| c.is_ascii_digit() || c == 'v').unwrap_or(0));
            format!("{}{}", op, rest.trim_start_matches('v'))
        })
        .collect();

    VersionReq::parse(&comparators.join(", ")).map_err(|e| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("invalid constraint {:?}: {}", raw.trim(), e),
        )
    })
}
