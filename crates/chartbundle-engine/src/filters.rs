//! Filters behind the Helm functions that chart templates pipe values through
//!
//! Each filter takes its subject first, which is the last argument of the
//! Helm function it stands in for (`nindent 4 $x` becomes `$x | nindent(4)`).

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use minijinja::{Error, ErrorKind, Value};
use sha2::{Digest, Sha256};

/// Filters registered on every environment, in addition to MiniJinja's builtins
pub const AVAILABLE_FILTERS: &[&str] = &[
    "toyaml",
    "tojson",
    "b64encode",
    "b64decode",
    "quote",
    "squote",
    "nindent",
    "indent",
    "required",
    "trunc",
    "trimprefix",
    "trimsuffix",
    "sha256sum",
];

fn invalid(message: impl std::fmt::Display) -> Error {
    Error::new(ErrorKind::InvalidOperation, message.to_string())
}

/// `toYaml`: YAML without the final newline
pub fn toyaml(value: Value) -> Result<String, Error> {
    let yaml = serde_yaml::to_string(&value).map_err(|e| invalid(format!("toYaml: {}", e)))?;
    Ok(yaml.trim_end_matches('\n').to_string())
}

/// `toJson`
pub fn tojson(value: Value) -> Result<String, Error> {
    serde_json::to_string(&value).map_err(|e| invalid(format!("toJson: {}", e)))
}

pub fn b64encode(value: String) -> String {
    BASE64.encode(value)
}

pub fn b64decode(value: String) -> Result<String, Error> {
    let bytes = BASE64
        .decode(value.trim())
        .map_err(|e| invalid(format!("b64dec: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| invalid(format!("b64dec: {}", e)))
}

fn plain(value: &Value) -> Option<String> {
    if value.is_undefined() || value.is_none() {
        return None;
    }
    Some(match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    })
}

/// `quote`: double-quoted with `"` and `\` escaped; nil quotes to nothing
pub fn quote(value: Value) -> String {
    match plain(&value) {
        Some(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        None => String::new(),
    }
}

/// `squote`: single-quoted as is; nil quotes to nothing
pub fn squote(value: Value) -> String {
    match plain(&value) {
        Some(s) => format!("'{}'", s),
        None => String::new(),
    }
}

/// `indent`: every line, blank ones included, gets `spaces` leading blanks
pub fn indent(value: String, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    format!("{}{}", pad, value.replace('\n', &format!("\n{}", pad)))
}

/// `nindent`: a newline, then `indent`
pub fn nindent(value: String, spaces: usize) -> String {
    format!("\n{}", indent(value, spaces))
}

/// `required`: fails with `message` on nil or an empty string
pub fn required(value: Value, message: Option<String>) -> Result<Value, Error> {
    let missing = value.is_undefined() || value.is_none() || value.as_str() == Some("");
    if missing {
        return Err(invalid(message.unwrap_or_else(|| "a required value is missing".to_string())));
    }
    Ok(value)
}

/// `trunc`: the first `length` characters, or the last ones when negative
pub fn trunc(value: String, length: i64) -> String {
    let count = value.chars().count() as i64;
    if length >= 0 {
        value.chars().take(length as usize).collect()
    } else if count + length > 0 {
        value.chars().skip((count + length) as usize).collect()
    } else {
        value
    }
}

pub fn trimprefix(value: String, prefix: String) -> String {
    match value.strip_prefix(prefix.as_str()) {
        Some(rest) => rest.to_string(),
        None => value,
    }
}

pub fn trimsuffix(value: String, suffix: String) -> String {
    match value.strip_suffix(suffix.as_str()) {
        Some(rest) => rest.to_string(),
        None => value,
    }
}

/// `sha256sum`: lowercase hex digest, e.g. for checksum annotations
pub fn sha256sum(value: String) -> String {
    format!("{:x}", Sha256::digest(value.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::Environment;

    #[test]
    fn test_toyaml_drops_final_newline() {
        let resources = Value::from_serialize(serde_json::json!({
            "limits": {"cpu": "500m"},
            "ports": [80, 443]
        }));
        assert_eq!(
            toyaml(resources).unwrap(),
            "limits:\n  cpu: 500m\nports:\n- 80\n- 443"
        );
        assert_eq!(toyaml(Value::from(())).unwrap(), "null");
    }

    #[test]
    fn test_tojson_is_compact() {
        let labels = Value::from_serialize(serde_json::json!({"app": "web"}));
        assert_eq!(tojson(labels).unwrap(), r#"{"app":"web"}"#);
    }

    #[test]
    fn test_base64() {
        assert_eq!(b64encode("admin:s3cret".to_string()), "YWRtaW46czNjcmV0");
        assert_eq!(b64decode("YWRtaW46czNjcmV0\n".to_string()).unwrap(), "admin:s3cret");
        assert!(b64decode("%%%".to_string()).is_err());
    }

    #[test]
    fn test_quoting_matches_helm() {
        assert_eq!(quote(Value::from("say \"hi\"")), r#""say \"hi\"""#);
        assert_eq!(quote(Value::from(8080)), "\"8080\"");
        assert_eq!(quote(Value::from(())), "");
        assert_eq!(squote(Value::from("it's")), "'it's'");
        assert_eq!(squote(Value::UNDEFINED), "");
    }

    #[test]
    fn test_indent_pads_every_line() {
        assert_eq!(indent("a\n\nb".to_string(), 2), "  a\n  \n  b");
        assert_eq!(nindent("a: 1\nb: 2".to_string(), 4), "\n    a: 1\n    b: 2");
    }

    #[test]
    fn test_required() {
        assert!(required(Value::from("web"), None).is_ok());
        assert!(required(Value::from(0), None).is_ok());
        let err = required(Value::from(""), Some("image.tag is required".to_string())).unwrap_err();
        assert!(err.to_string().contains("image.tag is required"));
        assert!(required(Value::UNDEFINED, None).is_err());
    }

    #[test]
    fn test_trunc_counts_characters() {
        assert_eq!(trunc("release-name".to_string(), 7), "release");
        assert_eq!(trunc("release-name".to_string(), -4), "name");
        assert_eq!(trunc("héllo".to_string(), 2), "hé");
        assert_eq!(trunc("ab".to_string(), -5), "ab");
    }

    #[test]
    fn test_trim_affixes() {
        assert_eq!(trimsuffix("web-".to_string(), "-".to_string()), "web");
        assert_eq!(trimprefix("v1.30.0".to_string(), "v".to_string()), "1.30.0");
        assert_eq!(trimprefix("1.30.0".to_string(), "v".to_string()), "1.30.0");
    }

    #[test]
    fn test_sha256sum() {
        assert_eq!(
            sha256sum("hello".to_string()),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_chained_in_environment() {
        let mut env = Environment::new();
        env.add_filter("toyaml", toyaml);
        env.add_filter("nindent", nindent);
        env.add_filter("quote", quote);

        let out = env
            .render_str(
                "resources:{{ r | toyaml | nindent(2) }}\nimage: {{ i | quote }}",
                minijinja::context! { r => serde_json::json!({"cpu": "1"}), i => "nginx:1.25" },
            )
            .unwrap();
        assert_eq!(out, "resources:\n  cpu: '1'\nimage: \"nginx:1.25\"");
    }
}
