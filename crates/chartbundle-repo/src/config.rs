//! Server configuration management
//!
//! Stores server connection details in `servers.yaml` under
//! `$CHARTBUNDLE_HOME`, or `~/.config/chartbundle/` when that is unset.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::credentials::ResolvedCredentials;
use crate::error::{RepoError, Result};

/// Environment variable overriding the configuration directory
pub const HOME_ENV: &str = "CHARTBUNDLE_HOME";

const CONFIG_FILE: &str = "servers.yaml";

/// Ids that collide with `config` sub-commands
pub const RESERVED_SERVER_IDS: &[&str] = &["delete", "use", "show", "clear"];

/// Server configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Configured servers
    #[serde(default)]
    pub servers: Vec<ServerDetails>,

    /// Id of the server used when none is named
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_server: Option<String>,
}

impl ServerConfig {
    /// Load configuration from default location
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to default location
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path()?;
        self.save_to(&path)
    }

    /// Save configuration to a specific path
    ///
    /// The file holds secrets, so it is only readable by the owner on Unix.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            let mut options = std::fs::OpenOptions::new();
            options.write(true).create(true).truncate(true).mode(0o600);
            std::io::Write::write_all(&mut options.open(path)?, content.as_bytes())?;
            Ok(())
        }

        #[cfg(not(unix))]
        {
            std::fs::write(path, content)?;
            Ok(())
        }
    }

    /// Get default configuration path
    pub fn default_path() -> Result<PathBuf> {
        if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(PathBuf::from(home).join(CONFIG_FILE));
        }
        let config_dir = dirs::config_dir().ok_or_else(|| RepoError::InvalidConfig {
            message: "Could not determine config directory".to_string(),
        })?;
        Ok(config_dir.join("chartbundle").join(CONFIG_FILE))
    }

    /// Get a server by id
    pub fn get(&self, id: &str) -> Option<&ServerDetails> {
        self.servers.iter().find(|s| s.server_id == id)
    }

    /// The default server, if any
    pub fn default_details(&self) -> Option<&ServerDetails> {
        self.default_server.as_deref().and_then(|id| self.get(id))
    }

    /// Add a server, replacing any server with the same id
    ///
    /// The first server added becomes the default.
    pub fn upsert(&mut self, details: ServerDetails, make_default: bool) -> Result<()> {
        validate_server_id(&details.server_id)?;

        let id = details.server_id.clone();
        match self.servers.iter_mut().find(|s| s.server_id == id) {
            Some(existing) => *existing = details,
            None => self.servers.push(details),
        }

        if make_default || self.default_details().is_none() {
            self.default_server = Some(id);
        }
        Ok(())
    }

    /// Remove a server by id
    ///
    /// Removing the default makes the first remaining server the default.
    pub fn remove(&mut self, id: &str) -> Result<ServerDetails> {
        let idx = self
            .servers
            .iter()
            .position(|s| s.server_id == id)
            .ok_or_else(|| RepoError::ServerNotFound { id: id.to_string() })?;
        let removed = self.servers.remove(idx);

        if self.default_server.as_deref() == Some(id) {
            self.default_server = self.servers.first().map(|s| s.server_id.clone());
        }
        Ok(removed)
    }

    /// Remove every server
    pub fn clear(&mut self) {
        self.servers.clear();
        self.default_server = None;
    }

    /// Make an existing server the default
    pub fn use_server(&mut self, id: &str) -> Result<()> {
        validate_server_id(id)?;
        if self.get(id).is_none() {
            return Err(RepoError::ServerNotFound { id: id.to_string() });
        }
        self.default_server = Some(id.to_string());
        Ok(())
    }

    /// List all server ids
    pub fn ids(&self) -> Vec<&str> {
        self.servers.iter().map(|s| s.server_id.as_str()).collect()
    }
}

/// Reject ids that would be parsed as `config` sub-commands
pub fn validate_server_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(RepoError::InvalidConfig {
            message: "server id must not be empty".to_string(),
        });
    }
    if RESERVED_SERVER_IDS.contains(&id) {
        return Err(RepoError::ReservedServerId {
            id: id.to_string(),
            reserved: RESERVED_SERVER_IDS.join(", "),
        });
    }
    Ok(())
}

/// Connection details for one Artifactory/Distribution pair
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerDetails {
    #[serde(default)]
    pub server_id: String,

    /// Artifactory URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Distribution URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Skip TLS certificate verification
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub insecure_tls: bool,
}

impl ServerDetails {
    /// Drop empty strings and normalize URLs and the API key
    ///
    /// An API key given with a user but no password is used as the password.
    pub fn normalized(mut self) -> Self {
        for field in [
            &mut self.url,
            &mut self.distribution_url,
            &mut self.user,
            &mut self.password,
            &mut self.api_key,
            &mut self.access_token,
        ] {
            if field.as_deref().is_some_and(str::is_empty) {
                *field = None;
            }
        }

        if self.user.is_some() && self.password.is_none() && self.api_key.is_some() {
            self.password = self.api_key.take();
        }

        self.url = self.url.map(with_trailing_slash);
        self.distribution_url = self.distribution_url.map(with_trailing_slash);
        self
    }

    /// Whether any connection setting was given explicitly
    fn connection_given(&self) -> bool {
        self.url.is_some()
            || self.user.is_some()
            || self.password.is_some()
            || self.api_key.is_some()
            || self.access_token.is_some()
    }

    /// Whether a complete authentication method is present
    fn auth_method_set(&self) -> bool {
        (self.user.is_some() && self.password.is_some())
            || self.api_key.is_some()
            || self.access_token.is_some()
    }

    /// Credentials to send, if any
    ///
    /// An access token wins over user and password, which win over an API key.
    pub fn credentials(&self) -> Option<ResolvedCredentials> {
        if let Some(token) = &self.access_token {
            return Some(ResolvedCredentials::Bearer {
                token: token.clone(),
            });
        }
        if let (Some(username), Some(password)) = (&self.user, &self.password) {
            return Some(ResolvedCredentials::Basic {
                username: username.clone(),
                password: password.clone(),
            });
        }
        self.api_key
            .as_ref()
            .map(|key| ResolvedCredentials::ApiKey { key: key.clone() })
    }

    /// Artifactory URL, or an error naming the missing option
    pub fn require_url(&self) -> Result<&str> {
        self.url.as_deref().ok_or_else(|| RepoError::InvalidConfig {
            message: "the --url option is mandatory".to_string(),
        })
    }

    /// Distribution URL, or an error naming the missing option
    pub fn require_distribution_url(&self) -> Result<&str> {
        self.distribution_url
            .as_deref()
            .ok_or_else(|| RepoError::InvalidConfig {
                message: "the --dist-url option is mandatory".to_string(),
            })
    }
}

/// Combine command-line connection settings with the stored configuration
///
/// When no connection setting was given on the command line, the URLs come
/// from the server named by `flags.server_id` (or the default server), and
/// its credentials are used unless the flags already carry a full
/// authentication method.
pub fn resolve_details(flags: ServerDetails, config: &ServerConfig) -> Result<ServerDetails> {
    let mut details = flags.normalized();

    if !details.connection_given() {
        let stored = if details.server_id.is_empty() {
            config.default_details()
        } else {
            Some(config.get(&details.server_id).ok_or_else(|| RepoError::ServerNotFound {
                id: details.server_id.clone(),
            })?)
        };

        if let Some(stored) = stored {
            tracing::debug!(server = %stored.server_id, "using configured server");
            let stored = stored.clone().normalized();

            details.url = details.url.or(stored.url);
            details.distribution_url = details.distribution_url.or(stored.distribution_url);
            if !details.auth_method_set() {
                details.api_key = details.api_key.or(stored.api_key);
                details.user = details.user.or(stored.user);
                details.password = details.password.or(stored.password);
                details.access_token = details.access_token.or(stored.access_token);
            }
            details.insecure_tls = details.insecure_tls || stored.insecure_tls;
            if details.server_id.is_empty() {
                details.server_id = stored.server_id;
            }
        }
    }

    Ok(details)
}

fn with_trailing_slash(url: String) -> String {
    if url.ends_with('/') {
        url
    } else {
        format!("{}/", url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(id: &str, url: &str) -> ServerDetails {
        ServerDetails {
            server_id: id.to_string(),
            url: Some(url.to_string()),
            distribution_url: Some(format!("{}/distribution", url)),
            user: Some("admin".to_string()),
            password: Some("secret".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_reserved_ids_are_rejected() {
        for id in RESERVED_SERVER_IDS {
            assert!(matches!(
                validate_server_id(id),
                Err(RepoError::ReservedServerId { .. })
            ));
        }
        assert!(validate_server_id("prod").is_ok());
        assert!(validate_server_id("").is_err());
    }

    #[test]
    fn test_first_server_becomes_default() {
        let mut config = ServerConfig::default();
        config.upsert(server("a", "https://a.example.com"), false).unwrap();
        config.upsert(server("b", "https://b.example.com"), false).unwrap();
        assert_eq!(config.default_server.as_deref(), Some("a"));

        config.upsert(server("b", "https://b2.example.com"), true).unwrap();
        assert_eq!(config.default_server.as_deref(), Some("b"));
        assert_eq!(config.ids(), vec!["a", "b"]);
        assert_eq!(config.get("b").unwrap().url.as_deref(), Some("https://b2.example.com"));
    }

    #[test]
    fn test_remove_default_promotes_first_remaining() {
        let mut config = ServerConfig::default();
        config.upsert(server("a", "https://a"), false).unwrap();
        config.upsert(server("b", "https://b"), false).unwrap();

        config.remove("a").unwrap();
        assert_eq!(config.default_server.as_deref(), Some("b"));

        config.remove("b").unwrap();
        assert!(config.default_server.is_none());
        assert!(matches!(config.remove("b"), Err(RepoError::ServerNotFound { .. })));
    }

    #[test]
    fn test_use_server() {
        let mut config = ServerConfig::default();
        config.upsert(server("a", "https://a"), false).unwrap();
        config.upsert(server("b", "https://b"), false).unwrap();

        config.use_server("b").unwrap();
        assert_eq!(config.default_details().unwrap().server_id, "b");
        assert!(config.use_server("missing").is_err());
        assert!(config.use_server("show").is_err());
    }

    #[test]
    fn test_normalized_moves_api_key_to_password() {
        let details = ServerDetails {
            url: Some("https://rt.example.com/artifactory".to_string()),
            user: Some("admin".to_string()),
            api_key: Some("AKCp".to_string()),
            password: Some(String::new()),
            ..Default::default()
        }
        .normalized();

        assert_eq!(details.password.as_deref(), Some("AKCp"));
        assert!(details.api_key.is_none());
        assert_eq!(details.url.as_deref(), Some("https://rt.example.com/artifactory/"));
    }

    #[test]
    fn test_resolve_uses_default_server_without_flags() {
        let mut config = ServerConfig::default();
        config.upsert(server("prod", "https://rt.example.com"), false).unwrap();

        let details = resolve_details(ServerDetails::default(), &config).unwrap();
        assert_eq!(details.server_id, "prod");
        assert_eq!(details.url.as_deref(), Some("https://rt.example.com/"));
        assert_eq!(
            details.distribution_url.as_deref(),
            Some("https://rt.example.com/distribution/")
        );
        assert_eq!(details.user.as_deref(), Some("admin"));
    }

    #[test]
    fn test_resolve_flags_win_over_config() {
        let mut config = ServerConfig::default();
        config.upsert(server("prod", "https://rt.example.com"), false).unwrap();

        let flags = ServerDetails {
            url: Some("https://other.example.com".to_string()),
            distribution_url: Some("https://dist.example.com".to_string()),
            access_token: Some("tok".to_string()),
            ..Default::default()
        };
        let details = resolve_details(flags, &config).unwrap();

        assert_eq!(details.url.as_deref(), Some("https://other.example.com/"));
        assert!(details.user.is_none());
        assert!(matches!(
            details.credentials(),
            Some(ResolvedCredentials::Bearer { .. })
        ));
    }

    #[test]
    fn test_resolve_unknown_server_id() {
        let flags = ServerDetails {
            server_id: "nope".to_string(),
            ..Default::default()
        };
        let err = resolve_details(flags, &ServerConfig::default()).unwrap_err();
        assert!(matches!(err, RepoError::ServerNotFound { .. }));
    }

    #[test]
    fn test_credentials_precedence() {
        let mut details = ServerDetails {
            api_key: Some("key".to_string()),
            ..Default::default()
        };
        assert!(matches!(details.credentials(), Some(ResolvedCredentials::ApiKey { .. })));

        details.user = Some("u".to_string());
        details.password = Some("p".to_string());
        assert!(matches!(details.credentials(), Some(ResolvedCredentials::Basic { .. })));

        details.access_token = Some("t".to_string());
        assert!(matches!(details.credentials(), Some(ResolvedCredentials::Bearer { .. })));
    }

    #[test]
    fn test_missing_distribution_url() {
        let details = ServerDetails::default();
        let err = details.require_distribution_url().unwrap_err();
        assert!(err.to_string().contains("--dist-url"));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let mut config = ServerConfig::default();
        config.upsert(server("prod", "https://rt.example.com"), false).unwrap();
        config.save_to(&path).unwrap();

        let loaded = ServerConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);

        let yaml = std::fs::read_to_string(&path).unwrap();
        assert!(yaml.contains("defaultServer: prod"));
        assert!(yaml.contains("distributionUrl"));
        assert!(!yaml.contains("insecureTls"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}
