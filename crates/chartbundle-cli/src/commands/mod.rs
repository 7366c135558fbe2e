//! CLI commands

pub mod config;
pub mod from_chart;
pub mod spec;
pub mod use_server;

use chartbundle_repo::ServerDetails;
use clap::Args;

/// Server connection flags shared by every command that talks to a server
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// Artifactory URL
    #[arg(long, env = "CHARTBUNDLE_URL")]
    pub url: Option<String>,

    /// Distribution URL
    #[arg(long = "dist-url", env = "CHARTBUNDLE_DIST_URL")]
    pub dist_url: Option<String>,

    /// Username
    #[arg(long, env = "CHARTBUNDLE_USER")]
    pub user: Option<String>,

    /// Password
    #[arg(long, env = "CHARTBUNDLE_PASSWORD")]
    pub password: Option<String>,

    /// API key
    #[arg(long)]
    pub apikey: Option<String>,

    /// Access token
    #[arg(long = "access-token", env = "CHARTBUNDLE_ACCESS_TOKEN")]
    pub access_token: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long = "insecure-tls")]
    pub insecure_tls: bool,
}

impl ConnectionArgs {
    /// Server details for these flags
    pub fn to_details(&self, server_id: Option<&str>) -> ServerDetails {
        ServerDetails {
            server_id: server_id.unwrap_or_default().to_string(),
            url: self.url.clone(),
            distribution_url: self.dist_url.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            api_key: self.apikey.clone(),
            access_token: self.access_token.clone(),
            insecure_tls: self.insecure_tls,
        }
    }
}

/// Mask a secret for display
pub(crate) fn mask(secret: &str) -> String {
    if secret.is_empty() {
        String::new()
    } else {
        "*".repeat(secret.chars().count().min(8))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_details() {
        let args = ConnectionArgs {
            url: Some("https://rt.example.com/artifactory".to_string()),
            apikey: Some("AKCp".to_string()),
            ..Default::default()
        };
        let details = args.to_details(Some("prod"));
        assert_eq!(details.server_id, "prod");
        assert_eq!(details.api_key.as_deref(), Some("AKCp"));
        assert!(!details.insecure_tls);
    }

    #[test]
    fn test_mask() {
        assert_eq!(mask(""), "");
        assert_eq!(mask("abc"), "***");
        assert_eq!(mask("a-very-long-password"), "********");
    }
}
