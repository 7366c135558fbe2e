//! Chartbundle server access
//!
//! This crate talks to the artifact store and the distribution service:
//!
//! - **Server configuration**: named servers stored in `servers.yaml`
//! - **Artifactory**: chart download and AQL search
//! - **Distribution**: release bundle creation
//!
//! ## Example
//!
//! ```rust,no_run
//! use chartbundle_repo::{ArtifactoryClient, ServerConfig, ServerDetails, resolve_details};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfig::load()?;
//! let details = resolve_details(ServerDetails::default(), &config)?;
//!
//! let client = ArtifactoryClient::new(&details)?;
//! let chart = client.download("helm/app-1.0.0.tgz").await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Security Notes
//!
//! - Credentials are NEVER sent after cross-origin redirects
//! - Downloads are checked against the server's SHA-256 checksum when present

pub mod aql;
pub mod artifactory;
pub mod config;
pub mod credentials;
pub mod distribution;
pub mod error;

pub use aql::{AqlItem, AqlResponse, PatternQuery, build_search_query};
pub use artifactory::{ArtifactoryClient, url_append};
pub use config::{RESERVED_SERVER_IDS, ServerConfig, ServerDetails, resolve_details, validate_server_id};
pub use credentials::{ResolvedCredentials, ScopedCredentials, SecureHttpClient};
pub use distribution::{DistributionClient, ReleaseBundleParams, ReleaseNotesSyntax};
pub use error::{RepoError, Result};
