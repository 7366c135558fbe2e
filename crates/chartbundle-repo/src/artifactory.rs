//! Artifactory client: chart download and AQL search

use async_trait::async_trait;
use chartbundle_core::{ArtifactSearch, BoxError, ChartSource, FileSpec};

use crate::aql::{AqlResponse, build_search_query};
use crate::config::ServerDetails;
use crate::credentials::{ScopedCredentials, SecureHttpClient};
use crate::error::{RepoError, Result};

const CHECKSUM_HEADER: &str = "X-Checksum-Sha256";
const AQL_ENDPOINT: &str = "api/search/aql";

/// Client for one Artifactory instance
pub struct ArtifactoryClient {
    base_url: String,
    http: SecureHttpClient,
}

impl ArtifactoryClient {
    /// Create a client from resolved server details
    pub fn new(details: &ServerDetails) -> Result<Self> {
        let base_url = details.require_url()?.to_string();
        let credentials = ScopedCredentials::single(&base_url, details.credentials());
        let http = SecureHttpClient::new(credentials, details.insecure_tls)?;
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Download a file by its repository path
    ///
    /// When the server reports a SHA-256 checksum the content is verified
    /// against it.
    pub async fn download(&self, path: &str) -> Result<Vec<u8>> {
        let url = url_append(&self.base_url, path);
        tracing::debug!(%url, "downloading");

        let response = self.http.get(&url).await?;
        let expected = response
            .headers()
            .get(CHECKSUM_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_lowercase());

        let bytes = response.bytes().await.map_err(|e| RepoError::NetworkError {
            message: format!("Failed to read {}: {}", url, e),
        })?;

        if let Some(expected) = expected {
            let actual = compute_digest(&bytes);
            if actual != expected {
                return Err(RepoError::ChecksumMismatch {
                    url,
                    expected,
                    actual,
                });
            }
        }

        Ok(bytes.to_vec())
    }

    /// Run an AQL query, returning the paths of the files found
    pub async fn search_aql(&self, query: &str) -> Result<Vec<String>> {
        let url = url_append(&self.base_url, AQL_ENDPOINT);
        let text = self
            .http
            .post_text(&url, "text/plain", query.to_string())
            .await?;

        let response: AqlResponse =
            serde_json::from_str(&text).map_err(|e| RepoError::InvalidResponse {
                message: format!("{}: {}", url, e),
            })?;

        Ok(response
            .results
            .iter()
            .filter(|item| item.is_file())
            .map(|item| item.full_path())
            .collect())
    }

    /// Find the files matching any pattern of a file specification
    pub async fn search_spec(&self, spec: &FileSpec) -> Result<Vec<String>> {
        let Some(query) = build_search_query(spec) else {
            return Ok(Vec::new());
        };
        tracing::debug!(%query, "searching");
        let paths = self.search_aql(&query).await?;
        tracing::debug!(found = paths.len(), "search finished");
        Ok(paths)
    }
}

#[async_trait]
impl ChartSource for ArtifactoryClient {
    async fn fetch_chart(&self, path: &str) -> std::result::Result<Vec<u8>, BoxError> {
        Ok(self.download(path).await?)
    }
}

#[async_trait]
impl ArtifactSearch for ArtifactoryClient {
    async fn search(&self, spec: &FileSpec) -> std::result::Result<Vec<String>, BoxError> {
        Ok(self.search_spec(spec).await?)
    }
}

/// Join a base URL and a repository path with exactly one `/`
pub fn url_append(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Compute the hex SHA-256 digest of data
fn compute_digest(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_append() {
        assert_eq!(
            url_append("https://rt.example.com/artifactory/", "/helm/app-1.0.tgz"),
            "https://rt.example.com/artifactory/helm/app-1.0.tgz"
        );
        assert_eq!(
            url_append("https://rt.example.com/artifactory", "helm/app-1.0.tgz"),
            "https://rt.example.com/artifactory/helm/app-1.0.tgz"
        );
    }

    #[test]
    fn test_compute_digest() {
        assert_eq!(
            compute_digest(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_client_requires_url() {
        let err = ArtifactoryClient::new(&ServerDetails::default()).err().unwrap();
        assert!(err.to_string().contains("--url"));
    }
}
