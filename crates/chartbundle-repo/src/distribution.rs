//! Distribution client: release bundle creation

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chartbundle_core::{BoxError, BundleCreator, FileSpec};
use serde::{Deserialize, Serialize};

use crate::aql::PatternQuery;
use crate::artifactory::url_append;
use crate::config::ServerDetails;
use crate::credentials::{ScopedCredentials, SecureHttpClient};
use crate::error::{RepoError, Result};

const RELEASE_BUNDLE_ENDPOINT: &str = "api/v1/release_bundle";
const PASSPHRASE_HEADER: &str = "X-GPG-PASSPHRASE";

/// Markup of the release notes attached to a bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseNotesSyntax {
    Markdown,
    Asciidoc,
    #[default]
    PlainText,
}

impl ReleaseNotesSyntax {
    /// Guess the syntax from a release-notes file name
    pub fn infer(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("md") | Some("markdown") => Self::Markdown,
            _ => Self::PlainText,
        }
    }

    /// An explicit syntax wins; otherwise infer it from the notes file
    pub fn resolve(explicit: Option<&str>, path: Option<&Path>) -> Result<Self> {
        match (explicit, path) {
            (Some(s), _) => s.parse(),
            (None, Some(path)) => Ok(Self::infer(path)),
            (None, None) => Ok(Self::default()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Asciidoc => "asciidoc",
            Self::PlainText => "plain_text",
        }
    }
}

impl FromStr for ReleaseNotesSyntax {
    type Err = RepoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "markdown" => Ok(Self::Markdown),
            "asciidoc" => Ok(Self::Asciidoc),
            "plain_text" => Ok(Self::PlainText),
            _ => Err(RepoError::InvalidConfig {
                message: "--release-notes-syntax must be one of: markdown, asciidoc or plain_text."
                    .to_string(),
            }),
        }
    }
}

/// Everything about the bundle except its content
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseBundleParams {
    pub name: String,
    pub version: String,
    pub sign_immediately: bool,
    pub storing_repository: Option<String>,
    pub gpg_passphrase: Option<String>,
    pub description: Option<String>,
    pub release_notes: Option<String>,
    pub release_notes_syntax: ReleaseNotesSyntax,
}

#[derive(Debug, Serialize)]
struct ReleaseNotesBody<'a> {
    syntax: ReleaseNotesSyntax,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct QueryBody {
    aql: String,
    query_name: String,
}

#[derive(Debug, Serialize)]
struct BundleSpecBody {
    queries: Vec<QueryBody>,
}

/// Body of `POST api/v1/release_bundle`
#[derive(Debug, Serialize)]
struct ReleaseBundleBody<'a> {
    name: &'a str,
    version: &'a str,
    dry_run: bool,
    sign_immediately: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    storing_repository: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    release_notes: Option<ReleaseNotesBody<'a>>,
    spec: BundleSpecBody,
}

impl<'a> ReleaseBundleBody<'a> {
    fn new(params: &'a ReleaseBundleParams, spec: &FileSpec) -> Self {
        let queries = spec
            .patterns()
            .filter_map(PatternQuery::parse)
            .enumerate()
            .map(|(i, query)| QueryBody {
                aql: query.to_aql(),
                query_name: format!("query-{}", i + 1),
            })
            .collect();

        Self {
            name: &params.name,
            version: &params.version,
            dry_run: false,
            sign_immediately: params.sign_immediately,
            storing_repository: params.storing_repository.as_deref(),
            description: params.description.as_deref(),
            release_notes: params.release_notes.as_deref().map(|content| ReleaseNotesBody {
                syntax: params.release_notes_syntax,
                content,
            }),
            spec: BundleSpecBody { queries },
        }
    }
}

/// Client creating release bundles on one Distribution instance
pub struct DistributionClient {
    base_url: String,
    http: SecureHttpClient,
    params: ReleaseBundleParams,
}

impl DistributionClient {
    pub fn new(details: &ServerDetails, params: ReleaseBundleParams) -> Result<Self> {
        let base_url = details.require_distribution_url()?.to_string();
        let credentials = ScopedCredentials::single(&base_url, details.credentials());
        let http = SecureHttpClient::new(credentials, details.insecure_tls)?;
        Ok(Self {
            base_url,
            http,
            params,
        })
    }

    pub fn params(&self) -> &ReleaseBundleParams {
        &self.params
    }

    /// Create a release bundle holding every artifact the spec matches
    pub async fn create_release_bundle(&self, spec: &FileSpec) -> Result<String> {
        let url = url_append(&self.base_url, RELEASE_BUNDLE_ENDPOINT);
        let body = ReleaseBundleBody::new(&self.params, spec);

        let mut headers = Vec::new();
        if let Some(passphrase) = self.params.gpg_passphrase.as_deref() {
            headers.push((PASSPHRASE_HEADER, passphrase));
        }

        tracing::debug!(
            name = %self.params.name,
            version = %self.params.version,
            queries = body.spec.queries.len(),
            "creating release bundle"
        );
        self.http.post_json(&url, &body, &headers).await
    }
}

#[async_trait]
impl BundleCreator for DistributionClient {
    async fn create_bundle(&self, spec: &FileSpec) -> std::result::Result<(), BoxError> {
        self.create_release_bundle(spec).await?;
        Ok(())
    }
}
