//! Credentials and the HTTP client that sends them
//!
//! Key security features:
//! - Credentials scoped to specific URL prefixes
//! - NEVER sends credentials after cross-origin redirect

use std::collections::HashMap;
use url::Url;

use crate::error::{RepoError, Result};

const MAX_REDIRECTS: u32 = 10;
const TIMEOUT_SECS: u64 = 30;
const API_KEY_HEADER: &str = "X-JFrog-Art-Api";

/// Resolved credentials ready for use
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedCredentials {
    Basic { username: String, password: String },
    Bearer { token: String },
    ApiKey { key: String },
}

impl ResolvedCredentials {
    /// Header name and value carrying these credentials
    pub fn auth_header(&self) -> (&'static str, String) {
        match self {
            ResolvedCredentials::Basic { username, password } => {
                let encoded = base64::Engine::encode(
                    &base64::engine::general_purpose::STANDARD,
                    format!("{}:{}", username, password),
                );
                ("Authorization", format!("Basic {}", encoded))
            }
            ResolvedCredentials::Bearer { token } => ("Authorization", format!("Bearer {}", token)),
            ResolvedCredentials::ApiKey { key } => (API_KEY_HEADER, key.clone()),
        }
    }
}

/// Scoped credentials - maps URL prefixes to credentials
/// SECURITY: Never sends credentials to URLs outside the scope
#[derive(Debug, Clone, Default)]
pub struct ScopedCredentials {
    scopes: HashMap<String, ResolvedCredentials>,
}

impl ScopedCredentials {
    /// Credentials for a single URL scope
    pub fn single(url_prefix: &str, credentials: Option<ResolvedCredentials>) -> Self {
        let mut scoped = Self::default();
        if let Some(credentials) = credentials {
            scoped.add(url_prefix, credentials);
        }
        scoped
    }

    /// Add credentials for a URL scope
    pub fn add(&mut self, url_prefix: &str, credentials: ResolvedCredentials) {
        let prefix = url_prefix.trim_end_matches('/').to_string();
        self.scopes.insert(prefix, credentials);
    }

    /// Get credentials for a URL (by longest matching prefix)
    pub fn for_url(&self, url: &str) -> Option<&ResolvedCredentials> {
        self.scopes
            .iter()
            .filter(|(prefix, _)| url.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, creds)| creds)
    }

    /// Check if two URLs are same-origin (for redirect safety)
    pub fn same_origin(url1: &str, url2: &str) -> bool {
        match (Url::parse(url1), Url::parse(url2)) {
            (Ok(u1), Ok(u2)) => {
                u1.scheme() == u2.scheme()
                    && u1.host() == u2.host()
                    && u1.port_or_known_default() == u2.port_or_known_default()
            }
            _ => false,
        }
    }
}

/// Body of an outgoing request
#[derive(Debug, Clone)]
enum Body {
    Empty,
    Text { content_type: &'static str, content: String },
    Json(serde_json::Value),
}

/// Secure HTTP client wrapper with redirect protection
pub struct SecureHttpClient {
    client: reqwest::Client,
    credentials: ScopedCredentials,
}

impl SecureHttpClient {
    /// Create a new secure HTTP client
    pub fn new(credentials: ScopedCredentials, insecure_tls: bool) -> Result<Self> {
        let client = reqwest::Client::builder()
            // Redirects are followed manually to keep credentials on their origin
            .redirect(reqwest::redirect::Policy::none())
            .timeout(std::time::Duration::from_secs(TIMEOUT_SECS))
            .danger_accept_invalid_certs(insecure_tls)
            .build()
            .map_err(|e| RepoError::NetworkError {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            credentials,
        })
    }

    /// Fetch a URL with secure redirect handling
    pub async fn get(&self, url: &str) -> Result<reqwest::Response> {
        self.send(reqwest::Method::GET, url, &Body::Empty, &[]).await
    }

    /// POST a text body, returning the response text
    pub async fn post_text(&self, url: &str, content_type: &'static str, content: String) -> Result<String> {
        let body = Body::Text {
            content_type,
            content,
        };
        let response = self.send(reqwest::Method::POST, url, &body, &[]).await?;
        response.text().await.map_err(|e| RepoError::NetworkError {
            message: e.to_string(),
        })
    }

    /// POST a JSON body with extra headers, returning the response text
    pub async fn post_json<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        payload: &T,
        headers: &[(&str, &str)],
    ) -> Result<String> {
        let body = Body::Json(serde_json::to_value(payload)?);
        let response = self.send(reqwest::Method::POST, url, &body, headers).await?;
        response.text().await.map_err(|e| RepoError::NetworkError {
            message: e.to_string(),
        })
    }

    /// Send a request, following redirects by re-issuing it
    ///
    /// Extra headers may carry secrets, so they travel with the credentials.
    /// SECURITY: Neither is sent after a cross-origin redirect
    async fn send(
        &self,
        method: reqwest::Method,
        url: &str,
        body: &Body,
        headers: &[(&str, &str)],
    ) -> Result<reqwest::Response> {
        let mut current_url = url.to_string();
        let mut redirects = 0;

        loop {
            let mut request = self.client.request(method.clone(), &current_url);
            request = match body {
                Body::Empty => request,
                Body::Text {
                    content_type,
                    content,
                } => request
                    .header(reqwest::header::CONTENT_TYPE, *content_type)
                    .body(content.clone()),
                Body::Json(value) => request.json(value),
            };

            if ScopedCredentials::same_origin(url, &current_url) {
                for (name, value) in headers {
                    request = request.header(*name, *value);
                }
                if let Some(creds) = self.credentials.for_url(&current_url) {
                    let (name, value) = creds.auth_header();
                    request = request.header(name, value);
                }
            } else {
                tracing::warn!(
                    "Cross-origin redirect from {} to {} - credentials and headers not forwarded",
                    url,
                    current_url
                );
            }

            tracing::debug!(%method, url = %current_url, "sending request");
            let response = request.send().await?;
            let status = response.status();

            if status.is_redirection() {
                redirects += 1;
                if redirects > MAX_REDIRECTS {
                    return Err(RepoError::NetworkError {
                        message: format!("Too many redirects (max {})", MAX_REDIRECTS),
                    });
                }

                let location = response
                    .headers()
                    .get("Location")
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| RepoError::NetworkError {
                        message: "Redirect without Location header".to_string(),
                    })?;

                let base = Url::parse(&current_url)?;
                current_url = base.join(location)?.to_string();
                continue;
            }

            return check_status(response, &current_url).await;
        }
    }
}

/// Map error statuses to typed errors naming the URL
async fn check_status(response: reqwest::Response, url: &str) -> Result<reqwest::Response> {
    let status = response.status();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);
        return Err(RepoError::RateLimited { retry_after });
    }

    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(RepoError::AuthRequired {
            url: url.to_string(),
        });
    }
    if status == reqwest::StatusCode::FORBIDDEN {
        return Err(RepoError::AuthFailed {
            message: format!("Access denied to {}", url),
        });
    }

    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        let detail = detail.trim();
        let message = if detail.is_empty() {
            format!("Request to {} failed", url)
        } else {
            format!("Request to {} failed: {}", url, detail)
        };
        return Err(RepoError::HttpError {
            status: status.as_u16(),
            message,
        });
    }

    Ok(response)
}
