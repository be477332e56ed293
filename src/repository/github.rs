//! GitHub transport.
//!
//! Tag listing goes through the REST API, descriptors through the raw
//! content host and archives through the web host.

use std::io::{self, Write};
use std::time::{Duration, Instant};

use reqwest::blocking::{Client, Response};
use reqwest::header::ACCEPT;
use tracing::{debug, info, warn};

use super::RemoteError;
use super::host::{RepoId, RepositoryHost, Tag};
use crate::config::Settings;

/// User agent sent with every request.
const USER_AGENT: &str = concat!("extkeeper/", env!("CARGO_PKG_VERSION"));

/// Tags requested per listing call.
const TAGS_PER_PAGE: u32 = 100;

/// GitHub-backed [`RepositoryHost`].
pub struct GitHubHost {
    /// HTTP client with the request timeout applied.
    client: Client,
    /// REST API base, e.g. `https://api.github.com`.
    api_base: String,
    /// Web base for archives, e.g. `https://github.com`.
    archive_base: String,
    /// Raw content base, e.g. `https://raw.githubusercontent.com`.
    raw_base: String,
}

impl GitHubHost {
    /// Creates a host using the endpoints and timeout in `settings`.
    pub fn new(settings: &Settings) -> Result<Self, RemoteError> {
        Self::with_endpoints(
            &settings.api_base,
            &settings.archive_base,
            &settings.raw_base,
            settings.request_timeout,
        )
    }

    /// Creates a host with explicit endpoints.
    pub fn with_endpoints(
        api_base: &str,
        archive_base: &str,
        raw_base: &str,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Unreachable {
                url: api_base.to_string(),
                reason: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            archive_base: archive_base.trim_end_matches('/').to_string(),
            raw_base: raw_base.trim_end_matches('/').to_string(),
        })
    }

    /// URL of the tag listing for `repo`.
    #[must_use]
    pub fn tags_url(&self, repo: &RepoId) -> String {
        format!(
            "{}/repos/{}/{}/tags?per_page={}",
            self.api_base, repo.owner, repo.name, TAGS_PER_PAGE
        )
    }

    /// URL of a raw file on `branch`.
    #[must_use]
    pub fn raw_url(&self, repo: &RepoId, branch: &str, path: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.raw_base,
            repo.owner,
            repo.name,
            branch,
            path.trim_start_matches('/')
        )
    }

    /// Sends a GET and rejects non-success statuses.
    fn get(&self, url: &str, accept: Option<&str>) -> Result<Response, RemoteError> {
        debug!("[REMOTE] GET {}", url);
        let start = Instant::now();

        let mut request = self.client.get(url);
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }

        let response = request.send().map_err(|e| {
            warn!("[REMOTE] HTTP request failed: {}", e);
            unreachable(url, &e)
        })?;

        let status = response.status();
        debug!("[REMOTE] Response: {} in {:?}", status, start.elapsed());

        if status == reqwest::StatusCode::FORBIDDEN
            && response
                .headers()
                .get("x-ratelimit-remaining")
                .and_then(|v| v.to_str().ok())
                == Some("0")
        {
            warn!("[REMOTE] GitHub rate limit exceeded");
            return Err(RemoteError::Unreachable {
                url: url.to_string(),
                reason: "rate limit exceeded".to_string(),
            });
        }

        if !status.is_success() {
            warn!("[REMOTE] Non-success status {} for {}", status, url);
            return Err(RemoteError::Unreachable {
                url: url.to_string(),
                reason: format!("HTTP {}", status),
            });
        }

        Ok(response)
    }
}

fn unreachable(url: &str, error: &reqwest::Error) -> RemoteError {
    let reason = if error.is_timeout() {
        "request timed out".to_string()
    } else {
        error.to_string()
    };
    RemoteError::Unreachable {
        url: url.to_string(),
        reason,
    }
}

impl RepositoryHost for GitHubHost {
    fn list_tags(&self, repo: &RepoId) -> Result<Vec<Tag>, RemoteError> {
        let url = self.tags_url(repo);
        let response = self.get(&url, Some("application/vnd.github.v3+json"))?;

        let tags: Vec<Tag> = response.json().map_err(|e| {
            if e.is_timeout() {
                unreachable(&url, &e)
            } else {
                RemoteError::InvalidResponse {
                    url: url.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        info!("[REMOTE] {} has {} tag(s)", repo, tags.len());
        Ok(tags)
    }

    fn fetch_file(&self, repo: &RepoId, branch: &str, path: &str) -> Result<Vec<u8>, RemoteError> {
        let url = self.raw_url(repo, branch, path);
        let response = self.get(&url, None)?;
        let bytes = response.bytes().map_err(|e| unreachable(&url, &e))?;
        debug!("[REMOTE] Fetched {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }

    fn branch_archive_url(&self, repo: &RepoId, branch: &str) -> String {
        format!(
            "{}/{}/{}/archive/{}.zip",
            self.archive_base, repo.owner, repo.name, branch
        )
    }

    fn download(&self, url: &str, dest: &mut dyn Write) -> Result<u64, RemoteError> {
        let start = Instant::now();
        let mut response = self.get(url, None)?;
        if let Some(length) = response.content_length() {
            debug!("[REMOTE] Downloading {} bytes from {}", length, url);
        }

        let bytes = io::copy(&mut response, dest).map_err(|e| RemoteError::Unreachable {
            url: url.to_string(),
            reason: format!("download interrupted: {}", e),
        })?;

        info!("[REMOTE] Downloaded {} bytes in {:?}", bytes, start.elapsed());
        Ok(bytes)
    }
}
