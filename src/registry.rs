//! Package registry client.
//!
//! The registry lists known packages and accepts new submissions. Both calls
//! are thin pass-throughs over HTTP.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Settings;

/// Errors raised by registry calls.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Transport failure or non-success status.
    #[error("Registry request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The listing is not a JSON list of entries.
    #[error("Invalid registry response: {0}")]
    InvalidResponse(String),
}

/// A package listed in the registry.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RegistryEntry {
    /// Package name.
    pub name: String,
    /// Source repository in `owner/name` form.
    #[serde(default)]
    pub repository: Option<String>,
    /// Author name.
    #[serde(default)]
    pub author: Option<String>,
    /// Short description.
    #[serde(default)]
    pub description: Option<String>,
    /// Fields this client does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A submission to the registry, sent form-encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NewRegistryEntry {
    pub name: String,
    pub repository: String,
    /// Package folder name inside the repository.
    pub filename: String,
    pub author: String,
    pub description: String,
}

/// Registry endpoint.
pub struct Registry {
    client: Client,
    url: String,
}

impl Registry {
    /// Creates a client for `url`.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, RegistryError> {
        let client = Client::builder()
            .user_agent(concat!("extkeeper/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    /// Creates a client for the configured registry.
    pub fn from_settings(settings: &Settings) -> Result<Self, RegistryError> {
        Self::new(&settings.registry_url, settings.request_timeout)
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Lists all registered packages.
    pub fn all(&self) -> Result<Vec<RegistryEntry>, RegistryError> {
        debug!("[REGISTRY] GET {}", self.url);
        let response = self.client.get(&self.url).send()?.error_for_status()?;
        let body: Value = response.json()?;
        let entries = parse_entries(body)?;
        info!("[REGISTRY] {} registered package(s)", entries.len());
        Ok(entries)
    }

    /// Submits a package and returns the response status unchanged.
    pub fn add(&self, entry: &NewRegistryEntry) -> Result<StatusCode, RegistryError> {
        info!("[REGISTRY] Submitting {} ({})", entry.name, entry.repository);
        let status = self.client.post(&self.url).form(entry).send()?.status();
        if !status.is_success() {
            warn!("[REGISTRY] Submission returned {}", status);
        }
        Ok(status)
    }
}

/// Accepts either a bare list or an object wrapping it under `registry`.
fn parse_entries(body: Value) -> Result<Vec<RegistryEntry>, RegistryError> {
    let list = match body {
        Value::Array(_) => body,
        Value::Object(mut map) => map
            .remove("registry")
            .ok_or_else(|| RegistryError::InvalidResponse("missing registry list".to_string()))?,
        other => {
            return Err(RegistryError::InvalidResponse(format!(
                "expected a list, got {}",
                other
            )));
        }
    };
    serde_json::from_value(list).map_err(|e| RegistryError::InvalidResponse(e.to_string()))
}
