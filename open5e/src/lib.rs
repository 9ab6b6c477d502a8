//! Minimal Open5e API client.
//!
//! This crate provides a focused client for the Open5e REST API with:
//! - Single-record lookups by resource type and slug
//! - Paged name searches within one resource type
//! - Configurable base URL and request timeout

use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const API_BASE: &str = "https://api.open5e.com/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// Errors that can occur when using the Open5e client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Record not found: {resource}/{slug}")]
    NotFound { resource: String, slug: String },

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// One page of a list or search response.
#[derive(Debug, Clone, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub results: Vec<Value>,
}

/// Open5e API client.
#[derive(Clone, Debug)]
pub struct Open5e {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl Open5e {
    /// Create a client against the public Open5e API.
    pub fn new() -> Result<Self, Error> {
        Self::with_config(API_BASE, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a client against a custom base URL (a mirror or a local fixture server).
    pub fn with_config(base_url: impl Into<String>, timeout: Duration) -> Result<Self, Error> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "base URL must start with http:// or https://, got {base_url:?}"
            )));
        }
        if timeout.is_zero() {
            return Err(Error::Config("timeout must be non-zero".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(CONNECT_TIMEOUT_SECS)))
            .user_agent(concat!("aidnd/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    /// Create a client from the OPEN5E_BASE_URL environment variable, falling
    /// back to the public API.
    pub fn from_env() -> Result<Self, Error> {
        match std::env::var("OPEN5E_BASE_URL") {
            Ok(base) if !base.trim().is_empty() => {
                Self::with_config(base.trim(), Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            }
            _ => Self::new(),
        }
    }

    /// Replace the request timeout.
    pub fn with_timeout(self, timeout: Duration) -> Result<Self, Error> {
        Self::with_config(self.base_url, timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// URL of a single record, e.g. `{base}/monsters/goblin/`.
    pub fn record_url(&self, resource: &str, slug: &str) -> Result<String, Error> {
        validate_segment("resource", resource)?;
        validate_segment("slug", slug)?;
        Ok(format!("{}/{}/{}/", self.base_url, resource, slug))
    }

    /// Fetch the full JSON body of one record.
    pub async fn get_record(&self, resource: &str, slug: &str) -> Result<Value, Error> {
        let url = self.record_url(resource, slug)?;
        debug!(%url, "GET record");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(map_transport_error)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound {
                resource: resource.to_string(),
                slug: slug.to_string(),
            });
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status,
                message: body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))
    }

    /// Search one resource type by name.
    pub async fn search(&self, resource: &str, query: &str, limit: usize) -> Result<Page, Error> {
        validate_segment("resource", resource)?;
        let url = format!("{}/{}/", self.base_url, resource);
        debug!(%url, query, limit, "GET search");
        let limit = limit.max(1).to_string();

        let response = self
            .client
            .get(&url)
            .query(&[("search", query), ("limit", limit.as_str())])
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status,
                message: body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))
    }
}

fn map_transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout
    } else {
        Error::Network(e.to_string())
    }
}

/// Path segments are restricted so a slug can never rewrite the request path.
fn validate_segment(what: &str, segment: &str) -> Result<(), Error> {
    let valid = !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::Config(format!("invalid {what}: {segment:?}")))
    }
}
