// src/core/scanner/fetch.rs

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::core::error::TransportError;

/// Status and headers of a completed HTTP GET.
///
/// Header names are stored lowercased so lookups are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
}

impl FetchResponse {
    pub fn new(status: u16) -> Self {
        Self { status, headers: BTreeMap::new() }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The transport capability consumed by the probe executor.
///
/// Implementations must be cancel-safe: the coordinator drops in-flight
/// fetches when a run's deadline passes.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchResponse, TransportError>;
}

/// `Fetch` backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("ReconRS/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Request(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchResponse, TransportError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(e, timeout))?;

        debug!(url, status = %response.status(), "Received HTTP response.");

        let mut headers = BTreeMap::new();
        for (name, value) in response.headers() {
            let value = match value.to_str() {
                Ok(s) => s.to_string(),
                Err(_) => {
                    warn!(header_name = %name, "Header contained invalid UTF-8.");
                    "[Invalid UTF-8]".to_string()
                }
            };
            // Repeated headers keep their first value.
            headers.entry(name.as_str().to_string()).or_insert(value);
        }

        Ok(FetchResponse { status: response.status().as_u16(), headers })
    }
}

fn classify_reqwest_error(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(timeout)
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Request(err.to_string())
    }
}
