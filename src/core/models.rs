// src/core/models.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use url::Url;

use crate::core::error::{ScanError, TransportError};

// --- Target ---

/// A domain (optionally with a port) that patterns are expanded against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Target(String);

impl Target {
    /// Validates user input and reduces it to a bare host.
    ///
    /// A leading `http://` or `https://` and any trailing path are stripped,
    /// so `https://Example.com/login` becomes `example.com`. Input that does
    /// not reduce to a host is rejected with `ScanError::InvalidTarget`.
    pub fn parse(input: &str) -> Result<Self, ScanError> {
        let trimmed = input.trim();
        let invalid = |reason: &str| ScanError::InvalidTarget {
            target: input.to_string(),
            reason: reason.to_string(),
        };

        if trimmed.is_empty() {
            return Err(invalid("target is empty"));
        }

        let with_scheme = if trimmed.contains("://") {
            if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
                return Err(invalid("only http and https targets can be scanned"));
            }
            trimmed.to_string()
        } else {
            format!("https://{}", trimmed)
        };

        let url = Url::parse(&with_scheme).map_err(|e| invalid(&e.to_string()))?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid("no host name"))?;

        let host = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        Ok(Self(host))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// --- Category ---

/// Groups patterns and the findings they produce.
///
/// The kebab-case name is what the CLI accepts and what exports use as keys.
/// Short aliases (`api`, `headers`, `cloud`, `content`) are also accepted.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(ascii_case_insensitive)]
pub enum Category {
    #[strum(to_string = "api-endpoints", serialize = "api")]
    ApiEndpoints,
    #[strum(to_string = "security-headers", serialize = "headers")]
    SecurityHeaders,
    #[strum(to_string = "cloud-resources", serialize = "cloud")]
    CloudResources,
    #[strum(to_string = "content-discovery", serialize = "content")]
    ContentDiscovery,
}

impl Category {
    /// Parses a category name, mapping failure to `ScanError::UnknownCategory`.
    pub fn parse(name: &str) -> Result<Self, ScanError> {
        name.trim()
            .parse::<Category>()
            .map_err(|_| ScanError::UnknownCategory(name.to_string()))
    }

    /// Every category, in declaration order.
    pub fn all() -> Vec<Category> {
        Category::iter().collect()
    }

    /// A human-friendly title, used by `list` output.
    pub fn title(&self) -> &'static str {
        match self {
            Category::ApiEndpoints => "API Endpoints",
            Category::SecurityHeaders => "Security Headers",
            Category::CloudResources => "Cloud Resources",
            Category::ContentDiscovery => "Content Discovery",
        }
    }
}

// --- Findings ---

/// Label and detail pulled out of a classified probe outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evidence {
    pub label: String,
    pub detail: String,
}

/// One recorded piece of evidence. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub category: Category,
    pub target: Target,
    /// A URL or header name.
    pub label: String,
    /// Status code, header value, or `missing`.
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

impl Finding {
    pub fn new(category: Category, target: &Target, evidence: Evidence) -> Self {
        Self {
            category,
            target: target.clone(),
            label: evidence.label,
            detail: evidence.detail,
            timestamp: Utc::now(),
        }
    }
}

// --- Scan runs ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum RunStatus {
    /// Every pattern reached Found or NotFound.
    Completed,
    /// The overall deadline elapsed; findings are partial.
    TimedOut,
    /// At least one pattern failed permanently after its retries.
    PartiallyFailed,
}

/// A pattern whose probe kept failing at the transport level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeFailure {
    pub label: String,
    pub url: String,
    pub attempts: u32,
    pub error: TransportError,
}

/// The result of running every pattern of one category against one target.
#[derive(Debug, Clone)]
pub struct ScanRun {
    pub target: Target,
    pub category: Category,
    /// In catalog order.
    pub findings: Vec<Finding>,
    /// In catalog order.
    pub failures: Vec<ProbeFailure>,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ScanRun {
    pub fn is_partial(&self) -> bool {
        self.status == RunStatus::TimedOut
    }
}
