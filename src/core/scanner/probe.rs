// src/core/scanner/probe.rs

use std::time::Duration;
use tracing::{debug, warn};

use crate::core::catalog::{CategoryRule, Pattern};
use crate::core::error::TransportError;
use crate::core::models::{Evidence, Target};
use crate::core::scanner::fetch::{Fetch, FetchResponse};

/// The classified result of a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The fetch succeeded and the category predicate holds.
    Found { label: String, detail: String },
    /// The fetch succeeded but the predicate does not hold.
    NotFound { label: String },
    /// The fetch never produced a response.
    Failed(TransportError),
}

/// Maps a successful fetch to an outcome for one pattern.
pub type Classifier = fn(&Pattern, &str, &FetchResponse) -> Outcome;

/// Decides which outcomes become findings for a category.
pub type FindingRule = fn(&Outcome) -> Option<Evidence>;

/// Existence check: any 2xx status means the URL is there.
pub fn classify_status(_pattern: &Pattern, url: &str, response: &FetchResponse) -> Outcome {
    if response.is_success() {
        Outcome::Found { label: url.to_string(), detail: response.status.to_string() }
    } else {
        Outcome::NotFound { label: url.to_string() }
    }
}

/// Presence check for the header named by the pattern. The status is ignored.
pub fn classify_header(pattern: &Pattern, _url: &str, response: &FetchResponse) -> Outcome {
    match response.header(&pattern.name) {
        Some(value) => Outcome::Found { label: pattern.name.clone(), detail: value.to_string() },
        None => Outcome::NotFound { label: pattern.name.clone() },
    }
}

/// Only positive results are worth recording.
pub fn record_found(outcome: &Outcome) -> Option<Evidence> {
    match outcome {
        Outcome::Found { label, detail } => Some(Evidence { label: label.clone(), detail: detail.clone() }),
        Outcome::NotFound { .. } | Outcome::Failed(_) => None,
    }
}

/// Absence is itself a finding, recorded with the detail `missing`.
pub fn record_found_or_missing(outcome: &Outcome) -> Option<Evidence> {
    match outcome {
        Outcome::NotFound { label } => Some(Evidence { label: label.clone(), detail: "missing".to_string() }),
        _ => record_found(outcome),
    }
}

/// Sends exactly one request for `pattern` against `target` and classifies it.
///
/// `timeout` is passed to the fetcher and also enforced here, so a fetcher
/// that ignores it still yields `Failed(Timeout)` on time.
pub async fn probe(
    fetcher: &dyn Fetch,
    target: &Target,
    pattern: &Pattern,
    rule: &CategoryRule,
    timeout: Duration,
) -> Outcome {
    let url = pattern.url(target);
    debug!(url = %url, pattern = %pattern.name, "Sending probe.");

    let response = match tokio::time::timeout(timeout, fetcher.fetch(&url, timeout)).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            warn!(url = %url, error = %e, "Probe failed.");
            return Outcome::Failed(e);
        }
        Err(_) => {
            warn!(url = %url, ?timeout, "Probe exceeded its timeout.");
            return Outcome::Failed(TransportError::Timeout(timeout));
        }
    };

    let outcome = (rule.classify)(pattern, &url, &response);
    debug!(url = %url, status = response.status, ?outcome, "Probe classified.");
    outcome
}
