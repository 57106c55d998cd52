// src/core/scanner/coordinator.rs

use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::core::catalog::{Catalog, CategoryRule, Pattern};
use crate::core::config::ScanConfig;
use crate::core::error::ScanError;
use crate::core::models::{Category, Finding, ProbeFailure, RunStatus, ScanRun, Target};
use crate::core::scanner::fetch::Fetch;
use crate::core::scanner::probe::{probe, Outcome};

/// Drives every pattern of one category against one target.
///
/// The coordinator holds no per-run state, so one instance can serve any
/// number of concurrent runs.
#[derive(Clone)]
pub struct Coordinator {
    fetcher: Arc<dyn Fetch>,
    catalog: Arc<Catalog>,
}

/// A probe that reached a terminal outcome, tagged with its catalog position.
struct Settled {
    index: usize,
    outcome: Outcome,
    attempts: u32,
}

impl Coordinator {
    pub fn new(fetcher: Arc<dyn Fetch>, catalog: Arc<Catalog>) -> Self {
        Self { fetcher, catalog }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Runs one category against `target`.
    ///
    /// At most `config.max_concurrency` probes are in flight. Transport
    /// failures are retried with exponential backoff. When
    /// `config.overall_deadline` passes, the remaining probes are dropped and
    /// the run is returned as `TimedOut` with whatever findings completed.
    /// Findings always come back in catalog order.
    pub async fn run(
        &self,
        target: &Target,
        category: Category,
        config: &ScanConfig,
    ) -> Result<ScanRun, ScanError> {
        config.validate()?;
        let entry = self.catalog.entry(category)?;
        let patterns = entry.patterns.as_slice();
        let rule = &entry.rule;
        let fetcher = self.fetcher.as_ref();

        info!(%target, %category, patterns = patterns.len(), "Starting scan run.");
        let started_at = Utc::now();
        let deadline = Instant::now()
            .checked_add(config.overall_deadline)
            .ok_or_else(|| ScanError::InvalidConfig("deadline is too far in the future".to_string()))?;

        let mut probes = stream::iter(patterns.iter().enumerate())
            .map(|(index, pattern)| async move {
                let (outcome, attempts) =
                    probe_with_retries(fetcher, target, pattern, rule, config).await;
                Settled { index, outcome, attempts }
            })
            .buffer_unordered(config.max_concurrency);

        let mut settled = Vec::with_capacity(patterns.len());
        let mut timed_out = false;
        loop {
            match timeout_at(deadline, probes.next()).await {
                Ok(Some(done)) => settled.push(done),
                Ok(None) => break,
                Err(_) => {
                    timed_out = true;
                    break;
                }
            }
        }
        // Dropping the stream cancels every probe still in flight.
        drop(probes);

        if timed_out {
            warn!(
                %target,
                %category,
                completed = settled.len(),
                total = patterns.len(),
                "Scan run hit its deadline; keeping partial results."
            );
        }

        settled.sort_by_key(|s| s.index);

        let mut findings = Vec::new();
        let mut failures = Vec::new();
        for Settled { index, outcome, attempts } in settled {
            let pattern = &patterns[index];
            if let Outcome::Failed(error) = &outcome {
                failures.push(ProbeFailure {
                    label: pattern.name.clone(),
                    url: pattern.url(target),
                    attempts,
                    error: error.clone(),
                });
                continue;
            }
            if let Some(evidence) = (rule.record)(&outcome) {
                findings.push(Finding::new(category, target, evidence));
            }
        }

        let status = if timed_out {
            RunStatus::TimedOut
        } else if !failures.is_empty() {
            RunStatus::PartiallyFailed
        } else {
            RunStatus::Completed
        };

        info!(
            %target,
            %category,
            %status,
            findings = findings.len(),
            failures = failures.len(),
            "Scan run finished."
        );

        Ok(ScanRun {
            target: target.clone(),
            category,
            findings,
            failures,
            status,
            started_at,
            finished_at: Utc::now(),
        })
    }
}

/// Probes until the outcome is not `Failed` or the retry budget is spent.
/// Returns the last outcome and the number of attempts made.
async fn probe_with_retries(
    fetcher: &dyn Fetch,
    target: &Target,
    pattern: &Pattern,
    rule: &CategoryRule,
    config: &ScanConfig,
) -> (Outcome, u32) {
    let mut attempts = 0;
    loop {
        let outcome = probe(fetcher, target, pattern, rule, config.per_probe_timeout).await;
        attempts += 1;
        match &outcome {
            Outcome::Failed(error) if attempts <= config.max_retries => {
                let delay = config.backoff_for(attempts);
                debug!(
                    pattern = %pattern.name,
                    attempt = attempts,
                    error = %error,
                    ?delay,
                    "Retrying failed probe."
                );
                tokio::time::sleep(delay).await;
            }
            _ => return (outcome, attempts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::TransportError;
    use crate::core::scanner::fetch::FetchResponse;
    use crate::core::scanner::testing::StubFetcher;
    use std::time::Duration;

    fn coordinator(stub: &StubFetcher, catalog: Catalog) -> Coordinator {
        Coordinator::new(Arc::new(stub.clone()), Arc::new(catalog))
    }

    fn fast_config() -> ScanConfig {
        ScanConfig {
            max_concurrency: 3,
            per_probe_timeout: Duration::from_secs(5),
            overall_deadline: Duration::from_secs(60),
            max_retries: 2,
            retry_base_delay: Duration::from_millis(10),
            retry_max_delay: Duration::from_millis(40),
        }
    }

    fn labels_and_details(run: &ScanRun) -> Vec<(String, String)> {
        run.findings.iter().map(|f| (f.label.clone(), f.detail.clone())).collect()
    }

    /// Answers 200 for some paths and 404 otherwise, with delays that make
    /// later patterns finish first.
    fn reversed_timing_stub() -> StubFetcher {
        StubFetcher::new(|url| {
            let status = if url.ends_with("/api/") || url.ends_with("/swagger/") || url.ends_with("/graphql") {
                200
            } else {
                404
            };
            Ok(FetchResponse::new(status))
        })
        .with_delay_fn(|url| {
            let millis = match url {
                u if u.ends_with("/api/") => 50,
                u if u.ends_with("/v1/") => 40,
                u if u.ends_with("/v2/") => 30,
                u if u.ends_with("/swagger/") => 20,
                _ => 10,
            };
            Duration::from_millis(millis)
        })
    }

    #[tokio::test(start_paused = true)]
    async fn findings_follow_catalog_order_not_completion_order() {
        let stub = reversed_timing_stub();
        let coordinator = coordinator(&stub, Catalog::builtin());
        let target = Target::parse("example.com").unwrap();

        let run = coordinator.run(&target, Category::ApiEndpoints, &fast_config()).await.unwrap();

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(
            labels_and_details(&run),
            vec![
                ("https://example.com/api/".to_string(), "200".to_string()),
                ("https://example.com/swagger/".to_string(), "200".to_string()),
                ("https://example.com/graphql".to_string(), "200".to_string()),
            ]
        );
        assert!(run.findings.iter().all(|f| f.category == Category::ApiEndpoints && f.target == target));
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_runs_are_identical() {
        let stub = reversed_timing_stub();
        let coordinator = coordinator(&stub, Catalog::builtin());
        let target = Target::parse("example.com").unwrap();

        let first = coordinator.run(&target, Category::ApiEndpoints, &fast_config()).await.unwrap();
        let second = coordinator.run(&target, Category::ApiEndpoints, &fast_config()).await.unwrap();

        assert_eq!(labels_and_details(&first), labels_and_details(&second));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_limit_changes_timing_not_results() {
        let target = Target::parse("example.com").unwrap();

        let serial_stub = reversed_timing_stub();
        let serial = coordinator(&serial_stub, Catalog::builtin())
            .run(&target, Category::ApiEndpoints, &ScanConfig { max_concurrency: 1, ..fast_config() })
            .await
            .unwrap();

        let parallel_stub = reversed_timing_stub();
        let parallel = coordinator(&parallel_stub, Catalog::builtin())
            .run(&target, Category::ApiEndpoints, &ScanConfig { max_concurrency: 8, ..fast_config() })
            .await
            .unwrap();

        assert_eq!(labels_and_details(&serial), labels_and_details(&parallel));
        assert_eq!(serial_stub.peak_in_flight(), 1);
        assert!(parallel_stub.peak_in_flight() > 1);
        assert!(parallel_stub.peak_in_flight() <= 8);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_probes_never_exceed_limit() {
        let stub = StubFetcher::new(|_| Ok(FetchResponse::new(404))).with_delay(Duration::from_millis(25));
        let coordinator = coordinator(&stub, Catalog::builtin());
        let target = Target::parse("example.com").unwrap();

        let config = ScanConfig { max_concurrency: 2, ..fast_config() };
        let run = coordinator.run(&target, Category::ContentDiscovery, &config).await.unwrap();

        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.findings.is_empty());
        assert_eq!(stub.peak_in_flight(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_probes_use_every_retry_then_fail_permanently() {
        let stub = StubFetcher::new(|_| Err(TransportError::Connect("connection refused".to_string())));
        let coordinator = coordinator(&stub, Catalog::builtin());
        let target = Target::parse("example.com").unwrap();
        let config = ScanConfig { max_retries: 3, ..fast_config() };

        let run = coordinator.run(&target, Category::CloudResources, &config).await.unwrap();

        let patterns = Catalog::builtin().patterns_for(Category::CloudResources).unwrap().to_vec();
        assert_eq!(run.status, RunStatus::PartiallyFailed);
        assert!(run.findings.is_empty());
        assert_eq!(run.failures.len(), patterns.len());
        for (pattern, failure) in patterns.iter().zip(&run.failures) {
            assert_eq!(stub.calls_for(&pattern.url(&target)), 4);
            assert_eq!(failure.attempts, 4);
            assert_eq!(failure.label, pattern.name);
        }
        assert_eq!(stub.total_calls(), patterns.len() * 4);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_recovers_transient_failure() {
        let flaky = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = flaky.clone();
        let stub = StubFetcher::new(move |_| {
            if counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                Err(TransportError::Timeout(Duration::from_secs(1)))
            } else {
                Ok(FetchResponse::new(200))
            }
        });
        let catalog = Catalog::from_patterns(vec![Pattern::new(
            Category::CloudResources,
            "AWS S3 bucket",
            "https://{target}.s3.amazonaws.com",
        )]);
        let coordinator = coordinator(&stub, catalog);
        let target = Target::parse("example.com").unwrap();

        let run = coordinator.run(&target, Category::CloudResources, &fast_config()).await.unwrap();

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.findings.len(), 1);
        assert_eq!(stub.total_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_returns_partial_run_and_cancels_probes() {
        let stub = StubFetcher::new(|_| Ok(FetchResponse::new(200))).with_delay(Duration::from_millis(500));
        let coordinator = coordinator(&stub, Catalog::builtin());
        let target = Target::parse("example.com").unwrap();
        let config = ScanConfig { overall_deadline: Duration::from_millis(100), ..fast_config() };

        let run = coordinator.run(&target, Category::ApiEndpoints, &config).await.unwrap();

        let total = Catalog::builtin().patterns_for(Category::ApiEndpoints).unwrap().len();
        assert_eq!(run.status, RunStatus::TimedOut);
        assert!(run.is_partial());
        assert!(run.findings.len() < total);
        assert_eq!(stub.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_keeps_findings_that_completed() {
        let stub = StubFetcher::new(|_| Ok(FetchResponse::new(200))).with_delay_fn(|url| {
            if url.ends_with("/api/") || url.ends_with("/v1/") {
                Duration::from_millis(10)
            } else {
                Duration::from_secs(5)
            }
        });
        let coordinator = coordinator(&stub, Catalog::builtin());
        let target = Target::parse("example.com").unwrap();
        let config = ScanConfig {
            max_concurrency: 5,
            overall_deadline: Duration::from_millis(100),
            ..fast_config()
        };

        let run = coordinator.run(&target, Category::ApiEndpoints, &config).await.unwrap();

        assert_eq!(run.status, RunStatus::TimedOut);
        assert_eq!(
            run.findings.iter().map(|f| f.label.as_str()).collect::<Vec<_>>(),
            vec!["https://example.com/api/", "https://example.com/v1/"]
        );
        assert_eq!(stub.in_flight(), 0);
    }

    #[tokio::test]
    async fn security_headers_report_missing_and_present() {
        let stub = StubFetcher::new(|_| Ok(FetchResponse::new(200).with_header("X-Frame-Options", "DENY")));
        let catalog = Catalog::from_patterns(vec![
            Pattern::new(Category::SecurityHeaders, "Content-Security-Policy", "https://{target}"),
            Pattern::new(Category::SecurityHeaders, "X-Frame-Options", "https://{target}"),
        ]);
        let coordinator = coordinator(&stub, catalog);
        let target = Target::parse("example.com").unwrap();

        let run = coordinator.run(&target, Category::SecurityHeaders, &fast_config()).await.unwrap();

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(
            labels_and_details(&run),
            vec![
                ("Content-Security-Policy".to_string(), "missing".to_string()),
                ("X-Frame-Options".to_string(), "DENY".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn builtin_security_headers_cover_every_header() {
        let stub = StubFetcher::new(|_| Ok(FetchResponse::new(200).with_header("X-Frame-Options", "DENY")));
        let coordinator = coordinator(&stub, Catalog::builtin());
        let target = Target::parse("example.com").unwrap();

        let run = coordinator.run(&target, Category::SecurityHeaders, &fast_config()).await.unwrap();

        let details: Vec<(String, String)> = labels_and_details(&run);
        assert_eq!(details.len(), 5);
        assert_eq!(details[1], ("Content-Security-Policy".to_string(), "missing".to_string()));
        assert_eq!(details[2], ("X-Frame-Options".to_string(), "DENY".to_string()));
    }

    #[tokio::test]
    async fn category_missing_from_catalog_is_rejected() {
        let stub = StubFetcher::new(|_| Ok(FetchResponse::new(200)));
        let catalog = Catalog::from_patterns(vec![Pattern::new(
            Category::ApiEndpoints,
            "GraphQL",
            "https://{target}/graphql",
        )]);
        let coordinator = coordinator(&stub, catalog);
        let target = Target::parse("example.com").unwrap();

        let result = coordinator.run(&target, Category::CloudResources, &fast_config()).await;

        assert!(matches!(result, Err(ScanError::UnknownCategory(_))));
        assert_eq!(stub.total_calls(), 0);
    }
}
