// src/core/scanner/testing.rs

// An in-memory `Fetch` for tests: answers from a closure, counts calls per
// URL and tracks how many fetches are currently in flight.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::core::error::TransportError;
use crate::core::scanner::fetch::{Fetch, FetchResponse};

type Responder = dyn Fn(&str) -> Result<FetchResponse, TransportError> + Send + Sync;

#[derive(Clone)]
pub struct StubFetcher {
    respond: Arc<Responder>,
    delay: Arc<dyn Fn(&str) -> Duration + Send + Sync>,
    calls: Arc<Mutex<HashMap<String, usize>>>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl StubFetcher {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(&str) -> Result<FetchResponse, TransportError> + Send + Sync + 'static,
    {
        Self {
            respond: Arc::new(respond),
            delay: Arc::new(|_: &str| Duration::ZERO),
            calls: Arc::default(),
            in_flight: Arc::default(),
            peak_in_flight: Arc::default(),
        }
    }

    /// Every fetch sleeps for `delay` before answering.
    pub fn with_delay(self, delay: Duration) -> Self {
        self.with_delay_fn(move |_| delay)
    }

    /// Per-URL sleep before answering.
    pub fn with_delay_fn<D>(mut self, delay: D) -> Self
    where
        D: Fn(&str) -> Duration + Send + Sync + 'static,
    {
        self.delay = Arc::new(delay);
        self
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight counter even when the fetch future is dropped.
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Fetch for StubFetcher {
    async fn fetch(&self, url: &str, _timeout: Duration) -> Result<FetchResponse, TransportError> {
        *self.calls.lock().unwrap().entry(url.to_string()).or_insert(0) += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(self.in_flight.clone());

        let delay = (self.delay)(url);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        } else {
            tokio::task::yield_now().await;
        }
        (self.respond)(url)
    }
}
