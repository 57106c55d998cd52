// src/core/scanner/mod.rs

// This file acts as the public interface for the `scanner` module.
// It declares the probe pipeline and owns the `Session` that ties the
// coordinator to a shared result store.
pub mod coordinator;
pub mod fetch;
pub mod probe;

#[cfg(test)]
pub(crate) mod testing;

use futures::future::join_all;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::core::aggregator::{Aggregator, ExportFormat};
use crate::core::catalog::Catalog;
use crate::core::config::ScanConfig;
use crate::core::error::{ExportError, ScanError, TransportError};
use crate::core::models::{Category, ScanRun, Target};
use self::coordinator::Coordinator;
use self::fetch::{Fetch, HttpFetcher};

/// All state of one scanning session: the coordinator and the result store
/// every finished run is recorded into.
///
/// Runs may execute concurrently; recording is serialized by the store's mutex.
pub struct Session {
    coordinator: Coordinator,
    results: Mutex<Aggregator>,
}

impl Session {
    pub fn new(fetcher: Arc<dyn Fetch>, catalog: Arc<Catalog>) -> Self {
        Self {
            coordinator: Coordinator::new(fetcher, catalog),
            results: Mutex::new(Aggregator::new()),
        }
    }

    /// A session using the built-in catalog and a real HTTP client.
    pub fn with_http() -> Result<Self, TransportError> {
        Ok(Self::new(Arc::new(HttpFetcher::new()?), Arc::new(Catalog::builtin())))
    }

    pub fn catalog(&self) -> &Catalog {
        self.coordinator.catalog()
    }

    /// Runs one category and records its findings.
    pub async fn run(
        &self,
        target: &Target,
        category: Category,
        config: &ScanConfig,
    ) -> Result<ScanRun, ScanError> {
        let run = self.coordinator.run(target, category, config).await?;
        self.results.lock().await.record(&run);
        Ok(run)
    }

    /// Like `run`, with the category given by name.
    pub async fn run_named(
        &self,
        target: &Target,
        category: &str,
        config: &ScanConfig,
    ) -> Result<ScanRun, ScanError> {
        let category = Category::parse(category)?;
        self.run(target, category, config).await
    }

    /// Runs several categories against one target concurrently.
    ///
    /// Every category is checked against the catalog first, so an unknown one
    /// fails the call before any probe is sent. Runs come back in the order
    /// the categories were given.
    pub async fn run_all(
        &self,
        target: &Target,
        categories: &[Category],
        config: &ScanConfig,
    ) -> Result<Vec<ScanRun>, ScanError> {
        config.validate()?;
        for category in categories {
            self.catalog().entry(*category)?;
        }

        info!(%target, categories = categories.len(), "Starting concurrent scan runs.");
        join_all(categories.iter().map(|category| self.run(target, *category, config)))
            .await
            .into_iter()
            .collect()
    }

    /// Appends findings from a previous structured export.
    pub async fn import(&self, previous: Aggregator) {
        self.results.lock().await.merge(previous);
    }

    pub async fn finding_count(&self) -> usize {
        self.results.lock().await.len()
    }

    /// A copy of the current results.
    pub async fn snapshot(&self) -> Aggregator {
        self.results.lock().await.clone()
    }

    pub async fn export(&self, format: ExportFormat) -> Result<Vec<u8>, ExportError> {
        self.results.lock().await.export(format)
    }

    /// Exports and writes to `path`. The store is left as it was on failure.
    pub async fn write_export(&self, format: ExportFormat, path: &Path) -> Result<usize, ExportError> {
        let bytes = self.export(format).await?;
        tokio::fs::write(path, &bytes).await.map_err(|e| {
            error!(path = %path.display(), error = %e, "Failed to write export.");
            ExportError::Io(e)
        })?;
        info!(path = %path.display(), bytes = bytes.len(), %format, "Export written.");
        Ok(bytes.len())
    }
}
