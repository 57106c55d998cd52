// src/core/aggregator.rs

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::Display;
use tracing::debug;

use crate::core::error::ExportError;
use crate::core::models::{Category, Finding, ScanRun, Target};

/// Findings per category, each list in insertion order.
pub type ResultStore = BTreeMap<Category, Vec<Finding>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ExportFormat {
    /// One JSON object mapping each category to its findings.
    Json,
    /// One `category,label,detail` row per finding.
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

/// Shape of a finding inside the structured export; the category is the key.
#[derive(Debug, Serialize, Deserialize)]
struct ExportedFinding {
    target: Target,
    label: String,
    detail: String,
    timestamp: DateTime<Utc>,
}

/// Accumulates findings from scan runs. Append-only.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    store: ResultStore,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends every finding of `run` under its category.
    pub fn record(&mut self, run: &ScanRun) {
        debug!(category = %run.category, findings = run.findings.len(), "Recording scan run.");
        for finding in &run.findings {
            self.store.entry(finding.category).or_default().push(finding.clone());
        }
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn len(&self) -> usize {
        self.store.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn export(&self, format: ExportFormat) -> Result<Vec<u8>, ExportError> {
        match format {
            ExportFormat::Json => self.export_structured(),
            ExportFormat::Csv => self.export_delimited(),
        }
    }

    fn export_structured(&self) -> Result<Vec<u8>, ExportError> {
        let document: BTreeMap<Category, Vec<ExportedFinding>> = self
            .store
            .iter()
            .map(|(category, findings)| {
                let rows = findings
                    .iter()
                    .map(|f| ExportedFinding {
                        target: f.target.clone(),
                        label: f.label.clone(),
                        detail: f.detail.clone(),
                        timestamp: f.timestamp,
                    })
                    .collect();
                (*category, rows)
            })
            .collect();
        Ok(serde_json::to_vec_pretty(&document)?)
    }

    fn export_delimited(&self) -> Result<Vec<u8>, ExportError> {
        let mut wtr = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(vec![]);
        wtr.write_record(["category", "label", "detail"])?;
        for (category, findings) in &self.store {
            let category = category.to_string();
            for finding in findings {
                wtr.write_record([category.as_str(), finding.label.as_str(), finding.detail.as_str()])?;
            }
        }
        Ok(wtr.into_inner()?)
    }

    /// Rebuilds an aggregator from a structured (JSON) export.
    pub fn from_structured(bytes: &[u8]) -> Result<Self, ExportError> {
        let document: BTreeMap<Category, Vec<ExportedFinding>> = serde_json::from_slice(bytes)?;
        let store = document
            .into_iter()
            .map(|(category, rows)| {
                let findings = rows
                    .into_iter()
                    .map(|row| Finding {
                        category,
                        target: row.target,
                        label: row.label,
                        detail: row.detail,
                        timestamp: row.timestamp,
                    })
                    .collect();
                (category, findings)
            })
            .collect();
        Ok(Self { store })
    }

    /// Appends another aggregator's findings after this one's, category by category.
    pub fn merge(&mut self, other: Aggregator) {
        for (category, findings) in other.store {
            self.store.entry(category).or_default().extend(findings);
        }
    }
}
