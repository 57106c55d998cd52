// src/core/mod.rs

// The `mod.rs` file acts as the root of the `core` module, exposing the
// scanning engine to the binary and to embedders.

/// Data structures shared by every stage: `Target`, `Category`, `Finding`
/// and `ScanRun`.
pub mod models;

/// The static pattern tables and the per-category classification rules.
pub mod catalog;

/// Limits for a scan run (concurrency, timeouts, retries).
pub mod config;

pub mod error;

/// Probe execution, run coordination and the session object.
pub mod scanner;

/// Accumulates findings across runs and renders exports.
pub mod aggregator;
