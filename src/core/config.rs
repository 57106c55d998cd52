// src/core/config.rs

use std::time::Duration;

use crate::core::error::ScanError;

/// Longest accepted probe timeout or run deadline.
pub const MAX_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Limits that govern a single scan run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Probes allowed in flight at once.
    pub max_concurrency: usize,
    /// Upper bound for one fetch, enforced by the probe executor.
    pub per_probe_timeout: Duration,
    /// Upper bound for the whole run; outstanding probes are dropped after it.
    pub overall_deadline: Duration,
    /// Extra attempts for a probe that failed at the transport level.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on every following retry.
    pub retry_base_delay: Duration,
    /// Cap for the retry delay.
    pub retry_max_delay: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            per_probe_timeout: Duration::from_secs(10),
            overall_deadline: Duration::from_secs(60),
            max_retries: 2,
            retry_base_delay: Duration::from_millis(250),
            retry_max_delay: Duration::from_secs(5),
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.max_concurrency == 0 {
            return Err(ScanError::InvalidConfig("concurrency must be at least 1".to_string()));
        }
        if self.per_probe_timeout.is_zero() {
            return Err(ScanError::InvalidConfig("probe timeout must be greater than zero".to_string()));
        }
        if self.overall_deadline.is_zero() {
            return Err(ScanError::InvalidConfig("deadline must be greater than zero".to_string()));
        }
        if self.per_probe_timeout > MAX_DURATION || self.overall_deadline > MAX_DURATION {
            return Err(ScanError::InvalidConfig(format!(
                "probe timeout and deadline must not exceed {}s",
                MAX_DURATION.as_secs()
            )));
        }
        if self.max_retries > 10 {
            return Err(ScanError::InvalidConfig(format!(
                "at most 10 retries are allowed, got {}",
                self.max_retries
            )));
        }
        Ok(())
    }

    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt - 1)`, capped.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        self.retry_base_delay
            .checked_mul(factor)
            .unwrap_or(self.retry_max_delay)
            .min(self.retry_max_delay)
    }
}
