//! Retry configuration and backoff calculation.
//!
//! Portable, sync-only building blocks for the persistence retry loop. The
//! async loop itself lives with the persistence workers in `relay-server`.
//!
//! Backoff is **linear**: the wait between attempt `n` and `n + 1` is
//! `n × base_delay`. There is no jitter and no exponential growth; with
//! the defaults a job that fails every time waits 100, 200, 300, 400 ms
//! and is dropped after the fifth attempt.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default total attempts per job (first try included).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 100;

/// Configuration for bounded linear retry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Total attempts per job, first try included (default: 5).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay multiplied by the attempt index, in ms (default: 100).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
        }
    }
}

impl RetryConfig {
    /// Attempt ceiling, never below one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Wait after the failed attempt `attempt` (1-based) before the next one.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        Duration::from_millis(calculate_linear_delay(attempt, self.base_delay_ms))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backoff calculation
// ─────────────────────────────────────────────────────────────────────────────

/// Linear backoff: `attempt × base_delay_ms`, saturating.
///
/// `attempt` is the 1-based index of the attempt that just failed.
#[must_use]
pub fn calculate_linear_delay(attempt: u32, base_delay_ms: u64) -> u64 {
    base_delay_ms.saturating_mul(u64::from(attempt))
}

/// Sum of every wait a job sees if all `max_attempts` fail.
#[must_use]
pub fn total_backoff_ms(max_attempts: u32, base_delay_ms: u64) -> u64 {
    (1..max_attempts.max(1))
        .map(|n| calculate_linear_delay(n, base_delay_ms))
        .fold(0u64, u64::saturating_add)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_config_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.base_delay_ms, 100);
    }

    #[test]
    fn retry_config_serde_defaults() {
        let config: RetryConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, RetryConfig::default());
    }

    #[test]
    fn retry_config_camel_case() {
        let config: RetryConfig =
            serde_json::from_str(r#"{"maxAttempts":3,"baseDelayMs":250}"#).unwrap();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_delay_ms, 250);
    }

    #[test]
    fn linear_growth() {
        assert_eq!(calculate_linear_delay(1, 100), 100);
        assert_eq!(calculate_linear_delay(2, 100), 200);
        assert_eq!(calculate_linear_delay(3, 100), 300);
        assert_eq!(calculate_linear_delay(4, 100), 400);
    }

    #[test]
    fn no_overflow_on_huge_values() {
        assert_eq!(calculate_linear_delay(u32::MAX, u64::MAX), u64::MAX);
    }

    #[test]
    fn delay_after_is_duration() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_after(3), Duration::from_millis(300));
    }

    #[test]
    fn zero_attempts_clamps_to_one() {
        let config = RetryConfig {
            max_attempts: 0,
            base_delay_ms: 10,
        };
        assert_eq!(config.attempts(), 1);
    }

    #[test]
    fn total_backoff_with_defaults() {
        // 100 + 200 + 300 + 400 between five attempts
        assert_eq!(total_backoff_ms(5, 100), 1000);
        assert_eq!(total_backoff_ms(1, 100), 0);
    }
}
