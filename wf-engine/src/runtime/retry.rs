// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry and backoff policy (§4.3.6). Parsed from a step's
//! `config.retry` object; absent configuration means `max_attempts = 1`
//! (no retry) and `on_error = fail_run`.

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Backoff {
    pub kind: BackoffKind,
    pub initial_ms: u64,
    #[serde(default)]
    pub factor: Option<f64>,
    #[serde(default)]
    pub max_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum OnError {
    FailRun,
    Continue,
    RouteToPort { port: String },
}

impl Default for OnError {
    fn default() -> Self {
        Self::FailRun
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    pub backoff: Option<Backoff>,
    #[serde(default)]
    pub on_error: OnError,
}

fn default_max_attempts() -> u32 {
    1
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff: None,
            on_error: OnError::default(),
        }
    }
}

impl RetryPolicy {
    pub fn from_step_config(config: &serde_json::Value) -> Self {
        config
            .get("retry")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    pub fn should_retry(&self, failed_attempt: u32) -> bool {
        failed_attempt < self.max_attempts
    }

    /// Delay before attempt `next_attempt` (1-indexed); `attempt 1` never
    /// calls this since it has no prior failure to back off from.
    pub fn delay_for(&self, next_attempt: u32) -> Duration {
        let Some(backoff) = &self.backoff else {
            return Duration::ZERO;
        };
        let ms = match backoff.kind {
            BackoffKind::Fixed => backoff.initial_ms,
            BackoffKind::Exponential => {
                let factor = backoff.factor.unwrap_or(2.0);
                let exponent = (next_attempt.saturating_sub(1)) as i32;
                (backoff.initial_ms as f64 * factor.powi(exponent)) as u64
            }
        };
        let ms = backoff.max_ms.map_or(ms, |max| ms.min(max));
        Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_never_retries() {
        let policy = RetryPolicy::from_step_config(&serde_json::json!({}));
        assert!(!policy.should_retry(1));
    }

    #[test]
    fn exponential_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            backoff: Some(Backoff {
                kind: BackoffKind::Exponential,
                initial_ms: 100,
                factor: Some(2.0),
                max_ms: Some(500),
            }),
            on_error: OnError::default(),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(4), Duration::from_millis(500));
    }

    #[test]
    fn fixed_backoff_is_constant() {
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff: Some(Backoff {
                kind: BackoffKind::Fixed,
                initial_ms: 250,
                factor: None,
                max_ms: None,
            }),
            on_error: OnError::default(),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(250));
        assert_eq!(policy.delay_for(2), Duration::from_millis(250));
    }

    #[test]
    fn s3_retries_then_succeeds_within_max_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff: Some(Backoff {
                kind: BackoffKind::Fixed,
                initial_ms: 10,
                factor: None,
                max_ms: None,
            }),
            on_error: OnError::default(),
        };
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }
}
