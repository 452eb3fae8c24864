// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Staged failure-retry policy.
//!
//! While a monitor is down it is re-probed faster than its configured
//! interval. The policy is an ordered list of stages, each covering a
//! contiguous block of consecutive-failure counts; the terminal stage is
//! unbounded and applies until recovery.

/// Minimum retry interval, in seconds.
const MIN_RETRY_INTERVAL_SECONDS: f64 = 1.0;

/// One block of rapid retry attempts for a monitor that is down.
///
/// `attempts: None` marks the unbounded terminal stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FailureRetryStage {
	pub attempts: Option<u32>,
	pub interval_seconds: f64,
}

impl FailureRetryStage {
	pub fn bounded(attempts: u32, interval_seconds: f64) -> Self {
		Self {
			attempts: Some(attempts),
			interval_seconds,
		}
	}

	pub fn unbounded(interval_seconds: f64) -> Self {
		Self {
			attempts: None,
			interval_seconds,
		}
	}
}

/// Canonical stages: two failures at 30s, five at 60s, twelve at 2min,
/// then 5min until recovery.
pub fn default_retry_stages() -> Vec<FailureRetryStage> {
	vec![
		FailureRetryStage::bounded(2, 30.0),
		FailureRetryStage::bounded(5, 60.0),
		FailureRetryStage::bounded(12, 120.0),
		FailureRetryStage::unbounded(300.0),
	]
}

/// Retry interval for the `consecutive_failures`-th failure in a row.
///
/// Walks the stages front to back, consuming each bounded stage's attempts.
/// Falls back to `default_interval_seconds` when the count is not positive
/// or the stage list is exhausted without a terminal stage.
/// Intervals are floored at one second.
pub fn failure_retry_interval(
	stages: &[FailureRetryStage],
	consecutive_failures: i32,
	default_interval_seconds: f64,
) -> f64 {
	if consecutive_failures <= 0 {
		return default_interval_seconds.max(MIN_RETRY_INTERVAL_SECONDS);
	}

	let mut remaining = consecutive_failures as u32;
	for stage in stages {
		match stage.attempts {
			Some(attempts) => {
				if remaining <= attempts {
					return stage.interval_seconds.max(MIN_RETRY_INTERVAL_SECONDS);
				}
				remaining -= attempts;
			}
			None => return stage.interval_seconds.max(MIN_RETRY_INTERVAL_SECONDS),
		}
	}

	default_interval_seconds.max(MIN_RETRY_INTERVAL_SECONDS)
}
