// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Next-run calculation for monitors.

use chrono::{DateTime, Duration, Utc};

use crate::backoff::{default_retry_stages, failure_retry_interval, FailureRetryStage};
use crate::monitor::Outcome;

/// Scheduling knobs shared by every check: the failure-retry stages and the
/// half-width of the uniform jitter applied to each computed next run.
#[derive(Debug, Clone)]
pub struct SchedulePolicy {
	pub stages: Vec<FailureRetryStage>,
	pub jitter_seconds: f64,
}

impl SchedulePolicy {
	pub fn new(stages: Vec<FailureRetryStage>, jitter_seconds: f64) -> Self {
		Self {
			stages,
			jitter_seconds,
		}
	}

	/// Deterministic policy for tests and replay.
	pub fn without_jitter(stages: Vec<FailureRetryStage>) -> Self {
		Self::new(stages, 0.0)
	}
}

impl Default for SchedulePolicy {
	fn default() -> Self {
		Self::new(default_retry_stages(), 0.2)
	}
}

/// Compute the next run time for a monitor after a check.
///
/// An `up` outcome schedules the monitor's own interval; a `down` outcome
/// schedules the staged retry interval for the updated consecutive-failure
/// count. Uniform jitter in `[-jitter, +jitter]` seconds is added on top.
pub fn schedule_next_run(
	policy: &SchedulePolicy,
	now: DateTime<Utc>,
	interval_seconds: i32,
	outcome: Outcome,
	consecutive_failures: i32,
) -> DateTime<Utc> {
	let base_seconds = match outcome {
		Outcome::Up => interval_seconds as f64,
		Outcome::Down => failure_retry_interval(
			&policy.stages,
			consecutive_failures,
			interval_seconds as f64,
		),
	};

	let jitter_seconds = if policy.jitter_seconds > 0.0 {
		policy.jitter_seconds * (fastrand::f64() * 2.0 - 1.0)
	} else {
		0.0
	};

	// Millisecond arithmetic keeps fractional jitter.
	now + Duration::milliseconds(((base_seconds + jitter_seconds) * 1000.0) as i64)
}
