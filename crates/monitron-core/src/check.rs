// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Check records and probe results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use crate::monitor::{MonitorId, Outcome};

/// Recorded error messages are truncated to the column width.
pub const MAX_ERROR_MESSAGE_LEN: usize = 1024;

/// Unique identifier for a check record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckId(pub i64);

impl fmt::Display for CheckId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for CheckId {
	type Err = ParseIntError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self(s.parse()?))
	}
}

/// Unique identifier for a user (alert routing only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for UserId {
	type Err = ParseIntError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self(s.parse()?))
	}
}

/// Append-only record of one probe result. Never mutated after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorCheck {
	pub id: CheckId,
	pub monitor_id: MonitorId,
	pub occurred_at: DateTime<Utc>,
	pub outcome: Outcome,
	pub status_code: Option<i32>,
	pub latency_ms: Option<i64>,
	pub error_message: Option<String>,
}

/// Outcome of a single probe, owned by the executing task.
///
/// Exactly one of the two shapes exists: an HTTP response was received
/// (status and latency present, no error message) or the request failed in
/// transport (error message present, status and latency absent). The
/// constructors enforce this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
	pub outcome: Outcome,
	pub completed_at: DateTime<Utc>,
	pub status_code: Option<i32>,
	pub latency_ms: Option<i64>,
	pub error_message: Option<String>,
}

impl CheckResult {
	/// Probe received an HTTP response.
	pub fn from_response(completed_at: DateTime<Utc>, status_code: u16, latency_ms: i64) -> Self {
		Self {
			outcome: Outcome::from_status(status_code),
			completed_at,
			status_code: Some(status_code as i32),
			latency_ms: Some(latency_ms),
			error_message: None,
		}
	}

	/// Probe failed before an HTTP response arrived (timeout, DNS, TLS, refused).
	pub fn from_error(completed_at: DateTime<Utc>, error: impl Into<String>) -> Self {
		let mut message: String = error.into();
		if message.len() > MAX_ERROR_MESSAGE_LEN {
			let mut end = MAX_ERROR_MESSAGE_LEN;
			while !message.is_char_boundary(end) {
				end -= 1;
			}
			message.truncate(end);
		}
		Self {
			outcome: Outcome::Down,
			completed_at,
			status_code: None,
			latency_ms: None,
			error_message: Some(message),
		}
	}
}

/// Alert recipient. Read-only to the probe engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
	pub id: UserId,
	pub email: String,
	pub is_active: bool,
}
