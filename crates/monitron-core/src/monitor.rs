// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Monitor types for HTTP uptime monitoring.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use crate::check::UserId;

/// Smallest accepted polling interval, in seconds.
pub const MIN_INTERVAL_SECONDS: i32 = 30;
/// Largest accepted polling interval (one day), in seconds.
pub const MAX_INTERVAL_SECONDS: i32 = 86_400;
/// Smallest accepted probe timeout, in seconds.
pub const MIN_TIMEOUT_SECONDS: i32 = 1;
/// Largest accepted probe timeout, in seconds.
pub const MAX_TIMEOUT_SECONDS: i32 = 60;

/// Unique identifier for a monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MonitorId(pub i64);

impl fmt::Display for MonitorId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for MonitorId {
	type Err = ParseIntError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self(s.parse()?))
	}
}

/// A scheduled probe target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Monitor {
	pub id: MonitorId,

	/// Human-readable name: "Marketing site"
	pub name: String,
	pub url: String,
	/// Uppercase HTTP verb: "GET", "HEAD", ...
	pub method: String,
	pub interval_seconds: i32,
	pub timeout_seconds: i32,
	pub enabled: bool,
	/// User that receives sustained-down alerts, if any.
	pub owner_id: Option<UserId>,

	// Runtime state maintained by the probe engine
	/// Do not dispatch before this moment. Doubles as the claim lease.
	pub next_run_at: DateTime<Utc>,
	pub last_checked_at: Option<DateTime<Utc>>,
	pub last_status_code: Option<i32>,
	pub last_latency_ms: Option<i64>,
	pub last_outcome: Option<Outcome>,
	pub consecutive_failures: i32,

	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl Monitor {
	/// Validate a polling interval (30 seconds to one day, inclusive).
	pub fn validate_interval_seconds(interval_seconds: i32) -> bool {
		(MIN_INTERVAL_SECONDS..=MAX_INTERVAL_SECONDS).contains(&interval_seconds)
	}

	/// Validate a probe timeout (1 to 60 seconds, inclusive).
	pub fn validate_timeout_seconds(timeout_seconds: i32) -> bool {
		(MIN_TIMEOUT_SECONDS..=MAX_TIMEOUT_SECONDS).contains(&timeout_seconds)
	}

	/// Validate an HTTP method (non-empty uppercase token).
	pub fn validate_method(method: &str) -> bool {
		!method.is_empty()
			&& method.len() <= 16
			&& method.chars().all(|c| c.is_ascii_uppercase())
	}
}

/// Immutable view of a monitor handed to the probe, detached from the row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSnapshot {
	pub id: MonitorId,
	pub method: String,
	pub url: String,
	pub timeout_seconds: i32,
	pub interval_seconds: i32,
}

/// Result classification of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
	/// HTTP response with a 2xx/3xx status.
	Up,
	/// Non-success status or transport failure.
	Down,
}

impl Outcome {
	/// Classify an HTTP status code: `up` iff `200 <= code < 400`.
	pub fn from_status(status: u16) -> Self {
		if (200..400).contains(&status) {
			Self::Up
		} else {
			Self::Down
		}
	}

	pub fn is_down(self) -> bool {
		self == Self::Down
	}
}

impl fmt::Display for Outcome {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Up => write!(f, "up"),
			Self::Down => write!(f, "down"),
		}
	}
}

impl FromStr for Outcome {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"up" => Ok(Self::Up),
			"down" => Ok(Self::Down),
			_ => Err(format!("unknown outcome: {}", s)),
		}
	}
}
