// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Environment-bound worker configuration for Monitron.
//!
//! Settings are loaded once at startup and treated as immutable for the
//! process lifetime; a restart is the supported mechanism for configuration
//! changes. All keys are environment variables; `DATABASE_URL` is the only
//! required one.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use monitron_core::{default_retry_stages, FailureRetryStage};
use monitron_smtp::SmtpConfig;
use tracing::debug;

const DEFAULT_MAX_CONCURRENCY: usize = 5;
const DEFAULT_JITTER_SECONDS: f64 = 0.2;
const DEFAULT_POLL_INTERVAL_SECONDS: f64 = 1.0;
const DEFAULT_CLAIM_SECONDS: f64 = 30.0;
const DEFAULT_USER_AGENT: &str = "MonitronWorker/0.1";
const DEFAULT_SUSTAINED_DOWN_THRESHOLD: i64 = 10;
const DEFAULT_SUSTAINED_DOWN_WINDOW_MINUTES: i64 = 60;
const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_SMTP_TIMEOUT_SECONDS: f64 = 10.0;

/// Errors raised while resolving configuration from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("{0} is required")]
	MissingVar(String),

	#[error("invalid value for {key}: {message}")]
	InvalidValue { key: String, message: String },

	#[error("invalid FAILURE_RETRY_STAGES: {0}")]
	InvalidStages(String),
}

/// Fully resolved worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
	/// Postgres connection string.
	pub database_url: String,

	/// Worker-pool size; the scheduler fetch limit is four times this.
	pub max_concurrency: usize,

	/// Half-width of the uniform scheduling jitter, in seconds.
	pub jitter_seconds: f64,

	/// Scheduler cadence floor, in seconds.
	pub scheduler_poll_interval: f64,

	/// Claim lease duration, in seconds. Must exceed the longest plausible
	/// probe duration (`timeout_seconds` plus processing overhead) or a slow
	/// probe can be re-claimed and checked twice.
	pub scheduler_claim_seconds: f64,

	/// `User-Agent` header sent with every probe.
	pub user_agent: String,

	/// Staged failure-retry policy.
	pub failure_retry_stages: Vec<FailureRetryStage>,

	/// Down checks within the window required to trigger an alert.
	/// Zero disables alerting.
	pub sustained_down_threshold: i64,

	/// Sliding alert window length, in minutes. Zero disables alerting.
	pub sustained_down_window_minutes: i64,

	/// Mailer settings; `None` disables alerting.
	pub smtp: Option<SmtpConfig>,
}

impl WorkerConfig {
	/// Load configuration from environment variables.
	///
	/// # Environment Variables
	///
	/// - `DATABASE_URL` (required): Postgres connection string
	/// - `MAX_CONCURRENCY` (default 5)
	/// - `JITTER_SECONDS` (default 0.2)
	/// - `SCHEDULER_POLL_INTERVAL` (default 1.0; `LOOP_INTERVAL` is an alias)
	/// - `SCHEDULER_CLAIM_SECONDS` (default 30.0)
	/// - `USER_AGENT` (default "MonitronWorker/0.1")
	/// - `FAILURE_RETRY_STAGES` (default "2:30,5:60,12:120,*:300")
	/// - `SUSTAINED_DOWN_THRESHOLD` (default 10)
	/// - `SUSTAINED_DOWN_WINDOW_MINUTES` (default 60)
	/// - `SMTP_HOST`, `SMTP_PORT`, `SMTP_USERNAME`, `SMTP_PASSWORD`,
	///   `SMTP_USE_TLS`, `SMTP_USE_SSL`, `SMTP_TIMEOUT`, `ALERT_EMAIL_FROM`:
	///   mailer settings; with `SMTP_HOST` or `ALERT_EMAIL_FROM` unset the
	///   mailer is disabled
	pub fn from_env() -> Result<Self, ConfigError> {
		let database_url = env::var("DATABASE_URL")
			.map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

		let max_concurrency = parse_var("MAX_CONCURRENCY", DEFAULT_MAX_CONCURRENCY)?;
		if max_concurrency == 0 {
			return Err(ConfigError::InvalidValue {
				key: "MAX_CONCURRENCY".to_string(),
				message: "must be at least 1".to_string(),
			});
		}

		let jitter_seconds = parse_var("JITTER_SECONDS", DEFAULT_JITTER_SECONDS)?;
		if jitter_seconds < 0.0 {
			return Err(ConfigError::InvalidValue {
				key: "JITTER_SECONDS".to_string(),
				message: "must not be negative".to_string(),
			});
		}

		// LOOP_INTERVAL is the historical name for the scheduler cadence.
		let scheduler_poll_interval = match optional_var("SCHEDULER_POLL_INTERVAL") {
			Some(raw) => parse_raw("SCHEDULER_POLL_INTERVAL", &raw)?,
			None => parse_var("LOOP_INTERVAL", DEFAULT_POLL_INTERVAL_SECONDS)?,
		};
		if scheduler_poll_interval <= 0.0 {
			return Err(ConfigError::InvalidValue {
				key: "SCHEDULER_POLL_INTERVAL".to_string(),
				message: "must be positive".to_string(),
			});
		}

		let scheduler_claim_seconds = parse_var("SCHEDULER_CLAIM_SECONDS", DEFAULT_CLAIM_SECONDS)?;
		if scheduler_claim_seconds <= 0.0 {
			return Err(ConfigError::InvalidValue {
				key: "SCHEDULER_CLAIM_SECONDS".to_string(),
				message: "must be positive".to_string(),
			});
		}

		let user_agent =
			optional_var("USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

		let failure_retry_stages = match optional_var("FAILURE_RETRY_STAGES") {
			Some(raw) => parse_retry_stages(&raw)?,
			None => default_retry_stages(),
		};

		let sustained_down_threshold =
			parse_var("SUSTAINED_DOWN_THRESHOLD", DEFAULT_SUSTAINED_DOWN_THRESHOLD)?;
		let sustained_down_window_minutes = parse_var(
			"SUSTAINED_DOWN_WINDOW_MINUTES",
			DEFAULT_SUSTAINED_DOWN_WINDOW_MINUTES,
		)?;

		let smtp = smtp_from_env()?;

		Ok(Self {
			database_url,
			max_concurrency,
			jitter_seconds,
			scheduler_poll_interval,
			scheduler_claim_seconds,
			user_agent,
			failure_retry_stages,
			sustained_down_threshold,
			sustained_down_window_minutes,
			smtp,
		})
	}
}

/// Resolve the mailer section. Both `SMTP_HOST` and `ALERT_EMAIL_FROM` must
/// be present; otherwise the section is `None` and alerting is disabled.
fn smtp_from_env() -> Result<Option<SmtpConfig>, ConfigError> {
	let host = optional_var("SMTP_HOST");
	let from_address = optional_var("ALERT_EMAIL_FROM");

	let (host, from_address) = match (host, from_address) {
		(Some(host), Some(from_address)) => (host, from_address),
		_ => {
			debug!("SMTP_HOST or ALERT_EMAIL_FROM unset; alerting disabled");
			return Ok(None);
		}
	};

	let timeout_seconds: f64 = parse_var("SMTP_TIMEOUT", DEFAULT_SMTP_TIMEOUT_SECONDS)?;

	Ok(Some(SmtpConfig {
		host,
		port: parse_var("SMTP_PORT", DEFAULT_SMTP_PORT)?,
		username: optional_var("SMTP_USERNAME"),
		password: optional_var("SMTP_PASSWORD"),
		from_address,
		use_tls: parse_bool_var("SMTP_USE_TLS", true),
		use_ssl: parse_bool_var("SMTP_USE_SSL", false),
		timeout: Duration::from_secs_f64(timeout_seconds.max(0.0)),
	}))
}

/// Parse a comma-separated stage list such as `2:30,5:60,12:120,*:300`.
///
/// Each entry is `attempts:interval_seconds`; `*` marks the unbounded
/// terminal stage and is only valid in last position.
pub fn parse_retry_stages(raw: &str) -> Result<Vec<FailureRetryStage>, ConfigError> {
	let entries: Vec<&str> = raw.split(',').map(str::trim).collect();
	if entries.iter().all(|e| e.is_empty()) {
		return Err(ConfigError::InvalidStages("no stages given".to_string()));
	}

	let mut stages = Vec::with_capacity(entries.len());
	for (index, entry) in entries.iter().enumerate() {
		let (attempts_raw, interval_raw) = entry.split_once(':').ok_or_else(|| {
			ConfigError::InvalidStages(format!("expected attempts:interval, got {:?}", entry))
		})?;

		let interval_seconds: f64 = interval_raw.trim().parse().map_err(|_| {
			ConfigError::InvalidStages(format!("invalid interval in {:?}", entry))
		})?;
		if !interval_seconds.is_finite() || interval_seconds <= 0.0 {
			return Err(ConfigError::InvalidStages(format!(
				"interval must be positive in {:?}",
				entry
			)));
		}

		let attempts_raw = attempts_raw.trim();
		if attempts_raw == "*" {
			if index != entries.len() - 1 {
				return Err(ConfigError::InvalidStages(
					"unbounded stage must come last".to_string(),
				));
			}
			stages.push(FailureRetryStage::unbounded(interval_seconds));
		} else {
			let attempts: u32 = attempts_raw.parse().map_err(|_| {
				ConfigError::InvalidStages(format!("invalid attempts in {:?}", entry))
			})?;
			if attempts == 0 {
				return Err(ConfigError::InvalidStages(format!(
					"attempts must be positive in {:?}",
					entry
				)));
			}
			stages.push(FailureRetryStage::bounded(attempts, interval_seconds));
		}
	}

	Ok(stages)
}

fn optional_var(key: &str) -> Option<String> {
	match env::var(key) {
		Ok(value) if !value.trim().is_empty() => Some(value),
		_ => None,
	}
}

fn parse_var<T>(key: &str, default: T) -> Result<T, ConfigError>
where
	T: FromStr,
	T::Err: fmt::Display,
{
	match optional_var(key) {
		Some(raw) => parse_raw(key, &raw),
		None => Ok(default),
	}
}

fn parse_raw<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
	T: FromStr,
	T::Err: fmt::Display,
{
	raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
		key: key.to_string(),
		message: format!("{e}"),
	})
}

fn parse_bool_var(key: &str, default: bool) -> bool {
	match optional_var(key) {
		Some(value) => {
			let value = value.to_lowercase();
			value != "false" && value != "0"
		}
		None => default,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	mod stage_parsing {
		use super::*;

		#[test]
		fn parses_the_canonical_stage_list() {
			let stages = parse_retry_stages("2:30,5:60,12:120,*:300").unwrap();
			assert_eq!(stages.len(), 4);
			assert_eq!(stages[0], FailureRetryStage::bounded(2, 30.0));
			assert_eq!(stages[1], FailureRetryStage::bounded(5, 60.0));
			assert_eq!(stages[2], FailureRetryStage::bounded(12, 120.0));
			assert_eq!(stages[3], FailureRetryStage::unbounded(300.0));
		}

		#[test]
		fn parses_fractional_intervals_and_whitespace() {
			let stages = parse_retry_stages(" 3:15.5 , *:90 ").unwrap();
			assert_eq!(stages[0], FailureRetryStage::bounded(3, 15.5));
			assert_eq!(stages[1], FailureRetryStage::unbounded(90.0));
		}

		#[test]
		fn accepts_a_fully_bounded_list() {
			let stages = parse_retry_stages("2:30,5:60").unwrap();
			assert_eq!(stages.len(), 2);
			assert!(stages.iter().all(|s| s.attempts.is_some()));
		}

		#[test]
		fn rejects_unbounded_stage_before_the_end() {
			assert!(parse_retry_stages("*:300,2:30").is_err());
		}

		#[test]
		fn rejects_malformed_entries() {
			assert!(parse_retry_stages("").is_err());
			assert!(parse_retry_stages("2").is_err());
			assert!(parse_retry_stages("two:30").is_err());
			assert!(parse_retry_stages("2:fast").is_err());
			assert!(parse_retry_stages("0:30").is_err());
			assert!(parse_retry_stages("2:-30").is_err());
			assert!(parse_retry_stages("2:0").is_err());
		}
	}

	// Environment access is process-global, so everything touching real
	// variables lives in this single test.
	#[test]
	fn from_env_applies_defaults_and_overrides() {
		env::set_var("DATABASE_URL", "postgres://monitron@localhost/monitron");

		let config = WorkerConfig::from_env().unwrap();
		assert_eq!(config.max_concurrency, 5);
		assert_eq!(config.jitter_seconds, 0.2);
		assert_eq!(config.scheduler_poll_interval, 1.0);
		assert_eq!(config.scheduler_claim_seconds, 30.0);
		assert_eq!(config.user_agent, "MonitronWorker/0.1");
		assert_eq!(config.failure_retry_stages, default_retry_stages());
		assert_eq!(config.sustained_down_threshold, 10);
		assert_eq!(config.sustained_down_window_minutes, 60);
		assert!(config.smtp.is_none());

		env::set_var("MAX_CONCURRENCY", "8");
		env::set_var("LOOP_INTERVAL", "2.5");
		env::set_var("FAILURE_RETRY_STAGES", "1:10,*:20");
		env::set_var("SMTP_HOST", "smtp.example.com");
		env::set_var("ALERT_EMAIL_FROM", "alerts@example.com");
		env::set_var("SMTP_USE_TLS", "false");

		let config = WorkerConfig::from_env().unwrap();
		assert_eq!(config.max_concurrency, 8);
		assert_eq!(config.scheduler_poll_interval, 2.5);
		assert_eq!(config.failure_retry_stages.len(), 2);
		let smtp = config.smtp.expect("smtp section");
		assert_eq!(smtp.host, "smtp.example.com");
		assert_eq!(smtp.port, 587);
		assert_eq!(smtp.from_address, "alerts@example.com");
		assert!(!smtp.use_tls);
		assert!(!smtp.use_ssl);

		// SCHEDULER_POLL_INTERVAL wins over the LOOP_INTERVAL alias.
		env::set_var("SCHEDULER_POLL_INTERVAL", "0.5");
		let config = WorkerConfig::from_env().unwrap();
		assert_eq!(config.scheduler_poll_interval, 0.5);

		env::set_var("MAX_CONCURRENCY", "zero");
		assert!(WorkerConfig::from_env().is_err());
		env::set_var("MAX_CONCURRENCY", "0");
		assert!(WorkerConfig::from_env().is_err());

		env::remove_var("DATABASE_URL");
		assert!(matches!(
			WorkerConfig::from_env(),
			Err(ConfigError::MissingVar(_))
		));

		for key in [
			"MAX_CONCURRENCY",
			"LOOP_INTERVAL",
			"SCHEDULER_POLL_INTERVAL",
			"FAILURE_RETRY_STAGES",
			"SMTP_HOST",
			"ALERT_EMAIL_FROM",
			"SMTP_USE_TLS",
		] {
			env::remove_var(key);
		}
	}
}
