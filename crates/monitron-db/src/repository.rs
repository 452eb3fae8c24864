// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Repository layer for monitor and check-log database operations.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use tracing::{error, info, instrument, warn};

use monitron_core::{
	schedule_next_run, CheckId, CheckResult, Monitor, MonitorId, MonitorSnapshot, Outcome,
	SchedulePolicy, User, UserId,
};

use crate::error::{DbError, Result};

/// Outcome of a persisted check: the monitor row after the state update and
/// the number of `down` checks inside the sliding alert window, counted
/// after the insert. The count is only taken for `down` results; it is zero
/// for `up` results.
#[derive(Debug, Clone)]
pub struct RecordedCheck {
	pub monitor: Monitor,
	pub check_id: CheckId,
	pub down_in_window: i64,
}

/// Store trait for the probe engine.
#[async_trait]
pub trait MonitorStore: Send + Sync {
	/// Claim up to `limit` due monitors by advancing their `next_run_at` to
	/// `claim_until`, skipping rows locked by concurrent schedulers.
	/// Returns the claimed ids in due order.
	async fn claim_due_monitors(
		&self,
		now: DateTime<Utc>,
		claim_until: DateTime<Utc>,
		limit: i64,
	) -> Result<Vec<MonitorId>>;

	/// Load the probe-relevant fields of a monitor. Returns `None` (with a
	/// log line, no write) when the monitor is missing or disabled.
	async fn load_snapshot(&self, id: MonitorId) -> Result<Option<MonitorSnapshot>>;

	/// Persist one check result in a single transaction: reload the row,
	/// apply the state-update rules, compute the next run under `policy`,
	/// insert the check record, and count the alert window on `down`.
	/// Returns `None` when the monitor vanished mid-check.
	async fn record_check(
		&self,
		id: MonitorId,
		result: &CheckResult,
		policy: &SchedulePolicy,
		window_minutes: i64,
	) -> Result<Option<RecordedCheck>>;

	/// Alert-routing lookup. Read-only.
	async fn get_user(&self, id: UserId) -> Result<Option<User>>;
}

/// Postgres implementation of the monitor store.
#[derive(Clone)]
pub struct PgMonitorStore {
	pool: PgPool,
}

impl PgMonitorStore {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}
}

#[async_trait]
impl MonitorStore for PgMonitorStore {
	#[instrument(skip(self), fields(limit = limit))]
	async fn claim_due_monitors(
		&self,
		now: DateTime<Utc>,
		claim_until: DateTime<Utc>,
		limit: i64,
	) -> Result<Vec<MonitorId>> {
		// Selecting and advancing next_run_at in one statement keeps the
		// row locks scoped to the statement; SKIP LOCKED makes concurrent
		// schedulers partition the due set instead of blocking on it.
		let ids: Vec<i64> = sqlx::query_scalar(
			r#"
			WITH due AS (
				SELECT id
				FROM monitors
				WHERE enabled = TRUE
				  AND next_run_at <= $1
				ORDER BY next_run_at ASC
				LIMIT $2
				FOR UPDATE SKIP LOCKED
			)
			UPDATE monitors
			   SET next_run_at = $3,
			       updated_at = $1
			 WHERE id IN (SELECT id FROM due)
			RETURNING id
			"#,
		)
		.bind(now)
		.bind(limit)
		.bind(claim_until)
		.fetch_all(&self.pool)
		.await?;

		Ok(ids.into_iter().map(MonitorId).collect())
	}

	#[instrument(skip(self), fields(monitor_id = %id))]
	async fn load_snapshot(&self, id: MonitorId) -> Result<Option<MonitorSnapshot>> {
		let row = sqlx::query_as::<_, SnapshotRow>(
			r#"
			SELECT id, method, url, timeout_seconds, interval_seconds, enabled
			FROM monitors
			WHERE id = $1
			"#,
		)
		.bind(id.0)
		.fetch_optional(&self.pool)
		.await?;

		let Some(row) = row else {
			warn!(monitor_id = %id, "monitor not found when preparing snapshot");
			return Ok(None);
		};

		if !row.enabled {
			info!(monitor_id = %id, "monitor is disabled; skipping check dispatch");
			return Ok(None);
		}

		Ok(Some(MonitorSnapshot {
			id: MonitorId(row.id),
			method: row.method,
			url: row.url,
			timeout_seconds: row.timeout_seconds,
			interval_seconds: row.interval_seconds,
		}))
	}

	#[instrument(skip(self, result, policy), fields(monitor_id = %id, outcome = %result.outcome))]
	async fn record_check(
		&self,
		id: MonitorId,
		result: &CheckResult,
		policy: &SchedulePolicy,
		window_minutes: i64,
	) -> Result<Option<RecordedCheck>> {
		let mut tx = self.pool.begin().await?;

		let row = sqlx::query_as::<_, MonitorRow>(
			r#"
			SELECT id, name, url, method, interval_seconds, timeout_seconds,
			       enabled, owner_id,
			       next_run_at, last_checked_at, last_status_code,
			       last_latency_ms, last_outcome, consecutive_failures,
			       created_at, updated_at
			FROM monitors
			WHERE id = $1
			FOR UPDATE
			"#,
		)
		.bind(id.0)
		.fetch_optional(&mut *tx)
		.await?;

		let Some(row) = row else {
			error!(monitor_id = %id, "monitor disappeared before update");
			return Ok(None);
		};

		let now = Utc::now();
		let consecutive_failures = match result.outcome {
			Outcome::Up => 0,
			Outcome::Down => row.consecutive_failures + 1,
		};
		let next_run_at = schedule_next_run(
			policy,
			now,
			row.interval_seconds,
			result.outcome,
			consecutive_failures,
		);

		sqlx::query(
			r#"
			UPDATE monitors
			   SET last_checked_at = $1,
			       last_status_code = $2,
			       last_latency_ms = $3,
			       last_outcome = $4,
			       consecutive_failures = $5,
			       next_run_at = $6,
			       updated_at = $7
			 WHERE id = $8
			"#,
		)
		.bind(result.completed_at)
		.bind(result.status_code)
		.bind(result.latency_ms)
		.bind(result.outcome.to_string())
		.bind(consecutive_failures)
		.bind(next_run_at)
		.bind(now)
		.bind(id.0)
		.execute(&mut *tx)
		.await?;

		let check_id: i64 = sqlx::query_scalar(
			r#"
			INSERT INTO monitor_checks (monitor_id, occurred_at, outcome, status_code, latency_ms, error_message)
			VALUES ($1, $2, $3, $4, $5, $6)
			RETURNING id
			"#,
		)
		.bind(id.0)
		.bind(result.completed_at)
		.bind(result.outcome.to_string())
		.bind(result.status_code)
		.bind(result.latency_ms)
		.bind(result.error_message.as_deref())
		.fetch_one(&mut *tx)
		.await?;

		// The alert edge is decided on the count after the insert, inside
		// the same transaction.
		let down_in_window = if result.outcome.is_down() && window_minutes > 0 {
			let cutoff = now - Duration::minutes(window_minutes);
			sqlx::query_scalar::<_, i64>(
				r#"
				SELECT COUNT(*)
				FROM monitor_checks
				WHERE monitor_id = $1
				  AND outcome = 'down'
				  AND occurred_at >= $2
				"#,
			)
			.bind(id.0)
			.bind(cutoff)
			.fetch_one(&mut *tx)
			.await?
		} else {
			0
		};

		tx.commit().await?;

		let mut monitor: Monitor = row.try_into()?;
		monitor.last_checked_at = Some(result.completed_at);
		monitor.last_status_code = result.status_code;
		monitor.last_latency_ms = result.latency_ms;
		monitor.last_outcome = Some(result.outcome);
		monitor.consecutive_failures = consecutive_failures;
		monitor.next_run_at = next_run_at;
		monitor.updated_at = now;

		Ok(Some(RecordedCheck {
			monitor,
			check_id: CheckId(check_id),
			down_in_window,
		}))
	}

	#[instrument(skip(self), fields(user_id = %id))]
	async fn get_user(&self, id: UserId) -> Result<Option<User>> {
		let row = sqlx::query_as::<_, UserRow>(
			r#"
			SELECT id, email, is_active
			FROM users
			WHERE id = $1
			"#,
		)
		.bind(id.0)
		.fetch_optional(&self.pool)
		.await?;

		Ok(row.map(Into::into))
	}
}

#[derive(sqlx::FromRow)]
struct SnapshotRow {
	id: i64,
	method: String,
	url: String,
	timeout_seconds: i32,
	interval_seconds: i32,
	enabled: bool,
}

#[derive(sqlx::FromRow)]
struct MonitorRow {
	id: i64,
	name: String,
	url: String,
	method: String,
	interval_seconds: i32,
	timeout_seconds: i32,
	enabled: bool,
	owner_id: Option<i64>,
	next_run_at: DateTime<Utc>,
	last_checked_at: Option<DateTime<Utc>>,
	last_status_code: Option<i32>,
	last_latency_ms: Option<i64>,
	last_outcome: Option<String>,
	consecutive_failures: i32,
	created_at: DateTime<Utc>,
	updated_at: DateTime<Utc>,
}

impl TryFrom<MonitorRow> for Monitor {
	type Error = DbError;

	fn try_from(row: MonitorRow) -> Result<Self> {
		let last_outcome = row
			.last_outcome
			.map(|s| s.parse::<Outcome>().map_err(DbError::Internal))
			.transpose()?;

		Ok(Monitor {
			id: MonitorId(row.id),
			name: row.name,
			url: row.url,
			method: row.method,
			interval_seconds: row.interval_seconds,
			timeout_seconds: row.timeout_seconds,
			enabled: row.enabled,
			owner_id: row.owner_id.map(UserId),
			next_run_at: row.next_run_at,
			last_checked_at: row.last_checked_at,
			last_status_code: row.last_status_code,
			last_latency_ms: row.last_latency_ms,
			last_outcome,
			consecutive_failures: row.consecutive_failures,
			created_at: row.created_at,
			updated_at: row.updated_at,
		})
	}
}

#[derive(sqlx::FromRow)]
struct UserRow {
	id: i64,
	email: String,
	is_active: bool,
}

impl From<UserRow> for User {
	fn from(row: UserRow) -> Self {
		User {
			id: UserId(row.id),
			email: row.email,
			is_active: row.is_active,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn row(last_outcome: Option<&str>) -> MonitorRow {
		MonitorRow {
			id: 1,
			name: "api".to_string(),
			url: "https://api.example.com/health".to_string(),
			method: "GET".to_string(),
			interval_seconds: 60,
			timeout_seconds: 5,
			enabled: true,
			owner_id: Some(7),
			next_run_at: Utc::now(),
			last_checked_at: None,
			last_status_code: None,
			last_latency_ms: None,
			last_outcome: last_outcome.map(str::to_string),
			consecutive_failures: 0,
			created_at: Utc::now(),
			updated_at: Utc::now(),
		}
	}

	#[test]
	fn monitor_row_converts_with_known_outcome() {
		let monitor: Monitor = row(Some("down")).try_into().unwrap();
		assert_eq!(monitor.last_outcome, Some(Outcome::Down));
		assert_eq!(monitor.owner_id, Some(UserId(7)));
	}

	#[test]
	fn monitor_row_converts_without_outcome() {
		let monitor: Monitor = row(None).try_into().unwrap();
		assert_eq!(monitor.last_outcome, None);
	}

	#[test]
	fn monitor_row_rejects_unknown_outcome() {
		let result: Result<Monitor> = row(Some("flapping")).try_into();
		assert!(result.is_err());
	}
}
