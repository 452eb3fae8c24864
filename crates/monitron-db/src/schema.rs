// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Schema bootstrap for the probe engine's tables.
//!
//! Full migration tooling lives with the API service; the worker only
//! ensures the tables and indexes it touches exist, so a fresh database is
//! usable without a separate migration step.

use sqlx::PgPool;

use crate::error::Result;

const SCHEMA_STATEMENTS: &[&str] = &[
	r#"
	CREATE TABLE IF NOT EXISTS users (
		id BIGSERIAL PRIMARY KEY,
		email VARCHAR(255) NOT NULL,
		is_active BOOLEAN NOT NULL DEFAULT TRUE
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS monitors (
		id BIGSERIAL PRIMARY KEY,
		name VARCHAR(255) NOT NULL,
		url VARCHAR(1024) NOT NULL,
		method VARCHAR(16) NOT NULL DEFAULT 'GET',
		interval_seconds INTEGER NOT NULL DEFAULT 60,
		timeout_seconds INTEGER NOT NULL DEFAULT 10,
		enabled BOOLEAN NOT NULL DEFAULT TRUE,
		owner_id BIGINT REFERENCES users(id),
		next_run_at TIMESTAMPTZ NOT NULL DEFAULT now(),
		last_checked_at TIMESTAMPTZ,
		last_status_code INTEGER,
		last_latency_ms BIGINT,
		last_outcome VARCHAR(16),
		consecutive_failures INTEGER NOT NULL DEFAULT 0,
		created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
		updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
	)
	"#,
	// Scheduler due-selection path.
	r#"
	CREATE INDEX IF NOT EXISTS idx_monitors_enabled_next_run_at
		ON monitors (enabled, next_run_at)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS monitor_checks (
		id BIGSERIAL PRIMARY KEY,
		monitor_id BIGINT NOT NULL REFERENCES monitors(id),
		occurred_at TIMESTAMPTZ NOT NULL DEFAULT now(),
		outcome VARCHAR(16) NOT NULL,
		status_code INTEGER,
		latency_ms BIGINT,
		error_message VARCHAR(1024)
	)
	"#,
	// Alert window counting path.
	r#"
	CREATE INDEX IF NOT EXISTS idx_monitor_checks_monitor_occurred
		ON monitor_checks (monitor_id, occurred_at)
	"#,
];

/// Create the worker's tables and indexes if they do not exist yet.
#[tracing::instrument(skip(pool))]
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
	for statement in SCHEMA_STATEMENTS {
		sqlx::query(statement).execute(pool).await?;
	}

	tracing::debug!("schema ensured");
	Ok(())
}
