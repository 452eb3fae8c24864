// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::error::DbError;

/// Create a PgPool with common settings.
///
/// Connections are borrowed briefly for the snapshot read and the update
/// transaction, never held across a probe, so the pool can stay small
/// relative to the probe concurrency.
///
/// # Arguments
/// * `database_url` - Postgres connection string (e.g., "postgres://monitron@localhost/monitron")
/// * `max_connections` - Upper bound on pooled connections
///
/// # Errors
/// Returns `DbError::Sqlx` if the URL is invalid or the connection fails.
#[tracing::instrument(skip(database_url))]
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool, DbError> {
	let pool = PgPoolOptions::new()
		.max_connections(max_connections)
		.connect(database_url)
		.await?;

	tracing::debug!("database pool created");
	Ok(pool)
}
