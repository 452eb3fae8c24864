// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Postgres store for Monitron.
//!
//! Holds the `monitors` and `monitor_checks` tables (and reads `users` for
//! alert routing), and implements the scheduler's claim protocol with
//! `FOR UPDATE SKIP LOCKED` so concurrent scheduler instances never dispatch
//! the same monitor twice within one lease.

pub mod error;
pub mod pool;
pub mod repository;
pub mod schema;

pub use error::{DbError, Result};
pub use pool::create_pool;
pub use repository::{MonitorStore, PgMonitorStore, RecordedCheck};
pub use schema::ensure_schema;

/// Environment variable naming the database used by the ignored
/// integration tests.
pub const ENV_TEST_DB_URL: &str = "MONITRON_TEST_DATABASE_URL";
