// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the Monitron uptime monitoring system.
//!
//! This crate holds the domain model shared by the scheduler, the check
//! executor and the alert engine: monitors and their append-only check log,
//! probe outcomes, the staged failure-retry policy, and next-run scheduling.

pub mod backoff;
pub mod check;
pub mod monitor;
pub mod schedule;

pub use backoff::{default_retry_stages, failure_retry_interval, FailureRetryStage};
pub use check::{CheckId, CheckResult, MonitorCheck, User, UserId};
pub use monitor::{Monitor, MonitorId, MonitorSnapshot, Outcome};
pub use schedule::{schedule_next_run, SchedulePolicy};
