// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP probe client for Monitron.
//!
//! One request per probe with a hard per-request deadline. Retry is the
//! scheduler's responsibility via `next_run_at`; the client never retries.

mod client;

pub use client::{ProbeClient, ProbeError, ProbeResponse, Prober};
