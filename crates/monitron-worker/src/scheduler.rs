// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Scheduler loop: claim due monitors and hand them to the worker pool.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use monitron_db::MonitorStore;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, trace, warn};

use crate::dispatch::{DispatchClosed, Dispatcher};

/// Scheduler knobs.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
	/// Cadence floor for one claim iteration.
	pub poll_interval: Duration,
	/// Claim lease: how far `next_run_at` is advanced on claim. An executor
	/// that never commits leaves its monitor dormant for this long.
	pub claim_ttl: Duration,
	/// Rows fetched per iteration.
	pub fetch_limit: i64,
}

impl SchedulerConfig {
	/// Standard sizing: fetch four times the worker concurrency per cycle.
	pub fn new(max_concurrency: usize, poll_interval_seconds: f64, claim_seconds: f64) -> Self {
		Self {
			poll_interval: Duration::from_secs_f64(poll_interval_seconds),
			claim_ttl: Duration::from_secs_f64(claim_seconds),
			fetch_limit: (max_concurrency * 4) as i64,
		}
	}
}

/// Polls the store for due monitors, claims a batch atomically and forwards
/// the claimed ids to the worker pool.
///
/// Multiple scheduler instances may run against the same store; the
/// skip-locked claim guarantees each due monitor is dispatched at most once
/// per lease.
pub struct Scheduler {
	store: Arc<dyn MonitorStore>,
	config: SchedulerConfig,
	dispatcher: Dispatcher,
}

impl Scheduler {
	pub fn new(store: Arc<dyn MonitorStore>, config: SchedulerConfig, dispatcher: Dispatcher) -> Self {
		Self {
			store,
			config,
			dispatcher,
		}
	}

	/// Run claim iterations until shutdown is signalled or the worker pool
	/// hangs up.
	pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
		info!(
			poll_interval_secs = self.config.poll_interval.as_secs_f64(),
			fetch_limit = self.config.fetch_limit,
			"starting scheduler loop"
		);

		loop {
			let iteration_start = Instant::now();

			if self.poll_once().await.is_err() {
				warn!("worker pool hung up; stopping scheduler loop");
				break;
			}

			let sleep_for = self
				.config
				.poll_interval
				.saturating_sub(iteration_start.elapsed());
			tokio::select! {
				_ = tokio::time::sleep(sleep_for) => {}
				_ = shutdown_rx.recv() => {
					info!("shutting down scheduler loop");
					break;
				}
			}
		}
	}

	/// One claim iteration. Returns the number of monitors dispatched.
	///
	/// Claim failures are absorbed: unclaimed monitors remain due and are
	/// picked up on the next poll.
	#[instrument(skip(self))]
	pub async fn poll_once(&self) -> Result<usize, DispatchClosed> {
		let now = Utc::now();
		let claim_until =
			now + chrono::Duration::milliseconds(self.config.claim_ttl.as_millis() as i64);

		let claimed = match self
			.store
			.claim_due_monitors(now, claim_until, self.config.fetch_limit)
			.await
		{
			Ok(ids) => ids,
			Err(e) => {
				warn!(error = %e, "failed to claim due monitors");
				return Ok(0);
			}
		};

		if claimed.is_empty() {
			trace!("no monitors due this cycle");
			return Ok(0);
		}

		debug!(count = claimed.len(), "dispatching monitor checks");
		let dispatched = claimed.len();
		for monitor_id in claimed {
			self.dispatcher.dispatch(monitor_id).await?;
		}

		Ok(dispatched)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::dispatch::dispatch_channel;
	use crate::testing::{make_monitor, MemoryStore};
	use chrono::Duration as ChronoDuration;
	use monitron_core::MonitorId;

	fn scheduler_with_store(store: Arc<MemoryStore>) -> (Scheduler, tokio::sync::mpsc::Receiver<MonitorId>) {
		let (dispatcher, rx) = dispatch_channel(64);
		let scheduler = Scheduler::new(
			store as Arc<dyn MonitorStore>,
			SchedulerConfig::new(5, 1.0, 30.0),
			dispatcher,
		);
		(scheduler, rx)
	}

	#[tokio::test]
	async fn claims_and_dispatches_only_due_enabled_monitors() {
		let store = Arc::new(MemoryStore::new());
		store.seed_monitor(make_monitor(1, 60)); // due
		store.seed_monitor(make_monitor(2, 60)); // due
		let mut disabled = make_monitor(3, 60);
		disabled.enabled = false;
		store.seed_monitor(disabled);
		let mut future = make_monitor(4, 60);
		future.next_run_at = Utc::now() + ChronoDuration::hours(1);
		store.seed_monitor(future);

		let (scheduler, mut rx) = scheduler_with_store(Arc::clone(&store));
		let dispatched = scheduler.poll_once().await.unwrap();
		assert_eq!(dispatched, 2);

		let mut ids = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
		ids.sort();
		assert_eq!(ids, vec![MonitorId(1), MonitorId(2)]);
		assert!(rx.try_recv().is_err());
	}

	#[tokio::test]
	async fn claim_advances_next_run_at_into_the_lease() {
		let store = Arc::new(MemoryStore::new());
		store.seed_monitor(make_monitor(1, 60));

		let (scheduler, _rx) = scheduler_with_store(Arc::clone(&store));
		let before = Utc::now();
		scheduler.poll_once().await.unwrap();

		let monitors = store.monitors.lock().unwrap();
		let next_run_at = monitors.get(&1).unwrap().next_run_at;
		// The claim parks the monitor a full lease into the future.
		assert!(next_run_at >= before + ChronoDuration::seconds(30));
	}

	#[tokio::test]
	async fn second_poll_inside_the_lease_claims_nothing() {
		let store = Arc::new(MemoryStore::new());
		store.seed_monitor(make_monitor(1, 60));

		let (scheduler, mut rx) = scheduler_with_store(Arc::clone(&store));
		assert_eq!(scheduler.poll_once().await.unwrap(), 1);
		assert_eq!(scheduler.poll_once().await.unwrap(), 0);

		assert_eq!(rx.recv().await.unwrap(), MonitorId(1));
		assert!(rx.try_recv().is_err());
	}

	#[tokio::test]
	async fn fetch_limit_is_four_times_concurrency() {
		let config = SchedulerConfig::new(5, 1.0, 30.0);
		assert_eq!(config.fetch_limit, 20);

		let store = Arc::new(MemoryStore::new());
		for id in 1..=25 {
			store.seed_monitor(make_monitor(id, 60));
		}
		let (scheduler, _rx) = scheduler_with_store(Arc::clone(&store));
		assert_eq!(scheduler.poll_once().await.unwrap(), 20);
	}
}
