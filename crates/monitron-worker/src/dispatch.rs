// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-process dispatch from the scheduler to the worker pool.
//!
//! The channel is the backpressure point: when every worker slot is busy
//! and the buffer is full, the scheduler blocks on enqueue. That is safe —
//! monitors it has already claimed stay leased, and anything it has not
//! claimed remains visible to the next poll.

use std::sync::Arc;

use monitron_core::MonitorId;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::info;

use crate::executor::CheckExecutor;

/// The worker pool hung up; no further checks can be dispatched.
#[derive(Debug, thiserror::Error)]
#[error("dispatch channel closed")]
pub struct DispatchClosed;

/// Create the scheduler → worker pool channel.
pub fn dispatch_channel(capacity: usize) -> (Dispatcher, mpsc::Receiver<MonitorId>) {
	let (tx, rx) = mpsc::channel(capacity);
	(Dispatcher { tx }, rx)
}

/// Sending half of the dispatch channel, held by the scheduler.
#[derive(Clone)]
pub struct Dispatcher {
	tx: mpsc::Sender<MonitorId>,
}

impl Dispatcher {
	pub async fn dispatch(&self, monitor_id: MonitorId) -> Result<(), DispatchClosed> {
		self.tx.send(monitor_id).await.map_err(|_| DispatchClosed)
	}
}

/// Runs check executors with bounded concurrency.
///
/// Receives monitor ids from the dispatch channel and spawns one executor
/// task per id, holding a semaphore permit for the duration of the check.
pub struct WorkerPool {
	executor: Arc<CheckExecutor>,
	max_concurrency: usize,
}

impl WorkerPool {
	pub fn new(executor: Arc<CheckExecutor>, max_concurrency: usize) -> Self {
		Self {
			executor,
			max_concurrency,
		}
	}

	/// Consume dispatches until the channel closes or shutdown is signalled,
	/// then drain in-flight checks.
	pub async fn run(
		self,
		mut rx: mpsc::Receiver<MonitorId>,
		mut shutdown_rx: broadcast::Receiver<()>,
	) {
		let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
		let mut in_flight = JoinSet::new();

		info!(max_concurrency = self.max_concurrency, "worker pool started");

		loop {
			tokio::select! {
				maybe_id = rx.recv() => {
					let Some(monitor_id) = maybe_id else { break };
					let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
						break;
					};
					let executor = Arc::clone(&self.executor);
					in_flight.spawn(async move {
						let _permit = permit;
						executor.execute(monitor_id).await;
					});
				}
				Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
				_ = shutdown_rx.recv() => {
					info!("worker pool shutting down");
					break;
				}
			}
		}

		// Checks abandoned here are recovered by claim-lease expiry.
		while in_flight.join_next().await.is_some() {}

		info!("worker pool stopped");
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::alert::{AlertConfig, AlertEngine};
	use crate::testing::{GaugeProber, MemoryStore};
	use monitron_core::{default_retry_stages, SchedulePolicy};
	use monitron_db::MonitorStore;
	use monitron_probe::Prober;
	use std::time::Duration;

	#[tokio::test(flavor = "multi_thread")]
	async fn pool_bounds_concurrency_and_drains_the_queue() {
		let store = Arc::new(MemoryStore::new());
		for id in 1..=10 {
			store.seed_monitor(crate::testing::make_monitor(id, 60));
		}

		let prober = Arc::new(GaugeProber::new(Duration::from_millis(50)));
		let alerts = AlertEngine::new(
			Arc::clone(&store) as Arc<dyn MonitorStore>,
			None,
			AlertConfig {
				sustained_down_threshold: 0,
				sustained_down_window_minutes: 0,
			},
		);
		let executor = Arc::new(CheckExecutor::new(
			Arc::clone(&store) as Arc<dyn MonitorStore>,
			Arc::clone(&prober) as Arc<dyn Prober>,
			SchedulePolicy::without_jitter(default_retry_stages()),
			alerts,
		));

		let (dispatcher, rx) = dispatch_channel(16);
		let (shutdown_tx, _) = broadcast::channel(1);
		let pool = WorkerPool::new(executor, 2);
		let pool_task = tokio::spawn(pool.run(rx, shutdown_tx.subscribe()));

		for id in 1..=10 {
			dispatcher.dispatch(monitron_core::MonitorId(id)).await.unwrap();
		}
		drop(dispatcher);

		pool_task.await.unwrap();

		assert_eq!(store.checks.lock().unwrap().len(), 10);
		assert!(
			prober.max_seen() <= 2,
			"at most two probes may be in flight, saw {}",
			prober.max_seen()
		);
	}
}
