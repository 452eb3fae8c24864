// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Check executor: one complete probe cycle for a claimed monitor.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use monitron_core::{CheckResult, MonitorId, MonitorSnapshot, Outcome, SchedulePolicy};
use monitron_db::MonitorStore;
use monitron_probe::Prober;
use tracing::{error, info, instrument, warn};

use crate::alert::AlertEngine;

/// Runs the snapshot → probe → classify → persist → alert pipeline.
///
/// Every recoverable failure is absorbed here: a dropped check simply leaves
/// the monitor leased until `claim_ttl` expires, after which it becomes due
/// again. Nothing propagates to the worker pool.
pub struct CheckExecutor {
	store: Arc<dyn MonitorStore>,
	prober: Arc<dyn Prober>,
	policy: SchedulePolicy,
	alerts: AlertEngine,
}

impl CheckExecutor {
	pub fn new(
		store: Arc<dyn MonitorStore>,
		prober: Arc<dyn Prober>,
		policy: SchedulePolicy,
		alerts: AlertEngine,
	) -> Self {
		Self {
			store,
			prober,
			policy,
			alerts,
		}
	}

	/// Execute one check cycle, absorbing all recoverable errors.
	#[instrument(skip(self), fields(monitor_id = %monitor_id))]
	pub async fn execute(&self, monitor_id: MonitorId) {
		if let Err(e) = self.run_check(monitor_id).await {
			warn!(
				monitor_id = %monitor_id,
				error = %e,
				"check dropped; monitor becomes due again when its claim expires"
			);
		}
	}

	async fn run_check(&self, monitor_id: MonitorId) -> monitron_db::Result<()> {
		// Missing or disabled monitors are logged by the store; no write.
		let Some(snapshot) = self.store.load_snapshot(monitor_id).await? else {
			return Ok(());
		};

		let result = self.probe(&snapshot).await;

		let recorded = self
			.store
			.record_check(
				monitor_id,
				&result,
				&self.policy,
				self.alerts.window_minutes(),
			)
			.await?;
		let Some(recorded) = recorded else {
			return Ok(());
		};

		if result.outcome.is_down() {
			self.alerts.on_down(&recorded, &result).await;
		}

		Ok(())
	}

	/// Issue the HTTP request and classify the outcome.
	async fn probe(&self, snapshot: &MonitorSnapshot) -> CheckResult {
		let timeout = Duration::from_secs(snapshot.timeout_seconds.max(1) as u64);

		match self
			.prober
			.probe(&snapshot.method, &snapshot.url, timeout)
			.await
		{
			Ok(response) => {
				let latency_ms = response.elapsed.as_millis() as i64;
				let result = CheckResult::from_response(Utc::now(), response.status, latency_ms);
				match result.outcome {
					Outcome::Up => info!(
						monitor_id = %snapshot.id,
						status = response.status,
						latency_ms,
						"monitor responded"
					),
					Outcome::Down => warn!(
						monitor_id = %snapshot.id,
						status = response.status,
						"monitor returned non-success status"
					),
				}
				result
			}
			Err(e) => {
				error!(monitor_id = %snapshot.id, error = %e, "monitor request error");
				CheckResult::from_error(Utc::now(), e.to_string())
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::alert::AlertConfig;
	use crate::testing::{make_monitor, MemoryStore, ScriptedProber};
	use chrono::Duration as ChronoDuration;
	use monitron_core::default_retry_stages;
	use monitron_probe::ProbeError;

	fn executor_without_alerts(
		store: Arc<MemoryStore>,
		prober: Arc<ScriptedProber>,
	) -> CheckExecutor {
		let alerts = AlertEngine::new(
			Arc::clone(&store) as Arc<dyn MonitorStore>,
			None,
			AlertConfig {
				sustained_down_threshold: 0,
				sustained_down_window_minutes: 0,
			},
		);
		CheckExecutor::new(
			store as Arc<dyn MonitorStore>,
			prober as Arc<dyn Prober>,
			SchedulePolicy::without_jitter(default_retry_stages()),
			alerts,
		)
	}

	#[tokio::test]
	async fn healthy_check_updates_state_and_schedules_the_base_interval() {
		let store = Arc::new(MemoryStore::new());
		store.seed_monitor(make_monitor(1, 60));
		let prober = Arc::new(ScriptedProber::ok(200, 42));

		executor_without_alerts(Arc::clone(&store), prober)
			.execute(MonitorId(1))
			.await;

		let checks = store.checks.lock().unwrap().clone();
		assert_eq!(checks.len(), 1);
		assert_eq!(checks[0].outcome, Outcome::Up);
		assert_eq!(checks[0].status_code, Some(200));
		assert_eq!(checks[0].latency_ms, Some(42));
		assert_eq!(checks[0].error_message, None);

		let monitors = store.monitors.lock().unwrap();
		let monitor = monitors.get(&1).unwrap();
		assert_eq!(monitor.last_outcome, Some(Outcome::Up));
		assert_eq!(monitor.last_status_code, Some(200));
		assert_eq!(monitor.last_latency_ms, Some(42));
		assert_eq!(monitor.consecutive_failures, 0);
		// Base interval, no jitter: exactly 60s after the check.
		assert_eq!(
			monitor.next_run_at,
			checks[0].occurred_at + ChronoDuration::seconds(60)
		);
	}

	#[tokio::test]
	async fn non_success_status_is_recorded_as_down() {
		let store = Arc::new(MemoryStore::new());
		store.seed_monitor(make_monitor(1, 60));
		let prober = Arc::new(ScriptedProber::ok(503, 87));

		executor_without_alerts(Arc::clone(&store), prober)
			.execute(MonitorId(1))
			.await;

		let checks = store.checks.lock().unwrap().clone();
		assert_eq!(checks[0].outcome, Outcome::Down);
		assert_eq!(checks[0].status_code, Some(503));
		assert_eq!(checks[0].latency_ms, Some(87));

		let monitors = store.monitors.lock().unwrap();
		let monitor = monitors.get(&1).unwrap();
		assert_eq!(monitor.consecutive_failures, 1);
		// First failure: stage one of the default policy, 30s.
		assert_eq!(
			monitor.next_run_at,
			checks[0].occurred_at + ChronoDuration::seconds(30)
		);
	}

	#[tokio::test]
	async fn transport_error_records_the_message_and_no_metadata() {
		let store = Arc::new(MemoryStore::new());
		store.seed_monitor(make_monitor(1, 60));
		let prober = Arc::new(ScriptedProber::err(ProbeError::Transport(
			"connection refused (os error 111)".to_string(),
		)));

		executor_without_alerts(Arc::clone(&store), prober)
			.execute(MonitorId(1))
			.await;

		let checks = store.checks.lock().unwrap().clone();
		assert_eq!(checks.len(), 1);
		assert_eq!(checks[0].outcome, Outcome::Down);
		assert_eq!(checks[0].status_code, None);
		assert_eq!(checks[0].latency_ms, None);
		assert!(checks[0]
			.error_message
			.as_deref()
			.unwrap()
			.contains("connection refused"));

		let monitors = store.monitors.lock().unwrap();
		assert_eq!(monitors.get(&1).unwrap().consecutive_failures, 1);
	}

	#[tokio::test]
	async fn staged_backoff_progresses_with_consecutive_failures() {
		let store = Arc::new(MemoryStore::new());
		store.seed_monitor(make_monitor(1, 60));

		// Five failures in a row: 30s, 30s, then stage two at 60s.
		let expected_delays = [30i64, 30, 60, 60, 60];
		for (i, expected) in expected_delays.iter().enumerate() {
			let prober = Arc::new(ScriptedProber::ok(503, 10));
			executor_without_alerts(Arc::clone(&store), prober)
				.execute(MonitorId(1))
				.await;

			let checks = store.checks.lock().unwrap();
			let last = checks.last().unwrap().clone();
			drop(checks);
			let monitors = store.monitors.lock().unwrap();
			let monitor = monitors.get(&1).unwrap();
			assert_eq!(monitor.consecutive_failures, (i + 1) as i32);
			assert_eq!(
				monitor.next_run_at,
				last.occurred_at + ChronoDuration::seconds(*expected),
				"failure {} should retry after {}s",
				i + 1,
				expected
			);
		}
	}

	#[tokio::test]
	async fn recovery_resets_the_counter_and_restores_the_interval() {
		let store = Arc::new(MemoryStore::new());
		let mut monitor = make_monitor(1, 60);
		monitor.consecutive_failures = 5;
		monitor.last_outcome = Some(Outcome::Down);
		store.seed_monitor(monitor);
		let prober = Arc::new(ScriptedProber::ok(200, 12));

		executor_without_alerts(Arc::clone(&store), prober)
			.execute(MonitorId(1))
			.await;

		let checks = store.checks.lock().unwrap().clone();
		let monitors = store.monitors.lock().unwrap();
		let monitor = monitors.get(&1).unwrap();
		assert_eq!(monitor.consecutive_failures, 0);
		assert_eq!(monitor.last_outcome, Some(Outcome::Up));
		assert_eq!(
			monitor.next_run_at,
			checks[0].occurred_at + ChronoDuration::seconds(60)
		);
	}

	#[tokio::test]
	async fn missing_monitor_writes_nothing() {
		let store = Arc::new(MemoryStore::new());
		let prober = Arc::new(ScriptedProber::ok(200, 10));

		executor_without_alerts(Arc::clone(&store), Arc::clone(&prober))
			.execute(MonitorId(99))
			.await;

		assert!(store.checks.lock().unwrap().is_empty());
		assert_eq!(prober.calls(), 0, "missing monitor must not be probed");
	}

	#[tokio::test]
	async fn disabled_monitor_writes_nothing() {
		let store = Arc::new(MemoryStore::new());
		let mut monitor = make_monitor(1, 60);
		monitor.enabled = false;
		store.seed_monitor(monitor);
		let prober = Arc::new(ScriptedProber::ok(200, 10));

		executor_without_alerts(Arc::clone(&store), Arc::clone(&prober))
			.execute(MonitorId(1))
			.await;

		assert!(store.checks.lock().unwrap().is_empty());
		assert_eq!(prober.calls(), 0, "disabled monitor must not be probed");
	}
}
