// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory test doubles for the store, prober and mailer seams.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use monitron_core::{
	schedule_next_run, CheckId, CheckResult, Monitor, MonitorCheck, MonitorId, MonitorSnapshot,
	Outcome, SchedulePolicy, User, UserId,
};
use monitron_db::{MonitorStore, RecordedCheck};
use monitron_probe::{ProbeError, ProbeResponse, Prober};
use monitron_smtp::{Mailer, SmtpError};

/// A due, enabled, ownerless monitor.
pub(crate) fn make_monitor(id: i64, interval_seconds: i32) -> Monitor {
	let now = Utc::now();
	Monitor {
		id: MonitorId(id),
		name: format!("monitor-{id}"),
		url: format!("http://monitor-{id}.example.com/health"),
		method: "GET".to_string(),
		interval_seconds,
		timeout_seconds: 5,
		enabled: true,
		owner_id: None,
		next_run_at: now - ChronoDuration::seconds(1),
		last_checked_at: None,
		last_status_code: None,
		last_latency_ms: None,
		last_outcome: None,
		consecutive_failures: 0,
		created_at: now,
		updated_at: now,
	}
}

pub(crate) fn make_user(id: i64, email: &str, is_active: bool) -> User {
	User {
		id: UserId(id),
		email: email.to_string(),
		is_active,
	}
}

/// In-memory [`MonitorStore`] mirroring the Postgres store's semantics.
pub(crate) struct MemoryStore {
	pub monitors: Mutex<BTreeMap<i64, Monitor>>,
	pub checks: Mutex<Vec<MonitorCheck>>,
	pub users: Mutex<HashMap<i64, User>>,
	next_check_id: AtomicI64,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self {
			monitors: Mutex::new(BTreeMap::new()),
			checks: Mutex::new(Vec::new()),
			users: Mutex::new(HashMap::new()),
			next_check_id: AtomicI64::new(1),
		}
	}

	pub fn seed_monitor(&self, monitor: Monitor) {
		self.monitors.lock().unwrap().insert(monitor.id.0, monitor);
	}

	pub fn seed_user(&self, user: User) {
		self.users.lock().unwrap().insert(user.id.0, user);
	}
}

#[async_trait]
impl MonitorStore for MemoryStore {
	async fn claim_due_monitors(
		&self,
		now: DateTime<Utc>,
		claim_until: DateTime<Utc>,
		limit: i64,
	) -> monitron_db::Result<Vec<MonitorId>> {
		let mut monitors = self.monitors.lock().unwrap();
		let mut due: Vec<&mut Monitor> = monitors
			.values_mut()
			.filter(|m| m.enabled && m.next_run_at <= now)
			.collect();
		due.sort_by_key(|m| m.next_run_at);

		let mut claimed = Vec::new();
		for monitor in due.into_iter().take(limit as usize) {
			monitor.next_run_at = claim_until;
			monitor.updated_at = now;
			claimed.push(monitor.id);
		}
		Ok(claimed)
	}

	async fn load_snapshot(&self, id: MonitorId) -> monitron_db::Result<Option<MonitorSnapshot>> {
		let monitors = self.monitors.lock().unwrap();
		Ok(monitors
			.get(&id.0)
			.filter(|m| m.enabled)
			.map(|m| MonitorSnapshot {
				id: m.id,
				method: m.method.clone(),
				url: m.url.clone(),
				timeout_seconds: m.timeout_seconds,
				interval_seconds: m.interval_seconds,
			}))
	}

	async fn record_check(
		&self,
		id: MonitorId,
		result: &CheckResult,
		policy: &SchedulePolicy,
		window_minutes: i64,
	) -> monitron_db::Result<Option<RecordedCheck>> {
		let mut monitors = self.monitors.lock().unwrap();
		let Some(monitor) = monitors.get_mut(&id.0) else {
			return Ok(None);
		};

		// The mock pins "now" to the probe completion time so scheduling
		// assertions are deterministic.
		let now = result.completed_at;
		let consecutive_failures = match result.outcome {
			Outcome::Up => 0,
			Outcome::Down => monitor.consecutive_failures + 1,
		};

		monitor.last_checked_at = Some(result.completed_at);
		monitor.last_status_code = result.status_code;
		monitor.last_latency_ms = result.latency_ms;
		monitor.last_outcome = Some(result.outcome);
		monitor.consecutive_failures = consecutive_failures;
		monitor.next_run_at = schedule_next_run(
			policy,
			now,
			monitor.interval_seconds,
			result.outcome,
			consecutive_failures,
		);
		monitor.updated_at = now;

		let check_id = CheckId(self.next_check_id.fetch_add(1, Ordering::SeqCst));
		let mut checks = self.checks.lock().unwrap();
		checks.push(MonitorCheck {
			id: check_id,
			monitor_id: id,
			occurred_at: result.completed_at,
			outcome: result.outcome,
			status_code: result.status_code,
			latency_ms: result.latency_ms,
			error_message: result.error_message.clone(),
		});

		let down_in_window = if result.outcome.is_down() && window_minutes > 0 {
			let cutoff = now - ChronoDuration::minutes(window_minutes);
			checks
				.iter()
				.filter(|c| {
					c.monitor_id == id && c.outcome == Outcome::Down && c.occurred_at >= cutoff
				})
				.count() as i64
		} else {
			0
		};

		Ok(Some(RecordedCheck {
			monitor: monitor.clone(),
			check_id,
			down_in_window,
		}))
	}

	async fn get_user(&self, id: UserId) -> monitron_db::Result<Option<User>> {
		Ok(self.users.lock().unwrap().get(&id.0).cloned())
	}
}

enum Scripted {
	Response { status: u16, latency_ms: u64 },
	Failure { message: String, timeout: bool },
}

/// A prober that always yields the same scripted outcome.
pub(crate) struct ScriptedProber {
	scripted: Scripted,
	calls: AtomicUsize,
}

impl ScriptedProber {
	pub fn ok(status: u16, latency_ms: u64) -> Self {
		Self {
			scripted: Scripted::Response { status, latency_ms },
			calls: AtomicUsize::new(0),
		}
	}

	pub fn err(error: ProbeError) -> Self {
		let (message, timeout) = match error {
			ProbeError::Timeout(message) => (message, true),
			other => (other.to_string(), false),
		};
		Self {
			scripted: Scripted::Failure { message, timeout },
			calls: AtomicUsize::new(0),
		}
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl Prober for ScriptedProber {
	async fn probe(
		&self,
		_method: &str,
		_url: &str,
		_timeout: Duration,
	) -> Result<ProbeResponse, ProbeError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		match &self.scripted {
			Scripted::Response { status, latency_ms } => Ok(ProbeResponse {
				status: *status,
				elapsed: Duration::from_millis(*latency_ms),
			}),
			Scripted::Failure { message, timeout } => Err(if *timeout {
				ProbeError::Timeout(message.clone())
			} else {
				ProbeError::Transport(message.clone())
			}),
		}
	}
}

/// A slow prober that tracks how many probes overlap.
pub(crate) struct GaugeProber {
	delay: Duration,
	current: AtomicUsize,
	max_seen: AtomicUsize,
}

impl GaugeProber {
	pub fn new(delay: Duration) -> Self {
		Self {
			delay,
			current: AtomicUsize::new(0),
			max_seen: AtomicUsize::new(0),
		}
	}

	pub fn max_seen(&self) -> usize {
		self.max_seen.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl Prober for GaugeProber {
	async fn probe(
		&self,
		_method: &str,
		_url: &str,
		_timeout: Duration,
	) -> Result<ProbeResponse, ProbeError> {
		let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
		self.max_seen.fetch_max(current, Ordering::SeqCst);
		tokio::time::sleep(self.delay).await;
		self.current.fetch_sub(1, Ordering::SeqCst);
		Ok(ProbeResponse {
			status: 200,
			elapsed: self.delay,
		})
	}
}

/// Records every message instead of sending it.
#[derive(Default)]
pub(crate) struct RecordingMailer {
	pub sent: Mutex<Vec<(String, String, String)>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
	async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), SmtpError> {
		self.sent
			.lock()
			.unwrap()
			.push((to.to_string(), subject.to_string(), body.to_string()));
		Ok(())
	}
}

/// Fails every send.
pub(crate) struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
	async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), SmtpError> {
		Err(SmtpError::Send("smtp relay unavailable".to_string()))
	}
}
