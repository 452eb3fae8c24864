// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Sustained-down alerting.
//!
//! One email per sustained-downtime event, without an "alert sent" flag:
//! the alert fires only on the check whose post-insert window count equals
//! the threshold exactly. As the window count ratchets past the threshold no
//! further mail is sent, and recovery ages the window back below it.

use std::sync::Arc;

use monitron_core::{CheckResult, Monitor};
use monitron_db::{MonitorStore, RecordedCheck};
use monitron_smtp::{is_valid_email, Mailer};
use tracing::{debug, info, instrument, warn};

/// Alert engine knobs. A threshold or window of zero disables alerting.
#[derive(Debug, Clone)]
pub struct AlertConfig {
	pub sustained_down_threshold: i64,
	pub sustained_down_window_minutes: i64,
}

/// Evaluates the sustained-down edge after each persisted `down` check and
/// emits a plain-text email to the monitor owner when it is crossed.
///
/// Mail delivery is fire-and-forget: the check result is already durable,
/// so send failures are logged and never escalate to the probe pipeline.
pub struct AlertEngine {
	store: Arc<dyn MonitorStore>,
	mailer: Option<Arc<dyn Mailer>>,
	config: AlertConfig,
}

impl AlertEngine {
	pub fn new(
		store: Arc<dyn MonitorStore>,
		mailer: Option<Arc<dyn Mailer>>,
		config: AlertConfig,
	) -> Self {
		if mailer.is_none() {
			debug!("no mailer configured; sustained-down alerts disabled");
		}
		Self {
			store,
			mailer,
			config,
		}
	}

	/// Window length handed to the store's post-insert count.
	pub fn window_minutes(&self) -> i64 {
		self.config.sustained_down_window_minutes
	}

	/// Evaluate a freshly persisted `down` check.
	#[instrument(skip(self, recorded, result), fields(monitor_id = %recorded.monitor.id))]
	pub async fn on_down(&self, recorded: &RecordedCheck, result: &CheckResult) {
		let threshold = self.config.sustained_down_threshold;
		if threshold <= 0 || self.config.sustained_down_window_minutes <= 0 {
			return;
		}

		let Some(mailer) = self.mailer.as_ref() else {
			debug!("mailer disabled; skipping sustained-down evaluation");
			return;
		};

		let monitor = &recorded.monitor;
		let Some(owner_id) = monitor.owner_id else {
			debug!("monitor has no owner; skipping sustained-down evaluation");
			return;
		};

		// Exact-equality edge: only the check that first reaches the
		// threshold fires; later down checks inside the window do not.
		if recorded.down_in_window != threshold {
			debug!(
				down_in_window = recorded.down_in_window,
				threshold, "sustained-down count not at the alert edge"
			);
			return;
		}

		let user = match self.store.get_user(owner_id).await {
			Ok(Some(user)) => user,
			Ok(None) => {
				warn!(owner_id = %owner_id, "alert owner not found; skipping alert");
				return;
			}
			Err(e) => {
				warn!(owner_id = %owner_id, error = %e, "failed to resolve alert owner; skipping alert");
				return;
			}
		};
		if !user.is_active {
			warn!(owner_id = %user.id, "alert owner is inactive; skipping alert");
			return;
		}
		if !is_valid_email(&user.email) {
			warn!(owner_id = %user.id, "alert owner has an invalid email address; skipping alert");
			return;
		}

		let subject = format!("[monitron] {} is down", monitor.name);
		let body = sustained_down_body(
			monitor,
			result,
			recorded.down_in_window,
			self.config.sustained_down_window_minutes,
		);

		match mailer.send(&user.email, &subject, &body).await {
			Ok(()) => info!(recipient = %user.email, "sustained-down alert sent"),
			Err(e) => warn!(error = %e, "failed to send sustained-down alert"),
		}
	}
}

fn sustained_down_body(
	monitor: &Monitor,
	result: &CheckResult,
	down_count: i64,
	window_minutes: i64,
) -> String {
	let latest_status = match result.status_code {
		Some(code) => format!("HTTP {} ({})", code, result.outcome),
		None => format!("{} (no HTTP response)", result.outcome),
	};

	let mut body = format!(
		"Monitor '{}' has failed {} checks in the last {} minutes.\n\
		 \n\
		 URL: {}\n\
		 Latest status: {}\n",
		monitor.name, down_count, window_minutes, monitor.url, latest_status
	);
	if let Some(error) = &result.error_message {
		body.push_str(&format!("Latest error: {}\n", error));
	}
	body
}
