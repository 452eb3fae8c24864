// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Monitron probe worker binary.
//!
//! Runs the scheduler and the worker pool in one process, wired through the
//! in-process dispatch channel. Configuration comes from the environment;
//! the process exits only on unrecoverable initialization failures.

use std::sync::Arc;

use clap::Parser;
use monitron_config::WorkerConfig;
use monitron_core::SchedulePolicy;
use monitron_db::{create_pool, ensure_schema, MonitorStore, PgMonitorStore};
use monitron_probe::{ProbeClient, Prober};
use monitron_smtp::{Mailer, SmtpMailer};
use monitron_worker::{
	dispatch_channel, AlertConfig, AlertEngine, CheckExecutor, Scheduler, SchedulerConfig,
	WorkerPool,
};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Monitron worker - probes registered monitors on their schedule.
#[derive(Parser, Debug)]
#[command(
	name = "monitron-worker",
	about = "Monitron uptime probe scheduler and worker",
	version
)]
struct Args {}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let _args = Args::parse();

	// Load .env file if present
	dotenvy::dotenv().ok();

	tracing_subscriber::registry()
		.with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.with(tracing_subscriber::fmt::layer())
		.init();

	let config = WorkerConfig::from_env()?;

	tracing::info!(
		max_concurrency = config.max_concurrency,
		poll_interval_secs = config.scheduler_poll_interval,
		claim_secs = config.scheduler_claim_seconds,
		alerting = config.smtp.is_some(),
		"starting monitron worker"
	);

	// Connections are only borrowed around store calls, never across a
	// probe, so the worker slots plus the scheduler share a small pool.
	let pool = create_pool(&config.database_url, config.max_concurrency as u32 + 2).await?;
	ensure_schema(&pool).await?;

	let store: Arc<dyn MonitorStore> = Arc::new(PgMonitorStore::new(pool));

	let mailer: Option<Arc<dyn Mailer>> = match config.smtp.clone() {
		Some(smtp) => Some(Arc::new(SmtpMailer::new(smtp)?)),
		None => None,
	};

	let alerts = AlertEngine::new(
		Arc::clone(&store),
		mailer,
		AlertConfig {
			sustained_down_threshold: config.sustained_down_threshold,
			sustained_down_window_minutes: config.sustained_down_window_minutes,
		},
	);

	let prober: Arc<dyn Prober> = Arc::new(ProbeClient::new(&config.user_agent)?);
	let policy = SchedulePolicy::new(config.failure_retry_stages.clone(), config.jitter_seconds);
	let executor = Arc::new(CheckExecutor::new(
		Arc::clone(&store),
		prober,
		policy,
		alerts,
	));

	let scheduler_config = SchedulerConfig::new(
		config.max_concurrency,
		config.scheduler_poll_interval,
		config.scheduler_claim_seconds,
	);
	let (dispatcher, dispatch_rx) = dispatch_channel(scheduler_config.fetch_limit as usize);
	let (shutdown_tx, _) = broadcast::channel(1);

	let worker_pool = WorkerPool::new(executor, config.max_concurrency);
	let pool_task = tokio::spawn(worker_pool.run(dispatch_rx, shutdown_tx.subscribe()));

	let scheduler = Scheduler::new(store, scheduler_config, dispatcher);
	let scheduler_task = tokio::spawn(scheduler.run(shutdown_tx.subscribe()));

	tokio::signal::ctrl_c().await?;
	tracing::info!("shutdown signal received");
	let _ = shutdown_tx.send(());

	// In-flight probes finish or are abandoned; abandoned claims expire
	// after the lease and the monitors become due again.
	let _ = scheduler_task.await;
	let _ = pool_task.await;

	Ok(())
}
