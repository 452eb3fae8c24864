// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SMTP alert mailer for Monitron.
//!
//! Sustained-down alerts are plain-text emails sent to the monitor owner.
//! The [`Mailer`] trait is the seam the alert engine depends on; the
//! [`SmtpMailer`] implementation drives an async [`lettre`] transport with
//! STARTTLS, implicit TLS or plaintext connections and optional
//! authentication.

use async_trait::async_trait;
use lettre::{
	message::{header::ContentType, Mailbox},
	transport::smtp::authentication::Credentials,
	AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::fmt;
use std::time::Duration;

/// Errors that can occur during SMTP operations.
#[derive(Debug, thiserror::Error)]
pub enum SmtpError {
	/// Failed to connect to the SMTP server.
	#[error("connection failed: {0}")]
	Connection(String),

	/// Failed to send an email message.
	#[error("send failed: {0}")]
	Send(String),

	/// Invalid configuration (missing required fields, invalid values).
	#[error("invalid configuration: {0}")]
	Config(String),

	/// Invalid email address format.
	#[error("invalid email address: {0}")]
	Address(String),
}

/// Configuration for the SMTP mailer.
///
/// `use_ssl` selects an implicit-TLS connection (port 465 style),
/// `use_tls` selects STARTTLS (port 587 style); with both false the
/// connection is plaintext. The password never appears in `Debug` output.
#[derive(Clone)]
pub struct SmtpConfig {
	/// SMTP server hostname (e.g., "smtp.example.com").
	pub host: String,

	/// SMTP server port. Common values: 25 (plaintext), 465 (TLS), 587 (STARTTLS).
	pub port: u16,

	/// Optional username for SMTP authentication.
	pub username: Option<String>,

	/// Optional password for SMTP authentication.
	pub password: Option<String>,

	/// Sender address for alert emails (e.g., "alerts@example.com").
	pub from_address: String,

	/// Use STARTTLS after connecting.
	pub use_tls: bool,

	/// Use an implicit-TLS connection. Takes precedence over `use_tls`.
	pub use_ssl: bool,

	/// Connection and command timeout.
	pub timeout: Duration,
}

impl fmt::Debug for SmtpConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SmtpConfig")
			.field("host", &self.host)
			.field("port", &self.port)
			.field("username", &self.username)
			.field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
			.field("from_address", &self.from_address)
			.field("use_tls", &self.use_tls)
			.field("use_ssl", &self.use_ssl)
			.field("timeout", &self.timeout)
			.finish()
	}
}

/// Injectable mail-sending capability.
///
/// The alert engine holds an `Option<Arc<dyn Mailer>>`; `None` means
/// alerting is disabled. Messages are plain text, one recipient each.
#[async_trait]
pub trait Mailer: Send + Sync {
	async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), SmtpError>;
}

/// Async SMTP mailer over [`lettre`].
///
/// The transport is built once; connections are made lazily per send.
pub struct SmtpMailer {
	transport: AsyncSmtpTransport<Tokio1Executor>,
	from_mailbox: Mailbox,
}

impl SmtpMailer {
	/// Build the SMTP transport from the given configuration.
	///
	/// Validates the sender address and the relay parameters; the actual
	/// connection is made lazily on the first send.
	#[tracing::instrument(
		name = "smtp_mailer_new",
		skip(config),
		fields(host = %config.host, port = %config.port, use_tls = %config.use_tls, use_ssl = %config.use_ssl)
	)]
	pub fn new(config: SmtpConfig) -> Result<Self, SmtpError> {
		let from_mailbox: Mailbox = config
			.from_address
			.parse()
			.map_err(|e| SmtpError::Address(format!("{e}")))?;

		let builder = if config.use_ssl {
			AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
				.map_err(|e| SmtpError::Connection(format!("{e}")))?
		} else if config.use_tls {
			AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
				.map_err(|e| SmtpError::Connection(format!("{e}")))?
		} else {
			AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
		};

		let mut builder = builder.port(config.port).timeout(Some(config.timeout));

		if let (Some(username), Some(password)) = (config.username, config.password) {
			builder = builder.credentials(Credentials::new(username, password));
		}

		let transport = builder.build();

		tracing::debug!("SMTP mailer initialized");

		Ok(Self {
			transport,
			from_mailbox,
		})
	}

	/// Check that the SMTP server is reachable and responding.
	#[tracing::instrument(name = "smtp_check_health", skip(self))]
	pub async fn check_health(&self) -> Result<(), SmtpError> {
		self.transport
			.test_connection()
			.await
			.map_err(|e| SmtpError::Connection(format!("{e}")))?;
		tracing::debug!("SMTP server is healthy");
		Ok(())
	}
}

#[async_trait]
impl Mailer for SmtpMailer {
	#[tracing::instrument(
		name = "smtp_send",
		skip(self, body),
		fields(to = %to, subject = %subject)
	)]
	async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), SmtpError> {
		let to_mailbox: Mailbox = to.parse().map_err(|e| SmtpError::Address(format!("{e}")))?;

		let message = Message::builder()
			.from(self.from_mailbox.clone())
			.to(to_mailbox)
			.subject(subject)
			.header(ContentType::TEXT_PLAIN)
			.body(body.to_string())
			.map_err(|e| SmtpError::Send(format!("failed to build message: {e}")))?;

		self.transport
			.send(message)
			.await
			.map_err(|e| SmtpError::Send(format!("{e}")))?;

		tracing::info!("alert email sent");

		Ok(())
	}
}

/// Validate an email address format.
///
/// Uses [`lettre`]'s [`Mailbox`] parser; this validates the format, not
/// whether the address actually exists.
pub fn is_valid_email(email: &str) -> bool {
	email.parse::<Mailbox>().is_ok()
}
