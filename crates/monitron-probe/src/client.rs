// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use reqwest::{Client, Method};
use std::time::{Duration, Instant};

/// Probe failures. Timeouts and transport errors are classified separately
/// for logging but are treated identically by the executor: both record a
/// `down` check with the stringified error.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
	#[error("invalid http method: {0}")]
	InvalidMethod(String),

	#[error("request timed out: {0}")]
	Timeout(String),

	#[error("{0}")]
	Transport(String),

	#[error("failed to build http client: {0}")]
	Build(String),
}

/// An HTTP response observed by a probe, regardless of status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResponse {
	pub status: u16,
	pub elapsed: Duration,
}

/// Single-probe capability the check executor depends on.
#[async_trait]
pub trait Prober: Send + Sync {
	async fn probe(
		&self,
		method: &str,
		url: &str,
		timeout: Duration,
	) -> Result<ProbeResponse, ProbeError>;
}

/// HTTP probe client over a shared [`reqwest::Client`].
///
/// The client is built once with the configured `User-Agent` and reused for
/// every probe; the deadline is applied per request.
pub struct ProbeClient {
	client: Client,
}

impl ProbeClient {
	pub fn new(user_agent: &str) -> Result<Self, ProbeError> {
		let client = Client::builder()
			.user_agent(user_agent)
			.build()
			.map_err(|e| ProbeError::Build(e.to_string()))?;
		Ok(Self { client })
	}
}

#[async_trait]
impl Prober for ProbeClient {
	#[tracing::instrument(name = "http_probe", skip(self), fields(method = %method, url = %url))]
	async fn probe(
		&self,
		method: &str,
		url: &str,
		timeout: Duration,
	) -> Result<ProbeResponse, ProbeError> {
		let method = Method::from_bytes(method.as_bytes())
			.map_err(|_| ProbeError::InvalidMethod(method.to_string()))?;

		let started = Instant::now();
		let response = self
			.client
			.request(method, url)
			.timeout(timeout)
			.send()
			.await
			.map_err(|e| {
				if e.is_timeout() {
					ProbeError::Timeout(e.to_string())
				} else {
					ProbeError::Transport(e.to_string())
				}
			})?;

		Ok(ProbeResponse {
			status: response.status().as_u16(),
			elapsed: started.elapsed(),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn builds_with_custom_user_agent() {
		assert!(ProbeClient::new("MonitronWorker/0.1").is_ok());
	}

	#[tokio::test]
	async fn rejects_invalid_method() {
		let client = ProbeClient::new("MonitronWorker/0.1").unwrap();
		let err = client
			.probe("G ET", "http://localhost/", Duration::from_secs(1))
			.await
			.unwrap_err();
		assert!(matches!(err, ProbeError::InvalidMethod(_)));
	}

	#[tokio::test]
	async fn accepts_extension_methods() {
		let client = ProbeClient::new("MonitronWorker/0.1").unwrap();
		// An unroutable URL: the method parse must succeed and the failure
		// must surface as a transport error, not InvalidMethod.
		let err = client
			.probe("PURGE", "http://127.0.0.1:1/", Duration::from_secs(1))
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			ProbeError::Transport(_) | ProbeError::Timeout(_)
		));
	}

	#[tokio::test]
	async fn connection_refused_is_a_transport_error() {
		let client = ProbeClient::new("MonitronWorker/0.1").unwrap();
		let err = client
			.probe("GET", "http://127.0.0.1:1/", Duration::from_secs(2))
			.await
			.unwrap_err();
		let message = err.to_string();
		assert!(!message.is_empty());
	}
}
