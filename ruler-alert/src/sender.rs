//! C5: fans a batch of queued alerts out to every known Alertmanager
//! replica. Delivery counts as successful the moment any single replica
//! accepts the batch; the others are best-effort, matching Alertmanager's own
//! gossip-based dedup of the same notification arriving from multiple
//! Rulers/replicas.

use std::time::Duration;

use futures::future::join_all;
use tracing::warn;

use crate::alert::Alert;
use crate::metrics::{Dropped, EndpointFailure, Metrics, Sent};
use ruler_core::metrics::IncrementRecorder;
use ruler_discovery::AlertmanagerEndpoint;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Sender {
	client: reqwest::Client,
	timeout: Duration,
	metrics: Metrics,
}

impl Sender {
	pub fn new(client: reqwest::Client, timeout: Duration, metrics: Metrics) -> Self {
		Self {
			client,
			timeout,
			metrics,
		}
	}

	/// Sends `batch` to every endpoint in `endpoints`, concurrently. Returns
	/// `true` iff at least one endpoint accepted it. An empty endpoint list is
	/// always a drop: there is nowhere to deliver to.
	pub async fn send(&self, endpoints: &[AlertmanagerEndpoint], batch: &[Alert]) -> bool {
		if endpoints.is_empty() {
			warn!(count = batch.len(), "no alertmanager endpoints known, dropping batch");
			self.metrics.increment(&Dropped {});
			return false;
		}

		let attempts = endpoints
			.iter()
			.map(|endpoint| self.send_one(endpoint, batch));
		let results = join_all(attempts).await;
		let any_ok = results.into_iter().any(|ok| ok);

		if any_ok {
			self.metrics.record(&Sent {}, batch.len() as u64);
		} else {
			self.metrics.increment(&Dropped {});
		}
		any_ok
	}

	async fn send_one(&self, endpoint: &AlertmanagerEndpoint, batch: &[Alert]) -> bool {
		let url = endpoint.alerts_url();
		let request = self.client.post(&url).json(batch).timeout(self.timeout);
		match request.send().await {
			Ok(resp) if resp.status().is_success() => true,
			Ok(resp) => {
				warn!(url = %url, status = %resp.status(), "alertmanager rejected batch");
				self.metrics.increment(&EndpointFailure {
					alertmanager: endpoint.to_string(),
				});
				false
			},
			Err(e) => {
				warn!(url = %url, error = %e, "failed to reach alertmanager");
				self.metrics.increment(&EndpointFailure {
					alertmanager: endpoint.to_string(),
				});
				false
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;
	use ruler_core::Labels;
	use std::collections::BTreeMap;
	use wiremock::matchers::{method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	fn metrics() -> Metrics {
		Metrics::new(&mut prometheus_client::registry::Registry::default())
	}

	fn endpoint(base: &str) -> AlertmanagerEndpoint {
		let (scheme, authority) = base.split_once("://").unwrap();
		AlertmanagerEndpoint {
			scheme: scheme.to_string(),
			authority: authority.to_string(),
			path: String::new(),
			userinfo: None,
		}
	}

	fn sample_batch() -> Vec<Alert> {
		vec![Alert::new(
			Labels::from_pairs([("alertname", "HighLatency")]),
			BTreeMap::new(),
			Utc::now(),
			None,
			"http://ruler/graph".to_string(),
			&[],
		)]
	}

	#[tokio::test]
	async fn succeeds_when_one_endpoint_accepts() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/api/v1/alerts"))
			.respond_with(ResponseTemplate::new(200))
			.mount(&server)
			.await;

		let sender = Sender::new(reqwest::Client::new(), DEFAULT_TIMEOUT, metrics());
		let ok = sender
			.send(&[endpoint(&server.uri())], &sample_batch())
			.await;
		assert!(ok);
	}

	#[tokio::test]
	async fn drops_when_all_endpoints_fail() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/api/v1/alerts"))
			.respond_with(ResponseTemplate::new(500))
			.mount(&server)
			.await;

		let sender = Sender::new(reqwest::Client::new(), DEFAULT_TIMEOUT, metrics());
		let ok = sender
			.send(&[endpoint(&server.uri())], &sample_batch())
			.await;
		assert!(!ok);
	}

	#[tokio::test]
	async fn empty_endpoint_list_is_a_drop() {
		let sender = Sender::new(reqwest::Client::new(), DEFAULT_TIMEOUT, metrics());
		let ok = sender.send(&[], &sample_batch()).await;
		assert!(!ok);
	}
}
