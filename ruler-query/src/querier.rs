//! C6: a single PromQL instant-query RPC, retried across a randomized
//! permutation of the currently known query-peer addresses.

use std::sync::Arc;

use rand::seq::SliceRandom;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use ruler_core::PartialResponseStrategy;
use ruler_core::metrics::IncrementRecorder;
use ruler_discovery::{FileSdCache, Resolver};

use crate::error::Error;
use crate::metrics::{AttemptFailure, DuplicateAddress, Metrics, PartialResponseWarning};
use crate::vector::{EvalOutcome, QueryResponse, Vector};

pub struct Querier {
	client: reqwest::Client,
	resolver: Arc<Resolver>,
	file_sd: Arc<FileSdCache>,
	strategy: PartialResponseStrategy,
	metrics: Arc<Metrics>,
}

impl Querier {
	pub fn new(
		client: reqwest::Client,
		resolver: Arc<Resolver>,
		file_sd: Arc<FileSdCache>,
		strategy: PartialResponseStrategy,
		metrics: Arc<Metrics>,
	) -> Self {
		Self {
			client,
			resolver,
			file_sd,
			strategy,
			metrics,
		}
	}

	/// Unions C1's resolved addresses with C2's file-SD targets, deduplicated.
	fn addresses(&self) -> Vec<String> {
		let mut out: Vec<String> = self.resolver.addresses().as_ref().clone();
		let before = out.len();
		for addr in self.file_sd.addresses().iter() {
			if !out.contains(addr) {
				out.push(addr.clone());
			} else {
				self.metrics.increment(&DuplicateAddress {});
			}
		}
		debug!(
			resolver = before,
			file_sd = self.file_sd.addresses().len(),
			total = out.len(),
			"query address set"
		);
		out
	}

	/// Evaluates `expr` at `eval_time` (unix seconds), trying addresses in a
	/// random order until one succeeds or all fail.
	pub async fn eval(
		&self,
		expr: &str,
		eval_time: f64,
		cancel: &CancellationToken,
	) -> Result<EvalOutcome, Error> {
		let mut addrs = self.addresses();
		if addrs.is_empty() {
			return Err(Error::NoPeerReachable);
		}
		addrs.shuffle(&mut rand::rng());

		for addr in &addrs {
			if cancel.is_cancelled() {
				return Err(Error::Cancelled);
			}
			let attempt = self.attempt(addr, expr, eval_time);
			let outcome = tokio::select! {
				biased;
				_ = cancel.cancelled() => return Err(Error::Cancelled),
				result = attempt => result,
			};
			match outcome {
				Ok(outcome) => return Ok(outcome),
				Err(e) => {
					warn!(address = %addr, error = %e, "query attempt failed, trying next peer");
					self.metrics.increment(&AttemptFailure {});
					continue;
				},
			}
		}
		Err(Error::NoPeerReachable)
	}

	async fn attempt(&self, addr: &str, expr: &str, eval_time: f64) -> Result<EvalOutcome, Error> {
		let url = format!("http://{addr}/api/v1/query");
		let resp = self
			.client
			.post(&url)
			.form(&[
				("query", expr.to_string()),
				("time", eval_time.to_string()),
				("dedup", "true".to_string()),
				("partial_response_strategy", self.strategy.as_wire_str().to_string()),
			])
			.send()
			.await
			.map_err(|_| Error::NoPeerReachable)?;

		if !resp.status().is_success() {
			return Err(Error::NoPeerReachable);
		}
		let decoded: QueryResponse = resp.json().await.map_err(|_| Error::NoPeerReachable)?;
		if decoded.status != "success" {
			return Err(Error::NoPeerReachable);
		}

		// ABORT-strategy partial responses are the query server's concern: a
		// server honoring the strategy turns them into a query error before
		// they ever reach us as a 2xx envelope. We only annotate WARN here.
		let partial_response = !decoded.warnings.is_empty() && self.strategy == PartialResponseStrategy::Warn;
		if partial_response {
			warn!(address = %addr, warnings = ?decoded.warnings, "accepted partial response");
			self.metrics.increment(&PartialResponseWarning {
				strategy: self.strategy.as_str(),
			});
		}

		Ok(EvalOutcome {
			vector: decoded.data.map(|d| d.into_vector()).unwrap_or_default(),
			partial_response,
		})
	}
}
