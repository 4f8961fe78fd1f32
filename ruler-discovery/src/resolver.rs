//! C1: expands `dns+`/`dnssrv+` prefixed addresses into a concrete,
//! deduplicated `host:port` list, refreshed on a timer.
//!
//! Readers call [`Resolver::addresses`], which is lock-free: the resolved
//! list is published as a whole new `Arc` per round (copy-on-replace), so a
//! reader can never observe a partial resolution round, matching the
//! monotone-replacement guarantee in the data model.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::Error;
use crate::metrics::{Metrics, ResolutionError};
use crate::prefix::{QType, split_host_port, split_prefix};
use ruler_core::metrics::IncrementRecorder;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// A single parsed address entry, ready to resolve.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressEntry {
	pub qtype: QType,
	/// For `QType::None`, the literal address to pass through. For `QType::A`
	/// and `QType::Srv`, the hostname/service name to look up.
	pub host: String,
	/// Only set (and required) for `QType::A`.
	pub port: Option<u16>,
}

/// Parses one configured address string, applying `default_port` when the
/// entry is `dns+`-prefixed and lacks an explicit port. Passthrough
/// (unprefixed) and `dnssrv+` entries never need a default port: SRV records
/// carry their own port, and passthrough entries are never resolved.
pub fn parse_entry(raw: &str, default_port: Option<u16>) -> Result<AddressEntry, Error> {
	let (qtype, rest) = split_prefix(raw);
	match qtype {
		QType::None => Ok(AddressEntry {
			qtype,
			host: rest.to_string(),
			port: None,
		}),
		QType::Srv => Ok(AddressEntry {
			qtype,
			host: rest.to_string(),
			port: None,
		}),
		QType::A => {
			let (host, port) = split_host_port(rest);
			let port = port.or(default_port);
			let Some(port) = port else {
				return Err(Error::MissingPort(raw.to_string()));
			};
			Ok(AddressEntry {
				qtype,
				host,
				port: Some(port),
			})
		},
	}
}

pub struct Resolver {
	dns: TokioAsyncResolver,
	snapshot: ArcSwap<Vec<String>>,
	metrics: Metrics,
}

impl Resolver {
	pub fn new(metrics: Metrics) -> anyhow::Result<Self> {
		let dns = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());
		Ok(Self {
			dns,
			snapshot: ArcSwap::from_pointee(Vec::new()),
			metrics,
		})
	}

	/// Resolves a single already-parsed entry into zero or more `host:port`
	/// strings. A resolution failure is logged and metered but never
	/// returned as an error: one bad entry must not prevent others in the
	/// same round from being included.
	pub async fn resolve_hosts(&self, entry: &AddressEntry) -> Vec<String> {
		match entry.qtype {
			QType::None => vec![entry.host.clone()],
			QType::A => match self.dns.lookup_ip(entry.host.as_str()).await {
				Ok(lookup) => {
					let port = entry.port.expect("A entries always carry a port");
					lookup.iter().map(|ip| format!("{ip}:{port}")).collect()
				},
				Err(e) => {
					warn!(host = %entry.host, error = %e, "A lookup failed");
					self.metrics.increment(&ResolutionError { qtype: "A" });
					Vec::new()
				},
			},
			QType::Srv => match self.dns.srv_lookup(entry.host.as_str()).await {
				Ok(lookup) => lookup
					.iter()
					.map(|srv| {
						let target = srv.target().to_utf8();
						let target = target.trim_end_matches('.');
						format!("{target}:{}", srv.port())
					})
					.collect(),
				Err(e) => {
					warn!(host = %entry.host, error = %e, "SRV lookup failed");
					self.metrics.increment(&ResolutionError { qtype: "SRV" });
					Vec::new()
				},
			},
		}
	}

	/// Resolves every entry in `addrs`, applying `default_port` where
	/// relevant, and atomically publishes the deduplicated union. Blocks
	/// until the round completes or `cancel` is triggered.
	pub async fn resolve(
		&self,
		addrs: &[String],
		default_port: Option<u16>,
		cancel: &CancellationToken,
	) -> Result<(), Error> {
		let round = async {
			let mut out = Vec::new();
			for raw in addrs {
				let entry = match parse_entry(raw, default_port) {
					Ok(e) => e,
					Err(e) => {
						warn!(address = %raw, error = %e, "failed to parse address entry");
						self.metrics.increment(&ResolutionError { qtype: "parse" });
						continue;
					},
				};
				out.extend(self.resolve_hosts(&entry).await);
			}
			out.sort();
			out.dedup();
			debug!(count = out.len(), "published new address snapshot");
			self.snapshot.store(Arc::new(out));
		};
		tokio::select! {
			biased;
			_ = cancel.cancelled() => Err(Error::Cancelled),
			_ = round => Ok(()),
		}
	}

	/// Returns the most recently published snapshot. Never blocks on an
	/// in-flight resolution round.
	pub fn addresses(&self) -> Arc<Vec<String>> {
		self.snapshot.load_full()
	}

	/// Runs `resolve` on a fixed interval until `cancel` fires.
	pub async fn run(
		&self,
		addrs: Vec<String>,
		default_port: Option<u16>,
		interval: Duration,
		cancel: CancellationToken,
	) {
		let mut ticker = tokio::time::interval(interval);
		loop {
			tokio::select! {
				_ = ticker.tick() => {
					if let Err(e) = self.resolve(&addrs, default_port, &cancel).await {
						debug!(error = %e, "address resolver round stopped");
						return;
					}
				}
				_ = cancel.cancelled() => return,
			}
		}
	}
}
