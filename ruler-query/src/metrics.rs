use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;
use ruler_core::metrics::Recorder;

/// Creates a metrics sub registry for the remote query layer.
pub fn sub_registry(registry: &mut Registry) -> &mut Registry {
	registry.sub_registry_with_prefix("thanos_ruler_query")
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct DuplicateAddress {}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PartialResponseWarning {
	pub strategy: &'static str,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct AttemptFailure {}

pub struct Metrics {
	duplicate_addresses: Family<DuplicateAddress, Counter>,
	partial_response_warnings: Family<PartialResponseWarning, Counter>,
	attempt_failures: Family<AttemptFailure, Counter>,
}

impl Metrics {
	pub fn new(registry: &mut Registry) -> Self {
		let duplicate_addresses = Family::default();
		registry.register(
			"duplicate_query_addresses",
			"Number of duplicate query addresses observed while merging C1/C2 address sets",
			duplicate_addresses.clone(),
		);

		let partial_response_warnings = Family::default();
		registry.register(
			"partial_response_warnings_total",
			"Number of accepted partial responses under the warn strategy",
			partial_response_warnings.clone(),
		);

		let attempt_failures = Family::default();
		registry.register(
			"query_attempt_failures_total",
			"Number of failed per-address query attempts",
			attempt_failures.clone(),
		);

		Self {
			duplicate_addresses,
			partial_response_warnings,
			attempt_failures,
		}
	}
}

impl Recorder<DuplicateAddress, u64> for Metrics {
	fn record(&self, event: &DuplicateAddress, meta: u64) {
		self.duplicate_addresses.get_or_create(event).inc_by(meta);
	}
}

impl Recorder<PartialResponseWarning, u64> for Metrics {
	fn record(&self, event: &PartialResponseWarning, meta: u64) {
		self
			.partial_response_warnings
			.get_or_create(event)
			.inc_by(meta);
	}
}

impl Recorder<AttemptFailure, u64> for Metrics {
	fn record(&self, event: &AttemptFailure, meta: u64) {
		self.attempt_failures.get_or_create(event).inc_by(meta);
	}
}
