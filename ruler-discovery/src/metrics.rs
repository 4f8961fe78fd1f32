use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;
use ruler_core::metrics::Recorder;

/// Creates a metrics sub registry for the address discovery layer.
pub fn sub_registry(registry: &mut Registry) -> &mut Registry {
	registry.sub_registry_with_prefix("thanos_ruler_discovery")
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ResolutionError {
	pub qtype: &'static str,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct DuplicateAddress {}

pub struct Metrics {
	resolution_errors: Family<ResolutionError, Counter>,
	duplicate_addresses: Family<DuplicateAddress, Counter>,
}

impl Metrics {
	pub fn new(registry: &mut Registry) -> Self {
		let resolution_errors = Family::default();
		registry.register(
			"address_resolution_errors",
			"Number of failed DNS resolutions for a configured address entry",
			resolution_errors.clone(),
		);

		let duplicate_addresses = Family::default();
		registry.register(
			"duplicate_addresses",
			"Number of duplicate addresses observed while merging resolved address sets",
			duplicate_addresses.clone(),
		);

		Self {
			resolution_errors,
			duplicate_addresses,
		}
	}
}

impl Recorder<ResolutionError, u64> for Metrics {
	fn record(&self, event: &ResolutionError, meta: u64) {
		self
			.resolution_errors
			.get_or_create(event)
			.inc_by(meta);
	}
}

impl Recorder<DuplicateAddress, u64> for Metrics {
	fn record(&self, event: &DuplicateAddress, meta: u64) {
		self.duplicate_addresses.get_or_create(event).inc_by(meta);
	}
}
