use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;
use ruler_core::metrics::Recorder;

/// Creates a metrics sub registry for the TSDB adapter and block shipper.
pub fn sub_registry(registry: &mut Registry) -> &mut Registry {
	registry.sub_registry_with_prefix("thanos_ruler_store")
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ShipSuccess {}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ShipFailure {}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct BlocksSealed {}

pub struct Metrics {
	shipped: Family<ShipSuccess, Counter>,
	ship_failures: Family<ShipFailure, Counter>,
	blocks_sealed: Family<BlocksSealed, Counter>,
}

impl Metrics {
	pub fn new(registry: &mut Registry) -> Self {
		let shipped = Family::default();
		registry.register(
			"blocks_shipped_total",
			"Number of TSDB blocks successfully uploaded to object storage",
			shipped.clone(),
		);

		let ship_failures = Family::default();
		registry.register(
			"block_ship_failures_total",
			"Number of failed block upload attempts",
			ship_failures.clone(),
		);

		let blocks_sealed = Family::default();
		registry.register(
			"blocks_sealed_total",
			"Number of TSDB head blocks sealed into immutable blocks",
			blocks_sealed.clone(),
		);

		Self {
			shipped,
			ship_failures,
			blocks_sealed,
		}
	}
}

impl Recorder<ShipSuccess, u64> for Metrics {
	fn record(&self, event: &ShipSuccess, meta: u64) {
		self.shipped.get_or_create(event).inc_by(meta);
	}
}

impl Recorder<ShipFailure, u64> for Metrics {
	fn record(&self, event: &ShipFailure, meta: u64) {
		self.ship_failures.get_or_create(event).inc_by(meta);
	}
}

impl Recorder<BlocksSealed, u64> for Metrics {
	fn record(&self, event: &BlocksSealed, meta: u64) {
		self.blocks_sealed.get_or_create(event).inc_by(meta);
	}
}
