use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;
use ruler_core::metrics::Recorder;

/// Creates a metrics sub registry for the alert notification layer. The
/// prefix matches the literal `thanos_alert_sender_alerts_dropped_total`
/// metric name rather than the crate's own `thanos_ruler_alert` naming.
pub fn sub_registry(registry: &mut Registry) -> &mut Registry {
	registry.sub_registry_with_prefix("thanos_alert_sender")
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct EndpointFailure {
	pub alertmanager: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct Sent {}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct Dropped {}

#[derive(Clone)]
pub struct Metrics {
	sent: Family<Sent, Counter>,
	dropped: Family<Dropped, Counter>,
	queue_dropped: Family<Dropped, Counter>,
	endpoint_failures: Family<EndpointFailure, Counter>,
}

impl Metrics {
	pub fn new(registry: &mut Registry) -> Self {
		let sent = Family::default();
		registry.register(
			"alerts_sent_total",
			"Number of alert notifications successfully sent to at least one alertmanager",
			sent.clone(),
		);

		let dropped = Family::default();
		registry.register(
			"alerts_dropped_total",
			"Number of alert notifications dropped because no alertmanager accepted them",
			dropped.clone(),
		);

		let queue_dropped = Family::default();
		registry.register(
			"alerts_queue_dropped_total",
			"Number of queued alert notifications evicted because the queue was full",
			queue_dropped.clone(),
		);

		let endpoint_failures = Family::default();
		registry.register(
			"alertmanager_errors_total",
			"Number of failed delivery attempts, by alertmanager replica",
			endpoint_failures.clone(),
		);

		Self {
			sent,
			dropped,
			queue_dropped,
			endpoint_failures,
		}
	}
}

impl Recorder<Sent, u64> for Metrics {
	fn record(&self, event: &Sent, meta: u64) {
		self.sent.get_or_create(event).inc_by(meta);
	}
}

impl Recorder<Dropped, u64> for Metrics {
	fn record(&self, event: &Dropped, meta: u64) {
		self.dropped.get_or_create(event).inc_by(meta);
	}
}

pub struct QueueDrop;

impl Recorder<QueueDrop, u64> for Metrics {
	fn record(&self, _event: &QueueDrop, meta: u64) {
		self.queue_dropped.get_or_create(&Dropped {}).inc_by(meta);
	}
}

impl Recorder<EndpointFailure, u64> for Metrics {
	fn record(&self, event: &EndpointFailure, meta: u64) {
		self.endpoint_failures.get_or_create(event).inc_by(meta);
	}
}
