use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use ruler_core::metrics::Recorder;

/// These three metric names are fixed by the upstream Prometheus rule-manager
/// and Thanos conventions and don't share a common prefix, so unlike the
/// other components they're registered directly on the root registry rather
/// than under a per-component sub-registry prefix.
pub fn sub_registry(registry: &mut Registry) -> &mut Registry {
	registry
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct EvalFailure {}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct EvalWarning {
	pub strategy: &'static str,
}

#[derive(Clone)]
pub struct Metrics {
	eval_failures: Family<EvalFailure, Counter>,
	eval_warnings: Family<EvalWarning, Counter>,
	pub reload_successful: Gauge,
}

impl Metrics {
	pub fn new(registry: &mut Registry) -> Self {
		let eval_failures = Family::default();
		registry.register(
			"prometheus_rule_evaluation_failures_total",
			"Number of rule evaluations that failed to reach any query peer",
			eval_failures.clone(),
		);

		let eval_warnings = Family::default();
		registry.register(
			"thanos_rule_evaluation_with_warnings_total",
			"Number of rule evaluations that accepted a partial response under the warn strategy",
			eval_warnings.clone(),
		);

		let reload_successful = Gauge::default();
		registry.register(
			"config_last_reload_successful",
			"Whether the last rule-file reload succeeded (1) or failed (0)",
			reload_successful.clone(),
		);

		Self {
			eval_failures,
			eval_warnings,
			reload_successful,
		}
	}
}

impl Recorder<EvalFailure, u64> for Metrics {
	fn record(&self, event: &EvalFailure, meta: u64) {
		self.eval_failures.get_or_create(event).inc_by(meta);
	}
}

impl Recorder<EvalWarning, u64> for Metrics {
	fn record(&self, event: &EvalWarning, meta: u64) {
		self.eval_warnings.get_or_create(event).inc_by(meta);
	}
}
