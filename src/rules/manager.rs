//! C7: one rule manager, bound to a single partial-response strategy. The
//! process runs exactly two of these — see [`crate::rules::ManagerPair`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use ruler_alert::AlertQueue;
use ruler_core::PartialResponseStrategy;
use ruler_core::metrics::IncrementRecorder;
use ruler_query::Querier;
use ruler_store::Tsdb;

use super::group::{Rule, RuleGroup};
use super::metrics::{EvalFailure, EvalWarning, Metrics};
use super::state::ActiveAlert;
use super::status::{AlertStatus, RuleGroupStatus, RuleStatus};
use crate::error::Error;

struct LoadedGroup {
	def: RuleGroup,
	active_alerts: HashMap<u64, ActiveAlert>,
	next_eval: Instant,
	last_error: Option<String>,
}

pub struct RuleManager {
	strategy: PartialResponseStrategy,
	groups: Mutex<Vec<LoadedGroup>>,
	querier: Arc<Querier>,
	tsdb: Arc<Tsdb>,
	queue: Arc<AlertQueue>,
	alert_label_drop: Vec<String>,
	generator_url: String,
	metrics: Metrics,
}

impl RuleManager {
	pub fn new(
		strategy: PartialResponseStrategy,
		querier: Arc<Querier>,
		tsdb: Arc<Tsdb>,
		queue: Arc<AlertQueue>,
		alert_label_drop: Vec<String>,
		generator_url: String,
		metrics: Metrics,
	) -> Self {
		Self {
			strategy,
			groups: Mutex::new(Vec::new()),
			querier,
			tsdb,
			queue,
			alert_label_drop,
			generator_url,
			metrics,
		}
	}

	/// Replaces the live group registry for groups owned by this manager's
	/// strategy. `bad_files` is ignored (glob-level failures are handled by
	/// the caller) — this only ever sees well-formed candidate groups. A
	/// parse error anywhere aborts the whole reload: current state is
	/// untouched and the reload-successful gauge is cleared.
	pub fn reload(&self, new_groups: Vec<RuleGroup>) {
		let owned: Vec<RuleGroup> = new_groups
			.into_iter()
			.filter(|g| g.strategy == self.strategy)
			.collect();

		let mut current = self.groups.lock().unwrap();
		let mut by_key: HashMap<(PathBuf, String), LoadedGroup> = current
			.drain(..)
			.map(|g| (g.def.key(), g))
			.collect();

		let mut replaced = Vec::with_capacity(owned.len());
		for def in owned {
			let key = def.key();
			if let Some(mut existing) = by_key.remove(&key) {
				existing.def = def;
				replaced.push(existing);
			} else {
				replaced.push(LoadedGroup {
					def,
					active_alerts: HashMap::new(),
					next_eval: Instant::now(),
					last_error: None,
				});
			}
		}
		// Anything left in `by_key` existed before but is gone now; its
		// alerts are implicitly transitioned to Inactive by simply not being
		// carried forward. No resolved notification is sent for them.
		*current = replaced;
		self.metrics.reload_successful.set(1);
	}

	pub fn group_count(&self) -> usize {
		self.groups.lock().unwrap().len()
	}

	/// Marks the last reload as failed without touching the live group
	/// registry: "on any parse error, the reload leaves current state
	/// untouched."
	pub fn mark_reload_failed(&self) {
		self.metrics.reload_successful.set(0);
	}

	/// Runs the per-group evaluation scheduler until `cancel` fires. Groups
	/// tick independently at their own `interval`; a coarse 200ms sweep is
	/// enough granularity for the intervals this system deals in (seconds to
	/// hours) without spawning a task per group.
	pub async fn run(&self, cancel: CancellationToken) {
		let mut ticker = tokio::time::interval(Duration::from_millis(200));
		loop {
			tokio::select! {
				_ = ticker.tick() => self.eval_due_groups(&cancel).await,
				_ = cancel.cancelled() => {
					debug!(strategy = ?self.strategy, "rule manager stopping");
					return;
				}
			}
		}
	}

	async fn eval_due_groups(&self, cancel: &CancellationToken) {
		let due: Vec<usize> = {
			let groups = self.groups.lock().unwrap();
			groups
				.iter()
				.enumerate()
				.filter(|(_, g)| Instant::now() >= g.next_eval)
				.map(|(i, _)| i)
				.collect()
		};
		for idx in due {
			self.eval_group_at(idx, cancel).await;
		}
	}

	async fn eval_group_at(&self, idx: usize, cancel: &CancellationToken) {
		// Pull out the group definition under the lock, evaluate without
		// holding it (network I/O must never block a reload), then write the
		// updated state back by key — the index may have shifted if a reload
		// raced in between.
		let (key, def, mut active_alerts) = {
			let mut groups = self.groups.lock().unwrap();
			let Some(g) = groups.get_mut(idx) else { return };
			g.next_eval = Instant::now() + g.def.interval;
			(g.def.key(), g.def.clone(), std::mem::take(&mut g.active_alerts))
		};

		let now = Utc::now();
		let eval_time = now.timestamp() as f64;
		let mut appender = self.tsdb.appender();
		let mut fired_this_round: Vec<u64> = Vec::new();
		let mut touched_by_alert: HashMap<String, Vec<u64>> = HashMap::new();
		let mut last_error = None;

		for rule in &def.rules {
			match rule {
				Rule::Recording { record, expr, labels } => {
					match self.querier.eval(expr, eval_time, cancel).await {
						Ok(outcome) => {
							if outcome.partial_response {
								self.metrics.increment(&EvalWarning {
									strategy: self.strategy.as_str(),
								});
							}
							for sample in outcome.vector {
								let mut base = sample.labels.clone();
								base.set("__name__", record.clone());
								let out = base.merged_over(labels).merged_over(self.tsdb.external_labels());
								appender.append(out, (sample.timestamp * 1000.0) as i64, sample.value);
							}
						},
						Err(e) => {
							self.note_eval_failure(&mut last_error, &e);
						},
					}
				},
				Rule::Alerting {
					alert,
					expr,
					r#for,
					labels,
					annotations,
				} => {
					let touched = touched_by_alert.entry(alert.clone()).or_default();
					match self.querier.eval(expr, eval_time, cancel).await {
						Ok(outcome) => {
							if outcome.partial_response {
								self.metrics.increment(&EvalWarning {
									strategy: self.strategy.as_str(),
								});
							}
							for sample in outcome.vector {
								let mut base = sample.labels.clone();
								base.set("alertname", alert.clone());
								let out_labels = base.merged_over(labels).merged_over(self.tsdb.external_labels());
								let fp = out_labels.fingerprint();
								touched.push(fp);
								let entry = active_alerts.entry(fp).or_insert_with(|| {
									ActiveAlert::new_pending(out_labels.clone(), annotations.clone(), sample.value, now)
								});
								entry.observe_present(sample.value, annotations.clone(), *r#for, now);
								if entry.is_firing() {
									fired_this_round.push(fp);
								}
							}
						},
						Err(e) => {
							self.note_eval_failure(&mut last_error, &e);
						},
					}
				},
			}
		}

		if let Err(e) = appender.commit() {
			warn!(error = %e, "failed to commit recording rule samples");
		}

		// Any previously active series for an alerting rule that wasn't
		// touched this round was absent from the result vector. A series that
		// goes Inactive while it was Firing must tell Alertmanager it resolved.
		let mut to_remove = Vec::new();
		let mut resolved: Vec<ActiveAlert> = Vec::new();
		for (alert_name, touched_fps) in &touched_by_alert {
			let touched_set: std::collections::HashSet<_> = touched_fps.iter().copied().collect();
			for (fp, active) in active_alerts.iter_mut() {
				if active.labels.get("alertname") != Some(alert_name.as_str()) || touched_set.contains(fp) {
					continue;
				}
				let firing_snapshot = active.is_firing().then(|| active.clone());
				if active.observe_absent() {
					to_remove.push(*fp);
					if let Some(snapshot) = firing_snapshot {
						resolved.push(snapshot);
					}
				}
			}
		}
		for fp in to_remove {
			active_alerts.remove(&fp);
		}

		let mut notify = Vec::with_capacity(fired_this_round.len() + resolved.len());
		for fp in fired_this_round {
			if let Some(active) = active_alerts.get(&fp) {
				notify.push(ruler_alert::Alert::new(
					active.labels.clone(),
					active.annotations.clone(),
					match active.state {
						super::state::AlertState::Firing { active_at, .. } => active_at,
						_ => now,
					},
					None,
					self.generator_url.clone(),
					&self.alert_label_drop,
				));
			}
		}
		for active in resolved {
			let starts_at = match active.state {
				super::state::AlertState::Firing { active_at, .. } => active_at,
				_ => now,
			};
			notify.push(ruler_alert::Alert::new(
				active.labels.clone(),
				active.annotations.clone(),
				starts_at,
				Some(now),
				self.generator_url.clone(),
				&self.alert_label_drop,
			));
		}
		if !notify.is_empty() {
			self.queue.push(notify);
		}

		let mut groups = self.groups.lock().unwrap();
		if let Some(g) = groups.iter_mut().find(|g| g.def.key() == key) {
			g.active_alerts = active_alerts;
			g.last_error = last_error.clone();
		}
		drop(groups);

		if last_error.is_some() {
			self.metrics.increment(&EvalFailure {});
		}
	}

	fn note_eval_failure(&self, last_error: &mut Option<String>, e: &ruler_query::Error) {
		warn!(error = %e, strategy = ?self.strategy, "rule evaluation failed");
		*last_error = Some(e.to_string());
	}

	pub fn status(&self) -> Vec<RuleGroupStatus> {
		let groups = self.groups.lock().unwrap();
		groups
			.iter()
			.map(|g| RuleGroupStatus {
				file: g.def.file.display().to_string(),
				name: g.def.name.clone(),
				interval_seconds: g.def.interval.as_secs(),
				strategy: g.def.strategy.as_str(),
				rules: g
					.def
					.rules
					.iter()
					.map(|r| match r {
						Rule::Recording { record, .. } => RuleStatus {
							name: record.clone(),
							kind: "recording",
							health: if g.last_error.is_some() { "err" } else { "ok" },
							last_error: g.last_error.clone(),
						},
						Rule::Alerting { alert, .. } => RuleStatus {
							name: alert.clone(),
							kind: "alerting",
							health: if g.last_error.is_some() { "err" } else { "ok" },
							last_error: g.last_error.clone(),
						},
					})
					.collect(),
				alerts: g
					.active_alerts
					.values()
					.map(|a| AlertStatus::from_active(a.labels.clone(), a.annotations.clone(), &a.state, a.value))
					.collect(),
			})
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration as StdDuration;

	use prometheus_client::registry::Registry;
	use ruler_alert::AlertQueue;
	use ruler_core::Labels;
	use ruler_discovery::{FileSdCache, Resolver};
	use serde_json::json;
	use wiremock::matchers::{method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	use super::*;

	async fn querier_against(server: &MockServer) -> Arc<Querier> {
		let mut disc_registry = Registry::default();
		let resolver = Arc::new(Resolver::new(ruler_discovery::metrics::Metrics::new(&mut disc_registry)).unwrap());
		let cancel = CancellationToken::new();
		resolver
			.resolve(&[server.address().to_string()], None, &cancel)
			.await
			.unwrap();
		let file_sd = Arc::new(FileSdCache::new());
		let mut query_registry = Registry::default();
		let query_metrics = Arc::new(ruler_query::metrics::Metrics::new(&mut query_registry));
		Arc::new(Querier::new(
			reqwest::Client::new(),
			resolver,
			file_sd,
			PartialResponseStrategy::Abort,
			query_metrics,
		))
	}

	fn manager(querier: Arc<Querier>, tsdb: Arc<Tsdb>, queue: Arc<AlertQueue>, drop_labels: Vec<String>) -> RuleManager {
		let mut registry = Registry::default();
		RuleManager::new(
			PartialResponseStrategy::Abort,
			querier,
			tsdb,
			queue,
			drop_labels,
			"http://ruler/graph".to_string(),
			Metrics::new(&mut registry),
		)
	}

	fn fresh_tsdb(external: Labels) -> Arc<Tsdb> {
		let dir = tempfile::tempdir().unwrap();
		Arc::new(
			Tsdb::open(
				dir.path().to_path_buf(),
				external,
				StdDuration::from_secs(7200),
				StdDuration::from_secs(48 * 3600),
			)
			.unwrap(),
		)
	}

	fn fresh_queue() -> Arc<AlertQueue> {
		let mut registry = Registry::default();
		Arc::new(AlertQueue::new(10, 10, ruler_alert::metrics::Metrics::new(&mut registry)))
	}

	#[tokio::test]
	async fn recording_rule_appends_l_ext_dominant_series() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/api/v1/query"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"status": "success",
				"data": {
					"resultType": "vector",
					"result": [{"metric": {"job": "x", "instance": "i1"}, "value": [100.0, "2"]}]
				}
			})))
			.mount(&server)
			.await;

		let querier = querier_against(&server).await;
		let tsdb = fresh_tsdb(Labels::from_pairs([("replica", "A")]));
		let queue = fresh_queue();
		let mgr = manager(querier, tsdb.clone(), queue, vec![]);

		mgr.reload(vec![RuleGroup {
			file: PathBuf::from("rules.yaml"),
			name: "g".to_string(),
			interval: StdDuration::from_secs(30),
			strategy: PartialResponseStrategy::Abort,
			rules: vec![Rule::Recording {
				record: "job:up:sum".to_string(),
				expr: "sum(up) by (job)".to_string(),
				labels: Labels::new(),
			}],
		}]);
		mgr.eval_group_at(0, &CancellationToken::new()).await;

		let series = tsdb.select(&[], 0, 200_000);
		assert_eq!(series.len(), 1);
		let s = &series[0];
		assert_eq!(s.labels.get("__name__"), Some("job:up:sum"));
		assert_eq!(s.labels.get("job"), Some("x"));
		assert_eq!(s.labels.get("instance"), Some("i1"));
		assert_eq!(s.labels.get("replica"), Some("A"));
		assert_eq!(s.samples, vec![(100_000, 2.0)]);
	}

	#[tokio::test]
	async fn alerting_rule_with_zero_for_fires_and_notifies_once() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/api/v1/query"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"status": "success",
				"data": {
					"resultType": "vector",
					"result": [{"metric": {}, "value": [0.0, "1"]}]
				}
			})))
			.mount(&server)
			.await;

		let querier = querier_against(&server).await;
		let tsdb = fresh_tsdb(Labels::new());
		let queue = fresh_queue();
		let mgr = manager(querier, tsdb, queue.clone(), vec!["severity".to_string()]);

		mgr.reload(vec![RuleGroup {
			file: PathBuf::from("rules.yaml"),
			name: "g".to_string(),
			interval: StdDuration::from_secs(30),
			strategy: PartialResponseStrategy::Abort,
			rules: vec![Rule::Alerting {
				alert: "A".to_string(),
				expr: "up == 0".to_string(),
				r#for: StdDuration::ZERO,
				labels: Labels::from_pairs([("severity", "p1")]),
				annotations: Default::default(),
			}],
		}]);
		mgr.eval_group_at(0, &CancellationToken::new()).await;

		let status = mgr.status();
		assert_eq!(status[0].alerts.len(), 1);
		assert_eq!(status[0].alerts[0].state, "firing");

		let popped = queue.pop(&CancellationToken::new()).await;
		assert_eq!(popped.len(), 1);
		assert_eq!(popped[0].labels.get("severity"), None);
		assert_eq!(popped[0].labels.get("alertname"), Some("A"));
	}

	#[tokio::test]
	async fn firing_alert_resolves_after_two_consecutive_misses() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/api/v1/query"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"status": "success",
				"data": {
					"resultType": "vector",
					"result": [{"metric": {}, "value": [0.0, "1"]}]
				}
			})))
			.mount(&server)
			.await;

		let querier = querier_against(&server).await;
		let tsdb = fresh_tsdb(Labels::new());
		let queue = fresh_queue();
		let mgr = manager(querier, tsdb, queue.clone(), vec![]);

		mgr.reload(vec![RuleGroup {
			file: PathBuf::from("rules.yaml"),
			name: "g".to_string(),
			interval: StdDuration::from_secs(30),
			strategy: PartialResponseStrategy::Abort,
			rules: vec![Rule::Alerting {
				alert: "A".to_string(),
				expr: "up == 0".to_string(),
				r#for: StdDuration::ZERO,
				labels: Labels::new(),
				annotations: Default::default(),
			}],
		}]);
		mgr.eval_group_at(0, &CancellationToken::new()).await;
		let fired = queue.pop(&CancellationToken::new()).await;
		assert_eq!(fired.len(), 1);
		assert!(fired[0].ends_at.is_none());

		server.reset().await;
		Mock::given(method("POST"))
			.and(path("/api/v1/query"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"status": "success",
				"data": {"resultType": "vector", "result": []}
			})))
			.mount(&server)
			.await;

		mgr.eval_group_at(0, &CancellationToken::new()).await;
		assert_eq!(mgr.status()[0].alerts.len(), 1, "first miss is forgiven");

		mgr.eval_group_at(0, &CancellationToken::new()).await;
		assert_eq!(mgr.status()[0].alerts.len(), 0, "second miss resolves the alert");

		let resolved = queue.pop(&CancellationToken::new()).await;
		assert_eq!(resolved.len(), 1);
		assert_eq!(resolved[0].labels.get("alertname"), Some("A"));
		assert!(resolved[0].ends_at.is_some());
	}

	#[test]
	fn reload_with_parse_error_path_does_not_touch_registry() {
		let mut registry = Registry::default();
		let disc_metrics = ruler_discovery::metrics::Metrics::new(&mut registry);
		let resolver = Arc::new(Resolver::new(disc_metrics).unwrap());
		let file_sd = Arc::new(FileSdCache::new());
		let mut query_registry = Registry::default();
		let query_metrics = Arc::new(ruler_query::metrics::Metrics::new(&mut query_registry));
		let querier = Arc::new(Querier::new(
			reqwest::Client::new(),
			resolver,
			file_sd,
			PartialResponseStrategy::Abort,
			query_metrics,
		));
		let tsdb = fresh_tsdb(Labels::new());
		let queue = fresh_queue();
		let mgr = manager(querier, tsdb, queue, vec![]);

		mgr.reload(vec![RuleGroup {
			file: PathBuf::from("rules.yaml"),
			name: "g".to_string(),
			interval: StdDuration::from_secs(30),
			strategy: PartialResponseStrategy::Abort,
			rules: vec![],
		}]);
		assert_eq!(mgr.group_count(), 1);

		mgr.mark_reload_failed();
		assert_eq!(mgr.group_count(), 1);
	}
}
