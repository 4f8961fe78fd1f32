pub mod group;
pub mod manager;
pub mod metrics;
pub mod state;
pub mod status;

pub use group::RuleGroup;
pub use manager::RuleManager;
pub use status::RuleGroupStatus;

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use ruler_core::PartialResponseStrategy;

use crate::error::Error;

/// The process-wide invariant: exactly two rule managers, one per
/// partial-response strategy, sharing every other dependency.
pub struct ManagerPair {
	pub abort: Arc<RuleManager>,
	pub warn: Arc<RuleManager>,
	pub file_patterns: Vec<String>,
}

impl ManagerPair {
	pub fn new(abort: Arc<RuleManager>, warn: Arc<RuleManager>, file_patterns: Vec<String>) -> Self {
		Self { abort, warn, file_patterns }
	}

	/// Globs `file_patterns`, parses every matched file, and replaces both
	/// managers' registries. A bad glob pattern is logged and skipped; a
	/// parse error in any matched file aborts the whole reload, leaving both
	/// managers untouched.
	pub fn reload(&self) -> Result<(), Error> {
		let mut files: Vec<PathBuf> = Vec::new();
		for pattern in &self.file_patterns {
			match glob::glob(pattern) {
				Ok(paths) => {
					for entry in paths {
						match entry {
							Ok(path) => files.push(path),
							Err(e) => warn!(error = %e, pattern = %pattern, "failed to read glob match"),
						}
					}
				},
				Err(e) => warn!(error = %e, pattern = %pattern, "bad rule-file glob pattern, skipping"),
			}
		}

		let mut groups = Vec::new();
		for file in &files {
			match group::parse_file(file) {
				Ok(parsed) => groups.extend(parsed),
				Err(e) => {
					self.abort.mark_reload_failed();
					self.warn.mark_reload_failed();
					return Err(e);
				},
			}
		}

		self.abort.reload(groups.clone());
		self.warn.reload(groups);
		Ok(())
	}

	pub fn status(&self) -> Vec<RuleGroupStatus> {
		let mut out = self.abort.status();
		out.extend(self.warn.status());
		out
	}

	pub async fn run(&self, cancel: CancellationToken) {
		tokio::join!(self.abort.run(cancel.clone()), self.warn.run(cancel));
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration as StdDuration;

	use prometheus_client::registry::Registry;
	use ruler_alert::AlertQueue;
	use ruler_core::Labels;
	use ruler_discovery::{FileSdCache, Resolver};

	use super::*;
	use crate::rules::metrics::Metrics as RuleMetrics;

	fn fresh_manager(strategy: PartialResponseStrategy) -> Arc<RuleManager> {
		let mut disc_registry = Registry::default();
		let resolver = Arc::new(Resolver::new(ruler_discovery::metrics::Metrics::new(&mut disc_registry)).unwrap());
		let file_sd = Arc::new(FileSdCache::new());
		let mut query_registry = Registry::default();
		let query_metrics = Arc::new(ruler_query::metrics::Metrics::new(&mut query_registry));
		let querier = Arc::new(ruler_query::Querier::new(
			reqwest::Client::new(),
			resolver,
			file_sd,
			strategy,
			query_metrics,
		));
		let dir = tempfile::tempdir().unwrap();
		let tsdb = Arc::new(
			ruler_store::Tsdb::open(
				dir.path().to_path_buf(),
				Labels::new(),
				StdDuration::from_secs(7200),
				StdDuration::from_secs(48 * 3600),
			)
			.unwrap(),
		);
		let mut alert_registry = Registry::default();
		let queue = Arc::new(AlertQueue::new(10, 10, ruler_alert::metrics::Metrics::new(&mut alert_registry)));
		let mut rule_registry = Registry::default();
		Arc::new(RuleManager::new(
			strategy,
			querier,
			tsdb,
			queue,
			vec![],
			"http://ruler/graph".to_string(),
			RuleMetrics::new(&mut rule_registry),
		))
	}

	#[test]
	fn reload_splits_groups_by_strategy_and_bad_glob_is_nonfatal() {
		let dir = tempfile::tempdir().unwrap();
		let abort_path = dir.path().join("abort.yaml");
		std::fs::write(
			&abort_path,
			r#"
groups:
  - name: a
    partial_response_strategy: ABORT
    rules:
      - record: r1
        expr: up
"#,
		)
		.unwrap();
		let warn_path = dir.path().join("warn.yaml");
		std::fs::write(
			&warn_path,
			r#"
groups:
  - name: w
    partial_response_strategy: WARN
    rules:
      - record: r2
        expr: up
"#,
		)
		.unwrap();

		let pair = ManagerPair::new(
			fresh_manager(PartialResponseStrategy::Abort),
			fresh_manager(PartialResponseStrategy::Warn),
			vec![dir.path().join("*.yaml").to_string_lossy().to_string(), "[".to_string()],
		);

		pair.reload().unwrap();
		assert_eq!(pair.abort.group_count(), 1);
		assert_eq!(pair.warn.group_count(), 1);
	}

	#[test]
	fn reload_aborts_whole_set_on_parse_error() {
		let dir = tempfile::tempdir().unwrap();
		let good_path = dir.path().join("good.yaml");
		std::fs::write(
			&good_path,
			r#"
groups:
  - name: a
    rules:
      - record: r1
        expr: up
"#,
		)
		.unwrap();

		let pair = ManagerPair::new(
			fresh_manager(PartialResponseStrategy::Abort),
			fresh_manager(PartialResponseStrategy::Warn),
			vec![dir.path().join("*.yaml").to_string_lossy().to_string()],
		);
		pair.reload().unwrap();
		assert_eq!(pair.abort.group_count(), 1);

		let bad_path = dir.path().join("bad.yaml");
		std::fs::write(&bad_path, "not: [valid, rule").unwrap();
		assert!(pair.reload().is_err());
		// Previous state untouched.
		assert_eq!(pair.abort.group_count(), 1);
	}
}
