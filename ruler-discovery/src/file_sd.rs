//! C2: aggregates file-based service-discovery target-group updates into a
//! flat address slice.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::Deserialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub const ADDRESS_LABEL: &str = "__address__";

/// Default interval on which configured file-SD glob patterns are re-read.
pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(30);

/// One discovered target, carrying whatever labels the file-SD source
/// attached to it. Only `__address__` is consumed by this cache; the rest
/// exist to round-trip the upstream contract faithfully.
#[derive(Clone, Debug, Deserialize)]
pub struct Target {
	#[serde(flatten)]
	pub labels: BTreeMap<String, String>,
}

impl Target {
	pub fn address(&self) -> Option<&str> {
		self.labels.get(ADDRESS_LABEL).map(String::as_str)
	}
}

#[derive(Clone, Debug, Deserialize)]
pub struct TargetGroup {
	#[serde(default)]
	pub targets: Vec<Target>,
	#[serde(default)]
	pub labels: BTreeMap<String, String>,
}

pub struct FileSdCache {
	snapshot: ArcSwap<Vec<String>>,
	changed_tx: watch::Sender<()>,
	changed_rx: watch::Receiver<()>,
}

impl Default for FileSdCache {
	fn default() -> Self {
		Self::new()
	}
}

impl FileSdCache {
	pub fn new() -> Self {
		let (changed_tx, changed_rx) = watch::channel(());
		Self {
			snapshot: ArcSwap::from_pointee(Vec::new()),
			changed_tx,
			changed_rx,
		}
	}

	/// Consumes a target-group update message. A `None` message (the
	/// decoder's way of representing a malformed or empty file-SD payload)
	/// is ignored outright, leaving the previous view in place.
	pub fn update(&self, groups: Option<Vec<TargetGroup>>) {
		let Some(groups) = groups else { return };
		let mut out: Vec<String> = groups
			.iter()
			.flat_map(|g| g.targets.iter())
			.filter_map(Target::address)
			.map(str::to_string)
			.collect();
		out.sort();
		out.dedup();
		self.snapshot.store(Arc::new(out));
		// No active receivers is not an error; it just means no one is
		// watching for changes right now.
		let _ = self.changed_tx.send(());
	}

	pub fn addresses(&self) -> Arc<Vec<String>> {
		self.snapshot.load_full()
	}

	/// Returns a [`watch::Receiver`] that fires every time `update` replaces
	/// the address set, for callers that want to react to changes instead of
	/// polling `addresses()`.
	pub fn subscribe(&self) -> watch::Receiver<()> {
		self.changed_rx.clone()
	}
}

/// Globs `patterns`, parses every matched file as a list of target groups,
/// and feeds the flattened result into `cache` on a timer. A bad glob
/// pattern or an unparsable file is logged and skipped; other matched files
/// still make it into the update (mirrors the rule-file reload's
/// per-entry tolerance).
pub async fn run_watch_loop(cache: Arc<FileSdCache>, patterns: Vec<String>, interval: Duration, cancel: CancellationToken) {
	if patterns.is_empty() {
		return;
	}
	let mut ticker = tokio::time::interval(interval);
	loop {
		tokio::select! {
			biased;
			_ = cancel.cancelled() => return,
			_ = ticker.tick() => {
				cache.update(Some(scan(&patterns)));
			}
		}
	}
}

fn scan(patterns: &[String]) -> Vec<TargetGroup> {
	let mut files: Vec<PathBuf> = Vec::new();
	for pattern in patterns {
		match glob::glob(pattern) {
			Ok(paths) => {
				for entry in paths {
					match entry {
						Ok(path) => files.push(path),
						Err(e) => warn!(error = %e, pattern = %pattern, "failed to read file-sd glob match"),
					}
				}
			},
			Err(e) => warn!(error = %e, pattern = %pattern, "bad file-sd glob pattern, skipping"),
		}
	}

	let mut groups = Vec::new();
	for file in &files {
		match std::fs::read(file) {
			Ok(bytes) => match serde_yaml::from_slice::<Vec<RawTargetGroup>>(&bytes) {
				Ok(parsed) => groups.extend(parsed.into_iter().map(RawTargetGroup::into_target_group)),
				Err(e) => warn!(error = %e, file = %file.display(), "failed to parse file-sd target file"),
			},
			Err(e) => warn!(error = %e, file = %file.display(), "failed to read file-sd target file"),
		}
	}
	groups
}

/// On-disk file-SD shape: `targets` is a bare list of `host:port` strings,
/// not yet carrying the `__address__` label the in-memory [`TargetGroup`]
/// expects. This is the wire format Prometheus-family file-SD files use.
#[derive(Debug, Deserialize)]
struct RawTargetGroup {
	#[serde(default)]
	targets: Vec<String>,
	#[serde(default)]
	labels: BTreeMap<String, String>,
}

impl RawTargetGroup {
	fn into_target_group(self) -> TargetGroup {
		let targets = self
			.targets
			.into_iter()
			.map(|addr| {
				let mut labels = BTreeMap::new();
				labels.insert(ADDRESS_LABEL.to_string(), addr);
				Target { labels }
			})
			.collect();
		TargetGroup { targets, labels: self.labels }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn target(addr: &str) -> Target {
		let mut labels = BTreeMap::new();
		labels.insert(ADDRESS_LABEL.to_string(), addr.to_string());
		Target { labels }
	}

	#[test]
	fn flattens_groups_into_addresses() {
		let cache = FileSdCache::new();
		cache.update(Some(vec![
			TargetGroup {
				targets: vec![target("a:1"), target("b:2")],
				labels: BTreeMap::new(),
			},
			TargetGroup {
				targets: vec![target("b:2")],
				labels: BTreeMap::new(),
			},
		]));
		assert_eq!(
			cache.addresses().as_ref(),
			&vec!["a:1".to_string(), "b:2".to_string()]
		);
	}

	#[test]
	fn nil_message_is_ignored() {
		let cache = FileSdCache::new();
		cache.update(Some(vec![TargetGroup {
			targets: vec![target("a:1")],
			labels: BTreeMap::new(),
		}]));
		cache.update(None);
		assert_eq!(cache.addresses().as_ref(), &vec!["a:1".to_string()]);
	}

	#[tokio::test]
	async fn subscribers_are_notified_on_update() {
		let cache = FileSdCache::new();
		let mut rx = cache.subscribe();
		cache.update(Some(vec![TargetGroup {
			targets: vec![target("a:1")],
			labels: BTreeMap::new(),
		}]));
		rx.changed().await.unwrap();
	}

	#[test]
	fn scan_flattens_matched_files_and_skips_bad_ones() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(
			dir.path().join("a.yaml"),
			"- targets: [\"a:1\", \"b:2\"]\n  labels: {}\n",
		)
		.unwrap();
		std::fs::write(dir.path().join("b.yaml"), "not: [valid target groups\n").unwrap();

		let pattern = dir.path().join("*.yaml").to_string_lossy().to_string();
		let groups = scan(&[pattern]);
		let addresses: Vec<&str> = groups.iter().flat_map(|g| g.targets.iter()).filter_map(Target::address).collect();
		assert_eq!(addresses, vec!["a:1", "b:2"]);
	}

	#[tokio::test]
	async fn watch_loop_feeds_cache_on_each_tick() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join("targets.yaml"), "- targets: [\"a:1\"]\n  labels: {}\n").unwrap();

		let cache = Arc::new(FileSdCache::new());
		let pattern = dir.path().join("*.yaml").to_string_lossy().to_string();
		let cancel = CancellationToken::new();

		let mut rx = cache.subscribe();
		let task = tokio::spawn(run_watch_loop(cache.clone(), vec![pattern], Duration::from_millis(10), cancel.clone()));
		rx.changed().await.unwrap();
		assert_eq!(cache.addresses().as_ref(), &vec!["a:1".to_string()]);

		cancel.cancel();
		task.await.unwrap();
	}

	#[tokio::test]
	async fn watch_loop_is_a_noop_with_no_patterns() {
		let cache = Arc::new(FileSdCache::new());
		let cancel = CancellationToken::new();
		run_watch_loop(cache.clone(), vec![], Duration::from_millis(10), cancel).await;
		assert!(cache.addresses().is_empty());
	}
}
