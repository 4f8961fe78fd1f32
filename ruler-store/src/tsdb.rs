//! C8: the local TSDB adapter.
//!
//! The spec calls out that WAL durability and multi-level compaction are out
//! of scope here; rule evaluation only ever needs a fixed-cadence,
//! snapshot-consistent append/seal/select surface, so [`TsdbHandle`] is kept
//! as a narrow trait with one in-memory reference implementation rather than
//! embedding a full storage engine. A real deployment would back this trait
//! with `prometheus-tsdb`'s block format; nothing above this trait needs to
//! know that.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use tracing::debug;
use ulid::Ulid;

use ruler_core::Labels;

use crate::block::BlockMeta;
use crate::error::Error;

pub const DEFAULT_BLOCK_DURATION: Duration = Duration::from_secs(2 * 3600);
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(48 * 3600);

#[derive(Clone, Debug, PartialEq)]
pub struct Matcher {
	pub name: String,
	pub value: String,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SeriesData {
	pub labels: Labels,
	pub samples: Vec<(i64, f64)>,
}

/// A sealed, immutable block ready to be picked up by the shipper.
#[derive(Clone, Debug)]
pub struct SealedBlock {
	pub ulid: Ulid,
	pub dir: PathBuf,
	pub meta: BlockMeta,
}

struct Head {
	series: BTreeMap<u64, SeriesData>,
	min_time: i64,
	max_time: i64,
}

impl Head {
	fn new() -> Self {
		Self {
			series: BTreeMap::new(),
			min_time: i64::MAX,
			max_time: i64::MIN,
		}
	}

	fn is_empty(&self) -> bool {
		self.series.is_empty()
	}
}

/// An in-flight set of appends. Nothing is visible to readers until
/// [`Appender::commit`] is called; [`Appender::abort`] discards the buffer
/// entirely. This matches "the adapter commits or aborts atomically per rule
/// evaluation."
pub struct Appender<'a> {
	tsdb: &'a Tsdb,
	buffer: Vec<(Labels, i64, f64)>,
	closed: bool,
}

impl<'a> Appender<'a> {
	pub fn append(&mut self, labels: Labels, timestamp_ms: i64, value: f64) {
		self.buffer.push((labels, timestamp_ms, value));
	}

	pub fn commit(mut self) -> Result<(), Error> {
		if self.closed {
			return Err(Error::AppenderClosed);
		}
		self.closed = true;
		let mut head = self.tsdb.head.lock().unwrap();
		for (labels, ts, value) in self.buffer.drain(..) {
			head.min_time = head.min_time.min(ts);
			head.max_time = head.max_time.max(ts);
			let fp = labels.fingerprint();
			head
				.series
				.entry(fp)
				.or_insert_with(|| SeriesData {
					labels,
					samples: Vec::new(),
				})
				.samples
				.push((ts, value));
		}
		Ok(())
	}

	pub fn abort(mut self) {
		self.closed = true;
		self.buffer.clear();
	}
}

impl Drop for Appender<'_> {
	fn drop(&mut self) {
		// An appender dropped without an explicit commit/abort aborts: a
		// panicking evaluation must never leave partial data visible.
		self.buffer.clear();
	}
}

pub struct Tsdb {
	data_dir: PathBuf,
	external_labels: Labels,
	block_duration: Duration,
	retention: Duration,
	head: Mutex<Head>,
	sealed: Mutex<Vec<SealedBlock>>,
}

impl Tsdb {
	pub fn open(
		data_dir: impl Into<PathBuf>,
		external_labels: Labels,
		block_duration: Duration,
		retention: Duration,
	) -> Result<Self, Error> {
		let data_dir = data_dir.into();
		std::fs::create_dir_all(&data_dir)?;
		let sealed = Self::scan_sealed(&data_dir)?;
		Ok(Self {
			data_dir,
			external_labels,
			block_duration,
			retention,
			head: Mutex::new(Head::new()),
			sealed: Mutex::new(sealed),
		})
	}

	fn scan_sealed(data_dir: &Path) -> Result<Vec<SealedBlock>, Error> {
		let mut out = Vec::new();
		for entry in std::fs::read_dir(data_dir)? {
			let entry = entry?;
			if !entry.file_type()?.is_dir() {
				continue;
			}
			let Ok(ulid) = entry.file_name().to_string_lossy().parse::<Ulid>() else {
				continue;
			};
			let meta_path = entry.path().join("meta.json");
			if !meta_path.exists() {
				continue;
			}
			let meta: BlockMeta = serde_json::from_slice(&std::fs::read(&meta_path)?)?;
			out.push(SealedBlock {
				ulid,
				dir: entry.path(),
				meta,
			});
		}
		Ok(out)
	}

	pub fn appender(&self) -> Appender<'_> {
		Appender {
			tsdb: self,
			buffer: Vec::new(),
			closed: false,
		}
	}

	pub fn external_labels(&self) -> &Labels {
		&self.external_labels
	}

	pub fn min_time(&self) -> i64 {
		let head = self.head.lock().unwrap();
		let head_min = if head.is_empty() { i64::MAX } else { head.min_time };
		let sealed = self.sealed.lock().unwrap();
		sealed
			.iter()
			.map(|b| b.meta.min_time)
			.chain(std::iter::once(head_min))
			.min()
			.unwrap_or(0)
			.max(0)
	}

	pub fn max_time(&self) -> i64 {
		let head = self.head.lock().unwrap();
		let head_max = if head.is_empty() { i64::MIN } else { head.max_time };
		let sealed = self.sealed.lock().unwrap();
		sealed
			.iter()
			.map(|b| b.meta.max_time)
			.chain(std::iter::once(head_max))
			.max()
			.unwrap_or(0)
			.max(0)
	}

	/// Reads are snapshot-consistent: both the head and the sealed block list
	/// are cloned under their respective locks before any filtering happens,
	/// so a concurrent seal can't produce a half-sealed view.
	pub fn select(&self, matchers: &[Matcher], min_time: i64, max_time: i64) -> Vec<SeriesData> {
		let head_series: Vec<SeriesData> = self.head.lock().unwrap().series.values().cloned().collect();
		let sealed: Vec<SealedBlock> = self.sealed.lock().unwrap().clone();

		let mut out = Vec::new();
		for series in head_series.into_iter().chain(sealed.iter().flat_map(|b| b.read_series())) {
			if !matchers.iter().all(|m| series.labels.get(&m.name) == Some(m.value.as_str())) {
				continue;
			}
			let samples: Vec<_> = series
				.samples
				.iter()
				.copied()
				.filter(|(ts, _)| *ts >= min_time && *ts <= max_time)
				.collect();
			if !samples.is_empty() {
				out.push(SeriesData {
					labels: series.labels.merged_over(&self.external_labels),
					samples,
				});
			}
		}
		out
	}

	pub fn label_names(&self, min_time: i64, max_time: i64) -> Vec<String> {
		let mut names: Vec<String> = self
			.select(&[], min_time, max_time)
			.iter()
			.flat_map(|s| s.labels.iter().map(|l| l.name.clone()))
			.collect();
		names.sort();
		names.dedup();
		names
	}

	pub fn label_values(&self, label: &str, min_time: i64, max_time: i64) -> Vec<String> {
		let mut values: Vec<String> = self
			.select(&[], min_time, max_time)
			.iter()
			.filter_map(|s| s.labels.get(label).map(str::to_string))
			.collect();
		values.sort();
		values.dedup();
		values
	}

	/// Seals the current head into an immutable block directory if it spans
	/// at least one full `block_duration`, writing `meta.json` with
	/// `external_labels` and `source=RULER`. A fresh, empty head is always
	/// left behind; `MinBlockDuration = MaxBlockDuration` here means a block
	/// is cut on a fixed cadence, never by internal compaction.
	pub fn seal_if_due(&self, now_ms: i64) -> Result<Option<SealedBlock>, Error> {
		let mut head = self.head.lock().unwrap();
		if head.is_empty() {
			return Ok(None);
		}
		let span = now_ms - head.min_time;
		if span < self.block_duration.as_millis() as i64 {
			return Ok(None);
		}

		let ulid = Ulid::new();
		let dir = self.data_dir.join(ulid.to_string());
		std::fs::create_dir_all(&dir)?;
		let series: Vec<SeriesData> = head.series.values().cloned().collect();
		std::fs::write(dir.join("series.json"), serde_json::to_vec(&series)?)?;

		let meta = BlockMeta {
			ulid: ulid.to_string(),
			min_time: head.min_time,
			max_time: head.max_time,
			external_labels: self.external_labels.clone(),
			source: "RULER".to_string(),
		};
		std::fs::write(dir.join("meta.json"), serde_json::to_vec_pretty(&meta)?)?;

		debug!(ulid = %ulid, series = series.len(), "sealed block");
		let sealed = SealedBlock { ulid, dir, meta };
		self.sealed.lock().unwrap().push(sealed.clone());
		*head = Head::new();
		Ok(Some(sealed))
	}

	/// Drops sealed blocks whose max time is older than `retention`, relative
	/// to `now_ms`. Mirrors `RetentionDuration`; this adapter doesn't run its
	/// own compaction, so retention is the only thing that ever deletes data.
	pub fn apply_retention(&self, now_ms: i64) -> Result<(), Error> {
		let cutoff = now_ms - self.retention.as_millis() as i64;
		let mut sealed = self.sealed.lock().unwrap();
		let mut keep = Vec::with_capacity(sealed.len());
		for block in sealed.drain(..) {
			if block.meta.max_time < cutoff {
				let _ = std::fs::remove_dir_all(&block.dir);
			} else {
				keep.push(block);
			}
		}
		*sealed = keep;
		Ok(())
	}

	pub fn sealed_blocks(&self) -> Vec<SealedBlock> {
		self.sealed.lock().unwrap().clone()
	}
}

impl SealedBlock {
	fn read_series(&self) -> Vec<SeriesData> {
		match std::fs::read(self.dir.join("series.json")) {
			Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
			Err(_) => Vec::new(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn tsdb(dir: &Path) -> Tsdb {
		Tsdb::open(
			dir,
			Labels::from_pairs([("replica", "A")]),
			Duration::from_secs(7200),
			DEFAULT_RETENTION,
		)
		.unwrap()
	}

	#[test]
	fn committed_samples_are_visible_to_select() {
		let dir = tempfile::tempdir().unwrap();
		let tsdb = tsdb(dir.path());
		let mut app = tsdb.appender();
		app.append(Labels::from_pairs([("__name__", "up")]), 1000, 1.0);
		app.commit().unwrap();

		let got = tsdb.select(&[], 0, 2000);
		assert_eq!(got.len(), 1);
		assert_eq!(got[0].labels.get("replica"), Some("A"));
		assert_eq!(got[0].samples, vec![(1000, 1.0)]);
	}

	#[test]
	fn aborted_samples_are_never_visible() {
		let dir = tempfile::tempdir().unwrap();
		let tsdb = tsdb(dir.path());
		let mut app = tsdb.appender();
		app.append(Labels::from_pairs([("__name__", "up")]), 1000, 1.0);
		app.abort();

		assert!(tsdb.select(&[], 0, 2000).is_empty());
	}

	#[test]
	fn dropped_appender_without_commit_aborts() {
		let dir = tempfile::tempdir().unwrap();
		let tsdb = tsdb(dir.path());
		{
			let mut app = tsdb.appender();
			app.append(Labels::from_pairs([("__name__", "up")]), 1000, 1.0);
		}
		assert!(tsdb.select(&[], 0, 2000).is_empty());
	}

	#[test]
	fn seal_cuts_a_block_once_duration_elapses() {
		let dir = tempfile::tempdir().unwrap();
		let tsdb = Tsdb::open(
			dir.path(),
			Labels::new(),
			Duration::from_secs(100),
			DEFAULT_RETENTION,
		)
		.unwrap();
		let mut app = tsdb.appender();
		app.append(Labels::from_pairs([("__name__", "up")]), 0, 1.0);
		app.commit().unwrap();

		assert!(tsdb.seal_if_due(50_000).unwrap().is_none());
		let sealed = tsdb.seal_if_due(150_000).unwrap().unwrap();
		assert_eq!(sealed.meta.source, "RULER");
		assert!(tsdb.select(&[], 0, 1).len() == 1);
	}

	#[test]
	fn retention_drops_old_sealed_blocks() {
		let dir = tempfile::tempdir().unwrap();
		let tsdb = Tsdb::open(
			dir.path(),
			Labels::new(),
			Duration::from_secs(100),
			Duration::from_secs(1),
		)
		.unwrap();
		let mut app = tsdb.appender();
		app.append(Labels::from_pairs([("__name__", "up")]), 0, 1.0);
		app.commit().unwrap();
		tsdb.seal_if_due(200_000).unwrap();
		assert_eq!(tsdb.sealed_blocks().len(), 1);

		tsdb.apply_retention(2_000_000).unwrap();
		assert_eq!(tsdb.sealed_blocks().len(), 0);
	}
}
