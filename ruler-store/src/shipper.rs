//! C9: ships sealed blocks to object storage on a timer, tracking what's
//! already been uploaded in a local shipped-index so a restart never
//! re-uploads a block that already made it to the bucket.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use ulid::Ulid;

use ruler_core::metrics::IncrementRecorder;

use crate::error::Error;
use crate::metrics::{Metrics, ShipFailure, ShipSuccess};
use crate::storage::ObjectStorage;
use crate::tsdb::Tsdb;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Default, serde::Serialize, serde::Deserialize)]
struct ShippedIndex {
	uploaded: BTreeSet<String>,
}

pub struct Shipper {
	tsdb: Arc<Tsdb>,
	storage: Arc<dyn ObjectStorage>,
	bucket_prefix: String,
	index_path: PathBuf,
	metrics: Metrics,
}

impl Shipper {
	pub fn new(
		tsdb: Arc<Tsdb>,
		storage: Arc<dyn ObjectStorage>,
		bucket_prefix: String,
		index_path: PathBuf,
		metrics: Metrics,
	) -> Self {
		Self {
			tsdb,
			storage,
			bucket_prefix,
			index_path,
			metrics,
		}
	}

	fn load_index(&self) -> ShippedIndex {
		std::fs::read(&self.index_path)
			.ok()
			.and_then(|bytes| serde_json::from_slice(&bytes).ok())
			.unwrap_or_default()
	}

	fn save_index(&self, index: &ShippedIndex) -> Result<(), Error> {
		std::fs::write(&self.index_path, serde_json::to_vec(index)?)?;
		Ok(())
	}

	/// One shipping pass: every sealed block not yet in the local shipped
	/// index is uploaded. A failed upload is logged and metered but left for
	/// the next tick; uploads for other blocks in the same pass still
	/// proceed.
	pub async fn run_once(&self) -> Result<(), Error> {
		let mut index = self.load_index();
		for block in self.tsdb.sealed_blocks() {
			let ulid = block.ulid.to_string();
			if index.uploaded.contains(&ulid) {
				continue;
			}
			match self.upload_block(&ulid, &block.dir).await {
				Ok(()) => {
					index.uploaded.insert(ulid.clone());
					self.metrics.increment(&ShipSuccess {});
					debug!(ulid = %ulid, "shipped block");
				},
				Err(e) => {
					warn!(ulid = %ulid, error = %e, "failed to ship block, retrying next tick");
					self.metrics.increment(&ShipFailure {});
				},
			}
		}
		self.save_index(&index)
	}

	async fn upload_block(&self, ulid: &str, dir: &std::path::Path) -> Result<(), Error> {
		for entry in std::fs::read_dir(dir)? {
			let entry = entry?;
			if !entry.file_type()?.is_file() {
				continue;
			}
			let name = entry.file_name().to_string_lossy().into_owned();
			let data = std::fs::read(entry.path())?;
			let key = format!("{}/{ulid}/{name}", self.bucket_prefix.trim_end_matches('/'));
			self
				.storage
				.upload(&key, data)
				.await
				.map_err(Error::Storage)?;
		}
		Ok(())
	}

	/// Re-uploading an already-shipped ULID must be a pure no-op; the shipper
	/// never deletes or re-checks bucket state for entries already recorded
	/// locally, so idempotence here is purely a property of `ShippedIndex`.
	pub fn already_shipped(&self, ulid: &Ulid) -> bool {
		self.load_index().uploaded.contains(&ulid.to_string())
	}

	pub async fn run(&self, interval: Duration, cancel: CancellationToken) {
		let mut ticker = tokio::time::interval(interval);
		loop {
			tokio::select! {
				_ = ticker.tick() => {
					if let Err(e) = self.run_once().await {
						warn!(error = %e, "shipping pass failed");
					}
				}
				_ = cancel.cancelled() => {
					debug!("block shipper stopping");
					return;
				}
			}
		}
	}
}
