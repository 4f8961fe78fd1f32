//! Block metadata, mirroring the handful of `meta.json` fields the shipper
//! and Store API actually need: external labels and the `RULER` source type
//! stamp, plus the time range used for retention and query pruning.

use ruler_core::Labels;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BlockMeta {
	pub ulid: String,
	pub min_time: i64,
	pub max_time: i64,
	pub external_labels: Labels,
	pub source: String,
}
