//! The alert notification value type (A in the data model). Pure value
//! type: no I/O state, safe to clone and queue freely.

use chrono::{DateTime, Utc};
use ruler_core::Labels;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Alert {
	pub labels: Labels,
	pub annotations: BTreeMap<String, String>,
	#[serde(rename = "startsAt")]
	pub starts_at: DateTime<Utc>,
	#[serde(rename = "endsAt", skip_serializing_if = "Option::is_none")]
	pub ends_at: Option<DateTime<Utc>>,
	#[serde(rename = "generatorURL")]
	pub generator_url: String,
}

impl Alert {
	/// Builds a notification from a firing alerting-rule series, dropping any
	/// label named in `drop_labels` before it ever reaches the queue.
	pub fn new(
		mut labels: Labels,
		annotations: BTreeMap<String, String>,
		starts_at: DateTime<Utc>,
		ends_at: Option<DateTime<Utc>>,
		generator_url: String,
		drop_labels: &[String],
	) -> Self {
		for name in drop_labels {
			labels.remove(name);
		}
		Self {
			labels,
			annotations,
			starts_at,
			ends_at,
			generator_url,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn drops_configured_labels() {
		let labels = Labels::from_pairs([("alertname", "A"), ("severity", "p1")]);
		let alert = Alert::new(
			labels,
			BTreeMap::new(),
			Utc::now(),
			None,
			"http://ruler".to_string(),
			&["severity".to_string()],
		);
		assert_eq!(alert.labels.get("severity"), None);
		assert_eq!(alert.labels.get("alertname"), Some("A"));
	}
}
