//! Wire shapes for the query server's instant-query HTTP API and the decoded
//! sample vector handed back to rule evaluation.

use ruler_core::Labels;
use serde::Deserialize;

#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
	pub labels: Labels,
	pub timestamp: f64,
	pub value: f64,
}

pub type Vector = Vec<Sample>;

/// Result of a single successful [`crate::Querier::eval`] call: the decoded
/// vector plus whether the server-side response carried warnings that this
/// call's WARN strategy chose to accept rather than reject.
#[derive(Clone, Debug, PartialEq)]
pub struct EvalOutcome {
	pub vector: Vector,
	pub partial_response: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QueryResponse {
	pub status: String,
	#[serde(default)]
	pub data: Option<QueryData>,
	#[serde(default)]
	pub warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QueryData {
	#[serde(rename = "resultType")]
	pub result_type: String,
	pub result: Vec<RawSample>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawSample {
	pub metric: std::collections::BTreeMap<String, String>,
	pub value: (f64, ValueString),
}

/// Prometheus-style query results encode the sample value as a string inside
/// the `[timestamp, "value"]` tuple, so a plain `f64` deserialize impl won't
/// do.
#[derive(Debug)]
pub(crate) struct ValueString(pub f64);

impl<'de> Deserialize<'de> for ValueString {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		s.parse::<f64>()
			.map(ValueString)
			.map_err(serde::de::Error::custom)
	}
}

impl QueryData {
	pub(crate) fn into_vector(self) -> Vector {
		self
			.result
			.into_iter()
			.map(|raw| Sample {
				labels: raw.metric.into_iter().map(|(k, v)| ruler_core::Label::new(k, v)).collect(),
				timestamp: raw.value.0,
				value: raw.value.1.0,
			})
			.collect()
	}
}
