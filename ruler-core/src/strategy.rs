use serde::Deserialize;

/// How a rule group wants the query layer to treat partial results from a
/// query server that could only reach some of its store nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartialResponseStrategy {
	/// Any partial response is treated as a hard failure for the call.
	Abort,
	/// Partial responses are accepted; a warning is logged and counted.
	Warn,
}

impl Default for PartialResponseStrategy {
	fn default() -> Self {
		Self::Abort
	}
}

impl PartialResponseStrategy {
	/// Lowercase form used as a metric label value.
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Abort => "abort",
			Self::Warn => "warn",
		}
	}

	/// Uppercase form used as the `partial_response_strategy` wire value on
	/// outgoing instant-query requests, matching the rule-group YAML token.
	pub fn as_wire_str(&self) -> &'static str {
		match self {
			Self::Abort => "ABORT",
			Self::Warn => "WARN",
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn wire_form_is_uppercase() {
		assert_eq!(PartialResponseStrategy::Abort.as_wire_str(), "ABORT");
		assert_eq!(PartialResponseStrategy::Warn.as_wire_str(), "WARN");
	}

	#[test]
	fn label_form_is_lowercase() {
		assert_eq!(PartialResponseStrategy::Abort.as_str(), "abort");
		assert_eq!(PartialResponseStrategy::Warn.as_str(), "warn");
	}
}
