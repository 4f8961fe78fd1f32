//! Read-only snapshots of rule/alert state, consumed by the admin HTTP
//! surface's `/api/v1/rules` and `/api/v1/alerts` routes.

use std::collections::BTreeMap;

use ruler_core::Labels;
use serde::Serialize;

use super::state::AlertState;

#[derive(Debug, Clone, Serialize)]
pub struct AlertStatus {
	pub labels: Labels,
	pub annotations: BTreeMap<String, String>,
	pub state: &'static str,
	pub active_at: Option<chrono::DateTime<chrono::Utc>>,
	pub value: f64,
}

impl AlertStatus {
	pub(crate) fn from_active(labels: Labels, annotations: BTreeMap<String, String>, state: &AlertState, value: f64) -> Self {
		let (label, active_at) = match state {
			AlertState::Inactive => ("inactive", None),
			AlertState::Pending { active_at } => ("pending", Some(*active_at)),
			AlertState::Firing { active_at, .. } => ("firing", Some(*active_at)),
		};
		Self {
			labels,
			annotations,
			state: label,
			active_at,
			value,
		}
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleStatus {
	pub name: String,
	pub kind: &'static str,
	pub health: &'static str,
	pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleGroupStatus {
	pub file: String,
	pub name: String,
	pub interval_seconds: u64,
	pub strategy: &'static str,
	pub rules: Vec<RuleStatus>,
	pub alerts: Vec<AlertStatus>,
}
