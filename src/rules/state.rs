//! The alerting-rule state machine: Inactive → Pending → Firing, gated by
//! the rule's `for:` duration, and collapsing back to Inactive after two
//! consecutive misses (matching the Prometheus-family "forgive one missed
//! evaluation" resolution semantics).

use chrono::{DateTime, Utc};
use ruler_core::Labels;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq)]
pub enum AlertState {
	Inactive,
	Pending { active_at: DateTime<Utc> },
	Firing { active_at: DateTime<Utc>, fired_at: DateTime<Utc> },
}

#[derive(Clone, Debug)]
pub struct ActiveAlert {
	pub labels: Labels,
	pub annotations: BTreeMap<String, String>,
	pub state: AlertState,
	pub value: f64,
	/// Consecutive evaluations in which this series was absent from the
	/// result vector. Reset to 0 whenever the series reappears.
	misses: u8,
}

impl ActiveAlert {
	pub fn new_pending(labels: Labels, annotations: BTreeMap<String, String>, value: f64, now: DateTime<Utc>) -> Self {
		Self {
			labels,
			annotations,
			value,
			state: AlertState::Pending { active_at: now },
			misses: 0,
		}
	}

	/// Advances this series' state given it's still present in the latest
	/// result vector. Transitions Pending → Firing once `for` has elapsed
	/// since `active_at`; `for: 0s` fires on the very next evaluation.
	pub fn observe_present(&mut self, value: f64, annotations: BTreeMap<String, String>, for_duration: Duration, now: DateTime<Utc>) {
		self.value = value;
		self.annotations = annotations;
		self.misses = 0;
		self.state = match self.state {
			AlertState::Inactive => AlertState::Pending { active_at: now },
			AlertState::Pending { active_at } => {
				if now.signed_duration_since(active_at).to_std().unwrap_or_default() >= for_duration {
					AlertState::Firing { active_at, fired_at: now }
				} else {
					AlertState::Pending { active_at }
				}
			},
			AlertState::Firing { active_at, fired_at } => AlertState::Firing { active_at, fired_at },
		};
	}

	/// Advances this series' state given it was absent from the latest
	/// result vector. The first miss is forgiven (handles a single
	/// transient query failure without flapping); the second miss
	/// transitions to Inactive.
	pub fn observe_absent(&mut self) -> bool {
		self.misses += 1;
		if self.misses >= 2 {
			self.state = AlertState::Inactive;
			true
		} else {
			false
		}
	}

	pub fn is_firing(&self) -> bool {
		matches!(self.state, AlertState::Firing { .. })
	}

	pub fn is_pending(&self) -> bool {
		matches!(self.state, AlertState::Pending { .. })
	}
}
