//! Label sets shared by recording rules, alerting rules, and the Store API.
//!
//! A [`Labels`] value is kept sorted by name at all times, so equality is
//! exactly the "sequence equality after canonical sort by name" the data
//! model calls for, and no separate normalization step is ever needed before
//! comparing, hashing, or serializing one.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single (name, value) pair. Names must match the Prometheus label-name
/// grammar (`[a-zA-Z_][a-zA-Z0-9_]*`); values may be arbitrary UTF-8.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label {
	pub name: String,
	pub value: String,
}

impl Label {
	pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			value: value.into(),
		}
	}
}

/// Returns whether `name` matches the Prometheus label-name grammar.
pub fn is_valid_label_name(name: &str) -> bool {
	let mut chars = name.chars();
	match chars.next() {
		Some(c) if c.is_ascii_alphabetic() || c == '_' => {},
		_ => return false,
	}
	chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// An ordered, canonically-sorted label set. Two `Labels` are equal iff their
/// sorted (name, value) sequences are equal.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Labels(Vec<Label>);

impl Labels {
	pub fn new() -> Self {
		Self(Vec::new())
	}

	/// Builds a `Labels` from pairs, silently last-wins on duplicate names.
	pub fn from_pairs<I, S1, S2>(pairs: I) -> Self
	where
		I: IntoIterator<Item = (S1, S2)>,
		S1: Into<String>,
		S2: Into<String>,
	{
		let mut labels = Labels::new();
		for (k, v) in pairs {
			labels.set(k.into(), v.into());
		}
		labels
	}

	pub fn get(&self, name: &str) -> Option<&str> {
		self
			.0
			.binary_search_by(|l| l.name.as_str().cmp(name))
			.ok()
			.map(|i| self.0[i].value.as_str())
	}

	/// Inserts or overwrites the value for `name`, keeping the set sorted.
	pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
		let name = name.into();
		match self.0.binary_search_by(|l| l.name.cmp(&name)) {
			Ok(i) => self.0[i].value = value.into(),
			Err(i) => self.0.insert(i, Label::new(name, value.into())),
		}
	}

	pub fn remove(&mut self, name: &str) {
		if let Ok(i) = self.0.binary_search_by(|l| l.name.as_str().cmp(name)) {
			self.0.remove(i);
		}
	}

	pub fn iter(&self) -> impl Iterator<Item = &Label> {
		self.0.iter()
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Merges `self` with `overlay`, where `overlay` wins on name conflicts.
	/// This implements the "X is Y-dominant" merge rule used throughout the
	/// data model (extra labels over query labels, L_ext over everything).
	pub fn merged_over(&self, overlay: &Labels) -> Labels {
		let mut out = self.clone();
		for l in overlay.iter() {
			out.set(l.name.clone(), l.value.clone());
		}
		out
	}

	/// A stable fingerprint of the canonical label set, used to key alerting
	/// rule active-series state. Two label sets compare equal iff their
	/// fingerprints are equal (collisions aside) because `Labels` is always
	/// kept sorted.
	pub fn fingerprint(&self) -> u64 {
		use std::hash::{Hash, Hasher};
		let mut hasher = std::collections::hash_map::DefaultHasher::new();
		for l in &self.0 {
			l.name.hash(&mut hasher);
			0u8.hash(&mut hasher); // separator so ("ab","c") != ("a","bc")
			l.value.hash(&mut hasher);
			1u8.hash(&mut hasher);
		}
		hasher.finish()
	}
}

impl fmt::Display for Labels {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{{")?;
		for (i, l) in self.0.iter().enumerate() {
			if i > 0 {
				write!(f, ", ")?;
			}
			write!(f, "{}={:?}", l.name, l.value)?;
		}
		write!(f, "}}")
	}
}

impl FromIterator<Label> for Labels {
	fn from_iter<T: IntoIterator<Item = Label>>(iter: T) -> Self {
		let mut labels = Labels::new();
		for l in iter {
			labels.set(l.name, l.value);
		}
		labels
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sorts_and_dedupes() {
		let l = Labels::from_pairs([("b", "2"), ("a", "1"), ("a", "overwritten")]);
		let names: Vec<_> = l.iter().map(|l| l.name.as_str()).collect();
		assert_eq!(names, vec!["a", "b"]);
		assert_eq!(l.get("a"), Some("overwritten"));
	}

	#[test]
	fn merge_overlay_wins_conflicts() {
		let base = Labels::from_pairs([("job", "x"), ("instance", "i1")]);
		let overlay = Labels::from_pairs([("instance", "i2"), ("replica", "A")]);
		let merged = base.merged_over(&overlay);
		assert_eq!(merged.get("job"), Some("x"));
		assert_eq!(merged.get("instance"), Some("i2"));
		assert_eq!(merged.get("replica"), Some("A"));
	}

	#[test]
	fn equality_ignores_insertion_order() {
		let a = Labels::from_pairs([("a", "1"), ("b", "2")]);
		let b = Labels::from_pairs([("b", "2"), ("a", "1")]);
		assert_eq!(a, b);
		assert_eq!(a.fingerprint(), b.fingerprint());
	}

	#[test]
	fn label_name_grammar() {
		assert!(is_valid_label_name("job"));
		assert!(is_valid_label_name("_private9"));
		assert!(!is_valid_label_name("9job"));
		assert!(!is_valid_label_name("job-name"));
		assert!(!is_valid_label_name(""));
	}
}
