//! The rule-file parser boundary: a minimal serde-based reader for the
//! Prometheus/Thanos rule-group YAML shape, sufficient to drive reload and
//! evaluation. Not a PromQL-aware linter: `expr` is kept as an opaque string
//! and handed to the query function verbatim.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ruler_core::{Labels, PartialResponseStrategy};
use serde::Deserialize;

use crate::error::Error;

#[derive(Debug, Clone, Deserialize)]
struct RawFile {
	groups: Vec<RawGroup>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawGroup {
	name: String,
	#[serde(default)]
	interval: Option<String>,
	#[serde(default)]
	partial_response_strategy: Option<String>,
	rules: Vec<RawRule>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawRule {
	#[serde(default)]
	record: Option<String>,
	#[serde(default)]
	alert: Option<String>,
	expr: String,
	#[serde(default)]
	r#for: Option<String>,
	#[serde(default)]
	labels: BTreeMap<String, String>,
	#[serde(default)]
	annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
	Recording {
		record: String,
		expr: String,
		labels: Labels,
	},
	Alerting {
		alert: String,
		expr: String,
		r#for: Duration,
		labels: Labels,
		annotations: BTreeMap<String, String>,
	},
}

#[derive(Debug, Clone)]
pub struct RuleGroup {
	pub file: PathBuf,
	pub name: String,
	pub interval: Duration,
	pub strategy: PartialResponseStrategy,
	pub rules: Vec<Rule>,
}

impl RuleGroup {
	/// The identity a reload preserves alert state across: same file, same
	/// group name.
	pub fn key(&self) -> (PathBuf, String) {
		(self.file.clone(), self.name.clone())
	}
}

pub const DEFAULT_GROUP_INTERVAL: Duration = Duration::from_secs(30);

fn parse_duration(s: &str) -> Result<Duration, Error> {
	let s = s.trim();
	let (num, unit) = s.split_at(s.len() - s.chars().last().map(|c| c.len_utf8()).unwrap_or(1));
	let n: u64 = num
		.parse()
		.map_err(|_| Error::Config(format!("invalid duration {s:?}")))?;
	match unit {
		"s" => Ok(Duration::from_secs(n)),
		"m" => Ok(Duration::from_secs(n * 60)),
		"h" => Ok(Duration::from_secs(n * 3600)),
		_ => Err(Error::Config(format!("invalid duration unit in {s:?}"))),
	}
}

fn parse_strategy(s: &str) -> Result<PartialResponseStrategy, Error> {
	match s.to_ascii_uppercase().as_str() {
		"ABORT" => Ok(PartialResponseStrategy::Abort),
		"WARN" => Ok(PartialResponseStrategy::Warn),
		_ => Err(Error::Config(format!("invalid partial_response_strategy {s:?}"))),
	}
}

/// Parses one rule file into its groups. A malformed file is a single
/// `Error::Config`; the caller (reload) is responsible for leaving the live
/// registry untouched on error.
pub fn parse_file(path: &Path) -> Result<Vec<RuleGroup>, Error> {
	let bytes = std::fs::read(path)?;
	let raw: RawFile = serde_yaml::from_slice(&bytes)
		.map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;

	let mut groups = Vec::with_capacity(raw.groups.len());
	for g in raw.groups {
		let interval = match g.interval {
			Some(s) => parse_duration(&s)?,
			None => DEFAULT_GROUP_INTERVAL,
		};
		let strategy = match g.partial_response_strategy {
			Some(s) => parse_strategy(&s)?,
			None => PartialResponseStrategy::default(),
		};
		let mut rules = Vec::with_capacity(g.rules.len());
		for r in g.rules {
			rules.push(to_rule(r)?);
		}
		groups.push(RuleGroup {
			file: path.to_path_buf(),
			name: g.name,
			interval,
			strategy,
			rules,
		});
	}
	Ok(groups)
}

fn to_rule(raw: RawRule) -> Result<Rule, Error> {
	match (raw.record, raw.alert) {
		(Some(record), None) => Ok(Rule::Recording {
			record,
			expr: raw.expr,
			labels: Labels::from_pairs(raw.labels),
		}),
		(None, Some(alert)) => Ok(Rule::Alerting {
			alert,
			expr: raw.expr,
			r#for: match raw.r#for {
				Some(s) => parse_duration(&s)?,
				None => Duration::ZERO,
			},
			labels: Labels::from_pairs(raw.labels),
			annotations: raw.annotations,
		}),
		(Some(_), Some(_)) => Err(Error::Config("rule has both record and alert".to_string())),
		(None, None) => Err(Error::Config("rule has neither record nor alert".to_string())),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_mixed_group() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("rules.yaml");
		std::fs::write(
			&path,
			r#"
groups:
  - name: example
    interval: 30s
    partial_response_strategy: WARN
    rules:
      - record: job:up:sum
        expr: sum(up) by (job)
        labels: { tier: "1" }
      - alert: HighErrorRate
        expr: rate(errors[5m]) > 0.1
        for: 5m
        labels: { severity: page }
        annotations: { summary: "error rate high" }
"#,
		)
		.unwrap();

		let groups = parse_file(&path).unwrap();
		assert_eq!(groups.len(), 1);
		let g = &groups[0];
		assert_eq!(g.strategy, PartialResponseStrategy::Warn);
		assert_eq!(g.interval, Duration::from_secs(30));
		assert_eq!(g.rules.len(), 2);
		match &g.rules[1] {
			Rule::Alerting { alert, r#for, .. } => {
				assert_eq!(alert, "HighErrorRate");
				assert_eq!(*r#for, Duration::from_secs(300));
			},
			_ => panic!("expected alerting rule"),
		}
	}

	#[test]
	fn malformed_file_is_an_error() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("bad.yaml");
		std::fs::write(&path, "not: [valid, rule, file").unwrap();
		assert!(parse_file(&path).is_err());
	}

	#[test]
	fn for_0s_parses_to_zero_duration() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("rules.yaml");
		std::fs::write(
			&path,
			r#"
groups:
  - name: g
    rules:
      - alert: A
        expr: up == 0
        for: 0s
"#,
		)
		.unwrap();
		let groups = parse_file(&path).unwrap();
		match &groups[0].rules[0] {
			Rule::Alerting { r#for, .. } => assert_eq!(*r#for, Duration::ZERO),
			_ => panic!("expected alerting rule"),
		}
	}
}
