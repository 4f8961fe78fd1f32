//! C11 (ambient): command-line flags and the typed, validated configuration
//! they produce. Mirrors the teacher's `#[derive(Parser)]` `Args` plus a
//! plain `Config` struct, generalized to this process's larger surface.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::error::Error;

#[derive(Parser, Debug)]
#[command(name = "thanos-ruler", version, about = "Distributed PromQL rule evaluator", long_about = None)]
pub struct Args {
	/// Data directory for the local TSDB (required).
	#[arg(long = "tsdb.path", value_name = "dir")]
	pub data_dir: Option<PathBuf>,

	/// Rule-file glob pattern; may be repeated. At least one is required.
	#[arg(long = "rule-file", value_name = "glob")]
	pub rule_files: Vec<String>,

	/// Query server address, optionally `dns+`/`dnssrv+` prefixed; may be
	/// repeated. At least one is required.
	#[arg(long = "query", value_name = "addr")]
	pub query_endpoints: Vec<String>,

	/// Alertmanager URL, optionally `dns+`/`dnssrv+` prefixed; may be
	/// repeated.
	#[arg(long = "alertmanagers.url", value_name = "url")]
	pub alertmanager_urls: Vec<String>,

	/// File-SD target-file glob pattern; may be repeated. Files are YAML
	/// lists of target groups, re-scanned on a timer.
	#[arg(long = "query.sd-files", value_name = "glob")]
	pub query_sd_files: Vec<String>,

	/// Label name to strip from every outgoing alert notification; may be
	/// repeated.
	#[arg(long = "alert.label-drop", value_name = "name")]
	pub alert_label_drop: Vec<String>,

	/// External label in `name=value` form, applied to every emitted sample
	/// and alert; may be repeated.
	#[arg(long = "label", value_name = "name=value")]
	pub external_labels: Vec<String>,

	/// Address the gRPC Store API listens on.
	#[arg(long = "grpc-address", default_value = "0.0.0.0:10901")]
	pub grpc_address: String,

	/// Address the admin HTTP surface (metrics, reload, rules/alerts) listens on.
	#[arg(long = "http-address", default_value = "0.0.0.0:10902")]
	pub http_address: String,

	/// Base URL used as `generator_url` on outgoing alert notifications.
	#[arg(long = "alert.query-url", default_value = "http://localhost:10902")]
	pub generator_url: String,

	/// TSDB block duration in seconds.
	#[arg(long = "tsdb.block-duration-seconds", default_value_t = 7200)]
	pub block_duration_seconds: u64,

	/// TSDB retention in seconds.
	#[arg(long = "tsdb.retention-seconds", default_value_t = 172_800)]
	pub retention_seconds: u64,

	/// Object-storage bucket prefix blocks are shipped under.
	#[arg(long = "objstore.bucket-prefix", default_value = "")]
	pub bucket_prefix: String,

	/// Alert send timeout in seconds.
	#[arg(long = "alertmanagers.send-timeout-seconds", default_value_t = 10)]
	pub alert_send_timeout_seconds: u64,

	/// Alert queue capacity.
	#[arg(long = "alert.queue-capacity", default_value_t = 10_000)]
	pub alert_queue_capacity: usize,

	/// Alert queue max batch size per send.
	#[arg(long = "alert.queue-max-batch", default_value_t = 100)]
	pub alert_queue_max_batch: usize,

	/// Log level/filter, e.g. `info`, `debug`, `ruler_query=debug,info`.
	#[arg(long = "log.level", default_value = "info")]
	pub log_level: String,
}

/// Validated configuration derived from [`Args`]. Unlike `Args`, every field
/// here is in its natural type and every required invariant has already been
/// checked — nothing downstream needs to re-validate.
#[derive(Debug, Clone)]
pub struct RulerConfig {
	pub data_dir: PathBuf,
	pub rule_files: Vec<String>,
	pub query_endpoints: Vec<String>,
	pub alertmanager_urls: Vec<String>,
	pub query_sd_files: Vec<String>,
	pub alert_label_drop: Vec<String>,
	pub external_labels: ruler_core::Labels,
	pub grpc_address: String,
	pub http_address: String,
	pub generator_url: String,
	pub block_duration: Duration,
	pub retention: Duration,
	pub bucket_prefix: String,
	pub alert_send_timeout: Duration,
	pub alert_queue_capacity: usize,
	pub alert_queue_max_batch: usize,
	pub log_level: String,
}

impl RulerConfig {
	/// Validates `args` into a [`RulerConfig`]. Startup with invalid required
	/// configuration must fail the process (§7, Configuration errors) rather
	/// than silently default.
	pub fn from_args(args: Args) -> Result<Self, Error> {
		let data_dir = args
			.data_dir
			.ok_or_else(|| Error::Config("--tsdb.path is required".to_string()))?;

		if args.rule_files.is_empty() {
			return Err(Error::Config("at least one --rule-file pattern is required".to_string()));
		}
		if args.query_endpoints.is_empty() {
			return Err(Error::Config("at least one --query endpoint is required".to_string()));
		}

		let mut external_labels = ruler_core::Labels::new();
		for raw in &args.external_labels {
			let (name, value) = raw
				.split_once('=')
				.ok_or_else(|| Error::Config(format!("invalid --label {raw:?}, expected name=value")))?;
			if !ruler_core::is_valid_label_name(name) {
				return Err(Error::Config(format!("invalid external label name {name:?}")));
			}
			external_labels.set(name, value.to_string());
		}

		Ok(Self {
			data_dir,
			rule_files: args.rule_files,
			query_endpoints: args.query_endpoints,
			alertmanager_urls: args.alertmanager_urls,
			query_sd_files: args.query_sd_files,
			alert_label_drop: args.alert_label_drop,
			external_labels,
			grpc_address: args.grpc_address,
			http_address: args.http_address,
			generator_url: args.generator_url,
			block_duration: Duration::from_secs(args.block_duration_seconds),
			retention: Duration::from_secs(args.retention_seconds),
			bucket_prefix: args.bucket_prefix,
			alert_send_timeout: Duration::from_secs(args.alert_send_timeout_seconds),
			alert_queue_capacity: args.alert_queue_capacity,
			alert_queue_max_batch: args.alert_queue_max_batch,
			log_level: args.log_level,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn base_args() -> Args {
		Args {
			data_dir: Some(PathBuf::from("/tmp/ruler")),
			rule_files: vec!["/etc/ruler/*.yaml".to_string()],
			query_endpoints: vec!["dns+query:9090".to_string()],
			alertmanager_urls: vec![],
			query_sd_files: vec![],
			alert_label_drop: vec![],
			external_labels: vec!["replica=A".to_string()],
			grpc_address: "0.0.0.0:10901".to_string(),
			http_address: "0.0.0.0:10902".to_string(),
			generator_url: "http://localhost:10902".to_string(),
			block_duration_seconds: 7200,
			retention_seconds: 172_800,
			bucket_prefix: String::new(),
			alert_send_timeout_seconds: 10,
			alert_queue_capacity: 10_000,
			alert_queue_max_batch: 100,
			log_level: "info".to_string(),
		}
	}

	#[test]
	fn missing_data_dir_is_a_config_error() {
		let mut args = base_args();
		args.data_dir = None;
		assert!(RulerConfig::from_args(args).is_err());
	}

	#[test]
	fn missing_rule_files_is_a_config_error() {
		let mut args = base_args();
		args.rule_files = vec![];
		assert!(RulerConfig::from_args(args).is_err());
	}

	#[test]
	fn missing_query_endpoints_is_a_config_error() {
		let mut args = base_args();
		args.query_endpoints = vec![];
		assert!(RulerConfig::from_args(args).is_err());
	}

	#[test]
	fn malformed_external_label_is_a_config_error() {
		let mut args = base_args();
		args.external_labels = vec!["not-a-pair".to_string()];
		assert!(RulerConfig::from_args(args).is_err());
	}

	#[test]
	fn well_formed_args_parse_into_config() {
		let cfg = RulerConfig::from_args(base_args()).unwrap();
		assert_eq!(cfg.data_dir, PathBuf::from("/tmp/ruler"));
		assert_eq!(cfg.external_labels.get("replica"), Some("A"));
		assert_eq!(cfg.block_duration, Duration::from_secs(7200));
	}
}
