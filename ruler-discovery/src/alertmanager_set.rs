//! C3: periodically resolves configured Alertmanager URLs into a rotating,
//! immutable URL list.

use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::error::Error;
use crate::prefix::split_prefix;
use crate::resolver::Resolver;

pub const DEFAULT_AM_PORT: u16 = 9093;

/// A resolved Alertmanager endpoint. Pure value type: no I/O state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlertmanagerEndpoint {
	pub scheme: String,
	pub authority: String,
	pub path: String,
	pub userinfo: Option<String>,
}

impl AlertmanagerEndpoint {
	/// The full `/api/v1/alerts` URL this endpoint should receive alert
	/// notifications on.
	pub fn alerts_url(&self) -> String {
		let path = self.path.trim_end_matches('/');
		format!("{}/api/v1/alerts", self.base_url_trimmed(path))
	}

	fn base_url_trimmed(&self, path: &str) -> String {
		match &self.userinfo {
			Some(u) => format!("{}://{}@{}{}", self.scheme, u, self.authority, path),
			None => format!("{}://{}{}", self.scheme, self.authority, path),
		}
	}
}

impl fmt::Display for AlertmanagerEndpoint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.base_url_trimmed(&self.path))
	}
}

/// Splits a (prefix-stripped) URL-ish string into `(scheme, userinfo, host,
/// port, path)`. Deliberately minimal: this only needs to round-trip the
/// handful of fields Alertmanager URLs carry, not be a general URL parser.
fn parse_url_parts(s: &str) -> Result<(String, Option<String>, String, String), Error> {
	let (scheme, rest) = s
		.split_once("://")
		.ok_or_else(|| Error::InvalidUrl(s.to_string(), "missing scheme".to_string()))?;
	let (authority, path) = match rest.find('/') {
		Some(i) => (&rest[..i], &rest[i..]),
		None => (rest, ""),
	};
	let (userinfo, hostport) = match authority.split_once('@') {
		Some((u, h)) => (Some(u.to_string()), h.to_string()),
		None => (None, authority.to_string()),
	};
	Ok((scheme.to_string(), userinfo, hostport, path.to_string()))
}

pub struct AlertmanagerSet {
	configured: Vec<String>,
	resolver: Arc<Resolver>,
	current: Mutex<Vec<AlertmanagerEndpoint>>,
}

impl AlertmanagerSet {
	pub fn new(configured: Vec<String>, resolver: Arc<Resolver>) -> Self {
		Self {
			configured,
			resolver,
			current: Mutex::new(Vec::new()),
		}
	}

	/// Re-resolves every configured URL and atomically replaces `get()`'s
	/// view. A single bad URL is logged and skipped; it does not prevent the
	/// others from being resolved.
	pub async fn update(&self) -> Result<(), Error> {
		let mut resolved = Vec::new();
		for raw in &self.configured {
			let (qtype, rest) = split_prefix(raw);
			let (scheme, userinfo, hostport, path) = match parse_url_parts(rest) {
				Ok(parts) => parts,
				Err(e) => {
					tracing::warn!(url = %raw, error = %e, "skipping invalid alertmanager url");
					continue;
				},
			};
			// `dns+` entries embedded in a URL must still resolve to a port;
			// apply the Alertmanager default when the host itself carries none.
			let entry = if qtype == crate::prefix::QType::A {
				let (host, port) = crate::prefix::split_host_port(&hostport);
				crate::resolver::AddressEntry {
					qtype,
					host,
					port: Some(port.unwrap_or(DEFAULT_AM_PORT)),
				}
			} else {
				crate::resolver::AddressEntry {
					qtype,
					host: hostport,
					port: None,
				}
			};
			for hostport in self.resolver.resolve_hosts(&entry).await {
				resolved.push(AlertmanagerEndpoint {
					scheme: scheme.clone(),
					authority: hostport,
					path: path.clone(),
					userinfo: userinfo.clone(),
				});
			}
		}
		debug!(count = resolved.len(), "resolved alertmanager endpoints");
		*self.current.lock().unwrap() = resolved;
		Ok(())
	}

	/// Returns the current endpoint list. Callers must treat it as
	/// immutable; it is a snapshot, not a live view.
	pub fn get(&self) -> Vec<AlertmanagerEndpoint> {
		self.current.lock().unwrap().clone()
	}
}
