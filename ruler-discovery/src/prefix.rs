//! `dns+`/`dnssrv+` prefix parsing shared by the address resolver and the
//! Alertmanager URL expander.

/// Resolution strategy carried by an address or URL entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QType {
	/// No prefix: the entry is passed through unresolved.
	None,
	/// `dns+`: resolve via an A/AAAA lookup.
	A,
	/// `dnssrv+`: resolve via an SRV lookup.
	Srv,
}

impl QType {
	pub fn as_str(&self) -> &'static str {
		match self {
			QType::None => "none",
			QType::A => "A",
			QType::Srv => "SRV",
		}
	}
}

/// Splits `raw` on its resolution prefix, if any, returning the strategy and
/// the remainder of the string with the prefix removed.
pub fn split_prefix(raw: &str) -> (QType, &str) {
	if let Some(rest) = raw.strip_prefix("dnssrv+") {
		(QType::Srv, rest)
	} else if let Some(rest) = raw.strip_prefix("dns+") {
		(QType::A, rest)
	} else {
		(QType::None, raw)
	}
}

/// Splits a `host[:port]` string into its parts. Does not attempt to handle
/// bracketed IPv6 literals beyond the simple `host:port` case, matching the
/// set of inputs this system actually accepts (hostnames and IPv4/IPv6
/// addresses supplied by operators or SRV records).
pub fn split_host_port(s: &str) -> (String, Option<u16>) {
	match s.rsplit_once(':') {
		Some((host, port)) => match port.parse::<u16>() {
			Ok(p) => (host.to_string(), Some(p)),
			Err(_) => (s.to_string(), None),
		},
		None => (s.to_string(), None),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn splits_known_prefixes() {
		assert_eq!(split_prefix("dns+host:9093"), (QType::A, "host:9093"));
		assert_eq!(
			split_prefix("dnssrv+_http._tcp.svc"),
			(QType::Srv, "_http._tcp.svc")
		);
		assert_eq!(split_prefix("plain-host:80"), (QType::None, "plain-host:80"));
	}

	#[test]
	fn splits_host_port() {
		assert_eq!(
			split_host_port("host:9093"),
			("host".to_string(), Some(9093))
		);
		assert_eq!(split_host_port("host"), ("host".to_string(), None));
	}
}
