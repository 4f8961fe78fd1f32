#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error("address entry {0:?} has no port and no default port is configured")]
	MissingPort(String),
	#[error("resolution cancelled")]
	Cancelled,
	#[error("invalid alertmanager url {0:?}: {1}")]
	InvalidUrl(String, String),
}
