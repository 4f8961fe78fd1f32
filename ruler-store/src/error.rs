#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error("appender already committed or aborted")]
	AppenderClosed,
	#[error("io error: {0}")]
	Io(#[from] std::io::Error),
	#[error("serialization error: {0}")]
	Serde(#[from] serde_json::Error),
	#[error("block {0} not found")]
	BlockNotFound(String),
	#[error("object storage error: {0}")]
	Storage(String),
}
