#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error("configuration error: {0}")]
	Config(String),
	#[error(transparent)]
	Io(#[from] std::io::Error),
}
