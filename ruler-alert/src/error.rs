#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error("no alertmanager replica accepted the batch")]
	AllEndpointsFailed,
}
