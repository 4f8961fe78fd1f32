#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error("no query peer reachable")]
	NoPeerReachable,
	#[error("query cancelled")]
	Cancelled,
}
