//! C10: run-group discipline for the process's long-running loops. When any
//! member exits — cleanly or with an error — every other member is
//! cancelled. The exit status is the first non-nil error observed.

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// A supervised set of tasks sharing one [`CancellationToken`]. Mirrors the
/// teacher's `JoinSet` + `join_next` main-loop shape, generalized so members
/// can be registered one at a time instead of all spawned inline in `main`.
pub struct Supervisor {
	cancel: CancellationToken,
	tasks: JoinSet<Result<(), anyhow::Error>>,
}

impl Supervisor {
	pub fn new() -> Self {
		Self {
			cancel: CancellationToken::new(),
			tasks: JoinSet::new(),
		}
	}

	/// The token every member should select against to know when to stop.
	pub fn cancellation_token(&self) -> CancellationToken {
		self.cancel.clone()
	}

	/// Registers a member. `f` receives this supervisor's cancellation token
	/// and must return once it observes cancellation.
	pub fn spawn<F, Fut>(&mut self, name: &'static str, f: F)
	where
		F: FnOnce(CancellationToken) -> Fut,
		Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
	{
		let fut = f(self.cancel.clone());
		self.tasks.spawn(async move {
			let result = fut.await;
			if let Err(e) = &result {
				error!(member = name, error = %e, "supervised member exited with error");
			} else {
				debug!(member = name, "supervised member exited");
			}
			result
		});
	}

	/// Runs until every member has exited. The first member exit (clean or
	/// errored) triggers cancellation of the rest; their own exits are still
	/// awaited so shutdown is observed to completion. Returns the first
	/// non-nil error, if any.
	pub async fn run(mut self) -> anyhow::Result<()> {
		let mut first_error = None;
		let mut first_exit_seen = false;

		while let Some(joined) = self.tasks.join_next().await {
			if !first_exit_seen {
				first_exit_seen = true;
				self.cancel.cancel();
			}
			match joined {
				Ok(Ok(())) => {},
				Ok(Err(e)) => first_error.get_or_insert(e),
				Err(join_err) => first_error.get_or_insert(anyhow::anyhow!("supervised task panicked: {join_err}")),
			};
		}

		match first_error {
			Some(e) => Err(e),
			None => Ok(()),
		}
	}
}

impl Default for Supervisor {
	fn default() -> Self {
		Self::new()
	}
}
