pub mod alert;
pub mod error;
pub mod metrics;
pub mod queue;
pub mod sender;

pub use alert::Alert;
pub use error::Error;
pub use queue::AlertQueue;
pub use sender::Sender;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use ruler_discovery::AlertmanagerSet;

/// Drains `queue` and forwards each batch to the current [`AlertmanagerSet`]
/// view, until `cancel` fires. Runs as one of the supervised members of the
/// process: a send failure never stops the loop, only the batch is lost (and
/// counted).
pub async fn run(
	queue: Arc<AlertQueue>,
	alertmanagers: Arc<AlertmanagerSet>,
	sender: Arc<Sender>,
	cancel: CancellationToken,
) {
	loop {
		let batch = queue.pop(&cancel).await;
		if batch.is_empty() {
			if cancel.is_cancelled() {
				debug!("alert sender loop stopping");
				return;
			}
			continue;
		}
		let endpoints = alertmanagers.get();
		sender.send(&endpoints, &batch).await;
	}
}
