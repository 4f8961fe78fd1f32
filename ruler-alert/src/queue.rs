//! C4: a bounded FIFO queue of pending alert notifications, fed by rule
//! evaluation and drained by the sender loop. Full queues evict the oldest
//! entry rather than reject the newest, so a slow or unreachable Alertmanager
//! degrades to losing history instead of losing the most recent state.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::alert::Alert;
use crate::metrics::{Metrics, QueueDrop};
use ruler_core::metrics::IncrementRecorder;

pub const DEFAULT_CAPACITY: usize = 10_000;
pub const DEFAULT_MAX_BATCH: usize = 100;

pub struct AlertQueue {
	inner: Mutex<VecDeque<Alert>>,
	capacity: usize,
	max_batch: usize,
	notify: Notify,
	metrics: Metrics,
}

impl AlertQueue {
	pub fn new(capacity: usize, max_batch: usize, metrics: Metrics) -> Self {
		Self {
			inner: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
			capacity,
			max_batch,
			notify: Notify::new(),
			metrics,
		}
	}

	/// Appends `alerts`, evicting the oldest entries when the queue is full.
	pub fn push(&self, alerts: Vec<Alert>) {
		if alerts.is_empty() {
			return;
		}
		{
			let mut q = self.inner.lock().unwrap();
			for alert in alerts {
				if q.len() >= self.capacity {
					q.pop_front();
					self.metrics.increment(&QueueDrop);
				}
				q.push_back(alert);
			}
		}
		// A single permit is enough: `pop` always drains everything available
		// once woken, so excess notifications are harmless, not lossy.
		self.notify.notify_one();
	}

	/// Blocks until at least one alert is queued or `cancel` fires, then
	/// drains up to `max_batch` alerts in FIFO order. Returns an empty vec iff
	/// cancelled.
	pub async fn pop(&self, cancel: &CancellationToken) -> Vec<Alert> {
		loop {
			{
				let mut q = self.inner.lock().unwrap();
				if !q.is_empty() {
					let n = q.len().min(self.max_batch);
					return q.drain(..n).collect();
				}
			}
			tokio::select! {
				biased;
				_ = cancel.cancelled() => return Vec::new(),
				_ = self.notify.notified() => {}
			}
		}
	}

	pub fn len(&self) -> usize {
		self.inner.lock().unwrap().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;
	use ruler_core::Labels;
	use std::collections::BTreeMap;
	use std::time::Duration;

	fn metrics() -> Metrics {
		Metrics::new(&mut prometheus_client::registry::Registry::default())
	}

	fn alert(name: &str) -> Alert {
		Alert::new(
			Labels::from_pairs([("alertname", name)]),
			BTreeMap::new(),
			Utc::now(),
			None,
			"http://ruler".to_string(),
			&[],
		)
	}

	#[tokio::test]
	async fn push_then_drain_preserves_fifo_order() {
		let q = AlertQueue::new(10, 10, metrics());
		q.push(vec![alert("a"), alert("b")]);
		let drained = q.pop(&CancellationToken::new()).await;
		let names: Vec<_> = drained
			.iter()
			.map(|a| a.labels.get("alertname").unwrap().to_string())
			.collect();
		assert_eq!(names, vec!["a", "b"]);
	}

	#[test]
	fn over_capacity_push_evicts_oldest() {
		let q = AlertQueue::new(2, 10, metrics());
		q.push(vec![alert("a"), alert("b"), alert("c")]);
		assert_eq!(q.len(), 2);
	}

	#[tokio::test]
	async fn pop_blocks_until_pushed() {
		let q = std::sync::Arc::new(AlertQueue::new(10, 10, metrics()));
		let cancel = CancellationToken::new();
		let reader = {
			let q = q.clone();
			let cancel = cancel.clone();
			tokio::spawn(async move { q.pop(&cancel).await })
		};
		tokio::time::sleep(Duration::from_millis(10)).await;
		q.push(vec![alert("a")]);
		let got = reader.await.unwrap();
		assert_eq!(got.len(), 1);
	}

	#[tokio::test]
	async fn pop_returns_empty_on_cancel() {
		let q = AlertQueue::new(10, 10, metrics());
		let cancel = CancellationToken::new();
		cancel.cancel();
		let got = q.pop(&cancel).await;
		assert!(got.is_empty());
	}
}
