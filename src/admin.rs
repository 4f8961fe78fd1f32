//! The HTTP admin surface (§6): reload trigger, metrics exposition, health
//! probes, and read-only rule/alert introspection. Mirrors the teacher's
//! `axum` `App`/`Router`/`State` shape in `admin.rs`/`metrics.rs`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;
use tokio::sync::mpsc;
use tracing::warn;

use crate::rules::ManagerPair;

#[derive(Clone)]
pub struct App {
	registry: Arc<Registry>,
	rules: Arc<ManagerPair>,
	reload_tx: mpsc::Sender<()>,
}

impl App {
	pub fn new(registry: Arc<Registry>, rules: Arc<ManagerPair>, reload_tx: mpsc::Sender<()>) -> Self {
		Self { registry, rules, reload_tx }
	}

	pub fn router(&self) -> Router {
		Router::new()
			.route("/metrics", get(metrics_handler))
			.route("/-/reload", post(reload_handler))
			.route("/-/healthy", get(healthy_handler))
			.route("/-/ready", get(ready_handler))
			.route("/api/v1/rules", get(rules_handler))
			.route("/api/v1/alerts", get(alerts_handler))
			.route("/debug/pprof/{*path}", get(pprof_stub))
			.with_state(self.clone())
	}
}

async fn metrics_handler(State(app): State<App>) -> Result<String, StatusCode> {
	let mut buffer = String::new();
	encode(&mut buffer, &app.registry).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
	Ok(buffer)
}

/// Enqueues a reload event and returns immediately — "returns 200 once
/// enqueued", not once the reload has actually run.
async fn reload_handler(State(app): State<App>) -> StatusCode {
	if app.reload_tx.send(()).await.is_err() {
		warn!("reload request dropped: reload loop is not running");
		return StatusCode::SERVICE_UNAVAILABLE;
	}
	StatusCode::OK
}

async fn healthy_handler() -> StatusCode {
	StatusCode::OK
}

async fn ready_handler(State(app): State<App>) -> StatusCode {
	// Ready as soon as there is a group registry to serve from, even an
	// empty one ("zero rule files" is a valid, healthy steady state).
	let _ = app.rules.status();
	StatusCode::OK
}

async fn rules_handler(State(app): State<App>) -> impl IntoResponse {
	Json(app.rules.status())
}

async fn alerts_handler(State(app): State<App>) -> impl IntoResponse {
	let alerts: Vec<_> = app.rules.status().into_iter().flat_map(|g| g.alerts).collect();
	Json(alerts)
}

/// Profiling is out of core scope; this keeps the documented route shape
/// without pulling in a profiler dependency.
async fn pprof_stub() -> StatusCode {
	StatusCode::NOT_IMPLEMENTED
}
