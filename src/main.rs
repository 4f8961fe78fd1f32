use std::sync::Arc;

use clap::Parser;
use prometheus_client::registry::Registry;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use thanos_ruler::admin;
use thanos_ruler::config::{Args, RulerConfig};
use thanos_ruler::rules::{ManagerPair, RuleManager};
use thanos_ruler::supervisor::Supervisor;

use ruler_alert::{AlertQueue, Sender as AlertSender};
use ruler_discovery::{AlertmanagerSet, FileSdCache, Resolver};
use ruler_query::Querier;
use ruler_store::{Shipper, StoreServer, StoreService, Tsdb};
use ruler_store::storage::InMemoryStorage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();
	let cfg = match RulerConfig::from_args(args) {
		Ok(cfg) => cfg,
		Err(e) => {
			eprintln!("configuration error: {e}");
			std::process::exit(1);
		},
	};

	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_new(&cfg.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
		.with_writer(std::io::stderr)
		.with_ansi(false)
		.init();

	if let Err(e) = run(cfg).await {
		error!(error = %e, "thanos-ruler exited with error");
		std::process::exit(1);
	}
	Ok(())
}

async fn run(cfg: RulerConfig) -> anyhow::Result<()> {
	let mut registry = Registry::default();

	let disc_metrics = ruler_discovery::metrics::Metrics::new(ruler_discovery::metrics::sub_registry(&mut registry));
	let resolver = Arc::new(Resolver::new(disc_metrics)?);
	let file_sd = Arc::new(FileSdCache::new());
	let alertmanagers = Arc::new(AlertmanagerSet::new(cfg.alertmanager_urls.clone(), resolver.clone()));

	let alert_metrics = ruler_alert::metrics::Metrics::new(ruler_alert::metrics::sub_registry(&mut registry));
	let alert_queue = Arc::new(AlertQueue::new(cfg.alert_queue_capacity, cfg.alert_queue_max_batch, alert_metrics.clone()));
	let alert_sender = Arc::new(AlertSender::new(reqwest::Client::new(), cfg.alert_send_timeout, alert_metrics));

	let query_metrics = Arc::new(ruler_query::metrics::Metrics::new(ruler_query::metrics::sub_registry(&mut registry)));
	let abort_querier = Arc::new(Querier::new(
		reqwest::Client::new(),
		resolver.clone(),
		file_sd.clone(),
		ruler_core::PartialResponseStrategy::Abort,
		query_metrics.clone(),
	));
	let warn_querier = Arc::new(Querier::new(
		reqwest::Client::new(),
		resolver.clone(),
		file_sd.clone(),
		ruler_core::PartialResponseStrategy::Warn,
		query_metrics,
	));

	let tsdb = Arc::new(Tsdb::open(
		cfg.data_dir.clone(),
		cfg.external_labels.clone(),
		cfg.block_duration,
		cfg.retention,
	)?);

	let rule_metrics = thanos_ruler::rules::metrics::Metrics::new(thanos_ruler::rules::metrics::sub_registry(&mut registry));
	let abort_manager = Arc::new(RuleManager::new(
		ruler_core::PartialResponseStrategy::Abort,
		abort_querier,
		tsdb.clone(),
		alert_queue.clone(),
		cfg.alert_label_drop.clone(),
		cfg.generator_url.clone(),
		rule_metrics.clone(),
	));
	let warn_manager = Arc::new(RuleManager::new(
		ruler_core::PartialResponseStrategy::Warn,
		warn_querier,
		tsdb.clone(),
		alert_queue.clone(),
		cfg.alert_label_drop.clone(),
		cfg.generator_url.clone(),
		rule_metrics,
	));
	let rules = Arc::new(ManagerPair::new(abort_manager, warn_manager, cfg.rule_files.clone()));

	// Startup reload is synthetic and must succeed for the process to come up.
	rules.reload()?;

	let store_metrics = ruler_store::metrics::Metrics::new(ruler_store::metrics::sub_registry(&mut registry));
	let storage: Arc<dyn ruler_store::storage::ObjectStorage> = Arc::new(InMemoryStorage::default());
	let shipper = Arc::new(Shipper::new(
		tsdb.clone(),
		storage,
		cfg.bucket_prefix.clone(),
		cfg.data_dir.join("thanos.shipper.json"),
		store_metrics,
	));

	let registry = Arc::new(registry);
	let (reload_tx, mut reload_rx) = mpsc::channel::<()>(1);

	let mut supervisor = Supervisor::new();

	{
		let resolver = resolver.clone();
		let query_endpoints = cfg.query_endpoints.clone();
		supervisor.spawn("address-resolver", move |cancel| async move {
			run_resolver_loop(resolver, query_endpoints, cancel).await;
			Ok(())
		});
	}

	{
		let file_sd = file_sd.clone();
		let query_sd_files = cfg.query_sd_files.clone();
		supervisor.spawn("file-sd-watcher", move |cancel| async move {
			ruler_discovery::file_sd::run_watch_loop(
				file_sd,
				query_sd_files,
				ruler_discovery::file_sd::DEFAULT_WATCH_INTERVAL,
				cancel,
			)
			.await;
			Ok(())
		});
	}

	{
		let alertmanagers = alertmanagers.clone();
		supervisor.spawn("alertmanager-set", move |cancel| async move {
			run_alertmanager_loop(alertmanagers, cancel).await;
			Ok(())
		});
	}

	{
		let queue = alert_queue.clone();
		let alertmanagers = alertmanagers.clone();
		let sender = alert_sender.clone();
		supervisor.spawn("alert-sender", move |cancel| async move {
			ruler_alert::run(queue, alertmanagers, sender, cancel).await;
			Ok(())
		});
	}

	{
		let rules = rules.clone();
		supervisor.spawn("rule-manager-set", move |cancel| async move {
			rules.run(cancel).await;
			Ok(())
		});
	}

	{
		let shipper = shipper.clone();
		supervisor.spawn("block-shipper", move |cancel| async move {
			shipper.run(ruler_store::shipper::DEFAULT_INTERVAL, cancel).await;
			Ok(())
		});
	}

	{
		let tsdb = tsdb.clone();
		supervisor.spawn("retention-sweeper", move |cancel| async move {
			run_retention_loop(tsdb, cancel).await;
			Ok(())
		});
	}

	{
		let rules = rules.clone();
		supervisor.spawn("reload-signals", move |cancel| async move {
			run_reload_loop(rules, &mut reload_rx, cancel).await;
			Ok(())
		});
	}

	{
		let grpc_address = cfg.grpc_address.clone();
		let tsdb = tsdb.clone();
		supervisor.spawn("store-grpc", move |cancel| async move { run_store_server(grpc_address, tsdb, cancel).await });
	}

	{
		let http_address = cfg.http_address.clone();
		let registry = registry.clone();
		let rules = rules.clone();
		supervisor.spawn("admin-http", move |cancel| async move {
			run_admin_server(http_address, registry, rules, reload_tx, cancel).await
		});
	}

	supervisor.spawn("shutdown-signals", |cancel| async move {
		wait_for_shutdown_signal().await;
		cancel.cancel();
		Ok(())
	});

	supervisor.run().await
}

async fn run_resolver_loop(resolver: Arc<Resolver>, query_endpoints: Vec<String>, cancel: CancellationToken) {
	let mut ticker = tokio::time::interval(ruler_discovery::resolver::DEFAULT_REFRESH_INTERVAL);
	loop {
		tokio::select! {
			biased;
			_ = cancel.cancelled() => return,
			_ = ticker.tick() => {
				if let Err(e) = resolver.resolve(&query_endpoints, None, &cancel).await {
					warn!(error = %e, "address resolution round failed");
				}
			}
		}
	}
}

async fn run_alertmanager_loop(alertmanagers: Arc<AlertmanagerSet>, cancel: CancellationToken) {
	let mut ticker = tokio::time::interval(ruler_discovery::resolver::DEFAULT_REFRESH_INTERVAL);
	loop {
		tokio::select! {
			biased;
			_ = cancel.cancelled() => return,
			_ = ticker.tick() => {
				if let Err(e) = alertmanagers.update().await {
					warn!(error = %e, "alertmanager set refresh failed");
				}
			}
		}
	}
}

async fn run_retention_loop(tsdb: Arc<Tsdb>, cancel: CancellationToken) {
	let mut ticker = tokio::time::interval(std::time::Duration::from_secs(60));
	loop {
		tokio::select! {
			biased;
			_ = cancel.cancelled() => return,
			_ = ticker.tick() => {
				let now_ms = chrono::Utc::now().timestamp_millis();
				if let Err(e) = tsdb.seal_if_due(now_ms) {
					warn!(error = %e, "failed to seal due block");
				}
				if let Err(e) = tsdb.apply_retention(now_ms) {
					warn!(error = %e, "failed to apply retention");
				}
			}
		}
	}
}

async fn run_reload_loop(rules: Arc<ManagerPair>, reload_rx: &mut mpsc::Receiver<()>, cancel: CancellationToken) {
	let mut sighup = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
		Ok(s) => s,
		Err(e) => {
			warn!(error = %e, "failed to install SIGHUP handler");
			return;
		},
	};
	loop {
		tokio::select! {
			biased;
			_ = cancel.cancelled() => return,
			_ = sighup.recv() => trigger_reload(&rules),
			Some(()) = reload_rx.recv() => trigger_reload(&rules),
		}
	}
}

fn trigger_reload(rules: &ManagerPair) {
	match rules.reload() {
		Ok(()) => info!("rule file reload succeeded"),
		Err(e) => warn!(error = %e, "rule file reload failed, previous configuration remains in effect"),
	}
}

async fn run_store_server(address: String, tsdb: Arc<Tsdb>, cancel: CancellationToken) -> anyhow::Result<()> {
	let addr = address.parse()?;
	let service = StoreService::new(tsdb);
	tonic::transport::Server::builder()
		.add_service(StoreServer::new(service))
		.serve_with_shutdown(addr, cancel.cancelled())
		.await?;
	Ok(())
}

async fn run_admin_server(
	address: String,
	registry: Arc<Registry>,
	rules: Arc<ManagerPair>,
	reload_tx: mpsc::Sender<()>,
	cancel: CancellationToken,
) -> anyhow::Result<()> {
	let listener = tokio::net::TcpListener::bind(&address).await?;
	let app = admin::App::new(registry, rules, reload_tx);
	axum::serve(listener, app.router())
		.with_graceful_shutdown(cancel.cancelled_owned())
		.await?;
	Ok(())
}

async fn wait_for_shutdown_signal() {
	let ctrl_c = async {
		let _ = tokio::signal::ctrl_c().await;
	};
	let sigterm = async {
		match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
			Ok(mut s) => {
				s.recv().await;
			},
			Err(_) => std::future::pending::<()>().await,
		}
	};
	tokio::select! {
		_ = ctrl_c => {},
		_ = sigterm => {},
	}
	info!("shutdown signal received");
}
