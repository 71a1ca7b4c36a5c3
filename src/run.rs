//! Process bootstrap: builds the Kubernetes client, wires every
//! reconciler and pipeline worker onto a shared [`ShutdownCoordinator`],
//! and waits for a termination signal. Kept in the library rather than
//! `main.rs` so it can use this crate's own `Result`/error-context types
//! directly.

use snafu::ResultExt;

use crate::config::{FeatureFlagStore, Registry, StartupConfig};
use crate::error::KubeClientSnafu;
use crate::shutdown::ShutdownCoordinator;
use crate::{pipeline, reconcile, sources};

fn spawn_reconcilers(
    client: &kube::Client,
    registry: &Registry,
    feature_flags: &std::sync::Arc<FeatureFlagStore>,
    startup: &StartupConfig,
    shutdown: &ShutdownCoordinator,
    tracker: &tokio_util::task::TaskTracker,
) {
    tracker.spawn(reconcile::configmap::run(
        client.clone(),
        registry.clone(),
        feature_flags.clone(),
        startup.clone(),
        shutdown.token(),
    ));
    tracker.spawn(reconcile::ingester::run(
        client.clone(),
        registry.clone(),
        startup.watch_namespace.clone(),
        shutdown.token(),
    ));
    tracker.spawn(reconcile::observation_filter::run(
        client.clone(),
        registry.clone(),
        startup.observation_filter_namespace.clone(),
        shutdown.token(),
    ));
    tracker.spawn(reconcile::dedup_config::run(
        client.clone(),
        registry.clone(),
        startup.observation_dedup_config_namespace.clone(),
        shutdown.token(),
    ));
    tracker.spawn(reconcile::source_config::run(
        client.clone(),
        registry.clone(),
        startup.observation_source_config_namespace.clone(),
        shutdown.token(),
    ));
    tracker.spawn(reconcile::type_config::run(
        client.clone(),
        registry.clone(),
        startup.observation_type_config_namespace.clone(),
        shutdown.token(),
    ));
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Runs the whole process until a termination signal arrives, then drains
/// (spec.md §5, §7). Assumes `crate::telemetry::init` has already been
/// called by the caller.
pub async fn execute() -> crate::Result<()> {
    let startup = StartupConfig::from_env();
    info!(in_cluster = startup.in_cluster, api_group = %startup.api_group, "starting zen-watcher");

    let client = kube::Client::try_default().await.context(KubeClientSnafu)?;

    let registry = Registry::new();
    let feature_flags = std::sync::Arc::new(FeatureFlagStore::new());

    let shutdown = ShutdownCoordinator::new();
    let tracker = shutdown.tracker();

    spawn_reconcilers(&client, &registry, &feature_flags, &startup, &shutdown, &tracker);

    let (raw_tx, raw_rx) = tokio::sync::mpsc::channel(sources::DEFAULT_CHANNEL_CAPACITY);
    tracker.spawn(sources::supervisor::run(client.clone(), registry.clone(), raw_tx, shutdown.token()));

    tracker.spawn(pipeline::run(
        raw_rx,
        client.clone(),
        registry.clone(),
        crate::config::defaults::DEFAULT_DEDUP_MAX_SIZE,
        shutdown.token(),
    ));

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, draining");
    shutdown.shutdown().await;
    info!("shutdown complete");
    Ok(())
}
