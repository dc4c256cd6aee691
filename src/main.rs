//! Sensmap - crowd-sourced sensory map service
//!
//! Collects sensory reports (noise, light, odor, crowding) on a fixed geographic
//! grid, weights them by age, personalizes them per user profile and ranks walking
//! routes by expected sensory load.
//!
//! Module structure:
//! - `domain/` - Core data types (coordinates, reports, profile, routes)
//! - `io/` - External interfaces (OSRM routing, persistence, HTTP API)
//! - `services/` - Engine (grid, store, decay, aggregation, route scoring)
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use sensmap::infra::config::DEFAULT_CONFIG_PATH;
use sensmap::infra::{Config, Metrics};
use sensmap::io::{snapshot_writer, start_api_server, AppState, OsrmClient, Persistence};
use sensmap::services::compaction::run_compaction;
use sensmap::services::{ProfileManager, ReportService, RoutePlanner};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Sensmap - sensory map and sensory-aware route planner
#[derive(Parser, Debug)]
#[command(name = "sensmap", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default: INFO, use RUST_LOG=debug for per-request visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("sensmap starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    info!(
        config_file = %config.config_file(),
        bind_address = %config.bind_address(),
        server_port = %config.server_port(),
        cell_size_m = %config.cell_size_m(),
        osrm_url = %config.osrm_url(),
        routing_profile = %config.routing_profile(),
        routing_timeout_ms = %config.routing_timeout().as_millis(),
        snapshot_file = %config.snapshot_file(),
        profile_file = %config.profile_file(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    // Restore persisted state
    let persistence = Arc::new(Persistence::new(config.snapshot_file(), config.profile_file()));
    let store = persistence.load_store(config.cell_size_m()).into_shared();
    let profiles =
        Arc::new(ProfileManager::new(persistence.load_profile()).with_persistence(persistence.clone()));

    // Single snapshot writer; stopped last so it flushes every mutation
    let (snapshots, writer) = snapshot_writer(persistence.clone());
    let (writer_stop_tx, writer_stop_rx) = watch::channel(false);
    let writer = tokio::spawn(writer.run(writer_stop_rx));

    let reports =
        Arc::new(ReportService::new(store.clone(), metrics.clone()).with_snapshots(snapshots));

    let provider = Arc::new(OsrmClient::new(
        config.osrm_url(),
        config.routing_profile(),
        config.routing_timeout(),
    )?);
    let planner = Arc::new(
        RoutePlanner::new(provider, store.clone(), metrics.clone())
            .with_timeout(config.routing_timeout())
            .with_walking_speed(config.walking_speed_mps()),
    );

    // Start compaction task
    let compaction = tokio::spawn(run_compaction(
        reports.clone(),
        config.compaction_interval(),
        shutdown_rx.clone(),
    ));

    // Start metrics reporter
    let metrics_clone = metrics.clone();
    let metrics_store = store.clone();
    let metrics_interval = config.metrics_interval_secs();
    let mut metrics_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let (cells, reports) = {
                        let store = metrics_store.read();
                        (store.cell_count(), store.report_count())
                    };
                    metrics_clone.report(cells, reports).log();
                }
                _ = metrics_shutdown.changed() => {
                    if *metrics_shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    });

    // Start HTTP API (if port > 0)
    let server_port = config.server_port();
    let server = if server_port > 0 {
        let state = Arc::new(AppState { reports, profiles, planner, metrics });
        let bind_address = config.bind_address().to_string();
        let server_shutdown = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = start_api_server(&bind_address, server_port, state, server_shutdown).await {
                tracing::error!(error = %e, "API server error");
            }
        }))
    } else {
        info!("api_server_disabled");
        None
    };

    tokio::signal::ctrl_c().await.ok();
    info!("shutdown_signal_received");
    let _ = shutdown_tx.send(true);

    compaction.await.ok();
    if let Some(server) = server {
        server.await.ok();
    }
    let _ = writer_stop_tx.send(true);
    writer.await.ok();

    info!("sensmap shutdown complete");
    Ok(())
}
