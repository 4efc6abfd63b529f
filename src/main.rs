//! Stock Ledger - Entry Point
//!
//! Initializes configuration, logging, the account journals and the
//! HTTP surfaces. Runs until SIGINT.
//!
//! Wiring sequence:
//! 1. Load config.toml (or $STOCK_LEDGER_CONFIG) + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Replay account journals into the JournalLedger
//! 4. Seed the QuoteBook from [[quotes]]
//! 5. Spawn Prometheus exporter on :9090 (optional)
//! 6. Spawn health server (/live + /ready)
//! 7. Spawn ledger health probe loop
//! 8. Spawn JSON API server
//! 9. Wait for SIGINT → graceful shutdown (readiness off → drain → exit)

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use stock_ledger::adapters::api::{self, ApiState};
use stock_ledger::adapters::metrics::{HealthServer, HealthState, MetricsRegistry};
use stock_ledger::adapters::persistence::{JournalLedger, LedgerSettings};
use stock_ledger::adapters::quotes::QuoteBook;
use stock_ledger::config::loader::{config_path, load_config};
use stock_ledger::ports::LedgerStore;

const HEALTH_PROBE_INTERVAL: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration ───────────────────────────────
    let config = load_config(&config_path()).context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.service.log_level)),
        )
        .json()
        .init();

    info!(
        name = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %config.ledger.data_dir,
        "Starting stock ledger"
    );

    // ── 3. Shutdown signal channel ──────────────────────────
    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);

    // ── 4. Replay account journals ──────────────────────────
    let ledger = Arc::new(
        JournalLedger::open(&config.ledger.data_dir, LedgerSettings::from(&config.ledger))
            .await
            .context("Failed to open account journals")?,
    );
    info!(accounts = ledger.account_count().await, "Ledger ready");

    // ── 5. Seed quote book ──────────────────────────────────
    let quotes = Arc::new(QuoteBook::from_config(&config.quotes));
    if quotes.is_empty().await {
        warn!("No quotes configured; every symbol will be unknown");
    }

    // ── 6. Prometheus exporter ──────────────────────────────
    let metrics = if config.metrics.enabled {
        let registry =
            Arc::new(MetricsRegistry::new().context("Failed to register Prometheus metrics")?);
        let exporter = Arc::clone(&registry);
        let bind = config.metrics.bind_address.clone();
        let rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = exporter.serve(bind, rx).await {
                error!(error = %e, "Metrics server failed");
            }
        });
        Some(registry)
    } else {
        None
    };

    // ── 7. Health server + ledger probe ─────────────────────
    let health = Arc::new(HealthState::new());
    let health_server = HealthServer::new(Arc::clone(&health), config.metrics.health_port);
    let health_rx = shutdown_tx.subscribe();
    let health_handle = tokio::spawn(async move {
        if let Err(e) = health_server.run(health_rx).await {
            error!(error = %e, "Health server failed");
        }
    });

    let probe_ledger = Arc::clone(&ledger);
    let probe_health = Arc::clone(&health);
    let mut probe_rx = shutdown_tx.subscribe();
    let probe_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(HEALTH_PROBE_INTERVAL);
        loop {
            tokio::select! {
                biased;
                _ = probe_rx.recv() => break,
                _ = interval.tick() => {
                    let healthy = probe_ledger.is_healthy().await;
                    if !healthy {
                        warn!("Ledger storage probe failed");
                    }
                    probe_health.set_ledger_healthy(healthy);
                }
            }
        }
    });

    // ── 8. JSON API ─────────────────────────────────────────
    let state = ApiState::new(
        Arc::clone(&ledger),
        Arc::clone(&quotes),
        config.ledger.initial_cash,
        metrics,
    );
    let api_rx = shutdown_tx.subscribe();
    let api_bind = config.api.bind_address.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = api::serve(state, api_bind, api_rx).await {
            error!(error = %e, "API server failed");
        }
    });

    info!("All tasks spawned, ledger is serving");

    // ── 9. Wait for SIGINT ──────────────────────────────────
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for SIGINT");
    }
    info!("SIGINT received, initiating graceful shutdown");

    // Readiness probe → 503 before the listeners stop
    health.begin_shutdown();
    let _ = shutdown_tx.send(());

    // In-flight trades finish inside their own commit tasks
    if tokio::time::timeout(Duration::from_secs(10), api_handle)
        .await
        .is_err()
    {
        warn!("API server did not drain within 10s");
    }
    let _ = tokio::time::timeout(Duration::from_secs(2), probe_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(2), health_handle).await;

    info!("Shutdown complete");
    Ok(())
}
