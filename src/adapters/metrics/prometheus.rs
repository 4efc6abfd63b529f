//! Prometheus Metrics Registry - Ledger Observability
//!
//! Registers and exposes Prometheus metrics on :9090 for Grafana
//! dashboards. Covers trade outcomes and latency, quote lookups,
//! account registrations and valuation completeness.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts,
    Registry, TextEncoder,
};
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use crate::domain::trade::TradeSide;
use crate::ports::metrics::MetricsSink;

/// Centralized Prometheus metrics for the ledger service.
///
/// All metrics follow the naming convention `stock_ledger_*`.
pub struct MetricsRegistry {
    /// Prometheus registry.
    registry: Registry,
    /// Trade attempts by side and outcome code.
    pub trades: IntCounterVec,
    /// End-to-end trade latency histogram (microseconds).
    pub trade_latency_us: HistogramVec,
    /// Quote lookups by outcome (hit, miss, error).
    pub quote_lookups: IntCounterVec,
    /// Accounts registered since startup.
    pub accounts_opened: IntCounter,
    /// Valuations by outcome (complete, partial, failed).
    pub valuations: IntCounterVec,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let trades = IntCounterVec::new(
            Opts::new("stock_ledger_trades_total", "Trade attempts by outcome"),
            &["side", "outcome"],
        )?;

        let trade_latency_us = HistogramVec::new(
            HistogramOpts::new(
                "stock_ledger_trade_latency_us",
                "Trade latency from quote lookup to commit in microseconds",
            )
            .buckets(vec![
                50.0, 100.0, 500.0, 1000.0, 5000.0, 10000.0, 50000.0, 250000.0,
            ]),
            &["side"],
        )?;

        let quote_lookups = IntCounterVec::new(
            Opts::new("stock_ledger_quote_lookups_total", "Quote lookups by outcome"),
            &["outcome"],
        )?;

        let accounts_opened = IntCounter::new(
            "stock_ledger_accounts_opened_total",
            "Accounts registered since startup",
        )?;

        let valuations = IntCounterVec::new(
            Opts::new(
                "stock_ledger_valuations_total",
                "Portfolio valuations by completeness",
            ),
            &["outcome"],
        )?;

        // Register all metrics
        registry.register(Box::new(trades.clone()))?;
        registry.register(Box::new(trade_latency_us.clone()))?;
        registry.register(Box::new(quote_lookups.clone()))?;
        registry.register(Box::new(accounts_opened.clone()))?;
        registry.register(Box::new(valuations.clone()))?;

        Ok(Self {
            registry,
            trades,
            trade_latency_us,
            quote_lookups,
            accounts_opened,
            valuations,
        })
    }

    /// Encode all metrics in the Prometheus text format.
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Serve Prometheus metrics on the configured bind address.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn serve(
        self: Arc<Self>,
        bind_address: String,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let metrics_self = Arc::clone(&self);

        let app = Router::new().route(
            "/metrics",
            get(move || {
                let metrics = Arc::clone(&metrics_self);
                async move {
                    match metrics.render() {
                        Ok(body) => (StatusCode::OK, body),
                        Err(e) => {
                            warn!(error = %e, "Failed to encode metrics");
                            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
                        }
                    }
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "Prometheus metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }
}

impl MetricsSink for MetricsRegistry {
    fn record_trade(&self, side: TradeSide, outcome: &str, elapsed: Duration) {
        self.trades
            .with_label_values(&[side.as_str(), outcome])
            .inc();
        self.trade_latency_us
            .with_label_values(&[side.as_str()])
            .observe(elapsed.as_secs_f64() * 1_000_000.0);
    }

    fn record_quote_lookup(&self, outcome: &str) {
        self.quote_lookups.with_label_values(&[outcome]).inc();
    }

    fn record_valuation(&self, outcome: &str) {
        self.valuations.with_label_values(&[outcome]).inc();
    }
}
