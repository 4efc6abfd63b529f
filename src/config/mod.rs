//! Configuration Module - TOML-based Service Configuration
//!
//! Loads and validates configuration from `config.toml`. Ledger
//! tuning, listen addresses and the simulator's quote table are all
//! externalized here - nothing is hardcoded in the domain layer.

pub mod loader;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

/// Top-level service configuration.
///
/// Loaded from `config.toml` at startup. All fields are validated
/// before the service begins accepting requests.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Service identity and logging.
  pub service: ServiceConfig,
  /// Ledger storage and locking.
  #[serde(default)]
  pub ledger: LedgerConfig,
  /// JSON API listener.
  #[serde(default)]
  pub api: ApiConfig,
  /// Metrics and monitoring.
  #[serde(default)]
  pub metrics: MetricsConfig,
  /// Quote table served by the built-in quote book.
  #[serde(default)]
  pub quotes: Vec<QuoteConfig>,
}

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
  /// Human-readable service name.
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
}

/// Ledger store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
  /// Directory holding `accounts/<user_id>.jsonl` journals.
  #[serde(default = "default_data_dir")]
  pub data_dir: String,
  /// Cash credited to every newly registered account.
  #[serde(default = "default_initial_cash")]
  pub initial_cash: Decimal,
  /// Sync every journal append to disk.
  #[serde(default = "default_true")]
  pub fsync: bool,
  /// Maximum wait for an account lock per attempt (milliseconds).
  #[serde(default = "default_lock_timeout")]
  pub lock_timeout_ms: u64,
  /// Retries after a lock timeout before reporting a conflict.
  #[serde(default = "default_conflict_retries")]
  pub max_conflict_retries: u32,
  /// Base backoff between lock attempts (milliseconds).
  #[serde(default = "default_retry_delay")]
  pub retry_base_delay_ms: u64,
}

impl Default for LedgerConfig {
  fn default() -> Self {
    Self {
      data_dir: default_data_dir(),
      initial_cash: default_initial_cash(),
      fsync: true,
      lock_timeout_ms: default_lock_timeout(),
      max_conflict_retries: default_conflict_retries(),
      retry_base_delay_ms: default_retry_delay(),
    }
  }
}

/// JSON API configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// API bind address.
  #[serde(default = "default_api_addr")]
  pub bind_address: String,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      bind_address: default_api_addr(),
    }
  }
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
  /// Enable Prometheus metrics export.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Metrics server bind address.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
  /// Health check endpoint port.
  #[serde(default = "default_health_port")]
  pub health_port: u16,
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      bind_address: default_metrics_addr(),
      health_port: default_health_port(),
    }
  }
}

/// One listed instrument in the quote book.
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteConfig {
  /// Ticker symbol (case-insensitive).
  pub symbol: String,
  /// Company name.
  pub name: String,
  /// Price per share.
  pub price: Decimal,
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

fn default_true() -> bool {
  true
}

fn default_data_dir() -> String {
  "data".to_string()
}

fn default_initial_cash() -> Decimal {
  dec!(10000.00)
}

fn default_lock_timeout() -> u64 {
  2_000
}

fn default_conflict_retries() -> u32 {
  3
}

fn default_retry_delay() -> u64 {
  50
}

fn default_api_addr() -> String {
  "0.0.0.0:8000".to_string()
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}

fn default_health_port() -> u16 {
  8080
}
