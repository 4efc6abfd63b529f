//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use tracing::info;

use super::AppConfig;
use crate::domain::trade::Symbol;

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "STOCK_LEDGER_CONFIG";

/// Config path from `STOCK_LEDGER_CONFIG`, defaulting to `config.toml`.
pub fn config_path() -> String {
  std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config.toml".to_string())
}

/// Load and validate configuration from a TOML file.
///
/// # Arguments
/// * `path` - Path to the config.toml file
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    data_dir = %config.ledger.data_dir,
    initial_cash = %config.ledger.initial_cash,
    quotes = config.quotes.len(),
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig =
    toml::from_str(content).with_context(|| "Failed to parse config.toml")?;
  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - Non-negative starting cash
/// - Bounded lock retry budget
/// - Well-formed, unique, positively priced quotes
fn validate_config(config: &AppConfig) -> Result<()> {
  anyhow::ensure!(
    !config.service.name.trim().is_empty(),
    "service.name must not be empty"
  );

  // Ledger validation
  anyhow::ensure!(
    !config.ledger.data_dir.trim().is_empty(),
    "ledger.data_dir must not be empty"
  );
  anyhow::ensure!(
    config.ledger.initial_cash >= Decimal::ZERO,
    "ledger.initial_cash must be non-negative, got {}",
    config.ledger.initial_cash
  );
  anyhow::ensure!(
    config.ledger.lock_timeout_ms > 0,
    "ledger.lock_timeout_ms must be positive"
  );
  anyhow::ensure!(
    config.ledger.max_conflict_retries <= 10,
    "ledger.max_conflict_retries must be in [0, 10], got {}",
    config.ledger.max_conflict_retries
  );

  // Quote validation
  let mut seen = HashSet::new();
  for (i, quote) in config.quotes.iter().enumerate() {
    let symbol = Symbol::parse(&quote.symbol)
      .with_context(|| format!("Quote {i} has invalid symbol {:?}", quote.symbol))?;
    anyhow::ensure!(
      quote.price > Decimal::ZERO,
      "Quote {} ({}) must have a positive price, got {}",
      i,
      symbol,
      quote.price
    );
    anyhow::ensure!(
      seen.insert(symbol.clone()),
      "Quote {} duplicates symbol {}",
      i,
      symbol
    );
  }

  // Listener validation
  anyhow::ensure!(
    !config.api.bind_address.is_empty(),
    "api.bind_address must not be empty"
  );

  Ok(())
}
