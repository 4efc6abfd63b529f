//! Trade Engine - Validated Buy/Sell Execution
//!
//! Turns a buy or sell intent into exactly one atomic ledger call:
//! - Validates the share count and symbol
//! - Prices the trade with a single quote lookup
//! - Applies the trade through the LedgerStore port
//! - Counts and times every outcome
//!
//! The price is read once before the ledger's atomic unit and is not
//! re-checked inside it. The transaction records the price actually
//! charged, so the ledger stays self-consistent.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};

use crate::domain::trade::{Quote, Symbol, TradeRequest, TradeSide, Transaction, UserId};
use crate::error::TradeError;
use crate::ports::ledger::LedgerStore;
use crate::ports::metrics::MetricsSink;
use crate::ports::quotes::QuoteProvider;

/// Result of a successful trade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeReceipt {
  /// The appended history row.
  pub transaction: Transaction,
  /// Instrument name from the quote used for pricing.
  pub name: String,
  /// Cash balance after the trade.
  pub cash_after: Decimal,
  /// Shares held after the trade (0 = holding removed).
  pub holding_after: u64,
}

/// Executes buy and sell requests against the ledger.
pub struct TradeEngine<L: LedgerStore, Q: QuoteProvider> {
  /// Ledger port.
  ledger: Arc<L>,
  /// Quote port.
  quotes: Arc<Q>,
  /// Optional outcome counters.
  metrics: Option<Arc<dyn MetricsSink>>,
}

impl<L: LedgerStore, Q: QuoteProvider> TradeEngine<L, Q> {
  /// Create a new trade engine.
  pub const fn new(ledger: Arc<L>, quotes: Arc<Q>) -> Self {
    Self {
      ledger,
      quotes,
      metrics: None,
    }
  }

  /// Attach a metrics sink.
  #[must_use]
  pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
    self.metrics = Some(metrics);
    self
  }

  /// Look up the current quote for user input.
  pub async fn quote(&self, symbol: &str) -> Result<Quote, TradeError> {
    let parsed = Symbol::parse(symbol)
      .ok_or_else(|| TradeError::UnknownSymbol(symbol.trim().to_string()))?;
    self.resolve(&parsed).await
  }

  /// Buy `shares` of `symbol` at the current quote.
  pub async fn buy(
    &self,
    user: UserId,
    symbol: &str,
    shares: i64,
  ) -> Result<TradeReceipt, TradeError> {
    let request = TradeRequest::new(symbol, shares)?;
    self.execute(user, TradeSide::Buy, &request).await
  }

  /// Sell `shares` of `symbol` at the current quote.
  pub async fn sell(
    &self,
    user: UserId,
    symbol: &str,
    shares: i64,
  ) -> Result<TradeReceipt, TradeError> {
    let request = TradeRequest::new(symbol, shares)?;
    self.execute(user, TradeSide::Sell, &request).await
  }

  /// Execute an already validated request.
  ///
  /// Business rejections (`InsufficientFunds`, `InsufficientShares`)
  /// are returned as-is and never retried.
  #[instrument(
    skip_all,
    fields(user = %user, side = %side, symbol = %request.symbol, shares = request.shares)
  )]
  pub async fn execute(
    &self,
    user: UserId,
    side: TradeSide,
    request: &TradeRequest,
  ) -> Result<TradeReceipt, TradeError> {
    let started = Instant::now();
    let result = self.price_and_apply(user, side, request).await;
    self.record_outcome(side, &result, started);
    result
  }

  async fn price_and_apply(
    &self,
    user: UserId,
    side: TradeSide,
    request: &TradeRequest,
  ) -> Result<TradeReceipt, TradeError> {
    let quote = self.resolve(&request.symbol).await?;

    let applied = self
      .ledger
      .apply_trade(
        user,
        &request.symbol,
        side.signed(request.shares),
        quote.price,
        Utc::now(),
      )
      .await?;

    info!(
      seq = applied.transaction.seq,
      price = %quote.price,
      cash_after = %applied.cash_after,
      holding_after = applied.holding_after,
      "Trade executed"
    );

    Ok(TradeReceipt {
      transaction: applied.transaction,
      name: quote.name,
      cash_after: applied.cash_after,
      holding_after: applied.holding_after,
    })
  }

  /// Resolve a symbol through the quote port.
  async fn resolve(&self, symbol: &Symbol) -> Result<Quote, TradeError> {
    let outcome = self.quotes.lookup(symbol).await;

    let label = match &outcome {
      Ok(Some(_)) => "hit",
      Ok(None) => "miss",
      Err(_) => "error",
    };
    if let Some(metrics) = &self.metrics {
      metrics.record_quote_lookup(label);
    }

    match outcome {
      Ok(Some(quote)) => Ok(quote),
      Ok(None) => {
        debug!(symbol = %symbol, "Symbol not found");
        Err(TradeError::UnknownSymbol(symbol.to_string()))
      }
      Err(e) => {
        warn!(symbol = %symbol, error = %e, "Quote lookup failed");
        Err(TradeError::QuoteService(e))
      }
    }
  }

  fn record_outcome(
    &self,
    side: TradeSide,
    result: &Result<TradeReceipt, TradeError>,
    started: Instant,
  ) {
    let outcome = match result {
      Ok(_) => "ok",
      Err(e) => {
        debug!(error = %e, code = e.code(), "Trade not executed");
        e.code()
      }
    };

    if let Some(metrics) = &self.metrics {
      metrics.record_trade(side, outcome, started.elapsed());
    }
  }
}
