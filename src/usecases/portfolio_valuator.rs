//! Portfolio Valuator - Net Worth Snapshot
//!
//! Reads one committed account snapshot, prices every holding at the
//! current quote and sums cash plus market value. Lookups run
//! concurrently and are not atomic across symbols: the result is a
//! best-effort picture at roughly one point in time.
//!
//! A holding whose symbol no longer resolves is reported on its row as
//! `QuoteUnavailable`; the caller decides whether to omit it
//! (`net_worth`) or abort (`complete_net_worth`).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use crate::domain::trade::{Holding, Symbol, UserId};
use crate::error::{LedgerError, QuoteUnavailable};
use crate::ports::ledger::LedgerStore;
use crate::ports::metrics::MetricsSink;
use crate::ports::quotes::QuoteProvider;

/// A holding priced at the current quote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedPosition {
  /// Instrument name.
  pub name: String,
  /// Current price per share.
  pub price: Decimal,
  /// `quantity × price`.
  pub market_value: Decimal,
}

/// One holding line of a valuation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionRow {
  pub symbol: Symbol,
  pub quantity: u64,
  /// Pricing result for this row only.
  pub priced: Result<PricedPosition, QuoteUnavailable>,
}

/// Snapshot of a user's net worth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Valuation {
  pub user_id: UserId,
  /// Cash at the time of the account snapshot.
  pub cash: Decimal,
  /// One row per holding, in symbol order.
  pub rows: Vec<PositionRow>,
  /// When pricing finished.
  pub valued_at: DateTime<Utc>,
  holdings_value: Decimal,
  net_worth: Decimal,
}

impl Valuation {
  /// Total the priced rows on top of `cash`.
  ///
  /// A row whose market value would push the total past the `Decimal`
  /// range is reported as unavailable instead of being added.
  pub fn new(
    user_id: UserId,
    cash: Decimal,
    mut rows: Vec<PositionRow>,
    valued_at: DateTime<Utc>,
  ) -> Self {
    let mut holdings_value = Decimal::ZERO;
    let mut net_worth = cash;

    for row in &mut rows {
      let Ok(priced) = &row.priced else { continue };
      match (
        holdings_value.checked_add(priced.market_value),
        net_worth.checked_add(priced.market_value),
      ) {
        (Some(holdings), Some(total)) => {
          holdings_value = holdings;
          net_worth = total;
        }
        _ => {
          warn!(symbol = %row.symbol, "Portfolio total overflow");
          row.priced = Err(QuoteUnavailable {
            symbol: row.symbol.clone(),
            reason: "portfolio total overflow".to_string(),
          });
        }
      }
    }

    Self {
      user_id,
      cash,
      rows,
      valued_at,
      holdings_value,
      net_worth,
    }
  }

  /// Market value of all rows that could be priced.
  pub const fn holdings_value(&self) -> Decimal {
    self.holdings_value
  }

  /// Cash plus every priced holding; unpriced rows are left out.
  pub const fn net_worth(&self) -> Decimal {
    self.net_worth
  }

  /// Rows that could not be priced.
  pub fn unavailable(&self) -> impl Iterator<Item = &QuoteUnavailable> {
    self.rows.iter().filter_map(|row| row.priced.as_ref().err())
  }

  pub fn is_complete(&self) -> bool {
    self.unavailable().next().is_none()
  }

  /// Net worth, failing on the first row that could not be priced.
  pub fn complete_net_worth(&self) -> Result<Decimal, QuoteUnavailable> {
    match self.unavailable().next() {
      Some(missing) => Err(missing.clone()),
      None => Ok(self.net_worth),
    }
  }
}

/// Computes net-worth snapshots from the ledger and quote ports.
pub struct PortfolioValuator<L: LedgerStore, Q: QuoteProvider> {
  ledger: Arc<L>,
  quotes: Arc<Q>,
  metrics: Option<Arc<dyn MetricsSink>>,
}

impl<L: LedgerStore, Q: QuoteProvider> PortfolioValuator<L, Q> {
  pub const fn new(ledger: Arc<L>, quotes: Arc<Q>) -> Self {
    Self {
      ledger,
      quotes,
      metrics: None,
    }
  }

  #[must_use]
  pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
    self.metrics = Some(metrics);
    self
  }

  /// Value a user's portfolio.
  ///
  /// # Errors
  /// Only ledger failures (unknown user, storage, conflict) fail the
  /// whole valuation; quote failures are reported per row.
  #[instrument(skip_all, fields(user = %user))]
  pub async fn valuate(&self, user: UserId) -> Result<Valuation, LedgerError> {
    let account = match self.ledger.account(user).await {
      Ok(account) => account,
      Err(e) => {
        self.record("failed");
        return Err(e);
      }
    };

    let holdings = account.holdings();
    let rows = join_all(holdings.iter().map(|h| self.price_row(h))).await;

    let valuation = Valuation::new(user, account.cash, rows, Utc::now());

    let missing = valuation.unavailable().count();
    self.record(if missing == 0 { "complete" } else { "partial" });
    info!(
      positions = valuation.rows.len(),
      unavailable = missing,
      cash = %valuation.cash,
      net_worth = %valuation.net_worth(),
      "Portfolio valued"
    );

    Ok(valuation)
  }

  async fn price_row(&self, holding: &Holding) -> PositionRow {
    let unavailable = |reason: String| QuoteUnavailable {
      symbol: holding.symbol.clone(),
      reason,
    };

    let priced = match self.quotes.lookup(&holding.symbol).await {
      Ok(Some(quote)) => Decimal::from(holding.quantity)
        .checked_mul(quote.price)
        .map(|market_value| PricedPosition {
          name: quote.name,
          price: quote.price,
          market_value,
        })
        .ok_or_else(|| unavailable("market value overflow".to_string())),
      Ok(None) => Err(unavailable("symbol is no longer listed".to_string())),
      Err(e) => Err(unavailable(format!("{e:#}"))),
    };

    if let Err(missing) = &priced {
      warn!(symbol = %missing.symbol, reason = %missing.reason, "Holding could not be priced");
    }

    PositionRow {
      symbol: holding.symbol.clone(),
      quantity: holding.quantity,
      priced,
    }
  }

  fn record(&self, outcome: &str) {
    if let Some(metrics) = &self.metrics {
      metrics.record_valuation(outcome);
    }
  }
}
