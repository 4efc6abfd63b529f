//! API Request/Response Types
//!
//! Defines the JSON bodies exchanged with API clients. Money is
//! serialized as decimal strings so no precision is lost in transit.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::trade::{Symbol, TradeRequest, TradeSide, Transaction, UserId};
use crate::error::TradeError;
use crate::usecases::{TradeReceipt, Valuation};

/// Share count as sent by a client: a JSON number or a string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ShareInput {
  Count(i64),
  Text(String),
  /// Anything else (fractions, booleans, null).
  Other(serde_json::Value),
}

/// Body of `POST /buy` and `POST /sell`.
#[derive(Debug, Clone, Deserialize)]
pub struct TradeForm {
  pub symbol: String,
  pub shares: ShareInput,
}

impl TradeForm {
  /// Validate into a trade request. Share errors win over symbol errors.
  pub fn into_request(self) -> Result<TradeRequest, TradeError> {
    match self.shares {
      ShareInput::Count(n) => TradeRequest::new(&self.symbol, n),
      ShareInput::Text(s) => TradeRequest::parse(&self.symbol, &s),
      ShareInput::Other(_) => Err(TradeError::InvalidShares),
    }
  }
}

/// Response of `POST /users`.
#[derive(Debug, Clone, Serialize)]
pub struct RegisteredUser {
  pub user_id: UserId,
  pub cash: Decimal,
}

/// Response of `POST /buy` and `POST /sell`.
#[derive(Debug, Clone, Serialize)]
pub struct ReceiptView {
  pub transaction_id: Uuid,
  pub seq: u64,
  pub side: TradeSide,
  pub symbol: Symbol,
  pub name: String,
  pub shares: u64,
  pub price: Decimal,
  /// `shares × price`.
  pub total: Decimal,
  pub cash_after: Decimal,
  pub holding_after: u64,
  pub executed_at: DateTime<Utc>,
}

impl From<TradeReceipt> for ReceiptView {
  fn from(receipt: TradeReceipt) -> Self {
    let tx = receipt.transaction;
    let shares = tx.quantity_delta.unsigned_abs();
    Self {
      transaction_id: tx.id,
      seq: tx.seq,
      side: tx.side(),
      total: tx.cash_delta().abs(),
      symbol: tx.symbol,
      name: receipt.name,
      shares,
      price: tx.price,
      cash_after: receipt.cash_after,
      holding_after: receipt.holding_after,
      executed_at: tx.executed_at,
    }
  }
}

/// A priced line of `GET /portfolio`.
#[derive(Debug, Clone, Serialize)]
pub struct PositionView {
  pub symbol: Symbol,
  pub name: String,
  pub shares: u64,
  pub price: Decimal,
  pub market_value: Decimal,
}

/// A holding that could not be priced.
#[derive(Debug, Clone, Serialize)]
pub struct UnpricedView {
  pub symbol: Symbol,
  pub shares: u64,
  pub reason: String,
}

/// Response of `GET /portfolio`.
#[derive(Debug, Clone, Serialize)]
pub struct PortfolioView {
  pub user_id: UserId,
  pub cash: Decimal,
  pub positions: Vec<PositionView>,
  pub unavailable: Vec<UnpricedView>,
  pub holdings_value: Decimal,
  /// Cash plus priced positions; unpriced rows are excluded.
  pub net_worth: Decimal,
  pub complete: bool,
  pub valued_at: DateTime<Utc>,
}

impl From<Valuation> for PortfolioView {
  fn from(valuation: Valuation) -> Self {
    let holdings_value = valuation.holdings_value();
    let net_worth = valuation.net_worth();
    let complete = valuation.is_complete();

    let mut positions = Vec::new();
    let mut unavailable = Vec::new();
    for row in valuation.rows {
      match row.priced {
        Ok(p) => positions.push(PositionView {
          symbol: row.symbol,
          name: p.name,
          shares: row.quantity,
          price: p.price,
          market_value: p.market_value,
        }),
        Err(missing) => unavailable.push(UnpricedView {
          symbol: row.symbol,
          shares: row.quantity,
          reason: missing.reason,
        }),
      }
    }

    Self {
      user_id: valuation.user_id,
      cash: valuation.cash,
      positions,
      unavailable,
      holdings_value,
      net_worth,
      complete,
      valued_at: valuation.valued_at,
    }
  }
}

/// Response of `GET /history`.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryView {
  pub user_id: UserId,
  pub transactions: Vec<Transaction>,
}

/// Error body for every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
  /// Stable machine-readable code.
  pub error: String,
  /// Human-readable message.
  pub message: String,
}
