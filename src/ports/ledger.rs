//! Ledger Store Port - Durable Account Interface
//!
//! Defines the only way callers may read or change cash, holdings and
//! transaction history. Every mutation goes through `apply_trade`, which
//! is one atomic unit per call.
//!
//! Key guarantees:
//! - Trades for the same user are serialised; trades for different
//!   users never wait on each other
//! - A trade is fully applied or not applied at all, and readers never
//!   observe a half-applied trade
//! - Transactions are append-only

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::account::Account;
use crate::domain::trade::{Holding, Symbol, Transaction, UserId};
use crate::error::LedgerError;

/// Result of a committed trade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedTrade {
  /// The transaction row appended to the history.
  pub transaction: Transaction,
  /// Cash balance after the trade.
  pub cash_after: Decimal,
  /// Shares of the traded symbol held after the trade (0 = holding removed).
  pub holding_after: u64,
}

/// Trait for ledger storage providers.
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
  /// Register a new account with its starting cash.
  ///
  /// # Errors
  /// `DuplicateUser` if the account already exists, `InvalidAmount`
  /// if `initial_cash` is negative.
  async fn open_account(
    &self,
    user: UserId,
    initial_cash: Decimal,
  ) -> Result<Account, LedgerError>;

  /// Current cash balance.
  async fn cash(&self, user: UserId) -> Result<Decimal, LedgerError>;

  /// Shares held of one symbol, `None` when nothing is held.
  async fn holding(
    &self,
    user: UserId,
    symbol: &Symbol,
  ) -> Result<Option<u64>, LedgerError>;

  /// Validate and apply one trade atomically.
  ///
  /// Cash and holding are re-read under the user's lock. Positive
  /// `quantity_delta` buys, negative sells.
  ///
  /// # Errors
  /// `InsufficientFunds` / `InsufficientShares` leave the account and
  /// history untouched. `Conflict` means the account stayed locked
  /// past the bounded retry budget.
  async fn apply_trade(
    &self,
    user: UserId,
    symbol: &Symbol,
    quantity_delta: i64,
    price: Decimal,
    executed_at: DateTime<Utc>,
  ) -> Result<AppliedTrade, LedgerError>;

  /// All holdings of a user (order is not significant).
  async fn holdings(&self, user: UserId) -> Result<Vec<Holding>, LedgerError>;

  /// Transaction history ordered by execution time, oldest first.
  async fn history(&self, user: UserId) -> Result<Vec<Transaction>, LedgerError>;

  /// One committed snapshot of cash and holdings together.
  async fn account(&self, user: UserId) -> Result<Account, LedgerError>;

  /// Check if the store can accept writes.
  async fn is_healthy(&self) -> bool;
}
