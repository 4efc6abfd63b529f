//! Core trading domain types.
//!
//! Defines the business entities shared by every layer: user identity,
//! ticker symbols, quotes, holdings, and the immutable transaction record.
//! These types are the foundation of the hexagonal architecture's inner ring.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TradeError;

// ────────────────────────────────────────────
// Identifiers
// ────────────────────────────────────────────

/// Opaque identifier of a registered user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    /// Generate a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Ticker symbol, normalised to upper case.
///
/// Matching against the quote provider is case-insensitive exact match,
/// so every symbol is upper-cased once at construction and compared
/// byte-for-byte afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Parse user input into a symbol.
    ///
    /// Returns `None` for blank input or input containing anything other
    /// than ASCII letters, digits, `.`, `-` or `^`.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        let valid = trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^'));
        valid.then(|| Self(trimmed.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Symbol {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid ticker symbol: {value:?}"))
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

// ────────────────────────────────────────────
// Market data
// ────────────────────────────────────────────

/// Current price of an instrument as reported by the quote provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Normalised ticker.
    pub symbol: Symbol,
    /// Company / instrument name.
    pub name: String,
    /// Price per share, always positive.
    pub price: Decimal,
}

// ────────────────────────────────────────────
// Ledger records
// ────────────────────────────────────────────

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    /// Signed quantity delta for `shares` in this direction.
    pub fn signed(self, shares: u32) -> i64 {
        match self {
            Self::Buy => i64::from(shares),
            Self::Sell => -i64::from(shares),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Shares of one symbol currently owned by a user. Quantity is never zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: Symbol,
    pub quantity: u64,
}

/// Immutable, append-only record of one executed trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction ID.
    pub id: Uuid,
    /// Per-user sequence number, gap-free and starting at 1.
    pub seq: u64,
    /// Owner of the account.
    pub user_id: UserId,
    /// Instrument traded.
    pub symbol: Symbol,
    /// Positive for a buy, negative for a sell. Never zero.
    pub quantity_delta: i64,
    /// Price per share at execution time.
    pub price: Decimal,
    /// Execution timestamp.
    pub executed_at: DateTime<Utc>,
}

impl Transaction {
    pub const fn side(&self) -> TradeSide {
        if self.quantity_delta > 0 {
            TradeSide::Buy
        } else {
            TradeSide::Sell
        }
    }

    /// Signed cash movement caused by this transaction (negative for a buy).
    pub fn cash_delta(&self) -> Decimal {
        -(Decimal::from(self.quantity_delta) * self.price)
    }
}

// ────────────────────────────────────────────
// Validated caller input
// ────────────────────────────────────────────

/// A buy/sell intent checked before it reaches the trade engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeRequest {
    pub symbol: Symbol,
    pub shares: u32,
}

impl TradeRequest {
    /// Build a request from an already-typed share count.
    ///
    /// One order is capped at `u32::MAX` shares.
    pub fn new(symbol: &str, shares: i64) -> Result<Self, TradeError> {
        let shares = u32::try_from(shares)
            .ok()
            .filter(|s| *s > 0)
            .ok_or(TradeError::InvalidShares)?;
        let symbol =
            Symbol::parse(symbol).ok_or_else(|| TradeError::UnknownSymbol(symbol.trim().to_string()))?;
        Ok(Self { symbol, shares })
    }

    /// Validate untyped form input.
    ///
    /// `shares` must be a plain positive integer (no sign, no fraction).
    pub fn parse(symbol: &str, shares: &str) -> Result<Self, TradeError> {
        let shares = shares.trim();
        if shares.is_empty() || !shares.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TradeError::InvalidShares);
        }
        let count: i64 = shares.parse().map_err(|_| TradeError::InvalidShares)?;
        Self::new(symbol, count)
    }
}
