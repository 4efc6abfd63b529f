//! Error taxonomy for the ledger core.
//!
//! Business-rule rejections are ordinary values: callers match on them and
//! show them to the user. Only storage failures and exhausted lock retries
//! are operational problems.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::trade::{Symbol, UserId};

/// Failures raised by a ledger store.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("unknown user {0}")]
    UnknownUser(UserId),

    #[error("user {0} already has an account")]
    DuplicateUser(UserId),

    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Decimal, available: Decimal },

    #[error("insufficient shares of {symbol}: requested {requested}, held {held}")]
    InsufficientShares {
        symbol: Symbol,
        requested: u64,
        held: u64,
    },

    #[error("invalid quantity delta {0}")]
    InvalidQuantity(i64),

    #[error("invalid price {0}")]
    InvalidPrice(Decimal),

    #[error("invalid cash amount {0}")]
    InvalidAmount(Decimal),

    #[error("account {user} is busy: lock not acquired after {attempts} attempts")]
    Conflict { user: UserId, attempts: u32 },

    #[error("ledger journal I/O failed: {0}")]
    Storage(#[from] std::io::Error),

    #[error("ledger record encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("ledger commit task aborted: {0}")]
    Aborted(String),
}

impl LedgerError {
    /// Business-rule rejection (terminal for this attempt, shown to the user).
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InsufficientFunds { .. }
                | Self::InsufficientShares { .. }
                | Self::InvalidQuantity(_)
                | Self::InvalidPrice(_)
                | Self::InvalidAmount(_)
        )
    }
}

/// Failures of a buy, sell or quote request.
#[derive(Debug, Error)]
pub enum TradeError {
    #[error("shares must be a positive whole number")]
    InvalidShares,

    #[error("unknown symbol {0:?}")]
    UnknownSymbol(String),

    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Decimal, available: Decimal },

    #[error("insufficient shares of {symbol}: requested {requested}, held {held}")]
    InsufficientShares {
        symbol: Symbol,
        requested: u64,
        held: u64,
    },

    #[error("unknown user {0}")]
    UnknownUser(UserId),

    #[error("account {user} is busy, try again ({attempts} attempts)")]
    Conflict { user: UserId, attempts: u32 },

    #[error("quote service failed: {0:#}")]
    QuoteService(anyhow::Error),

    #[error(transparent)]
    Ledger(LedgerError),
}

impl TradeError {
    /// Transient failures worth retrying by the caller.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::QuoteService(_))
    }

    /// Stable machine-readable code used by the HTTP layer and metrics.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidShares => "invalid_shares",
            Self::UnknownSymbol(_) => "unknown_symbol",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::InsufficientShares { .. } => "insufficient_shares",
            Self::UnknownUser(_) => "unknown_user",
            Self::Conflict { .. } => "conflict",
            Self::QuoteService(_) => "quote_service",
            Self::Ledger(_) => "ledger",
        }
    }
}

impl From<LedgerError> for TradeError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientFunds {
                required,
                available,
            } => Self::InsufficientFunds {
                required,
                available,
            },
            LedgerError::InsufficientShares {
                symbol,
                requested,
                held,
            } => Self::InsufficientShares {
                symbol,
                requested,
                held,
            },
            LedgerError::UnknownUser(user) => Self::UnknownUser(user),
            LedgerError::Conflict { user, attempts } => Self::Conflict { user, attempts },
            LedgerError::InvalidQuantity(_) => Self::InvalidShares,
            other => Self::Ledger(other),
        }
    }
}

/// A held symbol that could not be priced during valuation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("quote unavailable for {symbol}: {reason}")]
pub struct QuoteUnavailable {
    pub symbol: Symbol,
    pub reason: String,
}
