//! Domain layer - Core business logic and models.
//!
//! This module contains the pure account rules of the stock ledger.
//! No I/O here (hexagonal architecture inner ring).
//! All types are serializable and testable in isolation.

pub mod account;
pub mod trade;

// Re-export core types for convenience
pub use account::{Account, TradeEffect};
pub use trade::{Holding, Quote, Symbol, TradeRequest, TradeSide, Transaction, UserId};
