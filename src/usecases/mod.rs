//! Use Cases Layer - Application Business Logic
//!
//! Orchestrates domain logic with port interfaces to implement
//! the ledger's workflows. Each use case is a self-contained
//! business operation.
//!
//! Use cases:
//! - `TradeEngine`: Validated buy/sell execution
//! - `PortfolioValuator`: Cash + market value snapshot

pub mod portfolio_valuator;
pub mod trade_engine;

pub use portfolio_valuator::{PortfolioValuator, PositionRow, PricedPosition, Valuation};
pub use trade_engine::{TradeEngine, TradeReceipt};
