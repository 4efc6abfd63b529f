//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the domain/usecases layer
//! requires from the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `QuoteProvider`: Current price lookup by ticker symbol
//! - `LedgerStore`: Atomic cash / holdings / history persistence
//! - `MetricsSink`: Use-case outcome counters

pub mod ledger;
pub mod metrics;
pub mod quotes;

pub use ledger::{AppliedTrade, LedgerStore};
pub use metrics::MetricsSink;
pub use quotes::QuoteProvider;
