//! Quote Adapters - Price Sources for the QuoteProvider Port
//!
//! The real market-data integration lives outside this crate. The
//! `QuoteBook` adapter serves a price table seeded from configuration,
//! which is what the simulator and the tests trade against.

pub mod quote_book;

pub use quote_book::QuoteBook;
