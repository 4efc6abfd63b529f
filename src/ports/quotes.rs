//! Quote Port - Price Lookup Interface
//!
//! Defines the trait for resolving a ticker symbol to its current
//! price. The provider is an external collaborator: the ledger core
//! only needs `symbol → {name, price}` or "not found".

use async_trait::async_trait;

use crate::domain::trade::{Quote, Symbol};

/// Trait for quote providers.
///
/// Implementors match symbols case-insensitively (callers always pass a
/// normalised [`Symbol`]) and return prices strictly greater than zero.
#[async_trait]
pub trait QuoteProvider: Send + Sync + 'static {
  /// Look up the current quote for a symbol.
  ///
  /// Returns `Ok(None)` when the symbol is not known to the provider.
  ///
  /// # Errors
  /// Returns error if the provider itself could not be reached.
  async fn lookup(&self, symbol: &Symbol) -> anyhow::Result<Option<Quote>>;

  /// Check if the provider is able to serve quotes.
  async fn is_healthy(&self) -> bool;
}
