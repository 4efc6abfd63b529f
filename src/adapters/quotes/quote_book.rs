//! Quote Book - In-process Price Table
//!
//! Holds the latest quote per symbol behind a read-mostly lock. Prices
//! are loaded from `[[quotes]]` entries in config.toml and may be moved
//! at runtime (`set_quote` / `remove`), which lets the simulator and the
//! tests reproduce price changes and delisted symbols.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::QuoteConfig;
use crate::domain::trade::{Quote, Symbol};
use crate::ports::quotes::QuoteProvider;

/// Static, mutable quote table.
#[derive(Debug, Default)]
pub struct QuoteBook {
    quotes: RwLock<HashMap<Symbol, Quote>>,
}

impl QuoteBook {
    /// Create an empty quote book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a quote book from configuration entries.
    ///
    /// Entries with an unparsable symbol or a non-positive price are
    /// skipped with a warning.
    pub fn from_config(entries: &[QuoteConfig]) -> Self {
        let mut quotes = HashMap::with_capacity(entries.len());
        for entry in entries {
            let Some(symbol) = Symbol::parse(&entry.symbol) else {
                warn!(symbol = %entry.symbol, "Skipping quote with invalid symbol");
                continue;
            };
            if entry.price <= Decimal::ZERO {
                warn!(symbol = %symbol, price = %entry.price, "Skipping quote with non-positive price");
                continue;
            }
            quotes.insert(
                symbol.clone(),
                Quote {
                    symbol,
                    name: entry.name.clone(),
                    price: entry.price,
                },
            );
        }
        info!(symbols = quotes.len(), "Quote book loaded");
        Self {
            quotes: RwLock::new(quotes),
        }
    }

    /// Insert or replace the quote for a symbol.
    ///
    /// A non-positive price is ignored and returns false.
    pub async fn set_quote(&self, symbol: Symbol, name: &str, price: Decimal) -> bool {
        if price <= Decimal::ZERO {
            warn!(symbol = %symbol, price = %price, "Ignoring non-positive quote");
            return false;
        }
        debug!(symbol = %symbol, price = %price, "Quote updated");
        self.quotes.write().await.insert(
            symbol.clone(),
            Quote {
                symbol,
                name: name.to_string(),
                price,
            },
        );
        true
    }

    /// Move the price of an already listed symbol.
    ///
    /// Returns false if the symbol is unknown or the price is not positive.
    pub async fn set_price(&self, symbol: &Symbol, price: Decimal) -> bool {
        if price <= Decimal::ZERO {
            warn!(symbol = %symbol, price = %price, "Ignoring non-positive price");
            return false;
        }
        match self.quotes.write().await.get_mut(symbol) {
            Some(quote) => {
                quote.price = price;
                true
            }
            None => false,
        }
    }

    /// Delist a symbol; later lookups report it as not found.
    pub async fn remove(&self, symbol: &Symbol) -> Option<Quote> {
        self.quotes.write().await.remove(symbol)
    }

    pub async fn len(&self) -> usize {
        self.quotes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.quotes.read().await.is_empty()
    }
}

#[async_trait]
impl QuoteProvider for QuoteBook {
    async fn lookup(&self, symbol: &Symbol) -> Result<Option<Quote>> {
        Ok(self.quotes.read().await.get(symbol).cloned())
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn entry(symbol: &str, price: Decimal) -> QuoteConfig {
        QuoteConfig {
            symbol: symbol.to_string(),
            name: format!("{symbol} Inc."),
            price,
        }
    }

    #[tokio::test]
    async fn test_lookup_is_case_insensitive() {
        let book = QuoteBook::from_config(&[entry("nflx", dec!(401.20))]);
        let quote = book
            .lookup(&Symbol::parse("NfLx").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(quote.symbol.as_str(), "NFLX");
        assert_eq!(quote.price, dec!(401.20));
    }

    #[tokio::test]
    async fn test_invalid_entries_skipped() {
        let book = QuoteBook::from_config(&[
            entry("OK", dec!(1)),
            entry("BAD SYMBOL", dec!(1)),
            entry("FREE", dec!(0)),
        ]);
        assert_eq!(book.len().await, 1);
    }

    #[tokio::test]
    async fn test_price_moves_and_delisting() {
        let book = QuoteBook::new();
        let symbol = Symbol::parse("AAPL").unwrap();
        assert!(!book.set_price(&symbol, dec!(2)).await);

        book.set_quote(symbol.clone(), "Apple Inc.", dec!(50)).await;
        assert!(book.set_price(&symbol, dec!(60)).await);
        assert_eq!(
            book.lookup(&symbol).await.unwrap().unwrap().price,
            dec!(60)
        );

        book.remove(&symbol).await;
        assert!(book.lookup(&symbol).await.unwrap().is_none());
        assert!(book.is_empty().await);
    }

    #[tokio::test]
    async fn test_non_positive_prices_ignored() {
        let book = QuoteBook::new();
        let symbol = Symbol::parse("AAPL").unwrap();

        assert!(!book.set_quote(symbol.clone(), "Apple Inc.", dec!(0)).await);
        assert!(!book.set_quote(symbol.clone(), "Apple Inc.", dec!(-1)).await);
        assert!(book.lookup(&symbol).await.unwrap().is_none());

        assert!(book.set_quote(symbol.clone(), "Apple Inc.", dec!(50)).await);
        assert!(!book.set_price(&symbol, dec!(0)).await);
        assert!(!book.set_price(&symbol, dec!(-0.01)).await);
        assert_eq!(book.lookup(&symbol).await.unwrap().unwrap().price, dec!(50));
    }
}
