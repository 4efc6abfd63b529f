//! Account state machine - cash, holdings and trade validation.
//!
//! Pure, synchronous rules shared by every ledger store and by journal
//! replay. A trade is first checked against the current state, producing a
//! [`TradeEffect`] that describes the resulting balances; the store persists
//! the transaction and only then commits the effect. Nothing here performs
//! I/O or locking.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::trade::{Holding, Symbol, Transaction, UserId};
use crate::error::LedgerError;

/// Balances of one user at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub user_id: UserId,
    /// Spendable cash, never negative.
    pub cash: Decimal,
    /// Share count per symbol. Zero counts are removed, never stored.
    holdings: BTreeMap<Symbol, u64>,
    /// Sequence number the next transaction will carry.
    next_seq: u64,
    pub opened_at: DateTime<Utc>,
}

/// Outcome of a validated trade, not yet applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeEffect {
    pub symbol: Symbol,
    pub quantity_delta: i64,
    pub price: Decimal,
    /// Signed cost: positive for a buy, negative for a sell.
    pub cost: Decimal,
    pub cash_after: Decimal,
    /// Zero means the holding disappears.
    pub holding_after: u64,
    pub seq: u64,
}

impl Account {
    /// Open an account with a starting cash balance.
    pub fn open(
        user_id: UserId,
        initial_cash: Decimal,
        opened_at: DateTime<Utc>,
    ) -> Result<Self, LedgerError> {
        if initial_cash < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(initial_cash));
        }
        Ok(Self {
            user_id,
            cash: initial_cash,
            holdings: BTreeMap::new(),
            next_seq: 1,
            opened_at,
        })
    }

    /// Shares held of `symbol`, `None` when nothing is held.
    pub fn holding(&self, symbol: &Symbol) -> Option<u64> {
        self.holdings.get(symbol).copied()
    }

    /// All holdings in symbol order.
    pub fn holdings(&self) -> Vec<Holding> {
        self.holdings
            .iter()
            .map(|(symbol, quantity)| Holding {
                symbol: symbol.clone(),
                quantity: *quantity,
            })
            .collect()
    }

    pub const fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Validate a trade against the current balances.
    ///
    /// Buys need `cash >= quantity_delta * price`; sells need at least
    /// `|quantity_delta|` shares. The account is left untouched.
    pub fn check_trade(
        &self,
        symbol: &Symbol,
        quantity_delta: i64,
        price: Decimal,
    ) -> Result<TradeEffect, LedgerError> {
        if quantity_delta == 0 {
            return Err(LedgerError::InvalidQuantity(quantity_delta));
        }
        if price <= Decimal::ZERO {
            return Err(LedgerError::InvalidPrice(price));
        }

        let cost = Decimal::from(quantity_delta)
            .checked_mul(price)
            .ok_or(LedgerError::InvalidQuantity(quantity_delta))?;
        let held = self.holding(symbol).unwrap_or(0);

        let holding_after = if quantity_delta > 0 {
            if self.cash < cost {
                return Err(LedgerError::InsufficientFunds {
                    required: cost,
                    available: self.cash,
                });
            }
            held.checked_add(quantity_delta.unsigned_abs())
                .ok_or(LedgerError::InvalidQuantity(quantity_delta))?
        } else {
            let requested = quantity_delta.unsigned_abs();
            if held < requested {
                return Err(LedgerError::InsufficientShares {
                    symbol: symbol.clone(),
                    requested,
                    held,
                });
            }
            held - requested
        };

        let cash_after = self
            .cash
            .checked_sub(cost)
            .ok_or(LedgerError::InvalidQuantity(quantity_delta))?;

        Ok(TradeEffect {
            symbol: symbol.clone(),
            quantity_delta,
            price,
            cost,
            cash_after,
            holding_after,
            seq: self.next_seq,
        })
    }

    /// Apply an effect produced by [`Account::check_trade`] on this account.
    pub fn commit(&mut self, effect: &TradeEffect) {
        self.cash = effect.cash_after;
        if effect.holding_after == 0 {
            self.holdings.remove(&effect.symbol);
        } else {
            self.holdings
                .insert(effect.symbol.clone(), effect.holding_after);
        }
        self.next_seq = effect.seq + 1;
    }

    /// Re-apply a recorded transaction, enforcing the same rules as a live trade.
    pub fn apply_recorded(&mut self, tx: &Transaction) -> Result<TradeEffect, LedgerError> {
        let effect = self.check_trade(&tx.symbol, tx.quantity_delta, tx.price)?;
        if tx.seq != effect.seq {
            return Err(LedgerError::Aborted(format!(
                "transaction {} out of sequence: expected seq {}, found {}",
                tx.id, effect.seq, tx.seq
            )));
        }
        self.commit(&effect);
        Ok(effect)
    }

    /// Rebuild an account from its initial balance and ordered transaction log.
    pub fn replay<'a>(
        user_id: UserId,
        initial_cash: Decimal,
        opened_at: DateTime<Utc>,
        log: impl IntoIterator<Item = &'a Transaction>,
    ) -> Result<Self, LedgerError> {
        let mut account = Self::open(user_id, initial_cash, opened_at)?;
        for tx in log {
            account.apply_recorded(tx)?;
        }
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn sym(s: &str) -> Symbol {
        Symbol::parse(s).unwrap()
    }

    fn account(cash: Decimal) -> Account {
        Account::open(UserId::new(), cash, Utc::now()).unwrap()
    }

    fn apply(acct: &mut Account, symbol: &str, delta: i64, price: Decimal) -> TradeEffect {
        let effect = acct.check_trade(&sym(symbol), delta, price).unwrap();
        acct.commit(&effect);
        effect
    }

    #[test]
    fn test_buy_debits_cash_and_creates_holding() {
        let mut acct = account(dec!(10000.00));
        let effect = apply(&mut acct, "AAPL", 10, dec!(50.00));
        assert_eq!(effect.cost, dec!(500.00));
        assert_eq!(acct.cash, dec!(9500.00));
        assert_eq!(acct.holding(&sym("AAPL")), Some(10));
        assert_eq!(acct.next_seq(), 2);
    }

    #[test]
    fn test_sell_all_removes_holding() {
        let mut acct = account(dec!(10000.00));
        apply(&mut acct, "AAPL", 10, dec!(50.00));
        apply(&mut acct, "AAPL", -10, dec!(60.00));
        assert_eq!(acct.cash, dec!(10100.00));
        assert_eq!(acct.holding(&sym("AAPL")), None);
        assert!(acct.holdings().is_empty());
    }

    #[test]
    fn test_partial_sell_keeps_remainder() {
        let mut acct = account(dec!(1000));
        apply(&mut acct, "IBM", 8, dec!(10));
        apply(&mut acct, "IBM", -3, dec!(12.5));
        assert_eq!(acct.holding(&sym("IBM")), Some(5));
        assert_eq!(acct.cash, dec!(957.5));
    }

    #[test]
    fn test_buy_exact_cash_allowed() {
        let mut acct = account(dec!(100.00));
        apply(&mut acct, "F", 4, dec!(25.00));
        assert_eq!(acct.cash, Decimal::ZERO);
    }

    #[test]
    fn test_overspend_rejected() {
        let acct = account(dec!(100.00));
        let err = acct.check_trade(&sym("F"), 5, dec!(25.00)).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientFunds { required, available }
                if required == dec!(125.00) && available == dec!(100.00)
        ));
    }

    #[test]
    fn test_oversell_rejected() {
        let mut acct = account(dec!(1000));
        apply(&mut acct, "F", 2, dec!(10));
        let err = acct.check_trade(&sym("F"), -3, dec!(10)).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientShares { requested: 3, held: 2, .. }
        ));
        let err = acct.check_trade(&sym("GM"), -1, dec!(10)).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientShares { held: 0, .. }));
    }

    #[test]
    fn test_zero_delta_and_bad_price_rejected() {
        let acct = account(dec!(1000));
        assert!(matches!(
            acct.check_trade(&sym("F"), 0, dec!(10)),
            Err(LedgerError::InvalidQuantity(0))
        ));
        assert!(matches!(
            acct.check_trade(&sym("F"), 1, dec!(0)),
            Err(LedgerError::InvalidPrice(_))
        ));
        assert!(matches!(
            acct.check_trade(&sym("F"), 1, dec!(-3)),
            Err(LedgerError::InvalidPrice(_))
        ));
    }

    #[test]
    fn test_negative_opening_balance_rejected() {
        assert!(matches!(
            Account::open(UserId::new(), dec!(-1), Utc::now()),
            Err(LedgerError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_replay_reconstructs_balances() {
        let user = UserId::new();
        let opened = Utc::now();
        let mut live = Account::open(user, dec!(10000), opened).unwrap();
        let mut log = Vec::new();
        for (symbol, delta, price) in [
            ("AAPL", 10, dec!(50)),
            ("MSFT", 3, dec!(301.15)),
            ("AAPL", -4, dec!(55.5)),
        ] {
            let effect = apply(&mut live, symbol, delta, price);
            log.push(Transaction {
                id: Uuid::new_v4(),
                seq: effect.seq,
                user_id: user,
                symbol: sym(symbol),
                quantity_delta: delta,
                price,
                executed_at: Utc::now(),
            });
        }

        let replayed = Account::replay(user, dec!(10000), opened, &log).unwrap();
        assert_eq!(replayed, live);
    }

    #[test]
    fn test_replay_rejects_out_of_sequence() {
        let user = UserId::new();
        let tx = Transaction {
            id: Uuid::new_v4(),
            seq: 7,
            user_id: user,
            symbol: sym("AAPL"),
            quantity_delta: 1,
            price: dec!(1),
            executed_at: Utc::now(),
        };
        assert!(Account::replay(user, dec!(10), Utc::now(), [&tx]).is_err());
    }
}
