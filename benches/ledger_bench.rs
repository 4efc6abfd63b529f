//! Ledger Benchmarks - Trade Path Performance
//!
//! Benchmarks the account rule check, journal replay and the full
//! in-memory trade path through the ledger's per-user lock.
//!
//! Run with: cargo bench --bench ledger_bench

use std::sync::Arc;

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rust_decimal_macros::dec;

use stock_ledger::adapters::persistence::{JournalLedger, LedgerSettings};
use stock_ledger::domain::account::Account;
use stock_ledger::domain::trade::{Symbol, Transaction, UserId};
use stock_ledger::ports::ledger::LedgerStore;

/// Benchmark validating and committing one buy.
fn bench_check_and_commit(c: &mut Criterion) {
    let symbol = Symbol::parse("AAPL").unwrap();
    let account = Account::open(UserId::new(), dec!(1000000), Utc::now()).unwrap();

    c.bench_function("account_check_and_commit", |b| {
        b.iter(|| {
            let mut acct = account.clone();
            let effect = acct
                .check_trade(black_box(&symbol), black_box(10), black_box(dec!(189.84)))
                .unwrap();
            acct.commit(&effect);
        });
    });
}

/// Benchmark rebuilding an account from 1,000 transactions.
fn bench_replay(c: &mut Criterion) {
    let user = UserId::new();
    let opened_at = Utc::now();
    let symbols: Vec<Symbol> = ["AAPL", "MSFT", "NFLX", "TSLA"]
        .iter()
        .map(|s| Symbol::parse(s).unwrap())
        .collect();

    let mut live = Account::open(user, dec!(10000000), opened_at).unwrap();
    let mut log = Vec::with_capacity(1_000);
    for i in 0..1_000u64 {
        let symbol = &symbols[((i / 3) % 4) as usize];
        let delta = if i % 3 == 2 { -1 } else { 2 };
        let effect = live.check_trade(symbol, delta, dec!(42.50)).unwrap();
        live.commit(&effect);
        log.push(Transaction {
            id: uuid::Uuid::new_v4(),
            seq: effect.seq,
            user_id: user,
            symbol: symbol.clone(),
            quantity_delta: delta,
            price: dec!(42.50),
            executed_at: opened_at,
        });
    }

    c.bench_function("account_replay_1000", |b| {
        b.iter(|| Account::replay(user, dec!(10000000), opened_at, black_box(&log)).unwrap());
    });
}

/// Benchmark a buy/sell pair through the in-memory ledger.
fn bench_ledger_apply(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let ledger = Arc::new(JournalLedger::in_memory(LedgerSettings::default()));
    let user = UserId::new();
    let symbol = Symbol::parse("AAPL").unwrap();
    runtime
        .block_on(ledger.open_account(user, dec!(1000000)))
        .unwrap();

    c.bench_function("ledger_apply_round_trip", |b| {
        b.to_async(&runtime).iter(|| {
            let ledger = Arc::clone(&ledger);
            let symbol = symbol.clone();
            async move {
                ledger
                    .apply_trade(user, &symbol, 5, dec!(100), Utc::now())
                    .await
                    .unwrap();
                ledger
                    .apply_trade(user, &symbol, -5, dec!(100), Utc::now())
                    .await
                    .unwrap();
            }
        });
    });
}

criterion_group!(
    benches,
    bench_check_and_commit,
    bench_replay,
    bench_ledger_apply,
);
criterion_main!(benches);
