//! Journal Ledger - Concrete Adapter for the LedgerStore Port
//!
//! Keeps every account in memory behind its own async mutex and mirrors
//! each change to the account's append-only JSONL journal. On startup the
//! journals are replayed through the same account rules used for live
//! trades, so a restart reproduces cash, holdings and history exactly.
//!
//! Concurrency model:
//! - One `tokio::sync::Mutex` per account serialises trades of that user
//! - The account table lock is held only to look up or insert a handle,
//!   so users never wait on each other's trades
//! - Lock waits are bounded; exhausted retries surface as `Conflict`

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::fs;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::journal::{AccountJournal, LedgerEvent};
use crate::config::LedgerConfig;
use crate::domain::account::Account;
use crate::domain::trade::{Holding, Symbol, Transaction, UserId};
use crate::error::LedgerError;
use crate::ports::ledger::{AppliedTrade, LedgerStore};

/// Tuning knobs for locking and durability.
#[derive(Debug, Clone)]
pub struct LedgerSettings {
    /// `sync_data` after every journal append.
    pub fsync: bool,
    /// Maximum wait for an account lock per attempt.
    pub lock_timeout: Duration,
    /// Extra attempts after the first lock timeout.
    pub max_conflict_retries: u32,
    /// Base delay between attempts (exponential backoff).
    pub retry_base_delay: Duration,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            fsync: true,
            lock_timeout: Duration::from_secs(2),
            max_conflict_retries: 3,
            retry_base_delay: Duration::from_millis(50),
        }
    }
}

impl From<&LedgerConfig> for LedgerSettings {
    fn from(config: &LedgerConfig) -> Self {
        Self {
            fsync: config.fsync,
            lock_timeout: Duration::from_millis(config.lock_timeout_ms),
            max_conflict_retries: config.max_conflict_retries,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
        }
    }
}

/// Everything the ledger keeps for one user, guarded by one mutex.
#[derive(Debug)]
struct AccountSlot {
    account: Account,
    /// Committed transactions in sequence order.
    history: Vec<Transaction>,
    /// `None` for in-memory ledgers.
    journal: Option<AccountJournal>,
}

type SharedSlot = Arc<Mutex<AccountSlot>>;

/// Ledger store backed by per-account JSONL journals.
pub struct JournalLedger {
    /// `<data_dir>/accounts`, or `None` when journaling is disabled.
    accounts_dir: Option<PathBuf>,
    /// Account handles by user.
    accounts: RwLock<HashMap<UserId, SharedSlot>>,
    settings: LedgerSettings,
}

impl JournalLedger {
    /// Open (or create) a ledger in `data_dir`, replaying all journals.
    pub async fn open(data_dir: &str, settings: LedgerSettings) -> Result<Self> {
        let accounts_dir = Path::new(data_dir).join("accounts");
        fs::create_dir_all(&accounts_dir)
            .await
            .context("Failed to create accounts directory")?;

        let mut accounts = HashMap::new();
        let mut entries = fs::read_dir(&accounts_dir)
            .await
            .context("Failed to list accounts directory")?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "jsonl") {
                let slot = Self::replay_journal(&path, settings.fsync)
                    .await
                    .with_context(|| format!("Failed to replay journal {}", path.display()))?;
                accounts.insert(slot.account.user_id, Arc::new(Mutex::new(slot)));
            }
        }

        info!(
            dir = %accounts_dir.display(),
            accounts = accounts.len(),
            fsync = settings.fsync,
            "Ledger journals replayed"
        );

        Ok(Self {
            accounts_dir: Some(accounts_dir),
            accounts: RwLock::new(accounts),
            settings,
        })
    }

    /// Ledger with identical semantics but no durability.
    pub fn in_memory(settings: LedgerSettings) -> Self {
        Self {
            accounts_dir: None,
            accounts: RwLock::new(HashMap::new()),
            settings,
        }
    }

    /// Number of registered accounts.
    pub async fn account_count(&self) -> usize {
        self.accounts.read().await.len()
    }

    /// Rebuild one account from its journal file.
    async fn replay_journal(path: &Path, fsync: bool) -> Result<AccountSlot> {
        let mut events = AccountJournal::load(path).await?.into_iter();
        let len = fs::metadata(path).await?.len();

        let Some(LedgerEvent::Opened {
            user_id,
            initial_cash,
            opened_at,
        }) = events.next()
        else {
            anyhow::bail!("journal does not start with an opened event");
        };

        let expected_stem = user_id.to_string();
        anyhow::ensure!(
            path.file_stem().and_then(|s| s.to_str()) == Some(expected_stem.as_str()),
            "journal file name does not match user {user_id}"
        );

        let mut account = Account::open(user_id, initial_cash, opened_at)?;
        let mut history = Vec::new();

        for event in events {
            match event {
                LedgerEvent::Trade(tx) => {
                    anyhow::ensure!(
                        tx.user_id == user_id,
                        "transaction {} belongs to user {}",
                        tx.id,
                        tx.user_id
                    );
                    account
                        .apply_recorded(&tx)
                        .with_context(|| format!("transaction {} violates ledger rules", tx.id))?;
                    history.push(tx);
                }
                LedgerEvent::Opened { .. } => {
                    anyhow::bail!("duplicate opened event for user {user_id}");
                }
            }
        }

        debug!(
            user = %user_id,
            trades = history.len(),
            cash = %account.cash,
            "Account replayed"
        );

        Ok(AccountSlot {
            account,
            history,
            journal: Some(AccountJournal::attach(path.to_path_buf(), len, fsync)),
        })
    }

    async fn slot(&self, user: UserId) -> Result<SharedSlot, LedgerError> {
        self.accounts
            .read()
            .await
            .get(&user)
            .cloned()
            .ok_or(LedgerError::UnknownUser(user))
    }

    /// Acquire the account lock with bounded waiting and backoff.
    async fn lock_slot(&self, user: UserId) -> Result<OwnedMutexGuard<AccountSlot>, LedgerError> {
        let slot = self.slot(user).await?;
        let mut attempt: u32 = 0;

        loop {
            match timeout(self.settings.lock_timeout, Arc::clone(&slot).lock_owned()).await {
                Ok(guard) => return Ok(guard),
                Err(_) if attempt < self.settings.max_conflict_retries => {
                    attempt += 1;
                    let delay = self
                        .settings
                        .retry_base_delay
                        .saturating_mul(2u32.saturating_pow(attempt - 1));
                    warn!(
                        user = %user,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Account lock contended, retrying"
                    );
                    sleep(delay).await;
                }
                Err(_) => {
                    warn!(user = %user, attempts = attempt + 1, "Account lock retries exhausted");
                    return Err(LedgerError::Conflict {
                        user,
                        attempts: attempt + 1,
                    });
                }
            }
        }
    }
}

#[async_trait]
impl LedgerStore for JournalLedger {
    #[instrument(skip_all, fields(user = %user))]
    async fn open_account(
        &self,
        user: UserId,
        initial_cash: Decimal,
    ) -> Result<Account, LedgerError> {
        let opened_at = Utc::now();
        let account = Account::open(user, initial_cash, opened_at)?;

        if self.accounts.read().await.contains_key(&user) {
            return Err(LedgerError::DuplicateUser(user));
        }

        let journal = match &self.accounts_dir {
            Some(dir) => Some(
                AccountJournal::create(dir, user, initial_cash, opened_at, self.settings.fsync)
                    .await?,
            ),
            None => None,
        };

        match self.accounts.write().await.entry(user) {
            Entry::Occupied(_) => return Err(LedgerError::DuplicateUser(user)),
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::new(Mutex::new(AccountSlot {
                    account: account.clone(),
                    history: Vec::new(),
                    journal,
                })));
            }
        }

        info!(user = %user, cash = %initial_cash, "Account opened");
        Ok(account)
    }

    async fn cash(&self, user: UserId) -> Result<Decimal, LedgerError> {
        Ok(self.lock_slot(user).await?.account.cash)
    }

    async fn holding(
        &self,
        user: UserId,
        symbol: &Symbol,
    ) -> Result<Option<u64>, LedgerError> {
        Ok(self.lock_slot(user).await?.account.holding(symbol))
    }

    #[instrument(skip_all, fields(user = %user, symbol = %symbol, delta = quantity_delta))]
    async fn apply_trade(
        &self,
        user: UserId,
        symbol: &Symbol,
        quantity_delta: i64,
        price: Decimal,
        executed_at: DateTime<Utc>,
    ) -> Result<AppliedTrade, LedgerError> {
        let mut guard = self.lock_slot(user).await?;
        let symbol = symbol.clone();

        // The commit owns the lock guard on its own task: once started it
        // runs to completion even if the caller stops polling.
        let commit = tokio::spawn(async move {
            let slot = &mut *guard;
            let effect = slot.account.check_trade(&symbol, quantity_delta, price)?;

            let transaction = Transaction {
                id: Uuid::new_v4(),
                seq: effect.seq,
                user_id: user,
                symbol,
                quantity_delta,
                price,
                executed_at,
            };

            if let Some(journal) = &mut slot.journal {
                journal
                    .append(&LedgerEvent::Trade(transaction.clone()))
                    .await?;
            }

            slot.account.commit(&effect);
            slot.history.push(transaction.clone());

            Ok::<_, LedgerError>(AppliedTrade {
                transaction,
                cash_after: effect.cash_after,
                holding_after: effect.holding_after,
            })
        });

        let outcome = commit
            .await
            .map_err(|e| LedgerError::Aborted(e.to_string()))?;

        match &outcome {
            Ok(applied) => info!(
                seq = applied.transaction.seq,
                quantity_delta,
                price = %price,
                cash_after = %applied.cash_after,
                holding_after = applied.holding_after,
                "Trade committed"
            ),
            Err(e) if e.is_rejection() => debug!(error = %e, "Trade rejected"),
            Err(e) => warn!(error = %e, "Trade failed"),
        }

        outcome
    }

    async fn holdings(&self, user: UserId) -> Result<Vec<Holding>, LedgerError> {
        Ok(self.lock_slot(user).await?.account.holdings())
    }

    async fn history(&self, user: UserId) -> Result<Vec<Transaction>, LedgerError> {
        let mut history = self.lock_slot(user).await?.history.clone();
        history.sort_by(|a, b| {
            a.executed_at
                .cmp(&b.executed_at)
                .then(a.seq.cmp(&b.seq))
        });
        Ok(history)
    }

    async fn account(&self, user: UserId) -> Result<Account, LedgerError> {
        Ok(self.lock_slot(user).await?.account.clone())
    }

    async fn is_healthy(&self) -> bool {
        let Some(dir) = &self.accounts_dir else {
            return true;
        };
        let marker = dir.join(".health_check");
        let result = fs::write(&marker, b"ok").await;
        let _ = fs::remove_file(&marker).await;
        result.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fast_settings() -> LedgerSettings {
        LedgerSettings {
            fsync: false,
            lock_timeout: Duration::from_millis(20),
            max_conflict_retries: 2,
            retry_base_delay: Duration::from_millis(5),
        }
    }

    fn sym(s: &str) -> Symbol {
        Symbol::parse(s).unwrap()
    }

    async fn scratch_dir() -> String {
        let dir = std::env::temp_dir().join(format!("stock-ledger-store-{}", Uuid::new_v4()));
        dir.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let ledger = JournalLedger::in_memory(fast_settings());
        let user = UserId::new();
        assert!(matches!(ledger.cash(user).await, Err(LedgerError::UnknownUser(u)) if u == user));
        assert!(matches!(
            ledger.apply_trade(user, &sym("AAPL"), 1, dec!(1), Utc::now()).await,
            Err(LedgerError::UnknownUser(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_account_rejected() {
        let ledger = JournalLedger::in_memory(fast_settings());
        let user = UserId::new();
        ledger.open_account(user, dec!(100)).await.unwrap();
        assert!(matches!(
            ledger.open_account(user, dec!(100)).await,
            Err(LedgerError::DuplicateUser(_))
        ));
        assert_eq!(ledger.account_count().await, 1);
    }

    #[tokio::test]
    async fn test_rejected_trade_changes_nothing() {
        let ledger = JournalLedger::in_memory(fast_settings());
        let user = UserId::new();
        ledger.open_account(user, dec!(100)).await.unwrap();

        let err = ledger
            .apply_trade(user, &sym("AAPL"), 3, dec!(40), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(ledger.cash(user).await.unwrap(), dec!(100));
        assert!(ledger.holdings(user).await.unwrap().is_empty());
        assert!(ledger.history(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_locked_account_times_out_as_conflict() {
        let ledger = JournalLedger::in_memory(fast_settings());
        let user = UserId::new();
        ledger.open_account(user, dec!(100)).await.unwrap();

        let held = ledger.slot(user).await.unwrap().lock_owned().await;
        let err = ledger.cash(user).await.unwrap_err();
        assert!(matches!(err, LedgerError::Conflict { attempts: 3, .. }));
        drop(held);

        assert_eq!(ledger.cash(user).await.unwrap(), dec!(100));
    }

    #[tokio::test]
    async fn test_other_users_not_blocked_by_locked_account() {
        let ledger = JournalLedger::in_memory(fast_settings());
        let busy = UserId::new();
        let free = UserId::new();
        ledger.open_account(busy, dec!(100)).await.unwrap();
        ledger.open_account(free, dec!(100)).await.unwrap();

        let _held = ledger.slot(busy).await.unwrap().lock_owned().await;
        let applied = ledger
            .apply_trade(free, &sym("F"), 2, dec!(10), Utc::now())
            .await
            .unwrap();
        assert_eq!(applied.cash_after, dec!(80));
    }

    #[tokio::test]
    async fn test_history_sorted_by_time_then_seq() {
        let ledger = JournalLedger::in_memory(fast_settings());
        let user = UserId::new();
        ledger.open_account(user, dec!(1000)).await.unwrap();

        let later = Utc::now();
        let earlier = later - chrono::Duration::seconds(5);
        ledger
            .apply_trade(user, &sym("F"), 1, dec!(10), later)
            .await
            .unwrap();
        ledger
            .apply_trade(user, &sym("F"), 1, dec!(10), earlier)
            .await
            .unwrap();

        let history = ledger.history(user).await.unwrap();
        assert_eq!(history[0].seq, 2);
        assert_eq!(history[1].seq, 1);
    }

    #[tokio::test]
    async fn test_reopen_replays_journal() {
        let dir = scratch_dir().await;
        let user = UserId::new();
        {
            let ledger = JournalLedger::open(&dir, fast_settings()).await.unwrap();
            ledger.open_account(user, dec!(10000.00)).await.unwrap();
            ledger
                .apply_trade(user, &sym("AAPL"), 10, dec!(50.00), Utc::now())
                .await
                .unwrap();
            ledger
                .apply_trade(user, &sym("MSFT"), 2, dec!(300.10), Utc::now())
                .await
                .unwrap();
            ledger
                .apply_trade(user, &sym("AAPL"), -4, dec!(60.00), Utc::now())
                .await
                .unwrap();
            assert!(ledger.is_healthy().await);
        }

        let reopened = JournalLedger::open(&dir, fast_settings()).await.unwrap();
        assert_eq!(reopened.account_count().await, 1);
        assert_eq!(reopened.cash(user).await.unwrap(), dec!(9139.80));
        assert_eq!(reopened.holding(user, &sym("AAPL")).await.unwrap(), Some(6));
        assert_eq!(reopened.holding(user, &sym("MSFT")).await.unwrap(), Some(2));
        assert_eq!(reopened.history(user).await.unwrap().len(), 3);

        let next = reopened
            .apply_trade(user, &sym("MSFT"), -2, dec!(300.10), Utc::now())
            .await
            .unwrap();
        assert_eq!(next.transaction.seq, 4);

        fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_stray_journal_bytes_do_not_swallow_next_trade() {
        let dir = scratch_dir().await;
        let user = UserId::new();
        {
            let ledger = JournalLedger::open(&dir, fast_settings()).await.unwrap();
            ledger.open_account(user, dec!(1000)).await.unwrap();

            let path = Path::new(&dir).join("accounts").join(format!("{user}.jsonl"));
            let mut file = fs::OpenOptions::new().append(true).open(&path).await.unwrap();
            tokio::io::AsyncWriteExt::write_all(&mut file, b"{\"event\":\"trade\",\"id\":\"")
                .await
                .unwrap();
            drop(file);

            let applied = ledger
                .apply_trade(user, &sym("AAPL"), 1, dec!(10), Utc::now())
                .await
                .unwrap();
            assert_eq!(applied.cash_after, dec!(990));
        }

        let reopened = JournalLedger::open(&dir, fast_settings()).await.unwrap();
        assert_eq!(reopened.cash(user).await.unwrap(), dec!(990));
        assert_eq!(reopened.holdings(user).await.unwrap().len(), 1);
        assert_eq!(reopened.history(user).await.unwrap().len(), 1);

        fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_append_leaves_account_unchanged() {
        let dir = scratch_dir().await;
        let ledger = JournalLedger::open(&dir, fast_settings()).await.unwrap();
        let user = UserId::new();
        ledger.open_account(user, dec!(1000)).await.unwrap();

        let path = Path::new(&dir).join("accounts").join(format!("{user}.jsonl"));
        let opened = fs::read(&path).await.unwrap();
        fs::remove_file(&path).await.unwrap();

        let err = ledger
            .apply_trade(user, &sym("AAPL"), 1, dec!(10), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Storage(_)));
        assert_eq!(ledger.cash(user).await.unwrap(), dec!(1000));
        assert!(ledger.history(user).await.unwrap().is_empty());

        // The next trade reuses the sequence number nobody acknowledged.
        fs::write(&path, &opened).await.unwrap();
        let applied = ledger
            .apply_trade(user, &sym("AAPL"), 1, dec!(10), Utc::now())
            .await
            .unwrap();
        assert_eq!(applied.transaction.seq, 1);

        fs::remove_dir_all(&dir).await.unwrap();
    }

    /// Cash, holdings and history must describe the same set of trades.
    async fn assert_consistent(ledger: &JournalLedger, user: UserId, initial_cash: Decimal) {
        let history = ledger.history(user).await.unwrap();
        let net: Decimal = history.iter().map(Transaction::cash_delta).sum();
        assert_eq!(ledger.cash(user).await.unwrap(), initial_cash + net);

        let held: i64 = history.iter().map(|t| t.quantity_delta).sum();
        let holding = ledger.holding(user, &sym("AAPL")).await.unwrap();
        assert_eq!(holding.map_or(0, |q| q as i64), held);
    }

    #[tokio::test]
    async fn test_dropped_trade_waiting_on_lock_applies_nothing() {
        let dir = scratch_dir().await;
        let user = UserId::new();
        {
            let ledger = JournalLedger::open(&dir, fast_settings()).await.unwrap();
            ledger.open_account(user, dec!(100)).await.unwrap();

            let held = ledger.slot(user).await.unwrap().lock_owned().await;
            let dropped = timeout(
                Duration::ZERO,
                ledger.apply_trade(user, &sym("AAPL"), 1, dec!(10), Utc::now()),
            )
            .await;
            assert!(dropped.is_err());
            drop(held);

            assert_eq!(ledger.cash(user).await.unwrap(), dec!(100));
            assert!(ledger.history(user).await.unwrap().is_empty());
            assert_consistent(&ledger, user, dec!(100)).await;
        }

        let reopened = JournalLedger::open(&dir, fast_settings()).await.unwrap();
        assert_eq!(reopened.cash(user).await.unwrap(), dec!(100));
        assert!(reopened.history(user).await.unwrap().is_empty());

        fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_trade_after_lock_stays_consistent() {
        let dir = scratch_dir().await;
        let user = UserId::new();
        let ledger = JournalLedger::open(&dir, fast_settings()).await.unwrap();
        ledger.open_account(user, dec!(100)).await.unwrap();

        for _ in 0..5 {
            let _ = timeout(
                Duration::ZERO,
                ledger.apply_trade(user, &sym("AAPL"), 1, dec!(10), Utc::now()),
            )
            .await;
        }

        // Reads wait for any commit still running on its own task.
        assert_consistent(&ledger, user, dec!(100)).await;
        let cash = ledger.cash(user).await.unwrap();
        let history = ledger.history(user).await.unwrap();
        let seqs: Vec<u64> = history.iter().map(|t| t.seq).collect();
        assert_eq!(seqs, (1..=history.len() as u64).collect::<Vec<_>>());

        let reopened = JournalLedger::open(&dir, fast_settings()).await.unwrap();
        assert_eq!(reopened.cash(user).await.unwrap(), cash);
        assert_eq!(reopened.history(user).await.unwrap(), history);
        assert_consistent(&reopened, user, dec!(100)).await;

        fs::remove_dir_all(&dir).await.unwrap();
    }
}
