//! Account Journal - Append-only JSONL Ledger Records
//!
//! Each account owns one file `accounts/<user_id>.jsonl`. The first line
//! is the `opened` event, every following line one executed trade. Lines
//! are self-contained JSON records, written whole and flushed before the
//! in-memory account changes, so the file alone reconstructs the account.

use std::io::{self, ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, error, instrument, warn};

use crate::domain::trade::{Transaction, UserId};
use crate::error::LedgerError;

/// One line of an account journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// Account registration with its starting balance.
    Opened {
        user_id: UserId,
        initial_cash: Decimal,
        opened_at: DateTime<Utc>,
    },
    /// An executed trade.
    Trade(Transaction),
}

/// Append-only JSONL writer for a single account.
#[derive(Debug)]
pub struct AccountJournal {
    /// Path to `<user_id>.jsonl`.
    path: PathBuf,
    /// Bytes of fully written events.
    len: u64,
    /// Whether every append is followed by `sync_data`.
    fsync: bool,
    /// Set when a failed append could not be rolled back.
    poisoned: bool,
}

impl AccountJournal {
    /// Create a new journal and write its `opened` event.
    ///
    /// Fails with `DuplicateUser` if the file already exists.
    #[instrument(skip(dir, initial_cash, opened_at), fields(user = %user_id))]
    pub async fn create(
        dir: &Path,
        user_id: UserId,
        initial_cash: Decimal,
        opened_at: DateTime<Utc>,
        fsync: bool,
    ) -> Result<Self, LedgerError> {
        let path = dir.join(format!("{user_id}.jsonl"));
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => LedgerError::DuplicateUser(user_id),
                _ => LedgerError::Storage(e),
            })?;
        drop(file);

        let mut journal = Self::attach(path, 0, fsync);
        let opened = LedgerEvent::Opened {
            user_id,
            initial_cash,
            opened_at,
        };
        if let Err(e) = journal.append(&opened).await {
            let _ = fs::remove_file(&journal.path).await;
            return Err(e);
        }
        Ok(journal)
    }

    /// Attach to an existing journal that has already been replayed.
    ///
    /// `len` is the size of the file once `load` has repaired it.
    pub const fn attach(path: PathBuf, len: u64, fsync: bool) -> Self {
        Self {
            path,
            len,
            fsync,
            poisoned: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Length of the acknowledged prefix.
    pub const fn acknowledged_len(&self) -> u64 {
        self.len
    }

    pub const fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Append one event as a single line.
    ///
    /// On error the file is truncated back to the acknowledged prefix, so
    /// neither a partial line nor an unsynced whole line survives.
    pub async fn append(&mut self, event: &LedgerEvent) -> Result<(), LedgerError> {
        if self.poisoned {
            return Err(LedgerError::Storage(io::Error::other(format!(
                "journal {} is closed for writes after a storage failure",
                self.path.display()
            ))));
        }

        let mut json = serde_json::to_string(event)?;
        json.push('\n');

        let mut file = OpenOptions::new().write(true).open(&self.path).await?;
        let on_disk = file.metadata().await?.len();
        if on_disk < self.len {
            self.poisoned = true;
            error!(
                path = %self.path.display(),
                expected = self.len,
                on_disk,
                "Journal lost acknowledged records"
            );
            return Err(LedgerError::Storage(io::Error::other(format!(
                "journal {} is shorter than its acknowledged records",
                self.path.display()
            ))));
        }

        match self.write_tail(&mut file, on_disk, json.as_bytes()).await {
            Ok(()) => {
                self.len += json.len() as u64;
                debug!(path = %self.path.display(), bytes = json.len(), "Journal event appended");
                Ok(())
            }
            Err(e) => {
                self.rollback(&file).await;
                Err(LedgerError::Storage(e))
            }
        }
    }

    /// Write `bytes` right after the acknowledged prefix.
    async fn write_tail(&self, file: &mut File, on_disk: u64, bytes: &[u8]) -> io::Result<()> {
        if on_disk > self.len {
            warn!(
                path = %self.path.display(),
                discarded_bytes = on_disk - self.len,
                "Discarding unacknowledged journal bytes"
            );
            file.set_len(self.len).await?;
        }
        file.seek(SeekFrom::Start(self.len)).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        if self.fsync {
            file.sync_data().await?;
        }
        Ok(())
    }

    async fn rollback(&mut self, file: &File) {
        match file.set_len(self.len).await {
            Ok(()) => warn!(path = %self.path.display(), len = self.len, "Failed append rolled back"),
            Err(e) => {
                self.poisoned = true;
                error!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed append could not be rolled back; journal closed for writes"
                );
            }
        }
    }

    /// Load every event of a journal file in write order.
    ///
    /// A malformed final line is the remains of an interrupted append: it
    /// is cut off the file and ignored. A malformed line anywhere else is
    /// corruption and fails the load.
    #[instrument]
    pub async fn load(path: &Path) -> Result<Vec<LedgerEvent>> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read journal {}", path.display()))?;

        let mut events = Vec::new();
        let mut valid_len = 0usize;
        let mut missing_newline = false;
        let mut lines = content.split_inclusive('\n').peekable();

        while let Some(line) = lines.next() {
            let is_last = lines.peek().is_none();
            let record = line.trim();
            if record.is_empty() {
                valid_len += line.len();
                continue;
            }

            match serde_json::from_str::<LedgerEvent>(record) {
                Ok(event) => {
                    events.push(event);
                    valid_len += line.len();
                    missing_newline = !line.ends_with('\n');
                }
                Err(e) if is_last => {
                    warn!(
                        file = %path.display(),
                        error = %e,
                        discarded_bytes = line.len(),
                        "Discarding torn journal tail"
                    );
                    let file = OpenOptions::new().write(true).open(path).await?;
                    file.set_len(valid_len as u64).await?;
                    file.sync_all().await?;
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Malformed record in journal {}", path.display())
                    });
                }
            }
        }

        if missing_newline {
            let mut file = OpenOptions::new().append(true).open(path).await?;
            file.write_all(b"\n").await?;
            file.sync_all().await?;
        }

        Ok(events)
    }
}
