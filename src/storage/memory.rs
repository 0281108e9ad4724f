use super::{Database, Session};
use crate::core::{DbError, DbResult};
use crate::transaction::{Change, Transaction};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// A committed value and the version that wrote it. Deletes leave a
/// tombstone so later conflicts on the key are still detected.
#[derive(Debug, Clone)]
struct Versioned {
    value: Option<String>,
    version: u64,
}

/// Counters for observing what sessions did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub sessions_opened: u64,
    pub open_sessions: u64,
    pub commits: u64,
    pub rollbacks: u64,
}

struct MemoryInner {
    name: String,
    data: RwLock<BTreeMap<String, Versioned>>,
    next_version: AtomicU64,
    commit_fault: Mutex<Option<String>>,
    stats: Mutex<MemoryStats>,
}

/// In-memory key/value database with transactions
///
/// Clones share the same storage.
#[derive(Clone)]
pub struct MemoryDatabase {
    inner: Arc<MemoryInner>,
}

impl MemoryDatabase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                name: name.into(),
                data: RwLock::new(BTreeMap::new()),
                next_version: AtomicU64::new(1),
                commit_fault: Mutex::new(None),
                stats: Mutex::new(MemoryStats::default()),
            }),
        }
    }

    /// Read a committed value outside any session
    pub fn committed_value(&self, key: &str) -> DbResult<Option<String>> {
        let data = self.inner.data.read()?;
        Ok(data.get(key).and_then(|entry| entry.value.clone()))
    }

    /// Write a committed value outside any session
    pub fn seed(&self, key: &str, value: &str) -> DbResult<()> {
        let version = self.inner.next_version();
        let mut data = self.inner.data.write()?;
        data.insert(
            key.to_string(),
            Versioned {
                value: Some(value.to_string()),
                version,
            },
        );
        Ok(())
    }

    /// Make the next commit on this database fail with the given reason
    pub fn fail_next_commit(&self, reason: impl Into<String>) -> DbResult<()> {
        *self.inner.commit_fault.lock()? = Some(reason.into());
        Ok(())
    }

    pub fn stats(&self) -> MemoryStats {
        self.inner
            .stats
            .lock()
            .map(|stats| stats.clone())
            .unwrap_or_default()
    }
}

impl MemoryInner {
    fn next_version(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::SeqCst)
    }

    fn update_stats(&self, f: impl FnOnce(&mut MemoryStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            f(&mut stats);
        }
    }

    fn version_of(&self, key: &str) -> DbResult<u64> {
        let data = self.data.read()?;
        Ok(data.get(key).map(|entry| entry.version).unwrap_or(0))
    }

    fn apply(&self, data: &mut BTreeMap<String, Versioned>, change: Change) {
        let version = self.next_version();
        match change {
            Change::Put { key, value } => {
                data.insert(
                    key,
                    Versioned {
                        value: Some(value),
                        version,
                    },
                );
            }
            Change::Delete { key } => {
                data.insert(
                    key,
                    Versioned {
                        value: None,
                        version,
                    },
                );
            }
        }
    }
}

impl Database for MemoryDatabase {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn connect(&self) -> DbResult<Box<dyn Session>> {
        self.inner.update_stats(|stats| {
            stats.sessions_opened += 1;
            stats.open_sessions += 1;
        });
        Ok(Box::new(MemorySession {
            db: Arc::clone(&self.inner),
            transaction: None,
            closed: false,
        }))
    }
}

/// A session against a [`MemoryDatabase`]
///
/// Outside a transaction every write is applied immediately.
pub struct MemorySession {
    db: Arc<MemoryInner>,
    transaction: Option<Transaction>,
    closed: bool,
}

impl MemorySession {
    fn ensure_open(&self) -> DbResult<()> {
        if self.closed {
            return Err(DbError::ConnectionClosed);
        }
        Ok(())
    }

    fn write(&mut self, change: Change) -> DbResult<()> {
        self.ensure_open()?;
        match self.transaction.as_mut() {
            Some(txn) => {
                let version = self.db.version_of(change.key())?;
                txn.observe(change.key(), version);
                txn.stage(change)
            }
            None => {
                let mut data = self.db.data.write()?;
                self.db.apply(&mut data, change);
                Ok(())
            }
        }
    }
}

impl Session for MemorySession {
    fn begin(&mut self) -> DbResult<()> {
        self.ensure_open()?;
        if self.transaction.is_some() {
            return Err(DbError::TransactionAlreadyActive);
        }
        self.transaction = Some(Transaction::begin());
        Ok(())
    }

    fn commit(&mut self) -> DbResult<()> {
        self.ensure_open()?;
        let mut txn = self
            .transaction
            .take()
            .ok_or(DbError::NoActiveTransaction)?;

        if let Some(reason) = self.db.commit_fault.lock()?.take() {
            txn.rollback()?;
            self.db.update_stats(|stats| stats.rollbacks += 1);
            return Err(DbError::CommitFailed(reason));
        }

        let mut data = self.db.data.write()?;
        let conflict = txn.read_set().iter().find_map(|(key, seen)| {
            let current = data.get(key).map(|entry| entry.version).unwrap_or(0);
            (current != *seen).then(|| key.clone())
        });
        if let Some(key) = conflict {
            drop(data);
            txn.rollback()?;
            self.db.update_stats(|stats| stats.rollbacks += 1);
            return Err(DbError::WriteConflict(key));
        }

        for change in txn.commit()? {
            self.db.apply(&mut data, change);
        }
        drop(data);
        self.db.update_stats(|stats| stats.commits += 1);
        Ok(())
    }

    fn rollback(&mut self) -> DbResult<()> {
        self.ensure_open()?;
        let mut txn = self
            .transaction
            .take()
            .ok_or(DbError::NoActiveTransaction)?;
        txn.rollback()?;
        self.db.update_stats(|stats| stats.rollbacks += 1);
        Ok(())
    }

    fn close(&mut self) -> DbResult<()> {
        if self.closed {
            return Ok(());
        }
        if self.transaction.is_some() {
            self.rollback()?;
        }
        self.closed = true;
        self.db.update_stats(|stats| stats.open_sessions -= 1);
        Ok(())
    }

    fn is_in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    fn get(&mut self, key: &str) -> DbResult<Option<String>> {
        self.ensure_open()?;
        if let Some(change) = self
            .transaction
            .as_ref()
            .and_then(|txn| txn.staged(key))
        {
            return Ok(change.value().map(str::to_string));
        }

        let (value, version) = {
            let data = self.db.data.read()?;
            match data.get(key) {
                Some(entry) => (entry.value.clone(), entry.version),
                None => (None, 0),
            }
        };
        if let Some(txn) = self.transaction.as_mut() {
            txn.observe(key, version);
        }
        Ok(value)
    }

    fn put(&mut self, key: &str, value: &str) -> DbResult<()> {
        self.write(Change::Put {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    fn delete(&mut self, key: &str) -> DbResult<()> {
        self.write(Change::Delete {
            key: key.to_string(),
        })
    }

    fn keys_with_prefix(&mut self, prefix: &str) -> DbResult<Vec<String>> {
        self.ensure_open()?;
        let mut keys: BTreeSet<String> = {
            let data = self.db.data.read()?;
            data.range(prefix.to_string()..)
                .take_while(|(key, _)| key.starts_with(prefix))
                .filter(|(_, entry)| entry.value.is_some())
                .map(|(key, _)| key.clone())
                .collect()
        };
        if let Some(txn) = self.transaction.as_ref() {
            for change in txn.writes().iter().filter(|c| c.key().starts_with(prefix)) {
                if change.is_delete() {
                    keys.remove(change.key());
                } else {
                    keys.insert(change.key().to_string());
                }
            }
        }
        Ok(keys.into_iter().collect())
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        // Ensure session is closed and transaction rolled back
        let _ = self.close();
    }
}
