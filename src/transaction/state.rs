use super::Change;
use crate::core::{DbError, DbResult};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(u64);

impl TransactionId {
    pub fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Open,
    Committed,
    RolledBack,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionState::Open => "open",
            TransactionState::Committed => "committed",
            TransactionState::RolledBack => "rolled back",
        };
        f.write_str(name)
    }
}

/// Writes staged by one session, plus the key versions it depended on
///
/// The backend compares the read set against current versions at commit;
/// any difference means another session committed first.
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    state: TransactionState,
    writes: Vec<Change>,
    read_set: HashMap<String, u64>,
    began: Instant,
}

impl Transaction {
    pub fn begin() -> Self {
        Self {
            id: TransactionId::next(),
            state: TransactionState::Open,
            writes: Vec::new(),
            read_set: HashMap::new(),
            began: Instant::now(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn age(&self) -> Duration {
        self.began.elapsed()
    }

    pub fn writes(&self) -> &[Change] {
        &self.writes
    }

    /// Most recent staged write to `key`
    pub fn staged(&self, key: &str) -> Option<&Change> {
        self.writes.iter().rev().find(|w| w.key() == key)
    }

    /// Record the version `key` had when first touched; later calls are ignored
    pub fn observe(&mut self, key: &str, version: u64) {
        if !self.read_set.contains_key(key) {
            self.read_set.insert(key.to_string(), version);
        }
    }

    pub fn read_set(&self) -> &HashMap<String, u64> {
        &self.read_set
    }

    fn require_open(&self, action: &str) -> DbResult<()> {
        match self.state {
            TransactionState::Open => Ok(()),
            state => Err(DbError::ExecutionError(format!(
                "Cannot {} in {}: it is {}",
                action, self.id, state
            ))),
        }
    }

    pub fn stage(&mut self, change: Change) -> DbResult<()> {
        self.require_open("stage a write")?;
        self.writes.push(change);
        Ok(())
    }

    /// Close the transaction and return its writes in staging order
    pub fn commit(&mut self) -> DbResult<Vec<Change>> {
        self.require_open("commit")?;
        self.state = TransactionState::Committed;
        Ok(std::mem::take(&mut self.writes))
    }

    pub fn rollback(&mut self) -> DbResult<()> {
        self.require_open("roll back")?;
        self.writes.clear();
        self.read_set.clear();
        self.state = TransactionState::RolledBack;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(key: &str, value: &str) -> Change {
        Change::Put {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_ids_increase() {
        let first = Transaction::begin();
        let second = Transaction::begin();
        assert!(second.id() > first.id());
        assert!(first.id().to_string().starts_with("tx#"));
    }

    #[test]
    fn test_commit_returns_writes_once() {
        let mut tx = Transaction::begin();
        tx.stage(put("a", "1")).unwrap();
        tx.stage(put("b", "2")).unwrap();

        assert_eq!(tx.commit().unwrap(), vec![put("a", "1"), put("b", "2")]);
        assert_eq!(tx.state(), TransactionState::Committed);
        assert!(tx.writes().is_empty());
        assert!(tx.commit().is_err());
        assert!(tx.stage(put("c", "3")).is_err());
    }

    #[test]
    fn test_staged_sees_latest_write() {
        let mut tx = Transaction::begin();
        tx.stage(put("a", "1")).unwrap();
        tx.stage(Change::Delete { key: "a".into() }).unwrap();

        assert!(tx.staged("a").is_some_and(Change::is_delete));
        assert!(tx.staged("b").is_none());
    }

    #[test]
    fn test_read_set_keeps_first_version() {
        let mut tx = Transaction::begin();
        tx.observe("a", 3);
        tx.observe("a", 7);
        assert_eq!(tx.read_set().get("a"), Some(&3));
    }

    #[test]
    fn test_rollback_discards_everything() {
        let mut tx = Transaction::begin();
        tx.stage(put("a", "1")).unwrap();
        tx.observe("a", 1);

        tx.rollback().unwrap();
        assert!(tx.writes().is_empty());
        assert!(tx.read_set().is_empty());
        assert_eq!(tx.state(), TransactionState::RolledBack);
        assert!(tx.rollback().is_err());
    }
}
