pub mod config;
pub mod identity;

use crate::core::{DataModificationError, DatabaseId, DbError, DbResult};
use crate::storage::{Database, Session};
use tracing::debug;

pub use config::{DatabaseConfig, DatabaseRegistry};

/// A closure run right before commit that may veto it
pub type CommitTimeValidation =
    Box<dyn FnMut(&mut TransactableConnection) -> Result<(), DataModificationError>>;

/// Connection handle for one logical database
///
/// Owned by a data access state for the duration of a unit of work.
/// Similar to postgres::Connection, but tracks whether a transaction was
/// begun and carries the validations that must pass before commit.
pub struct TransactableConnection {
    database: DatabaseId,
    automatic_transactions: bool,
    session: Box<dyn Session>,
    state: ConnectionState,
    commit_time_validations: Vec<CommitTimeValidation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Open,
    InTransaction,
    Closed,
}

impl TransactableConnection {
    /// Open a connection; does not begin a transaction
    pub fn open(
        database: DatabaseId,
        backend: &dyn Database,
        automatic_transactions: bool,
    ) -> DbResult<Self> {
        let session = backend.connect()?;
        debug!(%database, backend = backend.name(), "opened connection");
        Ok(Self {
            database,
            automatic_transactions,
            session,
            state: ConnectionState::Open,
            commit_time_validations: Vec::new(),
        })
    }

    pub fn database(&self) -> &DatabaseId {
        &self.database
    }

    pub fn automatic_transactions(&self) -> bool {
        self.automatic_transactions
    }

    pub fn is_open(&self) -> bool {
        self.state != ConnectionState::Closed
    }

    pub fn is_in_transaction(&self) -> bool {
        self.state == ConnectionState::InTransaction
    }

    fn ensure_open(&self) -> DbResult<()> {
        if self.state == ConnectionState::Closed {
            return Err(DbError::ConnectionClosed);
        }
        Ok(())
    }

    pub fn begin_transaction(&mut self) -> DbResult<()> {
        self.ensure_open()?;
        if self.state == ConnectionState::InTransaction {
            return Err(DbError::TransactionAlreadyActive);
        }

        self.session.begin()?;
        self.state = ConnectionState::InTransaction;
        Ok(())
    }

    /// Commit the current transaction
    ///
    /// Validations still pending run first; if one fails the transaction
    /// is rolled back instead. A failed commit leaves the connection open
    /// with no transaction; the backend has already discarded the staged work.
    pub fn commit_transaction(&mut self) -> DbResult<()> {
        if self.state != ConnectionState::InTransaction {
            return Err(DbError::NoActiveTransaction);
        }

        if let Err(err) = self.execute_commit_time_validations() {
            debug!(database = %self.database, %err, "commit-time validation failed, rolling back");
            self.rollback_transaction()?;
            return Err(DbError::ValidationFailed(err));
        }
        let result = self.session.commit();
        self.state = ConnectionState::Open;
        result
    }

    pub fn rollback_transaction(&mut self) -> DbResult<()> {
        if self.state != ConnectionState::InTransaction {
            return Err(DbError::NoActiveTransaction);
        }

        self.commit_time_validations.clear();
        let result = self.session.rollback();
        self.state = ConnectionState::Open;
        result
    }

    /// Close the connection, rolling back any open transaction
    pub fn close(&mut self) -> DbResult<()> {
        if self.state == ConnectionState::Closed {
            return Ok(());
        }
        if self.state == ConnectionState::InTransaction {
            self.rollback_transaction()?;
        }

        self.state = ConnectionState::Closed;
        self.session.close()
    }

    pub fn add_commit_time_validation<F>(&mut self, validation: F)
    where
        F: FnMut(&mut TransactableConnection) -> Result<(), DataModificationError> + 'static,
    {
        self.commit_time_validations.push(Box::new(validation));
    }

    pub fn pending_validation_count(&self) -> usize {
        self.commit_time_validations.len()
    }

    /// Run and clear the registered commit-time validations
    ///
    /// Every validation runs; the messages of all failures are combined.
    /// Validations registered while these run are kept for the next pass.
    pub fn execute_commit_time_validations(&mut self) -> Result<(), DataModificationError> {
        let validations = std::mem::take(&mut self.commit_time_validations);
        let mut messages = Vec::new();
        for mut validation in validations {
            if let Err(err) = validation(self) {
                messages.extend(err.into_messages());
            }
        }

        if messages.is_empty() {
            Ok(())
        } else {
            Err(DataModificationError::new(messages))
        }
    }

    pub fn get(&mut self, key: &str) -> DbResult<Option<String>> {
        self.ensure_open()?;
        self.session.get(key)
    }

    pub fn put(&mut self, key: &str, value: &str) -> DbResult<()> {
        self.ensure_open()?;
        self.session.put(key, value)
    }

    pub fn delete(&mut self, key: &str) -> DbResult<()> {
        self.ensure_open()?;
        self.session.delete(key)
    }

    pub fn keys_with_prefix(&mut self, prefix: &str) -> DbResult<Vec<String>> {
        self.ensure_open()?;
        self.session.keys_with_prefix(prefix)
    }
}

impl Drop for TransactableConnection {
    fn drop(&mut self) {
        // Ensure connection is closed and transaction rolled back
        let _ = self.close();
    }
}
