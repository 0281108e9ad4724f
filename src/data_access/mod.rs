// ============================================================================
// Data Access State
// ============================================================================
//
// Holds the connections opened during one unit of work. Connections are
// opened (and, for auto-transactional databases, begun) on first use, and
// are committed or rolled back together at the end.
//
// Commit order is primary first, then secondaries in the order their
// connections were opened. A failed commit rolls back that connection and
// every later one; earlier commits stay. This is not two-phase commit.
//
// ============================================================================

pub mod cache;

pub use cache::{CacheSuspension, QueryCache};

use crate::connection::{DatabaseRegistry, TransactableConnection};
use crate::core::{DataModificationError, DatabaseId, DbError, DbResult, FrameworkError, Result};
use std::rc::Rc;
use tracing::{debug, info, warn};

/// How a commit of every open connection ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionOutcome {
    Committed {
        databases: Vec<DatabaseId>,
    },
    RolledBack {
        failed: DatabaseId,
        error: DbError,
        committed: Vec<DatabaseId>,
        rolled_back: Vec<DatabaseId>,
    },
}

impl TransactionOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, TransactionOutcome::Committed { .. })
    }

    pub fn into_result(self) -> Result<()> {
        match self {
            TransactionOutcome::Committed { .. } => Ok(()),
            TransactionOutcome::RolledBack { failed, error, .. } => Err(FrameworkError::Commit {
                database: failed,
                source: error,
            }),
        }
    }
}

pub struct DataAccessState {
    databases: DatabaseRegistry,
    primary: Option<TransactableConnection>,
    /// In the order they were opened
    secondaries: Vec<TransactableConnection>,
    cache: Rc<QueryCache>,
}

impl DataAccessState {
    pub fn new(databases: DatabaseRegistry) -> Self {
        Self {
            databases,
            primary: None,
            secondaries: Vec::new(),
            cache: Rc::new(QueryCache::new()),
        }
    }

    pub fn databases(&self) -> &DatabaseRegistry {
        &self.databases
    }

    /// Return the connection for a database, opening it on first use
    ///
    /// `None` or an empty name selects the primary database.
    pub fn get_connection(&mut self, name: Option<&str>) -> Result<&mut TransactableConnection> {
        let id = DatabaseId::from_name(name);
        self.connection(&id)
    }

    pub fn connection(&mut self, id: &DatabaseId) -> Result<&mut TransactableConnection> {
        match id {
            DatabaseId::Primary => {
                if self.primary.is_none() {
                    let connection = self.open(id)?;
                    return Ok(self.primary.insert(connection));
                }
                self.primary
                    .as_mut()
                    .ok_or_else(|| FrameworkError::developer("primary connection vanished"))
            }
            DatabaseId::Secondary(_) => {
                let index = match self.secondaries.iter().position(|c| c.database() == id) {
                    Some(index) => index,
                    None => {
                        let connection = self.open(id)?;
                        self.secondaries.push(connection);
                        self.secondaries.len() - 1
                    }
                };
                Ok(&mut self.secondaries[index])
            }
        }
    }

    fn open(&self, id: &DatabaseId) -> Result<TransactableConnection> {
        let registered = self.databases.get(id).ok_or_else(|| {
            FrameworkError::developer(format!("{} is not configured", id))
        })?;

        let mut connection = TransactableConnection::open(
            id.clone(),
            registered.backend.as_ref(),
            registered.automatic_transactions,
        )?;
        if registered.automatic_transactions {
            connection.begin_transaction()?;
        }
        Ok(connection)
    }

    pub fn open_connection_count(&self) -> usize {
        self.primary.iter().count() + self.secondaries.len()
    }

    pub fn has_open_connections(&self) -> bool {
        self.open_connection_count() > 0
    }

    /// Open connections, primary first
    fn connections_mut(&mut self) -> impl Iterator<Item = &mut TransactableConnection> {
        self.primary.iter_mut().chain(self.secondaries.iter_mut())
    }

    fn take_connections(&mut self) -> Vec<TransactableConnection> {
        let mut connections: Vec<_> = self.primary.take().into_iter().collect();
        connections.append(&mut self.secondaries);
        connections
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn query(&mut self, database: Option<&str>, key: &str) -> Result<Option<String>> {
        let id = DatabaseId::from_name(database);
        if let Some(cached) = self.cache.get(&id, key) {
            return Ok(cached);
        }

        let value = self.connection(&id)?.get(key)?;
        self.cache.insert(&id, key, value.clone());
        Ok(value)
    }

    pub fn put(&mut self, database: Option<&str>, key: &str, value: &str) -> Result<()> {
        let id = DatabaseId::from_name(database);
        self.connection(&id)?.put(key, value)?;
        self.cache.invalidate(&id, key);
        Ok(())
    }

    pub fn delete(&mut self, database: Option<&str>, key: &str) -> Result<()> {
        let id = DatabaseId::from_name(database);
        self.connection(&id)?.delete(key)?;
        self.cache.invalidate(&id, key);
        Ok(())
    }

    pub fn keys_with_prefix(&mut self, database: Option<&str>, prefix: &str) -> Result<Vec<String>> {
        Ok(self.get_connection(database)?.keys_with_prefix(prefix)?)
    }

    pub fn disable_cache(&self) -> CacheSuspension {
        self.cache.suspend()
    }

    /// Drop every cached result
    pub fn reset_cache(&self) {
        self.cache.clear();
    }

    pub fn cache(&self) -> &Rc<QueryCache> {
        &self.cache
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Run the commit-time validations of every auto-transactional connection
    pub fn pre_commit_validate(&mut self) -> std::result::Result<(), DataModificationError> {
        let mut messages = Vec::new();
        for connection in self.connections_mut() {
            if !connection.automatic_transactions() {
                continue;
            }
            if let Err(err) = connection.execute_commit_time_validations() {
                messages.extend(err.into_messages());
            }
        }

        if messages.is_empty() {
            Ok(())
        } else {
            Err(DataModificationError::new(messages))
        }
    }

    /// Commit every open auto-transactional connection and close them all
    pub fn commit_all(&mut self) -> TransactionOutcome {
        let mut committed = Vec::new();
        let mut rolled_back = Vec::new();
        let mut failure: Option<(DatabaseId, DbError)> = None;

        for mut connection in self.take_connections() {
            let id = connection.database().clone();
            if connection.automatic_transactions() && connection.is_in_transaction() {
                if failure.is_some() {
                    if let Err(err) = connection.rollback_transaction() {
                        warn!(database = %id, error = %err, "rollback after failed commit failed");
                    }
                    rolled_back.push(id.clone());
                } else {
                    match connection.commit_transaction() {
                        Ok(()) => {
                            debug!(database = %id, "committed");
                            committed.push(id.clone());
                        }
                        Err(err) => {
                            warn!(database = %id, error = %err, "commit failed, rolling back remaining connections");
                            rolled_back.push(id.clone());
                            failure = Some((id.clone(), err));
                        }
                    }
                }
            }
            if let Err(err) = connection.close() {
                warn!(database = %id, error = %err, "failed to close connection");
            }
        }
        self.cache.clear();

        match failure {
            None => {
                if !committed.is_empty() {
                    info!(databases = committed.len(), "transactions committed");
                }
                TransactionOutcome::Committed {
                    databases: committed,
                }
            }
            Some((failed, error)) => TransactionOutcome::RolledBack {
                failed,
                error,
                committed,
                rolled_back,
            },
        }
    }

    /// Roll back every open auto-transactional connection and close them all
    ///
    /// Every connection is attempted; the first failure is returned.
    pub fn rollback_all(&mut self) -> DbResult<()> {
        let mut first_error = None;

        for mut connection in self.take_connections() {
            let id = connection.database().clone();
            if connection.automatic_transactions() && connection.is_in_transaction() {
                match connection.rollback_transaction() {
                    Ok(()) => debug!(database = %id, "rolled back"),
                    Err(err) => {
                        warn!(database = %id, error = %err, "rollback failed");
                        first_error.get_or_insert(err);
                    }
                }
            }
            if let Err(err) = connection.close() {
                warn!(database = %id, error = %err, "failed to close connection");
                first_error.get_or_insert(err);
            }
        }
        self.cache.clear();

        match first_error {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    /// Run `f` in a separate unit of work over the same databases
    ///
    /// Commits when `f` succeeds and rolls back when it fails.
    pub fn execute_isolated<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut DataAccessState) -> Result<T>,
    {
        let mut isolated = DataAccessState::new(self.databases.clone());
        match f(&mut isolated) {
            Ok(value) => {
                isolated
                    .pre_commit_validate()
                    .map_err(FrameworkError::from)
                    .and_then(|()| isolated.commit_all().into_result())
                    .inspect_err(|_| {
                        let _ = isolated.rollback_all();
                    })?;
                Ok(value)
            }
            Err(err) => {
                isolated.rollback_all()?;
                Err(err)
            }
        }
    }
}

impl Drop for DataAccessState {
    fn drop(&mut self) {
        let _ = self.rollback_all();
    }
}
