// ============================================================================
// Database Backends
// ============================================================================
//
// The seam between the connection layer and an actual database. A Database
// hands out Sessions; a Session speaks begin/commit/rollback and simple
// key/value queries. `MemoryDatabase` is the bundled implementation.
//
// ============================================================================

pub mod memory;

pub use memory::{MemoryDatabase, MemoryStats};

use crate::core::DbResult;

/// A logical database that can open sessions
pub trait Database: Send + Sync {
    /// Name used in logs and error reports
    fn name(&self) -> &str;

    /// Open a new session
    fn connect(&self) -> DbResult<Box<dyn Session>>;
}

/// One open session against a database
pub trait Session {
    fn begin(&mut self) -> DbResult<()>;
    fn commit(&mut self) -> DbResult<()>;
    fn rollback(&mut self) -> DbResult<()>;
    fn close(&mut self) -> DbResult<()>;
    fn is_in_transaction(&self) -> bool;

    fn get(&mut self, key: &str) -> DbResult<Option<String>>;
    fn put(&mut self, key: &str, value: &str) -> DbResult<()>;
    fn delete(&mut self, key: &str) -> DbResult<()>;
    fn keys_with_prefix(&mut self, prefix: &str) -> DbResult<Vec<String>>;
}
