//! Transactions of the in-memory backend
//!
//! Writes are staged per transaction and applied together on commit. A
//! commit fails when a key the transaction read or wrote has changed since
//! it was first touched.

pub mod change;
pub mod state;

pub use change::Change;
pub use state::{Transaction, TransactionId, TransactionState};
