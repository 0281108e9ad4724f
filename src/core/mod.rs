pub mod error;
pub mod types;

pub use error::{DataModificationError, DbError, DbResult, FrameworkError, Result};
pub use types::DatabaseId;
