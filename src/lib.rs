// ============================================================================
// ewfcore
// ============================================================================
//
// Request lifecycle and transactional data access for server-side pages.
//
// A host creates one `RequestState` per request and hands it to
// `execute_page`, which drives the page through state restoration, data
// loading, post-back processing, commit and navigation. Database work is
// coordinated by `DataAccessState`: connections open lazily, commit in a
// fixed order, and side effects wait until everything has committed.
//
// ============================================================================

pub mod config;
pub mod connection;
pub mod core;
pub mod critical_region;
pub mod data_access;
pub mod modification;
pub mod page;
pub mod request;
pub mod session;
pub mod storage;
pub mod transaction;
pub mod web;

pub use config::{AppConfig, InstallationConfig, InstallationType};
pub use connection::{DatabaseConfig, DatabaseRegistry, TransactableConnection};
pub use core::{DataModificationError, DatabaseId, DbError, FrameworkError, Result};
pub use critical_region::execute_as_critical_region;
pub use data_access::{DataAccessState, TransactionOutcome};
pub use modification::{DataModification, ModificationContext, ModificationOutcome};
pub use page::{execute_page, LifecycleOutcome, Page, PageCatalog, PageInfo, PageRequest, RenderedPage};
pub use request::{RequestEnvironment, RequestState};
pub use session::{SessionState, StatusMessage};
pub use storage::{Database, MemoryDatabase};
pub use web::{router, AppHost, HostRequest, HostResponse};
