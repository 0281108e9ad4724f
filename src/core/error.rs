use super::types::DatabaseId;
use thiserror::Error;

/// Errors raised by database backends and the connection layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DbError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Connection is closed")]
    ConnectionClosed,

    #[error("Transaction already active")]
    TransactionAlreadyActive,

    #[error("No active transaction")]
    NoActiveTransaction,

    #[error("Write-write conflict on key '{0}'")]
    WriteConflict(String),

    #[error("Commit failed: {0}")]
    CommitFailed(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("Commit-time validation failed: {0}")]
    ValidationFailed(DataModificationError),
}

pub type DbResult<T> = std::result::Result<T, DbError>;

impl<T> From<std::sync::PoisonError<T>> for DbError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

/// A user-actionable failure carrying the messages to show.
///
/// Raised by mutations and commit-time validations; the lifecycle catches it,
/// rolls back, and presents the messages as top-level modification errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", messages.join(" "))]
pub struct DataModificationError {
    messages: Vec<String>,
}

impl DataModificationError {
    pub fn new(messages: Vec<String>) -> Self {
        Self { messages }
    }

    pub fn single(message: impl Into<String>) -> Self {
        Self {
            messages: vec![message.into()],
        }
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<String> {
        self.messages
    }
}

#[derive(Error, Debug)]
pub enum FrameworkError {
    /// User-actionable; never reaches the host as a fault.
    #[error("Data modification failed: {0}")]
    DataModification(#[from] DataModificationError),

    #[error("Access denied")]
    AccessDenied {
        intermediate_login_required: bool,
        log_in_page: Option<String>,
    },

    #[error("User cannot be accessed: {0}")]
    UserAccessDenied(String),

    #[error("Page disabled: {0}")]
    PageDisabled(String),

    /// A mistake in application code: duplicate keys, bad registrations.
    #[error("Developer error: {0}")]
    Developer(String),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Commit of {database} failed: {source}")]
    Commit {
        database: DatabaseId,
        #[source]
        source: DbError,
    },

    #[error("Deferred side effect failed: {0:#}")]
    SideEffect(anyhow::Error),

    #[error("Identity provider error: {0}")]
    Identity(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl FrameworkError {
    pub fn developer(message: impl Into<String>) -> Self {
        Self::Developer(message.into())
    }

    /// Errors that degrade to a message instead of an error page.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, Self::DataModification(_))
    }

    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied { .. } | Self::UserAccessDenied(_))
    }

    pub fn is_developer_error(&self) -> bool {
        matches!(self, Self::Developer(_))
    }
}

pub type Result<T> = std::result::Result<T, FrameworkError>;
