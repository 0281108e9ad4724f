use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a logical database within an application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DatabaseId {
    Primary,
    Secondary(String),
}

impl DatabaseId {
    /// `None` and the empty string both mean the primary database.
    pub fn from_name(name: Option<&str>) -> Self {
        match name {
            Some(name) if !name.is_empty() => DatabaseId::Secondary(name.to_string()),
            _ => DatabaseId::Primary,
        }
    }

    pub fn secondary_name(&self) -> Option<&str> {
        match self {
            DatabaseId::Primary => None,
            DatabaseId::Secondary(name) => Some(name),
        }
    }

    pub fn is_primary(&self) -> bool {
        matches!(self, DatabaseId::Primary)
    }
}

impl fmt::Display for DatabaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseId::Primary => write!(f, "primary database"),
            DatabaseId::Secondary(name) => write!(f, "secondary database '{}'", name),
        }
    }
}
