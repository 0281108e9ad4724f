// ============================================================================
// Transaction Change Tracking
// ============================================================================
//
// Each Change is a staged write that is applied on COMMIT and discarded on
// ROLLBACK.
//
// ============================================================================

/// A single staged write in a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Insert or overwrite a value
    Put { key: String, value: String },

    /// Remove a value
    Delete { key: String },
}

impl Change {
    /// Get the key affected by this change
    pub fn key(&self) -> &str {
        match self {
            Change::Put { key, .. } => key,
            Change::Delete { key } => key,
        }
    }

    /// The value this change leaves behind, `None` for deletes
    pub fn value(&self) -> Option<&str> {
        match self {
            Change::Put { value, .. } => Some(value),
            Change::Delete { .. } => None,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Change::Delete { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_key() {
        let change = Change::Put {
            key: "user:1".to_string(),
            value: "alice".to_string(),
        };
        assert_eq!(change.key(), "user:1");
        assert_eq!(change.value(), Some("alice"));
    }

    #[test]
    fn test_change_classification() {
        let delete = Change::Delete {
            key: "user:1".to_string(),
        };
        assert!(delete.is_delete());
        assert_eq!(delete.value(), None);
    }
}
