//! Store errors.

/// Errors from store operations. All of them are fatal to the node
/// whose execution triggered the operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A record with the same id already exists in this workflow.
    #[error("record already exists: {record_id}")]
    DuplicateRecord {
        /// The conflicting record id.
        record_id: String,
    },

    /// No record with the given id.
    #[error("record not found: {record_id}")]
    RecordNotFound {
        /// The missing record id.
        record_id: String,
    },

    /// The backing store failed.
    #[error("store backend failure: {reason}")]
    Backend {
        /// Backend-specific failure detail.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats() {
        assert_eq!(
            StoreError::DuplicateRecord {
                record_id: "email_001".into()
            }
            .to_string(),
            "record already exists: email_001"
        );
        assert_eq!(
            StoreError::RecordNotFound {
                record_id: "email_009".into()
            }
            .to_string(),
            "record not found: email_009"
        );
    }
}
