//! Error types for the pulseindex pipeline.

use thiserror::Error;

/// Errors that can occur while replicating the record stream.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Handler error in '{handler}': {reason}")]
    Handler { handler: String, reason: String },

    #[error("Update of {table} keyed by {key} affected {affected} rows, expected {expected}")]
    RowCount {
        table: &'static str,
        key: String,
        expected: u64,
        affected: u64,
    },

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Replicator aborted: {reason}")]
    Aborted { reason: String },

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    /// Returns `true` for record/pulse source failures (retried on the next pull).
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns `true` for failures that abort a commit (retried as a whole).
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::RowCount { .. } | Self::Handler { .. }
        )
    }

    /// Build a `RowCount` error for an update that must affect exactly one row.
    pub fn row_count(table: &'static str, key: impl ToString, affected: u64) -> Self {
        Self::RowCount {
            table,
            key: key.to_string(),
            expected: 1,
            affected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_count_is_storage_class() {
        let err = IndexerError::row_count("members", "65537.4", 0);
        assert!(err.is_storage());
        assert!(!err.is_transport());
        assert_eq!(
            err.to_string(),
            "Update of members keyed by 65537.4 affected 0 rows, expected 1"
        );
    }
}
