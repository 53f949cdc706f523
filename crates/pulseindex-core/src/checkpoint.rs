//! Position tracker: derives the resumption point from durable storage.
//!
//! No separate checkpoint row exists: the highest archived raw record *is*
//! the checkpoint, because raw records commit in the same transaction as the
//! entities composed from them. Records delivered after that position but
//! not yet committed are simply re-requested and re-correlated on restart.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cursor::{Cursor, Position};
use crate::error::IndexerError;
use crate::storage::Storage;
use crate::types::PulseNumber;

/// Where a restarted replicator picks up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumePoint {
    /// Records strictly after this position are requested.
    pub cursor: Cursor,
    /// Highest committed pulse-metadata row; the pulse stream resumes after it.
    pub last_synced_pulse: Option<PulseNumber>,
}

/// Reads the resumption point from storage.
pub struct PositionTracker {
    storage: Arc<dyn Storage>,
    /// Position used when nothing has been archived yet.
    origin: Position,
}

impl PositionTracker {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            origin: Position::ZERO,
        }
    }

    /// Start an empty database from `pulse` instead of the beginning of the export.
    pub fn with_start_pulse(mut self, pulse: Option<PulseNumber>) -> Self {
        if let Some(pulse) = pulse {
            self.origin = Position::new(pulse, 0);
        }
        self
    }

    pub async fn resume(&self) -> Result<ResumePoint, IndexerError> {
        let position = self
            .storage
            .last_record_position()
            .await?
            .unwrap_or(self.origin);
        let last_synced_pulse = self.storage.last_pulse().await?.map(|p| p.number);

        info!(
            %position,
            last_synced_pulse = ?last_synced_pulse,
            "Resuming replication"
        );

        Ok(ResumePoint {
            cursor: Cursor::new(position),
            last_synced_pulse,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageTx;
    use crate::types::PulseInfo;
    use async_trait::async_trait;

    struct Fixed(Option<Position>, Option<PulseInfo>);

    #[async_trait]
    impl Storage for Fixed {
        async fn begin(&self) -> Result<Box<dyn StorageTx>, IndexerError> {
            Err(IndexerError::Other("read-only".into()))
        }
        async fn last_record_position(&self) -> Result<Option<Position>, IndexerError> {
            Ok(self.0)
        }
        async fn last_pulse(&self) -> Result<Option<PulseInfo>, IndexerError> {
            Ok(self.1.clone())
        }
    }

    #[tokio::test]
    async fn empty_storage_resumes_at_zero() {
        let tracker = PositionTracker::new(Arc::new(Fixed(None, None)));
        let point = tracker.resume().await.unwrap();
        assert_eq!(point.cursor.position(), Position::ZERO);
        assert!(point.last_synced_pulse.is_none());
    }

    #[tokio::test]
    async fn empty_storage_honours_start_pulse() {
        let tracker =
            PositionTracker::new(Arc::new(Fixed(None, None))).with_start_pulse(Some(70000));
        let point = tracker.resume().await.unwrap();
        assert_eq!(point.cursor.position(), Position::new(70000, 0));
    }

    #[tokio::test]
    async fn archived_records_win_over_start_pulse() {
        let pulse = PulseInfo {
            number: 65600,
            entropy: "00".into(),
            timestamp: 0,
        };
        let tracker = PositionTracker::new(Arc::new(Fixed(
            Some(Position::new(65610, 42)),
            Some(pulse),
        )))
        .with_start_pulse(Some(70000));
        let point = tracker.resume().await.unwrap();
        assert_eq!(point.cursor.position(), Position::new(65610, 42));
        assert_eq!(point.last_synced_pulse, Some(65600));
    }
}
