//! Record fetcher: drains one pull from a [`RecordSource`] into a batch.

use std::sync::Arc;

use futures::StreamExt;
use tracing::warn;

use pulseindex_core::{ExportedRecord, IndexerError, Position, PulseNumber};

use crate::source::{RecordSource, SourceItem};

/// Result of one pull.
#[derive(Debug, Default)]
pub struct RecordBatch {
    /// Records in arrival order.
    pub records: Vec<ExportedRecord>,
    /// Relocation signalled by the source; the stream was abandoned there.
    pub relocate: Option<PulseNumber>,
    /// Transport error that cut the pull short; `records` holds what arrived before it.
    pub error: Option<IndexerError>,
}

impl RecordBatch {
    /// `true` when the source returned fewer records than requested.
    pub fn is_short(&self, requested: u32) -> bool {
        self.records.len() < requested as usize
    }
}

/// Wraps a [`RecordSource`] and collects each stream into a [`RecordBatch`].
pub struct RecordFetcher {
    source: Arc<dyn RecordSource>,
}

impl RecordFetcher {
    pub fn new(source: Arc<dyn RecordSource>) -> Self {
        Self { source }
    }

    /// Pull up to `count` records after `from`.
    ///
    /// Never fails: a transport error ends the pull and is reported in the
    /// batch alongside the records received before it.
    pub async fn fetch(&self, from: Position, count: u32) -> RecordBatch {
        let mut batch = RecordBatch::default();

        let mut stream = match self.source.stream(from, count).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(%from, error = %e, "Failed to open record stream");
                batch.error = Some(e);
                return batch;
            }
        };

        while let Some(item) = stream.next().await {
            match item {
                Ok(SourceItem::Record(record)) => {
                    batch.records.push(record);
                    if batch.records.len() >= count as usize {
                        break;
                    }
                }
                Ok(SourceItem::Relocate(pulse)) => {
                    batch.relocate = Some(pulse);
                    break;
                }
                Err(e) => {
                    warn!(
                        %from,
                        received = batch.records.len(),
                        error = %e,
                        "Record stream interrupted, accepting partial batch"
                    );
                    batch.error = Some(e);
                    break;
                }
            }
        }

        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use pulseindex_core::types::CallResult;
    use pulseindex_core::{Record, RecordBody, RecordId};

    fn record(pulse: PulseNumber, n: u32) -> ExportedRecord {
        ExportedRecord {
            record_number: n,
            record: Record::new(
                RecordId::new(pulse, n),
                RecordBody::Result(CallResult {
                    object: None,
                    request: RecordId::new(pulse, 0),
                    payload: vec![],
                }),
            ),
        }
    }

    fn source() -> Arc<MemorySource> {
        Arc::new(MemorySource::with_records((1..=5).map(|n| record(65600, n))))
    }

    #[tokio::test]
    async fn fetch_respects_position_and_count() {
        let fetcher = RecordFetcher::new(source());
        let batch = fetcher.fetch(Position::new(65600, 1), 3).await;
        let positions: Vec<_> = batch.records.iter().map(|r| r.position()).collect();
        assert_eq!(
            positions,
            vec![
                Position::new(65600, 2),
                Position::new(65600, 3),
                Position::new(65600, 4)
            ]
        );
        assert!(!batch.is_short(3));
        assert!(batch.error.is_none());
    }

    #[tokio::test]
    async fn transport_error_keeps_partial_batch() {
        let source = source();
        source.interrupt_next(2);
        let fetcher = RecordFetcher::new(source);
        let batch = fetcher.fetch(Position::ZERO, 10).await;
        assert_eq!(batch.records.len(), 2);
        assert!(batch.error.as_ref().unwrap().is_transport());
        assert!(batch.is_short(10));
    }

    #[tokio::test]
    async fn relocation_ends_the_pull() {
        let source = source();
        source.relocate_after(Position::new(65600, 5), 65700);
        let fetcher = RecordFetcher::new(source);
        let batch = fetcher.fetch(Position::new(65600, 5), 10).await;
        assert!(batch.records.is_empty());
        assert_eq!(batch.relocate, Some(65700));
    }
}
