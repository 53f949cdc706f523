//! Record and flush handler traits + registry.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::IndexerError;
use crate::storage::StorageTx;
use crate::types::ExportedRecord;

/// Sizes of a collector's pending tables, exported as gauges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingStats {
    pub requests: usize,
    pub results: usize,
    pub builders: usize,
    pub links: usize,
    /// Composed entities waiting for the next commit.
    pub cached: usize,
}

impl PendingStats {
    pub fn total(&self) -> usize {
        self.requests + self.results + self.builders + self.links
    }
}

/// Consumes records one at a time, in arrival order.
///
/// `handle` is side-effect only: it may park legs, compose entities into the
/// handler's output cache, or ignore the record. It never fails.
pub trait RecordHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn handle(&self, record: &ExportedRecord);

    fn pending(&self) -> PendingStats {
        PendingStats::default()
    }
}

/// Writes a handler's output cache inside a commit.
#[async_trait]
pub trait FlushHandler: Send + Sync {
    /// Entity kind written by this handler (metric label).
    fn kind(&self) -> &'static str;

    /// Write the current output cache into `tx`; returns the number of entities written.
    ///
    /// Must not modify the cache: a failed commit retries with the same contents.
    async fn flush(&self, tx: &mut dyn StorageTx) -> Result<usize, IndexerError>;

    /// Called after the transaction durably committed; drops the flushed
    /// entities from the cache and returns how many were dropped.
    fn on_committed(&self) -> usize;
}

/// Registry of record handlers (fan-out) and flush handlers (commit order).
pub struct HandlerRegistry {
    record_handlers: Vec<Arc<dyn RecordHandler>>,
    flush_handlers: Vec<Arc<dyn FlushHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            record_handlers: vec![],
            flush_handlers: vec![],
        }
    }

    /// Register a handler that receives every record.
    pub fn on_record(&mut self, handler: Arc<dyn RecordHandler>) {
        self.record_handlers.push(handler);
    }

    /// Register a handler flushed at every commit, after those registered before it.
    pub fn on_flush(&mut self, handler: Arc<dyn FlushHandler>) {
        self.flush_handlers.push(handler);
    }

    /// Deliver a record to every record handler.
    pub fn dispatch(&self, record: &ExportedRecord) {
        for handler in &self.record_handlers {
            handler.handle(record);
        }
    }

    pub fn flush_handlers(&self) -> &[Arc<dyn FlushHandler>] {
        &self.flush_handlers
    }

    /// Pending table sizes per record handler.
    pub fn pending(&self) -> Vec<(&'static str, PendingStats)> {
        self.record_handlers
            .iter()
            .map(|h| (h.name(), h.pending()))
            .collect()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
