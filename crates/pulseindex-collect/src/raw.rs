//! Verbatim archival of every record; also the source of the resume position.

use std::sync::Arc;

use pulseindex_core::{ExportedRecord, PendingStats, RecordHandler};

use crate::cache::OutputCache;

#[derive(Default)]
pub struct RawArchiver {
    output: Arc<OutputCache<ExportedRecord>>,
}

impl RawArchiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output(&self) -> Arc<OutputCache<ExportedRecord>> {
        self.output.clone()
    }
}

impl RecordHandler for RawArchiver {
    fn name(&self) -> &'static str {
        "raw_record"
    }

    fn handle(&self, record: &ExportedRecord) {
        self.output.push(record.clone());
    }

    fn pending(&self) -> PendingStats {
        PendingStats {
            cached: self.output.len(),
            ..Default::default()
        }
    }
}
