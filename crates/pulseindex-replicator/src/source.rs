//! Record and pulse-metadata sources.
//!
//! The export service streams records strictly after a requested position.
//! Besides records it may answer with a relocation: "continue from pulse N",
//! used when the requested range is not served any more.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::pin::Pin;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::Stream;

use pulseindex_core::{ExportedRecord, IndexerError, Position, PulseInfo, PulseNumber};

/// One item of a record stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceItem {
    Record(ExportedRecord),
    /// Continue from the start of this pulse; the rest of the stream is void.
    Relocate(PulseNumber),
}

pub type RecordStream = Pin<Box<dyn Stream<Item = Result<SourceItem, IndexerError>> + Send>>;

/// A remote record stream addressable by position.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Open a stream of at most `count` records positioned strictly after `from`.
    async fn stream(&self, from: Position, count: u32) -> Result<RecordStream, IndexerError>;
}

/// A remote pulse-metadata stream.
#[async_trait]
pub trait PulseSource: Send + Sync {
    /// Up to `count` pulses strictly after `after` (from the first pulse when `None`), ascending.
    async fn pulses(
        &self,
        after: Option<PulseNumber>,
        count: u32,
    ) -> Result<Vec<PulseInfo>, IndexerError>;
}

// ─── In-memory source ────────────────────────────────────────────────────────

#[derive(Default)]
struct Script {
    records: BTreeMap<Position, ExportedRecord>,
    pulses: BTreeMap<PulseNumber, PulseInfo>,
    /// One-shot relocations, keyed by the position they answer.
    relocations: BTreeMap<Position, PulseNumber>,
    /// Cut the next stream after this many records with a transport error.
    interrupt_after: Option<usize>,
    failing_pulse_pulls: u32,
    pulls: u32,
}

/// In-memory record and pulse source for tests and local replays.
#[derive(Default)]
pub struct MemorySource {
    script: Mutex<Script>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = ExportedRecord>) -> Self {
        let source = Self::new();
        for record in records {
            source.push(record);
        }
        source
    }

    pub fn push(&self, record: ExportedRecord) {
        self.script
            .lock()
            .unwrap()
            .records
            .insert(record.position(), record);
    }

    pub fn push_pulse(&self, pulse: PulseInfo) {
        self.script.lock().unwrap().pulses.insert(pulse.number, pulse);
    }

    /// Answer the next request for `from` with a relocation to `to`.
    pub fn relocate_after(&self, from: Position, to: PulseNumber) {
        self.script.lock().unwrap().relocations.insert(from, to);
    }

    /// Break the next record stream after `n` records.
    pub fn interrupt_next(&self, n: usize) {
        self.script.lock().unwrap().interrupt_after = Some(n);
    }

    /// Fail the next `n` pulse-metadata pulls.
    pub fn fail_next_pulse_pulls(&self, n: u32) {
        self.script.lock().unwrap().failing_pulse_pulls = n;
    }

    /// Number of record streams opened so far.
    pub fn pulls(&self) -> u32 {
        self.script.lock().unwrap().pulls
    }
}

#[async_trait]
impl RecordSource for MemorySource {
    async fn stream(&self, from: Position, count: u32) -> Result<RecordStream, IndexerError> {
        let mut script = self.script.lock().unwrap();
        script.pulls += 1;

        let items: Vec<Result<SourceItem, IndexerError>> =
            if let Some(to) = script.relocations.remove(&from) {
                vec![Ok(SourceItem::Relocate(to))]
            } else {
                let mut items: Vec<_> = script
                    .records
                    .range((Bound::Excluded(from), Bound::Unbounded))
                    .take(count as usize)
                    .map(|(_, r)| Ok(SourceItem::Record(r.clone())))
                    .collect();
                if let Some(n) = script.interrupt_after.take() {
                    items.truncate(n);
                    items.push(Err(IndexerError::Transport("stream reset".into())));
                }
                items
            };

        Ok(Box::pin(futures::stream::iter(items)))
    }
}

#[async_trait]
impl PulseSource for MemorySource {
    async fn pulses(
        &self,
        after: Option<PulseNumber>,
        count: u32,
    ) -> Result<Vec<PulseInfo>, IndexerError> {
        let mut script = self.script.lock().unwrap();
        if script.failing_pulse_pulls > 0 {
            script.failing_pulse_pulls -= 1;
            return Err(IndexerError::Transport("pulse stream unavailable".into()));
        }
        let lower = match after {
            Some(p) => Bound::Excluded(p),
            None => Bound::Unbounded,
        };
        Ok(script
            .pulses
            .range((lower, Bound::Unbounded))
            .take(count as usize)
            .map(|(_, p)| p.clone())
            .collect())
    }
}
