//! The main index loop: pulls batches and commits at pulse boundaries.
//!
//! For every pull:
//!   - each record goes to every record handler, in arrival order
//!   - a record from a new pulse first commits the previous pulse
//!   - a short batch means the stream is drained: commit the open pulse,
//!     then wait `request_delay` before pulling again
//!   - a relocation moves the cursor to the start of the signalled pulse and
//!     waits `request_delay` like a drained stream

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use pulseindex_core::{
    Cursor, HandlerRegistry, Position, PulseNumber, ReplicatorConfig, ReplicatorState, Storage,
};
use pulseindex_observability::IndexerMetrics;

use crate::commit::CommitCoordinator;
use crate::fetcher::RecordFetcher;
use crate::pulse_sync::PulseSync;
use crate::source::RecordSource;
use crate::stats::SharedStats;

/// What one pull did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// A full batch; pull again right away.
    Full,
    /// Fewer records than requested; the open pulse was committed.
    Drained,
    /// The source moved the cursor to this pulse.
    Relocated(PulseNumber),
}

/// The core index loop implementation.
pub struct IndexLoop {
    config: ReplicatorConfig,
    fetcher: RecordFetcher,
    handlers: Arc<HandlerRegistry>,
    coordinator: CommitCoordinator,
    pulse_sync: PulseSync,
    cursor: Cursor,
    /// Pulse of the records delivered since the last commit.
    open_pulse: Option<PulseNumber>,
    metrics: IndexerMetrics,
    stats: SharedStats,
}

impl IndexLoop {
    pub fn new(
        config: ReplicatorConfig,
        source: Arc<dyn RecordSource>,
        storage: Arc<dyn Storage>,
        handlers: Arc<HandlerRegistry>,
        pulse_sync: PulseSync,
        cursor: Cursor,
    ) -> Self {
        let metrics = IndexerMetrics::global();
        let stats = SharedStats::default();
        let coordinator = CommitCoordinator::new(
            storage,
            handlers.clone(),
            config.commit_retry_delay(),
            metrics.clone(),
            stats.clone(),
        );
        stats.update(|s| {
            s.position = cursor.position();
            s.last_synced_pulse = pulse_sync.last_fetched();
        });
        Self {
            config,
            fetcher: RecordFetcher::new(source),
            handlers,
            coordinator,
            pulse_sync,
            cursor,
            open_pulse: None,
            metrics,
            stats,
        }
    }

    pub fn position(&self) -> Position {
        self.cursor.position()
    }

    pub fn stats(&self) -> SharedStats {
        self.stats.clone()
    }

    /// Run until `cancel` fires. Cancellation is observed between pulls and
    /// during the drained-stream wait; an open pulse is committed before exit.
    pub async fn run(&mut self, cancel: CancellationToken) {
        info!(position = %self.cursor.position(), "Replication started");

        while !cancel.is_cancelled() {
            self.stats.set_state(ReplicatorState::Replicating);
            if self.step().await == Step::Full {
                continue;
            }
            self.stats.set_state(ReplicatorState::Waiting);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.request_delay()) => {}
            }
        }

        self.stats.set_state(ReplicatorState::Stopping);
        if let Some(pulse) = self.open_pulse.take() {
            self.commit(pulse).await;
        }
        self.stats.set_state(ReplicatorState::Stopped);
        info!(position = %self.cursor.position(), "Replication stopped");
    }

    /// One pull: dispatch the batch, commit at pulse boundaries.
    pub async fn step(&mut self) -> Step {
        let requested = self.config.batch_size;
        let batch = self.fetcher.fetch(self.cursor.position(), requested).await;

        for record in &batch.records {
            let pulse = record.record.pulse();
            if let Some(open) = self.open_pulse {
                if open != pulse {
                    self.commit(open).await;
                }
            }
            self.handlers.dispatch(record);
            self.cursor.advance(record.position());
            self.open_pulse = Some(pulse);
        }

        let delivered = batch.records.len() as u64;
        self.metrics.record_records(delivered);
        let position = self.cursor.position();
        let interrupted = batch.error.is_some();
        self.stats.update(|s| {
            s.records += delivered;
            s.position = position;
            if interrupted {
                s.pull_errors += 1;
            }
        });

        if let Some(pulse) = batch.relocate {
            info!(from = %position, to = pulse, "Source relocated the stream");
            self.cursor.relocate(pulse);
            self.stats.update(|s| s.position = Position::new(pulse, 0));
            return Step::Relocated(pulse);
        }

        if !batch.is_short(requested) {
            return Step::Full;
        }

        debug!(%position, delivered, requested, "Stream drained");
        if let Some(pulse) = self.open_pulse.take() {
            self.commit(pulse).await;
        }
        Step::Drained
    }

    async fn commit(&mut self, pulse: PulseNumber) {
        self.stats.set_state(ReplicatorState::Committing);
        self.pulse_sync.sync_to(pulse).await;
        self.coordinator.commit(pulse).await;

        let last_synced = self.pulse_sync.last_fetched();
        if let Some(p) = last_synced {
            self.metrics.record_last_synced_pulse(p);
        }
        let pending = self.handlers.pending();
        for (engine, sizes) in &pending {
            self.metrics.record_pending(engine, sizes);
        }
        self.stats.update(|s| {
            s.last_synced_pulse = last_synced;
            s.pending = pending.into_iter().collect();
            s.state = ReplicatorState::Replicating;
        });
        self.open_pulse = None;
    }
}
