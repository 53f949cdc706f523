//! Commit coordinator: writes every flush handler's cache in one transaction.
//!
//! A failed attempt is rolled back and retried after a fixed delay, without
//! bound. Caches are only confirmed after the transaction committed, so a
//! retry writes exactly what the failed attempt tried to write (plus nothing
//! else: the ingestion task is blocked here).

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use pulseindex_core::{HandlerRegistry, IndexerError, PulseNumber, Storage};
use pulseindex_observability::IndexerMetrics;

use crate::stats::SharedStats;

/// Outcome of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReport {
    pub pulse: PulseNumber,
    /// Attempts needed, including the successful one.
    pub attempts: u32,
    /// Entities written per kind, in flush order.
    pub written: Vec<(&'static str, usize)>,
}

impl CommitReport {
    pub fn total(&self) -> usize {
        self.written.iter().map(|(_, n)| n).sum()
    }
}

pub struct CommitCoordinator {
    storage: Arc<dyn Storage>,
    handlers: Arc<HandlerRegistry>,
    retry_delay: Duration,
    metrics: IndexerMetrics,
    stats: SharedStats,
}

impl CommitCoordinator {
    pub fn new(
        storage: Arc<dyn Storage>,
        handlers: Arc<HandlerRegistry>,
        retry_delay: Duration,
        metrics: IndexerMetrics,
        stats: SharedStats,
    ) -> Self {
        Self {
            storage,
            handlers,
            retry_delay,
            metrics,
            stats,
        }
    }

    /// Commit everything cached for `pulse`, retrying until it succeeds.
    pub async fn commit(&self, pulse: PulseNumber) -> CommitReport {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self.try_commit().await {
                Ok(written) => {
                    let report = CommitReport {
                        pulse,
                        attempts,
                        written,
                    };
                    self.committed(&report);
                    return report;
                }
                Err(e) => {
                    error!(pulse, attempt = attempts, error = %e, "Commit failed, retrying");
                    self.metrics.record_commit_failure();
                    self.stats.update(|s| s.commit_retries += 1);
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }

    async fn try_commit(&self) -> Result<Vec<(&'static str, usize)>, IndexerError> {
        let mut tx = self.storage.begin().await?;
        let mut written = Vec::with_capacity(self.handlers.flush_handlers().len());

        for handler in self.handlers.flush_handlers() {
            match handler.flush(&mut *tx).await {
                Ok(n) => written.push((handler.kind(), n)),
                Err(e) => {
                    if let Err(rollback) = tx.rollback().await {
                        warn!(error = %rollback, "Rollback failed");
                    }
                    return Err(IndexerError::Handler {
                        handler: handler.kind().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        tx.commit().await?;

        for handler in self.handlers.flush_handlers() {
            handler.on_committed();
        }
        Ok(written)
    }

    fn committed(&self, report: &CommitReport) {
        for (kind, n) in &report.written {
            if *n > 0 {
                self.metrics.record_dumped(kind, *n as u64);
            }
        }
        self.metrics.record_committed_pulse(report.pulse);
        self.stats.update(|s| {
            s.commits += 1;
            s.committed_pulse = Some(report.pulse);
            for (kind, n) in &report.written {
                *s.dumped.entry(*kind).or_default() += *n as u64;
            }
        });
        info!(
            pulse = report.pulse,
            entities = report.total(),
            attempts = report.attempts,
            "Pulse committed"
        );
    }
}
