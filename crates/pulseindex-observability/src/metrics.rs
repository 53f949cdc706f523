//! PulseIndex metrics definitions.
//!
//! All metrics use OpenTelemetry conventions.

use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Meter},
    KeyValue,
};
use pulseindex_core::{PendingStats, PulseNumber};

/// Central metrics handle for the replicator.
#[derive(Clone)]
pub struct IndexerMetrics {
    pub records: Counter<u64>,
    pub entities_dumped: Counter<u64>,
    pub commit_failures: Counter<u64>,
    pub pending: Gauge<u64>,
    pub last_synced_pulse: Gauge<u64>,
    pub committed_pulse: Gauge<u64>,
}

impl IndexerMetrics {
    pub fn new(meter: &Meter) -> Self {
        Self {
            records: meter
                .u64_counter("pulseindex.records")
                .with_description("Records delivered to the correlation engines")
                .build(),
            entities_dumped: meter
                .u64_counter("pulseindex.entities_dumped")
                .with_description("Entities written by committed transactions")
                .build(),
            commit_failures: meter
                .u64_counter("pulseindex.commit_failures")
                .with_description("Commit attempts that failed and were retried")
                .build(),
            pending: meter
                .u64_gauge("pulseindex.pending")
                .with_description("Entries parked in an engine's pending tables")
                .build(),
            last_synced_pulse: meter
                .u64_gauge("pulseindex.last_synced_pulse")
                .with_description("Highest pulse whose metadata was fetched")
                .build(),
            committed_pulse: meter
                .u64_gauge("pulseindex.committed_pulse")
                .with_description("Highest pulse durably committed")
                .build(),
        }
    }

    /// Metrics bound to the global meter provider (no-op unless the host installs one).
    pub fn global() -> Self {
        Self::new(&global::meter("pulseindex"))
    }

    pub fn record_records(&self, n: u64) {
        self.records.add(n, &[]);
    }

    pub fn record_dumped(&self, kind: &str, n: u64) {
        self.entities_dumped
            .add(n, &[KeyValue::new("kind", kind.to_string())]);
    }

    pub fn record_commit_failure(&self) {
        self.commit_failures.add(1, &[]);
    }

    pub fn record_pending(&self, engine: &str, stats: &PendingStats) {
        for (map, size) in [
            ("requests", stats.requests),
            ("results", stats.results),
            ("builders", stats.builders),
            ("links", stats.links),
            ("cached", stats.cached),
        ] {
            self.pending.record(
                size as u64,
                &[
                    KeyValue::new("engine", engine.to_string()),
                    KeyValue::new("map", map),
                ],
            );
        }
    }

    pub fn record_last_synced_pulse(&self, pulse: PulseNumber) {
        self.last_synced_pulse.record(u64::from(pulse), &[]);
    }

    pub fn record_committed_pulse(&self, pulse: PulseNumber) {
        self.committed_pulse.record(u64::from(pulse), &[]);
    }
}
