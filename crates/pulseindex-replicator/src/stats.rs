//! Replicator status snapshot, shared between the ingestion task and the host.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use pulseindex_core::{PendingStats, Position, PulseNumber, ReplicatorState};

/// What a healthcheck would report.
#[derive(Debug, Clone, Serialize)]
pub struct ReplicatorStats {
    pub state: ReplicatorState,
    /// Position of the last record delivered to the engines.
    pub position: Position,
    pub committed_pulse: Option<PulseNumber>,
    pub last_synced_pulse: Option<PulseNumber>,
    /// Records delivered since start.
    pub records: u64,
    /// Pulls cut short by a transport error since start.
    pub pull_errors: u64,
    pub commits: u64,
    /// Failed commit attempts since start.
    pub commit_retries: u64,
    /// Entities written per kind since start.
    pub dumped: BTreeMap<&'static str, u64>,
    pub pending: BTreeMap<&'static str, PendingStats>,
}

impl Default for ReplicatorStats {
    fn default() -> Self {
        Self {
            state: ReplicatorState::Idle,
            position: Position::ZERO,
            committed_pulse: None,
            last_synced_pulse: None,
            records: 0,
            pull_errors: 0,
            commits: 0,
            commit_retries: 0,
            dumped: BTreeMap::new(),
            pending: BTreeMap::new(),
        }
    }
}

/// Cloneable handle to the live stats.
#[derive(Debug, Clone, Default)]
pub struct SharedStats(Arc<Mutex<ReplicatorStats>>);

impl SharedStats {
    pub fn snapshot(&self) -> ReplicatorStats {
        self.0.lock().unwrap().clone()
    }

    pub fn update(&self, f: impl FnOnce(&mut ReplicatorStats)) {
        f(&mut self.0.lock().unwrap());
    }

    pub fn set_state(&self, state: ReplicatorState) {
        self.update(|s| s.state = state);
    }

    pub fn state(&self) -> ReplicatorState {
        self.0.lock().unwrap().state
    }
}
