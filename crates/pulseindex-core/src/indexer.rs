//! Replicator configuration and state types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{Prototypes, PulseNumber};

/// Configuration for a replicator instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicatorConfig {
    /// Maximum number of records requested per pull.
    pub batch_size: u32,
    /// Pause after a short batch before pulling again (milliseconds).
    pub request_delay_ms: u64,
    /// Pause between attempts of a failed commit (milliseconds).
    pub commit_retry_delay_ms: u64,
    /// Maximum number of pulses requested per pulse-metadata pull.
    pub pulse_batch_size: u32,
    /// First pulse to replicate when the database is empty. `None` = start of the export.
    pub start_pulse: Option<PulseNumber>,
    /// Contract prototypes the collectors classify against.
    pub prototypes: Prototypes,
}

impl Default for ReplicatorConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            request_delay_ms: 1000,
            commit_retry_delay_ms: 1000,
            pulse_batch_size: 100,
            start_pulse: None,
            prototypes: Prototypes::default(),
        }
    }
}

impl ReplicatorConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn commit_retry_delay(&self) -> Duration {
        Duration::from_millis(self.commit_retry_delay_ms)
    }
}

/// Runtime state of the replicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicatorState {
    /// Not yet started.
    Idle,
    /// Pulling full batches.
    Replicating,
    /// The stream is drained; waiting before the next pull.
    Waiting,
    /// Inside a commit (possibly retrying).
    Committing,
    /// Shutdown requested; finishing the current cycle.
    Stopping,
    /// Terminated.
    Stopped,
}

impl std::fmt::Display for ReplicatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Replicating => write!(f, "replicating"),
            Self::Waiting => write!(f, "waiting"),
            Self::Committing => write!(f, "committing"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}
