//! Fluent builder API for replicator configuration.
//!
//! # Example
//!
//! ```rust
//! use pulseindex_replicator::ReplicatorBuilder;
//!
//! let config = ReplicatorBuilder::new()
//!     .batch_size(500)
//!     .request_delay_ms(250)
//!     .start_pulse(70_000)
//!     .build_config();
//! assert_eq!(config.batch_size, 500);
//! ```

use pulseindex_core::{Prototypes, PulseNumber, ReplicatorConfig};

/// Fluent builder for `ReplicatorConfig`.
#[derive(Default)]
pub struct ReplicatorBuilder {
    config: ReplicatorConfig,
}

impl ReplicatorBuilder {
    pub fn new() -> Self {
        Self {
            config: ReplicatorConfig::default(),
        }
    }

    /// Set the number of records requested per pull.
    pub fn batch_size(mut self, size: u32) -> Self {
        self.config.batch_size = size;
        self
    }

    /// Set the pause after a drained pull, in milliseconds.
    pub fn request_delay_ms(mut self, ms: u64) -> Self {
        self.config.request_delay_ms = ms;
        self
    }

    /// Set the pause between commit attempts, in milliseconds.
    pub fn commit_retry_delay_ms(mut self, ms: u64) -> Self {
        self.config.commit_retry_delay_ms = ms;
        self
    }

    /// Set the number of pulses requested per pulse-metadata pull.
    pub fn pulse_batch_size(mut self, size: u32) -> Self {
        self.config.pulse_batch_size = size;
        self
    }

    /// Start an empty database from this pulse.
    pub fn start_pulse(mut self, pulse: PulseNumber) -> Self {
        self.config.start_pulse = Some(pulse);
        self
    }

    pub fn prototypes(mut self, prototypes: Prototypes) -> Self {
        self.config.prototypes = prototypes;
        self
    }

    /// Build the `ReplicatorConfig`.
    pub fn build_config(self) -> ReplicatorConfig {
        self.config
    }
}
