//! # pulseindex-observability
//!
//! OpenTelemetry metrics and structured logging for PulseIndex.
//!
//! ## Built-in metrics
//! - `pulseindex.records`          : counter, records delivered to the engines
//! - `pulseindex.entities_dumped`  : counter, tagged with kind
//! - `pulseindex.commit_failures`  : counter
//! - `pulseindex.pending`          : gauge, tagged with engine + map
//! - `pulseindex.last_synced_pulse`: gauge
//! - `pulseindex.committed_pulse`  : gauge
//!
//! No exporter is installed here; the host sets a global meter provider if
//! it wants the metrics shipped somewhere.
//!
//! ## Structured logging
//! Text or JSON logs with per-component levels.

pub mod metrics;
pub mod tracing_setup;

pub use metrics::IndexerMetrics;
pub use tracing_setup::{init_tracing, LogConfig};
