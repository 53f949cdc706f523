//! pulseindex-replicator: pulls the record stream and commits it pulse by pulse.
//!
//! ```text
//! RecordSource ─▶ RecordFetcher ─▶ IndexLoop ─▶ HandlerRegistry::dispatch
//!                                     │
//!                      pulse boundary / drained stream
//!                                     ▼
//!                PulseSync::sync_to ─▶ CommitCoordinator::commit
//! ```

pub mod builder;
pub mod commit;
pub mod fetcher;
#[cfg(feature = "http")]
pub mod http;
pub mod index_loop;
pub mod lifecycle;
pub mod pulse_sync;
pub mod source;
pub mod stats;

pub use builder::ReplicatorBuilder;
pub use commit::{CommitCoordinator, CommitReport};
pub use fetcher::{RecordBatch, RecordFetcher};
#[cfg(feature = "http")]
pub use http::{HttpExportClient, SourceConfig};
pub use index_loop::{IndexLoop, Step};
pub use lifecycle::{Replicator, ReplicatorHandle};
pub use pulse_sync::PulseSync;
pub use source::{MemorySource, PulseSource, RecordSource, RecordStream, SourceItem};
pub use stats::{ReplicatorStats, SharedStats};
