//! pulseindex-core: foundation for the pulse-ledger replicator.
//!
//! # Architecture
//!
//! ```text
//! RecordSource → IndexLoop ──dispatch──▶ RecordHandler (collectors, raw archiver)
//!                    │
//!                    └── pulse boundary ──▶ CommitCoordinator
//!                                              ├── Storage::begin
//!                                              ├── FlushHandler::flush (fixed order)
//!                                              ├── StorageTx::commit
//!                                              └── FlushHandler::on_committed
//! PositionTracker ◀── Storage (highest archived record, last synced pulse)
//! ```

pub mod checkpoint;
pub mod codec;
pub mod cursor;
pub mod entities;
pub mod error;
pub mod handler;
pub mod indexer;
pub mod storage;
pub mod types;

pub use checkpoint::{PositionTracker, ResumePoint};
pub use codec::{JsonCodec, PayloadCodec};
pub use cursor::{Cursor, Position};
pub use error::IndexerError;
pub use handler::{FlushHandler, HandlerRegistry, PendingStats, RecordHandler};
pub use indexer::{ReplicatorConfig, ReplicatorState};
pub use storage::{Storage, StorageTx};
pub use types::{
    ExportedRecord, Prototypes, PulseInfo, PulseNumber, Record, RecordBody, RecordId, Reference,
};
