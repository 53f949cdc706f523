//! Per-pulse output cache, written by a flush handler at commit time.
//!
//! A commit snapshots the cache, writes the snapshot, and only on confirmed
//! success drops the snapshotted prefix. Entities composed between the
//! snapshot and the confirmation stay for the next commit.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, warn};

use pulseindex_core::entities::{
    BalanceUpdate, Deposit, DepositUpdate, Member, MigrationAddress, Transfer,
    WasteMigrationAddress,
};
use pulseindex_core::{ExportedRecord, FlushHandler, IndexerError, PulseInfo, RecordId, StorageTx};

use crate::join::{Discard, Finalize};

/// An entity kind that knows how to write itself into a storage transaction.
#[async_trait]
pub trait Persist: Clone + Send + Sync + 'static {
    /// Entity kind label used in logs and metrics.
    const KIND: &'static str;

    async fn persist(tx: &mut dyn StorageTx, items: &[Self]) -> Result<(), IndexerError>;
}

#[derive(Debug)]
struct Inner<T> {
    items: Vec<T>,
    /// Length of the prefix handed to the last flush.
    flushed: usize,
}

/// Entities composed since the last successful commit.
#[derive(Debug)]
pub struct OutputCache<T> {
    inner: Mutex<Inner<T>>,
}

impl<T> Default for OutputCache<T> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: Vec::new(),
                flushed: 0,
            }),
        }
    }
}

impl<T: Clone> OutputCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, item: T) {
        self.inner.lock().unwrap().items.push(item);
    }

    pub fn extend(&self, items: impl IntoIterator<Item = T>) {
        self.inner.lock().unwrap().items.extend(items);
    }

    /// Copy of the current contents, remembered as the flushed prefix.
    pub fn snapshot(&self) -> Vec<T> {
        let mut inner = self.inner.lock().unwrap();
        inner.flushed = inner.items.len();
        inner.items.clone()
    }

    /// Drop the prefix handed out by the last [`snapshot`](Self::snapshot).
    pub fn confirm(&self) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let n = inner.flushed;
        inner.items.drain(..n);
        inner.flushed = 0;
        n
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Route the outcome of a builder update: composed entities are cached,
    /// discarded candidates are logged.
    pub fn settle(&self, engine: &'static str, origin: RecordId, outcome: Finalize<T>) {
        match outcome {
            Finalize::Incomplete => {}
            Finalize::Composed(entity) => {
                debug!(engine, origin = %origin, "entity composed");
                self.push(entity);
            }
            Finalize::Discarded(Discard::Canceled) => {
                debug!(engine, origin = %origin, "failed call, nothing to insert");
            }
            Finalize::Discarded(Discard::Unresolvable(reason)) => {
                warn!(engine, origin = %origin, %reason, "candidate dropped");
            }
        }
    }

    /// Current contents without marking anything flushed.
    pub fn items(&self) -> Vec<T> {
        self.inner.lock().unwrap().items.clone()
    }
}

#[async_trait]
impl<T: Persist> FlushHandler for OutputCache<T> {
    fn kind(&self) -> &'static str {
        T::KIND
    }

    async fn flush(&self, tx: &mut dyn StorageTx) -> Result<usize, IndexerError> {
        let items = self.snapshot();
        if items.is_empty() {
            return Ok(0);
        }
        T::persist(tx, &items).await?;
        Ok(items.len())
    }

    fn on_committed(&self) -> usize {
        self.confirm()
    }
}

// ─── Persist impls ────────────────────────────────────────────────────────────

#[async_trait]
impl Persist for ExportedRecord {
    const KIND: &'static str = "raw_record";

    async fn persist(tx: &mut dyn StorageTx, items: &[Self]) -> Result<(), IndexerError> {
        tx.insert_raw_records(items).await
    }
}

#[async_trait]
impl Persist for PulseInfo {
    const KIND: &'static str = "pulse";

    async fn persist(tx: &mut dyn StorageTx, items: &[Self]) -> Result<(), IndexerError> {
        tx.insert_pulses(items).await
    }
}

#[async_trait]
impl Persist for Member {
    const KIND: &'static str = "member";

    async fn persist(tx: &mut dyn StorageTx, items: &[Self]) -> Result<(), IndexerError> {
        tx.insert_members(items).await
    }
}

#[async_trait]
impl Persist for BalanceUpdate {
    const KIND: &'static str = "balance_update";

    async fn persist(tx: &mut dyn StorageTx, items: &[Self]) -> Result<(), IndexerError> {
        tx.update_balances(items).await
    }
}

#[async_trait]
impl Persist for Transfer {
    const KIND: &'static str = "transfer";

    async fn persist(tx: &mut dyn StorageTx, items: &[Self]) -> Result<(), IndexerError> {
        tx.insert_transfers(items).await
    }
}

#[async_trait]
impl Persist for Deposit {
    const KIND: &'static str = "deposit";

    async fn persist(tx: &mut dyn StorageTx, items: &[Self]) -> Result<(), IndexerError> {
        tx.insert_deposits(items).await
    }
}

#[async_trait]
impl Persist for DepositUpdate {
    const KIND: &'static str = "deposit_update";

    async fn persist(tx: &mut dyn StorageTx, items: &[Self]) -> Result<(), IndexerError> {
        tx.update_deposits(items).await
    }
}

#[async_trait]
impl Persist for MigrationAddress {
    const KIND: &'static str = "migration_address";

    async fn persist(tx: &mut dyn StorageTx, items: &[Self]) -> Result<(), IndexerError> {
        tx.insert_migration_addresses(items).await
    }
}

#[async_trait]
impl Persist for WasteMigrationAddress {
    const KIND: &'static str = "waste_migration_address";

    async fn persist(tx: &mut dyn StorageTx, items: &[Self]) -> Result<(), IndexerError> {
        tx.waste_migration_addresses(items).await
    }
}
