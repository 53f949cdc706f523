//! In-memory storage backend.
//!
//! Keeps every table in RAM. A transaction works on a private copy of the
//! tables taken at `begin` and swaps it in on `commit`, so a rolled-back or
//! failed transaction leaves no trace. Useful for tests and for exercising
//! commit retries through [`InMemoryStorage::fail_next_commits`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use pulseindex_core::cursor::Position;
use pulseindex_core::entities::{
    BalanceUpdate, Deposit, DepositUpdate, Member, MigrationAddress, Transfer,
    WasteMigrationAddress,
};
use pulseindex_core::error::IndexerError;
use pulseindex_core::storage::{Storage, StorageTx};
use pulseindex_core::types::{ExportedRecord, PulseInfo, PulseNumber, RecordId, Reference};

/// Every table, keyed by its primary key.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub raw_records: BTreeMap<Position, ExportedRecord>,
    pub pulses: BTreeMap<PulseNumber, PulseInfo>,
    pub members: BTreeMap<Reference, Member>,
    pub transfers: BTreeMap<RecordId, Transfer>,
    pub deposits: BTreeMap<String, Deposit>,
    pub migration_addresses: BTreeMap<String, MigrationAddress>,
}

#[derive(Default)]
struct Shared {
    tables: Mutex<Tables>,
    failing_commits: AtomicU32,
    commits: AtomicU64,
}

/// In-memory storage. Cloning shares the same tables.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    shared: Arc<Shared>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` commits fail after all writes succeeded.
    pub fn fail_next_commits(&self, n: u32) {
        self.shared.failing_commits.store(n, Ordering::SeqCst);
    }

    /// Number of successful commits.
    pub fn commit_count(&self) -> u64 {
        self.shared.commits.load(Ordering::SeqCst)
    }

    /// Copy of the committed tables.
    pub fn tables(&self) -> Tables {
        self.shared.tables.lock().unwrap().clone()
    }

    pub fn members(&self) -> Vec<Member> {
        self.tables().members.into_values().collect()
    }

    pub fn transfers(&self) -> Vec<Transfer> {
        self.tables().transfers.into_values().collect()
    }

    pub fn deposits(&self) -> Vec<Deposit> {
        self.tables().deposits.into_values().collect()
    }

    pub fn migration_addresses(&self) -> Vec<MigrationAddress> {
        self.tables().migration_addresses.into_values().collect()
    }

    pub fn raw_record_count(&self) -> usize {
        self.shared.tables.lock().unwrap().raw_records.len()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn begin(&self) -> Result<Box<dyn StorageTx>, IndexerError> {
        Ok(Box::new(InMemoryTx {
            staged: self.tables(),
            shared: self.shared.clone(),
        }))
    }

    async fn last_record_position(&self) -> Result<Option<Position>, IndexerError> {
        let tables = self.shared.tables.lock().unwrap();
        Ok(tables.raw_records.keys().next_back().copied())
    }

    async fn last_pulse(&self) -> Result<Option<PulseInfo>, IndexerError> {
        let tables = self.shared.tables.lock().unwrap();
        Ok(tables.pulses.values().next_back().cloned())
    }
}

/// Open transaction over a staged copy of the tables.
pub struct InMemoryTx {
    staged: Tables,
    shared: Arc<Shared>,
}

fn insert_new<K: Ord, V>(table: &mut BTreeMap<K, V>, key: K, value: V) {
    table.entry(key).or_insert(value);
}

#[async_trait]
impl StorageTx for InMemoryTx {
    async fn insert_raw_records(&mut self, records: &[ExportedRecord]) -> Result<(), IndexerError> {
        for r in records {
            insert_new(&mut self.staged.raw_records, r.position(), r.clone());
        }
        Ok(())
    }

    async fn insert_pulses(&mut self, pulses: &[PulseInfo]) -> Result<(), IndexerError> {
        for p in pulses {
            insert_new(&mut self.staged.pulses, p.number, p.clone());
        }
        Ok(())
    }

    async fn insert_members(&mut self, members: &[Member]) -> Result<(), IndexerError> {
        for m in members {
            insert_new(&mut self.staged.members, m.member_ref, m.clone());
        }
        Ok(())
    }

    async fn update_balances(&mut self, updates: &[BalanceUpdate]) -> Result<(), IndexerError> {
        for u in updates {
            let mut matched = self
                .staged
                .members
                .values_mut()
                .filter(|m| m.account_state == u.prev_state)
                .collect::<Vec<_>>();
            if matched.len() != 1 {
                return Err(IndexerError::row_count("members", u.prev_state, matched.len() as u64));
            }
            let member = &mut matched[0];
            member.account_state = u.new_state;
            if let Some(balance) = &u.balance {
                member.balance = balance.clone();
            }
        }
        Ok(())
    }

    async fn insert_transfers(&mut self, transfers: &[Transfer]) -> Result<(), IndexerError> {
        for t in transfers {
            insert_new(&mut self.staged.transfers, t.tx_id, t.clone());
        }
        Ok(())
    }

    async fn insert_deposits(&mut self, deposits: &[Deposit]) -> Result<(), IndexerError> {
        for d in deposits {
            insert_new(&mut self.staged.deposits, d.eth_hash.clone(), d.clone());
        }
        Ok(())
    }

    async fn update_deposits(&mut self, updates: &[DepositUpdate]) -> Result<(), IndexerError> {
        for u in updates {
            let mut matched = self
                .staged
                .deposits
                .values_mut()
                .filter(|d| d.deposit_state == u.prev_state)
                .collect::<Vec<_>>();
            if matched.len() != 1 {
                return Err(IndexerError::row_count("deposits", u.prev_state, matched.len() as u64));
            }
            let deposit = &mut matched[0];
            deposit.deposit_state = u.new_state;
            if let Some(amount) = &u.amount {
                deposit.amount = amount.clone();
            }
            if let Some(balance) = &u.balance {
                deposit.balance = balance.clone();
            }
            if let Some(date) = u.hold_release_date {
                deposit.hold_release_date = date;
            }
        }
        Ok(())
    }

    async fn insert_migration_addresses(
        &mut self,
        addresses: &[MigrationAddress],
    ) -> Result<(), IndexerError> {
        for a in addresses {
            insert_new(&mut self.staged.migration_addresses, a.address.clone(), a.clone());
        }
        Ok(())
    }

    async fn waste_migration_addresses(
        &mut self,
        addresses: &[WasteMigrationAddress],
    ) -> Result<(), IndexerError> {
        for a in addresses {
            match self.staged.migration_addresses.get_mut(&a.address) {
                Some(row) => row.wasted = true,
                None => return Err(IndexerError::row_count("migration_addresses", &a.address, 0)),
            }
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), IndexerError> {
        let InMemoryTx { staged, shared } = *self;
        let injected = shared
            .failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(IndexerError::Storage("injected commit failure".into()));
        }
        *shared.tables.lock().unwrap() = staged;
        shared.commits.fetch_add(1, Ordering::SeqCst);
        debug!("in-memory transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), IndexerError> {
        Ok(())
    }
}
