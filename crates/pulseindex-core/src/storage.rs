//! Storage sink traits.
//!
//! A commit opens one [`StorageTx`], lets every flush handler write its
//! cache into it, and commits. Inserts ignore conflicts so a retried commit
//! never duplicates rows; updates must affect exactly one row or the handler
//! fails and the whole transaction is rolled back.

use async_trait::async_trait;

use crate::cursor::Position;
use crate::entities::{
    BalanceUpdate, Deposit, DepositUpdate, Member, MigrationAddress, Transfer,
    WasteMigrationAddress,
};
use crate::error::IndexerError;
use crate::types::{ExportedRecord, PulseInfo};

/// One open storage transaction.
#[async_trait]
pub trait StorageTx: Send {
    /// Archive raw records keyed by `(pulse, record_number)`.
    async fn insert_raw_records(&mut self, records: &[ExportedRecord]) -> Result<(), IndexerError>;

    async fn insert_pulses(&mut self, pulses: &[PulseInfo]) -> Result<(), IndexerError>;

    async fn insert_members(&mut self, members: &[Member]) -> Result<(), IndexerError>;

    /// Each update must match exactly one member by `account_state == prev_state`.
    async fn update_balances(&mut self, updates: &[BalanceUpdate]) -> Result<(), IndexerError>;

    async fn insert_transfers(&mut self, transfers: &[Transfer]) -> Result<(), IndexerError>;

    async fn insert_deposits(&mut self, deposits: &[Deposit]) -> Result<(), IndexerError>;

    /// Each update must match exactly one deposit by `deposit_state == prev_state`.
    async fn update_deposits(&mut self, updates: &[DepositUpdate]) -> Result<(), IndexerError>;

    async fn insert_migration_addresses(
        &mut self,
        addresses: &[MigrationAddress],
    ) -> Result<(), IndexerError>;

    /// Each mark must match exactly one migration address.
    async fn waste_migration_addresses(
        &mut self,
        addresses: &[WasteMigrationAddress],
    ) -> Result<(), IndexerError>;

    async fn commit(self: Box<Self>) -> Result<(), IndexerError>;

    async fn rollback(self: Box<Self>) -> Result<(), IndexerError>;
}

/// A relational store holding replicated entities.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StorageTx>, IndexerError>;

    /// Position of the highest archived raw record, if any.
    async fn last_record_position(&self) -> Result<Option<Position>, IndexerError>;

    /// Highest committed pulse-metadata row, if any.
    async fn last_pulse(&self) -> Result<Option<PulseInfo>, IndexerError>;
}
