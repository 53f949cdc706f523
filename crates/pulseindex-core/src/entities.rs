//! Domain entities reconstructed from the record stream.
//!
//! Insert-kind entities (`Member`, `Transfer`, `Deposit`, `MigrationAddress`)
//! are written with conflict-ignoring inserts. Update-kind entities
//! (`BalanceUpdate`, `DepositUpdate`, `WasteMigrationAddress`) must match
//! exactly one existing row; state updates are keyed by the state they supersede.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{PulseNumber, RecordId, Reference};

// ─── Status ───────────────────────────────────────────────────────────────────

/// Outcome of a composed operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Status {
    Pending,
    Success,
    Canceled,
    /// A payload could not be read; carries the decode error code.
    Invalid(String),
}

impl Status {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "PENDING",
            Self::Success => "SUCCESS",
            Self::Canceled => "CANCELED",
            Self::Invalid(code) => code,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Status> for String {
    fn from(s: Status) -> Self {
        s.as_str().to_string()
    }
}

impl From<String> for Status {
    fn from(s: String) -> Self {
        match s.as_str() {
            "PENDING" => Self::Pending,
            "SUCCESS" => Self::Success,
            "CANCELED" => Self::Canceled,
            _ => Self::Invalid(s),
        }
    }
}

// ─── Entities ─────────────────────────────────────────────────────────────────

/// A member with its account balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub member_ref: Reference,
    pub balance: String,
    pub migration_address: Option<String>,
    /// State id of the backing account object.
    pub account_state: RecordId,
    pub status: Status,
    pub pulse: PulseNumber,
}

/// New balance of an account, keyed by the state it supersedes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceUpdate {
    pub prev_state: RecordId,
    pub new_state: RecordId,
    /// `None` when the new state could not be decoded; only the state advances.
    pub balance: Option<String>,
}

/// A member-to-member transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub tx_id: RecordId,
    pub amount: String,
    pub fee: String,
    pub from_member: Reference,
    pub to_member: Reference,
    pub pulse: PulseNumber,
    pub timestamp: i64,
    pub status: Status,
}

/// A migration deposit owned by a member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub eth_hash: String,
    pub member_ref: Reference,
    pub amount: String,
    pub balance: String,
    pub hold_release_date: i64,
    pub transfer_date: i64,
    pub deposit_state: RecordId,
}

/// New deposit amounts, keyed by the state they supersede.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositUpdate {
    pub prev_state: RecordId,
    pub new_state: RecordId,
    pub amount: Option<String>,
    pub balance: Option<String>,
    pub hold_release_date: Option<i64>,
}

/// A migration address made available to new members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationAddress {
    pub address: String,
    /// First-seen unix timestamp.
    pub timestamp: i64,
    pub wasted: bool,
}

/// Marks a migration address as taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WasteMigrationAddress {
    pub address: String,
}
