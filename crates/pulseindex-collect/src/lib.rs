//! pulseindex-collect: record correlation engines.
//!
//! Each engine consumes the record stream in arrival order and composes one
//! domain entity kind into its own [`OutputCache`]. Causally related records
//! may arrive in any relative order; see [`join`] for the matching rules.

pub mod balance;
pub mod cache;
pub mod collectors;
pub mod deposit;
pub mod deposit_update;
pub mod join;
pub mod member;
pub mod migration;
pub mod payload;
pub mod raw;
pub mod transfer;
pub mod waste;

pub use balance::BalanceUpdater;
pub use cache::{OutputCache, Persist};
pub use collectors::Collectors;
pub use deposit::DepositCollector;
pub use deposit_update::DepositUpdater;
pub use member::MemberCollector;
pub use migration::MigrationAddressCollector;
pub use raw::RawArchiver;
pub use transfer::TransferCollector;
pub use waste::WastingKeeper;
