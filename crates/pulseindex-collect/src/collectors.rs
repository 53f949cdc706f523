//! The default set of engines, wired into a [`HandlerRegistry`].

use std::sync::Arc;

use pulseindex_core::{HandlerRegistry, PayloadCodec, Prototypes, PulseInfo};

use crate::balance::BalanceUpdater;
use crate::cache::OutputCache;
use crate::deposit::DepositCollector;
use crate::deposit_update::DepositUpdater;
use crate::member::MemberCollector;
use crate::migration::MigrationAddressCollector;
use crate::raw::RawArchiver;
use crate::transfer::TransferCollector;
use crate::waste::WastingKeeper;

/// Every engine the replicator runs, plus the pulse-metadata cache.
pub struct Collectors {
    pub raw: Arc<RawArchiver>,
    pub pulses: Arc<OutputCache<PulseInfo>>,
    pub members: Arc<MemberCollector>,
    pub balances: Arc<BalanceUpdater>,
    pub transfers: Arc<TransferCollector>,
    pub migration_addresses: Arc<MigrationAddressCollector>,
    pub waste: Arc<WastingKeeper>,
    pub deposits: Arc<DepositCollector>,
    pub deposit_updates: Arc<DepositUpdater>,
}

impl Collectors {
    pub fn new(prototypes: &Prototypes, codec: Arc<dyn PayloadCodec>) -> Self {
        Self {
            raw: Arc::new(RawArchiver::new()),
            pulses: Arc::new(OutputCache::new()),
            members: Arc::new(MemberCollector::new(prototypes.clone(), codec.clone())),
            balances: Arc::new(BalanceUpdater::new(prototypes, codec.clone())),
            transfers: Arc::new(TransferCollector::new(codec.clone())),
            migration_addresses: Arc::new(MigrationAddressCollector::new(codec.clone())),
            waste: Arc::new(WastingKeeper::new(codec.clone())),
            deposits: Arc::new(DepositCollector::new(prototypes.clone(), codec.clone())),
            deposit_updates: Arc::new(DepositUpdater::new(prototypes, codec)),
        }
    }

    /// Register every engine.
    ///
    /// Flush order: rows an update depends on are written first (members
    /// before balance updates, addresses before waste marks, deposits before
    /// deposit updates).
    pub fn register(&self, registry: &mut HandlerRegistry) {
        registry.on_record(self.raw.clone());
        registry.on_record(self.members.clone());
        registry.on_record(self.balances.clone());
        registry.on_record(self.transfers.clone());
        registry.on_record(self.migration_addresses.clone());
        registry.on_record(self.waste.clone());
        registry.on_record(self.deposits.clone());
        registry.on_record(self.deposit_updates.clone());

        registry.on_flush(self.raw.output());
        registry.on_flush(self.pulses.clone());
        registry.on_flush(self.members.output());
        registry.on_flush(self.balances.output());
        registry.on_flush(self.transfers.output());
        registry.on_flush(self.migration_addresses.output());
        registry.on_flush(self.waste.output());
        registry.on_flush(self.deposits.output());
        registry.on_flush(self.deposit_updates.output());
    }

    pub fn registry(&self) -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        self.register(&mut registry);
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::codec;

    #[test]
    fn flush_order_puts_inserts_before_their_updates() {
        let collectors = Collectors::new(&Prototypes::default(), codec());
        let registry = collectors.registry();
        let kinds: Vec<_> = registry.flush_handlers().iter().map(|h| h.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                "raw_record",
                "pulse",
                "member",
                "balance_update",
                "transfer",
                "migration_address",
                "waste_migration_address",
                "deposit",
                "deposit_update",
            ]
        );
        assert_eq!(registry.pending().len(), 8);
    }
}
