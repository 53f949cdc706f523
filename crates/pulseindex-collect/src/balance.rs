//! Balance updates: every `Amend` of an account object.

use std::sync::Arc;

use tracing::warn;

use pulseindex_core::entities::BalanceUpdate;
use pulseindex_core::types::RecordBody;
use pulseindex_core::{
    ExportedRecord, PayloadCodec, PendingStats, Prototypes, RecordHandler, Reference,
};

use crate::cache::OutputCache;
use crate::payload::{amount_field, decode_memory};

pub struct BalanceUpdater {
    account: Reference,
    codec: Arc<dyn PayloadCodec>,
    output: Arc<OutputCache<BalanceUpdate>>,
}

impl BalanceUpdater {
    pub fn new(prototypes: &Prototypes, codec: Arc<dyn PayloadCodec>) -> Self {
        Self {
            account: prototypes.account,
            codec,
            output: Arc::new(OutputCache::new()),
        }
    }

    pub fn output(&self) -> Arc<OutputCache<BalanceUpdate>> {
        self.output.clone()
    }
}

impl RecordHandler for BalanceUpdater {
    fn name(&self) -> &'static str {
        "balance_update"
    }

    fn handle(&self, exported: &ExportedRecord) {
        let record = &exported.record;
        let RecordBody::Amend(amend) = &record.body else {
            return;
        };
        if amend.image != self.account {
            return;
        }
        let balance = decode_memory(self.codec.as_ref(), &amend.memory)
            .and_then(|memory| amount_field(&memory, "balance"));
        if let Err(err) = &balance {
            warn!(state = %record.id, code = %err, "account state unreadable, advancing state only");
        }
        self.output.push(BalanceUpdate {
            prev_state: amend.prev_state,
            new_state: record.id,
            balance: balance.ok(),
        });
    }

    fn pending(&self) -> PendingStats {
        PendingStats {
            cached: self.output.len(),
            ..Default::default()
        }
    }
}
