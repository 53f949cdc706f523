//! Deposit updates: every `Amend` of a deposit object.

use std::sync::Arc;

use tracing::warn;

use pulseindex_core::entities::DepositUpdate;
use pulseindex_core::types::{pulse_timestamp, RecordBody};
use pulseindex_core::{
    ExportedRecord, PayloadCodec, PendingStats, Prototypes, RecordHandler, Reference,
};

use crate::cache::OutputCache;
use crate::payload::{amount_field, decode_memory, field_or_warn, u32_field};

const ENGINE: &str = "deposit_update";

pub struct DepositUpdater {
    deposit: Reference,
    codec: Arc<dyn PayloadCodec>,
    output: Arc<OutputCache<DepositUpdate>>,
}

impl DepositUpdater {
    pub fn new(prototypes: &Prototypes, codec: Arc<dyn PayloadCodec>) -> Self {
        Self {
            deposit: prototypes.deposit,
            codec,
            output: Arc::new(OutputCache::new()),
        }
    }

    pub fn output(&self) -> Arc<OutputCache<DepositUpdate>> {
        self.output.clone()
    }
}

impl RecordHandler for DepositUpdater {
    fn name(&self) -> &'static str {
        ENGINE
    }

    fn handle(&self, exported: &ExportedRecord) {
        let record = &exported.record;
        let RecordBody::Amend(amend) = &record.body else {
            return;
        };
        if amend.image != self.deposit {
            return;
        }

        let mut update = DepositUpdate {
            prev_state: amend.prev_state,
            new_state: record.id,
            amount: None,
            balance: None,
            hold_release_date: None,
        };
        match decode_memory(self.codec.as_ref(), &amend.memory) {
            Ok(memory) => {
                let origin = record.id;
                update.amount = field_or_warn(ENGINE, origin, amount_field(&memory, "amount"));
                update.balance = field_or_warn(ENGINE, origin, amount_field(&memory, "balance"));
                update.hold_release_date =
                    field_or_warn(ENGINE, origin, u32_field(&memory, "pulseDepositUnHold"))
                        .filter(|pulse| *pulse > 0)
                        .map(pulse_timestamp);
            }
            Err(err) => {
                warn!(state = %record.id, code = %err, "deposit state unreadable, advancing state only");
            }
        }
        self.output.push(update);
    }

    fn pending(&self) -> PendingStats {
        PendingStats {
            cached: self.output.len(),
            ..Default::default()
        }
    }
}
