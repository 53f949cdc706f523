//! Migration-address engine: addresses registered by `migration.addAddresses`.

use std::sync::{Arc, Mutex};

use tracing::warn;

use pulseindex_core::entities::MigrationAddress;
use pulseindex_core::types::pulse_timestamp;
use pulseindex_core::{ExportedRecord, PayloadCodec, PendingStats, RecordHandler};

use crate::cache::OutputCache;
use crate::join::{Pair, PairCache};
use crate::payload::{CallLeg, Outcome};

const CALL_SITE: &str = "migration.addAddresses";

pub struct MigrationAddressCollector {
    codec: Arc<dyn PayloadCodec>,
    pairs: Mutex<PairCache>,
    output: Arc<OutputCache<MigrationAddress>>,
}

impl MigrationAddressCollector {
    pub fn new(codec: Arc<dyn PayloadCodec>) -> Self {
        Self {
            codec,
            pairs: Mutex::new(PairCache::default()),
            output: Arc::new(OutputCache::new()),
        }
    }

    pub fn output(&self) -> Arc<OutputCache<MigrationAddress>> {
        self.output.clone()
    }

    fn on_pair(&self, pair: Pair) {
        let Ok(leg) = CallLeg::decode(self.codec.as_ref(), &pair) else {
            return;
        };
        if !leg.call.is(CALL_SITE) || !matches!(leg.outcome, Ok(Outcome::Success(_))) {
            return;
        }
        match leg.call.param_list("migrationAddresses") {
            Ok(addresses) => {
                let timestamp = pulse_timestamp(leg.request.pulse());
                self.output.extend(addresses.into_iter().map(|address| MigrationAddress {
                    address,
                    timestamp,
                    wasted: false,
                }));
            }
            Err(err) => {
                warn!(request = %leg.request.id, code = %err, "migration addresses unreadable");
            }
        }
    }
}

impl RecordHandler for MigrationAddressCollector {
    fn name(&self) -> &'static str {
        "migration_address"
    }

    fn handle(&self, exported: &ExportedRecord) {
        let pair = self.pairs.lock().unwrap().offer(&exported.record);
        if let Some(pair) = pair {
            self.on_pair(pair);
        }
    }

    fn pending(&self) -> PendingStats {
        let pairs = self.pairs.lock().unwrap();
        PendingStats {
            requests: pairs.requests(),
            results: pairs.results(),
            cached: self.output.len(),
            ..Default::default()
        }
    }
}
