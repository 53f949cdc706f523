//! Keeper marking migration addresses handed out by `GetFreeMigrationAddress`.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::{debug, warn};

use pulseindex_core::entities::WasteMigrationAddress;
use pulseindex_core::{ExportedRecord, PayloadCodec, PendingStats, RecordHandler};

use crate::cache::OutputCache;
use crate::join::{Pair, PairCache};
use crate::payload::Outcome;

const METHOD: &str = "GetFreeMigrationAddress";

pub struct WastingKeeper {
    codec: Arc<dyn PayloadCodec>,
    pairs: Mutex<PairCache>,
    output: Arc<OutputCache<WasteMigrationAddress>>,
}

impl WastingKeeper {
    pub fn new(codec: Arc<dyn PayloadCodec>) -> Self {
        Self {
            codec,
            pairs: Mutex::new(PairCache::default()),
            output: Arc::new(OutputCache::new()),
        }
    }

    pub fn output(&self) -> Arc<OutputCache<WasteMigrationAddress>> {
        self.output.clone()
    }

    fn on_pair(&self, pair: Pair) {
        let (Some(request), Some(result)) = (pair.request.as_request(), pair.result.as_result())
        else {
            return;
        };
        if request.method != METHOD {
            return;
        }
        match Outcome::decode(self.codec.as_ref(), result) {
            Ok(Outcome::Success(Value::String(address))) => {
                self.output.push(WasteMigrationAddress { address });
            }
            Ok(Outcome::Failed(_)) => {
                debug!(request = %pair.request.id, "no free migration address");
            }
            Ok(Outcome::Success(other)) => {
                warn!(request = %pair.request.id, returned = %other, "migration address is not a string");
            }
            Err(err) => {
                warn!(request = %pair.request.id, code = %err, "migration address result unreadable");
            }
        }
    }
}

impl RecordHandler for WastingKeeper {
    fn name(&self) -> &'static str {
        "waste_migration_address"
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
