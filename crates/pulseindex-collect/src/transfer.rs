//! Transfer engine: `member.transfer` request/result pairs.

use std::sync::{Arc, Mutex};

use pulseindex_core::entities::{Status, Transfer};
use pulseindex_core::types::pulse_timestamp;
use pulseindex_core::{ExportedRecord, PayloadCodec, PendingStats, RecordHandler, Reference};

use crate::cache::OutputCache;
use crate::join::{Discard, Finalize, Pair, PairCache};
use crate::payload::{amount_field, degrade, CallLeg, DecodeError, Outcome};

const ENGINE: &str = "transfer";
const CALL_SITE: &str = "member.transfer";

/// Composes [`Transfer`] rows. A failed call is still recorded, as `CANCELED`.
pub struct TransferCollector {
    codec: Arc<dyn PayloadCodec>,
    pairs: Mutex<PairCache>,
    output: Arc<OutputCache<Transfer>>,
}

impl TransferCollector {
    pub fn new(codec: Arc<dyn PayloadCodec>) -> Self {
        Self {
            codec,
            pairs: Mutex::new(PairCache::default()),
            output: Arc::new(OutputCache::new()),
        }
    }

    pub fn output(&self) -> Arc<OutputCache<Transfer>> {
        self.output.clone()
    }

    fn on_pair(&self, pair: Pair) {
        let Ok(leg) = CallLeg::decode(self.codec.as_ref(), &pair) else {
            return;
        };
        if !leg.call.is(CALL_SITE) {
            return;
        }
        self.output.settle(self.name(), pair.request.id, compose(&leg));
    }
}

fn member_reference(text: Result<String, DecodeError>, field: &'static str) -> Result<Reference, Discard> {
    let text = text.map_err(|err| Discard::Unresolvable(err.code()))?;
    text.parse()
        .map_err(|_| Discard::Unresolvable(format!("{field}: {text:?}")))
}

fn compose(leg: &CallLeg) -> Finalize<Transfer> {
    let from_member = match member_reference(
        leg.call.reference.clone().ok_or(DecodeError::Missing("reference")),
        "reference",
    ) {
        Ok(r) => r,
        Err(discard) => return Finalize::Discarded(discard),
    };
    let to_member = match member_reference(
        leg.call.param_str("toMemberReference"),
        "toMemberReference",
    ) {
        Ok(r) => r,
        Err(discard) => return Finalize::Discarded(discard),
    };

    let origin = leg.request.id;
    let mut status = Status::Success;
    let fee = match &leg.outcome {
        Ok(Outcome::Failed(_)) => {
            status = Status::Canceled;
            String::new()
        }
        Ok(Outcome::Success(returned)) => amount_field(returned, "fee").unwrap_or_else(|err| {
            degrade(ENGINE, origin, &mut status, &err);
            String::new()
        }),
        Err(err) => {
            degrade(ENGINE, origin, &mut status, err);
            String::new()
        }
    };
    let amount = leg.call.param_amount("amount").unwrap_or_else(|err| {
        degrade(ENGINE, origin, &mut status, &err);
        String::new()
    });

    let pulse = leg.request.pulse();
    Finalize::Composed(Transfer {
        tx_id: leg.request.id,
        amount,
        fee,
        from_member,
        to_member,
        pulse,
        timestamp: pulse_timestamp(pulse),
        status,
    })
}

impl RecordHandler for TransferCollector {
    fn name(&self) -> &'static str {
        ENGINE
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::*;
    use pulseindex_core::RecordId;
    use serde_json::json;

    const R: RecordId = RecordId::new(65700, 10);
    const S: RecordId = RecordId::new(65700, 11);

    fn transfer_call() -> ExportedRecord {
        api_call(
            R,
            "member.transfer",
            json!({"amount": "250", "toMemberReference": "insolar:65600.9"}),
            Some("insolar:65600.5"),
        )
    }

    #[test]
    fn request_and_result_order_do_not_matter() {
        let reply = result(S, R, json!([{"fee": "10"}, null]));

        let forward = TransferCollector::new(codec());
        forward.handle(&transfer_call());
        forward.handle(&reply);

        let backward = TransferCollector::new(codec());
        backward.handle(&reply);
        assert_eq!(backward.pending().results, 1);
        backward.handle(&transfer_call());

        let expected = vec![Transfer {
            tx_id: R,
            amount: "250".into(),
            fee: "10".into(),
            from_member: Reference::new(65600, 5),
            to_member: Reference::new(65600, 9),
            pulse: 65700,
            timestamp: pulse_timestamp(65700),
            status: Status::Success,
        }];
        assert_eq!(forward.output().items(), expected);
        assert_eq!(backward.output().items(), expected);
        assert_eq!(backward.pending().total(), 0);
    }

    #[test]
    fn contract_error_is_canceled_with_empty_fee() {
        let c = TransferCollector::new(codec());
        c.handle(&transfer_call());
        c.handle(&result(S, R, json!([null, {"message": "not enough balance"}])));

        let transfers = c.output().items();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].status, Status::Canceled);
        assert_eq!(transfers[0].fee, "");
    }

    #[test]
    fn missing_fee_degrades_status() {
        let c = TransferCollector::new(codec());
        c.handle(&transfer_call());
        c.handle(&result(S, R, json!([{}, null])));
        assert_eq!(c.output().items()[0].status.as_str(), "ERR_MISSING_FEE");
    }

    #[test]
    fn unparsable_recipient_is_dropped() {
        let c = TransferCollector::new(codec());
        c.handle(&api_call(
            R,
            "member.transfer",
            json!({"amount": "1", "toMemberReference": "bob"}),
            Some("insolar:65600.5"),
        ));
        c.handle(&result(S, R, json!([{"fee": "1"}, null])));
        assert!(c.output().is_empty());
    }
}
