//! Deposit engine.
//!
//! ```text
//! D  IncomingRequest  callSite = deposit.migration  (migration daemon)
//! Q  IncomingRequest  method = New, prototype = deposit, reason = D
//! A  Activate         image = deposit, request = Q
//! S  Result           request = D
//! ```
//!
//! The owning member is the caller of `Q`. All four legs are required.

use std::sync::{Arc, Mutex};

use pulseindex_core::entities::Deposit;
use pulseindex_core::types::{pulse_timestamp, RecordBody, Request};
use pulseindex_core::{ExportedRecord, PayloadCodec, PendingStats, Prototypes, RecordHandler};

use crate::cache::OutputCache;
use crate::join::{Builder, BuilderTable, Discard, Finalize, Pair, PairCache};
use crate::payload::{amount_field, field_or_warn, str_field, u32_field, CallLeg, NewLeg, StateLeg};

const ENGINE: &str = "deposit";
const CALL_SITE: &str = "deposit.migration";

#[derive(Debug, Default)]
struct DepositBuilder {
    res: Option<CallLeg>,
    new: Option<NewLeg>,
    act: Option<StateLeg>,
}

impl Builder for DepositBuilder {
    type Output = Deposit;

    fn absorb(&mut self, other: Self) {
        self.res = self.res.take().or(other.res);
        self.new = self.new.take().or(other.new);
        self.act = self.act.take().or(other.act);
    }

    fn try_finalize(&mut self) -> Finalize<Deposit> {
        if self.res.as_ref().is_some_and(CallLeg::is_failed) {
            return Finalize::Discarded(Discard::Canceled);
        }
        let (Some(res), Some(new), Some(act)) = (&self.res, &self.new, &self.act) else {
            return Finalize::Incomplete;
        };

        let Some(member_ref) = new.caller else {
            return Finalize::Discarded(Discard::Unresolvable(format!(
                "deposit constructor {} has no caller",
                new.id
            )));
        };
        let eth_hash = match act
            .field(|memory| str_field(memory, "txHash"))
            .or_else(|_| res.call.param_str("ethTxHash"))
        {
            Ok(hash) => hash,
            Err(err) => return Finalize::Discarded(Discard::Unresolvable(err.code())),
        };

        let origin = res.request.id;
        Finalize::Composed(Deposit {
            eth_hash,
            member_ref,
            amount: field_or_warn(ENGINE, origin, act.field(|m| amount_field(m, "amount")))
                .unwrap_or_default(),
            balance: field_or_warn(ENGINE, origin, act.field(|m| amount_field(m, "balance")))
                .unwrap_or_default(),
            hold_release_date: field_or_warn(
                ENGINE,
                origin,
                act.field(|m| u32_field(m, "pulseDepositUnHold")),
            )
            .filter(|pulse| *pulse > 0)
            .map(pulse_timestamp)
            .unwrap_or(0),
            transfer_date: pulse_timestamp(act.id.pulse),
            deposit_state: act.id,
        })
    }
}

#[derive(Debug, Default)]
struct State {
    pairs: PairCache,
    builders: BuilderTable<DepositBuilder>,
}

/// Composes [`Deposit`] rows from confirmed migration-daemon calls.
pub struct DepositCollector {
    prototypes: Prototypes,
    codec: Arc<dyn PayloadCodec>,
    state: Mutex<State>,
    output: Arc<OutputCache<Deposit>>,
}

impl DepositCollector {
    pub fn new(prototypes: Prototypes, codec: Arc<dyn PayloadCodec>) -> Self {
        Self {
            prototypes,
            codec,
            state: Mutex::new(State::default()),
            output: Arc::new(OutputCache::new()),
        }
    }

    pub fn output(&self) -> Arc<OutputCache<Deposit>> {
        self.output.clone()
    }

    fn is_deposit_constructor(&self, request: &Request) -> bool {
        request.method == "New" && request.prototype == Some(self.prototypes.deposit)
    }

    fn on_pair(&self, state: &mut State, pair: Pair) {
        let origin = pair.request.id;
        match CallLeg::decode(self.codec.as_ref(), &pair) {
            Ok(leg) if leg.call.is(CALL_SITE) => {
                let outcome = state.builders.update(origin, |b| b.res = Some(leg));
                self.output.settle(self.name(), origin, outcome);
            }
            _ => {
                state.builders.abandon(origin);
            }
        }
    }
}

impl RecordHandler for DepositCollector {
    fn name(&self) -> &'static str {
        ENGINE
    }

    fn handle(&self, exported: &ExportedRecord) {
        let record = &exported.record;
        let mut state = self.state.lock().unwrap();

        if let RecordBody::IncomingRequest(request) = &record.body {
            if self.is_deposit_constructor(request) {
                if let Some(origin) = request.reason {
                    let linked = state.builders.link(record.id, origin);
                    self.output.settle(self.name(), origin, linked);
                    let leg = NewLeg {
                        id: record.id,
                        caller: request.caller,
                    };
                    let outcome = state.builders.update(origin, |b| b.new = Some(leg));
                    self.output.settle(self.name(), origin, outcome);
                }
            }
        }

        if let Some(pair) = state.pairs.offer(record) {
            self.on_pair(&mut state, pair);
        }

        if let RecordBody::Activate(activate) = &record.body {
            if activate.image == self.prototypes.deposit {
                let origin = state.builders.resolve(activate.request);
                let leg = StateLeg::decode(self.codec.as_ref(), record.id, &activate.memory);
                let outcome = state.builders.update(origin, |b| b.act = Some(leg));
                self.output.settle(self.name(), origin, outcome);
            }
        }
    }

    fn pending(&self) -> PendingStats {
        let state = self.state.lock().unwrap();
        PendingStats {
            requests: state.pairs.requests(),
            results: state.pairs.results(),
            builders: state.builders.builders(),
            links: state.builders.links(),
            cached: self.output.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::*;
    use pulseindex_core::{RecordId, Reference};
    use serde_json::json;

    const D: RecordId = RecordId::new(66000, 1);
    const Q: RecordId = RecordId::new(66000, 2);
    const A: RecordId = RecordId::new(66000, 3);
    const S: RecordId = RecordId::new(66000, 4);
    const OWNER: Reference = Reference::new(65600, 9);

    fn records(memory: serde_json::Value) -> Vec<ExportedRecord> {
        let deposit = Prototypes::default().deposit;
        vec![
            api_call(
                D,
                "deposit.migration",
                json!({"ethTxHash": "0xfeed", "amount": "300"}),
                Some("insolar:65537.77"),
            ),
            constructor(Q, deposit, D, Some(OWNER)),
            activate(A, Q, deposit, memory),
            result(S, D, json!([null, null])),
        ]
    }

    #[test]
    fn every_arrival_order_composes_the_same_deposit() {
        let records = records(json!({
            "txHash": "0xfeed",
            "amount": "300",
            "balance": "0",
            "pulseDepositUnHold": 66100
        }));
        let expected = Deposit {
            eth_hash: "0xfeed".into(),
            member_ref: OWNER,
            amount: "300".into(),
            balance: "0".into(),
            hold_release_date: pulse_timestamp(66100),
            transfer_date: pulse_timestamp(66000),
            deposit_state: A,
        };
        for order in permutations(records.len()) {
            let c = DepositCollector::new(Prototypes::default(), codec());
            for i in &order {
                c.handle(&records[*i]);
            }
            assert_eq!(c.output().items(), vec![expected.clone()], "order {order:?}");
            let pending = c.pending();
            assert_eq!((pending.builders, pending.links), (0, 0), "order {order:?}");
        }
    }

    #[test]
    fn hash_falls_back_to_call_params() {
        let c = DepositCollector::new(Prototypes::default(), codec());
        for r in records(json!({"amount": "300"})) {
            c.handle(&r);
        }
        let deposits = c.output().items();
        assert_eq!(deposits[0].eth_hash, "0xfeed");
        assert_eq!(deposits[0].balance, "");
        assert_eq!(deposits[0].hold_release_date, 0);
    }

    #[test]
    fn failed_confirmation_is_not_inserted() {
        let c = DepositCollector::new(Prototypes::default(), codec());
        c.handle(&api_call(
            D,
            "deposit.migration",
            json!({"ethTxHash": "0xfeed", "amount": "300"}),
            None,
        ));
        c.handle(&result(S, D, json!([null, {"message": "already confirmed"}])));
        assert!(c.output().is_empty());
        assert_eq!(c.pending().total(), 0);
    }

    #[test]
    fn constructor_without_caller_is_dropped() {
        let deposit = Prototypes::default().deposit;
        let mut records = records(json!({"txHash": "0xfeed"}));
        records[1] = constructor(Q, deposit, D, None);
        let c = DepositCollector::new(Prototypes::default(), codec());
        for r in &records {
            c.handle(r);
        }
        assert!(c.output().is_empty());
        assert_eq!(c.pending().builders, 0);
    }
}
