//! Member engine.
//!
//! A member is composed from three causally-chained records:
//!
//! ```text
//! R  IncomingRequest  callSite = member.create | member.migrationCreate
//! N  IncomingRequest  method = New, prototype = account, reason = R
//! A  Activate         image = account, request = N
//! S  Result           request = R
//! ```
//!
//! `S` carries the member reference, `A` the account state and initial
//! balance. `N` only links `A` back to `R`; any of them may arrive first.

use std::sync::{Arc, Mutex};

use pulseindex_core::entities::{Member, Status};
use pulseindex_core::types::{RecordBody, Request};
use pulseindex_core::{
    ExportedRecord, PayloadCodec, PendingStats, Prototypes, RecordHandler, Reference,
};

use crate::cache::OutputCache;
use crate::join::{Builder, BuilderTable, Discard, Finalize, Pair, PairCache};
use crate::payload::{amount_field, degrade, str_field, CallLeg, Outcome, StateLeg};

const ENGINE: &str = "member";
const CALL_SITES: [&str; 2] = ["member.create", "member.migrationCreate"];

#[derive(Debug, Default)]
struct MemberBuilder {
    res: Option<CallLeg>,
    act: Option<StateLeg>,
}

impl Builder for MemberBuilder {
    type Output = Member;

    fn absorb(&mut self, other: Self) {
        self.res = self.res.take().or(other.res);
        self.act = self.act.take().or(other.act);
    }

    fn try_finalize(&mut self) -> Finalize<Member> {
        let Some(res) = &self.res else {
            return Finalize::Incomplete;
        };
        if res.is_failed() {
            return Finalize::Discarded(Discard::Canceled);
        }
        let Some(act) = &self.act else {
            return Finalize::Incomplete;
        };

        let returned = match &res.outcome {
            Ok(Outcome::Success(value)) => value,
            Ok(Outcome::Failed(_)) => return Finalize::Discarded(Discard::Canceled),
            Err(err) => return Finalize::Discarded(Discard::Unresolvable(err.code())),
        };
        let member_ref = match str_field(returned, "reference") {
            Ok(text) => match text.parse::<Reference>() {
                Ok(r) => r,
                Err(e) => return Finalize::Discarded(Discard::Unresolvable(e.to_string())),
            },
            Err(err) => return Finalize::Discarded(Discard::Unresolvable(err.code())),
        };

        let mut status = Status::Success;
        let balance = match act.field(|memory| amount_field(memory, "balance")) {
            Ok(balance) => balance,
            Err(err) => {
                degrade(ENGINE, res.request.id, &mut status, &err);
                String::new()
            }
        };

        Finalize::Composed(Member {
            member_ref,
            balance,
            migration_address: str_field(returned, "migrationAddress").ok(),
            account_state: act.id,
            status,
            pulse: res.request.pulse(),
        })
    }
}

#[derive(Debug, Default)]
struct State {
    pairs: PairCache,
    builders: BuilderTable<MemberBuilder>,
}

/// Composes [`Member`] rows from member-creation calls.
pub struct MemberCollector {
    prototypes: Prototypes,
    codec: Arc<dyn PayloadCodec>,
    state: Mutex<State>,
    output: Arc<OutputCache<Member>>,
}

impl MemberCollector {
    pub fn new(prototypes: Prototypes, codec: Arc<dyn PayloadCodec>) -> Self {
        Self {
            prototypes,
            codec,
            state: Mutex::new(State::default()),
            output: Arc::new(OutputCache::new()),
        }
    }

    pub fn output(&self) -> Arc<OutputCache<Member>> {
        self.output.clone()
    }

    fn is_account_constructor(&self, request: &Request) -> bool {
        request.method == "New" && request.prototype == Some(self.prototypes.account)
    }

    fn on_pair(&self, state: &mut State, pair: Pair) {
        let origin = pair.request.id;
        match CallLeg::decode(self.codec.as_ref(), &pair) {
            Ok(leg) if CALL_SITES.iter().any(|site| leg.call.is(site)) => {
                let outcome = state.builders.update(origin, |b| b.res = Some(leg));
                self.output.settle(self.name(), origin, outcome);
            }
            _ => {
                state.builders.abandon(origin);
            }
        }
    }
}

impl RecordHandler for MemberCollector {
    fn name(&self) -> &'static str {
        ENGINE
    }

    fn handle(&self, exported: &ExportedRecord) {
        let record = &exported.record;
        let mut state = self.state.lock().unwrap();

        if let RecordBody::IncomingRequest(request) = &record.body {
            if self.is_account_constructor(request) {
                if let Some(origin) = request.reason {
                    let outcome = state.builders.link(record.id, origin);
                    self.output.settle(self.name(), origin, outcome);
                }
            }
        }

        if let Some(pair) = state.pairs.offer(record) {
            self.on_pair(&mut state, pair);
        }

        if let RecordBody::Activate(activate) = &record.body {
            if activate.image == self.prototypes.account {
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
    use pulseindex_core::RecordId;
    use serde_json::json;

    const R: RecordId = RecordId::new(65600, 1);
    const N: RecordId = RecordId::new(65600, 2);
    const A: RecordId = RecordId::new(65600, 3);
    const S: RecordId = RecordId::new(65600, 4);

    fn collector() -> MemberCollector {
        MemberCollector::new(Prototypes::default(), codec())
    }

    fn create_records() -> Vec<ExportedRecord> {
        let account = Prototypes::default().account;
        vec![
            api_call(R, "member.create", json!({}), None),
            constructor(N, account, R, None),
            activate(A, N, account, json!({"balance": "1000"})),
            result(S, R, json!([{"reference": "insolar:65600.9", "migrationAddress": "0xM1"}, null])),
        ]
    }

    fn expected() -> Member {
        Member {
            member_ref: Reference::new(65600, 9),
            balance: "1000".into(),
            migration_address: Some("0xM1".into()),
            account_state: A,
            status: Status::Success,
            pulse: 65600,
        }
    }

    #[test]
    fn every_arrival_order_composes_the_same_member() {
        let records = create_records();
        for order in permutations(records.len()) {
            let c = collector();
            for i in &order {
                c.handle(&records[*i]);
            }
            assert_eq!(c.output().items(), vec![expected()], "order {order:?}");
            let pending = c.pending();
            assert_eq!((pending.builders, pending.links), (0, 0), "order {order:?}");
        }
    }

    #[test]
    fn activate_caused_directly_by_the_call_is_joined() {
        let account = Prototypes::default().account;
        let c = collector();
        c.handle(&api_call(R, "member.create", json!({}), None));
        c.handle(&activate(A, R, account, json!({"balance": "5"})));
        c.handle(&result(S, R, json!([{"reference": "insolar:65600.9"}, null])));

        let members = c.output().items();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].status, Status::Success);
        assert_eq!(members[0].account_state, A);
        assert_eq!(members[0].balance, "5");
        assert_eq!(members[0].migration_address, None);
    }

    #[test]
    fn failed_creation_inserts_nothing() {
        let c = collector();
        c.handle(&api_call(R, "member.create", json!({}), None));
        c.handle(&result(S, R, json!([null, {"message": "key exists"}])));
        assert!(c.output().is_empty());
        assert_eq!(c.pending().total(), 0);
    }

    #[test]
    fn unparsable_member_reference_drops_the_candidate() {
        let account = Prototypes::default().account;
        let c = collector();
        c.handle(&api_call(R, "member.create", json!({}), None));
        c.handle(&activate(A, R, account, json!({"balance": "5"})));
        c.handle(&result(S, R, json!([{"reference": "not-a-ref"}, null])));
        assert!(c.output().is_empty());
        assert_eq!(c.pending().builders, 0);
    }

    #[test]
    fn undecodable_account_memory_degrades_status() {
        let account = Prototypes::default().account;
        let c = collector();
        c.handle(&api_call(R, "member.create", json!({}), None));
        c.handle(&activate(A, R, account, json!({"owner": "x"})));
        c.handle(&result(S, R, json!([{"reference": "insolar:65600.9"}, null])));
        let members = c.output().items();
        assert_eq!(members[0].status.as_str(), "ERR_MISSING_BALANCE");
        assert_eq!(members[0].balance, "");
    }

    #[test]
    fn unrelated_calls_leave_nothing_behind() {
        let c = collector();
        c.handle(&api_call(R, "member.transfer", json!({"amount": "1"}), None));
        c.handle(&result(S, R, json!([{"fee": "1"}, null])));
        assert!(c.output().is_empty());
        assert_eq!(c.pending(), PendingStats::default());
    }
}
