//! Join primitives shared by every collector.
//!
//! [`PairCache`] matches a request with its result in whichever order they
//! arrive. [`BuilderTable`] accumulates the legs of a composite entity under
//! the id of the request that caused it, following `reason` links when a
//! state record was produced by an intermediate constructor call.

use std::collections::HashMap;

use pulseindex_core::types::{Record, RecordBody, RecordId};

// ─── Request / result pairs ──────────────────────────────────────────────────

/// An incoming request together with its result.
#[derive(Debug, Clone, PartialEq)]
pub struct Pair {
    pub request: Record,
    pub result: Record,
}

/// Symmetric two-sided cache of requests and results keyed by request id.
#[derive(Debug, Default)]
pub struct PairCache {
    requests: HashMap<RecordId, Record>,
    results: HashMap<RecordId, Record>,
}

impl PairCache {
    /// Offer a request or a result.
    ///
    /// Returns the completed pair when the counterpart was already parked;
    /// otherwise parks the record. Pairs whose request is outgoing are
    /// consumed and discarded, never returned. Other record kinds are ignored.
    pub fn offer(&mut self, record: &Record) -> Option<Pair> {
        let pair = match &record.body {
            RecordBody::IncomingRequest(_) | RecordBody::OutgoingRequest(_) => {
                match self.results.remove(&record.id) {
                    Some(result) => Pair {
                        request: record.clone(),
                        result,
                    },
                    None => {
                        self.requests.insert(record.id, record.clone());
                        return None;
                    }
                }
            }
            RecordBody::Result(result) => match self.requests.remove(&result.request) {
                Some(request) => Pair {
                    request,
                    result: record.clone(),
                },
                None => {
                    self.results.insert(result.request, record.clone());
                    return None;
                }
            },
            _ => return None,
        };

        match pair.request.body {
            RecordBody::IncomingRequest(_) => Some(pair),
            _ => None,
        }
    }

    pub fn requests(&self) -> usize {
        self.requests.len()
    }

    pub fn results(&self) -> usize {
        self.results.len()
    }
}

// ─── Builders ────────────────────────────────────────────────────────────────

/// Why a builder was closed without producing an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discard {
    /// The contract call failed and this kind records no cancellations.
    Canceled,
    /// A mandatory reference could not be resolved.
    Unresolvable(String),
}

/// Result of offering a leg to a builder.
#[derive(Debug, Clone, PartialEq)]
pub enum Finalize<T> {
    Incomplete,
    Composed(T),
    Discarded(Discard),
}

impl<T> Finalize<T> {
    pub fn is_done(&self) -> bool {
        !matches!(self, Self::Incomplete)
    }
}

/// Accumulator for the legs of one composite entity.
pub trait Builder: Default {
    type Output;

    /// Merge the legs of a builder that was parked under another key.
    fn absorb(&mut self, other: Self);

    /// Compose the entity if every required leg is present.
    fn try_finalize(&mut self) -> Finalize<Self::Output>;
}

/// Builders keyed by causal origin id, plus `request → origin` links.
#[derive(Debug)]
pub struct BuilderTable<B> {
    builders: HashMap<RecordId, B>,
    links: HashMap<RecordId, RecordId>,
}

impl<B> Default for BuilderTable<B> {
    fn default() -> Self {
        Self {
            builders: HashMap::new(),
            links: HashMap::new(),
        }
    }
}

impl<B: Builder> BuilderTable<B> {
    /// Record that state produced by request `via` belongs to `origin`.
    ///
    /// A builder already parked under `via` (its state leg arrived first) is
    /// re-keyed onto `origin` and the link is not kept.
    pub fn link(&mut self, via: RecordId, origin: RecordId) -> Finalize<B::Output> {
        match self.builders.remove(&via) {
            Some(parked) => self.update(origin, |b| b.absorb(parked)),
            None => {
                self.links.insert(via, origin);
                Finalize::Incomplete
            }
        }
    }

    /// The origin for state produced by request `via`, consuming the link.
    pub fn resolve(&mut self, via: RecordId) -> RecordId {
        self.links.remove(&via).unwrap_or(via)
    }

    /// Apply `f` to the builder for `origin` and try to finalize it.
    /// Finished builders are removed.
    pub fn update(&mut self, origin: RecordId, f: impl FnOnce(&mut B)) -> Finalize<B::Output> {
        let builder = self.builders.entry(origin).or_default();
        f(builder);
        let outcome = builder.try_finalize();
        if outcome.is_done() {
            self.builders.remove(&origin);
        }
        outcome
    }

    /// Drop whatever was collected for `origin`.
    pub fn abandon(&mut self, origin: RecordId) -> bool {
        self.builders.remove(&origin).is_some()
    }

    pub fn builders(&self) -> usize {
        self.builders.len()
    }

    pub fn links(&self) -> usize {
        self.links.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulseindex_core::types::{CallResult, Request};

    fn incoming(id: RecordId) -> Record {
        Record::new(
            id,
            RecordBody::IncomingRequest(Request {
                caller: None,
                object: None,
                prototype: None,
                method: "Call".into(),
                reason: None,
                arguments: vec![],
            }),
        )
    }

    fn outgoing(id: RecordId) -> Record {
        let mut r = incoming(id);
        if let RecordBody::IncomingRequest(req) = r.body {
            r.body = RecordBody::OutgoingRequest(req);
        }
        r
    }

    fn result(id: RecordId, request: RecordId) -> Record {
        Record::new(
            id,
            RecordBody::Result(CallResult {
                object: None,
                request,
                payload: vec![],
            }),
        )
    }

    #[test]
    fn pair_request_first() {
        let mut cache = PairCache::default();
        let (r, s) = (RecordId::new(1, 1), RecordId::new(1, 2));
        assert!(cache.offer(&incoming(r)).is_none());
        assert_eq!(cache.requests(), 1);
        let pair = cache.offer(&result(s, r)).unwrap();
        assert_eq!(pair.request.id, r);
        assert_eq!(pair.result.id, s);
        assert_eq!((cache.requests(), cache.results()), (0, 0));
    }

    #[test]
    fn pair_result_first() {
        let mut cache = PairCache::default();
        let (r, s) = (RecordId::new(1, 1), RecordId::new(1, 2));
        assert!(cache.offer(&result(s, r)).is_none());
        assert_eq!(cache.results(), 1);
        let pair = cache.offer(&incoming(r)).unwrap();
        assert_eq!(pair.request.id, r);
        assert_eq!((cache.requests(), cache.results()), (0, 0));
    }

    #[test]
    fn outgoing_pairs_are_discarded_both_ways() {
        let mut cache = PairCache::default();
        let (r, s) = (RecordId::new(1, 1), RecordId::new(1, 2));
        assert!(cache.offer(&outgoing(r)).is_none());
        assert!(cache.offer(&result(s, r)).is_none());
        assert_eq!((cache.requests(), cache.results()), (0, 0));

        assert!(cache.offer(&result(s, r)).is_none());
        assert!(cache.offer(&outgoing(r)).is_none());
        assert_eq!((cache.requests(), cache.results()), (0, 0));
    }

    #[derive(Default)]
    struct Two {
        a: Option<u32>,
        b: Option<u32>,
    }

    impl Builder for Two {
        type Output = (u32, u32);
        fn absorb(&mut self, other: Self) {
            self.a = self.a.or(other.a);
            self.b = self.b.or(other.b);
        }
        fn try_finalize(&mut self) -> Finalize<(u32, u32)> {
            match (self.a, self.b) {
                (Some(a), Some(b)) => Finalize::Composed((a, b)),
                _ => Finalize::Incomplete,
            }
        }
    }

    #[test]
    fn builder_completes_in_either_order() {
        let origin = RecordId::new(5, 1);
        let mut table = BuilderTable::<Two>::default();
        assert_eq!(table.update(origin, |b| b.b = Some(2)), Finalize::Incomplete);
        assert_eq!(table.builders(), 1);
        assert_eq!(table.update(origin, |b| b.a = Some(1)), Finalize::Composed((1, 2)));
        assert_eq!(table.builders(), 0);
    }

    #[test]
    fn link_before_state_leg_resolves_to_origin() {
        let (origin, via) = (RecordId::new(5, 1), RecordId::new(5, 2));
        let mut table = BuilderTable::<Two>::default();
        assert_eq!(table.link(via, origin), Finalize::Incomplete);
        assert_eq!(table.links(), 1);
        assert_eq!(table.resolve(via), origin);
        assert_eq!(table.links(), 0);
        assert_eq!(table.resolve(via), via);
    }

    #[test]
    fn link_after_state_leg_rekeys_parked_builder() {
        let (origin, via) = (RecordId::new(5, 1), RecordId::new(5, 2));
        let mut table = BuilderTable::<Two>::default();
        table.update(origin, |b| b.a = Some(1));
        let parked_at = table.resolve(via);
        assert_eq!(parked_at, via);
        table.update(parked_at, |b| b.b = Some(2));
        assert_eq!(table.builders(), 2);

        assert_eq!(table.link(via, origin), Finalize::Composed((1, 2)));
        assert_eq!(table.builders(), 0);
        assert_eq!(table.links(), 0);
    }
}
