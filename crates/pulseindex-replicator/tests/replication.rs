//! End-to-end replication tests.
//!
//! A small ledger (member creation, a transfer that amends the account, a
//! trailing pulse) is replayed through the pull loop into in-memory storage
//! under different orderings, failures and restarts; the committed tables
//! must always come out the same.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use pulseindex_collect::Collectors;
use pulseindex_core::entities::{Member, Status, Transfer};
use pulseindex_core::types::{Activate, Amend, CallResult, Request};
use pulseindex_core::{
    Cursor, ExportedRecord, JsonCodec, Position, Prototypes, PulseInfo, PulseNumber, Record,
    RecordBody, RecordId, Reference, ReplicatorConfig, ReplicatorState, Storage, StorageTx,
};
use pulseindex_replicator::{
    IndexLoop, MemorySource, PulseSync, Replicator, ReplicatorBuilder, Step,
};
use pulseindex_storage::InMemoryStorage;

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn exported(record_number: u32, id: RecordId, body: RecordBody) -> ExportedRecord {
    ExportedRecord {
        record_number,
        record: Record::new(id, body),
    }
}

fn request(method: &str) -> Request {
    Request {
        caller: None,
        object: None,
        prototype: None,
        method: method.into(),
        reason: None,
        arguments: vec![],
    }
}

fn api_call(call_site: &str, params: Value, reference: Option<&str>) -> RecordBody {
    let mut args = json!({"callSite": call_site, "callParams": params});
    if let Some(reference) = reference {
        args["reference"] = json!(reference);
    }
    let mut req = request("Call");
    req.arguments = serde_json::to_vec(&args).unwrap();
    RecordBody::IncomingRequest(req)
}

fn constructor(prototype: Reference, reason: RecordId) -> RecordBody {
    let mut req = request("New");
    req.prototype = Some(prototype);
    req.reason = Some(reason);
    RecordBody::IncomingRequest(req)
}

fn result(request: RecordId, returns: Value) -> RecordBody {
    RecordBody::Result(CallResult {
        object: None,
        request,
        payload: serde_json::to_vec(&json!({ "returns": returns })).unwrap(),
    })
}

fn pulse(number: PulseNumber) -> PulseInfo {
    PulseInfo {
        number,
        entropy: format!("{number:08x}"),
        timestamp: pulseindex_core::types::pulse_timestamp(number),
    }
}

const CREATE: RecordId = RecordId::new(65600, 1);
const NEW_ACCOUNT: RecordId = RecordId::new(65600, 2);
const ACCOUNT_STATE: RecordId = RecordId::new(65600, 3);
const CREATE_RESULT: RecordId = RecordId::new(65600, 4);
const TRANSFER: RecordId = RecordId::new(65700, 10);
const TRANSFER_RESULT: RecordId = RecordId::new(65700, 11);
const ACCOUNT_AMEND: RecordId = RecordId::new(65700, 12);
const TRAILER: RecordId = RecordId::new(65800, 1);

/// The member-creation legs of pulse 65600, unnumbered.
fn creation_legs() -> Vec<(RecordId, RecordBody)> {
    let account = Prototypes::default().account;
    vec![
        (CREATE, api_call("member.create", json!({}), None)),
        (NEW_ACCOUNT, constructor(account, CREATE)),
        (
            ACCOUNT_STATE,
            RecordBody::Activate(Activate {
                request: NEW_ACCOUNT,
                image: account,
                memory: serde_json::to_vec(&json!({"balance": "1000"})).unwrap(),
            }),
        ),
        (
            CREATE_RESULT,
            result(
                CREATE,
                json!([{"reference": "insolar:65600.9", "migrationAddress": "0xM1"}, null]),
            ),
        ),
    ]
}

/// Pulses 65700 (transfer + balance amend) and 65800 (an unrelated record).
fn later_records() -> Vec<ExportedRecord> {
    let account = Prototypes::default().account;
    vec![
        exported(
            10,
            TRANSFER,
            api_call(
                "member.transfer",
                json!({"amount": "250", "toMemberReference": "insolar:65600.9"}),
                Some("insolar:65600.5"),
            ),
        ),
        exported(11, TRANSFER_RESULT, result(TRANSFER, json!([{"fee": "10"}, null]))),
        exported(
            12,
            ACCOUNT_AMEND,
            RecordBody::Amend(Amend {
                request: TRANSFER,
                image: account,
                prev_state: ACCOUNT_STATE,
                memory: serde_json::to_vec(&json!({"balance": "740"})).unwrap(),
            }),
        ),
        exported(1, TRAILER, RecordBody::IncomingRequest(request("Ping"))),
    ]
}

/// The whole ledger with pulse 65600's legs arriving in `order`.
fn ledger(order: &[usize]) -> Vec<ExportedRecord> {
    let legs = creation_legs();
    let mut records: Vec<_> = order
        .iter()
        .enumerate()
        .map(|(i, &leg)| {
            let (id, body) = legs[leg].clone();
            exported(i as u32 + 1, id, body)
        })
        .collect();
    records.extend(later_records());
    records
}

fn source(records: Vec<ExportedRecord>) -> Arc<MemorySource> {
    let source = Arc::new(MemorySource::with_records(records));
    for number in [65600, 65700, 65800] {
        source.push_pulse(pulse(number));
    }
    source
}

fn config(batch_size: u32) -> ReplicatorConfig {
    ReplicatorBuilder::new()
        .batch_size(batch_size)
        .request_delay_ms(1)
        .commit_retry_delay_ms(1)
        .pulse_batch_size(1)
        .build_config()
}

async fn replicator(
    source: Arc<MemorySource>,
    store: &InMemoryStorage,
    batch_size: u32,
) -> Replicator {
    Replicator::init(config(batch_size), Arc::new(store.clone()), source.clone(), source)
        .await
        .unwrap()
}

/// Drive a fresh index loop from the start until the stream is drained.
async fn replicate(source: Arc<MemorySource>, store: &InMemoryStorage, batch_size: u32) {
    let mut index_loop = build_loop(source, store, batch_size, Cursor::default(), None);
    while index_loop.step().await != Step::Drained {}
}

fn build_loop(
    source: Arc<MemorySource>,
    store: &InMemoryStorage,
    batch_size: u32,
    cursor: Cursor,
    last_synced: Option<PulseNumber>,
) -> IndexLoop {
    let config = config(batch_size);
    let collectors = Collectors::new(&config.prototypes, Arc::new(JsonCodec));
    let pulse_sync = PulseSync::new(
        source.clone(),
        collectors.pulses.clone(),
        config.pulse_batch_size,
        last_synced,
    );
    IndexLoop::new(
        config,
        source,
        Arc::new(store.clone()),
        Arc::new(collectors.registry()),
        pulse_sync,
        cursor,
    )
}

fn expected_member() -> Member {
    Member {
        member_ref: Reference::new(65600, 9),
        balance: "740".into(),
        migration_address: Some("0xM1".into()),
        account_state: ACCOUNT_AMEND,
        status: Status::Success,
        pulse: 65600,
    }
}

fn expected_transfer() -> Transfer {
    Transfer {
        tx_id: TRANSFER,
        amount: "250".into(),
        fee: "10".into(),
        from_member: Reference::new(65600, 5),
        to_member: Reference::new(65600, 9),
        pulse: 65700,
        timestamp: pulseindex_core::types::pulse_timestamp(65700),
        status: Status::Success,
    }
}

fn assert_replicated(store: &InMemoryStorage) {
    assert_eq!(store.members(), vec![expected_member()]);
    assert_eq!(store.transfers(), vec![expected_transfer()]);
    assert_eq!(store.raw_record_count(), 8);
    let pulses: Vec<_> = store.tables().pulses.into_keys().collect();
    assert_eq!(pulses, vec![65600, 65700, 65800]);
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn uninterrupted_run_commits_every_entity() {
    let store = InMemoryStorage::new();
    let source = source(ledger(&[0, 1, 2, 3]));
    replicate(source, &store, 100).await;
    assert_replicated(&store);
}

#[tokio::test]
async fn arrival_order_within_a_pulse_does_not_change_the_result() {
    for order in [[3, 2, 1, 0], [2, 0, 3, 1], [1, 3, 0, 2], [0, 3, 2, 1]] {
        let store = InMemoryStorage::new();
        let source = source(ledger(&order));
        replicate(source, &store, 3).await;
        assert_replicated(&store);
    }
}

#[tokio::test]
async fn failed_commits_are_retried_without_duplicates() {
    let store = InMemoryStorage::new();
    store.fail_next_commits(3);
    let source = source(ledger(&[0, 1, 2, 3]));
    let mut index_loop = build_loop(source, &store, 100, Cursor::default(), None);
    let stats = index_loop.stats();
    while index_loop.step().await != Step::Drained {}

    assert_replicated(&store);
    let stats = stats.snapshot();
    assert_eq!(stats.commit_retries, 3);
    assert_eq!(stats.committed_pulse, Some(65800));
    assert_eq!(stats.dumped.get("member"), Some(&1));
    assert_eq!(stats.dumped.get("balance_update"), Some(&1));
}

#[tokio::test]
async fn caches_survive_a_rolled_back_transaction() {
    let store = InMemoryStorage::new();
    let collectors = Collectors::new(&Prototypes::default(), Arc::new(JsonCodec));
    let registry = collectors.registry();
    for record in ledger(&[0, 1, 2, 3]).iter().take(4) {
        registry.dispatch(record);
    }
    assert_eq!(collectors.members.output().len(), 1);

    let mut tx = store.begin().await.unwrap();
    for handler in registry.flush_handlers() {
        handler.flush(&mut *tx).await.unwrap();
    }
    tx.rollback().await.unwrap();
    assert!(store.members().is_empty());
    assert_eq!(collectors.members.output().len(), 1);
    assert_eq!(collectors.raw.output().len(), 4);

    let mut tx: Box<dyn StorageTx> = store.begin().await.unwrap();
    for handler in registry.flush_handlers() {
        handler.flush(&mut *tx).await.unwrap();
    }
    tx.commit().await.unwrap();
    for handler in registry.flush_handlers() {
        handler.on_committed();
    }
    assert_eq!(store.members().len(), 1);
    assert!(collectors.members.output().is_empty());
    assert!(collectors.raw.output().is_empty());
}

#[tokio::test]
async fn restart_after_a_crash_mid_pulse_converges() {
    let store = InMemoryStorage::new();
    let source = source(ledger(&[0, 1, 2, 3]));

    // Five records: pulse 65600 commits at the boundary, the transfer request
    // of 65700 is delivered but never committed.
    let mut first = build_loop(source.clone(), &store, 5, Cursor::default(), None);
    assert_eq!(first.step().await, Step::Full);
    assert_eq!(store.commit_count(), 1);
    assert_eq!(store.raw_record_count(), 4);
    drop(first);

    let restarted = replicator(source.clone(), &store, 5).await;
    let resume = restarted.resume_point();
    assert_eq!(resume.cursor.position(), Position::new(65600, 4));
    assert_eq!(resume.last_synced_pulse, Some(65600));
    drop(restarted);

    let mut second = build_loop(source, &store, 5, resume.cursor, resume.last_synced_pulse);
    while second.step().await != Step::Drained {}
    assert_replicated(&store);
}

#[tokio::test]
async fn replaying_a_committed_stream_adds_nothing() {
    let store = InMemoryStorage::new();
    let source = source(ledger(&[0, 1, 2, 3]));
    let mut first = build_loop(source.clone(), &store, 100, Cursor::default(), None);
    while first.step().await != Step::Drained {}

    // Pulse 65600 again from the start: every insert is ignored.
    let replay = Arc::new(MemorySource::with_records(ledger(&[0, 1, 2, 3]).into_iter().take(4)));
    let mut second = build_loop(replay, &store, 100, Cursor::default(), Some(65800));
    while second.step().await != Step::Drained {}

    assert_replicated(&store);
}

#[tokio::test]
async fn relocation_skips_to_the_signalled_pulse() {
    let mut records = ledger(&[0, 1, 2, 3]);
    records.push(exported(
        7,
        RecordId::new(65650, 7),
        RecordBody::IncomingRequest(request("Skipped")),
    ));
    let source = source(records);
    source.relocate_after(Position::new(65600, 4), 65700);

    let store = InMemoryStorage::new();
    let mut index_loop = build_loop(source, &store, 4, Cursor::default(), None);
    assert_eq!(index_loop.step().await, Step::Full);
    assert_eq!(index_loop.step().await, Step::Relocated(65700));
    assert_eq!(index_loop.position(), Position::new(65700, 0));
    while index_loop.step().await != Step::Drained {}

    assert_replicated(&store);
    assert!(!store
        .tables()
        .raw_records
        .contains_key(&Position::new(65650, 7)));
}

#[tokio::test]
async fn interrupted_pull_resumes_from_the_last_delivered_record() {
    let store = InMemoryStorage::new();
    let source = source(ledger(&[0, 1, 2, 3]));
    source.interrupt_next(2);

    let mut index_loop = build_loop(source, &store, 100, Cursor::default(), None);
    assert_eq!(index_loop.step().await, Step::Drained);
    assert_eq!(index_loop.position(), Position::new(65600, 2));
    while index_loop.step().await != Step::Drained {}
    assert_replicated(&store);
}

#[tokio::test]
async fn lifecycle_start_and_stop() {
    let store = InMemoryStorage::new();
    let source = source(ledger(&[0, 1, 2, 3]));
    let config = ReplicatorBuilder::new()
        .request_delay_ms(60_000)
        .commit_retry_delay_ms(1)
        .build_config();
    let replicator = Replicator::init(config, Arc::new(store.clone()), source.clone(), source)
        .await
        .unwrap();
    let handle = replicator.start();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while handle.stats().committed_pulse != Some(65800) {
        assert!(tokio::time::Instant::now() < deadline, "replication did not catch up");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // The loop is parked in its drained-stream wait; stop must not sit it out.
    let stats = tokio::time::timeout(Duration::from_secs(5), handle.stop())
        .await
        .expect("stop timed out")
        .unwrap();
    assert_eq!(stats.state, ReplicatorState::Stopped);
    assert_eq!(stats.records, 8);
    assert_replicated(&store);
}
