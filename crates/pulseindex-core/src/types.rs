//! Shared types for the replication pipeline: pulses, record ids, references
//! and the tagged record body received from the export stream.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::IndexerError;

// ─── Pulses ──────────────────────────────────────────────────────────────────

/// Ledger-wide logical time step. The unit of commit atomicity.
pub type PulseNumber = u32;

/// The first pulse of the ledger.
pub const FIRST_PULSE: PulseNumber = 65537;

/// Unix time (seconds) of [`FIRST_PULSE`].
const FIRST_PULSE_UNIX: i64 = 1_514_764_800;

/// Approximate unix timestamp (seconds) of a pulse.
///
/// Pulse numbers advance one per second from 2018-01-01T00:00:00Z.
pub fn pulse_timestamp(pulse: PulseNumber) -> i64 {
    FIRST_PULSE_UNIX + i64::from(pulse.saturating_sub(FIRST_PULSE))
}

/// Pulse metadata delivered by the pulse stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PulseInfo {
    pub number: PulseNumber,
    /// Hex-encoded pulse entropy.
    pub entropy: String,
    /// Unix timestamp (seconds).
    pub timestamp: i64,
}

// ─── RecordId / Reference ────────────────────────────────────────────────────

/// Globally unique record identifier: pulse number plus intra-pulse sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId {
    pub pulse: PulseNumber,
    pub seq: u32,
}

impl RecordId {
    pub const fn new(pulse: PulseNumber, seq: u32) -> Self {
        Self { pulse, seq }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.pulse, self.seq)
    }
}

impl FromStr for RecordId {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (pulse, seq) = s
            .split_once('.')
            .ok_or_else(|| IndexerError::Codec(format!("malformed record id: {s:?}")))?;
        let pulse = pulse
            .parse()
            .map_err(|_| IndexerError::Codec(format!("malformed record id pulse: {s:?}")))?;
        let seq = seq
            .parse()
            .map_err(|_| IndexerError::Codec(format!("malformed record id sequence: {s:?}")))?;
        Ok(Self { pulse, seq })
    }
}

/// Reference to a ledger object: the id of the request that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Reference(pub RecordId);

impl Reference {
    const PREFIX: &'static str = "insolar:";

    pub const fn new(pulse: PulseNumber, seq: u32) -> Self {
        Self(RecordId::new(pulse, seq))
    }

    pub fn id(&self) -> RecordId {
        self.0
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", Self::PREFIX, self.0)
    }
}

impl FromStr for Reference {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s
            .strip_prefix(Self::PREFIX)
            .ok_or_else(|| IndexerError::Codec(format!("reference without prefix: {s:?}")))?;
        Ok(Self(id.parse()?))
    }
}

// ─── Record bodies ───────────────────────────────────────────────────────────

/// A contract call, incoming (executed here) or outgoing (issued from here).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub caller: Option<Reference>,
    /// Target object, `None` for constructor calls.
    pub object: Option<Reference>,
    pub prototype: Option<Reference>,
    pub method: String,
    /// The request that caused this one.
    pub reason: Option<RecordId>,
    #[serde(with = "hex_bytes")]
    pub arguments: Vec<u8>,
}

/// The result of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallResult {
    pub object: Option<Reference>,
    /// The request this result answers.
    pub request: RecordId,
    #[serde(with = "hex_bytes")]
    pub payload: Vec<u8>,
}

/// Object creation with its initial state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activate {
    pub request: RecordId,
    /// Prototype of the activated object.
    pub image: Reference,
    #[serde(with = "hex_bytes")]
    pub memory: Vec<u8>,
}

/// State transition superseding `prev_state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amend {
    pub request: RecordId,
    pub image: Reference,
    pub prev_state: RecordId,
    #[serde(with = "hex_bytes")]
    pub memory: Vec<u8>,
}

/// Object deactivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deactivate {
    pub request: RecordId,
    pub prev_state: RecordId,
}

/// Tagged record body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordBody {
    IncomingRequest(Request),
    OutgoingRequest(Request),
    Result(CallResult),
    Activate(Activate),
    Amend(Amend),
    Deactivate(Deactivate),
}

/// Immutable unit of ledger change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub body: RecordBody,
}

impl Record {
    pub fn new(id: RecordId, body: RecordBody) -> Self {
        Self { id, body }
    }

    pub fn pulse(&self) -> PulseNumber {
        self.id.pulse
    }

    /// The request body, for both incoming and outgoing requests.
    pub fn as_request(&self) -> Option<&Request> {
        match &self.body {
            RecordBody::IncomingRequest(r) | RecordBody::OutgoingRequest(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_result(&self) -> Option<&CallResult> {
        match &self.body {
            RecordBody::Result(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_activate(&self) -> Option<&Activate> {
        match &self.body {
            RecordBody::Activate(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_amend(&self) -> Option<&Amend> {
        match &self.body {
            RecordBody::Amend(a) => Some(a),
            _ => None,
        }
    }

    /// Short variant name for logs.
    pub fn kind(&self) -> &'static str {
        match &self.body {
            RecordBody::IncomingRequest(_) => "incoming_request",
            RecordBody::OutgoingRequest(_) => "outgoing_request",
            RecordBody::Result(_) => "result",
            RecordBody::Activate(_) => "activate",
            RecordBody::Amend(_) => "amend",
            RecordBody::Deactivate(_) => "deactivate",
        }
    }
}

/// One item of the export stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedRecord {
    /// Sequence number of the record within its pulse, as numbered by the exporter.
    pub record_number: u32,
    pub record: Record,
}

impl ExportedRecord {
    pub fn position(&self) -> crate::cursor::Position {
        crate::cursor::Position::new(self.record.pulse(), self.record_number)
    }
}

// ─── Contract prototypes ─────────────────────────────────────────────────────

/// Prototype references of the contracts the collectors recognise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prototypes {
    pub member: Reference,
    pub account: Reference,
    pub deposit: Reference,
    pub migration_admin: Reference,
}

impl Default for Prototypes {
    fn default() -> Self {
        Self {
            member: Reference::new(FIRST_PULSE, 1),
            account: Reference::new(FIRST_PULSE, 2),
            deposit: Reference::new(FIRST_PULSE, 3),
            migration_admin: Reference::new(FIRST_PULSE, 4),
        }
    }
}

/// Opaque byte fields travel as hex strings inside JSON.
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        hex::decode(text.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
