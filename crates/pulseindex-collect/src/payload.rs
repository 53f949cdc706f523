//! Reading contract payloads through the codec boundary.
//!
//! Nothing here fails loudly. Every problem maps to a [`DecodeError`] whose
//! code ends up in the composed entity's status instead.

use serde_json::Value;
use tracing::warn;

use pulseindex_core::entities::Status;
use pulseindex_core::types::{CallResult, Record, RecordId, Reference, Request};
use pulseindex_core::PayloadCodec;

use crate::join::Pair;

/// Why a payload could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The codec rejected the bytes.
    Undecodable,
    /// The payload decoded, but not to a key-value map.
    NotObject,
    /// A required key is absent or null.
    Missing(&'static str),
    /// A key holds a value of the wrong type.
    Bad(&'static str),
    /// A call result without a `returns` list.
    NoReturns,
}

impl DecodeError {
    /// Status code stored in place of a real status.
    pub fn code(&self) -> String {
        match self {
            Self::Undecodable => "ERR_UNDECODABLE".into(),
            Self::NotObject => "ERR_NOT_OBJECT".into(),
            Self::Missing(field) => format!("ERR_MISSING_{}", screaming(field)),
            Self::Bad(field) => format!("ERR_BAD_{}", screaming(field)),
            Self::NoReturns => "ERR_NO_RETURNS".into(),
        }
    }

    pub fn status(&self) -> Status {
        Status::Invalid(self.code())
    }
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.code())
    }
}

/// `migrationAddresses` → `MIGRATION_ADDRESSES`
fn screaming(field: &str) -> String {
    let mut out = String::with_capacity(field.len() + 4);
    for (i, c) in field.chars().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            out.push('_');
        }
        out.push(c.to_ascii_uppercase());
    }
    out
}

fn decode_object(codec: &dyn PayloadCodec, bytes: &[u8]) -> Result<Value, DecodeError> {
    let value = codec.decode(bytes).map_err(|_| DecodeError::Undecodable)?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(DecodeError::NotObject)
    }
}

// ─── Field readers ────────────────────────────────────────────────────────────

/// A string field.
pub fn str_field(value: &Value, key: &'static str) -> Result<String, DecodeError> {
    match value.get(key) {
        None | Some(Value::Null) => Err(DecodeError::Missing(key)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(DecodeError::Bad(key)),
    }
}

/// A decimal amount, given either as a string of digits or as a JSON number.
pub fn amount_field(value: &Value, key: &'static str) -> Result<String, DecodeError> {
    match value.get(key) {
        None | Some(Value::Null) => Err(DecodeError::Missing(key)),
        Some(Value::String(s)) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
            Ok(s.clone())
        }
        Some(Value::Number(n)) if n.is_u64() => Ok(n.to_string()),
        Some(_) => Err(DecodeError::Bad(key)),
    }
}

/// An unsigned 32-bit field (pulse numbers).
pub fn u32_field(value: &Value, key: &'static str) -> Result<u32, DecodeError> {
    match value.get(key) {
        None | Some(Value::Null) => Err(DecodeError::Missing(key)),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or(DecodeError::Bad(key)),
        Some(_) => Err(DecodeError::Bad(key)),
    }
}

/// A list of strings.
pub fn str_list_field(value: &Value, key: &'static str) -> Result<Vec<String>, DecodeError> {
    match value.get(key) {
        None | Some(Value::Null) => Err(DecodeError::Missing(key)),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string).ok_or(DecodeError::Bad(key)))
            .collect(),
        Some(_) => Err(DecodeError::Bad(key)),
    }
}

// ─── Contract calls ───────────────────────────────────────────────────────────

/// Decoded arguments of an API contract call.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractCall {
    pub call_site: String,
    pub params: Value,
    /// Reference of the calling member, as sent by the client.
    pub reference: Option<String>,
}

impl ContractCall {
    pub fn decode(codec: &dyn PayloadCodec, request: &Request) -> Result<Self, DecodeError> {
        let args = decode_object(codec, &request.arguments)?;
        let call_site = str_field(&args, "callSite")?;
        let params = match args.get("callParams") {
            None | Some(Value::Null) => Value::Object(Default::default()),
            Some(v @ Value::Object(_)) => v.clone(),
            Some(_) => return Err(DecodeError::Bad("callParams")),
        };
        let reference = str_field(&args, "reference").ok();
        Ok(Self {
            call_site,
            params,
            reference,
        })
    }

    pub fn is(&self, call_site: &str) -> bool {
        self.call_site == call_site
    }

    pub fn param_str(&self, key: &'static str) -> Result<String, DecodeError> {
        str_field(&self.params, key)
    }

    pub fn param_amount(&self, key: &'static str) -> Result<String, DecodeError> {
        amount_field(&self.params, key)
    }

    pub fn param_list(&self, key: &'static str) -> Result<Vec<String>, DecodeError> {
        str_list_field(&self.params, key)
    }
}

// ─── Call results ─────────────────────────────────────────────────────────────

/// A call result: `returns[0]` on success, `returns[1]` holds the contract error.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Value),
    Failed(Value),
}

impl Outcome {
    pub fn decode(codec: &dyn PayloadCodec, result: &CallResult) -> Result<Self, DecodeError> {
        let payload = decode_object(codec, &result.payload)?;
        let returns = payload
            .get("returns")
            .and_then(Value::as_array)
            .filter(|r| !r.is_empty())
            .ok_or(DecodeError::NoReturns)?;
        match returns.get(1) {
            Some(err) if !err.is_null() => Ok(Self::Failed(err.clone())),
            _ => Ok(Self::Success(returns[0].clone())),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Decoded contract state memory.
pub fn decode_memory(codec: &dyn PayloadCodec, memory: &[u8]) -> Result<Value, DecodeError> {
    decode_object(codec, memory)
}

// ─── Builder legs ─────────────────────────────────────────────────────────────

/// A completed API call: the request, its decoded arguments and outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct CallLeg {
    pub request: Record,
    pub call: ContractCall,
    pub outcome: Result<Outcome, DecodeError>,
}

impl CallLeg {
    /// Fails when the request arguments are not an API contract call.
    pub fn decode(codec: &dyn PayloadCodec, pair: &Pair) -> Result<Self, DecodeError> {
        let request = pair.request.as_request().ok_or(DecodeError::NotObject)?;
        let call = ContractCall::decode(codec, request)?;
        let outcome = match pair.result.as_result() {
            Some(result) => Outcome::decode(codec, result),
            None => Err(DecodeError::NoReturns),
        };
        Ok(Self {
            request: pair.request.clone(),
            call,
            outcome,
        })
    }

    pub fn is_failed(&self) -> bool {
        matches!(&self.outcome, Ok(outcome) if outcome.is_failed())
    }
}

/// Object state written by an `Activate`.
#[derive(Debug, Clone, PartialEq)]
pub struct StateLeg {
    pub id: RecordId,
    pub memory: Result<Value, DecodeError>,
}

impl StateLeg {
    pub fn decode(codec: &dyn PayloadCodec, id: RecordId, memory: &[u8]) -> Self {
        Self {
            id,
            memory: decode_memory(codec, memory),
        }
    }

    /// Read one field of the decoded memory.
    pub fn field<T>(
        &self,
        read: impl FnOnce(&Value) -> Result<T, DecodeError>,
    ) -> Result<T, DecodeError> {
        match &self.memory {
            Ok(memory) => read(memory),
            Err(err) => Err(err.clone()),
        }
    }
}

/// The intermediate constructor call of a composite object.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLeg {
    pub id: RecordId,
    pub caller: Option<Reference>,
}

/// Logs the degradation and keeps the first one: once a status is no longer
/// `SUCCESS` it stays put.
pub fn degrade(engine: &str, origin: RecordId, status: &mut Status, err: &DecodeError) {
    warn!(engine, origin = %origin, code = %err, "payload field degraded");
    if status.is_success() {
        *status = err.status();
    }
}

/// The value of a column that may be left empty, logging why it is.
pub fn field_or_warn<T>(
    engine: &str,
    origin: RecordId,
    field: Result<T, DecodeError>,
) -> Option<T> {
    match field {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(engine, origin = %origin, code = %err, "payload field degraded");
            None
        }
    }
}
