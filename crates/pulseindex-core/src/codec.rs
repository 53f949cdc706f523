//! Payload codec boundary.
//!
//! Call arguments, call results and contract state memory arrive as opaque
//! bytes. Collectors never parse them directly; they ask a [`PayloadCodec`]
//! for a generic key-value tree and read fields from that.

use serde_json::Value;

use crate::error::IndexerError;

/// Decodes opaque contract payloads into a generic value tree.
pub trait PayloadCodec: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<Value, IndexerError>;

    /// Codec name for logs.
    fn name(&self) -> &'static str;
}

/// Codec for JSON-encoded payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl PayloadCodec for JsonCodec {
    fn decode(&self, bytes: &[u8]) -> Result<Value, IndexerError> {
        serde_json::from_slice(bytes).map_err(|e| IndexerError::Codec(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "json"
    }
}
