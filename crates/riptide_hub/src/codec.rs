//! Pluggable envelope serialization boundary.
//!
//! The hub encodes envelopes exactly once per broadcast through this trait,
//! so an application can swap the wire format without touching fan-out or
//! connection management. JSON is the default.

use crate::envelope::Envelope;
use crate::error::CodecError;

/// Serialization engine for message envelopes.
pub trait EnvelopeCodec: Send + Sync {
    /// Encodes an envelope to its text wire form.
    fn encode(&self, envelope: &Envelope) -> Result<String, CodecError>;

    /// Decodes an inbound text frame into an envelope.
    fn decode(&self, raw: &str) -> Result<Envelope, CodecError>;
}

/// Default codec: the `{"event": ..., "data": ...}` JSON shape.
#[derive(Debug, Default)]
pub struct JsonEnvelopeCodec;

impl EnvelopeCodec for JsonEnvelopeCodec {
    fn encode(&self, envelope: &Envelope) -> Result<String, CodecError> {
        serde_json::to_string(envelope).map_err(|err| CodecError::Encode(err.to_string()))
    }

    fn decode(&self, raw: &str) -> Result<Envelope, CodecError> {
        serde_json::from_str(raw).map_err(|err| CodecError::Decode(err.to_string()))
    }
}
