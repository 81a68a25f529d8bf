//! Pluggable serialization for the opaque blob the tracer transport carries.
//!
//! The reference implementation this system is modeled on lets each side
//! choose its own serializer for the framed payload (the tracer historically
//! used a pickle-like format, the client used JSON). Rust has no idiomatic
//! drop-in for the former without fabricating a dependency, so the default
//! codec here is JSON on both sides; `BlobCodec` exists so a deployment can
//! swap in something else without touching the listener state machines.

use crate::error::BrokerError;
use crate::event::Event;

pub trait BlobCodec: Send + Sync + 'static {
    fn encode(&self, event: &Event) -> Result<Vec<u8>, BrokerError>;
    fn decode(&self, bytes: &[u8]) -> Result<Event, BrokerError>;
}

/// Default codec: the blob is just the JSON encoding of the event.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonBlobCodec;

impl BlobCodec for JsonBlobCodec {
    fn encode(&self, event: &Event) -> Result<Vec<u8>, BrokerError> {
        serde_json::to_vec(event).map_err(BrokerError::from)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Event, BrokerError> {
        serde_json::from_slice(bytes).map_err(BrokerError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_blob_codec_round_trips() {
        let codec = JsonBlobCodec;
        let event = Event::new("start", json!({"uuid": "abc"}));
        let bytes = codec.encode(&event).unwrap();
        let decoded = codec.decode(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
