//! Parsing for the `start` event payload a tracer sends as its handshake.
//!
//! The client's handshake carries no structure of its own: its `start`
//! payload *is* the auth token, handed to the configured auth predicate
//! verbatim. The tracer's handshake is a small record naming the session it
//! wants to join.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::BrokerError;

#[derive(Debug, Clone, Deserialize)]
pub struct TracerStart {
    pub uuid: String,
    #[serde(default)]
    pub auth: Value,
    #[serde(default)]
    pub local: (i64, i64),
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TracerStart {
    pub fn from_payload(payload: &Value) -> Result<Self, BrokerError> {
        serde_json::from_value(payload.clone())
            .map_err(|e| BrokerError::Tracer(format!("malformed start payload: {e}")))
    }
}
