//! The wire event model shared by both peer transports.
//!
//! Every message that crosses either transport is an `Event`: a short string
//! kind (`e`) plus an arbitrary JSON payload (`p`). The broker never inspects
//! `p` beyond what a handful of well-known event kinds require (`start`,
//! `disable`, `error`); everything else is forwarded opaquely.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ErrorKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub e: String,
    #[serde(default)]
    pub p: Value,
}

impl Event {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Event {
            e: kind.into(),
            p: payload,
        }
    }
}

/// Disable payloads differ by transport: the tracer is told which shutdown
/// mode was used, the client is only ever told that it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DisableMode {
    Hard,
    Soft,
}

impl DisableMode {
    pub fn as_str(self) -> &'static str {
        match self {
            DisableMode::Hard => "hard",
            DisableMode::Soft => "soft",
        }
    }
}

pub fn format_event(kind: impl Into<String>, payload: Value) -> Event {
    Event::new(kind, payload)
}

pub fn format_error(kind: ErrorKind, reason: impl Into<String>) -> Event {
    Event::new(
        "error",
        json!({ "e": kind.as_str(), "reason": reason.into() }),
    )
}

pub fn format_disable_tracer(mode: DisableMode) -> Event {
    Event::new("disable", json!(mode.as_str()))
}

pub fn format_disable_client() -> Event {
    Event::new("disable", Value::Null)
}
