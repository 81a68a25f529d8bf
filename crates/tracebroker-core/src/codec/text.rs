//! JSON text framing for the client (WebSocket) transport. Each WS text
//! message is exactly one encoded `Event`; there is no length prefix, the
//! WebSocket framing already delimits messages.

use crate::error::BrokerError;
use crate::event::Event;

pub fn encode_text(event: &Event) -> Result<String, BrokerError> {
    serde_json::to_string(event).map_err(BrokerError::from)
}

pub fn decode_text(text: &str) -> Result<Event, BrokerError> {
    serde_json::from_str(text).map_err(BrokerError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_an_event() {
        let event = Event::new("breakpoint", json!({"file": "a.py", "line": 4}));
        let text = encode_text(&event).unwrap();
        assert_eq!(decode_text(&text).unwrap(), event);
    }

    #[test]
    fn rejects_malformed_text() {
        assert!(decode_text("not json").is_err());
    }
}
