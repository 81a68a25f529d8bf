//! Shared error type across tracebroker crates.

use thiserror::Error;

/// The error taxonomy carried on the wire as the `e` field of an `error` event's
/// payload. Each variant names the side that is affected, not the side at fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Auth,
    Tracer,
    Client,
    Duplicate,
    Framing,
    Inactivity,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Auth => "auth",
            ErrorKind::Tracer => "tracer",
            ErrorKind::Client => "client",
            ErrorKind::Duplicate => "duplicate",
            ErrorKind::Framing => "framing",
            ErrorKind::Inactivity => "inactivity",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Unified error type used by core and broker.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("auth: {0}")]
    Auth(String),
    #[error("tracer: {0}")]
    Tracer(String),
    #[error("client: {0}")]
    Client(String),
    #[error("duplicate attach for session {0}")]
    Duplicate(String),
    #[error("framing: {0}")]
    Framing(String),
    #[error("inactivity timeout")]
    Inactivity,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed event payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("config: {0}")]
    Config(String),
}

impl BrokerError {
    /// Map to the wire-level error taxonomy, when this error is one that gets
    /// reported to a peer as an `error` event. Not every variant is reportable.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            BrokerError::Auth(_) => Some(ErrorKind::Auth),
            BrokerError::Tracer(_) => Some(ErrorKind::Tracer),
            BrokerError::Client(_) => Some(ErrorKind::Client),
            BrokerError::Duplicate(_) => Some(ErrorKind::Duplicate),
            BrokerError::Framing(_) => Some(ErrorKind::Framing),
            BrokerError::Inactivity => Some(ErrorKind::Inactivity),
            BrokerError::Io(_) | BrokerError::Malformed(_) => Some(ErrorKind::Framing),
            BrokerError::Config(_) => None,
        }
    }

    pub fn reason(&self) -> String {
        self.to_string()
    }
}
