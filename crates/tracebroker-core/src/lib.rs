//! Shared wire model across tracebroker crates: the event envelope, the
//! error taxonomy, and the two transports' codecs.

pub mod codec;
pub mod error;
pub mod event;
pub mod start;

pub use error::{BrokerError, ErrorKind, Result};
pub use event::{format_disable_client, format_disable_tracer, format_error, format_event, DisableMode, Event};
pub use start::TracerStart;
