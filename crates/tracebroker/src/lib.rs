//! Top-level facade crate for tracebroker.
//!
//! Re-exports the wire model and the broker library so users can depend on
//! a single crate.

pub mod core {
    pub use tracebroker_core::*;
}

pub mod broker {
    pub use tracebroker_broker::*;
}
