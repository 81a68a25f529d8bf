//! tracebroker-broker: pairs a tracer (raw TCP, length-prefixed) peer with a
//! client (WebSocket, JSON) peer by session id and forwards events between
//! them.

pub mod config;
pub mod listener;
pub mod server;
pub mod store;

pub use config::BrokerConfig;
pub use listener::{ClientListener, Listener, NoopListener, TracerListener};
pub use server::{scoped, Server};
pub use store::{AttachOutcome, AuthFn, SessionStore, StoreConfig};
