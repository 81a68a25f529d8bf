//! The `Listener` capability both peer-facing servers implement, plus a
//! no-op stand-in used when a deployment only wants to run one side (the
//! rest of the broker never needs to know the difference).

pub mod client;
pub mod noop;
pub mod tracer;

use async_trait::async_trait;
use tracebroker_core::error::Result;

pub use client::ClientListener;
pub use noop::NoopListener;
pub use tracer::TracerListener;

#[async_trait]
pub trait Listener: Send + Sync {
    async fn start(&self) -> Result<()>;
    async fn stop(&self);
    fn is_running(&self) -> bool;
}
