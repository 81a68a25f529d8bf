//! Stand-in for a side of the broker a deployment isn't running — e.g. a
//! test that drives the tracer transport directly and has no interest in
//! ever accepting a real client connection. `is_running` always reports
//! `true` so the facade can treat it identically to a real listener that
//! has successfully started.

use async_trait::async_trait;

use tracebroker_core::error::Result;

use super::Listener;

#[derive(Debug, Default)]
pub struct NoopListener;

impl NoopListener {
    pub fn new() -> Self {
        NoopListener
    }
}

#[async_trait]
impl Listener for NoopListener {
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) {}

    fn is_running(&self) -> bool {
        true
    }
}
