//! The state a single session (one uuid) carries while it lives in the
//! store.

use std::collections::VecDeque;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use tracebroker_core::event::{DisableMode, Event};

/// A connected half's outbound queue. The writer task on the other end of
/// `events_tx` drains it and writes to the transport; dropping every sender
/// for a channel (which happens when a `PeerHandle` is removed from its
/// session record) is itself the signal that tells that writer to stop.
#[derive(Clone)]
pub struct PeerHandle {
    pub events_tx: mpsc::UnboundedSender<Event>,
}

impl PeerHandle {
    pub fn new(events_tx: mpsc::UnboundedSender<Event>) -> Self {
        PeerHandle { events_tx }
    }

    pub fn send(&self, event: Event) {
        // The receiver only disappears once the session is torn down, at
        // which point nobody cares about messages sent into the void.
        let _ = self.events_tx.send(event);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    PendingTracer,
    PendingClient,
    Paired,
}

pub struct SessionRecord {
    pub state: SessionState,
    pub tracer: Option<PeerHandle>,
    pub client: Option<PeerHandle>,
    pub last_activity: Instant,
    pub disable_mode: DisableMode,
    pub attach_timer: Option<JoinHandle<()>>,
    pub pending_to_tracer: VecDeque<Event>,
    pub pending_to_client: VecDeque<Event>,
}

impl SessionRecord {
    pub fn new(disable_mode: DisableMode) -> Self {
        SessionRecord {
            state: SessionState::PendingTracer,
            tracer: None,
            client: None,
            last_activity: Instant::now(),
            disable_mode,
            attach_timer: None,
            pending_to_tracer: VecDeque::new(),
            pending_to_client: VecDeque::new(),
        }
    }
}

impl Drop for SessionRecord {
    fn drop(&mut self) {
        if let Some(timer) = self.attach_timer.take() {
            timer.abort();
        }
    }
}
