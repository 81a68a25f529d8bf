//! The session store: the pairing table between tracer and client halves.
//!
//! Every compound operation (attach, pair, slaughter) runs inside a single
//! `dashmap` entry critical section so a session is never observed half
//! updated by a concurrent attach on the same uuid.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use tokio::task::JoinHandle;

use tracebroker_core::error::ErrorKind;
use tracebroker_core::event::{format_error, DisableMode, Event};

use super::session::{PeerHandle, SessionRecord, SessionState};

pub type AuthFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

pub struct StoreConfig {
    pub attach_timeout: Option<Duration>,
    pub inactivity_timeout: Duration,
    pub timeout_disable_mode: DisableMode,
    pub tracer_auth_fn: AuthFn,
    pub client_auth_fn: AuthFn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    Attached,
    AuthFailed,
    Duplicate,
}

/// Which half an attach-timeout timer is waiting for.
#[derive(Debug, Clone, Copy)]
enum Waiting {
    Tracer,
    Client,
}

pub struct SessionStore {
    sessions: DashMap<String, SessionRecord>,
    cfg: StoreConfig,
}

impl SessionStore {
    pub fn new(cfg: StoreConfig) -> Arc<Self> {
        Arc::new(SessionStore {
            sessions: DashMap::new(),
            cfg,
        })
    }

    pub fn contains(&self, uuid: &str) -> bool {
        self.sessions.contains_key(uuid)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Attach a tracer connection. Runs `tracer_auth_fn` against `auth`
    /// before touching the store. The tracer's own `start` event is consumed
    /// by the handshake and never forwarded to the client.
    pub fn attach_tracer(
        self: &Arc<Self>,
        uuid: &str,
        auth: &Value,
        handle: PeerHandle,
    ) -> AttachOutcome {
        if !(self.cfg.tracer_auth_fn)(auth) {
            return AttachOutcome::AuthFailed;
        }

        let mut flush = Vec::new();
        match self.sessions.entry(uuid.to_string()) {
            Entry::Vacant(v) => {
                let mut rec = SessionRecord::new(self.cfg.timeout_disable_mode);
                rec.tracer = Some(handle);
                rec.state = SessionState::PendingClient;
                rec.attach_timer = self.spawn_attach_timer(uuid.to_string(), Waiting::Client);
                v.insert(rec);
            }
            Entry::Occupied(mut e) => {
                let rec = e.get_mut();
                if rec.tracer.is_some() {
                    return AttachOutcome::Duplicate;
                }
                if let Some(timer) = rec.attach_timer.take() {
                    timer.abort();
                }
                rec.tracer = Some(handle);
                rec.state = SessionState::Paired;
                rec.last_activity = Instant::now();
                flush = std::mem::take(&mut rec.pending_to_tracer).into();
            }
        }

        self.deliver(uuid, flush, true);
        tracing::info!(uuid = %uuid, "tracer attached");
        AttachOutcome::Attached
    }

    pub fn attach_client(
        self: &Arc<Self>,
        uuid: &str,
        auth: &Value,
        handle: PeerHandle,
        start_event: Event,
    ) -> AttachOutcome {
        if !(self.cfg.client_auth_fn)(auth) {
            return AttachOutcome::AuthFailed;
        }

        let mut flush = Vec::new();
        match self.sessions.entry(uuid.to_string()) {
            Entry::Vacant(v) => {
                let mut rec = SessionRecord::new(self.cfg.timeout_disable_mode);
                rec.client = Some(handle);
                rec.state = SessionState::PendingTracer;
                rec.attach_timer = self.spawn_attach_timer(uuid.to_string(), Waiting::Tracer);
                v.insert(rec);
            }
            Entry::Occupied(mut e) => {
                let rec = e.get_mut();
                if rec.client.is_some() {
                    return AttachOutcome::Duplicate;
                }
                if let Some(timer) = rec.attach_timer.take() {
                    timer.abort();
                }
                rec.client = Some(handle);
                rec.state = SessionState::Paired;
                rec.last_activity = Instant::now();
                flush = std::mem::take(&mut rec.pending_to_client).into();
            }
        }

        self.deliver(uuid, flush, false);
        tracing::info!(uuid = %uuid, "client attached");
        self.send_to_tracer(uuid, start_event);
        AttachOutcome::Attached
    }

    fn deliver(&self, uuid: &str, events: Vec<Event>, to_tracer: bool) {
        if events.is_empty() {
            return;
        }
        if let Some(rec) = self.sessions.get(uuid) {
            let target = if to_tracer { &rec.tracer } else { &rec.client };
            if let Some(h) = target {
                for ev in events {
                    h.send(ev);
                }
            }
        }
    }

    /// Forward an event to the tracer half, buffering it if the tracer
    /// hasn't attached yet. No-op on a session that no longer exists.
    pub fn send_to_tracer(&self, uuid: &str, event: Event) {
        if let Some(mut rec) = self.sessions.get_mut(uuid) {
            rec.last_activity = Instant::now();
            match &rec.tracer {
                Some(h) => h.send(event),
                None => rec.pending_to_tracer.push_back(event),
            }
        }
    }

    /// Forward an event to the client half, buffering it if the client
    /// hasn't attached yet. No-op on a session that no longer exists.
    pub fn send_to_client(&self, uuid: &str, event: Event) {
        if let Some(mut rec) = self.sessions.get_mut(uuid) {
            rec.last_activity = Instant::now();
            match &rec.client {
                Some(h) => h.send(event),
                None => rec.pending_to_client.push_back(event),
            }
        }
    }

    /// Tear a session down: send `error` (if any) then `disable` to whichever
    /// halves are still present, then drop the record. Idempotent — a
    /// session already gone is a silent no-op.
    pub fn slaughter(self: &Arc<Self>, uuid: &str, error: Option<Event>, mode_override: Option<DisableMode>) {
        if let Some((_, rec)) = self.sessions.remove(uuid) {
            let mode = mode_override.unwrap_or(rec.disable_mode);
            if let Some(t) = &rec.tracer {
                if let Some(e) = &error {
                    t.send(e.clone());
                }
                t.send(tracebroker_core::event::format_disable_tracer(mode));
            }
            if let Some(c) = &rec.client {
                if let Some(e) = &error {
                    c.send(e.clone());
                }
                c.send(tracebroker_core::event::format_disable_client());
            }
            tracing::info!(uuid = %uuid, mode = %mode.as_str(), "session slaughtered");
        }
    }

    /// Slaughter every session currently in the store, with no error event —
    /// used for an orderly shutdown of the whole server, not a failure path.
    pub fn slaughter_all(self: &Arc<Self>) {
        let uuids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for uuid in uuids {
            self.slaughter(&uuid, None, None);
        }
    }

    /// Remove every session whose `last_activity` predates the inactivity
    /// window. Called on a fixed tick by the server's sweep task.
    pub fn sweep(self: &Arc<Self>) {
        let now = Instant::now();
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|e| now.duration_since(e.last_activity) > self.cfg.inactivity_timeout)
            .map(|e| e.key().clone())
            .collect();
        for uuid in expired {
            tracing::debug!(uuid = %uuid, "inactivity sweep firing");
            self.slaughter(&uuid, None, None);
        }
    }

    fn spawn_attach_timer(self: &Arc<Self>, uuid: String, waiting: Waiting) -> Option<JoinHandle<()>> {
        let dur = self.cfg.attach_timeout?;
        let store = Arc::clone(self);
        Some(tokio::spawn(async move {
            tokio::time::sleep(dur).await;
            let (kind, reason) = match waiting {
                Waiting::Tracer => (ErrorKind::Tracer, "No tracer"),
                Waiting::Client => (ErrorKind::Client, "No client"),
            };
            store.slaughter(&uuid, Some(format_error(kind, reason)), None);
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn test_cfg(attach_timeout: Option<Duration>) -> StoreConfig {
        StoreConfig {
            attach_timeout,
            inactivity_timeout: Duration::from_secs(3600),
            timeout_disable_mode: DisableMode::Soft,
            tracer_auth_fn: Arc::new(|_| true),
            client_auth_fn: Arc::new(|_| true),
        }
    }

    fn handle() -> (PeerHandle, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (PeerHandle::new(tx), rx)
    }

    #[tokio::test]
    async fn tracer_then_client_pairs_and_forwards_only_the_clients_start() {
        let store = SessionStore::new(test_cfg(None));
        let (tracer_h, mut tracer_rx) = handle();
        let (client_h, mut client_rx) = handle();

        let outcome = store.attach_tracer("test", &json!(""), tracer_h);
        assert_eq!(outcome, AttachOutcome::Attached);
        assert!(store.contains("test"));

        let outcome = store.attach_client(
            "test",
            &json!(""),
            client_h,
            Event::new("start", json!("")),
        );
        assert_eq!(outcome, AttachOutcome::Attached);

        // tracer receives the client's forwarded start event
        let ev = tracer_rx.recv().await.unwrap();
        assert_eq!(ev.e, "start");
        assert_eq!(ev.p, json!(""));

        // the client receives nothing: the tracer's own start event is never
        // forwarded to it.
        assert!(client_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn duplicate_tracer_attach_is_rejected_without_disturbing_the_session() {
        let store = SessionStore::new(test_cfg(None));
        let (h1, _rx1) = handle();
        let (h2, _rx2) = handle();
        assert_eq!(
            store.attach_tracer("dup", &json!(""), h1),
            AttachOutcome::Attached
        );
        assert_eq!(
            store.attach_tracer("dup", &json!(""), h2),
            AttachOutcome::Duplicate
        );
        assert!(store.contains("dup"));
    }

    #[tokio::test]
    async fn auth_failure_does_not_create_a_session() {
        let mut cfg = test_cfg(None);
        cfg.tracer_auth_fn = Arc::new(|_| false);
        let store = SessionStore::new(cfg);
        let (h, _rx) = handle();
        assert_eq!(
            store.attach_tracer("nope", &json!("bad"), h),
            AttachOutcome::AuthFailed
        );
        assert!(!store.contains("nope"));
    }

    #[tokio::test]
    async fn attach_timeout_slaughters_a_lone_tracer() {
        let store = SessionStore::new(test_cfg(Some(Duration::from_millis(20))));
        let (h, mut rx) = handle();
        store.attach_tracer("alone", &json!(""), h);
        let err = rx.recv().await.unwrap();
        assert_eq!(err.e, "error");
        assert_eq!(err.p["e"], json!("client"));
        let disable = rx.recv().await.unwrap();
        assert_eq!(disable.e, "disable");
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!store.contains("alone"));
    }

    #[tokio::test]
    async fn zero_attach_timeout_allows_an_orphan_to_persist() {
        let store = SessionStore::new(test_cfg(None));
        let (h, _rx) = handle();
        store.attach_tracer("orphan", &json!(""), h);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store.contains("orphan"));
    }

    #[tokio::test]
    async fn sweep_slaughters_inactive_sessions_with_no_error_event() {
        let mut cfg = test_cfg(None);
        cfg.inactivity_timeout = Duration::from_millis(1);
        let store = SessionStore::new(cfg);
        let (h, mut rx) = handle();
        store.attach_tracer("stale", &json!(""), h);
        tokio::time::sleep(Duration::from_millis(10)).await;
        store.sweep();
        let only_message = rx.recv().await.unwrap();
        assert_eq!(only_message.e, "disable");
        assert!(rx.recv().await.is_none());
    }
}
