//! The server facade: wires the session store to the two listeners and
//! exposes the small lifecycle surface a caller actually needs
//! (`start`/`stop`/`serve_forever`/`is_running`/`session_store`).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use tracebroker_core::codec::{BlobCodec, JsonBlobCodec};
use tracebroker_core::error::Result;

use crate::config::BrokerConfig;
use crate::listener::{ClientListener, Listener, TracerListener};
use crate::store::{AuthFn, SessionStore, StoreConfig};

pub struct Server {
    tracer: Arc<dyn Listener>,
    client: Arc<dyn Listener>,
    store: Arc<SessionStore>,
    sweep_time: Duration,
    sweep_task: Mutex<Option<JoinHandle<()>>>,
    running_tx: watch::Sender<bool>,
    running_rx: watch::Receiver<bool>,
}

impl Server {
    /// Build a server that binds both real listeners from `cfg`.
    pub fn new(cfg: BrokerConfig, tracer_auth_fn: AuthFn, client_auth_fn: AuthFn) -> Self {
        Self::with_listeners(cfg, tracer_auth_fn, client_auth_fn, None, None)
    }

    /// Build a server, optionally substituting either side's listener (a
    /// `NoopListener`, most commonly) — mirrors running only one half of the
    /// broker against a hand-driven peer in tests.
    pub fn with_listeners(
        cfg: BrokerConfig,
        tracer_auth_fn: AuthFn,
        client_auth_fn: AuthFn,
        tracer_override: Option<Arc<dyn Listener>>,
        client_override: Option<Arc<dyn Listener>>,
    ) -> Self {
        let store = SessionStore::new(StoreConfig {
            attach_timeout: cfg.attach_timeout(),
            inactivity_timeout: cfg.inactivity_timeout(),
            timeout_disable_mode: cfg.timeout_disable_mode,
            tracer_auth_fn,
            client_auth_fn,
        });
        let codec: Arc<dyn BlobCodec> = Arc::new(JsonBlobCodec);

        let tracer = tracer_override.unwrap_or_else(|| {
            let addr: SocketAddr = format!("{}:{}", cfg.tracer_host, cfg.tracer_port)
                .parse()
                .expect("tracer_host/tracer_port must form a valid socket address");
            Arc::new(TracerListener::new(
                addr,
                Arc::clone(&store),
                Arc::clone(&codec),
                cfg.auth_timeout(),
                cfg.timeout_disable_mode,
            ))
        });
        let client = client_override.unwrap_or_else(|| {
            let addr: SocketAddr = format!("{}:{}", cfg.client_host, cfg.client_port)
                .parse()
                .expect("client_host/client_port must form a valid socket address");
            Arc::new(ClientListener::new(
                addr,
                cfg.route_fmt.clone(),
                Arc::clone(&store),
                cfg.auth_timeout(),
            ))
        });

        let (running_tx, running_rx) = watch::channel(false);
        Server {
            tracer,
            client,
            store,
            sweep_time: cfg.sweep_time(),
            sweep_task: Mutex::new(None),
            running_tx,
            running_rx,
        }
    }

    pub fn session_store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn is_running(&self) -> bool {
        *self.running_rx.borrow()
    }

    pub async fn start(&self) -> Result<()> {
        self.tracer.start().await?;
        self.client.start().await?;

        let store = Arc::clone(&self.store);
        let sweep_time = self.sweep_time;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_time);
            loop {
                ticker.tick().await;
                store.sweep();
            }
        });
        *self.sweep_task.lock().await = Some(task);

        let _ = self.running_tx.send(true);
        Ok(())
    }

    pub async fn stop(&self) {
        if let Some(task) = self.sweep_task.lock().await.take() {
            task.abort();
        }
        self.tracer.stop().await;
        self.client.stop().await;
        self.store.slaughter_all();
        let _ = self.running_tx.send(false);
    }

    /// Resolves once the server has been stopped, from whichever task called
    /// `stop()`. A server that was never started, or already stopped,
    /// resolves immediately.
    pub async fn serve_forever(&self) {
        let mut rx = self.running_rx.clone();
        if !*rx.borrow() {
            return;
        }
        while rx.changed().await.is_ok() {
            if !*rx.borrow() {
                return;
            }
        }
    }
}

/// Runs `body` against a freshly started server, guaranteeing `stop()` runs
/// on every exit path — including a panic inside `body` — before the panic
/// (if any) is allowed to continue unwinding.
pub async fn scoped<F, Fut, T>(
    cfg: BrokerConfig,
    tracer_auth_fn: AuthFn,
    client_auth_fn: AuthFn,
    body: F,
) -> Result<T>
where
    F: FnOnce(Arc<Server>) -> Fut,
    Fut: std::future::Future<Output = T>,
{
    let server = Arc::new(Server::new(cfg, tracer_auth_fn, client_auth_fn));
    server.start().await?;
    let result = std::panic::AssertUnwindSafe(body(Arc::clone(&server)))
        .catch_unwind()
        .await;
    server.stop().await;
    match result {
        Ok(v) => Ok(v),
        Err(payload) => std::panic::resume_unwind(payload),
    }
}
