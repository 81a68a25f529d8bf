//! The client-facing listener: a WebSocket endpoint at `route_fmt`, JSON
//! text framing, one message per `Event`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener as TokioTcpListener;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;

use tracebroker_core::codec::text::{decode_text, encode_text};
use tracebroker_core::error::ErrorKind;
use tracebroker_core::event::{format_disable_client, format_error, DisableMode, Event};

use crate::store::{AttachOutcome, PeerHandle, SessionStore};

use super::Listener;

#[derive(Clone)]
struct ClientState {
    store: Arc<SessionStore>,
    auth_timeout: Duration,
}

pub struct ClientListener {
    bind_addr: SocketAddr,
    route_fmt: String,
    store: Arc<SessionStore>,
    auth_timeout: Duration,
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    serve_task: Mutex<Option<JoinHandle<()>>>,
}

impl ClientListener {
    pub fn new(bind_addr: SocketAddr, route_fmt: String, store: Arc<SessionStore>, auth_timeout: Duration) -> Self {
        ClientListener {
            bind_addr,
            route_fmt,
            store,
            auth_timeout,
            running: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Notify::new()),
            serve_task: Mutex::new(None),
        }
    }

    fn axum_path(&self) -> String {
        self.route_fmt.replace("{uuid}", ":uuid")
    }
}

#[async_trait]
impl Listener for ClientListener {
    async fn start(&self) -> tracebroker_core::error::Result<()> {
        let listener = TokioTcpListener::bind(self.bind_addr).await?;
        tracing::info!(addr = %self.bind_addr, "client listener bound");

        let state = ClientState {
            store: Arc::clone(&self.store),
            auth_timeout: self.auth_timeout,
        };
        let app = Router::new()
            .route(&self.axum_path(), get(ws_upgrade))
            .with_state(state);

        let shutdown = Arc::clone(&self.shutdown);
        self.running.store(true, Ordering::SeqCst);
        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.notified().await })
                .await;
            if let Err(e) = result {
                tracing::warn!(error = %e, "client listener exited with error");
            }
        });
        *self.serve_task.lock().await = Some(task);
        Ok(())
    }

    async fn stop(&self) {
        self.shutdown.notify_waiters();
        if let Some(task) = self.serve_task.lock().await.take() {
            let _ = task.await;
        }
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

async fn ws_upgrade(
    State(state): State<ClientState>,
    Path(uuid): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, uuid, socket))
}

async fn fail_handshake(ws_tx: &mut SplitSink<WebSocket, Message>, kind: ErrorKind, reason: &str) {
    if let Ok(err) = encode_text(&format_error(kind, reason)) {
        let _ = ws_tx.send(Message::Text(err)).await;
    }
    if let Ok(disable) = encode_text(&format_disable_client()) {
        let _ = ws_tx.send(Message::Text(disable)).await;
    }
    let _ = ws_tx.send(Message::Close(None)).await;
}

async fn handle_socket(state: ClientState, uuid: String, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let start_event = match tokio::time::timeout(state.auth_timeout, ws_rx.next()).await {
        Err(_elapsed) => {
            fail_handshake(&mut ws_tx, ErrorKind::Auth, "No start event received").await;
            return;
        }
        Ok(None) | Ok(Some(Err(_))) => return,
        Ok(Some(Ok(Message::Text(text)))) => match decode_text(&text) {
            Ok(ev) if ev.e == "start" => ev,
            _ => {
                fail_handshake(&mut ws_tx, ErrorKind::Auth, "No start event received").await;
                return;
            }
        },
        Ok(Some(Ok(_other))) => {
            fail_handshake(&mut ws_tx, ErrorKind::Auth, "No start event received").await;
            return;
        }
    };

    let auth = start_event.p.clone();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let handle = PeerHandle::new(events_tx);

    match state.store.attach_client(&uuid, &auth, handle, start_event) {
        AttachOutcome::AuthFailed => {
            fail_handshake(&mut ws_tx, ErrorKind::Auth, "Authentication failed").await;
            return;
        }
        AttachOutcome::Duplicate => {
            fail_handshake(&mut ws_tx, ErrorKind::Duplicate, "Client already attached for this session").await;
            return;
        }
        AttachOutcome::Attached => {}
    }

    tracing::info!(uuid = %uuid, "client session running");
    run_session(ws_tx, ws_rx, state.store, uuid, events_rx).await;
}

async fn write_text(ws_tx: &mut SplitSink<WebSocket, Message>, event: &Event) -> Result<(), ()> {
    let text = encode_text(event).map_err(|_| ())?;
    ws_tx.send(Message::Text(text)).await.map_err(|_| ())
}

async fn run_session(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut ws_rx: SplitStream<WebSocket>,
    store: Arc<SessionStore>,
    uuid: String,
    mut events_rx: mpsc::UnboundedReceiver<Event>,
) {
    loop {
        tokio::select! {
            maybe_ev = events_rx.recv() => {
                match maybe_ev {
                    Some(ev) => {
                        if write_text(&mut ws_tx, &ev).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match decode_text(&text) {
                            Ok(ev) => store.send_to_tracer(&uuid, ev),
                            Err(e) => tracing::warn!(uuid = %uuid, error = %e, "malformed client event, dropping"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::info!(uuid = %uuid, "client disconnected");
                        store.slaughter(&uuid, Some(format_error(ErrorKind::Client, "Client disconnected")), None);
                        break;
                    }
                    Some(Ok(_other)) => {}
                    Some(Err(_e)) => {
                        store.slaughter(&uuid, Some(format_error(ErrorKind::Client, "Client disconnected")), None);
                        break;
                    }
                }
            }
        }
    }
}
