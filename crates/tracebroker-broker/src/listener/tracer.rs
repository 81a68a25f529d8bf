//! The tracer-facing listener: a raw length-prefixed TCP protocol.
//!
//! Each accepted connection runs through a small state machine: wait for a
//! `start` frame within `auth_timeout`, validate it against the session
//! store, then settle into a forward loop that reads frames off the socket
//! and drains its outbound queue until the session is torn down.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener as TokioTcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;

use tracebroker_core::codec::{BlobCodec, FrameAccumulator};
use tracebroker_core::error::{BrokerError, ErrorKind};
use tracebroker_core::event::{format_disable_tracer, format_error, DisableMode, Event};
use tracebroker_core::start::TracerStart;

use crate::store::{AttachOutcome, PeerHandle, SessionStore};

use super::Listener;

pub struct TracerListener {
    bind_addr: SocketAddr,
    store: Arc<SessionStore>,
    codec: Arc<dyn BlobCodec>,
    auth_timeout: Duration,
    default_disable_mode: DisableMode,
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl TracerListener {
    pub fn new(
        bind_addr: SocketAddr,
        store: Arc<SessionStore>,
        codec: Arc<dyn BlobCodec>,
        auth_timeout: Duration,
        default_disable_mode: DisableMode,
    ) -> Self {
        TracerListener {
            bind_addr,
            store,
            codec,
            auth_timeout,
            default_disable_mode,
            running: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Notify::new()),
            accept_task: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Listener for TracerListener {
    async fn start(&self) -> tracebroker_core::error::Result<()> {
        let listener = TokioTcpListener::bind(self.bind_addr).await?;
        tracing::info!(addr = %self.bind_addr, "tracer listener bound");

        let store = Arc::clone(&self.store);
        let codec = Arc::clone(&self.codec);
        let auth_timeout = self.auth_timeout;
        let default_disable_mode = self.default_disable_mode;
        let shutdown = Arc::clone(&self.shutdown);
        self.running.store(true, Ordering::SeqCst);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.notified() => break,
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, addr)) => {
                                tracing::debug!(%addr, "tracer connection accepted");
                                let store = Arc::clone(&store);
                                let codec = Arc::clone(&codec);
                                tokio::spawn(async move {
                                    handle_connection(stream, store, codec, auth_timeout, default_disable_mode).await;
                                });
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "tracer accept failed");
                            }
                        }
                    }
                }
            }
        });
        *self.accept_task.lock().await = Some(task);
        Ok(())
    }

    async fn stop(&self) {
        self.shutdown.notify_waiters();
        if let Some(task) = self.accept_task.lock().await.take() {
            let _ = task.await;
        }
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

async fn read_handshake_frame(
    stream: &mut TcpStream,
    codec: &dyn BlobCodec,
) -> Result<Option<Event>, BrokerError> {
    let mut acc = FrameAccumulator::new();
    read_next_frame(stream, &mut acc, codec).await
}

async fn read_next_frame(
    stream: &mut (impl AsyncReadExt + Unpin),
    acc: &mut FrameAccumulator,
    codec: &dyn BlobCodec,
) -> Result<Option<Event>, BrokerError> {
    loop {
        if let Some(payload) = acc.try_take_frame()? {
            return codec.decode(&payload).map(Some);
        }
        let mut tmp = [0u8; 4096];
        let n = stream.read(&mut tmp).await?;
        if n == 0 {
            return if acc.is_empty() {
                Ok(None)
            } else {
                Err(BrokerError::Framing("connection closed mid-frame".into()))
            };
        }
        acc.push(&tmp[..n]);
    }
}

async fn write_frame(
    writer: &mut OwnedWriteHalf,
    codec: &dyn BlobCodec,
    event: &Event,
) -> Result<(), BrokerError> {
    let payload = codec.encode(event)?;
    writer
        .write_all(&FrameAccumulator::encode_frame(&payload))
        .await?;
    Ok(())
}

async fn fail_handshake(mut stream: TcpStream, codec: &dyn BlobCodec, kind: ErrorKind, reason: &str, mode: DisableMode) {
    let err = codec.encode(&format_error(kind, reason));
    let disable = codec.encode(&format_disable_tracer(mode));
    if let (Ok(err), Ok(disable)) = (err, disable) {
        let _ = stream.write_all(&FrameAccumulator::encode_frame(&err)).await;
        let _ = stream
            .write_all(&FrameAccumulator::encode_frame(&disable))
            .await;
    }
    let _ = stream.shutdown().await;
}

async fn handle_connection(
    mut stream: TcpStream,
    store: Arc<SessionStore>,
    codec: Arc<dyn BlobCodec>,
    auth_timeout: Duration,
    default_disable_mode: DisableMode,
) {
    let start_event = match tokio::time::timeout(auth_timeout, read_handshake_frame(&mut stream, &*codec)).await {
        Err(_elapsed) => {
            fail_handshake(stream, &*codec, ErrorKind::Auth, "No start event received", default_disable_mode).await;
            return;
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "tracer handshake framing error");
            return;
        }
        Ok(Ok(None)) => return,
        Ok(Ok(Some(ev))) if ev.e != "start" => {
            fail_handshake(stream, &*codec, ErrorKind::Auth, "No start event received", default_disable_mode).await;
            return;
        }
        Ok(Ok(Some(ev))) => ev,
    };

    let parsed = match TracerStart::from_payload(&start_event.p) {
        Ok(p) => p,
        Err(_) => {
            fail_handshake(stream, &*codec, ErrorKind::Auth, "No start event received", default_disable_mode).await;
            return;
        }
    };
    let uuid = parsed.uuid.clone();

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let handle = PeerHandle::new(events_tx);

    match store.attach_tracer(&uuid, &parsed.auth, handle) {
        AttachOutcome::AuthFailed => {
            fail_handshake(stream, &*codec, ErrorKind::Auth, "Authentication failed", default_disable_mode).await;
            return;
        }
        AttachOutcome::Duplicate => {
            fail_handshake(
                stream,
                &*codec,
                ErrorKind::Duplicate,
                "Tracer already attached for this session",
                default_disable_mode,
            )
            .await;
            return;
        }
        AttachOutcome::Attached => {}
    }

    tracing::info!(uuid = %uuid, "tracer session running");
    run_session(stream, codec, store, uuid, events_rx).await;
}

async fn run_session(
    stream: TcpStream,
    codec: Arc<dyn BlobCodec>,
    store: Arc<SessionStore>,
    uuid: String,
    mut events_rx: mpsc::UnboundedReceiver<Event>,
) {
    let (mut reader, mut writer): (OwnedReadHalf, OwnedWriteHalf) = stream.into_split();
    let mut acc = FrameAccumulator::new();

    loop {
        tokio::select! {
            maybe_ev = events_rx.recv() => {
                match maybe_ev {
                    Some(ev) => {
                        if write_frame(&mut writer, &*codec, &ev).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            frame = read_next_frame(&mut reader, &mut acc, &*codec) => {
                match frame {
                    Ok(Some(ev)) => store.send_to_client(&uuid, ev),
                    Ok(None) => {
                        tracing::info!(uuid = %uuid, "tracer disconnected");
                        store.slaughter(&uuid, Some(format_error(ErrorKind::Tracer, "Tracer disconnected")), None);
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(uuid = %uuid, error = %e, "tracer framing error");
                        store.slaughter(&uuid, Some(format_error(ErrorKind::Framing, e.to_string())), None);
                        break;
                    }
                }
            }
        }
    }
}
