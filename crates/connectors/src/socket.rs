//! Session socket connector
//!
//! One persistent WebSocket per run session. A background task owns the
//! stream: it forwards queued `ClientMessage`s out and decoded
//! `ServerMessage`s back as `SocketEvent`s, and reconnects according to a
//! `ReconnectPolicy` when the connection drops.

use std::time::Duration;

use acorn_protocol::{ClientMessage, FormValues, ServerMessage};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::ConnectorError;

const OUTBOUND_CAPACITY: usize = 64;
const EVENT_CAPACITY: usize = 256;

/// Lifecycle and data events surfaced by the socket task
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    Connected,
    Disconnected { reason: String },
    /// The reconnect policy is exhausted; no further events follow.
    GaveUp { attempts: u32, error: String },
    Message(ServerMessage),
    /// A text frame that did not decode as a `ServerMessage`.
    Malformed { error: String },
}

/// What to do after a failed connect or a dropped connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    Disabled,
    Backoff {
        initial: Duration,
        max: Duration,
        max_attempts: u32,
    },
}

pub const DEFAULT_RECONNECT_INITIAL: Duration = Duration::from_millis(500);
pub const DEFAULT_RECONNECT_MAX: Duration = Duration::from_secs(10);
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 8;

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy::Backoff {
            initial: DEFAULT_RECONNECT_INITIAL,
            max: DEFAULT_RECONNECT_MAX,
            max_attempts: DEFAULT_RECONNECT_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before consecutive failure number `failures` (1-based), or
    /// `None` once the policy gives up.
    pub fn delay_for(&self, failures: u32) -> Option<Duration> {
        match *self {
            ReconnectPolicy::Disabled => None,
            ReconnectPolicy::Backoff {
                initial,
                max,
                max_attempts,
            } => {
                if failures == 0 || failures > max_attempts {
                    return None;
                }
                let factor = 1u32.checked_shl(failures - 1).unwrap_or(u32::MAX);
                Some(initial.saturating_mul(factor).min(max))
            }
        }
    }
}

/// Typed sending half of a session socket (cheap to Clone).
///
/// Frames sent while the socket is reconnecting stay queued and go out once
/// the connection is back.
#[derive(Debug, Clone)]
pub struct SocketSender {
    tx: mpsc::Sender<ClientMessage>,
}

impl SocketSender {
    pub fn new(tx: mpsc::Sender<ClientMessage>) -> Self {
        Self { tx }
    }

    pub async fn send(&self, msg: ClientMessage) -> Result<(), ConnectorError> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| ConnectorError::ChannelClosed)
    }

    pub async fn run(
        &self,
        path: impl Into<String>,
        tool_name: impl Into<String>,
        form_values: FormValues,
        workspace_dir: impl Into<String>,
    ) -> Result<(), ConnectorError> {
        self.send(ClientMessage::Run {
            path: path.into(),
            tool_name: tool_name.into(),
            form_values,
            workspace_dir: workspace_dir.into(),
        })
        .await
    }

    pub async fn send_user_message(&self, text: impl Into<String>) -> Result<(), ConnectorError> {
        self.send(ClientMessage::UserMessage { text: text.into() })
            .await
    }

    pub async fn interrupt(&self) -> Result<(), ConnectorError> {
        self.send(ClientMessage::Interrupt).await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Owner of the socket task. Dropping it aborts the task; `close` shuts the
/// connection down cleanly.
pub struct SessionSocket {
    url: String,
    sender: SocketSender,
    event_rx: Option<mpsc::Receiver<SocketEvent>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SessionSocket {
    /// Spawn the socket task and start connecting to `url`.
    pub fn connect(url: impl Into<String>, policy: ReconnectPolicy) -> Self {
        let url = url.into();
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CAPACITY);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(connection_loop(
            url.clone(),
            policy,
            outbound_rx,
            event_tx,
            shutdown_rx,
        ));

        Self {
            url,
            sender: SocketSender::new(outbound_tx),
            event_rx: Some(event_rx),
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn sender(&self) -> SocketSender {
        self.sender.clone()
    }

    /// Take the event receiver. Only the first call returns it.
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<SocketEvent>> {
        self.event_rx.take()
    }

    /// Close the connection and wait for the socket task to finish.
    pub async fn close(mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SessionSocket {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

enum PumpExit {
    Shutdown,
    Dropped(String),
}

async fn connection_loop(
    url: String,
    policy: ReconnectPolicy,
    mut outbound_rx: mpsc::Receiver<ClientMessage>,
    event_tx: mpsc::Sender<SocketEvent>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut failures: u32 = 0;

    loop {
        let connect = tokio::select! {
            result = connect_async(url.as_str()) => result,
            _ = &mut shutdown_rx => return,
        };

        let last_error = match connect {
            Ok((ws, _response)) => {
                failures = 0;
                info!(
                    component = "socket",
                    event = "socket.connected",
                    url = %url,
                    "Session socket connected"
                );
                if event_tx.send(SocketEvent::Connected).await.is_err() {
                    return;
                }

                match pump(ws, &mut outbound_rx, &event_tx, &mut shutdown_rx).await {
                    PumpExit::Shutdown => {
                        info!(
                            component = "socket",
                            event = "socket.closed",
                            url = %url,
                            "Session socket closed"
                        );
                        return;
                    }
                    PumpExit::Dropped(reason) => {
                        warn!(
                            component = "socket",
                            event = "socket.dropped",
                            url = %url,
                            reason = %reason,
                            "Session socket dropped"
                        );
                        let event = SocketEvent::Disconnected {
                            reason: reason.clone(),
                        };
                        if event_tx.send(event).await.is_err() {
                            return;
                        }
                        reason
                    }
                }
            }
            Err(e) => {
                warn!(
                    component = "socket",
                    event = "socket.connect_failed",
                    url = %url,
                    error = %e,
                    "Session socket connect failed"
                );
                e.to_string()
            }
        };

        failures += 1;
        let Some(delay) = policy.delay_for(failures) else {
            error!(
                component = "socket",
                event = "socket.gave_up",
                url = %url,
                attempts = failures,
                "Session socket giving up"
            );
            let _ = event_tx
                .send(SocketEvent::GaveUp {
                    attempts: failures,
                    error: last_error,
                })
                .await;
            return;
        };

        debug!(
            component = "socket",
            event = "socket.reconnect_scheduled",
            delay_ms = delay.as_millis() as u64,
            attempt = failures,
        );
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = &mut shutdown_rx => return,
        }
    }
}

async fn pump(
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    outbound_rx: &mut mpsc::Receiver<ClientMessage>,
    event_tx: &mpsc::Sender<SocketEvent>,
    shutdown_rx: &mut oneshot::Receiver<()>,
) -> PumpExit {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            _ = &mut *shutdown_rx => {
                let _ = sink.send(Message::Close(None)).await;
                return PumpExit::Shutdown;
            }

            outbound = outbound_rx.recv() => {
                let Some(msg) = outbound else {
                    // Every sender is gone; nobody can use this session anymore.
                    let _ = sink.send(Message::Close(None)).await;
                    return PumpExit::Shutdown;
                };
                let json = match serde_json::to_string(&msg) {
                    Ok(json) => json,
                    Err(e) => {
                        error!(
                            component = "socket",
                            event = "socket.send.serialize_failed",
                            kind = msg.kind(),
                            error = %e,
                            "Failed to serialize client message"
                        );
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(json.into())).await {
                    return PumpExit::Dropped(e.to_string());
                }
                debug!(component = "socket", event = "socket.sent", kind = msg.kind());
            }

            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let event = match serde_json::from_str::<ServerMessage>(text.as_str()) {
                            Ok(msg) => {
                                debug!(
                                    component = "socket",
                                    event = "socket.received",
                                    kind = msg.kind(),
                                );
                                SocketEvent::Message(msg)
                            }
                            Err(e) => {
                                warn!(
                                    component = "socket",
                                    event = "socket.receive.decode_failed",
                                    error = %e,
                                    "Undecodable server frame"
                                );
                                SocketEvent::Malformed { error: e.to_string() }
                            }
                        };
                        if event_tx.send(event).await.is_err() {
                            let _ = sink.send(Message::Close(None)).await;
                            return PumpExit::Shutdown;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.as_str().to_string())
                            .filter(|r| !r.is_empty())
                            .unwrap_or_else(|| "closed by server".to_string());
                        return PumpExit::Dropped(reason);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return PumpExit::Dropped(e.to_string()),
                    None => return PumpExit::Dropped("connection closed".to_string()),
                }
            }
        }
    }
}
