//! Session actor: owns a run session's state and applies every change
//! through `transition`.
//!
//! Callers talk to it through `SessionActorHandle`, which sends
//! `SessionCommand`s over an mpsc channel. Lock-free reads go through
//! `ArcSwap`; changes fan out on a broadcast channel.

use std::future;
use std::sync::Arc;
use std::time::Duration;

use acorn_connectors::{ReconnectPolicy, SessionSocket, SocketEvent, SocketSender, ToolSource};
use arc_swap::ArcSwap;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::restart::{sleep_until_deadline, RestartDebounce};
use crate::session_command::SessionCommand;
use crate::transition::{transition, Effect, Input, SessionState, SessionUpdate};
use crate::RelayError;

const COMMAND_CAPACITY: usize = 256;
const UPDATE_CAPACITY: usize = 512;

/// One socket connection as the actor sees it
pub struct SocketLink {
    pub sender: SocketSender,
    pub events: mpsc::Receiver<SocketEvent>,
    /// Owning handle, closed when the actor stops. `None` for in-memory links.
    pub socket: Option<SessionSocket>,
}

impl SocketLink {
    pub fn open(url: &str, policy: ReconnectPolicy) -> Self {
        let mut socket = SessionSocket::connect(url, policy);
        let events = socket
            .take_event_rx()
            .unwrap_or_else(|| mpsc::channel(1).1);
        Self {
            sender: socket.sender(),
            events,
            socket: Some(socket),
        }
    }
}

/// Opens a fresh link after the previous socket gave up.
pub type Connector = Arc<dyn Fn() -> SocketLink + Send + Sync>;

/// Everything the actor needs besides its initial state
pub struct ActorParams {
    pub restart_delay: Duration,
    pub tools: Arc<dyn ToolSource>,
    pub link: SocketLink,
    pub connector: Option<Connector>,
}

/// Handle to a running session actor (cheap to Clone).
#[derive(Clone)]
pub struct SessionActorHandle {
    pub id: String,
    command_tx: mpsc::Sender<SessionCommand>,
    snapshot: Arc<ArcSwap<SessionState>>,
}

impl SessionActorHandle {
    /// Spawn the actor and start loading the script's tool.
    pub fn spawn(state: SessionState, params: ActorParams) -> SessionActorHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (updates_tx, _) = broadcast::channel(UPDATE_CAPACITY);
        let snapshot = Arc::new(ArcSwap::from_pointee(state.clone()));
        let id = state.id.clone();

        let actor = SessionActor {
            state,
            command_rx,
            command_weak: command_tx.downgrade(),
            socket_events: Some(params.link.events),
            sender: params.link.sender,
            socket: params.link.socket,
            connector: params.connector,
            tools: params.tools,
            snapshot: Arc::clone(&snapshot),
            updates_tx,
            debounce: RestartDebounce::new(params.restart_delay),
        };
        tokio::spawn(actor.run());

        SessionActorHandle {
            id,
            command_tx,
            snapshot,
        }
    }

    /// Send a command to the actor (fire-and-forget).
    pub async fn send(&self, cmd: SessionCommand) {
        let name = cmd.name();
        if self.command_tx.send(cmd).await.is_err() {
            warn!(
                component = "session_actor",
                session_id = %self.id,
                command = name,
                "Actor channel closed, command dropped"
            );
        }
    }

    /// Lock-free snapshot read.
    pub fn snapshot(&self) -> Arc<SessionState> {
        self.snapshot.load_full()
    }

    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }

    /// Wait until the actor has stopped and closed its socket.
    pub async fn closed(&self) {
        self.command_tx.closed().await;
    }

    pub async fn state(&self) -> Result<SessionState, RelayError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::GetState { reply }).await;
        rx.await.map_err(|_| RelayError::SessionClosed)
    }

    pub async fn subscribe(
        &self,
    ) -> Result<(SessionState, broadcast::Receiver<SessionUpdate>), RelayError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Subscribe { reply }).await;
        rx.await.map_err(|_| RelayError::SessionClosed)
    }

    pub async fn set_form_value(
        &self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), RelayError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::SetFormValue {
            name: name.into(),
            value: value.into(),
            reply,
        })
        .await;
        let result = rx.await.map_err(|_| RelayError::SessionClosed)?;
        result.map_err(RelayError::from)
    }

    pub async fn submit_form(&self) {
        self.send(SessionCommand::SubmitForm).await;
    }

    pub async fn send_user_message(&self, text: impl Into<String>) {
        self.send(SessionCommand::SendUserMessage { text: text.into() })
            .await;
    }

    pub async fn interrupt(&self) {
        self.send(SessionCommand::Interrupt).await;
    }

    pub async fn restart(&self) {
        self.send(SessionCommand::Restart).await;
    }

    pub async fn back(&self) {
        self.send(SessionCommand::Back).await;
    }

    pub async fn close(&self) {
        self.send(SessionCommand::Close).await;
    }
}

struct SessionActor {
    state: SessionState,
    command_rx: mpsc::Receiver<SessionCommand>,
    /// Lets tool fetches report back without keeping the actor alive.
    command_weak: mpsc::WeakSender<SessionCommand>,
    socket_events: Option<mpsc::Receiver<SocketEvent>>,
    sender: SocketSender,
    socket: Option<SessionSocket>,
    connector: Option<Connector>,
    tools: Arc<dyn ToolSource>,
    snapshot: Arc<ArcSwap<SessionState>>,
    updates_tx: broadcast::Sender<SessionUpdate>,
    debounce: RestartDebounce,
}

impl SessionActor {
    async fn run(mut self) {
        info!(
            component = "session_actor",
            event = "session.started",
            session_id = %self.state.id,
            file = %self.state.target.file,
            "Run session started"
        );
        self.fetch_tool();

        loop {
            let deadline = self.debounce.deadline();
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    if !self.handle_command(cmd).await {
                        break;
                    }
                }

                event = next_socket_event(&mut self.socket_events) => {
                    match event {
                        Some(event) => self.apply(Input::from(event)).await,
                        None => self.socket_events = None,
                    }
                }

                _ = sleep_until_deadline(deadline) => {
                    if let Some(collapsed) = self.debounce.take_due(Instant::now()) {
                        info!(
                            component = "session_actor",
                            event = "session.restart",
                            session_id = %self.state.id,
                            collapsed_requests = collapsed,
                            "Restarting script"
                        );
                        self.apply(Input::Restart).await;
                    }
                }
            }
        }

        if let Some(socket) = self.socket.take() {
            socket.close().await;
        }

        info!(
            component = "session_actor",
            event = "session.stopped",
            session_id = %self.state.id,
            runs_started = self.state.runs_started,
            "Run session stopped"
        );
    }

    /// Returns false when the actor should stop.
    async fn handle_command(&mut self, cmd: SessionCommand) -> bool {
        match cmd {
            SessionCommand::GetState { reply } => {
                let _ = reply.send(self.state.clone());
            }
            SessionCommand::Subscribe { reply } => {
                let _ = reply.send((self.state.clone(), self.updates_tx.subscribe()));
            }
            SessionCommand::SetFormValue { name, value, reply } => {
                let result = self.state.form.check(&name);
                if result.is_ok() {
                    self.apply(Input::FormValue { name, value }).await;
                }
                let _ = reply.send(result);
            }
            SessionCommand::SubmitForm => self.apply(Input::FormSubmitted).await,
            SessionCommand::SendUserMessage { text } => {
                self.apply(Input::UserMessage { text }).await
            }
            SessionCommand::Interrupt => self.apply(Input::Interrupt).await,
            SessionCommand::Restart => {
                self.debounce.request(Instant::now());
                debug!(
                    component = "session_actor",
                    event = "session.restart_requested",
                    session_id = %self.state.id,
                    delay_ms = self.debounce.delay().as_millis() as u64,
                );
            }
            SessionCommand::Back => {
                self.debounce.cancel();
                self.apply(Input::Back).await;
            }
            SessionCommand::ProcessEvent { input } => self.apply(input).await,
            SessionCommand::Close => return false,
        }
        true
    }

    async fn apply(&mut self, input: Input) {
        let state = std::mem::take(&mut self.state);
        let (state, effects) = transition(state, input);
        self.state = state;
        self.snapshot.store(Arc::new(self.state.clone()));

        for effect in effects {
            match effect {
                Effect::Send(msg) => {
                    let kind = msg.kind();
                    if let Err(e) = self.sender.send(*msg).await {
                        warn!(
                            component = "session_actor",
                            event = "session.send_failed",
                            session_id = %self.state.id,
                            kind,
                            error = %e,
                            "Socket gone, message dropped"
                        );
                    }
                }
                Effect::FetchTool => self.fetch_tool(),
                Effect::Reconnect => self.reconnect().await,
                Effect::Emit(update) => {
                    // No subscribers is fine.
                    let _ = self.updates_tx.send(*update);
                }
            }
        }
    }

    async fn reconnect(&mut self) {
        let Some(connect) = self.connector.clone() else {
            warn!(
                component = "session_actor",
                event = "session.reconnect_unavailable",
                session_id = %self.state.id,
                "No connector, socket stays down"
            );
            return;
        };
        if let Some(old) = self.socket.take() {
            old.close().await;
        }

        let link = connect();
        info!(
            component = "session_actor",
            event = "session.reconnect",
            session_id = %self.state.id,
            "Opening a new session socket"
        );
        self.sender = link.sender;
        self.socket_events = Some(link.events);
        self.socket = link.socket;
    }

    fn fetch_tool(&self) {
        let Some(tx) = self.command_weak.upgrade() else {
            return;
        };
        let tools = Arc::clone(&self.tools);
        let file = self.state.target.file.clone();
        let session_id = self.state.id.clone();

        tokio::spawn(async move {
            let input = match tools.fetch_tool(&file).await {
                Ok(tool) => {
                    debug!(
                        component = "session_actor",
                        event = "session.tool_loaded",
                        session_id = %session_id,
                        tool = %tool.name,
                    );
                    Input::ToolLoaded(Box::new(tool))
                }
                Err(e) => {
                    warn!(
                        component = "session_actor",
                        event = "session.tool_fetch_failed",
                        session_id = %session_id,
                        file = %file,
                        error = %e,
                        "Failed to load script tool"
                    );
                    Input::ToolFailed {
                        error: e.to_string(),
                    }
                }
            };
            let _ = tx.send(SessionCommand::ProcessEvent { input }).await;
        });
    }
}

async fn next_socket_event(rx: &mut Option<mpsc::Receiver<SocketEvent>>) -> Option<SocketEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => future::pending().await,
    }
}
