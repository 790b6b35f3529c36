//! Pure state transition function
//!
//! Every run session state change goes through
//! `transition(state, input) -> (state, effects)`. The actor performs the
//! effects (socket sends, tool fetches, update broadcasts); this module never
//! does IO and is unit-testable on its own.

use acorn_connectors::SocketEvent;
use acorn_protocol::{ClientMessage, ServerMessage, Tool};
use serde::Serialize;

use crate::form::FormCollector;
use crate::transcript::{Message, Transcript, TranscriptChange};

pub const RECONNECTED_ALERT: &str = "Reconnected to the run server";

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    /// Waiting for the script's tool metadata.
    #[default]
    Loading,
    /// Tool declares arguments; collecting them.
    Form,
    /// Run requested while the socket is down; goes out on connect.
    Queued,
    Running {
        generating: bool,
    },
    Failed {
        error: String,
    },
    /// Transcript cleared, tool re-fetch in flight.
    Restarting,
}

impl Phase {
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Loading => "loading",
            Phase::Form => "form",
            Phase::Queued => "queued",
            Phase::Running { .. } => "running",
            Phase::Failed { .. } => "failed",
            Phase::Restarting => "restarting",
        }
    }
}

/// What a presenter should show for the current state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Loading,
    Form,
    Transcript,
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Where a run goes: script path on the server plus its workspace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunTarget {
    pub file: String,
    pub path: String,
    pub workspace_dir: String,
}

#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub id: String,
    pub target: RunTarget,
    pub connected: bool,
    pub phase: Phase,
    pub tool: Option<Tool>,
    pub form: FormCollector,
    pub transcript: Transcript,
    /// Run requests sent over the socket during this session.
    pub runs_started: u32,
    /// Reason of the last drop, until the socket comes back.
    pub drop_reason: Option<String>,
    /// The reconnect policy gave up; a restart needs a new socket.
    pub socket_lost: bool,
}

impl SessionState {
    pub fn new(id: impl Into<String>, target: RunTarget) -> Self {
        Self {
            id: id.into(),
            target,
            ..Default::default()
        }
    }

    /// A run was sent and has not been cleared by restart or back.
    pub fn running(&self) -> bool {
        matches!(self.phase, Phase::Running { .. } | Phase::Failed { .. })
    }

    pub fn generating(&self) -> bool {
        matches!(self.phase, Phase::Running { generating: true })
    }

    pub fn error(&self) -> Option<&str> {
        match &self.phase {
            Phase::Failed { error } => Some(error),
            _ => None,
        }
    }

    pub fn has_params(&self) -> bool {
        self.tool.as_ref().is_some_and(Tool::has_params)
    }

    pub fn chat_enabled(&self) -> bool {
        self.tool.as_ref().is_some_and(|t| t.chat)
    }

    pub fn view(&self) -> View {
        if self.connected && self.running() {
            View::Transcript
        } else if self.phase == Phase::Form && self.has_params() {
            View::Form
        } else {
            View::Loading
        }
    }
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Input {
    Connected,
    Disconnected { reason: String },
    /// Reconnect policy exhausted.
    ConnectionLost { error: String },
    ToolLoaded(Box<Tool>),
    ToolFailed { error: String },
    /// Already validated by the actor.
    FormValue { name: String, value: String },
    FormSubmitted,
    Back,
    UserMessage { text: String },
    Interrupt,
    /// Debounced restart deadline elapsed.
    Restart,
    Server(ServerMessage),
    Malformed { error: String },
}

impl From<SocketEvent> for Input {
    fn from(event: SocketEvent) -> Self {
        match event {
            SocketEvent::Connected => Input::Connected,
            SocketEvent::Disconnected { reason } => Input::Disconnected { reason },
            SocketEvent::GaveUp { attempts, error } => Input::ConnectionLost {
                error: format!("gave up after {attempts} attempts: {error}"),
            },
            SocketEvent::Message(msg) => Input::Server(msg),
            SocketEvent::Malformed { error } => Input::Malformed { error },
        }
    }
}

// ---------------------------------------------------------------------------
// Effects
// ---------------------------------------------------------------------------

/// Change notification for session subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionUpdate {
    MessageAppended { index: usize, message: Message },
    MessageUpdated { index: usize, message: Message },
    TranscriptCleared,
    PhaseChanged { phase: Phase },
    ConnectionChanged { connected: bool },
}

#[derive(Debug, Clone)]
pub enum Effect {
    Send(Box<ClientMessage>),
    /// (Re)load the entry tool of the session's script.
    FetchTool,
    /// Open a new socket; the previous one gave up.
    Reconnect,
    Emit(Box<SessionUpdate>),
}

// ---------------------------------------------------------------------------
// transition
// ---------------------------------------------------------------------------

pub fn transition(mut state: SessionState, input: Input) -> (SessionState, Vec<Effect>) {
    let mut effects: Vec<Effect> = Vec::new();
    let phase_before = state.phase.clone();

    match input {
        // -- Socket lifecycle -------------------------------------------------
        Input::Connected => {
            state.socket_lost = false;
            set_connected(&mut state, &mut effects, true);
            if let Some(reason) = state.drop_reason.take() {
                if state.running() {
                    let alert = Message::alert(RECONNECTED_ALERT)
                        .with_extra(format!("Connection dropped: {reason}"));
                    let change = state.transcript.push(alert);
                    emit_change(&state, &mut effects, change);
                }
            }
            if state.phase == Phase::Queued {
                start_run(&mut state, &mut effects);
            }
        }

        Input::Disconnected { reason } => {
            state.drop_reason = Some(reason);
            set_connected(&mut state, &mut effects, false);
            if let Phase::Running { generating } = &mut state.phase {
                *generating = false;
            }
        }

        Input::ConnectionLost { error } => {
            state.socket_lost = true;
            state.drop_reason = None;
            set_connected(&mut state, &mut effects, false);
            fail(
                &mut state,
                &mut effects,
                format!("Lost connection to the run server ({error})"),
            );
        }

        // -- Tool metadata ----------------------------------------------------
        Input::ToolLoaded(tool) => {
            state.form.redeclare(tool.argument_names());
            let has_params = tool.has_params();
            state.tool = Some(*tool);

            // A form that was never submitted has no values to re-run with.
            let unsubmitted = has_params && !state.form.is_frozen();
            match state.phase {
                Phase::Loading if has_params => state.phase = Phase::Form,
                Phase::Restarting if unsubmitted => state.phase = Phase::Form,
                Phase::Loading | Phase::Restarting => request_run(&mut state, &mut effects),
                _ => {}
            }
        }

        Input::ToolFailed { error } => {
            if matches!(state.phase, Phase::Loading | Phase::Restarting) {
                let message = format!("Failed to load script {}: {error}", state.target.file);
                fail(&mut state, &mut effects, message);
            }
        }

        // -- Form -------------------------------------------------------------
        Input::FormValue { name, value } => {
            let _ = state.form.set(name, value);
        }

        Input::FormSubmitted => {
            if state.phase == Phase::Form {
                clear_transcript(&mut state, &mut effects);
                request_run(&mut state, &mut effects);
            }
        }

        Input::Back => {
            let leaving_run = state.running() || state.phase == Phase::Queued;
            if state.has_params() && leaving_run {
                clear_transcript(&mut state, &mut effects);
                state.form.thaw();
                state.phase = Phase::Form;
            }
        }

        // -- Chat -------------------------------------------------------------
        Input::UserMessage { text } => {
            if state.connected && state.running() {
                let change = state.transcript.push_user(text.clone());
                emit_change(&state, &mut effects, change);
                effects.push(Effect::Send(Box::new(ClientMessage::UserMessage { text })));
                state.phase = Phase::Running { generating: true };
            }
        }

        Input::Interrupt => {
            if state.generating() {
                effects.push(Effect::Send(Box::new(ClientMessage::Interrupt)));
                state.phase = Phase::Running { generating: false };
            }
        }

        // Nothing was submitted yet, so there is nothing to restart.
        Input::Restart if matches!(state.phase, Phase::Loading | Phase::Form) => {}

        Input::Restart => {
            clear_transcript(&mut state, &mut effects);
            state.phase = Phase::Restarting;
            if state.socket_lost {
                state.socket_lost = false;
                effects.push(Effect::Reconnect);
            }
            effects.push(Effect::FetchTool);
        }

        // -- Server frames ----------------------------------------------------
        Input::Server(ServerMessage::ScriptMessage { text, sender_name }) => {
            let change = state.transcript.push_bot_text(text, sender_name);
            emit_change(&state, &mut effects, change);
        }

        Input::Server(ServerMessage::Event { frame }) => {
            let ends = frame.ends_generation();
            let change = state.transcript.merge_frame(frame);
            emit_change(&state, &mut effects, change);
            if let Phase::Running { generating } = &mut state.phase {
                *generating = !ends;
            }
        }

        Input::Server(ServerMessage::Error { message }) => {
            fail(&mut state, &mut effects, message);
        }

        Input::Malformed { error } => {
            fail(
                &mut state,
                &mut effects,
                format!("Unreadable message from the run server: {error}"),
            );
        }
    }

    if state.phase != phase_before {
        effects.push(Effect::Emit(Box::new(SessionUpdate::PhaseChanged {
            phase: state.phase.clone(),
        })));
    }

    (state, effects)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn set_connected(state: &mut SessionState, effects: &mut Vec<Effect>, connected: bool) {
    if state.connected == connected {
        return;
    }
    state.connected = connected;
    effects.push(Effect::Emit(Box::new(SessionUpdate::ConnectionChanged {
        connected,
    })));
}

/// Run now if the socket is up, otherwise queue until it connects.
fn request_run(state: &mut SessionState, effects: &mut Vec<Effect>) {
    if state.connected {
        start_run(state, effects);
    } else {
        state.phase = Phase::Queued;
    }
}

fn start_run(state: &mut SessionState, effects: &mut Vec<Effect>) {
    let tool_name = state
        .tool
        .as_ref()
        .map(|t| t.name.clone())
        .unwrap_or_default();
    let form_values = state.form.freeze();

    effects.push(Effect::Send(Box::new(ClientMessage::Run {
        path: state.target.path.clone(),
        tool_name,
        form_values,
        workspace_dir: state.target.workspace_dir.clone(),
    })));
    state.runs_started += 1;
    state.phase = Phase::Running { generating: true };
}

fn fail(state: &mut SessionState, effects: &mut Vec<Effect>, error: String) {
    let change = state.transcript.attach_error(error.clone());
    emit_change(state, effects, change);
    state.phase = Phase::Failed { error };
}

fn clear_transcript(state: &mut SessionState, effects: &mut Vec<Effect>) {
    if state.transcript.is_empty() {
        return;
    }
    state.transcript.clear();
    effects.push(Effect::Emit(Box::new(SessionUpdate::TranscriptCleared)));
}

fn emit_change(state: &SessionState, effects: &mut Vec<Effect>, change: TranscriptChange) {
    let index = change.index();
    let Some(message) = state.transcript.get(index).cloned() else {
        return;
    };
    let update = match change {
        TranscriptChange::Appended(_) => SessionUpdate::MessageAppended { index, message },
        TranscriptChange::Updated(_) => SessionUpdate::MessageUpdated { index, message },
    };
    effects.push(Effect::Emit(Box::new(update)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use acorn_protocol::{CallFrame, FrameKind, Property, ToolArguments};
    use std::collections::BTreeMap;

    fn target() -> RunTarget {
        RunTarget {
            file: "summarize.gpt".to_string(),
            path: "gptscripts/summarize.gpt".to_string(),
            workspace_dir: "/tmp/workspace".to_string(),
        }
    }

    fn plain_tool() -> Tool {
        Tool {
            name: "summarize".to_string(),
            instructions: "Summarize things".to_string(),
            chat: true,
            ..Default::default()
        }
    }

    fn tool_with_params() -> Tool {
        let mut properties = BTreeMap::new();
        properties.insert("url".to_string(), Property::default());
        Tool {
            arguments: Some(ToolArguments {
                properties,
                required: vec![],
            }),
            ..plain_tool()
        }
    }

    fn step(state: SessionState, input: Input) -> (SessionState, Vec<Effect>) {
        transition(state, input)
    }

    fn connected_state() -> SessionState {
        step(SessionState::new("s1", target()), Input::Connected).0
    }

    fn running_state() -> SessionState {
        step(connected_state(), Input::ToolLoaded(Box::new(plain_tool()))).0
    }

    fn sends(effects: &[Effect]) -> Vec<&ClientMessage> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Send(msg) => Some(msg.as_ref()),
                _ => None,
            })
            .collect()
    }

    fn updates(effects: &[Effect]) -> Vec<&SessionUpdate> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Emit(update) => Some(update.as_ref()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn tool_without_params_runs_immediately_when_connected() {
        let (state, effects) = step(connected_state(), Input::ToolLoaded(Box::new(plain_tool())));

        assert_eq!(state.phase, Phase::Running { generating: true });
        assert_eq!(state.runs_started, 1);
        assert_eq!(
            sends(&effects),
            vec![&ClientMessage::Run {
                path: "gptscripts/summarize.gpt".to_string(),
                tool_name: "summarize".to_string(),
                form_values: BTreeMap::new(),
                workspace_dir: "/tmp/workspace".to_string(),
            }]
        );
        assert_eq!(state.view(), View::Transcript);
    }

    #[test]
    fn run_is_queued_until_connected() {
        let state = SessionState::new("s1", target());
        let (state, effects) = step(state, Input::ToolLoaded(Box::new(plain_tool())));
        assert_eq!(state.phase, Phase::Queued);
        assert!(sends(&effects).is_empty());
        assert_eq!(state.view(), View::Loading);

        let (state, effects) = step(state, Input::Connected);
        assert_eq!(state.phase, Phase::Running { generating: true });
        assert_eq!(sends(&effects).len(), 1);
    }

    #[test]
    fn tool_with_params_waits_for_form() {
        let (state, effects) = step(
            connected_state(),
            Input::ToolLoaded(Box::new(tool_with_params())),
        );
        assert_eq!(state.phase, Phase::Form);
        assert_eq!(state.view(), View::Form);
        assert!(sends(&effects).is_empty());

        let (state, _) = step(
            state,
            Input::FormValue {
                name: "url".to_string(),
                value: "https://example.com".to_string(),
            },
        );
        let (state, effects) = step(state, Input::FormSubmitted);

        let Some(ClientMessage::Run { form_values, .. }) = sends(&effects).first().copied()
        else {
            panic!("expected a run request");
        };
        assert_eq!(form_values["url"], "https://example.com");
        assert!(state.form.is_frozen());
    }

    #[test]
    fn user_message_requires_connection_and_run() {
        let (state, effects) = step(
            SessionState::new("s1", target()),
            Input::UserMessage {
                text: "hi".to_string(),
            },
        );
        assert!(effects.is_empty());
        assert!(state.transcript.is_empty());

        let (state, effects) = step(
            running_state(),
            Input::UserMessage {
                text: "hi".to_string(),
            },
        );
        assert_eq!(state.transcript.len(), 1);
        assert_eq!(
            sends(&effects),
            vec![&ClientMessage::UserMessage {
                text: "hi".to_string()
            }]
        );
    }

    #[test]
    fn root_call_finish_stops_generating() {
        let state = running_state();
        let (state, _) = step(
            state,
            Input::Server(ServerMessage::Event {
                frame: CallFrame::new("1", FrameKind::CallStart),
            }),
        );
        assert!(state.generating());

        let (state, effects) = step(
            state,
            Input::Server(ServerMessage::Event {
                frame: CallFrame::new("1", FrameKind::CallFinish),
            }),
        );
        assert!(!state.generating());
        assert!(updates(&effects).contains(&&SessionUpdate::PhaseChanged {
            phase: Phase::Running { generating: false }
        }));
        assert_eq!(state.transcript.len(), 1);
    }

    #[test]
    fn interrupt_only_sent_while_generating() {
        let (state, effects) = step(running_state(), Input::Interrupt);
        assert_eq!(sends(&effects), vec![&ClientMessage::Interrupt]);
        assert!(!state.generating());

        let (_, effects) = step(state, Input::Interrupt);
        assert!(sends(&effects).is_empty());
    }

    #[test]
    fn server_error_fails_the_run() {
        let (state, _) = step(
            running_state(),
            Input::Server(ServerMessage::ScriptMessage {
                text: "working".to_string(),
                sender_name: None,
            }),
        );
        let (state, effects) = step(
            state,
            Input::Server(ServerMessage::Error {
                message: "tool exploded".to_string(),
            }),
        );

        assert_eq!(state.error(), Some("tool exploded"));
        assert_eq!(state.transcript.len(), 1);
        assert_eq!(
            state.transcript.messages()[0].error.as_deref(),
            Some("tool exploded")
        );
        assert!(matches!(
            updates(&effects).first(),
            Some(SessionUpdate::MessageUpdated { index: 0, .. })
        ));
        assert!(state.running());
    }

    #[test]
    fn restart_clears_and_refetches_then_reruns() {
        let (state, _) = step(
            running_state(),
            Input::Server(ServerMessage::ScriptMessage {
                text: "hello".to_string(),
                sender_name: None,
            }),
        );

        let (state, effects) = step(state, Input::Restart);
        assert!(state.transcript.is_empty());
        assert_eq!(state.phase, Phase::Restarting);
        assert!(effects.iter().any(|e| matches!(e, Effect::FetchTool)));
        assert!(updates(&effects).contains(&&SessionUpdate::TranscriptCleared));

        let (state, effects) = step(state, Input::ToolLoaded(Box::new(plain_tool())));
        assert_eq!(state.runs_started, 2);
        assert_eq!(sends(&effects).len(), 1);
    }

    #[test]
    fn restart_reuses_submitted_form_values() {
        let state = step(
            connected_state(),
            Input::ToolLoaded(Box::new(tool_with_params())),
        )
        .0;
        let state = step(
            state,
            Input::FormValue {
                name: "url".to_string(),
                value: "https://a.example".to_string(),
            },
        )
        .0;
        let state = step(state, Input::FormSubmitted).0;
        let state = step(state, Input::Restart).0;
        let (_, effects) = step(state, Input::ToolLoaded(Box::new(tool_with_params())));

        let Some(ClientMessage::Run { form_values, .. }) = sends(&effects).first().copied()
        else {
            panic!("expected a rerun");
        };
        assert_eq!(form_values["url"], "https://a.example");
    }

    #[test]
    fn back_returns_to_form_only_for_tools_with_params() {
        let (state, _) = step(running_state(), Input::Back);
        assert!(state.running());

        let state = step(
            connected_state(),
            Input::ToolLoaded(Box::new(tool_with_params())),
        )
        .0;
        let state = step(state, Input::FormSubmitted).0;
        let (state, _) = step(state, Input::Back);
        assert_eq!(state.phase, Phase::Form);
        assert!(!state.form.is_frozen());
        assert!(state.transcript.is_empty());
    }

    #[test]
    fn disconnect_keeps_run_but_hides_transcript() {
        let (state, _) = step(
            running_state(),
            Input::Server(ServerMessage::ScriptMessage {
                text: "halfway there".to_string(),
                sender_name: Some("Crawler".to_string()),
            }),
        );
        let (state, _) = step(
            state,
            Input::Server(ServerMessage::Event {
                frame: CallFrame::new("1", FrameKind::CallStart),
            }),
        );
        let before = state.transcript.clone();
        assert_eq!(before.len(), 1);

        let (state, effects) = step(
            state,
            Input::Disconnected {
                reason: "closed by server".to_string(),
            },
        );
        assert!(!state.connected);
        assert!(state.running());
        assert!(!state.generating());
        assert_eq!(state.view(), View::Loading);
        assert!(updates(&effects).contains(&&SessionUpdate::ConnectionChanged { connected: false }));
        assert_eq!(state.transcript, before);
        let touched = updates(&effects).iter().any(|u| {
            matches!(
                u,
                SessionUpdate::MessageAppended { .. }
                    | SessionUpdate::MessageUpdated { .. }
                    | SessionUpdate::TranscriptCleared
            )
        });
        assert!(!touched);

        // A reconnect does not re-issue the run.
        let (state, effects) = step(state, Input::Connected);
        assert!(sends(&effects).is_empty());
        assert_eq!(state.runs_started, 1);
    }

    #[test]
    fn reconnect_after_drop_appends_alert() {
        let (state, _) = step(
            running_state(),
            Input::Disconnected {
                reason: "connection reset".to_string(),
            },
        );
        let (state, effects) = step(state, Input::Connected);

        let alert = state.transcript.last().expect("alert");
        assert_eq!(alert.kind, crate::transcript::MessageKind::Alert);
        assert_eq!(alert.text.as_deref(), Some(RECONNECTED_ALERT));
        assert!(alert
            .extra
            .as_deref()
            .is_some_and(|extra| extra.contains("connection reset")));
        assert!(matches!(
            updates(&effects).first(),
            Some(SessionUpdate::ConnectionChanged { connected: true })
        ));
        assert!(updates(&effects)
            .iter()
            .any(|u| matches!(u, SessionUpdate::MessageAppended { index: 0, .. })));

        // First connect of a session is not a reconnect.
        let (state, _) = step(SessionState::new("s1", target()), Input::Connected);
        assert!(state.transcript.is_empty());
    }

    #[test]
    fn restart_before_form_submit_is_ignored() {
        let (state, _) = step(
            connected_state(),
            Input::ToolLoaded(Box::new(tool_with_params())),
        );
        assert_eq!(state.phase, Phase::Form);

        let (state, effects) = step(state, Input::Restart);
        assert!(effects.is_empty());
        assert_eq!(state.phase, Phase::Form);
        assert_eq!(state.runs_started, 0);

        let (state, effects) = step(SessionState::new("s1", target()), Input::Restart);
        assert!(effects.is_empty());
        assert_eq!(state.phase, Phase::Loading);
    }

    #[test]
    fn restart_after_failed_load_opens_the_form() {
        let (state, _) = step(
            connected_state(),
            Input::ToolFailed {
                error: "503".to_string(),
            },
        );
        let (state, _) = step(state, Input::Restart);
        assert_eq!(state.phase, Phase::Restarting);

        let (state, effects) = step(state, Input::ToolLoaded(Box::new(tool_with_params())));
        assert_eq!(state.phase, Phase::Form);
        assert!(sends(&effects).is_empty());
        assert_eq!(state.runs_started, 0);
    }

    #[test]
    fn restart_after_give_up_reopens_socket() {
        let input = Input::from(SocketEvent::GaveUp {
            attempts: 8,
            error: "refused".to_string(),
        });
        let (state, _) = step(running_state(), input);
        assert!(state.socket_lost);

        let (state, effects) = step(state, Input::Restart);
        assert!(effects.iter().any(|e| matches!(e, Effect::Reconnect)));
        assert!(effects.iter().any(|e| matches!(e, Effect::FetchTool)));
        assert!(!state.socket_lost);

        let (state, _) = step(state, Input::ToolLoaded(Box::new(plain_tool())));
        assert_eq!(state.phase, Phase::Queued);

        let (state, effects) = step(state, Input::Connected);
        assert_eq!(sends(&effects).len(), 1);
        assert_eq!(state.runs_started, 2);
        assert!(state.transcript.is_empty());

        // A plain restart on a live socket does not reconnect.
        let (_, effects) = step(state, Input::Restart);
        assert!(!effects.iter().any(|e| matches!(e, Effect::Reconnect)));
    }

    #[test]
    fn giving_up_fails_with_connection_error() {
        let input = Input::from(SocketEvent::GaveUp {
            attempts: 3,
            error: "refused".to_string(),
        });
        let (state, _) = step(running_state(), input);
        let error = state.error().expect("failed");
        assert!(error.contains("gave up after 3 attempts"));
        assert!(!state.connected);
    }

    #[test]
    fn tool_fetch_failure_fails_loading_session() {
        let (state, _) = step(
            SessionState::new("s1", target()),
            Input::ToolFailed {
                error: "404".to_string(),
            },
        );
        assert!(matches!(state.phase, Phase::Failed { .. }));
        assert_eq!(state.transcript.len(), 1);

        // A late failure after the run started changes nothing.
        let (state, effects) = step(
            running_state(),
            Input::ToolFailed {
                error: "404".to_string(),
            },
        );
        assert!(effects.is_empty());
        assert_eq!(state.phase, Phase::Running { generating: true });
    }

    #[test]
    fn malformed_frame_surfaces_as_error() {
        let (state, _) = step(
            running_state(),
            Input::Malformed {
                error: "expected value".to_string(),
            },
        );
        assert!(state
            .error()
            .is_some_and(|e| e.contains("expected value")));
    }
}
