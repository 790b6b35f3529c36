//! Commands sent to a session actor.

use tokio::sync::{broadcast, oneshot};

use crate::form::FormError;
use crate::transition::{Input, SessionState, SessionUpdate};

pub enum SessionCommand {
    // -- Queries (use oneshot reply channels) --
    GetState {
        reply: oneshot::Sender<SessionState>,
    },

    /// Current state plus a receiver for every update after it.
    Subscribe {
        reply: oneshot::Sender<(SessionState, broadcast::Receiver<SessionUpdate>)>,
    },

    // -- Form --
    SetFormValue {
        name: String,
        value: String,
        reply: oneshot::Sender<Result<(), FormError>>,
    },
    SubmitForm,

    // -- Run controls (fire-and-forget) --
    SendUserMessage {
        text: String,
    },
    Interrupt,
    /// Debounced: only the last request inside the quiet period restarts.
    Restart,
    Back,

    /// Feed an input straight into the transition function
    ProcessEvent {
        input: Input,
    },

    Close,
}

impl SessionCommand {
    pub fn name(&self) -> &'static str {
        match self {
            SessionCommand::GetState { .. } => "get_state",
            SessionCommand::Subscribe { .. } => "subscribe",
            SessionCommand::SetFormValue { .. } => "set_form_value",
            SessionCommand::SubmitForm => "submit_form",
            SessionCommand::SendUserMessage { .. } => "send_user_message",
            SessionCommand::Interrupt => "interrupt",
            SessionCommand::Restart => "restart",
            SessionCommand::Back => "back",
            SessionCommand::ProcessEvent { .. } => "process_event",
            SessionCommand::Close => "close",
        }
    }
}
