//! One run session: the actor that owns its state, wired to a socket.

use std::sync::Arc;

use acorn_connectors::ToolSource;
use acorn_protocol::new_id;
use tracing::info;

use crate::config::RelayConfig;
use crate::session_actor::{ActorParams, Connector, SessionActorHandle, SocketLink};
use crate::transition::SessionState;

pub struct RunSession {
    handle: SessionActorHandle,
}

impl RunSession {
    /// Connect the session socket and start loading `file`.
    pub fn open(config: &RelayConfig, file: &str, tools: Arc<dyn ToolSource>) -> Self {
        let url = config.socket_url();
        let policy = config.reconnect;

        let state = SessionState::new(new_id(), config.run_target(file));
        info!(
            component = "session",
            event = "session.opened",
            session_id = %state.id,
            file = %file,
            url = %url,
            "Opening run session"
        );

        let link = SocketLink::open(&url, policy);
        let connector: Connector = Arc::new(move || SocketLink::open(&url, policy));
        let handle = SessionActorHandle::spawn(
            state,
            ActorParams {
                restart_delay: config.restart_debounce,
                tools,
                link,
                connector: Some(connector),
            },
        );

        Self { handle }
    }

    pub fn handle(&self) -> &SessionActorHandle {
        &self.handle
    }

    pub fn id(&self) -> &str {
        &self.handle.id
    }

    /// Stop the actor and wait for it to close the socket.
    pub async fn close(self) {
        self.handle.close().await;
        self.handle.closed().await;
        info!(
            component = "session",
            event = "session.closed",
            session_id = %self.handle.id,
        );
    }
}
