//! Session socket against a real WebSocket server on localhost.

use std::time::Duration;

use acorn_connectors::{ReconnectPolicy, SessionSocket, SocketEvent};
use acorn_protocol::{ClientMessage, FormValues, FrameKind, ServerMessage};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::accept_async;

const WAIT: Duration = Duration::from_secs(5);

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    (listener, format!("ws://{}", addr))
}

async fn next_event(rx: &mut mpsc::Receiver<SocketEvent>) -> SocketEvent {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for socket event")
        .expect("socket event channel closed")
}

fn text(json: &str) -> Message {
    Message::Text(json.to_string().into())
}

#[tokio::test]
async fn run_request_goes_out_and_frames_come_back_in_order() {
    let (listener, url) = bind().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = accept_async(stream).await.expect("handshake");

        let first = ws.next().await.expect("frame").expect("ws ok");
        let request: ClientMessage =
            serde_json::from_str(first.to_text().expect("text frame")).expect("client message");

        ws.send(text(r#"{"type":"script_message","text":"Working on it","sender_name":"Researcher"}"#))
            .await
            .expect("send");
        ws.send(text(r#"{"type":"event","frame":{"id":"1","type":"callStart","tool":{"name":"browse"}}}"#))
            .await
            .expect("send");
        ws.send(text(r#"{"type":"event","frame":{"id":"1","type":"callFinish","tool":{"name":"browse"}}}"#))
            .await
            .expect("send");
        ws.close(None).await.expect("close");
        request
    });

    let mut socket = SessionSocket::connect(url, ReconnectPolicy::Disabled);
    let mut events = socket.take_event_rx().expect("event rx");
    assert!(socket.take_event_rx().is_none());

    assert_eq!(next_event(&mut events).await, SocketEvent::Connected);

    let mut form_values = FormValues::new();
    form_values.insert("topic".to_string(), "otters".to_string());
    socket
        .sender()
        .run("gptscripts/research.gpt", "research", form_values, "/tmp/ws")
        .await
        .expect("queue run");

    match next_event(&mut events).await {
        SocketEvent::Message(ServerMessage::ScriptMessage { text, sender_name }) => {
            assert_eq!(text, "Working on it");
            assert_eq!(sender_name.as_deref(), Some("Researcher"));
        }
        other => panic!("unexpected event: {:?}", other),
    }
    let kinds: Vec<FrameKind> = {
        let mut kinds = Vec::new();
        for _ in 0..2 {
            match next_event(&mut events).await {
                SocketEvent::Message(ServerMessage::Event { frame }) => kinds.push(frame.kind),
                other => panic!("unexpected event: {:?}", other),
            }
        }
        kinds
    };
    assert_eq!(kinds, vec![FrameKind::CallStart, FrameKind::CallFinish]);

    assert!(matches!(
        next_event(&mut events).await,
        SocketEvent::Disconnected { .. }
    ));
    assert!(matches!(
        next_event(&mut events).await,
        SocketEvent::GaveUp { attempts: 1, .. }
    ));

    let request = server.await.expect("server task");
    match request {
        ClientMessage::Run {
            path,
            tool_name,
            form_values,
            workspace_dir,
        } => {
            assert_eq!(path, "gptscripts/research.gpt");
            assert_eq!(tool_name, "research");
            assert_eq!(form_values.get("topic").map(String::as_str), Some("otters"));
            assert_eq!(workspace_dir, "/tmp/ws");
        }
        other => panic!("unexpected request: {:?}", other),
    }
}

#[tokio::test]
async fn reconnects_after_the_server_drops_the_connection() {
    let (listener, url) = bind().await;

    tokio::spawn(async move {
        // First connection is closed straight away.
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = accept_async(stream).await.expect("handshake");
        ws.close(None).await.expect("close");
        drop(ws);

        let (stream, _) = listener.accept().await.expect("accept again");
        let mut ws = accept_async(stream).await.expect("handshake");
        ws.send(text(r#"{"type":"script_message","text":"back again"}"#))
            .await
            .expect("send");
        // Keep the connection open until the client goes away.
        while ws.next().await.is_some() {}
    });

    let policy = ReconnectPolicy::Backoff {
        initial: Duration::from_millis(10),
        max: Duration::from_millis(20),
        max_attempts: 3,
    };
    let mut socket = SessionSocket::connect(url, policy);
    let mut events = socket.take_event_rx().expect("event rx");

    assert_eq!(next_event(&mut events).await, SocketEvent::Connected);
    assert!(matches!(
        next_event(&mut events).await,
        SocketEvent::Disconnected { .. }
    ));
    assert_eq!(next_event(&mut events).await, SocketEvent::Connected);
    match next_event(&mut events).await {
        SocketEvent::Message(ServerMessage::ScriptMessage { text, .. }) => {
            assert_eq!(text, "back again")
        }
        other => panic!("unexpected event: {:?}", other),
    }

    socket.close().await;
}

#[tokio::test]
async fn gives_up_when_nothing_is_listening() {
    let (listener, url) = bind().await;
    drop(listener);

    let policy = ReconnectPolicy::Backoff {
        initial: Duration::from_millis(1),
        max: Duration::from_millis(1),
        max_attempts: 2,
    };
    let mut socket = SessionSocket::connect(url, policy);
    let mut events = socket.take_event_rx().expect("event rx");

    match next_event(&mut events).await {
        SocketEvent::GaveUp { attempts, error } => {
            assert_eq!(attempts, 3);
            assert!(!error.is_empty());
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn undecodable_frames_surface_as_malformed() {
    let (listener, url) = bind().await;

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = accept_async(stream).await.expect("handshake");
        ws.send(text(r#"{"type":"mystery"}"#)).await.expect("send");
        while ws.next().await.is_some() {}
    });

    let mut socket = SessionSocket::connect(url, ReconnectPolicy::Disabled);
    let mut events = socket.take_event_rx().expect("event rx");

    assert_eq!(next_event(&mut events).await, SocketEvent::Connected);
    assert!(matches!(
        next_event(&mut events).await,
        SocketEvent::Malformed { .. }
    ));

    socket.close().await;
}

#[tokio::test]
async fn close_sends_a_close_frame() {
    let (listener, url) = bind().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = accept_async(stream).await.expect("handshake");
        let mut saw_close = false;
        while let Some(frame) = ws.next().await {
            if matches!(frame, Ok(Message::Close(_))) {
                saw_close = true;
            }
        }
        saw_close
    });

    let mut socket = SessionSocket::connect(url, ReconnectPolicy::Disabled);
    let mut events = socket.take_event_rx().expect("event rx");
    assert_eq!(next_event(&mut events).await, SocketEvent::Connected);

    socket.close().await;

    let saw_close = tokio::time::timeout(WAIT, server)
        .await
        .expect("server finished")
        .expect("server task");
    assert!(saw_close);
}
