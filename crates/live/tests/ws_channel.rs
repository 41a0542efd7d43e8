use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::ws::{Message as ServerFrame, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;

use ragchat_gateway::{ConversationId, Role};
use ragchat_live::{LiveChannel, LiveChannelState, LiveEvent, LiveEventPayload, WsTransport};

#[derive(Clone)]
struct ServerLog {
    closed_tx: mpsc::UnboundedSender<String>,
}

fn assistant_frame(id: &str, conversation_id: &str, content: &str) -> String {
    serde_json::json!({
        "id": id,
        "conversation_id": conversation_id,
        "role": "assistant",
        "content": content,
        "created_at": "2024-05-01T10:00:02.000000"
    })
    .to_string()
}

async fn live_endpoint(
    ws: WebSocketUpgrade,
    Path(conversation_id): Path<String>,
    State(log): State<ServerLog>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_socket(socket, conversation_id, log))
}

async fn serve_socket(mut socket: WebSocket, conversation_id: String, log: ServerLog) {
    if conversation_id == "scripted" {
        let frames = [
            assistant_frame("m1", &conversation_id, "first"),
            "not json".to_string(),
            assistant_frame("m2", &conversation_id, "second"),
        ];
        for frame in frames {
            if socket.send(ServerFrame::Text(frame.into())).await.is_err() {
                return;
            }
        }
        let _ = socket.send(ServerFrame::Close(None)).await;
        return;
    }

    // Hold the socket until the client goes away.
    while let Some(Ok(frame)) = socket.recv().await {
        if matches!(frame, ServerFrame::Close(_)) {
            break;
        }
    }
    let _ = log.closed_tx.send(conversation_id);
}

async fn spawn_live_server() -> (String, mpsc::UnboundedReceiver<String>) {
    let (closed_tx, closed_rx) = mpsc::unbounded_channel();
    let app = Router::new()
        .route("/ws/{conversation_id}", get(live_endpoint))
        .with_state(ServerLog { closed_tx });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("ws://{address}/ws"), closed_rx)
}

async fn next_event(channel: &mut LiveChannel) -> LiveEvent {
    timeout(Duration::from_secs(5), channel.recv())
        .await
        .expect("live event within timeout")
        .expect("live event")
}

#[tokio::test]
async fn delivers_messages_and_drops_malformed_frames() {
    let (base_url, _closed_rx) = spawn_live_server().await;
    let mut channel = LiveChannel::new(Arc::new(WsTransport::new(&base_url).unwrap()));
    let conversation_id = ConversationId::new("scripted");

    channel.switch_to(conversation_id.clone()).unwrap();
    assert_eq!(
        channel.state(),
        &LiveChannelState::Connecting(conversation_id.clone())
    );

    assert_eq!(next_event(&mut channel).await.payload, LiveEventPayload::Connected);
    assert_eq!(channel.state(), &LiveChannelState::Open(conversation_id.clone()));

    let mut delivered = Vec::new();
    loop {
        let event = next_event(&mut channel).await;
        assert_eq!(event.conversation_id, conversation_id);
        match event.payload {
            LiveEventPayload::Message(message) => {
                assert_eq!(message.role, Role::Assistant);
                delivered.push(message.content);
            }
            LiveEventPayload::Closed { .. } => break,
            other => panic!("unexpected event {other:?}"),
        }
    }

    assert_eq!(delivered, vec!["first".to_string(), "second".to_string()]);
    assert_eq!(channel.state(), &LiveChannelState::Closed);
}

#[tokio::test]
async fn switching_conversation_closes_previous_socket() {
    let (base_url, mut closed_rx) = spawn_live_server().await;
    let mut channel = LiveChannel::new(Arc::new(WsTransport::new(&base_url).unwrap()));

    channel.switch_to(ConversationId::new("a")).unwrap();
    assert_eq!(next_event(&mut channel).await.payload, LiveEventPayload::Connected);

    channel.switch_to(ConversationId::new("b")).unwrap();
    let event = next_event(&mut channel).await;
    assert_eq!(event.conversation_id, ConversationId::new("b"));
    assert_eq!(event.payload, LiveEventPayload::Connected);
    assert_eq!(channel.state(), &LiveChannelState::Open(ConversationId::new("b")));

    let closed = timeout(Duration::from_secs(5), closed_rx.recv())
        .await
        .expect("server saw close")
        .expect("closed id");
    assert_eq!(closed, "a");

    drop(channel);
    let closed = timeout(Duration::from_secs(5), closed_rx.recv())
        .await
        .expect("server saw close on teardown")
        .expect("closed id");
    assert_eq!(closed, "b");
}

#[tokio::test]
async fn connection_failure_reports_error_then_closed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);

    let transport = WsTransport::new(&format!("ws://{address}/ws")).unwrap();
    let mut channel = LiveChannel::new(Arc::new(transport));
    channel.switch_to(ConversationId::new("a")).unwrap();

    assert!(matches!(
        next_event(&mut channel).await.payload,
        LiveEventPayload::Error(_)
    ));
    assert!(matches!(
        next_event(&mut channel).await.payload,
        LiveEventPayload::Closed { reason: None }
    ));
    assert_eq!(channel.state(), &LiveChannelState::Closed);
}
