use std::future::Future;
use std::pin::Pin;

use ragchat_gateway::{ConversationId, Message};
use snafu::Snafu;
use tokio::sync::{mpsc, oneshot};

/// Payload of one live-channel event, already decoded into chat-domain types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveEventPayload {
    Connected,
    Message(Message),
    Closed { reason: Option<String> },
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveEvent {
    pub conversation_id: ConversationId,
    pub payload: LiveEventPayload,
}

impl LiveEvent {
    pub fn new(conversation_id: ConversationId, payload: LiveEventPayload) -> Self {
        Self {
            conversation_id,
            payload,
        }
    }
}

pub type LiveWorker = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
pub type LiveResult<T> = Result<T, LiveError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum LiveError {
    #[snafu(display("invalid live channel base URL '{raw}': {source}"))]
    InvalidBaseUrl {
        stage: &'static str,
        raw: String,
        source: url::ParseError,
    },
    #[snafu(display("live channel base URL '{raw}' must use ws:// or wss://"))]
    UnsupportedBaseUrl { stage: &'static str, raw: String },
    #[snafu(display("failed to connect live channel at {url} on `{stage}`: {source}"))]
    Connect {
        stage: &'static str,
        url: String,
        source: tokio_tungstenite::tungstenite::Error,
    },
    #[snafu(display("live channel transport failed on `{stage}`: {source}"))]
    Transport {
        stage: &'static str,
        source: tokio_tungstenite::tungstenite::Error,
    },
    #[snafu(display("failed to decode live frame on `{stage}`: {source}"))]
    DecodeFrame {
        stage: &'static str,
        source: serde_json::Error,
    },
}

/// Receive side of one live connection.
///
/// Dropping the stream signals the worker to close the socket.
pub struct LiveEventStream {
    conversation_id: ConversationId,
    events: mpsc::UnboundedReceiver<LiveEvent>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

pub struct LiveHandle {
    pub stream: LiveEventStream,
    pub worker: LiveWorker,
}

impl LiveEventStream {
    pub(crate) fn new(
        conversation_id: ConversationId,
        events: mpsc::UnboundedReceiver<LiveEvent>,
        cancel_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            conversation_id,
            events,
            cancel_tx: Some(cancel_tx),
        }
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    pub async fn recv(&mut self) -> Option<LiveEvent> {
        self.events.recv().await
    }
}

impl Drop for LiveEventStream {
    fn drop(&mut self) {
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(());
        }
    }
}

/// Opens receive-only connections keyed by conversation.
pub trait LiveTransport: Send + Sync {
    /// Returns the event stream plus a worker future the caller must spawn.
    fn open(&self, conversation_id: ConversationId) -> LiveResult<LiveHandle>;
}

pub fn make_event_stream(
    conversation_id: ConversationId,
) -> (
    mpsc::UnboundedSender<LiveEvent>,
    LiveEventStream,
    oneshot::Receiver<()>,
) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = oneshot::channel();
    (
        event_tx,
        LiveEventStream::new(conversation_id, event_rx, cancel_tx),
        cancel_rx,
    )
}
