use futures::StreamExt;
use ragchat_gateway::{ConversationId, Message};
use snafu::{ResultExt, ensure};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use url::Url;

use super::channel::{
    DecodeFrameSnafu, InvalidBaseUrlSnafu, LiveError, LiveEvent, LiveEventPayload, LiveHandle,
    LiveResult, LiveTransport, LiveWorker, UnsupportedBaseUrlSnafu, make_event_stream,
};

pub const DEFAULT_LIVE_BASE_URL: &str = "ws://localhost:8000/ws";

/// WebSocket transport: one socket per conversation at `<base>/<conversation_id>`.
#[derive(Debug, Clone)]
pub struct WsTransport {
    base_url: Url,
}

impl WsTransport {
    pub fn new(base_url: &str) -> LiveResult<Self> {
        let parsed = Url::parse(base_url.trim()).context(InvalidBaseUrlSnafu {
            stage: "ws-transport-parse-base-url",
            raw: base_url.to_string(),
        })?;
        ensure!(
            matches!(parsed.scheme(), "ws" | "wss") && !parsed.cannot_be_a_base(),
            UnsupportedBaseUrlSnafu {
                stage: "ws-transport-check-base-url",
                raw: base_url.to_string(),
            }
        );

        Ok(Self { base_url: parsed })
    }

    pub fn endpoint_url(&self, conversation_id: &ConversationId) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push(conversation_id.as_str());
        }
        url
    }

    fn decode_frame(text: &str) -> LiveResult<Message> {
        serde_json::from_str(text).context(DecodeFrameSnafu {
            stage: "decode-live-frame",
        })
    }

    fn emit(
        event_tx: &mpsc::UnboundedSender<LiveEvent>,
        conversation_id: &ConversationId,
        payload: LiveEventPayload,
    ) -> bool {
        event_tx
            .send(LiveEvent::new(conversation_id.clone(), payload))
            .is_ok()
    }

    fn emit_failure(
        event_tx: &mpsc::UnboundedSender<LiveEvent>,
        conversation_id: &ConversationId,
        error: LiveError,
    ) {
        Self::emit(
            event_tx,
            conversation_id,
            LiveEventPayload::Error(error.to_string()),
        );
        Self::emit(
            event_tx,
            conversation_id,
            LiveEventPayload::Closed { reason: None },
        );
    }

    async fn run_worker(
        url: Url,
        conversation_id: ConversationId,
        event_tx: mpsc::UnboundedSender<LiveEvent>,
        mut cancel_rx: oneshot::Receiver<()>,
    ) {
        let connected = tokio::select! {
            _ = &mut cancel_rx => {
                tracing::debug!(conversation_id = %conversation_id, "live channel cancelled before open");
                return;
            }
            result = connect_async(url.as_str()) => result,
        };

        let mut socket = match connected {
            Ok((socket, _response)) => socket,
            Err(source) => {
                let error = LiveError::Connect {
                    stage: "ws-connect",
                    url: url.to_string(),
                    source,
                };
                tracing::warn!(
                    conversation_id = %conversation_id,
                    error = %error,
                    "live channel failed to connect"
                );
                Self::emit_failure(&event_tx, &conversation_id, error);
                return;
            }
        };

        tracing::info!(conversation_id = %conversation_id, url = %url, "live channel connected");
        if !Self::emit(&event_tx, &conversation_id, LiveEventPayload::Connected) {
            return;
        }

        loop {
            tokio::select! {
                _ = &mut cancel_rx => {
                    tracing::debug!(conversation_id = %conversation_id, "live channel cancelled");
                    let _ = socket.close(None).await;
                    return;
                }
                frame = socket.next() => {
                    match frame {
                        Some(Ok(WsMessage::Text(text))) => match Self::decode_frame(&text) {
                            Ok(message) => {
                                if !Self::emit(&event_tx, &conversation_id, LiveEventPayload::Message(message)) {
                                    return;
                                }
                            }
                            Err(error) => {
                                // Malformed frames are dropped; the channel stays up.
                                tracing::warn!(
                                    conversation_id = %conversation_id,
                                    error = %error,
                                    "dropping malformed live frame"
                                );
                            }
                        },
                        Some(Ok(WsMessage::Binary(bytes))) => {
                            tracing::warn!(
                                conversation_id = %conversation_id,
                                len = bytes.len(),
                                "dropping binary live frame"
                            );
                        }
                        Some(Ok(WsMessage::Close(frame))) => {
                            let reason = frame
                                .map(|frame| frame.reason.to_string())
                                .filter(|reason| !reason.is_empty());
                            Self::emit(&event_tx, &conversation_id, LiveEventPayload::Closed { reason });
                            return;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(source)) => {
                            let error = LiveError::Transport {
                                stage: "ws-read-frame",
                                source,
                            };
                            tracing::warn!(
                                conversation_id = %conversation_id,
                                error = %error,
                                "live channel transport failed"
                            );
                            Self::emit_failure(&event_tx, &conversation_id, error);
                            return;
                        }
                        None => {
                            Self::emit(&event_tx, &conversation_id, LiveEventPayload::Closed { reason: None });
                            return;
                        }
                    }
                }
            }
        }
    }
}

impl LiveTransport for WsTransport {
    fn open(&self, conversation_id: ConversationId) -> LiveResult<LiveHandle> {
        let url = self.endpoint_url(&conversation_id);
        let (event_tx, stream, cancel_rx) = make_event_stream(conversation_id.clone());

        tracing::debug!(conversation_id = %conversation_id, url = %url, "opening live channel");
        let worker: LiveWorker = Box::pin(Self::run_worker(url, conversation_id, event_tx, cancel_rx));

        Ok(LiveHandle { stream, worker })
    }
}
