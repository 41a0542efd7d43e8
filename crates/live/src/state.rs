use std::sync::Arc;

use ragchat_gateway::ConversationId;

use super::channel::{LiveEvent, LiveEventPayload, LiveEventStream, LiveResult, LiveTransport};

/// Connection lifecycle of the live channel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LiveChannelState {
    #[default]
    Closed,
    Connecting(ConversationId),
    Open(ConversationId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveTransition {
    Connect(ConversationId),
    Opened(ConversationId),
    Closed(ConversationId),
    Teardown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveTransitionRejection {
    AlreadyActive {
        active: ConversationId,
        attempted: ConversationId,
    },
    NotConnecting,
    NoActiveLink,
    ConversationMismatch {
        active: ConversationId,
        attempted: ConversationId,
    },
}

pub type LiveTransitionResult = Result<LiveChannelState, LiveTransitionRejection>;

impl LiveChannelState {
    pub fn conversation_id(&self) -> Option<&ConversationId> {
        match self {
            Self::Closed => None,
            Self::Connecting(id) | Self::Open(id) => Some(id),
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open(_))
    }

    /// Applies one transition deterministically.
    ///
    /// There is no `Closed -> Connecting` self-transition: a new link only starts from an
    /// explicit `Connect`, and events from a link that is no longer current are rejected.
    pub fn apply(&self, transition: LiveTransition) -> LiveTransitionResult {
        match transition {
            LiveTransition::Connect(target) => self.apply_connect(target),
            LiveTransition::Opened(target) => self.apply_opened(target),
            LiveTransition::Closed(target) => self.apply_closed(target),
            LiveTransition::Teardown => Ok(Self::Closed),
        }
    }

    fn apply_connect(&self, target: ConversationId) -> LiveTransitionResult {
        match self {
            Self::Closed => Ok(Self::Connecting(target)),
            Self::Connecting(active) | Self::Open(active) => {
                Err(LiveTransitionRejection::AlreadyActive {
                    active: active.clone(),
                    attempted: target,
                })
            }
        }
    }

    fn apply_opened(&self, target: ConversationId) -> LiveTransitionResult {
        match self {
            Self::Connecting(active) if *active == target => Ok(Self::Open(target)),
            Self::Connecting(active) => Err(LiveTransitionRejection::ConversationMismatch {
                active: active.clone(),
                attempted: target,
            }),
            Self::Closed | Self::Open(_) => Err(LiveTransitionRejection::NotConnecting),
        }
    }

    fn apply_closed(&self, target: ConversationId) -> LiveTransitionResult {
        match self {
            Self::Connecting(active) | Self::Open(active) if *active == target => Ok(Self::Closed),
            Self::Connecting(active) | Self::Open(active) => {
                Err(LiveTransitionRejection::ConversationMismatch {
                    active: active.clone(),
                    attempted: target,
                })
            }
            Self::Closed => Err(LiveTransitionRejection::NoActiveLink),
        }
    }
}

/// Holds at most one live link, keyed by the selected conversation.
pub struct LiveChannel {
    transport: Arc<dyn LiveTransport>,
    state: LiveChannelState,
    stream: Option<LiveEventStream>,
}

impl LiveChannel {
    pub fn new(transport: Arc<dyn LiveTransport>) -> Self {
        Self {
            transport,
            state: LiveChannelState::Closed,
            stream: None,
        }
    }

    pub fn state(&self) -> &LiveChannelState {
        &self.state
    }

    /// Closes the current link, if any, then opens one for `conversation_id`.
    pub fn switch_to(&mut self, conversation_id: ConversationId) -> LiveResult<()> {
        self.close();
        self.transition(LiveTransition::Connect(conversation_id.clone()));

        let handle = match self.transport.open(conversation_id.clone()) {
            Ok(handle) => handle,
            Err(error) => {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    error = %error,
                    "failed to open live channel"
                );
                self.transition(LiveTransition::Closed(conversation_id));
                return Err(error);
            }
        };

        tokio::spawn(handle.worker);
        self.stream = Some(handle.stream);
        Ok(())
    }

    /// Drops the current link; the worker closes its socket on cancellation.
    pub fn close(&mut self) {
        let Some(stream) = self.stream.take() else {
            return;
        };

        tracing::debug!(conversation_id = %stream.conversation_id(), "closing live channel");
        self.transition(LiveTransition::Closed(stream.conversation_id().clone()));
    }

    /// Next event from the current link.
    ///
    /// Returns `None` when no link is active or the link just ended.
    pub async fn recv(&mut self) -> Option<LiveEvent> {
        let stream = self.stream.as_mut()?;

        match stream.recv().await {
            Some(event) => {
                self.observe(&event);
                Some(event)
            }
            None => {
                if let Some(stream) = self.stream.take() {
                    self.transition(LiveTransition::Closed(stream.conversation_id().clone()));
                }
                None
            }
        }
    }

    fn observe(&mut self, event: &LiveEvent) {
        match &event.payload {
            LiveEventPayload::Connected => {
                self.transition(LiveTransition::Opened(event.conversation_id.clone()));
            }
            LiveEventPayload::Closed { reason } => {
                tracing::info!(
                    conversation_id = %event.conversation_id,
                    reason = reason.as_deref().unwrap_or(""),
                    "live channel closed"
                );
                if self.state.conversation_id() == Some(&event.conversation_id) {
                    self.stream = None;
                }
                self.transition(LiveTransition::Closed(event.conversation_id.clone()));
            }
            LiveEventPayload::Error(message) => {
                // The link reaches Closed through its own close event.
                tracing::warn!(
                    conversation_id = %event.conversation_id,
                    error = %message,
                    "live channel transport error"
                );
            }
            LiveEventPayload::Message(_) => {}
        }
    }

    fn transition(&mut self, transition: LiveTransition) {
        match self.state.apply(transition) {
            Ok(next_state) => self.state = next_state,
            Err(rejection) => {
                tracing::debug!(?rejection, state = ?self.state, "ignored live channel transition");
            }
        }
    }
}

impl Drop for LiveChannel {
    fn drop(&mut self) {
        self.stream = None;
        self.transition(LiveTransition::Teardown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> ConversationId {
        ConversationId::new(raw)
    }

    #[test]
    fn happy_path_walks_closed_connecting_open_closed() {
        let state = LiveChannelState::Closed;
        let state = state.apply(LiveTransition::Connect(id("a"))).unwrap();
        assert_eq!(state, LiveChannelState::Connecting(id("a")));

        let state = state.apply(LiveTransition::Opened(id("a"))).unwrap();
        assert!(state.is_open());

        let state = state.apply(LiveTransition::Closed(id("a"))).unwrap();
        assert_eq!(state, LiveChannelState::Closed);
    }

    #[test]
    fn connect_requires_closed_state() {
        let state = LiveChannelState::Open(id("a"));
        assert_eq!(
            state.apply(LiveTransition::Connect(id("b"))),
            Err(LiveTransitionRejection::AlreadyActive {
                active: id("a"),
                attempted: id("b"),
            })
        );
    }

    #[test]
    fn stale_link_events_are_rejected() {
        let state = LiveChannelState::Connecting(id("b"));
        assert!(matches!(
            state.apply(LiveTransition::Opened(id("a"))),
            Err(LiveTransitionRejection::ConversationMismatch { .. })
        ));
        assert!(matches!(
            state.apply(LiveTransition::Closed(id("a"))),
            Err(LiveTransitionRejection::ConversationMismatch { .. })
        ));
    }

    #[test]
    fn closed_state_never_reopens_on_its_own() {
        let state = LiveChannelState::Closed;
        assert_eq!(
            state.apply(LiveTransition::Opened(id("a"))),
            Err(LiveTransitionRejection::NotConnecting)
        );
        assert_eq!(
            state.apply(LiveTransition::Closed(id("a"))),
            Err(LiveTransitionRejection::NoActiveLink)
        );
    }

    #[test]
    fn teardown_closes_from_any_state() {
        for state in [
            LiveChannelState::Closed,
            LiveChannelState::Connecting(id("a")),
            LiveChannelState::Open(id("a")),
        ] {
            assert_eq!(
                state.apply(LiveTransition::Teardown),
                Ok(LiveChannelState::Closed)
            );
        }
    }
}
