//! Receive-only live update channel: one socket per selected conversation.

mod channel;
mod state;
mod ws_adapter;

pub use channel::{
    LiveError, LiveEvent, LiveEventPayload, LiveEventStream, LiveHandle, LiveResult,
    LiveTransport, LiveWorker, make_event_stream,
};
pub use state::{
    LiveChannel, LiveChannelState, LiveTransition, LiveTransitionRejection, LiveTransitionResult,
};
pub use ws_adapter::{DEFAULT_LIVE_BASE_URL, WsTransport};
