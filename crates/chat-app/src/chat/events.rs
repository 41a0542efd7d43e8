use ragchat_gateway::{ConversationId, Message};

/// Something the presentation layer should tell the user about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    HistoryFailed {
        conversation_id: ConversationId,
        message: String,
    },
    SendFailed {
        conversation_id: ConversationId,
        message: String,
    },
    /// No reply arrived within the configured window; the placeholder was cleared.
    ReplyTimedOut { conversation_id: ConversationId },
    ChannelClosed {
        conversation_id: ConversationId,
        reason: Option<String>,
    },
    ChannelError {
        conversation_id: ConversationId,
        message: String,
    },
    /// The backend rejected the session token.
    Unauthorized { message: String },
}

/// Emitted after the controller applies one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatUpdate {
    pub conversation_id: Option<ConversationId>,
    pub messages: Vec<Message>,
    pub notice: Option<Notice>,
}

impl ChatUpdate {
    pub fn has_pending_placeholder(&self) -> bool {
        self.messages.iter().any(Message::is_pending_placeholder)
    }
}
