use std::fmt::Write as _;

use ragchat_gateway::{Message, Role};

use super::events::Notice;

pub const THINKING_LABEL: &str = "Thinking...";

pub fn render_message(message: &Message) -> String {
    let speaker = match message.role {
        Role::User => "you",
        Role::Assistant => "assistant",
    };

    if message.is_pending_placeholder() {
        return format!("[{speaker}] {THINKING_LABEL}");
    }

    let timestamp = message.created_at.format("%H:%M");
    format!("[{timestamp}] [{speaker}] {}", message.content)
}

pub fn render_transcript(messages: &[Message]) -> String {
    let mut rendered = String::new();
    for message in messages {
        let _ = writeln!(rendered, "{}", render_message(message));
    }
    rendered
}

pub fn render_notice(notice: &Notice) -> String {
    match notice {
        Notice::HistoryFailed { message, .. } => format!("! could not load messages: {message}"),
        Notice::SendFailed { message, .. } => format!("! message not sent: {message}"),
        Notice::ReplyTimedOut { .. } => "! no reply yet; the assistant may still answer later".to_string(),
        Notice::ChannelClosed { reason: Some(reason), .. } => {
            format!("! live updates stopped ({reason}); reopen the chat to reconnect")
        }
        Notice::ChannelClosed { reason: None, .. } => {
            "! live updates stopped; reopen the chat to reconnect".to_string()
        }
        Notice::ChannelError { message, .. } => format!("! live update error: {message}"),
        Notice::Unauthorized { message } => {
            format!("! {message}; run `ragchat login` to sign in again")
        }
    }
}
