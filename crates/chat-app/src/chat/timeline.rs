use chrono::{DateTime, Utc};
use ragchat_gateway::{ConversationId, Message, MessageId, Role};

/// Identifies one history fetch.
///
/// The generation changes on every seed, so a response keyed to an older seed is rejected even
/// when the same conversation was selected again in between.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeedTicket {
    pub conversation_id: ConversationId,
    pub generation: u64,
}

/// One accepted user submission awaiting its send result and reply.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Submission {
    pub conversation_id: ConversationId,
    /// Provisional id of the optimistic user message.
    pub local_id: MessageId,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitRejected {
    EmptyContent,
    NoActiveConversation,
}

/// Displayed message sequence of the active conversation.
///
/// Every mutation keeps the sequence stably sorted by `created_at` and leaves at most one
/// pending placeholder in it.
#[derive(Debug, Default)]
pub struct Timeline {
    active: Option<ConversationId>,
    generation: u64,
    messages: Vec<Message>,
    /// Local id of the submission that owns the placeholder.
    placeholder_owner: Option<MessageId>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_conversation(&self) -> Option<&ConversationId> {
        self.active.as_ref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn has_pending_placeholder(&self) -> bool {
        self.messages.iter().any(Message::is_pending_placeholder)
    }

    /// Switches to `conversation_id` and clears the sequence.
    pub fn begin_seed(&mut self, conversation_id: ConversationId) -> SeedTicket {
        self.generation = self.generation.saturating_add(1);
        self.active = Some(conversation_id.clone());
        self.messages.clear();
        self.placeholder_owner = None;

        SeedTicket {
            conversation_id,
            generation: self.generation,
        }
    }

    pub fn ticket_is_current(&self, ticket: &SeedTicket) -> bool {
        ticket.generation == self.generation && self.active.as_ref() == Some(&ticket.conversation_id)
    }

    /// Installs fetched history. Returns `false` for a stale ticket.
    ///
    /// Messages added while the fetch was in flight (optimistic entries, live replies) stay in
    /// place; history entries with a known id update them instead of duplicating.
    pub fn install_history(&mut self, ticket: &SeedTicket, history: Vec<Message>) -> bool {
        if !self.ticket_is_current(ticket) {
            tracing::debug!(
                conversation_id = %ticket.conversation_id,
                generation = ticket.generation,
                "discarding stale history"
            );
            return false;
        }

        for message in history {
            if message.conversation_id != ticket.conversation_id {
                tracing::warn!(
                    conversation_id = %ticket.conversation_id,
                    message_id = %message.id,
                    "history message belongs to another conversation"
                );
                continue;
            }
            self.upsert(message);
        }
        self.resort();
        true
    }

    /// Appends the optimistic user message and the pending placeholder.
    ///
    /// Any placeholder left by an earlier submission is replaced.
    pub fn submit(
        &mut self,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<Submission, SubmitRejected> {
        let content = content.trim();
        if content.is_empty() {
            return Err(SubmitRejected::EmptyContent);
        }
        let Some(conversation_id) = self.active.clone() else {
            return Err(SubmitRejected::NoActiveConversation);
        };

        let user_message = Message::optimistic_user(conversation_id.clone(), content, now);
        let local_id = user_message.id.clone();

        self.remove_placeholder();
        self.messages.push(user_message);
        self.messages
            .push(Message::pending_placeholder(conversation_id.clone(), now));
        self.placeholder_owner = Some(local_id.clone());
        self.resort();

        Ok(Submission {
            conversation_id,
            local_id,
            content: content.to_string(),
        })
    }

    /// Applies the message returned by the send call.
    ///
    /// A `user` message replaces the optimistic entry; an `assistant` message is the reply and
    /// clears the placeholder this submission owns.
    pub fn confirm_send(&mut self, submission: &Submission, confirmed: Message) -> bool {
        if !self.is_active(&submission.conversation_id)
            || confirmed.conversation_id != submission.conversation_id
        {
            tracing::debug!(
                conversation_id = %submission.conversation_id,
                message_id = %confirmed.id,
                "ignoring send result for inactive conversation"
            );
            return false;
        }

        match confirmed.role {
            Role::User => {
                let confirmed_at = confirmed.created_at;
                let already_known = self
                    .messages
                    .iter()
                    .any(|message| message.id == confirmed.id);
                let optimistic = self
                    .messages
                    .iter()
                    .position(|message| message.id == submission.local_id);
                match optimistic {
                    Some(index) if !already_known => self.messages[index] = confirmed,
                    Some(index) => {
                        self.messages.remove(index);
                        self.upsert(confirmed);
                    }
                    None => self.upsert(confirmed),
                }
                self.hold_placeholder_after(&submission.local_id, confirmed_at);
            }
            Role::Assistant => {
                self.release_placeholder(&submission.local_id);
                self.upsert(confirmed);
            }
        }
        self.resort();
        true
    }

    /// Send failed: drops the placeholder, keeps the user message.
    pub fn fail_send(&mut self, submission: &Submission) -> bool {
        self.is_active(&submission.conversation_id) && self.release_placeholder(&submission.local_id)
    }

    /// Reply timer fired: drops the placeholder if this submission still owns it.
    pub fn expire_pending(&mut self, submission: &Submission) -> bool {
        self.is_active(&submission.conversation_id) && self.release_placeholder(&submission.local_id)
    }

    /// Applies a pushed message. Messages for other conversations are dropped.
    ///
    /// No placeholder is required; a pushed message is accepted either way.
    pub fn on_live_message(&mut self, message: Message) -> bool {
        if !self.is_active(&message.conversation_id) {
            tracing::debug!(
                conversation_id = %message.conversation_id,
                message_id = %message.id,
                "dropping live message for inactive conversation"
            );
            return false;
        }

        self.remove_placeholder();
        self.upsert(message);
        self.resort();
        true
    }

    fn is_active(&self, conversation_id: &ConversationId) -> bool {
        self.active.as_ref() == Some(conversation_id)
    }

    fn release_placeholder(&mut self, owner: &MessageId) -> bool {
        if self.placeholder_owner.as_ref() != Some(owner) {
            return false;
        }
        self.remove_placeholder()
    }

    /// Keeps the owned placeholder at or after `created_at`.
    fn hold_placeholder_after(&mut self, owner: &MessageId, created_at: DateTime<Utc>) {
        if self.placeholder_owner.as_ref() != Some(owner) {
            return;
        }
        for message in &mut self.messages {
            if message.is_pending_placeholder() && message.created_at < created_at {
                message.created_at = created_at;
            }
        }
    }

    fn remove_placeholder(&mut self) -> bool {
        self.placeholder_owner = None;
        let before = self.messages.len();
        self.messages
            .retain(|message| !message.is_pending_placeholder());
        self.messages.len() != before
    }

    fn upsert(&mut self, message: Message) {
        match self
            .messages
            .iter_mut()
            .find(|existing| existing.id == message.id)
        {
            Some(existing) => *existing = message,
            None => self.messages.push(message),
        }
    }

    fn resort(&mut self) {
        self.messages.sort_by_key(|message| message.created_at);
    }
}
