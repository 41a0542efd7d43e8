use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ragchat_gateway::{ConversationId, Gateway, GatewayError, GatewayResult, Message, NewMessage};
use ragchat_live::{LiveChannel, LiveChannelState, LiveEvent, LiveEventPayload, LiveTransport};
use snafu::ResultExt;
use tokio::sync::mpsc;

use super::events::{ChatUpdate, Notice};
use super::timeline::{SeedTicket, Submission, Timeline};
use crate::error::{ChatResult, OpenLiveChannelSnafu};

/// Result of one background operation, applied on the controller's loop.
#[derive(Debug)]
enum Completion {
    History {
        ticket: SeedTicket,
        result: GatewayResult<Vec<Message>>,
    },
    Sent {
        submission: Submission,
        result: GatewayResult<Message>,
    },
    ReplyDeadline {
        submission: Submission,
    },
}

#[derive(Debug, Default)]
struct Applied {
    changed: bool,
    notice: Option<Notice>,
}

impl Applied {
    fn changed(changed: bool) -> Self {
        Self {
            changed,
            notice: None,
        }
    }

    fn notice(changed: bool, notice: Notice) -> Self {
        Self {
            changed,
            notice: Some(notice),
        }
    }

    fn is_noop(&self) -> bool {
        !self.changed && self.notice.is_none()
    }
}

/// Drives the timeline for the selected conversation.
///
/// Network calls and timers run on spawned tasks and report back through one queue; live events
/// arrive through the channel. Both are applied one at a time by [`ChatController::next_update`],
/// so timeline mutations happen in delivery order.
pub struct ChatController {
    gateway: Arc<dyn Gateway>,
    live: LiveChannel,
    timeline: Timeline,
    reply_timeout: Option<Duration>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
}

impl ChatController {
    /// `reply_timeout` of `None` leaves the placeholder up until a reply or failure.
    pub fn new(
        gateway: Arc<dyn Gateway>,
        transport: Arc<dyn LiveTransport>,
        reply_timeout: Option<Duration>,
    ) -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        Self {
            gateway,
            live: LiveChannel::new(transport),
            timeline: Timeline::new(),
            reply_timeout,
            completion_tx,
            completion_rx,
        }
    }

    pub fn active_conversation(&self) -> Option<&ConversationId> {
        self.timeline.active_conversation()
    }

    pub fn messages(&self) -> &[Message] {
        self.timeline.messages()
    }

    pub fn live_state(&self) -> &LiveChannelState {
        self.live.state()
    }

    /// Seeds the timeline, fetches history and reopens the live channel for `conversation_id`.
    pub fn select_conversation(&mut self, conversation_id: ConversationId) -> ChatResult<()> {
        let ticket = self.timeline.begin_seed(conversation_id.clone());
        tracing::info!(
            conversation_id = %conversation_id,
            generation = ticket.generation,
            "selected conversation"
        );

        let gateway = Arc::clone(&self.gateway);
        let completion_tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let result = gateway.list_messages(ticket.conversation_id.clone()).await;
            let _ = completion_tx.send(Completion::History { ticket, result });
        });

        self.live
            .switch_to(conversation_id.clone())
            .context(OpenLiveChannelSnafu {
                stage: "switch-live-channel",
                conversation_id,
            })
    }

    /// Submits `content` to the active conversation.
    ///
    /// Returns `false` when the content is blank or no conversation is selected; nothing is sent
    /// in that case.
    pub fn submit(&mut self, content: &str) -> bool {
        let submission = match self.timeline.submit(content, Utc::now()) {
            Ok(submission) => submission,
            Err(rejection) => {
                tracing::debug!(?rejection, "submission rejected");
                return false;
            }
        };

        tracing::debug!(
            conversation_id = %submission.conversation_id,
            local_id = %submission.local_id,
            "sending message"
        );

        let gateway = Arc::clone(&self.gateway);
        let completion_tx = self.completion_tx.clone();
        let request = NewMessage {
            conversation_id: submission.conversation_id.clone(),
            content: submission.content.clone(),
        };
        let sent = submission.clone();
        tokio::spawn(async move {
            let result = gateway.send_message(request).await;
            let _ = completion_tx.send(Completion::Sent {
                submission: sent,
                result,
            });
        });

        if let Some(reply_timeout) = self.reply_timeout {
            let completion_tx = self.completion_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(reply_timeout).await;
                let _ = completion_tx.send(Completion::ReplyDeadline { submission });
            });
        }

        true
    }

    /// Closes the live channel. The timeline keeps its messages.
    pub fn close(&mut self) {
        self.live.close();
    }

    /// Waits for the next event that changes the timeline or carries a notice, and applies it.
    pub async fn next_update(&mut self) -> ChatUpdate {
        loop {
            let applied = tokio::select! {
                Some(completion) = self.completion_rx.recv() => self.apply_completion(completion),
                Some(event) = self.live.recv() => self.apply_live_event(event),
            };

            if applied.is_noop() {
                continue;
            }

            return ChatUpdate {
                conversation_id: self.timeline.active_conversation().cloned(),
                messages: self.timeline.messages().to_vec(),
                notice: applied.notice,
            };
        }
    }

    fn apply_completion(&mut self, completion: Completion) -> Applied {
        match completion {
            Completion::History { ticket, result } => {
                if !self.timeline.ticket_is_current(&ticket) {
                    tracing::debug!(
                        conversation_id = %ticket.conversation_id,
                        generation = ticket.generation,
                        "dropping stale history result"
                    );
                    return Applied::default();
                }

                match result {
                    Ok(history) => Applied::changed(self.timeline.install_history(&ticket, history)),
                    Err(error) => {
                        tracing::warn!(
                            conversation_id = %ticket.conversation_id,
                            error = %error,
                            "failed to load history"
                        );
                        let notice = failure_notice(&error, |message| Notice::HistoryFailed {
                            conversation_id: ticket.conversation_id.clone(),
                            message,
                        });
                        Applied::notice(false, notice)
                    }
                }
            }
            Completion::Sent { submission, result } => match result {
                Ok(confirmed) => Applied::changed(self.timeline.confirm_send(&submission, confirmed)),
                Err(error) => {
                    tracing::warn!(
                        conversation_id = %submission.conversation_id,
                        error = %error,
                        "failed to send message"
                    );
                    let changed = self.timeline.fail_send(&submission);
                    if self.timeline.active_conversation() != Some(&submission.conversation_id) {
                        return Applied::changed(changed);
                    }
                    let notice = failure_notice(&error, |message| Notice::SendFailed {
                        conversation_id: submission.conversation_id.clone(),
                        message,
                    });
                    Applied::notice(changed, notice)
                }
            },
            Completion::ReplyDeadline { submission } => {
                if !self.timeline.expire_pending(&submission) {
                    return Applied::default();
                }
                tracing::warn!(
                    conversation_id = %submission.conversation_id,
                    local_id = %submission.local_id,
                    "no reply before deadline"
                );
                Applied::notice(
                    true,
                    Notice::ReplyTimedOut {
                        conversation_id: submission.conversation_id,
                    },
                )
            }
        }
    }

    fn apply_live_event(&mut self, event: LiveEvent) -> Applied {
        if self.timeline.active_conversation() != Some(&event.conversation_id) {
            return Applied::default();
        }

        match event.payload {
            LiveEventPayload::Connected => Applied::default(),
            LiveEventPayload::Message(message) => {
                Applied::changed(self.timeline.on_live_message(message))
            }
            LiveEventPayload::Closed { reason } => Applied::notice(
                false,
                Notice::ChannelClosed {
                    conversation_id: event.conversation_id,
                    reason,
                },
            ),
            LiveEventPayload::Error(message) => Applied::notice(
                false,
                Notice::ChannelError {
                    conversation_id: event.conversation_id,
                    message,
                },
            ),
        }
    }
}

fn failure_notice(error: &GatewayError, notice: impl FnOnce(String) -> Notice) -> Notice {
    if error.is_auth_failure() {
        return Notice::Unauthorized {
            message: error.to_string(),
        };
    }
    notice(error.to_string())
}
