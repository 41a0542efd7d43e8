use ragchat_gateway::{ConversationId, GatewayError};
use ragchat_live::LiveError;
use snafu::Snafu;

use crate::settings::SettingsError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ChatError {
    #[snafu(display("failed to open live channel for {conversation_id} on `{stage}`: {source}"))]
    OpenLiveChannel {
        stage: &'static str,
        conversation_id: ConversationId,
        source: LiveError,
    },
    #[snafu(display("failed to configure live channel on `{stage}`: {source}"))]
    ConfigureLive {
        stage: &'static str,
        source: LiveError,
    },
    #[snafu(display("{source}"))]
    Gateway {
        stage: &'static str,
        source: GatewayError,
    },
    #[snafu(display("failed to update settings on `{stage}`: {source}"))]
    Settings {
        stage: &'static str,
        source: SettingsError,
    },
    #[snafu(display("not logged in; run `ragchat login` first"))]
    NotAuthenticated { stage: &'static str },
    #[snafu(display("failed on terminal I/O on `{stage}`: {source}"))]
    Terminal {
        stage: &'static str,
        source: std::io::Error,
    },
}

pub type ChatResult<T> = Result<T, ChatError>;
