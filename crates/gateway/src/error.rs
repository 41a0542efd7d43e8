use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum GatewayError {
    #[snafu(display("'{raw}' is not a valid {id_type}"))]
    InvalidId {
        stage: &'static str,
        id_type: &'static str,
        raw: String,
    },
    #[snafu(display("invalid backend base URL '{raw}': {source}"))]
    InvalidBaseUrl {
        stage: &'static str,
        raw: String,
        source: url::ParseError,
    },
    #[snafu(display("backend base URL '{raw}' cannot carry endpoint paths"))]
    UnsupportedBaseUrl { stage: &'static str, raw: String },
    #[snafu(display("failed to build HTTP client on `{stage}`: {source}"))]
    BuildClient {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("request to '{endpoint}' failed on `{stage}`: {source}"))]
    Transport {
        stage: &'static str,
        endpoint: String,
        source: reqwest::Error,
    },
    #[snafu(display("{message}"))]
    Unauthorized {
        stage: &'static str,
        status: u16,
        message: String,
    },
    #[snafu(display("{message}"))]
    Request {
        stage: &'static str,
        status: u16,
        message: String,
    },
    #[snafu(display("failed to decode response from '{endpoint}' on `{stage}`: {source}"))]
    Decode {
        stage: &'static str,
        endpoint: String,
        source: reqwest::Error,
    },
}

impl GatewayError {
    /// True when the backend rejected the session credential.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { status, .. } | Self::Request { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
