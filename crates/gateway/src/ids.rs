use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use snafu::ensure;
use uuid::Uuid;

use super::error::{GatewayError, GatewayResult, InvalidIdSnafu};

/// Reserved identity of the client-side "assistant is replying" placeholder.
pub const PENDING_PLACEHOLDER_ID: &str = "pending";

const LOCAL_ID_PREFIX: &str = "local-";

// Macro keeps all ID wrappers structurally identical, so wire changes stay predictable.
macro_rules! define_wire_id {
    ($name:ident, $id_type:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            pub fn parse(raw: &str) -> GatewayResult<Self> {
                let trimmed = raw.trim();
                ensure!(
                    !trimmed.is_empty() && !trimmed.contains('/'),
                    InvalidIdSnafu {
                        stage: "parse-wire-id",
                        id_type: $id_type,
                        raw: raw.to_string(),
                    }
                );
                Ok(Self(trimmed.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = GatewayError;

            fn from_str(raw: &str) -> GatewayResult<Self> {
                Self::parse(raw)
            }
        }
    };
}

define_wire_id!(ConversationId, "conversation-id");
define_wire_id!(MessageId, "message-id");
define_wire_id!(ContextId, "context-id");
define_wire_id!(UserId, "user-id");

impl MessageId {
    pub fn pending_placeholder() -> Self {
        Self::new(PENDING_PLACEHOLDER_ID)
    }

    /// Provisional identity for a message the backend has not confirmed yet.
    ///
    /// Server identities are bare UUIDs, so the prefix keeps the two spaces disjoint.
    pub fn new_local() -> Self {
        Self(format!("{LOCAL_ID_PREFIX}{}", Uuid::new_v4()))
    }

    pub fn is_pending_placeholder(&self) -> bool {
        self.0 == PENDING_PLACEHOLDER_ID
    }

    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_ID_PREFIX)
    }
}
