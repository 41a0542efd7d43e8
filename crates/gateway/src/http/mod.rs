use std::sync::Arc;

use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use snafu::{ResultExt, ensure};
use url::Url;

use super::error::{
    BuildClientSnafu, DecodeSnafu, GatewayResult, InvalidBaseUrlSnafu, RequestSnafu,
    TransportSnafu, UnauthorizedSnafu, UnsupportedBaseUrlSnafu,
};
use super::ids::ConversationId;
use super::session::Session;
use super::types::{
    AuthResponse, Context, Conversation, LoginRequest, Message, NewConversation, NewMessage,
    RegisterRequest, User,
};
use super::{AuthApi, BoxFuture, ContextApi, ConversationApi, MessageApi};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";

/// Backend gateway over the REST API. One round trip per call; no retries, no caching.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: Url,
    session: Arc<Session>,
}

impl HttpGateway {
    pub fn new(base_url: &str, session: Arc<Session>) -> GatewayResult<Self> {
        let client = Client::builder().build().context(BuildClientSnafu {
            stage: "http-gateway-new",
        })?;
        Self::with_client(client, base_url, session)
    }

    pub fn with_client(
        client: Client,
        base_url: &str,
        session: Arc<Session>,
    ) -> GatewayResult<Self> {
        let parsed = Url::parse(base_url.trim()).context(InvalidBaseUrlSnafu {
            stage: "http-gateway-parse-base-url",
            raw: base_url.to_string(),
        })?;
        ensure!(
            !parsed.cannot_be_a_base(),
            UnsupportedBaseUrlSnafu {
                stage: "http-gateway-check-base-url",
                raw: base_url.to_string(),
            }
        );

        Ok(Self {
            client,
            base_url: parsed,
            session,
        })
    }

    pub(crate) fn endpoint_url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Checked at construction: the base can always carry path segments.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get<T>(&self, segments: &[&str], stage: &'static str) -> GatewayResult<T>
    where
        T: DeserializeOwned,
    {
        self.send::<T, ()>(Method::GET, segments, None, stage).await
    }

    async fn post<T, B>(&self, segments: &[&str], body: &B, stage: &'static str) -> GatewayResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send(Method::POST, segments, Some(body), stage).await
    }

    async fn send<T, B>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&B>,
        stage: &'static str,
    ) -> GatewayResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = self.endpoint_url(segments);
        let endpoint = url.path().to_string();

        let mut request = self.client.request(method.clone(), url);
        if let Some(token) = self.session.get() {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        tracing::debug!(%method, endpoint = %endpoint, "sending backend request");

        let response = request.send().await.context(TransportSnafu {
            stage,
            endpoint: endpoint.clone(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            let message = failure_message(status, &body);

            tracing::warn!(
                %method,
                endpoint = %endpoint,
                status = status.as_u16(),
                error = %message,
                "backend request failed"
            );

            if status == StatusCode::UNAUTHORIZED {
                return UnauthorizedSnafu {
                    stage,
                    status: status.as_u16(),
                    message,
                }
                .fail();
            }

            return RequestSnafu {
                stage,
                status: status.as_u16(),
                message,
            }
            .fail();
        }

        response
            .json::<T>()
            .await
            .context(DecodeSnafu { stage, endpoint })
    }
}

/// Human-readable reason for a failed call.
///
/// Prefers the server's `message`, then its `detail`, then a status-derived fallback.
pub(crate) fn failure_message(status: StatusCode, body: &[u8]) -> String {
    let parsed = serde_json::from_slice::<serde_json::Value>(body).ok();
    let server_message = parsed.as_ref().and_then(|payload| {
        ["message", "detail"].iter().find_map(|field| {
            payload
                .get(field)
                .and_then(serde_json::Value::as_str)
                .map(str::trim)
                .filter(|text| !text.is_empty())
        })
    });

    match server_message {
        Some(message) => message.to_string(),
        None => format!("API request failed with status {}", status.as_u16()),
    }
}

impl AuthApi for HttpGateway {
    fn register<'a>(&'a self, request: RegisterRequest) -> BoxFuture<'a, GatewayResult<AuthResponse>> {
        Box::pin(async move {
            let response: AuthResponse = self
                .post(&["auth", "register"], &request, "auth-register")
                .await?;
            self.session.set(response.token.clone());
            tracing::info!(user_id = %response.user.id, "registered and signed in");
            Ok(response)
        })
    }

    fn login<'a>(&'a self, request: LoginRequest) -> BoxFuture<'a, GatewayResult<AuthResponse>> {
        Box::pin(async move {
            let response: AuthResponse = self.post(&["auth", "login"], &request, "auth-login").await?;
            self.session.set(response.token.clone());
            tracing::info!(user_id = %response.user.id, "signed in");
            Ok(response)
        })
    }

    fn logout(&self) {
        self.session.clear();
        tracing::info!("signed out");
    }

    fn current_user<'a>(&'a self) -> BoxFuture<'a, GatewayResult<User>> {
        Box::pin(self.get::<User>(&["auth", "user"], "auth-current-user"))
    }
}

impl ContextApi for HttpGateway {
    fn list_contexts<'a>(&'a self) -> BoxFuture<'a, GatewayResult<Vec<Context>>> {
        Box::pin(self.get::<Vec<Context>>(&["vector-contexts"], "list-contexts"))
    }
}

impl ConversationApi for HttpGateway {
    fn list_conversations<'a>(&'a self) -> BoxFuture<'a, GatewayResult<Vec<Conversation>>> {
        Box::pin(self.get::<Vec<Conversation>>(&["conversations"], "list-conversations"))
    }

    fn create_conversation<'a>(
        &'a self,
        request: NewConversation,
    ) -> BoxFuture<'a, GatewayResult<Conversation>> {
        Box::pin(async move {
            self.post::<Conversation, _>(&["conversations"], &request, "create-conversation")
                .await
        })
    }
}

impl MessageApi for HttpGateway {
    fn list_messages<'a>(
        &'a self,
        conversation_id: ConversationId,
    ) -> BoxFuture<'a, GatewayResult<Vec<Message>>> {
        Box::pin(async move {
            self.get::<Vec<Message>>(&["messages", conversation_id.as_str()], "list-messages")
                .await
        })
    }

    fn send_message<'a>(&'a self, request: NewMessage) -> BoxFuture<'a, GatewayResult<Message>> {
        Box::pin(async move {
            self.post::<Message, _>(
                &["messages", request.conversation_id.as_str()],
                &request,
                "send-message",
            )
            .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway(base_url: &str) -> HttpGateway {
        HttpGateway::new(base_url, Arc::new(Session::in_memory())).expect("gateway")
    }

    #[test]
    fn endpoints_join_under_base_path_with_or_without_trailing_slash() {
        for base in ["http://localhost:8000/api", "http://localhost:8000/api/"] {
            let url = gateway(base).endpoint_url(&["messages", "c-1"]);
            assert_eq!(url.as_str(), "http://localhost:8000/api/messages/c-1");
        }
    }

    #[test]
    fn base_url_must_be_hierarchical() {
        let session = Arc::new(Session::in_memory());
        assert!(HttpGateway::new("not a url", session.clone()).is_err());
        assert!(HttpGateway::new("mailto:someone@example.com", session).is_err());
    }

    #[test]
    fn failure_message_prefers_message_then_detail_then_status() {
        assert_eq!(
            failure_message(StatusCode::BAD_REQUEST, br#"{"message":"nope","detail":"x"}"#),
            "nope"
        );
        assert_eq!(
            failure_message(StatusCode::NOT_FOUND, br#"{"detail":"Conversation not found"}"#),
            "Conversation not found"
        );
        assert_eq!(
            failure_message(StatusCode::UNPROCESSABLE_ENTITY, br#"{"detail":[{"loc":["body"]}]}"#),
            "API request failed with status 422"
        );
        assert_eq!(
            failure_message(StatusCode::BAD_GATEWAY, b"<html>upstream</html>"),
            "API request failed with status 502"
        );
    }
}
