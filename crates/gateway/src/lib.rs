use std::future::Future;
use std::pin::Pin;

pub mod error;
pub mod http;
pub mod ids;
pub mod session;
pub mod types;

pub use error::{GatewayError, GatewayResult};
pub use http::{DEFAULT_API_BASE_URL, HttpGateway};
pub use ids::{ContextId, ConversationId, MessageId, PENDING_PLACEHOLDER_ID, UserId};
pub use session::{Session, SessionError, TokenFile};
pub use types::{
    AuthResponse, Context, Conversation, LoginRequest, Message, NewConversation, NewMessage,
    PENDING_PLACEHOLDER_CONTENT, RegisterRequest, Role, User,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Credential flows. Successful register/login store the token in the session.
pub trait AuthApi: Send + Sync {
    fn register<'a>(&'a self, request: RegisterRequest) -> BoxFuture<'a, GatewayResult<AuthResponse>>;
    fn login<'a>(&'a self, request: LoginRequest) -> BoxFuture<'a, GatewayResult<AuthResponse>>;
    /// Local only: clears the session without a network call.
    fn logout(&self);
    fn current_user<'a>(&'a self) -> BoxFuture<'a, GatewayResult<User>>;
}

pub trait ContextApi: Send + Sync {
    fn list_contexts<'a>(&'a self) -> BoxFuture<'a, GatewayResult<Vec<Context>>>;
}

pub trait ConversationApi: Send + Sync {
    fn list_conversations<'a>(&'a self) -> BoxFuture<'a, GatewayResult<Vec<Conversation>>>;
    fn create_conversation<'a>(
        &'a self,
        request: NewConversation,
    ) -> BoxFuture<'a, GatewayResult<Conversation>>;
}

pub trait MessageApi: Send + Sync {
    fn list_messages<'a>(
        &'a self,
        conversation_id: ConversationId,
    ) -> BoxFuture<'a, GatewayResult<Vec<Message>>>;
    fn send_message<'a>(&'a self, request: NewMessage) -> BoxFuture<'a, GatewayResult<Message>>;
}

pub trait Gateway: AuthApi + ContextApi + ConversationApi + MessageApi {}

impl<T> Gateway for T where T: AuthApi + ContextApi + ConversationApi + MessageApi {}
