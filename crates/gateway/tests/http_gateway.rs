use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;

use ragchat_gateway::{
    AuthApi, ContextApi, ContextId, ConversationApi, ConversationId, GatewayError, HttpGateway,
    LoginRequest, MessageApi, NewConversation, NewMessage, Role, Session,
};

const TOKEN: &str = "tok-1";

#[derive(Clone, Default)]
struct Recorded {
    authorization: Arc<Mutex<Vec<Option<String>>>>,
    bodies: Arc<Mutex<Vec<Value>>>,
}

impl Recorded {
    fn record_headers(&self, headers: &HeaderMap) -> Option<String> {
        let value = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        self.authorization.lock().unwrap().push(value.clone());
        value
    }
}

fn user_json() -> Value {
    json!({
        "id": "u-1",
        "name": "Ada",
        "email": "ada@example.com",
        "created_at": "2024-05-01T09:00:00"
    })
}

async fn login(Json(body): Json<Value>) -> Response {
    if body["password"] == "secret" {
        Json(json!({ "user": user_json(), "token": TOKEN })).into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "detail": "Invalid email or password" })),
        )
            .into_response()
    }
}

async fn current_user(State(recorded): State<Recorded>, headers: HeaderMap) -> Response {
    match recorded.record_headers(&headers).as_deref() {
        Some("Bearer tok-1") => Json(user_json()).into_response(),
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "detail": "Could not validate credentials" })),
        )
            .into_response(),
    }
}

async fn contexts() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response()
}

async fn create_conversation(State(recorded): State<Recorded>, Json(body): Json<Value>) -> Response {
    recorded.bodies.lock().unwrap().push(body.clone());
    Json(json!({
        "id": "c-9",
        "title": body["title"],
        "vector_context_id": body["vector_context_id"],
        "collection_name": "docs",
        "description": null,
        "created_at": "2024-05-01T09:30:00"
    }))
    .into_response()
}

async fn list_messages(
    State(recorded): State<Recorded>,
    Path(conversation_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    recorded.record_headers(&headers);
    if conversation_id == "missing" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "detail": "Conversation not found" })),
        )
            .into_response();
    }

    Json(json!([
        {
            "id": "m1",
            "conversation_id": conversation_id,
            "role": "user",
            "content": "hello",
            "created_at": "2024-05-01T10:00:00"
        },
        {
            "id": "m2",
            "conversation_id": conversation_id,
            "role": "assistant",
            "content": "hi there",
            "created_at": "2024-05-01T10:00:01.500000"
        }
    ]))
    .into_response()
}

async fn send_message(
    State(recorded): State<Recorded>,
    Path(conversation_id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    recorded.bodies.lock().unwrap().push(body.clone());
    Json(json!({
        "id": "m3",
        "conversation_id": conversation_id,
        "role": "user",
        "content": body["content"],
        "created_at": "2024-05-01T10:00:02"
    }))
    .into_response()
}

async fn spawn_backend(recorded: Recorded) -> String {
    let app = Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/user", get(current_user))
        .route("/api/vector-contexts", get(contexts))
        .route("/api/conversations", post(create_conversation))
        .route(
            "/api/messages/{conversation_id}",
            get(list_messages).post(send_message),
        )
        .with_state(recorded);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{address}/api")
}

fn login_request(password: &str) -> LoginRequest {
    LoginRequest {
        email: "ada@example.com".to_string(),
        password: password.to_string(),
    }
}

#[tokio::test]
async fn login_stores_token_and_attaches_it_as_bearer() {
    let recorded = Recorded::default();
    let base_url = spawn_backend(recorded.clone()).await;
    let session = Arc::new(Session::in_memory());
    let gateway = HttpGateway::new(&base_url, session.clone()).unwrap();

    let auth = gateway.login(login_request("secret")).await.unwrap();
    assert_eq!(auth.token, TOKEN);
    assert_eq!(session.get().as_deref(), Some(TOKEN));

    let user = gateway.current_user().await.unwrap();
    assert_eq!(user.name, "Ada");
    assert_eq!(
        recorded.authorization.lock().unwrap().last().cloned().flatten(),
        Some("Bearer tok-1".to_string())
    );

    gateway.logout();
    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn rejected_login_surfaces_server_detail_and_leaves_session_empty() {
    let base_url = spawn_backend(Recorded::default()).await;
    let session = Arc::new(Session::in_memory());
    let gateway = HttpGateway::new(&base_url, session.clone()).unwrap();

    let error = gateway.login(login_request("wrong")).await.unwrap_err();
    assert!(error.is_auth_failure());
    assert_eq!(error.to_string(), "Invalid email or password");
    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn requests_without_token_carry_no_authorization_header() {
    let recorded = Recorded::default();
    let base_url = spawn_backend(recorded.clone()).await;
    let gateway = HttpGateway::new(&base_url, Arc::new(Session::in_memory())).unwrap();

    let error = gateway.current_user().await.unwrap_err();
    assert!(matches!(error, GatewayError::Unauthorized { status: 401, .. }));
    assert_eq!(recorded.authorization.lock().unwrap().as_slice(), &[None]);
}

#[tokio::test]
async fn list_messages_decodes_history() {
    let base_url = spawn_backend(Recorded::default()).await;
    let gateway = HttpGateway::new(&base_url, Arc::new(Session::in_memory())).unwrap();

    let messages = gateway
        .list_messages(ConversationId::new("c-1"))
        .await
        .unwrap();

    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[1].content, "hi there");
    assert!(messages[0].created_at < messages[1].created_at);
}

#[tokio::test]
async fn non_success_status_maps_to_request_failure() {
    let base_url = spawn_backend(Recorded::default()).await;
    let gateway = HttpGateway::new(&base_url, Arc::new(Session::in_memory())).unwrap();

    let error = gateway
        .list_messages(ConversationId::new("missing"))
        .await
        .unwrap_err();
    assert_eq!(error.status(), Some(404));
    assert_eq!(error.to_string(), "Conversation not found");

    let error = gateway.list_contexts().await.unwrap_err();
    assert!(matches!(error, GatewayError::Request { status: 500, .. }));
    assert_eq!(error.to_string(), "API request failed with status 500");
}

#[tokio::test]
async fn send_and_create_post_expected_bodies() {
    let recorded = Recorded::default();
    let base_url = spawn_backend(recorded.clone()).await;
    let gateway = HttpGateway::new(&base_url, Arc::new(Session::in_memory())).unwrap();

    let conversation = gateway
        .create_conversation(NewConversation {
            title: "Docs chat".to_string(),
            vector_context_id: ContextId::new("ctx-1"),
        })
        .await
        .unwrap();
    assert_eq!(conversation.id, ConversationId::new("c-9"));
    assert_eq!(conversation.description, "");

    let confirmed = gateway
        .send_message(NewMessage {
            conversation_id: ConversationId::new("c-9"),
            content: "what is new?".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(confirmed.content, "what is new?");

    let bodies = recorded.bodies.lock().unwrap();
    assert_eq!(
        bodies[0],
        json!({ "title": "Docs chat", "vector_context_id": "ctx-1" })
    );
    assert_eq!(
        bodies[1],
        json!({ "conversation_id": "c-9", "content": "what is new?" })
    );
}
