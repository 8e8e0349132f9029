//! In-process stand-in for the KCD backend.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{
        Multipart, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use kcd_client::config::{
    ApiConfig, AppConfig, ChatConfig, DemoConfig, ResolveMode, SessionConfig, StartupVariant,
};
use kcd_client::{Controller, MemoryStore};

pub struct TestUser {
    pub id: u64,
    pub email: &'static str,
    pub password: &'static str,
    pub full_name: &'static str,
    pub role: &'static str,
    pub tier: &'static str,
}

pub static USERS: [TestUser; 3] = [
    TestUser {
        id: 5,
        email: "premium@kcd-agency.com",
        password: "premium123",
        full_name: "Premium User",
        role: "user",
        tier: "premium",
    },
    TestUser {
        id: 6,
        email: "free@kcd-agency.com",
        password: "free123",
        full_name: "Free Tier User",
        role: "user",
        tier: "free",
    },
    TestUser {
        id: 3,
        email: "moderator@kcd-agency.com",
        password: "mod123",
        full_name: "Moderator User",
        role: "moderator",
        tier: "free",
    },
];

fn user_json(user: &TestUser) -> Value {
    json!({
        "id": user.id,
        "email": user.email,
        "full_name": user.full_name,
        "role": user.role,
        "subscription_tier": user.tier,
        "is_active": true,
        "is_verified": true,
        "created_at": "2024-01-01T00:00:00",
        "updated_at": "2024-01-01T00:00:00"
    })
}

#[derive(Debug, Clone)]
pub struct MockOptions {
    pub login_delay: Duration,
    pub profile_delay: Duration,
    pub workspace_delay: Duration,
    pub hang_workspace_put: bool,
    pub websocket: bool,
    pub workspace_role: &'static str,
    pub workspace_tier: Option<&'static str>,
    pub workspace_theme: &'static str,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self {
            login_delay: Duration::ZERO,
            profile_delay: Duration::ZERO,
            workspace_delay: Duration::ZERO,
            hang_workspace_put: false,
            websocket: true,
            workspace_role: "user",
            workspace_tier: None,
            workspace_theme: "dark",
        }
    }
}

pub struct MockState {
    opts: MockOptions,
    messages: Mutex<Vec<Value>>,
    next_id: AtomicU64,
    feed: broadcast::Sender<String>,
    pub logins: AtomicUsize,
    pub workspace_puts: AtomicUsize,
    pub uploads: AtomicUsize,
    pub last_theme: Mutex<Option<String>>,
}

impl MockState {
    fn new(opts: MockOptions) -> Self {
        let (feed, _) = broadcast::channel(64);
        let seeded = vec![
            message_json(1, "community", &USERS[0], "Welcome to the community"),
            message_json(2, "moderator", &USERS[2], "Moderators only"),
        ];
        Self {
            opts,
            messages: Mutex::new(seeded),
            next_id: AtomicU64::new(3),
            feed,
            logins: AtomicUsize::new(0),
            workspace_puts: AtomicUsize::new(0),
            uploads: AtomicUsize::new(0),
            last_theme: Mutex::new(None),
        }
    }

    /// Add a message as if another user posted it.
    pub fn inject(&self, channel: &str, content: &str) -> Value {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let msg = message_json(id, channel, &USERS[2], content);
        self.messages.lock().unwrap().push(msg.clone());
        let _ = self.feed.send(msg.to_string());
        msg
    }
}

fn message_json(id: u64, channel: &str, user: &TestUser, content: &str) -> Value {
    let created_at = chrono::Utc::now()
        .naive_utc()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string();
    json!({
        "id": id,
        "channel": channel,
        "user_id": user.id,
        "user_name": user.full_name,
        "content": content,
        "created_at": created_at
    })
}

fn authorized(headers: &HeaderMap) -> Option<&'static TestUser> {
    let value = headers.get("authorization")?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?;
    user_for_token(token)
}

fn user_for_token(token: &str) -> Option<&'static TestUser> {
    USERS.iter().find(|u| format!("token-{}", u.id) == token)
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"detail": "Not authenticated"})),
    )
        .into_response()
}

type Shared = Arc<MockState>;

async fn login(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    tokio::time::sleep(state.opts.login_delay).await;
    state.logins.fetch_add(1, Ordering::SeqCst);
    let email = body["email"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default();
    match USERS
        .iter()
        .find(|u| u.email == email && u.password == password)
    {
        Some(user) => Json(json!({
            "access_token": format!("token-{}", user.id),
            "token_type": "bearer",
            "user": user_json(user)
        }))
        .into_response(),
        None => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Invalid email or password"})),
        )
            .into_response(),
    }
}

async fn me(State(state): State<Shared>, headers: HeaderMap) -> Response {
    tokio::time::sleep(state.opts.profile_delay).await;
    match authorized(&headers) {
        Some(user) => {
            let mut body = user_json(user);
            body["full_name"] = json!(format!("{} (refreshed)", user.full_name));
            Json(body).into_response()
        }
        None => unauthorized(),
    }
}

fn workspace_json(state: &MockState, user: &TestUser, theme: &str) -> Value {
    json!({
        "id": 1,
        "user_id": user.id,
        "workspace_name": format!("{} Studio", user.full_name),
        "workspace_description": null,
        "role": state.opts.workspace_role,
        "subscription_tier": state.opts.workspace_tier,
        "theme": theme,
        "widgets": ["chat", "portfolio"],
        "created_at": "2024-01-01T00:00:00",
        "updated_at": "2024-01-01T00:00:00"
    })
}

async fn get_workspace(State(state): State<Shared>, headers: HeaderMap) -> Response {
    tokio::time::sleep(state.opts.workspace_delay).await;
    let Some(user) = authorized(&headers) else {
        return unauthorized();
    };
    let theme = state
        .last_theme
        .lock()
        .unwrap()
        .clone()
        .unwrap_or_else(|| state.opts.workspace_theme.to_string());
    Json(workspace_json(&state, user, &theme)).into_response()
}

async fn put_workspace(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let Some(user) = authorized(&headers) else {
        return unauthorized();
    };
    state.workspace_puts.fetch_add(1, Ordering::SeqCst);
    if state.opts.hang_workspace_put {
        tokio::time::sleep(Duration::from_secs(60)).await;
    }
    let theme = body["theme"].as_str().unwrap_or("dark").to_string();
    *state.last_theme.lock().unwrap() = Some(theme.clone());
    Json(workspace_json(&state, user, &theme)).into_response()
}

async fn list_messages(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if authorized(&headers).is_none() {
        return unauthorized();
    }
    let channel = params
        .get("channel")
        .cloned()
        .unwrap_or_else(|| "community".into());
    let messages: Vec<Value> = state
        .messages
        .lock()
        .unwrap()
        .iter()
        .filter(|m| m["channel"] == channel.as_str())
        .cloned()
        .collect();
    Json(messages).into_response()
}

async fn post_message(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let Some(user) = authorized(&headers) else {
        return unauthorized();
    };
    let id = state.next_id.fetch_add(1, Ordering::SeqCst);
    let msg = message_json(
        id,
        body["channel"].as_str().unwrap_or("community"),
        user,
        body["content"].as_str().unwrap_or_default(),
    );
    state.messages.lock().unwrap().push(msg.clone());
    let _ = state.feed.send(msg.to_string());
    Json(msg).into_response()
}

async fn chat_ws(
    State(state): State<Shared>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    if params
        .get("token")
        .and_then(|t| user_for_token(t))
        .is_none()
    {
        return unauthorized();
    }
    ws.on_upgrade(move |socket| serve_socket(socket, state))
}

async fn serve_socket(mut socket: WebSocket, state: Shared) {
    let mut feed = state.feed.subscribe();
    let backlog: Vec<Value> = state.messages.lock().unwrap().clone();
    for msg in backlog {
        if socket
            .send(Message::Text(msg.to_string().into()))
            .await
            .is_err()
        {
            return;
        }
    }
    while let Ok(frame) = feed.recv().await {
        if socket.send(Message::Text(frame.into())).await.is_err() {
            return;
        }
    }
}

async fn list_assets(headers: HeaderMap) -> Response {
    if authorized(&headers).is_none() {
        return unauthorized();
    }
    Json(json!([{
        "id": 9,
        "user_id": 5,
        "file_url": "/uploads/5_1700000000.png",
        "file_type": "image",
        "created_at": "2024-05-01T12:00:00"
    }]))
    .into_response()
}

async fn upload_asset(
    State(state): State<Shared>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let Some(user) = authorized(&headers) else {
        return unauthorized();
    };
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().unwrap_or_default().to_string();
        let Ok(bytes) = field.bytes().await else {
            break;
        };
        if bytes.is_empty() {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"detail": "Empty file"})),
            )
                .into_response();
        }
        let id = state.uploads.fetch_add(1, Ordering::SeqCst) + 100;
        let file_type = if content_type.starts_with("video") {
            "video"
        } else {
            "image"
        };
        return Json(json!({
            "id": id,
            "user_id": user.id,
            "file_url": format!("/uploads/{}_{file_name}", user.id),
            "file_type": file_type,
            "created_at": "2024-05-01T12:00:00"
        }))
        .into_response();
    }
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"detail": "No file uploaded"})),
    )
        .into_response()
}

pub struct MockBackend {
    pub addr: SocketAddr,
    pub state: Shared,
    task: JoinHandle<()>,
}

impl MockBackend {
    pub async fn start(opts: MockOptions) -> Self {
        let websocket = opts.websocket;
        let state = Arc::new(MockState::new(opts));

        let mut api = Router::new()
            .route("/v1/auth/login", post(login))
            .route("/v1/users/me", get(me))
            .route("/v1/workspaces/me", get(get_workspace).put(put_workspace))
            .route("/v1/chat/messages", get(list_messages).post(post_message))
            .route("/v1/portfolio/me", get(list_assets))
            .route("/v1/portfolio/upload", post(upload_asset));
        if websocket {
            api = api.route("/v1/chat/ws", get(chat_ws));
        }
        let app = Router::new()
            .nest("/api", api)
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state, task }
    }

    pub fn origin(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// An address nothing listens on.
pub async fn dead_origin() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

pub fn config_for(origin: &str) -> AppConfig {
    AppConfig {
        api: ApiConfig {
            base_url: Some(origin.to_string()),
            frontend_origin: "http://localhost:8000".into(),
            mode: ResolveMode::Locked,
            fallbacks: Vec::new(),
            denylist: vec!["kcd-frontend.onrender.com".into()],
            timeout_secs: 2,
        },
        chat: ChatConfig {
            poll_interval_secs: 1,
        },
        session: SessionConfig {
            store_path: None,
            startup: StartupVariant::Splash,
        },
        demo: DemoConfig {
            email: "free@kcd-agency.com".into(),
            password: "free123".into(),
        },
    }
}

pub fn controller(config: AppConfig) -> (Controller, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let ctl = Controller::new(config, store.clone()).unwrap();
    (ctl, store)
}

/// Load, walk to the login form and sign in.
pub async fn signed_in(
    config: AppConfig,
    email: &str,
    password: &str,
) -> (Controller, Arc<MemoryStore>) {
    let (ctl, store) = controller(config);
    ctl.load();
    ctl.finish_splash().unwrap();
    ctl.open_login().unwrap();
    ctl.login(email, password).await.unwrap();
    (ctl, store)
}
