//! HTTP surface — JSON API plus an SSE endpoint for streamed replies.
//!
//! Every session gets its own [`ConversationOrchestrator`] behind a tokio
//! mutex, so requests against one session queue up while different sessions
//! run side by side. The backend is shared by all of them.
//!
//! ## URL layout
//!
//! ```text
//! GET  /api/health
//! GET  /api/models
//! POST /api/sessions                       {"secret"?}
//! GET  /api/sessions/{id}
//! DELETE /api/sessions/{id}
//! POST /api/sessions/{id}/messages         {"prompt", "model"?, "attachments"?}
//! POST /api/sessions/{id}/messages/stream  same body, text/event-stream reply
//! ```

mod api;

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::chat::{self, ConversationOrchestrator};
use crate::config::Config;
use crate::error::AppError;
use crate::gate::AccessGate;
use crate::llm::LlmProvider;

pub(crate) type SessionHandle = Arc<Mutex<ConversationOrchestrator>>;

// ── Shared request state ──────────────────────────────────────────────────────

/// Router state injected into every handler via [`axum::extract::State`].
///
/// Cheap to clone — all fields are reference-counted.
#[derive(Clone)]
pub struct HttpState {
    config: Arc<Config>,
    backend: LlmProvider,
    gate: Arc<AccessGate>,
    sessions: Arc<RwLock<HashMap<Uuid, SessionHandle>>>,
}

impl HttpState {
    pub fn new(config: Config, backend: LlmProvider) -> Self {
        let gate = AccessGate::new(config.access_secret.clone());
        Self {
            config: Arc::new(config),
            backend,
            gate: Arc::new(gate),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create and register a session; returns its id.
    pub(crate) async fn open_session(&self) -> Uuid {
        let orchestrator = chat::new_session(&self.config, self.backend.clone());
        let id = orchestrator.session_id();
        self.sessions.write().await.insert(id, Arc::new(Mutex::new(orchestrator)));
        info!(session_id = %id, "http session opened");
        id
    }

    /// Drop a session from the registry. A request already holding it
    /// finishes; later requests get 404.
    pub(crate) async fn close_session(&self, id: &Uuid) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            info!(session_id = %id, "http session closed");
        }
        removed
    }

    pub(crate) async fn session(&self, id: &Uuid) -> Option<SessionHandle> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

// ── Server ────────────────────────────────────────────────────────────────────

pub struct HttpServer {
    bind_addr: String,
    state: HttpState,
}

impl HttpServer {
    pub fn new(bind_addr: impl Into<String>, state: HttpState) -> Self {
        Self { bind_addr: bind_addr.into(), state }
    }

    /// Serve until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), AppError> {
        let router = build_router(self.state);

        let listener = TcpListener::bind(&self.bind_addr)
            .await
            .map_err(|e| AppError::Http(format!("bind failed on {}: {e}", self.bind_addr)))?;

        info!(bind_addr = %self.bind_addr, "http surface listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| AppError::Http(format!("server error: {e}")))?;

        info!("http surface shut down");
        Ok(())
    }
}

// ── Router ────────────────────────────────────────────────────────────────────

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/api/health",                             get(api::health))
        .route("/api/models",                             get(api::models))
        .route("/api/sessions",                           post(api::create_session))
        .route("/api/sessions/{session_id}",              get(api::session_detail).delete(api::close_session))
        .route("/api/sessions/{session_id}/messages",     post(api::message))
        .route("/api/sessions/{session_id}/messages/stream", post(api::message_stream))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::providers::scripted::{Script, ScriptedProvider};
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn state(provider: ScriptedProvider, root: &TempDir, secret: Option<&str>) -> HttpState {
        let mut config = Config::test_default(root.path());
        config.catalog = config.catalog.with_attachments("model-b");
        config.access_secret = secret.map(str::to_string);
        HttpState::new(config, LlmProvider::Scripted(provider))
    }

    async fn call(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, String) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let resp = router.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    async fn open(router: &Router, body: Value) -> String {
        let (status, text) = call(router, "POST", "/api/sessions", Some(body)).await;
        assert_eq!(status, StatusCode::CREATED, "{text}");
        let v: Value = serde_json::from_str(&text).unwrap();
        v["session_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_and_models() {
        let root = TempDir::new().unwrap();
        let router = build_router(state(ScriptedProvider::new(), &root, None));

        let (status, text) = call(&router, "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(text.contains("\"ok\""));

        let (_, text) = call(&router, "GET", "/api/models", None).await;
        let v: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["default"], "model-a");
        assert_eq!(v["models"][1]["id"], "model-b");
        assert_eq!(v["models"][1]["attachments"], true);
    }

    #[tokio::test]
    async fn batch_message_round() {
        let root = TempDir::new().unwrap();
        let router = build_router(state(ScriptedProvider::new().then(Script::whole("Hi there")), &root, None));
        let id = open(&router, json!({})).await;

        let (status, text) = call(
            &router,
            "POST",
            &format!("/api/sessions/{id}/messages"),
            Some(json!({ "prompt": "Hello" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{text}");
        let v: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["reply"]["role"], "assistant");
        assert_eq!(v["reply"]["content"], "Hi there");
        assert_eq!(v["turns"].as_array().unwrap().len(), 2);

        let (_, text) = call(&router, "GET", &format!("/api/sessions/{id}"), None).await;
        let v: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["state"], "idle");
        assert_eq!(v["turns"][0]["content"], "Hello");
    }

    #[tokio::test]
    async fn empty_prompt_is_unprocessable() {
        let root = TempDir::new().unwrap();
        let router = build_router(state(ScriptedProvider::new(), &root, None));
        let id = open(&router, json!({})).await;

        let (status, text) = call(
            &router,
            "POST",
            &format!("/api/sessions/{id}/messages"),
            Some(json!({ "prompt": "   " })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(text.contains("valid prompt"));
    }

    #[tokio::test]
    async fn bad_base64_is_rejected() {
        let root = TempDir::new().unwrap();
        let router = build_router(state(ScriptedProvider::new(), &root, None));
        let id = open(&router, json!({})).await;

        let (status, _) = call(
            &router,
            "POST",
            &format!("/api/sessions/{id}/messages"),
            Some(json!({
                "prompt": "look",
                "model": "model-b",
                "attachments": [{ "filename": "a.png", "data_base64": "!!!" }]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn attachments_reach_the_backend() {
        let root = TempDir::new().unwrap();
        let provider = ScriptedProvider::new().then(Script::whole("a dot"));
        let router = build_router(state(provider.clone(), &root, None));
        let id = open(&router, json!({})).await;

        let (status, _) = call(
            &router,
            "POST",
            &format!("/api/sessions/{id}/messages"),
            Some(json!({
                "prompt": "look",
                "model": "model-b",
                "attachments": [{ "filename": "a.png", "data_base64": "AQID" }]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let calls = provider.calls();
        assert_eq!(calls[0].model, "model-b");
        assert_eq!(std::fs::read(&calls[0].attachments[0].path).unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let root = TempDir::new().unwrap();
        let router = build_router(state(ScriptedProvider::new(), &root, None));
        let (status, _) = call(&router, "GET", &format!("/api/sessions/{}", Uuid::new_v4()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn gate_requires_secret_for_new_sessions() {
        let root = TempDir::new().unwrap();
        let router = build_router(state(ScriptedProvider::new(), &root, Some("pw")));

        let (status, _) = call(&router, "POST", "/api/sessions", Some(json!({}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = call(&router, "POST", "/api/sessions", Some(json!({ "secret": "nope" }))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        open(&router, json!({ "secret": "pw" })).await;
    }

    #[tokio::test]
    async fn sessions_do_not_share_transcripts() {
        let root = TempDir::new().unwrap();
        let st = state(ScriptedProvider::new().always(Script::whole("ok")), &root, None);
        let router = build_router(st.clone());
        let a = open(&router, json!({})).await;
        let b = open(&router, json!({})).await;

        call(&router, "POST", &format!("/api/sessions/{a}/messages"), Some(json!({ "prompt": "only a" }))).await;

        let (_, text) = call(&router, "GET", &format!("/api/sessions/{b}"), None).await;
        let v: Value = serde_json::from_str(&text).unwrap();
        assert!(v["turns"].as_array().unwrap().is_empty());
        assert_eq!(st.session_count().await, 2);
    }

    #[tokio::test]
    async fn deleted_sessions_leave_the_registry() {
        let root = TempDir::new().unwrap();
        let st = state(ScriptedProvider::new(), &root, None);
        let router = build_router(st.clone());
        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(open(&router, json!({})).await);
        }
        assert_eq!(st.session_count().await, 5);

        for id in &ids {
            let (status, _) = call(&router, "DELETE", &format!("/api/sessions/{id}"), None).await;
            assert_eq!(status, StatusCode::NO_CONTENT);
        }
        assert_eq!(st.session_count().await, 0);

        let (status, _) = call(&router, "DELETE", &format!("/api/sessions/{}", ids[0]), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&router, "GET", &format!("/api/sessions/{}", ids[0]), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn stream_endpoint_emits_deltas_then_done() {
        let root = TempDir::new().unwrap();
        let router = build_router(state(ScriptedProvider::new().then(Script::stream(["1", "2", "3"])), &root, None));
        let id = open(&router, json!({})).await;

        let (status, text) = call(
            &router,
            "POST",
            &format!("/api/sessions/{id}/messages/stream"),
            Some(json!({ "prompt": "Count", "model": "model-b" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let deltas: Vec<&str> = text
            .split("\n\n")
            .filter(|block| block.contains("event: delta"))
            .filter_map(|block| block.lines().find_map(|l| l.strip_prefix("data: ")))
            .collect();
        assert_eq!(deltas, ["1", "2", "3"]);
        assert!(text.contains("event: done"));
        assert!(text.contains("\"content\":\"123\""));
    }
}
