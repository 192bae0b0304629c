//! Axum handlers for `/api/*` routes.
//!
//! Validation failures map to 422, unknown sessions to 404, gate refusals to
//! 401. Backend faults are not HTTP errors: they arrive as the assistant turn.

use std::convert::Infallible;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::{StreamExt, wrappers::UnboundedReceiverStream};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::chat::{Attachment, NoopObserver, Turn};

use super::HttpState;

// ── Request types ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct CreateSessionRequest {
    #[serde(default)]
    secret: Option<String>,
}

#[derive(Deserialize)]
pub(super) struct UploadedFile {
    filename: String,
    data_base64: String,
}

#[derive(Deserialize)]
pub(super) struct MessageRequest {
    prompt: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    attachments: Vec<UploadedFile>,
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Build a JSON error response body.
fn json_error(code: &str, msg: impl std::fmt::Display) -> Json<serde_json::Value> {
    Json(json!({ "error": code, "message": format!("{msg}") }))
}

fn session_not_found(id: &Uuid) -> Response {
    (StatusCode::NOT_FOUND, json_error("not_found", format!("no session {id}"))).into_response()
}

/// Resolve the model and decode uploads. `Err` is a ready 400 response.
fn decode_message(state: &HttpState, req: MessageRequest) -> Result<(String, String, Vec<Attachment>), Response> {
    let model = req
        .model
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| state.config.catalog.default_model().to_string());

    let mut attachments = Vec::with_capacity(req.attachments.len());
    for file in req.attachments {
        let bytes = BASE64.decode(file.data_base64.as_bytes()).map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                json_error("bad_request", format!("attachment '{}' is not valid base64: {e}", file.filename)),
            )
                .into_response()
        })?;
        attachments.push(Attachment::new(file.filename, bytes));
    }

    Ok((req.prompt, model, attachments))
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// GET /api/health
pub(super) async fn health(State(state): State<HttpState>) -> Response {
    Json(json!({ "status": "ok", "backend": state.backend.name() })).into_response()
}

/// GET /api/models
pub(super) async fn models(State(state): State<HttpState>) -> Response {
    let catalog = &state.config.catalog;
    Json(json!({
        "default": catalog.default_model(),
        "models": catalog.models(),
    }))
    .into_response()
}

/// POST /api/sessions
pub(super) async fn create_session(
    State(state): State<HttpState>,
    Json(req): Json<CreateSessionRequest>,
) -> Response {
    if state.gate.is_configured() {
        let attempt = req.secret.unwrap_or_default();
        if !state.gate.matches(&attempt) {
            warn!("session refused: wrong access secret");
            return (StatusCode::UNAUTHORIZED, json_error("unauthorized", "access secret required"))
                .into_response();
        }
    }

    let session_id = state.open_session().await;
    (StatusCode::CREATED, Json(json!({ "session_id": session_id }))).into_response()
}

/// GET /api/sessions/{session_id}
pub(super) async fn session_detail(
    State(state): State<HttpState>,
    Path(session_id): Path<Uuid>,
) -> Response {
    let Some(handle) = state.session(&session_id).await else {
        return session_not_found(&session_id);
    };
    let session = handle.lock().await;
    Json(json!({
        "session_id": session_id,
        "state": session.state(),
        "turns": session.transcript().turns(),
    }))
    .into_response()
}

/// DELETE /api/sessions/{session_id}
pub(super) async fn close_session(
    State(state): State<HttpState>,
    Path(session_id): Path<Uuid>,
) -> Response {
    if state.close_session(&session_id).await {
        StatusCode::NO_CONTENT.into_response()
    } else {
        session_not_found(&session_id)
    }
}

/// POST /api/sessions/{session_id}/messages
pub(super) async fn message(
    State(state): State<HttpState>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<MessageRequest>,
) -> Response {
    let Some(handle) = state.session(&session_id).await else {
        return session_not_found(&session_id);
    };
    let (prompt, model, attachments) = match decode_message(&state, req) {
        Ok(parts) => parts,
        Err(resp) => return resp,
    };

    let mut session = handle.lock().await;
    if let Err(e) = session.submit(&prompt, &model, attachments, &mut NoopObserver).await {
        return (StatusCode::UNPROCESSABLE_ENTITY, json_error("validation", e)).into_response();
    }

    let turns = session.transcript().turns();
    Json(json!({
        "reply": turns.last(),
        "turns": turns,
    }))
    .into_response()
}

/// POST /api/sessions/{session_id}/messages/stream
///
/// Emits one `delta` event per new piece of assistant text, then a `done`
/// event carrying the final assistant turn. A rejected prompt yields a
/// single `error` event.
pub(super) async fn message_stream(
    State(state): State<HttpState>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<MessageRequest>,
) -> Response {
    let Some(handle) = state.session(&session_id).await else {
        return session_not_found(&session_id);
    };
    let (prompt, model, attachments) = match decode_message(&state, req) {
        Ok(parts) => parts,
        Err(resp) => return resp,
    };

    let (tx, rx) = mpsc::unbounded_channel::<Event>();

    tokio::spawn(async move {
        let mut session = handle.lock().await;
        let reply_index = session.transcript().len() + 1;
        let mut sent = 0usize;
        let deltas = tx.clone();

        let mut observer = |turns: &[Turn]| {
            let Some(reply) = turns.get(reply_index) else { return };
            if reply.content.len() > sent {
                let delta = &reply.content[sent..];
                sent = reply.content.len();
                let _ = deltas.send(Event::default().event("delta").data(delta));
            }
        };

        match session.submit(&prompt, &model, attachments, &mut observer).await {
            Ok(()) => {
                let done = match session.transcript().last() {
                    Some(turn) => Event::default().event("done").json_data(turn),
                    None => Ok(Event::default().event("done")),
                };
                let done = done.unwrap_or_else(|_| Event::default().event("done"));
                let _ = tx.send(done);
            }
            Err(e) => {
                let _ = tx.send(Event::default().event("error").data(e.to_string()));
            }
        }
        debug!(session_id = %session_id, "stream response complete");
    });

    let events = UnboundedReceiverStream::new(rx).map(Ok::<Event, Infallible>);
    Sse::new(events).keep_alive(KeepAlive::default()).into_response()
}
