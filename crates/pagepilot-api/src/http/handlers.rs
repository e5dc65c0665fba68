//! HTTP handlers for the message bridge.
//!
//! A chat panel outside this process posts raw `{kind, payload}` messages to
//! `/v1/messages` and pushes page snapshots to `/v1/pages/{tab}`. Responses
//! are the wire envelopes unchanged.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{Value, json};

use pagepilot_types::chat::TabId;
use pagepilot_types::envelope::{ErrorCode, ResponseEnvelope};
use pagepilot_types::page::PageContent;

use crate::state::AppState;

fn status_for(response: &ResponseEnvelope) -> StatusCode {
    match response.code() {
        None => StatusCode::OK,
        Some(ErrorCode::InvalidMessage) => StatusCode::BAD_REQUEST,
        Some(ErrorCode::HandlerNotFound) => StatusCode::NOT_FOUND,
        Some(ErrorCode::AlreadyActive) => StatusCode::CONFLICT,
        Some(ErrorCode::HandlerExecutionError) => StatusCode::UNPROCESSABLE_ENTITY,
        Some(ErrorCode::RoutingError) => StatusCode::BAD_GATEWAY,
    }
}

/// POST /v1/messages
pub async fn post_message(State(state): State<AppState>, Json(message): Json<Value>) -> Response {
    let response = state.bridge.relay(message).await;
    (status_for(&response), Json(response)).into_response()
}

#[derive(Debug, Deserialize)]
pub struct PutPageRequest {
    pub url: String,
    #[serde(default)]
    pub title: String,
    pub content: String,
}

/// PUT /v1/pages/{tab}
pub async fn put_page(
    State(state): State<AppState>,
    Path(tab): Path<String>,
    Json(body): Json<PutPageRequest>,
) -> impl IntoResponse {
    let page = PageContent {
        id: TabId::from(tab),
        url: body.url,
        title: body.title,
        content: body.content,
    };
    tracing::debug!(tab_id = %page.id, chars = page.content.len(), "page snapshot received");
    let info = page.info();
    state.pages.insert(page);
    (StatusCode::OK, Json(info))
}

/// DELETE /v1/pages/{tab}
pub async fn delete_page(State(state): State<AppState>, Path(tab): Path<String>) -> StatusCode {
    match state.pages.remove(&TabId::from(tab)) {
        Some(_) => StatusCode::NO_CONTENT,
        None => StatusCode::NOT_FOUND,
    }
}

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok", "version": env!("CARGO_PKG_VERSION")}))
}
