//! HTTP API for the durable store.

use crate::node::NodeState;
use crate::ws::{ws_feed_handler, ws_presence_handler};
use axum::{
    extract::{Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use resonance_core::{Entry, EntryDraft, VIEW_CAPACITY};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

type AppState = Arc<NodeState>;

/// Longest field accepted over HTTP, in Unicode scalar values.
pub const MAX_FIELD_CHARS: usize = 1024;

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    // CORS layer for browser access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        // Durable store
        .route(
            "/api/v1/entries",
            get(list_entries).post(create_entry).delete(clear_entries),
        )
        // Presence count for a topic
        .route("/api/v1/presence/:topic", get(presence_count))
        // WebSocket notification channel and presence relay
        .route("/api/v1/ws/feed/:topic", get(ws_feed_handler))
        .route("/api/v1/ws/presence/:topic", get(ws_presence_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// --- Auth ---

async fn require_api_key(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> std::result::Result<Response, StatusCode> {
    let Some(expected) = state.config.api_key.as_deref() else {
        return Ok(next.run(req).await);
    };
    let presented = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if presented == Some(expected) {
        Ok(next.run(req).await)
    } else {
        warn!("Rejected request to {} with missing or wrong key", req.uri().path());
        Err(StatusCode::UNAUTHORIZED)
    }
}

// --- Health endpoints ---

async fn health() -> &'static str {
    "OK"
}

async fn ready() -> &'static str {
    "OK"
}

// --- Errors ---

#[derive(Debug, Serialize)]
struct ApiError {
    error: String,
}

fn api_error(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (
        status,
        Json(ApiError {
            error: message.into(),
        }),
    )
}

type ApiResult<T> = std::result::Result<T, (StatusCode, Json<ApiError>)>;

// --- Entry endpoints ---

#[derive(Debug, Deserialize)]
struct ListQuery {
    order: Option<String>,
    limit: Option<usize>,
}

async fn list_entries(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Entry>>> {
    if let Some(order) = query.order.as_deref() {
        if order != "timestamp-desc" {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                format!("unsupported order: {}", order),
            ));
        }
    }
    let limit = query
        .limit
        .unwrap_or(VIEW_CAPACITY)
        .min(state.storage.cap());
    let entries = state.storage.list_recent(limit).map_err(|e| {
        error!("Failed to list entries: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "storage failure")
    })?;
    Ok(Json(entries))
}

/// Body of `POST /api/v1/entries`. The score is taken wide so an
/// out-of-range value is a 400, not a deserialization failure.
#[derive(Debug, Deserialize)]
struct CreateEntryRequest {
    x: String,
    y: String,
    z: String,
    score: i64,
    /// Client clock; replaced by the acceptance time
    #[serde(default)]
    timestamp: Option<u64>,
}

async fn create_entry(
    State(state): State<AppState>,
    Json(req): Json<CreateEntryRequest>,
) -> ApiResult<(StatusCode, Json<Entry>)> {
    if !state.limiter.try_acquire().await {
        return Err(api_error(StatusCode::TOO_MANY_REQUESTS, "write limit exceeded"));
    }

    let score = u8::try_from(req.score)
        .ok()
        .filter(|s| *s <= 100)
        .ok_or_else(|| {
            api_error(
                StatusCode::BAD_REQUEST,
                format!("score {} outside 0..=100", req.score),
            )
        })?;
    if let Some(client_ts) = req.timestamp {
        debug!("Replacing client timestamp {}", client_ts);
    }
    let draft = EntryDraft {
        x: req.x,
        y: req.y,
        z: req.z,
        score,
    };
    if let Err(e) = draft.validate() {
        warn!("Rejected entry: {}", e);
        return Err(api_error(StatusCode::BAD_REQUEST, e.to_string()));
    }
    for (name, value) in [("x", &draft.x), ("y", &draft.y), ("z", &draft.z)] {
        if value.chars().count() > MAX_FIELD_CHARS {
            warn!("Rejected entry: field {} too long", name);
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                format!("field {} longer than {} characters", name, MAX_FIELD_CHARS),
            ));
        }
    }

    let entry = state.append(&draft).await.map_err(|e| {
        error!("Failed to store entry: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "storage failure")
    })?;

    Ok((StatusCode::CREATED, Json(entry)))
}

async fn clear_entries(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    state.clear_all().await.map_err(|e| {
        error!("Failed to clear entries: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "storage failure")
    })?;
    Ok(Json(serde_json::json!({})))
}

// --- Presence endpoints ---

#[derive(Debug, Serialize)]
struct PresenceCount {
    topic: String,
    count: usize,
}

async fn presence_count(
    State(state): State<AppState>,
    Path(topic): Path<String>,
) -> impl IntoResponse {
    let count = state.hub.presence_count(&topic).await;
    Json(PresenceCount { topic, count })
}
