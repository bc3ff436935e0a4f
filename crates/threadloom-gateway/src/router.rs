use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde_json::{Value, json};
use threadloom_channels::slack::event_from_json;
use threadloom_security::SignatureError;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::state::SharedState;

const SIGNATURE_HEADER: &str = "x-slack-signature";
const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
const RETRY_HEADER: &str = "x-slack-retry-num";

/// Message subtypes that carry a human-authored message.
const ROUTED_SUBTYPES: &[&str] = &["file_share", "thread_broadcast"];

/// Build the gateway router.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/slack/events", post(slack_events))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str {
    "ok"
}

/// POST /slack/events: Slack Events API entry point.
///
/// Answers within Slack's ack deadline; routing runs on a spawned task.
async fn slack_events(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(e) = verify_request(&state, &headers, &body) {
        warn!("rejecting slack request: {e}");
        return (StatusCode::UNAUTHORIZED, e.to_string()).into_response();
    }

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            warn!("slack request body is not JSON: {e}");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    match payload.get("type").and_then(Value::as_str) {
        Some("url_verification") => {
            let challenge = payload.get("challenge").cloned().unwrap_or(Value::Null);
            axum::Json(json!({ "challenge": challenge })).into_response()
        }
        Some("event_callback") => {
            dispatch_event(&state, &headers, &payload);
            StatusCode::OK.into_response()
        }
        other => {
            debug!(kind = ?other, "ignoring slack payload");
            StatusCode::OK.into_response()
        }
    }
}

fn verify_request(
    state: &SharedState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), SignatureError> {
    let header = |name: &'static str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .ok_or(SignatureError::MissingHeader(name))
    };
    let timestamp = header(TIMESTAMP_HEADER)?;
    let signature = header(SIGNATURE_HEADER)?;
    state
        .verifier
        .verify(timestamp, signature, body, chrono::Utc::now().timestamp())
}

fn dispatch_event(state: &SharedState, headers: &HeaderMap, payload: &Value) {
    let event_id = payload
        .get("event_id")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let retry = headers.get(RETRY_HEADER).and_then(|v| v.to_str().ok());

    if !event_id.is_empty() && !state.first_delivery(event_id) {
        info!(event_id, retry, "dropping duplicate slack event");
        return;
    }

    let Some(raw) = payload.get("event") else {
        return;
    };
    if !should_route(raw, &state.bot_user_id) {
        debug!(event_id, "ignoring slack event");
        return;
    }
    let Some(event) = event_from_json(raw) else {
        warn!(event_id, "slack event has no timestamp");
        return;
    };

    let router = state.router.clone();
    tokio::spawn(async move {
        let outcome = router.handle(&event).await;
        debug!(?outcome, "slack event processed");
    });
}

/// Only plain user messages are routed. Mentions arrive as `message` events
/// too, so `app_mention` is skipped to avoid answering twice.
fn should_route(event: &Value, bot_user_id: &str) -> bool {
    if event.get("type").and_then(Value::as_str) != Some("message") {
        return false;
    }
    if event.get("bot_id").is_some() {
        return false;
    }
    if let Some(subtype) = event.get("subtype").and_then(Value::as_str) {
        if !ROUTED_SUBTYPES.contains(&subtype) {
            return false;
        }
    }
    event.get("user").and_then(Value::as_str) != Some(bot_user_id)
}
