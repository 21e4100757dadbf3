//! HTTP surface
//!
//! Client-facing call endpoints plus the Twilio webhook routes.

use crate::voice::{
    callback_url, handle_speech_result, handle_status_callback, handle_transcription,
    handle_voice_logic, resolve_base_url, CallOrchestrator, CallOutcome, CallRequest, CallStore,
    TwilioWebhookState, VoiceError, POLL_PATH, SCRIPT_PATH, SPEECH_RESULT_PATH,
    STATUS_CALLBACK_PATH,
};
use axum::{
    extract::{rejection::JsonRejection, FromRef, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Body of the not-found response for `/get-response`
pub const CALL_NOT_FOUND: &str = "Call SID not found";

/// Shared state for every route
#[derive(Debug, Clone)]
pub struct AppState {
    pub orchestrator: Arc<CallOrchestrator>,
    pub webhooks: Arc<TwilioWebhookState>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(orchestrator: Arc<CallOrchestrator>, webhooks: Arc<TwilioWebhookState>) -> Self {
        Self {
            orchestrator,
            webhooks,
            started_at: Instant::now(),
        }
    }

    pub fn store(&self) -> &Arc<CallStore> {
        self.orchestrator.store()
    }
}

impl FromRef<AppState> for Arc<TwilioWebhookState> {
    fn from_ref(state: &AppState) -> Self {
        state.webhooks.clone()
    }
}

/// `POST /make-call` body
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MakeCallBody {
    #[serde(alias = "destination")]
    pub number: Option<String>,
    pub issue: Option<String>,
    /// Arbitrary context; non-string values are stored as their JSON text
    pub metadata: HashMap<String, Value>,
    /// Block until the call finishes (default) or return right after dialing
    pub wait: Option<bool>,
}

impl MakeCallBody {
    fn into_call_request(self) -> CallRequest {
        let metadata = self
            .metadata
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (key, value)
            })
            .collect();

        CallRequest {
            destination: self.number.unwrap_or_default(),
            issue: self.issue,
            metadata,
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub active_calls: usize,
}

/// Build the router with every route and shared layers
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/make-call", post(make_call_handler))
        .route(&format!("/{}/{{call_sid}}", POLL_PATH), get(get_response_handler))
        .route(
            &format!("/{}", SCRIPT_PATH),
            get(handle_voice_logic).post(handle_voice_logic),
        )
        .route(
            &format!("/{}", SPEECH_RESULT_PATH),
            get(handle_speech_result).post(handle_speech_result),
        )
        .route(
            "/handle-transcription",
            get(handle_transcription).post(handle_transcription),
        )
        .route(
            &format!("/{}", STATUS_CALLBACK_PATH),
            get(handle_status_callback).post(handle_status_callback),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn voice_error_response(err: VoiceError) -> Response {
    let status = match err {
        VoiceError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, err.to_string())
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        active_calls: state.store().active_count(),
    })
}

async fn make_call_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<MakeCallBody>, JsonRejection>,
) -> Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => {
            warn!(error = %rejection, "rejected make-call body");
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    let base_url = match resolve_base_url(state.webhooks.public_url.as_ref(), &headers) {
        Ok(url) => url,
        Err(e) => {
            warn!(error = %e, "cannot build callback URL from request");
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("cannot derive callback URL from Host header: {}", e),
            );
        }
    };
    let wait = body.wait.unwrap_or(true);
    let request = body.into_call_request();

    if !wait {
        return match state.orchestrator.originate(request, &base_url).await {
            Ok(placed) => {
                let poll_url = callback_url(&base_url, &format!("{}/{}", POLL_PATH, placed.call_id));
                (
                    StatusCode::ACCEPTED,
                    Json(json!({
                        "status": "initiated",
                        "callSid": placed.call_id,
                        "checkStatusUrl": poll_url,
                    })),
                )
                    .into_response()
            }
            Err(e) => voice_error_response(e),
        };
    }

    match state.orchestrator.place_call(request, &base_url).await {
        Ok(CallOutcome::Finished(record)) => {
            info!(
                call_sid = %record.call_id,
                status = %record.status,
                intent = ?record.intent,
                "call finished"
            );
            (
                StatusCode::OK,
                Json(json!({
                    "status": "success",
                    "callSid": record.call_id,
                    "outcome": record,
                })),
            )
                .into_response()
        }
        Ok(CallOutcome::TimedOut { call_id }) => (
            StatusCode::GATEWAY_TIMEOUT,
            Json(json!({ "status": "timeout", "callSid": call_id })),
        )
            .into_response(),
        Err(e) => voice_error_response(e),
    }
}

async fn get_response_handler(
    State(state): State<AppState>,
    Path(call_sid): Path<String>,
) -> Response {
    match state.store().get(&call_sid) {
        Some(record) => Json(record).into_response(),
        None => error_response(StatusCode::NOT_FOUND, CALL_NOT_FOUND),
    }
}
