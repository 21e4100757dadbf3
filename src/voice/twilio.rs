//! Twilio Integration
//!
//! REST client for call origination and the axum handlers Twilio calls
//! back into while the call runs.

use super::config::TwilioConfig;
use super::dispatcher::{CallStatusEvent, ScriptFetchEvent, SpeechResultEvent, WebhookDispatcher};
use super::twiml::TWIML_CONTENT_TYPE;
use super::{Result, VoiceError};
use async_trait::async_trait;
use axum::{
    extract::{rejection::FormRejection, rejection::QueryRejection, Form, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// Parameters of an outbound call request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginateRequest {
    /// Number to dial
    pub to: String,
    /// Caller ID
    pub from: String,
    /// Where Twilio fetches the first TwiML document
    pub url: String,
    /// HTTP method for `url`
    pub method: String,
    /// Call progress callback
    pub status_callback: String,
    /// HTTP method for `status_callback`
    pub status_callback_method: String,
    /// Progress events reported to `status_callback`
    pub status_callback_events: Vec<String>,
}

impl OriginateRequest {
    /// Form fields for `POST /Calls.json`. `StatusCallbackEvent` repeats.
    pub fn form_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("To", self.to.clone()),
            ("From", self.from.clone()),
            ("Url", self.url.clone()),
            ("Method", self.method.clone()),
            ("StatusCallback", self.status_callback.clone()),
            ("StatusCallbackMethod", self.status_callback_method.clone()),
        ];
        params.extend(
            self.status_callback_events
                .iter()
                .map(|event| ("StatusCallbackEvent", event.clone())),
        );
        params
    }
}

/// Places outbound calls; returns the provider call SID
#[async_trait]
pub trait CallOriginator: Send + Sync {
    async fn originate(&self, request: &OriginateRequest) -> Result<String>;
}

/// Twilio client for API calls
#[derive(Debug, Clone)]
pub struct TwilioClient {
    config: TwilioConfig,
    http_client: reqwest::Client,
}

impl TwilioClient {
    /// Create a new Twilio client
    pub fn new(config: TwilioConfig) -> Result<Self> {
        config.validate().map_err(VoiceError::Config)?;
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            config,
            http_client,
        })
    }

    /// Get the Twilio API URL
    fn api_url(&self) -> String {
        format!(
            "{}/Accounts/{}/Calls.json",
            self.config.api_base_url.trim_end_matches('/'),
            self.config.account_sid
        )
    }
}

#[derive(Debug, Deserialize)]
struct CallResource {
    sid: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<u64>,
    message: String,
}

#[async_trait]
impl CallOriginator for TwilioClient {
    async fn originate(&self, request: &OriginateRequest) -> Result<String> {
        let response = self
            .http_client
            .post(self.api_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&request.form_params())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(VoiceError::Provider(describe_api_error(status, &error_text)));
        }

        let call: CallResource = response.json().await?;
        Ok(call.sid)
    }
}

/// Prefer Twilio's JSON error message over the raw body
fn describe_api_error(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ApiError>(body) {
        Ok(ApiError {
            code: Some(code),
            message,
        }) => format!("{} (code {})", message, code),
        Ok(ApiError { message, .. }) => message,
        Err(_) if body.trim().is_empty() => format!("Failed to make call: HTTP {}", status),
        Err(_) => format!("Failed to make call: {}", body.trim()),
    }
}

// ---------------------------------------------------------------------------
// Webhooks
// ---------------------------------------------------------------------------

/// Form fields posted by `<Gather input="speech">`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SpeechWebhook {
    #[serde(default)]
    pub call_sid: Option<String>,
    #[serde(default)]
    pub speech_result: Option<String>,
    #[serde(default)]
    pub confidence: Option<String>,
}

/// Form fields posted by the transcription callback
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TranscriptionWebhook {
    #[serde(default)]
    pub call_sid: Option<String>,
    #[serde(default)]
    pub transcription_text: Option<String>,
}

/// Form fields posted to the status callback
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusWebhook {
    #[serde(default)]
    pub call_sid: Option<String>,
    #[serde(default)]
    pub call_status: Option<String>,
}

/// Fields of the prompt request Twilio makes when the call is answered
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScriptWebhook {
    #[serde(default, rename = "CallSid")]
    pub call_sid: Option<String>,
    #[serde(default)]
    pub issue: Option<String>,
}

/// Twilio webhook state for axum
#[derive(Debug, Clone)]
pub struct TwilioWebhookState {
    pub dispatcher: Arc<WebhookDispatcher>,
    /// Public base URL callbacks are built from; the `Host` header is used
    /// when unset
    pub public_url: Option<Url>,
}

/// Base URL this service is reachable at. Fails when the forwarded
/// scheme or `Host` header does not form a valid URL.
pub fn resolve_base_url(
    configured: Option<&Url>,
    headers: &HeaderMap,
) -> std::result::Result<Url, url::ParseError> {
    if let Some(url) = configured {
        return Ok(url.clone());
    }

    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("http");

    Url::parse(&format!("{}://{}/", scheme, host))
}

fn twiml_response(twiml: String) -> Response {
    (StatusCode::OK, [(header::CONTENT_TYPE, TWIML_CONTENT_TYPE)], twiml).into_response()
}

fn ok_response() -> Response {
    (StatusCode::OK, "OK").into_response()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Handle the prompt request (`GET|POST /voice-logic`)
pub async fn handle_voice_logic(
    State(state): State<Arc<TwilioWebhookState>>,
    headers: HeaderMap,
    query: std::result::Result<Query<ScriptWebhook>, QueryRejection>,
    form: std::result::Result<Form<ScriptWebhook>, FormRejection>,
) -> Response {
    let query = query.map(|Query(q)| q).unwrap_or_default();
    let form = form.map(|Form(f)| f).unwrap_or_default();

    let event = ScriptFetchEvent {
        call_id: non_empty(form.call_sid).or_else(|| non_empty(query.call_sid)),
        issue: non_empty(query.issue).or_else(|| non_empty(form.issue)),
    };
    match resolve_base_url(state.public_url.as_ref(), &headers) {
        Ok(base_url) => twiml_response(state.dispatcher.script(&event, &base_url)),
        Err(e) => {
            warn!(call_sid = ?event.call_id, error = %e, "cannot build callback URL");
            twiml_response(state.dispatcher.farewell())
        }
    }
}

/// Handle the speech gather callback (`POST /handle-recording`)
pub async fn handle_speech_result(
    State(state): State<Arc<TwilioWebhookState>>,
    form: std::result::Result<Form<SpeechWebhook>, FormRejection>,
) -> Response {
    let payload = match form {
        Ok(Form(payload)) => payload,
        Err(rejection) => {
            warn!(error = %rejection, "unreadable speech webhook");
            return twiml_response(state.dispatcher.acknowledgement(None));
        }
    };

    let speech = non_empty(payload.speech_result);
    debug!(
        call_sid = ?payload.call_sid,
        speech = ?speech,
        confidence = ?payload.confidence,
        "speech received"
    );

    if let Some(call_id) = non_empty(payload.call_sid) {
        let event = SpeechResultEvent {
            call_id,
            text: speech.clone(),
            confidence: payload.confidence.and_then(|c| c.trim().parse().ok()),
        };
        state.dispatcher.speech_result(event).await;
    }

    twiml_response(state.dispatcher.acknowledgement(speech.as_deref()))
}

/// Handle the transcription callback (`POST /handle-transcription`)
pub async fn handle_transcription(
    State(state): State<Arc<TwilioWebhookState>>,
    form: std::result::Result<Form<TranscriptionWebhook>, FormRejection>,
) -> Response {
    match form {
        Ok(Form(payload)) => {
            if let Some(call_id) = non_empty(payload.call_sid) {
                let event = SpeechResultEvent {
                    call_id,
                    text: non_empty(payload.transcription_text),
                    confidence: None,
                };
                state.dispatcher.speech_result(event).await;
            }
        }
        Err(rejection) => warn!(error = %rejection, "unreadable transcription webhook"),
    }
    ok_response()
}

/// Handle status callback webhook (`POST /call-status`)
pub async fn handle_status_callback(
    State(state): State<Arc<TwilioWebhookState>>,
    form: std::result::Result<Form<StatusWebhook>, FormRejection>,
) -> Response {
    match form {
        Ok(Form(payload)) => {
            if let (Some(call_id), Some(status)) =
                (non_empty(payload.call_sid), non_empty(payload.call_status))
            {
                state
                    .dispatcher
                    .call_status(&CallStatusEvent { call_id, status });
            }
        }
        Err(rejection) => warn!(error = %rejection, "unreadable status webhook"),
    }
    ok_response()
}
