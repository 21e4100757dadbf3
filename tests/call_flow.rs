//! End-to-end call flows through the HTTP router
//!
//! A fake originator stands in for Twilio's REST API and webhooks are posted
//! straight into the router, so every test runs in-process.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use url::Url;
use voxgate::server::http::{create_router, AppState};
use voxgate::voice::{
    default_rules, CallOrchestrator, CallOriginator, CallStatus, CallStore, IntentMatcher,
    NotificationPayload, Notifier, OriginateRequest, ScriptConfig, TwilioWebhookState,
    VoiceError, WebhookDispatcher, HANG_UP_SENTINEL, NO_SPEECH_SENTINEL,
};

struct FakeOriginator {
    result: Result<String, String>,
    requests: Mutex<Vec<OriginateRequest>>,
}

#[async_trait]
impl CallOriginator for FakeOriginator {
    async fn originate(&self, request: &OriginateRequest) -> voxgate::voice::Result<String> {
        self.requests.lock().push(request.clone());
        self.result.clone().map_err(VoiceError::Provider)
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<NotificationPayload>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, payload: &NotificationPayload) -> voxgate::voice::Result<()> {
        self.sent.lock().push(payload.clone());
        Ok(())
    }
}

struct Harness {
    app: Router,
    store: Arc<CallStore>,
    originator: Arc<FakeOriginator>,
    notifier: Arc<RecordingNotifier>,
}

fn harness(result: Result<&str, &str>, wait_timeout: Duration) -> Harness {
    let store = Arc::new(CallStore::new());
    let originator = Arc::new(FakeOriginator {
        result: result.map(str::to_string).map_err(str::to_string),
        requests: Mutex::new(Vec::new()),
    });
    let notifier = Arc::new(RecordingNotifier::default());

    let dispatcher = WebhookDispatcher::new(
        store.clone(),
        ScriptConfig::default(),
        IntentMatcher::new(default_rules()),
    )
    .with_notifier(notifier.clone(), Duration::from_secs(5));

    let orchestrator =
        CallOrchestrator::new(originator.clone(), store.clone(), "+15550199", wait_timeout);
    let webhooks = TwilioWebhookState {
        dispatcher: Arc::new(dispatcher),
        public_url: Some(Url::parse("https://calls.example.com/").unwrap()),
    };

    Harness {
        app: create_router(AppState::new(Arc::new(orchestrator), Arc::new(webhooks))),
        store,
        originator,
        notifier,
    }
}

fn make_call(body: &str) -> Request<Body> {
    Request::post("/make-call")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn webhook(path: &str, form: &str) -> Request<Body> {
    Request::post(path)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

async fn wait_for_call(store: &CallStore, call_id: &str) {
    while !store.contains(call_id) {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_speech_answer_is_returned_to_dialing_request() {
    let h = harness(Ok("CA123"), Duration::from_secs(60));

    let pending = tokio::spawn(h.app.clone().oneshot(make_call(
        r#"{"number": "+15550100", "issue": "brake check", "metadata": {"vehicle_id": "KA-01"}}"#,
    )));
    wait_for_call(&h.store, "CA123").await;

    let ack = h
        .app
        .clone()
        .oneshot(webhook(
            "/handle-recording",
            "CallSid=CA123&SpeechResult=I+want+to+book&Confidence=0.92",
        ))
        .await
        .unwrap();
    assert_eq!(ack.status(), StatusCode::OK);
    assert!(body_text(ack)
        .await
        .contains("Thank you, I want to book. We have recorded your response."));

    let response = pending.await.unwrap().unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["callSid"], "CA123");
    assert_eq!(body["outcome"]["transcription"], "I want to book");
    assert_eq!(body["outcome"]["intent"], "book_service");
    assert_eq!(body["outcome"]["status"], "completed");

    let sent = h.notifier.sent.lock();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].call_sid, "CA123");
    assert_eq!(sent[0].subject_id.as_deref(), Some("KA-01"));
    assert_eq!(sent[0].issue.as_deref(), Some("brake check"));
    assert_eq!(sent[0].intent, "book_service");
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_call_times_out_and_ignores_late_speech() {
    let h = harness(Ok("CA999"), Duration::from_secs(60));

    let response = h
        .app
        .clone()
        .oneshot(make_call(r#"{"number": "+15550100"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    let body = body_json(response).await;
    assert_eq!(body["status"], "timeout");
    assert_eq!(body["callSid"], "CA999");

    let late = h
        .app
        .clone()
        .oneshot(webhook(
            "/handle-recording",
            "CallSid=CA999&SpeechResult=book",
        ))
        .await
        .unwrap();
    assert_eq!(late.status(), StatusCode::OK);

    let record = h.store.get("CA999").unwrap();
    assert_eq!(record.status, CallStatus::TimedOut);
    assert!(record.transcription.is_none());
    assert!(h.notifier.sent.lock().is_empty());
}

#[tokio::test]
async fn test_no_answer_status_finishes_call_as_hung_up() {
    let h = harness(Ok("CA777"), Duration::from_secs(60));

    let pending = tokio::spawn(
        h.app
            .clone()
            .oneshot(make_call(r#"{"destination": "+15550100"}"#)),
    );
    wait_for_call(&h.store, "CA777").await;

    let ringing = h
        .app
        .clone()
        .oneshot(webhook("/call-status", "CallSid=CA777&CallStatus=ringing"))
        .await
        .unwrap();
    assert_eq!(ringing.status(), StatusCode::OK);
    assert!(!h.store.get("CA777").unwrap().is_terminal());

    let ack = h
        .app
        .clone()
        .oneshot(webhook("/call-status", "CallSid=CA777&CallStatus=no-answer"))
        .await
        .unwrap();
    assert_eq!(ack.status(), StatusCode::OK);
    assert_eq!(body_text(ack).await, "OK");

    let response = pending.await.unwrap().unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["outcome"]["status"], "hung_up");
    assert_eq!(body["outcome"]["transcription"], HANG_UP_SENTINEL);
}

#[tokio::test]
async fn test_empty_speech_completes_with_sentinel() {
    let h = harness(Ok("CA555"), Duration::from_secs(60));

    let pending = tokio::spawn(h.app.clone().oneshot(make_call(r#"{"number": "+15550100"}"#)));
    wait_for_call(&h.store, "CA555").await;

    let ack = h
        .app
        .clone()
        .oneshot(webhook("/handle-recording", "CallSid=CA555&SpeechResult="))
        .await
        .unwrap();
    assert!(body_text(ack).await.contains("Thank you. Goodbye."));

    let body = body_json(pending.await.unwrap().unwrap()).await;
    assert_eq!(body["outcome"]["transcription"], NO_SPEECH_SENTINEL);
    assert_eq!(body["outcome"]["status"], "completed");
}

#[tokio::test]
async fn test_duplicate_speech_delivery_notifies_once() {
    let h = harness(Ok("CA123"), Duration::from_secs(60));

    let pending = tokio::spawn(h.app.clone().oneshot(make_call(r#"{"number": "+15550100"}"#)));
    wait_for_call(&h.store, "CA123").await;

    for speech in ["book+please", "cancel+it"] {
        let ack = h
            .app
            .clone()
            .oneshot(webhook(
                "/handle-recording",
                &format!("CallSid=CA123&SpeechResult={}", speech),
            ))
            .await
            .unwrap();
        assert_eq!(ack.status(), StatusCode::OK);
    }

    let body = body_json(pending.await.unwrap().unwrap()).await;
    assert_eq!(body["outcome"]["transcription"], "book please");
    assert_eq!(h.store.get("CA123").unwrap().intent.as_deref(), Some("book_service"));
    assert_eq!(h.notifier.sent.lock().len(), 1);
}

#[tokio::test]
async fn test_webhooks_for_unknown_calls_are_acknowledged() {
    let h = harness(Ok("CA123"), Duration::from_secs(60));

    for (path, form) in [
        ("/handle-recording", "CallSid=CAghost&SpeechResult=book"),
        ("/handle-transcription", "CallSid=CAghost&TranscriptionText=book"),
        ("/call-status", "CallSid=CAghost&CallStatus=completed"),
        ("/call-status", "garbage"),
    ] {
        let response = h.app.clone().oneshot(webhook(path, form)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{}", path);
    }

    assert!(h.store.is_empty());
    assert!(h.notifier.sent.lock().is_empty());
}

#[tokio::test]
async fn test_status_callback_over_get_resolves_call() {
    let h = harness(Ok("CA888"), Duration::from_secs(60));

    let pending = tokio::spawn(h.app.clone().oneshot(make_call(r#"{"number": "+15550100"}"#)));
    wait_for_call(&h.store, "CA888").await;

    let ack = h
        .app
        .clone()
        .oneshot(
            Request::get("/call-status?CallSid=CA888&CallStatus=busy")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(ack.status(), StatusCode::OK);

    let body = body_json(pending.await.unwrap().unwrap()).await;
    assert_eq!(body["outcome"]["status"], "hung_up");
}

#[tokio::test]
async fn test_speech_result_over_get_is_recorded() {
    let h = harness(Ok("CA889"), Duration::from_secs(60));
    h.app
        .clone()
        .oneshot(make_call(r#"{"number": "+15550100", "wait": false}"#))
        .await
        .unwrap();

    let ack = h
        .app
        .clone()
        .oneshot(
            Request::get("/handle-recording?CallSid=CA889&SpeechResult=yes+please")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(ack.status(), StatusCode::OK);

    let record = h.store.get("CA889").unwrap();
    assert_eq!(record.status, CallStatus::Completed);
    assert_eq!(record.intent.as_deref(), Some("confirm"));
}

#[tokio::test]
async fn test_transcription_callback_resolves_call() {
    let h = harness(Ok("CA321"), Duration::from_secs(60));

    let pending = tokio::spawn(h.app.clone().oneshot(make_call(r#"{"number": "+15550100"}"#)));
    wait_for_call(&h.store, "CA321").await;

    let ack = h
        .app
        .clone()
        .oneshot(webhook(
            "/handle-transcription",
            "CallSid=CA321&TranscriptionText=Please+call+back+tomorrow",
        ))
        .await
        .unwrap();
    assert_eq!(body_text(ack).await, "OK");

    let body = body_json(pending.await.unwrap().unwrap()).await;
    assert_eq!(body["outcome"]["intent"], "callback");
    assert_eq!(h.notifier.sent.lock().len(), 1);
}

#[tokio::test]
async fn test_origination_failure_is_server_error_without_record() {
    let h = harness(Err("The number +1555 is unverified"), Duration::from_secs(60));

    let response = h
        .app
        .clone()
        .oneshot(make_call(r#"{"number": "+1555"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("The number +1555 is unverified"));
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_missing_number_is_rejected_before_dialing() {
    let h = harness(Ok("CA123"), Duration::from_secs(60));

    let response = h
        .app
        .clone()
        .oneshot(make_call(r#"{"issue": "brake check"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await["error"].is_string());
    assert!(h.originator.requests.lock().is_empty());

    let response = h.app.clone().oneshot(make_call("not json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(h.originator.requests.lock().is_empty());
}

#[tokio::test]
async fn test_non_blocking_call_returns_poll_url() {
    let h = harness(Ok("CA246"), Duration::from_secs(60));

    let response = h
        .app
        .clone()
        .oneshot(make_call(
            r#"{"number": "+15550100", "issue": "brake check", "wait": false}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert_eq!(body["status"], "initiated");
    assert_eq!(body["callSid"], "CA246");
    assert_eq!(
        body["checkStatusUrl"],
        "https://calls.example.com/get-response/CA246"
    );

    let sent = h.originator.requests.lock().clone();
    assert_eq!(
        sent[0].url,
        "https://calls.example.com/voice-logic?issue=brake%20check"
    );
    assert_eq!(sent[0].status_callback, "https://calls.example.com/call-status");

    let poll = h
        .app
        .clone()
        .oneshot(
            Request::get("/get-response/CA246")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(poll.status(), StatusCode::OK);
    let record = body_json(poll).await;
    assert_eq!(record["callId"], "CA246");
    assert_eq!(record["status"], "initiated");
    assert_eq!(record["metadata"]["issue"], "brake check");
}

#[tokio::test]
async fn test_prompt_fetch_serves_twiml_and_marks_call_listening() {
    let h = harness(Ok("CA246"), Duration::from_secs(60));
    h.app
        .clone()
        .oneshot(make_call(r#"{"number": "+15550100", "wait": false}"#))
        .await
        .unwrap();

    let response = h
        .app
        .clone()
        .oneshot(webhook(
            "/voice-logic?issue=brake%20check",
            "CallSid=CA246&CallStatus=in-progress",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/xml"
    );
    let twiml = body_text(response).await;
    assert!(twiml.contains("We are calling about brake check."));
    assert!(twiml.contains("https://calls.example.com/handle-recording?issue=brake%20check"));
    assert!(twiml.contains(r#"input="speech""#));
    assert!(twiml.contains("We did not hear anything. Goodbye."));

    assert_eq!(
        h.store.get("CA246").unwrap().status,
        CallStatus::AwaitingSpeech
    );
}

#[tokio::test]
async fn test_prompt_fetch_without_form_still_answers() {
    let h = harness(Ok("CA123"), Duration::from_secs(60));

    let response = h
        .app
        .clone()
        .oneshot(Request::get("/voice-logic").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("<Gather"));
}

#[tokio::test]
async fn test_unknown_call_sid_poll_is_not_found() {
    let h = harness(Ok("CA123"), Duration::from_secs(60));

    let response = h
        .app
        .clone()
        .oneshot(
            Request::get("/get-response/CAmissing")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "Call SID not found");
}

#[tokio::test]
async fn test_health_reports_active_calls() {
    let h = harness(Ok("CA246"), Duration::from_secs(60));
    h.app
        .clone()
        .oneshot(make_call(r#"{"number": "+15550100", "wait": false}"#))
        .await
        .unwrap();

    let response = h
        .app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["activeCalls"], 1);
}
