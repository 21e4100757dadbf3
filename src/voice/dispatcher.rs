//! Webhook dispatch
//!
//! Turns Twilio callbacks into call-state transitions and fires the
//! rendezvous the dialing request is parked on. Every entry point tolerates
//! unknown call SIDs and duplicate deliveries; none of them can fail, since
//! Twilio retries anything that looks like an error.

use super::call::{CallRecord, CallStatus, Transition};
use super::config::ScriptConfig;
use super::intent::{Intent, IntentMatcher};
use super::notify::{NotificationPayload, Notifier};
use super::store::CallStore;
use super::twiml::ScriptBuilder;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Speech recognized during the gather
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechResultEvent {
    pub call_id: String,
    pub text: Option<String>,
    pub confidence: Option<f32>,
}

/// Call progress reported to the status callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallStatusEvent {
    pub call_id: String,
    pub status: String,
}

/// Twilio asking what to say on an answered call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptFetchEvent {
    pub call_id: Option<String>,
    pub issue: Option<String>,
}

/// What a speech-result event did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechDisposition {
    /// No record for this SID
    UnknownCall,
    /// Transcription stored and rendezvous fired
    Recorded { intent: Intent, notified: bool },
    /// The call had already finished; nothing changed
    AlreadyTerminal(CallStatus),
}

/// What a call-status event did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusDisposition {
    /// Progress update that does not end the call
    NotTerminal,
    /// No record for this SID
    UnknownCall,
    /// Call moved to the given terminal state and rendezvous fired
    Finished(CallStatus),
    /// The call had already finished; nothing changed
    AlreadyTerminal(CallStatus),
}

/// Map a Twilio `CallStatus` value to the terminal state it implies
pub fn terminal_status_for(provider_status: &str) -> Option<CallStatus> {
    match provider_status.trim().to_ascii_lowercase().as_str() {
        "completed" | "busy" | "no-answer" | "canceled" => Some(CallStatus::HungUp),
        "failed" => Some(CallStatus::Failed),
        _ => None,
    }
}

/// Fires a call's rendezvous when dropped
struct SignalOnDrop<'a> {
    store: &'a CallStore,
    call_id: &'a str,
}

impl Drop for SignalOnDrop<'_> {
    fn drop(&mut self) {
        self.store.signal(self.call_id);
    }
}

/// Routes webhook events to the call store
pub struct WebhookDispatcher {
    store: Arc<CallStore>,
    intents: IntentMatcher,
    scripts: ScriptBuilder,
    notifier: Option<Arc<dyn Notifier>>,
    notify_timeout: Duration,
}

impl std::fmt::Debug for WebhookDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookDispatcher")
            .field("store", &self.store)
            .field("intents", &self.intents)
            .field("scripts", &self.scripts)
            .field("notifier", &self.notifier.as_ref().map(|_| "Notifier"))
            .field("notify_timeout", &self.notify_timeout)
            .finish()
    }
}

impl WebhookDispatcher {
    /// Create a dispatcher without downstream notifications. Intent keywords
    /// double as speech recognition hints.
    pub fn new(store: Arc<CallStore>, script: ScriptConfig, intents: IntentMatcher) -> Self {
        let hints = intents.keywords().into_iter().map(str::to_string).collect();
        Self {
            store,
            scripts: ScriptBuilder::new(script, hints),
            intents,
            notifier: None,
            notify_timeout: Duration::from_secs(5),
        }
    }

    /// Send notifications through `notifier`, giving up after `timeout`
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>, timeout: Duration) -> Self {
        self.notifier = Some(notifier);
        self.notify_timeout = timeout;
        self
    }

    /// Record a speech result, classify it, notify if the intent asks for
    /// it, then wake the dialing request.
    pub async fn speech_result(&self, event: SpeechResultEvent) -> SpeechDisposition {
        let text = event.text.unwrap_or_default();
        let outcome = self.store.update_if_exists(&event.call_id, |rec| {
            match rec.complete(&text, event.confidence) {
                Transition::Applied => {
                    let intent = self.intents.classify(&text);
                    rec.set_intent(intent.name.clone());
                    Ok((intent, rec.clone()))
                }
                _ => Err(rec.status),
            }
        });

        match outcome {
            None => {
                warn!(call_sid = %event.call_id, "speech result for unknown call");
                SpeechDisposition::UnknownCall
            }
            Some(Err(status)) => {
                info!(call_sid = %event.call_id, %status, "ignoring speech result for finished call");
                SpeechDisposition::AlreadyTerminal(status)
            }
            Some(Ok((intent, record))) => {
                // Fires even if this future is dropped while notifying
                let _signal = SignalOnDrop {
                    store: &self.store,
                    call_id: &record.call_id,
                };
                info!(
                    call_sid = %record.call_id,
                    intent = %intent.name,
                    confidence = ?record.confidence,
                    "speech result recorded"
                );
                let notified = if intent.notify {
                    self.notify(&record, &intent).await
                } else {
                    false
                };
                SpeechDisposition::Recorded { intent, notified }
            }
        }
    }

    /// Finish a call that ended without speech. Non-terminal progress and
    /// calls that already finished are acknowledged without change.
    pub fn call_status(&self, event: &CallStatusEvent) -> StatusDisposition {
        let Some(target) = terminal_status_for(&event.status) else {
            debug!(call_sid = %event.call_id, status = %event.status, "call progress");
            return StatusDisposition::NotTerminal;
        };

        match self
            .store
            .update_if_exists(&event.call_id, |rec| rec.hang_up(target))
        {
            None => {
                warn!(call_sid = %event.call_id, status = %event.status, "status callback for unknown call");
                StatusDisposition::UnknownCall
            }
            Some(Transition::Applied) => {
                info!(call_sid = %event.call_id, status = %event.status, "call ended without speech");
                self.store.signal(&event.call_id);
                StatusDisposition::Finished(target)
            }
            Some(Transition::AlreadyTerminal(status)) => {
                debug!(call_sid = %event.call_id, %status, "status callback after call finished");
                StatusDisposition::AlreadyTerminal(status)
            }
            Some(Transition::Ignored) => StatusDisposition::NotTerminal,
        }
    }

    /// Prompt script for an answered call. A known `Initiated` call moves to
    /// `AwaitingSpeech`; nothing else about the record changes.
    pub fn script(&self, event: &ScriptFetchEvent, base_url: &Url) -> String {
        if let Some(call_id) = event.call_id.as_deref() {
            match self
                .store
                .update_if_exists(call_id, |rec| rec.mark_awaiting_speech())
            {
                Some(transition) => debug!(call_sid = %call_id, ?transition, "prompt served"),
                None => debug!(call_sid = %call_id, "prompt served for untracked call"),
            }
        }
        self.scripts.prompt(event.issue.as_deref(), base_url)
    }

    /// Closing script after a speech result
    pub fn acknowledgement(&self, speech: Option<&str>) -> String {
        self.scripts.acknowledgement(speech)
    }

    /// Goodbye and hang up, for calls that cannot be scripted
    pub fn farewell(&self) -> String {
        self.scripts.farewell()
    }

    async fn notify(&self, record: &CallRecord, intent: &Intent) -> bool {
        let Some(notifier) = self.notifier.as_ref() else {
            debug!(call_sid = %record.call_id, "notifications disabled");
            return false;
        };

        let payload = NotificationPayload::from_record(record, &intent.name);
        match tokio::time::timeout(self.notify_timeout, notifier.notify(&payload)).await {
            Ok(Ok(())) => {
                info!(call_sid = %record.call_id, intent = %intent.name, "notification sent");
                true
            }
            Ok(Err(e)) => {
                warn!(call_sid = %record.call_id, error = %e, "notification failed");
                false
            }
            Err(_) => {
                warn!(
                    call_sid = %record.call_id,
                    timeout_ms = self.notify_timeout.as_millis() as u64,
                    "notification timed out"
                );
                false
            }
        }
    }
}
