//! Call State Management
//!
//! The per-call record and the lifecycle it moves through.
//!
//! ```text
//! Initiated ──► AwaitingSpeech ──► Completed | TimedOut | HungUp | Failed
//!     └──────────────────────────────┘
//! ```
//!
//! Terminal states are sticky: once reached, status and transcription never
//! change again, so duplicate or late webhooks are observed and dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Transcription stored when a speech result arrives with no text
pub const NO_SPEECH_SENTINEL: &str = "(No speech detected)";

/// Transcription stored when the call ends before any speech result
pub const HANG_UP_SENTINEL: &str = "User hung up or did not answer";

/// Call status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// Origination accepted, prompt not yet fetched
    Initiated,
    /// Prompt served, listening for speech
    AwaitingSpeech,
    /// Speech result processed
    Completed,
    /// Nobody answered before the caller's deadline
    TimedOut,
    /// Call ended without speech
    HungUp,
    /// Provider reported an unrecoverable failure
    Failed,
}

impl CallStatus {
    /// Whether no further transition is allowed
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CallStatus::Completed | CallStatus::TimedOut | CallStatus::HungUp | CallStatus::Failed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CallStatus::Initiated => "initiated",
            CallStatus::AwaitingSpeech => "awaiting_speech",
            CallStatus::Completed => "completed",
            CallStatus::TimedOut => "timed_out",
            CallStatus::HungUp => "hung_up",
            CallStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of attempting a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The record changed
    Applied,
    /// The record was already terminal; nothing changed
    AlreadyTerminal(CallStatus),
    /// The transition does not apply from the current state
    Ignored,
}

impl Transition {
    pub fn is_applied(self) -> bool {
        matches!(self, Transition::Applied)
    }
}

/// One outbound call attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    /// Twilio call SID
    pub call_id: String,
    /// Lifecycle state
    pub status: CallStatus,
    /// Recognized speech or a sentinel, once terminal
    pub transcription: Option<String>,
    /// Classified intent of the transcription
    pub intent: Option<String>,
    /// Recognizer confidence as reported by Twilio
    pub confidence: Option<f32>,
    /// Number that was dialed
    pub destination: String,
    /// Caller-supplied context, read back for notifications
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CallRecord {
    /// Create a record in the `Initiated` state
    pub fn new(
        call_id: impl Into<String>,
        destination: impl Into<String>,
        metadata: HashMap<String, String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            call_id: call_id.into(),
            status: CallStatus::Initiated,
            transcription: None,
            intent: None,
            confidence: None,
            destination: destination.into(),
            metadata,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The prompt was served; the callee is being listened to.
    pub fn mark_awaiting_speech(&mut self) -> Transition {
        match self.status {
            CallStatus::Initiated => {
                self.status = CallStatus::AwaitingSpeech;
                self.touch();
                Transition::Applied
            }
            status if status.is_terminal() => Transition::AlreadyTerminal(status),
            _ => Transition::Ignored,
        }
    }

    /// Speech was recognized. Empty text stores [`NO_SPEECH_SENTINEL`].
    pub fn complete(&mut self, text: &str, confidence: Option<f32>) -> Transition {
        let text = text.trim();
        let transcription = if text.is_empty() {
            NO_SPEECH_SENTINEL
        } else {
            text
        };
        let outcome = self.finish(CallStatus::Completed, transcription);
        if outcome.is_applied() {
            self.confidence = confidence;
        }
        outcome
    }

    /// The call ended without a speech result.
    pub fn hang_up(&mut self, status: CallStatus) -> Transition {
        self.finish(status, HANG_UP_SENTINEL)
    }

    /// The caller stopped waiting. Transcription stays unset.
    pub fn time_out(&mut self) -> Transition {
        if let Some(outcome) = self.reject_if_terminal() {
            return outcome;
        }
        self.status = CallStatus::TimedOut;
        self.touch();
        Transition::Applied
    }

    /// Attach the classified intent. Only meaningful after `complete`.
    pub fn set_intent(&mut self, intent: impl Into<String>) {
        if self.intent.is_none() {
            self.intent = Some(intent.into());
            self.touch();
        }
    }

    fn finish(&mut self, status: CallStatus, transcription: &str) -> Transition {
        debug_assert!(status.is_terminal());
        if let Some(outcome) = self.reject_if_terminal() {
            return outcome;
        }
        self.status = status;
        self.transcription = Some(transcription.to_string());
        self.touch();
        Transition::Applied
    }

    fn reject_if_terminal(&self) -> Option<Transition> {
        self.status
            .is_terminal()
            .then_some(Transition::AlreadyTerminal(self.status))
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> CallRecord {
        CallRecord::new("CA123", "+15550100", HashMap::new())
    }

    #[test]
    fn test_new_record_is_initiated() {
        let rec = record();
        assert_eq!(rec.call_id, "CA123");
        assert_eq!(rec.status, CallStatus::Initiated);
        assert!(rec.transcription.is_none());
        assert!(rec.intent.is_none());
        assert!(!rec.is_terminal());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!CallStatus::Initiated.is_terminal());
        assert!(!CallStatus::AwaitingSpeech.is_terminal());
        assert!(CallStatus::Completed.is_terminal());
        assert!(CallStatus::TimedOut.is_terminal());
        assert!(CallStatus::HungUp.is_terminal());
        assert!(CallStatus::Failed.is_terminal());
    }

    #[test]
    fn test_mark_awaiting_speech_once() {
        let mut rec = record();
        assert_eq!(rec.mark_awaiting_speech(), Transition::Applied);
        assert_eq!(rec.status, CallStatus::AwaitingSpeech);
        assert_eq!(rec.mark_awaiting_speech(), Transition::Ignored);
    }

    #[test]
    fn test_complete_records_text() {
        let mut rec = record();
        rec.mark_awaiting_speech();
        assert_eq!(rec.complete("  book  ", Some(0.92)), Transition::Applied);
        assert_eq!(rec.status, CallStatus::Completed);
        assert_eq!(rec.transcription.as_deref(), Some("book"));
        assert_eq!(rec.confidence, Some(0.92));
    }

    #[test]
    fn test_complete_without_text_uses_sentinel() {
        let mut rec = record();
        assert_eq!(rec.complete("", None), Transition::Applied);
        assert_eq!(rec.transcription.as_deref(), Some(NO_SPEECH_SENTINEL));
        assert_eq!(rec.status, CallStatus::Completed);
    }

    #[test]
    fn test_terminal_state_is_sticky() {
        let mut rec = record();
        rec.complete("first answer", None);

        assert_eq!(
            rec.complete("second answer", None),
            Transition::AlreadyTerminal(CallStatus::Completed)
        );
        assert_eq!(
            rec.hang_up(CallStatus::HungUp),
            Transition::AlreadyTerminal(CallStatus::Completed)
        );
        assert_eq!(
            rec.time_out(),
            Transition::AlreadyTerminal(CallStatus::Completed)
        );
        assert_eq!(
            rec.mark_awaiting_speech(),
            Transition::AlreadyTerminal(CallStatus::Completed)
        );
        assert_eq!(rec.status, CallStatus::Completed);
        assert_eq!(rec.transcription.as_deref(), Some("first answer"));
    }

    #[test]
    fn test_hang_up_sets_sentinel() {
        let mut rec = record();
        assert_eq!(rec.hang_up(CallStatus::HungUp), Transition::Applied);
        assert_eq!(rec.status, CallStatus::HungUp);
        assert_eq!(rec.transcription.as_deref(), Some(HANG_UP_SENTINEL));
    }

    #[test]
    fn test_late_speech_after_timeout_is_dropped() {
        let mut rec = record();
        assert_eq!(rec.time_out(), Transition::Applied);
        assert!(rec.transcription.is_none());
        assert_eq!(
            rec.complete("too late", None),
            Transition::AlreadyTerminal(CallStatus::TimedOut)
        );
        assert!(rec.transcription.is_none());
        assert_eq!(rec.status, CallStatus::TimedOut);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&CallStatus::AwaitingSpeech).unwrap();
        assert_eq!(json, "\"awaiting_speech\"");
        assert_eq!(CallStatus::HungUp.to_string(), "hung_up");
    }

    #[test]
    fn test_set_intent_only_once() {
        let mut rec = record();
        rec.set_intent("book_service");
        rec.set_intent("cancel");
        assert_eq!(rec.intent.as_deref(), Some("book_service"));
    }
}
