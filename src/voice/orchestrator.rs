//! Outbound call orchestration
//!
//! Dials through a [`CallOriginator`], registers the call once the
//! provider has assigned its SID, then parks the caller on the call's
//! rendezvous until a terminal webhook arrives or the deadline passes.

use super::call::{CallRecord, Transition};
use super::rendezvous::Rendezvous;
use super::store::CallStore;
use super::twilio::{CallOriginator, OriginateRequest};
use super::twiml::callback_url;
use super::{Result, VoiceError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use url::Url;

/// Path Twilio fetches the prompt from
pub const SCRIPT_PATH: &str = "voice-logic";

/// Path Twilio posts call progress to
pub const STATUS_CALLBACK_PATH: &str = "call-status";

/// Path clients poll for a call's record
pub const POLL_PATH: &str = "get-response";

/// Metadata key the declared issue is stored under
pub const ISSUE_KEY: &str = "issue";

/// What the client asked for
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallRequest {
    pub destination: String,
    pub issue: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// A call the provider accepted and the store is tracking
#[derive(Debug, Clone)]
pub struct PlacedCall {
    pub call_id: String,
    rendezvous: Rendezvous,
}

/// How a blocking call attempt ended
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    /// A terminal webhook arrived; the record as it stood on wake-up
    Finished(CallRecord),
    /// The deadline passed first
    TimedOut { call_id: String },
}

/// Places calls and waits for their answers
pub struct CallOrchestrator {
    originator: Arc<dyn CallOriginator>,
    store: Arc<CallStore>,
    from_number: String,
    status_callback_events: Vec<String>,
    wait_timeout: Duration,
}

impl std::fmt::Debug for CallOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallOrchestrator")
            .field("store", &self.store)
            .field("from_number", &self.from_number)
            .field("status_callback_events", &self.status_callback_events)
            .field("wait_timeout", &self.wait_timeout)
            .finish()
    }
}

impl CallOrchestrator {
    pub fn new(
        originator: Arc<dyn CallOriginator>,
        store: Arc<CallStore>,
        from_number: impl Into<String>,
        wait_timeout: Duration,
    ) -> Self {
        Self {
            originator,
            store,
            from_number: from_number.into(),
            status_callback_events: vec!["completed".to_string()],
            wait_timeout,
        }
    }

    /// Progress events Twilio should report to the status callback
    pub fn with_status_callback_events(mut self, events: Vec<String>) -> Self {
        self.status_callback_events = events;
        self
    }

    pub fn wait_timeout(&self) -> Duration {
        self.wait_timeout
    }

    pub fn store(&self) -> &Arc<CallStore> {
        &self.store
    }

    /// Dial, then block until the call finishes or the deadline passes
    pub async fn place_call(&self, request: CallRequest, base_url: &Url) -> Result<CallOutcome> {
        let placed = self.originate(request, base_url).await?;
        Ok(self.await_outcome(placed).await)
    }

    /// Dial and register the call without waiting.
    ///
    /// No record is created unless the provider accepts the call.
    pub async fn originate(&self, request: CallRequest, base_url: &Url) -> Result<PlacedCall> {
        let destination = request.destination.trim();
        if destination.is_empty() {
            return Err(VoiceError::InvalidRequest(
                "destination number is required".to_string(),
            ));
        }

        let issue = request
            .issue
            .as_deref()
            .map(str::trim)
            .filter(|i| !i.is_empty());
        let mut script_url = callback_url(base_url, SCRIPT_PATH);
        if let Some(issue) = issue {
            script_url.push_str("?issue=");
            script_url.push_str(&urlencoding::encode(issue));
        }

        let origination = OriginateRequest {
            to: destination.to_string(),
            from: self.from_number.clone(),
            url: script_url,
            method: "POST".to_string(),
            status_callback: callback_url(base_url, STATUS_CALLBACK_PATH),
            status_callback_method: "POST".to_string(),
            status_callback_events: self.status_callback_events.clone(),
        };

        let call_id = match self.originator.originate(&origination).await {
            Ok(call_id) => call_id,
            Err(e) => {
                error!(to = %destination, error = %e, "call origination failed");
                return Err(e);
            }
        };

        let mut metadata = request.metadata;
        if let Some(issue) = issue {
            metadata.insert(ISSUE_KEY.to_string(), issue.to_string());
        }
        let rendezvous = self
            .store
            .create(CallRecord::new(call_id.clone(), destination, metadata))?;

        info!(call_sid = %call_id, to = %destination, "call initiated");
        Ok(PlacedCall {
            call_id,
            rendezvous,
        })
    }

    /// Wait for a placed call to finish.
    ///
    /// On deadline the record moves to `TimedOut`, so a webhook arriving
    /// later is dropped. If a terminal webhook lands between the deadline
    /// and that transition, its result wins.
    pub async fn await_outcome(&self, placed: PlacedCall) -> CallOutcome {
        let fired = placed.rendezvous.wait(self.wait_timeout).await;

        if !fired {
            let transition = self
                .store
                .update_if_exists(&placed.call_id, |rec| rec.time_out());
            if matches!(transition, Some(Transition::Applied) | None) {
                warn!(
                    call_sid = %placed.call_id,
                    timeout_secs = self.wait_timeout.as_secs(),
                    "no answer before deadline"
                );
                return CallOutcome::TimedOut {
                    call_id: placed.call_id,
                };
            }
        }

        match self.store.get(&placed.call_id) {
            Some(record) => CallOutcome::Finished(record),
            None => CallOutcome::TimedOut {
                call_id: placed.call_id,
            },
        }
    }
}
