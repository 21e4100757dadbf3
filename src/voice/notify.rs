//! Downstream notification
//!
//! When a recognized intent asks for it, the call's stored metadata is
//! POSTed as JSON to a configured endpoint. Delivery is best effort: the
//! caller logs failures and carries on.

use super::call::CallRecord;
use super::config::NotificationConfig;
use super::{Result, VoiceError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metadata keys that identify the subject of a call, in lookup order
const SUBJECT_KEYS: &[&str] = &["subject_id", "vehicle_id"];

/// Body sent to the notification endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub call_sid: String,
    pub subject_id: Option<String>,
    pub issue: Option<String>,
    pub intent: String,
    pub transcription: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl NotificationPayload {
    /// Build from a call record and its classified intent
    pub fn from_record(record: &CallRecord, intent: &str) -> Self {
        let subject_id = SUBJECT_KEYS
            .iter()
            .find_map(|key| record.metadata.get(*key))
            .cloned();
        Self {
            call_sid: record.call_id.clone(),
            subject_id,
            issue: record.metadata.get("issue").cloned(),
            intent: intent.to_string(),
            transcription: record.transcription.clone(),
            metadata: record.metadata.clone(),
        }
    }
}

/// Downstream notification sink
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, payload: &NotificationPayload) -> Result<()>;
}

/// JSON-over-HTTP notifier
#[derive(Debug, Clone)]
pub struct HttpNotifier {
    url: String,
    http_client: reqwest::Client,
}

impl HttpNotifier {
    /// Create a notifier whose requests are bounded by the configured timeout
    pub fn new(config: &NotificationConfig) -> Result<Self> {
        config.validate().map_err(VoiceError::Config)?;
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            url: config.url.clone(),
            http_client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, payload: &NotificationPayload) -> Result<()> {
        let response = self.http_client.post(&self.url).json(payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(VoiceError::Notification(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        Ok(())
    }
}
