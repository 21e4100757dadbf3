//! Voice Configuration
//!
//! Twilio credentials, spoken-script settings, and call timing.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default Twilio REST API root
pub const DEFAULT_TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";

/// How long `/make-call` blocks for a spoken answer unless configured otherwise
pub const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 60;

/// Twilio account configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TwilioConfig {
    /// Twilio account SID
    pub account_sid: String,
    /// Twilio auth token
    pub auth_token: String,
    /// Twilio phone number used as caller ID
    pub phone_number: String,
    /// REST API root (overridable for test doubles)
    pub api_base_url: String,
    /// Call progress events Twilio reports to the status callback
    pub status_callback_events: Vec<String>,
}

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            account_sid: String::new(),
            auth_token: String::new(),
            phone_number: String::new(),
            api_base_url: DEFAULT_TWILIO_API_BASE.to_string(),
            status_callback_events: vec!["completed".to_string()],
        }
    }
}

impl TwilioConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.account_sid.is_empty() {
            return Err("Twilio account SID is required".to_string());
        }

        if self.auth_token.is_empty() {
            return Err("Twilio auth token is required".to_string());
        }

        if self.phone_number.is_empty() {
            return Err("Twilio phone number is required".to_string());
        }

        if self.api_base_url.is_empty() {
            return Err("Twilio API base URL is required".to_string());
        }

        Ok(())
    }
}

/// What the callee hears
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScriptConfig {
    /// TTS voice
    pub voice: String,
    /// TTS and speech recognition locale
    pub language: String,
    /// Opening prompt
    pub greeting: String,
    /// Tone played right before listening
    pub beep_url: Option<String>,
    /// Spoken when the gather ends without input
    pub fallback_message: String,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            voice: "alice".to_string(),
            language: "en-IN".to_string(),
            greeting: "Please say your full name clearly after the beep.".to_string(),
            beep_url: Some("https://api.twilio.com/cowbell.mp3".to_string()),
            fallback_message: "We did not hear anything. Goodbye.".to_string(),
        }
    }
}

/// Call timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CallsConfig {
    /// Seconds the initiating request waits for a terminal webhook
    pub wait_timeout_secs: u64,
}

impl Default for CallsConfig {
    fn default() -> Self {
        Self {
            wait_timeout_secs: DEFAULT_WAIT_TIMEOUT_SECS,
        }
    }
}

impl CallsConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }
}

/// Downstream notification API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationConfig {
    /// Enable notifications
    pub enabled: bool,
    /// Endpoint receiving the JSON POST
    pub url: String,
    /// Upper bound on a single notification request
    pub timeout_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            timeout_secs: 5,
        }
    }
}

impl NotificationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.enabled {
            return Ok(());
        }

        if self.url.is_empty() {
            return Err("Notification URL is required when notifications are enabled".to_string());
        }

        if self.timeout_secs == 0 {
            return Err("Notification timeout must be at least one second".to_string());
        }

        Ok(())
    }
}
