//! Configuration loading
//!
//! Reads a JSON5 file, falls back to defaults when it is absent, then
//! applies environment overrides.

use crate::logging::LoggingConfig;
use crate::voice::{
    default_rules, CallsConfig, IntentRule, NotificationConfig, ScriptConfig, TwilioConfig,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "VOXGATE_CONFIG";

/// Port the HTTP server listens on unless configured otherwise
pub const DEFAULT_PORT: u16 = 5000;

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub server: ServerConfig,
    pub twilio: TwilioConfig,
    pub voice: ScriptConfig,
    pub calls: CallsConfig,
    pub notification: NotificationConfig,
    /// Ordered keyword rules; the first match wins
    pub intents: Vec<IntentRule>,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            twilio: TwilioConfig::default(),
            voice: ScriptConfig::default(),
            calls: CallsConfig::default(),
            notification: NotificationConfig::default(),
            intents: default_rules(),
            logging: LoggingConfig::default(),
        }
    }
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Externally reachable base URL handed to Twilio for callbacks.
    /// Derived from the request's Host header when unset.
    pub public_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            public_url: None,
        }
    }
}

impl ServerConfig {
    /// Parsed public URL, normalized to end with a slash
    pub fn public_url(&self) -> Result<Option<Url>, ConfigError> {
        let Some(raw) = self.public_url.as_deref().map(str::trim) else {
            return Ok(None);
        };
        if raw.is_empty() {
            return Ok(None);
        }

        let mut url = Url::parse(raw)
            .map_err(|e| ConfigError::Invalid(format!("server.publicUrl '{}': {}", raw, e)))?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(Some(url))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Config {
    /// Check everything the server needs before it accepts calls
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.twilio.validate().map_err(ConfigError::Invalid)?;
        self.notification.validate().map_err(ConfigError::Invalid)?;
        self.server.public_url()?;

        if self.calls.wait_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "calls.waitTimeoutSecs must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Resolve the config file location.
///
/// An explicit path wins, then `$VOXGATE_CONFIG`, then the platform config
/// directory.
pub fn get_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }

    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }

    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("voxgate")
        .join("config.json5")
}

/// Load configuration from `path` and the process environment
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let mut config = read_config_file(path)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Parse a config file, returning defaults if it does not exist
pub fn read_config_file(path: &Path) -> Result<Config, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => json5::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            Ok(Config::default())
        }
        Err(e) => Err(ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Apply environment overrides.
///
/// - `TWILIO_ACCOUNT_SID`, `TWILIO_AUTH_TOKEN`, `TWILIO_PHONE_NUMBER`
/// - `VOXGATE_HOST`, `VOXGATE_PORT`, `VOXGATE_PUBLIC_URL`
/// - `VOXGATE_NOTIFY_URL` (also enables notifications)
/// - `VOXGATE_LOG_LEVEL`
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(sid) = var("TWILIO_ACCOUNT_SID") {
        config.twilio.account_sid = sid;
    }
    if let Some(token) = var("TWILIO_AUTH_TOKEN") {
        config.twilio.auth_token = token;
    }
    if let Some(number) = var("TWILIO_PHONE_NUMBER") {
        config.twilio.phone_number = number;
    }
    if let Some(host) = var("VOXGATE_HOST") {
        config.server.host = host;
    }
    if let Some(port) = var("VOXGATE_PORT") {
        match port.parse() {
            Ok(parsed) => config.server.port = parsed,
            Err(_) => tracing::warn!(value = %port, "ignoring invalid VOXGATE_PORT"),
        }
    }
    if let Some(url) = var("VOXGATE_PUBLIC_URL") {
        config.server.public_url = Some(url);
    }
    if let Some(url) = var("VOXGATE_NOTIFY_URL") {
        config.notification.url = url;
        config.notification.enabled = true;
    }
    if let Some(level) = var("VOXGATE_LOG_LEVEL") {
        config.logging.level = level;
    }
}
