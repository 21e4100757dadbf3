//! Voice Calls Module
//!
//! Outbound call placement via Twilio, speech gathering, and the rendezvous
//! between the request that dials and the webhooks that answer it.

pub mod call;
pub mod config;
pub mod dispatcher;
pub mod intent;
pub mod notify;
pub mod orchestrator;
pub mod rendezvous;
pub mod store;
pub mod twilio;
pub mod twiml;

pub use call::*;
pub use config::*;
pub use dispatcher::*;
pub use intent::*;
pub use notify::*;
pub use orchestrator::*;
pub use rendezvous::*;
pub use store::*;
pub use twilio::*;
pub use twiml::*;

use thiserror::Error;

/// Voice module errors
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Twilio error: {0}")]
    Provider(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Call already tracked: {0}")]
    DuplicateCall(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type for voice operations
pub type Result<T> = std::result::Result<T, VoiceError>;
