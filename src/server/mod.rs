//! Server module
//!
//! Wires configuration into the voice stack and serves it over HTTP.

pub mod http;

use crate::config::{Config, ConfigError};
use crate::voice::{
    CallOrchestrator, CallStore, HttpNotifier, IntentMatcher, TwilioClient, TwilioWebhookState,
    VoiceError, WebhookDispatcher,
};
use http::{create_router, AppState};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

/// Server error types
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Voice(#[from] VoiceError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Build the shared application state from validated configuration
pub fn build_state(config: &Config) -> Result<AppState, ServerError> {
    config.validate()?;

    let store = Arc::new(CallStore::new());
    let public_url = config.server.public_url()?;

    let mut dispatcher = WebhookDispatcher::new(
        store.clone(),
        config.voice.clone(),
        IntentMatcher::new(config.intents.clone()),
    );
    if config.notification.enabled {
        let notifier = HttpNotifier::new(&config.notification)?;
        info!(url = %notifier.url(), "downstream notifications enabled");
        dispatcher = dispatcher.with_notifier(Arc::new(notifier), config.notification.timeout());
    }

    let twilio = TwilioClient::new(config.twilio.clone())?;
    let orchestrator = CallOrchestrator::new(
        Arc::new(twilio),
        store,
        config.twilio.phone_number.clone(),
        config.calls.wait_timeout(),
    )
    .with_status_callback_events(config.twilio.status_callback_events.clone());

    let webhooks = TwilioWebhookState {
        dispatcher: Arc::new(dispatcher),
        public_url,
    };

    Ok(AppState::new(Arc::new(orchestrator), Arc::new(webhooks)))
}

/// Run the HTTP server until interrupted
pub async fn run_server(config: Config) -> Result<(), ServerError> {
    let state = build_state(&config)?;
    let app = create_router(state);
    let address = config.server.bind_address();

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(|source| ServerError::Bind {
            address: address.clone(),
            source,
        })?;

    info!(
        address = %address,
        public_url = ?config.server.public_url,
        wait_timeout_secs = config.calls.wait_timeout_secs,
        "voxgate listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ServerError::Serve)?;

    info!("voxgate shut down");
    Ok(())
}

/// Waits for SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}
