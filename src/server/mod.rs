//! WebSocket server for hardware clients
//!
//! One accepted connection maps to exactly one upstream model session. The
//! upgrade handler builds the per-connection pipeline pieces and hands them
//! to the session supervisor.

pub mod session;

use std::sync::Arc;

use axum::{
    extract::{ws::WebSocket, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
    Router,
};

use crate::config::Config;
use crate::upstream::{AiClient, RealtimeClient};
use crate::wake::KeywordDetector;
use crate::{Error, Result};

/// Builds the upstream client for a new connection
pub type UpstreamFactory = Arc<dyn Fn(&Config) -> Box<dyn AiClient> + Send + Sync>;

/// Builds the wake word detector for a new connection
pub type DetectorFactory = Arc<dyn Fn(&Config) -> Result<Box<dyn KeywordDetector>> + Send + Sync>;

/// Shared server state
///
/// The factories exist so tests can substitute a fake upstream and a
/// scripted detector while exercising the real supervisor.
pub struct AppState {
    /// Relay configuration
    pub config: Config,
    /// Upstream client factory
    pub upstream: UpstreamFactory,
    /// Detector factory
    pub detector: DetectorFactory,
}

impl AppState {
    /// State with the production factories
    #[must_use]
    pub fn new(config: Config) -> Arc<Self> {
        Arc::new(Self {
            config,
            upstream: Arc::new(|config: &Config| {
                Box::new(RealtimeClient::new(
                    &config.azure,
                    config.ai.system_prompt.clone(),
                    config.websocket.pong_wait,
                )) as Box<dyn AiClient>
            }),
            detector: Arc::new(default_detector),
        })
    }
}

/// Detector used when none is injected
///
/// The Porcupine engine when compiled in; otherwise the energy-threshold
/// fallback.
fn default_detector(config: &Config) -> Result<Box<dyn KeywordDetector>> {
    #[cfg(feature = "porcupine")]
    {
        Ok(Box::new(crate::wake::PorcupineDetector::new(
            &config.wake_word.porcupine,
        )?))
    }

    #[cfg(not(feature = "porcupine"))]
    {
        Ok(Box::new(crate::wake::EnergyDetector::new(
            config.wake_word.porcupine.sensitivity,
        )))
    }
}

/// Build the relay router
#[must_use]
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_upgrade))
        .with_state(state)
}

/// Handle a WebSocket upgrade request
async fn ws_upgrade(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Wire one accepted connection into a session
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    tracing::info!("client connected");

    let upstream = (state.upstream)(&state.config);
    let detector = match (state.detector)(&state.config) {
        Ok(detector) => detector,
        Err(e) => {
            tracing::error!(error = %e, "failed to build wake word detector");
            return;
        }
    };

    session::run(socket, state.config.clone(), upstream, detector).await;

    tracing::info!("client disconnected");
}

/// Bind the configured port and serve until interrupted
///
/// # Errors
///
/// Returns an error when the listener cannot bind or the server fails.
pub async fn serve(config: Config) -> Result<()> {
    let port = config.server.port;
    let state = AppState::new(config);
    let router = app(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "relay listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::Socket(e.to_string()))
}

/// Resolves when the process receives an interrupt
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("shutdown signal received");
}
