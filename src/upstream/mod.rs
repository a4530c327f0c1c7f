//! Upstream speech-to-speech model client
//!
//! Handles:
//! - The [`AiClient`] capability every session supervisor consumes
//! - The realtime WebSocket implementation speaking the JSON event protocol
//! - Event taxonomy and envelope types

mod events;
mod realtime;

pub use events::{
    ErrorDetail, EventType, InputAudioAppend, ServerEvent, SessionUpdate, TurnDetection,
};
pub use realtime::RealtimeClient;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::audio::Audio;
use crate::Result;

/// Sample rate the model consumes and produces
pub const MODEL_SAMPLE_RATE: u32 = 24_000;

/// Capability surface of the upstream model session
///
/// A trait rather than a concrete type so tests substitute a fake upstream;
/// the supervisor never needs more than these five operations.
#[async_trait]
pub trait AiClient: Send + Sync {
    /// Connect, configure the session, and start the background reader
    ///
    /// The reader observes `shutdown` and exits when the supervisor cancels.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UpstreamUnreachable`] when the handshake
    /// fails.
    async fn initialize(&mut self, shutdown: watch::Receiver<bool>) -> Result<()>;

    /// Forward one block of audio to the model
    ///
    /// Input is canonicalized to mono 24 kHz before transmission.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Socket`] on write failure or timeout.
    async fn send_audio(&self, audio: Audio) -> Result<()>;

    /// Take the stream of response audio; yields once, `None` afterwards
    fn take_response_stream(&mut self) -> Option<mpsc::UnboundedReceiver<Audio>>;

    /// Take the stream of lifecycle events; yields once, `None` afterwards
    ///
    /// A server-sent `error` envelope arrives as a terminal `Err` item
    /// carrying [`crate::Error::Upstream`], after which the stream closes.
    fn take_events_stream(&mut self) -> Option<mpsc::UnboundedReceiver<Result<EventType>>>;

    /// Tear the session down; idempotent, safe to call concurrently with
    /// readers, which observe end-of-stream
    async fn close(&self);
}
