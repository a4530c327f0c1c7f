//! Wavelet Relay - real-time voice relay for AI hardware companions
//!
//! This library bridges a hardware client speaking raw 16-bit PCM over a
//! binary WebSocket to a speech-to-speech model service speaking a JSON
//! event protocol:
//! - Wake-word gating with pre-roll so utterance onsets reach the model
//! - Bidirectional resampling and channel mixing between the two formats
//! - Re-chunking of bursty model output into fixed-size client frames
//! - Per-connection supervision with cooperative cancellation
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  binary PCM   ┌─────────────────────────────┐
//! │   Hardware   │──────────────▶│ ingress → downmix/resample  │
//! │    client    │               │        → wake gate          │
//! │ (mic+speaker)│◀──────────────│ egress ← re-chunk ← resample│
//! └──────────────┘  fixed frames └──────────────┬──────────────┘
//!                                               │ JSON events,
//!                                               │ base64 pcm16
//!                                ┌──────────────▼──────────────┐
//!                                │  speech-to-speech model     │
//!                                │  (realtime WebSocket API)   │
//!                                └─────────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod server;
pub mod upstream;
pub mod wake;

pub use audio::{Audio, FrameChunker};
pub use config::Config;
pub use error::{Error, Result};
pub use upstream::{AiClient, EventType, RealtimeClient};
pub use wake::{EnergyDetector, KeywordDetector, WakeGate};
