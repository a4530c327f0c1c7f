//! Error types for the Wavelet relay

use thiserror::Error;

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the relay
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Inbound payload could not be decoded (odd-length PCM, bad base64, ...)
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// Audio has a channel layout no transform supports
    #[error("unsupported channel layout: {channels} channels")]
    UnsupportedChannelLayout {
        /// Channel count of the offending audio
        channels: u16,
    },

    /// A gating-stage frame did not match the detector's required length
    #[error("frame length mismatch: got {actual}, detector requires {expected}")]
    FrameLengthMismatch {
        /// Samples per channel in the offending frame
        actual: usize,
        /// Samples per channel the detector consumes
        expected: usize,
    },

    /// Handshake with the upstream model service failed
    #[error("upstream unreachable: {message}")]
    UpstreamUnreachable {
        /// HTTP status from the failed handshake, when one was received
        status: Option<u16>,
        /// Underlying failure description
        message: String,
    },

    /// The upstream service sent an `error` envelope
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Read or write failure on either socket
    #[error("socket error: {0}")]
    Socket(String),

    /// Cooperative shutdown; the normal exit path, not a user-facing failure
    #[error("cancelled")]
    Cancelled,

    /// Wake word engine error
    #[error("wake word error: {0}")]
    WakeWord(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
