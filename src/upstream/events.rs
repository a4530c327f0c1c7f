//! Upstream event taxonomy and JSON envelopes
//!
//! The model service speaks JSON text frames discriminated by a top-level
//! `type` field. Inbound frames decode into [`ServerEvent`] variants keyed on
//! that discriminator; unknown types map to [`ServerEvent::Unknown`] and are
//! logged rather than treated as errors. Outbound envelopes are concrete
//! serializable structs.

use serde::{Deserialize, Serialize};

/// Upstream event identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// `error`
    Error,
    /// `session.update`
    SessionUpdate,
    /// `session.created`
    SessionCreated,
    /// `input_audio_buffer.append`
    InputAudioBufferAppend,
    /// `input_audio_buffer.speech_started`
    SpeechStarted,
    /// `input_audio_buffer.speech_stopped`
    SpeechStopped,
    /// `input_audio_buffer.cleared`
    InputAudioBufferCleared,
    /// `response.audio.delta`
    ResponseAudioDelta,
    /// `response.audio.done`
    ResponseAudioDone,
    /// `response.audio_transcript.delta`
    TranscriptDelta,
    /// `response.audio_transcript.done`
    TranscriptDone,
}

impl EventType {
    /// Wire identifier
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::SessionUpdate => "session.update",
            Self::SessionCreated => "session.created",
            Self::InputAudioBufferAppend => "input_audio_buffer.append",
            Self::SpeechStarted => "input_audio_buffer.speech_started",
            Self::SpeechStopped => "input_audio_buffer.speech_stopped",
            Self::InputAudioBufferCleared => "input_audio_buffer.cleared",
            Self::ResponseAudioDelta => "response.audio.delta",
            Self::ResponseAudioDone => "response.audio.done",
            Self::TranscriptDelta => "response.audio_transcript.delta",
            Self::TranscriptDone => "response.audio_transcript.done",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound envelope, classified on the `type` discriminator
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Server-reported failure; terminates the stream
    #[serde(rename = "error")]
    Error {
        /// Structured error payload
        error: ErrorDetail,
    },

    /// Session acknowledged by the server
    #[serde(rename = "session.created")]
    SessionCreated,

    /// One chunk of response audio
    #[serde(rename = "response.audio.delta")]
    AudioDelta {
        /// Base64-encoded pcm16 mono 24 kHz payload
        delta: String,
    },

    /// The response's audio stream is complete
    #[serde(rename = "response.audio.done")]
    AudioDone,

    /// Server VAD observed the start of user speech
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted,

    /// Server VAD observed the end of user speech
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped,

    /// The input audio buffer was cleared
    #[serde(rename = "input_audio_buffer.cleared")]
    InputAudioBufferCleared,

    /// Incremental transcript of the response audio
    #[serde(rename = "response.audio_transcript.delta")]
    TranscriptDelta,

    /// Transcript complete
    #[serde(rename = "response.audio_transcript.done")]
    TranscriptDone,

    /// Any type the relay does not act on
    #[serde(other)]
    Unknown,
}

/// Payload of an `error` envelope
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail {
    /// Error class, e.g. `invalid_request_error`
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// Machine-readable code
    #[serde(default)]
    pub code: Option<String>,
    /// Human-readable description
    pub message: String,
    /// Offending parameter, when applicable
    #[serde(default)]
    pub param: Option<String>,
    /// Correlates with the client event that caused the failure
    #[serde(default)]
    pub event_id: Option<String>,
}

/// Outbound `session.update` envelope
#[derive(Debug, Serialize)]
pub struct SessionUpdate<'a> {
    /// Always `session.update`
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Session parameters
    pub session: SessionParams<'a>,
}

/// Session parameters for the configure handshake
#[derive(Debug, Serialize)]
pub struct SessionParams<'a> {
    /// Response modalities the relay consumes
    pub modalities: &'a [&'a str],
    /// Input audio encoding
    pub input_audio_format: &'a str,
    /// System prompt, when configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<&'a str>,
    /// Server-side voice activity detection parameters
    pub turn_detection: TurnDetection,
}

/// Server VAD configuration
#[derive(Debug, Serialize)]
pub struct TurnDetection {
    /// Always `server_vad`
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Activation threshold
    pub threshold: f32,
    /// Audio kept before detected speech, in milliseconds
    pub prefix_padding_ms: u32,
    /// Silence that closes a turn, in milliseconds
    pub silence_duration_ms: u32,
}

impl Default for TurnDetection {
    fn default() -> Self {
        Self {
            kind: "server_vad",
            threshold: 0.5,
            prefix_padding_ms: 300,
            silence_duration_ms: 500,
        }
    }
}

impl<'a> SessionUpdate<'a> {
    /// Build the configure envelope the relay sends right after connecting
    #[must_use]
    pub fn new(instructions: Option<&'a str>) -> Self {
        Self {
            kind: EventType::SessionUpdate.as_str(),
            session: SessionParams {
                modalities: &["audio", "text"],
                input_audio_format: "pcm16",
                instructions,
                turn_detection: TurnDetection::default(),
            },
        }
    }
}

/// Outbound `input_audio_buffer.append` envelope
#[derive(Debug, Serialize)]
pub struct InputAudioAppend<'a> {
    /// Always `input_audio_buffer.append`
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Base64-encoded pcm16 mono 24 kHz payload
    pub audio: &'a str,
}

impl<'a> InputAudioAppend<'a> {
    /// Wrap an already-encoded audio payload
    #[must_use]
    pub fn new(audio: &'a str) -> Self {
        Self {
            kind: EventType::InputAudioBufferAppend.as_str(),
            audio,
        }
    }
}
