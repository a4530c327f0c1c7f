//! Configuration management for the Wavelet relay
//!
//! Resolution order: built-in defaults, then the TOML file overlay, then
//! environment variables. Secrets are expected from the environment. No code
//! outside this module reads environment variables.

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, Result};

/// Default client frame size in bytes (one binary message to the client)
pub const DEFAULT_CLIENT_FRAME_BYTES: usize = 4096;

/// Relay configuration bundle, passed by value into components
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP/WebSocket server settings
    pub server: ServerConfig,

    /// Client socket keepalive and queueing
    pub websocket: WebsocketConfig,

    /// Format of the audio the hardware sends and expects back
    pub audio: AudioConfig,

    /// Upstream model service endpoint
    pub azure: AzureConfig,

    /// Model behavior
    pub ai: AiConfig,

    /// Wake word gating
    pub wake_word: WakeWordConfig,
}

/// Server settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
}

/// Client socket settings
#[derive(Debug, Clone)]
pub struct WebsocketConfig {
    /// Interval between pings to the client
    pub ping_interval: Duration,

    /// How long to wait for a pong before declaring the peer gone
    pub pong_wait: Duration,

    /// Per-write deadline
    pub write_wait: Duration,

    /// Bound on queued outbound frames
    pub max_message_queue: usize,
}

/// Audio encoding on the client socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    /// Raw little-endian 16-bit PCM — the only format the relay implements
    Pcm16,
    /// WAV container (accepted in config, not implemented)
    Wav,
    /// MP3 (accepted in config, not implemented)
    Mp3,
}

impl AudioFormat {
    fn parse(value: &str) -> Result<Self> {
        match value {
            "pcm_16" => Ok(Self::Pcm16),
            "wav" => Ok(Self::Wav),
            "mp3" => Ok(Self::Mp3),
            other => Err(Error::Config(format!("invalid audio format: {other}"))),
        }
    }
}

/// Audio format the hardware sends, and the format it expects back
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Channel count (1 = mono, 2 = interleaved stereo)
    pub channels: u16,

    /// Encoding
    pub format: AudioFormat,

    /// Bytes per binary frame sent to the client
    pub frame_bytes: usize,
}

/// Upstream service endpoint and credentials
#[derive(Debug, Clone)]
pub struct AzureConfig {
    /// API key for the realtime deployment (from `AZURE_OPENAI_KEY`)
    pub openai_key: String,

    /// `wss://` endpoint of the realtime deployment
    pub service_url: String,
}

/// Model behavior
#[derive(Debug, Clone, Default)]
pub struct AiConfig {
    /// File whose contents become the session system prompt
    pub system_prompt_filepath: Option<PathBuf>,

    /// Loaded prompt contents, resolved at config time
    pub system_prompt: Option<String>,
}

/// Wake word gating settings
#[derive(Debug, Clone)]
pub struct WakeWordConfig {
    /// Porcupine engine settings
    pub porcupine: PorcupineConfig,

    /// Peak-amplitude threshold below which a frame counts as silent
    pub silence_threshold: f32,

    /// Trailing silence after which the gate disarms
    pub arm_timeout: Duration,
}

impl Default for WakeWordConfig {
    fn default() -> Self {
        Self {
            porcupine: PorcupineConfig::default(),
            silence_threshold: crate::audio::DEFAULT_SILENCE_THRESHOLD,
            arm_timeout: Duration::from_secs(30),
        }
    }
}

/// Porcupine engine settings
#[derive(Debug, Clone)]
pub struct PorcupineConfig {
    /// Picovoice access key (from `WAVELET_PORCUPINE_KEY`)
    pub api_key: String,

    /// Path to the trained keyword model (`.ppn`)
    pub keyword_model_path: PathBuf,

    /// Detection sensitivity in [0, 1]
    pub sensitivity: f32,
}

impl Default for PorcupineConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            keyword_model_path: PathBuf::new(),
            sensitivity: 0.5,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig { port: 8080 },
            websocket: WebsocketConfig {
                ping_interval: Duration::from_secs(30),
                pong_wait: Duration::from_secs(60),
                write_wait: Duration::from_secs(10),
                max_message_queue: 256,
            },
            audio: AudioConfig {
                sample_rate: 16_000,
                channels: 2,
                format: AudioFormat::Pcm16,
                frame_bytes: DEFAULT_CLIENT_FRAME_BYTES,
            },
            azure: AzureConfig {
                openai_key: String::new(),
                service_url: String::new(),
            },
            ai: AiConfig::default(),
            wake_word: WakeWordConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration: defaults, TOML file overlay, then environment
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when required upstream credentials are
    /// missing or a value fails validation.
    pub fn load() -> Result<Self> {
        let mut config = Self::default();
        config.apply_file(&file::load_config_file())?;
        config.apply_env()?;
        config.load_system_prompt();
        config.validate()?;
        Ok(config)
    }

    /// Overlay values from the TOML file
    fn apply_file(&mut self, overlay: &file::RelayConfigFile) -> Result<()> {
        if let Some(port) = overlay.server.port {
            self.server.port = port;
        }

        if let Some(secs) = overlay.websocket.ping_interval {
            self.websocket.ping_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = overlay.websocket.pong_wait {
            self.websocket.pong_wait = Duration::from_secs(secs);
        }
        if let Some(secs) = overlay.websocket.write_wait {
            self.websocket.write_wait = Duration::from_secs(secs);
        }
        if let Some(queue) = overlay.websocket.max_message_queue {
            self.websocket.max_message_queue = queue;
        }

        if let Some(rate) = overlay.audio.sample_rate {
            self.audio.sample_rate = rate;
        }
        if let Some(channels) = overlay.audio.channels {
            self.audio.channels = channels;
        }
        if let Some(format) = &overlay.audio.format {
            self.audio.format = AudioFormat::parse(format)?;
        }
        if let Some(frame_bytes) = overlay.audio.frame_bytes {
            self.audio.frame_bytes = frame_bytes;
        }

        if let Some(key) = &overlay.azure.openai_key {
            self.azure.openai_key = key.clone();
        }
        if let Some(url) = &overlay.azure.service_url {
            self.azure.service_url = url.clone();
        }

        if let Some(path) = &overlay.ai.system_prompt_filepath {
            self.ai.system_prompt_filepath = Some(path.clone());
        }

        if let Some(key) = &overlay.wake_word.porcupine.api_key {
            self.wake_word.porcupine.api_key = key.clone();
        }
        if let Some(path) = &overlay.wake_word.porcupine.keyword_model_path {
            self.wake_word.porcupine.keyword_model_path = path.clone();
        }
        if let Some(sensitivity) = overlay.wake_word.porcupine.sensitivity {
            self.wake_word.porcupine.sensitivity = sensitivity;
        }
        if let Some(threshold) = overlay.wake_word.silence_threshold {
            self.wake_word.silence_threshold = threshold;
        }
        if let Some(secs) = overlay.wake_word.arm_timeout {
            self.wake_word.arm_timeout = Duration::from_secs(secs);
        }

        Ok(())
    }

    /// Environment variables take precedence over the file
    fn apply_env(&mut self) -> Result<()> {
        if let Ok(port) = std::env::var("WAVELET_PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| Error::Config(format!("invalid WAVELET_PORT: {port}")))?;
        }

        if let Ok(key) = std::env::var("AZURE_OPENAI_KEY") {
            self.azure.openai_key = key;
        }
        if let Ok(url) = std::env::var("AZURE_OPENAI_URL") {
            self.azure.service_url = url;
        }

        if let Ok(key) = std::env::var("WAVELET_PORCUPINE_KEY") {
            self.wake_word.porcupine.api_key = key;
        }

        Ok(())
    }

    /// Resolve the system prompt file into its contents
    fn load_system_prompt(&mut self) {
        let Some(path) = &self.ai.system_prompt_filepath else {
            return;
        };

        match std::fs::read_to_string(path) {
            Ok(prompt) => self.ai.system_prompt = Some(prompt),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to read system prompt file"
                );
            }
        }
    }

    /// Reject configurations the pipeline cannot run with
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the offending value.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(Error::Config("invalid port number: 0".to_string()));
        }

        if self.audio.sample_rate == 0 {
            return Err(Error::Config("invalid sample rate: 0".to_string()));
        }

        if self.audio.channels == 0 {
            return Err(Error::Config("invalid number of channels: 0".to_string()));
        }

        if self.audio.frame_bytes == 0 || self.audio.frame_bytes % 2 != 0 {
            return Err(Error::Config(format!(
                "invalid client frame size: {}",
                self.audio.frame_bytes
            )));
        }

        let sensitivity = self.wake_word.porcupine.sensitivity;
        if !(0.0..=1.0).contains(&sensitivity) {
            return Err(Error::Config(format!(
                "wake word sensitivity out of range: {sensitivity}"
            )));
        }

        if self.azure.openai_key.is_empty() {
            return Err(Error::Config(
                "AZURE_OPENAI_KEY environment variable is required".to_string(),
            ));
        }
        if self.azure.service_url.is_empty() {
            return Err(Error::Config(
                "AZURE_OPENAI_URL environment variable or azure.service_url config is required"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> Config {
        let mut config = Config::default();
        config.azure.openai_key = "key".to_string();
        config.azure.service_url = "wss://example.test/realtime".to_string();
        config
    }

    #[test]
    fn defaults_match_the_wire_contract() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.websocket.ping_interval, Duration::from_secs(30));
        assert_eq!(config.websocket.pong_wait, Duration::from_secs(60));
        assert_eq!(config.websocket.write_wait, Duration::from_secs(10));
        assert_eq!(config.websocket.max_message_queue, 256);
        assert_eq!(config.audio.sample_rate, 16_000);
        assert_eq!(config.audio.channels, 2);
        assert_eq!(config.audio.format, AudioFormat::Pcm16);
        assert_eq!(config.audio.frame_bytes, DEFAULT_CLIENT_FRAME_BYTES);
        assert_eq!(config.wake_word.arm_timeout, Duration::from_secs(30));
        assert!((config.wake_word.silence_threshold - 0.01).abs() < f32::EPSILON);
    }

    #[test]
    fn validation_accepts_a_complete_config() {
        assert!(configured().validate().is_ok());
    }

    #[test]
    fn validation_rejects_port_zero() {
        let mut config = configured();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_zero_sample_rate() {
        let mut config = configured();
        config.audio.sample_rate = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_zero_channels() {
        let mut config = configured();
        config.audio.channels = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_odd_or_zero_frame_size() {
        let mut config = configured();
        config.audio.frame_bytes = 0;
        assert!(config.validate().is_err());

        let mut config = configured();
        config.audio.frame_bytes = 4095;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_out_of_range_sensitivity() {
        let mut config = configured();
        config.wake_word.porcupine.sensitivity = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_requires_upstream_credentials() {
        let mut config = configured();
        config.azure.openai_key.clear();
        assert!(config.validate().is_err());

        let mut config = configured();
        config.azure.service_url.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_audio_format_is_rejected() {
        assert!(AudioFormat::parse("ogg").is_err());
        assert_eq!(AudioFormat::parse("pcm_16").unwrap(), AudioFormat::Pcm16);
        assert_eq!(AudioFormat::parse("wav").unwrap(), AudioFormat::Wav);
        assert_eq!(AudioFormat::parse("mp3").unwrap(), AudioFormat::Mp3);
    }

    #[test]
    fn file_overlay_applies_named_fields_only() {
        let overlay: file::RelayConfigFile = toml::from_str(
            r#"
            [server]
            port = 18790

            [websocket]
            ping_interval = 15
            max_message_queue = 64

            [audio]
            channels = 1
            "#,
        )
        .unwrap();

        let mut config = configured();
        config.apply_file(&overlay).unwrap();

        assert_eq!(config.server.port, 18_790);
        assert_eq!(config.websocket.ping_interval, Duration::from_secs(15));
        assert_eq!(config.websocket.max_message_queue, 64);
        assert_eq!(config.websocket.pong_wait, Duration::from_secs(60));
        assert_eq!(config.audio.channels, 1);
        assert_eq!(config.audio.sample_rate, 16_000);
    }
}
