//! TOML configuration file loading
//!
//! Supports `wavelet.toml` in the working directory or
//! `~/.config/wavelet/config.toml` as a persistent config source. All fields
//! are optional — the file is a partial overlay on top of defaults.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct RelayConfigFile {
    /// HTTP/WebSocket server settings
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Client socket keepalive and queueing
    #[serde(default)]
    pub websocket: WebsocketFileConfig,

    /// Format of the audio the hardware sends and expects back
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Upstream model service endpoint
    #[serde(default)]
    pub azure: AzureFileConfig,

    /// Model behavior
    #[serde(default)]
    pub ai: AiFileConfig,

    /// Wake word gating
    #[serde(default)]
    pub wake_word: WakeWordFileConfig,
}

/// Server settings
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Port to listen on
    pub port: Option<u16>,
}

/// Client socket settings (durations in seconds)
#[derive(Debug, Default, Deserialize)]
pub struct WebsocketFileConfig {
    /// Interval between pings to the client
    pub ping_interval: Option<u64>,

    /// How long to wait for a pong before declaring the peer gone
    pub pong_wait: Option<u64>,

    /// Per-write deadline
    pub write_wait: Option<u64>,

    /// Bound on queued outbound frames
    pub max_message_queue: Option<usize>,
}

/// Audio format settings
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// Sample rate in Hz
    pub sample_rate: Option<u32>,

    /// Channel count (1 = mono, 2 = interleaved stereo)
    pub channels: Option<u16>,

    /// Encoding: "pcm_16", "wav", or "mp3"
    pub format: Option<String>,

    /// Bytes per binary frame sent to the client
    pub frame_bytes: Option<usize>,
}

/// Upstream service settings; the key normally comes from the environment
#[derive(Debug, Default, Deserialize)]
pub struct AzureFileConfig {
    /// API key for the realtime deployment
    pub openai_key: Option<String>,

    /// `wss://` endpoint of the realtime deployment
    pub service_url: Option<String>,
}

/// Model behavior settings
#[derive(Debug, Default, Deserialize)]
pub struct AiFileConfig {
    /// File whose contents become the session system prompt
    pub system_prompt_filepath: Option<PathBuf>,
}

/// Wake word settings
#[derive(Debug, Default, Deserialize)]
pub struct WakeWordFileConfig {
    /// Porcupine engine settings
    #[serde(default)]
    pub porcupine: PorcupineFileConfig,

    /// Peak-amplitude threshold below which a frame counts as silent
    pub silence_threshold: Option<f32>,

    /// Trailing silence (seconds) after which the gate disarms
    pub arm_timeout: Option<u64>,
}

/// Porcupine engine settings
#[derive(Debug, Default, Deserialize)]
pub struct PorcupineFileConfig {
    /// Picovoice access key
    pub api_key: Option<String>,

    /// Path to the trained keyword model (`.ppn`)
    pub keyword_model_path: Option<PathBuf>,

    /// Detection sensitivity in [0, 1]
    pub sensitivity: Option<f32>,
}

/// Load the TOML config file from the first existing standard path
///
/// Returns `RelayConfigFile::default()` if no file exists or it can't be
/// parsed.
pub fn load_config_file() -> RelayConfigFile {
    let Some(path) = config_file_path() else {
        return RelayConfigFile::default();
    };

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                RelayConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            RelayConfigFile::default()
        }
    }
}

/// First existing config file path, checked in order:
/// `./wavelet.toml`, then `~/.config/wavelet/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    let local = PathBuf::from("wavelet.toml");
    if local.exists() {
        return Some(local);
    }

    directories::BaseDirs::new()
        .map(|d| d.config_dir().join("wavelet").join("config.toml"))
        .filter(|p| p.exists())
}
