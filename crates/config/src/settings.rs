//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Main application settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Voice activity monitoring.
    #[serde(default)]
    pub vad: VadSettings,

    /// Interruption handling during AI speech.
    #[serde(default)]
    pub interrupt: InterruptSettings,

    /// Reply streaming and synthesis batching.
    #[serde(default)]
    pub reply: ReplySettings,

    /// Per-session behavior.
    #[serde(default)]
    pub session: SessionSettings,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings, rejecting combinations the pipeline cannot run
    /// with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vad.tick_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "vad.tick_ms".to_string(),
                message: "tick interval must be non-zero".to_string(),
            });
        }
        if self.vad.silence_threshold_db >= self.vad.voice_threshold_db {
            return Err(ConfigError::InvalidValue {
                field: "vad.silence_threshold_db".to_string(),
                message: format!(
                    "must be strictly below voice threshold ({})",
                    self.vad.voice_threshold_db
                ),
            });
        }
        if self.reply.sentence_batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "reply.sentence_batch_size".to_string(),
                message: "batch size must be at least 1".to_string(),
            });
        }
        if !(0.0..=2.0).contains(&self.reply.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "reply.temperature".to_string(),
                message: "must be within [0.0, 2.0]".to_string(),
            });
        }
        if self.interrupt.threshold_db <= self.vad.voice_threshold_db {
            // Not fatal, but echo from the speakers will likely trigger
            // spurious interruptions.
            tracing::warn!(
                interrupt = self.interrupt.threshold_db,
                voice = self.vad.voice_threshold_db,
                "interruption threshold at or below voice threshold"
            );
        }
        Ok(())
    }
}

/// Voice activity monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadSettings {
    /// Level above which a tick counts as speech (dB).
    #[serde(default = "default_voice_threshold")]
    pub voice_threshold_db: f32,

    /// Level at or below which a tick counts as confirmed silence (dB).
    #[serde(default = "default_silence_threshold")]
    pub silence_threshold_db: f32,

    /// Silence duration before an open span closes (ms).
    #[serde(default = "default_silence_delay")]
    pub silence_delay_ms: u64,

    /// Monitoring tick interval (ms).
    #[serde(default = "default_tick")]
    pub tick_ms: u64,
}

fn default_voice_threshold() -> f32 {
    -30.0
}
fn default_silence_threshold() -> f32 {
    -50.0
}
fn default_silence_delay() -> u64 {
    1000
}
fn default_tick() -> u64 {
    30
}

impl Default for VadSettings {
    fn default() -> Self {
        Self {
            voice_threshold_db: default_voice_threshold(),
            silence_threshold_db: default_silence_threshold(),
            silence_delay_ms: default_silence_delay(),
            tick_ms: default_tick(),
        }
    }
}

/// Interruption detector settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterruptSettings {
    /// Level above which a sample reads as the human talking over the AI
    /// (dB). Kept above the voice threshold to reject speaker bleed.
    #[serde(default = "default_interrupt_threshold")]
    pub threshold_db: f32,

    /// Settle window after an interruption before voice classification
    /// resumes (ms).
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,
}

fn default_interrupt_threshold() -> f32 {
    -20.0
}
fn default_settle_delay() -> u64 {
    700
}

impl Default for InterruptSettings {
    fn default() -> Self {
        Self {
            threshold_db: default_interrupt_threshold(),
            settle_delay_ms: default_settle_delay(),
        }
    }
}

/// Reply streaming settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplySettings {
    /// Complete sentences batched into one synthesis request.
    #[serde(default = "default_batch_size")]
    pub sentence_batch_size: usize,

    /// Generation length cap forwarded to the completion backend.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature forwarded to the completion backend.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_batch_size() -> usize {
    4
}
fn default_max_tokens() -> u32 {
    300
}
fn default_temperature() -> f32 {
    0.7
}

impl Default for ReplySettings {
    fn default() -> Self {
        Self {
            sentence_batch_size: default_batch_size(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

/// Per-session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Captures below this byte floor are discarded as echo or noise.
    #[serde(default = "default_min_utterance_bytes")]
    pub min_utterance_bytes: usize,

    /// Fixed utterance spoken after a recoverable backend failure.
    #[serde(default = "default_apology")]
    pub apology_text: String,

    /// Synthesis voice identifier, backend-specific.
    #[serde(default)]
    pub voice_id: Option<String>,

    /// Synthesis speaking rate (1.0 = normal).
    #[serde(default = "default_speaking_rate")]
    pub speaking_rate: f32,
}

fn default_min_utterance_bytes() -> usize {
    2000
}
fn default_apology() -> String {
    "Sorry, I ran into a problem. Could you say that again?".to_string()
}
fn default_speaking_rate() -> f32 {
    1.0
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            min_utterance_bytes: default_min_utterance_bytes(),
            apology_text: default_apology(),
            voice_id: None,
            speaking_rate: default_speaking_rate(),
        }
    }
}

/// Load settings from files and environment.
///
/// Priority (highest to lowest):
/// 1. Environment variables (VOICETURN_ prefix, `__` separator)
/// 2. config/{env}.yaml (if env specified)
/// 3. config/default.yaml
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder = builder.add_source(File::with_name(&format!("config/{env_name}")).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("VOICETURN")
            .separator("__")
            .try_parsing(true),
    );

    let settings: Settings = builder.build()?.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}
