//! Interruption detection during AI playback.

use tracing::debug;

/// Default interruption threshold.
///
/// Deliberately above the voice threshold so bleed from the speakers into
/// the microphone does not read as an interruption.
pub const DEFAULT_INTERRUPT_THRESHOLD_DB: f32 = -20.0;
/// Default settle window after an interruption, letting the stopped
/// playback's residual audio decay before classification resumes.
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 700;

/// Interruption detector configuration.
#[derive(Debug, Clone)]
pub struct InterruptConfig {
    /// Level above which a sample reads as the human talking over the AI.
    pub threshold_db: f32,
    /// How long voice-activity classification stays suppressed after an
    /// interruption. Recording starts immediately regardless.
    pub settle_delay_ms: u64,
}

impl Default for InterruptConfig {
    fn default() -> Self {
        Self {
            threshold_db: DEFAULT_INTERRUPT_THRESHOLD_DB,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
        }
    }
}

/// Watches the microphone while AI audio plays and fires once when the
/// human talks over it.
///
/// Independent of the voice activity monitor: it runs only during AI
/// speech and self-disarms on the first trigger.
#[derive(Debug)]
pub struct InterruptionDetector {
    config: InterruptConfig,
    armed: bool,
}

impl InterruptionDetector {
    pub fn new(config: InterruptConfig) -> Self {
        Self {
            config,
            armed: false,
        }
    }

    pub fn arm(&mut self) {
        self.armed = true;
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// True on the first armed sample exceeding the threshold.
    pub fn push_level(&mut self, level_db: f32) -> bool {
        if self.armed && level_db > self.config.threshold_db {
            self.armed = false;
            debug!(level_db, "interruption detected");
            return true;
        }
        false
    }

    pub fn settle_delay_ms(&self) -> u64 {
        self.config.settle_delay_ms
    }

    pub fn set_threshold_db(&mut self, level: f32) {
        self.config.threshold_db = level;
    }

    pub fn set_settle_delay_ms(&mut self, delay_ms: u64) {
        self.config.settle_delay_ms = delay_ms;
    }
}
