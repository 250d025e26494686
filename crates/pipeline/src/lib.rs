//! Audio-side components of the turn-taking pipeline
//!
//! This crate provides the leaves the coordinator arbitrates between:
//! - Voice activity monitoring with hysteresis
//! - Per-span audio capture
//! - Single-segment playback with lifecycle events
//! - Interruption detection during AI speech
//! - Sentence batching for streamed replies

pub mod interrupt;
pub mod playback;
pub mod recorder;
pub mod reply;
pub mod vad;

pub use interrupt::{
    InterruptConfig, InterruptionDetector, DEFAULT_INTERRUPT_THRESHOLD_DB, DEFAULT_SETTLE_DELAY_MS,
};
pub use playback::{AudioSink, PlaybackController, PlaybackEvent};
pub use recorder::TurnRecorder;
pub use reply::{spawn_chunker, SentenceBatcher, DEFAULT_SENTENCE_BATCH_SIZE};
pub use vad::{
    VadConfig, VadEvent, VoiceActivityMonitor, DEFAULT_SILENCE_DELAY_MS,
    DEFAULT_SILENCE_THRESHOLD_DB, DEFAULT_TICK_MS, DEFAULT_VOICE_THRESHOLD_DB,
};

use thiserror::Error;

/// Pipeline errors.
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("audio device unavailable: {0}")]
    UnavailableDevice(String),

    /// A segment is already playing; the caller queues, this component
    /// never overlaps audio.
    #[error("a segment is already playing")]
    Busy,

    #[error("playback failed: {0}")]
    Playback(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<PipelineError> for voiceturn_core::Error {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::UnavailableDevice(msg) => {
                voiceturn_core::Error::UnavailableDevice(msg)
            }
            PipelineError::Config(msg) => voiceturn_core::Error::UnavailableDevice(msg),
            other => voiceturn_core::Error::Playback(other.to_string()),
        }
    }
}
