//! Error taxonomy shared across the workspace.

use thiserror::Error;

/// Result alias using the shared error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the conversation coordinator and its collaborators.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Microphone or audio context could not be acquired. Fatal to starting
    /// a session; surfaced to the caller without retry.
    #[error("audio device unavailable: {0}")]
    UnavailableDevice(String),

    #[error("transcription failed: {0}")]
    Transcription(String),

    #[error("completion failed: {0}")]
    Completion(String),

    #[error("synthesis failed: {0}")]
    Synthesis(String),

    #[error("playback failed: {0}")]
    Playback(String),

    /// A cancellation token fired. Expected outcome of interruption or
    /// teardown; never logged as an error and never spoken about.
    #[error("operation aborted")]
    Aborted,

    #[error("channel closed")]
    ChannelClosed,
}

impl Error {
    /// True for expected cancellations that must stay silent.
    pub fn is_abort(&self) -> bool {
        matches!(self, Error::Aborted)
    }
}
