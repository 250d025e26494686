//! Turn-taking coordinator for spoken human/AI conversation
//!
//! One `TurnCoordinator` per conversation arbitrates the shared
//! microphone and speaker between the voice activity monitor, the
//! interruption detector, and the playback controller, and drives the
//! transcription / completion / synthesis backends.

pub mod coordinator;
pub mod events;

pub use coordinator::{CoordinatorState, Services, SessionConfig, TurnCoordinator};
pub use events::{EndReason, SessionEvent};

use thiserror::Error;

/// Session errors.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session is {0:?}; expected idle")]
    NotIdle(coordinator::CoordinatorState),

    #[error(transparent)]
    Core(#[from] voiceturn_core::Error),

    #[error(transparent)]
    Pipeline(#[from] voiceturn_pipeline::PipelineError),
}
