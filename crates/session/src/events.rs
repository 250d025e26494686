//! Session events delivered to the UI layer.
//!
//! Notifications are a fixed enum delivered through one broadcast
//! subscription per session, rather than open-ended listener
//! registration.

use crate::coordinator::CoordinatorState;

/// Why a conversation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    /// Explicit termination request.
    Requested,
    /// The session was reset for a fresh conversation.
    Reset,
    /// An unrecoverable failure.
    Fatal(String),
}

/// Event emitted by the coordinator.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Conversation started.
    Started { session_id: String },
    /// The coordinator state changed.
    StateChanged {
        from: CoordinatorState,
        to: CoordinatorState,
    },
    /// The human started talking.
    SpeechStart,
    /// The human's speech span closed; `bytes` is the captured size.
    SpeechEnd { bytes: usize },
    /// A user turn entered the history.
    UserTurn { content: String },
    /// An assistant turn entered the history.
    AssistantTurn { content: String },
    /// AI playback started a segment.
    AiSpeechStart,
    /// AI playback finished, was stopped, or failed.
    AiSpeechEnd,
    /// The human talked over the AI; playback was cancelled.
    Interrupted,
    /// A recoverable backend failure.
    Error { message: String },
    /// Conversation ended.
    Ended { reason: EndReason },
}
