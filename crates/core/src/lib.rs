//! Core types for the voiceturn conversation coordinator
//!
//! This crate provides foundational types used across all other crates:
//! - Audio frames and captured clips
//! - Conversation turns and history
//! - The shared error taxonomy
//! - Abstract collaborator services (transcription, completion, synthesis)

pub mod audio;
pub mod conversation;
pub mod error;
pub mod services;

pub use audio::{level_db, AudioClip, AudioFrame, LEVEL_FLOOR_DB};
pub use conversation::{ConversationHistory, Turn, TurnRole};
pub use error::{Error, Result};
pub use services::{
    CompletionParams, CompletionService, SynthesisService, TranscriptionService, VoiceStyle,
};
