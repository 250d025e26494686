//! Abstract collaborator services.
//!
//! The transcription, completion, and synthesis backends are pluggable;
//! the coordinator only depends on these narrow contracts.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::audio::AudioClip;
use crate::conversation::Turn;
use crate::error::Result;

/// Generation parameters forwarded to the completion backend.
#[derive(Debug, Clone)]
pub struct CompletionParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            max_tokens: 300,
            temperature: 0.7,
        }
    }
}

/// Voice and style parameters forwarded to the synthesis backend.
#[derive(Debug, Clone)]
pub struct VoiceStyle {
    pub voice_id: Option<String>,
    pub speaking_rate: f32,
}

impl Default for VoiceStyle {
    fn default() -> Self {
        Self {
            voice_id: None,
            speaking_rate: 1.0,
        }
    }
}

/// Speech-to-text backend.
#[async_trait]
pub trait TranscriptionService: Send + Sync {
    /// Transcribe one captured clip. May legitimately return empty text.
    async fn transcribe(&self, clip: &AudioClip) -> Result<String>;
}

/// Language-model backend with streaming output.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Start a streaming completion over the ordered turn history.
    ///
    /// Incremental text fragments arrive on the returned channel; the
    /// channel closing marks the end of the reply. Cancelling the token
    /// abandons the stream mid-flight.
    async fn stream(
        &self,
        turns: &[Turn],
        params: &CompletionParams,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<String>>;
}

/// Text-to-speech backend.
#[async_trait]
pub trait SynthesisService: Send + Sync {
    /// Synthesize one text chunk into an encoded audio segment.
    async fn synthesize(&self, text: &str, voice: &VoiceStyle) -> Result<AudioClip>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params() {
        let params = CompletionParams::default();
        assert_eq!(params.max_tokens, 300);
        assert!((params.temperature - 0.7).abs() < f32::EPSILON);

        let voice = VoiceStyle::default();
        assert!(voice.voice_id.is_none());
        assert!((voice.speaking_rate - 1.0).abs() < f32::EPSILON);
    }
}
