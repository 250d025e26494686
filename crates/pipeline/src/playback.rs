//! Single-segment playback with lifecycle events.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use voiceturn_core::AudioClip;

use crate::PipelineError;

/// Audio output device abstraction.
///
/// `play` decodes and renders one segment, resolving when it has fully
/// played. Implementations must tolerate being dropped mid-segment; the
/// controller cancels the future on `stop`.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn play(&self, clip: &AudioClip) -> Result<(), PipelineError>;
}

/// Playback lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// Emitted synchronously before the sink starts the segment.
    Started,
    /// Emitted exactly once when the segment finishes naturally, is
    /// stopped, or fails.
    Ended,
}

/// Plays exactly one decoded audio segment at a time.
pub struct PlaybackController {
    sink: Arc<dyn AudioSink>,
    playing: Mutex<bool>,
    cancel: Mutex<Option<CancellationToken>>,
    event_tx: broadcast::Sender<PlaybackEvent>,
}

impl PlaybackController {
    pub fn new(sink: Arc<dyn AudioSink>) -> Self {
        let (event_tx, _) = broadcast::channel(32);
        Self {
            sink,
            playing: Mutex::new(false),
            cancel: Mutex::new(None),
            event_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.event_tx.subscribe()
    }

    pub fn is_playing(&self) -> bool {
        *self.playing.lock()
    }

    /// Play one segment to completion.
    ///
    /// Rejects with `Busy` while another segment is active. Sink failures
    /// (malformed or unsupported audio, device trouble) are absorbed and
    /// converted into the normal `Ended` signal so the state machine
    /// always receives a terminating event.
    pub async fn play(&self, clip: &AudioClip) -> Result<(), PipelineError> {
        let token = {
            let mut playing = self.playing.lock();
            if *playing {
                return Err(PipelineError::Busy);
            }
            *playing = true;
            let token = CancellationToken::new();
            *self.cancel.lock() = Some(token.clone());
            token
        };

        let _ = self.event_tx.send(PlaybackEvent::Started);

        let result = tokio::select! {
            r = self.sink.play(clip) => r,
            _ = token.cancelled() => Ok(()),
        };

        *self.playing.lock() = false;
        self.cancel.lock().take();
        let _ = self.event_tx.send(PlaybackEvent::Ended);

        if let Err(e) = result {
            warn!(error = %e, "playback segment failed; reported as ended");
        }
        Ok(())
    }

    /// Halt the current segment. Idempotent and safe when nothing is
    /// playing; the in-flight `play` emits the single `Ended`.
    pub fn stop(&self) {
        if let Some(token) = self.cancel.lock().take() {
            token.cancel();
        }
    }
}
