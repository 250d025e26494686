//! Per-span audio capture.

use voiceturn_core::{AudioClip, AudioFrame};

const FALLBACK_SAMPLE_RATE: u32 = 16_000;

/// Accumulates the audio belonging to exactly one speech span.
///
/// Frames are appended synchronously from the tick path, so nothing
/// arriving between `begin` and the stop signal is dropped.
#[derive(Debug, Default)]
pub struct TurnRecorder {
    buffer: Vec<u8>,
    sample_rate: u32,
    active: bool,
}

impl TurnRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the accumulation buffer and start consuming frames.
    pub fn begin(&mut self) {
        self.buffer.clear();
        self.active = true;
    }

    /// Append one frame as 16-bit little-endian PCM. Ignored when no
    /// recording is active.
    pub fn append(&mut self, frame: &AudioFrame) {
        if !self.active {
            return;
        }
        self.sample_rate = frame.sample_rate;
        self.buffer.reserve(frame.samples.len() * 2);
        for sample in &frame.samples {
            let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            self.buffer.extend_from_slice(&value.to_le_bytes());
        }
    }

    /// Stop recording and hand back the accumulated clip, empty when no
    /// recorder was active.
    pub fn end(&mut self) -> AudioClip {
        self.active = false;
        let rate = if self.sample_rate == 0 {
            FALLBACK_SAMPLE_RATE
        } else {
            self.sample_rate
        };
        AudioClip::new(
            std::mem::take(&mut self.buffer),
            format!("audio/l16;rate={rate}"),
        )
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Bytes accumulated so far for the open span.
    pub fn bytes_pending(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(samples: Vec<f32>) -> AudioFrame {
        AudioFrame::new(samples, 16_000, 0)
    }

    #[test]
    fn test_capture_one_span() {
        let mut recorder = TurnRecorder::new();
        recorder.begin();
        recorder.append(&frame(vec![0.0; 160]));
        recorder.append(&frame(vec![0.5; 160]));
        let clip = recorder.end();
        assert_eq!(clip.len(), 640);
        assert_eq!(clip.mime, "audio/l16;rate=16000");
        assert!(!recorder.is_active());
    }

    #[test]
    fn test_end_without_begin_is_empty() {
        let mut recorder = TurnRecorder::new();
        let clip = recorder.end();
        assert!(clip.is_empty());
    }

    #[test]
    fn test_append_inactive_is_ignored() {
        let mut recorder = TurnRecorder::new();
        recorder.append(&frame(vec![0.5; 160]));
        assert_eq!(recorder.bytes_pending(), 0);
    }

    #[test]
    fn test_begin_resets_previous_capture() {
        let mut recorder = TurnRecorder::new();
        recorder.begin();
        recorder.append(&frame(vec![0.5; 160]));
        recorder.begin();
        assert_eq!(recorder.bytes_pending(), 0);
    }
}
