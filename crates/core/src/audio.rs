//! Audio frame and clip types.

use serde::{Deserialize, Serialize};

/// Loudness floor in dB assigned to silent or empty sample windows.
pub const LEVEL_FLOOR_DB: f32 = -100.0;

/// Decibel-equivalent loudness of a sample window (20 * log10(rms)).
pub fn level_db(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return LEVEL_FLOOR_DB;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    let rms = (sum_sq / samples.len() as f32).sqrt();
    if rms <= 0.0 {
        LEVEL_FLOOR_DB
    } else {
        (20.0 * rms.log10()).max(LEVEL_FLOOR_DB)
    }
}

/// One frame of mono PCM samples with its measured loudness.
///
/// Frames are ephemeral: one is produced per monitoring tick and dropped
/// once the detectors and the recorder have seen it.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw samples in the range [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Windowed loudness of this frame in dB.
    pub level_db: f32,
    /// Capture timestamp, milliseconds from stream start.
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Create a frame, measuring its loudness from the samples.
    pub fn new(samples: Vec<f32>, sample_rate: u32, timestamp_ms: u64) -> Self {
        let level_db = level_db(&samples);
        Self {
            samples,
            sample_rate,
            level_db,
            timestamp_ms,
        }
    }

    /// Frame duration in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / self.sample_rate as u64
    }
}

/// An encoded audio blob tagged with its MIME type.
///
/// Owns the captured audio of one speech span, or one synthesized reply
/// segment handed to playback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioClip {
    pub data: Vec<u8>,
    pub mime: String,
}

impl AudioClip {
    pub fn new(data: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            data,
            mime: mime.into(),
        }
    }

    /// An empty clip carrying only its encoding tag.
    pub fn empty(mime: impl Into<String>) -> Self {
        Self::new(Vec::new(), mime)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_of_silence_is_floor() {
        assert_eq!(level_db(&[]), LEVEL_FLOOR_DB);
        assert_eq!(level_db(&[0.0; 480]), LEVEL_FLOOR_DB);
    }

    #[test]
    fn test_level_of_constant_amplitude() {
        // RMS of a constant signal equals its amplitude, so 0.1 is -20 dB.
        let samples = vec![0.1f32; 480];
        let level = level_db(&samples);
        assert!((level - (-20.0)).abs() < 0.1, "got {level}");
    }

    #[test]
    fn test_frame_measures_level() {
        let frame = AudioFrame::new(vec![0.5; 160], 16_000, 0);
        assert!(frame.level_db > -7.0 && frame.level_db < -5.0);
        assert_eq!(frame.duration_ms(), 10);
    }

    #[test]
    fn test_empty_clip() {
        let clip = AudioClip::empty("audio/l16;rate=16000");
        assert!(clip.is_empty());
        assert_eq!(clip.len(), 0);
    }
}
