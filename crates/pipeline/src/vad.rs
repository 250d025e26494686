//! Voice activity monitoring with hysteresis.
//!
//! Classifies per-tick loudness samples into speech and silence. Two
//! thresholds with a dead zone between them prevent flapping; a silence
//! timer holds a span open across brief dips.

use tracing::debug;

use crate::PipelineError;

/// Default level above which a tick counts as speech.
pub const DEFAULT_VOICE_THRESHOLD_DB: f32 = -30.0;
/// Default level at or below which a tick counts as confirmed silence.
pub const DEFAULT_SILENCE_THRESHOLD_DB: f32 = -50.0;
/// Default silence duration before an open span closes.
pub const DEFAULT_SILENCE_DELAY_MS: u64 = 1000;
/// Default monitoring tick interval.
pub const DEFAULT_TICK_MS: u64 = 30;

/// Voice activity monitor configuration.
#[derive(Debug, Clone)]
pub struct VadConfig {
    /// Level above which a tick counts as speech.
    pub voice_threshold_db: f32,
    /// Level at or below which a tick counts as confirmed silence. Must be
    /// strictly below the voice threshold; the gap is the dead zone.
    pub silence_threshold_db: f32,
    /// How long silence must persist before an open span closes. Zero
    /// closes the span on the first confirmed-silence tick.
    pub silence_delay_ms: u64,
    /// Monitoring tick interval; one `push_level` call per tick.
    pub tick_ms: u64,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            voice_threshold_db: DEFAULT_VOICE_THRESHOLD_DB,
            silence_threshold_db: DEFAULT_SILENCE_THRESHOLD_DB,
            silence_delay_ms: DEFAULT_SILENCE_DELAY_MS,
            tick_ms: DEFAULT_TICK_MS,
        }
    }
}

impl VadConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.tick_ms == 0 {
            return Err(PipelineError::UnavailableDevice(
                "monitor has no tick source (tick_ms is zero)".into(),
            ));
        }
        if self.silence_threshold_db >= self.voice_threshold_db {
            return Err(PipelineError::Config(format!(
                "silence threshold ({}) must be below voice threshold ({})",
                self.silence_threshold_db, self.voice_threshold_db
            )));
        }
        Ok(())
    }

    fn delay_ticks(&self) -> u64 {
        self.silence_delay_ms / self.tick_ms
    }
}

/// Event emitted by the monitor on a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadEvent {
    /// First tick above the voice threshold while not already speaking.
    SpeechStart,
    /// The silence timer fired; the open span is closed and monitoring
    /// stops until re-armed.
    SpeechEnd,
}

/// Decides, from a stream of loudness samples, when the human begins and
/// ends talking.
#[derive(Debug)]
pub struct VoiceActivityMonitor {
    config: VadConfig,
    armed: bool,
    speaking: bool,
    silent_ticks: u64,
}

impl VoiceActivityMonitor {
    pub fn new(config: VadConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            config,
            armed: false,
            speaking: false,
            silent_ticks: 0,
        })
    }

    /// Arm the monitor for a fresh listening window.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        self.config.validate()?;
        self.armed = true;
        self.speaking = false;
        self.silent_ticks = 0;
        Ok(())
    }

    /// Disarm. If a span is open it is closed synchronously, so there is
    /// never a dangling open span after stop.
    pub fn stop(&mut self) -> Option<VadEvent> {
        self.armed = false;
        if self.speaking {
            self.speaking = false;
            debug!("speech span force-closed on stop");
            return Some(VadEvent::SpeechEnd);
        }
        None
    }

    /// Re-open monitoring mid-span after an interruption hands the
    /// microphone back while the human is already talking.
    pub fn resume_speaking(&mut self) {
        self.armed = true;
        self.speaking = true;
        self.silent_ticks = 0;
    }

    /// Feed one tick's loudness sample.
    pub fn push_level(&mut self, level_db: f32) -> Option<VadEvent> {
        if !self.armed {
            return None;
        }

        if !self.speaking {
            if level_db > self.config.voice_threshold_db {
                self.speaking = true;
                self.silent_ticks = 0;
                debug!(level_db, "speech span opened");
                return Some(VadEvent::SpeechStart);
            }
            return None;
        }

        if level_db <= self.config.silence_threshold_db {
            if self.silent_ticks >= self.config.delay_ticks() {
                self.speaking = false;
                self.armed = false;
                debug!("speech span closed after silence delay");
                return Some(VadEvent::SpeechEnd);
            }
            self.silent_ticks += 1;
        } else {
            // Level rose back above the silence threshold: the timer is
            // cancelled and the span continues.
            self.silent_ticks = 0;
        }
        None
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    pub fn set_voice_threshold_db(&mut self, level: f32) {
        self.config.voice_threshold_db = level;
    }

    pub fn set_silence_threshold_db(&mut self, level: f32) {
        self.config.silence_threshold_db = level;
    }

    pub fn set_silence_delay_ms(&mut self, delay_ms: u64) {
        self.config.silence_delay_ms = delay_ms;
    }

    pub fn config(&self) -> &VadConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor(voice: f32, silence: f32, delay_ms: u64, tick_ms: u64) -> VoiceActivityMonitor {
        let mut m = VoiceActivityMonitor::new(VadConfig {
            voice_threshold_db: voice,
            silence_threshold_db: silence,
            silence_delay_ms: delay_ms,
            tick_ms,
        })
        .unwrap();
        m.start().unwrap();
        m
    }

    #[test]
    fn test_span_open_close_scenario() {
        // Levels against voice=-15, silence=-50, delay=2 ticks: the span
        // opens at index 2 and closes on the push at index 7.
        let mut m = monitor(-15.0, -50.0, 20, 10);
        let levels = [-60.0, -60.0, -10.0, -10.0, -10.0, -60.0, -60.0, -60.0];
        let mut events = Vec::new();
        for (i, level) in levels.iter().enumerate() {
            if let Some(event) = m.push_level(*level) {
                events.push((i, event));
            }
        }
        assert_eq!(
            events,
            vec![(2, VadEvent::SpeechStart), (7, VadEvent::SpeechEnd)]
        );
    }

    #[test]
    fn test_brief_dip_does_not_close_span() {
        let mut m = monitor(-15.0, -50.0, 30, 10);
        assert_eq!(m.push_level(-10.0), Some(VadEvent::SpeechStart));
        // Two silent ticks, then voice again: timer cancelled.
        assert_eq!(m.push_level(-60.0), None);
        assert_eq!(m.push_level(-60.0), None);
        assert_eq!(m.push_level(-10.0), None);
        assert!(m.is_speaking());
        // A full silent run closes it.
        assert_eq!(m.push_level(-60.0), None);
        assert_eq!(m.push_level(-60.0), None);
        assert_eq!(m.push_level(-60.0), None);
        assert_eq!(m.push_level(-60.0), Some(VadEvent::SpeechEnd));
    }

    #[test]
    fn test_zero_delay_closes_instantly() {
        let mut m = monitor(-15.0, -50.0, 0, 10);
        assert_eq!(m.push_level(-10.0), Some(VadEvent::SpeechStart));
        assert_eq!(m.push_level(-60.0), Some(VadEvent::SpeechEnd));
        assert!(!m.is_armed());
    }

    #[test]
    fn test_dead_zone_does_not_open_span() {
        let mut m = monitor(-15.0, -50.0, 20, 10);
        // Between silence and voice thresholds: not speech.
        assert_eq!(m.push_level(-30.0), None);
        assert!(!m.is_speaking());
    }

    #[test]
    fn test_stop_closes_open_span() {
        let mut m = monitor(-15.0, -50.0, 1000, 10);
        assert_eq!(m.push_level(-10.0), Some(VadEvent::SpeechStart));
        assert_eq!(m.stop(), Some(VadEvent::SpeechEnd));
        assert_eq!(m.stop(), None);
    }

    #[test]
    fn test_disarmed_monitor_ignores_levels() {
        let mut m = monitor(-15.0, -50.0, 20, 10);
        m.stop();
        assert_eq!(m.push_level(-5.0), None);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(VoiceActivityMonitor::new(VadConfig {
            voice_threshold_db: -50.0,
            silence_threshold_db: -30.0,
            ..VadConfig::default()
        })
        .is_err());
        assert!(VoiceActivityMonitor::new(VadConfig {
            tick_ms: 0,
            ..VadConfig::default()
        })
        .is_err());
    }

    #[test]
    fn test_resume_speaking_keeps_span_open() {
        let mut m = monitor(-15.0, -50.0, 20, 10);
        m.stop();
        m.resume_speaking();
        assert!(m.is_speaking());
        assert_eq!(m.push_level(-60.0), None);
        assert_eq!(m.push_level(-60.0), None);
        assert_eq!(m.push_level(-60.0), Some(VadEvent::SpeechEnd));
    }
}
