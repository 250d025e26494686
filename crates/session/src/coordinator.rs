//! Turn coordinator state machine.
//!
//! One coordinator per conversation owns the authoritative state and
//! arbitrates the shared microphone/speaker between the voice activity
//! monitor, the interruption detector, and the playback controller. At
//! most one of the three is armed at any instant; every transition
//! funnels through `set_state`, which performs the arming side effects
//! in one place.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use voiceturn_config::Settings;
use voiceturn_core::{
    AudioClip, AudioFrame, CompletionParams, CompletionService, ConversationHistory, Error,
    SynthesisService, TranscriptionService, Turn, VoiceStyle,
};
use voiceturn_pipeline::{
    spawn_chunker, AudioSink, InterruptConfig, InterruptionDetector, PlaybackController,
    PlaybackEvent, TurnRecorder, VadConfig, VadEvent, VoiceActivityMonitor,
};

use crate::events::{EndReason, SessionEvent};
use crate::SessionError;

/// The single authoritative conversation state.
///
/// Only the coordinator mutates it; components derive their permission
/// to act from it instead of keeping parallel flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// Constructed, not yet started.
    Idle,
    /// Microphone armed, waiting for the human to talk.
    ListeningForUser,
    /// A speech span is open and being captured.
    UserSpeaking,
    /// Transcribing and awaiting the streamed model reply.
    Thinking,
    /// Reply audio is playing; the interruption detector is armed.
    AiSpeaking,
    /// Terminated; all further signals are ignored.
    Ended,
}

/// External services the coordinator drives.
pub struct Services {
    pub transcription: Arc<dyn TranscriptionService>,
    pub completion: Arc<dyn CompletionService>,
    pub synthesis: Arc<dyn SynthesisService>,
    pub sink: Arc<dyn AudioSink>,
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub vad: VadConfig,
    pub interrupt: InterruptConfig,
    /// Complete sentences batched into one synthesis request.
    pub sentence_batch_size: usize,
    pub completion: CompletionParams,
    pub voice: VoiceStyle,
    /// Captures below this byte floor are discarded as echo or noise.
    pub min_utterance_bytes: usize,
    /// Fixed utterance spoken after a recoverable backend failure.
    pub apology_text: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            vad: VadConfig::default(),
            interrupt: InterruptConfig::default(),
            sentence_batch_size: voiceturn_pipeline::DEFAULT_SENTENCE_BATCH_SIZE,
            completion: CompletionParams::default(),
            voice: VoiceStyle::default(),
            min_utterance_bytes: 2000,
            apology_text: "Sorry, I ran into a problem. Could you say that again?".to_string(),
        }
    }
}

impl SessionConfig {
    /// Build a session configuration from loaded settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            vad: VadConfig {
                voice_threshold_db: settings.vad.voice_threshold_db,
                silence_threshold_db: settings.vad.silence_threshold_db,
                silence_delay_ms: settings.vad.silence_delay_ms,
                tick_ms: settings.vad.tick_ms,
            },
            interrupt: InterruptConfig {
                threshold_db: settings.interrupt.threshold_db,
                settle_delay_ms: settings.interrupt.settle_delay_ms,
            },
            sentence_batch_size: settings.reply.sentence_batch_size,
            completion: CompletionParams {
                max_tokens: settings.reply.max_tokens,
                temperature: settings.reply.temperature,
            },
            voice: VoiceStyle {
                voice_id: settings.session.voice_id.clone(),
                speaking_rate: settings.session.speaking_rate,
            },
            min_utterance_bytes: settings.session.min_utterance_bytes,
            apology_text: settings.session.apology_text.clone(),
        }
    }
}

/// Turn-taking coordinator for one conversation.
pub struct TurnCoordinator {
    session_id: String,
    config: Mutex<SessionConfig>,
    state: Mutex<CoordinatorState>,
    monitor: Mutex<VoiceActivityMonitor>,
    recorder: Mutex<TurnRecorder>,
    interrupt: Mutex<InterruptionDetector>,
    playback: Arc<PlaybackController>,
    history: Mutex<ConversationHistory>,
    services: Services,
    /// Guard latch: at most one transcription-to-reply pipeline runs at
    /// a time; a second span-close arriving mid-flight is ignored.
    processing: AtomicBool,
    /// Remaining ticks of post-interruption settle, during which frames
    /// are recorded but not classified.
    settle_ticks: AtomicU64,
    ended: AtomicBool,
    cancel: Mutex<Option<CancellationToken>>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl TurnCoordinator {
    pub fn new(
        session_id: impl Into<String>,
        config: SessionConfig,
        services: Services,
    ) -> Result<Arc<Self>, SessionError> {
        let monitor = VoiceActivityMonitor::new(config.vad.clone())?;
        let interrupt = InterruptionDetector::new(config.interrupt.clone());
        let playback = Arc::new(PlaybackController::new(Arc::clone(&services.sink)));
        let (event_tx, _) = broadcast::channel(64);

        let coordinator = Arc::new(Self {
            session_id: session_id.into(),
            config: Mutex::new(config),
            state: Mutex::new(CoordinatorState::Idle),
            monitor: Mutex::new(monitor),
            recorder: Mutex::new(TurnRecorder::new()),
            interrupt: Mutex::new(interrupt),
            playback,
            history: Mutex::new(ConversationHistory::new()),
            services,
            processing: AtomicBool::new(false),
            settle_ticks: AtomicU64::new(0),
            ended: AtomicBool::new(false),
            cancel: Mutex::new(None),
            event_tx,
        });
        coordinator.spawn_playback_forwarder();
        Ok(coordinator)
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> CoordinatorState {
        *self.state.lock()
    }

    /// History snapshot for the UI layer, system turn excluded.
    pub fn history(&self) -> Vec<Turn> {
        self.history.lock().visible()
    }

    pub fn is_ai_speaking(&self) -> bool {
        self.state() == CoordinatorState::AiSpeaking
    }

    pub fn is_user_speaking(&self) -> bool {
        self.state() == CoordinatorState::UserSpeaking
    }

    pub fn monitor_armed(&self) -> bool {
        self.monitor.lock().is_armed()
    }

    pub fn interrupt_armed(&self) -> bool {
        self.interrupt.lock().is_armed()
    }

    pub fn playback_active(&self) -> bool {
        self.playback.is_playing()
    }

    // Runtime tunables. Each feeds the live component and the stored
    // config so later turns see the same value.

    pub fn set_voice_threshold_db(&self, level: f32) {
        self.config.lock().vad.voice_threshold_db = level;
        self.monitor.lock().set_voice_threshold_db(level);
    }

    pub fn set_silence_threshold_db(&self, level: f32) {
        self.config.lock().vad.silence_threshold_db = level;
        self.monitor.lock().set_silence_threshold_db(level);
    }

    pub fn set_silence_delay_ms(&self, delay_ms: u64) {
        self.config.lock().vad.silence_delay_ms = delay_ms;
        self.monitor.lock().set_silence_delay_ms(delay_ms);
    }

    pub fn set_interrupt_threshold_db(&self, level: f32) {
        self.config.lock().interrupt.threshold_db = level;
        self.interrupt.lock().set_threshold_db(level);
    }

    pub fn set_sentence_batch_size(&self, batch_size: usize) {
        self.config.lock().sentence_batch_size = batch_size.max(1);
    }

    /// Start the conversation: install the system turn, play the opening
    /// greeting, then open the first listening window.
    ///
    /// Failures during this opening exchange are fatal to starting and
    /// surface to the caller.
    pub async fn begin(&self, context: &str, agent_label: &str) -> Result<(), SessionError> {
        {
            let state = *self.state.lock();
            if state != CoordinatorState::Idle {
                return Err(SessionError::NotIdle(state));
            }
        }
        info!(session = %self.session_id, "conversation starting");
        let _ = self.event_tx.send(SessionEvent::Started {
            session_id: self.session_id.clone(),
        });
        self.history
            .lock()
            .set_system(system_prompt(context, agent_label));

        match self.stream_reply().await {
            Ok(()) => Ok(()),
            // The greeting was interrupted or the session was torn down;
            // either way the conversation is underway or over.
            Err(e) if e.is_abort() => Ok(()),
            Err(e) => Err(SessionError::Core(e)),
        }
    }

    /// Feed one audio frame; called once per monitoring tick.
    ///
    /// Routing depends on the current state: listening feeds the voice
    /// monitor, an open span records and watches for closure, AI speech
    /// watches for interruption, and every other state ignores audio.
    pub fn process_frame(self: &Arc<Self>, frame: &AudioFrame) {
        match self.state() {
            CoordinatorState::ListeningForUser => {
                let event = self.monitor.lock().push_level(frame.level_db);
                if event == Some(VadEvent::SpeechStart) {
                    {
                        let mut recorder = self.recorder.lock();
                        recorder.begin();
                        recorder.append(frame);
                    }
                    let _ = self.event_tx.send(SessionEvent::SpeechStart);
                    self.set_state(CoordinatorState::UserSpeaking);
                }
            }
            CoordinatorState::UserSpeaking => {
                // Settle window after an interruption: keep recording but
                // hold classification until residual playback audio decays.
                if self.settle_ticks.load(Ordering::Relaxed) > 0 {
                    self.settle_ticks.fetch_sub(1, Ordering::Relaxed);
                    self.recorder.lock().append(frame);
                    return;
                }
                let event = self.monitor.lock().push_level(frame.level_db);
                match event {
                    Some(VadEvent::SpeechEnd) => self.finish_span(),
                    _ => self.recorder.lock().append(frame),
                }
            }
            CoordinatorState::AiSpeaking => {
                if self.interrupt.lock().push_level(frame.level_db) {
                    self.handle_interruption(frame);
                }
            }
            CoordinatorState::Idle | CoordinatorState::Thinking | CoordinatorState::Ended => {}
        }
    }

    /// Terminate the conversation from any state. Idempotent.
    pub async fn end(&self, reason: EndReason) {
        if self.ended.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(session = %self.session_id, "conversation ended");
        if let Some(token) = self.cancel.lock().take() {
            token.cancel();
        }
        self.set_state(CoordinatorState::Ended);
        self.recorder.lock().end();
        self.settle_ticks.store(0, Ordering::Relaxed);
        self.playback.stop();
        let _ = self.event_tx.send(SessionEvent::Ended { reason });
    }

    /// Terminate and clear the history, returning to `Idle` so a fresh
    /// conversation can begin.
    pub async fn reset(&self) {
        self.end(EndReason::Reset).await;
        self.history.lock().reset();
        self.processing.store(false, Ordering::SeqCst);
        self.ended.store(false, Ordering::SeqCst);
        // Leaving Ended is the one transition set_state refuses; a reset
        // is the explicit escape hatch.
        *self.state.lock() = CoordinatorState::Idle;
        debug!(session = %self.session_id, "session reset to idle");
    }

    /// Perform a state transition and its arming side effects.
    fn set_state(&self, to: CoordinatorState) {
        let from = {
            let mut state = self.state.lock();
            if *state == to || *state == CoordinatorState::Ended {
                return;
            }
            let from = *state;
            *state = to;
            from
        };

        // Exactly here, and nowhere else, detectors are armed and
        // disarmed; this is what keeps at most one producer on the
        // microphone and prevents the AI from hearing itself.
        match to {
            CoordinatorState::ListeningForUser => {
                self.interrupt.lock().disarm();
                if let Err(e) = self.monitor.lock().start() {
                    warn!(error = %e, "failed to arm voice monitor");
                }
            }
            CoordinatorState::UserSpeaking => {
                self.interrupt.lock().disarm();
            }
            CoordinatorState::Thinking | CoordinatorState::Idle | CoordinatorState::Ended => {
                let _ = self.monitor.lock().stop();
                self.interrupt.lock().disarm();
            }
            CoordinatorState::AiSpeaking => {
                let _ = self.monitor.lock().stop();
                self.interrupt.lock().arm();
            }
        }

        debug!(?from, ?to, "state transition");
        let _ = self.event_tx.send(SessionEvent::StateChanged { from, to });
    }

    /// A speech span closed; validate the capture and hand it off.
    fn finish_span(self: &Arc<Self>) {
        let clip = self.recorder.lock().end();
        self.settle_ticks.store(0, Ordering::Relaxed);
        let _ = self
            .event_tx
            .send(SessionEvent::SpeechEnd { bytes: clip.len() });

        let min_bytes = self.config.lock().min_utterance_bytes;
        if clip.len() < min_bytes {
            debug!(
                bytes = clip.len(),
                floor = min_bytes,
                "capture below validity floor; discarded"
            );
            self.set_state(CoordinatorState::ListeningForUser);
            return;
        }

        if self
            .processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("span close ignored; a turn is already being processed");
            self.set_state(CoordinatorState::ListeningForUser);
            return;
        }

        self.set_state(CoordinatorState::Thinking);
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_turn(clip).await;
            this.processing.store(false, Ordering::SeqCst);
        });
    }

    /// The human talked over the AI: abandon the reply, keep their
    /// speech.
    fn handle_interruption(self: &Arc<Self>, frame: &AudioFrame) {
        info!(session = %self.session_id, "user interruption during playback");
        if let Some(token) = self.cancel.lock().as_ref() {
            token.cancel();
        }
        self.playback.stop();
        let _ = self.event_tx.send(SessionEvent::Interrupted);

        // Capture the interrupting speech from its first frame.
        {
            let mut recorder = self.recorder.lock();
            recorder.begin();
            recorder.append(frame);
        }
        let (settle_ms, tick_ms) = {
            let config = self.config.lock();
            (config.interrupt.settle_delay_ms, config.vad.tick_ms.max(1))
        };
        self.settle_ticks
            .store(settle_ms / tick_ms, Ordering::Relaxed);
        self.monitor.lock().resume_speaking();
        self.set_state(CoordinatorState::UserSpeaking);
        let _ = self.event_tx.send(SessionEvent::SpeechStart);
    }

    /// Transcribe one captured span and stream the reply.
    async fn run_turn(self: &Arc<Self>, clip: AudioClip) {
        let text = match self.services.transcription.transcribe(&clip).await {
            Ok(text) => text,
            Err(e) => {
                self.recover("transcription", e).await;
                return;
            }
        };
        if text.trim().is_empty() {
            // Nothing to respond to; return to listening without
            // contacting the model.
            debug!("empty transcript; discarding turn");
            self.set_state(CoordinatorState::ListeningForUser);
            return;
        }

        let text = text.trim().to_string();
        self.history.lock().push_user(text.clone());
        let _ = self.event_tx.send(SessionEvent::UserTurn { content: text });

        match self.stream_reply().await {
            Ok(()) => {}
            Err(e) if e.is_abort() => {}
            Err(e) => self.recover("reply", e).await,
        }
    }

    /// Stream a completion over the history, batching sentences into
    /// synthesized chunks played strictly in order.
    ///
    /// Each chunk's playback is awaited before the next synthesis
    /// request, so audio output never overlaps. Returns `Aborted` when
    /// the stream was cancelled by interruption or teardown.
    async fn stream_reply(&self) -> voiceturn_core::Result<()> {
        let cancel = CancellationToken::new();
        *self.cancel.lock() = Some(cancel.clone());

        let (params, batch_size, voice) = {
            let config = self.config.lock();
            (
                config.completion.clone(),
                config.sentence_batch_size,
                config.voice.clone(),
            )
        };
        let turns = self.history.lock().for_completion().to_vec();
        let fragments = self
            .services
            .completion
            .stream(&turns, &params, cancel.clone())
            .await?;
        let (mut chunks, full_text) = spawn_chunker(fragments, batch_size, cancel.clone());

        let mut spoken = String::new();
        let mut first = true;
        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => break,
                c = chunks.recv() => match c {
                    Some(c) => c,
                    None => break,
                },
            };
            let clip = self.services.synthesis.synthesize(&chunk, &voice).await?;
            if cancel.is_cancelled() {
                break;
            }
            if first {
                self.set_state(CoordinatorState::AiSpeaking);
                first = false;
            }
            if let Err(e) = self.playback.play(&clip).await {
                warn!(error = %e, "chunk playback rejected");
            }
            if cancel.is_cancelled() {
                break;
            }
            if !spoken.is_empty() {
                spoken.push(' ');
            }
            spoken.push_str(&chunk);
        }

        let interrupted = cancel.is_cancelled();
        self.cancel.lock().take();

        if interrupted {
            // The remaining queue is discarded; only what was actually
            // heard enters the history.
            drop(chunks);
            if self.state() != CoordinatorState::Ended && !spoken.is_empty() {
                self.history.lock().push_assistant(spoken.clone());
                let _ = self
                    .event_tx
                    .send(SessionEvent::AssistantTurn { content: spoken });
            }
            return Err(Error::Aborted);
        }

        let full = full_text.await.unwrap_or_default();
        let full = full.trim().to_string();
        if !full.is_empty() {
            self.history.lock().push_assistant(full.clone());
            let _ = self
                .event_tx
                .send(SessionEvent::AssistantTurn { content: full });
        }
        self.set_state(CoordinatorState::ListeningForUser);
        Ok(())
    }

    /// Recover from a backend failure: clear partial state, speak one
    /// fixed apology if the session is still active, return to
    /// listening. Cancellations stay silent.
    async fn recover(&self, stage: &str, error: Error) {
        if error.is_abort() {
            return;
        }
        warn!(stage, error = %error, "backend failure; recovering to listening");
        self.cancel.lock().take();
        let _ = self.event_tx.send(SessionEvent::Error {
            message: error.to_string(),
        });
        if self.state() == CoordinatorState::Ended {
            return;
        }

        let (apology, voice) = {
            let config = self.config.lock();
            (config.apology_text.clone(), config.voice.clone())
        };
        if !apology.is_empty() {
            if let Ok(clip) = self.services.synthesis.synthesize(&apology, &voice).await {
                self.set_state(CoordinatorState::AiSpeaking);
                if let Err(e) = self.playback.play(&clip).await {
                    warn!(error = %e, "apology playback rejected");
                }
            }
        }

        // The apology itself may have been interrupted; only re-open the
        // listening window if nothing redirected the state meanwhile.
        let state = self.state();
        if state == CoordinatorState::Thinking || state == CoordinatorState::AiSpeaking {
            self.set_state(CoordinatorState::ListeningForUser);
        }
    }

    fn spawn_playback_forwarder(self: &Arc<Self>) {
        let mut rx = self.playback.subscribe();
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            use tokio::sync::broadcast::error::RecvError;
            loop {
                match rx.recv().await {
                    Ok(PlaybackEvent::Started) => {
                        let _ = event_tx.send(SessionEvent::AiSpeechStart);
                    }
                    Ok(PlaybackEvent::Ended) => {
                        let _ = event_tx.send(SessionEvent::AiSpeechEnd);
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }
}

fn system_prompt(context: &str, agent_label: &str) -> String {
    format!(
        "You are {agent_label}, a spoken conversation partner. {context} \
         Keep replies short and conversational; they will be read aloud."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_from_settings() {
        let mut settings = Settings::default();
        settings.vad.voice_threshold_db = -25.0;
        settings.reply.sentence_batch_size = 2;
        settings.session.min_utterance_bytes = 128;

        let config = SessionConfig::from_settings(&settings);
        assert!((config.vad.voice_threshold_db - (-25.0)).abs() < f32::EPSILON);
        assert_eq!(config.sentence_batch_size, 2);
        assert_eq!(config.min_utterance_bytes, 128);
    }

    #[test]
    fn test_system_prompt_mentions_label() {
        let prompt = system_prompt("Practice interview for a backend role.", "Ava");
        assert!(prompt.contains("Ava"));
        assert!(prompt.contains("backend role"));
    }
}
