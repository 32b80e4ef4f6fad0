//! Call orchestration
//!
//! The call-level state machine. Owns the session, wires transcription
//! capture, response generation, and speech playback together, and enforces
//! turn-taking policy: user speech interrupts assistant speech, stale work is
//! cancelled when a new turn begins, and the whole call tears down on
//! demand or when the duration limit is hit.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::audio::AudioOutput;
use crate::backends::{GenerationBackend, SynthesisBackend, TranscriptionBackend};
use crate::call::respond::ResponseGenerator;
use crate::call::speech::SpeechPlayer;
use crate::call::transcribe::{CaptureEvent, TranscriptSource, TranscriptionCapture};
use crate::call::turn::{TurnLog, TurnRole};
use crate::config::{CallConfig, Config};
use crate::{Error, Result};

/// Capture poll cadence in milliseconds
const TICK_MS: u64 = 100;

/// Longest we wait for a sign-off to finish playing before tearing down
const SIGN_OFF_DRAIN_SECS: u64 = 30;

/// Observable call state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// No call
    Idle,
    /// Acquiring the microphone
    Initializing,
    /// In a call, waiting for user speech
    Listening,
    /// A response is being generated
    Thinking,
    /// Assistant audio is being synthesized or played
    Speaking,
    /// Call ended
    Ended,
}

impl CallState {
    /// Short human-readable status line for the presentation layer
    #[must_use]
    pub const fn status_text(self) -> &'static str {
        match self {
            Self::Idle => "Ready to call",
            Self::Initializing => "Connecting...",
            Self::Listening => "Listening",
            Self::Thinking => "Thinking...",
            Self::Speaking => "Speaking",
            Self::Ended => "Call ended",
        }
    }
}

/// Lifecycle phase written only by the orchestrator's own control methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Initializing,
    InCall,
    Ended,
}

/// One active voice conversation, from start to end
#[derive(Debug, Clone)]
pub struct CallSession {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_secs: u64,
    pub is_muted: bool,
    pub is_active: bool,
}

impl CallSession {
    fn begin() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            duration_secs: 0,
            is_muted: false,
            is_active: true,
        }
    }
}

/// Snapshot of the observable status surface
#[derive(Debug, Clone)]
pub struct CallStatus {
    pub state: CallState,
    pub is_listening: bool,
    pub is_synthesizing: bool,
    pub is_speaking: bool,
    pub status_text: &'static str,
    pub duration_secs: u64,
    pub last_error: Option<String>,
}

/// The conversation orchestrator
pub struct Orchestrator {
    call_config: CallConfig,
    capture_enabled: bool,
    capture: TranscriptionCapture,
    generator: Arc<ResponseGenerator>,
    player: Arc<SpeechPlayer>,
    turns: Arc<TurnLog>,
    phase: Phase,
    session: Option<CallSession>,
    /// Readable by spawned turn tasks; flipped only at call start/end
    session_live: Arc<AtomicBool>,
    last_error: Arc<Mutex<Option<String>>>,
}

impl Orchestrator {
    /// Wire an orchestrator from its backends and audio output
    #[must_use]
    pub fn new(
        config: &Config,
        stt: Arc<dyn TranscriptionBackend>,
        stt_fallback: Option<Arc<dyn TranscriptionBackend>>,
        generation: Arc<dyn GenerationBackend>,
        synthesis: Arc<dyn SynthesisBackend>,
        output: Arc<dyn AudioOutput>,
    ) -> Self {
        let turns = Arc::new(TurnLog::new());
        let generator = Arc::new(ResponseGenerator::new(generation, Arc::clone(&turns)));
        generator.set_memory_context(config.call.memory_context.clone());

        let player = Arc::new(SpeechPlayer::new(synthesis, output, config.dedup.speech));
        let capture = TranscriptionCapture::new(stt, stt_fallback, config.dedup.transcript);

        Self {
            call_config: config.call.clone(),
            capture_enabled: config.voice.capture_enabled,
            capture,
            generator,
            player,
            turns,
            phase: Phase::Idle,
            session: None,
            session_live: Arc::new(AtomicBool::new(false)),
            last_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Start a call: acquire the microphone, open the session, and speak the
    /// greeting as the first assistant turn (no user input needed).
    ///
    /// No-op if a call is already active.
    ///
    /// # Errors
    ///
    /// Microphone acquisition failure aborts the start: the error is
    /// recorded, no session is opened, and the call never reaches
    /// [`CallState::Listening`].
    pub async fn start_call(&mut self) -> Result<()> {
        if self.session.is_some() {
            tracing::debug!("call already active");
            return Ok(());
        }

        self.phase = Phase::Initializing;
        self.set_error(None);

        if self.capture_enabled {
            if let Err(e) = self.capture.initialize() {
                tracing::error!(error = %e, "microphone initialization failed");
                self.set_error(Some(e.to_string()));
                self.phase = Phase::Idle;
                return Err(e);
            }
        }

        let session = CallSession::begin();
        tracing::info!(call = %session.id, "call started");
        self.session = Some(session);
        self.session_live.store(true, Ordering::SeqCst);
        self.phase = Phase::InCall;

        let greeting = self.call_config.greeting.clone();
        if !greeting.is_empty() {
            self.turns.append(TurnRole::Assistant, greeting.clone());
            self.player.speak(&greeting).await;
        }

        Ok(())
    }

    /// End the call: stop synthesis, release the microphone, and discard the
    /// session and its turn history. An in-flight generation is left to
    /// finish behind its own busy-guard; the liveness flag keeps its late
    /// reply from being spoken.
    ///
    /// Safe to call from any state.
    pub fn end_call(&mut self) {
        self.session_live.store(false, Ordering::SeqCst);
        self.player.stop();
        self.capture.cleanup();
        self.turns.clear();

        if let Some(session) = self.session.take() {
            tracing::info!(
                call = %session.id,
                duration_secs = session.duration_secs,
                "call ended"
            );
        }
        self.phase = Phase::Ended;
    }

    /// Toggle mute. Muting shuts off the microphone stream; unmuting
    /// restarts it. Returns the new muted state.
    ///
    /// # Errors
    ///
    /// Returns error if no call is active or the stream cannot restart
    pub fn toggle_mute(&mut self) -> Result<bool> {
        let Some(session) = &mut self.session else {
            return Err(Error::Call("no active call".to_string()));
        };

        if session.is_muted {
            self.capture.start()?;
            session.is_muted = false;
            tracing::debug!("unmuted");
        } else {
            self.capture.stop();
            session.is_muted = true;
            tracing::debug!("muted");
        }

        Ok(session.is_muted)
    }

    /// Interrupt assistant speech immediately
    pub fn interrupt(&self) {
        self.player.stop();
    }

    /// Manual-text entry point for devices without usable microphone input.
    /// Feeds straight into response generation, bypassing capture.
    ///
    /// # Errors
    ///
    /// Returns error if no call is active or generation fails
    pub async fn send_text(&self, text: &str) -> Result<bool> {
        if self.session.is_none() {
            return Err(Error::Call("no active call".to_string()));
        }
        run_turn(
            Arc::clone(&self.generator),
            Arc::clone(&self.player),
            Arc::clone(&self.last_error),
            Arc::clone(&self.session_live),
            text.to_string(),
            TranscriptSource::Manual,
        )
        .await
    }

    /// React to a capture event
    pub fn handle_event(&mut self, event: CaptureEvent) {
        match event {
            CaptureEvent::SpeechStarted => {
                // Barge-in: the user's speech wins over assistant audio
                if self.player.is_active() {
                    tracing::info!("barge-in, interrupting assistant speech");
                    self.player.stop();
                }
            }
            CaptureEvent::Transcribed { text, source } => {
                tracing::debug!(text = %text, ?source, "utterance accepted");
                let generator = Arc::clone(&self.generator);
                let player = Arc::clone(&self.player);
                let last_error = Arc::clone(&self.last_error);
                let live = Arc::clone(&self.session_live);
                tokio::spawn(async move {
                    // Failures are recorded in last_error by run_turn
                    let _ = run_turn(generator, player, last_error, live, text, source).await;
                });
            }
        }
    }

    /// One scheduler tick: poll the microphone, dispatch events, advance the
    /// call clock, and enforce the duration limit.
    pub async fn tick(&mut self) {
        if self.phase != Phase::InCall {
            return;
        }

        let playback_active = self.player.is_active();
        let events = self.capture.poll(playback_active).await;
        for event in events {
            self.handle_event(event);
        }

        let mut over_limit = false;
        if let Some(session) = &mut self.session {
            session.duration_secs =
                u64::try_from((Utc::now() - session.started_at).num_seconds()).unwrap_or(0);
            over_limit = self.call_config.max_call_secs > 0
                && session.duration_secs >= self.call_config.max_call_secs;
        }

        if over_limit {
            self.close_over_limit().await;
        }
    }

    /// Run the call loop until the call ends or shutdown is requested
    pub async fn run(&mut self, shutdown: &mut mpsc::Receiver<()>) {
        let mut ticker = tokio::time::interval(Duration::from_millis(TICK_MS));

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }

            if self.phase == Phase::Ended {
                break;
            }
        }

        if self.session.is_some() {
            self.end_call();
        }
    }

    /// Speak the sign-off, let it drain, and end the call
    async fn close_over_limit(&mut self) {
        tracing::info!("call duration limit reached");

        let message = self.call_config.limit_message.clone();
        if !message.is_empty() {
            self.player.speak(&message).await;
            let deadline =
                tokio::time::Instant::now() + Duration::from_secs(SIGN_OFF_DRAIN_SECS);
            while self.player.is_active() && tokio::time::Instant::now() < deadline {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }

        self.end_call();
    }

    /// Current call state. `Thinking` and `Speaking` are derived from the
    /// generator and player so each flag keeps a single writer.
    #[must_use]
    pub fn state(&self) -> CallState {
        match self.phase {
            Phase::Idle => CallState::Idle,
            Phase::Initializing => CallState::Initializing,
            Phase::Ended => CallState::Ended,
            Phase::InCall => {
                if self.generator.is_busy() {
                    CallState::Thinking
                } else if self.player.is_active() {
                    CallState::Speaking
                } else {
                    CallState::Listening
                }
            }
        }
    }

    /// Snapshot of the observable status surface
    #[must_use]
    pub fn status(&self) -> CallStatus {
        let state = self.state();
        let muted = self.session.as_ref().is_some_and(|s| s.is_muted);
        CallStatus {
            state,
            is_listening: state == CallState::Listening && !muted,
            is_synthesizing: self.player.is_synthesizing(),
            is_speaking: self.player.is_speaking(),
            status_text: if muted { "Muted" } else { state.status_text() },
            duration_secs: self.session.as_ref().map_or(0, |s| s.duration_secs),
            last_error: self.last_error.lock().ok().and_then(|e| e.clone()),
        }
    }

    /// The active session, if any
    #[must_use]
    pub const fn session(&self) -> Option<&CallSession> {
        self.session.as_ref()
    }

    /// The speech player (status flags, interrupt)
    #[must_use]
    pub const fn player(&self) -> &Arc<SpeechPlayer> {
        &self.player
    }

    /// The response generator (busy flag, memory context)
    #[must_use]
    pub const fn generator(&self) -> &Arc<ResponseGenerator> {
        &self.generator
    }

    /// The shared turn log
    #[must_use]
    pub const fn turns(&self) -> &Arc<TurnLog> {
        &self.turns
    }

    /// Most recent error line, if any
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|e| e.clone())
    }

    fn set_error(&self, error: Option<String>) {
        if let Ok(mut slot) = self.last_error.lock() {
            *slot = error;
        }
    }
}

/// One conversation turn: interrupt stale playback, reset the speech dedup
/// slot for the new exchange, generate, and hand the reply to the player.
async fn run_turn(
    generator: Arc<ResponseGenerator>,
    player: Arc<SpeechPlayer>,
    last_error: Arc<Mutex<Option<String>>>,
    session_live: Arc<AtomicBool>,
    text: String,
    source: TranscriptSource,
) -> Result<bool> {
    if !session_live.load(Ordering::SeqCst) {
        return Ok(false);
    }

    // Spoken input interrupts whatever the assistant was saying; typed input
    // does not race the microphone, so playback is left alone.
    if source != TranscriptSource::Manual {
        player.stop();
    }
    player.reset_dedup();

    let speak_player = Arc::clone(&player);
    let speak_live = Arc::clone(&session_live);
    let result = generator
        .process_user_message(&text, move |reply| async move {
            // The call may have ended while the response was in flight
            if !speak_live.load(Ordering::SeqCst) {
                tracing::debug!("discarding reply for ended call");
                return;
            }
            speak_player.speak(&reply).await;
        })
        .await;

    match result {
        Ok(accepted) => Ok(accepted),
        Err(e) => {
            if let Ok(mut slot) = last_error.lock() {
                *slot = Some(e.to_string());
            }
            Err(e)
        }
    }
}
