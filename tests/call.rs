//! Conversation core integration tests
//!
//! Exercises the speech player, response generator, and orchestrator with
//! mock backends — no audio hardware or network required.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use sous_voice::audio::{AudioOutput, CancelToken};
use sous_voice::call::{CaptureEvent, TranscriptSource};
use sous_voice::{
    Config, ConversationTurn, DedupTuning, GenerationBackend, Orchestrator, Result, SpeechPlayer,
    SynthesisBackend, TurnRole,
};

/// Synthesis mock: records each requested sentence, optionally slow
struct MockSynth {
    delay: Duration,
    requests: Mutex<Vec<String>>,
}

impl MockSynth {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requested(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SynthesisBackend for MockSynth {
    async fn synthesize(&self, sentence: &str) -> Result<Vec<u8>> {
        self.requests.lock().unwrap().push(sentence.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(format!("mp3:{sentence}").into_bytes())
    }
}

/// Output mock: "plays" for a fixed duration, honoring cancellation; only
/// segments that play to completion are recorded
struct MockOutput {
    delay: Duration,
    completed: Mutex<Vec<usize>>,
}

impl MockOutput {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            completed: Mutex::new(Vec::new()),
        })
    }

    fn completed_count(&self) -> usize {
        self.completed.lock().unwrap().len()
    }
}

#[async_trait]
impl AudioOutput for MockOutput {
    async fn play(&self, mp3: Vec<u8>, cancel: CancelToken) -> Result<()> {
        let step = Duration::from_millis(5);
        let mut remaining = self.delay;
        while remaining > Duration::ZERO {
            if cancel.is_cancelled() {
                return Ok(());
            }
            tokio::time::sleep(step).await;
            remaining = remaining.saturating_sub(step);
        }
        if !cancel.is_cancelled() {
            self.completed.lock().unwrap().push(mp3.len());
        }
        Ok(())
    }
}

/// Generation mock: replies to the last user turn after an optional delay
struct MockGen {
    delay: Duration,
    calls: AtomicUsize,
}

impl MockGen {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationBackend for MockGen {
    async fn respond(&self, turns: &[ConversationTurn], _memory_context: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let last_user = turns
            .iter()
            .rev()
            .find(|t| t.role == TurnRole::User)
            .map(|t| t.content.clone())
            .unwrap_or_default();
        Ok(format!("About {last_user}. One. Two."))
    }
}

/// Recognition mock for orchestrator construction; never invoked in these
/// tests (capture stays disabled)
struct MockStt;

#[async_trait]
impl sous_voice::TranscriptionBackend for MockStt {
    async fn recognize(&self, _audio_wav: &[u8]) -> Result<String> {
        Ok(String::new())
    }
}

fn player(synth: &Arc<MockSynth>, output: &Arc<MockOutput>) -> Arc<SpeechPlayer> {
    Arc::new(SpeechPlayer::new(
        Arc::clone(synth) as Arc<dyn SynthesisBackend>,
        Arc::clone(output) as Arc<dyn AudioOutput>,
        DedupTuning::speech(),
    ))
}

fn orchestrator(
    config: Config,
    generation: &Arc<MockGen>,
    synth: &Arc<MockSynth>,
    output: &Arc<MockOutput>,
) -> Orchestrator {
    Orchestrator::new(
        &config,
        Arc::new(MockStt),
        None,
        Arc::clone(generation) as Arc<dyn GenerationBackend>,
        Arc::clone(synth) as Arc<dyn SynthesisBackend>,
        Arc::clone(output) as Arc<dyn AudioOutput>,
    )
}

fn text_only_config() -> Config {
    let mut config = Config::default();
    config.voice.capture_enabled = false;
    config.call.greeting = String::new();
    config
}

async fn drain_playback(player: &SpeechPlayer) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while player.is_active() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// --- Speech player ---

#[tokio::test]
async fn test_duplicate_text_performs_no_synthesis() {
    let synth = MockSynth::new(Duration::ZERO);
    let output = MockOutput::new(Duration::ZERO);
    let player = player(&synth, &output);

    assert!(player.speak("Hello").await);
    drain_playback(&player).await;
    let token = player.generation();

    assert!(!player.speak("Hello").await);
    assert_eq!(synth.requested().len(), 1);
    assert_eq!(player.generation(), token);
}

#[tokio::test]
async fn test_prefix_extension_performs_no_synthesis() {
    let synth = MockSynth::new(Duration::ZERO);
    let output = MockOutput::new(Duration::ZERO);
    let player = player(&synth, &output);

    assert!(player.speak("The soup needs").await);
    drain_playback(&player).await;
    assert_eq!(synth.requested().len(), 1);

    // Left-extension adding more than 10 characters: slot updates, no audio
    assert!(!player.speak("The soup needs salt and pepper").await);
    assert_eq!(synth.requested().len(), 1);

    // The slot moved to the extended text
    assert!(!player.speak("The soup needs salt and pepper").await);
    assert_eq!(synth.requested().len(), 1);
}

#[tokio::test]
async fn test_reset_dedup_allows_repeat() {
    let synth = MockSynth::new(Duration::ZERO);
    let output = MockOutput::new(Duration::ZERO);
    let player = player(&synth, &output);

    assert!(player.speak("Add the garlic now.").await);
    drain_playback(&player).await;
    player.reset_dedup();
    assert!(player.speak("Add the garlic now.").await);
    assert_eq!(synth.requested().len(), 2);
}

#[tokio::test]
async fn test_sentences_synthesized_in_order() {
    let synth = MockSynth::new(Duration::ZERO);
    let output = MockOutput::new(Duration::ZERO);
    let player = player(&synth, &output);

    player.speak("First. Second. Third.").await;
    drain_playback(&player).await;

    assert_eq!(synth.requested(), vec!["First.", "Second.", "Third."]);
    assert_eq!(output.completed_count(), 3);
}

#[tokio::test]
async fn test_stop_cancels_stale_pass() {
    // Sentence synthesis takes 100ms; playback takes 300ms per segment
    let synth = MockSynth::new(Duration::from_millis(100));
    let output = MockOutput::new(Duration::from_millis(300));
    let player = player(&synth, &output);

    let speaking = Arc::clone(&player);
    let pass = tokio::spawn(async move { speaking.speak("One. Two. Three.").await });

    // Let sentence one land in the queue and sentence two go in flight
    tokio::time::sleep(Duration::from_millis(150)).await;
    let token = player.generation();
    player.stop();

    assert_eq!(player.generation(), token + 1);
    assert_eq!(player.queued_segments(), 0);
    assert!(!player.is_speaking());

    // The pass winds down: sentence two's in-flight result is discarded and
    // sentence three is never requested
    pass.await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(synth.requested().len() <= 2);
    assert_eq!(player.queued_segments(), 0);
    assert_eq!(output.completed_count(), 0);
}

#[tokio::test]
async fn test_stop_when_idle_is_safe() {
    let synth = MockSynth::new(Duration::ZERO);
    let output = MockOutput::new(Duration::ZERO);
    let player = player(&synth, &output);

    let before = player.generation();
    player.stop();
    player.stop();
    assert_eq!(player.generation(), before + 2);
    assert!(!player.is_active());
}

// --- Response generation via the orchestrator ---

#[tokio::test]
async fn test_turn_history_alternates_in_order() {
    let synth = MockSynth::new(Duration::ZERO);
    let output = MockOutput::new(Duration::ZERO);
    let generation = MockGen::new(Duration::from_millis(20));
    let mut orch = orchestrator(text_only_config(), &generation, &synth, &output);

    orch.start_call().await.unwrap();
    for text in ["chop onions", "heat the pan", "add the rice"] {
        orch.send_text(text).await.unwrap();
        drain_playback(orch.player()).await;
    }

    let turns = orch.turns().snapshot();
    assert_eq!(turns.len(), 6);
    for pair in turns.chunks(2) {
        assert_eq!(pair[0].role, TurnRole::User);
        assert_eq!(pair[1].role, TurnRole::Assistant);
    }
    assert_eq!(turns[0].content, "chop onions");
    assert_eq!(turns[4].content, "add the rice");
    assert!(turns[0].timestamp <= turns[5].timestamp);
}

#[tokio::test]
async fn test_busy_guard_rejects_overlapping_message() {
    let synth = MockSynth::new(Duration::ZERO);
    let output = MockOutput::new(Duration::ZERO);
    let generation = MockGen::new(Duration::from_millis(100));
    let mut orch = orchestrator(text_only_config(), &generation, &synth, &output);

    orch.start_call().await.unwrap();

    let (first, second) = tokio::join!(
        orch.send_text("how do I poach an egg"),
        orch.send_text("never mind")
    );

    assert!(first.unwrap());
    assert!(!second.unwrap());
    assert_eq!(generation.call_count(), 1);

    // Exactly one assistant turn for the accepted utterance
    let turns = orch.turns().snapshot();
    let assistant_turns = turns
        .iter()
        .filter(|t| t.role == TurnRole::Assistant)
        .count();
    assert_eq!(assistant_turns, 1);
}

// --- Orchestrator state machine ---

#[tokio::test]
async fn test_greeting_is_first_assistant_turn() {
    let synth = MockSynth::new(Duration::ZERO);
    let output = MockOutput::new(Duration::ZERO);
    let generation = MockGen::new(Duration::ZERO);

    let mut config = text_only_config();
    config.call.greeting = "Welcome to the kitchen!".to_string();
    let mut orch = orchestrator(config, &generation, &synth, &output);

    orch.start_call().await.unwrap();

    let turns = orch.turns().snapshot();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].role, TurnRole::Assistant);
    assert_eq!(turns[0].content, "Welcome to the kitchen!");
    assert_eq!(synth.requested().len(), 1);
    assert!(orch.session().is_some());
}

#[tokio::test]
async fn test_barge_in_aborts_playback_and_new_turn_gets_new_token() {
    let synth = MockSynth::new(Duration::ZERO);
    let output = MockOutput::new(Duration::from_millis(100));
    let generation = MockGen::new(Duration::ZERO);
    let mut orch = orchestrator(text_only_config(), &generation, &synth, &output);

    orch.start_call().await.unwrap();
    orch.send_text("make pasta").await.unwrap();

    // Three sentences queued; let the first finish playing
    assert_eq!(synth.requested().len(), 3);
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(orch.player().is_speaking());

    let token = orch.player().generation();
    orch.handle_event(CaptureEvent::SpeechStarted);

    assert_eq!(orch.player().generation(), token + 1);
    assert_eq!(orch.player().queued_segments(), 0);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(output.completed_count() < 3);

    // The recognized follow-up starts a fresh pass under the new token
    orch.handle_event(CaptureEvent::Transcribed {
        text: "actually make risotto".to_string(),
        source: TranscriptSource::Recognizer,
    });
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while generation.call_count() < 2 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(generation.call_count(), 2);

    let turns = orch.turns().snapshot();
    assert!(
        turns
            .iter()
            .any(|t| t.content == "actually make risotto" && t.role == TurnRole::User)
    );
}

#[tokio::test]
async fn test_end_call_discards_session_and_history() {
    let synth = MockSynth::new(Duration::ZERO);
    let output = MockOutput::new(Duration::ZERO);
    let generation = MockGen::new(Duration::ZERO);
    let mut orch = orchestrator(text_only_config(), &generation, &synth, &output);

    orch.start_call().await.unwrap();
    orch.send_text("hello there").await.unwrap();
    drain_playback(orch.player()).await;
    assert!(!orch.turns().is_empty());

    orch.end_call();

    assert!(orch.session().is_none());
    assert!(orch.turns().is_empty());
    assert!(!orch.player().is_active());
    assert_eq!(orch.status().status_text, "Call ended");
}

#[tokio::test]
async fn test_late_utterance_after_end_call_is_discarded() {
    let synth = MockSynth::new(Duration::ZERO);
    let output = MockOutput::new(Duration::ZERO);
    let generation = MockGen::new(Duration::ZERO);
    let mut orch = orchestrator(text_only_config(), &generation, &synth, &output);

    orch.start_call().await.unwrap();

    // The event's turn task has not run yet when the call ends
    orch.handle_event(CaptureEvent::Transcribed {
        text: "one last thing".to_string(),
        source: TranscriptSource::Recognizer,
    });
    orch.end_call();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(generation.call_count(), 0);
    assert!(orch.turns().is_empty());
    assert_eq!(synth.requested().len(), 0);
}

#[tokio::test]
async fn test_generation_failure_returns_to_listening() {
    struct FailingGen;

    #[async_trait]
    impl GenerationBackend for FailingGen {
        async fn respond(
            &self,
            _turns: &[ConversationTurn],
            _memory_context: &str,
        ) -> Result<String> {
            Err(sous_voice::Error::Generation("model offline".to_string()))
        }
    }

    let synth = MockSynth::new(Duration::ZERO);
    let output = MockOutput::new(Duration::ZERO);
    let mut orch = Orchestrator::new(
        &text_only_config(),
        Arc::new(MockStt),
        None,
        Arc::new(FailingGen),
        Arc::clone(&synth) as Arc<dyn SynthesisBackend>,
        Arc::clone(&output) as Arc<dyn AudioOutput>,
    );

    orch.start_call().await.unwrap();
    assert!(orch.send_text("are you there").await.is_err());

    // Error surfaced, call still up, no assistant turn, back to listening
    assert!(orch.last_error().is_some());
    assert!(orch.session().is_some());
    let turns = orch.turns().snapshot();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].role, TurnRole::User);
    assert_eq!(orch.status().state, sous_voice::CallState::Listening);
}

#[tokio::test]
async fn test_mute_requires_active_call() {
    let synth = MockSynth::new(Duration::ZERO);
    let output = MockOutput::new(Duration::ZERO);
    let generation = MockGen::new(Duration::ZERO);
    let mut orch = orchestrator(text_only_config(), &generation, &synth, &output);

    assert!(orch.toggle_mute().is_err());

    orch.start_call().await.unwrap();
    assert!(orch.toggle_mute().unwrap());
    assert_eq!(orch.status().status_text, "Muted");
    assert!(!orch.toggle_mute().unwrap());
}

#[tokio::test]
async fn test_send_text_requires_active_call() {
    let synth = MockSynth::new(Duration::ZERO);
    let output = MockOutput::new(Duration::ZERO);
    let generation = MockGen::new(Duration::ZERO);
    let orch = orchestrator(text_only_config(), &generation, &synth, &output);

    assert!(orch.send_text("hello").await.is_err());
}

#[tokio::test]
async fn test_interrupt_is_safe_in_any_state() {
    let synth = MockSynth::new(Duration::ZERO);
    let output = MockOutput::new(Duration::ZERO);
    let generation = MockGen::new(Duration::ZERO);
    let mut orch = orchestrator(text_only_config(), &generation, &synth, &output);

    orch.interrupt();
    orch.start_call().await.unwrap();
    orch.interrupt();
    orch.end_call();
    orch.interrupt();
}

#[tokio::test]
async fn test_duration_limit_speaks_sign_off_and_ends() {
    let synth = MockSynth::new(Duration::ZERO);
    let output = MockOutput::new(Duration::ZERO);
    let generation = MockGen::new(Duration::ZERO);

    let mut config = text_only_config();
    config.call.max_call_secs = 1;
    config.call.limit_message = "Time to go!".to_string();
    let mut orch = orchestrator(config, &generation, &synth, &output);

    orch.start_call().await.unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;
    orch.tick().await;

    assert!(orch.session().is_none());
    assert_eq!(orch.status().state, sous_voice::CallState::Ended);
    assert!(synth.requested().iter().any(|s| s.contains("Time to go")));
}

#[tokio::test]
async fn test_microphone_failure_aborts_start() {
    let synth = MockSynth::new(Duration::ZERO);
    let output = MockOutput::new(Duration::ZERO);
    let generation = MockGen::new(Duration::ZERO);

    let mut config = text_only_config();
    config.voice.capture_enabled = true;
    let mut orch = orchestrator(config, &generation, &synth, &output);

    // On hosts without audio hardware the microphone cannot be acquired: the
    // call must never open a session or reach listening. On hosts with a
    // microphone the start simply succeeds.
    match orch.start_call().await {
        Err(_) => {
            assert!(orch.session().is_none());
            assert!(orch.last_error().is_some());
            assert_ne!(orch.status().state, sous_voice::CallState::Listening);
        }
        Ok(()) => {
            assert!(orch.session().is_some());
            orch.end_call();
        }
    }
}
