use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use sous_voice::audio::{AudioCapture, CancelToken, CpalOutput, PLAYBACK_SAMPLE_RATE, rms_energy};
use sous_voice::backends::{ChatClient, SttClient, TtsClient};
use sous_voice::{
    Config, GenerationBackend, Orchestrator, SynthesisBackend, TranscriptionBackend,
};

/// Sous - voice conversation engine for the Sous cooking assistant
#[derive(Parser)]
#[command(name = "sous", version, about)]
struct Cli {
    /// Path to a config file (default: ~/.config/sous-voice/config.toml)
    #[arg(short, long, env = "SOUS_CONFIG")]
    config: Option<PathBuf>,

    /// Disable microphone capture (manual text entry only)
    #[arg(long, env = "SOUS_DISABLE_CAPTURE")]
    disable_capture: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start a voice call (default)
    Call,
    /// Test microphone input levels
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output with a tone
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is your cooking assistant speaking.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,sous_voice=info",
        1 => "info,sous_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if cli.disable_capture {
        config.voice.capture_enabled = false;
    }

    match cli.command {
        Some(Command::TestMic { duration }) => test_mic(duration),
        Some(Command::TestSpeaker) => test_speaker().await,
        Some(Command::TestTts { text }) => test_tts(&config, &text).await,
        Some(Command::Call) | None => call(config).await,
    }
}

/// Run a voice call until it ends or ctrl-c
#[allow(clippy::future_not_send)]
async fn call(config: Config) -> anyhow::Result<()> {
    let (stt, stt_fallback) = build_stt(&config)?;
    let generation = build_generation(&config)?;
    let synthesis = build_synthesis(&config)?;
    let output: Arc<CpalOutput> = Arc::new(CpalOutput::new()?);

    let mut orchestrator = Orchestrator::new(
        &config,
        stt,
        stt_fallback,
        generation,
        synthesis,
        output,
    );

    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(()).await;
        }
    });

    orchestrator.start_call().await?;
    orchestrator.run(&mut shutdown_rx).await;

    Ok(())
}

/// Pick STT backends from the configured keys: Whisper primary when an
/// OpenAI key exists, Deepgram as fallback (or primary when it is the only
/// provider).
fn build_stt(
    config: &Config,
) -> anyhow::Result<(
    Arc<dyn TranscriptionBackend>,
    Option<Arc<dyn TranscriptionBackend>>,
)> {
    let whisper = config
        .api_keys
        .openai
        .clone()
        .map(|key| SttClient::whisper(key, config.voice.stt_model.clone()))
        .transpose()?;
    let deepgram = config
        .api_keys
        .deepgram
        .clone()
        .map(|key| SttClient::deepgram(key, "nova-2".to_string()))
        .transpose()?;

    match (whisper, deepgram) {
        (Some(primary), fallback) => Ok((
            Arc::new(primary) as Arc<dyn TranscriptionBackend>,
            fallback.map(|f| Arc::new(f) as Arc<dyn TranscriptionBackend>),
        )),
        (None, Some(primary)) => Ok((Arc::new(primary) as Arc<dyn TranscriptionBackend>, None)),
        (None, None) => anyhow::bail!(
            "no STT provider configured (set OPENAI_API_KEY or DEEPGRAM_API_KEY)"
        ),
    }
}

fn build_generation(config: &Config) -> anyhow::Result<Arc<dyn GenerationBackend>> {
    let key = config
        .api_keys
        .openai
        .clone()
        .ok_or_else(|| anyhow::anyhow!("no generation provider configured (set OPENAI_API_KEY)"))?;

    Ok(Arc::new(ChatClient::new(
        key,
        config.llm.model.clone(),
        config.llm.max_tokens,
        config.llm.system_prompt.clone(),
    )?))
}

fn build_synthesis(config: &Config) -> anyhow::Result<Arc<dyn SynthesisBackend>> {
    if let Some(key) = config.api_keys.elevenlabs.clone() {
        return Ok(Arc::new(TtsClient::elevenlabs(
            key,
            config.voice.tts_voice.clone(),
            config.voice.tts_model.clone(),
        )?));
    }

    let key = config
        .api_keys
        .openai
        .clone()
        .ok_or_else(|| {
            anyhow::anyhow!("no TTS provider configured (set OPENAI_API_KEY or ELEVENLABS_API_KEY)")
        })?;

    Ok(Arc::new(TtsClient::openai(
        key,
        config.voice.tts_voice.clone(),
        config.voice.tts_speed,
        config.voice.tts_model.clone(),
    )?))
}

/// Print microphone input levels for a few seconds
fn test_mic(duration: u64) -> anyhow::Result<()> {
    let mut capture = AudioCapture::new()?;
    capture.start()?;
    println!("Capturing for {duration}s - speak into the microphone");

    for _ in 0..duration * 2 {
        std::thread::sleep(Duration::from_millis(500));
        let samples = capture.drain();
        let energy = rms_energy(&samples);
        let bar = "#".repeat((energy * 200.0).min(60.0) as usize);
        println!("level {energy:.4} {bar}");
    }

    capture.stop();
    Ok(())
}

/// Play a one-second test tone
async fn test_speaker() -> anyhow::Result<()> {
    let output = CpalOutput::new()?;
    println!("Playing test tone");

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..PLAYBACK_SAMPLE_RATE)
        .map(|i| {
            let t = i as f32 / PLAYBACK_SAMPLE_RATE as f32;
            0.2 * (2.0 * std::f32::consts::PI * 440.0 * t).sin()
        })
        .collect();

    let token = CancelToken::new(Arc::new(AtomicU64::new(0)), 0);
    output.play_samples(samples, token).await?;
    Ok(())
}

/// Synthesize and play a line of text
async fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    use sous_voice::audio::AudioOutput;

    let synthesis = build_synthesis(config)?;
    let output = CpalOutput::new()?;

    println!("Synthesizing: {text}");
    let audio = synthesis.synthesize(text).await?;
    println!("Playing {} bytes", audio.len());

    let token = CancelToken::new(Arc::new(AtomicU64::new(0)), 0);
    output.play(audio, token).await?;
    Ok(())
}
