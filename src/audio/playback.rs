//! Interruptible audio playback
//!
//! The [`AudioOutput`] port renders one audio segment at a time and must honor
//! its [`CancelToken`] mid-segment — interruption may not wait for a sentence
//! boundary. [`CpalOutput`] is the speaker-backed implementation.

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use crate::{Error, Result};

/// Sample rate for playback (matches common TTS output)
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Snapshot of a playback pass against the live generation counter.
///
/// A pass is cancelled the moment the live counter moves past the value it
/// was created with; the output must then stop producing sound as soon as it
/// observes the mismatch.
#[derive(Clone)]
pub struct CancelToken {
    live: Arc<AtomicU64>,
    pass: u64,
}

impl CancelToken {
    /// Bind a token to the given pass of a live counter
    #[must_use]
    pub fn new(live: Arc<AtomicU64>, pass: u64) -> Self {
        Self { live, pass }
    }

    /// Whether this pass has been superseded
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.live.load(Ordering::SeqCst) != self.pass
    }

    /// The pass this token was issued for
    #[must_use]
    pub const fn pass(&self) -> u64 {
        self.pass
    }
}

/// Renders one encoded audio segment to completion or cancellation
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Decode and play an MP3 segment, aborting as soon as `cancel` trips.
    ///
    /// # Errors
    ///
    /// Returns error if decoding or device output fails.
    async fn play(&self, mp3: Vec<u8>, cancel: CancelToken) -> Result<()>;
}

/// Plays audio to the default output device
pub struct CpalOutput {
    config: StreamConfig,
}

impl CpalOutput {
    /// Open the default output device
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceUnavailable`] if no suitable output exists
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::DeviceUnavailable("no output device found".to_string()))?;

        let supported = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                (c.channels() == 1 || c.channels() == 2)
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
            .ok_or_else(|| {
                Error::DeviceUnavailable("no suitable output config found".to_string())
            })?;

        let config = supported
            .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels = config.channels,
            "speaker opened"
        );

        Ok(Self { config })
    }

    /// Play raw f32 samples, honoring the cancel token.
    ///
    /// cpal streams are not `Send`, so the stream lives entirely inside a
    /// blocking task and completion is observed by polling.
    ///
    /// # Errors
    ///
    /// Returns error if the output stream cannot be built or started.
    pub async fn play_samples(&self, samples: Vec<f32>, cancel: CancelToken) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let config = self.config.clone();
        tokio::task::spawn_blocking(move || render_blocking(&config, &samples, &cancel))
            .await
            .map_err(|e| Error::Playback(e.to_string()))?
    }
}

#[async_trait]
impl AudioOutput for CpalOutput {
    async fn play(&self, mp3: Vec<u8>, cancel: CancelToken) -> Result<()> {
        let samples = decode_mp3(&mp3)?;
        self.play_samples(samples, cancel).await
    }
}

/// Lock a mutex, recovering the guard if a playback callback panicked
fn relock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Build an output stream and block until the segment finishes, the token
/// trips, or the duration-derived deadline passes.
fn render_blocking(config: &StreamConfig, samples: &[f32], cancel: &CancelToken) -> Result<()> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::DeviceUnavailable("no output device found".to_string()))?;

    let channels = config.channels as usize;
    let total = samples.len();

    let shared: Arc<Mutex<(Vec<f32>, usize)>> = Arc::new(Mutex::new((samples.to_vec(), 0)));
    let writer = Arc::clone(&shared);

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut state = relock(&writer);
                let (samples, pos) = &mut *state;
                for frame in data.chunks_mut(channels) {
                    let value = samples.get(*pos).copied().unwrap_or(0.0);
                    for out in frame.iter_mut() {
                        *out = value;
                    }
                    if *pos < samples.len() {
                        *pos += 1;
                    }
                }
            },
            |err| {
                tracing::error!(error = %err, "speaker stream error");
            },
            None,
        )
        .map_err(|e| Error::Playback(e.to_string()))?;

    stream.play().map_err(|e| Error::Playback(e.to_string()))?;

    let duration_ms = (total as u64 * 1000) / u64::from(PLAYBACK_SAMPLE_RATE);
    let deadline =
        std::time::Instant::now() + std::time::Duration::from_millis(duration_ms + 500);

    loop {
        if cancel.is_cancelled() {
            tracing::debug!(pass = cancel.pass(), "segment playback cancelled");
            break;
        }
        if relock(&shared).1 >= total {
            break;
        }
        if std::time::Instant::now() > deadline {
            tracing::warn!("segment playback deadline exceeded");
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(20));
    }

    // Let the device drain its final buffer before the stream drops
    if !cancel.is_cancelled() {
        std::thread::sleep(std::time::Duration::from_millis(100));
    }

    drop(stream);
    Ok(())
}

/// Decode MP3 bytes to mono f32 samples
///
/// # Errors
///
/// Returns error if the data is not valid MP3
pub fn decode_mp3(mp3: &[u8]) -> Result<Vec<f32>> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3));
    let mut samples = Vec::new();

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if frame.channels == 2 {
                    samples.extend(frame.data.chunks(2).map(|pair| {
                        let left = f32::from(pair[0]) / 32768.0;
                        let right = f32::from(pair.get(1).copied().unwrap_or(pair[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof | minimp3::Error::InsufficientData) => break,
            Err(minimp3::Error::SkippedData) => {}
            Err(e) => return Err(Error::Playback(format!("mp3 decode error: {e}"))),
        }
    }

    Ok(samples)
}
