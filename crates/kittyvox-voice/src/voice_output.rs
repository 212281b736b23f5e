//! **PlaybackSpeech**: API text-to-speech played through rodio.
//!
//! A dedicated playback thread owns the output stream (it is not `Send`) and
//! receives commands over a channel. Before synthesizing, the thread drains the
//! channel and keeps only the newest utterance, so stale announcements are
//! dropped instead of queued. Starting an utterance stops the previous one.

use crate::error::{VoiceError, VoiceResult};
use kittyvox_core::{clamp_volume, SpeechSink};
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use std::io::Cursor;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Longest a blocking `speak` waits for playback to finish.
const BLOCKING_SPEAK_TIMEOUT: Duration = Duration::from_secs(30);

/// Backend that turns text into audio bytes (WAV/MP3).
pub trait TtsBackend: Send + Sync {
    /// Synthesize text to audio bytes. Return an empty vec to skip playback.
    fn synthesize(&self, text: &str) -> VoiceResult<Vec<u8>>;
}

/// OpenAI-compatible speech API.
/// Uses `TTS_API_URL` (e.g. https://api.openai.com/v1), `TTS_API_KEY` and `TTS_MODEL` (default tts-1).
#[derive(Debug, Clone)]
pub struct ApiTts {
    /// Base URL without trailing slash (e.g. https://api.openai.com/v1).
    pub base_url: String,
    /// Bearer API key.
    pub api_key: String,
    /// TTS model: tts-1 (fast) or tts-1-hd (higher quality).
    pub model: String,
    /// Voice id (alloy, echo, fable, onyx, nova, shimmer, ...).
    pub voice: String,
    /// Speaking speed multiplier, 0.25..=4.0.
    pub speed: f32,
    /// HTTP client (blocking) for sync synthesize().
    client: reqwest::blocking::Client,
}

/// Words per minute that `say` treats as normal speed.
const NORMAL_WPM: f32 = 175.0;

impl ApiTts {
    /// Build from environment: TTS_API_URL, TTS_API_KEY (or OPENAI_API_KEY), TTS_MODEL, TTS_VOICE.
    /// `rate_wpm` is the configured `say` rate, mapped to the API's speed multiplier.
    pub fn from_env(voice: &str, rate_wpm: u32) -> VoiceResult<Self> {
        let base_url = std::env::var("TTS_API_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let api_key = std::env::var("TTS_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .map_err(|_| VoiceError::Config("TTS requires TTS_API_KEY or OPENAI_API_KEY".to_string()))?;
        let model = std::env::var("TTS_MODEL").unwrap_or_else(|_| "tts-1".to_string());
        let voice = std::env::var("TTS_VOICE").unwrap_or_else(|_| api_voice(voice).to_string());
        Self::new(base_url, api_key, model, voice, rate_wpm)
    }

    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        voice: impl Into<String>,
        rate_wpm: u32,
    ) -> VoiceResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| VoiceError::Tts(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            voice: voice.into(),
            speed: (rate_wpm as f32 / NORMAL_WPM).clamp(0.25, 4.0),
            client,
        })
    }
}

/// Map a configured voice name to an API voice. macOS voice names fall back to `nova`.
fn api_voice(configured: &str) -> &str {
    const API_VOICES: [&str; 9] = [
        "alloy", "ash", "coral", "echo", "fable", "nova", "onyx", "sage", "shimmer",
    ];
    API_VOICES
        .iter()
        .find(|v| v.eq_ignore_ascii_case(configured.trim()))
        .copied()
        .unwrap_or("nova")
}

impl TtsBackend for ApiTts {
    fn synthesize(&self, text: &str) -> VoiceResult<Vec<u8>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/audio/speech", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": self.voice,
            "speed": self.speed,
        });
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| VoiceError::Tts(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            return Err(VoiceError::Tts(format!("TTS API error {}: {}", status, body)));
        }
        let bytes = res.bytes().map_err(|e| VoiceError::Tts(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

enum PlaybackCommand {
    Speak {
        text: String,
        done: Option<Sender<()>>,
    },
    Stop,
    Volume(f32),
}

/// What the playback thread should do after draining its channel.
enum Next {
    Speak(String, Option<Sender<()>>),
    Stop,
    Nothing,
}

/// Keep only the newest `Speak`; apply `Volume` in order. A `Stop` after the
/// last `Speak` cancels it. Dropping a stale `done` sender releases its caller.
fn latest_utterance(
    first: PlaybackCommand,
    rest: impl Iterator<Item = PlaybackCommand>,
    volume: &mut f32,
) -> Next {
    let mut next = Next::Nothing;
    for cmd in std::iter::once(first).chain(rest) {
        match cmd {
            PlaybackCommand::Speak { text, done } => {
                if let Next::Speak(dropped, _) = std::mem::replace(&mut next, Next::Speak(text, done)) {
                    debug!(text = %dropped, "dropping stale utterance");
                }
            }
            PlaybackCommand::Stop => next = Next::Stop,
            PlaybackCommand::Volume(v) => *volume = v,
        }
    }
    next
}

/// How often the playback thread checks whether a waited-on utterance ended.
const FINISH_POLL: Duration = Duration::from_millis(50);

/// Where synthesized audio is played; the rodio output stream outside tests.
trait AudioOut {
    type Voice: Utterance;

    fn start(&self, bytes: Vec<u8>, volume: f32) -> VoiceResult<Self::Voice>;
}

/// One utterance in flight.
trait Utterance {
    fn finished(&self) -> bool;
    fn set_volume(&self, volume: f32);
    fn stop(&self);
}

impl AudioOut for OutputStreamHandle {
    type Voice = Sink;

    fn start(&self, bytes: Vec<u8>, volume: f32) -> VoiceResult<Sink> {
        let source = rodio::Decoder::new(Cursor::new(bytes))?;
        let sink = Sink::try_new(self)?;
        sink.set_volume(volume);
        sink.append(source.convert_samples::<f32>());
        Ok(sink)
    }
}

impl Utterance for Sink {
    fn finished(&self) -> bool {
        self.empty()
    }

    fn set_volume(&self, volume: f32) {
        Sink::set_volume(self, volume);
    }

    fn stop(&self) {
        Sink::stop(self);
    }
}

struct PlaybackThread<O: AudioOut> {
    output: O,
    current: Option<O::Voice>,
    /// Caller of a blocking `speak` waiting on `current`.
    waiter: Option<Sender<()>>,
    volume: f32,
    tts: Box<dyn TtsBackend>,
}

impl<O: AudioOut> PlaybackThread<O> {
    fn new(output: O, tts: Box<dyn TtsBackend>, volume: f32) -> Self {
        Self {
            output,
            current: None,
            waiter: None,
            volume,
            tts,
        }
    }

    fn run(mut self, rx: Receiver<PlaybackCommand>) {
        loop {
            // While a blocking caller waits, wake up to notice the end of playback.
            let first = if self.waiter.is_some() {
                match rx.recv_timeout(FINISH_POLL) {
                    Ok(cmd) => cmd,
                    Err(RecvTimeoutError::Timeout) => {
                        self.release_if_finished();
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            } else {
                match rx.recv() {
                    Ok(cmd) => cmd,
                    Err(_) => break,
                }
            };

            let mut volume = self.volume;
            let next = latest_utterance(first, rx.try_iter(), &mut volume);
            self.set_volume(volume);
            match next {
                Next::Speak(text, done) => {
                    if let Err(e) = self.play(&text, done) {
                        warn!(error = %e, "speech playback failed");
                    }
                }
                Next::Stop => self.stop(),
                Next::Nothing => {}
            }
        }
        self.stop();
        debug!("playback thread exiting");
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
        if let Some(voice) = &self.current {
            voice.set_volume(volume);
        }
    }

    fn notify_waiter(&mut self) {
        if let Some(done) = self.waiter.take() {
            let _ = done.send(());
        }
    }

    fn release_if_finished(&mut self) {
        if self.current.as_ref().map_or(true, Utterance::finished) {
            self.current = None;
            self.notify_waiter();
        }
    }

    fn stop(&mut self) {
        if let Some(voice) = self.current.take() {
            voice.stop();
        }
        self.notify_waiter();
    }

    /// Start `text`, replacing whatever is playing. A blocking caller's `done`
    /// is signalled when this utterance ends or is stopped or replaced.
    fn play(&mut self, text: &str, done: Option<Sender<()>>) -> VoiceResult<()> {
        let bytes = self.tts.synthesize(text)?;
        self.stop();
        if bytes.is_empty() {
            return Ok(());
        }
        let voice = self.output.start(bytes, self.volume)?;
        self.current = Some(voice);
        self.waiter = done;
        Ok(())
    }
}

/// [`SpeechSink`] that synthesizes through a [`TtsBackend`] and plays with rodio.
pub struct PlaybackSpeech {
    tx: Sender<PlaybackCommand>,
}

impl PlaybackSpeech {
    /// Start the playback thread on the default output device.
    pub fn new(tts: Box<dyn TtsBackend>, volume: f32) -> VoiceResult<Self> {
        let (tx, rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel::<VoiceResult<()>>();
        let volume = clamp_volume(volume);

        std::thread::Builder::new()
            .name("kittyvox-playback".into())
            .spawn(move || {
                let opened = OutputStream::try_default().map_err(VoiceError::from);
                match opened {
                    Ok((_stream, handle)) => {
                        let _ = ready_tx.send(Ok(()));
                        PlaybackThread::new(handle, tts, volume).run(rx);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })?;

        ready_rx
            .recv()
            .map_err(|_| VoiceError::Playback("playback thread exited during startup".into()))??;
        info!("PlaybackSpeech: output stream ready");
        Ok(Self { tx })
    }

    fn send(&self, cmd: PlaybackCommand) {
        if self.tx.send(cmd).is_err() {
            error!("playback thread is gone; speech dropped");
        }
    }
}

impl SpeechSink for PlaybackSpeech {
    fn speak(&self, text: &str, blocking: bool) {
        if text.trim().is_empty() {
            return;
        }
        if !blocking {
            self.send(PlaybackCommand::Speak { text: text.to_string(), done: None });
            return;
        }
        let (done_tx, done_rx) = mpsc::channel();
        self.send(PlaybackCommand::Speak {
            text: text.to_string(),
            done: Some(done_tx),
        });
        if done_rx.recv_timeout(BLOCKING_SPEAK_TIMEOUT).is_err() {
            debug!("blocking speak returned without completion signal");
        }
    }

    fn stop(&self) {
        self.send(PlaybackCommand::Stop);
    }

    fn set_volume(&self, volume: f32) {
        self.send(PlaybackCommand::Volume(clamp_volume(volume)));
    }
}
