//! Speech sink: where spoken feedback goes.
//!
//! Implementations live in `kittyvox-voice`. Every implementation must stop any
//! utterance still playing before starting a new one, and must drop queued
//! utterances that have not started, so only the latest one is heard.

/// Text-to-speech playback engine.
pub trait SpeechSink: Send + Sync {
    /// Speak `text`, interrupting prior speech. When `blocking` is false this returns
    /// as soon as playback has been handed off.
    fn speak(&self, text: &str, blocking: bool);

    /// Stop current speech immediately.
    fn stop(&self);

    /// Set output volume in `0.1..=1.0`.
    fn set_volume(&self, volume: f32);
}

/// Sink that discards everything (`tts_engine = "none"`).
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentSpeech;

impl SpeechSink for SilentSpeech {
    fn speak(&self, text: &str, _blocking: bool) {
        tracing::debug!(%text, "speech disabled, dropping utterance");
    }

    fn stop(&self) {}

    fn set_volume(&self, _volume: f32) {}
}
