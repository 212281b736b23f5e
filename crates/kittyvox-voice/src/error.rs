//! Error types for kittyvox voice input and output

use thiserror::Error;

/// Result type alias for voice operations
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Errors that can occur while capturing, transcribing or speaking
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Audio stream error: {0}")]
    AudioStream(String),

    #[error("Audio playback error: {0}")]
    Playback(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Hotkey error: {0}")]
    Hotkey(String),

    #[error("STT error: {0}")]
    Stt(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<cpal::DevicesError> for VoiceError {
    fn from(err: cpal::DevicesError) -> Self {
        VoiceError::AudioDevice(err.to_string())
    }
}

impl From<cpal::DefaultStreamConfigError> for VoiceError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        VoiceError::AudioDevice(err.to_string())
    }
}

impl From<cpal::BuildStreamError> for VoiceError {
    fn from(err: cpal::BuildStreamError) -> Self {
        VoiceError::AudioStream(err.to_string())
    }
}

impl From<cpal::PlayStreamError> for VoiceError {
    fn from(err: cpal::PlayStreamError) -> Self {
        VoiceError::AudioStream(err.to_string())
    }
}

impl From<rodio::StreamError> for VoiceError {
    fn from(err: rodio::StreamError) -> Self {
        VoiceError::Playback(err.to_string())
    }
}

impl From<rodio::PlayError> for VoiceError {
    fn from(err: rodio::PlayError) -> Self {
        VoiceError::Playback(err.to_string())
    }
}

impl From<rodio::decoder::DecoderError> for VoiceError {
    fn from(err: rodio::decoder::DecoderError) -> Self {
        VoiceError::Playback(format!("Decode failed: {}", err))
    }
}

impl From<VoiceError> for kittyvox_core::CoreError {
    fn from(err: VoiceError) -> Self {
        kittyvox_core::CoreError::Setup(err.to_string())
    }
}
