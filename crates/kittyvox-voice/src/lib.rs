//! Voice collaborators for kittyvox.
//!
//! - **Input**: [`PushToTalk`] records while the hotkey is held ([`Recorder`],
//!   cpal), transcribes with an [`SttBackend`] and feeds the controller.
//! - **Output**: [`SaySpeech`] (macOS `say`) or [`PlaybackSpeech`] (HTTP TTS
//!   through rodio), chosen by [`create_speech`].
//! - **Cues**: short sounds when listening starts, stops or fails.

pub mod audio;
pub mod cues;
pub mod error;
pub mod hotkey;
pub mod say;
pub mod stt;
pub mod voice_output;

pub use audio::{Recorder, Recording, TARGET_SAMPLE_RATE};
pub use cues::{Cue, CuePlayer};
pub use error::{VoiceError, VoiceResult};
pub use hotkey::{Edge, Hotkey, HotkeyTracker, Modifiers, PushToTalk};
pub use say::{list_voices, SaySpeech, VoiceInfo};
pub use stt::{create_stt, ApiStt, PlaceholderStt, SttBackend, Transcription};
pub use voice_output::{ApiTts, PlaybackSpeech, TtsBackend};

use kittyvox_core::{SilentSpeech, SpeechSink, TtsEngineKind, VoiceSettings};
use std::sync::Arc;
use tracing::warn;

/// Build the configured speech sink. An API engine that cannot start falls back
/// to silence so the controller still runs.
pub fn create_speech(settings: &VoiceSettings) -> Arc<dyn SpeechSink> {
    match settings.tts_engine {
        TtsEngineKind::Say => Arc::new(SaySpeech::new(&settings.tts_voice, settings.tts_rate, settings.volume)),
        TtsEngineKind::Api => {
            let started = ApiTts::from_env(&settings.tts_voice, settings.tts_rate)
                .and_then(|tts| PlaybackSpeech::new(Box::new(tts), settings.volume));
            match started {
                Ok(speech) => Arc::new(speech),
                Err(e) => {
                    warn!(error = %e, "API speech unavailable; spoken feedback disabled");
                    Arc::new(SilentSpeech)
                }
            }
        }
        TtsEngineKind::None => Arc::new(SilentSpeech),
    }
}
