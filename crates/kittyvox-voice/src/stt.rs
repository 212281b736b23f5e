//! **Speech-to-Text (STT)**: turn a push-to-talk [`Recording`] into text.
//!
//! Backends: local Whisper (`whisper` feature), an OpenAI-compatible transcription
//! API, or a placeholder for wiring tests. [`create_stt`] picks one from the
//! configured [`SttBackendKind`] and the environment.

use crate::audio::{encode_wav, Recording};
use crate::error::{VoiceError, VoiceResult};
use kittyvox_core::SttBackendKind;
use tracing::{info, warn};

/// What a backend heard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcription {
    pub text: String,
    pub language: String,
}

impl Transcription {
    /// `None` for blank text, so callers never route an empty command.
    pub fn non_empty(text: &str, language: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            None
        } else {
            Some(Self {
                text: text.to_string(),
                language: language.to_string(),
            })
        }
    }
}

/// Backend for converting a recording to text.
pub trait SttBackend: Send + Sync {
    /// Transcribe one recording. `Ok(None)` when nothing was said.
    fn transcribe(&self, recording: &Recording) -> VoiceResult<Option<Transcription>>;

    fn name(&self) -> &'static str;
}

/// Language hint for backends; `"auto"` means let the model detect it.
fn language_hint(language: &str) -> Option<&str> {
    let language = language.trim();
    if language.is_empty() || language.eq_ignore_ascii_case("auto") {
        None
    } else {
        Some(language)
    }
}

/// Placeholder STT: returns a fixed response, or nothing. Use for exercising the
/// voice loop without Whisper or an API key.
#[derive(Debug, Default)]
pub struct PlaceholderStt {
    /// If set, every non-empty recording transcribes to this.
    pub response: Option<String>,
}

impl PlaceholderStt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(s: impl Into<String>) -> Self {
        Self { response: Some(s.into()) }
    }
}

impl SttBackend for PlaceholderStt {
    fn transcribe(&self, recording: &Recording) -> VoiceResult<Option<Transcription>> {
        if recording.is_empty() {
            return Ok(None);
        }
        match &self.response {
            Some(r) => Ok(Transcription::non_empty(r, "en")),
            None => {
                warn!(
                    samples = recording.samples.len(),
                    "STT placeholder: connect Whisper or an STT API to transcribe"
                );
                Ok(None)
            }
        }
    }

    fn name(&self) -> &'static str {
        "placeholder"
    }
}

/// OpenAI-compatible transcription API (OpenAI Whisper, Groq, local servers).
/// Uses `STT_API_URL` (e.g. https://api.openai.com/v1), `STT_API_KEY`, and `STT_MODEL` (default whisper-1).
#[derive(Debug, Clone)]
pub struct ApiStt {
    /// Base URL without trailing slash (e.g. https://api.openai.com/v1).
    pub base_url: String,
    /// Bearer API key.
    pub api_key: String,
    /// Model: whisper-1 or gpt-4o-transcribe, etc.
    pub model: String,
    pub language: String,
    client: reqwest::blocking::Client,
}

impl ApiStt {
    /// Build from environment: STT_API_URL, STT_API_KEY (or OPENAI_API_KEY), STT_MODEL.
    pub fn from_env(language: &str) -> VoiceResult<Self> {
        let base_url = std::env::var("STT_API_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let api_key = std::env::var("STT_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .map_err(|_| VoiceError::Config("STT requires STT_API_KEY or OPENAI_API_KEY".to_string()))?;
        let model = std::env::var("STT_MODEL").unwrap_or_else(|_| "whisper-1".to_string());
        Self::new(base_url, api_key, model, language)
    }

    /// Create with explicit config.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        language: &str,
    ) -> VoiceResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            language: language.to_string(),
            client,
        })
    }
}

/// Pull `text` and `language` out of a transcription response body.
fn parse_api_response(json: &serde_json::Value, fallback_language: &str) -> Option<Transcription> {
    let text = json.get("text").and_then(|t| t.as_str()).unwrap_or("");
    let language = json
        .get("language")
        .and_then(|l| l.as_str())
        .unwrap_or(fallback_language);
    Transcription::non_empty(text, language)
}

impl SttBackend for ApiStt {
    fn transcribe(&self, recording: &Recording) -> VoiceResult<Option<Transcription>> {
        if recording.is_empty() {
            return Ok(None);
        }
        let wav = encode_wav(&recording.samples, recording.sample_rate);
        let url = format!("{}/audio/transcriptions", self.base_url.trim_end_matches('/'));
        let part = reqwest::blocking::multipart::Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        let mut form = reqwest::blocking::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone());
        if let Some(lang) = language_hint(&self.language) {
            form = form.text("language", lang.to_string());
        }
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            return Err(VoiceError::Stt(format!("STT API error {}: {}", status, body)));
        }
        let json: serde_json::Value = res.json().map_err(|e| VoiceError::Stt(e.to_string()))?;
        Ok(parse_api_response(&json, language_hint(&self.language).unwrap_or("en")))
    }

    fn name(&self) -> &'static str {
        "api"
    }
}

// -----------------------------------------------------------------------------
// Local Whisper STT (optional feature). Requires whisper.cpp/ggml.
// -----------------------------------------------------------------------------
#[cfg(feature = "whisper")]
mod whisper_stt {
    use super::*;
    use crate::audio::TARGET_SAMPLE_RATE;
    use std::sync::Mutex;
    use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

    /// Local Whisper STT: loads a ggml model (e.g. ggml-base.en.bin) and runs
    /// inference on-device. Audio must be 16 kHz mono f32.
    pub struct WhisperStt {
        #[allow(dead_code)]
        context: WhisperContext,
        state: Mutex<whisper_rs::WhisperState>,
        language: String,
    }

    impl WhisperStt {
        /// Load the Whisper model from `model_path` (e.g. path to ggml-base.en.bin).
        pub fn new(model_path: &str, language: &str) -> VoiceResult<Self> {
            let params = WhisperContextParameters::default();
            let context = WhisperContext::new_with_params(model_path, params)
                .map_err(|e| VoiceError::Stt(format!("Whisper load failed: {}", e)))?;
            let state = context
                .create_state()
                .map_err(|e| VoiceError::Stt(format!("Whisper state init failed: {}", e)))?;
            Ok(Self {
                context,
                state: Mutex::new(state),
                language: language.to_string(),
            })
        }

        /// Build from env: `WHISPER_MODEL_PATH` must point to a .bin model file.
        pub fn from_env(language: &str) -> VoiceResult<Self> {
            let path = std::env::var("WHISPER_MODEL_PATH")
                .map_err(|_| VoiceError::Config("WHISPER_MODEL_PATH not set".to_string()))?;
            let path = path.trim();
            if path.is_empty() {
                return Err(VoiceError::Config("WHISPER_MODEL_PATH is empty".to_string()));
            }
            Self::new(path, language)
        }
    }

    impl SttBackend for WhisperStt {
        fn transcribe(&self, recording: &Recording) -> VoiceResult<Option<Transcription>> {
            if recording.is_empty() {
                return Ok(None);
            }
            if recording.sample_rate != TARGET_SAMPLE_RATE {
                return Err(VoiceError::Stt(format!(
                    "Whisper expects 16 kHz; got {} Hz",
                    recording.sample_rate
                )));
            }
            let hint = language_hint(&self.language);
            let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
            params.set_print_progress(false);
            params.set_print_realtime(false);
            params.set_no_timestamps(true);
            params.set_language(hint);

            let mut state = self
                .state
                .lock()
                .map_err(|e| VoiceError::Stt(format!("Whisper lock poisoned: {}", e)))?;
            state
                .full(&params, &recording.samples)
                .map_err(|e| VoiceError::Stt(format!("Whisper inference failed: {}", e)))?;
            let text = state
                .as_iter()
                .filter_map(|seg| seg.to_str().ok().map(str::to_string))
                .collect::<Vec<_>>()
                .join(" ");
            Ok(Transcription::non_empty(&text, hint.unwrap_or("auto")))
        }

        fn name(&self) -> &'static str {
            "whisper"
        }
    }
}

#[cfg(feature = "whisper")]
pub use whisper_stt::WhisperStt;

#[cfg(feature = "whisper")]
fn try_whisper(language: &str) -> VoiceResult<Box<dyn SttBackend>> {
    Ok(Box::new(whisper_stt::WhisperStt::from_env(language)?))
}

#[cfg(not(feature = "whisper"))]
fn try_whisper(_language: &str) -> VoiceResult<Box<dyn SttBackend>> {
    Err(VoiceError::Config(
        "kittyvox was built without the `whisper` feature".to_string(),
    ))
}

/// Create the configured STT backend.
///
/// `Auto` priority: (1) Whisper if `WHISPER_MODEL_PATH` is set and the model
/// loads (requires the `whisper` feature), (2) the API if `STT_API_KEY` is set,
/// (3) the placeholder.
pub fn create_stt(kind: SttBackendKind, language: &str) -> VoiceResult<Box<dyn SttBackend>> {
    let backend: Box<dyn SttBackend> = match kind {
        SttBackendKind::Whisper => try_whisper(language)?,
        SttBackendKind::Api => Box::new(ApiStt::from_env(language)?),
        SttBackendKind::Placeholder => Box::new(PlaceholderStt::new()),
        SttBackendKind::Auto => match try_whisper(language) {
            Ok(w) => w,
            Err(e) => {
                info!("Whisper unavailable ({}), trying STT API", e);
                match ApiStt::from_env(language) {
                    Ok(api) => Box::new(api),
                    Err(e) => {
                        warn!("No STT backend configured ({}); using placeholder", e);
                        Box::new(PlaceholderStt::new())
                    }
                }
            }
        },
    };
    info!(backend = backend.name(), "STT ready");
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::TARGET_SAMPLE_RATE;
    use chrono::Utc;
    use std::time::Duration;

    fn recording(samples: usize) -> Recording {
        Recording {
            samples: vec![0.0; samples],
            sample_rate: TARGET_SAMPLE_RATE,
            timestamp: Utc::now(),
            duration: Duration::from_millis(30),
        }
    }

    #[test]
    fn placeholder_without_response_hears_nothing() {
        let stt = PlaceholderStt::new();
        assert_eq!(stt.transcribe(&recording(480)).unwrap(), None);
    }

    #[test]
    fn placeholder_with_response() {
        let stt = PlaceholderStt::with_response("code: run the tests");
        let heard = stt.transcribe(&recording(480)).unwrap().unwrap();
        assert_eq!(heard.text, "code: run the tests");
        assert_eq!(stt.transcribe(&recording(0)).unwrap(), None);
    }

    #[test]
    fn api_response_parsing() {
        let json = serde_json::json!({"text": "  web status ", "language": "english"});
        let t = parse_api_response(&json, "en").unwrap();
        assert_eq!(t.text, "web status");
        assert_eq!(t.language, "english");

        let blank = serde_json::json!({"text": "   "});
        assert_eq!(parse_api_response(&blank, "en"), None);
    }

    #[test]
    fn auto_language_sends_no_hint() {
        assert_eq!(language_hint("auto"), None);
        assert_eq!(language_hint(" "), None);
        assert_eq!(language_hint("de"), Some("de"));
    }

    #[test]
    fn explicit_placeholder_kind() {
        let stt = create_stt(SttBackendKind::Placeholder, "en").unwrap();
        assert_eq!(stt.name(), "placeholder");
    }
}
