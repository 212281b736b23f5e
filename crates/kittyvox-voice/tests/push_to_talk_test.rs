//! Integration tests for push-to-talk input and speech output.
//!
//! Note: tests marked `#[ignore]` need a microphone, speakers or keyboard access.

use kittyvox_core::{SttBackendKind, TranscriptHandler, TranscriptSource, TtsEngineKind, VoiceSettings};
use kittyvox_voice::{
    create_speech, create_stt, Edge, Hotkey, HotkeyTracker, PlaceholderStt, PushToTalk, Recorder,
    Recording, SttBackend, CuePlayer, TARGET_SAMPLE_RATE,
};
use rdev::{EventType, Key};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn tone(secs: f32) -> Recording {
    let n = (TARGET_SAMPLE_RATE as f32 * secs) as usize;
    Recording {
        samples: (0..n).map(|i| (i as f32 * 0.05).sin() * 0.3).collect(),
        sample_rate: TARGET_SAMPLE_RATE,
        timestamp: chrono::Utc::now(),
        duration: Duration::from_secs_f32(secs),
    }
}

#[test]
fn configured_hotkey_parses() {
    let settings = VoiceSettings::default();
    assert_ok!(Hotkey::parse(&settings.hotkey));
    assert_err!(Hotkey::parse("ctrl+shift+"));
}

#[test]
fn held_chord_emits_one_edge_pair() {
    let mut tracker = HotkeyTracker::new(Hotkey::parse("alt+space").unwrap());
    let events = [
        EventType::KeyPress(Key::Alt),
        EventType::KeyPress(Key::Space),
        EventType::KeyPress(Key::Space),
        EventType::KeyPress(Key::Space),
        EventType::KeyRelease(Key::Space),
        EventType::KeyRelease(Key::Alt),
    ];
    let edges: Vec<Edge> = events.iter().filter_map(|e| tracker.on_event(e)).collect();
    assert_eq!(edges, vec![Edge::Pressed, Edge::Released]);
}

#[test]
fn placeholder_transcribes_fixed_response() {
    let stt = PlaceholderStt::with_response("code: run the tests");
    let heard = assert_ok!(stt.transcribe(&tone(0.5)));
    assert_eq!(heard.map(|t| t.text).as_deref(), Some("code: run the tests"));
}

#[test]
fn placeholder_backend_from_settings() {
    let stt = assert_ok!(create_stt(SttBackendKind::Placeholder, "en"));
    assert_eq!(assert_ok!(stt.transcribe(&tone(0.2))), None);
}

#[test]
fn disabled_speech_is_silent() {
    let mut settings = VoiceSettings::default();
    settings.tts_engine = TtsEngineKind::None;
    let speech = create_speech(&settings);
    speech.speak("nobody hears this", true);
    speech.set_volume(0.4);
    speech.stop();
}

struct Collect {
    heard: Mutex<Vec<String>>,
    running: AtomicBool,
}

impl TranscriptHandler for Collect {
    fn handle_transcription(&self, text: &str) {
        println!("heard: {}", text);
        self.heard.lock().unwrap().push(text.to_string());
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[tokio::test]
#[ignore] // Requires audio hardware
async fn test_record_two_seconds() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let recording = tokio::task::spawn_blocking(|| {
        let mut recorder = Recorder::new();
        recorder.start().expect("Failed to open microphone");
        std::thread::sleep(Duration::from_secs(2));
        recorder.stop()
    })
    .await
    .expect("recording task panicked");

    assert_eq!(recording.sample_rate, TARGET_SAMPLE_RATE);
    assert!(recording.samples.len() > TARGET_SAMPLE_RATE as usize);
}

#[test]
#[ignore] // Requires microphone, keyboard access and manual speech
fn test_push_to_talk_round_trip() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    println!("\n🎤 Push-to-talk test: hold ctrl+shift+v, speak, release, then tap the hotkey once more to finish.\n");
    let settings = VoiceSettings::default();
    let source = PushToTalk::new(
        Hotkey::parse(&settings.hotkey).unwrap(),
        create_stt(SttBackendKind::Auto, &settings.language).unwrap(),
        CuePlayer::new(&settings),
    );
    let handler = Arc::new(Collect {
        heard: Mutex::new(Vec::new()),
        running: AtomicBool::new(true),
    });
    Box::new(source).listen(handler.clone()).expect("listener failed");
    assert!(!handler.heard.lock().unwrap().is_empty());
}
