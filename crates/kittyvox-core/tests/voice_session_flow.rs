//! Integration test: a full voice session against an in-memory terminal.
//!
//! ## Scenario
//! 1. Start the controller with two projects; `code` is aliased `scratch`.
//! 2. Say "scratch: add a test"; the text reaches the `code` window and is confirmed.
//! 3. The window goes busy, then returns to its prompt with new output; the
//!    output monitor announces a summary of only the new text.
//! 4. Say "status", then "shutdown"; `run` returns and every window gets `/exit`.

use kittyvox_core::{
    ControllerConfig, CoreResult, LayoutSettings, ProjectConfig, ReadExtent, SpeechSink,
    TerminalDriver, TranscriptHandler, TranscriptSource, VoiceController, WindowHandle,
};
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct FakeKitty {
    screens: Mutex<HashMap<String, String>>,
    inputs: Mutex<HashMap<String, Vec<String>>>,
}

impl FakeKitty {
    fn set_screen(&self, title: &str, text: &str) {
        self.screens.lock().unwrap().insert(title.into(), text.into());
    }

    fn inputs(&self, title: &str) -> Vec<String> {
        self.inputs.lock().unwrap().get(title).cloned().unwrap_or_default()
    }
}

impl TerminalDriver for FakeKitty {
    fn launch(
        &self,
        project: &ProjectConfig,
        _layout: &LayoutSettings,
        _position: Option<(u32, u32)>,
    ) -> CoreResult<WindowHandle> {
        let title = format!("claude-{}", project.name);
        self.set_screen(&title, "Welcome\n> ");
        Ok(WindowHandle::new(title))
    }

    fn send_text(&self, handle: &WindowHandle, text: &str) -> bool {
        self.inputs
            .lock()
            .unwrap()
            .entry(handle.title.clone())
            .or_default()
            .push(text.to_string());
        true
    }

    fn get_text(&self, handle: &WindowHandle, _extent: ReadExtent) -> CoreResult<String> {
        Ok(self.screens.lock().unwrap().get(&handle.title).cloned().unwrap_or_default())
    }

    fn focus(&self, _handle: &WindowHandle) -> bool {
        true
    }
}

#[derive(Default)]
struct Transcript {
    lines: Mutex<Vec<String>>,
}

impl Transcript {
    fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|l| l.contains(needle))
    }
}

impl SpeechSink for Transcript {
    fn speak(&self, text: &str, _blocking: bool) {
        self.lines.lock().unwrap().push(text.to_string());
    }

    fn stop(&self) {}

    fn set_volume(&self, _volume: f32) {}
}

/// Transcript source fed by the test through a channel.
struct Utterances(Receiver<String>);

impl TranscriptSource for Utterances {
    fn listen(self: Box<Self>, handler: Arc<dyn TranscriptHandler>) -> CoreResult<()> {
        while let Ok(text) = self.0.recv() {
            if !handler.is_running() {
                break;
            }
            handler.handle_transcription(&text);
        }
        Ok(())
    }
}

fn config() -> ControllerConfig {
    let mut config = ControllerConfig::default();
    config.projects = vec![
        ProjectConfig::new("code", "/tmp").with_aliases(["scratch"]),
        ProjectConfig::new("web", "/tmp"),
    ];
    config.monitor.poll_interval_ms = 50;
    config
}

async fn wait_for(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("timed out waiting for {}", what);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn spoken_command_round_trip() {
    let _ = tracing_subscriber::fmt().with_env_filter("kittyvox_core=debug").with_test_writer().try_init();

    let kitty = Arc::new(FakeKitty::default());
    let speech = Arc::new(Transcript::default());
    let (say, heard): (Sender<String>, Receiver<String>) = mpsc::channel();

    let controller = Arc::new(VoiceController::new(
        config(),
        kitty.clone(),
        speech.clone(),
        Box::new(Utterances(heard)),
    ));
    let runner = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.run(None).await })
    };

    wait_for("ready announcement", || speech.contains("Voice control ready. Projects: code, web")).await;

    say.send("scratch: add a test".into()).unwrap();
    wait_for("confirmation", || speech.contains("Sent to code.")).await;
    assert_eq!(kitty.inputs("claude-code"), vec!["add a test\n"]);

    kitty.set_screen("claude-code", "Welcome\n> add a test\nWorking on it...");
    tokio::time::sleep(Duration::from_millis(200)).await;
    kitty.set_screen(
        "claude-code",
        "Welcome\n> add a test\nWorking on it...\nCreated tests/parser_test.rs with three cases.\n3 tests passed\n> ",
    );
    wait_for("completion announcement", || speech.contains("code: Complete.")).await;
    let announcement = speech.lines().into_iter().find(|l| l.starts_with("code: ")).unwrap();
    assert!(announcement.contains("Created tests/parser_test.rs with three cases."));
    assert!(!announcement.contains("Welcome"));

    say.send("status".into()).unwrap();
    wait_for("status report", || speech.contains("code is ready. web is ready")).await;

    say.send("shutdown".into()).unwrap();
    let finished = tokio::time::timeout(Duration::from_secs(10), runner).await;
    assert!(matches!(finished, Ok(Ok(Ok(())))));

    assert_eq!(speech.lines().last().map(String::as_str), Some("Shutting down voice control."));
    assert_eq!(kitty.inputs("claude-web"), vec!["/exit\n"]);
    assert!(controller.context().registry.is_empty());
}
