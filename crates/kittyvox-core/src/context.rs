//! State shared by the voice path and the output monitor for one controller lifetime.

use crate::config::{clamp_volume, ControllerConfig};
use crate::registry::SessionRegistry;
use crate::router::CommandRouter;
use crate::session::TerminalDriver;
use crate::speech::SpeechSink;
use crate::summarizer::Summarizer;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Mutable scalars and the snapshot map, behind one lock.
#[derive(Debug, Default)]
pub struct SharedState {
    pub running: bool,
    pub muted: bool,
    pub volume: f32,
    /// Last text read per session id. Written only by the output monitor.
    pub snapshots: HashMap<String, String>,
}

/// Everything the controller's loops need, constructed once and passed by `Arc`.
pub struct ControllerContext {
    pub config: ControllerConfig,
    pub registry: SessionRegistry,
    pub router: CommandRouter,
    pub summarizer: Summarizer,
    pub driver: Arc<dyn TerminalDriver>,
    pub speech: Arc<dyn SpeechSink>,
    state: Mutex<SharedState>,
}

impl ControllerContext {
    pub fn new(
        config: ControllerConfig,
        driver: Arc<dyn TerminalDriver>,
        speech: Arc<dyn SpeechSink>,
    ) -> Self {
        let registry = SessionRegistry::from_config(&config);
        let router = CommandRouter::new(registry.aliases().clone());
        let summarizer = Summarizer::new(config.summary.clone());
        let volume = clamp_volume(config.voice.volume);
        speech.set_volume(volume);
        Self {
            config,
            registry,
            router,
            summarizer,
            driver,
            speech,
            state: Mutex::new(SharedState {
                volume,
                ..SharedState::default()
            }),
        }
    }

    /// Lock the shared state. A poisoned lock is recovered; the guarded data is plain values.
    pub fn state(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.state().running
    }

    pub fn set_running(&self, running: bool) {
        self.state().running = running;
    }

    pub fn is_muted(&self) -> bool {
        self.state().muted
    }

    pub fn set_muted(&self, muted: bool) {
        self.state().muted = muted;
    }

    pub fn volume(&self) -> f32 {
        self.state().volume
    }

    /// Clamp, store and apply a new volume. Returns the stored value.
    pub fn set_volume(&self, volume: f32) -> f32 {
        let volume = clamp_volume(volume);
        self.state().volume = volume;
        self.speech.set_volume(volume);
        volume
    }

    /// Speak unless muted.
    pub fn say(&self, text: &str) {
        if self.is_muted() {
            tracing::debug!(%text, "muted, not speaking");
            return;
        }
        self.speech.speak(text, false);
    }

    /// Speak regardless of the mute flag.
    pub fn announce(&self, text: &str, blocking: bool) {
        self.speech.speak(text, blocking);
    }
}
