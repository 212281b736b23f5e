//! In-memory collaborators for unit tests.

use crate::config::{LayoutSettings, ProjectConfig, ReadExtent};
use crate::error::{CoreError, CoreResult};
use crate::session::{TerminalDriver, WindowHandle};
use crate::speech::SpeechSink;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Terminal driver whose windows hold whatever text the test sets.
#[derive(Default)]
pub struct ScriptedDriver {
    screens: Mutex<HashMap<String, String>>,
    sent: Mutex<HashMap<String, Vec<String>>>,
    unreachable: Mutex<HashSet<String>>,
    failing_reads: Mutex<HashSet<String>>,
    focused: Mutex<Vec<String>>,
    launched: Mutex<Vec<String>>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_screen(&self, title: &str, text: &str) {
        self.screens.lock().unwrap().insert(title.to_string(), text.to_string());
    }

    pub fn set_reachable(&self, title: &str, reachable: bool) {
        let mut set = self.unreachable.lock().unwrap();
        if reachable {
            set.remove(title);
        } else {
            set.insert(title.to_string());
        }
    }

    pub fn fail_reads(&self, title: &str) {
        self.failing_reads.lock().unwrap().insert(title.to_string());
    }

    pub fn sent(&self, title: &str) -> Vec<String> {
        self.sent.lock().unwrap().get(title).cloned().unwrap_or_default()
    }

    pub fn focused(&self) -> Vec<String> {
        self.focused.lock().unwrap().clone()
    }

    pub fn launched(&self) -> Vec<String> {
        self.launched.lock().unwrap().clone()
    }
}

impl TerminalDriver for ScriptedDriver {
    fn launch(
        &self,
        project: &ProjectConfig,
        _layout: &LayoutSettings,
        _position: Option<(u32, u32)>,
    ) -> CoreResult<WindowHandle> {
        let title = format!("claude-{}", project.name);
        self.launched.lock().unwrap().push(project.name.clone());
        Ok(WindowHandle::new(title))
    }

    fn send_text(&self, handle: &WindowHandle, text: &str) -> bool {
        if self.unreachable.lock().unwrap().contains(&handle.title) {
            return false;
        }
        self.sent
            .lock()
            .unwrap()
            .entry(handle.title.clone())
            .or_default()
            .push(text.to_string());
        true
    }

    fn get_text(&self, handle: &WindowHandle, _extent: ReadExtent) -> CoreResult<String> {
        if self.failing_reads.lock().unwrap().contains(&handle.title) {
            return Err(CoreError::Terminal(format!("no window {}", handle.title)));
        }
        Ok(self
            .screens
            .lock()
            .unwrap()
            .get(&handle.title)
            .cloned()
            .unwrap_or_default())
    }

    fn focus(&self, handle: &WindowHandle) -> bool {
        if self.unreachable.lock().unwrap().contains(&handle.title) {
            return false;
        }
        self.focused.lock().unwrap().push(handle.title.clone());
        true
    }
}

/// Speech sink that records utterances instead of playing them.
#[derive(Default)]
pub struct RecordingSpeech {
    spoken: Mutex<Vec<String>>,
    volume: Mutex<Option<f32>>,
}

impl RecordingSpeech {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<String> {
        self.spoken.lock().unwrap().last().cloned()
    }

    pub fn volume(&self) -> Option<f32> {
        *self.volume.lock().unwrap()
    }
}

impl SpeechSink for RecordingSpeech {
    fn speak(&self, text: &str, _blocking: bool) {
        self.spoken.lock().unwrap().push(text.to_string());
    }

    fn stop(&self) {}

    fn set_volume(&self, volume: f32) {
        *self.volume.lock().unwrap() = Some(volume);
    }
}
