//! **Push-to-talk**: global hotkey listener (rdev) that records while the
//! chord is held and hands each transcription to the controller.
//!
//! Two threads are involved. The rdev listener thread only tracks key state and
//! pushes press/release edges onto a channel; the capture thread (the one
//! [`TranscriptSource::listen`] runs on) owns the recorder, transcribes on
//! release and calls the handler synchronously, so one command finishes before
//! the next recording can begin.

use crate::audio::Recorder;
use crate::cues::{Cue, CuePlayer};
use crate::error::{VoiceError, VoiceResult};
use crate::stt::{create_stt, SttBackend};
use kittyvox_core::{CoreResult, TranscriptHandler, TranscriptSource, VoiceSettings};
use rdev::{EventType, Key};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};

/// Modifier keys a chord can require.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    /// True when every modifier set in `required` is held.
    fn covers(&self, required: &Modifiers) -> bool {
        (!required.ctrl || self.ctrl)
            && (!required.shift || self.shift)
            && (!required.alt || self.alt)
            && (!required.meta || self.meta)
    }

    /// Update held state for a modifier key. Returns false for non-modifier keys.
    fn update(&mut self, key: Key, down: bool) -> bool {
        let slot = match key {
            Key::ControlLeft | Key::ControlRight => &mut self.ctrl,
            Key::ShiftLeft | Key::ShiftRight => &mut self.shift,
            Key::Alt | Key::AltGr => &mut self.alt,
            Key::MetaLeft | Key::MetaRight => &mut self.meta,
            _ => return false,
        };
        *slot = down;
        true
    }
}

/// A modifier chord plus one trigger key, e.g. `ctrl+shift+v`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hotkey {
    pub modifiers: Modifiers,
    pub key: Key,
}

impl Hotkey {
    /// Parse `"ctrl+shift+v"`. Modifiers: `ctrl`, `shift`, `alt`/`option`,
    /// `cmd`/`super`/`meta`. Exactly one trigger key is required.
    pub fn parse(spec: &str) -> VoiceResult<Self> {
        let mut modifiers = Modifiers::default();
        let mut key = None;
        for token in spec.split('+') {
            let token = token.trim().to_ascii_lowercase();
            match token.as_str() {
                "" => return Err(VoiceError::Hotkey(format!("empty key in '{}'", spec))),
                "ctrl" | "control" => modifiers.ctrl = true,
                "shift" => modifiers.shift = true,
                "alt" | "option" => modifiers.alt = true,
                "cmd" | "command" | "super" | "meta" => modifiers.meta = true,
                name => {
                    let parsed = key_from_name(name)
                        .ok_or_else(|| VoiceError::Hotkey(format!("unknown key '{}' in '{}'", name, spec)))?;
                    if key.replace(parsed).is_some() {
                        return Err(VoiceError::Hotkey(format!("more than one trigger key in '{}'", spec)));
                    }
                }
            }
        }
        let key = key.ok_or_else(|| VoiceError::Hotkey(format!("no trigger key in '{}'", spec)))?;
        Ok(Self { modifiers, key })
    }
}

fn key_from_name(name: &str) -> Option<Key> {
    let key = match name {
        "a" => Key::KeyA,
        "b" => Key::KeyB,
        "c" => Key::KeyC,
        "d" => Key::KeyD,
        "e" => Key::KeyE,
        "f" => Key::KeyF,
        "g" => Key::KeyG,
        "h" => Key::KeyH,
        "i" => Key::KeyI,
        "j" => Key::KeyJ,
        "k" => Key::KeyK,
        "l" => Key::KeyL,
        "m" => Key::KeyM,
        "n" => Key::KeyN,
        "o" => Key::KeyO,
        "p" => Key::KeyP,
        "q" => Key::KeyQ,
        "r" => Key::KeyR,
        "s" => Key::KeyS,
        "t" => Key::KeyT,
        "u" => Key::KeyU,
        "v" => Key::KeyV,
        "w" => Key::KeyW,
        "x" => Key::KeyX,
        "y" => Key::KeyY,
        "z" => Key::KeyZ,
        "0" => Key::Num0,
        "1" => Key::Num1,
        "2" => Key::Num2,
        "3" => Key::Num3,
        "4" => Key::Num4,
        "5" => Key::Num5,
        "6" => Key::Num6,
        "7" => Key::Num7,
        "8" => Key::Num8,
        "9" => Key::Num9,
        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,
        "space" => Key::Space,
        "enter" | "return" => Key::Return,
        "tab" => Key::Tab,
        "esc" | "escape" => Key::Escape,
        "backspace" => Key::Backspace,
        "`" | "backquote" => Key::BackQuote,
        _ => return None,
    };
    Some(key)
}

/// Press or release of the whole chord.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Pressed,
    Released,
}

/// Turns raw key events into chord edges. Auto-repeat while held yields no
/// further presses; releasing the trigger or any required modifier ends the hold.
#[derive(Debug, Clone)]
pub struct HotkeyTracker {
    hotkey: Hotkey,
    held: Modifiers,
    active: bool,
}

impl HotkeyTracker {
    pub fn new(hotkey: Hotkey) -> Self {
        Self {
            hotkey,
            held: Modifiers::default(),
            active: false,
        }
    }

    pub fn on_event(&mut self, event: &EventType) -> Option<Edge> {
        match *event {
            EventType::KeyPress(key) => {
                if self.held.update(key, true) && key != self.hotkey.key {
                    return None;
                }
                if key == self.hotkey.key && !self.active && self.held.covers(&self.hotkey.modifiers) {
                    self.active = true;
                    return Some(Edge::Pressed);
                }
                None
            }
            EventType::KeyRelease(key) => {
                let was_modifier = self.held.update(key, false);
                let ends_hold = key == self.hotkey.key
                    || (was_modifier && !self.held.covers(&self.hotkey.modifiers));
                if self.active && ends_hold {
                    self.active = false;
                    return Some(Edge::Released);
                }
                None
            }
            _ => None,
        }
    }
}

/// [`TranscriptSource`] driven by a global push-to-talk hotkey.
pub struct PushToTalk {
    hotkey: Hotkey,
    stt: Box<dyn SttBackend>,
    cues: CuePlayer,
}

impl PushToTalk {
    pub fn new(hotkey: Hotkey, stt: Box<dyn SttBackend>, cues: CuePlayer) -> Self {
        Self { hotkey, stt, cues }
    }

    pub fn from_settings(settings: &VoiceSettings) -> VoiceResult<Self> {
        let hotkey = Hotkey::parse(&settings.hotkey)?;
        let stt = create_stt(settings.stt_backend, &settings.language)?;
        info!(hotkey = %settings.hotkey, stt = stt.name(), "push-to-talk configured");
        Ok(Self::new(hotkey, stt, CuePlayer::new(settings)))
    }

    /// Start the rdev listener thread. Edges arrive on the returned channel; it
    /// closes if the listener fails (e.g. missing accessibility permission).
    fn spawn_listener(&self) -> VoiceResult<UnboundedReceiver<Edge>> {
        let (tx, rx): (UnboundedSender<Edge>, _) = unbounded_channel();
        let mut tracker = HotkeyTracker::new(self.hotkey);
        std::thread::Builder::new()
            .name("kittyvox-hotkey".into())
            .spawn(move || {
                let callback = move |event: rdev::Event| {
                    if let Some(edge) = tracker.on_event(&event.event_type) {
                        let _ = tx.send(edge);
                    }
                };
                if let Err(e) = rdev::listen(callback) {
                    error!("hotkey listener error: {:?}", e);
                }
            })?;
        Ok(rx)
    }

    fn finish_recording(&self, recorder: &mut Recorder, handler: &dyn TranscriptHandler) {
        let recording = recorder.stop();
        if recording.is_empty() {
            debug!("empty recording");
            return;
        }
        match self.stt.transcribe(&recording) {
            Ok(Some(transcription)) => handler.handle_transcription(&transcription.text),
            Ok(None) => debug!(secs = recording.duration.as_secs_f32(), "nothing heard"),
            Err(e) => {
                warn!(error = %e, backend = self.stt.name(), "transcription failed");
                self.cues.play(Cue::Error);
            }
        }
    }
}

impl TranscriptSource for PushToTalk {
    fn listen(self: Box<Self>, handler: Arc<dyn TranscriptHandler>) -> CoreResult<()> {
        let mut edges = self.spawn_listener()?;
        let mut recorder = Recorder::new();

        while let Some(edge) = edges.blocking_recv() {
            if !handler.is_running() {
                break;
            }
            match edge {
                Edge::Pressed => {
                    self.cues.play(Cue::ListenStart);
                    if let Err(e) = recorder.start() {
                        warn!(error = %e, "could not start recording");
                        self.cues.play(Cue::Error);
                    }
                }
                Edge::Released => {
                    if !recorder.is_recording() {
                        continue;
                    }
                    self.cues.play(Cue::ListenStop);
                    self.finish_recording(&mut recorder, handler.as_ref());
                }
            }
        }
        if recorder.is_recording() {
            recorder.stop();
        }
        debug!("push-to-talk stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(spec: &str) -> HotkeyTracker {
        HotkeyTracker::new(Hotkey::parse(spec).unwrap())
    }

    #[test]
    fn parses_default_chord() {
        let hotkey = Hotkey::parse("ctrl+shift+v").unwrap();
        assert_eq!(hotkey.key, Key::KeyV);
        assert_eq!(
            hotkey.modifiers,
            Modifiers { ctrl: true, shift: true, alt: false, meta: false }
        );
    }

    #[test]
    fn parses_modifier_aliases() {
        let hotkey = Hotkey::parse("Option + CMD + F5").unwrap();
        assert!(hotkey.modifiers.alt && hotkey.modifiers.meta);
        assert_eq!(hotkey.key, Key::F5);
    }

    #[test]
    fn rejects_bad_chords() {
        assert!(Hotkey::parse("ctrl+shift").is_err());
        assert!(Hotkey::parse("ctrl++v").is_err());
        assert!(Hotkey::parse("a+b").is_err());
        assert!(Hotkey::parse("ctrl+hyper").is_err());
    }

    #[test]
    fn chord_press_and_release() {
        let mut t = tracker("ctrl+shift+v");
        assert_eq!(t.on_event(&EventType::KeyPress(Key::ControlLeft)), None);
        assert_eq!(t.on_event(&EventType::KeyPress(Key::ShiftRight)), None);
        assert_eq!(t.on_event(&EventType::KeyPress(Key::KeyV)), Some(Edge::Pressed));
        assert_eq!(t.on_event(&EventType::KeyRelease(Key::KeyV)), Some(Edge::Released));
    }

    #[test]
    fn autorepeat_is_one_press() {
        let mut t = tracker("ctrl+v");
        t.on_event(&EventType::KeyPress(Key::ControlLeft));
        assert_eq!(t.on_event(&EventType::KeyPress(Key::KeyV)), Some(Edge::Pressed));
        assert_eq!(t.on_event(&EventType::KeyPress(Key::KeyV)), None);
        assert_eq!(t.on_event(&EventType::KeyPress(Key::KeyV)), None);
    }

    #[test]
    fn trigger_without_modifiers_is_ignored() {
        let mut t = tracker("ctrl+shift+v");
        t.on_event(&EventType::KeyPress(Key::ControlLeft));
        assert_eq!(t.on_event(&EventType::KeyPress(Key::KeyV)), None);
        assert_eq!(t.on_event(&EventType::KeyRelease(Key::KeyV)), None);
    }

    #[test]
    fn releasing_modifier_ends_hold() {
        let mut t = tracker("ctrl+v");
        t.on_event(&EventType::KeyPress(Key::ControlRight));
        t.on_event(&EventType::KeyPress(Key::KeyV));
        assert_eq!(t.on_event(&EventType::KeyRelease(Key::ControlRight)), Some(Edge::Released));
        assert_eq!(t.on_event(&EventType::KeyRelease(Key::KeyV)), None);
    }

    #[test]
    fn mouse_events_are_ignored() {
        let mut t = tracker("f9");
        assert_eq!(t.on_event(&EventType::MouseMove { x: 1.0, y: 2.0 }), None);
        assert_eq!(t.on_event(&EventType::KeyPress(Key::F9)), Some(Edge::Pressed));
    }
}
