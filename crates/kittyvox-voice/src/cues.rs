//! Short audible cues for push-to-talk.

use kittyvox_core::VoiceSettings;
use rodio::{Decoder, OutputStream, Sink};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cue {
    ListenStart,
    ListenStop,
    Error,
}

impl Cue {
    fn default_sound(self) -> &'static str {
        match self {
            Cue::ListenStart => "/System/Library/Sounds/Pop.aiff",
            Cue::ListenStop => "/System/Library/Sounds/Blow.aiff",
            Cue::Error => "/System/Library/Sounds/Basso.aiff",
        }
    }
}

/// Plays enabled cues on a short-lived thread so capture is never delayed.
#[derive(Debug, Clone, Default)]
pub struct CuePlayer {
    sounds: HashMap<Cue, PathBuf>,
}

impl CuePlayer {
    pub fn new(settings: &VoiceSettings) -> Self {
        let mut player = Self::default();
        for (cue, enabled) in [
            (Cue::ListenStart, settings.sound_listen_start),
            (Cue::ListenStop, settings.sound_listen_stop),
            (Cue::Error, settings.sound_error),
        ] {
            if enabled {
                player = player.with_sound(cue, cue.default_sound());
            }
        }
        player
    }

    /// Override (or enable) the sound file for a cue.
    pub fn with_sound(mut self, cue: Cue, path: impl Into<PathBuf>) -> Self {
        self.sounds.insert(cue, path.into());
        self
    }

    pub fn is_enabled(&self, cue: Cue) -> bool {
        self.sounds.contains_key(&cue)
    }

    pub fn play(&self, cue: Cue) {
        let Some(path) = self.sounds.get(&cue).cloned() else {
            return;
        };
        let spawned = std::thread::Builder::new()
            .name("kittyvox-cue".into())
            .spawn(move || {
                if let Err(e) = play_file(&path) {
                    debug!(?cue, path = %path.display(), error = %e, "cue playback failed");
                }
            });
        if let Err(e) = spawned {
            debug!(error = %e, "could not spawn cue thread");
        }
    }
}

fn play_file(path: &Path) -> crate::VoiceResult<()> {
    let (_stream, handle) = OutputStream::try_default()?;
    let sink = Sink::try_new(&handle)?;
    let source = Decoder::new(BufReader::new(File::open(path)?))?;
    sink.append(source);
    sink.sleep_until_end();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggles_select_enabled_cues() {
        let mut settings = VoiceSettings::default();
        settings.sound_listen_stop = false;
        let player = CuePlayer::new(&settings);
        assert!(player.is_enabled(Cue::ListenStart));
        assert!(!player.is_enabled(Cue::ListenStop));
        assert!(player.is_enabled(Cue::Error));
    }

    #[test]
    fn disabled_cue_plays_nothing() {
        let player = CuePlayer::default();
        player.play(Cue::Error);
        assert!(!player.is_enabled(Cue::Error));
    }

    #[test]
    fn missing_file_is_ignored() {
        let player = CuePlayer::default().with_sound(Cue::Error, "/nonexistent/cue.aiff");
        player.play(Cue::Error);
    }
}
