//! macOS `say` speech sink.

use kittyvox_core::{clamp_volume, SpeechSink};
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

/// An installed `say` voice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceInfo {
    pub name: String,
    /// Locale tag such as `en_US`.
    pub language: String,
}

/// Arguments for one `say` invocation. Volume is applied with the inline
/// `[[volm v]]` command since `say` has no volume flag.
pub fn say_args(voice: &str, rate: u32, volume: f32, text: &str) -> Vec<String> {
    vec![
        "-v".to_string(),
        voice.to_string(),
        "-r".to_string(),
        rate.to_string(),
        format!("[[volm {:.2}]] {}", clamp_volume(volume), text),
    ]
}

/// Parse `say -v ?` output. Lines look like
/// `Samantha            en_US    # Hello, my name is Samantha.`; names may contain spaces.
pub fn parse_voice_list(output: &str) -> Vec<VoiceInfo> {
    output
        .lines()
        .filter_map(|line| {
            let left = line.split('#').next()?.trim_end();
            let (name, language) = left.rsplit_once(char::is_whitespace)?;
            let name = name.trim();
            if name.is_empty() || language.is_empty() {
                return None;
            }
            Some(VoiceInfo {
                name: name.to_string(),
                language: language.to_string(),
            })
        })
        .collect()
}

/// Voices installed on this machine. Empty when `say` is unavailable.
pub fn list_voices() -> Vec<VoiceInfo> {
    match Command::new("say").args(["-v", "?"]).output() {
        Ok(out) if out.status.success() => parse_voice_list(&String::from_utf8_lossy(&out.stdout)),
        Ok(out) => {
            warn!(status = %out.status, "say -v ? failed");
            Vec::new()
        }
        Err(e) => {
            warn!(error = %e, "say is not available");
            Vec::new()
        }
    }
}

/// How often a blocking `speak` checks whether its utterance ended or was replaced.
const BLOCKING_POLL: Duration = Duration::from_millis(50);

/// [`SpeechSink`] backed by the `say` command. Each utterance kills the one before it.
pub struct SaySpeech {
    program: String,
    leading_args: Vec<String>,
    voice: String,
    rate: u32,
    volume: Mutex<f32>,
    current: Mutex<Option<Child>>,
}

impl SaySpeech {
    pub fn new(voice: impl Into<String>, rate: u32, volume: f32) -> Self {
        Self {
            program: "say".to_string(),
            leading_args: Vec::new(),
            voice: voice.into(),
            rate,
            volume: Mutex::new(clamp_volume(volume)),
            current: Mutex::new(None),
        }
    }

    /// Run a `say`-compatible command instead of `say`. `leading_args` go before
    /// the voice, rate and text arguments.
    pub fn with_command(mut self, program: impl Into<String>, leading_args: Vec<String>) -> Self {
        self.program = program.into();
        self.leading_args = leading_args;
        self
    }

    fn lock_current(&self) -> std::sync::MutexGuard<'_, Option<Child>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Wait for child `pid` to exit, or until `stop` or a newer utterance takes it.
    fn wait_for(&self, pid: u32) {
        loop {
            std::thread::sleep(BLOCKING_POLL);
            let mut current = self.lock_current();
            match current.as_mut() {
                Some(child) if child.id() == pid => match child.try_wait() {
                    Ok(None) => continue,
                    Ok(Some(_)) => {
                        current.take();
                        return;
                    }
                    Err(e) => {
                        debug!(error = %e, "lost track of say process");
                        Self::kill_current(&mut current);
                        return;
                    }
                },
                _ => return,
            }
        }
    }

    fn volume(&self) -> f32 {
        *self.volume.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn kill_current(current: &mut Option<Child>) {
        if let Some(mut child) = current.take() {
            if let Ok(None) = child.try_wait() {
                let _ = child.kill();
            }
            let _ = child.wait();
        }
    }
}

impl SpeechSink for SaySpeech {
    fn speak(&self, text: &str, blocking: bool) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let mut current = self.lock_current();
        Self::kill_current(&mut current);

        let spawned = Command::new(&self.program)
            .args(&self.leading_args)
            .args(say_args(&self.voice, self.rate, self.volume(), text))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        let child = match spawned {
            Ok(child) => child,
            Err(e) => {
                warn!(error = %e, "could not run say");
                return;
            }
        };
        debug!(%text, blocking, "speaking");

        let pid = child.id();
        *current = Some(child);
        if blocking {
            // The child stays in `current` so `stop` and newer speech can kill it.
            drop(current);
            self.wait_for(pid);
        }
    }

    fn stop(&self) {
        let mut current = self.lock_current();
        Self::kill_current(&mut current);
    }

    fn set_volume(&self, volume: f32) {
        *self.volume.lock().unwrap_or_else(|e| e.into_inner()) = clamp_volume(volume);
    }
}

impl Drop for SaySpeech {
    fn drop(&mut self) {
        let current = self.current.get_mut().unwrap_or_else(|e| e.into_inner());
        Self::kill_current(current);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_carry_voice_rate_and_inline_volume() {
        let args = say_args("Samantha", 200, 0.8, "Sent to code.");
        assert_eq!(args, vec!["-v", "Samantha", "-r", "200", "[[volm 0.80]] Sent to code."]);
    }

    #[test]
    fn args_clamp_volume() {
        let args = say_args("Alex", 180, 3.0, "hi");
        assert_eq!(args[4], "[[volm 1.00]] hi");
    }

    #[test]
    fn parses_voice_list_with_spaced_names() {
        let output = "Samantha            en_US    # Hello, my name is Samantha.\n\
                      Bad News            en_US    # The light you see at the end of the tunnel.\n\
                      Amélie              fr_CA    # Bonjour, je m’appelle Amélie.\n\
                      \n";
        let voices = parse_voice_list(output);
        assert_eq!(voices.len(), 3);
        assert_eq!(voices[1], VoiceInfo { name: "Bad News".into(), language: "en_US".into() });
        assert_eq!(voices[2].language, "fr_CA");
    }

    #[test]
    fn volume_is_clamped() {
        let speech = SaySpeech::new("Samantha", 200, 0.0);
        assert_eq!(speech.volume(), 0.1);
        speech.set_volume(0.5);
        assert_eq!(speech.volume(), 0.5);
    }

    #[test]
    fn blank_text_is_not_spoken() {
        let speech = SaySpeech::new("Samantha", 200, 0.8);
        speech.speak("   ", false);
        assert!(speech.current.lock().unwrap().is_none());
    }

    /// `sh` stand-in for `say`: logs its arguments, then talks for five seconds.
    #[cfg(unix)]
    fn slow_say(log: &std::path::Path) -> SaySpeech {
        let script = format!("echo \"$@\" >> '{}'; sleep 5", log.display());
        SaySpeech::new("Samantha", 200, 0.8).with_command("sh", vec!["-c".into(), script, "say".into()])
    }

    #[cfg(unix)]
    fn wait_until_speaking(speech: &SaySpeech) {
        for _ in 0..100 {
            if speech.current.lock().unwrap().is_some() {
                return;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        panic!("say never started");
    }

    #[cfg(unix)]
    fn wait_until_logged(log: &std::path::Path, needle: &str) {
        for _ in 0..100 {
            if std::fs::read_to_string(log).is_ok_and(|said| said.contains(needle)) {
                return;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        panic!("say never received {}", needle);
    }

    #[cfg(unix)]
    #[test]
    fn stop_interrupts_blocking_speech() {
        let dir = tempfile::tempdir().unwrap();
        let speech = std::sync::Arc::new(slow_say(&dir.path().join("said.log")));
        let started = std::time::Instant::now();

        let speaker = {
            let speech = speech.clone();
            std::thread::spawn(move || speech.speak("Shutting down voice control.", true))
        };
        wait_until_speaking(&speech);
        speech.stop();
        speaker.join().unwrap();

        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(speech.current.lock().unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn newer_speech_replaces_blocking_speech() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("said.log");
        let speech = std::sync::Arc::new(slow_say(&log));
        let started = std::time::Instant::now();

        let speaker = {
            let speech = speech.clone();
            std::thread::spawn(move || speech.speak("first", true))
        };
        wait_until_logged(&log, "[[volm 0.80]] first");
        speech.speak("second", false);
        speaker.join().unwrap();
        assert!(started.elapsed() < Duration::from_secs(3));

        // Only the newer utterance is still running.
        assert!(speech.current.lock().unwrap().is_some());
        wait_until_logged(&log, "[[volm 0.80]] second");
        speech.stop();
        assert!(speech.current.lock().unwrap().is_none());
    }
}
