//! Controller configuration loaded from `config.toml`.
//!
//! Precedence: built-in defaults < config file < `KITTYVOX__SECTION__KEY` environment
//! overrides. The file path is `KITTYVOX_CONFIG` if set, else
//! `~/.config/kittyvox/config.toml`.
//!
//! | Section | Purpose |
//! |---------|---------|
//! | `[[projects]]` | One entry per kitty window, in registration order. |
//! | `[voice]` | Hotkey, STT/TTS engine selection, voice, rate, volume, cue sounds. |
//! | `[summary]` | Spoken summary strategy, word cap, announcement toggles. |
//! | `[monitor]` | Output poll interval and read extent. |
//! | `[layout]` | Window arrangement and size. |
//! | `[commands.<name>]` | User-defined window commands (`send = "..."`). |

use crate::error::{CoreError, CoreResult};
use crate::router::GlobalCommand;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "KITTYVOX_CONFIG";

/// Commented template written by `kittyvox init`.
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# kittyvox configuration
# Each project becomes a titled kitty window running `command` in `directory`.

[[projects]]
name = "scratch"
directory = "~/scratch"
command = "claude"
aliases = ["scratchpad", "temp"]

[voice]
hotkey = "ctrl+shift+v"      # push-to-talk chord
language = "en"
stt_backend = "auto"         # auto, api, whisper, placeholder
tts_engine = "say"           # say, api, none
tts_voice = "Samantha"       # run `kittyvox voices` to list
tts_rate = 200               # words per minute
volume = 0.8                 # 0.1 to 1.0
sound_listen_start = true
sound_listen_stop = true
sound_error = true

[summary]
max_spoken_words = 150
strategy = "smart"           # smart, first_last, full
announce_completion = true
announce_errors = true
announce_questions = true
min_announce_chars = 50

[monitor]
poll_interval_ms = 1000
read_extent = "screen"       # screen, all, selection, first_cmd_output_on_screen

[layout]
arrangement = "grid"         # grid, horizontal, vertical
window_width = 900
window_height = 700

# Custom window commands: "<project> tests" sends the literal text below.
# [commands.tests]
# send = "run the test suite and fix any failures"
"#;

fn default_command() -> String {
    "claude".to_string()
}

/// One project: a kitty window running `command` in `directory`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    pub directory: PathBuf,
    #[serde(default = "default_command")]
    pub command: String,
    /// Extra voice-friendly names. (Config alias: `voice_alias`)
    #[serde(default, alias = "voice_alias")]
    pub aliases: Vec<String>,
}

impl ProjectConfig {
    pub fn new(name: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            directory: directory.into(),
            command: default_command(),
            aliases: Vec::new(),
        }
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    /// Lowercased name followed by lowercased aliases.
    pub fn all_names(&self) -> Vec<String> {
        std::iter::once(&self.name)
            .chain(self.aliases.iter())
            .map(|n| n.trim().to_lowercase())
            .filter(|n| !n.is_empty())
            .collect()
    }

    /// Directory with a leading `~` expanded to the home directory.
    pub fn resolved_directory(&self) -> PathBuf {
        expand_home(&self.directory)
    }
}

/// Speech-to-text backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SttBackendKind {
    #[default]
    Auto,
    Api,
    Whisper,
    Placeholder,
}

/// Text-to-speech engine selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtsEngineKind {
    #[default]
    Say,
    Api,
    None,
}

/// Voice input/output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceSettings {
    pub hotkey: String,
    pub language: String,
    pub stt_backend: SttBackendKind,
    pub tts_engine: TtsEngineKind,
    pub tts_voice: String,
    pub tts_rate: u32,
    pub volume: f32,
    pub sound_listen_start: bool,
    pub sound_listen_stop: bool,
    pub sound_error: bool,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            hotkey: "ctrl+shift+v".to_string(),
            language: "en".to_string(),
            stt_backend: SttBackendKind::Auto,
            tts_engine: TtsEngineKind::Say,
            tts_voice: "Samantha".to_string(),
            tts_rate: 200,
            volume: 0.8,
            sound_listen_start: true,
            sound_listen_stop: true,
            sound_error: true,
        }
    }
}

/// Compression strategy for spoken summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryStrategy {
    Full,
    FirstLast,
    #[default]
    Smart,
}

/// Summarization and announcement settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarySettings {
    /// Word cap applied to every spoken summary.
    #[serde(alias = "max_spoken_length")]
    pub max_spoken_words: usize,
    pub strategy: SummaryStrategy,
    pub announce_completion: bool,
    pub announce_errors: bool,
    pub announce_questions: bool,
    /// Completion deltas at or below this many characters are only announced
    /// when they carry an error or a question.
    pub min_announce_chars: usize,
}

impl Default for SummarySettings {
    fn default() -> Self {
        Self {
            max_spoken_words: 150,
            strategy: SummaryStrategy::Smart,
            announce_completion: true,
            announce_errors: true,
            announce_questions: true,
            min_announce_chars: 50,
        }
    }
}

/// How much of a window's text a read returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadExtent {
    #[default]
    Screen,
    All,
    Selection,
    FirstCmdOutputOnScreen,
}

impl ReadExtent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadExtent::Screen => "screen",
            ReadExtent::All => "all",
            ReadExtent::Selection => "selection",
            ReadExtent::FirstCmdOutputOnScreen => "first_cmd_output_on_screen",
        }
    }
}

/// Output monitor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub poll_interval_ms: u64,
    pub read_extent: ReadExtent,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            read_extent: ReadExtent::Screen,
        }
    }
}

impl MonitorSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(50))
    }
}

/// Window arrangement on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arrangement {
    #[default]
    Grid,
    Horizontal,
    Vertical,
}

/// Window layout settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutSettings {
    pub arrangement: Arrangement,
    pub window_width: u32,
    pub window_height: u32,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            arrangement: Arrangement::Grid,
            window_width: 900,
            window_height: 700,
        }
    }
}

impl LayoutSettings {
    /// Top-left corner for each of `count` windows.
    pub fn positions(&self, count: usize) -> Vec<(u32, u32)> {
        let (w, h) = (self.window_width, self.window_height);
        (0..count as u32)
            .map(|i| match self.arrangement {
                Arrangement::Horizontal => (i * w, 0),
                Arrangement::Vertical => (0, i * h),
                Arrangement::Grid => {
                    let cols = if count > 1 { 2 } else { 1 };
                    ((i % cols) * w, (i / cols) * h)
                }
            })
            .collect()
    }
}

/// A user-defined window command: saying `<project> <name>` sends `send`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomCommand {
    #[serde(default)]
    pub send: String,
}

/// Top-level controller configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub projects: Vec<ProjectConfig>,
    pub voice: VoiceSettings,
    pub summary: SummarySettings,
    pub monitor: MonitorSettings,
    pub layout: LayoutSettings,
    pub commands: BTreeMap<String, CustomCommand>,
}

impl ControllerConfig {
    /// Default config path: `KITTYVOX_CONFIG` or `~/.config/kittyvox/config.toml`.
    pub fn default_path() -> PathBuf {
        if let Ok(p) = std::env::var(CONFIG_PATH_ENV) {
            if !p.trim().is_empty() {
                return expand_home(Path::new(p.trim()));
            }
        }
        dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kittyvox")
            .join("config.toml")
    }

    /// Load from the default path (missing file => defaults) plus environment overrides.
    pub fn load() -> CoreResult<Self> {
        Self::load_from_path(&Self::default_path())
    }

    /// Load from `path` (missing file => defaults) plus environment overrides.
    pub fn load_from_path(path: &Path) -> CoreResult<Self> {
        let builder = config::Config::builder();
        let builder = if path.exists() {
            builder.add_source(config::File::from(path).format(config::FileFormat::Toml))
        } else {
            builder
        };

        let built = builder
            .add_source(
                config::Environment::with_prefix("KITTYVOX")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut loaded: ControllerConfig = built.try_deserialize()?;
        loaded.voice.volume = clamp_volume(loaded.voice.volume);
        Ok(loaded)
    }

    /// Parse a TOML document directly (no environment overrides).
    pub fn from_toml_str(content: &str) -> CoreResult<Self> {
        let mut parsed: ControllerConfig = toml::from_str(content)?;
        parsed.voice.volume = clamp_volume(parsed.voice.volume);
        Ok(parsed)
    }

    /// Save to `path`, creating parent directories.
    pub fn save_to_path(&self, path: &Path) -> CoreResult<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Write the commented default template to `path`.
    ///
    /// Returns `Ok(false)` when the file exists and `force` is not set.
    pub fn init_default(path: &Path, force: bool) -> CoreResult<bool> {
        if path.exists() && !force {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, DEFAULT_CONFIG_TEMPLATE)?;
        Ok(true)
    }

    /// Add a project, replacing any existing project with the same name in place.
    pub fn add_project(&mut self, project: ProjectConfig) {
        match self
            .projects
            .iter_mut()
            .find(|p| p.name.eq_ignore_ascii_case(&project.name))
        {
            Some(existing) => *existing = project,
            None => self.projects.push(project),
        }
    }

    /// Remove a project by name. Returns true when something was removed.
    pub fn remove_project(&mut self, name: &str) -> bool {
        let before = self.projects.len();
        self.projects.retain(|p| !p.name.eq_ignore_ascii_case(name));
        self.projects.len() != before
    }

    pub fn project(&self, name: &str) -> Option<&ProjectConfig> {
        self.projects.iter().find(|p| p.name == name)
    }

    /// Find a project by spoken name or alias (first registered wins).
    pub fn find_project(&self, spoken: &str) -> Option<&ProjectConfig> {
        let spoken = spoken.trim().to_lowercase();
        self.projects
            .iter()
            .find(|p| p.all_names().iter().any(|n| *n == spoken))
    }

    /// Configuration problems worth a warning; none of them are fatal.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.projects.is_empty() {
            warnings.push("no projects configured".to_string());
        }

        let mut seen: HashSet<String> = HashSet::new();
        for project in &self.projects {
            if project.name.trim().is_empty() {
                warnings.push("project with an empty name".to_string());
            }
            for name in project.all_names() {
                if !seen.insert(name.clone()) {
                    warnings.push(format!(
                        "name '{}' of project '{}' is already used by an earlier project; the earlier one wins",
                        name, project.name
                    ));
                }
                if let Some(global) = GlobalCommand::shadowing(&name) {
                    warnings.push(format!(
                        "name '{}' of project '{}' starts with the global phrase '{}'; use '{}: ...' to reach it",
                        name,
                        project.name,
                        global.phrase(),
                        name
                    ));
                }
            }
            let dir = project.resolved_directory();
            if !dir.exists() {
                warnings.push(format!(
                    "directory for project '{}' does not exist: {}",
                    project.name,
                    dir.display()
                ));
            }
        }

        for (name, cmd) in &self.commands {
            if cmd.send.trim().is_empty() {
                warnings.push(format!("custom command '{}' has nothing to send", name));
            }
        }

        warnings
    }
}

/// Clamp to the speakable volume range in 0.1 steps.
pub fn clamp_volume(volume: f32) -> f32 {
    let clamped = if volume.is_finite() { volume.clamp(0.1, 1.0) } else { 0.8 };
    (clamped * 10.0).round() / 10.0
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}
