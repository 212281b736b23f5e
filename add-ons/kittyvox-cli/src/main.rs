//! kittyvox: talk to coding-assistant sessions running in kitty windows.
//!
//! Hold the push-to-talk hotkey, say "<project>: <request>", release. Finished
//! output is summarized and read back.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use kittyvox_core::kitty::open_project_windows;
use kittyvox_core::{ControllerConfig, KittyDriver, ProjectConfig, TerminalDriver, VoiceController};
use kittyvox_voice::{create_speech, list_voices, Hotkey, PushToTalk};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "kittyvox")]
#[command(about = "Voice control for coding assistants in kitty", long_about = None)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (defaults to $KITTYVOX_CONFIG or ~/.config/kittyvox/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch project windows and start listening
    Start {
        /// Projects to launch (defaults to all configured projects)
        projects: Vec<String>,
    },

    /// Write a default config file
    Init {
        /// Overwrite an existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Add or replace a project
    Add {
        /// Spoken project name
        name: String,

        /// Working directory for the session
        directory: PathBuf,

        /// Command to run in the window
        #[arg(short, long, default_value = "claude")]
        command: String,

        /// Extra spoken name (repeatable)
        #[arg(short, long = "alias")]
        aliases: Vec<String>,
    },

    /// Remove a project
    Remove {
        name: String,
    },

    /// List configured projects
    List,

    /// List installed `say` voices
    Voices,

    /// Check kitty remote control, hotkey and speech setup
    Check,

    /// Speak a test phrase with the configured voice
    TestVoice {
        text: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before any env::var calls)
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[kittyvox] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(ControllerConfig::default_path);

    match args.command {
        Commands::Start { projects } => start(&config_path, projects).await,
        Commands::Init { force } => init(&config_path, force),
        Commands::Add {
            name,
            directory,
            command,
            aliases,
        } => add(&config_path, name, directory, command, aliases),
        Commands::Remove { name } => remove(&config_path, &name),
        Commands::List => list(&config_path),
        Commands::Voices => voices(),
        Commands::Check => check(&config_path),
        Commands::TestVoice { text } => test_voice(&config_path, text),
    }
}

fn load_config(path: &Path) -> anyhow::Result<ControllerConfig> {
    ControllerConfig::load_from_path(path)
        .with_context(|| format!("failed to load config from {}", path.display()))
}

/// Load the file alone for `add` and `remove`, so `KITTYVOX__*` overrides are not
/// written back. The rewrite drops comments from the file.
fn load_for_edit(path: &Path) -> anyhow::Result<ControllerConfig> {
    if !path.exists() {
        return Ok(ControllerConfig::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config from {}", path.display()))?;
    ControllerConfig::from_toml_str(&content)
        .with_context(|| format!("failed to parse config from {}", path.display()))
}

/// Resolve spoken names or aliases to configured project names. Unknown names are an error.
fn resolve_projects(config: &ControllerConfig, requested: &[String]) -> anyhow::Result<Option<Vec<String>>> {
    if requested.is_empty() {
        return Ok(None);
    }
    let mut names = Vec::with_capacity(requested.len());
    for name in requested {
        match config.find_project(name) {
            Some(project) => names.push(project.name.clone()),
            None => {
                let available: Vec<&str> = config.projects.iter().map(|p| p.name.as_str()).collect();
                bail!("unknown project '{}' (available: {})", name, available.join(", "));
            }
        }
    }
    Ok(Some(names))
}

async fn start(config_path: &Path, projects: Vec<String>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    if config.projects.is_empty() {
        bail!(
            "no projects configured in {}; add one with `kittyvox add <name> <directory>`",
            config_path.display()
        );
    }
    let names = resolve_projects(&config, &projects)?;

    let speech = create_speech(&config.voice);
    let source = PushToTalk::from_settings(&config.voice).context("voice input setup failed")?;
    let controller = VoiceController::new(config, Arc::new(KittyDriver::new()), speech, Box::new(source));

    tracing::info!(config = %config_path.display(), "kittyvox starting");
    controller.run(names).await?;
    Ok(())
}

fn init(config_path: &Path, force: bool) -> anyhow::Result<()> {
    if ControllerConfig::init_default(config_path, force)? {
        println!("Wrote default config to {}", config_path.display());
    } else {
        println!(
            "Config already exists at {} (use --force to overwrite)",
            config_path.display()
        );
    }
    Ok(())
}

fn add(
    config_path: &Path,
    name: String,
    directory: PathBuf,
    command: String,
    aliases: Vec<String>,
) -> anyhow::Result<()> {
    let mut config = load_for_edit(config_path)?;
    let mut project = ProjectConfig::new(name, directory).with_aliases(aliases);
    project.command = command;
    if !project.resolved_directory().is_dir() {
        tracing::warn!(directory = %project.resolved_directory().display(), "directory does not exist yet");
    }
    println!("Added {} ({})", project.name, project.resolved_directory().display());
    config.add_project(project);
    for warning in config.validate() {
        println!("warning: {}", warning);
    }
    config.save_to_path(config_path)?;
    Ok(())
}

fn remove(config_path: &Path, name: &str) -> anyhow::Result<()> {
    let mut config = load_for_edit(config_path)?;
    if !config.remove_project(name) {
        bail!("no project named '{}'", name);
    }
    config.save_to_path(config_path)?;
    println!("Removed {}", name);
    Ok(())
}

fn list(config_path: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    if config.projects.is_empty() {
        println!("No projects configured.");
        return Ok(());
    }
    for project in &config.projects {
        let aliases = if project.aliases.is_empty() {
            String::new()
        } else {
            format!(" (aliases: {})", project.aliases.join(", "))
        };
        println!(
            "{}{}\n    {} in {}",
            project.name,
            aliases,
            project.command,
            project.resolved_directory().display()
        );
    }
    Ok(())
}

fn voices() -> anyhow::Result<()> {
    let voices = list_voices();
    if voices.is_empty() {
        bail!("no voices found (is the `say` command available?)");
    }
    for voice in voices {
        println!("{:<24} {}", voice.name, voice.language);
    }
    Ok(())
}

fn check(config_path: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let mut ok = true;

    let kitty = KittyDriver::new();
    match kitty.check_setup() {
        Ok(()) => {
            println!("kitty remote control: ok");
            match kitty.list_window_titles() {
                Ok(titles) => {
                    let open = open_project_windows(&config.projects, &titles);
                    if open.is_empty() {
                        println!("open project windows: none");
                    } else {
                        println!("open project windows: {}", open.join(", "));
                    }
                }
                Err(e) => println!("open project windows: unknown ({})", e),
            }
        }
        Err(message) => {
            ok = false;
            println!("kitty remote control: FAILED\n{}", message);
        }
    }

    match Hotkey::parse(&config.voice.hotkey) {
        Ok(_) => println!("hotkey {}: ok", config.voice.hotkey),
        Err(e) => {
            ok = false;
            println!("hotkey: FAILED ({})", e);
        }
    }

    match kittyvox_voice::create_stt(config.voice.stt_backend, &config.voice.language) {
        Ok(stt) => println!("speech-to-text: {}", stt.name()),
        Err(e) => {
            ok = false;
            println!("speech-to-text: FAILED ({})", e);
        }
    }

    println!("projects: {}", config.projects.len());
    for warning in config.validate() {
        println!("warning: {}", warning);
    }

    if !ok {
        bail!("setup incomplete");
    }
    Ok(())
}

fn test_voice(config_path: &Path, text: Option<String>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let text = text.unwrap_or_else(|| "Voice control is working.".to_string());
    let speech = create_speech(&config.voice);
    speech.speak(&text, true);
    Ok(())
}
