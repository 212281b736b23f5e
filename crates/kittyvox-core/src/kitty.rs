//! kitty terminal driver over the `kitty @` remote-control protocol.
//!
//! Windows are addressed by title (`claude-<project>`), matched exactly with
//! `--match title:^<title>$`. Remote control must be enabled in `kitty.conf`.

use crate::config::{LayoutSettings, ProjectConfig, ReadExtent};
use crate::error::{CoreError, CoreResult};
use crate::session::{TerminalDriver, WindowHandle};
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, warn};

const KITTY_BIN: &str = "kitty";
/// Time for a new window to start its shell before the next launch.
const LAUNCH_SETTLE: Duration = Duration::from_millis(500);
const LAUNCH_STAGGER: Duration = Duration::from_millis(300);

pub const REMOTE_CONTROL_HELP: &str = "kitty remote control is not enabled.\n\
Add to ~/.config/kitty/kitty.conf:\n  allow_remote_control yes\n  listen_on unix:/tmp/kitty\n\
Then restart kitty.";

pub const NOT_INSTALLED_HELP: &str =
    "kitty is not installed or not on PATH. See https://sw.kovidgoyal.net/kitty/binary/";

/// Window title used for a project.
pub fn window_title(project: &ProjectConfig) -> String {
    format!("claude-{}", project.name)
}

/// Projects that already have a window among `titles`, in config order.
pub fn open_project_windows<'a>(projects: &'a [ProjectConfig], titles: &[String]) -> Vec<&'a str> {
    projects
        .iter()
        .filter(|p| titles.contains(&window_title(p)))
        .map(|p| p.name.as_str())
        .collect()
}

fn title_match(title: &str) -> String {
    format!("title:^{}$", title)
}

/// Arguments for `kitty` that open a window for `project`.
pub fn launch_args(
    project: &ProjectConfig,
    layout: &LayoutSettings,
    position: Option<(u32, u32)>,
) -> Vec<String> {
    let mut args = vec![
        "--title".to_string(),
        window_title(project),
        "--directory".to_string(),
        project.resolved_directory().display().to_string(),
    ];
    if position.is_some() {
        args.push("--override".into());
        args.push(format!("initial_window_width={}", layout.window_width));
        args.push("--override".into());
        args.push(format!("initial_window_height={}", layout.window_height));
    }
    args.push("-e".into());
    args.push("bash".into());
    args.push("-c".into());
    args.push(format!("{}; exec bash", project.command));
    args
}

#[derive(Debug, Default, Clone, Copy)]
pub struct KittyDriver;

impl KittyDriver {
    pub fn new() -> Self {
        Self
    }

    /// Run `kitty @ <args>`, returning stdout on success.
    fn remote(&self, args: &[&str]) -> CoreResult<String> {
        let output = Command::new(KITTY_BIN)
            .arg("@")
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| CoreError::Terminal(format!("kitty @ {}: {}", args.join(" "), e)))?;
        if !output.status.success() {
            return Err(CoreError::Terminal(format!(
                "kitty @ {} exited with {}: {}",
                args.first().copied().unwrap_or_default(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn installed(&self) -> bool {
        Command::new(KITTY_BIN)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Titles of every window kitty currently has open.
    pub fn list_window_titles(&self) -> CoreResult<Vec<String>> {
        let raw = self.remote(&["ls"])?;
        let os_windows: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| CoreError::Terminal(format!("kitty @ ls returned invalid JSON: {}", e)))?;
        Ok(window_titles(&os_windows))
    }
}

/// Walk `kitty @ ls` output: os windows -> tabs -> windows -> title.
fn window_titles(os_windows: &serde_json::Value) -> Vec<String> {
    os_windows
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|os| os.get("tabs")?.as_array())
        .flatten()
        .filter_map(|tab| tab.get("windows")?.as_array())
        .flatten()
        .filter_map(|w| w.get("title")?.as_str().map(str::to_string))
        .collect()
}

impl TerminalDriver for KittyDriver {
    fn launch(
        &self,
        project: &ProjectConfig,
        layout: &LayoutSettings,
        position: Option<(u32, u32)>,
    ) -> CoreResult<WindowHandle> {
        let args = launch_args(project, layout, position);
        debug!(project = %project.name, ?args, "launching kitty window");

        let mut command = Command::new(KITTY_BIN);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let child = command.spawn().map_err(|e| CoreError::Launch {
            project: project.name.clone(),
            reason: e.to_string(),
        })?;

        std::thread::sleep(LAUNCH_SETTLE + LAUNCH_STAGGER);
        Ok(WindowHandle {
            title: window_title(project),
            pid: Some(child.id()),
        })
    }

    fn send_text(&self, handle: &WindowHandle, text: &str) -> bool {
        let matcher = title_match(&handle.title);
        match self.remote(&["send-text", "--match", &matcher, text]) {
            Ok(_) => true,
            Err(e) => {
                warn!(window = %handle.title, error = %e, "send-text failed");
                false
            }
        }
    }

    fn get_text(&self, handle: &WindowHandle, extent: ReadExtent) -> CoreResult<String> {
        let matcher = title_match(&handle.title);
        self.remote(&["get-text", "--match", &matcher, "--extent", extent.as_str()])
    }

    fn focus(&self, handle: &WindowHandle) -> bool {
        let matcher = title_match(&handle.title);
        match self.remote(&["focus-window", "--match", &matcher]) {
            Ok(_) => true,
            Err(e) => {
                warn!(window = %handle.title, error = %e, "focus-window failed");
                false
            }
        }
    }

    fn check_setup(&self) -> Result<(), String> {
        if !self.installed() {
            return Err(NOT_INSTALLED_HELP.to_string());
        }
        self.remote(&["ls"]).map(|_| ()).map_err(|e| {
            debug!(error = %e, "kitty @ ls failed");
            REMOTE_CONTROL_HELP.to_string()
        })
    }
}
