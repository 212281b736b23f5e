//! Sessions: one externally managed terminal window per project.
//!
//! The terminal itself is driven through [`TerminalDriver`]; a [`Session`] pairs a
//! driver with the opaque [`WindowHandle`] it returned at launch and exposes the
//! send/read/interrupt/focus capability set. Transport failures on the
//! fire-and-forget operations come back as `false`, never as errors.

use crate::config::{LayoutSettings, ProjectConfig, ReadExtent};
use crate::error::CoreResult;
use std::sync::Arc;

/// Ctrl+C, sent to cancel whatever the session is doing.
pub const INTERRUPT_BYTE: &str = "\x03";

/// Characters that end an idle prompt line.
const PROMPT_MARKERS: [char; 2] = ['>', '$'];

/// Opaque reference to a launched window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowHandle {
    /// Window title used to address the window.
    pub title: String,
    /// Process id of the terminal, when known.
    pub pid: Option<u32>,
}

impl WindowHandle {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            pid: None,
        }
    }
}

/// Primitives offered by the terminal program hosting the sessions.
pub trait TerminalDriver: Send + Sync {
    /// Launch a window for `project`, optionally at a layout position.
    fn launch(
        &self,
        project: &ProjectConfig,
        layout: &LayoutSettings,
        position: Option<(u32, u32)>,
    ) -> CoreResult<WindowHandle>;

    /// Deliver raw text to the window. Returns false if delivery failed.
    fn send_text(&self, handle: &WindowHandle, text: &str) -> bool;

    /// Read the window's visible text.
    fn get_text(&self, handle: &WindowHandle, extent: ReadExtent) -> CoreResult<String>;

    /// Bring the window to the front. Returns false if that failed.
    fn focus(&self, handle: &WindowHandle) -> bool;

    /// Check that the terminal is installed and accepts remote control.
    fn check_setup(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Last line of `text` that is not blank, trimmed.
pub fn last_non_blank_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).filter(|l| !l.is_empty()).last()
}

/// Ready/busy heuristic shared by [`Session::is_busy`], the output monitor and
/// the summarizer: the session is READY when its last non-blank line ends with a
/// prompt marker (`>` or `$`), otherwise BUSY.
pub fn is_ready(text: &str) -> bool {
    last_non_blank_line(text)
        .map(|line| line.ends_with(&PROMPT_MARKERS[..]))
        .unwrap_or(false)
}

/// One project's terminal window.
pub struct Session {
    id: String,
    label: String,
    handle: WindowHandle,
    extent: ReadExtent,
    driver: Arc<dyn TerminalDriver>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("handle", &self.handle)
            .finish()
    }
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        handle: WindowHandle,
        driver: Arc<dyn TerminalDriver>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            handle,
            extent: ReadExtent::Screen,
            driver,
        }
    }

    /// Default extent used by [`Session::read_current`].
    pub fn with_extent(mut self, extent: ReadExtent) -> Self {
        self.extent = extent;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Name spoken back to the user.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn handle(&self) -> &WindowHandle {
        &self.handle
    }

    pub fn send(&self, text: &str) -> bool {
        self.driver.send_text(&self.handle, text)
    }

    pub fn send_line(&self, text: &str) -> bool {
        self.send(&format!("{}\n", text))
    }

    pub fn interrupt(&self) -> bool {
        self.send(INTERRUPT_BYTE)
    }

    pub fn read(&self, extent: ReadExtent) -> CoreResult<String> {
        self.driver.get_text(&self.handle, extent)
    }

    /// Read with the session's configured extent.
    pub fn read_current(&self) -> CoreResult<String> {
        self.read(self.extent)
    }

    pub fn focus(&self) -> bool {
        self.driver.focus(&self.handle)
    }

    /// BUSY unless the current text ends in a prompt. An unreadable window counts as busy.
    pub fn is_busy(&self) -> bool {
        match self.read_current() {
            Ok(text) => !is_ready(&text),
            Err(_) => true,
        }
    }

    /// Best-effort close request; the result is not checked.
    pub fn close(&self) {
        let _ = self.send_line("/exit");
    }
}
