//! Core of kittyvox: voice control for a set of kitty terminal sessions.
//!
//! The pieces, from the outside in:
//! - [`controller::VoiceController`] owns the lifecycle and the two long-running loops
//!   (the transcript source thread and the [`monitor::OutputMonitor`] task).
//! - [`dispatch::CommandDispatcher`] turns each transcription into a global or
//!   window command via [`router::CommandRouter`].
//! - [`registry::SessionRegistry`] holds the live [`session::Session`]s, each backed
//!   by a [`session::TerminalDriver`] such as [`kitty::KittyDriver`].
//! - [`summarizer::Summarizer`] compresses terminal output for speech.

pub mod config;
pub mod context;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod kitty;
pub mod monitor;
pub mod registry;
pub mod router;
pub mod session;
pub mod speech;
pub mod summarizer;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{
    clamp_volume, Arrangement, ControllerConfig, CustomCommand, LayoutSettings, MonitorSettings,
    ProjectConfig, ReadExtent, SttBackendKind, SummarySettings, SummaryStrategy, TtsEngineKind,
    VoiceSettings,
};
pub use context::ControllerContext;
pub use controller::VoiceController;
pub use dispatch::{CommandDispatcher, TranscriptHandler, TranscriptSource};
pub use error::{CoreError, CoreResult};
pub use kitty::KittyDriver;
pub use monitor::OutputMonitor;
pub use registry::{AliasTable, SessionRegistry};
pub use router::{CommandRouter, CommandScope, GlobalCommand, ParsedCommand, WindowAction};
pub use session::{is_ready, Session, TerminalDriver, WindowHandle};
pub use speech::{SilentSpeech, SpeechSink};
pub use summarizer::{Summarizer, Summary};
