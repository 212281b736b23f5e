//! Executes routed commands against the live sessions.

use crate::context::ControllerContext;
use crate::router::{CommandScope, GlobalCommand, ParsedCommand, WindowAction};
use crate::session::Session;
use std::sync::Arc;
use tracing::{info, warn};

const VOLUME_STEP: f32 = 0.1;

pub const UNROUTABLE_REPLY: &str = "I didn't understand which project you meant.";

pub const HELP_TEXT: &str = "Say a project name followed by your command. \
    For example: frontend, add a login button. \
    Say a project name and stop, read, or focus to control its window. \
    Say status to check all projects. \
    Say mute or unmute to toggle voice output, and louder or softer to change the volume. \
    Say stop all to interrupt every project, or shutdown to exit.";

/// Receives finished transcriptions from a [`TranscriptSource`].
pub trait TranscriptHandler: Send + Sync {
    fn handle_transcription(&self, text: &str);

    /// Sources stop delivering once this turns false.
    fn is_running(&self) -> bool;
}

/// Something that produces transcriptions, typically a push-to-talk recorder.
///
/// `listen` may block the calling thread for the lifetime of the controller and
/// must call the handler synchronously, one transcription at a time.
pub trait TranscriptSource: Send {
    fn listen(self: Box<Self>, handler: Arc<dyn TranscriptHandler>) -> crate::CoreResult<()>;
}

/// Routes each utterance and carries out the resulting global or window command.
pub struct CommandDispatcher {
    ctx: Arc<ControllerContext>,
}

impl CommandDispatcher {
    pub fn new(ctx: Arc<ControllerContext>) -> Self {
        Self { ctx }
    }

    pub fn dispatch(&self, parsed: &ParsedCommand) {
        match parsed.scope {
            CommandScope::Global => match parsed.global_command() {
                Some(cmd) => self.run_global(cmd),
                None => warn!(phrase = %parsed.action_text, "global phrase without an operation"),
            },
            CommandScope::Window => match parsed.target.as_deref() {
                Some(target) => self.run_window(target, &parsed.action_text),
                None => self.ctx.say(UNROUTABLE_REPLY),
            },
            CommandScope::Unroutable => self.ctx.say(UNROUTABLE_REPLY),
        }
    }

    pub fn run_global(&self, cmd: GlobalCommand) {
        info!(command = cmd.phrase(), "global command");
        match cmd {
            GlobalCommand::Status => self.ctx.say(&self.status_report()),
            GlobalCommand::Mute => {
                self.ctx.set_muted(true);
                self.ctx.announce("Muted.", false);
            }
            GlobalCommand::Unmute => {
                self.ctx.set_muted(false);
                self.ctx.announce("Unmuted.", false);
            }
            GlobalCommand::Louder => {
                let volume = self.ctx.set_volume(self.ctx.volume() + VOLUME_STEP);
                info!(volume, "volume up");
                self.ctx.say("Volume increased.");
            }
            GlobalCommand::Softer => {
                let volume = self.ctx.set_volume(self.ctx.volume() - VOLUME_STEP);
                info!(volume, "volume down");
                self.ctx.say("Volume decreased.");
            }
            GlobalCommand::StopAll => self.ctx.say(&self.stop_all()),
            GlobalCommand::Shutdown => {
                self.ctx.set_running(false);
                info!("shutdown requested by voice");
            }
            GlobalCommand::Help => self.ctx.say(HELP_TEXT),
        }
    }

    /// "code is ready. web is busy" for every live session.
    pub fn status_report(&self) -> String {
        let sessions = self.ctx.registry.sessions();
        if sessions.is_empty() {
            return "No projects are running.".to_string();
        }
        sessions
            .iter()
            .map(|s| format!("{} is {}", s.label(), if s.is_busy() { "busy" } else { "ready" }))
            .collect::<Vec<_>>()
            .join(". ")
    }

    fn stop_all(&self) -> String {
        let failed: Vec<String> = self
            .ctx
            .registry
            .sessions()
            .iter()
            .filter(|s| !s.interrupt())
            .map(|s| s.label().to_string())
            .collect();
        if failed.is_empty() {
            "Stopped all sessions.".to_string()
        } else {
            warn!(?failed, "interrupt not delivered");
            format!("Stopped all sessions except {}.", failed.join(", "))
        }
    }

    pub fn run_window(&self, target: &str, action_text: &str) {
        let Some(session) = self.ctx.registry.by_id(target) else {
            self.ctx.say(&format!("Project {} is not running.", target));
            return;
        };

        let action = WindowAction::parse(action_text, &self.ctx.config.commands);
        info!(session = %session.id(), ?action, "window command");
        match action {
            WindowAction::Interrupt => {
                let ok = session.interrupt();
                self.confirm(&session, ok, format!("Sent stop signal to {}.", session.label()));
            }
            WindowAction::ReadBack => self.read_back(&session),
            WindowAction::Focus => {
                // Focus is its own feedback; only failure is spoken.
                if !session.focus() {
                    self.confirm(&session, false, String::new());
                }
            }
            WindowAction::Custom { name, send } => {
                let ok = session.send_line(&send);
                self.confirm(&session, ok, format!("Running {} in {}.", name, session.label()));
            }
            WindowAction::Send(text) => {
                let ok = session.send_line(&text);
                self.confirm(&session, ok, format!("Sent to {}.", session.label()));
            }
        }
    }

    fn confirm(&self, session: &Session, delivered: bool, message: String) {
        if delivered {
            self.ctx.say(&message);
        } else {
            warn!(session = %session.id(), "delivery failed");
            self.ctx.say(&format!("Could not reach {}.", session.label()));
        }
    }

    fn read_back(&self, session: &Session) {
        match session.read_current() {
            Ok(text) => {
                let summary = self.ctx.summarizer.summarize(&text);
                self.ctx.say(&format!("{}: {}", session.label(), summary.text));
            }
            Err(e) => {
                warn!(session = %session.id(), error = %e, "read back failed");
                self.ctx.say(&format!("Could not reach {}.", session.label()));
            }
        }
    }
}

impl TranscriptHandler for CommandDispatcher {
    fn handle_transcription(&self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        info!(%text, "heard");
        let parsed = self.ctx.router.route(text);
        self.dispatch(&parsed);
    }

    fn is_running(&self) -> bool {
        self.ctx.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ControllerConfig, CustomCommand, ProjectConfig};
    use crate::session::INTERRUPT_BYTE;
    use crate::test_support::{RecordingSpeech, ScriptedDriver};

    struct Fixture {
        driver: Arc<ScriptedDriver>,
        speech: Arc<RecordingSpeech>,
        ctx: Arc<ControllerContext>,
        dispatcher: CommandDispatcher,
    }

    fn fixture() -> Fixture {
        let mut config = ControllerConfig::default();
        config.projects.push(ProjectConfig::new("code", "/tmp").with_aliases(["scratch"]));
        config.projects.push(ProjectConfig::new("web", "/tmp"));
        config.projects.push(ProjectConfig::new("docs", "/tmp"));
        config
            .commands
            .insert("tests".into(), CustomCommand { send: "run the test suite".into() });

        let driver = Arc::new(ScriptedDriver::new());
        let speech = Arc::new(RecordingSpeech::new());
        let ctx = Arc::new(ControllerContext::new(config, driver.clone(), speech.clone()));
        let names = vec!["code".to_string(), "web".to_string()];
        ctx.registry.launch(&ctx.config, driver.clone(), Some(&names));
        ctx.set_running(true);
        let dispatcher = CommandDispatcher::new(Arc::clone(&ctx));
        Fixture { driver, speech, ctx, dispatcher }
    }

    #[test]
    fn colon_alias_sends_action_and_confirms() {
        let f = fixture();
        f.dispatcher.handle_transcription("scratch: add a test");
        assert_eq!(f.driver.sent("claude-code"), vec!["add a test\n"]);
        assert_eq!(f.speech.last().as_deref(), Some("Sent to code."));
    }

    #[test]
    fn failed_delivery_is_not_confirmed() {
        let f = fixture();
        f.driver.set_reachable("claude-web", false);
        f.dispatcher.handle_transcription("web run the build");
        assert_eq!(f.speech.last().as_deref(), Some("Could not reach web."));
    }

    #[test]
    fn status_lists_every_session() {
        let f = fixture();
        f.driver.set_screen("claude-code", "all done\n> ");
        f.driver.set_screen("claude-web", "Building...");
        f.dispatcher.handle_transcription("status");
        assert_eq!(f.speech.last().as_deref(), Some("code is ready. web is busy"));
    }

    #[test]
    fn unroutable_gets_one_clarification() {
        let f = fixture();
        f.dispatcher.handle_transcription("order a pizza");
        assert_eq!(f.speech.spoken(), vec![UNROUTABLE_REPLY]);
    }

    #[test]
    fn configured_but_not_launched_project_is_not_running() {
        let f = fixture();
        f.dispatcher.handle_transcription("docs: update the readme");
        assert_eq!(f.speech.last().as_deref(), Some("Project docs is not running."));
        assert!(f.driver.sent("claude-docs").is_empty());
    }

    #[test]
    fn empty_colon_action_sends_bare_newline() {
        // Answers "Press Enter to continue" style prompts.
        let f = fixture();
        f.dispatcher.handle_transcription("code:");
        assert_eq!(f.driver.sent("claude-code"), vec!["\n"]);
        assert_eq!(f.speech.last().as_deref(), Some("Sent to code."));
    }

    #[test]
    fn builtin_verbs_and_custom_commands() {
        let f = fixture();
        f.dispatcher.handle_transcription("code stop");
        assert_eq!(f.driver.sent("claude-code"), vec![INTERRUPT_BYTE]);
        assert_eq!(f.speech.last().as_deref(), Some("Sent stop signal to code."));

        f.dispatcher.handle_transcription("code, tests");
        assert_eq!(f.driver.sent("claude-code")[1], "run the test suite\n");
        assert_eq!(f.speech.last().as_deref(), Some("Running tests in code."));

        f.dispatcher.handle_transcription("web focus");
        assert_eq!(f.driver.focused(), vec!["claude-web"]);
    }

    #[test]
    fn read_speaks_summary_with_label() {
        let f = fixture();
        f.driver.set_screen("claude-web", "Error: missing semicolon\n> ");
        f.dispatcher.handle_transcription("web read");
        let last = f.speech.last().unwrap_or_default();
        assert!(last.starts_with("web: Error encountered."), "{last}");
    }

    #[test]
    fn mute_is_always_announced_and_silences_replies() {
        let f = fixture();
        f.dispatcher.handle_transcription("mute");
        assert!(f.ctx.is_muted());
        assert_eq!(f.speech.last().as_deref(), Some("Muted."));

        f.dispatcher.handle_transcription("status");
        assert_eq!(f.speech.spoken().len(), 1);

        f.dispatcher.handle_transcription("unmute");
        assert!(!f.ctx.is_muted());
        assert_eq!(f.speech.last().as_deref(), Some("Unmuted."));
    }

    #[test]
    fn volume_steps_are_clamped() {
        let f = fixture();
        f.ctx.set_volume(0.9);
        f.dispatcher.handle_transcription("louder");
        f.dispatcher.handle_transcription("louder");
        assert_eq!(f.ctx.volume(), 1.0);
        assert_eq!(f.speech.volume(), Some(1.0));

        f.ctx.set_volume(0.2);
        f.dispatcher.handle_transcription("quieter");
        f.dispatcher.handle_transcription("softer");
        assert_eq!(f.ctx.volume(), 0.1);
    }

    #[test]
    fn stop_all_reports_unreachable_sessions() {
        let f = fixture();
        f.driver.set_reachable("claude-web", false);
        f.dispatcher.handle_transcription("stop all");
        assert_eq!(f.driver.sent("claude-code"), vec![INTERRUPT_BYTE]);
        assert_eq!(f.speech.last().as_deref(), Some("Stopped all sessions except web."));
    }

    #[test]
    fn shutdown_clears_running() {
        let f = fixture();
        assert!(f.dispatcher.is_running());
        f.dispatcher.handle_transcription("Shut down.");
        assert!(!f.dispatcher.is_running());
    }
}
