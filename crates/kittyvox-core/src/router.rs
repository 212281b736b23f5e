//! Command routing: transcribed utterance -> global operation or window command.
//!
//! Matching is first-match-wins over four forms:
//!
//! 1. a global phrase (`status`, `mute`, ...) equal to or prefixing the utterance;
//! 2. `<name>: <action>`, the left side resolved through the alias table;
//! 3. `<name> <action>`, names tried in registration order;
//! 4. otherwise unroutable.
//!
//! Global phrases are checked first, so a project whose name begins with a global
//! phrase can only be reached through the colon form.

use crate::config::CustomCommand;
use crate::registry::AliasTable;
use std::collections::BTreeMap;

/// Controller-level operations that take no session target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlobalCommand {
    Status,
    Mute,
    Unmute,
    Louder,
    Softer,
    Shutdown,
    StopAll,
    Help,
}

/// Spoken phrase -> operation. Order matters: a longer phrase that shares a
/// prefix with a shorter one must come first.
const GLOBAL_PHRASES: &[(&str, GlobalCommand)] = &[
    ("status", GlobalCommand::Status),
    ("unmute", GlobalCommand::Unmute),
    ("mute", GlobalCommand::Mute),
    ("louder", GlobalCommand::Louder),
    ("softer", GlobalCommand::Softer),
    ("quieter", GlobalCommand::Softer),
    ("shut down", GlobalCommand::Shutdown),
    ("shutdown", GlobalCommand::Shutdown),
    ("stop all", GlobalCommand::StopAll),
    ("help", GlobalCommand::Help),
];

impl GlobalCommand {
    /// Canonical phrase for this operation.
    pub fn phrase(&self) -> &'static str {
        match self {
            GlobalCommand::Status => "status",
            GlobalCommand::Mute => "mute",
            GlobalCommand::Unmute => "unmute",
            GlobalCommand::Louder => "louder",
            GlobalCommand::Softer => "softer",
            GlobalCommand::Shutdown => "shutdown",
            GlobalCommand::StopAll => "stop all",
            GlobalCommand::Help => "help",
        }
    }

    /// Look up a phrase from the global table (exact, case-insensitive).
    pub fn from_phrase(phrase: &str) -> Option<Self> {
        let phrase = phrase.trim().to_lowercase();
        GLOBAL_PHRASES
            .iter()
            .find(|(p, _)| *p == phrase)
            .map(|(_, cmd)| *cmd)
    }

    /// Match an utterance that equals or starts with a global phrase.
    fn match_utterance(lowered: &str) -> Option<Self> {
        GLOBAL_PHRASES
            .iter()
            .find(|(p, _)| lowered.starts_with(p))
            .map(|(_, cmd)| *cmd)
    }

    /// The global phrase that would capture utterances beginning with `name`, if any.
    pub fn shadowing(name: &str) -> Option<Self> {
        Self::match_utterance(&name.trim().to_lowercase())
    }

    /// Every phrase the router recognises.
    pub fn phrases() -> impl Iterator<Item = &'static str> {
        GLOBAL_PHRASES.iter().map(|(p, _)| *p)
    }
}

/// Which dispatcher handles a parsed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandScope {
    Global,
    Window,
    Unroutable,
}

/// One routed utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    /// Project id for window commands.
    pub target: Option<String>,
    /// Canonical phrase (global), action text (window), or the utterance (unroutable).
    pub action_text: String,
    pub scope: CommandScope,
}

impl ParsedCommand {
    fn global(cmd: GlobalCommand) -> Self {
        Self {
            target: None,
            action_text: cmd.phrase().to_string(),
            scope: CommandScope::Global,
        }
    }

    fn window(target: &str, action: &str) -> Self {
        Self {
            target: Some(target.to_string()),
            action_text: action.trim().to_string(),
            scope: CommandScope::Window,
        }
    }

    fn unroutable(text: &str) -> Self {
        Self {
            target: None,
            action_text: text.to_string(),
            scope: CommandScope::Unroutable,
        }
    }

    /// The global operation, when `scope` is `Global`.
    pub fn global_command(&self) -> Option<GlobalCommand> {
        match self.scope {
            CommandScope::Global => GlobalCommand::from_phrase(&self.action_text),
            _ => None,
        }
    }
}

/// Routes utterances against a fixed alias table. Never fails.
#[derive(Debug, Clone)]
pub struct CommandRouter {
    aliases: AliasTable,
}

impl CommandRouter {
    pub fn new(aliases: AliasTable) -> Self {
        Self { aliases }
    }

    pub fn route(&self, utterance: &str) -> ParsedCommand {
        let text = utterance.trim();
        let lowered = text.to_lowercase();

        if let Some(cmd) = GlobalCommand::match_utterance(&lowered) {
            return ParsedCommand::global(cmd);
        }

        if let Some((left, right)) = text.split_once(':') {
            if let Some(id) = self.aliases.resolve(left) {
                return ParsedCommand::window(id, right);
            }
        }

        for entry in self.aliases.entries() {
            for name in &entry.names {
                if let Some(rest) = strip_name_prefix(text, name) {
                    return ParsedCommand::window(&entry.id, rest);
                }
            }
        }

        ParsedCommand::unroutable(utterance)
    }
}

/// If `text` begins with `name` (case-insensitive) followed by whitespace, return the
/// remainder with original casing. A single `,` or `.` straight after the name is
/// tolerated, since transcription engines often punctuate after a vocative.
fn strip_name_prefix<'a>(text: &'a str, name: &str) -> Option<&'a str> {
    let mut text_chars = text.char_indices();
    for expected in name.chars() {
        let (_, actual) = text_chars.next()?;
        if !actual.to_lowercase().eq(expected.to_lowercase()) {
            return None;
        }
    }

    let mut rest = text_chars.as_str();
    if let Some(stripped) = rest.strip_prefix([',', '.']) {
        rest = stripped;
    }
    if rest.starts_with(char::is_whitespace) {
        Some(rest.trim())
    } else {
        None
    }
}

/// What a window command asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowAction {
    /// `stop`: send the interrupt byte.
    Interrupt,
    /// `read`: summarize and speak the current text.
    ReadBack,
    /// `focus`: bring the window to front.
    Focus,
    /// A configured command: send its literal text.
    Custom { name: String, send: String },
    /// Anything else: send verbatim as a line.
    Send(String),
}

impl WindowAction {
    /// Built-in verbs first, then the user command table, then verbatim.
    pub fn parse(action_text: &str, commands: &BTreeMap<String, CustomCommand>) -> Self {
        let trimmed = action_text.trim();
        let lowered = trimmed.to_lowercase();
        match lowered.as_str() {
            "stop" => return WindowAction::Interrupt,
            "read" => return WindowAction::ReadBack,
            "focus" => return WindowAction::Focus,
            _ => {}
        }

        if let Some((name, cmd)) = commands
            .iter()
            .find(|(name, _)| name.trim().to_lowercase() == lowered)
        {
            return WindowAction::Custom {
                name: name.clone(),
                send: cmd.send.clone(),
            };
        }

        WindowAction::Send(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectConfig;

    fn router() -> CommandRouter {
        CommandRouter::new(AliasTable::from_projects(&[
            ProjectConfig::new("code", "/tmp").with_aliases(["scratch"]),
            ProjectConfig::new("web app", "/tmp").with_aliases(["frontend"]),
        ]))
    }

    #[test]
    fn every_global_phrase_routes_globally() {
        let r = router();
        for phrase in GlobalCommand::phrases() {
            let parsed = r.route(phrase);
            assert_eq!(parsed.scope, CommandScope::Global, "{phrase}");
            assert!(parsed.target.is_none());
            assert_eq!(GlobalCommand::from_phrase(&parsed.action_text), GlobalCommand::from_phrase(phrase));
        }
    }

    #[test]
    fn global_prefix_with_trailing_words() {
        let parsed = router().route("  Status please. ");
        assert_eq!(parsed.global_command(), Some(GlobalCommand::Status));
        assert_eq!(router().route("Quieter.").global_command(), Some(GlobalCommand::Softer));
        assert_eq!(router().route("shut down now").global_command(), Some(GlobalCommand::Shutdown));
    }

    #[test]
    fn unmute_is_not_mute() {
        assert_eq!(router().route("unmute").global_command(), Some(GlobalCommand::Unmute));
        assert_eq!(router().route("mute").global_command(), Some(GlobalCommand::Mute));
    }

    #[test]
    fn colon_form_resolves_alias() {
        let parsed = router().route("scratch: add a test");
        assert_eq!(parsed.scope, CommandScope::Window);
        assert_eq!(parsed.target.as_deref(), Some("code"));
        assert_eq!(parsed.action_text, "add a test");
    }

    #[test]
    fn colon_form_allows_empty_action() {
        let parsed = router().route("Frontend:");
        assert_eq!(parsed.target.as_deref(), Some("web app"));
        assert_eq!(parsed.action_text, "");
    }

    #[test]
    fn colon_with_unknown_left_side_falls_through_to_prefix() {
        let parsed = router().route("code fix this: the parser");
        assert_eq!(parsed.target.as_deref(), Some("code"));
        assert_eq!(parsed.action_text, "fix this: the parser");
    }

    #[test]
    fn prefix_form_keeps_original_casing() {
        let parsed = router().route("Code Rename Foo To Bar");
        assert_eq!(parsed.target.as_deref(), Some("code"));
        assert_eq!(parsed.action_text, "Rename Foo To Bar");
    }

    #[test]
    fn prefix_form_handles_multi_word_names_and_punctuation() {
        let parsed = router().route("Web app, run the build.");
        assert_eq!(parsed.target.as_deref(), Some("web app"));
        assert_eq!(parsed.action_text, "run the build.");
    }

    #[test]
    fn prefix_needs_whitespace_after_name() {
        assert_eq!(router().route("codebase cleanup").scope, CommandScope::Unroutable);
        assert_eq!(router().route("code").scope, CommandScope::Unroutable);
    }

    #[test]
    fn unknown_utterance_is_unroutable_verbatim() {
        let parsed = router().route("Make me a sandwich");
        assert_eq!(parsed.scope, CommandScope::Unroutable);
        assert!(parsed.target.is_none());
        assert_eq!(parsed.action_text, "Make me a sandwich");
    }

    #[test]
    fn global_phrase_shadows_project_prefix() {
        let r = CommandRouter::new(AliasTable::from_projects(&[ProjectConfig::new("help", "/tmp")]));
        assert_eq!(r.route("help desk update").scope, CommandScope::Global);
        let parsed = r.route("help: update");
        assert_eq!(parsed.scope, CommandScope::Global);
    }

    #[test]
    fn window_action_precedence() {
        let mut commands = BTreeMap::new();
        commands.insert("Tests".to_string(), CustomCommand { send: "run the tests".into() });
        commands.insert("stop".to_string(), CustomCommand { send: "never".into() });

        assert_eq!(WindowAction::parse(" STOP ", &commands), WindowAction::Interrupt);
        assert_eq!(WindowAction::parse("read", &commands), WindowAction::ReadBack);
        assert_eq!(WindowAction::parse("Focus", &commands), WindowAction::Focus);
        assert_eq!(
            WindowAction::parse("tests", &commands),
            WindowAction::Custom { name: "Tests".into(), send: "run the tests".into() }
        );
        assert_eq!(
            WindowAction::parse("Add a Login button", &commands),
            WindowAction::Send("Add a Login button".into())
        );
    }
}
