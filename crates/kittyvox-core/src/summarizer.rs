//! Compresses terminal output into something worth hearing.
//!
//! `summarize` is pure: it classifies the text (error, question, completion) and
//! then compresses it with the configured [`SummaryStrategy`]. The result is
//! always capped at `max_spoken_words` words, except for the short verbatim
//! cases described on each strategy.

use crate::config::{SummarySettings, SummaryStrategy};
use crate::session;
use once_cell::sync::Lazy;
use regex::Regex;

const NO_OUTPUT: &str = "No output";
const ELLIPSIS: &str = "...";
const ERROR_LINE_CAP: usize = 100;
const QUESTION_LINE_CAP: usize = 150;
const QUESTION_SCAN_LINES: usize = 10;
const COMPLETION_SCAN_LINES: usize = 3;
const MAX_ACTIONS: usize = 3;
const MAX_LISTED_FILES: usize = 3;
const MAX_COUNTS: usize = 2;

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::error!(pattern = %p, error = %e, "invalid summarizer pattern");
                None
            }
        })
        .collect()
}

// Marker order matters for error-line extraction: the first marker found wins.
static ERROR_MARKERS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?i)error:",
        r"(?i)failed",
        r"(?i)exception",
        r"(?i)traceback",
        r"(?i)panic:",
        r"(?i)fatal:",
    ])
});

static ERROR_LINES: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?i)error:.*",
        r"(?i)failed.*",
        r"(?i)exception.*",
        r"(?i)traceback.*",
        r"(?i)panic:.*",
        r"(?i)fatal:.*",
    ])
});

static QUESTION_MARKERS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?m)\?\s*$",
        r"(?i)do you want",
        r"(?i)would you like",
        r"(?i)should i\b",
        r"(?i)shall i\b",
        r"(?i)please confirm",
        r"(?i)enter .* to continue",
        r"(?i)\[y/n\]",
        r"(?i)\[yes/no\]",
    ])
});

static COMPLETION_MARKERS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?im)\bdone\.?$",
        r"(?im)\bcomplete\.?$",
        r"(?im)\bfinished\.?$",
        r"(?i)successfully",
        r"(?i)\bcreated .+\.",
        r"(?i)\bupdated .+\.",
        r"(?i)\bfixed .+\.",
    ])
});

// One pattern per verb, scanned in this order. The sentence must end with a
// period followed by whitespace or end of line, so `main.rs` does not end it.
static ACTIONS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?im)\b(created\s.+?\.)(?:\s|$)",
        r"(?im)\b(updated\s.+?\.)(?:\s|$)",
        r"(?im)\b(added\s.+?\.)(?:\s|$)",
        r"(?im)\b(removed\s.+?\.)(?:\s|$)",
        r"(?im)\b(fixed\s.+?\.)(?:\s|$)",
        r"(?im)\b(installed\s.+?\.)(?:\s|$)",
        r"(?im)\b(running\s.+?\.)(?:\s|$)",
        r"(?im)\b(building\s.+?\.)(?:\s|$)",
    ])
});

static FILE_NAME: Lazy<Vec<Regex>> = Lazy::new(|| compile(&[r"[A-Za-z0-9_\-./]+\.[A-Za-z0-9]+"]));

static COUNT: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[r"(?i)\b(\d+)\s+(files?|changes?|errors?|warnings?|tests?|passed|failed)\b"])
});

/// Result of summarizing one block of output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub text: String,
    pub has_error: bool,
    pub has_question: bool,
    pub is_complete: bool,
    /// Length of the input in characters.
    pub raw_length: usize,
}

impl Summary {
    fn no_output(raw_length: usize) -> Self {
        Self {
            text: NO_OUTPUT.to_string(),
            has_error: false,
            has_question: false,
            is_complete: false,
            raw_length,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Summarizer {
    settings: SummarySettings,
}

impl Summarizer {
    pub fn new(settings: SummarySettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SummarySettings {
        &self.settings
    }

    pub fn summarize(&self, text: &str) -> Summary {
        if text.trim().is_empty() {
            return Summary::no_output(text.chars().count());
        }

        let has_error = has_error(text);
        let has_question = has_question(text);
        let is_complete = is_complete(text);

        let summary_text = match self.settings.strategy {
            SummaryStrategy::Full => self.full(text),
            SummaryStrategy::FirstLast => self.first_last(text),
            SummaryStrategy::Smart => self.smart(text, has_error, has_question, is_complete),
        };

        Summary {
            text: summary_text,
            has_error,
            has_question,
            is_complete,
            raw_length: text.chars().count(),
        }
    }

    /// The text itself when within the word cap, otherwise its first words.
    fn full(&self, text: &str) -> String {
        truncate_words(text, self.settings.max_spoken_words)
    }

    /// First two and last two non-blank lines around a count of what was skipped.
    fn first_last(&self, text: &str) -> String {
        let lines: Vec<&str> = non_blank_lines(text).collect();
        if lines.len() <= 4 {
            return lines.join(" ");
        }

        let skipped = lines.len() - 4;
        let joined = format!(
            "{} ... {} more lines ... {}",
            lines[..2].join(" "),
            skipped,
            lines[lines.len() - 2..].join(" ")
        );
        truncate_words(&joined, self.settings.max_spoken_words)
    }

    fn smart(&self, text: &str, has_error: bool, has_question: bool, is_complete: bool) -> String {
        let mut fragments: Vec<String> = Vec::new();

        if has_error {
            fragments.push("Error encountered.".to_string());
            fragments.extend(extract_error_line(text));
        } else if has_question {
            fragments.push("Question:".to_string());
            fragments.extend(extract_question(text));
        } else if is_complete {
            fragments.push("Complete.".to_string());
        }

        fragments.extend(extract_actions(text));
        fragments.extend(files_fragment(&extract_files(text)));
        fragments.extend(extract_counts(text));

        if fragments.len() < 2 {
            return self.first_last(text);
        }
        truncate_words(&fragments.join(" "), self.settings.max_spoken_words)
    }
}

fn non_blank_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim).filter(|l| !l.is_empty())
}

fn any_match(patterns: &[Regex], text: &str) -> bool {
    patterns.iter().any(|re| re.is_match(text))
}

pub fn has_error(text: &str) -> bool {
    any_match(&ERROR_MARKERS, text)
}

pub fn has_question(text: &str) -> bool {
    any_match(&QUESTION_MARKERS, text)
}

/// Completion markers only count in the last three lines, where a trailing
/// prompt line also counts as completion.
pub fn is_complete(text: &str) -> bool {
    let lines: Vec<&str> = text.trim().lines().collect();
    let tail = lines[lines.len().saturating_sub(COMPLETION_SCAN_LINES)..].join("\n");
    any_match(&COMPLETION_MARKERS, &tail) || session::is_ready(&tail)
}

/// Keep the first `max_words` words, with an ellipsis when anything was dropped.
pub fn truncate_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        return text.to_string();
    }
    format!("{}{}", words[..max_words].join(" "), ELLIPSIS)
}

fn cap_chars(line: &str, cap: usize, suffix: &str) -> String {
    if line.chars().count() <= cap {
        return line.to_string();
    }
    let cut: String = line.chars().take(cap).collect();
    format!("{}{}", cut, suffix)
}

fn extract_error_line(text: &str) -> Option<String> {
    let found = ERROR_LINES.iter().find_map(|re| re.find(text))?;
    let collapsed = found.as_str().split_whitespace().collect::<Vec<_>>().join(" ");
    Some(cap_chars(&collapsed, ERROR_LINE_CAP, ELLIPSIS))
}

fn extract_question(text: &str) -> Option<String> {
    let lines: Vec<&str> = non_blank_lines(text).collect();
    let start = lines.len().saturating_sub(QUESTION_SCAN_LINES);
    lines[start..]
        .iter()
        .rev()
        .find(|line| line.ends_with('?') || any_match(&QUESTION_MARKERS, line))
        .map(|line| cap_chars(line, QUESTION_LINE_CAP, ""))
}

fn extract_actions(text: &str) -> Vec<String> {
    ACTIONS
        .iter()
        .flat_map(|re| re.captures_iter(text).filter_map(|c| c.get(1)))
        .map(|m| m.as_str().trim().to_string())
        .take(MAX_ACTIONS)
        .collect()
}

/// Filename-like tokens in first-seen order, without duplicates or dotfiles.
fn extract_files(text: &str) -> Vec<String> {
    let mut files: Vec<String> = Vec::new();
    for re in FILE_NAME.iter() {
        for m in re.find_iter(text) {
            let name = m.as_str();
            if name.starts_with('.') || files.iter().any(|f| f == name) {
                continue;
            }
            files.push(name.to_string());
        }
    }
    files
}

fn files_fragment(files: &[String]) -> Option<String> {
    match files {
        [] => None,
        [one] => Some(format!("Mentioned {}.", one)),
        [init @ .., last] if files.len() <= MAX_LISTED_FILES => {
            Some(format!("Mentioned {} and {}.", init.join(", "), last))
        }
        _ => Some(format!("Mentioned {} files.", files.len())),
    }
}

fn extract_counts(text: &str) -> Vec<String> {
    COUNT
        .iter()
        .flat_map(|re| re.captures_iter(text))
        .filter_map(|c| Some(format!("{} {}", c.get(1)?.as_str(), c.get(2)?.as_str())))
        .take(MAX_COUNTS)
        .collect()
}
