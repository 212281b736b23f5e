//! Output monitor: polls every live session and announces completions.
//!
//! A completion is a busy -> ready transition between two consecutive reads that
//! differ. Only the text added since the previous read is summarized.

use crate::config::SummarySettings;
use crate::context::ControllerContext;
use crate::session::{self, Session};
use crate::summarizer::Summary;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Text that appeared after `old`. When `old` is no longer present (cleared or
/// scrolled buffer), the whole of `new`.
pub fn compute_delta<'a>(old: &str, new: &'a str) -> &'a str {
    match new.find(old) {
        Some(at) => &new[at + old.len()..],
        None => new,
    }
}

/// Whether a completion summary is worth speaking.
pub fn should_announce(summary: &Summary, settings: &SummarySettings) -> bool {
    summary.raw_length > settings.min_announce_chars
        || (summary.has_error && settings.announce_errors)
        || (summary.has_question && settings.announce_questions)
}

#[derive(Clone)]
pub struct OutputMonitor {
    ctx: Arc<ControllerContext>,
}

impl OutputMonitor {
    pub fn new(ctx: Arc<ControllerContext>) -> Self {
        Self { ctx }
    }

    /// Poll until the running flag clears. The flag is checked once per tick.
    pub async fn run(self) {
        let period = self.ctx.config.monitor.poll_interval();
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = period.as_millis() as u64, "output monitor started");

        loop {
            ticker.tick().await;
            if !self.ctx.is_running() {
                break;
            }
            let monitor = self.clone();
            if let Err(e) = tokio::task::spawn_blocking(move || monitor.poll_once()).await {
                warn!(error = %e, "monitor pass panicked");
            }
        }

        info!("output monitor stopped");
    }

    /// One pass over all sessions, in registration order. Returns what was spoken.
    pub fn poll_once(&self) -> Vec<String> {
        let mut spoken = Vec::new();
        for session in self.ctx.registry.sessions() {
            match session.read_current() {
                Ok(text) => {
                    if let Some(message) = self.observe(&session, text) {
                        self.ctx.say(&message);
                        spoken.push(message);
                    }
                }
                Err(e) => debug!(session = %session.id(), error = %e, "read failed, skipping"),
            }
        }
        spoken
    }

    /// Record the new text and return the announcement for a completion, if any.
    fn observe(&self, session: &Session, text: String) -> Option<String> {
        let previous = {
            let mut state = self.ctx.state();
            match state.snapshots.get(session.id()) {
                Some(prev) if *prev == text => return None,
                _ => {}
            }
            state.snapshots.insert(session.id().to_string(), text.clone())
        };
        // First read only primes the snapshot.
        let previous = previous?;

        if session::is_ready(&previous) || !session::is_ready(&text) {
            return None;
        }

        let settings = self.ctx.summarizer.settings();
        if !settings.announce_completion {
            return None;
        }

        let delta = compute_delta(&previous, &text);
        let summary = self.ctx.summarizer.summarize(delta);
        if !should_announce(&summary, settings) {
            debug!(session = %session.id(), chars = summary.raw_length, "completion too small to announce");
            return None;
        }

        info!(session = %session.id(), error = summary.has_error, question = summary.has_question, "completion");
        Some(format!("{}: {}", session.label(), summary.text))
    }
}
