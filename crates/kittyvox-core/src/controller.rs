//! Controller lifecycle: launch sessions, start the monitor and the voice path, shut down.

use crate::config::ControllerConfig;
use crate::context::ControllerContext;
use crate::dispatch::{CommandDispatcher, TranscriptHandler, TranscriptSource};
use crate::error::{CoreError, CoreResult};
use crate::monitor::OutputMonitor;
use crate::session::TerminalDriver;
use crate::speech::SpeechSink;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// How often `run` checks whether a voice `shutdown` cleared the running flag.
const RUN_CHECK_INTERVAL: Duration = Duration::from_millis(100);

pub struct VoiceController {
    ctx: Arc<ControllerContext>,
    dispatcher: Arc<CommandDispatcher>,
    source: Mutex<Option<Box<dyn TranscriptSource>>>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl VoiceController {
    pub fn new(
        config: ControllerConfig,
        driver: Arc<dyn TerminalDriver>,
        speech: Arc<dyn SpeechSink>,
        source: Box<dyn TranscriptSource>,
    ) -> Self {
        let ctx = Arc::new(ControllerContext::new(config, driver, speech));
        let dispatcher = Arc::new(CommandDispatcher::new(Arc::clone(&ctx)));
        Self {
            ctx,
            dispatcher,
            source: Mutex::new(Some(source)),
            monitor: Mutex::new(None),
        }
    }

    pub fn context(&self) -> &Arc<ControllerContext> {
        &self.ctx
    }

    pub fn is_running(&self) -> bool {
        self.ctx.is_running()
    }

    /// Entry point for transcriptions that do not come from the configured source.
    pub fn handle_transcription(&self, text: &str) {
        self.dispatcher.handle_transcription(text);
    }

    /// Launch sessions and start listening. Returns false if the terminal is not
    /// usable or no session could be launched.
    pub async fn start(&self, names: Option<Vec<String>>) -> bool {
        if let Err(message) = self.ctx.driver.check_setup() {
            error!("terminal setup: {}", message);
            return false;
        }

        for warning in self.ctx.config.validate() {
            warn!("config: {}", warning);
        }

        let ctx = Arc::clone(&self.ctx);
        let launched = tokio::task::spawn_blocking(move || {
            ctx.registry.launch(&ctx.config, Arc::clone(&ctx.driver), names.as_deref())
        })
        .await
        .unwrap_or_else(|e| {
            error!(error = %e, "launch task failed");
            0
        });
        if launched == 0 {
            error!("no sessions launched; check the project configuration");
            return false;
        }

        self.ctx.set_running(true);

        let handle = tokio::spawn(OutputMonitor::new(Arc::clone(&self.ctx)).run());
        *self.monitor.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);

        if let Err(e) = self.spawn_source() {
            error!(error = %e, "voice input unavailable");
        }

        let projects = self.ctx.registry.ids().join(", ");
        info!(%projects, hotkey = %self.ctx.config.voice.hotkey, "voice control active");
        self.ctx.say(&format!("Voice control ready. Projects: {}", projects));
        true
    }

    fn spawn_source(&self) -> CoreResult<()> {
        let source = self
            .source
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| CoreError::Setup("transcript source already started".into()))?;
        let handler: Arc<dyn TranscriptHandler> = Arc::clone(&self.dispatcher) as Arc<dyn TranscriptHandler>;
        std::thread::Builder::new()
            .name("kittyvox-voice".into())
            .spawn(move || {
                if let Err(e) = source.listen(handler) {
                    error!(error = %e, "voice input stopped");
                }
            })?;
        Ok(())
    }

    /// Start, then block until a voice `shutdown` or Ctrl-C, then stop.
    pub async fn run(&self, names: Option<Vec<String>>) -> CoreResult<()> {
        if !self.start(names).await {
            return Err(CoreError::Setup("voice control did not start".into()));
        }

        let mut check = tokio::time::interval(RUN_CHECK_INTERVAL);
        loop {
            tokio::select! {
                _ = check.tick() => {
                    if !self.ctx.is_running() {
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("CTRL-C received; shutting down");
                    break;
                }
            }
        }

        let ctx = Arc::clone(&self.ctx);
        if let Err(e) = tokio::task::spawn_blocking(move || shutdown(&ctx)).await {
            warn!(error = %e, "shutdown task failed");
        }
        let monitor = self.monitor.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = monitor {
            let _ = handle.await;
        }
        Ok(())
    }

    /// Clear the running flag, say goodbye and close every window.
    pub fn stop(&self) {
        shutdown(&self.ctx);
    }
}

fn shutdown(ctx: &ControllerContext) {
    ctx.set_running(false);
    ctx.announce("Shutting down voice control.", true);
    ctx.registry.close_all();
    info!("voice control stopped");
}
