//! The live telemetry view: all UI state behind one context object.
//!
//! Handlers are plain methods that mutate the view and return the backend
//! [`Request`]s they need issued. The runtime owns the clock, the timers, the
//! push channel and the network; the view only sees their results.
use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::chart::{clock_label, RollingChart};
use crate::config::ViewConfig;
use crate::control::{ScanToggle, ShutdownControl, ShutdownState, ToggleState};
use crate::debounce::ChartDebouncer;
use crate::feed::FeedMessage;
use crate::poller::{FileKind, PollKind, StatsPanel};
use crate::table::EventLog;
use crate::types::{FileListing, ScanStatus, ShutdownAck, StatsSnapshot};

pub const SHUTDOWN_NOTICE: &str = "Application is shutting down. You can close this window.";

/// A backend call the runtime should issue on behalf of the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    FetchStats,
    FetchFiles,
    Toggle,
    Shutdown,
    Download(String),
}

/// Result of a finished backend call.
#[derive(Debug)]
pub enum Completion {
    Stats(Result<StatsSnapshot>),
    Files(Result<FileListing>),
    Toggled(Result<ScanStatus>),
    ShutdownDone(Result<ShutdownAck>),
    Downloaded {
        filename: String,
        result: Result<PathBuf>,
    },
}

/// A user interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Toggle,
    Shutdown,
    Select(FileKind, String),
    Download(FileKind),
    Quit,
}

impl Command {
    /// Parse one input line: `toggle`, `shutdown`, `select pcap <file>`,
    /// `download report`, `quit` (single-letter forms `t`, `s`, `q` too).
    pub fn parse(line: &str) -> Result<Command> {
        let mut parts = line.split_whitespace();
        let verb = parts.next().ok_or_else(|| anyhow!("empty command"))?;
        let cmd = match verb {
            "t" | "toggle" => Command::Toggle,
            "s" | "shutdown" => Command::Shutdown,
            "q" | "quit" => Command::Quit,
            "select" => {
                let kind = parse_kind(parts.next())?;
                let name = parts
                    .next()
                    .ok_or_else(|| anyhow!("usage: select <pcap|report> <file>"))?;
                Command::Select(kind, name.to_string())
            }
            "download" | "dl" => Command::Download(parse_kind(parts.next())?),
            other => bail!("unknown command: {other}"),
        };
        Ok(cmd)
    }
}

fn parse_kind(word: Option<&str>) -> Result<FileKind> {
    match word {
        Some("pcap") => Ok(FileKind::Pcap),
        Some("report") => Ok(FileKind::Report),
        Some(other) => bail!("unknown file kind: {other}"),
        None => bail!("missing file kind (pcap or report)"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Live,
    ShutDown,
}

#[derive(Debug)]
pub struct TelemetryView {
    config: ViewConfig,
    pub chart: RollingChart,
    debouncer: ChartDebouncer,
    pub table: EventLog,
    pub panel: StatsPanel,
    pub toggle: ScanToggle,
    pub shutdown: ShutdownControl,
    phase: Phase,
    notice: Option<String>,
    flash: Option<String>,
    revision: u64,
}

impl TelemetryView {
    pub fn init(config: ViewConfig) -> Self {
        Self {
            chart: RollingChart::new(config.chart_cap),
            debouncer: ChartDebouncer::new(config.debounce),
            table: EventLog::new(config.table_cap),
            panel: StatsPanel::new(),
            toggle: ScanToggle::new(config.toggle_cooldown),
            shutdown: ShutdownControl::new(),
            phase: Phase::Live,
            notice: None,
            flash: None,
            revision: 0,
            config,
        }
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_live(&self) -> bool {
        self.phase == Phase::Live
    }

    /// Persistent notice shown after shutdown.
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    /// Last transient message for the user.
    pub fn flash(&self) -> Option<&str> {
        self.flash.as_deref()
    }

    /// Bumped on every visible change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn debouncer(&self) -> &ChartDebouncer {
        &self.debouncer
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    fn set_flash(&mut self, msg: impl Into<String>) {
        self.flash = Some(msg.into());
        self.touch();
    }

    fn stats_request(&mut self) -> Option<Request> {
        self.panel.request_stats().then_some(Request::FetchStats)
    }

    fn files_request(&mut self) -> Option<Request> {
        self.panel.request_files().then_some(Request::FetchFiles)
    }

    /// Push channel message, in arrival order.
    pub fn on_feed(&mut self, msg: FeedMessage, now: Instant) -> Vec<Request> {
        if !self.is_live() {
            return Vec::new();
        }
        match msg {
            FeedMessage::NewEvent(event) => {
                debug!(source = %event.source_ip, severity = %event.severity, "event received");
                self.table.insert(&event);
                self.debouncer.offer(event, now);
                self.touch();
                self.stats_request().into_iter().collect()
            }
            FeedMessage::ScanningStatus(status) => {
                self.toggle.apply_push(&status);
                self.touch();
                Vec::new()
            }
        }
    }

    pub fn debounce_deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    /// Flush the debounced chart point if its window has closed.
    pub fn on_debounce_due(&mut self, now: Instant) {
        if let Some(event) = self.debouncer.flush(now) {
            self.chart.append(Some(&event), clock_label());
            self.touch();
        }
    }

    pub fn cooldown_deadline(&self) -> Option<Instant> {
        self.toggle.reenable_deadline()
    }

    pub fn on_cooldown_due(&mut self, now: Instant) {
        if self.toggle.tick(now) {
            self.touch();
        }
    }

    pub fn on_poll(&mut self, kind: PollKind) -> Option<Request> {
        if !self.is_live() {
            return None;
        }
        match kind {
            PollKind::Stats => self.stats_request(),
            PollKind::Files => self.files_request(),
        }
    }

    pub fn on_command(&mut self, cmd: Command) -> Vec<Request> {
        if !self.is_live() {
            warn!(?cmd, "interface is disabled after shutdown");
            return Vec::new();
        }
        match cmd {
            Command::Toggle if self.shutdown.state() == ShutdownState::Pending => {
                warn!("toggle ignored: shutdown request in flight");
                Vec::new()
            }
            Command::Toggle => match self.toggle.begin() {
                Ok(()) => {
                    self.touch();
                    vec![Request::Toggle]
                }
                Err(e) => {
                    warn!("toggle ignored: {e}");
                    Vec::new()
                }
            },
            Command::Shutdown if self.toggle.state() == ToggleState::Pending => {
                warn!("shutdown ignored: toggle request in flight");
                Vec::new()
            }
            Command::Shutdown => match self.shutdown.begin() {
                Ok(()) => {
                    self.touch();
                    vec![Request::Shutdown]
                }
                Err(e) => {
                    warn!("shutdown ignored: {e}");
                    Vec::new()
                }
            },
            Command::Select(kind, name) => {
                match self.panel.select_mut(kind).select(&name) {
                    Ok(()) => self.set_flash(format!("Selected {name}")),
                    Err(e) => self.set_flash(e.to_string()),
                }
                Vec::new()
            }
            Command::Download(kind) => match self.panel.download_target(kind) {
                Ok(name) => vec![Request::Download(name)],
                Err(e) => {
                    self.set_flash(e.to_string());
                    Vec::new()
                }
            },
            Command::Quit => Vec::new(),
        }
    }

    /// Apply a finished backend call. After shutdown every completion is discarded.
    pub fn on_completion(&mut self, done: Completion, now: Instant) -> Vec<Request> {
        if !self.is_live() {
            debug!(?done, "discarding completion after shutdown");
            return Vec::new();
        }
        match done {
            Completion::Stats(res) => {
                let followup = self.panel.apply_stats(res);
                self.touch();
                followup.then_some(Request::FetchStats).into_iter().collect()
            }
            Completion::Files(res) => {
                let followup = self.panel.apply_files(res);
                self.touch();
                followup.then_some(Request::FetchFiles).into_iter().collect()
            }
            Completion::Toggled(res) => {
                match &res {
                    Ok(status) => info!(scanning = status.scanning, "scan toggled"),
                    Err(e) => warn!("toggle failed: {e:#}"),
                }
                self.toggle.complete(res.as_ref().ok(), now);
                self.touch();
                self.stats_request()
                    .into_iter()
                    .chain(self.files_request())
                    .collect()
            }
            Completion::ShutdownDone(res) => {
                match res {
                    Ok(ack) => {
                        info!(status = %ack.status, "backend shutting down");
                        if self.shutdown.complete(true) {
                            self.teardown();
                        }
                    }
                    Err(e) => {
                        warn!("shutdown failed: {e:#}");
                        self.shutdown.complete(false);
                        self.touch();
                    }
                }
                Vec::new()
            }
            Completion::Downloaded { filename, result } => {
                match result {
                    Ok(path) => self.set_flash(format!("Saved {filename} to {}", path.display())),
                    Err(e) => {
                        warn!("download of {filename} failed: {e:#}");
                        self.set_flash(format!("Download of {filename} failed"));
                    }
                }
                Vec::new()
            }
        }
    }

    /// Enter the terminal state: every control disabled, pending chart data dropped.
    /// Irreversible.
    pub fn teardown(&mut self) {
        self.phase = Phase::ShutDown;
        self.toggle.disable();
        self.panel.disable();
        self.debouncer.cancel();
        self.notice = Some(SHUTDOWN_NOTICE.to_string());
        self.touch();
    }

    /// The scan toggle is also held while a shutdown request is in flight.
    pub fn toggle_accepts_input(&self) -> bool {
        self.toggle.is_enabled() && self.shutdown.state() != ShutdownState::Pending
    }

    /// True when no control accepts input.
    pub fn all_controls_disabled(&self) -> bool {
        !self.toggle.is_enabled()
            && !self.shutdown.is_enabled()
            && !self.panel.pcap.is_enabled()
            && !self.panel.reports.is_enabled()
    }
}
