use std::time::Duration;

use anyhow::{bail, Result};
use tokio::time::{self, Interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::types::{FileListing, StatsSnapshot};

/// Which file list a selection control shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pcap,
    Report,
}

impl FileKind {
    pub fn label(self) -> &'static str {
        match self {
            FileKind::Pcap => "PCAP",
            FileKind::Report => "Report",
        }
    }

    pub fn placeholder(self) -> &'static str {
        match self {
            FileKind::Pcap => "Select PCAP file...",
            FileKind::Report => "Select Report file...",
        }
    }
}

/// A selection list whose options are replaced wholesale on each refresh.
#[derive(Debug, Clone)]
pub struct FileSelect {
    kind: FileKind,
    options: Vec<String>,
    selected: Option<String>,
    enabled: bool,
}

impl FileSelect {
    pub fn new(kind: FileKind) -> Self {
        Self {
            kind,
            options: Vec::new(),
            selected: None,
            enabled: true,
        }
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Replace the options; the selection survives only if still listed.
    pub fn replace(&mut self, files: Vec<String>) {
        if let Some(sel) = &self.selected {
            if !files.contains(sel) {
                self.selected = None;
            }
        }
        self.options = files;
    }

    pub fn select(&mut self, name: &str) -> Result<()> {
        if !self.enabled {
            bail!("{} selection is disabled", self.kind.label());
        }
        if !self.options.iter().any(|o| o == name) {
            bail!("{name} is not in the {} file list", self.kind.label());
        }
        self.selected = Some(name.to_string());
        Ok(())
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }
}

/// Fields bound to the stats and file-list endpoints.
#[derive(Debug, Clone)]
pub struct StatsPanel {
    snapshot: Option<StatsSnapshot>,
    pub pcap: FileSelect,
    pub reports: FileSelect,
    stats: RefreshSlot,
    files: RefreshSlot,
}

/// Coalesces refresh triggers: at most one request in flight, and a trigger
/// that arrives meanwhile is deferred until that request settles.
#[derive(Debug, Clone, Copy, Default)]
struct RefreshSlot {
    in_flight: bool,
    dirty: bool,
}

impl RefreshSlot {
    fn claim(&mut self) -> bool {
        if self.in_flight {
            self.dirty = true;
            return false;
        }
        self.in_flight = true;
        true
    }

    /// Release the slot; reclaims it at once when a trigger was deferred.
    fn settle(&mut self) -> bool {
        self.in_flight = std::mem::take(&mut self.dirty);
        self.in_flight
    }
}

impl Default for StatsPanel {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsPanel {
    pub fn new() -> Self {
        Self {
            snapshot: None,
            pcap: FileSelect::new(FileKind::Pcap),
            reports: FileSelect::new(FileKind::Report),
            stats: RefreshSlot::default(),
            files: RefreshSlot::default(),
        }
    }

    /// Last applied snapshot, `None` until the first successful poll.
    pub fn stats(&self) -> Option<&StatsSnapshot> {
        self.snapshot.as_ref()
    }

    /// Claim the stats request slot. `false` when one is already in flight;
    /// the trigger is then remembered and honored by [`apply_stats`](Self::apply_stats).
    pub fn request_stats(&mut self) -> bool {
        self.stats.claim()
    }

    pub fn request_files(&mut self) -> bool {
        self.files.claim()
    }

    /// Apply a stats response. Returns `true` when a trigger arrived while it
    /// was in flight, in which case the slot is already claimed for the
    /// follow-up request.
    pub fn apply_stats(&mut self, result: Result<StatsSnapshot>) -> bool {
        match result {
            Ok(snapshot) => {
                debug!(?snapshot, "stats refreshed");
                self.snapshot = Some(snapshot);
            }
            Err(e) => warn!("stats refresh failed: {e:#}"),
        }
        self.stats.settle()
    }

    /// Same contract as [`apply_stats`](Self::apply_stats) for the file lists.
    pub fn apply_files(&mut self, result: Result<FileListing>) -> bool {
        let followup = self.files.settle();
        match result {
            Ok(listing) => {
                debug!(
                    pcaps = listing.pcap_files.len(),
                    reports = listing.report_files.len(),
                    "file lists refreshed"
                );
                self.pcap.replace(listing.pcap_files);
                self.reports.replace(listing.report_files);
            }
            Err(e) => warn!("file list refresh failed: {e:#}"),
        }
        followup
    }

    pub fn select_mut(&mut self, kind: FileKind) -> &mut FileSelect {
        match kind {
            FileKind::Pcap => &mut self.pcap,
            FileKind::Report => &mut self.reports,
        }
    }

    /// File name to download for `kind`; errors when nothing is selected.
    pub fn download_target(&self, kind: FileKind) -> Result<String> {
        let select = match kind {
            FileKind::Pcap => &self.pcap,
            FileKind::Report => &self.reports,
        };
        match select.selected() {
            Some(name) => Ok(name.to_string()),
            None => bail!("Please select a {} file", kind.label().to_uppercase()),
        }
    }

    pub fn disable(&mut self) {
        self.pcap.disable();
        self.reports.disable();
    }
}

/// Which periodic poll fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollKind {
    Stats,
    Files,
}

/// The two cancelable poll timers. Both fire immediately on creation.
#[derive(Debug)]
pub struct PollTimers {
    stats: Option<Interval>,
    files: Option<Interval>,
}

impl PollTimers {
    pub fn new(stats_period: Duration, files_period: Duration) -> Self {
        Self {
            stats: Some(make_interval(stats_period)),
            files: Some(make_interval(files_period)),
        }
    }

    /// Wait for the next tick of either timer. Never resolves once cancelled.
    pub async fn tick(&mut self) -> PollKind {
        match (self.stats.as_mut(), self.files.as_mut()) {
            (Some(s), Some(f)) => tokio::select! {
                _ = s.tick() => PollKind::Stats,
                _ = f.tick() => PollKind::Files,
            },
            (Some(s), None) => {
                s.tick().await;
                PollKind::Stats
            }
            (None, Some(f)) => {
                f.tick().await;
                PollKind::Files
            }
            (None, None) => std::future::pending().await,
        }
    }

    pub fn cancel(&mut self) {
        self.stats = None;
        self.files = None;
    }

    pub fn is_active(&self) -> bool {
        self.stats.is_some() || self.files.is_some()
    }
}

fn make_interval(period: Duration) -> Interval {
    let mut iv = time::interval(period.max(Duration::from_millis(1)));
    iv.set_missed_tick_behavior(MissedTickBehavior::Delay);
    iv
}
