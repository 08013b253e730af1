use std::time::Duration;

use anyhow::{bail, Result};
use tokio::time::Instant;

use crate::types::ScanStatus;

/// Last known backend scanning state, mirrored from responses and pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMirror {
    Unknown,
    Running,
    Stopped,
}

impl ScanMirror {
    pub fn from_status(status: &ScanStatus) -> Self {
        if status.scanning {
            ScanMirror::Running
        } else {
            ScanMirror::Stopped
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleState {
    Idle(ScanMirror),
    Pending,
    ErrorIdle,
    Disabled,
}

/// Visual style of a button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonStyle {
    Success,
    Danger,
    Warning,
    Secondary,
}

impl ButtonStyle {
    pub fn css_class(self) -> &'static str {
        match self {
            ButtonStyle::Success => "btn btn-success",
            ButtonStyle::Danger => "btn btn-danger",
            ButtonStyle::Warning => "btn btn-warning",
            ButtonStyle::Secondary => "btn btn-secondary",
        }
    }
}

/// Start/stop scanning button.
///
/// `Idle(stopped) -> Pending -> Idle(running)` and back, `Pending -> ErrorIdle`
/// on request failure, and terminal `Disabled` after shutdown. The control is
/// disabled while pending and re-enabled `cooldown` after completion, on both
/// the success and the failure path.
#[derive(Debug, Clone)]
pub struct ScanToggle {
    state: ToggleState,
    enabled: bool,
    cooldown: Duration,
    reenable_at: Option<Instant>,
}

impl ScanToggle {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            state: ToggleState::Idle(ScanMirror::Unknown),
            enabled: true,
            cooldown,
            reenable_at: None,
        }
    }

    pub fn state(&self) -> ToggleState {
        self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// User click. Disables the control and enters `Pending`.
    pub fn begin(&mut self) -> Result<()> {
        if !self.enabled {
            bail!("scan toggle is disabled");
        }
        match self.state {
            ToggleState::Pending => bail!("toggle request already in flight"),
            ToggleState::Disabled => bail!("scan toggle is permanently disabled"),
            ToggleState::Idle(_) | ToggleState::ErrorIdle => {}
        }
        self.enabled = false;
        self.state = ToggleState::Pending;
        Ok(())
    }

    /// Apply the toggle response, `None` meaning the request failed. Ignored unless pending.
    pub fn complete(&mut self, response: Option<&ScanStatus>, now: Instant) {
        if self.state != ToggleState::Pending {
            return;
        }
        self.state = match response {
            Some(status) => ToggleState::Idle(ScanMirror::from_status(status)),
            None => ToggleState::ErrorIdle,
        };
        self.reenable_at = Some(now + self.cooldown);
    }

    /// Re-enable once the cooldown has elapsed. Returns `true` if it did.
    pub fn tick(&mut self, now: Instant) -> bool {
        match self.reenable_at {
            Some(at) if at <= now => {
                self.reenable_at = None;
                if self.state != ToggleState::Disabled {
                    self.enabled = true;
                }
                true
            }
            _ => false,
        }
    }

    pub fn reenable_deadline(&self) -> Option<Instant> {
        self.reenable_at
    }

    /// Out-of-band scanning status push.
    pub fn apply_push(&mut self, status: &ScanStatus) {
        if matches!(self.state, ToggleState::Idle(_) | ToggleState::ErrorIdle) {
            self.state = ToggleState::Idle(ScanMirror::from_status(status));
        }
    }

    /// Terminal state after a successful shutdown.
    pub fn disable(&mut self) {
        self.state = ToggleState::Disabled;
        self.enabled = false;
        self.reenable_at = None;
    }

    pub fn label(&self) -> &'static str {
        match self.state {
            ToggleState::Idle(ScanMirror::Running) => "Stop Scanning",
            ToggleState::Idle(_) => "Start Scanning",
            ToggleState::Pending => "Working...",
            ToggleState::ErrorIdle => "Error",
            ToggleState::Disabled => "Server Stopped",
        }
    }

    pub fn style(&self) -> ButtonStyle {
        match self.state {
            ToggleState::Idle(ScanMirror::Running) => ButtonStyle::Danger,
            ToggleState::Idle(_) | ToggleState::Pending => ButtonStyle::Success,
            ToggleState::ErrorIdle => ButtonStyle::Warning,
            ToggleState::Disabled => ButtonStyle::Secondary,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Ready,
    Pending,
    Disabled,
}

/// Shutdown button. Success is terminal; failure re-enables it.
#[derive(Debug, Clone)]
pub struct ShutdownControl {
    state: ShutdownState,
}

impl Default for ShutdownControl {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownControl {
    pub fn new() -> Self {
        Self {
            state: ShutdownState::Ready,
        }
    }

    pub fn state(&self) -> ShutdownState {
        self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.state == ShutdownState::Ready
    }

    pub fn begin(&mut self) -> Result<()> {
        match self.state {
            ShutdownState::Ready => {
                self.state = ShutdownState::Pending;
                Ok(())
            }
            ShutdownState::Pending => bail!("shutdown request already in flight"),
            ShutdownState::Disabled => bail!("backend already shut down"),
        }
    }

    /// Apply the shutdown response; returns `true` when the session is now terminal.
    pub fn complete(&mut self, ok: bool) -> bool {
        if self.state != ShutdownState::Pending {
            return false;
        }
        self.state = if ok {
            ShutdownState::Disabled
        } else {
            ShutdownState::Ready
        };
        ok
    }

    pub fn label(&self) -> &'static str {
        match self.state {
            ShutdownState::Ready => "Shutdown",
            ShutdownState::Pending => "Shutting down...",
            ShutdownState::Disabled => "Server Stopped",
        }
    }
}
