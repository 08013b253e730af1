use std::time::Duration;

use tokio::time::Instant;

use crate::types::SecurityEvent;

/// Debounce state for the chart sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    PendingFlush {
        latest: SecurityEvent,
        flush_at: Instant,
    },
}

/// Collapses bursts of events into at most one chart append per window.
///
/// The first event of a burst opens a window of length `window`; events that
/// arrive while the window is open replace the held event. When the window
/// closes the last held event is flushed to the chart.
#[derive(Debug, Clone)]
pub struct ChartDebouncer {
    window: Duration,
    state: DebounceState,
}

impl ChartDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: DebounceState::Idle,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn state(&self) -> &DebounceState {
        &self.state
    }

    /// Hold `event` for the chart. Returns `true` when this opened a new window.
    pub fn offer(&mut self, event: SecurityEvent, now: Instant) -> bool {
        match &mut self.state {
            DebounceState::PendingFlush { latest, .. } => {
                *latest = event;
                false
            }
            DebounceState::Idle => {
                self.state = DebounceState::PendingFlush {
                    latest: event,
                    flush_at: now + self.window,
                };
                true
            }
        }
    }

    /// When the pending window is due at `now`, return its event and go idle.
    pub fn flush(&mut self, now: Instant) -> Option<SecurityEvent> {
        let due = matches!(
            &self.state,
            DebounceState::PendingFlush { flush_at, .. } if *flush_at <= now
        );
        if !due {
            return None;
        }
        match std::mem::replace(&mut self.state, DebounceState::Idle) {
            DebounceState::PendingFlush { latest, .. } => Some(latest),
            DebounceState::Idle => None,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        match &self.state {
            DebounceState::PendingFlush { flush_at, .. } => Some(*flush_at),
            DebounceState::Idle => None,
        }
    }

    /// Drop any held event.
    pub fn cancel(&mut self) {
        self.state = DebounceState::Idle;
    }
}
