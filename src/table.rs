use std::collections::VecDeque;

use crate::types::{SecurityEvent, Severity};

/// Row style derived from the event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStyle {
    Danger,
    Warning,
    Success,
}

impl RowStyle {
    /// High→danger, Medium→warning, everything else→success.
    pub fn for_severity(severity: Option<Severity>) -> Self {
        match severity {
            Some(Severity::High) => RowStyle::Danger,
            Some(Severity::Medium) => RowStyle::Warning,
            _ => RowStyle::Success,
        }
    }

    pub fn css_class(self) -> &'static str {
        match self {
            RowStyle::Danger => "table-danger",
            RowStyle::Warning => "table-warning",
            RowStyle::Success => "table-success",
        }
    }
}

pub const COLUMNS: [&str; 5] = ["timestamp", "source_ip", "target_ip", "protocol", "severity"];

/// One rendered table row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRow {
    pub style: RowStyle,
    pub cells: [String; 5],
}

impl LogRow {
    pub fn from_event(event: &SecurityEvent) -> Self {
        Self {
            style: RowStyle::for_severity(event.severity()),
            cells: [
                event.timestamp.clone(),
                event.source_ip.clone(),
                event.target_ip.clone(),
                event.protocol.clone(),
                event.severity.clone(),
            ],
        }
    }
}

/// Newest-first event log with a fixed row capacity.
#[derive(Debug, Clone)]
pub struct EventLog {
    cap: usize,
    rows: VecDeque<LogRow>,
}

impl EventLog {
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            cap,
            rows: VecDeque::with_capacity(cap + 1),
        }
    }

    /// Prepend a row for `event`; the last row is dropped when over capacity.
    pub fn insert(&mut self, event: &SecurityEvent) {
        self.rows.push_front(LogRow::from_event(event));
        if self.rows.len() > self.cap {
            self.rows.pop_back();
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = &LogRow> {
        self.rows.iter()
    }

    pub fn row(&self, idx: usize) -> Option<&LogRow> {
        self.rows.get(idx)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }
}
