use std::collections::VecDeque;

use time::{macros::format_description, OffsetDateTime};

use crate::types::{SecurityEvent, Severity};

/// One chart sample: a one-hot count per severity series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartPoint {
    pub label: String,
    pub high: u32,
    pub medium: u32,
    pub low: u32,
}

impl ChartPoint {
    /// Build the one-hot point for `severity`. Unknown severity yields an all-zero point.
    pub fn one_hot(label: impl Into<String>, severity: Option<Severity>) -> Self {
        let hit = |s: Severity| u32::from(severity == Some(s));
        Self {
            label: label.into(),
            high: hit(Severity::High),
            medium: hit(Severity::Medium),
            low: hit(Severity::Low),
        }
    }

    pub fn value(&self, severity: Severity) -> u32 {
        match severity {
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
        }
    }
}

/// Fixed-length FIFO of chart points. Length never exceeds `cap`.
#[derive(Debug, Clone)]
pub struct RollingChart {
    cap: usize,
    points: VecDeque<ChartPoint>,
    revision: u64,
}

impl RollingChart {
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            cap,
            points: VecDeque::with_capacity(cap),
            revision: 0,
        }
    }

    /// Append one point for `event` labelled `label`, evicting the oldest point
    /// when full. Returns `false` (and changes nothing) when `event` is `None`.
    pub fn append(&mut self, event: Option<&SecurityEvent>, label: impl Into<String>) -> bool {
        let Some(event) = event else {
            return false;
        };
        if self.points.len() == self.cap {
            self.points.pop_front();
        }
        self.points
            .push_back(ChartPoint::one_hot(label, event.severity()));
        self.revision += 1;
        true
    }

    pub fn points(&self) -> impl Iterator<Item = &ChartPoint> {
        self.points.iter()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.points.iter().map(|p| p.label.as_str()).collect()
    }

    /// Values of one severity series, oldest first.
    pub fn series(&self, severity: Severity) -> Vec<u32> {
        self.points.iter().map(|p| p.value(severity)).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Bumped on every append; a renderer redraws when this changes.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

/// Current wall-clock time as `HH:MM:SS` (UTC), used for chart labels.
pub fn clock_label() -> String {
    OffsetDateTime::now_utc()
        .format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_else(|_| String::from("00:00:00"))
}
