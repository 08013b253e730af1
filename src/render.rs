use std::fmt::Write;

use crate::chart::RollingChart;
use crate::poller::FileSelect;
use crate::table::{EventLog, RowStyle, COLUMNS};
use crate::types::Severity;
use crate::view::TelemetryView;

/// Rows of the event log shown per frame.
const MAX_FRAME_ROWS: usize = 15;
const MAX_CELL: usize = 24;

/// Render the whole view as a text frame.
pub fn render_frame(view: &TelemetryView) -> String {
    let mut out = String::new();
    if let Some(notice) = view.notice() {
        let _ = writeln!(out, "!! {notice}");
    }

    match view.panel.stats() {
        Some(s) => {
            let _ = writeln!(
                out,
                "Total events: {}   High severity: {}   Unique sources: {}",
                s.total_events, s.high_severity, s.unique_sources
            );
        }
        None => {
            let _ = writeln!(out, "Total events: -   High severity: -   Unique sources: -");
        }
    }

    let _ = writeln!(
        out,
        "[{}] ({}{})   [{}]{}",
        view.toggle.label(),
        view.toggle.style().css_class(),
        if view.toggle_accepts_input() { "" } else { ", disabled" },
        view.shutdown.label(),
        if view.shutdown.is_enabled() { "" } else { " (disabled)" },
    );
    render_select(&mut out, &view.panel.pcap);
    render_select(&mut out, &view.panel.reports);
    if let Some(flash) = view.flash() {
        let _ = writeln!(out, "> {flash}");
    }

    out.push('\n');
    out.push_str(&render_chart(&view.chart));
    out.push('\n');
    out.push_str(&render_table(&view.table, MAX_FRAME_ROWS));
    out
}

fn render_select(out: &mut String, select: &FileSelect) {
    let shown = select
        .selected()
        .unwrap_or_else(|| select.kind().placeholder());
    let _ = writeln!(
        out,
        "{:<7} {} ({} files){}",
        select.kind().label(),
        shown,
        select.options().len(),
        if select.is_enabled() { "" } else { " (disabled)" },
    );
}

/// One line per severity series, one column per point, oldest on the left.
pub fn render_chart(chart: &RollingChart) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Events per severity (last {} of {})", chart.len(), chart.cap());
    for sev in Severity::ALL {
        let marks: String = chart
            .series(sev)
            .into_iter()
            .map(|v| if v > 0 { '#' } else { '.' })
            .collect();
        let _ = writeln!(out, "{:<7}|{}", sev.as_str(), marks);
    }
    if let (Some(first), Some(last)) = (chart.points().next(), chart.points().last()) {
        let _ = writeln!(out, "{:<7} {} .. {}", "", first.label, last.label);
    }
    out
}

/// Event log as an aligned text table, newest first, at most `limit` rows.
pub fn render_table(log: &EventLog, limit: usize) -> String {
    let mut widths = COLUMNS.map(|c| c.chars().count());
    for row in log.rows().take(limit) {
        for (w, cell) in widths.iter_mut().zip(row.cells.iter()) {
            *w = (*w).max(cell.chars().count().min(MAX_CELL));
        }
    }

    let mut out = String::new();
    let _ = writeln!(out, "Recent events: {} (cap {})", log.len(), log.cap());
    let header: Vec<String> = COLUMNS
        .iter()
        .zip(widths)
        .map(|(c, w)| format!("{c:<w$}"))
        .collect();
    let _ = writeln!(out, "  {}", header.join("  "));
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let _ = writeln!(out, "  {}", rule.join("  "));
    for row in log.rows().take(limit) {
        let cells: Vec<String> = row
            .cells
            .iter()
            .zip(widths)
            .map(|(c, w)| {
                let c: String = c.chars().take(MAX_CELL).collect();
                format!("{c:<w$}")
            })
            .collect();
        let _ = writeln!(out, "{} {}", style_marker(row.style), cells.join("  ").trim_end());
    }
    out
}

fn style_marker(style: RowStyle) -> char {
    match style {
        RowStyle::Danger => '!',
        RowStyle::Warning => '~',
        RowStyle::Success => ' ',
    }
}
