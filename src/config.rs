use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};

/// Settings for the live telemetry view.
#[derive(Debug, Clone)]
pub struct ViewConfig {
    /// Base URL of the backend, e.g. `http://127.0.0.1:5000`.
    pub backend_url: String,
    /// Maximum number of chart points kept.
    pub chart_cap: usize,
    /// Maximum number of event log rows kept.
    pub table_cap: usize,
    /// Minimum interval between chart appends.
    pub debounce: Duration,
    pub stats_period: Duration,
    pub files_period: Duration,
    /// How long the scan toggle stays disabled after a response.
    pub toggle_cooldown: Duration,
    pub request_timeout: Duration,
    /// Where downloaded files are written.
    pub download_dir: PathBuf,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:5000".into(),
            chart_cap: 30,
            table_cap: 100,
            debounce: Duration::from_millis(2000),
            stats_period: Duration::from_secs(30),
            files_period: Duration::from_secs(30),
            toggle_cooldown: Duration::from_millis(500),
            request_timeout: Duration::from_secs(10),
            download_dir: PathBuf::from("downloads"),
        }
    }
}

impl ViewConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chart_cap == 0 {
            bail!("chart capacity must be at least 1");
        }
        if self.table_cap == 0 {
            bail!("table capacity must be at least 1");
        }
        if self.stats_period.is_zero() || self.files_period.is_zero() {
            bail!("poll periods must be non-zero");
        }
        if !(self.backend_url.starts_with("http://") || self.backend_url.starts_with("https://")) {
            bail!("backend url must start with http:// or https://: {}", self.backend_url);
        }
        Ok(())
    }
}

/// Settings for the simulated demo backend.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    /// Directory holding `.pcap` captures.
    pub capture_dir: PathBuf,
    /// Directory holding `.json` reports.
    pub reports_dir: PathBuf,
    /// Delay between simulated events.
    pub event_interval: Duration,
    /// How often a capture file and report are archived while scanning.
    pub capture_interval: Duration,
    /// Whether scanning starts active.
    pub start_scanning: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5000".into(),
            capture_dir: PathBuf::from("data/pcaps"),
            reports_dir: PathBuf::from("data/reports"),
            event_interval: Duration::from_millis(1000),
            capture_interval: Duration::from_secs(30),
            start_scanning: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        ViewConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_zero_caps_and_bad_urls() {
        let mut c = ViewConfig {
            chart_cap: 0,
            ..Default::default()
        };
        assert!(c.validate().is_err());
        c.chart_cap = 20;
        c.backend_url = "ftp://x".into();
        assert!(c.validate().is_err());
    }
}
