use std::cell::Cell;
use std::time::Duration;

use anyhow::{bail, Result};
use netmon_view::backend::Backend;
use netmon_view::config::ViewConfig;
use netmon_view::control::{ScanMirror, ToggleState};
use netmon_view::feed::{FeedMessage, FeedSubscription};
use netmon_view::runtime;
use netmon_view::types::{FileListing, ScanStatus, SecurityEvent, ShutdownAck, StatsSnapshot};
use netmon_view::view::{Command, SHUTDOWN_NOTICE};
use tokio::sync::mpsc;
use tokio::time::sleep;

const STATS: StatsSnapshot = StatsSnapshot {
    total_events: 3,
    high_severity: 2,
    unique_sources: 1,
};

/// In-memory backend counting calls.
struct FakeBackend {
    toggle_ok: bool,
    scanning: Cell<bool>,
    stats_calls: Cell<u32>,
    files_calls: Cell<u32>,
    shutdown_calls: Cell<u32>,
}

impl FakeBackend {
    fn new(toggle_ok: bool) -> Self {
        Self {
            toggle_ok,
            scanning: Cell::new(false),
            stats_calls: Cell::new(0),
            files_calls: Cell::new(0),
            shutdown_calls: Cell::new(0),
        }
    }
}

impl Backend for FakeBackend {
    async fn fetch_stats(&self) -> Result<StatsSnapshot> {
        self.stats_calls.set(self.stats_calls.get() + 1);
        Ok(STATS)
    }

    async fn fetch_files(&self) -> Result<FileListing> {
        self.files_calls.set(self.files_calls.get() + 1);
        Ok(FileListing {
            pcap_files: vec!["capture_1.pcap".into()],
            report_files: vec!["report_1.json".into()],
        })
    }

    async fn download(&self, filename: &str) -> Result<Vec<u8>> {
        Ok(filename.as_bytes().to_vec())
    }

    async fn toggle_scanning(&self) -> Result<ScanStatus> {
        if !self.toggle_ok {
            bail!("backend unreachable");
        }
        let next = !self.scanning.get();
        self.scanning.set(next);
        Ok(ScanStatus::new(next))
    }

    async fn shutdown(&self) -> Result<ShutdownAck> {
        self.shutdown_calls.set(self.shutdown_calls.get() + 1);
        Ok(ShutdownAck {
            status: "shutting down".into(),
        })
    }
}

fn config() -> ViewConfig {
    ViewConfig {
        chart_cap: 20,
        table_cap: 100,
        debounce: Duration::from_millis(2000),
        toggle_cooldown: Duration::from_millis(500),
        ..ViewConfig::default()
    }
}

fn ev(ts: &str, sev: &str) -> SecurityEvent {
    SecurityEvent {
        timestamp: ts.into(),
        source_ip: "192.168.1.20".into(),
        target_ip: "10.0.0.7".into(),
        protocol: "UDP".into(),
        severity: sev.into(),
        packet_info: None,
    }
}

/// Send `cmds` at the given offsets from now.
fn schedule(cmds: Vec<(u64, Command)>) -> mpsc::Receiver<Command> {
    let (tx, rx) = mpsc::channel(8);
    tokio::spawn(async move {
        let mut elapsed = 0;
        for (at_ms, cmd) in cmds {
            sleep(Duration::from_millis(at_ms - elapsed)).await;
            elapsed = at_ms;
            if tx.send(cmd).await.is_err() {
                break;
            }
        }
    });
    rx
}

#[tokio::test(start_paused = true)]
async fn burst_then_shutdown_tears_everything_down() {
    let backend = FakeBackend::new(true);
    let (feed_tx, feed_rx) = mpsc::channel(16);
    for (ts, sev) in [("t0", "High"), ("t1", "Medium"), ("t2", "High")] {
        feed_tx
            .send(FeedMessage::NewEvent(ev(ts, sev)))
            .await
            .unwrap();
    }
    let commands = schedule(vec![(5_000, Command::Shutdown)]);

    let mut frames = 0;
    let outcome = runtime::run(
        config(),
        &backend,
        FeedSubscription::from_channel(feed_rx),
        commands,
        |_| frames += 1,
    )
    .await
    .unwrap();

    let view = &outcome.view;
    assert!(!view.is_live());
    assert!(view.all_controls_disabled());
    assert_eq!(view.notice(), Some(SHUTDOWN_NOTICE));
    assert!(!outcome.polls_active);
    assert!(!outcome.feed_active);
    assert!(frames > 0);

    assert_eq!(view.chart.len(), 1);
    let p = view.chart.points().next().unwrap();
    assert_eq!((p.high, p.medium, p.low), (1, 0, 0));
    let order: Vec<_> = view.table.rows().map(|r| r.cells[0].as_str()).collect();
    assert_eq!(order, vec!["t2", "t1", "t0"]);

    assert_eq!(view.panel.stats(), Some(&STATS));
    assert_eq!(view.panel.pcap.options(), &["capture_1.pcap".to_string()]);
    assert!(backend.stats_calls.get() >= 1);
    assert!(backend.files_calls.get() >= 1);
    assert_eq!(backend.shutdown_calls.get(), 1);
    drop(feed_tx);
}

#[tokio::test(start_paused = true)]
async fn toggle_success_reenables_button() {
    let backend = FakeBackend::new(true);
    let (_feed_tx, feed_rx) = mpsc::channel::<FeedMessage>(4);
    let commands = schedule(vec![(1_000, Command::Toggle), (3_000, Command::Quit)]);

    let outcome = runtime::run(
        config(),
        &backend,
        FeedSubscription::from_channel(feed_rx),
        commands,
        |_| {},
    )
    .await
    .unwrap();

    let view = &outcome.view;
    assert!(view.is_live());
    assert_eq!(view.toggle.state(), ToggleState::Idle(ScanMirror::Running));
    assert!(view.toggle.is_enabled());
    assert!(outcome.polls_active);
    // initial poll plus the refresh after the toggle
    assert!(backend.stats_calls.get() >= 2);
}

#[tokio::test(start_paused = true)]
async fn toggle_failure_shows_error_and_reenables() {
    let backend = FakeBackend::new(false);
    let (_feed_tx, feed_rx) = mpsc::channel::<FeedMessage>(4);
    let commands = schedule(vec![(1_000, Command::Toggle), (3_000, Command::Quit)]);

    let outcome = runtime::run(
        config(),
        &backend,
        FeedSubscription::from_channel(feed_rx),
        commands,
        |_| {},
    )
    .await
    .unwrap();

    assert_eq!(outcome.view.toggle.state(), ToggleState::ErrorIdle);
    assert_eq!(outcome.view.toggle.label(), "Error");
    assert!(outcome.view.toggle.is_enabled());
}

#[tokio::test(start_paused = true)]
async fn scanning_push_is_mirrored() {
    let backend = FakeBackend::new(true);
    let (feed_tx, feed_rx) = mpsc::channel(4);
    feed_tx
        .send(FeedMessage::ScanningStatus(ScanStatus::new(true)))
        .await
        .unwrap();
    let commands = schedule(vec![(1_000, Command::Quit)]);

    let outcome = runtime::run(
        config(),
        &backend,
        FeedSubscription::from_channel(feed_rx),
        commands,
        |_| {},
    )
    .await
    .unwrap();
    assert_eq!(outcome.view.toggle.label(), "Stop Scanning");
}

#[tokio::test]
async fn download_writes_selected_file() {
    let dir = std::env::temp_dir().join(format!("netmon-view-dl-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    let backend = FakeBackend::new(true);
    let (_feed_tx, feed_rx) = mpsc::channel::<FeedMessage>(4);
    let commands = schedule(vec![
        (100, Command::Select(netmon_view::poller::FileKind::Report, "report_1.json".into())),
        (150, Command::Download(netmon_view::poller::FileKind::Report)),
        (600, Command::Quit),
    ]);

    let outcome = runtime::run(
        ViewConfig {
            download_dir: dir.clone(),
            ..config()
        },
        &backend,
        FeedSubscription::from_channel(feed_rx),
        commands,
        |_| {},
    )
    .await
    .unwrap();

    let saved = std::fs::read(dir.join("report_1.json")).unwrap();
    assert_eq!(saved, b"report_1.json");
    assert!(outcome.view.flash().unwrap().starts_with("Saved report_1.json"));
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let backend = FakeBackend::new(true);
    let (_feed_tx, feed_rx) = mpsc::channel::<FeedMessage>(1);
    let (_cmd_tx, cmd_rx) = mpsc::channel(1);
    let res = runtime::run(
        ViewConfig {
            table_cap: 0,
            ..config()
        },
        &backend,
        FeedSubscription::from_channel(feed_rx),
        cmd_rx,
        |_| {},
    )
    .await;
    assert!(res.is_err());
}
