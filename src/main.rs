use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::time::Duration;

use netmon_view::config::{ServerConfig, ViewConfig};
use netmon_view::view::Command;
use netmon_view::{backend, feed, render, runtime, server};

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// netmon-view — live telemetry view for a network-security monitoring backend.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "netmon-view",
    version,
    about = "Live telemetry view for a network-security monitoring backend.",
    long_about = None
)]
struct Cli {
    /// Backend base URL. Ignored with --serve-demo, which points the view at the demo backend.
    #[arg(long, default_value = "http://127.0.0.1:5000")]
    backend: String,

    /// Maximum number of chart points.
    #[arg(long = "chart-cap", default_value_t = 30)]
    chart_cap: usize,

    /// Maximum number of event log rows.
    #[arg(long = "table-cap", default_value_t = 100)]
    table_cap: usize,

    /// Minimum interval between chart updates in milliseconds.
    #[arg(long = "debounce-ms", default_value_t = 2000)]
    debounce_ms: u64,

    /// Stats and file-list poll period in seconds.
    #[arg(long = "poll-secs", default_value_t = 30)]
    poll_secs: u64,

    /// How long the scan toggle stays disabled after a response, in milliseconds.
    #[arg(long = "cooldown-ms", default_value_t = 500)]
    cooldown_ms: u64,

    /// Directory downloaded files are written to.
    #[arg(long = "download-dir", default_value = "downloads")]
    download_dir: PathBuf,

    /// Start the simulated demo backend in-process.
    #[arg(long = "serve-demo", default_value_t = false)]
    serve_demo: bool,

    /// Bind address of the demo backend.
    #[arg(long, default_value = "127.0.0.1:5000")]
    bind: String,

    /// Data directory of the demo backend (holds pcaps/ and reports/).
    #[arg(long = "data-dir", default_value = "data")]
    data_dir: PathBuf,

    /// Delay between simulated events in milliseconds.
    #[arg(long = "event-interval-ms", default_value_t = 1000)]
    event_interval_ms: u64,

    /// Seconds between archived capture windows of the demo backend.
    #[arg(long = "capture-secs", default_value_t = 30)]
    capture_secs: u64,

    /// Only run the demo backend, without the view.
    #[arg(long = "no-view", default_value_t = false)]
    no_view: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut backend_url = cli.backend.clone();
    let mut demo = None;
    if cli.serve_demo || cli.no_view {
        let handle = server::spawn_server(ServerConfig {
            bind: cli.bind.clone(),
            capture_dir: cli.data_dir.join("pcaps"),
            reports_dir: cli.data_dir.join("reports"),
            event_interval: Duration::from_millis(cli.event_interval_ms),
            capture_interval: Duration::from_secs(cli.capture_secs),
            start_scanning: true,
        })
        .await?;
        backend_url = handle.base_url();
        demo = Some(handle);
    }

    if cli.no_view {
        if let Some(handle) = demo {
            info!("demo backend at {} (Ctrl+C to stop)", handle.base_url());
            tokio::select! {
                _ = tokio::signal::ctrl_c() => handle.shutdown.cancel(),
                _ = handle.shutdown.cancelled() => {}
            }
            handle.task.await??;
        }
        return Ok(());
    }

    let config = ViewConfig {
        backend_url: backend_url.clone(),
        chart_cap: cli.chart_cap,
        table_cap: cli.table_cap,
        debounce: Duration::from_millis(cli.debounce_ms),
        stats_period: Duration::from_secs(cli.poll_secs),
        files_period: Duration::from_secs(cli.poll_secs),
        toggle_cooldown: Duration::from_millis(cli.cooldown_ms),
        download_dir: cli.download_dir.clone(),
        ..ViewConfig::default()
    };
    config.validate()?;
    info!(
        backend = %config.backend_url,
        chart_cap = config.chart_cap,
        table_cap = config.table_cap,
        debounce_ms = cli.debounce_ms,
        poll_secs = cli.poll_secs,
        "starting live telemetry view"
    );

    let http = backend::HttpBackend::new(&config.backend_url, config.request_timeout)?;
    let subscription = feed::subscribe(&backend::feed_url(&config.backend_url), 256).await?;

    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    spawn_command_reader(cmd_tx);

    let clear = std::io::stdout().is_terminal();
    let outcome = runtime::run(config, &http, subscription, cmd_rx, |view| {
        let frame = render::render_frame(view);
        let mut out = std::io::stdout().lock();
        if clear {
            let _ = write!(out, "\x1B[2J\x1B[H");
        }
        let _ = writeln!(out, "{frame}");
        let _ = writeln!(out, "commands: t(oggle) | s(hutdown) | select <pcap|report> <file> | dl <pcap|report> | q(uit)");
        let _ = out.flush();
    })
    .await?;

    if let Some(notice) = outcome.view.notice() {
        println!("{notice}");
    }
    if let Some(handle) = demo {
        handle.shutdown.cancel();
        if let Err(e) = handle.task.await? {
            warn!("demo backend error: {e:#}");
        }
    }
    Ok(())
}

/// Forward stdin lines as commands; Ctrl+C becomes `Quit`.
fn spawn_command_reader(tx: mpsc::Sender<Command>) {
    let ctrlc_tx = tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = ctrlc_tx.send(Command::Quit).await;
        }
    });

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            match Command::parse(&line) {
                Ok(cmd) => {
                    if tx.send(cmd).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("{e}"),
            }
        }
    });
}
