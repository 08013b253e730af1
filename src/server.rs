//! Simulated monitoring backend serving the REST surface and push channel the
//! view consumes. Events are synthetic; nothing here touches real traffic.
use std::{
    collections::{HashSet, VecDeque},
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path as UrlPath, State,
    },
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use time::{formatting::Formattable, macros::format_description, OffsetDateTime};
use rand::{seq::SliceRandom, Rng};
use serde::Serialize;
use tokio::{
    net::TcpListener,
    sync::{broadcast, RwLock},
    task::JoinHandle,
    time::{interval_at, sleep, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{debug, info, warn};

use crate::{
    config::ServerConfig,
    feed::{ClientMessage, FeedMessage},
    types::{FileListing, ScanStatus, SecurityEvent, ShutdownAck, StatsSnapshot},
};

/// Events kept for `GET /api/events`.
const EVENT_HISTORY: usize = 1000;
/// Events written into a report.
const REPORT_EVENTS: usize = 100;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<RwLock<ServerState>>,
    events_tx: broadcast::Sender<FeedMessage>,
    shutdown: CancellationToken,
    config: Arc<ServerConfig>,
}

#[derive(Debug, Default)]
struct ServerState {
    scanning: bool,
    events: VecDeque<SecurityEvent>,
    total_events: u64,
    high_severity: u64,
    sources: HashSet<String>,
}

impl ServerState {
    fn record(&mut self, event: SecurityEvent) {
        self.total_events += 1;
        if event.severity == "High" {
            self.high_severity += 1;
        }
        self.sources.insert(event.source_ip.clone());
        if self.events.len() == EVENT_HISTORY {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_events: self.total_events,
            high_severity: self.high_severity,
            unique_sources: self.sources.len() as u64,
        }
    }
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let (events_tx, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(RwLock::new(ServerState {
                scanning: config.start_scanning,
                ..Default::default()
            })),
            events_tx,
            shutdown: CancellationToken::new(),
            config: Arc::new(config),
        }
    }

    /// Cancelled when `POST /api/control/shutdown` is accepted.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Record an event and push it to every connected client.
    pub async fn publish(&self, event: SecurityEvent) {
        self.inner.write().await.record(event.clone());
        // No receivers is fine.
        let _ = self.events_tx.send(FeedMessage::NewEvent(event));
    }

    pub async fn is_scanning(&self) -> bool {
        self.inner.read().await.scanning
    }

    /// Close the current capture window: write a capture file and a report
    /// that share one timestamp. The capture holds no packet records.
    pub async fn archive(&self) -> Result<(PathBuf, PathBuf)> {
        let report = build_report(&*self.inner.read().await);
        let pcap = self
            .config
            .capture_dir
            .join(format!("capture_{}.pcap", report.timestamp));
        tokio::fs::write(&pcap, empty_pcap())
            .await
            .with_context(|| format!("failed to write {}", pcap.display()))?;
        let report = write_report(&self.config.reports_dir, &report).await?;
        Ok((pcap, report))
    }
}

/// A running demo backend.
pub struct ServerHandle {
    pub local_addr: SocketAddr,
    pub shutdown: CancellationToken,
    pub task: JoinHandle<Result<()>>,
}

impl ServerHandle {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.local_addr)
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/stats", get(get_stats))
        .route("/files", get(get_files))
        .route("/events", get(get_events))
        .route("/download/{filename}", get(download))
        .route("/control/toggle", post(toggle))
        .route("/control/shutdown", post(shutdown))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ));

    Router::new()
        .nest("/api", api)
        .route("/ws", get(ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind, start the event simulator and serve until shutdown is requested.
pub async fn spawn_server(config: ServerConfig) -> Result<ServerHandle> {
    for dir in [&config.capture_dir, &config.reports_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    let local_addr = listener.local_addr()?;

    let state = AppState::new(config);
    let shutdown = state.shutdown_token();
    tokio::spawn(run_simulator(state.clone()));

    let app = router(state);
    let token = shutdown.clone();
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await
            .context("demo backend server error")
    });

    info!(%local_addr, "demo backend listening");
    Ok(ServerHandle {
        local_addr,
        shutdown,
        task,
    })
}

async fn run_simulator(state: AppState) {
    let period = state.config.event_interval;
    let capture_period = state.config.capture_interval.max(Duration::from_millis(1));
    let mut captures = interval_at(Instant::now() + capture_period, capture_period);
    captures.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,
            _ = sleep(period) => {
                if state.is_scanning().await {
                    let event = synth_event();
                    debug!(source = %event.source_ip, severity = %event.severity, "emitting event");
                    state.publish(event).await;
                }
            }
            _ = captures.tick() => {
                if state.is_scanning().await {
                    match state.archive().await {
                        Ok((pcap, report)) => info!(
                            pcap = %pcap.display(),
                            report = %report.display(),
                            "capture window archived"
                        ),
                        Err(e) => warn!("failed to archive capture window: {e:#}"),
                    }
                }
            }
        }
    }
    debug!("event simulator stopped");
}

fn synth_event() -> SecurityEvent {
    let mut rng = rand::thread_rng();
    let protocol = ["TCP", "UDP", "ICMP"].choose(&mut rng).copied().unwrap_or("TCP");
    let severity = ["Low", "Medium", "High"].choose(&mut rng).copied().unwrap_or("Low");
    SecurityEvent {
        timestamp: format_now(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]")),
        source_ip: format!("192.168.{}.{}", rng.gen_range(1..=254), rng.gen_range(1..=254)),
        target_ip: format!("10.0.{}.{}", rng.gen_range(1..=254), rng.gen_range(1..=254)),
        protocol: protocol.into(),
        severity: severity.into(),
        packet_info: Some("Simulated packet".into()),
    }
}

fn format_now(fmt: &(impl Formattable + ?Sized)) -> String {
    OffsetDateTime::now_utc().format(fmt).unwrap_or_default()
}

/// `YYYYMMDD_HHMMSS`, shared by capture and report file names.
fn file_stamp() -> String {
    format_now(format_description!("[year][month][day]_[hour][minute][second]"))
}

/// libpcap global header (microsecond stamps, Ethernet link type) with no records.
fn empty_pcap() -> Vec<u8> {
    let mut buf = Vec::with_capacity(24);
    buf.extend_from_slice(&0xa1b2_c3d4u32.to_le_bytes());
    buf.extend_from_slice(&2u16.to_le_bytes());
    buf.extend_from_slice(&4u16.to_le_bytes());
    buf.extend_from_slice(&0i32.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes());
    buf.extend_from_slice(&65_535u32.to_le_bytes());
    buf.extend_from_slice(&1u32.to_le_bytes());
    buf
}

fn error_response(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": msg.into() }))).into_response()
}

async fn get_stats(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    (StatusCode::OK, Json(s.snapshot()))
}

async fn get_events(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    let events: Vec<SecurityEvent> = s.events.iter().cloned().collect();
    (StatusCode::OK, Json(events))
}

async fn get_files(State(app): State<AppState>) -> Response {
    let listing = async {
        Ok::<_, anyhow::Error>(FileListing {
            pcap_files: list_dir(&app.config.capture_dir, "pcap").await?,
            report_files: list_dir(&app.config.reports_dir, "json").await?,
        })
    };
    match listing.await {
        Ok(listing) => (StatusCode::OK, Json(listing)).into_response(),
        Err(e) => {
            warn!("error listing files: {e:#}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
        }
    }
}

/// Names of files in `dir` with extension `ext`, newest (lexically last) first.
async fn list_dir(dir: &Path, ext: &str) -> Result<Vec<String>> {
    let mut rd = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("failed to read {}", dir.display()))?;
    let mut names = Vec::new();
    while let Some(entry) = rd.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some(ext) {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
    }
    names.sort_unstable_by(|a, b| b.cmp(a));
    Ok(names)
}

async fn download(State(app): State<AppState>, UrlPath(filename): UrlPath<String>) -> Response {
    if filename.contains(['/', '\\']) || filename.starts_with('.') {
        return error_response(StatusCode::BAD_REQUEST, "Invalid file name");
    }
    let dir = if filename.ends_with(".pcap") {
        &app.config.capture_dir
    } else if filename.ends_with(".json") {
        &app.config.reports_dir
    } else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid file type");
    };

    let path = dir.join(&filename);
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let disposition = format!("attachment; filename=\"{filename}\"");
            let mut resp = (StatusCode::OK, bytes).into_response();
            resp.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            );
            if let Ok(v) = HeaderValue::from_str(&disposition) {
                resp.headers_mut().insert(header::CONTENT_DISPOSITION, v);
            }
            resp
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            error_response(StatusCode::NOT_FOUND, "File not found")
        }
        Err(e) => {
            warn!("download of {} failed: {e}", path.display());
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn toggle(State(app): State<AppState>) -> Response {
    let (status, report) = {
        let mut s = app.inner.write().await;
        s.scanning = !s.scanning;
        let report = (!s.scanning).then(|| build_report(&s));
        (ScanStatus::new(s.scanning), report)
    };

    if let Some(report) = report {
        match write_report(&app.config.reports_dir, &report).await {
            Ok(path) => info!(path = %path.display(), "report written"),
            Err(e) => warn!("failed to write report: {e:#}"),
        }
    }

    info!(scanning = status.scanning, "scanning toggled");
    let _ = app
        .events_tx
        .send(FeedMessage::ScanningStatus(status.clone()));
    (StatusCode::OK, Json(status)).into_response()
}

async fn shutdown(State(app): State<AppState>) -> impl IntoResponse {
    info!("shutdown requested");
    app.shutdown.cancel();
    (
        StatusCode::OK,
        Json(ShutdownAck {
            status: "shutting down".into(),
        }),
    )
}

#[derive(Debug, Serialize)]
struct Report {
    timestamp: String,
    stats: ReportStats,
    recent_events: Vec<SecurityEvent>,
}

#[derive(Debug, Serialize)]
struct ReportStats {
    total_events: u64,
    high_severity: u64,
    unique_sources: Vec<String>,
}

fn build_report(s: &ServerState) -> Report {
    let mut sources: Vec<String> = s.sources.iter().cloned().collect();
    sources.sort();
    let skip = s.events.len().saturating_sub(REPORT_EVENTS);
    Report {
        timestamp: file_stamp(),
        stats: ReportStats {
            total_events: s.total_events,
            high_severity: s.high_severity,
            unique_sources: sources,
        },
        recent_events: s.events.iter().skip(skip).cloned().collect(),
    }
}

async fn write_report(dir: &Path, report: &Report) -> Result<PathBuf> {
    let path = dir.join(format!("report_{}.json", report.timestamp));
    let body = serde_json::to_vec_pretty(report)?;
    tokio::fs::write(&path, body)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

async fn ws_upgrade(State(app): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app))
}

async fn handle_socket(mut socket: WebSocket, app: AppState) {
    info!("client connected");
    let mut rx = app.events_tx.subscribe();
    let hello = FeedMessage::ScanningStatus(ScanStatus::new(app.is_scanning().await));
    if send_frame(&mut socket, &hello).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            _ = app.shutdown.cancelled() => break,
            msg = rx.recv() => match msg {
                Ok(msg) => {
                    if send_frame(&mut socket, &msg).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "client lagging behind event stream");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ClientMessage>(text.as_str()) {
                        Ok(ClientMessage::ClientReady) => info!("client ready"),
                        Err(_) => debug!("ignoring client frame"),
                    }
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
    let _ = socket.send(Message::Close(None)).await;
    info!("client disconnected");
}

async fn send_frame(socket: &mut WebSocket, msg: &FeedMessage) -> Result<()> {
    let text = serde_json::to_string(msg)?;
    socket
        .send(Message::Text(text.into()))
        .await
        .context("websocket send failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(ip: &str, sev: &str) -> SecurityEvent {
        SecurityEvent {
            source_ip: ip.into(),
            severity: sev.into(),
            ..Default::default()
        }
    }

    #[test]
    fn record_counts_high_and_unique_sources() {
        let mut s = ServerState::default();
        s.record(ev("192.168.1.1", "High"));
        s.record(ev("192.168.1.1", "Low"));
        s.record(ev("192.168.1.2", "High"));
        assert_eq!(
            s.snapshot(),
            StatsSnapshot {
                total_events: 3,
                high_severity: 2,
                unique_sources: 2
            }
        );
    }

    #[test]
    fn report_keeps_last_hundred_events() {
        let mut s = ServerState::default();
        for i in 0..150 {
            s.record(ev(&format!("10.0.0.{}", i % 7), "Low"));
        }
        let r = build_report(&s);
        assert_eq!(r.recent_events.len(), REPORT_EVENTS);
        assert_eq!(r.stats.unique_sources.len(), 7);
        assert_eq!(r.stats.total_events, 150);
    }

    #[test]
    fn empty_capture_is_a_bare_pcap_header() {
        let bytes = empty_pcap();
        assert_eq!(bytes.len(), 24);
        assert_eq!(&bytes[..4], &[0xd4, 0xc3, 0xb2, 0xa1]);
        assert_eq!(&bytes[20..], &1u32.to_le_bytes());
    }

    #[test]
    fn synthetic_events_are_well_formed() {
        for _ in 0..20 {
            let e = synth_event();
            assert!(e.severity().is_some());
            assert!(e.source_ip.starts_with("192.168."));
            assert!(e.target_ip.starts_with("10.0."));
            assert_eq!(e.timestamp.len(), "2024-01-01 00:00:00".len());
        }
    }
}
