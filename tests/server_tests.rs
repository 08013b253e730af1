use std::path::PathBuf;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use netmon_view::backend::{feed_url, Backend, HttpBackend};
use netmon_view::config::{ServerConfig, ViewConfig};
use netmon_view::server::{router, spawn_server, AppState};
use netmon_view::types::{FileListing, ScanStatus, SecurityEvent, ShutdownAck, StatsSnapshot};
use netmon_view::view::Command;
use netmon_view::{feed, runtime};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tower::ServiceExt;

fn server_config(name: &str) -> ServerConfig {
    let base: PathBuf =
        std::env::temp_dir().join(format!("netmon-view-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&base);
    let capture_dir = base.join("pcaps");
    let reports_dir = base.join("reports");
    std::fs::create_dir_all(&capture_dir).unwrap();
    std::fs::create_dir_all(&reports_dir).unwrap();
    ServerConfig {
        bind: "127.0.0.1:0".into(),
        capture_dir,
        reports_dir,
        event_interval: Duration::from_millis(20),
        capture_interval: Duration::from_secs(30),
        start_scanning: true,
    }
}

async fn call(app: Router, method: &str, uri: &str) -> (StatusCode, Vec<u8>, axum::http::HeaderMap) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec(), headers)
}

async fn call_json<T: DeserializeOwned>(app: Router, method: &str, uri: &str) -> T {
    let (status, body, _) = call(app, method, uri).await;
    assert_eq!(status, StatusCode::OK, "{uri}");
    serde_json::from_slice(&body).unwrap()
}

fn ev(ip: &str, sev: &str) -> SecurityEvent {
    SecurityEvent {
        timestamp: "2024-05-01 12:00:00".into(),
        source_ip: ip.into(),
        target_ip: "10.0.0.1".into(),
        protocol: "TCP".into(),
        severity: sev.into(),
        packet_info: None,
    }
}

#[tokio::test]
async fn stats_reflect_published_events() {
    let state = AppState::new(server_config("stats"));
    let (status, _, headers) = call(router(state.clone()), "GET", "/api/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "no-store");

    state.publish(ev("192.168.1.1", "High")).await;
    state.publish(ev("192.168.1.1", "Low")).await;
    state.publish(ev("192.168.1.2", "Medium")).await;

    let stats: StatsSnapshot = call_json(router(state.clone()), "GET", "/api/stats").await;
    assert_eq!(
        stats,
        StatsSnapshot {
            total_events: 3,
            high_severity: 1,
            unique_sources: 2
        }
    );
    let events: Vec<SecurityEvent> = call_json(router(state), "GET", "/api/events").await;
    assert_eq!(events.len(), 3);
    assert_eq!(events[2].severity, "Medium");
}

#[tokio::test]
async fn files_are_listed_newest_first() {
    let cfg = server_config("files");
    std::fs::write(cfg.capture_dir.join("capture_20240101_000000.pcap"), b"a").unwrap();
    std::fs::write(cfg.capture_dir.join("capture_20240102_000000.pcap"), b"b").unwrap();
    std::fs::write(cfg.capture_dir.join("notes.txt"), b"x").unwrap();
    std::fs::write(cfg.reports_dir.join("report_20240101_000000.json"), b"{}").unwrap();

    let listing: FileListing = call_json(router(AppState::new(cfg)), "GET", "/api/files").await;
    assert_eq!(
        listing.pcap_files,
        vec!["capture_20240102_000000.pcap", "capture_20240101_000000.pcap"]
    );
    assert_eq!(listing.report_files, vec!["report_20240101_000000.json"]);
}

#[tokio::test]
async fn download_checks_type_and_existence() {
    let cfg = server_config("download");
    std::fs::write(cfg.capture_dir.join("capture_1.pcap"), b"pcapdata").unwrap();
    let state = AppState::new(cfg);

    let (status, body, headers) =
        call(router(state.clone()), "GET", "/api/download/capture_1.pcap").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"pcapdata");
    let disposition = headers.get(header::CONTENT_DISPOSITION).unwrap();
    assert!(disposition.to_str().unwrap().contains("capture_1.pcap"));

    let (status, _, _) = call(router(state.clone()), "GET", "/api/download/notes.txt").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _, _) = call(router(state.clone()), "GET", "/api/download/missing.pcap").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _, _) =
        call(router(state), "GET", "/api/download/..%2Fsecret.pcap").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn stopping_scan_writes_a_report() {
    let cfg = server_config("toggle");
    let reports_dir = cfg.reports_dir.clone();
    let state = AppState::new(cfg);
    state.publish(ev("192.168.3.3", "High")).await;

    let stopped: ScanStatus = call_json(router(state.clone()), "POST", "/api/control/toggle").await;
    assert_eq!(stopped, ScanStatus::new(false));
    assert!(!state.is_scanning().await);
    let reports: Vec<_> = std::fs::read_dir(&reports_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].starts_with("report_") && reports[0].ends_with(".json"));

    let started: ScanStatus = call_json(router(state), "POST", "/api/control/toggle").await;
    assert!(started.scanning);
}

#[tokio::test]
async fn archive_lists_a_downloadable_capture_with_its_report() {
    let state = AppState::new(server_config("archive"));
    state.publish(ev("192.168.5.5", "Low")).await;
    let (pcap, report) = state.archive().await.unwrap();

    let listing: FileListing = call_json(router(state.clone()), "GET", "/api/files").await;
    assert_eq!(listing.pcap_files.len(), 1);
    assert_eq!(listing.report_files.len(), 1);
    let pcap_name = &listing.pcap_files[0];
    let report_name = &listing.report_files[0];
    assert_eq!(pcap.file_name().unwrap().to_str(), Some(pcap_name.as_str()));
    assert_eq!(report.file_name().unwrap().to_str(), Some(report_name.as_str()));
    // capture_<stamp>.pcap pairs with report_<stamp>.json
    assert_eq!(
        pcap_name.trim_start_matches("capture_").trim_end_matches(".pcap"),
        report_name.trim_start_matches("report_").trim_end_matches(".json")
    );

    let (status, body, _) = call(router(state), "GET", &format!("/api/download/{pcap_name}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.len(), 24);
    assert_eq!(&body[..4], &[0xd4, 0xc3, 0xb2, 0xa1]);
}

#[tokio::test]
async fn demo_backend_archives_captures_while_scanning() {
    let handle = spawn_server(ServerConfig {
        capture_interval: Duration::from_millis(100),
        ..server_config("capture-loop")
    })
    .await
    .unwrap();
    let http = HttpBackend::new(&handle.base_url(), Duration::from_secs(5)).unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    // stop scanning so no archive is rewritten while we read it
    assert!(!http.toggle_scanning().await.unwrap().scanning);
    tokio::time::sleep(Duration::from_millis(50)).await;
    let listing = http.fetch_files().await.unwrap();
    assert!(!listing.pcap_files.is_empty());
    assert!(!listing.report_files.is_empty());
    let bytes = http.download(&listing.pcap_files[0]).await.unwrap();
    assert_eq!(bytes.len(), 24);

    handle.shutdown.cancel();
    let joined = tokio::time::timeout(Duration::from_secs(5), handle.task).await;
    assert!(matches!(joined, Ok(Ok(Ok(())))));
}

#[tokio::test]
async fn shutdown_cancels_the_server_token() {
    let state = AppState::new(server_config("shutdown"));
    let token = state.shutdown_token();
    let ack: ShutdownAck = call_json(router(state), "POST", "/api/control/shutdown").await;
    assert_eq!(ack.status, "shutting down");
    assert!(token.is_cancelled());
}

#[tokio::test]
async fn view_runs_against_demo_backend_until_shutdown() {
    let handle = spawn_server(server_config("e2e")).await.unwrap();
    let base = handle.base_url();
    let http = HttpBackend::new(&base, Duration::from_secs(5)).unwrap();
    let subscription = feed::subscribe(&feed_url(&base), 64).await.unwrap();

    let (cmd_tx, cmd_rx) = mpsc::channel(4);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(600)).await;
        let _ = cmd_tx.send(Command::Shutdown).await;
    });

    let config = ViewConfig {
        backend_url: base.clone(),
        debounce: Duration::from_millis(50),
        stats_period: Duration::from_secs(1),
        files_period: Duration::from_secs(1),
        ..ViewConfig::default()
    };
    let outcome = runtime::run(config, &http, subscription, cmd_rx, |_| {})
        .await
        .unwrap();

    let view = &outcome.view;
    assert!(!view.is_live());
    assert!(view.all_controls_disabled());
    assert!(!view.table.is_empty());
    assert!(!view.chart.is_empty());
    assert!(view.panel.stats().is_some());
    assert_eq!(view.toggle.label(), "Server Stopped");

    let joined = tokio::time::timeout(Duration::from_secs(5), handle.task).await;
    assert!(matches!(joined, Ok(Ok(Ok(())))));
}
