//! REST client for the monitoring backend.
use std::time::Duration;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

use crate::types::{FileListing, ScanStatus, ShutdownAck, StatsSnapshot};

/// The backend operations the view consumes.
///
/// Futures are polled on the view's single thread, so they need not be `Send`.
#[allow(async_fn_in_trait)]
pub trait Backend {
    async fn fetch_stats(&self) -> Result<StatsSnapshot>;
    async fn fetch_files(&self) -> Result<FileListing>;
    async fn download(&self, filename: &str) -> Result<Vec<u8>>;
    async fn toggle_scanning(&self) -> Result<ScanStatus>;
    async fn shutdown(&self) -> Result<ShutdownAck>;
}

/// `Backend` over HTTP using `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?
            .error_for_status()
            .with_context(|| format!("GET {url} returned an error status"))?;
        resp.json::<T>()
            .await
            .with_context(|| format!("GET {url}: invalid JSON body"))
    }

    async fn post_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({}))
            .send()
            .await
            .with_context(|| format!("POST {url} failed"))?
            .error_for_status()
            .with_context(|| format!("POST {url} returned an error status"))?;
        resp.json::<T>()
            .await
            .with_context(|| format!("POST {url}: invalid JSON body"))
    }
}

impl Backend for HttpBackend {
    async fn fetch_stats(&self) -> Result<StatsSnapshot> {
        self.get_json("/api/stats").await
    }

    async fn fetch_files(&self) -> Result<FileListing> {
        self.get_json("/api/files").await
    }

    async fn download(&self, filename: &str) -> Result<Vec<u8>> {
        let url = self.url(&format!("/api/download/{filename}"));
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?
            .error_for_status()
            .with_context(|| format!("download of {filename} rejected"))?;
        let bytes = resp
            .bytes()
            .await
            .with_context(|| format!("failed to read body of {filename}"))?;
        Ok(bytes.to_vec())
    }

    async fn toggle_scanning(&self) -> Result<ScanStatus> {
        self.post_json("/api/control/toggle").await
    }

    async fn shutdown(&self) -> Result<ShutdownAck> {
        self.post_json("/api/control/shutdown").await
    }
}

/// Websocket URL of the push channel for an `http(s)://` base URL.
pub fn feed_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}/ws")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}/ws")
    } else {
        format!("ws://{base}/ws")
    }
}
