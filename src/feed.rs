use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::types::{ScanStatus, SecurityEvent};

/// Server-to-client frames on the push channel.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum FeedMessage {
    NewEvent(SecurityEvent),
    ScanningStatus(ScanStatus),
}

/// Client-to-server frames on the push channel.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientMessage {
    ClientReady,
}

/// Decode one text frame. Unknown event names and malformed payloads yield `None`.
pub fn parse_frame(text: &str) -> Option<FeedMessage> {
    serde_json::from_str(text).ok()
}

/// A live push-channel subscription delivering messages in arrival order.
#[derive(Debug)]
pub struct FeedSubscription {
    rx: Option<mpsc::Receiver<FeedMessage>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl FeedSubscription {
    /// Wrap an existing channel, e.g. one fed by a test or a replay source.
    pub fn from_channel(rx: mpsc::Receiver<FeedMessage>) -> Self {
        Self {
            rx: Some(rx),
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    /// Next message; `None` once the channel has closed or the subscription was dropped.
    pub async fn recv(&mut self) -> Option<FeedMessage> {
        match self.rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.rx.is_some()
    }

    /// Stop the reader task and drop any buffered messages. Idempotent.
    pub fn unsubscribe(&mut self) {
        self.cancel.cancel();
        if let Some(mut rx) = self.rx.take() {
            rx.close();
        }
        self.task.take();
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Connect to the websocket at `url`, announce readiness once, and forward frames.
pub async fn subscribe(url: &str, capacity: usize) -> Result<FeedSubscription> {
    let (mut ws, _) = connect_async(url)
        .await
        .with_context(|| format!("failed to connect push channel at {url}"))?;
    let ready = serde_json::to_string(&ClientMessage::ClientReady)?;
    ws.send(Message::Text(ready.into()))
        .await
        .context("failed to send client_ready")?;
    info!(%url, "push channel connected");

    let (tx, rx) = mpsc::channel(capacity.max(1));
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    let task = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                frame = ws.next() => match frame {
                    Some(Ok(Message::Text(text))) => match parse_frame(&text) {
                        Some(msg) => {
                            if tx.send(msg).await.is_err() {
                                break;
                            }
                        }
                        None => debug!(frame = %text.as_str(), "ignoring unrecognized push frame"),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        info!("push channel closed by server");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(%e, "push channel error");
                        break;
                    }
                },
            }
        }
        let _ = ws.close(None).await;
    });

    Ok(FeedSubscription {
        rx: Some(rx),
        cancel,
        task: Some(task),
    })
}
