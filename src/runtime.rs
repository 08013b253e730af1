//! Single-threaded event loop driving a [`TelemetryView`].
//!
//! Feed messages, poll timers, the debounce and cooldown deadlines, user
//! commands and finished backend calls are all multiplexed with one
//! `tokio::select!`; handlers run one at a time and never block.
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use futures_util::future::{FutureExt, LocalBoxFuture};
use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tracing::{info, warn};

use crate::backend::Backend;
use crate::config::ViewConfig;
use crate::feed::FeedSubscription;
use crate::poller::PollTimers;
use crate::view::{Command, Completion, Request, TelemetryView};

/// State of the loop when it returned.
#[derive(Debug)]
pub struct Outcome {
    pub view: TelemetryView,
    /// Whether the poll timers were still running.
    pub polls_active: bool,
    /// Whether the push channel was still subscribed.
    pub feed_active: bool,
}

/// Run the view until the backend is shut down or a `Quit` command arrives.
///
/// `on_frame` is called whenever the view changed.
pub async fn run<B, F>(
    config: ViewConfig,
    backend: &B,
    mut feed: FeedSubscription,
    mut commands: mpsc::Receiver<Command>,
    mut on_frame: F,
) -> Result<Outcome>
where
    B: Backend,
    F: FnMut(&TelemetryView),
{
    config.validate()?;
    let download_dir = config.download_dir.clone();
    let mut timers = PollTimers::new(config.stats_period, config.files_period);
    let mut view = TelemetryView::init(config);
    let mut inflight: FuturesUnordered<LocalBoxFuture<'_, Completion>> = FuturesUnordered::new();
    let mut feed_open = true;
    let mut commands_open = true;
    let mut drawn = None;

    loop {
        let live = view.is_live();
        let debounce_at = view.debounce_deadline();
        let cooldown_at = view.cooldown_deadline();
        let mut requests = Vec::new();

        tokio::select! {
            biased;
            msg = feed.recv(), if live && feed_open => match msg {
                Some(msg) => requests = view.on_feed(msg, Instant::now()),
                None => {
                    warn!("push channel closed; live updates stopped");
                    feed_open = false;
                }
            },
            Some(done) = inflight.next(), if !inflight.is_empty() => {
                requests = view.on_completion(done, Instant::now());
            }
            _ = sleep_until_opt(debounce_at) => view.on_debounce_due(Instant::now()),
            _ = sleep_until_opt(cooldown_at) => view.on_cooldown_due(Instant::now()),
            kind = timers.tick() => requests.extend(view.on_poll(kind)),
            cmd = commands.recv(), if commands_open => match cmd {
                Some(Command::Quit) => {
                    info!("quit requested");
                    break;
                }
                Some(cmd) => requests = view.on_command(cmd),
                None => commands_open = false,
            },
        }

        for req in requests {
            inflight.push(issue(backend, req, &download_dir));
        }

        if drawn != Some(view.revision()) {
            drawn = Some(view.revision());
            on_frame(&view);
        }

        if !view.is_live() {
            timers.cancel();
            feed.unsubscribe();
            info!("view torn down after shutdown");
            break;
        }
    }

    Ok(Outcome {
        polls_active: timers.is_active(),
        feed_active: feed.is_active(),
        view,
    })
}

async fn sleep_until_opt(at: Option<Instant>) {
    match at {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn issue<'a, B>(backend: &'a B, req: Request, download_dir: &Path) -> LocalBoxFuture<'a, Completion>
where
    B: Backend + 'a,
{
    match req {
        Request::FetchStats => async move { Completion::Stats(backend.fetch_stats().await) }.boxed_local(),
        Request::FetchFiles => async move { Completion::Files(backend.fetch_files().await) }.boxed_local(),
        Request::Toggle => {
            async move { Completion::Toggled(backend.toggle_scanning().await) }.boxed_local()
        }
        Request::Shutdown => {
            async move { Completion::ShutdownDone(backend.shutdown().await) }.boxed_local()
        }
        Request::Download(filename) => {
            let dir = download_dir.to_path_buf();
            async move {
                let result = save_download(backend, &filename, &dir).await;
                Completion::Downloaded { filename, result }
            }
            .boxed_local()
        }
    }
}

/// Fetch `filename` and write it under `dir`, keeping only its final path component.
async fn save_download<B: Backend>(backend: &B, filename: &str, dir: &Path) -> Result<PathBuf> {
    let name = Path::new(filename)
        .file_name()
        .ok_or_else(|| anyhow!("invalid file name: {filename}"))?;
    let bytes = backend.download(filename).await?;
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(name);
    tokio::fs::write(&path, bytes)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}
