//! Crawl executor - the control loop of a single run
//!
//! The executor pulls batches from the [`Frontier`], fans fetches out to a
//! bounded set of tasks, and settles outcomes in completion order: links are
//! ingested, retries recorded, and one progress event emitted per attempt.
//! Batches are barriers; the next one is pulled only after every fetch of
//! the current one has settled.
//!
//! Only the executor task touches the frontier. Fetch tasks return their
//! outcome and never see frontier state.

use crate::crawler::{ExtractionRules, PageFetcher, ProgressEvent};
use crate::state::Frontier;
use crate::storage::{ContentPersister, FileMeta, SiteRecord};
use crate::HarvestError;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{self, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Capacity of the progress event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Per-run execution options
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Simultaneous in-flight fetches
    pub concurrency: usize,

    /// CSS selector for links to follow
    pub link_selector: String,

    /// Ceiling on one fetch as seen by the executor
    pub fetch_timeout: Duration,

    /// Root directory content is written under
    pub storage_root: PathBuf,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            concurrency: 3,
            link_selector: "a[href]".to_string(),
            fetch_timeout: Duration::from_secs(120),
            storage_root: PathBuf::from("./data"),
        }
    }
}

/// Everything a fetch task needs, shared read-only across tasks
struct WorkContext {
    fetcher: Arc<dyn PageFetcher>,
    persister: Arc<dyn ContentPersister>,
    site: SiteRecord,
    rules: ExtractionRules,
    fetch_timeout: Duration,
    storage_root: PathBuf,
}

/// Runs crawls for one site
pub struct Executor {
    ctx: Arc<WorkContext>,
    concurrency: usize,
    run_id: Option<i64>,
    cancel: CancellationToken,
}

impl Executor {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        persister: Arc<dyn ContentPersister>,
        site: SiteRecord,
        options: CrawlOptions,
    ) -> Self {
        let rules = site.extraction_rules(&options.link_selector);
        Self {
            ctx: Arc::new(WorkContext {
                fetcher,
                persister,
                site,
                rules,
                fetch_timeout: options.fetch_timeout,
                storage_root: options.storage_root,
            }),
            concurrency: options.concurrency.max(1),
            run_id: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Tags log output with the run record id
    pub fn with_run_id(mut self, run_id: i64) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// Uses an externally owned cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawns the run on the runtime and hands back its event stream
    ///
    /// The join handle resolves to the terminal event.
    pub fn spawn(self, frontier: Frontier) -> (mpsc::Receiver<ProgressEvent>, JoinHandle<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let handle = tokio::spawn(self.run(frontier, tx));
        (rx, handle)
    }

    /// Drives `frontier` to completion, streaming events into `events`
    ///
    /// Per-URL failures never abort the run. A dropped receiver is treated
    /// as cancellation. The sender is dropped after the terminal event,
    /// which is also returned.
    pub async fn run(self, frontier: Frontier, events: mpsc::Sender<ProgressEvent>) -> ProgressEvent {
        let span = tracing::info_span!(
            "crawl_run",
            site = %self.ctx.site.name,
            run_id = ?self.run_id
        );
        self.run_loop(frontier, events).instrument(span).await
    }

    async fn run_loop(self, mut frontier: Frontier, events: mpsc::Sender<ProgressEvent>) -> ProgressEvent {
        let start_time = std::time::Instant::now();
        tracing::info!(
            "Starting crawl: {} seed(s), mode {}",
            frontier.pending_len(),
            frontier.mode().as_request_name()
        );

        self.emit(&events, ProgressEvent::started(frontier.total())).await;

        let mut batches = 0usize;
        let mut attempted = HashSet::new();
        while frontier.has_next_batch() {
            if self.cancel.is_cancelled() {
                break;
            }

            let batch = frontier.next_batch();
            batches += 1;
            tracing::debug!(
                "Batch {}: {} URL(s), phase {}",
                batches,
                batch.len(),
                frontier.phase()
            );

            self.run_batch(&mut frontier, batch, &mut attempted, &events)
                .await;
        }

        let total = frontier.total();
        let mut success = frontier.processed_urls();
        let failed = frontier.failed_urls();

        let terminal = if self.cancel.is_cancelled() {
            // the cursor ran ahead of what was actually dispatched
            success.retain(|url| attempted.contains(url));
            tracing::info!(
                "Crawl cancelled after {:?}: {} dispatched, {} failing",
                start_time.elapsed(),
                success.len(),
                failed.len()
            );
            ProgressEvent::cancelled(total, success, failed)
        } else {
            tracing::info!(
                "Crawl completed in {:?}: {} dispatched, {} failed, {} batch(es)",
                start_time.elapsed(),
                success.len(),
                failed.len(),
                batches
            );
            ProgressEvent::finished(total, success, failed)
        };

        self.emit(&events, terminal.clone()).await;
        terminal
    }

    /// Dispatches one batch with at most `concurrency` fetches in flight
    ///
    /// Once cancelled, nothing new is dispatched but in-flight fetches are
    /// still settled.
    async fn run_batch(
        &self,
        frontier: &mut Frontier,
        batch: Vec<String>,
        attempted: &mut HashSet<String>,
        events: &mpsc::Sender<ProgressEvent>,
    ) {
        let mut queue: VecDeque<String> = batch.into();
        let mut in_flight = JoinSet::new();
        // a panicked task loses its output, so its URL is kept here
        let mut task_urls: HashMap<task::Id, String> = HashMap::new();

        loop {
            while in_flight.len() < self.concurrency && !self.cancel.is_cancelled() {
                let Some(url) = queue.pop_front() else {
                    break;
                };
                let ctx = Arc::clone(&self.ctx);
                let task_url = url.clone();
                let handle = in_flight.spawn(async move {
                    let result = fetch_and_persist(&ctx, &task_url).await;
                    (task_url, result)
                });
                task_urls.insert(handle.id(), url);
            }

            let Some(joined) = in_flight.join_next_with_id().await else {
                break;
            };

            let (url, result) = match joined {
                Ok((id, (url, result))) => {
                    task_urls.remove(&id);
                    (url, result)
                }
                Err(e) => {
                    let Some(url) = task_urls.remove(&e.id()) else {
                        tracing::error!("Untracked fetch task did not complete: {}", e);
                        continue;
                    };
                    tracing::error!("Fetch task for {} did not complete: {}", url, e);
                    let err = HarvestError::TaskAborted {
                        url: url.clone(),
                        message: e.to_string(),
                    };
                    (url, Err(err))
                }
            };
            self.settle(frontier, &url, result, events).await;
            attempted.insert(url);
        }
    }

    async fn settle(
        &self,
        frontier: &mut Frontier,
        url: &str,
        result: Result<Vec<String>, HarvestError>,
        events: &mpsc::Sender<ProgressEvent>,
    ) {
        let completed = match result {
            Ok(links) => {
                let found = links.len();
                let added = frontier.ingest_discovered(links);
                frontier.clear_retry(url);
                tracing::debug!("Fetched {}: {} link(s), {} new", url, found, added);
                true
            }
            Err(e) => {
                frontier.record_retry(url);
                tracing::warn!(
                    "Failed {} (attempt {}/{}): {}",
                    url,
                    frontier.retry_count_of(url),
                    frontier.max_retries(),
                    e
                );
                false
            }
        };

        let retry_count = if completed {
            0
        } else {
            frontier.retry_count_of(url)
        };
        let index = usize::try_from(frontier.index_of(url) + 1).unwrap_or(0);

        let event = ProgressEvent::page(url, completed, retry_count, index, frontier.total());
        self.emit(events, event).await;
    }

    async fn emit(&self, events: &mpsc::Sender<ProgressEvent>, event: ProgressEvent) {
        if events.send(event).await.is_err() && !self.cancel.is_cancelled() {
            tracing::info!("Event receiver dropped, cancelling run");
            self.cancel.cancel();
        }
    }

    /// Fetches and persists exactly one URL
    ///
    /// No frontier is involved: links are not followed and nothing is
    /// retried.
    pub async fn refresh(&self, url: &str) -> ProgressEvent {
        let span = tracing::info_span!("refresh", site = %self.ctx.site.name);
        async {
            match fetch_and_persist(&self.ctx, url).await {
                Ok(_) => {
                    tracing::info!("Refreshed {}", url);
                    ProgressEvent::refreshed(url, true)
                }
                Err(e) => {
                    tracing::warn!("Refresh of {} failed: {}", url, e);
                    ProgressEvent::refreshed(url, false)
                }
            }
        }
        .instrument(span)
        .await
    }
}

/// One unit of work: fetch under the ceiling, write the content, upsert the
/// file record
///
/// # Returns
///
/// The links found on the page
async fn fetch_and_persist(ctx: &WorkContext, url: &str) -> Result<Vec<String>, HarvestError> {
    let page = tokio::time::timeout(ctx.fetch_timeout, ctx.fetcher.fetch(url, &ctx.rules))
        .await
        .map_err(|_| HarvestError::Timeout {
            url: url.to_string(),
            secs: ctx.fetch_timeout.as_secs(),
        })??;

    let site = &ctx.site;
    let saved = ctx
        .persister
        .save(&ctx.storage_root, &site.name, url, &page.content, &site.file_suffix)
        .await?;

    let meta = FileMeta {
        source_url: url.to_string(),
        summary: page.title.clone().unwrap_or_else(|| url.to_string()),
        size: page.content.len() as u64,
    };
    ctx.persister
        .upsert(
            &meta,
            &relative_path(&ctx.storage_root, &saved),
            site.knowledge_base_id,
            site.owner_id,
            Some(site.id),
        )
        .await?;

    Ok(page.links)
}

/// Storage-root-relative path with `/` separators
fn relative_path(root: &Path, saved: &Path) -> String {
    let relative = saved.strip_prefix(root).unwrap_or(saved);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
