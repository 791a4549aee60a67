//! Crawl coordinator - wires collaborators into runs
//!
//! This module turns a caller request into a running crawl:
//! - Checking that the caller owns the site
//! - Validating run options
//! - Loading already-materialized URLs for incremental runs
//! - Seeding the frontier and recording the run
//! - Spawning the executor and closing the run record when it ends

use crate::config::{validate_crawl_config, Config, CrawlConfig};
use crate::crawler::{CrawlOptions, Executor, HttpPageFetcher, PageFetcher, ProgressEvent};
use crate::state::{CrawlMode, Frontier, FrontierOptions};
use crate::storage::{ContentPersister, OwnerCheck, RunStatus, SqliteStorage, Storage};
use crate::url::{strip_fragment, LinkFilter};
use crate::{ConfigError, HarvestError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A crawl in flight
pub struct CrawlHandle {
    /// Run record id
    pub run_id: i64,

    /// Progress events; closed after the terminal event
    pub events: mpsc::Receiver<ProgressEvent>,

    /// Cancels the run
    pub cancel: CancellationToken,

    /// Resolves to the terminal event once the run record is closed
    pub task: JoinHandle<ProgressEvent>,
}

/// Entry point for crawl and refresh requests
pub struct Harvester {
    fetcher: Arc<dyn PageFetcher>,
    storage: Arc<SqliteStorage>,
    storage_root: PathBuf,
    fetch_timeout: Duration,
    config_hash: String,
}

impl Harvester {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        storage: Arc<SqliteStorage>,
        storage_root: impl Into<PathBuf>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            storage,
            storage_root: storage_root.into(),
            fetch_timeout,
            config_hash: String::new(),
        }
    }

    /// Builds a harvester from a loaded configuration
    ///
    /// Opens the database, registers the configured sites, creates the
    /// storage root, and builds the HTTP fetcher.
    pub fn from_config(config: &Config, config_hash: &str) -> Result<Self, HarvestError> {
        let root = PathBuf::from(&config.storage.root);
        std::fs::create_dir_all(&root)?;

        let db_path = Path::new(&config.storage.database_path);
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let storage = SqliteStorage::new(db_path)?;
        storage.register_sites(&config.sites)?;

        let fetcher = HttpPageFetcher::new(&config.fetcher)
            .map_err(|e| ConfigError::Validation(format!("Cannot build HTTP client: {}", e)))?;

        tracing::info!(
            "Storage at {}, database {}, {} site(s) registered",
            root.display(),
            db_path.display(),
            config.sites.len()
        );

        Ok(Self {
            fetcher: Arc::new(fetcher),
            storage: Arc::new(storage),
            storage_root: root,
            fetch_timeout: Duration::from_secs(config.fetcher.operation_timeout_secs),
            config_hash: config_hash.to_string(),
        })
    }

    /// Tags run records with the hash of the configuration they ran under
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = hash.into();
        self
    }

    pub fn storage(&self) -> &Arc<SqliteStorage> {
        &self.storage
    }

    /// Starts a crawl of `site_id` on behalf of `owner_id`
    ///
    /// Every check happens before the run starts; once this returns `Ok`,
    /// nothing aborts the run short of cancellation.
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlHandle)` - The run is in flight
    /// * `Err(HarvestError)` - Owner check, validation, or storage failed
    pub async fn start_crawl(
        &self,
        owner_id: i64,
        kb_id: i64,
        site_id: i64,
        options: &CrawlConfig,
        cancel: CancellationToken,
    ) -> Result<CrawlHandle, HarvestError> {
        validate_crawl_config(options)?;
        let mode = CrawlMode::from_request_name(&options.crawl_type).ok_or_else(|| {
            ConfigError::Validation(format!("unknown crawl type '{}'", options.crawl_type))
        })?;

        let site = self.storage.authorize(owner_id, kb_id, site_id).await?;
        let filter = LinkFilter::new(&site.match_patterns, &site.ignore_patterns)?;

        let materialized = match mode {
            CrawlMode::Incremental => {
                self.storage
                    .materialized_urls(&self.storage_root, &site)
                    .await?
            }
            CrawlMode::Full => Vec::new(),
        };
        tracing::debug!(
            "Site {} ({}): {} materialized URL(s)",
            site.id,
            site.name,
            materialized.len()
        );

        let frontier = Frontier::new(
            site.start_urls.clone(),
            FrontierOptions {
                max_retries: options.max_retries,
                max_batch: options.max_connections as usize,
                mode,
                file_suffix: site.file_suffix.clone(),
                allow_duplicate_retries: options.allow_duplicate_retries,
            },
            materialized,
            filter,
        )?;

        let run_id = self.storage.create_run(site.id, mode, &self.config_hash)?;

        let executor = Executor::new(
            Arc::clone(&self.fetcher),
            self.storage.clone(),
            site,
            CrawlOptions {
                concurrency: options.concurrency as usize,
                link_selector: options.link_selector.clone(),
                fetch_timeout: self.fetch_timeout,
                storage_root: self.storage_root.clone(),
            },
        )
        .with_run_id(run_id)
        .with_cancellation(cancel.clone());

        let (tx, rx) = mpsc::channel(crate::crawler::EVENT_CHANNEL_CAPACITY);
        let storage = Arc::clone(&self.storage);
        let task = tokio::spawn(async move {
            let terminal = executor.run(frontier, tx).await;
            let status = if terminal.cancelled == Some(true) {
                RunStatus::Cancelled
            } else {
                RunStatus::Completed
            };
            let success = terminal.success_urls.as_ref().map_or(0, Vec::len);
            let failed = terminal.failed_urls.as_ref().map_or(0, Vec::len);
            if let Err(e) = storage.finish_run(run_id, status, success, failed) {
                tracing::error!("Failed to close run {}: {}", run_id, e);
            }
            terminal
        });

        Ok(CrawlHandle {
            run_id,
            events: rx,
            cancel,
            task,
        })
    }

    /// Fetches and persists one URL of `site_id` on behalf of `owner_id`
    pub async fn refresh(
        &self,
        owner_id: i64,
        kb_id: i64,
        site_id: i64,
        url: &str,
        link_selector: &str,
    ) -> Result<ProgressEvent, HarvestError> {
        let site = self.storage.authorize(owner_id, kb_id, site_id).await?;
        let url = strip_fragment(url)?;

        let executor = Executor::new(
            Arc::clone(&self.fetcher),
            self.storage.clone(),
            site,
            CrawlOptions {
                concurrency: 1,
                link_selector: link_selector.to_string(),
                fetch_timeout: self.fetch_timeout,
                storage_root: self.storage_root.clone(),
            },
        );

        Ok(executor.refresh(url.as_str()).await)
    }
}
