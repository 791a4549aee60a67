//! URL frontier for a single crawl run
//!
//! The frontier decides what to fetch next and whether a newly discovered
//! URL is worth fetching at all. It performs no I/O; the executor owns it
//! exclusively and mutates it only between suspension points.

use crate::state::RunPhase;
use crate::url::{canonical_url, LinkFilter};
use crate::ConfigError;
use std::collections::{HashMap, HashSet};

/// Crawl mode for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CrawlMode {
    /// Fetch every eligible URL
    #[default]
    Full,
    /// Skip discovered URLs already materialized locally
    Incremental,
}

impl CrawlMode {
    /// Parses the request-level name (`"all"` or `"incremental"`)
    pub fn from_request_name(name: &str) -> Option<Self> {
        match name {
            "all" | "full" => Some(Self::Full),
            "incremental" => Some(Self::Incremental),
            _ => None,
        }
    }

    pub fn as_request_name(&self) -> &'static str {
        match self {
            Self::Full => "all",
            Self::Incremental => "incremental",
        }
    }
}

/// Construction parameters for a [`Frontier`]
#[derive(Debug, Clone)]
pub struct FrontierOptions {
    /// Per-URL retry ceiling
    pub max_retries: u32,

    /// Upper bound on URLs the run will ever dispatch fresh; also the
    /// progress denominator
    pub max_batch: usize,

    /// Crawl mode
    pub mode: CrawlMode,

    /// Site file suffix, used to canonicalize URLs in incremental mode
    pub file_suffix: String,

    /// When true, a URL may appear in both the fresh and the retry slice of
    /// a single batch
    pub allow_duplicate_retries: bool,
}

impl Default for FrontierOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_batch: 100,
            mode: CrawlMode::Full,
            file_suffix: String::new(),
            allow_duplicate_retries: true,
        }
    }
}

/// URL frontier state
///
/// Invariants:
/// - `pending` never contains the same URL twice
/// - `cursor <= pending.len()`
/// - a URL is handed out for retry only while its count is below
///   `max_retries`
#[derive(Debug, Clone)]
pub struct Frontier {
    pending: Vec<String>,
    positions: HashMap<String, usize>,
    cursor: usize,
    retry_counts: HashMap<String, u32>,
    /// First-failure order of retry keys, for deterministic reporting
    retry_order: Vec<String>,
    materialized: HashSet<String>,
    filter: LinkFilter,
    options: FrontierOptions,
}

impl Frontier {
    /// Creates a frontier seeded with `seeds`
    ///
    /// Seeds are deduplicated (first occurrence wins) but not filtered: the
    /// caller chose them explicitly.
    ///
    /// # Arguments
    ///
    /// * `seeds` - Seed URLs
    /// * `options` - Retry ceiling, batch bound, mode
    /// * `materialized` - URLs already present locally before the run
    /// * `filter` - Compiled match/ignore patterns for discovered URLs
    ///
    /// # Returns
    ///
    /// * `Ok(Frontier)` - Ready to hand out batches
    /// * `Err(ConfigError)` - `max_batch` is zero
    pub fn new<I, S>(
        seeds: I,
        options: FrontierOptions,
        materialized: impl IntoIterator<Item = String>,
        filter: LinkFilter,
    ) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if options.max_batch < 1 {
            return Err(ConfigError::Validation(format!(
                "max_batch must be >= 1, got {}",
                options.max_batch
            )));
        }

        let materialized = materialized
            .into_iter()
            .map(|u| canonical_url(&u, &options.file_suffix))
            .collect();

        let mut frontier = Self {
            pending: Vec::new(),
            positions: HashMap::new(),
            cursor: 0,
            retry_counts: HashMap::new(),
            retry_order: Vec::new(),
            materialized,
            filter,
            options,
        };

        for seed in seeds {
            frontier.push_unique(seed.into());
        }

        Ok(frontier)
    }

    /// Returns true while there is fresh work within budget or a retry below
    /// the ceiling
    pub fn has_next_batch(&self) -> bool {
        let fresh = self.cursor < self.pending.len() && self.cursor < self.options.max_batch;
        fresh || self.has_retryable()
    }

    /// Pulls the next batch
    ///
    /// The batch is the next `max_batch - cursor` fresh URLs followed by
    /// every URL whose retry count is still below the ceiling. With
    /// `allow_duplicate_retries` a URL dispatched fresh in this batch that
    /// also has a live retry entry appears twice.
    pub fn next_batch(&mut self) -> Vec<String> {
        let budget = self.options.max_batch.saturating_sub(self.cursor);
        let end = (self.cursor + budget).min(self.pending.len());
        let start = self.cursor.min(end);

        let mut batch: Vec<String> = self.pending[start..end].to_vec();
        self.cursor = end.max(self.cursor);

        let fresh_len = batch.len();
        for url in &self.retry_order {
            let count = self.retry_counts.get(url).copied().unwrap_or(0);
            if count >= self.options.max_retries {
                continue;
            }
            if !self.options.allow_duplicate_retries && batch[..fresh_len].contains(url) {
                continue;
            }
            batch.push(url.clone());
        }

        batch
    }

    /// Merges discovered links into `pending`
    ///
    /// In incremental mode URLs whose canonical form is already materialized
    /// are dropped first. The rest must pass the link filter; survivors are
    /// appended in order, skipping anything already pending.
    ///
    /// # Returns
    ///
    /// The number of URLs added
    pub fn ingest_discovered<I, S>(&mut self, urls: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = 0;

        for url in urls {
            let url = url.as_ref();

            if self.options.mode == CrawlMode::Incremental
                && self
                    .materialized
                    .contains(&canonical_url(url, &self.options.file_suffix))
            {
                continue;
            }

            if !self.filter.allows(url) {
                continue;
            }

            if self.push_unique(url.to_string()) {
                added += 1;
            }
        }

        added
    }

    /// Records a failed attempt for `url`
    pub fn record_retry(&mut self, url: &str) {
        match self.retry_counts.get_mut(url) {
            Some(count) => *count += 1,
            None => {
                self.retry_counts.insert(url.to_string(), 1);
                self.retry_order.push(url.to_string());
            }
        }
    }

    /// Clears retry bookkeeping for `url` after a success
    pub fn clear_retry(&mut self, url: &str) {
        if self.retry_counts.remove(url).is_some() {
            self.retry_order.retain(|u| u != url);
        }
    }

    /// Position of `url` in `pending`, or -1
    pub fn index_of(&self, url: &str) -> i64 {
        self.positions.get(url).map_or(-1, |&i| i as i64)
    }

    /// Failed attempts recorded for `url` (0 if none)
    pub fn retry_count_of(&self, url: &str) -> u32 {
        self.retry_counts.get(url).copied().unwrap_or(0)
    }

    /// Progress denominator: `min(len(pending), max_batch)`
    pub fn total(&self) -> usize {
        self.pending.len().min(self.options.max_batch)
    }

    /// URLs dispatched at least once
    pub fn processed_urls(&self) -> Vec<String> {
        self.pending[..self.cursor].to_vec()
    }

    /// URLs that have failed at least once and not cleared since
    pub fn failed_urls(&self) -> Vec<String> {
        self.retry_order.clone()
    }

    /// Where the run stands given the current frontier state
    pub fn phase(&self) -> RunPhase {
        if !self.has_next_batch() {
            RunPhase::Done
        } else if self.cursor >= self.total() {
            RunPhase::Draining
        } else {
            RunPhase::Running
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn mode(&self) -> CrawlMode {
        self.options.mode
    }

    pub fn max_retries(&self) -> u32 {
        self.options.max_retries
    }

    fn has_retryable(&self) -> bool {
        self.retry_counts
            .values()
            .any(|&count| count < self.options.max_retries)
    }

    fn push_unique(&mut self, url: String) -> bool {
        if self.positions.contains_key(&url) {
            return false;
        }
        self.positions.insert(url.clone(), self.pending.len());
        self.pending.push(url);
        true
    }
}
