use crate::crawler::EngineType;
use serde::Deserialize;

/// Main configuration structure for kb-harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default, rename = "site")]
    pub sites: Vec<SiteEntry>,
}

/// Where crawled content and file records live
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root directory; each site writes under `<root>/<site name>/`
    pub root: String,

    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// HTTP page fetcher settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FetcherConfig {
    /// User-Agent header sent with every request
    pub user_agent: String,

    /// Hard bound on a single navigation (seconds)
    pub navigation_timeout_secs: u64,

    /// Ceiling on a whole fetch including body download and extraction
    /// (seconds)
    pub operation_timeout_secs: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("kb-harvest/{}", env!("CARGO_PKG_VERSION")),
            navigation_timeout_secs: 30,
            operation_timeout_secs: 120,
        }
    }
}

/// Default run options for CLI-driven crawls
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlConfig {
    /// Maximum number of URLs the run will consider (1..=1000)
    pub max_connections: u32,

    /// Simultaneous in-flight fetches (1..=5)
    pub concurrency: u32,

    /// CSS selector for links to follow
    #[serde(default = "default_link_selector")]
    pub link_selector: String,

    /// `"all"` or `"incremental"`
    #[serde(rename = "type", default = "default_crawl_type")]
    pub crawl_type: String,

    /// Per-URL retry ceiling
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Whether a URL may appear in both the fresh and retry slice of a batch
    #[serde(default = "default_true")]
    pub allow_duplicate_retries: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_connections: 100,
            concurrency: 3,
            link_selector: default_link_selector(),
            crawl_type: default_crawl_type(),
            max_retries: default_max_retries(),
            allow_duplicate_retries: true,
        }
    }
}

/// Streaming endpoint settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

/// A site declared in the configuration file
///
/// Sites are registered in the database on startup so the owner check can
/// resolve them.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SiteEntry {
    pub id: i64,

    /// Directory name under the storage root
    pub name: String,

    pub knowledge_base_id: i64,

    pub owner_id: i64,

    /// Seed URLs
    pub start_urls: Vec<String>,

    /// Glob patterns a discovered URL must match (any of)
    #[serde(default)]
    pub match_patterns: Vec<String>,

    /// Glob patterns that exclude a discovered URL
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// CSS selectors removed before content extraction
    #[serde(default)]
    pub remove_selectors: Vec<String>,

    /// Custom extraction rule
    #[serde(default)]
    pub evaluate: Option<String>,

    /// Suffix appended to saved file names (e.g. ".html")
    #[serde(default)]
    pub file_suffix: String,

    #[serde(default)]
    pub engine_type: EngineType,
}

fn default_link_selector() -> String {
    "a[href]".to_string()
}

fn default_crawl_type() -> String {
    "all".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_true() -> bool {
    true
}
