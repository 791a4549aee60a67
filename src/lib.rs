//! kb-harvest: crawl orchestration engine for knowledge-base sites
//!
//! This crate discovers, fetches and persists a bounded, deduplicated,
//! retry-aware set of pages for a site, streaming progress events to the
//! caller while the run is in flight.

pub mod config;
pub mod crawler;
pub mod output;
pub mod server;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for kb-harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("Fetch for {url} exceeded {secs}s")]
    Timeout { url: String, secs: u64 },

    #[error("Fetch task for {url} did not complete: {message}")]
    TaskAborted { url: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
///
/// These are the only errors that can abort a crawl, and they are always
/// raised before the crawl loop starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("Caller {owner_id} is not allowed to crawl site {site_id}")]
    Unauthorized { owner_id: i64, site_id: i64 },

    #[error("Site {site_id} not found in knowledge base {kb_id}")]
    SiteNotFound { kb_id: i64, site_id: i64 },

    #[error("Knowledge base {0} not found")]
    KnowledgeBaseNotFound(i64),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for kb-harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlOptions, Executor, ProgressEvent};
pub use state::{CrawlMode, Frontier, FrontierOptions, RunPhase};
