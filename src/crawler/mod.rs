//! Crawler module for page fetching and crawl execution
//!
//! This module contains the core crawling logic, including:
//! - The page-fetch contract and its HTTP implementation
//! - HTML parsing, link extraction and content selection
//! - The executor driving a frontier to completion
//! - Progress events streamed to callers
//! - Coordination of owner checks, run records and executors

mod coordinator;
mod events;
mod executor;
mod fetcher;
mod parser;

pub use coordinator::{CrawlHandle, Harvester};
pub use events::ProgressEvent;
pub use executor::{CrawlOptions, Executor, EVENT_CHANNEL_CAPACITY};
pub use fetcher::{
    build_http_client, EngineType, ExtractionRules, FetchError, FetchedPage, HttpPageFetcher,
    PageFetcher,
};
pub use parser::extract_page;
