//! Per-run crawl state
//!
//! # Components
//!
//! - `Frontier`: URLs to visit, their dispatch cursor and retry counters
//! - `RunPhase`: where a run stands (running, draining retries, done)
//! - `CrawlMode`: full or incremental crawl

mod frontier;
mod run_phase;

// Re-export main types
pub use frontier::{CrawlMode, Frontier, FrontierOptions};
pub use run_phase::RunPhase;
