//! Storage module for persisting crawl output
//!
//! This module handles:
//! - Writing fetched content to deterministic per-site paths
//! - SQLite-backed file records keyed by `(site, path)`
//! - Knowledge base and site records used by the owner check
//! - Crawl run history

mod files;
mod schema;
mod sqlite;
mod traits;

pub use files::save_content;
pub use sqlite::SqliteStorage;
pub use traits::{ContentPersister, OwnerCheck, Storage, StorageError, StorageResult};

use crate::config::SiteEntry;
use crate::crawler::{EngineType, ExtractionRules};

/// A knowledge base and its owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeBaseRecord {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
}

/// A crawlable site and its rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteRecord {
    pub id: i64,
    pub knowledge_base_id: i64,
    pub owner_id: i64,
    pub name: String,
    pub start_urls: Vec<String>,
    pub match_patterns: Vec<String>,
    pub ignore_patterns: Vec<String>,
    pub remove_selectors: Vec<String>,
    pub evaluate: Option<String>,
    pub file_suffix: String,
    pub engine_type: EngineType,
}

impl SiteRecord {
    /// Extraction rules for this site combined with a run's link selector
    pub fn extraction_rules(&self, link_selector: &str) -> ExtractionRules {
        ExtractionRules {
            engine_type: self.engine_type,
            link_selector: link_selector.to_string(),
            remove_selectors: self.remove_selectors.clone(),
            evaluate: self.evaluate.clone(),
        }
    }
}

impl From<&SiteEntry> for SiteRecord {
    fn from(entry: &SiteEntry) -> Self {
        Self {
            id: entry.id,
            knowledge_base_id: entry.knowledge_base_id,
            owner_id: entry.owner_id,
            name: entry.name.clone(),
            start_urls: entry.start_urls.clone(),
            match_patterns: entry.match_patterns.clone(),
            ignore_patterns: entry.ignore_patterns.clone(),
            remove_selectors: entry.remove_selectors.clone(),
            evaluate: entry.evaluate.clone(),
            file_suffix: entry.file_suffix.clone(),
            engine_type: entry.engine_type,
        }
    }
}

/// What the persister knows about a freshly fetched page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub source_url: String,
    pub summary: String,
    pub size: u64,
}

/// A persisted file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub id: i64,
    pub site_id: Option<i64>,
    pub knowledge_base_id: i64,
    pub owner_id: i64,
    /// Path relative to the storage root
    pub path: String,
    pub source_url: String,
    pub summary: String,
    pub size: u64,
    pub created_at: String,
    pub updated_at: String,
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub site_id: i64,
    pub mode: String,
    pub config_hash: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub status: RunStatus,
    pub success_count: u64,
    pub failed_count: u64,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
