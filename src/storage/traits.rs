//! Storage traits and error types
//!
//! This module defines the collaborator interfaces the crawl engine consumes
//! (content persistence and the owner check) and the record-level storage
//! interface behind them.

use crate::state::CrawlMode;
use crate::storage::{
    FileMeta, FileRecord, KnowledgeBaseRecord, RunRecord, RunStatus, SiteRecord,
};
use crate::{HarvestError, UrlError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Cannot derive a path: {0}")]
    Path(#[from] UrlError),

    #[error("Storage lock poisoned")]
    Lock,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Content persistence collaborator
///
/// Writes are keyed by a path derived from the URL, so concurrent writes for
/// distinct URLs of the same site never collide.
#[async_trait]
pub trait ContentPersister: Send + Sync {
    /// Writes `content` under `<root>/<site>/` and returns the local path
    async fn save(
        &self,
        root: &Path,
        site: &str,
        url: &str,
        content: &str,
        suffix: &str,
    ) -> StorageResult<PathBuf>;

    /// Creates the file record for `(site_id, path)` or updates its
    /// summary and source fields
    async fn upsert(
        &self,
        meta: &FileMeta,
        path: &str,
        kb_id: i64,
        owner_id: i64,
        site_id: Option<i64>,
    ) -> StorageResult<FileRecord>;

    /// Source URLs of the site's files that are still present on disk
    async fn materialized_urls(&self, root: &Path, site: &SiteRecord) -> StorageResult<Vec<String>>;
}

/// Owner/authorization collaborator, consulted once before a crawl starts
#[async_trait]
pub trait OwnerCheck: Send + Sync {
    /// Resolves the site if `owner_id` may crawl it
    ///
    /// Fails with a configuration error when the knowledge base or site does
    /// not exist or belongs to someone else.
    async fn authorize(&self, owner_id: i64, kb_id: i64, site_id: i64)
        -> Result<SiteRecord, HarvestError>;
}

/// Record-level storage backend
pub trait Storage {
    // ===== Knowledge bases and sites =====

    /// Inserts or replaces a knowledge base
    fn upsert_knowledge_base(&self, kb: &KnowledgeBaseRecord) -> StorageResult<()>;

    fn get_knowledge_base(&self, kb_id: i64) -> StorageResult<Option<KnowledgeBaseRecord>>;

    /// Inserts or replaces a site and its rules
    fn upsert_site(&self, site: &SiteRecord) -> StorageResult<()>;

    fn get_site(&self, site_id: i64) -> StorageResult<Option<SiteRecord>>;

    // ===== Files =====

    /// Creates or updates the file record keyed by `(site_id, path)`
    fn upsert_file(
        &self,
        meta: &FileMeta,
        path: &str,
        kb_id: i64,
        owner_id: i64,
        site_id: Option<i64>,
    ) -> StorageResult<FileRecord>;

    fn get_file(&self, site_id: Option<i64>, path: &str) -> StorageResult<Option<FileRecord>>;

    fn list_files(&self, site_id: i64) -> StorageResult<Vec<FileRecord>>;

    // ===== Run history =====

    fn create_run(&self, site_id: i64, mode: CrawlMode, config_hash: &str) -> StorageResult<i64>;

    /// Marks a run finished with its final counts
    fn finish_run(
        &self,
        run_id: i64,
        status: RunStatus,
        success_count: usize,
        failed_count: usize,
    ) -> StorageResult<()>;

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    fn get_latest_run(&self, site_id: i64) -> StorageResult<Option<RunRecord>>;
}
