//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait
//! and of the collaborator traits the crawl engine consumes.

use crate::config::SiteEntry;
use crate::crawler::EngineType;
use crate::state::CrawlMode;
use crate::storage::files::save_content;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{ContentPersister, OwnerCheck, Storage, StorageError, StorageResult};
use crate::storage::{
    FileMeta, FileRecord, KnowledgeBaseRecord, RunRecord, RunStatus, SiteRecord,
};
use crate::{ConfigError, HarvestError};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// SQLite storage backend
///
/// The connection sits behind a mutex so one handle can be shared by the
/// executor, the server, and the CLI.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Registers configured sites and their knowledge bases
    ///
    /// A knowledge base that does not exist yet is created and owned by the
    /// first site that names it.
    pub fn register_sites(&self, sites: &[SiteEntry]) -> StorageResult<()> {
        for entry in sites {
            if self.get_knowledge_base(entry.knowledge_base_id)?.is_none() {
                self.upsert_knowledge_base(&KnowledgeBaseRecord {
                    id: entry.knowledge_base_id,
                    owner_id: entry.owner_id,
                    name: format!("kb-{}", entry.knowledge_base_id),
                })?;
            }
            self.upsert_site(&SiteRecord::from(entry))?;
        }
        tracing::debug!("Registered {} site(s)", sites.len());
        Ok(())
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::Lock)
    }
}

fn to_json(values: &[String]) -> StorageResult<String> {
    serde_json::to_string(values).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn json_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

const FILE_COLUMNS: &str = "id, site_id, knowledge_base_id, owner_id, path, source_url, summary, size, created_at, updated_at";

fn file_from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(0)?,
        site_id: row.get(1)?,
        knowledge_base_id: row.get(2)?,
        owner_id: row.get(3)?,
        path: row.get(4)?,
        source_url: row.get(5)?,
        summary: row.get(6)?,
        size: row.get::<_, i64>(7)? as u64,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn query_file(
    conn: &Connection,
    site_id: Option<i64>,
    path: &str,
) -> StorageResult<Option<FileRecord>> {
    // `IS` so a missing site id matches NULL rows
    let sql = format!(
        "SELECT {} FROM files WHERE site_id IS ?1 AND path = ?2",
        FILE_COLUMNS
    );
    let record = conn
        .query_row(&sql, params![site_id, path], file_from_row)
        .optional()?;
    Ok(record)
}

const RUN_COLUMNS: &str =
    "id, site_id, mode, config_hash, started_at, finished_at, status, success_count, failed_count";

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        site_id: row.get(1)?,
        mode: row.get(2)?,
        config_hash: row.get(3)?,
        started_at: row.get(4)?,
        finished_at: row.get(5)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(6)?)
            .unwrap_or(RunStatus::Running),
        success_count: row.get::<_, i64>(7)? as u64,
        failed_count: row.get::<_, i64>(8)? as u64,
    })
}

impl Storage for SqliteStorage {
    // ===== Knowledge bases and sites =====

    fn upsert_knowledge_base(&self, kb: &KnowledgeBaseRecord) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO knowledge_bases (id, owner_id, name) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET owner_id = excluded.owner_id, name = excluded.name",
            params![kb.id, kb.owner_id, kb.name],
        )?;
        Ok(())
    }

    fn get_knowledge_base(&self, kb_id: i64) -> StorageResult<Option<KnowledgeBaseRecord>> {
        let conn = self.lock()?;
        let kb = conn
            .query_row(
                "SELECT id, owner_id, name FROM knowledge_bases WHERE id = ?1",
                params![kb_id],
                |row| {
                    Ok(KnowledgeBaseRecord {
                        id: row.get(0)?,
                        owner_id: row.get(1)?,
                        name: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(kb)
    }

    fn upsert_site(&self, site: &SiteRecord) -> StorageResult<()> {
        let start_urls = to_json(&site.start_urls)?;
        let match_patterns = to_json(&site.match_patterns)?;
        let ignore_patterns = to_json(&site.ignore_patterns)?;
        let remove_selectors = to_json(&site.remove_selectors)?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sites (id, knowledge_base_id, owner_id, name, start_urls, match_patterns,
                                ignore_patterns, remove_selectors, evaluate, file_suffix, engine_type)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(id) DO UPDATE SET
                knowledge_base_id = excluded.knowledge_base_id,
                owner_id = excluded.owner_id,
                name = excluded.name,
                start_urls = excluded.start_urls,
                match_patterns = excluded.match_patterns,
                ignore_patterns = excluded.ignore_patterns,
                remove_selectors = excluded.remove_selectors,
                evaluate = excluded.evaluate,
                file_suffix = excluded.file_suffix,
                engine_type = excluded.engine_type",
            params![
                site.id,
                site.knowledge_base_id,
                site.owner_id,
                site.name,
                start_urls,
                match_patterns,
                ignore_patterns,
                remove_selectors,
                site.evaluate,
                site.file_suffix,
                site.engine_type.as_str(),
            ],
        )?;
        Ok(())
    }

    fn get_site(&self, site_id: i64) -> StorageResult<Option<SiteRecord>> {
        let conn = self.lock()?;
        let site = conn
            .query_row(
                "SELECT id, knowledge_base_id, owner_id, name, start_urls, match_patterns,
                        ignore_patterns, remove_selectors, evaluate, file_suffix, engine_type
                 FROM sites WHERE id = ?1",
                params![site_id],
                |row| {
                    Ok(SiteRecord {
                        id: row.get(0)?,
                        knowledge_base_id: row.get(1)?,
                        owner_id: row.get(2)?,
                        name: row.get(3)?,
                        start_urls: json_column(row, 4)?,
                        match_patterns: json_column(row, 5)?,
                        ignore_patterns: json_column(row, 6)?,
                        remove_selectors: json_column(row, 7)?,
                        evaluate: row.get(8)?,
                        file_suffix: row.get(9)?,
                        engine_type: EngineType::from_db_string(&row.get::<_, String>(10)?)
                            .unwrap_or_default(),
                    })
                },
            )
            .optional()?;
        Ok(site)
    }

    // ===== Files =====

    fn upsert_file(
        &self,
        meta: &FileMeta,
        path: &str,
        kb_id: i64,
        owner_id: i64,
        site_id: Option<i64>,
    ) -> StorageResult<FileRecord> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;

        match query_file(&conn, site_id, path)? {
            Some(existing) => {
                conn.execute(
                    "UPDATE files SET source_url = ?1, summary = ?2, size = ?3, updated_at = ?4
                     WHERE id = ?5",
                    params![meta.source_url, meta.summary, meta.size as i64, now, existing.id],
                )?;
            }
            None => {
                conn.execute(
                    "INSERT INTO files (site_id, knowledge_base_id, owner_id, path, source_url,
                                        summary, size, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                    params![
                        site_id,
                        kb_id,
                        owner_id,
                        path,
                        meta.source_url,
                        meta.summary,
                        meta.size as i64,
                        now
                    ],
                )?;
            }
        }

        query_file(&conn, site_id, path)?
            .ok_or_else(|| StorageError::NotFound(format!("file {}", path)))
    }

    fn get_file(&self, site_id: Option<i64>, path: &str) -> StorageResult<Option<FileRecord>> {
        let conn = self.lock()?;
        query_file(&conn, site_id, path)
    }

    fn list_files(&self, site_id: i64) -> StorageResult<Vec<FileRecord>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM files WHERE site_id = ?1 ORDER BY id",
            FILE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let files = stmt
            .query_map(params![site_id], file_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(files)
    }

    // ===== Run history =====

    fn create_run(&self, site_id: i64, mode: CrawlMode, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO crawl_runs (site_id, mode, config_hash, started_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                site_id,
                mode.as_request_name(),
                config_hash,
                now,
                RunStatus::Running.to_db_string()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn finish_run(
        &self,
        run_id: i64,
        status: RunStatus,
        success_count: usize,
        failed_count: usize,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE crawl_runs SET status = ?1, finished_at = ?2, success_count = ?3, failed_count = ?4
             WHERE id = ?5",
            params![
                status.to_db_string(),
                now,
                success_count as i64,
                failed_count as i64,
                run_id
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::NotFound(format!("run {}", run_id)));
        }
        Ok(())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let conn = self.lock()?;
        let sql = format!("SELECT {} FROM crawl_runs WHERE id = ?1", RUN_COLUMNS);
        conn.query_row(&sql, params![run_id], run_from_row)
            .optional()?
            .ok_or_else(|| StorageError::NotFound(format!("run {}", run_id)))
    }

    fn get_latest_run(&self, site_id: i64) -> StorageResult<Option<RunRecord>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM crawl_runs WHERE site_id = ?1 ORDER BY id DESC LIMIT 1",
            RUN_COLUMNS
        );
        let run = conn
            .query_row(&sql, params![site_id], run_from_row)
            .optional()?;
        Ok(run)
    }
}

#[async_trait]
impl ContentPersister for SqliteStorage {
    async fn save(
        &self,
        root: &Path,
        site: &str,
        url: &str,
        content: &str,
        suffix: &str,
    ) -> StorageResult<PathBuf> {
        save_content(root, site, url, content, suffix).await
    }

    async fn upsert(
        &self,
        meta: &FileMeta,
        path: &str,
        kb_id: i64,
        owner_id: i64,
        site_id: Option<i64>,
    ) -> StorageResult<FileRecord> {
        self.upsert_file(meta, path, kb_id, owner_id, site_id)
    }

    async fn materialized_urls(&self, root: &Path, site: &SiteRecord) -> StorageResult<Vec<String>> {
        let files = self.list_files(site.id)?;
        let mut urls = Vec::with_capacity(files.len());
        for file in files {
            if tokio::fs::metadata(root.join(&file.path)).await.is_ok() {
                urls.push(file.source_url);
            }
        }
        Ok(urls)
    }
}

#[async_trait]
impl OwnerCheck for SqliteStorage {
    async fn authorize(
        &self,
        owner_id: i64,
        kb_id: i64,
        site_id: i64,
    ) -> Result<SiteRecord, HarvestError> {
        let kb = self
            .get_knowledge_base(kb_id)?
            .ok_or(ConfigError::KnowledgeBaseNotFound(kb_id))?;

        let site = self
            .get_site(site_id)?
            .filter(|site| site.knowledge_base_id == kb.id)
            .ok_or(ConfigError::SiteNotFound { kb_id, site_id })?;

        if kb.owner_id != owner_id || site.owner_id != owner_id {
            return Err(ConfigError::Unauthorized { owner_id, site_id }.into());
        }

        Ok(site)
    }
}
