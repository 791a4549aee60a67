//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the kb-harvest database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Knowledge bases and their owners
CREATE TABLE IF NOT EXISTS knowledge_bases (
    id INTEGER PRIMARY KEY,
    owner_id INTEGER NOT NULL,
    name TEXT NOT NULL
);

-- Sites and their crawl rules
CREATE TABLE IF NOT EXISTS sites (
    id INTEGER PRIMARY KEY,
    knowledge_base_id INTEGER NOT NULL REFERENCES knowledge_bases(id),
    owner_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    start_urls TEXT NOT NULL,
    match_patterns TEXT NOT NULL,
    ignore_patterns TEXT NOT NULL,
    remove_selectors TEXT NOT NULL,
    evaluate TEXT,
    file_suffix TEXT NOT NULL DEFAULT '',
    engine_type TEXT NOT NULL DEFAULT 'http'
);

CREATE INDEX IF NOT EXISTS idx_sites_kb ON sites(knowledge_base_id);

-- Files written by crawls, one per (site, path)
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    site_id INTEGER REFERENCES sites(id),
    knowledge_base_id INTEGER NOT NULL,
    owner_id INTEGER NOT NULL,
    path TEXT NOT NULL,
    source_url TEXT NOT NULL,
    summary TEXT NOT NULL,
    size INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(site_id, path)
);

CREATE INDEX IF NOT EXISTS idx_files_site ON files(site_id);
CREATE INDEX IF NOT EXISTS idx_files_source_url ON files(source_url);

-- Crawl run history
CREATE TABLE IF NOT EXISTS crawl_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    site_id INTEGER NOT NULL REFERENCES sites(id),
    mode TEXT NOT NULL,
    config_hash TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    status TEXT NOT NULL,
    success_count INTEGER NOT NULL DEFAULT 0,
    failed_count INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_crawl_runs_site ON crawl_runs(site_id);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
