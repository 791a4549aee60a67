//! Output module for run reports
//!
//! This module handles:
//! - Collecting a finished run's record and terminal event into a summary
//! - Rendering that summary as markdown

mod markdown;

pub use markdown::{format_markdown_summary, write_markdown_summary};

use crate::crawler::ProgressEvent;
use crate::storage::{RunRecord, SiteRecord};
use chrono::{DateTime, Utc};

/// Everything a run report shows
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: i64,
    pub site_name: String,
    pub mode: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub duration_seconds: Option<u64>,
    pub status: String,
    pub config_hash: String,
    pub total: usize,
    /// URLs dispatched at least once
    pub dispatched_urls: Vec<String>,
    /// URLs still failing when the run ended
    pub failed_urls: Vec<String>,
    pub cancelled: bool,
}

impl RunSummary {
    /// Builds a summary from the stored run and its terminal event
    pub fn from_run(run: &RunRecord, site: &SiteRecord, terminal: &ProgressEvent) -> Self {
        let duration_seconds = match (
            run.started_at.parse::<DateTime<Utc>>(),
            run.finished_at.as_deref().map(str::parse::<DateTime<Utc>>),
        ) {
            (Ok(started), Some(Ok(finished))) => {
                Some((finished - started).num_seconds().max(0) as u64)
            }
            _ => None,
        };

        Self {
            run_id: run.id,
            site_name: site.name.clone(),
            mode: run.mode.clone(),
            started_at: run.started_at.clone(),
            finished_at: run.finished_at.clone(),
            duration_seconds,
            status: run.status.to_db_string().to_string(),
            config_hash: run.config_hash.clone(),
            total: terminal.total,
            dispatched_urls: terminal.success_urls.clone().unwrap_or_default(),
            failed_urls: terminal.failed_urls.clone().unwrap_or_default(),
            cancelled: terminal.cancelled.unwrap_or(false),
        }
    }

    /// Dispatched URLs that are not failing
    pub fn succeeded_urls(&self) -> Vec<&str> {
        self.dispatched_urls
            .iter()
            .filter(|url| !self.failed_urls.contains(*url))
            .map(String::as_str)
            .collect()
    }

    /// Calculates the success rate as a percentage of dispatched URLs
    pub fn success_rate(&self) -> f64 {
        if self.dispatched_urls.is_empty() {
            return 0.0;
        }
        (self.succeeded_urls().len() as f64 / self.dispatched_urls.len() as f64) * 100.0
    }
}
