//! Progress events streamed to the caller during a crawl

use serde::{Deserialize, Serialize};

/// One progress update
///
/// A run emits one initial event, one event per settled URL attempt, and
/// exactly one terminal event with `finished = true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// URL this event refers to; empty for the initial and terminal events
    pub url: String,

    /// Whether the URL was fetched and persisted
    pub completed: bool,

    /// Failed attempts recorded for the URL so far
    pub retry_count: u32,

    /// Set only on the terminal event
    pub finished: bool,

    /// Progress denominator
    pub total: usize,

    /// 1-based position of the URL in discovery order
    pub index: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_urls: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_urls: Option<Vec<String>>,

    /// Present only on a terminal event produced by cancellation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled: Option<bool>,
}

impl ProgressEvent {
    /// Connection-alive event sent before the first batch
    pub fn started(total: usize) -> Self {
        Self {
            url: String::new(),
            completed: false,
            retry_count: 0,
            finished: false,
            total,
            index: 0,
            success_urls: None,
            failed_urls: None,
            cancelled: None,
        }
    }

    /// Outcome of one URL attempt
    pub fn page(url: &str, completed: bool, retry_count: u32, index: usize, total: usize) -> Self {
        Self {
            url: url.to_string(),
            completed,
            retry_count,
            index,
            total,
            ..Self::started(total)
        }
    }

    /// Terminal event carrying the final success and failure sets
    pub fn finished(total: usize, success_urls: Vec<String>, failed_urls: Vec<String>) -> Self {
        Self {
            finished: true,
            index: total,
            success_urls: Some(success_urls),
            failed_urls: Some(failed_urls),
            ..Self::started(total)
        }
    }

    /// Terminal event for a run stopped before the frontier drained
    pub fn cancelled(total: usize, success_urls: Vec<String>, failed_urls: Vec<String>) -> Self {
        Self {
            cancelled: Some(true),
            ..Self::finished(total, success_urls, failed_urls)
        }
    }

    /// Single event answering a one-URL refresh
    pub fn refreshed(url: &str, completed: bool) -> Self {
        let (success_urls, failed_urls) = if completed {
            (vec![url.to_string()], Vec::new())
        } else {
            (Vec::new(), vec![url.to_string()])
        };
        Self {
            url: url.to_string(),
            completed,
            ..Self::finished(1, success_urls, failed_urls)
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.finished
    }
}
