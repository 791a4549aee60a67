//! Shared fixtures for the integration tests

use async_trait::async_trait;
use kb_harvest::crawler::{EngineType, ExtractionRules, FetchError, FetchedPage, PageFetcher};
use kb_harvest::storage::{KnowledgeBaseRecord, SiteRecord, SqliteStorage, Storage};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// What the scripted fetcher does for one attempt
#[derive(Debug, Clone)]
pub enum Step {
    /// Succeed with these links
    Links(Vec<String>),
    /// Fail the attempt
    Fail,
}

/// Fetcher replaying a per-URL script
///
/// Each URL consumes its steps in order; once a script runs dry the last
/// step repeats. Unscripted URLs fail.
#[derive(Default)]
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn script(self, url: &str, steps: Vec<Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), steps.into());
        self
    }

    pub fn links(self, url: &str, links: &[&str]) -> Self {
        let links = links.iter().map(|s| s.to_string()).collect();
        self.script(url, vec![Step::Links(links)])
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn next_step(&self, url: &str) -> Step {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(url) {
            Some(steps) if steps.len() > 1 => steps.pop_front().unwrap(),
            Some(steps) => steps.front().cloned().unwrap_or(Step::Fail),
            None => Step::Fail,
        }
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str, _rules: &ExtractionRules) -> Result<FetchedPage, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        let step = self.next_step(url);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match step {
            Step::Links(links) => Ok(FetchedPage {
                links,
                content: format!("<html><body>{}</body></html>", url),
                title: Some(url.to_string()),
            }),
            Step::Fail => Err(FetchError::Navigation {
                url: url.to_string(),
                message: "scripted failure".to_string(),
            }),
        }
    }
}

pub const OWNER: i64 = 11;
pub const KB: i64 = 1;
pub const SITE: i64 = 2;

pub fn site_record(start_urls: &[&str]) -> SiteRecord {
    SiteRecord {
        id: SITE,
        knowledge_base_id: KB,
        owner_id: OWNER,
        name: "docs".to_string(),
        start_urls: start_urls.iter().map(|s| s.to_string()).collect(),
        match_patterns: vec![],
        ignore_patterns: vec![],
        remove_selectors: vec![],
        evaluate: None,
        file_suffix: ".html".to_string(),
        engine_type: EngineType::Http,
    }
}

/// In-memory storage holding one knowledge base and `site`
pub fn storage_with(site: &SiteRecord) -> SqliteStorage {
    let storage = SqliteStorage::new_in_memory().unwrap();
    storage
        .upsert_knowledge_base(&KnowledgeBaseRecord {
            id: site.knowledge_base_id,
            owner_id: site.owner_id,
            name: "kb".to_string(),
        })
        .unwrap();
    storage.upsert_site(site).unwrap();
    storage
}
