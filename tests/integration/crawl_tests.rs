//! End-to-end crawl behavior with a scripted fetcher

use crate::support::{site_record, storage_with, ScriptedFetcher, Step, KB, OWNER, SITE};
use kb_harvest::config::CrawlConfig;
use kb_harvest::crawler::{CrawlOptions, Executor, Harvester, ProgressEvent};
use kb_harvest::state::{CrawlMode, Frontier, FrontierOptions};
use kb_harvest::storage::{RunStatus, SqliteStorage, Storage};
use kb_harvest::url::LinkFilter;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

async fn drain(mut rx: mpsc::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

fn full_frontier(seeds: &[&str], max_batch: usize, max_retries: u32) -> Frontier {
    Frontier::new(
        seeds.iter().map(|s| s.to_string()),
        FrontierOptions {
            max_retries,
            max_batch,
            mode: CrawlMode::Full,
            file_suffix: ".html".to_string(),
            allow_duplicate_retries: true,
        },
        Vec::new(),
        LinkFilter::allow_all(),
    )
    .unwrap()
}

fn executor(fetcher: Arc<ScriptedFetcher>, root: &TempDir, concurrency: usize) -> Executor {
    let site = site_record(&[]);
    let storage = Arc::new(storage_with(&site));
    Executor::new(
        fetcher,
        storage,
        site,
        CrawlOptions {
            concurrency,
            storage_root: root.path().to_path_buf(),
            fetch_timeout: Duration::from_secs(5),
            ..CrawlOptions::default()
        },
    )
}

fn harvester(fetcher: Arc<ScriptedFetcher>, storage: SqliteStorage, root: &TempDir) -> Harvester {
    Harvester::new(fetcher, Arc::new(storage), root.path(), Duration::from_secs(5))
}

fn options(crawl_type: &str) -> CrawlConfig {
    CrawlConfig {
        max_connections: 10,
        concurrency: 1,
        crawl_type: crawl_type.to_string(),
        ..CrawlConfig::default()
    }
}

#[tokio::test]
async fn test_example_scenario_event_sequence() {
    let u1 = "https://docs.example.com/u1";
    let u2 = "https://docs.example.com/u2";
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .links(u1, &[])
            .script(u2, vec![Step::Fail, Step::Links(vec![])]),
    );
    let root = TempDir::new().unwrap();

    let (rx, handle) = executor(fetcher, &root, 1).spawn(full_frontier(&[u1, u2], 10, 3));
    let events = drain(rx).await;
    handle.await.unwrap();

    let summary: Vec<(&str, bool, u32, usize, usize, bool)> = events
        .iter()
        .map(|e| {
            (
                e.url.as_str(),
                e.completed,
                e.retry_count,
                e.index,
                e.total,
                e.finished,
            )
        })
        .collect();

    assert_eq!(
        summary,
        vec![
            ("", false, 0, 0, 2, false),
            (u1, true, 0, 1, 2, false),
            (u2, false, 1, 2, 2, false),
            (u2, true, 0, 2, 2, false),
            ("", false, 0, 2, 2, true),
        ]
    );

    let terminal = events.last().unwrap();
    assert_eq!(
        terminal.success_urls,
        Some(vec![u1.to_string(), u2.to_string()])
    );
    assert_eq!(terminal.failed_urls, Some(vec![]));
    assert_eq!(terminal.cancelled, None);
}

#[tokio::test]
async fn test_always_failing_fetch_terminates() {
    let seeds = ["https://a.com/1", "https://a.com/2", "https://a.com/3"];
    let fetcher = Arc::new(ScriptedFetcher::new());
    let root = TempDir::new().unwrap();

    let (rx, handle) =
        executor(fetcher.clone(), &root, 2).spawn(full_frontier(&seeds, 10, 2));
    let events = drain(rx).await;
    let terminal = handle.await.unwrap();

    assert!(terminal.finished);
    let mut failed = terminal.failed_urls.clone().unwrap();
    failed.sort();
    assert_eq!(failed, seeds.to_vec());

    // every seed tried exactly max_retries times
    assert_eq!(fetcher.calls().len(), 6);
    assert!(events
        .iter()
        .filter(|e| !e.url.is_empty())
        .all(|e| !e.completed && e.retry_count <= 2));
}

#[tokio::test]
async fn test_discovery_is_bounded_and_index_is_stable() {
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .links(
                "https://a.com/",
                &["https://a.com/1", "https://a.com/2", "https://a.com/3", "https://a.com/"],
            )
            .links("https://a.com/1", &["https://a.com/4", "https://a.com/2"])
            .links("https://a.com/2", &[]),
    );
    let root = TempDir::new().unwrap();

    let (rx, handle) =
        executor(fetcher.clone(), &root, 3).spawn(full_frontier(&["https://a.com/"], 3, 3));
    let events = drain(rx).await;
    let terminal = handle.await.unwrap();

    // the run never dispatches more than max_batch distinct URLs fresh
    let mut fetched = fetcher.calls();
    fetched.sort();
    fetched.dedup();
    assert_eq!(fetched, vec!["https://a.com/", "https://a.com/1", "https://a.com/2"]);

    for event in events.iter().filter(|e| !e.url.is_empty()) {
        let expected = match event.url.as_str() {
            "https://a.com/" => 1,
            "https://a.com/1" => 2,
            "https://a.com/2" => 3,
            other => panic!("unexpected url {}", other),
        };
        assert_eq!(event.index, expected);
        assert!(event.total <= 3);
    }
    assert_eq!(terminal.total, 3);
}

#[tokio::test]
async fn test_match_and_ignore_patterns_limit_discovery() {
    let mut site = site_record(&["https://docs.example.com/"]);
    site.match_patterns = vec!["https://docs.example.com/**".to_string()];
    site.ignore_patterns = vec!["**/private/**".to_string()];

    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .links(
                "https://docs.example.com/",
                &[
                    "https://docs.example.com/guide",
                    "https://docs.example.com/private/keys",
                    "https://blog.example.com/post",
                ],
            )
            .links("https://docs.example.com/guide", &[]),
    );
    let root = TempDir::new().unwrap();
    let harvester = harvester(fetcher.clone(), storage_with(&site), &root);

    let mut handle = harvester
        .start_crawl(OWNER, KB, SITE, &options("all"), CancellationToken::new())
        .await
        .unwrap();
    while handle.events.recv().await.is_some() {}
    let terminal = handle.task.await.unwrap();

    assert_eq!(
        terminal.success_urls,
        Some(vec![
            "https://docs.example.com/".to_string(),
            "https://docs.example.com/guide".to_string()
        ])
    );
    assert_eq!(fetcher.calls().len(), 2);
}

#[tokio::test]
async fn test_incremental_skips_materialized_urls() {
    let site = site_record(&["https://a.com/"]);
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .links("https://a.com/", &["https://a.com/b", "https://a.com/c"])
            .links("https://a.com/b", &[])
            .links("https://a.com/c", &[]),
    );
    let root = TempDir::new().unwrap();
    let harvester = harvester(fetcher.clone(), storage_with(&site), &root);

    // full run materializes everything
    let mut first = harvester
        .start_crawl(OWNER, KB, SITE, &options("all"), CancellationToken::new())
        .await
        .unwrap();
    while first.events.recv().await.is_some() {}
    first.task.await.unwrap();
    assert_eq!(fetcher.calls().len(), 3);
    assert_eq!(harvester.storage().list_files(SITE).unwrap().len(), 3);

    // seeds are always fetched, discovered materialized URLs are not
    let mut second = harvester
        .start_crawl(OWNER, KB, SITE, &options("incremental"), CancellationToken::new())
        .await
        .unwrap();
    while second.events.recv().await.is_some() {}
    let terminal = second.task.await.unwrap();
    assert_eq!(terminal.success_urls, Some(vec!["https://a.com/".to_string()]));
    assert_eq!(fetcher.calls().len(), 4);

    // a file removed from disk is no longer materialized
    let b = harvester
        .storage()
        .list_files(SITE)
        .unwrap()
        .into_iter()
        .find(|f| f.source_url == "https://a.com/b")
        .unwrap();
    std::fs::remove_file(root.path().join(&b.path)).unwrap();

    let mut third = harvester
        .start_crawl(OWNER, KB, SITE, &options("incremental"), CancellationToken::new())
        .await
        .unwrap();
    while third.events.recv().await.is_some() {}
    let terminal = third.task.await.unwrap();
    assert_eq!(
        terminal.success_urls,
        Some(vec!["https://a.com/".to_string(), "https://a.com/b".to_string()])
    );

    let run = harvester.storage().get_run(third.run_id).unwrap();
    assert_eq!(run.mode, "incremental");
    assert_eq!(run.status, RunStatus::Completed);
}

#[tokio::test]
async fn test_cancellation_settles_in_flight_and_reports() {
    let seeds: Vec<String> = (0..5).map(|i| format!("https://a.com/{}", i)).collect();
    let mut fetcher = ScriptedFetcher::new().with_delay(Duration::from_millis(50));
    for seed in &seeds {
        fetcher = fetcher.links(seed, &[]);
    }
    let fetcher = Arc::new(fetcher);

    let site = site_record(&seeds.iter().map(String::as_str).collect::<Vec<_>>());
    let root = TempDir::new().unwrap();
    let harvester = harvester(fetcher.clone(), storage_with(&site), &root);

    let cancel = CancellationToken::new();
    let mut handle = harvester
        .start_crawl(OWNER, KB, SITE, &options("all"), cancel.clone())
        .await
        .unwrap();

    let mut events = Vec::new();
    while let Some(event) = handle.events.recv().await {
        if !event.url.is_empty() && events.iter().all(|e: &ProgressEvent| e.url.is_empty()) {
            cancel.cancel();
        }
        events.push(event);
    }
    let terminal = handle.task.await.unwrap();

    assert_eq!(terminal.cancelled, Some(true));
    assert!(terminal.finished);
    assert!(fetcher.calls().len() < seeds.len());
    assert_eq!(
        terminal.success_urls.as_ref().map(Vec::len),
        Some(fetcher.calls().len())
    );

    // every dispatched fetch settled before the terminal event
    let settled = events.iter().filter(|e| !e.url.is_empty()).count();
    assert_eq!(settled, fetcher.calls().len());

    let run = harvester.storage().get_run(handle.run_id).unwrap();
    assert_eq!(run.status, RunStatus::Cancelled);
}

#[tokio::test]
async fn test_persistence_failure_is_retried() {
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .links("https://a.com/", &["https://a.com/ok"])
            .links("https://a.com/ok", &[]),
    );
    let root = TempDir::new().unwrap();
    // the site directory is a file, so every write under it fails
    std::fs::write(root.path().join("docs"), b"not a directory").unwrap();

    let (rx, handle) =
        executor(fetcher.clone(), &root, 1).spawn(full_frontier(&["https://a.com/"], 10, 2));
    let events = drain(rx).await;
    let terminal = handle.await.unwrap();

    assert_eq!(terminal.failed_urls, Some(vec!["https://a.com/".to_string()]));
    assert_eq!(fetcher.calls().len(), 2);
    assert!(events.iter().filter(|e| !e.url.is_empty()).all(|e| !e.completed));
}

#[tokio::test]
async fn test_unknown_site_fails_before_streaming() {
    let site = site_record(&["https://a.com/"]);
    let root = TempDir::new().unwrap();
    let harvester = harvester(Arc::new(ScriptedFetcher::new()), storage_with(&site), &root);

    let result = harvester
        .start_crawl(OWNER, KB, 404, &options("all"), CancellationToken::new())
        .await;
    assert!(result.is_err());
    assert!(harvester.storage().get_latest_run(404).unwrap().is_none());
}
