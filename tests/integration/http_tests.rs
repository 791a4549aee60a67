//! Full crawls over HTTP against wiremock servers

use crate::support::{site_record, storage_with, KB, OWNER, SITE};
use kb_harvest::config::{CrawlConfig, FetcherConfig};
use kb_harvest::crawler::{Harvester, HttpPageFetcher};
use kb_harvest::storage::Storage;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html")
        .set_body_raw(body.to_string(), "text/html")
}

fn fetcher() -> HttpPageFetcher {
    HttpPageFetcher::new(&FetcherConfig {
        user_agent: "TestHarvester/1.0".to_string(),
        navigation_timeout_secs: 5,
        operation_timeout_secs: 10,
    })
    .expect("Failed to build fetcher")
}

#[tokio::test]
async fn test_full_crawl_single_site() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(&format!(
            r#"<html><head><title>Home</title></head><body>
            <nav><a href="{0}/page1">Page 1</a></nav>
            <a href="/page2#section">Page 2</a>
            <a href="{0}/private/admin">Admin</a>
            <a href="https://elsewhere.example.org/">Away</a>
            <main>Welcome home</main>
            </body></html>"#,
            base_url
        )))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/page1"))
        .respond_with(html(
            r#"<html><head><title>Page 1</title></head><body><a href="/">Home</a>Content 1</body></html>"#,
        ))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/page2"))
        .respond_with(html(
            r#"<html><head><title>Page 2</title></head><body>Content 2</body></html>"#,
        ))
        .mount(&mock_server)
        .await;

    let seed = format!("{}/", base_url);
    let mut site = site_record(&[seed.as_str()]);
    site.match_patterns = vec![format!("{}/**", base_url)];
    site.ignore_patterns = vec!["**/private/**".to_string()];
    site.remove_selectors = vec!["nav".to_string()];

    let root = TempDir::new().unwrap();
    let harvester = Harvester::new(
        Arc::new(fetcher()),
        Arc::new(storage_with(&site)),
        root.path(),
        Duration::from_secs(10),
    );

    let options = CrawlConfig {
        max_connections: 10,
        concurrency: 2,
        ..CrawlConfig::default()
    };
    let mut handle = harvester
        .start_crawl(OWNER, KB, SITE, &options, CancellationToken::new())
        .await
        .expect("Failed to start crawl");

    let mut events = Vec::new();
    while let Some(event) = handle.events.recv().await {
        events.push(event);
    }
    let terminal = handle.task.await.unwrap();

    assert!(terminal.finished);
    assert_eq!(terminal.total, 3);
    assert_eq!(terminal.failed_urls, Some(vec![]));
    assert_eq!(events.len(), 5);

    let files = harvester.storage().list_files(SITE).unwrap();
    assert_eq!(files.len(), 3);

    let home = files.iter().find(|f| f.source_url == seed).unwrap();
    assert_eq!(home.summary, "Home");
    assert!(home.path.ends_with("index.html"));

    let saved = std::fs::read_to_string(root.path().join(&home.path)).unwrap();
    assert!(saved.contains("Welcome home"));
    assert!(!saved.contains("<nav>"), "removed selectors must not be saved");

    // fragment stripped from the discovered link
    assert!(files
        .iter()
        .any(|f| f.source_url == format!("{}/page2", base_url)));
}

#[tokio::test]
async fn test_http_failures_are_retried_then_reported() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<html><body><a href="/broken">Broken</a></body></html>"#))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&mock_server)
        .await;

    let seed = format!("{}/", base_url);
    let site = site_record(&[seed.as_str()]);
    let root = TempDir::new().unwrap();
    let harvester = Harvester::new(
        Arc::new(fetcher()),
        Arc::new(storage_with(&site)),
        root.path(),
        Duration::from_secs(10),
    );

    let options = CrawlConfig {
        max_connections: 10,
        concurrency: 1,
        max_retries: 2,
        ..CrawlConfig::default()
    };
    let mut handle = harvester
        .start_crawl(OWNER, KB, SITE, &options, CancellationToken::new())
        .await
        .unwrap();
    while handle.events.recv().await.is_some() {}
    let terminal = handle.task.await.unwrap();

    assert_eq!(
        terminal.failed_urls,
        Some(vec![format!("{}/broken", base_url)])
    );
    assert_eq!(harvester.storage().list_files(SITE).unwrap().len(), 1);
}

#[tokio::test]
async fn test_refresh_over_http() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/doc"))
        .respond_with(html(
            r#"<html><head><title>Doc</title></head><body>Refreshed</body></html>"#,
        ))
        .mount(&mock_server)
        .await;

    let site = site_record(&[]);
    let root = TempDir::new().unwrap();
    let harvester = Harvester::new(
        Arc::new(fetcher()),
        Arc::new(storage_with(&site)),
        root.path(),
        Duration::from_secs(10),
    );

    let url = format!("{}/doc", mock_server.uri());
    let event = harvester
        .refresh(OWNER, KB, SITE, &url, "a[href]")
        .await
        .unwrap();

    assert!(event.completed);
    assert_eq!((event.total, event.index), (1, 1));

    let files = harvester.storage().list_files(SITE).unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].summary, "Doc");
}
