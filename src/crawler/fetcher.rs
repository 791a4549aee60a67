//! Page fetching
//!
//! This module defines the page-fetch contract the executor consumes and a
//! plain-HTTP implementation of it:
//! - Building HTTP clients with the configured user agent and timeouts
//! - GET requests with status and Content-Type checks
//! - Link and content extraction using the site's rules
//! - An outer ceiling so a stuck fetch resolves as a failure

use crate::config::FetcherConfig;
use crate::crawler::parser::extract_page;
use crate::UrlError;
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Page engine requested by a site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineType {
    /// Plain HTTP GET and static HTML extraction
    #[default]
    Http,
    /// Headless browser navigation
    Browser,
}

impl EngineType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Browser => "browser",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "http" => Some(Self::Http),
            "browser" => Some(Self::Browser),
            _ => None,
        }
    }
}

impl fmt::Display for EngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors a single fetch can end with
///
/// All of these are recoverable from the executor's point of view: the URL
/// is retried until its ceiling.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Navigation to {url} timed out after {secs}s")]
    Timeout { url: String, secs: u64 },

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Expected HTML from {url}, got {content_type}")]
    ContentMismatch { url: String, content_type: String },

    #[error("Engine '{0}' is not supported by this fetcher")]
    UnsupportedEngine(EngineType),

    #[error("Extraction rule failed on {url}: {message}")]
    Script { url: String, message: String },

    #[error("Invalid selector '{0}'")]
    InvalidSelector(String),

    #[error("Navigation failed for {url}: {message}")]
    Navigation { url: String, message: String },

    #[error("URL error: {0}")]
    Url(#[from] UrlError),
}

/// Site-specific extraction rules handed to the fetcher with every URL
#[derive(Debug, Clone, Default)]
pub struct ExtractionRules {
    pub engine_type: EngineType,

    /// CSS selector for links to follow
    pub link_selector: String,

    /// CSS selectors removed before content extraction
    pub remove_selectors: Vec<String>,

    /// Custom extraction rule; for the HTTP engine a CSS selector choosing
    /// the content root
    pub evaluate: Option<String>,
}

/// What a fetch returns
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedPage {
    /// Absolute, fragment-free links in document order, deduplicated
    pub links: Vec<String>,

    /// Extracted content
    pub content: String,

    /// Page title, when the engine can tell
    pub title: Option<String>,
}

/// Page-fetch provider
///
/// Implementations enforce their own navigation timeout, resolve relative
/// links to absolute URLs, and strip fragments before returning them.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, rules: &ExtractionRules) -> Result<FetchedPage, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Example
///
/// ```no_run
/// use kb_harvest::config::FetcherConfig;
/// use kb_harvest::crawler::build_http_client;
///
/// let client = build_http_client(&FetcherConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &FetcherConfig) -> Result<Client, reqwest::Error> {
    let navigation = Duration::from_secs(config.navigation_timeout_secs);

    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(navigation)
        .connect_timeout(navigation.min(Duration::from_secs(10)))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches pages with a plain HTTP GET
pub struct HttpPageFetcher {
    client: Client,
    navigation_timeout: Duration,
    operation_timeout: Duration,
}

impl HttpPageFetcher {
    pub fn new(config: &FetcherConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
            navigation_timeout: Duration::from_secs(config.navigation_timeout_secs),
            operation_timeout: Duration::from_secs(config.operation_timeout_secs),
        })
    }

    async fn fetch_html(&self, url: &str) -> Result<(String, String), FetchError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                    secs: self.navigation_timeout.as_secs(),
                }
            } else {
                FetchError::Http {
                    url: url.to_string(),
                    source: e,
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().to_string();

        // A missing Content-Type is given the benefit of the doubt
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_string();

        if !is_html(&content_type) {
            return Err(FetchError::ContentMismatch {
                url: url.to_string(),
                content_type,
            });
        }

        let body = response.text().await.map_err(|e| FetchError::Http {
            url: url.to_string(),
            source: e,
        })?;

        Ok((final_url, body))
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str, rules: &ExtractionRules) -> Result<FetchedPage, FetchError> {
        if rules.engine_type != EngineType::Http {
            return Err(FetchError::UnsupportedEngine(rules.engine_type));
        }

        let operation = async {
            let (final_url, body) = self.fetch_html(url).await?;
            extract_page(&body, &final_url, rules)
        };

        match tokio::time::timeout(self.operation_timeout, operation).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                url: url.to_string(),
                secs: self.operation_timeout.as_secs(),
            }),
        }
    }
}

fn is_html(content_type: &str) -> bool {
    let lowered = content_type.to_ascii_lowercase();
    lowered.contains("text/html") || lowered.contains("application/xhtml+xml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn rules() -> ExtractionRules {
        ExtractionRules {
            link_selector: "a[href]".to_string(),
            ..ExtractionRules::default()
        }
    }

    fn fetcher(navigation_secs: u64) -> HttpPageFetcher {
        HttpPageFetcher::new(&FetcherConfig {
            user_agent: "TestHarvester/1.0".to_string(),
            navigation_timeout_secs: navigation_secs,
            operation_timeout_secs: navigation_secs * 2,
        })
        .unwrap()
    }

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client(&FetcherConfig::default()).is_ok());
    }

    #[test]
    fn test_is_html() {
        assert!(is_html("text/html; charset=utf-8"));
        assert!(is_html("application/xhtml+xml"));
        assert!(!is_html("application/pdf"));
    }

    #[test]
    fn test_engine_type_names() {
        assert_eq!(EngineType::from_db_string("browser"), Some(EngineType::Browser));
        assert_eq!(EngineType::from_db_string("x"), None);
        assert_eq!(EngineType::Http.to_string(), "http");
    }

    #[tokio::test]
    async fn test_fetch_extracts_links_and_content() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/docs/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_raw(
                        r#"<html><head><title>Docs</title></head><body>
                        <a href="intro#top">Intro</a>
                        <a href="/docs/api">API</a>
                        <p>Welcome</p></body></html>"#,
                        "text/html",
                    ),
            )
            .mount(&server)
            .await;

        let url = format!("{}/docs/", server.uri());
        let page = fetcher(5).fetch(&url, &rules()).await.unwrap();

        assert_eq!(
            page.links,
            vec![
                format!("{}/docs/intro", server.uri()),
                format!("{}/docs/api", server.uri()),
            ]
        );
        assert!(page.content.contains("Welcome"));
        assert_eq!(page.title.as_deref(), Some("Docs"));
    }

    #[tokio::test]
    async fn test_fetch_http_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = fetcher(5)
            .fetch(&format!("{}/down", server.uri()), &rules())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_fetch_rejects_non_html() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/pdf")
                    .set_body_string("%PDF"),
            )
            .mount(&server)
            .await;

        let err = fetcher(5)
            .fetch(&format!("{}/file.pdf", server.uri()), &rules())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::ContentMismatch { .. }));
    }

    #[tokio::test]
    async fn test_fetch_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_raw("<html></html>", "text/html")
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let err = fetcher(1)
            .fetch(&format!("{}/slow", server.uri()), &rules())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_browser_engine_unsupported() {
        let browser_rules = ExtractionRules {
            engine_type: EngineType::Browser,
            ..rules()
        };
        let err = fetcher(5)
            .fetch("https://example.com/", &browser_rules)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::UnsupportedEngine(EngineType::Browser)));
    }
}
