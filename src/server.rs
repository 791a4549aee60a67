//! HTTP surface for crawls
//!
//! POST /knowledge-bases/{kb_id}/sites/{site_id}/crawl streams progress
//! events as SSE; POST .../refresh answers one URL with a single event.
//! The caller is identified by the `x-owner-id` header. Every check runs
//! before streaming starts, so failures are plain HTTP errors.

use crate::config::CrawlConfig;
use crate::crawler::{Harvester, ProgressEvent};
use crate::{ConfigError, HarvestError};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

/// Header carrying the caller's owner id
pub const OWNER_HEADER: &str = "x-owner-id";

/// Shared state for the handlers
#[derive(Clone)]
pub struct AppState {
    harvester: Arc<Harvester>,
    defaults: CrawlConfig,
    shutdown: CancellationToken,
}

impl AppState {
    /// `defaults` supplies the options a request body does not carry
    pub fn new(harvester: Arc<Harvester>, defaults: CrawlConfig, shutdown: CancellationToken) -> Self {
        Self {
            harvester,
            defaults,
            shutdown,
        }
    }
}

/// Body of a crawl request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlRequest {
    pub max_connections: u32,
    pub concurrency: u32,
    #[serde(default)]
    pub link_selector: Option<String>,
    #[serde(rename = "type", default)]
    pub crawl_type: Option<String>,
}

impl CrawlRequest {
    fn into_config(self, defaults: &CrawlConfig) -> CrawlConfig {
        CrawlConfig {
            max_connections: self.max_connections,
            concurrency: self.concurrency,
            link_selector: self
                .link_selector
                .unwrap_or_else(|| defaults.link_selector.clone()),
            crawl_type: self.crawl_type.unwrap_or_else(|| defaults.crawl_type.clone()),
            ..defaults.clone()
        }
    }
}

/// Body of a refresh request
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub url: String,
}

/// Build the axum router for the crawl endpoints.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/knowledge-bases/{kb_id}/sites/{site_id}/crawl",
            post(crawl_handler),
        )
        .route(
            "/knowledge-bases/{kb_id}/sites/{site_id}/refresh",
            post(refresh_handler),
        )
        .with_state(state)
}

/// Binds `addr` and serves until `state`'s shutdown token fires
pub async fn serve(addr: &str, state: AppState) -> Result<(), HarvestError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    let shutdown = state.shutdown.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn crawl_handler(
    State(state): State<AppState>,
    Path((kb_id, site_id)): Path<(i64, i64)>,
    headers: HeaderMap,
    body: Result<Json<CrawlRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let owner_id = owner_from_headers(&headers)?;
    let Json(request) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let options = request.into_config(&state.defaults);

    let handle = state
        .harvester
        .start_crawl(owner_id, kb_id, site_id, &options, state.shutdown.child_token())
        .await?;
    tracing::info!(
        "Run {} started for site {} (owner {})",
        handle.run_id,
        site_id,
        owner_id
    );

    // Dropping the response drops the receiver, which cancels the run
    let stream = ReceiverStream::new(handle.events).map(|event| Event::default().json_data(event));

    Ok(Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response())
}

async fn refresh_handler(
    State(state): State<AppState>,
    Path((kb_id, site_id)): Path<(i64, i64)>,
    headers: HeaderMap,
    body: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<ProgressEvent>, ApiError> {
    let owner_id = owner_from_headers(&headers)?;
    let Json(request) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let event = state
        .harvester
        .refresh(
            owner_id,
            kb_id,
            site_id,
            &request.url,
            &state.defaults.link_selector,
        )
        .await?;
    Ok(Json(event))
}

fn owner_from_headers(headers: &HeaderMap) -> Result<i64, ApiError> {
    headers
        .get(OWNER_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<i64>().ok())
        .ok_or_else(|| ApiError {
            status: StatusCode::UNAUTHORIZED,
            message: format!("missing or invalid {} header", OWNER_HEADER),
        })
}

/// Error answered before any streaming starts
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<HarvestError> for ApiError {
    fn from(err: HarvestError) -> Self {
        let status = match &err {
            HarvestError::Config(ConfigError::Unauthorized { .. }) => StatusCode::FORBIDDEN,
            HarvestError::Config(ConfigError::KnowledgeBaseNotFound(_))
            | HarvestError::Config(ConfigError::SiteNotFound { .. }) => StatusCode::NOT_FOUND,
            HarvestError::Config(_) | HarvestError::UrlError(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Request failed: {}", err);
        } else {
            tracing::debug!("Request rejected ({}): {}", status, err);
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}
