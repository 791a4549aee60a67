use crate::config::types::{Config, CrawlConfig, FetcherConfig, SiteEntry, StorageConfig};
use crate::state::CrawlMode;
use crate::url::{strip_fragment, LinkFilter};
use crate::ConfigError;
use std::collections::HashSet;

/// Bounds on the number of URLs a single run may consider
pub const MAX_CONNECTIONS_RANGE: std::ops::RangeInclusive<u32> = 1..=1000;

/// Bounds on simultaneous in-flight fetches
pub const CONCURRENCY_RANGE: std::ops::RangeInclusive<u32> = 1..=5;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_storage_config(&config.storage)?;
    validate_fetcher_config(&config.fetcher)?;
    validate_crawl_config(&config.crawl)?;

    let mut ids = HashSet::new();
    for site in &config.sites {
        if !ids.insert(site.id) {
            return Err(ConfigError::Validation(format!(
                "Duplicate site id {}",
                site.id
            )));
        }
        validate_site(site)?;
    }

    Ok(())
}

/// Validates run options
///
/// Also used by the streaming endpoint on incoming request bodies.
pub fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    if !MAX_CONNECTIONS_RANGE.contains(&config.max_connections) {
        return Err(ConfigError::Validation(format!(
            "maxConnections must be between 1 and 1000, got {}",
            config.max_connections
        )));
    }

    if !CONCURRENCY_RANGE.contains(&config.concurrency) {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 5, got {}",
            config.concurrency
        )));
    }

    if config.max_retries < 1 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be >= 1, got {}",
            config.max_retries
        )));
    }

    if config.link_selector.trim().is_empty() {
        return Err(ConfigError::Validation(
            "linkSelector cannot be empty".to_string(),
        ));
    }

    if scraper::Selector::parse(&config.link_selector).is_err() {
        return Err(ConfigError::Validation(format!(
            "linkSelector '{}' is not a valid CSS selector",
            config.link_selector
        )));
    }

    if CrawlMode::from_request_name(&config.crawl_type).is_none() {
        return Err(ConfigError::Validation(format!(
            "type must be \"all\" or \"incremental\", got \"{}\"",
            config.crawl_type
        )));
    }

    Ok(())
}

/// Validates a site record
pub fn validate_site(site: &SiteEntry) -> Result<(), ConfigError> {
    if site.name.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Site {} must have a name",
            site.id
        )));
    }

    if !site
        .name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "Site name must contain only alphanumerics, '-' and '_', got '{}'",
            site.name
        )));
    }

    if site.start_urls.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Site '{}' must have at least one start URL",
            site.name
        )));
    }

    for start in &site.start_urls {
        strip_fragment(start).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid start URL '{}': {}", start, e))
        })?;
    }

    LinkFilter::new(&site.match_patterns, &site.ignore_patterns)?;

    for selector in &site.remove_selectors {
        if scraper::Selector::parse(selector).is_err() {
            return Err(ConfigError::Validation(format!(
                "Remove selector '{}' is not a valid CSS selector",
                selector
            )));
        }
    }

    if !site.file_suffix.is_empty()
        && (!site.file_suffix.starts_with('.') || site.file_suffix.contains('/'))
    {
        return Err(ConfigError::Validation(format!(
            "file_suffix must be empty or start with '.', got '{}'",
            site.file_suffix
        )));
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.root.is_empty() {
        return Err(ConfigError::Validation(
            "storage root cannot be empty".to_string(),
        ));
    }

    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    if config.user_agent.is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if config.navigation_timeout_secs < 1 || config.operation_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "fetcher timeouts must be at least 1 second".to_string(),
        ));
    }

    if config.operation_timeout_secs < config.navigation_timeout_secs {
        return Err(ConfigError::Validation(format!(
            "operation_timeout_secs ({}) must be >= navigation_timeout_secs ({})",
            config.operation_timeout_secs, config.navigation_timeout_secs
        )));
    }

    Ok(())
}
