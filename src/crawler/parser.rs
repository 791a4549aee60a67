//! HTML extraction for the HTTP engine
//!
//! This module turns a fetched HTML document into what the executor needs:
//! - Links to follow, chosen by the run's link selector
//! - Page content after the site's removal selectors are applied
//! - Page title, used as the file record summary

use crate::crawler::fetcher::{ExtractionRules, FetchError, FetchedPage};
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Extracts links, content and title from an HTML document
///
/// Links are taken from the whole document before any removal, so
/// navigation menus still feed discovery even when they are stripped from
/// the saved content.
///
/// # Arguments
///
/// * `html` - The HTML content
/// * `page_url` - The URL the document was served from (after redirects)
/// * `rules` - The site's extraction rules
///
/// # Returns
///
/// * `Ok(FetchedPage)` - Extracted page
/// * `Err(FetchError)` - A selector is invalid or the `evaluate` rule
///   matched nothing
///
/// # Example
///
/// ```
/// use kb_harvest::crawler::{extract_page, ExtractionRules};
///
/// let html = r#"<html><body><nav><a href="/a">A</a></nav><p>Hi</p></body></html>"#;
/// let rules = ExtractionRules {
///     link_selector: "a[href]".to_string(),
///     remove_selectors: vec!["nav".to_string()],
///     ..ExtractionRules::default()
/// };
/// let page = extract_page(html, "https://example.com/", &rules).unwrap();
/// assert_eq!(page.links, vec!["https://example.com/a"]);
/// assert!(!page.content.contains("<nav>"));
/// ```
pub fn extract_page(
    html: &str,
    page_url: &str,
    rules: &ExtractionRules,
) -> Result<FetchedPage, FetchError> {
    let base_url = Url::parse(page_url).map_err(|e| FetchError::Navigation {
        url: page_url.to_string(),
        message: e.to_string(),
    })?;

    let mut document = Html::parse_document(html);

    let title = extract_title(&document);
    let links = extract_links(&document, &base_url, &rules.link_selector)?;

    remove_elements(&mut document, &rules.remove_selectors)?;

    let content = match rules.evaluate.as_deref() {
        Some(rule) if !rule.trim().is_empty() => evaluate_rule(&document, rule, page_url)?,
        _ => extract_body(&document),
    };

    Ok(FetchedPage {
        links,
        content,
        title,
    })
}

fn parse_selector(raw: &str) -> Result<Selector, FetchError> {
    Selector::parse(raw).map_err(|_| FetchError::InvalidSelector(raw.to_string()))
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Extracts links matched by `link_selector`, deduplicated in document order
fn extract_links(
    document: &Html,
    base_url: &Url,
    link_selector: &str,
) -> Result<Vec<String>, FetchError> {
    let raw = if link_selector.trim().is_empty() {
        "a[href]"
    } else {
        link_selector
    };
    let selector = parse_selector(raw)?;

    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for element in document.select(&selector) {
        if element.value().attr("download").is_some() {
            continue;
        }

        if let Some(href) = element.value().attr("href") {
            if let Some(absolute_url) = resolve_link(href, base_url) {
                if seen.insert(absolute_url.clone()) {
                    links.push(absolute_url);
                }
            }
        }
    }

    Ok(links)
}

/// Resolves a link href to an absolute, fragment-free URL
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Fragment-only links
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let mut absolute_url = base_url.join(href).ok()?;
    if absolute_url.scheme() != "http" && absolute_url.scheme() != "https" {
        return None;
    }

    absolute_url.set_fragment(None);
    Some(absolute_url.to_string())
}

/// Detaches every element matching any of `selectors`
fn remove_elements(document: &mut Html, selectors: &[String]) -> Result<(), FetchError> {
    for raw in selectors {
        let selector = parse_selector(raw)?;
        let ids: Vec<_> = document.select(&selector).map(|el| el.id()).collect();

        for id in ids {
            if let Some(mut node) = document.tree.get_mut(id) {
                node.detach();
            }
        }
    }

    Ok(())
}

fn extract_body(document: &Html) -> String {
    match Selector::parse("body") {
        Ok(body) => document
            .select(&body)
            .next()
            .map(|el| el.html())
            .unwrap_or_else(|| document.root_element().html()),
        Err(_) => document.root_element().html(),
    }
}

fn evaluate_rule(document: &Html, rule: &str, page_url: &str) -> Result<String, FetchError> {
    let selector = Selector::parse(rule).map_err(|_| FetchError::Script {
        url: page_url.to_string(),
        message: format!("'{}' is not a valid selector", rule),
    })?;

    let parts: Vec<String> = document.select(&selector).map(|el| el.html()).collect();
    if parts.is_empty() {
        return Err(FetchError::Script {
            url: page_url.to_string(),
            message: format!("'{}' matched no elements", rule),
        });
    }

    Ok(parts.join("\n"))
}
