use crate::{UrlError, UrlResult};
use url::Url;

/// Parses a URL and removes its fragment
///
/// Only `http` and `https` URLs with a host are accepted. This is the form
/// every URL takes before it enters the frontier.
///
/// # Examples
///
/// ```
/// use kb_harvest::url::strip_fragment;
///
/// let url = strip_fragment("https://Example.com/guide#install").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/guide");
/// ```
pub fn strip_fragment(url_str: &str) -> UrlResult<Url> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingHost);
    }

    url.set_fragment(None);
    Ok(url)
}

/// Returns the suffix-normalized form of a URL
///
/// Two URLs with the same canonical form refer to the same local file. The
/// canonical form:
///
/// 1. Drops the fragment
/// 2. Removes dot segments and duplicate slashes from the path
/// 3. Removes a trailing slash (except for the root)
/// 4. Removes `suffix` from the end of the path, if present
///
/// Strings that do not parse as URLs are returned trimmed, so they can still
/// be compared verbatim.
///
/// # Examples
///
/// ```
/// use kb_harvest::url::canonical_url;
///
/// assert_eq!(
///     canonical_url("https://example.com/guide.html", ".html"),
///     canonical_url("https://example.com/guide/", ".html"),
/// );
/// ```
pub fn canonical_url(url_str: &str, suffix: &str) -> String {
    let mut url = match strip_fragment(url_str) {
        Ok(url) => url,
        Err(_) => return url_str.trim().to_string(),
    };

    let mut path = normalize_path(url.path());
    if !suffix.is_empty() && path.len() > suffix.len() && path.ends_with(suffix) {
        path.truncate(path.len() - suffix.len());
    }
    url.set_path(&path);

    url.to_string()
}

/// Normalizes a URL path by removing dot segments and trailing slashes
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }

    format!("/{}", segments.join("/"))
}
