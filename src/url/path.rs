use crate::url::strip_fragment;
use crate::UrlResult;
use sha2::{Digest, Sha256};
use std::path::PathBuf;

/// File stem used for URLs whose path ends in a directory
const INDEX_STEM: &str = "index";

/// Derives a filesystem-safe relative path for a URL
///
/// The layout is `<host>[_<port>]/<segments...>[-<tag>]<suffix>`:
///
/// - Each path segment keeps ASCII alphanumerics, `-`, `_` and `.`; anything
///   else becomes `_`. `.` and `..` segments are dropped.
/// - A URL ending in `/` (or with an empty path) maps to `index`.
/// - `suffix` is always appended; a last segment already ending in it has
///   it stripped first.
/// - When the query is non-empty, a segment had to be rewritten, or the
///   suffix was stripped, the file name gets a tag: the first 8 hex chars of
///   the SHA-256 of the raw path and query. Distinct URLs therefore never
///   share a file.
///
/// # Examples
///
/// ```
/// use kb_harvest::url::derive_relative_path;
/// use std::path::Path;
///
/// let path = derive_relative_path("https://docs.example.com/guide/intro", ".md").unwrap();
/// assert_eq!(path, Path::new("docs.example.com/guide/intro.md"));
/// ```
pub fn derive_relative_path(url_str: &str, suffix: &str) -> UrlResult<PathBuf> {
    let url = strip_fragment(url_str)?;

    let mut path = PathBuf::new();
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => path.push(format!("{}_{}", sanitize(host), port)),
        None => path.push(sanitize(host)),
    }

    let raw_path = url.path();
    let raw_segments: Vec<&str> = raw_path
        .split('/')
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .collect();
    let mut segments: Vec<String> = raw_segments.iter().map(|s| sanitize(s)).collect();
    let rewritten = raw_segments
        .iter()
        .zip(&segments)
        .any(|(raw, clean)| *raw != clean.as_str());

    if raw_path.ends_with('/') || segments.is_empty() {
        segments.push(INDEX_STEM.to_string());
    }

    let mut file_name = segments.pop().unwrap_or_else(|| INDEX_STEM.to_string());
    for segment in segments {
        path.push(segment);
    }

    let suffix_stripped = match file_name.strip_suffix(suffix) {
        Some(stem) if !suffix.is_empty() => {
            file_name = stem.to_string();
            true
        }
        _ => false,
    };

    let query = url.query().filter(|q| !q.is_empty());
    if query.is_some() || rewritten || suffix_stripped {
        let mut hasher = Sha256::new();
        hasher.update(raw_path.as_bytes());
        if let Some(query) = query {
            hasher.update(b"?");
            hasher.update(query.as_bytes());
        }
        let digest = hex::encode(hasher.finalize());
        file_name = format!("{}-{}", file_name, &digest[..8]);
    }

    file_name.push_str(suffix);
    path.push(file_name);

    Ok(path)
}

/// Makes `raw` usable as a single directory name
///
/// Separators and other unsafe characters become `_`, and names made only
/// of dots (or nothing) become `_`, so the result never leaves its parent.
pub fn safe_component(raw: &str) -> String {
    let clean = sanitize(raw.trim());
    if clean.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        clean
    }
}

fn sanitize(segment: &str) -> String {
    segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
