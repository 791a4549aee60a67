use crate::ConfigError;
use glob::{MatchOptions, Pattern};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Compiled link selection rules for a site
///
/// A URL is allowed when it matches at least one match pattern (or there are
/// no match patterns) and matches none of the ignore patterns. Patterns use
/// glob syntax applied to the full URL string, where `*` and `**` both cross
/// `/` boundaries.
///
/// # Examples
///
/// ```
/// use kb_harvest::url::LinkFilter;
///
/// let filter = LinkFilter::new(
///     &["https://docs.example.com/**".to_string()],
///     &["**/changelog/**".to_string()],
/// )
/// .unwrap();
///
/// assert!(filter.allows("https://docs.example.com/guide/intro"));
/// assert!(!filter.allows("https://docs.example.com/changelog/v2"));
/// assert!(!filter.allows("https://blog.example.com/post"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct LinkFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl LinkFilter {
    /// Compiles match and ignore patterns
    ///
    /// # Returns
    ///
    /// * `Ok(LinkFilter)` - All patterns compiled
    /// * `Err(ConfigError::InvalidPattern)` - A pattern is not valid glob syntax
    pub fn new(match_patterns: &[String], ignore_patterns: &[String]) -> Result<Self, ConfigError> {
        Ok(Self {
            include: compile(match_patterns)?,
            exclude: compile(ignore_patterns)?,
        })
    }

    /// A filter that accepts every URL
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Checks whether a discovered URL is eligible for the frontier
    pub fn allows(&self, url: &str) -> bool {
        let included = self.include.is_empty()
            || self
                .include
                .iter()
                .any(|p| p.matches_with(url, MATCH_OPTIONS));

        included
            && !self
                .exclude
                .iter()
                .any(|p| p.matches_with(url, MATCH_OPTIONS))
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Pattern>, ConfigError> {
    patterns
        .iter()
        .map(|raw| {
            Pattern::new(raw.trim())
                .map_err(|e| ConfigError::InvalidPattern(format!("'{}': {}", raw, e.msg)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_filter_allows_everything() {
        let filter = LinkFilter::allow_all();
        assert!(filter.allows("https://example.com/anything"));
    }

    #[test]
    fn test_match_pattern_required() {
        let filter = LinkFilter::new(&patterns(&["https://example.com/docs/**"]), &[]).unwrap();

        assert!(filter.allows("https://example.com/docs/a"));
        assert!(filter.allows("https://example.com/docs/a/b/c"));
        assert!(!filter.allows("https://example.com/blog/a"));
        assert!(!filter.allows("https://other.com/docs/a"));
    }

    #[test]
    fn test_single_star_crosses_segments() {
        let filter = LinkFilter::new(&patterns(&["https://example.com/*"]), &[]).unwrap();
        assert!(filter.allows("https://example.com/a/b"));
    }

    #[test]
    fn test_any_match_pattern_is_enough() {
        let filter = LinkFilter::new(
            &patterns(&["https://a.com/**", "https://b.com/**"]),
            &[],
        )
        .unwrap();

        assert!(filter.allows("https://a.com/x"));
        assert!(filter.allows("https://b.com/y"));
        assert!(!filter.allows("https://c.com/z"));
    }

    #[test]
    fn test_exclude_wins_over_match() {
        let filter = LinkFilter::new(
            &patterns(&["https://example.com/**"]),
            &patterns(&["**/*.pdf", "https://example.com/private/**"]),
        )
        .unwrap();

        assert!(filter.allows("https://example.com/guide"));
        assert!(!filter.allows("https://example.com/files/manual.pdf"));
        assert!(!filter.allows("https://example.com/private/keys"));
    }

    #[test]
    fn test_case_sensitive() {
        let filter = LinkFilter::new(&patterns(&["https://example.com/Docs/**"]), &[]).unwrap();
        assert!(!filter.allows("https://example.com/docs/a"));
    }

    #[test]
    fn test_invalid_pattern() {
        let result = LinkFilter::new(&patterns(&["https://example.com/[abc"]), &[]);
        assert!(matches!(result.unwrap_err(), ConfigError::InvalidPattern(_)));
    }
}
