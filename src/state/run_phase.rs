/// Run phase definitions for the crawl executor
use std::fmt;

/// Represents where a crawl run stands
///
/// `Running -> Draining` happens once the dispatch cursor reaches the
/// frontier total; `Draining -> Done` once no batch is left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunPhase {
    /// Fresh URLs are still being dispatched
    Running,

    /// Only retries are left
    Draining,

    /// Nothing left to dispatch
    Done,
}

impl RunPhase {
    /// Returns true if no further batches will be pulled
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
