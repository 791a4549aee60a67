//! URL handling module
//!
//! This module provides the shared filtering and dedup helpers used by the
//! frontier: fragment stripping, canonical forms for comparing discovered
//! URLs against already-materialized ones, glob-based link filtering, and the
//! deterministic URL to local file path derivation used by the persister.

mod matcher;
mod normalize;
mod path;

// Re-export main functions
pub use matcher::LinkFilter;
pub use normalize::{canonical_url, strip_fragment};
pub use path::{derive_relative_path, safe_component};
