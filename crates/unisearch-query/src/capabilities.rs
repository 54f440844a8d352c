//! What each backend can express.
//!
//! The translator consults a [`Capabilities`] descriptor while lowering
//! criteria, and rejects anything the target backend cannot express instead
//! of silently dropping it.

use serde::{Deserialize, Serialize};
use unisearch_core::BackendKind;

/// Limits of one backend's native query language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Backend described.
    pub backend: BackendKind,

    /// Deepest dot path a single query can address. `None` is unlimited.
    pub max_path_depth: Option<usize>,

    /// Path segments must be plain identifiers (`[A-Za-z0-9_-]`).
    pub bare_identifiers_only: bool,

    /// Ranges over text values are supported.
    pub text_ranges: bool,

    /// Ranges over timestamps are supported.
    pub date_ranges: bool,

    /// Largest `from + size` the backend will page through. `None` is
    /// unlimited.
    pub max_result_window: Option<usize>,

    /// Largest `size` of a single page. `None` is unlimited.
    pub max_page_size: Option<usize>,
}

impl Capabilities {
    /// The in-memory reference engine: everything is expressible.
    pub const fn reference() -> Self {
        Self {
            backend: BackendKind::Memory,
            max_path_depth: None,
            bare_identifiers_only: false,
            text_ranges: true,
            date_ranges: true,
            max_result_window: None,
            max_page_size: None,
        }
    }

    /// Elasticsearch, with its default `index.max_result_window`.
    pub const fn elasticsearch() -> Self {
        Self {
            backend: BackendKind::Elasticsearch,
            max_path_depth: None,
            bare_identifiers_only: false,
            text_ranges: true,
            date_ranges: true,
            max_result_window: Some(10_000),
            max_page_size: None,
        }
    }

    /// Meilisearch: numeric comparisons only, default `maxTotalHits`.
    pub const fn meilisearch() -> Self {
        Self {
            backend: BackendKind::Meilisearch,
            max_path_depth: None,
            bare_identifiers_only: true,
            text_ranges: false,
            date_ranges: false,
            max_result_window: Some(1_000),
            max_page_size: None,
        }
    }

    /// Typesense: numeric ranges only, at most 250 hits per page.
    pub const fn typesense() -> Self {
        Self {
            backend: BackendKind::Typesense,
            max_path_depth: None,
            bare_identifiers_only: true,
            text_ranges: false,
            date_ranges: false,
            max_result_window: None,
            max_page_size: Some(250),
        }
    }

    /// Descriptor for `backend`.
    pub const fn for_backend(backend: BackendKind) -> Self {
        match backend {
            BackendKind::Memory => Self::reference(),
            BackendKind::Elasticsearch => Self::elasticsearch(),
            BackendKind::Meilisearch => Self::meilisearch(),
            BackendKind::Typesense => Self::typesense(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_backend_matches_constructors() {
        assert_eq!(
            Capabilities::for_backend(BackendKind::Memory),
            Capabilities::reference()
        );
        assert_eq!(
            Capabilities::for_backend(BackendKind::Elasticsearch).max_result_window,
            Some(10_000)
        );
        let meili = Capabilities::for_backend(BackendKind::Meilisearch);
        assert!(meili.bare_identifiers_only);
        assert!(!meili.date_ranges);
        let typesense = Capabilities::for_backend(BackendKind::Typesense);
        assert_eq!(typesense.max_page_size, Some(250));
        assert!(typesense.max_result_window.is_none());
    }
}
