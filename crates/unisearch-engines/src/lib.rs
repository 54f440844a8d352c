//! Search engines for Unisearch.
//!
//! Every engine implements [`unisearch_core::Engine`] and accepts the same
//! [`Criteria`](unisearch_core::Criteria):
//!
//! - [`MemoryEngine`]: in-process reference engine, always available
//! - [`ElasticsearchEngine`]: Elasticsearch adapter (feature `elasticsearch`)
//! - [`MeilisearchEngine`]: Meilisearch adapter (feature `meilisearch`)
//! - [`TypesenseEngine`]: Typesense adapter (feature `typesense`)
//!
//! [`create_engine`] builds the engine named by an [`EngineConfig`], and
//! [`EngineRegistry`] caches one engine per index name.
//!
//! # Example
//!
//! ```
//! use unisearch_core::{Criteria, Document, Engine, EngineConfig, WriteOptions};
//! use unisearch_engines::create_engine;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let engine = create_engine(&EngineConfig::default(), "courses").unwrap();
//! engine
//!     .index(
//!         "course",
//!         Document::new().with("id", "a").with("content", "the sun"),
//!         WriteOptions::default(),
//!     )
//!     .await
//!     .unwrap();
//!
//! let results = engine
//!     .search(&Criteria::builder().query("sun").build())
//!     .await
//!     .unwrap();
//! assert_eq!(results.ids("id"), vec!["a"]);
//! # }
//! ```

use std::sync::Arc;

use unisearch_core::{BackendKind, Document, Engine, EngineConfig, Error, Result};

#[cfg(feature = "elasticsearch")]
pub mod elastic;
#[cfg(any(feature = "elasticsearch", feature = "meilisearch", feature = "typesense"))]
mod http;
#[cfg(feature = "meilisearch")]
pub mod meilisearch;
pub mod memory;
pub mod registry;
#[cfg(feature = "typesense")]
pub mod typesense;

#[cfg(feature = "elasticsearch")]
pub use elastic::ElasticsearchEngine;
#[cfg(feature = "meilisearch")]
pub use meilisearch::MeilisearchEngine;
pub use memory::MemoryEngine;
pub use registry::{EngineFactory, EngineRegistry};
#[cfg(feature = "typesense")]
pub use typesense::TypesenseEngine;

/// Build the engine `config` selects for `index_name`.
///
/// Adapters make no request here; the backend index is created on first
/// use.
///
/// # Errors
///
/// `Config` when the configuration is invalid, the index name is empty,
/// or the selected backend was not compiled in. Reference-engine snapshot
/// errors are returned as `Io` or `Serialization`.
pub fn create_engine(config: &EngineConfig, index_name: &str) -> Result<Arc<dyn Engine>> {
    config.validate()?;
    if index_name.trim().is_empty() {
        return Err(Error::config("index name must not be empty"));
    }
    log::debug!("Creating {} engine for index '{index_name}'", config.backend);

    match config.backend {
        BackendKind::Memory => Ok(Arc::new(MemoryEngine::from_config(config, index_name)?)),
        #[cfg(feature = "elasticsearch")]
        BackendKind::Elasticsearch => Ok(Arc::new(ElasticsearchEngine::new(config, index_name)?)),
        #[cfg(feature = "meilisearch")]
        BackendKind::Meilisearch => Ok(Arc::new(MeilisearchEngine::new(config, index_name)?)),
        #[cfg(feature = "typesense")]
        BackendKind::Typesense => Ok(Arc::new(TypesenseEngine::new(config, index_name)?)),
        #[allow(unreachable_patterns)]
        other => Err(Error::config(format!(
            "backend '{other}' is not compiled in; enable the '{other}' feature"
        ))),
    }
}

/// Id of `document` under `id_field`, checked alongside its type.
pub(crate) fn document_id(document: &Document, id_field: &str, doc_type: &str) -> Result<String> {
    if doc_type.is_empty() {
        return Err(Error::validation("doc_type must not be empty"));
    }
    document.id(id_field).ok_or_else(|| {
        Error::validation_field(
            id_field,
            "document must carry a non-empty string or integer id",
        )
    })
}
