//! The engine contract.
//!
//! [`Engine`] is implemented by the in-memory reference engine and by every
//! backend adapter. Callers hold engines as `Arc<dyn Engine>` and never need
//! to know which backend answers.
//!
//! # Consistency
//!
//! Each call performs one unit of work against the backend. Nothing runs in
//! the background and nothing is retried. Visibility of writes to later
//! searches is backend-defined; pass [`WriteOptions::refresh`] to request
//! immediate visibility where the backend supports it.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::config::BackendKind;
use crate::criteria::{Criteria, Criterion};
use crate::error::Result;
use crate::results::ResultEnvelope;
use crate::value::Document;

/// Per-call write options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Make the write visible to searches before returning.
    pub refresh: bool,
}

impl WriteOptions {
    /// Options requesting immediate visibility.
    pub fn refreshed() -> Self {
        Self { refresh: true }
    }
}

/// A searchable index.
///
/// Documents are keyed by `(doc_type, id)`. Indexing an existing key
/// replaces the whole document. Removing a key that does not exist is a
/// successful no-op.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Name of the index this engine serves.
    fn index_name(&self) -> &str;

    /// Backend answering for this engine.
    fn backend(&self) -> BackendKind;

    /// Add or replace a document.
    ///
    /// # Errors
    ///
    /// `Validation` when the document has no resolvable id,
    /// `EngineUnavailable` when the backend cannot be reached.
    async fn index(&self, doc_type: &str, document: Document, options: WriteOptions)
    -> Result<()>;

    /// Remove a document. Missing ids are ignored.
    async fn remove(&self, doc_type: &str, doc_id: &str, options: WriteOptions) -> Result<()>;

    /// Run a search.
    ///
    /// # Errors
    ///
    /// `Validation` for malformed criteria or criteria the backend cannot
    /// express, `EngineUnavailable` for transport failures and
    /// `BackendQuery` when the backend rejects the request.
    async fn search(&self, criteria: &Criteria) -> Result<ResultEnvelope>;

    /// Run `criteria` with its free-text query replaced by `query`.
    async fn search_string(&self, query: &str, criteria: Criteria) -> Result<ResultEnvelope> {
        let criteria = Criteria {
            query_string: Some(query.to_string()),
            ..criteria
        };
        self.search(&criteria).await
    }

    /// Run `criteria` with `fields` merged into its field dictionary.
    async fn search_fields(
        &self,
        fields: BTreeMap<String, Criterion>,
        criteria: Criteria,
    ) -> Result<ResultEnvelope> {
        let mut criteria = criteria;
        criteria.field_dictionary.extend(fields);
        self.search(&criteria).await
    }
}
