//! The Typesense engine.

use std::collections::BTreeSet;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde_json::Value as Json;
use tokio::sync::OnceCell;
use unisearch_core::{
    BackendKind, Criteria, Document, Engine, EngineConfig, Error, Operation, Result,
    ResultEnvelope, WriteOptions,
};
use unisearch_query::{Capabilities, plan};

use super::{filter, layout, normalize};
use crate::{document_id, http};

const API_KEY_HEADER: &str = "X-TYPESENSE-API-KEY";

/// Engine backed by one Typesense collection.
///
/// The collection is named by the configured prefix followed by the index
/// name, and is created on first use. Typesense writes are searchable as
/// soon as they return, so [`WriteOptions::refresh`] has nothing to wait
/// for.
pub struct TypesenseEngine {
    index_name: String,
    collection: String,
    id_field: String,
    base_url: Url,
    api_key: Option<String>,
    client: Client,
    ready: OnceCell<()>,
}

impl TypesenseEngine {
    /// Create an engine for `index_name` from the `[typesense]` section.
    ///
    /// No request is made until the first operation.
    pub fn new(config: &EngineConfig, index_name: &str) -> Result<Self> {
        let ts = &config.typesense;
        Ok(Self {
            index_name: index_name.to_string(),
            collection: format!("{}{index_name}", ts.collection_prefix),
            id_field: config.id_field.clone(),
            base_url: http::parse_base_url(&ts.url)?,
            api_key: ts.api_key.clone(),
            client: http::build_client(ts.timeout_secs)?,
            ready: OnceCell::new(),
        })
    }

    /// Name of the backing collection.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.api_key {
            Some(key) => builder.header(API_KEY_HEADER, key),
            None => builder,
        }
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        http::endpoint(&self.base_url, segments)
    }

    async fn ensure_collection(&self) -> Result<()> {
        self.ready
            .get_or_try_init(|| self.create_collection())
            .await
            .map(|_| ())
            .map_err(|e| e.in_operation(Operation::CreateIndex, &self.index_name))
    }

    async fn create_collection(&self) -> Result<()> {
        let url = self.url(&["collections"])?;
        let schema = layout::collection_schema(&self.collection);
        let response = http::send(self.request(Method::POST, url).json(&schema)).await?;
        let status = response.status();
        if status.is_success() {
            log::info!("Created Typesense collection '{}'", self.collection);
            return Ok(());
        }
        if status == StatusCode::CONFLICT {
            log::debug!("Typesense collection '{}' already exists", self.collection);
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(http::status_error(status, &body))
    }

    async fn schema_fields(&self) -> Result<BTreeSet<String>> {
        let url = self.url(&["collections", &self.collection])?;
        let raw = http::read_json(http::send(self.request(Method::GET, url)).await?).await?;
        Ok(layout::schema_fields(&raw))
    }
}

impl std::fmt::Debug for TypesenseEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypesenseEngine")
            .field("index_name", &self.index_name)
            .field("collection", &self.collection)
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Engine for TypesenseEngine {
    fn index_name(&self) -> &str {
        &self.index_name
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Typesense
    }

    async fn index(&self, doc_type: &str, document: Document, _options: WriteOptions) -> Result<()> {
        let op = |e: Error| e.in_operation(Operation::Index, &self.index_name);
        let id = document_id(&document, &self.id_field, doc_type).map_err(op)?;
        let record = layout::stored_document(doc_type, &id, &document).map_err(op)?;
        self.ensure_collection().await?;

        let mut url = self
            .url(&["collections", &self.collection, "documents"])
            .map_err(op)?;
        url.query_pairs_mut().append_pair("action", "upsert");
        log::debug!("Indexing {doc_type}/{id} into Typesense collection '{}'", self.collection);
        let response = http::send(self.request(Method::POST, url).json(&record))
            .await
            .map_err(op)?;
        http::read_json(response).await.map_err(op)?;
        Ok(())
    }

    async fn remove(&self, doc_type: &str, doc_id: &str, _options: WriteOptions) -> Result<()> {
        let op = |e: Error| e.in_operation(Operation::Remove, &self.index_name);
        self.ensure_collection().await?;

        let key = layout::document_key(doc_type, doc_id);
        let url = self
            .url(&["collections", &self.collection, "documents", &key])
            .map_err(op)?;
        let response = http::send(self.request(Method::DELETE, url))
            .await
            .map_err(op)?;
        if response.status() == StatusCode::NOT_FOUND {
            log::debug!("Remove of {doc_type}/{doc_id} from '{}' matched nothing", self.collection);
            return Ok(());
        }
        http::read_json(response).await.map_err(op)?;
        Ok(())
    }

    async fn search(&self, criteria: &Criteria) -> Result<ResultEnvelope> {
        let op = |e: Error| e.in_operation(Operation::Search, &self.index_name);
        let plan = plan(criteria, &Capabilities::typesense()).map_err(op)?;
        if plan.matches_nothing() {
            return Ok(ResultEnvelope::empty(0));
        }
        self.ensure_collection().await?;

        let fields = if filter::needs_schema(&plan) {
            self.schema_fields().await.map_err(op)?
        } else {
            BTreeSet::new()
        };
        let Some(params) = filter::search_params(&plan, &fields).map_err(op)? else {
            log::debug!("Typesense query on '{}' cannot match", self.collection);
            return Ok(normalize::nothing(&plan));
        };

        let mut url = self
            .url(&["collections", &self.collection, "documents", "search"])
            .map_err(op)?;
        url.query_pairs_mut().extend_pairs(&params);
        log::debug!("Typesense query on '{}': {params:?}", self.collection);
        let response = http::send(self.request(Method::GET, url))
            .await
            .map_err(op)?;
        let raw: Json = http::read_json(response).await.map_err(op)?;
        normalize::envelope(&raw, &plan).map_err(op)
    }
}

// ============================================================================
// Tests
// ============================================================================
