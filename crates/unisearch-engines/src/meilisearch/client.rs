//! The Meilisearch engine.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde_json::{Value as Json, json};
use tokio::sync::OnceCell;
use unisearch_core::{
    BackendKind, Criteria, Document, Engine, EngineConfig, Error, Operation, Result,
    ResultEnvelope, WriteOptions,
};
use unisearch_query::{Capabilities, plan};

use super::{filter, normalize};
use crate::{document_id, http};

const TASK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Engine backed by one Meilisearch index.
///
/// Meilisearch applies writes asynchronously through its task queue. A
/// write returns once the task is enqueued, unless
/// [`WriteOptions::refresh`] asks to wait for the task to finish.
pub struct MeilisearchEngine {
    index_name: String,
    id_field: String,
    base_url: Url,
    api_key: Option<String>,
    task_timeout: Duration,
    client: Client,
    ready: OnceCell<()>,
}

impl MeilisearchEngine {
    /// Create an engine for `index_name` from the `[meilisearch]` section.
    ///
    /// # Errors
    ///
    /// `Config` when the URL is invalid or `index_name` is not a valid
    /// Meilisearch index uid.
    pub fn new(config: &EngineConfig, index_name: &str) -> Result<Self> {
        let meili = &config.meilisearch;
        if index_name.is_empty()
            || !index_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(Error::config(format!(
                "'{index_name}' is not a valid Meilisearch index uid"
            )));
        }
        Ok(Self {
            index_name: index_name.to_string(),
            id_field: config.id_field.clone(),
            base_url: http::parse_base_url(&meili.url)?,
            api_key: meili.api_key.clone(),
            task_timeout: Duration::from_secs(meili.timeout_secs),
            client: http::build_client(meili.timeout_secs)?,
            ready: OnceCell::new(),
        })
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        http::endpoint(&self.base_url, segments)
    }

    async fn call(&self, method: Method, segments: &[&str], body: Option<&Json>) -> Result<Json> {
        let mut request = self.request(method, self.url(segments)?);
        if let Some(body) = body {
            request = request.json(body);
        }
        http::read_json(http::send(request).await?).await
    }

    async fn ensure_index(&self) -> Result<()> {
        self.ready
            .get_or_try_init(|| self.create_index())
            .await
            .map(|_| ())
            .map_err(|e| e.in_operation(Operation::CreateIndex, &self.index_name))
    }

    async fn create_index(&self) -> Result<()> {
        let create = json!({"uid": self.index_name, "primaryKey": filter::KEY_FIELD});
        self.call(Method::POST, &["indexes"], Some(&create)).await?;
        let task = self
            .call(
                Method::PATCH,
                &["indexes", &self.index_name, "settings"],
                Some(&filter::index_settings()),
            )
            .await?;
        self.wait_for_task(&task).await?;
        log::info!("Prepared Meilisearch index '{}'", self.index_name);
        Ok(())
    }

    /// Poll the task named in an enqueue response until it finishes.
    async fn wait_for_task(&self, enqueued: &Json) -> Result<()> {
        let uid = enqueued["taskUid"]
            .as_u64()
            .ok_or_else(|| Error::backend_query(None, "response carries no taskUid"))?
            .to_string();
        let deadline = Instant::now() + self.task_timeout;
        loop {
            let task = self.call(Method::GET, &["tasks", &uid], None).await?;
            match task["status"].as_str() {
                Some("succeeded") => return Ok(()),
                Some("failed") | Some("canceled") => {
                    let message = task["error"]["message"]
                        .as_str()
                        .unwrap_or("task did not succeed");
                    return Err(Error::backend_query(None, message));
                }
                _ if Instant::now() >= deadline => {
                    return Err(Error::unavailable(format!(
                        "timed out waiting for task {uid}"
                    )));
                }
                _ => tokio::time::sleep(TASK_POLL_INTERVAL).await,
            }
        }
    }
}

impl std::fmt::Debug for MeilisearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeilisearchEngine")
            .field("index_name", &self.index_name)
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Engine for MeilisearchEngine {
    fn index_name(&self) -> &str {
        &self.index_name
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Meilisearch
    }

    async fn index(&self, doc_type: &str, document: Document, options: WriteOptions) -> Result<()> {
        let op = |e: Error| e.in_operation(Operation::Index, &self.index_name);
        let id = document_id(&document, &self.id_field, doc_type).map_err(op)?;
        self.ensure_index().await?;

        log::debug!("Indexing {doc_type}/{id} into Meilisearch index '{}'", self.index_name);
        let body = json!([filter::stored_document(doc_type, &id, &document)]);
        let task = self
            .call(
                Method::POST,
                &["indexes", &self.index_name, "documents"],
                Some(&body),
            )
            .await
            .map_err(op)?;
        if options.refresh {
            self.wait_for_task(&task).await.map_err(op)?;
        }
        Ok(())
    }

    async fn remove(&self, doc_type: &str, doc_id: &str, options: WriteOptions) -> Result<()> {
        let op = |e: Error| e.in_operation(Operation::Remove, &self.index_name);
        self.ensure_index().await?;

        let key = filter::document_key(doc_type, doc_id);
        let url = self
            .url(&["indexes", &self.index_name, "documents", &key])
            .map_err(op)?;
        let response = http::send(self.request(Method::DELETE, url))
            .await
            .map_err(op)?;
        if response.status() == StatusCode::NOT_FOUND {
            log::debug!("Remove of {doc_type}/{doc_id} from '{}' matched nothing", self.index_name);
            return Ok(());
        }
        let task = http::read_json(response).await.map_err(op)?;
        if options.refresh {
            self.wait_for_task(&task).await.map_err(op)?;
        }
        Ok(())
    }

    async fn search(&self, criteria: &Criteria) -> Result<ResultEnvelope> {
        let op = |e: Error| e.in_operation(Operation::Search, &self.index_name);
        let plan = plan(criteria, &Capabilities::meilisearch()).map_err(op)?;
        if plan.matches_nothing() {
            return Ok(ResultEnvelope::empty(0));
        }
        self.ensure_index().await?;

        let body = filter::search_body(&plan);
        log::debug!("Meilisearch query on '{}': {body}", self.index_name);
        let raw = self
            .call(
                Method::POST,
                &["indexes", &self.index_name, "search"],
                Some(&body),
            )
            .await
            .map_err(op)?;
        normalize::envelope(&raw, &plan).map_err(op)
    }
}

// ============================================================================
// Tests
// ============================================================================
