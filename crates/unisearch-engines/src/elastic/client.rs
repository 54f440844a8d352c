//! The Elasticsearch engine.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use tokio::sync::OnceCell;
use unisearch_core::{
    BackendKind, Criteria, Document, Engine, EngineConfig, Error, Operation, Result,
    ResultEnvelope, WriteOptions,
};
use unisearch_query::{Capabilities, plan};

use super::{dsl, normalize};
use crate::{document_id, http};

/// Engine backed by one Elasticsearch index.
///
/// The index is created on first use with a mapping that keeps `content`
/// strings analysed and every other string exact. Creation is idempotent:
/// an index that already exists is accepted.
pub struct ElasticsearchEngine {
    index_name: String,
    id_field: String,
    refresh_always: bool,
    base_url: Url,
    credentials: Option<(String, Option<String>)>,
    client: Client,
    ready: OnceCell<()>,
}

impl ElasticsearchEngine {
    /// Create an engine for `index_name` from the `[elasticsearch]` section.
    ///
    /// No request is made until the first operation.
    pub fn new(config: &EngineConfig, index_name: &str) -> Result<Self> {
        let es = &config.elasticsearch;
        Ok(Self {
            index_name: index_name.to_string(),
            id_field: config.id_field.clone(),
            refresh_always: es.refresh,
            base_url: http::parse_base_url(&es.url)?,
            credentials: es
                .username
                .clone()
                .map(|user| (user, es.password.clone())),
            client: http::build_client(es.timeout_secs)?,
            ready: OnceCell::new(),
        })
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.credentials {
            Some((user, password)) => builder.basic_auth(user, password.as_ref()),
            None => builder,
        }
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        http::endpoint(&self.base_url, segments)
    }

    fn write_url(&self, segments: &[&str], options: WriteOptions) -> Result<Url> {
        let mut url = self.url(segments)?;
        if options.refresh || self.refresh_always {
            url.query_pairs_mut().append_pair("refresh", "true");
        }
        Ok(url)
    }

    async fn ensure_index(&self) -> Result<()> {
        self.ready
            .get_or_try_init(|| self.create_index())
            .await
            .map(|_| ())
            .map_err(|e| e.in_operation(Operation::CreateIndex, &self.index_name))
    }

    async fn create_index(&self) -> Result<()> {
        let url = self.url(&[&self.index_name])?;
        let response =
            http::send(self.request(Method::PUT, url).json(&dsl::index_mapping())).await?;
        let status = response.status();
        if status.is_success() {
            log::info!("Created Elasticsearch index '{}'", self.index_name);
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::BAD_REQUEST && body.contains("resource_already_exists_exception")
        {
            log::debug!("Elasticsearch index '{}' already exists", self.index_name);
            return Ok(());
        }
        Err(http::status_error(status, &body))
    }
}

impl std::fmt::Debug for ElasticsearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticsearchEngine")
            .field("index_name", &self.index_name)
            .field("base_url", &self.base_url.as_str())
            .field("refresh_always", &self.refresh_always)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Engine for ElasticsearchEngine {
    fn index_name(&self) -> &str {
        &self.index_name
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Elasticsearch
    }

    async fn index(&self, doc_type: &str, document: Document, options: WriteOptions) -> Result<()> {
        let op = |e: Error| e.in_operation(Operation::Index, &self.index_name);
        let id = document_id(&document, &self.id_field, doc_type).map_err(op)?;
        self.ensure_index().await?;

        let key = dsl::document_key(doc_type, &id);
        let url = self
            .write_url(&[&self.index_name, "_doc", &key], options)
            .map_err(op)?;
        log::debug!("Indexing {key} into Elasticsearch index '{}'", self.index_name);
        let body = dsl::stored_source(doc_type, &document);
        let response = http::send(self.request(Method::PUT, url).json(&body))
            .await
            .map_err(op)?;
        http::read_json(response).await.map_err(op)?;
        Ok(())
    }

    async fn remove(&self, doc_type: &str, doc_id: &str, options: WriteOptions) -> Result<()> {
        let op = |e: Error| e.in_operation(Operation::Remove, &self.index_name);
        self.ensure_index().await?;

        let key = dsl::document_key(doc_type, doc_id);
        let url = self
            .write_url(&[&self.index_name, "_doc", &key], options)
            .map_err(op)?;
        let response = http::send(self.request(Method::DELETE, url))
            .await
            .map_err(op)?;
        if response.status() == StatusCode::NOT_FOUND {
            log::debug!("Remove of {key} from '{}' matched nothing", self.index_name);
            return Ok(());
        }
        http::read_json(response).await.map_err(op)?;
        Ok(())
    }

    async fn search(&self, criteria: &Criteria) -> Result<ResultEnvelope> {
        let op = |e: Error| e.in_operation(Operation::Search, &self.index_name);
        let plan = plan(criteria, &Capabilities::elasticsearch()).map_err(op)?;
        self.ensure_index().await?;

        let url = self.url(&[&self.index_name, "_search"]).map_err(op)?;
        let body = dsl::search_body(&plan);
        log::debug!("Elasticsearch query on '{}': {body}", self.index_name);
        let response = http::send(self.request(Method::POST, url).json(&body))
            .await
            .map_err(op)?;
        let raw = http::read_json(response).await.map_err(op)?;
        normalize::envelope(&raw, &plan).map_err(op)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use unisearch_core::{Criteria, ElasticsearchConfig};
    use wiremock::matchers::{body_partial_json, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(url: &str) -> EngineConfig {
        EngineConfig {
            elasticsearch: ElasticsearchConfig {
                url: url.to_string(),
                ..ElasticsearchConfig::default()
            },
            ..EngineConfig::default()
        }
    }

    async fn server_with_index() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/courses"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"acknowledged": true})))
            .expect(1)
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_index_creates_index_once_and_puts_wrapped_document() {
        let server = server_with_index().await;
        Mock::given(method("PUT"))
            .and(path("/courses/_doc/course:a%2Fb"))
            .and(query_param("refresh", "true"))
            .and(body_partial_json(json!({"doc_type": "course", "document": {"id": "a/b"}})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"result": "created"})))
            .expect(2)
            .mount(&server)
            .await;

        let engine = ElasticsearchEngine::new(&config(&server.uri()), "courses").unwrap();
        let document = Document::new().with("id", "a/b");
        engine
            .index("course", document.clone(), WriteOptions::refreshed())
            .await
            .unwrap();
        engine
            .index("course", document, WriteOptions::refreshed())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_existing_index_is_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/courses"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"type": "resource_already_exists_exception", "reason": "index [courses] already exists"},
                "status": 400
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/courses/_doc/course:gone"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"result": "not_found"})))
            .mount(&server)
            .await;

        let engine = ElasticsearchEngine::new(&config(&server.uri()), "courses").unwrap();
        engine
            .remove("course", "gone", WriteOptions::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_search_posts_dsl_and_normalizes() {
        let server = server_with_index().await;
        Mock::given(method("POST"))
            .and(path("/courses/_search"))
            .and(body_partial_json(json!({"from": 0, "size": 10, "track_total_hits": true})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "took": 4,
                "hits": {
                    "total": {"value": 1, "relation": "eq"},
                    "max_score": 1.0,
                    "hits": [{"_id": "course:a", "_score": 1.0, "_source": {"doc_type": "course", "document": {"id": "a", "org": "edX"}}}]
                }
            })))
            .mount(&server)
            .await;

        let engine = ElasticsearchEngine::new(&config(&server.uri()), "courses").unwrap();
        let criteria = Criteria::builder().field("org", "edX").doc_type("course").build();
        let envelope = engine.search(&criteria).await.unwrap();
        assert_eq!(envelope.took_ms, 4);
        assert_eq!(envelope.ids("id"), vec!["a"]);

        let requests = server.received_requests().await.unwrap();
        let search = requests.iter().find(|r| r.url.path() == "/courses/_search").unwrap();
        let body: serde_json::Value = serde_json::from_slice(&search.body).unwrap();
        assert_eq!(
            body["query"]["bool"]["filter"],
            json!([{"term": {"doc_type": "course"}}, {"term": {"document.org": "edX"}}])
        );
    }

    #[tokio::test]
    async fn test_backend_rejection_is_backend_query_error() {
        let server = server_with_index().await;
        Mock::given(method("POST"))
            .and(path("/courses/_search"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"root_cause": [{"reason": "failed to create query"}], "reason": "all shards failed"},
                "status": 400
            })))
            .mount(&server)
            .await;

        let engine = ElasticsearchEngine::new(&config(&server.uri()), "courses").unwrap();
        let err = engine.search(&Criteria::default()).await.unwrap_err();
        assert!(matches!(err, Error::BackendQuery { status: Some(400), .. }));
        assert_eq!(
            err.to_string(),
            "Backend query error [search on 'courses'] (HTTP 400): failed to create query"
        );
    }

    #[tokio::test]
    async fn test_invalid_criteria_makes_no_request() {
        let server = MockServer::start().await;
        let engine = ElasticsearchEngine::new(&config(&server.uri()), "courses").unwrap();
        let criteria = Criteria::builder().size(100).from(9_950).build();
        let err = engine.search(&criteria).await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_basic_auth_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/courses"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "deleted"})))
            .mount(&server)
            .await;

        let mut config = config(&server.uri());
        config.elasticsearch.username = Some("elastic".to_string());
        config.elasticsearch.password = Some("changeme".to_string());
        let engine = ElasticsearchEngine::new(&config, "courses").unwrap();
        engine.remove("course", "a", WriteOptions::default()).await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_cluster_is_unavailable() {
        let engine = ElasticsearchEngine::new(&config("http://127.0.0.1:1"), "courses").unwrap();
        let err = engine.search(&Criteria::default()).await.unwrap_err();
        assert!(err.is_retryable());
        let context = err.context().unwrap();
        assert_eq!(context.operation, Some(Operation::CreateIndex));
        assert_eq!(context.index.as_deref(), Some("courses"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
