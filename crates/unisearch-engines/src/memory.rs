//! In-memory reference engine.
//!
//! Executes the same plan semantics as the backend adapters by linear scan
//! over a held document list, with no network dependency. It is the default
//! engine and the correctness oracle the adapters are tested against.
//!
//! # Scoring
//!
//! Without a free-text query every match scores `1.0`. With one, a document
//! scores the number of distinct query terms found (case-insensitively, as
//! substrings) in the text under its `content` field; documents matching no
//! term are not hits. Hits are ordered by descending score, ties by
//! insertion order. Re-indexing a document moves it to the end.
//!
//! # Persistence
//!
//! With a snapshot path, the document list is loaded on construction and
//! rewritten as JSON after every change. A change becomes visible only
//! once its snapshot write has succeeded. A snapshot written for another
//! index is refused.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use unisearch_core::{
    AggregationResult, BackendKind, Criteria, Document, Engine, EngineConfig, Error, Operation,
    Result, ResultEnvelope, ResultItem, WriteOptions,
};
use unisearch_query::{Capabilities, SearchPlan, TextQuery, plan, strip_reserved};

use crate::document_id;

/// A document together with its key.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredDocument {
    doc_type: String,
    id: String,
    document: Document,
}

/// On-disk snapshot format.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    index: String,
    documents: Vec<StoredDocument>,
}

/// The reference engine.
pub struct MemoryEngine {
    index_name: String,
    id_field: String,
    snapshot_path: Option<PathBuf>,
    documents: RwLock<Vec<StoredDocument>>,
}

impl MemoryEngine {
    /// Create an empty engine using `id` as the id field.
    pub fn new(index_name: impl Into<String>) -> Self {
        Self {
            index_name: index_name.into(),
            id_field: "id".to_string(),
            snapshot_path: None,
            documents: RwLock::new(Vec::new()),
        }
    }

    /// Use `id_field` to resolve document ids.
    pub fn with_id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = id_field.into();
        self
    }

    /// Back the engine with a JSON snapshot, loading it if it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing snapshot cannot be read or parsed,
    /// or was written for a different index.
    pub fn with_snapshot(mut self, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(snapshot) = load_snapshot(&path)? {
            if snapshot.index != self.index_name {
                return Err(Error::config(format!(
                    "snapshot {} holds index '{}', not '{}'",
                    path.display(),
                    snapshot.index,
                    self.index_name
                )));
            }
            log::info!(
                "Loaded {} documents for index '{}' from {}",
                snapshot.documents.len(),
                self.index_name,
                path.display()
            );
            self.documents = RwLock::new(snapshot.documents);
        }
        self.snapshot_path = Some(path);
        Ok(self)
    }

    /// Build from configuration.
    pub fn from_config(config: &EngineConfig, index_name: &str) -> Result<Self> {
        let engine = Self::new(index_name).with_id_field(config.id_field.clone());
        match &config.memory.snapshot_path {
            Some(path) => engine.with_snapshot(path.clone()),
            None => Ok(engine),
        }
    }

    /// Number of documents held.
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    /// Returns `true` when no documents are held.
    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    async fn persist(&self, documents: &[StoredDocument]) -> Result<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let snapshot = Snapshot {
            index: self.index_name.clone(),
            documents: documents.to_vec(),
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io_with_path(e, parent))?;
        }
        let json = serde_json::to_vec_pretty(&snapshot)?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| Error::io_with_path(e, path))?;
        log::debug!(
            "Wrote {} documents to snapshot {}",
            documents.len(),
            path.display()
        );
        Ok(())
    }

    fn execute(&self, plan: &SearchPlan, documents: &[StoredDocument]) -> ResultEnvelope {
        let mut hits: Vec<(f64, &Document)> = documents
            .iter()
            .filter(|stored| {
                plan.doc_type
                    .as_deref()
                    .is_none_or(|doc_type| stored.doc_type == doc_type)
            })
            .filter(|stored| plan.admits(&stored.document))
            .filter_map(|stored| {
                text_score(plan.text.as_ref(), &stored.document).map(|s| (s, &stored.document))
            })
            .collect();
        hits.sort_by(|a, b| b.0.total_cmp(&a.0));

        let aggs = aggregate(plan, &hits);
        let results = hits
            .iter()
            .skip(plan.page.from)
            .take(plan.page.size)
            .map(|(score, document)| ResultItem {
                score: *score,
                data: (*document).clone(),
            })
            .collect();

        ResultEnvelope {
            took_ms: 0,
            total: hits.len() as u64,
            max_score: hits.first().map_or(0.0, |(score, _)| *score),
            results,
            aggs,
        }
    }
}

impl std::fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEngine")
            .field("index_name", &self.index_name)
            .field("id_field", &self.id_field)
            .field("snapshot_path", &self.snapshot_path)
            .finish()
    }
}

fn load_snapshot(path: &Path) -> Result<Option<Snapshot>> {
    if !path.exists() {
        return Ok(None);
    }
    let json = std::fs::read_to_string(path).map_err(|e| Error::io_with_path(e, path))?;
    let snapshot: Snapshot = serde_json::from_str(&json)?;
    Ok(Some(snapshot))
}

/// Score a document against the text query, or `None` if it does not match.
fn text_score(text: Option<&TextQuery>, document: &Document) -> Option<f64> {
    let Some(query) = text else {
        return Some(1.0);
    };
    let content = document.get("content")?;
    let mut leaves = Vec::new();
    content.collect_text(&mut leaves);
    let haystacks: Vec<String> = leaves
        .into_iter()
        .map(|leaf| strip_reserved(&leaf.to_lowercase()))
        .collect();
    let matched = query
        .terms
        .iter()
        .filter(|term| haystacks.iter().any(|h| h.contains(term.as_str())))
        .count();
    (matched > 0).then_some(matched as f64)
}

fn aggregate(plan: &SearchPlan, hits: &[(f64, &Document)]) -> BTreeMap<String, AggregationResult> {
    plan.aggregations
        .iter()
        .map(|aggregation| {
            let mut counts: BTreeMap<String, u64> = BTreeMap::new();
            for (_, document) in hits {
                for leaf in document.resolve(&aggregation.path) {
                    if let Some(key) = leaf.key_string() {
                        *counts.entry(key).or_default() += 1;
                    }
                }
            }
            (
                aggregation.path.to_string(),
                AggregationResult::from_counts(counts, aggregation.size),
            )
        })
        .collect()
}

#[async_trait]
impl Engine for MemoryEngine {
    fn index_name(&self) -> &str {
        &self.index_name
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn index(&self, doc_type: &str, document: Document, _options: WriteOptions) -> Result<()> {
        let op = |e: Error| e.in_operation(Operation::Index, &self.index_name);
        let id = document_id(&document, &self.id_field, doc_type).map_err(op)?;
        log::debug!(
            "Indexing {doc_type}/{id} into memory index '{}'",
            self.index_name
        );

        let mut documents = self.documents.write().await;
        let mut updated: Vec<StoredDocument> = documents
            .iter()
            .filter(|stored| !(stored.doc_type == doc_type && stored.id == id))
            .cloned()
            .collect();
        updated.push(StoredDocument {
            doc_type: doc_type.to_string(),
            id,
            document,
        });
        self.persist(&updated).await.map_err(op)?;
        *documents = updated;
        Ok(())
    }

    async fn remove(&self, doc_type: &str, doc_id: &str, _options: WriteOptions) -> Result<()> {
        let mut documents = self.documents.write().await;
        let updated: Vec<StoredDocument> = documents
            .iter()
            .filter(|stored| !(stored.doc_type == doc_type && stored.id == doc_id))
            .cloned()
            .collect();
        if updated.len() == documents.len() {
            log::debug!(
                "Remove of {doc_type}/{doc_id} from '{}' matched nothing",
                self.index_name
            );
            return Ok(());
        }
        self.persist(&updated)
            .await
            .map_err(|e| e.in_operation(Operation::Remove, &self.index_name))?;
        *documents = updated;
        Ok(())
    }

    async fn search(&self, criteria: &Criteria) -> Result<ResultEnvelope> {
        let started = Instant::now();
        let plan = plan(criteria, &Capabilities::reference())
            .map_err(|e| e.in_operation(Operation::Search, &self.index_name))?;

        let mut envelope = if plan.matches_nothing() {
            ResultEnvelope::default()
        } else {
            let documents = self.documents.read().await;
            self.execute(&plan, &documents)
        };
        envelope.took_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        log::debug!(
            "Memory search on '{}': {} of {} hits returned",
            self.index_name,
            envelope.results.len(),
            envelope.total
        );
        Ok(envelope)
    }
}

// ============================================================================
// Tests
// ============================================================================
