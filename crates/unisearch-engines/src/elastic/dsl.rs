//! Plan to Elasticsearch query DSL.
//!
//! Documents are stored wrapped as `{"doc_type": .., "document": {..}}`, so
//! every plan path is addressed under `document.`. The index mapping sends
//! strings under `document.content` to analysed `text` fields and every
//! other string to an exact `keyword`, which gives `term` queries exact
//! match semantics. Multivalue containment falls out of Elasticsearch's
//! array indexing.

use serde_json::{Map, Value as Json, json};
use unisearch_core::{Document, FieldPath};
use unisearch_query::{Condition, Scalar, SearchPlan, Test};

/// Stored field holding the document type.
pub(crate) const DOC_TYPE_FIELD: &str = "doc_type";

/// Stored field holding the caller's document.
pub(crate) const DOCUMENT_FIELD: &str = "document";

/// Bucket cap for aggregations that do not set one.
const DEFAULT_AGGREGATION_BUCKETS: usize = 10_000;

/// Elasticsearch `_id` for a document.
pub(crate) fn document_key(doc_type: &str, id: &str) -> String {
    format!("{doc_type}:{id}")
}

/// Stored `_source` for a document.
pub(crate) fn stored_source(doc_type: &str, document: &Document) -> Json {
    json!({
        DOC_TYPE_FIELD: doc_type,
        DOCUMENT_FIELD: document.to_json(),
    })
}

/// Body for index creation.
pub(crate) fn index_mapping() -> Json {
    json!({
        "mappings": {
            "dynamic_templates": [
                {
                    "content_text": {
                        "path_match": "document.content.*",
                        "match_mapping_type": "string",
                        "mapping": {"type": "text"}
                    }
                },
                {
                    "content_root_text": {
                        "path_match": "document.content",
                        "match_mapping_type": "string",
                        "mapping": {"type": "text"}
                    }
                },
                {
                    "strings_as_keywords": {
                        "match_mapping_type": "string",
                        "mapping": {"type": "keyword"}
                    }
                }
            ],
            "properties": {
                DOC_TYPE_FIELD: {"type": "keyword"}
            }
        }
    })
}

/// Full `_search` body for a plan.
pub(crate) fn search_body(plan: &SearchPlan) -> Json {
    let text = match &plan.text {
        Some(query) if query.is_empty() => json!({"match_none": {}}),
        Some(query) => json!({
            "query_string": {
                "query": query.joined(),
                "fields": ["document.content", "document.content.*"]
            }
        }),
        None => json!({"match_all": {}}),
    };

    let mut filter: Vec<Json> = Vec::new();
    if let Some(doc_type) = &plan.doc_type {
        filter.push(keyed("term", keyed(DOC_TYPE_FIELD, json!(doc_type))));
    }
    filter.extend(plan.must.iter().map(clause));
    filter.extend(plan.filters.iter().map(or_missing));
    let must_not: Vec<Json> = plan.exclude.iter().map(clause).collect();

    let mut body = json!({
        "query": {
            "bool": {
                "must": [text],
                "filter": filter,
                "must_not": must_not
            }
        },
        "from": plan.page.from,
        "size": plan.page.size,
        "track_total_hits": true
    });
    if !plan.aggregations.is_empty() {
        body["aggs"] = aggregations(plan);
    }
    body
}

/// Name under which the `index`th aggregation is requested.
///
/// Field paths contain dots, which aggregation names cannot safely carry.
pub(crate) fn aggregation_name(index: usize) -> String {
    format!("agg_{index}")
}

fn aggregations(plan: &SearchPlan) -> Json {
    let mut aggs = Map::new();
    for (i, aggregation) in plan.aggregations.iter().enumerate() {
        aggs.insert(
            aggregation_name(i),
            json!({
                "terms": {
                    "field": field_name(&aggregation.path),
                    "size": aggregation.size.unwrap_or(DEFAULT_AGGREGATION_BUCKETS)
                }
            }),
        );
    }
    Json::Object(aggs)
}

fn field_name(path: &FieldPath) -> String {
    format!("{DOCUMENT_FIELD}.{path}")
}

fn keyed(key: &str, value: Json) -> Json {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    Json::Object(map)
}

fn clause(condition: &Condition) -> Json {
    let field = field_name(&condition.path);
    match &condition.test {
        Test::Equals(value) => keyed("term", keyed(&field, value.to_json())),
        Test::AnyOf(values) => keyed(
            "terms",
            keyed(&field, values.iter().map(Scalar::to_json).collect()),
        ),
        Test::Range(bounds) => {
            let mut range = Map::new();
            if let Some(lower) = &bounds.lower {
                range.insert("gte".to_string(), lower.to_json());
            }
            if let Some(upper) = &bounds.upper {
                range.insert("lte".to_string(), upper.to_json());
            }
            keyed("range", keyed(&field, Json::Object(range)))
        }
        Test::Exists => json!({"exists": {"field": field}}),
    }
}

fn or_missing(condition: &Condition) -> Json {
    let field = field_name(&condition.path);
    json!({
        "bool": {
            "should": [
                clause(condition),
                {"bool": {"must_not": {"exists": {"field": field}}}}
            ],
            "minimum_should_match": 1
        }
    })
}
