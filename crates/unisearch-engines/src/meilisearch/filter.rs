//! Plan to Meilisearch request bodies.
//!
//! Meilisearch has no query tree, only a free-text `q` and a filter
//! expression string. Conditions render as filter clauses joined with
//! `AND`; a filter entry becomes `(missing OR condition)` and an exclusion
//! becomes `NOT (condition)`. A field counts as missing when it does not
//! exist, is `null`, or is an empty list or object. `IS EMPTY` also holds
//! for `""`, which is a present value, so the empty string is carved back
//! out of both tests.
//!
//! Documents are stored as `{"key": .., "doc_type": .., "document": {..}}`,
//! where `key` is a BLAKE3 digest of the type and id. Meilisearch primary
//! keys only allow `[A-Za-z0-9_-]`, so raw ids cannot be used directly.

use serde_json::{Value as Json, json};
use unisearch_core::{Document, FieldPath};
use unisearch_query::{Bound, Condition, Scalar, SearchPlan, Test};

/// Primary key field of stored documents.
pub(crate) const KEY_FIELD: &str = "key";

/// Stored field holding the document type.
pub(crate) const DOC_TYPE_FIELD: &str = "doc_type";

/// Stored field holding the caller's document.
pub(crate) const DOCUMENT_FIELD: &str = "document";

/// Primary key for a document.
pub(crate) fn document_key(doc_type: &str, id: &str) -> String {
    blake3::hash(format!("{doc_type}\u{1f}{id}").as_bytes())
        .to_hex()
        .to_string()
}

/// Stored form of a document.
pub(crate) fn stored_document(doc_type: &str, id: &str, document: &Document) -> Json {
    json!({
        KEY_FIELD: document_key(doc_type, id),
        DOC_TYPE_FIELD: doc_type,
        DOCUMENT_FIELD: document.to_json(),
    })
}

/// Index settings applied on creation.
pub(crate) fn index_settings() -> Json {
    json!({
        "filterableAttributes": [DOC_TYPE_FIELD, DOCUMENT_FIELD],
        "searchableAttributes": ["document.content"]
    })
}

/// Stored attribute name for a plan path.
pub(crate) fn attribute(path: &FieldPath) -> String {
    format!("{DOCUMENT_FIELD}.{path}")
}

/// Body for `POST /indexes/{uid}/search`.
pub(crate) fn search_body(plan: &SearchPlan) -> Json {
    let mut body = json!({
        "offset": plan.page.from,
        "limit": plan.page.size,
        "showRankingScore": true
    });
    if let Some(text) = &plan.text {
        body["q"] = json!(text.joined());
    }
    if let Some(filter) = filter_expression(plan) {
        body["filter"] = json!(filter);
    }
    if !plan.aggregations.is_empty() {
        let facets: Vec<String> = plan
            .aggregations
            .iter()
            .map(|aggregation| attribute(&aggregation.path))
            .collect();
        body["facets"] = json!(facets);
    }
    body
}

/// The filter expression for a plan, or `None` when nothing is filtered.
pub(crate) fn filter_expression(plan: &SearchPlan) -> Option<String> {
    let mut clauses: Vec<String> = Vec::new();
    if let Some(doc_type) = &plan.doc_type {
        clauses.push(format!("{DOC_TYPE_FIELD} = {}", quote(doc_type)));
    }
    clauses.extend(plan.must.iter().map(condition));
    clauses.extend(plan.filters.iter().map(|c| {
        format!("({} OR {})", missing(&attribute(&c.path)), condition(c))
    }));
    clauses.extend(plan.exclude.iter().map(|c| format!("NOT {}", condition(c))));

    if clauses.is_empty() {
        None
    } else {
        Some(clauses.join(" AND "))
    }
}

fn condition(condition: &Condition) -> String {
    let field = attribute(&condition.path);
    match &condition.test {
        Test::Equals(value) => format!("({field} = {})", literal(value)),
        Test::AnyOf(values) => {
            let values: Vec<String> = values.iter().map(literal).collect();
            format!("({field} IN [{}])", values.join(", "))
        }
        Test::Range(bounds) => {
            let mut parts = Vec::new();
            if let Some(lower) = &bounds.lower {
                parts.push(format!("{field} >= {}", bound(lower)));
            }
            if let Some(upper) = &bounds.upper {
                parts.push(format!("{field} <= {}", bound(upper)));
            }
            format!("({})", parts.join(" AND "))
        }
        Test::Exists => {
            format!(
                "({field} EXISTS AND {field} IS NOT NULL AND ({field} IS NOT EMPTY OR {field} = \"\"))"
            )
        }
    }
}

fn missing(field: &str) -> String {
    format!("({field} NOT EXISTS OR {field} IS NULL OR ({field} IS EMPTY AND {field} != \"\"))")
}

fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

fn literal(value: &Scalar) -> String {
    match value {
        Scalar::Bool(b) => b.to_string(),
        Scalar::Integer(i) => i.to_string(),
        Scalar::Float(f) => f.to_string(),
        Scalar::Text(s) => quote(s),
    }
}

fn bound(value: &Bound) -> String {
    match value {
        Bound::Integer(i) => i.to_string(),
        Bound::Float(f) => f.to_string(),
        Bound::Text(s) => quote(s),
        Bound::Instant(dt) => dt.timestamp().to_string(),
    }
}
