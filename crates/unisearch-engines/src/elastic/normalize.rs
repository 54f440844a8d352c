//! Elasticsearch `_search` response to [`ResultEnvelope`].
//!
//! `took` is already in milliseconds and is kept as is. `hits.total` may be
//! a bare number (6.x) or `{"value": n}` (7.x and later). A `null`
//! `max_score`, reported when nothing matched, becomes `0.0`. Each hit's
//! `_source.document` is the caller's document, returned untouched.

use std::collections::BTreeMap;

use serde_json::Value as Json;
use unisearch_core::{AggregationResult, Document, Error, Result, ResultEnvelope, ResultItem};
use unisearch_query::SearchPlan;

use super::dsl::{DOCUMENT_FIELD, aggregation_name};

/// Build the envelope for a raw response to `plan`'s request.
pub(crate) fn envelope(raw: &Json, plan: &SearchPlan) -> Result<ResultEnvelope> {
    let hits = &raw["hits"];
    let total = match &hits["total"] {
        Json::Object(total) => total.get("value").and_then(Json::as_u64),
        other => other.as_u64(),
    }
    .unwrap_or(0);

    let results = match hits["hits"].as_array() {
        Some(hits) => hits.iter().map(hit).collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };

    let mut aggs = BTreeMap::new();
    for (i, aggregation) in plan.aggregations.iter().enumerate() {
        let raw_agg = &raw["aggregations"][aggregation_name(i)];
        aggs.insert(aggregation.path.to_string(), terms(raw_agg));
    }

    Ok(ResultEnvelope {
        took_ms: raw["took"].as_u64().unwrap_or(0),
        total,
        max_score: hits["max_score"].as_f64().unwrap_or(0.0),
        results,
        aggs,
    })
}

fn hit(raw: &Json) -> Result<ResultItem> {
    let stored = raw["_source"].get(DOCUMENT_FIELD).cloned().ok_or_else(|| {
        Error::backend_query(None, format!("hit {} carries no stored document", raw["_id"]))
    })?;
    let data = Document::from_json(stored).map_err(|e| {
        Error::backend_query(None, format!("hit {} is not a document: {e}", raw["_id"]))
    })?;
    Ok(ResultItem {
        score: raw["_score"].as_f64().unwrap_or(0.0),
        data,
    })
}

fn terms(raw: &Json) -> AggregationResult {
    let mut result = AggregationResult::default();
    for bucket in raw["buckets"].as_array().into_iter().flatten() {
        let key = match (&bucket["key_as_string"], &bucket["key"]) {
            (Json::String(key), _) | (_, Json::String(key)) => key.clone(),
            (_, other) => other.to_string(),
        };
        let count = bucket["doc_count"].as_u64().unwrap_or(0);
        result.total += count;
        result.terms.insert(key, count);
    }
    result.other = raw["sum_other_doc_count"].as_u64().unwrap_or(0);
    result.total += result.other;
    result
}
