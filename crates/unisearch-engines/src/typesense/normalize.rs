//! Typesense search response to [`ResultEnvelope`].
//!
//! `search_time_ms` becomes `took_ms` and `found` becomes `total`. Hits
//! return the document parsed back from its stored `source` string. With a
//! text query the score is Typesense's `text_match`; without one every hit
//! scores `1.0`. Facet counts come back per `f_*` field and are mapped to
//! their aggregation paths, then capped client-side.

use std::collections::BTreeMap;

use serde_json::Value as Json;
use unisearch_core::{AggregationResult, Document, Error, Result, ResultEnvelope, ResultItem};
use unisearch_query::SearchPlan;

use super::layout::{SOURCE_FIELD, facet_field};

pub(crate) fn envelope(raw: &Json, plan: &SearchPlan) -> Result<ResultEnvelope> {
    let scored = plan.text.is_some();
    let results = match raw["hits"].as_array() {
        Some(hits) => hits
            .iter()
            .map(|h| hit(h, scored))
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };
    let max_score = results
        .iter()
        .map(|item| item.score)
        .fold(0.0_f64, f64::max);

    let facet_counts = raw["facet_counts"].as_array();
    let aggs = plan
        .aggregations
        .iter()
        .map(|aggregation| {
            let field = facet_field(aggregation.path.as_str());
            let counts: BTreeMap<String, u64> = facet_counts
                .and_then(|facets| facets.iter().find(|f| f["field_name"] == field.as_str()))
                .and_then(|facet| facet["counts"].as_array())
                .map(|counts| {
                    counts
                        .iter()
                        .filter_map(|c| Some((c["value"].as_str()?.to_string(), c["count"].as_u64()?)))
                        .collect()
                })
                .unwrap_or_default();
            (
                aggregation.path.to_string(),
                AggregationResult::from_counts(counts, aggregation.size),
            )
        })
        .collect();

    Ok(ResultEnvelope {
        took_ms: raw["search_time_ms"].as_u64().unwrap_or(0),
        total: raw["found"].as_u64().unwrap_or(0),
        max_score,
        results,
        aggs,
    })
}

/// The envelope for a plan that matches nothing: no hits, empty buckets.
pub(crate) fn nothing(plan: &SearchPlan) -> ResultEnvelope {
    ResultEnvelope {
        aggs: plan
            .aggregations
            .iter()
            .map(|aggregation| {
                (
                    aggregation.path.to_string(),
                    AggregationResult::from_counts(Vec::new(), aggregation.size),
                )
            })
            .collect(),
        ..ResultEnvelope::default()
    }
}

fn hit(raw: &Json, scored: bool) -> Result<ResultItem> {
    let stored = &raw["document"];
    let source = stored[SOURCE_FIELD]
        .as_str()
        .ok_or_else(|| Error::backend_query(None, format!("hit {} carries no source", stored["id"])))?;
    let json: Json = serde_json::from_str(source)
        .map_err(|e| Error::backend_query(None, format!("hit {} has invalid source: {e}", stored["id"])))?;
    let data = Document::from_json(json)
        .map_err(|e| Error::backend_query(None, format!("hit {} is not a document: {e}", stored["id"])))?;
    let score = if scored {
        raw["text_match"].as_f64().unwrap_or(1.0)
    } else {
        1.0
    };
    Ok(ResultItem { score, data })
}
