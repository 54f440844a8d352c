//! Meilisearch search response to [`ResultEnvelope`].
//!
//! `processingTimeMs` becomes `took_ms`. `total` is `totalHits` when the
//! server reports an exhaustive count and `estimatedTotalHits` otherwise.
//! Scores are `_rankingScore` values in `[0, 1]`; Meilisearch reports no
//! global maximum, so `max_score` is the best score on the returned page.
//! Facet distributions are capped client-side to each aggregation's size.

use std::collections::BTreeMap;

use serde_json::Value as Json;
use unisearch_core::{AggregationResult, Document, Error, Result, ResultEnvelope, ResultItem};
use unisearch_query::SearchPlan;

use super::filter::{DOCUMENT_FIELD, attribute};

pub(crate) fn envelope(raw: &Json, plan: &SearchPlan) -> Result<ResultEnvelope> {
    let results = match raw["hits"].as_array() {
        Some(hits) => hits.iter().map(hit).collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };
    let max_score = results
        .iter()
        .map(|item| item.score)
        .fold(0.0_f64, f64::max);

    let total = raw["totalHits"]
        .as_u64()
        .or_else(|| raw["estimatedTotalHits"].as_u64())
        .unwrap_or(0);

    let aggs = plan
        .aggregations
        .iter()
        .map(|aggregation| {
            let distribution = &raw["facetDistribution"][attribute(&aggregation.path)];
            let counts: BTreeMap<String, u64> = distribution
                .as_object()
                .map(|map| {
                    map.iter()
                        .filter_map(|(term, count)| Some((term.clone(), count.as_u64()?)))
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
        took_ms: raw["processingTimeMs"].as_u64().unwrap_or(0),
        total,
        max_score,
        results,
        aggs,
    })
}

fn hit(raw: &Json) -> Result<ResultItem> {
    let stored = raw
        .get(DOCUMENT_FIELD)
        .cloned()
        .ok_or_else(|| Error::backend_query(None, format!("hit {} carries no document", raw["key"])))?;
    let data = Document::from_json(stored)
        .map_err(|e| Error::backend_query(None, format!("hit {} is not a document: {e}", raw["key"])))?;
    Ok(ResultItem {
        score: raw["_rankingScore"].as_f64().unwrap_or(1.0),
        data,
    })
}
