//! Normalized search results.
//!
//! Every engine answers a search with the same [`ResultEnvelope`],
//! whatever its backend reports natively.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::Document;

/// One hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultItem {
    /// Backend relevance score.
    pub score: f64,
    /// The indexed document, unmodified.
    pub data: Document,
}

/// Term counts for one aggregated path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationResult {
    /// Sum of all bucket counts, including those beyond the size cap.
    pub total: u64,
    /// Count per distinct value.
    pub terms: BTreeMap<String, u64>,
    /// Counts not reported in `terms`.
    pub other: u64,
}

impl AggregationResult {
    /// Build from `(term, count)` buckets, keeping the `size` largest.
    ///
    /// Buckets are ranked by count, then by term. Everything past the cap
    /// is folded into `other`.
    pub fn from_counts<I>(counts: I, size: Option<usize>) -> Self
    where
        I: IntoIterator<Item = (String, u64)>,
    {
        let mut buckets: Vec<(String, u64)> = counts.into_iter().collect();
        buckets.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let total: u64 = buckets.iter().map(|(_, count)| count).sum();
        let keep = size.unwrap_or(buckets.len());
        let other: u64 = buckets.iter().skip(keep).map(|(_, count)| count).sum();
        buckets.truncate(keep);
        Self {
            total,
            terms: buckets.into_iter().collect(),
            other,
        }
    }
}

/// The uniform search response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    /// Backend-reported execution time in milliseconds.
    pub took_ms: u64,
    /// Full match count, independent of the page window.
    pub total: u64,
    /// Highest score among all matches. `0.0` when nothing matched.
    pub max_score: f64,
    /// Hits in descending score order.
    pub results: Vec<ResultItem>,
    /// Term aggregations, keyed by path.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub aggs: BTreeMap<String, AggregationResult>,
}

impl ResultEnvelope {
    /// An envelope with no hits.
    pub fn empty(took_ms: u64) -> Self {
        Self {
            took_ms,
            ..Self::default()
        }
    }

    /// Number of hits on this page.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Returns `true` when this page holds no hits.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Ids of the hits on this page, in order.
    ///
    /// Hits without a resolvable id are skipped.
    pub fn ids(&self, id_field: &str) -> Vec<String> {
        self.results
            .iter()
            .filter_map(|item| item.data.id(id_field))
            .collect()
    }
}
