//! Reference engine against a live Elasticsearch.
//!
//! Runs only when `UNISEARCH_ES_URL` points at a reachable server, and
//! returns early otherwise. Each run writes to a fresh index.
//!
//! Scores differ in scale between engines and ties may be ordered
//! differently, so envelopes are compared on `total` and on the set of
//! matching ids. Text queries use whole words because the reference engine
//! matches substrings where Elasticsearch matches analysed tokens.

#![allow(clippy::unwrap_used)]
#![cfg(feature = "elasticsearch")]

use std::collections::BTreeSet;

use serde_json::json;
use unisearch_core::{
    BackendKind, Criteria, Document, Engine, EngineConfig, RangeValue, ResultEnvelope,
    WriteOptions,
};
use unisearch_engines::{ElasticsearchEngine, MemoryEngine};

fn live_config() -> Option<EngineConfig> {
    let url = std::env::var("UNISEARCH_ES_URL").ok()?;
    let mut config = EngineConfig {
        backend: BackendKind::Elasticsearch,
        ..EngineConfig::default()
    };
    config.elasticsearch.url = url;
    Some(config)
}

fn id_set(envelope: &ResultEnvelope) -> BTreeSet<String> {
    envelope.ids("id").into_iter().collect()
}

/// Engines agree on `total` and matching ids.
async fn assert_equivalent(reference: &dyn Engine, live: &dyn Engine, criteria: &Criteria) {
    let expected = reference.search(criteria).await.unwrap();
    let actual = live.search(criteria).await.unwrap();
    assert_eq!(expected.total, actual.total, "total for {criteria:?}");
    assert_eq!(id_set(&expected), id_set(&actual), "ids for {criteria:?}");
}

#[tokio::test]
async fn reference_and_elasticsearch_agree() {
    let Some(config) = live_config() else {
        eprintln!("UNISEARCH_ES_URL not set; skipping oracle comparison");
        return;
    };
    let index_name = format!(
        "unisearch_oracle_{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis()
    );
    let live = ElasticsearchEngine::new(&config, &index_name).unwrap();
    let reference = MemoryEngine::new(&index_name);

    let documents = [
        json!({"id": "1", "org": "edX", "age": 18, "tags": ["a", "b"], "content": {"title": "here comes the sun"}}),
        json!({"id": "2", "org": "MITx", "age": 39, "tags": ["c"], "content": {"title": "the moon"}}),
        json!({"id": "3", "org": "edX", "age": 40, "content": {"title": "sun and moon"}}),
        json!({"id": "4", "age": 17, "start_date": "2001-01-01T00:00:00Z"}),
        json!({"id": "5", "org": "HarvardX", "start_date": "2999-01-01T00:00:00Z"}),
    ];
    for document in documents {
        let document = Document::from_json(document).unwrap();
        reference
            .index("course", document.clone(), WriteOptions::default())
            .await
            .unwrap();
        live.index("course", document, WriteOptions::refreshed())
            .await
            .unwrap();
    }
    for engine in [&reference as &dyn Engine, &live as &dyn Engine] {
        engine
            .remove("course", "2", WriteOptions::refreshed())
            .await
            .unwrap();
    }

    let cases = [
        Criteria::default(),
        Criteria::builder().query("sun").build(),
        Criteria::builder().query("sun moon").build(),
        Criteria::builder().field("tags", "a").build(),
        Criteria::builder().field("org", "edX").build(),
        Criteria::builder()
            .field("age", RangeValue::between(18, 39))
            .build(),
        Criteria::builder()
            .filter(
                "start_date",
                unisearch_core::DateRange::until(chrono::Utc::now()),
            )
            .build(),
        Criteria::builder().exclude("org", "edX").build(),
        Criteria::builder().doc_type("other").build(),
    ];
    for criteria in &cases {
        assert_equivalent(&reference, &live, criteria).await;
    }

    // Tie order may differ, so only the page length and total must agree.
    let page = Criteria::builder().size(2).from(1).build();
    let expected = reference.search(&page).await.unwrap();
    let actual = live.search(&page).await.unwrap();
    assert_eq!((expected.total, expected.len()), (actual.total, actual.len()));

    let criteria = Criteria::builder().aggregate("org", None).build();
    let expected = reference.search(&criteria).await.unwrap();
    let actual = live.search(&criteria).await.unwrap();
    assert_eq!(expected.aggs, actual.aggs);
}
