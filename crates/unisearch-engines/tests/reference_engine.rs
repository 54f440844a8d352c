//! Behavioural properties of the reference engine.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use proptest::prelude::*;
use serde_json::json;
use unisearch_core::{
    Criteria, DateRange, Document, Engine, EngineConfig, FieldValue, RangeValue, WriteOptions,
};
use unisearch_engines::{MemoryEngine, create_engine};

fn doc(value: serde_json::Value) -> Document {
    Document::from_json(value).unwrap()
}

async fn engine_with(documents: Vec<serde_json::Value>) -> MemoryEngine {
    let engine = MemoryEngine::new("test_index");
    for document in documents {
        engine
            .index("test_doc", doc(document), WriteOptions::default())
            .await
            .unwrap();
    }
    engine
}

#[tokio::test]
async fn round_trip_returns_input_bytes() {
    let input = r#"{"content":{"text":"Lorem ipsum"},"id":"FAKE_ID","nested":[{"a":1},{"b":[true,null,2.5]}],"org":"edX"}"#;
    let engine = MemoryEngine::new("test_index");
    engine
        .index(
            "test_doc",
            serde_json::from_str(input).unwrap(),
            WriteOptions::default(),
        )
        .await
        .unwrap();

    let results = engine
        .search(&Criteria::builder().field("id", "FAKE_ID").build())
        .await
        .unwrap();
    assert_eq!(results.total, 1);
    assert_eq!(serde_json::to_string(&results.results[0].data).unwrap(), input);
}

#[tokio::test]
async fn multivalue_fields_match_by_containment() {
    let engine = engine_with(vec![json!({"id": "1", "tags": ["a", "b"]})]).await;

    let hit = engine
        .search(&Criteria::builder().field("tags", "a").build())
        .await
        .unwrap();
    assert_eq!(hit.ids("id"), vec!["1"]);

    let miss = engine
        .search(&Criteria::builder().field("tags", "c").build())
        .await
        .unwrap();
    assert_eq!(miss.total, 0);
}

#[tokio::test]
async fn ranges_are_inclusive() {
    let engine = engine_with(
        [17, 18, 39, 40]
            .iter()
            .map(|age| json!({"id": format!("age{age}"), "age": age}))
            .collect(),
    )
    .await;

    let results = engine
        .search(
            &Criteria::builder()
                .field("age", RangeValue::between(18, 39))
                .build(),
        )
        .await
        .unwrap();
    assert_eq!(results.ids("id"), vec!["age18", "age39"]);
}

#[tokio::test]
async fn date_filter_keeps_documents_missing_the_field() {
    let future = (Utc::now() + Duration::days(365)).to_rfc3339();
    let past = (Utc::now() - Duration::days(365)).to_rfc3339();
    let engine = engine_with(vec![
        json!({"id": "no_date"}),
        json!({"id": "future", "start_date": future}),
        json!({"id": "past", "start_date": past}),
    ])
    .await;

    let results = engine
        .search(
            &Criteria::builder()
                .filter("start_date", DateRange::until(Utc::now()))
                .build(),
        )
        .await
        .unwrap();
    assert_eq!(results.ids("id"), vec!["no_date", "past"]);
}

#[tokio::test]
async fn pagination_reports_full_total() {
    let engine = engine_with((0..25).map(|i| json!({"id": i})).collect()).await;

    let results = engine
        .search(&Criteria::builder().size(10).from(20).build())
        .await
        .unwrap();
    assert_eq!(results.len(), 5);
    assert_eq!(results.total, 25);
    assert_eq!(results.ids("id"), vec!["20", "21", "22", "23", "24"]);
}

#[tokio::test]
async fn exclusions_never_drop_missing_fields() {
    let engine = engine_with(vec![
        json!({"id": "red", "color": "red"}),
        json!({"id": "blue", "color": ["blue", "green"]}),
        json!({"id": "none"}),
    ])
    .await;

    let results = engine
        .search(
            &Criteria::builder()
                .exclude("color", FieldValue::from(vec!["red", "green"]))
                .build(),
        )
        .await
        .unwrap();
    assert_eq!(results.ids("id"), vec!["none"]);
}

#[tokio::test]
async fn aggregations_cover_the_full_match_set() {
    let engine = engine_with(vec![
        json!({"id": 1, "org": "edX", "modes": ["honor", "audit"]}),
        json!({"id": 2, "org": "edX", "modes": ["honor"]}),
        json!({"id": 3, "org": "MITx"}),
    ])
    .await;

    let results = engine
        .search(
            &Criteria::builder()
                .size(1)
                .aggregate("org", None)
                .aggregate("modes", Some(1))
                .build(),
        )
        .await
        .unwrap();
    assert_eq!(results.len(), 1);

    let org = &results.aggs["org"];
    assert_eq!(org.terms["edX"], 2);
    assert_eq!(org.terms["MITx"], 1);
    assert_eq!(org.total, 3);

    let modes = &results.aggs["modes"];
    assert_eq!(modes.terms.len(), 1);
    assert_eq!(modes.terms["honor"], 2);
    assert_eq!(modes.other, 1);
}

#[tokio::test]
async fn text_query_scores_by_matched_terms() {
    let engine = engine_with(vec![
        json!({"id": "one", "content": {"title": "the sun"}}),
        json!({"id": "both", "content": {"title": "sun and moon"}}),
        json!({"id": "neither", "content": {"title": "stars"}}),
        json!({"id": "outside", "title": "sun moon"}),
    ])
    .await;

    let results = engine.search_string("Sun moon!", Criteria::default()).await.unwrap();
    assert_eq!(results.ids("id"), vec!["both", "one"]);
    assert_eq!(results.max_score, 2.0);

    let reserved_only = engine.search_string("(*)", Criteria::default()).await.unwrap();
    assert_eq!(reserved_only.total, 0);
}

#[tokio::test]
async fn removal_is_idempotent() {
    let engine = engine_with(vec![json!({"id": "a"}), json!({"id": "b"})]).await;
    engine
        .remove("test_doc", "a", WriteOptions::default())
        .await
        .unwrap();
    engine
        .remove("test_doc", "a", WriteOptions::default())
        .await
        .unwrap();
    let results = engine.search(&Criteria::default()).await.unwrap();
    assert_eq!(results.ids("id"), vec!["b"]);
}

#[tokio::test]
async fn snapshot_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig::from_toml_str(&format!(
        "[memory]\nsnapshot_path = {:?}\n",
        dir.path().join("index.json").display().to_string()
    ))
    .unwrap();

    let engine = create_engine(&config, "courses").unwrap();
    engine
        .index(
            "course",
            doc(json!({"id": "a", "content": {"title": "sun"}})),
            WriteOptions::default(),
        )
        .await
        .unwrap();
    drop(engine);

    let reopened = create_engine(&config, "courses").unwrap();
    let results = reopened.search_string("sun", Criteria::default()).await.unwrap();
    assert_eq!(results.ids("id"), vec!["a"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_and_readers() {
    let engine = Arc::new(MemoryEngine::new("test_index"));
    let mut tasks = Vec::new();
    for i in 0..50 {
        let engine = Arc::clone(&engine);
        tasks.push(tokio::spawn(async move {
            engine
                .index("test_doc", doc(json!({"id": i})), WriteOptions::default())
                .await
                .unwrap();
            engine.search(&Criteria::default()).await.unwrap().total
        }));
    }
    for task in tasks {
        assert!(task.await.unwrap() >= 1);
    }

    let results = engine.search(&Criteria::builder().size(100).build()).await.unwrap();
    assert_eq!(results.total, 50);
    assert_eq!(results.len(), 50);
}

proptest! {
    #[test]
    fn pagination_window(count in 0usize..40, size in 1usize..15, from in 0usize..45) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let results = runtime.block_on(async {
            let engine = engine_with((0..count).map(|i| json!({"id": i})).collect()).await;
            engine
                .search(&Criteria::builder().size(size).from(from).build())
                .await
                .unwrap()
        });
        prop_assert_eq!(results.total, count as u64);
        prop_assert_eq!(results.len(), size.min(count.saturating_sub(from)));
        let expected: Vec<String> = (from..count).take(size).map(|i| i.to_string()).collect();
        prop_assert_eq!(results.ids("id"), expected);
    }
}
