//! Subcommand implementations.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde_json::{Value as Json, json};
use unisearch_core::{
    AggregationRequest, Criteria, Document, Engine, EngineConfig, WriteOptions,
};

use crate::cli::SearchArgs;

/// Configuration from `path` or defaults, with `UNISEARCH_*` overrides
/// from the process environment.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    load_config_with(path, |key| std::env::var(key).ok())
}

/// Configuration from `path` or defaults, with overrides read by `lookup`.
pub fn load_config_with<F>(path: Option<&Path>, lookup: F) -> Result<EngineConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let config = match path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    Ok(config.apply_env(lookup)?)
}

pub async fn index(engine: &dyn Engine, doc_type: &str, file: &Path, refresh: bool) -> Result<()> {
    let documents = parse_documents(read_json(file)?)?;
    let options = WriteOptions { refresh };
    for document in &documents {
        engine
            .index(doc_type, document.clone(), options)
            .await?;
    }
    tracing::info!(count = documents.len(), doc_type, "Indexed documents");
    print_json(&json!({"indexed": documents.len(), "doc_type": doc_type}))
}

pub async fn remove(engine: &dyn Engine, doc_type: &str, id: &str, refresh: bool) -> Result<()> {
    engine
        .remove(doc_type, id, WriteOptions { refresh })
        .await?;
    print_json(&json!({"removed": id, "doc_type": doc_type}))
}

pub async fn search(engine: &dyn Engine, args: &SearchArgs, default_size: usize) -> Result<()> {
    let criteria = build_criteria(args, default_size)?;
    let envelope = engine.search(&criteria).await?;
    print_json(&serde_json::to_value(&envelope)?)
}

/// Criteria from the `--criteria` file, or defaults, with flags on top.
pub fn build_criteria(args: &SearchArgs, default_size: usize) -> Result<Criteria> {
    let mut criteria = match &args.criteria {
        Some(path) => Criteria::from_json(read_json(path)?)?,
        None => Criteria {
            size: default_size,
            ..Criteria::default()
        },
    };

    if let Some(query) = &args.query {
        criteria.query_string = Some(query.clone());
    }
    criteria.field_dictionary.extend(args.fields.iter().cloned());
    criteria.filter_dictionary.extend(args.filters.iter().cloned());
    criteria.exclude_dictionary.extend(args.excludes.iter().cloned());
    if let Some(doc_type) = &args.doc_type {
        criteria.doc_type = Some(doc_type.clone());
    }
    if let Some(size) = args.size {
        criteria.size = size;
    }
    if let Some(from) = args.from {
        criteria.from = from;
    }
    for path in &args.aggregations {
        criteria
            .aggregation_terms
            .insert(path.clone(), AggregationRequest::default());
    }

    criteria.validate()?;
    Ok(criteria)
}

/// One document for an object, one per element for an array.
fn parse_documents(value: Json) -> Result<Vec<Document>> {
    match value {
        Json::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                Document::from_json(item).with_context(|| format!("element {i} is not a document"))
            })
            .collect(),
        Json::Object(_) => Ok(vec![Document::from_json(value)?]),
        other => bail!("expected a JSON object or array of objects, got {other}"),
    }
}

fn read_json(path: &Path) -> Result<Json> {
    let text = if path == Path::new("-") {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("reading stdin")?;
        text
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?
    };
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn print_json(value: &Json) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
