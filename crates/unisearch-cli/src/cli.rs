//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value as Json;
use unisearch_core::{Criterion, DateRange, FieldValue, RangeValue, parse_timestamp};

/// Index documents into and search a Unisearch engine
#[derive(Parser, Debug)]
#[command(name = "unisearch", author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, env = "UNISEARCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Index to operate on
    #[arg(short, long, default_value = "unisearch")]
    pub index: String,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Add or replace documents from a JSON file (`-` for stdin)
    Index {
        /// Document type
        #[arg(long)]
        doc_type: String,

        /// Make the documents searchable before returning
        #[arg(long)]
        refresh: bool,

        /// A JSON object or an array of objects
        file: PathBuf,
    },

    /// Remove a document by id
    Remove {
        /// Document type
        #[arg(long)]
        doc_type: String,

        /// Make the removal visible before returning
        #[arg(long)]
        refresh: bool,

        /// Document id
        id: String,
    },

    /// Search and print the result envelope
    Search(SearchArgs),
}

#[derive(clap::Args, Debug, Default)]
pub struct SearchArgs {
    /// Free-text query
    #[arg(short, long)]
    pub query: Option<String>,

    /// Required match, `path=value` or `path=lo..hi`
    #[arg(long = "field", value_parser = parse_criterion)]
    pub fields: Vec<(String, Criterion)>,

    /// Match unless the field is missing, `path=value` or `path=lo..hi`
    #[arg(long = "filter", value_parser = parse_criterion)]
    pub filters: Vec<(String, Criterion)>,

    /// Drop documents where the field equals the value, `path=value`
    #[arg(long = "exclude", value_parser = parse_exclusion)]
    pub excludes: Vec<(String, FieldValue)>,

    /// Restrict to one document type
    #[arg(long)]
    pub doc_type: Option<String>,

    /// Term aggregation over a path
    #[arg(long = "aggregate")]
    pub aggregations: Vec<String>,

    /// Page size
    #[arg(long)]
    pub size: Option<usize>,

    /// Offset of the first result
    #[arg(long)]
    pub from: Option<usize>,

    /// Base criteria as a JSON file; flags are applied on top
    #[arg(long)]
    pub criteria: Option<PathBuf>,
}

/// Parse `path=value`, where `value` is `lo..hi` for a range.
///
/// Either range side may be empty. A range whose sides are all timestamps
/// becomes a date range.
pub fn parse_criterion(arg: &str) -> Result<(String, Criterion), String> {
    let (path, raw) = split_pair(arg)?;
    if serde_json::from_str::<Json>(raw).is_err()
        && let Some((lower, upper)) = raw.split_once("..")
    {
        return Ok((path, range(lower, upper)?));
    }
    Ok((path, Criterion::Value(parse_value(raw))))
}

/// Parse `path=value`.
pub fn parse_exclusion(arg: &str) -> Result<(String, FieldValue), String> {
    let (path, raw) = split_pair(arg)?;
    Ok((path, parse_value(raw)))
}

/// JSON when `raw` parses as JSON, text otherwise.
pub fn parse_value(raw: &str) -> FieldValue {
    serde_json::from_str::<Json>(raw)
        .map(FieldValue::from)
        .unwrap_or_else(|_| FieldValue::Text(raw.to_string()))
}

fn split_pair(arg: &str) -> Result<(String, &str), String> {
    match arg.split_once('=') {
        Some((path, value)) if !path.is_empty() => Ok((path.to_string(), value)),
        _ => Err(format!("expected PATH=VALUE, got '{arg}'")),
    }
}

fn range(lower: &str, upper: &str) -> Result<Criterion, String> {
    let sides = [lower, upper].map(|side| (!side.is_empty()).then_some(side));
    if sides.iter().all(Option::is_none) {
        return Err("a range needs at least one bound".to_string());
    }

    let instants = sides.map(|side| side.map(parse_timestamp));
    if instants.iter().flatten().all(Option::is_some) {
        let [lower, upper] = instants.map(Option::flatten);
        return Ok(Criterion::DateRange(DateRange { lower, upper }));
    }

    let [lower, upper] = sides.map(|side| side.map(parse_value));
    Ok(Criterion::Range(RangeValue { lower, upper }))
}
