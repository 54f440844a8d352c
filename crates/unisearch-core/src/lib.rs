//! Unisearch Core: shared types, traits, errors, and configuration.
//!
//! This crate holds everything an engine implementation or a caller needs
//! without pulling in any backend client. It has no internal Unisearch
//! dependencies.
//!
//! # Modules
//!
//! - [`error`]: Error taxonomy and Result alias
//! - [`value`]: Schema-less documents and dot-path resolution
//! - [`criteria`]: The engine-agnostic search request
//! - [`results`]: The normalized result envelope
//! - [`engine`]: The `Engine` trait every backend implements
//! - [`config`]: Engine configuration and backend selection

pub mod config;
pub mod criteria;
pub mod engine;
pub mod error;
pub mod results;
pub mod value;

// Re-export key types at crate root for convenience
pub use config::{
    BackendKind, ElasticsearchConfig, EngineConfig, MeilisearchConfig, MemoryConfig, TypesenseConfig,
};
pub use criteria::{
    AggregationRequest, Criteria, CriteriaBuilder, Criterion, DEFAULT_PAGE_SIZE, DateRange,
    RangeValue, parse_timestamp,
};
pub use engine::{Engine, WriteOptions};
pub use error::{Error, ErrorContext, Operation, Result};
pub use results::{AggregationResult, ResultEnvelope, ResultItem};
pub use value::{Document, FieldPath, FieldValue, Fields};
