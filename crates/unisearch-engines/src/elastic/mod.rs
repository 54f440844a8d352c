//! Elasticsearch adapter.
//!
//! - [`client`]: the [`ElasticsearchEngine`] and its HTTP calls
//! - `dsl`: search plan to query DSL, index mapping, stored source layout
//! - `normalize`: `_search` responses to result envelopes
//!
//! Criteria are lowered with [`Capabilities::elasticsearch`], so requests
//! paging past the default `index.max_result_window` of 10 000 are rejected
//! before any request is sent.
//!
//! [`Capabilities::elasticsearch`]: unisearch_query::Capabilities::elasticsearch

pub mod client;
mod dsl;
mod normalize;

pub use client::ElasticsearchEngine;
