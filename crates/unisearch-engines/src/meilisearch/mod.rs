//! Meilisearch adapter.
//!
//! - [`client`]: the [`MeilisearchEngine`], its HTTP calls and task polling
//! - `filter`: search plan to filter expressions, stored document layout
//! - `normalize`: search responses to result envelopes
//!
//! Meilisearch filters compare numbers and strings for equality only, so
//! criteria are lowered with [`Capabilities::meilisearch`]: text and date
//! ranges, paths with non-identifier segments, and pages past the default
//! `maxTotalHits` of 1000 are rejected as validation errors.
//!
//! [`Capabilities::meilisearch`]: unisearch_query::Capabilities::meilisearch

pub mod client;
mod filter;
mod normalize;

pub use client::MeilisearchEngine;
