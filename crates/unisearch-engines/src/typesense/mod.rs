//! Typesense adapter.
//!
//! - [`client`]: the [`TypesenseEngine`] and its HTTP calls
//! - `layout`: stored document layout and collection schema
//! - `filter`: search plan to `filter_by` expressions and query parameters
//! - `normalize`: search responses to result envelopes
//!
//! Typesense ranges only over numeric fields and serves at most 250 hits
//! per page, so criteria are lowered with [`Capabilities::typesense`]:
//! text and date ranges, paths with non-identifier segments, and larger
//! pages are rejected as validation errors.
//!
//! [`Capabilities::typesense`]: unisearch_query::Capabilities::typesense

pub mod client;
mod filter;
mod layout;
mod normalize;

pub use client::TypesenseEngine;
