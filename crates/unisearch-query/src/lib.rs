//! Query translation for Unisearch.
//!
//! Converts an engine-agnostic [`Criteria`](unisearch_core::Criteria) into a
//! [`SearchPlan`]: validated paths, typed match tests, and sanitized text
//! terms. Translation is a pure function of the criteria and the target
//! backend's [`Capabilities`]; anything the backend cannot express is
//! rejected with a validation error naming the offending path.
//!
//! # Example
//!
//! ```rust
//! use unisearch_core::{Criteria, RangeValue};
//! use unisearch_query::{Capabilities, plan};
//!
//! let criteria = Criteria::builder()
//!     .query("photosynthesis")
//!     .field("age", RangeValue::between(18, 39))
//!     .build();
//! let plan = plan(&criteria, &Capabilities::elasticsearch()).unwrap();
//! assert_eq!(plan.must.len(), 1);
//! ```

pub mod capabilities;
pub mod plan;

pub use capabilities::Capabilities;
pub use plan::{
    Aggregation, Bound, Bounds, Condition, Page, RESERVED_CHARACTERS, Scalar, SearchPlan, Test,
    TextQuery, plan, strip_reserved,
};
