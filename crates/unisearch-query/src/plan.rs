//! Lowering [`Criteria`] into a [`SearchPlan`].
//!
//! A plan is the backend-neutral form every engine consumes: validated
//! paths, typed match tests, and the sanitized free-text terms. Backend
//! adapters turn a plan into their native syntax; the reference engine
//! evaluates it directly with [`Condition::holds`] and
//! [`SearchPlan::admits`], which define the matching semantics every
//! backend must reproduce.

use std::cmp::Ordering;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value as Json;
use unisearch_core::{
    Criteria, Criterion, Document, Error, FieldPath, FieldValue, Result, parse_timestamp,
};

use crate::capabilities::Capabilities;

/// Characters with query-syntax meaning that are removed from free text.
pub const RESERVED_CHARACTERS: &str = "+=><!(){}[]^~*:\\/&|?\"";

// ============================================================================
// Match values
// ============================================================================

/// A scalar match value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// Boolean.
    Bool(bool),
    /// Integer.
    Integer(i64),
    /// Float.
    Float(f64),
    /// Text, matched exactly.
    Text(String),
}

impl Scalar {
    fn from_value(path: &str, value: &FieldValue) -> Result<Self> {
        match value {
            FieldValue::Bool(b) => Ok(Self::Bool(*b)),
            FieldValue::Integer(i) => Ok(Self::Integer(*i)),
            FieldValue::Float(f) => Ok(Self::Float(*f)),
            FieldValue::Text(s) => Ok(Self::Text(s.clone())),
            other => Err(Error::validation_field(
                path,
                format!("expected a scalar, got {}", other.kind_name()),
            )),
        }
    }

    /// The equivalent document value.
    pub fn to_value(&self) -> FieldValue {
        match self {
            Self::Bool(b) => FieldValue::Bool(*b),
            Self::Integer(i) => FieldValue::Integer(*i),
            Self::Float(f) => FieldValue::Float(*f),
            Self::Text(s) => FieldValue::Text(s.clone()),
        }
    }

    /// JSON form, as sent to backends.
    pub fn to_json(&self) -> Json {
        self.to_value().to_json()
    }

    /// Returns `true` when `leaf` equals this value.
    pub fn matches(&self, leaf: &FieldValue) -> bool {
        self.to_value().scalar_eq(leaf)
    }
}

/// One side of a range.
#[derive(Debug, Clone, PartialEq)]
pub enum Bound {
    /// Integer bound.
    Integer(i64),
    /// Float bound.
    Float(f64),
    /// Text bound, compared lexicographically.
    Text(String),
    /// Timestamp bound; stored values are parsed before comparing.
    Instant(DateTime<Utc>),
}

impl Bound {
    fn from_value(path: &str, value: &FieldValue) -> Result<Self> {
        match value {
            FieldValue::Integer(i) => Ok(Self::Integer(*i)),
            FieldValue::Float(f) => Ok(Self::Float(*f)),
            FieldValue::Text(s) => Ok(Self::Text(s.clone())),
            other => Err(Error::validation_field(
                path,
                format!("range bound must be a number or text, got {}", other.kind_name()),
            )),
        }
    }

    /// JSON form. Instants render as RFC 3339 with millisecond precision.
    pub fn to_json(&self) -> Json {
        match self {
            Self::Integer(i) => Json::from(*i),
            Self::Float(f) => FieldValue::Float(*f).to_json(),
            Self::Text(s) => Json::String(s.clone()),
            Self::Instant(dt) => Json::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
        }
    }

    /// Numeric value, for numeric bounds.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Order `leaf` relative to this bound, or `None` when incomparable.
    pub fn compare_leaf(&self, leaf: &FieldValue) -> Option<Ordering> {
        match self {
            Self::Integer(_) | Self::Float(_) => leaf.as_f64()?.partial_cmp(&self.as_f64()?),
            Self::Text(bound) => Some(leaf.as_str()?.cmp(bound.as_str())),
            Self::Instant(bound) => Some(parse_timestamp(leaf.as_str()?)?.cmp(bound)),
        }
    }
}

/// Inclusive bounds of a range test.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    /// Lower bound, inclusive.
    pub lower: Option<Bound>,
    /// Upper bound, inclusive.
    pub upper: Option<Bound>,
}

impl Bounds {
    /// Returns `true` when `leaf` is comparable to both bounds and within them.
    pub fn contains(&self, leaf: &FieldValue) -> bool {
        let above = self.lower.as_ref().is_none_or(|bound| {
            matches!(
                bound.compare_leaf(leaf),
                Some(Ordering::Greater | Ordering::Equal)
            )
        });
        let below = self.upper.as_ref().is_none_or(|bound| {
            matches!(
                bound.compare_leaf(leaf),
                Some(Ordering::Less | Ordering::Equal)
            )
        });
        above && below
    }
}

/// The test a condition applies to the leaves at its path.
#[derive(Debug, Clone, PartialEq)]
pub enum Test {
    /// Some leaf equals the value.
    Equals(Scalar),
    /// Some leaf equals one of the values.
    AnyOf(Vec<Scalar>),
    /// Some leaf falls inside the bounds.
    Range(Bounds),
    /// The path resolves to at least one leaf.
    Exists,
}

/// A test bound to a field path.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Path tested.
    pub path: FieldPath,
    /// Test applied.
    pub test: Test,
}

impl Condition {
    /// Returns `true` when some leaf at the path passes the test.
    ///
    /// A missing path never passes.
    pub fn holds(&self, document: &Document) -> bool {
        let leaves = document.resolve(&self.path);
        match &self.test {
            Test::Exists => !leaves.is_empty(),
            Test::Equals(value) => leaves.iter().any(|leaf| value.matches(leaf)),
            Test::AnyOf(values) => leaves
                .iter()
                .any(|leaf| values.iter().any(|value| value.matches(leaf))),
            Test::Range(bounds) => leaves.iter().any(|leaf| bounds.contains(leaf)),
        }
    }

    /// Filter semantics: the path is missing, or the test holds.
    pub fn holds_or_missing(&self, document: &Document) -> bool {
        !document.has_path(&self.path) || self.holds(document)
    }
}

// ============================================================================
// Free text
// ============================================================================

/// Remove [`RESERVED_CHARACTERS`] from `text`.
pub fn strip_reserved(text: &str) -> String {
    text.chars()
        .filter(|c| !RESERVED_CHARACTERS.contains(*c))
        .collect()
}

/// Sanitized free-text query.
///
/// Terms are lowercased, stripped of reserved characters, and deduplicated.
/// A document matches when its `content` subtree contains any term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextQuery {
    /// Search terms in first-seen order.
    pub terms: Vec<String>,
}

impl TextQuery {
    /// Sanitize a raw query string.
    pub fn parse(raw: &str) -> Self {
        let mut terms: Vec<String> = Vec::new();
        for term in strip_reserved(&raw.to_lowercase()).split_whitespace() {
            if !terms.iter().any(|t| t == term) {
                terms.push(term.to_string());
            }
        }
        Self { terms }
    }

    /// Returns `true` when sanitizing left nothing to search for.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Terms joined by single spaces.
    pub fn joined(&self) -> String {
        self.terms.join(" ")
    }
}

// ============================================================================
// Plan
// ============================================================================

/// Term aggregation over one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregation {
    /// Path aggregated.
    pub path: FieldPath,
    /// Bucket cap.
    pub size: Option<usize>,
}

/// Pagination window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// Offset of the first hit.
    pub from: usize,
    /// Maximum hits.
    pub size: usize,
}

/// A validated, backend-neutral search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPlan {
    /// Free-text query, if any.
    pub text: Option<TextQuery>,
    /// Document-type restriction.
    pub doc_type: Option<String>,
    /// Conditions that must all hold.
    pub must: Vec<Condition>,
    /// Conditions that must hold unless their path is missing.
    pub filters: Vec<Condition>,
    /// Conditions that drop a document when they hold.
    pub exclude: Vec<Condition>,
    /// Aggregations over the full match set.
    pub aggregations: Vec<Aggregation>,
    /// Result window.
    pub page: Page,
}

impl SearchPlan {
    /// Returns `true` when the plan can match no document at all.
    pub fn matches_nothing(&self) -> bool {
        self.text.as_ref().is_some_and(TextQuery::is_empty)
    }

    /// Field, filter, and exclusion semantics against one document.
    ///
    /// Document type and free text are checked by the caller.
    pub fn admits(&self, document: &Document) -> bool {
        self.must.iter().all(|c| c.holds(document))
            && self.filters.iter().all(|c| c.holds_or_missing(document))
            && !self.exclude.iter().any(|c| c.holds(document))
    }
}

/// Lower `criteria` for a backend described by `capabilities`.
///
/// # Errors
///
/// `Validation` for malformed criteria and for anything the backend cannot
/// express: nesting deeper than it supports, non-identifier path segments,
/// unsupported range kinds, or a page past its size or window limit.
pub fn plan(criteria: &Criteria, capabilities: &Capabilities) -> Result<SearchPlan> {
    criteria.validate()?;
    let lowering = Lowering { capabilities };

    if let Some(window) = capabilities.max_result_window
        && criteria.from.saturating_add(criteria.size) > window
    {
        return Err(Error::validation(format!(
            "from + size exceeds the {} result window of {window}",
            capabilities.backend
        )));
    }
    if let Some(max) = capabilities.max_page_size
        && criteria.size > max
    {
        return Err(Error::validation(format!(
            "size {} exceeds the {} page limit of {max}",
            criteria.size, capabilities.backend
        )));
    }

    let must = criteria
        .field_dictionary
        .iter()
        .map(|(path, criterion)| lowering.condition(path, criterion))
        .collect::<Result<Vec<_>>>()?;
    let filters = criteria
        .filter_dictionary
        .iter()
        .map(|(path, criterion)| lowering.condition(path, criterion))
        .collect::<Result<Vec<_>>>()?;
    let exclude = criteria
        .exclude_dictionary
        .iter()
        .map(|(path, value)| lowering.condition(path, &Criterion::Value(value.clone())))
        .collect::<Result<Vec<_>>>()?;
    let aggregations = criteria
        .aggregation_terms
        .iter()
        .map(|(path, request)| {
            Ok(Aggregation {
                path: lowering.path(path)?,
                size: request.size,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let text = criteria
        .query_string
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
        .map(TextQuery::parse);

    log::debug!(
        "Planned {} search: {} must, {} filter, {} exclude, text={:?}",
        capabilities.backend,
        must.len(),
        filters.len(),
        exclude.len(),
        text.as_ref().map(TextQuery::joined)
    );

    Ok(SearchPlan {
        text,
        doc_type: criteria.doc_type.clone(),
        must,
        filters,
        exclude,
        aggregations,
        page: Page {
            from: criteria.from,
            size: criteria.size,
        },
    })
}

struct Lowering<'a> {
    capabilities: &'a Capabilities,
}

impl Lowering<'_> {
    fn path(&self, raw: &str) -> Result<FieldPath> {
        let path = FieldPath::parse(raw)?;
        if let Some(max) = self.capabilities.max_path_depth
            && path.depth() > max
        {
            return Err(Error::validation_field(
                raw,
                format!(
                    "path nests {} levels, {} supports at most {max}",
                    path.depth(),
                    self.capabilities.backend
                ),
            ));
        }
        if self.capabilities.bare_identifiers_only
            && let Some(segment) = path.segments().iter().find(|s| !is_bare_identifier(s))
        {
            return Err(Error::validation_field(
                raw,
                format!(
                    "segment '{segment}' is not a plain identifier, required by {}",
                    self.capabilities.backend
                ),
            ));
        }
        Ok(path)
    }

    fn condition(&self, raw: &str, criterion: &Criterion) -> Result<Condition> {
        let path = self.path(raw)?;
        let test = match criterion {
            Criterion::Value(FieldValue::List(items)) => Test::AnyOf(
                items
                    .iter()
                    .map(|item| Scalar::from_value(raw, item))
                    .collect::<Result<_>>()?,
            ),
            Criterion::Value(value) => Test::Equals(Scalar::from_value(raw, value)?),
            Criterion::Range(range) => {
                let lower = range
                    .lower
                    .as_ref()
                    .map(|v| Bound::from_value(raw, v))
                    .transpose()?;
                let upper = range
                    .upper
                    .as_ref()
                    .map(|v| Bound::from_value(raw, v))
                    .transpose()?;
                let textual = [&lower, &upper]
                    .into_iter()
                    .flatten()
                    .any(|b| matches!(b, Bound::Text(_)));
                if textual && !self.capabilities.text_ranges {
                    return Err(Error::validation_field(
                        raw,
                        format!("{} cannot range over text", self.capabilities.backend),
                    ));
                }
                bounded(lower, upper)
            }
            Criterion::DateRange(range) => {
                if !self.capabilities.date_ranges {
                    return Err(Error::validation_field(
                        raw,
                        format!("{} cannot range over dates", self.capabilities.backend),
                    ));
                }
                bounded(
                    range.lower.map(Bound::Instant),
                    range.upper.map(Bound::Instant),
                )
            }
        };
        Ok(Condition { path, test })
    }
}

fn bounded(lower: Option<Bound>, upper: Option<Bound>) -> Test {
    if lower.is_none() && upper.is_none() {
        Test::Exists
    } else {
        Test::Range(Bounds { lower, upper })
    }
}

fn is_bare_identifier(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use serde_json::json;
    use unisearch_core::{DateRange, RangeValue};

    fn doc(value: Json) -> Document {
        Document::from_json(value).unwrap()
    }

    fn reference(criteria: &Criteria) -> SearchPlan {
        plan(criteria, &Capabilities::reference()).unwrap()
    }

    // ------------------------------------------------------------------------
    // Lowering
    // ------------------------------------------------------------------------

    #[test]
    fn test_lowers_each_dictionary() {
        let criteria = Criteria::builder()
            .query("Sun (fusion)")
            .field("org", "edX")
            .field("modes", FieldValue::from(vec!["honor", "audit"]))
            .filter("age", RangeValue::at_least(18))
            .exclude("id", "old")
            .aggregate("org", Some(5))
            .doc_type("courseware")
            .size(5)
            .from(10)
            .build();
        let plan = reference(&criteria);

        assert_eq!(plan.text.as_ref().unwrap().terms, vec!["sun", "fusion"]);
        assert_eq!(plan.doc_type.as_deref(), Some("courseware"));
        assert_eq!(plan.must.len(), 2);
        assert_eq!(plan.must[1].path.as_str(), "org");
        assert!(matches!(plan.must[0].test, Test::AnyOf(ref v) if v.len() == 2));
        assert!(matches!(plan.filters[0].test, Test::Range(_)));
        assert_eq!(plan.exclude[0].test, Test::Equals(Scalar::Text("old".into())));
        assert_eq!(plan.aggregations[0].size, Some(5));
        assert_eq!(plan.page, Page { from: 10, size: 5 });
    }

    #[test]
    fn test_unbounded_range_lowers_to_exists() {
        let criteria = Criteria::builder()
            .field("a", RangeValue::default())
            .filter("b", DateRange::default())
            .build();
        let plan = reference(&criteria);
        assert_eq!(plan.must[0].test, Test::Exists);
        assert_eq!(plan.filters[0].test, Test::Exists);
    }

    #[test]
    fn test_blank_query_imposes_no_text_constraint() {
        let plan = reference(&Criteria::builder().query("   ").build());
        assert!(plan.text.is_none());
        assert!(!plan.matches_nothing());
    }

    #[test]
    fn test_reserved_only_query_matches_nothing() {
        let plan = reference(&Criteria::builder().query("+=><!(){}[]^~*:\\/&|?").build());
        assert!(plan.matches_nothing());
    }

    #[test]
    fn test_text_query_dedupes_and_lowercases() {
        let query = TextQuery::parse("Sun sun SUN moon");
        assert_eq!(query.terms, vec!["sun", "moon"]);
        assert_eq!(query.joined(), "sun moon");
    }

    #[test]
    fn test_rejects_mapping_values_with_path() {
        let criteria = Criteria::builder()
            .field("tags", FieldValue::Object(Default::default()))
            .build();
        let err = plan(&criteria, &Capabilities::reference()).unwrap_err();
        assert!(err.to_string().contains("(field 'tags')"));
    }

    // ------------------------------------------------------------------------
    // Capability checks
    // ------------------------------------------------------------------------

    #[test]
    fn test_rejects_paths_deeper_than_backend_supports() {
        let caps = Capabilities {
            max_path_depth: Some(2),
            ..Capabilities::reference()
        };
        let criteria = Criteria::builder().field("a.b.c", "x").build();
        let err = plan(&criteria, &caps).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(err.to_string().contains("a.b.c"));
        assert!(plan(&Criteria::builder().field("a.b", "x").build(), &caps).is_ok());
    }

    #[test]
    fn test_meilisearch_rejects_unsupported_shapes() {
        let caps = Capabilities::meilisearch();
        let cases = [
            Criteria::builder().field("tags.colour name", "red").build(),
            Criteria::builder()
                .field("name", RangeValue::between("a", "m"))
                .build(),
            Criteria::builder()
                .filter("start", DateRange::until(Utc::now()))
                .build(),
            Criteria::builder().size(10).from(995).build(),
        ];
        for criteria in &cases {
            assert!(
                matches!(plan(criteria, &caps), Err(Error::Validation { .. })),
                "expected rejection for {criteria:?}"
            );
        }
        let ok = Criteria::builder()
            .field("tags.color", "red")
            .field("age", RangeValue::between(1, 2))
            .build();
        assert!(plan(&ok, &caps).is_ok());
    }

    #[test]
    fn test_result_window_boundary() {
        let caps = Capabilities::elasticsearch();
        assert!(plan(&Criteria::builder().size(10).from(9_990).build(), &caps).is_ok());
        assert!(plan(&Criteria::builder().size(10).from(9_991).build(), &caps).is_err());
    }

    #[test]
    fn test_page_size_limit() {
        let caps = Capabilities::typesense();
        assert!(plan(&Criteria::builder().size(250).from(50_000).build(), &caps).is_ok());
        let err = plan(&Criteria::builder().size(251).build(), &caps).unwrap_err();
        assert!(err.to_string().contains("typesense page limit of 250"));
    }

    // ------------------------------------------------------------------------
    // Reference semantics
    // ------------------------------------------------------------------------

    #[test]
    fn test_equality_and_containment() {
        let document = doc(json!({"tags": ["a", "b"], "n": 3, "flag": true}));
        let eq = |path: &str, value: FieldValue| {
            reference(&Criteria::builder().field(path, value).build()).admits(&document)
        };
        assert!(eq("tags", "a".into()));
        assert!(!eq("tags", "c".into()));
        assert!(eq("n", FieldValue::Float(3.0)));
        assert!(!eq("n", "3".into()));
        assert!(eq("flag", true.into()));
        assert!(!eq("missing", "a".into()));
        assert!(eq("tags", FieldValue::from(vec!["c", "b"])));
    }

    #[test]
    fn test_range_inclusivity() {
        let range = Criteria::builder()
            .field("age", RangeValue::between(18, 39))
            .build();
        let plan = reference(&range);
        for (age, expected) in [(17, false), (18, true), (39, true), (40, false)] {
            assert_eq!(plan.admits(&doc(json!({"age": age}))), expected, "age {age}");
        }
    }

    #[test]
    fn test_text_range() {
        let plan = reference(
            &Criteria::builder()
                .field("name", RangeValue::between("b", "d"))
                .build(),
        );
        assert!(plan.admits(&doc(json!({"name": "c"}))));
        assert!(!plan.admits(&doc(json!({"name": "e"}))));
        assert!(!plan.admits(&doc(json!({"name": 2}))));
    }

    #[test]
    fn test_date_filter_includes_missing_field() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let plan = reference(
            &Criteria::builder()
                .filter("start_date", DateRange::until(now))
                .build(),
        );
        assert!(plan.admits(&doc(json!({"id": "no-date"}))));
        assert!(plan.admits(&doc(json!({"start_date": "2024-01-01"}))));
        assert!(plan.admits(&doc(json!({"start_date": "2024-06-01T00:00:00Z"}))));
        assert!(!plan.admits(&doc(json!({"start_date": "2030-01-01T00:00:00"}))));
        assert!(!plan.admits(&doc(json!({"start_date": "soon"}))));
    }

    #[test]
    fn test_exclude_skips_missing_fields() {
        let plan = reference(
            &Criteria::builder()
                .exclude("org", FieldValue::from(vec!["edX", "MITx"]))
                .build(),
        );
        assert!(!plan.admits(&doc(json!({"org": "edX"}))));
        assert!(!plan.admits(&doc(json!({"org": ["other", "MITx"]}))));
        assert!(plan.admits(&doc(json!({"org": "HarvardX"}))));
        assert!(plan.admits(&doc(json!({"id": 1}))));
    }

    #[test]
    fn test_nested_paths() {
        let plan = reference(&Criteria::builder().field("tags.color", "red").build());
        assert!(plan.admits(&doc(json!({"tags": {"color": "red"}}))));
        assert!(plan.admits(&doc(json!({"tags": [{"color": "blue"}, {"color": "red"}]}))));
        assert!(!plan.admits(&doc(json!({"tags": {"colour": "red"}}))));
    }

    #[test]
    fn test_bound_json_forms() {
        let instant = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            Bound::Instant(instant).to_json(),
            json!("2024-01-02T03:04:05.000Z")
        );
        assert_eq!(Bound::Integer(3).to_json(), json!(3));
    }

    proptest! {
        #[test]
        fn test_range_matches_iff_within_bounds(
            lo in -1000i64..1000,
            span in 0i64..500,
            value in -2000i64..2000,
        ) {
            let hi = lo + span;
            let plan = reference(
                &Criteria::builder().field("n", RangeValue::between(lo, hi)).build(),
            );
            let document = doc(json!({"n": value}));
            prop_assert_eq!(plan.admits(&document), lo <= value && value <= hi);
        }

        #[test]
        fn test_filter_never_rejects_missing_field(value in any::<i64>()) {
            let plan = reference(
                &Criteria::builder().filter("absent", RangeValue::at_most(value)).build(),
            );
            let document = doc(json!({"present": value}));
            prop_assert!(plan.admits(&document));
        }
    }
}
