//! The engine-agnostic search request.
//!
//! A [`Criteria`] combines an optional free-text query with three
//! dictionaries keyed by dot path:
//!
//! - `field_dictionary`: every entry must match. A missing field never
//!   matches.
//! - `filter_dictionary`: every entry must match *or* its field must be
//!   missing.
//! - `exclude_dictionary`: a document whose field equals any listed value
//!   is dropped. A missing field is never excluded.
//!
//! Match values are scalars (equality, or containment for multivalue
//! fields), [`RangeValue`]s and [`DateRange`]s (inclusive on both sides,
//! `None` meaning unbounded). A list value is passed through to the backend
//! as "any of"; its behaviour differs between backends and callers should
//! avoid it. Mapping and `null` values are rejected.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::{Error, Result};
use crate::value::{FieldPath, FieldValue};

/// Page size used when a request does not specify one.
pub const DEFAULT_PAGE_SIZE: usize = 10;

// ============================================================================
// Ranges
// ============================================================================

/// Inclusive range over numbers or text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeValue {
    /// Lower bound, inclusive. `None` is unbounded.
    #[serde(default)]
    pub lower: Option<FieldValue>,
    /// Upper bound, inclusive. `None` is unbounded.
    #[serde(default)]
    pub upper: Option<FieldValue>,
}

impl RangeValue {
    /// Range bounded on both sides.
    pub fn between(lower: impl Into<FieldValue>, upper: impl Into<FieldValue>) -> Self {
        Self {
            lower: Some(lower.into()),
            upper: Some(upper.into()),
        }
    }

    /// Range bounded below only.
    pub fn at_least(lower: impl Into<FieldValue>) -> Self {
        Self {
            lower: Some(lower.into()),
            upper: None,
        }
    }

    /// Range bounded above only.
    pub fn at_most(upper: impl Into<FieldValue>) -> Self {
        Self {
            lower: None,
            upper: Some(upper.into()),
        }
    }

    /// Check that the bounds are numbers or text, and not a mix of both.
    pub fn validate(&self, path: &str) -> Result<()> {
        let bounds = [&self.lower, &self.upper];
        let mut numeric = false;
        let mut textual = false;
        for bound in bounds.into_iter().flatten() {
            match bound {
                FieldValue::Integer(_) | FieldValue::Float(_) => numeric = true,
                FieldValue::Text(_) => textual = true,
                other => {
                    return Err(Error::validation_field(
                        path,
                        format!("range bound must be a number or text, got {}", other.kind_name()),
                    ));
                }
            }
        }
        if numeric && textual {
            return Err(Error::validation_field(
                path,
                "range bounds mix numbers and text",
            ));
        }
        Ok(())
    }
}

/// Inclusive range over timestamps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// Earliest instant, inclusive. `None` is unbounded.
    #[serde(default)]
    pub lower: Option<DateTime<Utc>>,
    /// Latest instant, inclusive. `None` is unbounded.
    #[serde(default)]
    pub upper: Option<DateTime<Utc>>,
}

impl DateRange {
    /// Range bounded on both sides.
    pub fn between(lower: DateTime<Utc>, upper: DateTime<Utc>) -> Self {
        Self {
            lower: Some(lower),
            upper: Some(upper),
        }
    }

    /// Everything at or after `lower`.
    pub fn since(lower: DateTime<Utc>) -> Self {
        Self {
            lower: Some(lower),
            upper: None,
        }
    }

    /// Everything at or before `upper`.
    pub fn until(upper: DateTime<Utc>) -> Self {
        Self {
            lower: None,
            upper: Some(upper),
        }
    }

    /// Returns `true` when `instant` falls inside the range.
    pub fn contains(&self, instant: &DateTime<Utc>) -> bool {
        self.lower.is_none_or(|lower| *instant >= lower)
            && self.upper.is_none_or(|upper| *instant <= upper)
    }
}

/// Parse a stored date string into a UTC instant.
///
/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM:SS[.f][Z]` (naive times are UTC) and
/// bare `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    let naive = text.strip_suffix('Z').unwrap_or(text);
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(naive, format) {
            return Some(parsed.and_utc());
        }
    }
    NaiveDate::parse_from_str(naive, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

// ============================================================================
// Criterion
// ============================================================================

/// One entry of a field or filter dictionary.
#[derive(Debug, Clone, PartialEq)]
pub enum Criterion {
    /// Equality, or containment for multivalue fields.
    Value(FieldValue),
    /// Inclusive numeric or text range.
    Range(RangeValue),
    /// Inclusive timestamp range.
    DateRange(DateRange),
}

impl Criterion {
    /// Check the match value's shape for `path`.
    pub fn validate(&self, path: &str) -> Result<()> {
        match self {
            Criterion::Value(value) => validate_match_value(path, value),
            Criterion::Range(range) => range.validate(path),
            Criterion::DateRange(_) => Ok(()),
        }
    }

    fn from_json(path: &str, value: Json) -> Result<Self> {
        if let Json::Object(map) = &value
            && map.len() == 1
        {
            if let Some(body) = map.get("range") {
                let range: RangeValue = serde_json::from_value(body.clone()).map_err(|e| {
                    Error::validation_field(path, format!("invalid range: {e}"))
                })?;
                return Ok(Criterion::Range(range));
            }
            if let Some(body) = map.get("date_range") {
                return Ok(Criterion::DateRange(date_range_from_json(path, body)?));
            }
        }
        Ok(Criterion::Value(FieldValue::from(value)))
    }
}

fn validate_match_value(path: &str, value: &FieldValue) -> Result<()> {
    match value {
        FieldValue::Null => Err(Error::validation_field(path, "null is not a match value")),
        FieldValue::Object(_) => Err(Error::validation_field(
            path,
            "mapping values are not supported",
        )),
        FieldValue::List(items) => {
            if items.is_empty() {
                return Err(Error::validation_field(path, "empty list matches nothing"));
            }
            match items.iter().find(|item| !item.is_scalar()) {
                Some(item) => Err(Error::validation_field(
                    path,
                    format!("list elements must be scalars, got {}", item.kind_name()),
                )),
                None => Ok(()),
            }
        }
        _ => Ok(()),
    }
}

fn date_range_from_json(path: &str, body: &Json) -> Result<DateRange> {
    let Json::Object(map) = body else {
        return Err(Error::validation_field(path, "date_range must be a mapping"));
    };
    let bound = |key: &str| -> Result<Option<DateTime<Utc>>> {
        match map.get(key) {
            None | Some(Json::Null) => Ok(None),
            Some(Json::String(text)) => parse_timestamp(text).map(Some).ok_or_else(|| {
                Error::validation_field(path, format!("unparseable date '{text}'"))
            }),
            Some(other) => Err(Error::validation_field(
                path,
                format!("date bound must be a string, got {other}"),
            )),
        }
    };
    if let Some(key) = map.keys().find(|k| *k != "lower" && *k != "upper") {
        return Err(Error::validation_field(
            path,
            format!("unknown date_range key '{key}'"),
        ));
    }
    Ok(DateRange {
        lower: bound("lower")?,
        upper: bound("upper")?,
    })
}

impl From<FieldValue> for Criterion {
    fn from(value: FieldValue) -> Self {
        Criterion::Value(value)
    }
}

impl From<RangeValue> for Criterion {
    fn from(range: RangeValue) -> Self {
        Criterion::Range(range)
    }
}

impl From<DateRange> for Criterion {
    fn from(range: DateRange) -> Self {
        Criterion::DateRange(range)
    }
}

impl From<&str> for Criterion {
    fn from(value: &str) -> Self {
        Criterion::Value(value.into())
    }
}

impl From<String> for Criterion {
    fn from(value: String) -> Self {
        Criterion::Value(value.into())
    }
}

impl From<i64> for Criterion {
    fn from(value: i64) -> Self {
        Criterion::Value(value.into())
    }
}

impl From<i32> for Criterion {
    fn from(value: i32) -> Self {
        Criterion::Value(value.into())
    }
}

impl From<f64> for Criterion {
    fn from(value: f64) -> Self {
        Criterion::Value(value.into())
    }
}

impl From<bool> for Criterion {
    fn from(value: bool) -> Self {
        Criterion::Value(value.into())
    }
}

// ============================================================================
// Criteria
// ============================================================================

/// Per-path aggregation request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationRequest {
    /// Maximum number of buckets reported. `None` reports them all.
    #[serde(default)]
    pub size: Option<usize>,
}

/// A complete search request.
#[derive(Debug, Clone, PartialEq)]
pub struct Criteria {
    /// Free text matched against the `content` subtree.
    pub query_string: Option<String>,
    /// Strict AND matches.
    pub field_dictionary: BTreeMap<String, Criterion>,
    /// AND-of-(match OR missing) matches.
    pub filter_dictionary: BTreeMap<String, Criterion>,
    /// Values whose presence drops a document.
    pub exclude_dictionary: BTreeMap<String, FieldValue>,
    /// Document-type restriction.
    pub doc_type: Option<String>,
    /// Maximum hits returned.
    pub size: usize,
    /// Zero-based offset of the first hit returned.
    pub from: usize,
    /// Term aggregations computed over the full match set.
    pub aggregation_terms: BTreeMap<String, AggregationRequest>,
}

impl Default for Criteria {
    fn default() -> Self {
        Self {
            query_string: None,
            field_dictionary: BTreeMap::new(),
            filter_dictionary: BTreeMap::new(),
            exclude_dictionary: BTreeMap::new(),
            doc_type: None,
            size: DEFAULT_PAGE_SIZE,
            from: 0,
            aggregation_terms: BTreeMap::new(),
        }
    }
}

impl Criteria {
    /// Start building a request.
    pub fn builder() -> CriteriaBuilder {
        CriteriaBuilder::default()
    }

    /// Check every path and match value.
    ///
    /// Backend-specific limits are checked later by the query translator.
    pub fn validate(&self) -> Result<()> {
        for (path, criterion) in self.field_dictionary.iter().chain(&self.filter_dictionary) {
            FieldPath::parse(path)?;
            criterion.validate(path)?;
        }
        for (path, value) in &self.exclude_dictionary {
            FieldPath::parse(path)?;
            validate_match_value(path, value)?;
        }
        for path in self.aggregation_terms.keys() {
            FieldPath::parse(path)?;
        }
        if self.doc_type.as_deref() == Some("") {
            return Err(Error::validation("doc_type must not be empty"));
        }
        Ok(())
    }

    /// Parse the JSON wire shape.
    ///
    /// Ranges are written `{"range": {"lower": .., "upper": ..}}` and
    /// `{"date_range": {..}}`. The offset may be spelled `from_` or `from`.
    pub fn from_json(value: Json) -> Result<Self> {
        let Json::Object(map) = value else {
            return Err(Error::validation("criteria must be a mapping"));
        };
        let mut criteria = Criteria::default();
        for (key, value) in map {
            match key.as_str() {
                "query_string" => criteria.query_string = optional_string(&key, value)?,
                "doc_type" => criteria.doc_type = optional_string(&key, value)?,
                "size" => criteria.size = non_negative(&key, &value)?,
                "from" | "from_" => criteria.from = non_negative(&key, &value)?,
                "field_dictionary" => {
                    criteria.field_dictionary = criterion_map(&key, value)?;
                }
                "filter_dictionary" => {
                    criteria.filter_dictionary = criterion_map(&key, value)?;
                }
                "exclude_dictionary" => {
                    criteria.exclude_dictionary = dictionary(&key, value)?
                        .into_iter()
                        .map(|(path, v)| (path, FieldValue::from(v)))
                        .collect();
                }
                "aggregation_terms" => {
                    criteria.aggregation_terms = dictionary(&key, value)?
                        .into_iter()
                        .map(|(path, v)| {
                            let request = match v {
                                Json::Null => AggregationRequest::default(),
                                other => serde_json::from_value(other).map_err(|e| {
                                    Error::validation_field(path.as_str(), e.to_string())
                                })?,
                            };
                            Ok((path, request))
                        })
                        .collect::<Result<_>>()?;
                }
                other => {
                    return Err(Error::validation(format!("unknown criteria key '{other}'")));
                }
            }
        }
        criteria.validate()?;
        Ok(criteria)
    }
}

fn optional_string(key: &str, value: Json) -> Result<Option<String>> {
    match value {
        Json::Null => Ok(None),
        Json::String(s) => Ok(Some(s)),
        other => Err(Error::validation(format!(
            "{key} must be a string, got {other}"
        ))),
    }
}

fn non_negative(key: &str, value: &Json) -> Result<usize> {
    value
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| Error::validation(format!("{key} must be a non-negative integer")))
}

fn dictionary(key: &str, value: Json) -> Result<serde_json::Map<String, Json>> {
    match value {
        Json::Null => Ok(serde_json::Map::new()),
        Json::Object(map) => Ok(map),
        _ => Err(Error::validation(format!("{key} must be a mapping"))),
    }
}

fn criterion_map(key: &str, value: Json) -> Result<BTreeMap<String, Criterion>> {
    dictionary(key, value)?
        .into_iter()
        .map(|(path, v)| {
            let criterion = Criterion::from_json(&path, v)?;
            Ok((path, criterion))
        })
        .collect()
}

// ============================================================================
// Builder
// ============================================================================

/// Fluent constructor for [`Criteria`].
#[derive(Debug, Clone, Default)]
pub struct CriteriaBuilder {
    criteria: Criteria,
}

impl CriteriaBuilder {
    /// Set the free-text query.
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.criteria.query_string = Some(query.into());
        self
    }

    /// Add a strict match entry.
    pub fn field(mut self, path: impl Into<String>, criterion: impl Into<Criterion>) -> Self {
        self.criteria
            .field_dictionary
            .insert(path.into(), criterion.into());
        self
    }

    /// Add a match-or-missing entry.
    pub fn filter(mut self, path: impl Into<String>, criterion: impl Into<Criterion>) -> Self {
        self.criteria
            .filter_dictionary
            .insert(path.into(), criterion.into());
        self
    }

    /// Add an exclusion entry.
    pub fn exclude(mut self, path: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.criteria
            .exclude_dictionary
            .insert(path.into(), value.into());
        self
    }

    /// Restrict to one document type.
    pub fn doc_type(mut self, doc_type: impl Into<String>) -> Self {
        self.criteria.doc_type = Some(doc_type.into());
        self
    }

    /// Set the page size.
    pub fn size(mut self, size: usize) -> Self {
        self.criteria.size = size;
        self
    }

    /// Set the page offset.
    pub fn from(mut self, from: usize) -> Self {
        self.criteria.from = from;
        self
    }

    /// Request a term aggregation on `path`.
    pub fn aggregate(mut self, path: impl Into<String>, size: Option<usize>) -> Self {
        self.criteria
            .aggregation_terms
            .insert(path.into(), AggregationRequest { size });
        self
    }

    /// Finish building.
    pub fn build(self) -> Criteria {
        self.criteria
    }
}

// ============================================================================
// Tests
// ============================================================================
