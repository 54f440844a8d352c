//! Schema-less document representation.
//!
//! Documents are string-keyed ordered maps of [`FieldValue`], a recursive
//! tagged value covering scalars, sequences (multivalue fields), and nested
//! objects. Nested fields are addressed with dot-separated [`FieldPath`]s
//! such as `nested_attributes.another_attribute`.
//!
//! # Path resolution
//!
//! [`Document::resolve`] returns every non-null leaf reachable by a path.
//! Sequences are flattened at every level, so `tags` on
//! `{"tags": ["a", "b"]}` resolves to two leaves and `authors.name` on a
//! list of author objects resolves to each author's name. A path that
//! resolves to no leaf is *missing*; `null`, empty lists and objects
//! holding nothing but those count as missing.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Ordered field map used for documents and nested objects.
pub type Fields = BTreeMap<String, FieldValue>;

/// A single field value inside a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Explicit null. Treated as a missing field.
    Null,
    /// Boolean scalar.
    Bool(bool),
    /// Integer scalar.
    Integer(i64),
    /// Floating-point scalar.
    Float(f64),
    /// Text scalar. Dates travel as ISO-8601 text.
    Text(String),
    /// Multivalue field.
    List(Vec<FieldValue>),
    /// Nested object.
    Object(Fields),
}

impl FieldValue {
    /// Returns `true` for bool, number, and text values.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Self::Bool(_) | Self::Integer(_) | Self::Float(_) | Self::Text(_)
        )
    }

    /// Returns `true` for null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Text content, if this is a text value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric value, if this is an integer or float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Short name of the value's kind, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::List(_) => "list",
            Self::Object(_) => "object",
        }
    }

    /// Scalar equality with numeric coercion between integers and floats.
    ///
    /// Lists and objects are never equal to anything under this test.
    pub fn scalar_eq(&self, other: &FieldValue) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }

    /// Render a scalar as an aggregation bucket key.
    pub fn key_string(&self) -> Option<String> {
        match self {
            Self::Bool(b) => Some(b.to_string()),
            Self::Integer(i) => Some(i.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::Text(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Collect every text leaf under this value, depth first.
    pub fn collect_text<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Text(s) => out.push(s),
            Self::List(items) => items.iter().for_each(|item| item.collect_text(out)),
            Self::Object(fields) => fields.values().for_each(|v| v.collect_text(out)),
            _ => {}
        }
    }

    /// Convert to a `serde_json::Value`.
    ///
    /// Non-finite floats have no JSON form and become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Self::Null => Json::Null,
            Self::Bool(b) => Json::Bool(*b),
            Self::Integer(i) => Json::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Self::Text(s) => Json::String(s.clone()),
            Self::List(items) => Json::Array(items.iter().map(Self::to_json).collect()),
            Self::Object(fields) => Json::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    fn collect_leaves<'a>(&'a self, segments: &[String], out: &mut Vec<&'a FieldValue>) {
        match self {
            Self::Null => {}
            Self::List(items) => {
                for item in items {
                    item.collect_leaves(segments, out);
                }
            }
            Self::Object(fields) => match segments.split_first() {
                Some((head, rest)) => {
                    if let Some(child) = fields.get(head) {
                        child.collect_leaves(rest, out);
                    }
                }
                None => {
                    if self.has_content() {
                        out.push(self);
                    }
                }
            },
            scalar => {
                if segments.is_empty() {
                    out.push(scalar);
                }
            }
        }
    }
}

impl FieldValue {
    /// Returns `true` when some scalar sits somewhere under this value.
    fn has_content(&self) -> bool {
        match self {
            Self::Null => false,
            Self::List(items) => items.iter().any(Self::has_content),
            Self::Object(fields) => fields.values().any(Self::has_content),
            _ => true,
        }
    }

    fn collect_paths(&self, prefix: &str, out: &mut BTreeSet<String>) -> bool {
        match self {
            Self::Null => false,
            Self::List(items) => items
                .iter()
                .fold(false, |found, item| item.collect_paths(prefix, out) || found),
            Self::Object(fields) => {
                let mut found = false;
                for (key, value) in fields {
                    let path = format!("{prefix}.{key}");
                    if value.collect_paths(&path, out) {
                        found = true;
                        if !key.is_empty() && !key.contains('.') {
                            out.insert(path);
                        }
                    }
                }
                found
            }
            _ => true,
        }
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match value {
            Json::Null => Self::Null,
            Json::Bool(b) => Self::Bool(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Self::Text(s),
            Json::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            Json::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl<T: Into<FieldValue>> From<Vec<T>> for FieldValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl From<Document> for FieldValue {
    fn from(document: Document) -> Self {
        Self::Object(document.0)
    }
}

// ============================================================================
// FieldPath
// ============================================================================

/// A validated dot-separated path into a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldPath {
    raw: String,
    segments: Vec<String>,
}

impl FieldPath {
    /// Parse a dot path, rejecting empty segments.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(Error::validation_field(raw, "field path must not be empty"));
        }
        let segments: Vec<String> = raw.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(Error::validation_field(
                raw,
                "field path contains an empty segment",
            ));
        }
        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// Path segments, outermost first.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// The path as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for FieldPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

// ============================================================================
// Document
// ============================================================================

/// An indexed document: a top-level field map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Fields);

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing field map.
    pub fn from_fields(fields: Fields) -> Self {
        Self(fields)
    }

    /// Convert a JSON value, which must be an object.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        match FieldValue::from(value) {
            FieldValue::Object(fields) => Ok(Self(fields)),
            other => Err(Error::validation(format!(
                "document must be a mapping, got {}",
                other.kind_name()
            ))),
        }
    }

    /// Convert to a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Insert a top-level field, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Option<FieldValue> {
        self.0.insert(key.into(), value.into())
    }

    /// Get a top-level field.
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.get(key)
    }

    /// Borrow the field map.
    pub fn fields(&self) -> &Fields {
        &self.0
    }

    /// Take the field map.
    pub fn into_fields(self) -> Fields {
        self.0
    }

    /// Resolve the document id from a top-level text or integer field.
    pub fn id(&self, id_field: &str) -> Option<String> {
        match self.0.get(id_field)? {
            FieldValue::Text(s) if !s.is_empty() => Some(s.clone()),
            FieldValue::Integer(i) => Some(i.to_string()),
            _ => None,
        }
    }

    /// Every non-null leaf reachable by `path`, sequences flattened.
    pub fn resolve(&self, path: &FieldPath) -> Vec<&FieldValue> {
        let mut out = Vec::new();
        if let Some((head, rest)) = path.segments().split_first()
            && let Some(value) = self.0.get(head)
        {
            value.collect_leaves(rest, &mut out);
        }
        out
    }

    /// Returns `true` when `path` resolves to at least one leaf.
    pub fn has_path(&self, path: &FieldPath) -> bool {
        !self.resolve(path).is_empty()
    }

    /// Every dot path for which [`has_path`](Self::has_path) holds.
    ///
    /// Keys that are empty or contain a dot cannot be addressed by a
    /// [`FieldPath`] and are left out.
    pub fn present_paths(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for (key, value) in &self.0 {
            if value.collect_paths(key, &mut out) && !key.is_empty() && !key.contains('.') {
                out.insert(key.clone());
            }
        }
        out
    }
}

impl TryFrom<serde_json::Value> for Document {
    type Error = Error;

    fn try_from(value: serde_json::Value) -> Result<Self> {
        Self::from_json(value)
    }
}

// ============================================================================
// Tests
// ============================================================================
