//! Stored document layout and collection schema.
//!
//! Typesense needs a typed schema and cannot filter on a field it has
//! never seen, so documents are not stored as-is. Each one becomes a flat
//! record of derived fields, all declared up front or matched by a regex
//! field:
//!
//! | Field | Type | Holds |
//! |-------|------|-------|
//! | `id` | string | BLAKE3 key of type and id |
//! | `doc_type` | string | document type, for humans |
//! | `type_key` | string | digest of the type, filtered on |
//! | `source` | string, unindexed | the document as JSON, returned on hits |
//! | `content` | string[] | every text leaf under `content` |
//! | `present` | string[] | every dot path that resolves to a leaf |
//! | `terms` | string[] | a digest per `(path, scalar leaf)` pair |
//! | `n_<digest>` | float[] | numeric leaves at one path |
//! | `f_<digest>` | string[], facet | distinct scalar leaves at one path |
//!
//! Equality, containment and exclusion filter on `terms`, missing-field
//! tests on `present`, numeric ranges on `n_*` and aggregations facet on
//! `f_*`. Digests keep caller text out of filter expressions entirely.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value as Json, json};
use unisearch_core::{Document, FieldPath, FieldValue, Result};
use unisearch_query::Scalar;

/// Stored field holding the digest of the document type.
pub(crate) const TYPE_KEY_FIELD: &str = "type_key";

/// Stored field holding the document as a JSON string.
pub(crate) const SOURCE_FIELD: &str = "source";

/// Free-text field searched by `q`.
pub(crate) const CONTENT_FIELD: &str = "content";

/// Stored field listing present paths.
pub(crate) const PRESENT_FIELD: &str = "present";

/// Stored field listing equality digests.
pub(crate) const TERMS_FIELD: &str = "terms";

const DIGEST_LEN: usize = 32;

fn digest(parts: &[&str]) -> String {
    let mut hex = blake3::hash(parts.join("\u{1f}").as_bytes())
        .to_hex()
        .to_string();
    hex.truncate(DIGEST_LEN);
    hex
}

/// Typesense document id for a document.
pub(crate) fn document_key(doc_type: &str, id: &str) -> String {
    blake3::hash(format!("{doc_type}\u{1f}{id}").as_bytes())
        .to_hex()
        .to_string()
}

/// Digest filtered on to restrict a document type.
pub(crate) fn type_key(doc_type: &str) -> String {
    digest(&["doc_type", doc_type])
}

/// Field holding numeric leaves at `path`.
pub(crate) fn numeric_field(path: &str) -> String {
    format!("n_{}", digest(&[path]))
}

/// Facet field holding scalar leaves at `path`.
pub(crate) fn facet_field(path: &str) -> String {
    format!("f_{}", digest(&[path]))
}

/// Equality digest for `value` at `path`.
///
/// Numbers are rendered canonically, so an integer and an integral float
/// share a digest.
pub(crate) fn term_key(path: &str, value: &Scalar) -> String {
    let token = match value {
        Scalar::Bool(b) => format!("b:{b}"),
        Scalar::Integer(i) => format!("n:{i}"),
        Scalar::Float(f) => number_token(*f),
        Scalar::Text(s) => format!("t:{s}"),
    };
    digest(&[path, &token])
}

fn number_token(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 9.2e18 {
        format!("n:{}", f as i64)
    } else {
        format!("n:{f}")
    }
}

fn leaf_scalar(leaf: &FieldValue) -> Option<Scalar> {
    match leaf {
        FieldValue::Bool(b) => Some(Scalar::Bool(*b)),
        FieldValue::Integer(i) => Some(Scalar::Integer(*i)),
        FieldValue::Float(f) => Some(Scalar::Float(*f)),
        FieldValue::Text(s) => Some(Scalar::Text(s.clone())),
        _ => None,
    }
}

/// Stored record for a document.
pub(crate) fn stored_document(doc_type: &str, id: &str, document: &Document) -> Result<Json> {
    let mut record = Map::new();
    record.insert("id".into(), json!(document_key(doc_type, id)));
    record.insert("doc_type".into(), json!(doc_type));
    record.insert(TYPE_KEY_FIELD.into(), json!(type_key(doc_type)));
    record.insert(
        SOURCE_FIELD.into(),
        json!(serde_json::to_string(&document.to_json())?),
    );

    let mut content = Vec::new();
    if let Some(value) = document.get(CONTENT_FIELD) {
        value.collect_text(&mut content);
    }
    record.insert(CONTENT_FIELD.into(), json!(content));

    let present = document.present_paths();
    let mut terms = BTreeSet::new();
    let mut numeric: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    let mut facets: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for raw in &present {
        let Ok(path) = FieldPath::parse(raw) else {
            continue;
        };
        for leaf in document.resolve(&path) {
            if let Some(scalar) = leaf_scalar(leaf) {
                terms.insert(term_key(raw, &scalar));
            }
            if let Some(number) = leaf.as_f64().filter(|n| n.is_finite()) {
                numeric.entry(numeric_field(raw)).or_default().push(number);
            }
            if let Some(key) = leaf.key_string() {
                facets.entry(facet_field(raw)).or_default().insert(key);
            }
        }
    }
    record.insert(PRESENT_FIELD.into(), json!(present));
    record.insert(TERMS_FIELD.into(), json!(terms));
    for (field, values) in numeric {
        record.insert(field, json!(values));
    }
    for (field, values) in facets {
        record.insert(field, json!(values));
    }
    Ok(Json::Object(record))
}

/// Body for `POST /collections`.
pub(crate) fn collection_schema(name: &str) -> Json {
    json!({
        "name": name,
        "fields": [
            {"name": "doc_type", "type": "string"},
            {"name": TYPE_KEY_FIELD, "type": "string"},
            {"name": SOURCE_FIELD, "type": "string", "index": false, "optional": true},
            {"name": CONTENT_FIELD, "type": "string[]", "optional": true},
            {"name": PRESENT_FIELD, "type": "string[]"},
            {"name": TERMS_FIELD, "type": "string[]"},
            {"name": "n_.*", "type": "float[]", "optional": true},
            {"name": "f_.*", "type": "string[]", "facet": true, "optional": true}
        ]
    })
}

/// Field names in a `GET /collections/{name}` response.
pub(crate) fn schema_fields(raw: &Json) -> BTreeSet<String> {
    raw["fields"]
        .as_array()
        .map(|fields| {
            fields
                .iter()
                .filter_map(|field| field["name"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
