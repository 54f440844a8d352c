//! Plan to Typesense search parameters.
//!
//! Clauses render against the derived fields described in
//! [`layout`](super::layout) and are joined with `&&`. A filter entry
//! becomes `(missing || condition)` and an exclusion becomes a `!=` test on
//! `terms`, which never drops a document missing the field.
//!
//! A numeric range can only be sent once some document has put its
//! `n_*` field into the schema. Until then no document can satisfy it, so
//! the range is resolved locally instead of being sent.

use std::collections::BTreeSet;

use unisearch_core::{Error, Result};
use unisearch_query::{Bound, Condition, Scalar, SearchPlan, Test};

use super::layout::{
    CONTENT_FIELD, PRESENT_FIELD, TERMS_FIELD, TYPE_KEY_FIELD, facet_field, numeric_field,
    term_key, type_key,
};

/// Facet values requested per aggregation; caps apply client-side.
const MAX_FACET_VALUES: usize = 10_000;

/// Returns `true` when rendering needs the collection's field names.
pub(crate) fn needs_schema(plan: &SearchPlan) -> bool {
    !plan.aggregations.is_empty()
        || plan
            .must
            .iter()
            .chain(&plan.filters)
            .any(|c| matches!(c.test, Test::Range(_)))
}

/// Query parameters for `GET /collections/{name}/documents/search`.
///
/// `None` when the plan provably matches no document, so nothing needs
/// sending.
pub(crate) fn search_params(
    plan: &SearchPlan,
    fields: &BTreeSet<String>,
) -> Result<Option<Vec<(&'static str, String)>>> {
    let q = match &plan.text {
        Some(text) => text.joined(),
        None => "*".to_string(),
    };
    let mut params = vec![
        ("q", q),
        ("query_by", CONTENT_FIELD.to_string()),
        ("num_typos", "0".to_string()),
        ("offset", plan.page.from.to_string()),
        ("limit", plan.page.size.to_string()),
    ];

    let Some(filter) = filter_expression(plan, fields)? else {
        return Ok(None);
    };
    if !filter.is_empty() {
        params.push(("filter_by", filter));
    }

    let facets: Vec<String> = plan
        .aggregations
        .iter()
        .map(|aggregation| facet_field(aggregation.path.as_str()))
        .filter(|field| fields.contains(field))
        .collect();
    if !facets.is_empty() {
        params.push(("facet_by", facets.join(",")));
        params.push(("max_facet_values", MAX_FACET_VALUES.to_string()));
    }
    Ok(Some(params))
}

/// The `filter_by` expression, empty when nothing is filtered, or `None`
/// when a required condition can hold for no document.
pub(crate) fn filter_expression(
    plan: &SearchPlan,
    fields: &BTreeSet<String>,
) -> Result<Option<String>> {
    let mut clauses: Vec<String> = Vec::new();
    if let Some(doc_type) = &plan.doc_type {
        clauses.push(format!("{TYPE_KEY_FIELD}:=`{}`", type_key(doc_type)));
    }
    for c in &plan.must {
        match condition(c, fields)? {
            Some(clause) => clauses.push(clause),
            None => return Ok(None),
        }
    }
    for c in &plan.filters {
        let missing = format!("{PRESENT_FIELD}:!=`{}`", c.path);
        clauses.push(match condition(c, fields)? {
            Some(clause) => format!("({missing} || {clause})"),
            None => missing,
        });
    }
    for c in &plan.exclude {
        if let Some(clause) = exclusion(c)? {
            clauses.push(clause);
        }
    }
    Ok(Some(clauses.join(" && ")))
}

/// A clause true exactly where the condition holds, or `None` when it
/// holds nowhere.
fn condition(condition: &Condition, fields: &BTreeSet<String>) -> Result<Option<String>> {
    let path = condition.path.as_str();
    Ok(match &condition.test {
        Test::Equals(value) => Some(format!("{TERMS_FIELD}:=`{}`", term_key(path, value))),
        Test::AnyOf(values) if values.is_empty() => None,
        Test::AnyOf(values) => Some(format!("{TERMS_FIELD}:={}", term_list(path, values))),
        Test::Exists => Some(format!("{PRESENT_FIELD}:=`{path}`")),
        Test::Range(bounds) => {
            let field = numeric_field(path);
            if !fields.contains(&field) {
                return Ok(None);
            }
            let lower = bounds.lower.as_ref().map(|b| number(path, b)).transpose()?;
            let upper = bounds.upper.as_ref().map(|b| number(path, b)).transpose()?;
            match (lower, upper) {
                (Some(lo), Some(hi)) => Some(format!("{field}:[{lo}..{hi}]")),
                (Some(lo), None) => Some(format!("{field}:>={lo}")),
                (None, Some(hi)) => Some(format!("{field}:<={hi}")),
                (None, None) => Some(format!("{PRESENT_FIELD}:=`{path}`")),
            }
        }
    })
}

fn exclusion(condition: &Condition) -> Result<Option<String>> {
    let path = condition.path.as_str();
    match &condition.test {
        Test::Equals(value) => Ok(Some(format!(
            "{TERMS_FIELD}:!=`{}`",
            term_key(path, value)
        ))),
        Test::AnyOf(values) if values.is_empty() => Ok(None),
        Test::AnyOf(values) => Ok(Some(format!(
            "{TERMS_FIELD}:!={}",
            term_list(path, values)
        ))),
        _ => Err(Error::validation_field(
            path,
            "typesense can only exclude by value",
        )),
    }
}

fn term_list(path: &str, values: &[Scalar]) -> String {
    let keys: Vec<String> = values
        .iter()
        .map(|value| format!("`{}`", term_key(path, value)))
        .collect();
    format!("[{}]", keys.join(","))
}

fn number(path: &str, bound: &Bound) -> Result<f64> {
    bound
        .as_f64()
        .ok_or_else(|| Error::validation_field(path, "typesense can only range over numbers"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use unisearch_core::{Criteria, FieldValue, RangeValue};
    use unisearch_query::{Capabilities, plan};

    fn plan_for(criteria: &Criteria) -> SearchPlan {
        plan(criteria, &Capabilities::typesense()).unwrap()
    }

    fn param<'a>(params: &'a [(&'static str, String)], key: &str) -> Option<&'a str> {
        params
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_match_all_without_conditions() {
        let params = search_params(&plan_for(&Criteria::default()), &BTreeSet::new())
            .unwrap()
            .unwrap();
        assert_eq!(param(&params, "q"), Some("*"));
        assert_eq!(param(&params, "query_by"), Some("content"));
        assert_eq!(param(&params, "limit"), Some("10"));
        assert!(param(&params, "filter_by").is_none());
        assert!(param(&params, "facet_by").is_none());
        assert!(!needs_schema(&plan_for(&Criteria::default())));
    }

    #[test]
    fn test_value_conditions_use_term_digests() {
        let criteria = Criteria::builder()
            .query("Sun!")
            .doc_type("course")
            .field("org", "edX")
            .field("modes", FieldValue::from(vec!["honor", "audit"]))
            .build();
        let plan = plan_for(&criteria);
        let edx = term_key("org", &Scalar::Text("edX".into()));
        let honor = term_key("modes", &Scalar::Text("honor".into()));
        let audit = term_key("modes", &Scalar::Text("audit".into()));
        assert_eq!(
            filter_expression(&plan, &BTreeSet::new()).unwrap().unwrap(),
            format!(
                "type_key:=`{}` && terms:=[`{honor}`,`{audit}`] && terms:=`{edx}`",
                type_key("course")
            )
        );
        let params = search_params(&plan, &BTreeSet::new()).unwrap().unwrap();
        assert_eq!(param(&params, "q"), Some("sun"));
    }

    #[test]
    fn test_filter_and_exclude_clauses() {
        let criteria = Criteria::builder()
            .filter("org", "edX")
            .exclude("tags.color", FieldValue::from(vec!["red", "blue"]))
            .build();
        let edx = term_key("org", &Scalar::Text("edX".into()));
        let red = term_key("tags.color", &Scalar::Text("red".into()));
        let blue = term_key("tags.color", &Scalar::Text("blue".into()));
        assert_eq!(
            filter_expression(&plan_for(&criteria), &BTreeSet::new())
                .unwrap()
                .unwrap(),
            format!("(present:!=`org` || terms:=`{edx}`) && terms:!=[`{red}`,`{blue}`]")
        );
    }

    #[test]
    fn test_ranges_on_known_numeric_fields() {
        let criteria = Criteria::builder()
            .field("age", RangeValue::between(18, 39))
            .filter("level", RangeValue::at_most(2.5))
            .build();
        let plan = plan_for(&criteria);
        assert!(needs_schema(&plan));
        let fields = BTreeSet::from([numeric_field("age"), numeric_field("level")]);
        assert_eq!(
            filter_expression(&plan, &fields).unwrap().unwrap(),
            format!(
                "{}:[18..39] && (present:!=`level` || {}:<=2.5)",
                numeric_field("age"),
                numeric_field("level")
            )
        );
    }

    #[test]
    fn test_ranges_on_unseen_fields_resolve_locally() {
        let required = Criteria::builder()
            .field("age", RangeValue::at_least(18))
            .build();
        assert!(search_params(&plan_for(&required), &BTreeSet::new())
            .unwrap()
            .is_none());

        let optional = Criteria::builder()
            .filter("age", RangeValue::at_least(18))
            .build();
        assert_eq!(
            filter_expression(&plan_for(&optional), &BTreeSet::new())
                .unwrap()
                .unwrap(),
            "present:!=`age`"
        );
    }

    #[test]
    fn test_unbounded_range_is_presence() {
        let criteria = Criteria::builder()
            .field("org", RangeValue::default())
            .build();
        assert_eq!(
            filter_expression(&plan_for(&criteria), &BTreeSet::new())
                .unwrap()
                .unwrap(),
            "present:=`org`"
        );
    }

    #[test]
    fn test_facets_only_for_known_fields() {
        let criteria = Criteria::builder()
            .aggregate("org", None)
            .aggregate("modes", Some(3))
            .build();
        let fields = BTreeSet::from([facet_field("org")]);
        let params = search_params(&plan_for(&criteria), &fields)
            .unwrap()
            .unwrap();
        assert_eq!(param(&params, "facet_by"), Some(facet_field("org").as_str()));
        assert_eq!(param(&params, "max_facet_values"), Some("10000"));
    }
}
