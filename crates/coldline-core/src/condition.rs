// Copyright (C) 2025 Coldline Project
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Where-condition builder for archival queries.
//!
//! Two pure operations shared by the job requestor and the pipeline:
//!
//! - fetch conditions scope archive-mapping lookups to a logical model,
//! - insert conditions pass the caller's selection through unchanged.

use serde_json::Value;

use crate::filter::{Filter, WhereClause};

/// Mapping column that records which logical model a mapping belongs to.
pub const ACTED_ON: &str = "acted_on";

/// Build the archive-mapping fetch condition for a model.
///
/// The caller's filter is deliberately discarded: mapping lookups are
/// always scoped per logical model, and field predicates over the source
/// model do not apply to the mapping table. The result is always
/// `{where: {acted_on: model_name}}`.
pub fn build_condition_for_fetch(_source_filter: Option<&Filter>, model_name: &str) -> Filter {
    let mut clause = WhereClause::new();
    clause.insert(ACTED_ON.to_string(), Value::String(model_name.to_string()));
    Filter::with_where(clause)
}

/// Build the live-store selection condition for an export.
///
/// Pass-through: the caller's where clause is used unchanged, and a
/// missing clause becomes the empty condition (match everything).
pub fn build_condition_for_insert(source_where: Option<&WhereClause>) -> WhereClause {
    source_where.cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filter_with(field: &str, value: Value) -> Filter {
        let mut clause = WhereClause::new();
        clause.insert(field.to_string(), value);
        Filter::with_where(clause)
    }

    #[test]
    fn test_fetch_condition_is_scoped_to_model_only() {
        let source = filter_with("description", json!("sunsilk"));
        let condition = build_condition_for_fetch(Some(&source), "Product");

        let expected: Filter =
            serde_json::from_str(r#"{"where":{"acted_on":"Product"}}"#).unwrap();
        assert_eq!(condition, expected);
    }

    #[test]
    fn test_fetch_condition_ignores_missing_filter() {
        let condition = build_condition_for_fetch(None, "Product");
        let clause = condition.where_clause().unwrap();
        assert_eq!(clause.len(), 1);
        assert_eq!(clause.get(ACTED_ON), Some(&json!("Product")));
    }

    #[test]
    fn test_fetch_condition_same_for_any_source() {
        let a = build_condition_for_fetch(None, "Product");
        let b = build_condition_for_fetch(
            Some(&filter_with("price", json!(100))),
            "Product",
        );
        let c = build_condition_for_fetch(
            Some(&filter_with(ACTED_ON, json!("Other"))),
            "Product",
        );
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_insert_condition_is_identity() {
        let mut clause = WhereClause::new();
        clause.insert("description".to_string(), json!("sunsilk"));
        clause.insert("price".to_string(), json!(250));

        let built = build_condition_for_insert(Some(&clause));
        assert_eq!(built, clause);
    }

    #[test]
    fn test_insert_condition_defaults_to_empty() {
        let built = build_condition_for_insert(None);
        assert!(built.is_empty());
    }
}
