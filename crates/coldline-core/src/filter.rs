// Copyright (C) 2025 Coldline Project
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Query filters over live records and archive mappings.
//!
//! A [`Filter`] is an immutable query descriptor constructed once per
//! request: a `where` clause of field equality predicates plus optional
//! pagination. It is used both for live-store queries and, via the
//! condition builder, for archive-mapping lookups.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field-to-value equality predicates, applied conjunctively.
pub type WhereClause = serde_json::Map<String, Value>;

/// Immutable query descriptor for a single request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Field equality predicates; `None` matches everything.
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<WhereClause>,

    /// Maximum number of records to return.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,

    /// Number of records to skip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
}

impl Filter {
    /// Build a filter with only a where clause.
    pub fn with_where(where_clause: WhereClause) -> Self {
        Self {
            where_clause: Some(where_clause),
            limit: None,
            offset: None,
        }
    }

    /// The where clause, or `None` when the filter matches everything.
    pub fn where_clause(&self) -> Option<&WhereClause> {
        self.where_clause.as_ref()
    }
}
