//! Metadata filter expressions.
//!
//! Filters compare string-valued metadata for equality and combine with
//! AND / OR. Both stores evaluate the same expression: [`MemoryStore`]
//! in Rust via [`Filter::matches`], [`Storage`] in SQL via `json_extract`.
//!
//! [`MemoryStore`]: crate::MemoryStore
//! [`Storage`]: crate::Storage

use payslip_shared::{MetaValue, Metadata};

/// A boolean expression over chunk metadata.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `metadata[key] == value` (string values only; absent keys never match).
    Eq { key: String, value: String },
    /// Every operand matches. An empty conjunction matches everything.
    And(Vec<Filter>),
    /// At least one operand matches. An empty disjunction matches nothing.
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Eq {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Self::And(mut ops) => {
                ops.push(other);
                Self::And(ops)
            }
            first => Self::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Filter) -> Self {
        match self {
            Self::Or(mut ops) => {
                ops.push(other);
                Self::Or(ops)
            }
            first => Self::Or(vec![first, other]),
        }
    }

    /// Evaluate against a metadata map.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        match self {
            Self::Eq { key, value } => {
                metadata.get(key).and_then(MetaValue::as_str) == Some(value.as_str())
            }
            Self::And(ops) => ops.iter().all(|f| f.matches(metadata)),
            Self::Or(ops) => ops.iter().any(|f| f.matches(metadata)),
        }
    }

    /// Render as a SQL predicate over the `metadata_json` column, pushing
    /// bound values onto `params`. JSON paths are bound too, never inlined.
    pub(crate) fn to_sql(&self, params: &mut Vec<libsql::Value>) -> String {
        match self {
            Self::Eq { key, value } => {
                params.push(libsql::Value::Text(json_path(key)));
                let path_idx = params.len();
                params.push(libsql::Value::Text(value.clone()));
                let value_idx = params.len();
                format!("json_extract(metadata_json, ?{path_idx}) = ?{value_idx}")
            }
            Self::And(ops) if ops.is_empty() => "1".into(),
            Self::Or(ops) if ops.is_empty() => "0".into(),
            Self::And(ops) => join_sql(ops, " AND ", params),
            Self::Or(ops) => join_sql(ops, " OR ", params),
        }
    }
}

fn join_sql(ops: &[Filter], sep: &str, params: &mut Vec<libsql::Value>) -> String {
    let parts: Vec<String> = ops.iter().map(|f| f.to_sql(params)).collect();
    format!("({})", parts.join(sep))
}

/// Dot-path keys are quoted so `personal.nationalId` stays one member name.
fn json_path(key: &str) -> String {
    format!("$.\"{}\"", key.replace('"', "\\\""))
}
