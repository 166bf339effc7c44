//! Backend-neutral description of a source selection.
//!
//! Data sources translate a [`SourceQuery`] into their own query language. Query hooks on a
//! descriptor may append extra [`Condition`]s before the query reaches the source.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Scalar compared against a column by a status filter or a condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl FilterValue {
    /// Text form used when a backend compares values loosely (in-memory rows).
    pub fn as_text(&self) -> String {
        match self {
            FilterValue::Bool(value) => value.to_string(),
            FilterValue::Int(value) => value.to_string(),
            FilterValue::Text(value) => value.clone(),
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionOp {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    IsNull,
    IsNotNull,
}

impl ConditionOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            ConditionOp::Eq => "=",
            ConditionOp::NotEq => "<>",
            ConditionOp::Lt => "<",
            ConditionOp::Lte => "<=",
            ConditionOp::Gt => ">",
            ConditionOp::Gte => ">=",
            ConditionOp::IsNull => "IS NULL",
            ConditionOp::IsNotNull => "IS NOT NULL",
        }
    }

    /// Whether the operator takes a right-hand value.
    pub fn is_binary(self) -> bool {
        !matches!(self, ConditionOp::IsNull | ConditionOp::IsNotNull)
    }
}

/// Extra predicate on a column of the base table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub column: String,
    pub op: ConditionOp,
    pub value: Option<FilterValue>,
}

impl Condition {
    pub fn new(column: impl Into<String>, op: ConditionOp, value: impl Into<FilterValue>) -> Self {
        Self {
            column: column.into(),
            op,
            value: Some(value.into()),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(column, ConditionOp::Eq, value)
    }

    pub fn not_eq(column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(column, ConditionOp::NotEq, value)
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            op: ConditionOp::IsNull,
            value: None,
        }
    }

    pub fn is_not_null(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            op: ConditionOp::IsNotNull,
            value: None,
        }
    }
}

/// Selection handed to a data source for one partition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceQuery {
    pub year: Option<i32>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
    pub conditions: Vec<Condition>,
}

impl SourceQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn year(year: i32) -> Self {
        Self {
            year: Some(year),
            ..Self::default()
        }
    }

    pub fn bounded(offset: Option<u64>, limit: Option<u64>) -> Self {
        Self {
            offset,
            limit,
            ..Self::default()
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }
}
