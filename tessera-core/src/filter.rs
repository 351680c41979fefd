//! Filter operators and filter-document helpers
//!
//! Filters are plain documents in the usual document-store shape:
//! `{"field": value}` for equality and `{"field": {"$op": value}}` for
//! operator comparisons. Update modifiers use the same `$` prefix.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::identity::{Document, PrimaryKey};

/// Prefix shared by query operators and update modifiers.
pub const OPERATOR_PREFIX: char = '$';

/// Filter operator for field comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    /// Equal to
    Eq,
    /// Not equal to
    Ne,
    /// Greater than
    Gt,
    /// Less than
    Lt,
    /// Greater than or equal
    Gte,
    /// Less than or equal
    Lte,
    /// In list of values
    In,
    /// Not in list of values
    Nin,
    /// Field presence
    Exists,
    /// Matches regular expression
    Regex,
    /// Logical AND
    And,
    /// Logical OR
    Or,
    /// Logical NOT
    Not,
}

impl FilterOperator {
    /// Parse an operator token such as `$in`.
    pub fn from_token(token: &str) -> Option<Self> {
        Some(match token {
            "$eq" => FilterOperator::Eq,
            "$ne" => FilterOperator::Ne,
            "$gt" => FilterOperator::Gt,
            "$lt" => FilterOperator::Lt,
            "$gte" => FilterOperator::Gte,
            "$lte" => FilterOperator::Lte,
            "$in" => FilterOperator::In,
            "$nin" => FilterOperator::Nin,
            "$exists" => FilterOperator::Exists,
            "$regex" => FilterOperator::Regex,
            "$and" => FilterOperator::And,
            "$or" => FilterOperator::Or,
            "$not" => FilterOperator::Not,
            _ => return None,
        })
    }

    pub fn as_token(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "$eq",
            FilterOperator::Ne => "$ne",
            FilterOperator::Gt => "$gt",
            FilterOperator::Lt => "$lt",
            FilterOperator::Gte => "$gte",
            FilterOperator::Lte => "$lte",
            FilterOperator::In => "$in",
            FilterOperator::Nin => "$nin",
            FilterOperator::Exists => "$exists",
            FilterOperator::Regex => "$regex",
            FilterOperator::And => "$and",
            FilterOperator::Or => "$or",
            FilterOperator::Not => "$not",
        }
    }

    /// Logical operators combine sub-filters instead of comparing a field.
    pub fn is_logical(&self) -> bool {
        matches!(
            self,
            FilterOperator::And | FilterOperator::Or | FilterOperator::Not
        )
    }
}

/// Unified filter expression for a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterExpr {
    /// Field to filter on
    pub field: String,
    /// Operator to apply
    pub operator: FilterOperator,
    /// Value to compare against
    pub value: Value,
}

impl FilterExpr {
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// Create an equality filter.
    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOperator::Eq, value)
    }

    /// Create a membership filter.
    pub fn is_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(field, FilterOperator::In, Value::Array(values))
    }

    /// Render as a filter document.
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        let condition = match self.operator {
            FilterOperator::Eq => self.value.clone(),
            op => {
                let mut inner = Document::new();
                inner.insert(op.as_token().to_string(), self.value.clone());
                Value::Object(inner)
            }
        };
        doc.insert(self.field.clone(), condition);
        doc
    }
}

/// Whether a key is an operator/modifier key.
pub fn is_operator_key(key: &str) -> bool {
    key.starts_with(OPERATOR_PREFIX)
}

/// Equality filter on the primary key.
pub fn by_key(pk_field: &str, key: &PrimaryKey) -> Document {
    FilterExpr::eq(pk_field, key.to_value()).to_document()
}

/// Membership filter on the primary key.
pub fn keys_in(pk_field: &str, keys: &[PrimaryKey]) -> Document {
    FilterExpr::is_in(pk_field, keys.iter().map(PrimaryKey::to_value).collect()).to_document()
}

/// Merge `extra` into `base`; conflicting fields are combined with `$and`.
pub fn merge_filters(base: &Document, extra: &Document) -> Document {
    if base.is_empty() {
        return extra.clone();
    }
    if extra.is_empty() {
        return base.clone();
    }
    if extra.keys().any(|k| base.contains_key(k)) {
        let mut doc = Document::new();
        doc.insert(
            FilterOperator::And.as_token().to_string(),
            json!([Value::Object(base.clone()), Value::Object(extra.clone())]),
        );
        return doc;
    }
    let mut merged = base.clone();
    merged.extend(extra.clone());
    merged
}
