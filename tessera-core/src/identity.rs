//! Identity types for Tessera records

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

use crate::error::{TesseraResult, ValidationError};

/// A stored document: field name to JSON value.
pub type Document = serde_json::Map<String, Value>;

/// Default primary-key field name.
pub const DEFAULT_PRIMARY_KEY: &str = "_id";

/// How a model assigns primary keys to new records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategy {
    /// Auto-incrementing integer drawn from the cache service's sequence counter.
    Sequence,
    /// UUIDv7 string generated locally.
    #[default]
    Generated,
}

/// Primary-key value of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKey {
    Int(i64),
    Str(String),
}

impl PrimaryKey {
    /// Read a primary key from a JSON value.
    ///
    /// Null, zero and the empty string mean "no key yet".
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().filter(|v| *v != 0).map(PrimaryKey::Int),
            Value::String(s) if !s.is_empty() => Some(PrimaryKey::Str(s.clone())),
            _ => None,
        }
    }

    /// Parse the string form kept in cached id lists back into the native key type.
    pub fn parse(raw: &str, strategy: KeyStrategy) -> TesseraResult<Self> {
        match strategy {
            KeyStrategy::Sequence => raw.parse::<i64>().map(PrimaryKey::Int).map_err(|e| {
                ValidationError::InvalidValue {
                    field: "primary key".to_string(),
                    reason: format!("cached id {raw:?} is not an integer: {e}"),
                }
                .into()
            }),
            KeyStrategy::Generated => Ok(PrimaryKey::Str(raw.to_string())),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            PrimaryKey::Int(v) => Value::from(*v),
            PrimaryKey::Str(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimaryKey::Int(v) => write!(f, "{v}"),
            PrimaryKey::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for PrimaryKey {
    fn from(value: i64) -> Self {
        PrimaryKey::Int(value)
    }
}

impl From<&str> for PrimaryKey {
    fn from(value: &str) -> Self {
        PrimaryKey::Str(value.to_string())
    }
}

impl From<String> for PrimaryKey {
    fn from(value: String) -> Self {
        PrimaryKey::Str(value)
    }
}

/// Generate a new timestamp-sortable string key.
pub fn new_object_id() -> String {
    Uuid::now_v7().simple().to_string()
}

/// Hex SHA-256 digest of a JSON value's canonical serialization.
///
/// `serde_json::Map` keeps keys sorted, so equal documents hash equally.
pub fn fingerprint(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_primary_key_from_value_treats_zero_as_absent() {
        assert_eq!(PrimaryKey::from_value(&json!(0)), None);
        assert_eq!(PrimaryKey::from_value(&json!("")), None);
        assert_eq!(PrimaryKey::from_value(&Value::Null), None);
        assert_eq!(PrimaryKey::from_value(&json!(7)), Some(PrimaryKey::Int(7)));
        assert_eq!(
            PrimaryKey::from_value(&json!("abc")),
            Some(PrimaryKey::Str("abc".to_string()))
        );
    }

    #[test]
    fn test_parse_follows_strategy() {
        assert_eq!(
            PrimaryKey::parse("12", KeyStrategy::Sequence).unwrap(),
            PrimaryKey::Int(12)
        );
        assert_eq!(
            PrimaryKey::parse("12", KeyStrategy::Generated).unwrap(),
            PrimaryKey::Str("12".to_string())
        );
        assert!(PrimaryKey::parse("x1", KeyStrategy::Sequence).is_err());
    }

    #[test]
    fn test_primary_key_serializes_untagged() {
        assert_eq!(serde_json::to_value(PrimaryKey::Int(3)).unwrap(), json!(3));
        assert_eq!(
            serde_json::to_value(PrimaryKey::Str("k".into())).unwrap(),
            json!("k")
        );
    }

    #[test]
    fn test_fingerprint_ignores_insertion_order() {
        let mut a = Document::new();
        a.insert("b".into(), json!(1));
        a.insert("a".into(), json!(2));
        let mut b = Document::new();
        b.insert("a".into(), json!(2));
        b.insert("b".into(), json!(1));
        assert_eq!(fingerprint(&Value::Object(a)), fingerprint(&Value::Object(b)));
    }

    #[test]
    fn test_object_ids_are_unique() {
        assert_ne!(new_object_id(), new_object_id());
        assert_eq!(new_object_id().len(), 32);
    }
}
