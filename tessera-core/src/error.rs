//! Error types for Tessera operations

use thiserror::Error;

/// Document store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Duplicate key in {collection}: {key}")]
    DuplicateKey { collection: String, key: String },

    #[error("Insert failed for {collection}: {reason}")]
    InsertFailed { collection: String, reason: String },

    #[error("Invalid query on {collection}: {reason}")]
    InvalidQuery { collection: String, reason: String },

    #[error("Invalid modifier on {collection}: {reason}")]
    InvalidModifier { collection: String, reason: String },

    #[error("Index error on {index_name}: {reason}")]
    IndexError { index_name: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("Store backend error: {reason}")]
    Backend { reason: String },
}

/// Cache service errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache service unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Wrong type for key {key}: expected {expected}")]
    WrongType { key: String, expected: String },

    #[error("Cache backend error: {reason}")]
    Backend { reason: String },
}

/// Schema validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Unknown field: {field}")]
    UnknownField { field: String },

    #[error("Update payload mixes modifiers and plain fields: {keys:?}")]
    MixedUpdatePayload { keys: Vec<String> },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Errors raised by the record orchestrator itself.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("{operation} called without data")]
    EmptyPayload { operation: String },

    #[error("No matching record in {table}")]
    NoMatchingRecord { table: String },

    #[error("Lock {name} unavailable: {reason}")]
    LockUnavailable { name: String, reason: String },

    #[error("Unsupported store operation: {operation}")]
    UnsupportedOperation { operation: String },

    #[error("Model not registered: {name}")]
    UnknownModel { name: String },
}

/// Master error type for all Tessera errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TesseraError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),
}

impl TesseraError {
    /// True when a delete or update matched nothing.
    pub fn is_no_matching_record(&self) -> bool {
        matches!(self, TesseraError::Record(RecordError::NoMatchingRecord { .. }))
    }

    /// True when the lock coordinator could not reach the cache service.
    pub fn is_lock_unavailable(&self) -> bool {
        matches!(self, TesseraError::Record(RecordError::LockUnavailable { .. }))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, TesseraError::Validation(_))
    }
}

/// Result type alias for Tessera operations.
pub type TesseraResult<T> = Result<T, TesseraError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display_duplicate_key() {
        let err = StoreError::DuplicateKey {
            collection: "users".to_string(),
            key: "42".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Duplicate key"));
        assert!(msg.contains("users"));
        assert!(msg.contains("42"));
    }

    #[test]
    fn test_validation_error_display_mixed_payload() {
        let err = ValidationError::MixedUpdatePayload {
            keys: vec!["$set".to_string(), "title".to_string()],
        };
        let msg = format!("{}", err);
        assert!(msg.contains("mixes modifiers"));
        assert!(msg.contains("$set"));
        assert!(msg.contains("title"));
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "large_limit".to_string(),
            value: "0".to_string(),
            reason: "must be positive".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("large_limit"));
        assert!(msg.contains("must be positive"));
    }

    #[test]
    fn test_record_error_display_lock_unavailable() {
        let err = RecordError::LockUnavailable {
            name: "posts:lock".to_string(),
            reason: "connection refused".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("posts:lock"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn test_tessera_error_from_variants() {
        let store = TesseraError::from(StoreError::LockPoisoned);
        assert!(matches!(store, TesseraError::Store(_)));

        let cache = TesseraError::from(CacheError::Unavailable {
            reason: "down".to_string(),
        });
        assert!(matches!(cache, TesseraError::Cache(_)));

        let validation = TesseraError::from(ValidationError::RequiredFieldMissing {
            field: "title".to_string(),
        });
        assert!(validation.is_validation());

        let record = TesseraError::from(RecordError::NoMatchingRecord {
            table: "posts".to_string(),
        });
        assert!(record.is_no_matching_record());
        assert!(!record.is_lock_unavailable());
    }
}
