//! Update payload classification.
//!
//! An update payload is either a raw modifier document (`{"$inc": {...}}`)
//! or a plain field map that gets wrapped in `$set`. Every top-level key is
//! inspected; a payload mixing both shapes is rejected.

use serde_json::Value;

use crate::error::ValidationError;
use crate::filter::is_operator_key;
use crate::identity::Document;

/// Modifier used to wrap plain field maps.
pub const SET_MODIFIER: &str = "$set";

/// A classified, primary-key-free update payload.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdatePayload {
    /// Caller supplied modifier operators directly.
    Modifier(Document),
    /// Caller supplied field values.
    Plain(Document),
}

impl UpdatePayload {
    pub fn classify(values: Document) -> Result<Self, ValidationError> {
        let operators = values.keys().filter(|k| is_operator_key(k)).count();
        if operators == 0 {
            Ok(UpdatePayload::Plain(values))
        } else if operators == values.len() {
            Ok(UpdatePayload::Modifier(values))
        } else {
            Err(ValidationError::MixedUpdatePayload {
                keys: values.keys().cloned().collect(),
            })
        }
    }

    /// Remove the primary key wherever it would be written.
    pub fn strip_primary_key(&mut self, primary_key: &str) {
        match self {
            UpdatePayload::Plain(doc) => {
                doc.remove(primary_key);
            }
            UpdatePayload::Modifier(doc) => {
                for fields in doc.values_mut() {
                    if let Value::Object(fields) = fields {
                        fields.remove(primary_key);
                    }
                }
                doc.retain(|_, fields| !matches!(fields, Value::Object(f) if f.is_empty()));
            }
        }
    }

    /// Field values the payload assigns, for validation.
    ///
    /// Plain maps assign every field; modifiers only through `$set`.
    pub fn assigned_fields(&self) -> Document {
        match self {
            UpdatePayload::Plain(doc) => doc.clone(),
            UpdatePayload::Modifier(doc) => doc
                .get(SET_MODIFIER)
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            UpdatePayload::Plain(doc) | UpdatePayload::Modifier(doc) => doc.is_empty(),
        }
    }

    /// Modifier document ready for the store.
    pub fn into_modifier(self) -> Document {
        match self {
            UpdatePayload::Modifier(doc) => doc,
            UpdatePayload::Plain(doc) => {
                let mut modifier = Document::new();
                modifier.insert(SET_MODIFIER.to_string(), Value::Object(doc));
                modifier
            }
        }
    }
}
