//! Field schema and the typed field container used by records.
//!
//! A [`Schema`] is the static description of a model's fields. A
//! [`FieldMap`] holds the current values of one record handle and exposes
//! explicit `get`/`set`/`validate` instead of generated accessors.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::ValidationError;
use crate::identity::{Document, PrimaryKey};
use crate::query::Relation;

/// Value kind a field accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    Any,
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl FieldKind {
    /// Check a non-null value against this kind.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldKind::Any => true,
            FieldKind::String => value.is_string(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Number => value.is_number(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Array => value.is_array(),
            FieldKind::Object => value.is_object(),
        }
    }

    /// Kinds that may be addressed with dotted sub-paths.
    fn is_container(&self) -> bool {
        matches!(self, FieldKind::Any | FieldKind::Array | FieldKind::Object)
    }
}

/// Index flavour declared on a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Ascending,
    Descending,
    Text,
}

impl IndexKind {
    fn name_suffix(&self) -> &'static str {
        match self {
            IndexKind::Ascending => "1",
            IndexKind::Descending => "-1",
            IndexKind::Text => "text",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexKey {
    pub field: String,
    pub kind: IndexKind,
}

/// Index creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub keys: Vec<IndexKey>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl IndexSpec {
    pub fn single(field: impl Into<String>, kind: IndexKind) -> Self {
        Self {
            keys: vec![IndexKey {
                field: field.into(),
                kind,
            }],
            unique: false,
            name: None,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Explicit name, or `field_1_other_-1` style when none was given.
    pub fn index_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        self.keys
            .iter()
            .map(|k| format!("{}_{}", k.field, k.kind.name_suffix()))
            .collect::<Vec<_>>()
            .join("_")
    }
}

/// Relation target declared on a field (`{key, as, from}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationSpec {
    pub key: String,
    #[serde(rename = "as")]
    pub alias: String,
    pub from: String,
}

/// Definition of one field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<IndexKind>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<RelationSpec>,
    /// Virtual fields are computed client-side and never persisted by `save`.
    #[serde(default, rename = "virtual")]
    pub is_virtual: bool,
}

impl FieldDef {
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    pub fn any() -> Self {
        Self::new(FieldKind::Any)
    }

    pub fn string() -> Self {
        Self::new(FieldKind::String)
    }

    pub fn integer() -> Self {
        Self::new(FieldKind::Integer)
    }

    pub fn number() -> Self {
        Self::new(FieldKind::Number)
    }

    pub fn boolean() -> Self {
        Self::new(FieldKind::Boolean)
    }

    pub fn array() -> Self {
        Self::new(FieldKind::Array)
    }

    pub fn object() -> Self {
        Self::new(FieldKind::Object)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn indexed(mut self, kind: IndexKind) -> Self {
        self.index = Some(kind);
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self.index.get_or_insert(IndexKind::Ascending);
        self
    }

    pub fn relation(
        mut self,
        key: impl Into<String>,
        alias: impl Into<String>,
        from: impl Into<String>,
    ) -> Self {
        self.relation = Some(RelationSpec {
            key: key.into(),
            alias: alias.into(),
            from: from.into(),
        });
        self
    }

    pub fn virtual_field(mut self) -> Self {
        self.is_virtual = true;
        self
    }

    fn check(&self, field: &str, value: &Value) -> Result<(), ValidationError> {
        if value.is_null() {
            if self.required {
                return Err(ValidationError::RequiredFieldMissing {
                    field: field.to_string(),
                });
            }
            return Ok(());
        }
        if !self.kind.accepts(value) {
            return Err(ValidationError::InvalidValue {
                field: field.to_string(),
                reason: format!("expected {:?}, got {}", self.kind, value),
            });
        }
        Ok(())
    }
}

/// Static field definitions of a model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    fields: BTreeMap<String, FieldDef>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, def: FieldDef) -> Self {
        self.fields.insert(name.into(), def);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldDef> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &FieldDef)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Relations declared on fields carrying `{key, as, from}`.
    pub fn relations(&self) -> Vec<Relation> {
        self.fields
            .iter()
            .filter_map(|(name, def)| {
                def.relation
                    .as_ref()
                    .map(|r| Relation::new(name.clone(), &r.key, &r.alias, &r.from))
            })
            .collect()
    }

    /// Indexes declared on fields, excluding the primary key.
    pub fn indexes(&self, primary_key: &str) -> Vec<IndexSpec> {
        self.fields
            .iter()
            .filter(|(name, _)| name.as_str() != primary_key)
            .filter_map(|(name, def)| {
                def.index.map(|kind| {
                    let spec = IndexSpec::single(name.clone(), kind);
                    if def.unique {
                        spec.unique()
                    } else {
                        spec
                    }
                })
            })
            .collect()
    }

    /// Validate only the supplied keys of an update payload.
    ///
    /// Required-ness of absent fields is not checked. Dotted paths are
    /// accepted when their top-level field is a container.
    pub fn validate_partial(
        &self,
        values: &Document,
        primary_key: &str,
    ) -> Result<(), ValidationError> {
        for (name, value) in values {
            if name == primary_key {
                continue;
            }
            let (head, nested) = match name.split_once('.') {
                Some((head, _)) => (head, true),
                None => (name.as_str(), false),
            };
            let def = self
                .fields
                .get(head)
                .ok_or_else(|| ValidationError::UnknownField {
                    field: name.clone(),
                })?;
            if nested {
                if !def.kind.is_container() {
                    return Err(ValidationError::InvalidValue {
                        field: name.clone(),
                        reason: format!("{head} is not a nested document"),
                    });
                }
                continue;
            }
            def.check(name, value)?;
        }
        Ok(())
    }
}

/// Current values of one record, backed by a shared [`Schema`].
#[derive(Debug, Clone)]
pub struct FieldMap {
    schema: Arc<Schema>,
    primary_key: String,
    values: BTreeMap<String, Value>,
}

impl FieldMap {
    pub fn new(schema: Arc<Schema>, primary_key: impl Into<String>) -> Self {
        Self {
            schema,
            primary_key: primary_key.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn primary_key_field(&self) -> &str {
        &self.primary_key
    }

    /// Current value, falling back to the field default.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .get(name)
            .or_else(|| self.schema.get(name).and_then(|def| def.default.as_ref()))
    }

    /// Set one field. Unknown fields are rejected; the primary key is always accepted.
    pub fn set(&mut self, name: impl Into<String>, value: Value) -> Result<(), ValidationError> {
        let name = name.into();
        if name != self.primary_key && self.schema.get(&name).is_none() {
            return Err(ValidationError::UnknownField { field: name });
        }
        self.values.insert(name, value);
        Ok(())
    }

    /// Merge a document into the current values.
    pub fn set_data(&mut self, data: &Document) -> Result<(), ValidationError> {
        for (name, value) in data {
            self.set(name.clone(), value.clone())?;
        }
        Ok(())
    }

    pub fn reset_data(&mut self) {
        self.values.clear();
    }

    pub fn has_data(&self) -> bool {
        !self.values.is_empty()
    }

    pub fn primary_key(&self) -> Option<PrimaryKey> {
        self.values
            .get(&self.primary_key)
            .and_then(PrimaryKey::from_value)
    }

    pub fn set_primary_key(&mut self, key: &PrimaryKey) {
        self.values.insert(self.primary_key.clone(), key.to_value());
    }

    /// Snapshot of the record: explicit values, then defaults.
    pub fn get_data(&self, include_virtual: bool) -> Document {
        let mut data = Document::new();
        if let Some(key) = self.values.get(&self.primary_key) {
            data.insert(self.primary_key.clone(), key.clone());
        }
        for (name, def) in self.schema.fields() {
            if def.is_virtual && !include_virtual {
                continue;
            }
            if let Some(value) = self.get(name) {
                data.insert(name.clone(), value.clone());
            }
        }
        data
    }

    /// Validate the full record against the schema.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (name, def) in self.schema.fields() {
            match self.get(name) {
                Some(value) => def.check(name, value)?,
                None if def.required => {
                    return Err(ValidationError::RequiredFieldMissing {
                        field: name.clone(),
                    })
                }
                None => {}
            }
        }
        Ok(())
    }
}
