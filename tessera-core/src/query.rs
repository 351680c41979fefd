//! Query builder and the serialized query descriptor.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::filter::merge_filters;
use crate::identity::Document;

/// Relation declared on a field: join `from.key` against the local field and
/// attach the matches under `alias`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    /// Local field holding the reference.
    pub field: String,
    /// Field in the foreign collection that the reference points at.
    pub key: String,
    /// Output field receiving the joined documents.
    #[serde(rename = "as")]
    pub alias: String,
    /// Foreign collection name.
    pub from: String,
}

impl Relation {
    pub fn new(
        field: impl Into<String>,
        key: impl Into<String>,
        alias: impl Into<String>,
        from: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            key: key.into(),
            alias: alias.into(),
            from: from.into(),
        }
    }
}

/// Sort direction for one sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Plain query description handed to the store.
///
/// Produced by [`Query::to_descriptor`]; not mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    #[serde(default)]
    pub filter: Document,
    /// Projection: field → 1 (include) or 0 (exclude).
    #[serde(default, skip_serializing_if = "Document::is_empty")]
    pub select: Document,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub populate: Vec<Relation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<SortKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub large_page: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aggregate: Vec<Value>,
}

impl QueryDescriptor {
    /// Descriptor matching `filter` with nothing else set.
    pub fn filtered(filter: Document) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }

    pub fn is_aggregate(&self) -> bool {
        !self.aggregate.is_empty()
    }
}

/// Accumulates query criteria.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    descriptor: QueryDescriptor,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the filter.
    pub fn with_filter(mut self, filter: Document) -> Self {
        self.descriptor.filter = filter;
        self
    }

    /// Add criteria to the current filter.
    pub fn and_filter(mut self, filter: &Document) -> Self {
        self.descriptor.filter = merge_filters(&self.descriptor.filter, filter);
        self
    }

    pub fn select(mut self, projection: Document) -> Self {
        self.descriptor.select.extend(projection);
        self
    }

    /// Add relations to populate; relations already present by alias are kept.
    pub fn populate<I>(mut self, relations: I) -> Self
    where
        I: IntoIterator<Item = Relation>,
    {
        for relation in relations {
            if !self
                .descriptor
                .populate
                .iter()
                .any(|r| r.alias == relation.alias)
            {
                self.descriptor.populate.push(relation);
            }
        }
        self
    }

    pub fn sort_by(mut self, key: SortKey) -> Self {
        self.descriptor.sort.push(key);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.descriptor.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.descriptor.skip = Some(skip);
        self
    }

    pub fn page(mut self, page: u64) -> Self {
        self.descriptor.page = Some(page);
        self
    }

    pub fn large_page(mut self, large_page: u64) -> Self {
        self.descriptor.large_page = Some(large_page);
        self
    }

    /// Aggregation pipeline stages; a non-empty pipeline takes precedence over `find`.
    pub fn aggregate(mut self, stages: Vec<Value>) -> Self {
        self.descriptor.aggregate = stages;
        self
    }

    pub fn filter(&self) -> &Document {
        &self.descriptor.filter
    }

    pub fn to_descriptor(&self) -> QueryDescriptor {
        self.descriptor.clone()
    }

    pub fn into_descriptor(self) -> QueryDescriptor {
        self.descriptor
    }
}

impl From<Document> for Query {
    fn from(filter: Document) -> Self {
        Query::new().with_filter(filter)
    }
}

/// Paginated list request: filter plus window/page coordinates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListRequest {
    #[serde(default)]
    pub filter: Document,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<SortKey>,
    /// 1-based page inside the large-page window.
    #[serde(default)]
    pub page: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
    /// 1-based overflow window index.
    #[serde(default, rename = "largepage")]
    pub large_page: Option<u64>,
}

impl ListRequest {
    pub fn new(filter: Document) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }

    pub fn with_sort(mut self, key: SortKey) -> Self {
        self.sort.push(key);
        self
    }

    pub fn with_page(mut self, page: u64) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_large_page(mut self, large_page: u64) -> Self {
        self.large_page = Some(large_page);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_builder_accumulates_criteria() {
        let query = Query::new()
            .with_filter(doc(json!({"status": "open"})))
            .and_filter(&doc(json!({"owner": 7})))
            .select(doc(json!({"title": 1})))
            .sort_by(SortKey::desc("rowid"))
            .limit(10)
            .skip(20);

        let descriptor = query.to_descriptor();
        assert_eq!(
            Value::Object(descriptor.filter.clone()),
            json!({"status": "open", "owner": 7})
        );
        assert_eq!(descriptor.limit, Some(10));
        assert_eq!(descriptor.skip, Some(20));
        assert_eq!(descriptor.sort, vec![SortKey::desc("rowid")]);
        assert!(!descriptor.is_aggregate());
    }

    #[test]
    fn test_populate_deduplicates_by_alias() {
        let rel = Relation::new("author_id", "rowid", "author", "users");
        let query = Query::new()
            .populate(vec![rel.clone()])
            .populate(vec![rel.clone()]);
        assert_eq!(query.to_descriptor().populate, vec![rel]);
    }

    #[test]
    fn test_relation_serializes_alias_as_as() {
        let rel = Relation::new("author_id", "rowid", "author", "users");
        let value = serde_json::to_value(&rel).unwrap();
        assert_eq!(value["as"], json!("author"));
    }

    #[test]
    fn test_list_request_reads_largepage_name() {
        let req: ListRequest =
            serde_json::from_value(json!({"filter": {}, "page": 2, "largepage": 3})).unwrap();
        assert_eq!(req.page, Some(2));
        assert_eq!(req.large_page, Some(3));
        assert_eq!(req.limit, None);
    }
}
