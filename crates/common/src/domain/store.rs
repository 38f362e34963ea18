use crate::domain::result::DomainResult;
use async_trait::async_trait;
use serde_json::Value;

/// A document body. Hierarchical store documents are flat-ish JSON maps.
pub type Document = serde_json::Map<String, Value>;

/// Slash-joined hierarchical path to a document or collection,
/// e.g. `devices/dev-1/tracks/20260825/points/2026-08-25T10:15:30`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocPath(String);

impl DocPath {
    pub fn new(path: impl Into<String>) -> Self {
        DocPath(path.into())
    }

    pub fn from_segments(segments: &[&str]) -> Self {
        DocPath(segments.join("/"))
    }

    /// Child path under this one.
    pub fn child(&self, segment: &str) -> Self {
        DocPath(format!("{}/{}", self.0, segment))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Equality filter for single-collection queries.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub value: Value,
}

impl FieldFilter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FieldFilter {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// One write inside an atomic commit.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Create or overwrite the document at a deterministic key.
    Set { path: DocPath, doc: Document },
    /// Upsert-merge: fields in `doc` overwrite, untouched fields persist.
    /// Never requires reading the existing document.
    Merge { path: DocPath, doc: Document },
    /// Append values to an array field, creating the document if absent.
    ArrayAppend {
        path: DocPath,
        field: String,
        values: Vec<Value>,
    },
    /// Atomic numeric increment of `field` by `delta`, merging the other
    /// fields in `merge`. The increment happens store-side so concurrent
    /// writers never lose counts.
    Increment {
        path: DocPath,
        field: String,
        delta: i64,
        merge: Document,
    },
}

impl WriteOp {
    pub fn path(&self) -> &DocPath {
        match self {
            WriteOp::Set { path, .. }
            | WriteOp::Merge { path, .. }
            | WriteOp::ArrayAppend { path, .. }
            | WriteOp::Increment { path, .. } => path,
        }
    }
}

/// Port to the hierarchical document store.
///
/// The production transport (network protocol, auth, native batch commit)
/// lives behind this trait; the core only depends on these four operations.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Commit a batch of writes as one atomic unit.
    ///
    /// Callers bound the batch to the store's maximum commit size; the
    /// whole batch fails or succeeds together.
    async fn commit(&self, ops: Vec<WriteOp>) -> DomainResult<()>;

    /// Read a single document.
    async fn get(&self, path: &DocPath) -> DomainResult<Option<Document>>;

    /// Return the first document in `collection` matching every filter.
    async fn query_one(
        &self,
        collection: &DocPath,
        filters: &[FieldFilter],
    ) -> DomainResult<Option<Document>>;

    /// Create a document with a store-generated identifier; returns the id.
    async fn create(&self, collection: &DocPath, doc: Document) -> DomainResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_path_child_and_display() {
        let devices = DocPath::new("devices");
        let device = devices.child("dev-1").child("tracks").child("20260825");
        assert_eq!(device.as_str(), "devices/dev-1/tracks/20260825");
        assert_eq!(format!("{}", device), "devices/dev-1/tracks/20260825");
    }

    #[test]
    fn test_doc_path_from_segments() {
        let path = DocPath::from_segments(&["telemetry_tag", "dev-1", "dates", "20260825"]);
        assert_eq!(path.as_str(), "telemetry_tag/dev-1/dates/20260825");
    }

    #[test]
    fn test_field_filter_eq() {
        let filter = FieldFilter::eq("isResolved", false);
        assert_eq!(filter.field, "isResolved");
        assert_eq!(filter.value, Value::Bool(false));
    }
}
