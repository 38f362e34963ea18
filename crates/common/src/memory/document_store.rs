use crate::domain::{DocPath, Document, DocumentStore, DomainResult, FieldFilter, WriteOp};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory implementation of `DocumentStore` using a `BTreeMap`.
///
/// Honors the same op semantics as the production store: atomic batch
/// commits, merge upserts, array appends, and numeric increments. Used by
/// integration tests and local runs; the production transport is external.
pub struct MemoryDocumentStore {
    documents: RwLock<BTreeMap<String, Document>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of stored documents, for test assertions.
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    fn apply(documents: &mut BTreeMap<String, Document>, op: WriteOp) {
        match op {
            WriteOp::Set { path, doc } => {
                documents.insert(path.as_str().to_string(), doc);
            }
            WriteOp::Merge { path, doc } => {
                let entry = documents.entry(path.as_str().to_string()).or_default();
                for (key, value) in doc {
                    entry.insert(key, value);
                }
            }
            WriteOp::ArrayAppend { path, field, values } => {
                let entry = documents.entry(path.as_str().to_string()).or_default();
                let slot = entry.entry(field).or_insert_with(|| Value::Array(vec![]));
                if let Value::Array(items) = slot {
                    items.extend(values);
                } else {
                    *slot = Value::Array(values);
                }
            }
            WriteOp::Increment {
                path,
                field,
                delta,
                merge,
            } => {
                let entry = documents.entry(path.as_str().to_string()).or_default();
                let current = entry.get(&field).and_then(Value::as_i64).unwrap_or(0);
                entry.insert(field, Value::from(current + delta));
                for (key, value) in merge {
                    entry.insert(key, value);
                }
            }
        }
    }

    fn matches(doc: &Document, filters: &[FieldFilter]) -> bool {
        filters
            .iter()
            .all(|filter| doc.get(&filter.field) == Some(&filter.value))
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn commit(&self, ops: Vec<WriteOp>) -> DomainResult<()> {
        // Single write lock held across the batch keeps commits atomic.
        let mut documents = self.documents.write().await;
        for op in ops {
            Self::apply(&mut documents, op);
        }
        Ok(())
    }

    async fn get(&self, path: &DocPath) -> DomainResult<Option<Document>> {
        let documents = self.documents.read().await;
        Ok(documents.get(path.as_str()).cloned())
    }

    async fn query_one(
        &self,
        collection: &DocPath,
        filters: &[FieldFilter],
    ) -> DomainResult<Option<Document>> {
        let prefix = format!("{}/", collection.as_str());
        let documents = self.documents.read().await;
        Ok(documents
            .iter()
            .filter(|(path, _)| {
                // Direct children only, not nested subcollections
                path.strip_prefix(&prefix)
                    .map(|rest| !rest.contains('/'))
                    .unwrap_or(false)
            })
            .map(|(_, doc)| doc)
            .find(|doc| Self::matches(doc, filters))
            .cloned())
    }

    async fn create(&self, collection: &DocPath, doc: Document) -> DomainResult<String> {
        let id = Uuid::new_v4().simple().to_string();
        let path = collection.child(&id);
        let mut documents = self.documents.write().await;
        documents.insert(path.as_str().to_string(), doc);
        Ok(id)
    }
}
