use crate::domain::monitor::{OperationKind, PerformanceMonitor};
use chrono::{DateTime, Utc};
use common::domain::{DocPath, DomainResult, DocumentStore, WriteOp};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Maintains per-day point counters next to the documents they describe.
///
/// Counters are read-then-write: a missing document is created with the
/// initial count, an existing one is incremented atomically so concurrent
/// workers never lose updates. Counts only ever grow; deletes and
/// decrements are not part of this surface.
pub struct MetadataCounterService {
    store: Arc<dyn DocumentStore>,
    monitor: Arc<PerformanceMonitor>,
}

impl MetadataCounterService {
    pub fn new(store: Arc<dyn DocumentStore>, monitor: Arc<PerformanceMonitor>) -> Self {
        Self { store, monitor }
    }

    #[instrument(skip(self), fields(path = %path))]
    pub async fn touch(
        &self,
        path: &DocPath,
        points: i64,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        let existing = self.store.get(path).await?;
        let now_str = now.to_rfc3339();

        let op = match existing {
            None => {
                debug!(points, "creating counter document");
                let doc = json!({
                    "pointsCount": points,
                    "startTime": now_str,
                    "endTime": now_str,
                })
                .as_object()
                .cloned()
                .unwrap_or_default();
                WriteOp::Set {
                    path: path.clone(),
                    doc,
                }
            }
            Some(_) => {
                let merge = json!({ "endTime": now_str })
                    .as_object()
                    .cloned()
                    .unwrap_or_default();
                WriteOp::Increment {
                    path: path.clone(),
                    field: "pointsCount".to_string(),
                    delta: points,
                    merge,
                }
            }
        };

        self.store.commit(vec![op]).await?;
        self.monitor.record_ops(OperationKind::Metadata, 1, 1, 0);
        Ok(())
    }
}
