use crate::domain::buffer::FlushProcessor;
use crate::domain::chunker::BatchChunker;
use crate::domain::counter_service::MetadataCounterService;
use crate::domain::monitor::{OperationKind, PerformanceMonitor};
use async_trait::async_trait;
use chrono::Utc;
use common::domain::{DomainResult, DocumentStore, TelemetryEvent};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, warn};

/// Persists a flushed batch: the chunked atomic commits first, then the
/// best-effort secondary passes.
///
/// Chunk commits are all-or-nothing per chunk; a failed chunk aborts the
/// flush with an error so the buffer re-queues the batch. Location-history
/// appends and counter touches run after the chunks and never fail the
/// flush; their errors are logged and counted instead.
pub struct BatchWriter {
    store: Arc<dyn DocumentStore>,
    chunker: BatchChunker,
    counters: MetadataCounterService,
    monitor: Arc<PerformanceMonitor>,
}

impl BatchWriter {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        chunker: BatchChunker,
        counters: MetadataCounterService,
        monitor: Arc<PerformanceMonitor>,
    ) -> Self {
        Self {
            store,
            chunker,
            counters,
            monitor,
        }
    }
}

#[async_trait]
impl FlushProcessor for BatchWriter {
    #[instrument(skip_all, fields(events = events.len()))]
    async fn process(&self, events: Vec<TelemetryEvent>) -> DomainResult<()> {
        let plan = self.chunker.build(&events);
        debug!(
            chunks = plan.chunks.len(),
            ops = plan.total_ops(),
            "committing batch plan"
        );

        for chunk in &plan.chunks {
            let started = Instant::now();
            self.store.commit(chunk.ops.clone()).await?;
            self.monitor
                .record_timing("chunk_commit", started.elapsed());
            for (kind, writes) in [
                (OperationKind::Telemetry, chunk.telemetry_writes),
                (OperationKind::Device, chunk.device_writes),
                (OperationKind::Track, chunk.track_writes),
            ] {
                if writes > 0 {
                    self.monitor.record_ops(kind, 0, writes, 0);
                }
            }
        }
        self.monitor.inc_batches_committed();

        for op in plan.history_ops {
            let path = op.path().clone();
            match self.store.commit(vec![op]).await {
                Ok(()) => self.monitor.record_ops(OperationKind::History, 0, 1, 0),
                Err(e) => {
                    warn!(path = %path, error = %e, "location history append failed");
                    self.monitor.inc_history_failures();
                }
            }
        }

        let now = Utc::now();
        for touch in plan.counter_touches {
            if let Err(e) = self.counters.touch(&touch.path, touch.points, now).await {
                warn!(path = %touch.path, error = %e, "counter touch failed");
            }
        }

        Ok(())
    }
}
