use crate::domain::monitor::PerformanceMonitor;
use async_trait::async_trait;
use common::domain::{DomainResult, TelemetryEvent};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Consumes one swapped-out flush batch.
///
/// An error means the whole batch must be re-queued; implementations are
/// expected to make their writes idempotent so a retried batch is safe.
#[async_trait]
pub trait FlushProcessor: Send + Sync {
    async fn process(&self, events: Vec<TelemetryEvent>) -> DomainResult<()>;
}

#[derive(Debug, Clone)]
pub struct BufferConfig {
    /// Queue flush threshold and maximum operations per atomic commit.
    pub batch_size: usize,
    /// Soft deadline for flushing a partially filled queue.
    pub batch_timeout: Duration,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            batch_timeout: Duration::from_millis(3000),
        }
    }
}

/// Accumulates validated events and flushes them on size or time triggers.
///
/// `enqueue` never blocks and never rejects. A size-triggered flush runs
/// from the enqueue call after canceling the pending timer; a timer flush
/// runs from a spawned task. Flush execution is single-flight: the atomic
/// guard makes a flush request during an in-progress flush a no-op, and the
/// queue keeps accepting events while the in-progress flush runs. On flush
/// failure the swapped-out batch is pushed back onto the front of the queue
/// so no event is lost and arrival order is preserved.
pub struct IngestBuffer {
    inner: Arc<BufferInner>,
}

struct BufferInner {
    queue: Mutex<VecDeque<TelemetryEvent>>,
    flushing: AtomicBool,
    timer: Mutex<Option<JoinHandle<()>>>,
    config: BufferConfig,
    processor: Arc<dyn FlushProcessor>,
    monitor: Arc<PerformanceMonitor>,
}

impl IngestBuffer {
    pub fn new(
        config: BufferConfig,
        processor: Arc<dyn FlushProcessor>,
        monitor: Arc<PerformanceMonitor>,
    ) -> Self {
        Self {
            inner: Arc::new(BufferInner {
                queue: Mutex::new(VecDeque::new()),
                flushing: AtomicBool::new(false),
                timer: Mutex::new(None),
                config,
                processor,
                monitor,
            }),
        }
    }

    /// Append an event in arrival order. Flushes synchronously when the
    /// size threshold is reached, otherwise makes sure a timer is armed.
    pub async fn enqueue(&self, event: TelemetryEvent) {
        let depth = {
            let mut queue = self.inner.queue.lock().expect("queue lock poisoned");
            queue.push_back(event);
            queue.len()
        };
        self.inner.monitor.record_queue_depth(depth);

        if depth >= self.inner.config.batch_size {
            Self::cancel_timer(&self.inner);
            Self::flush(&self.inner).await;
        } else {
            Self::ensure_timer(&self.inner);
        }
    }

    /// Current queue depth.
    pub fn len(&self) -> usize {
        self.inner.queue.lock().expect("queue lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancel the timer and run one final flush. Failures are logged, not
    /// retried; anything still queued afterwards is reported and dropped
    /// with the process.
    pub async fn shutdown(&self) {
        Self::cancel_timer(&self.inner);
        Self::flush(&self.inner).await;
        let remaining = self.len();
        if remaining > 0 {
            warn!(remaining, "events still queued at shutdown");
        } else {
            info!("ingest buffer drained");
        }
    }

    async fn flush(inner: &Arc<BufferInner>) {
        // Single-flight guard: a request racing an in-progress flush is a
        // no-op; the running flush picks up later arrivals next cycle.
        if inner
            .flushing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("flush already in progress, skipping");
            return;
        }

        let batch: Vec<TelemetryEvent> = {
            let mut queue = inner.queue.lock().expect("queue lock poisoned");
            queue.drain(..).collect()
        };
        if batch.is_empty() {
            inner.flushing.store(false, Ordering::Release);
            return;
        }

        debug!(events = batch.len(), "flushing batch");
        let started = Instant::now();
        let result = inner.processor.process(batch.clone()).await;

        let rearm = match result {
            Ok(()) => {
                inner.monitor.record_timing("flush", started.elapsed());
                !inner.queue.lock().expect("queue lock poisoned").is_empty()
            }
            Err(e) => {
                error!(
                    error = %e,
                    events = batch.len(),
                    "flush failed, re-queueing batch"
                );
                inner.monitor.inc_batches_requeued();
                // Prepend so the queue still reflects original arrival order
                let mut queue = inner.queue.lock().expect("queue lock poisoned");
                for event in batch.into_iter().rev() {
                    queue.push_front(event);
                }
                true
            }
        };

        inner.flushing.store(false, Ordering::Release);
        if rearm {
            Self::ensure_timer(inner);
        }
    }

    fn ensure_timer(inner: &Arc<BufferInner>) {
        let mut timer = inner.timer.lock().expect("timer lock poisoned");
        if timer.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        let timeout = inner.config.batch_timeout;
        let inner_clone = Arc::clone(inner);
        *timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            // This task's own handle occupies the slot; vacate it before
            // flushing so the re-arm check can arm a fresh timer for
            // events that arrive while the flush runs.
            inner_clone.timer.lock().expect("timer lock poisoned").take();
            Self::flush(&inner_clone).await;
        }));
    }

    fn cancel_timer(inner: &Arc<BufferInner>) {
        if let Some(handle) = inner.timer.lock().expect("timer lock poisoned").take() {
            handle.abort();
        }
    }
}
