use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Most-recent samples retained per timing series.
const MAX_SAMPLES: usize = 1000;
/// Daily ledger snapshots retained after rollover.
const LEDGER_HISTORY_DAYS: usize = 30;

// Store billing rates, USD per 100k operations.
const READ_COST_PER_100K: f64 = 0.06;
const WRITE_COST_PER_100K: f64 = 0.18;
const DELETE_COST_PER_100K: f64 = 0.02;

/// Operation families tracked in the daily ledger breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Telemetry,
    Device,
    Track,
    History,
    Metadata,
    Alert,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct OpCounts {
    pub reads: u64,
    pub writes: u64,
    pub deletes: u64,
}

impl OpCounts {
    fn add(&mut self, other: OpCounts) {
        self.reads += other.reads;
        self.writes += other.writes;
        self.deletes += other.deletes;
    }

    /// Estimated store cost at the fixed per-100k rates.
    pub fn estimated_cost(&self) -> f64 {
        (self.reads as f64 * READ_COST_PER_100K
            + self.writes as f64 * WRITE_COST_PER_100K
            + self.deletes as f64 * DELETE_COST_PER_100K)
            / 100_000.0
    }
}

/// One closed (or in-progress) day of the operations ledger.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerSnapshot {
    pub date: NaiveDate,
    pub totals: OpCounts,
    pub breakdown: BTreeMap<OperationKind, OpCounts>,
    pub estimated_cost: f64,
}

struct OperationsLedger {
    date: NaiveDate,
    totals: OpCounts,
    breakdown: BTreeMap<OperationKind, OpCounts>,
    history: VecDeque<LedgerSnapshot>,
}

impl OperationsLedger {
    fn new(date: NaiveDate) -> Self {
        Self {
            date,
            totals: OpCounts::default(),
            breakdown: BTreeMap::new(),
            history: VecDeque::new(),
        }
    }

    fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            date: self.date,
            totals: self.totals,
            breakdown: self.breakdown.clone(),
            estimated_cost: self.totals.estimated_cost(),
        }
    }

    fn record(&mut self, today: NaiveDate, kind: OperationKind, counts: OpCounts) {
        if today != self.date {
            // Days with no recorded operations leave no snapshot
            if self.totals != OpCounts::default() {
                self.history.push_back(self.snapshot());
                while self.history.len() > LEDGER_HISTORY_DAYS {
                    self.history.pop_front();
                }
            }
            self.date = today;
            self.totals = OpCounts::default();
            self.breakdown.clear();
        }
        self.totals.add(counts);
        self.breakdown.entry(kind).or_default().add(counts);
    }
}

/// Summary statistics over a capped sample ring.
#[derive(Debug, Clone, Serialize)]
pub struct SampleStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

fn sample_stats(samples: &VecDeque<f64>) -> Option<SampleStats> {
    if samples.is_empty() {
        return None;
    }
    let mut sorted: Vec<f64> = samples.iter().copied().collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let count = sorted.len();
    let percentile = |p: f64| {
        let index = ((count as f64) * p).floor() as usize;
        sorted[index.min(count - 1)]
    };
    Some(SampleStats {
        count,
        min: sorted[0],
        max: sorted[count - 1],
        avg: sorted.iter().sum::<f64>() / count as f64,
        p50: percentile(0.5),
        p95: percentile(0.95),
        p99: percentile(0.99),
    })
}

fn push_capped(ring: &mut VecDeque<f64>, sample: f64) {
    if ring.len() == MAX_SAMPLES {
        ring.pop_front();
    }
    ring.push_back(sample);
}

/// Monotonic pipeline counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PipelineCounters {
    pub messages_received: u64,
    pub messages_validated: u64,
    pub messages_failed: u64,
    pub batches_committed: u64,
    pub batches_requeued: u64,
    pub alerts_created: u64,
    pub alerts_skipped: u64,
    pub history_failures: u64,
}

#[derive(Default)]
struct AtomicCounters {
    messages_received: AtomicU64,
    messages_validated: AtomicU64,
    messages_failed: AtomicU64,
    batches_committed: AtomicU64,
    batches_requeued: AtomicU64,
    alerts_created: AtomicU64,
    alerts_skipped: AtomicU64,
    history_failures: AtomicU64,
}

/// On-demand performance report for the whole pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    pub uptime_secs: u64,
    pub counters: PipelineCounters,
    pub queue_depth: Option<SampleStats>,
    pub timings_ms: BTreeMap<String, SampleStats>,
    pub today: LedgerSnapshot,
    pub cost_history: Vec<LedgerSnapshot>,
}

/// Process-wide metrics collector, constructed once and passed by reference
/// to every component that records into it.
pub struct PerformanceMonitor {
    started_at: Instant,
    counters: AtomicCounters,
    timings: Mutex<BTreeMap<String, VecDeque<f64>>>,
    queue_depths: Mutex<VecDeque<f64>>,
    ledger: Mutex<OperationsLedger>,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            counters: AtomicCounters::default(),
            timings: Mutex::new(BTreeMap::new()),
            queue_depths: Mutex::new(VecDeque::new()),
            ledger: Mutex::new(OperationsLedger::new(Utc::now().date_naive())),
        }
    }

    /// Record one timing sample, in milliseconds, under `name`.
    pub fn record_timing(&self, name: &str, elapsed: Duration) {
        let mut timings = self.timings.lock().expect("timings lock poisoned");
        let ring = timings.entry(name.to_string()).or_default();
        push_capped(ring, elapsed.as_secs_f64() * 1000.0);
    }

    pub fn record_queue_depth(&self, depth: usize) {
        let mut depths = self.queue_depths.lock().expect("queue depth lock poisoned");
        push_capped(&mut depths, depth as f64);
    }

    /// Record store operations against today's ledger.
    pub fn record_ops(&self, kind: OperationKind, reads: u64, writes: u64, deletes: u64) {
        self.record_ops_at(Utc::now().date_naive(), kind, reads, writes, deletes);
    }

    fn record_ops_at(
        &self,
        today: NaiveDate,
        kind: OperationKind,
        reads: u64,
        writes: u64,
        deletes: u64,
    ) {
        let mut ledger = self.ledger.lock().expect("ledger lock poisoned");
        ledger.record(
            today,
            kind,
            OpCounts {
                reads,
                writes,
                deletes,
            },
        );
    }

    pub fn inc_messages_received(&self) {
        self.counters.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_messages_validated(&self) {
        self.counters.messages_validated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_messages_failed(&self) {
        self.counters.messages_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_batches_committed(&self) {
        self.counters.batches_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_batches_requeued(&self) {
        self.counters.batches_requeued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_alerts_created(&self) {
        self.counters.alerts_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_alerts_skipped(&self) {
        self.counters.alerts_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_history_failures(&self) {
        self.counters.history_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn counters(&self) -> PipelineCounters {
        PipelineCounters {
            messages_received: self.counters.messages_received.load(Ordering::Relaxed),
            messages_validated: self.counters.messages_validated.load(Ordering::Relaxed),
            messages_failed: self.counters.messages_failed.load(Ordering::Relaxed),
            batches_committed: self.counters.batches_committed.load(Ordering::Relaxed),
            batches_requeued: self.counters.batches_requeued.load(Ordering::Relaxed),
            alerts_created: self.counters.alerts_created.load(Ordering::Relaxed),
            alerts_skipped: self.counters.alerts_skipped.load(Ordering::Relaxed),
            history_failures: self.counters.history_failures.load(Ordering::Relaxed),
        }
    }

    pub fn timing_stats(&self, name: &str) -> Option<SampleStats> {
        let timings = self.timings.lock().expect("timings lock poisoned");
        timings.get(name).and_then(sample_stats)
    }

    pub fn queue_stats(&self) -> Option<SampleStats> {
        let depths = self.queue_depths.lock().expect("queue depth lock poisoned");
        sample_stats(&depths)
    }

    pub fn report(&self) -> PerformanceReport {
        let timings_ms = {
            let timings = self.timings.lock().expect("timings lock poisoned");
            timings
                .iter()
                .filter_map(|(name, ring)| sample_stats(ring).map(|stats| (name.clone(), stats)))
                .collect()
        };
        let (today, cost_history) = {
            let ledger = self.ledger.lock().expect("ledger lock poisoned");
            (ledger.snapshot(), ledger.history.iter().cloned().collect())
        };
        PerformanceReport {
            uptime_secs: self.started_at.elapsed().as_secs(),
            counters: self.counters(),
            queue_depth: self.queue_stats(),
            timings_ms,
            today,
            cost_history,
        }
    }

    /// Log the current report as one structured event.
    pub fn log_report(&self) {
        let report = self.report();
        let detail = serde_json::to_string(&report).unwrap_or_else(|_| "{}".to_string());
        info!(
            uptime_secs = report.uptime_secs,
            messages_received = report.counters.messages_received,
            messages_failed = report.counters.messages_failed,
            batches_committed = report.counters.batches_committed,
            alerts_created = report.counters.alerts_created,
            alerts_skipped = report.counters.alerts_skipped,
            estimated_cost_today = report.today.estimated_cost,
            report = %detail,
            "performance report"
        );
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Log a performance report on a fixed interval until cancellation.
pub async fn run_report_loop(
    monitor: std::sync::Arc<PerformanceMonitor>,
    interval: Duration,
    ctx: CancellationToken,
) -> anyhow::Result<()> {
    loop {
        tokio::select! {
            _ = ctx.cancelled() => {
                monitor.log_report();
                break;
            }
            _ = tokio::time::sleep(interval) => {
                monitor.log_report();
            }
        }
    }
    Ok(())
}
