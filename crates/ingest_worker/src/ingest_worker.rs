use crate::domain::{
    AlertDeduplicator, BatchChunker, BatchWriter, BufferConfig, EventValidator, IngestBuffer,
    MetadataCounterService, PerformanceMonitor,
};
use crate::mqtt::{parse_topic, BusMessage};
use common::domain::{DocumentStore, DomainResult};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Tunables for one ingest worker instance.
#[derive(Debug, Clone)]
pub struct IngestWorkerConfig {
    pub buffer: BufferConfig,
}

impl Default for IngestWorkerConfig {
    fn default() -> Self {
        Self {
            buffer: BufferConfig::default(),
        }
    }
}

/// Consumes bus messages and drives the full ingest pipeline: topic
/// routing, payload validation, alert deduplication, and buffered
/// batch persistence.
pub struct IngestWorker {
    validator: EventValidator,
    buffer: IngestBuffer,
    alerts: AlertDeduplicator,
    monitor: Arc<PerformanceMonitor>,
    receiver: mpsc::Receiver<BusMessage>,
}

impl IngestWorker {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        monitor: Arc<PerformanceMonitor>,
        config: IngestWorkerConfig,
        receiver: mpsc::Receiver<BusMessage>,
    ) -> Self {
        let writer = BatchWriter::new(
            store.clone(),
            BatchChunker::new(config.buffer.batch_size),
            MetadataCounterService::new(store.clone(), monitor.clone()),
            monitor.clone(),
        );
        let buffer = IngestBuffer::new(config.buffer, Arc::new(writer), monitor.clone());
        let alerts = AlertDeduplicator::new(store, monitor.clone());

        Self {
            validator: EventValidator::new(),
            buffer,
            alerts,
            monitor,
            receiver,
        }
    }

    /// Consume until the channel closes or cancellation fires, then drain
    /// the buffer with one final flush.
    #[instrument(name = "ingest_worker", skip_all)]
    pub async fn run(mut self, cancellation_token: CancellationToken) {
        info!("starting ingest worker");

        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    debug!("cancellation received");
                    break;
                }
                message = self.receiver.recv() => {
                    match message {
                        Some(message) => self.handle_message(message).await,
                        None => {
                            debug!("bus channel closed");
                            break;
                        }
                    }
                }
            }
        }

        self.buffer.shutdown().await;
        info!("ingest worker stopped");
    }

    async fn handle_message(&self, message: BusMessage) {
        let started = Instant::now();
        self.monitor.inc_messages_received();

        let event = match self.validate(&message) {
            Ok(event) => event,
            Err(e) => {
                warn!(topic = %message.topic, error = %e, "dropping invalid message");
                self.monitor.inc_messages_failed();
                return;
            }
        };

        if !event.alert_id.is_empty() {
            // Alert handling is independent of telemetry durability; its
            // failures never block the enqueue.
            if let Err(e) = self.alerts.process_alert(&event).await {
                warn!(
                    device_id = %event.device_id,
                    alert_id = %event.alert_id,
                    error = %e,
                    "alert processing failed"
                );
            }
        }

        self.buffer.enqueue(event).await;
        self.monitor.inc_messages_validated();
        self.monitor
            .record_timing("handle_message", started.elapsed());
    }

    fn validate(&self, message: &BusMessage) -> DomainResult<common::domain::TelemetryEvent> {
        let started = Instant::now();
        let parsed = parse_topic(&message.topic)?;
        let event = self.validator.validate(parsed.class, &message.payload)?;
        self.monitor.record_timing("validate", started.elapsed());
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::MemoryDocumentStore;
    use serde_json::json;

    fn payload(device_id: &str, alert_id: &str, timestamp: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "device_id": device_id,
            "firmware_version": "Tag-Active",
            "pet_id": "pet-123",
            "user_id": "user-456",
            "alert_id": alert_id,
            "location": {
                "GPS_signal": "Available",
                "longitude": 77.659538,
                "latitude": 12.860779,
                "altitude": 912.3,
                "timestamp": timestamp
            },
            "device": {
                "battery_level": 87.5,
                "step_count": 100,
                "heartbeat": 2
            },
            "fence": {
                "fence_id": "FENCE001",
                "status": "inside_fence",
                "center_lat": 12.860779,
                "center_lon": 77.659538,
                "radius_m": 20.0,
                "distance_m": 4.2
            }
        }))
        .unwrap()
    }

    async fn run_worker(
        store: Arc<MemoryDocumentStore>,
        monitor: Arc<PerformanceMonitor>,
        messages: Vec<BusMessage>,
    ) {
        let (sender, receiver) = mpsc::channel(16);
        let worker = IngestWorker::new(
            store,
            monitor,
            IngestWorkerConfig::default(),
            receiver,
        );

        for message in messages {
            sender.send(message).await.unwrap();
        }
        drop(sender);

        worker.run(CancellationToken::new()).await;
    }

    #[tokio::test]
    async fn test_invalid_topic_counts_as_failed() {
        let store = Arc::new(MemoryDocumentStore::new());
        let monitor = Arc::new(PerformanceMonitor::new());

        run_worker(
            store.clone(),
            monitor.clone(),
            vec![BusMessage {
                topic: "pettrack/unknown/telemetry".to_string(),
                payload: payload("PT-001", "", "2026-08-25T10:00:00"),
            }],
        )
        .await;

        assert_eq!(monitor.counters().messages_received, 1);
        assert_eq!(monitor.counters().messages_failed, 1);
        assert_eq!(monitor.counters().messages_validated, 0);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_malformed_payload_never_reaches_buffer() {
        let store = Arc::new(MemoryDocumentStore::new());
        let monitor = Arc::new(PerformanceMonitor::new());

        run_worker(
            store.clone(),
            monitor.clone(),
            vec![BusMessage {
                topic: "pettrack/tag/telemetry".to_string(),
                payload: b"{\"device_id\": \"PT-001\"}".to_vec(),
            }],
        )
        .await;

        assert_eq!(monitor.counters().messages_failed, 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_valid_message_lands_in_store_at_shutdown() {
        let store = Arc::new(MemoryDocumentStore::new());
        let monitor = Arc::new(PerformanceMonitor::new());

        run_worker(
            store.clone(),
            monitor.clone(),
            vec![BusMessage {
                topic: "pettrack/tag/telemetry".to_string(),
                payload: payload("PT-001", "", "2026-08-25T10:00:00"),
            }],
        )
        .await;

        assert_eq!(monitor.counters().messages_validated, 1);
        // Shutdown flush persisted the single event
        let telemetry = store
            .get(&common::domain::DocPath::new(
                "telemetry_tag/PT-001/dates/20260825/points/2026-08-25T10:00:00",
            ))
            .await
            .unwrap();
        assert!(telemetry.is_some());
    }
}
