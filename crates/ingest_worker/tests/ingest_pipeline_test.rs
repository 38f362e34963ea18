use ingest_worker::domain::PerformanceMonitor;
use ingest_worker::mqtt::BusMessage;
use ingest_worker::{IngestWorker, IngestWorkerConfig};

use common::domain::{DocPath, DocumentStore};
use common::MemoryDocumentStore;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

// Track documents are partitioned by ingest date, which the validator
// stamps with the wall clock.
fn ingest_date() -> String {
    chrono::Utc::now().format("%Y%m%d").to_string()
}

fn telemetry_message(device_id: &str, alert_id: &str, timestamp: &str, battery: f64) -> BusMessage {
    BusMessage {
        topic: "pettrack/tag/telemetry".to_string(),
        payload: serde_json::to_vec(&json!({
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
                "battery_level": battery,
                "step_count": 1042,
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
        .unwrap(),
    }
}

async fn run_pipeline(
    store: Arc<MemoryDocumentStore>,
    monitor: Arc<PerformanceMonitor>,
    messages: Vec<BusMessage>,
) {
    let (sender, receiver) = mpsc::channel(64);
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
async fn test_full_pipeline_persists_all_three_families() {
    let store = Arc::new(MemoryDocumentStore::new());
    let monitor = Arc::new(PerformanceMonitor::new());

    run_pipeline(
        store.clone(),
        monitor.clone(),
        vec![
            telemetry_message("PT-001", "", "2026-08-25T10:00:00", 90.0),
            telemetry_message("PT-001", "", "2026-08-25T10:00:05", 89.5),
            telemetry_message("PT-001", "", "2026-08-25T10:00:10", 89.0),
            telemetry_message("PT-002", "", "2026-08-25T10:00:02", 55.0),
        ],
    )
    .await;

    assert_eq!(monitor.counters().messages_validated, 4);
    assert_eq!(monitor.counters().batches_committed, 1);

    // Family 1: one raw telemetry document per event
    for timestamp in ["2026-08-25T10:00:00", "2026-08-25T10:00:05", "2026-08-25T10:00:10"] {
        let path = DocPath::new(format!(
            "telemetry_tag/PT-001/dates/20260825/points/{timestamp}"
        ));
        let doc = store.get(&path).await.unwrap();
        assert!(doc.is_some(), "missing telemetry point {timestamp}");
    }

    // Family 2: a single merged device state carrying the last event
    let device = store
        .get(&DocPath::new("devices/PT-001"))
        .await
        .unwrap()
        .expect("device state should exist");
    assert_eq!(
        device["liveLocation"]["timestamp"],
        json!("2026-08-25T10:00:10")
    );
    assert_eq!(device["batteryLevel"], json!(89.0));

    // Family 3: one track point per event under the ingest date
    let track = store
        .get(&DocPath::new(format!(
            "devices/PT-002/tracks/{}/points/2026-08-25T10:00:02",
            ingest_date()
        )))
        .await
        .unwrap();
    assert!(track.is_some());
}

#[tokio::test]
async fn test_counters_accumulate_points_per_device_date() {
    let store = Arc::new(MemoryDocumentStore::new());
    let monitor = Arc::new(PerformanceMonitor::new());

    run_pipeline(
        store.clone(),
        monitor.clone(),
        vec![
            telemetry_message("PT-001", "", "2026-08-25T10:00:00", 90.0),
            telemetry_message("PT-001", "", "2026-08-25T10:00:05", 89.5),
            telemetry_message("PT-001", "", "2026-08-25T10:00:10", 89.0),
        ],
    )
    .await;

    let stats = store
        .get(&DocPath::new(
            "telemetry_tag/PT-001/dates/20260825/metadata/stats",
        ))
        .await
        .unwrap()
        .expect("telemetry counter should exist");
    assert_eq!(stats["pointsCount"], json!(3));
    assert!(stats.contains_key("startTime"));
    assert!(stats.contains_key("endTime"));

    let track_day = store
        .get(&DocPath::new(format!(
            "devices/PT-001/tracks/{}",
            ingest_date()
        )))
        .await
        .unwrap()
        .expect("track-day counter should exist");
    assert_eq!(track_day["pointsCount"], json!(3));
}

#[tokio::test]
async fn test_location_history_appends_one_entry_per_device_per_flush() {
    let store = Arc::new(MemoryDocumentStore::new());
    let monitor = Arc::new(PerformanceMonitor::new());

    run_pipeline(
        store.clone(),
        monitor.clone(),
        vec![
            telemetry_message("PT-001", "", "2026-08-25T10:00:00", 90.0),
            telemetry_message("PT-001", "", "2026-08-25T10:00:05", 89.5),
        ],
    )
    .await;

    let device = store
        .get(&DocPath::new("devices/PT-001"))
        .await
        .unwrap()
        .expect("device state should exist");
    let history = device["locationHistory"]
        .as_array()
        .expect("locationHistory should be an array");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["timestamp"], json!("2026-08-25T10:00:05"));
}

#[tokio::test]
async fn test_duplicate_alert_is_created_once() {
    let store = Arc::new(MemoryDocumentStore::new());
    let monitor = Arc::new(PerformanceMonitor::new());

    run_pipeline(
        store.clone(),
        monitor.clone(),
        vec![
            telemetry_message("PT-001", "ALT-LOC-001", "2026-08-25T10:00:00", 90.0),
            telemetry_message("PT-001", "ALT-LOC-001", "2026-08-25T10:00:05", 89.5),
        ],
    )
    .await;

    assert_eq!(monitor.counters().alerts_created, 1);
    assert_eq!(monitor.counters().alerts_skipped, 1);

    let alert = store
        .query_one(
            &DocPath::new("devices/PT-001/alerts"),
            &[common::domain::FieldFilter::eq("alertIdType", json!("ALT-LOC-001"))],
        )
        .await
        .unwrap()
        .expect("alert document should exist");
    assert_eq!(alert["isResolved"], json!(false));
    assert_eq!(alert["isRead"], json!(false));
}

#[tokio::test]
async fn test_reflushing_same_events_is_idempotent() {
    let store = Arc::new(MemoryDocumentStore::new());

    // Two runs over the same event set simulate a retried flush after a
    // reported commit failure. Keys are deterministic so the second run
    // overwrites rather than duplicates.
    for _ in 0..2 {
        run_pipeline(
            store.clone(),
            Arc::new(PerformanceMonitor::new()),
            vec![
                telemetry_message("PT-001", "", "2026-08-25T10:00:00", 90.0),
                telemetry_message("PT-002", "", "2026-08-25T10:00:02", 55.0),
            ],
        )
        .await;
    }

    // 2 telemetry points, 2 device states, 2 track points, 2 track-day
    // counters, 2 telemetry stats counters; nothing duplicated.
    assert_eq!(store.len().await, 10);
}
