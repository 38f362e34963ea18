use crate::domain::monitor::OperationKind;
use common::domain::{DocPath, Document, TelemetryEvent, WriteOp};
use serde_json::{json, Value};
use std::collections::HashMap;

/// One store-commit-sized slice of a flush, with per-family write counts
/// for the operations ledger.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub ops: Vec<WriteOp>,
    pub telemetry_writes: u64,
    pub device_writes: u64,
    pub track_writes: u64,
}

/// A counter document touched by this flush, with the number of points it
/// gained. One touch per distinct (device, date) key, not per point.
#[derive(Debug, Clone, PartialEq)]
pub struct CounterTouch {
    pub path: DocPath,
    pub points: i64,
}

/// Everything derived from one flushed batch: the atomic commit chunks plus
/// the two best-effort secondary passes.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    pub chunks: Vec<Chunk>,
    pub history_ops: Vec<WriteOp>,
    pub counter_touches: Vec<CounterTouch>,
}

impl ChunkPlan {
    pub fn total_ops(&self) -> usize {
        self.chunks.iter().map(|chunk| chunk.ops.len()).sum()
    }
}

/// Transforms one flushed event sequence into store operations.
///
/// Three families are derived: per-event raw telemetry writes, per-device
/// deduplicated live-state merges, and per-event append-only track points.
/// The concatenated list is split into chunks no larger than the store's
/// maximum atomic-commit size.
#[derive(Debug, Clone)]
pub struct BatchChunker {
    batch_size: usize,
}

impl BatchChunker {
    pub fn new(batch_size: usize) -> Self {
        Self { batch_size }
    }

    pub fn build(&self, events: &[TelemetryEvent]) -> ChunkPlan {
        let mut tagged: Vec<(OperationKind, WriteOp)> = Vec::with_capacity(events.len() * 2 + 8);

        // Family 1: one telemetry write per event, keyed by
        // (class collection, device, event-date bucket, device timestamp).
        for event in events {
            tagged.push((
                OperationKind::Telemetry,
                WriteOp::Set {
                    path: telemetry_point_path(event),
                    doc: telemetry_doc(event),
                },
            ));
        }

        // Family 2: one merge per device carrying the chronologically last
        // event in this batch. Later events overwrite earlier ones as the
        // sequence is walked in arrival order.
        let mut last_by_device: HashMap<&str, &TelemetryEvent> = HashMap::new();
        let mut device_order: Vec<&str> = Vec::new();
        for event in events {
            if last_by_device
                .insert(event.device_id.as_str(), event)
                .is_none()
            {
                device_order.push(event.device_id.as_str());
            }
        }
        for device_id in &device_order {
            let event = last_by_device[device_id];
            tagged.push((
                OperationKind::Device,
                WriteOp::Merge {
                    path: device_path(&event.device_id),
                    doc: device_state_doc(event),
                },
            ));
        }

        // Family 3: one append-only track point per event, keyed by
        // (device, ingest-date bucket, device timestamp).
        for event in events {
            tagged.push((
                OperationKind::Track,
                WriteOp::Set {
                    path: track_point_path(event),
                    doc: track_point_doc(event),
                },
            ));
        }

        let chunks = tagged
            .chunks(self.batch_size)
            .map(|slice| {
                let mut chunk = Chunk {
                    ops: Vec::with_capacity(slice.len()),
                    telemetry_writes: 0,
                    device_writes: 0,
                    track_writes: 0,
                };
                for (kind, op) in slice {
                    match kind {
                        OperationKind::Telemetry => chunk.telemetry_writes += 1,
                        OperationKind::Device => chunk.device_writes += 1,
                        OperationKind::Track => chunk.track_writes += 1,
                        _ => {}
                    }
                    chunk.ops.push(op.clone());
                }
                chunk
            })
            .collect();

        // Secondary pass 1: bounded location-history appends, one per device.
        let history_ops = device_order
            .iter()
            .map(|device_id| {
                let event = last_by_device[device_id];
                WriteOp::ArrayAppend {
                    path: device_path(&event.device_id),
                    field: "locationHistory".to_string(),
                    values: vec![history_entry(event)],
                }
            })
            .collect();

        // Secondary pass 2: point-counter touches, one per distinct key for
        // both the telemetry stats doc and the track-day doc.
        let mut touched: HashMap<DocPath, i64> = HashMap::new();
        let mut touch_order: Vec<DocPath> = Vec::new();
        for event in events {
            for path in [telemetry_stats_path(event), track_day_path(event)] {
                match touched.get_mut(&path) {
                    Some(points) => *points += 1,
                    None => {
                        touched.insert(path.clone(), 1);
                        touch_order.push(path);
                    }
                }
            }
        }
        let counter_touches = touch_order
            .into_iter()
            .map(|path| {
                let points = touched[&path];
                CounterTouch { path, points }
            })
            .collect();

        ChunkPlan {
            chunks,
            history_ops,
            counter_touches,
        }
    }
}

fn device_path(device_id: &str) -> DocPath {
    DocPath::from_segments(&["devices", device_id])
}

fn telemetry_point_path(event: &TelemetryEvent) -> DocPath {
    DocPath::from_segments(&[
        event.class.collection(),
        &event.device_id,
        "dates",
        &event.event_date_bucket(),
        "points",
        &event.location.timestamp,
    ])
}

fn telemetry_stats_path(event: &TelemetryEvent) -> DocPath {
    DocPath::from_segments(&[
        event.class.collection(),
        &event.device_id,
        "dates",
        &event.event_date_bucket(),
        "metadata",
        "stats",
    ])
}

fn track_point_path(event: &TelemetryEvent) -> DocPath {
    DocPath::from_segments(&[
        "devices",
        &event.device_id,
        "tracks",
        &event.ingest_date_bucket(),
        "points",
        &event.location.timestamp,
    ])
}

fn track_day_path(event: &TelemetryEvent) -> DocPath {
    DocPath::from_segments(&[
        "devices",
        &event.device_id,
        "tracks",
        &event.ingest_date_bucket(),
    ])
}

fn as_document(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

fn telemetry_doc(event: &TelemetryEvent) -> Document {
    as_document(json!({
        "deviceId": event.device_id,
        "petId": event.pet_id,
        "userId": event.user_id,
        "firmwareVersion": event.firmware_version,
        "alertId": event.alert_id,
        "location": {
            "gpsSignal": event.location.gps_signal,
            "latitude": event.location.latitude,
            "longitude": event.location.longitude,
            "altitude": event.location.altitude,
            "timestamp": event.location.timestamp,
        },
        "device": {
            "batteryLevel": event.device.battery_level,
            "stepCount": event.device.step_count,
            "heartbeat": event.device.heartbeat,
        },
        "fence": {
            "fenceId": event.fence.fence_id,
            "status": event.fence.status,
            "centerLat": event.fence.center_lat,
            "centerLon": event.fence.center_lon,
            "radiusM": event.fence.radius_m,
            "distanceM": event.fence.distance_m,
        },
        "receivedAt": event.created_at.to_rfc3339(),
    }))
}

fn device_state_doc(event: &TelemetryEvent) -> Document {
    as_document(json!({
        "liveLocation": {
            "gpsSignal": event.location.gps_signal,
            "latitude": event.location.latitude,
            "longitude": event.location.longitude,
            "altitude": event.location.altitude,
            "timestamp": event.location.timestamp,
        },
        "batteryLevel": event.device.battery_level,
        "stepCount": event.device.step_count,
        "heartbeat": event.device.heartbeat,
        "firmwareVersion": event.firmware_version,
        "petId": event.pet_id,
        "userId": event.user_id,
        "fenceStatus": event.fence.status,
        "lastUpdated": event.created_at.to_rfc3339(),
    }))
}

fn track_point_doc(event: &TelemetryEvent) -> Document {
    as_document(json!({
        "gpsSignal": event.location.gps_signal,
        "latitude": event.location.latitude,
        "longitude": event.location.longitude,
        "altitude": event.location.altitude,
        "timestamp": event.location.timestamp,
        "batteryLevel": event.device.battery_level,
        "recordedAt": event.created_at.to_rfc3339(),
    }))
}

fn history_entry(event: &TelemetryEvent) -> Value {
    json!({
        "latitude": event.location.latitude,
        "longitude": event.location.longitude,
        "altitude": event.location.altitude,
        "timestamp": event.location.timestamp,
        "recordedAt": event.created_at.to_rfc3339(),
    })
}
