use crate::domain::result::{DomainError, DomainResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Device class encoded as the second path segment of the bus topic.
///
/// Each class writes raw telemetry into its own top-level collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Tag,
    Active,
    Sense,
}

impl DeviceClass {
    /// Parse a topic segment into a device class.
    ///
    /// Unknown values are a validation failure at the boundary; partially
    /// typed events never reach the buffer.
    pub fn from_topic_segment(segment: &str) -> DomainResult<Self> {
        match segment {
            "tag" => Ok(DeviceClass::Tag),
            "active" => Ok(DeviceClass::Active),
            "sense" => Ok(DeviceClass::Sense),
            other => Err(DomainError::UnknownDeviceClass(other.to_string())),
        }
    }

    /// Top-level collection holding raw telemetry for this class.
    pub fn collection(&self) -> &'static str {
        match self {
            DeviceClass::Tag => "telemetry_tag",
            DeviceClass::Active => "telemetry_active",
            DeviceClass::Sense => "telemetry_sense",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Tag => "tag",
            DeviceClass::Active => "active",
            DeviceClass::Sense => "sense",
        }
    }
}

/// GPS fix reported by the device. `timestamp` is the device's own clock,
/// kept as the raw string so document keys stay deterministic across retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub gps_signal: String,
    pub longitude: f64,
    pub latitude: f64,
    pub altitude: f64,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub battery_level: f64,
    pub step_count: Option<u64>,
    pub heartbeat: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FenceState {
    pub fence_id: String,
    pub status: String,
    pub center_lat: f64,
    pub center_lon: f64,
    pub radius_m: f64,
    pub distance_m: f64,
}

/// One validated inbound telemetry event.
///
/// Immutable once constructed; owned by the ingest buffer until a flush
/// hands it to the batch chunker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub device_id: String,
    pub class: DeviceClass,
    pub firmware_version: String,
    pub pet_id: String,
    pub user_id: String,
    /// Empty string means no alert attached.
    pub alert_id: String,
    pub location: Location,
    pub device: DeviceStatus,
    pub fence: FenceState,
    pub created_at: DateTime<Utc>,
}

impl TelemetryEvent {
    /// Calendar-day partition key for raw telemetry, derived from the
    /// device-reported timestamp; falls back to ingest time when the device
    /// string does not parse.
    pub fn event_date_bucket(&self) -> String {
        parse_device_timestamp(&self.location.timestamp)
            .map(|dt| date_bucket(&dt))
            .unwrap_or_else(|| date_bucket(&self.created_at))
    }

    /// Calendar-day partition key for track points, derived from ingest time.
    pub fn ingest_date_bucket(&self) -> String {
        date_bucket(&self.created_at)
    }
}

/// Format a timestamp as a `YYYYMMDD` date bucket.
pub fn date_bucket(at: &DateTime<Utc>) -> String {
    at.format("%Y%m%d").to_string()
}

/// Parse a device-reported timestamp. Devices send either RFC 3339 or a
/// naive ISO 8601 local time without offset.
pub fn parse_device_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
