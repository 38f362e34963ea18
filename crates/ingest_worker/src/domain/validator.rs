use chrono::Utc;
use common::domain::{
    DeviceClass, DeviceStatus, DomainError, DomainResult, FenceState, Location, TelemetryEvent,
};
use serde::Deserialize;
use tracing::instrument;

/// Wire shape of an inbound telemetry payload. Kept separate from
/// [`TelemetryEvent`] so device-facing field names never leak past the
/// boundary.
#[derive(Debug, Deserialize)]
struct RawPayload {
    device_id: String,
    firmware_version: String,
    pet_id: String,
    user_id: String,
    #[serde(default)]
    alert_id: String,
    location: RawLocation,
    device: RawDevice,
    fence: RawFence,
}

#[derive(Debug, Deserialize)]
struct RawLocation {
    #[serde(rename = "GPS_signal")]
    gps_signal: String,
    longitude: f64,
    latitude: f64,
    altitude: f64,
    timestamp: String,
}

#[derive(Debug, Deserialize)]
struct RawDevice {
    battery_level: f64,
    #[serde(default)]
    step_count: Option<u64>,
    heartbeat: i64,
}

#[derive(Debug, Deserialize)]
struct RawFence {
    fence_id: String,
    status: String,
    center_lat: f64,
    center_lon: f64,
    radius_m: f64,
    distance_m: f64,
}

/// Validates raw MQTT payload bytes into a [`TelemetryEvent`].
///
/// Rejection happens here, at the edge: everything downstream of the
/// validator can assume a structurally complete event. `alert_id` is the
/// one optional field; a missing or empty value means no alert.
#[derive(Debug, Clone, Default)]
pub struct EventValidator;

impl EventValidator {
    pub fn new() -> Self {
        Self
    }

    #[instrument(skip_all, fields(class = class.as_str()))]
    pub fn validate(&self, class: DeviceClass, payload: &[u8]) -> DomainResult<TelemetryEvent> {
        let raw: RawPayload = serde_json::from_slice(payload).map_err(classify_parse_error)?;

        if raw.device_id.trim().is_empty() {
            return Err(DomainError::MissingField("device_id".to_string()));
        }

        Ok(TelemetryEvent {
            device_id: raw.device_id,
            class,
            firmware_version: raw.firmware_version,
            pet_id: raw.pet_id,
            user_id: raw.user_id,
            alert_id: raw.alert_id,
            location: Location {
                gps_signal: raw.location.gps_signal,
                longitude: raw.location.longitude,
                latitude: raw.location.latitude,
                altitude: raw.location.altitude,
                timestamp: raw.location.timestamp,
            },
            device: DeviceStatus {
                battery_level: raw.device.battery_level,
                step_count: raw.device.step_count,
                heartbeat: raw.device.heartbeat,
            },
            fence: FenceState {
                fence_id: raw.fence.fence_id,
                status: raw.fence.status,
                center_lat: raw.fence.center_lat,
                center_lon: raw.fence.center_lon,
                radius_m: raw.fence.radius_m,
                distance_m: raw.fence.distance_m,
            },
            created_at: Utc::now(),
        })
    }
}

fn classify_parse_error(e: serde_json::Error) -> DomainError {
    let message = e.to_string();
    if let Some(field) = message
        .strip_prefix("missing field `")
        .and_then(|rest| rest.split('`').next())
    {
        DomainError::MissingField(field.to_string())
    } else {
        DomainError::MalformedPayload(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_payload() -> serde_json::Value {
        json!({
            "device_id": "PT-2024-001",
            "firmware_version": "Tag-Active",
            "pet_id": "pet-123",
            "user_id": "user-456",
            "alert_id": "",
            "location": {
                "GPS_signal": "Available",
                "longitude": 77.659538,
                "latitude": 12.860779,
                "altitude": 912.3,
                "timestamp": "2026-08-25T10:15:30.123"
            },
            "device": {
                "battery_level": 87.5,
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
        })
    }

    #[test]
    fn test_valid_payload_parses() {
        let validator = EventValidator::new();
        let bytes = serde_json::to_vec(&valid_payload()).unwrap();

        let event = validator
            .validate(DeviceClass::Tag, &bytes)
            .expect("payload should validate");

        assert_eq!(event.device_id, "PT-2024-001");
        assert_eq!(event.class, DeviceClass::Tag);
        assert_eq!(event.location.gps_signal, "Available");
        assert_eq!(event.location.timestamp, "2026-08-25T10:15:30.123");
        assert_eq!(event.device.step_count, Some(1042));
        assert_eq!(event.fence.status, "inside_fence");
        assert!(event.alert_id.is_empty());
    }

    #[test]
    fn test_missing_location_is_missing_field() {
        let validator = EventValidator::new();
        let mut payload = valid_payload();
        payload.as_object_mut().unwrap().remove("location");
        let bytes = serde_json::to_vec(&payload).unwrap();

        let err = validator.validate(DeviceClass::Tag, &bytes).unwrap_err();
        assert!(matches!(err, DomainError::MissingField(field) if field == "location"));
    }

    #[test]
    fn test_missing_gps_signal_is_missing_field() {
        let validator = EventValidator::new();
        let mut payload = valid_payload();
        payload["location"].as_object_mut().unwrap().remove("GPS_signal");
        let bytes = serde_json::to_vec(&payload).unwrap();

        let err = validator.validate(DeviceClass::Tag, &bytes).unwrap_err();
        assert!(matches!(err, DomainError::MissingField(field) if field == "GPS_signal"));
    }

    #[test]
    fn test_empty_device_id_rejected() {
        let validator = EventValidator::new();
        let mut payload = valid_payload();
        payload["device_id"] = json!("   ");
        let bytes = serde_json::to_vec(&payload).unwrap();

        let err = validator.validate(DeviceClass::Tag, &bytes).unwrap_err();
        assert!(matches!(err, DomainError::MissingField(field) if field == "device_id"));
    }

    #[test]
    fn test_non_json_payload_is_malformed() {
        let validator = EventValidator::new();
        let err = validator
            .validate(DeviceClass::Tag, b"not json at all")
            .unwrap_err();
        assert!(matches!(err, DomainError::MalformedPayload(_)));
    }

    #[test]
    fn test_missing_alert_id_defaults_to_empty() {
        let validator = EventValidator::new();
        let mut payload = valid_payload();
        payload.as_object_mut().unwrap().remove("alert_id");
        let bytes = serde_json::to_vec(&payload).unwrap();

        let event = validator
            .validate(DeviceClass::Sense, &bytes)
            .expect("alert_id is optional");
        assert!(event.alert_id.is_empty());
    }

    #[test]
    fn test_missing_step_count_defaults_to_none() {
        let validator = EventValidator::new();
        let mut payload = valid_payload();
        payload["device"].as_object_mut().unwrap().remove("step_count");
        let bytes = serde_json::to_vec(&payload).unwrap();

        let event = validator
            .validate(DeviceClass::Active, &bytes)
            .expect("step_count is optional");
        assert_eq!(event.device.step_count, None);
    }
}
