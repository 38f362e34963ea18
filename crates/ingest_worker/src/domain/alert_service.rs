use crate::domain::monitor::{OperationKind, PerformanceMonitor};
use common::domain::{DocPath, DomainResult, DocumentStore, FieldFilter, TelemetryEvent};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Static description of a recognized real-time alert type.
#[derive(Debug, Clone)]
pub struct AlertTemplate {
    pub alert_type: &'static str,
    pub severity: &'static str,
    pub priority: &'static str,
    pub title: &'static str,
    /// `{fence_id}` is interpolated from the event's fence state.
    pub message: &'static str,
}

/// Location alerts are `ALT-LOC-*`, battery alerts `ALR-BAT-*`. Ids with
/// any other prefix belong to other services and get no store interaction.
fn template_for(alert_id: &str) -> Option<AlertTemplate> {
    match alert_id {
        "ALT-LOC-001" => Some(AlertTemplate {
            alert_type: "geofence_breach",
            severity: "high",
            priority: "P1",
            title: "Pet left the safe zone",
            message: "Your pet has moved outside fence {fence_id}.",
        }),
        "ALR-BAT-001" => Some(AlertTemplate {
            alert_type: "low_battery",
            severity: "medium",
            priority: "P2",
            title: "Tracker battery low",
            message: "Tracker battery is running low; charge it soon.",
        }),
        id if id.starts_with("ALT-LOC-") => Some(AlertTemplate {
            alert_type: "location",
            severity: "high",
            priority: "P1",
            title: "Location alert",
            message: "A location alert was raised near fence {fence_id}.",
        }),
        id if id.starts_with("ALR-BAT-") => Some(AlertTemplate {
            alert_type: "battery",
            severity: "medium",
            priority: "P2",
            title: "Battery alert",
            message: "A battery alert was raised for this tracker.",
        }),
        _ => None,
    }
}

/// Creates alert documents while suppressing duplicates.
///
/// One unresolved alert per (device, alert id type) is the target: an
/// existing unresolved match means skip. A failed duplicate lookup fails
/// open and creates anyway, trading a possible duplicate for guaranteed
/// alert delivery when the store is degraded.
pub struct AlertDeduplicator {
    store: Arc<dyn DocumentStore>,
    monitor: Arc<PerformanceMonitor>,
}

impl AlertDeduplicator {
    pub fn new(store: Arc<dyn DocumentStore>, monitor: Arc<PerformanceMonitor>) -> Self {
        Self { store, monitor }
    }

    /// Returns the created alert document id, or `None` when the alert id
    /// is not ours or an unresolved duplicate already exists.
    #[instrument(skip(self, event), fields(device_id = %event.device_id, alert_id = %event.alert_id))]
    pub async fn process_alert(&self, event: &TelemetryEvent) -> DomainResult<Option<String>> {
        let Some(template) = template_for(&event.alert_id) else {
            debug!("alert id outside this pipeline's taxonomy, skipping");
            return Ok(None);
        };

        let started = Instant::now();
        let alerts = DocPath::new(format!("devices/{}/alerts", event.device_id));
        let filters = [
            FieldFilter::eq("alertIdType", json!(event.alert_id)),
            FieldFilter::eq("isResolved", json!(false)),
        ];

        let existing = match self.store.query_one(&alerts, &filters).await {
            Ok(existing) => {
                self.monitor.record_ops(OperationKind::Alert, 1, 0, 0);
                existing
            }
            Err(e) => {
                // Fail open: a lost duplicate check must not cost the owner
                // an alert.
                warn!(error = %e, "duplicate lookup failed, creating alert anyway");
                None
            }
        };

        if existing.is_some() {
            debug!("unresolved alert of this type already exists");
            self.monitor.inc_alerts_skipped();
            self.monitor
                .record_timing("alert_dedup", started.elapsed());
            return Ok(None);
        }

        let message = template
            .message
            .replace("{fence_id}", &event.fence.fence_id);
        let doc = json!({
            "alertIdType": event.alert_id,
            "alertType": template.alert_type,
            "severity": template.severity,
            "priority": template.priority,
            "title": template.title,
            "message": message,
            "deviceId": event.device_id,
            "petId": event.pet_id,
            "userId": event.user_id,
            "isResolved": false,
            "isRead": false,
            "createdAt": event.created_at.to_rfc3339(),
            "location": {
                "latitude": event.location.latitude,
                "longitude": event.location.longitude,
                "timestamp": event.location.timestamp,
            },
        })
        .as_object()
        .cloned()
        .unwrap_or_default();

        let alert_doc_id = self.store.create(&alerts, doc).await?;
        self.monitor.record_ops(OperationKind::Alert, 0, 1, 0);
        self.monitor.inc_alerts_created();
        self.monitor
            .record_timing("alert_dedup", started.elapsed());
        info!(alert_doc_id = %alert_doc_id, "alert created");
        Ok(Some(alert_doc_id))
    }
}
