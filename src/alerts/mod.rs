//! Outbound alerts: what gets said, to whom, and the sinks that carry it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::geo::Coordinate;
use crate::models::wire::{AlertEnvelope, AlertType};

pub mod dispatcher;
pub mod sms;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Emergency,
    JourneyStarted,
    JourneyCompleted,
    JourneyDeviated,
    JourneyStopped,
    UnsafeZoneEntry,
}

impl AlertKind {
    pub fn wire_type(&self) -> AlertType {
        match self {
            AlertKind::Emergency => AlertType::Emergency,
            AlertKind::JourneyStarted => AlertType::JourneyStarted,
            AlertKind::JourneyCompleted => AlertType::JourneyCompleted,
            AlertKind::JourneyDeviated => AlertType::JourneyDeviated,
            AlertKind::JourneyStopped => AlertType::JourneyStopped,
            AlertKind::UnsafeZoneEntry => AlertType::UnsafeZoneEntry,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub alert_id: Uuid,
    pub device_id: String,
    pub kind: AlertKind,
    pub journey_id: Option<Uuid>,
    pub location: Option<Coordinate>,
    pub occurred_at: DateTime<Utc>,
    pub text: String,
    /// Normalised phone numbers.
    pub recipients: Vec<String>,
}

impl Alert {
    pub fn to_envelope(&self) -> AlertEnvelope {
        AlertEnvelope {
            alert_id: self.alert_id.to_string(),
            device_id: self.device_id.clone(),
            alert_type: self.kind.wire_type() as i32,
            journey_id: self.journey_id.map(|id| id.to_string()),
            latitude: self.location.map(|c| c.lat),
            longitude: self.location.map(|c| c.lng),
            occurred_at_ms: self.occurred_at.timestamp_millis(),
            text: self.text.clone(),
            recipients: self.recipients.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("alert transport failed: {0}")]
    Transport(String),
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    fn name(&self) -> &str;
    async fn deliver(&self, alert: &Alert) -> Result<(), SinkError>;
}

/// Writes alerts to the log. Used when no broker is configured.
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, alert: &Alert) -> Result<(), SinkError> {
        info!(
            alert_id = %alert.alert_id,
            kind = ?alert.kind,
            recipients = alert.recipients.len(),
            parts = sms::sms_parts(&alert.text),
            "ALERT {}",
            alert.text
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_carries_alert_fields() {
        let journey_id = Uuid::new_v4();
        let alert = Alert {
            alert_id: Uuid::new_v4(),
            device_id: "dev-9".to_string(),
            kind: AlertKind::JourneyStopped,
            journey_id: Some(journey_id),
            location: Some(Coordinate::new(19.4, -99.1)),
            occurred_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            text: "stopped".to_string(),
            recipients: vec!["+5215512345678".to_string()],
        };

        let envelope = AlertEnvelope::from_bytes(&alert.to_envelope().to_bytes()).unwrap();
        assert_eq!(envelope.alert_type(), AlertType::JourneyStopped);
        assert_eq!(envelope.journey_id, Some(journey_id.to_string()));
        assert_eq!(envelope.latitude, Some(19.4));
        assert_eq!(envelope.occurred_at_ms, 1_700_000_000_000);
        assert_eq!(envelope.recipients.len(), 1);
    }
}
