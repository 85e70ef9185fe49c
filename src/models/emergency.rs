use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

use crate::geo::Coordinate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyType {
    VolumeButtonTrigger,
    ManualTrigger,
    SafeJourneyAlert,
    UnsafeZoneEntry,
}

impl EmergencyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmergencyType::VolumeButtonTrigger => "volume_button_trigger",
            EmergencyType::ManualTrigger => "manual_trigger",
            EmergencyType::SafeJourneyAlert => "safe_journey_alert",
            EmergencyType::UnsafeZoneEntry => "unsafe_zone_entry",
        }
    }
}

impl FromStr for EmergencyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "volume_button_trigger" => Ok(EmergencyType::VolumeButtonTrigger),
            "manual_trigger" => Ok(EmergencyType::ManualTrigger),
            "safe_journey_alert" => Ok(EmergencyType::SafeJourneyAlert),
            "unsafe_zone_entry" => Ok(EmergencyType::UnsafeZoneEntry),
            other => Err(format!("unknown emergency type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyStatus {
    Active,
    Resolved,
    FalseAlarm,
    Cancelled,
}

impl EmergencyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmergencyStatus::Active => "active",
            EmergencyStatus::Resolved => "resolved",
            EmergencyStatus::FalseAlarm => "false_alarm",
            EmergencyStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for EmergencyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(EmergencyStatus::Active),
            "resolved" => Ok(EmergencyStatus::Resolved),
            "false_alarm" => Ok(EmergencyStatus::FalseAlarm),
            "cancelled" => Ok(EmergencyStatus::Cancelled),
            other => Err(format!("unknown emergency status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmergencyEvent {
    pub event_id: i64,
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub location: Coordinate,
    pub accuracy: Option<f64>,
    pub event_type: EmergencyType,
    pub status: EmergencyStatus,
    pub sms_sent: bool,
    pub sms_recipients: Option<String>, // comma-separated phone numbers
    pub resolved_at: Option<DateTime<Utc>>,
}

impl EmergencyEvent {
    pub fn new(
        device_id: &str,
        event_type: EmergencyType,
        location: Coordinate,
        accuracy: Option<f64>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: 0,
            device_id: device_id.to_string(),
            timestamp,
            location,
            accuracy,
            event_type,
            status: EmergencyStatus::Active,
            sms_sent: false,
            sms_recipients: None,
            resolved_at: None,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct EmergencyEventRow {
    pub event_id: i64,
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub lat: f64,
    pub lng: f64,
    pub accuracy: Option<f64>,
    pub event_type: String,
    pub status: String,
    pub sms_sent: bool,
    pub sms_recipients: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl TryFrom<EmergencyEventRow> for EmergencyEvent {
    type Error = String;

    fn try_from(row: EmergencyEventRow) -> Result<Self, Self::Error> {
        Ok(Self {
            event_id: row.event_id,
            device_id: row.device_id,
            timestamp: row.timestamp,
            location: Coordinate::new(row.lat, row.lng),
            accuracy: row.accuracy,
            event_type: row.event_type.parse()?,
            status: row.status.parse()?,
            sms_sent: row.sms_sent,
            sms_recipients: row.sms_recipients,
            resolved_at: row.resolved_at,
        })
    }
}
