use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::geo::Coordinate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JourneyStatus {
    InProgress,
    Completed,
    Cancelled,
    AlertTriggered,
    Deviated,
}

impl JourneyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JourneyStatus::InProgress => "in_progress",
            JourneyStatus::Completed => "completed",
            JourneyStatus::Cancelled => "cancelled",
            JourneyStatus::AlertTriggered => "alert_triggered",
            JourneyStatus::Deviated => "deviated",
        }
    }

    /// Completed and cancelled journeys never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JourneyStatus::Completed | JourneyStatus::Cancelled)
    }
}

impl fmt::Display for JourneyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JourneyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(JourneyStatus::InProgress),
            "completed" => Ok(JourneyStatus::Completed),
            "cancelled" => Ok(JourneyStatus::Cancelled),
            "alert_triggered" => Ok(JourneyStatus::AlertTriggered),
            "deviated" => Ok(JourneyStatus::Deviated),
            other => Err(format!("unknown journey status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Completed,
    Cancelled,
}

impl From<StopReason> for JourneyStatus {
    fn from(reason: StopReason) -> Self {
        match reason {
            StopReason::Completed => JourneyStatus::Completed,
            StopReason::Cancelled => JourneyStatus::Cancelled,
        }
    }
}

/// What the user asked for when starting a journey.
#[derive(Debug, Clone, PartialEq)]
pub struct JourneyPlan {
    pub origin: Coordinate,
    pub destination: Coordinate,
    pub start_address: Option<String>,
    pub destination_address: Option<String>,
    pub expected_duration_minutes: Option<i32>,
}

impl JourneyPlan {
    pub fn new(origin: Coordinate, destination: Coordinate) -> Self {
        Self {
            origin,
            destination,
            start_address: None,
            destination_address: None,
            expected_duration_minutes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Journey {
    pub journey_id: Uuid,
    pub device_id: String,
    pub origin: Coordinate,
    pub destination: Coordinate,
    pub start_address: Option<String>,
    pub destination_address: Option<String>,
    pub expected_duration_minutes: Option<i32>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub actual_duration_minutes: Option<i32>,
    pub status: JourneyStatus,
    pub has_deviation_alert: bool,
    pub has_stopped_alert: bool,
    pub alert_time: Option<DateTime<Utc>>,
}

impl Journey {
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionFix {
    pub journey_id: Uuid,
    pub coordinate: Coordinate,
    pub accuracy: f64, // meters
    pub speed: Option<f64>,
    pub bearing: Option<f64>,
    pub battery_level: Option<i16>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
pub struct JourneyRow {
    pub journey_id: Uuid,
    pub device_id: String,
    pub start_lat: f64,
    pub start_lng: f64,
    pub dest_lat: f64,
    pub dest_lng: f64,
    pub start_address: Option<String>,
    pub dest_address: Option<String>,
    pub expected_duration_minutes: Option<i32>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub actual_duration_minutes: Option<i32>,
    pub status: String, // text in DB, see JourneyStatus::as_str
    pub has_deviation_alert: bool,
    pub has_stopped_alert: bool,
    pub alert_time: Option<DateTime<Utc>>,
}

impl TryFrom<JourneyRow> for Journey {
    type Error = String;

    fn try_from(row: JourneyRow) -> Result<Self, Self::Error> {
        Ok(Self {
            journey_id: row.journey_id,
            device_id: row.device_id,
            origin: Coordinate::new(row.start_lat, row.start_lng),
            destination: Coordinate::new(row.dest_lat, row.dest_lng),
            start_address: row.start_address,
            destination_address: row.dest_address,
            expected_duration_minutes: row.expected_duration_minutes,
            start_time: row.start_time,
            end_time: row.end_time,
            actual_duration_minutes: row.actual_duration_minutes,
            status: row.status.parse()?,
            has_deviation_alert: row.has_deviation_alert,
            has_stopped_alert: row.has_stopped_alert,
            alert_time: row.alert_time,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct JourneyPointRow {
    pub point_id: i64, // bigserial
    pub journey_id: Uuid,
    pub lat: f64,
    pub lng: f64,
    pub accuracy: f64,
    pub speed: Option<f64>,
    pub bearing: Option<f64>,
    pub battery_level: Option<i16>,
    pub timestamp: DateTime<Utc>,
}

impl From<JourneyPointRow> for PositionFix {
    fn from(row: JourneyPointRow) -> Self {
        Self {
            journey_id: row.journey_id,
            coordinate: Coordinate::new(row.lat, row.lng),
            accuracy: row.accuracy,
            speed: row.speed,
            bearing: row.bearing,
            battery_level: row.battery_level,
            timestamp: row.timestamp,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_journey() -> Journey {
        Journey {
            journey_id: Uuid::new_v4(),
            device_id: "dev-1".to_string(),
            origin: Coordinate::new(0.0, 0.0),
            destination: Coordinate::new(0.0, 0.01),
            start_address: Some("Office".to_string()),
            destination_address: Some("Home".to_string()),
            expected_duration_minutes: Some(20),
            start_time: Utc::now(),
            end_time: None,
            actual_duration_minutes: None,
            status: JourneyStatus::InProgress,
            has_deviation_alert: false,
            has_stopped_alert: false,
            alert_time: None,
        }
    }

    #[test]
    fn test_status_text_mapping() {
        for status in [
            JourneyStatus::InProgress,
            JourneyStatus::Completed,
            JourneyStatus::Cancelled,
            JourneyStatus::AlertTriggered,
            JourneyStatus::Deviated,
        ] {
            assert_eq!(status.as_str().parse::<JourneyStatus>(), Ok(status));
        }
        assert!("IN_PROGRESS".parse::<JourneyStatus>().is_err());
    }

    #[test]
    fn test_only_completed_and_cancelled_are_terminal() {
        assert!(JourneyStatus::Completed.is_terminal());
        assert!(JourneyStatus::Cancelled.is_terminal());
        assert!(!JourneyStatus::Deviated.is_terminal());
        assert!(!JourneyStatus::AlertTriggered.is_terminal());
    }
}
