use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use uuid::Uuid;

use crate::models::journey::StopReason;

/// Envelope of every message a device publishes on the events topic.
#[derive(Debug, Deserialize)]
pub struct DeviceMessage {
    #[serde(rename = "DEVICE_ID", alias = "device_id")]
    pub device_id: Option<String>,
    pub uuid: Option<String>,
    #[serde(flatten)]
    pub event: DeviceEvent,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceEvent {
    StartJourney {
        #[serde(deserialize_with = "parse_f64")]
        start_lat: f64,
        #[serde(deserialize_with = "parse_f64")]
        start_lng: f64,
        #[serde(deserialize_with = "parse_f64")]
        dest_lat: f64,
        #[serde(deserialize_with = "parse_f64")]
        dest_lng: f64,
        start_address: Option<String>,
        dest_address: Option<String>,
        expected_minutes: Option<i32>,
        timestamp: Option<String>,
    },
    StopJourney {
        journey_id: Option<Uuid>,
        #[serde(default = "default_stop_reason")]
        reason: StopReason,
        timestamp: Option<String>,
    },
    CompleteJourney {
        journey_id: Option<Uuid>,
        timestamp: Option<String>,
    },
    PositionFix {
        #[serde(rename = "LATITUD", alias = "lat", deserialize_with = "parse_f64")]
        latitude: f64,
        #[serde(rename = "LONGITUD", alias = "lng", deserialize_with = "parse_f64")]
        longitude: f64,
        #[serde(default, deserialize_with = "parse_f64_option")]
        accuracy: Option<f64>,
        #[serde(rename = "SPEED", alias = "speed", default, deserialize_with = "parse_f64_option")]
        speed: Option<f64>,
        #[serde(rename = "COURSE", alias = "bearing", default, deserialize_with = "parse_f64_option")]
        bearing: Option<f64>,
        #[serde(default, deserialize_with = "parse_f64_option")]
        battery_level: Option<f64>,
        #[serde(rename = "GPS_DATETIME", alias = "timestamp")]
        timestamp: Option<String>,
    },
    VolumeLevel {
        #[serde(deserialize_with = "parse_f64")]
        level: f64,
    },
    Panic {
        timestamp: Option<String>,
    },
    ReportIncident {
        #[serde(deserialize_with = "parse_f64")]
        lat: f64,
        #[serde(deserialize_with = "parse_f64")]
        lng: f64,
        timestamp: Option<String>,
    },
    CreateSafeZone {
        name: String,
        #[serde(deserialize_with = "parse_f64")]
        lat: f64,
        #[serde(deserialize_with = "parse_f64")]
        lng: f64,
        #[serde(default, deserialize_with = "parse_f64_option")]
        radius_meters: Option<f64>,
        address: Option<String>,
    },
    ResolveEmergency {
        event_id: i64,
    },
    AddContact {
        name: String,
        phone_number: String,
        relationship: Option<String>,
        priority: Option<i32>,
        receive_sms: Option<bool>,
    },
    DeactivateContact {
        contact_id: i64,
    },
}

fn default_stop_reason() -> StopReason {
    StopReason::Cancelled
}

impl DeviceMessage {
    pub fn get_device_id(&self) -> Option<&String> {
        self.device_id.as_ref()
    }
}

impl DeviceEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DeviceEvent::StartJourney { .. } => "start_journey",
            DeviceEvent::StopJourney { .. } => "stop_journey",
            DeviceEvent::CompleteJourney { .. } => "complete_journey",
            DeviceEvent::PositionFix { .. } => "position_fix",
            DeviceEvent::VolumeLevel { .. } => "volume_level",
            DeviceEvent::Panic { .. } => "panic",
            DeviceEvent::ReportIncident { .. } => "report_incident",
            DeviceEvent::CreateSafeZone { .. } => "create_safe_zone",
            DeviceEvent::ResolveEmergency { .. } => "resolve_emergency",
            DeviceEvent::AddContact { .. } => "add_contact",
            DeviceEvent::DeactivateContact { .. } => "deactivate_contact",
        }
    }
}

/// Accepts RFC 3339, `%Y-%m-%d %H:%M:%S`, `%Y-%m-%dT%H:%M:%S` (UTC) or epoch seconds.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&t));
        }
    }
    raw.parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrFloat {
    String(String),
    Float(f64),
}

fn parse_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match StringOrFloat::deserialize(deserializer)? {
        StringOrFloat::Float(f) => Ok(f),
        StringOrFloat::String(s) => s.trim().parse::<f64>().map_err(serde::de::Error::custom),
    }
}

fn parse_f64_option<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v: Option<StringOrFloat> = Option::deserialize(deserializer)?;
    match v {
        Some(StringOrFloat::Float(f)) => Ok(Some(f)),
        Some(StringOrFloat::String(s)) => {
            if s.trim().is_empty() {
                Ok(None)
            } else {
                s.trim().parse::<f64>().map(Some).map_err(serde::de::Error::custom)
            }
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parsing_tracker_style_position_fix() {
        let payload = r#"
        {
            "type": "position_fix",
            "DEVICE_ID": "0848086072",
            "uuid": "d52b1454-d43d-50fa-99ca-79515c904162",
            "COURSE": "0.00",
            "GPS_DATETIME": "2025-11-29 06:15:15",
            "LATITUD": "+20.652494",
            "LONGITUD": "-100.391404",
            "SPEED": "",
            "accuracy": 12.5
        }
        "#;

        let msg: DeviceMessage = serde_json::from_str(payload).unwrap();
        assert_eq!(msg.get_device_id(), Some(&"0848086072".to_string()));
        match msg.event {
            DeviceEvent::PositionFix {
                latitude,
                longitude,
                accuracy,
                speed,
                bearing,
                timestamp,
                ..
            } => {
                assert_eq!(latitude, 20.652494);
                assert_eq!(longitude, -100.391404);
                assert_eq!(accuracy, Some(12.5));
                assert_eq!(speed, None);
                assert_eq!(bearing, Some(0.0));
                let ts = parse_timestamp(timestamp.as_deref().unwrap()).unwrap();
                assert_eq!(ts.to_rfc3339(), "2025-11-29T06:15:15+00:00");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_parsing_start_and_stop_journey() {
        let start = r#"{"type":"start_journey","device_id":"abc","start_lat":0,"start_lng":"0",
            "dest_lat":0.0,"dest_lng":"0.001","dest_address":"Home","expected_minutes":20}"#;
        let msg: DeviceMessage = serde_json::from_str(start).unwrap();
        assert_eq!(msg.event.name(), "start_journey");
        match msg.event {
            DeviceEvent::StartJourney { dest_lng, dest_address, expected_minutes, .. } => {
                assert_eq!(dest_lng, 0.001);
                assert_eq!(dest_address.as_deref(), Some("Home"));
                assert_eq!(expected_minutes, Some(20));
            }
            other => panic!("unexpected event {:?}", other),
        }

        let stop = r#"{"type":"stop_journey","device_id":"abc"}"#;
        let msg: DeviceMessage = serde_json::from_str(stop).unwrap();
        match msg.event {
            DeviceEvent::StopJourney { journey_id, reason, .. } => {
                assert_eq!(journey_id, None);
                assert_eq!(reason, StopReason::Cancelled);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let payload = r#"{"type":"self_destruct","device_id":"abc"}"#;
        assert!(serde_json::from_str::<DeviceMessage>(payload).is_err());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2025-11-29T06:15:15Z").is_some());
        assert!(parse_timestamp("2025-11-29T06:15:15").is_some());
        assert_eq!(
            parse_timestamp("1764396915").map(|t| t.timestamp()),
            Some(1764396915)
        );
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_parsing_contact_events() {
        let add: DeviceMessage = serde_json::from_str(
            r#"{"type":"add_contact","device_id":"dev-1","name":"Mother","phone_number":"5512345678","relationship":"Mother"}"#,
        )
        .unwrap();
        assert_eq!(add.event.name(), "add_contact");
        match add.event {
            DeviceEvent::AddContact {
                name,
                relationship,
                priority,
                receive_sms,
                ..
            } => {
                assert_eq!(name, "Mother");
                assert_eq!(relationship.as_deref(), Some("Mother"));
                assert_eq!(priority, None);
                assert_eq!(receive_sms, None);
            }
            other => panic!("unexpected event {:?}", other),
        }

        let deactivate: DeviceMessage =
            serde_json::from_str(r#"{"type":"deactivate_contact","device_id":"dev-1","contact_id":7}"#).unwrap();
        assert!(matches!(deactivate.event, DeviceEvent::DeactivateContact { contact_id: 7 }));
    }
}
