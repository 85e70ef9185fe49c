//! Protobuf messages published on the alerts topic.

use prost::Message;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum AlertType {
    Unspecified = 0,
    Emergency = 1,
    JourneyStarted = 2,
    JourneyCompleted = 3,
    JourneyDeviated = 4,
    JourneyStopped = 5,
    UnsafeZoneEntry = 6,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AlertEnvelope {
    #[prost(string, tag = "1")]
    pub alert_id: String,
    #[prost(string, tag = "2")]
    pub device_id: String,
    #[prost(enumeration = "AlertType", tag = "3")]
    pub alert_type: i32,
    #[prost(string, optional, tag = "4")]
    pub journey_id: Option<String>,
    #[prost(double, optional, tag = "5")]
    pub latitude: Option<f64>,
    #[prost(double, optional, tag = "6")]
    pub longitude: Option<f64>,
    #[prost(int64, tag = "7")]
    pub occurred_at_ms: i64,
    #[prost(string, tag = "8")]
    pub text: String,
    #[prost(string, repeated, tag = "9")]
    pub recipients: Vec<String>,
}

impl AlertEnvelope {
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, prost::DecodeError> {
        Self::decode(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_survives_the_wire() {
        let envelope = AlertEnvelope {
            alert_id: "a1".to_string(),
            device_id: "0848086072".to_string(),
            alert_type: AlertType::JourneyStopped as i32,
            journey_id: Some("j1".to_string()),
            latitude: Some(20.652494),
            longitude: None,
            occurred_at_ms: 1_764_396_915_000,
            text: "stopped".to_string(),
            recipients: vec!["+5215512345678".to_string()],
        };

        let decoded = AlertEnvelope::from_bytes(&envelope.to_bytes()).unwrap();
        assert_eq!(decoded, envelope);
        assert_eq!(decoded.alert_type(), AlertType::JourneyStopped);
        assert_eq!(decoded.longitude, None);
    }

    #[test]
    fn test_garbage_does_not_decode() {
        assert!(AlertEnvelope::from_bytes(&[0xff, 0xff, 0xff]).is_err());
    }
}
