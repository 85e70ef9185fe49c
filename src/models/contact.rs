use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct TrustedContact {
    pub contact_id: i64,
    pub name: String,
    pub phone_number: String,
    pub relationship: Option<String>, // e.g. "Mother", "Friend", "Police"
    /// Lower number is notified first.
    pub priority: i32,
    pub receive_sms: bool,
    pub is_active: bool,
    pub last_notified_at: Option<DateTime<Utc>>,
}

impl TrustedContact {
    pub fn wants_sms(&self) -> bool {
        self.receive_sms && self.is_active
    }
}
