use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

use crate::geo::Coordinate;

pub type ZoneId = i64;

pub const MAX_SAFETY_SCORE: i32 = 100;
pub const DEFAULT_RADIUS_METERS: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneClass {
    Safe,
    Warning,
    Dangerous,
    Unknown,
    /// Derived from incident data, not yet classified.
    Calculated,
}

impl ZoneClass {
    /// Monotonic score → class mapping.
    pub fn from_score(score: i32) -> Self {
        match score {
            s if s >= 70 => ZoneClass::Safe,
            s if s >= 40 => ZoneClass::Warning,
            // Two bands, one label. Kept for compatibility with stored zones.
            s if s >= 20 => ZoneClass::Dangerous,
            _ => ZoneClass::Dangerous,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneClass::Safe => "safe",
            ZoneClass::Warning => "warning",
            ZoneClass::Dangerous => "dangerous",
            ZoneClass::Unknown => "unknown",
            ZoneClass::Calculated => "calculated",
        }
    }
}

impl fmt::Display for ZoneClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ZoneClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "safe" => Ok(ZoneClass::Safe),
            "warning" => Ok(ZoneClass::Warning),
            "dangerous" => Ok(ZoneClass::Dangerous),
            "unknown" => Ok(ZoneClass::Unknown),
            "calculated" => Ok(ZoneClass::Calculated),
            other => Err(format!("unknown zone class '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SafeZone {
    pub zone_id: ZoneId,
    pub center: Coordinate,
    pub radius_meters: f64,
    pub name: Option<String>,
    pub address: Option<String>,
    pub safety_score: i32, // 0 = very dangerous, 100 = very safe
    pub incident_count: i32,
    pub last_incident_at: Option<DateTime<Utc>>,
    pub class: ZoneClass,
    pub is_user_defined: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SafeZone {
    /// Zone seeded by a first incident at a spot with no zone nearby.
    pub fn from_incident(center: Coordinate, score: i32, at: DateTime<Utc>) -> Self {
        Self {
            zone_id: 0,
            center,
            radius_meters: DEFAULT_RADIUS_METERS,
            name: None,
            address: None,
            safety_score: score,
            incident_count: 1,
            last_incident_at: Some(at),
            class: ZoneClass::from_score(score),
            is_user_defined: false,
            created_at: at,
            updated_at: at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct SafeZoneRow {
    pub zone_id: i64, // bigserial
    pub lat: f64,
    pub lng: f64,
    pub radius_meters: f64,
    pub name: Option<String>,
    pub address: Option<String>,
    pub safety_score: i32,
    pub incident_count: i32,
    pub last_incident_at: Option<DateTime<Utc>>,
    pub zone_class: String,
    pub is_user_defined: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SafeZoneRow> for SafeZone {
    type Error = String;

    fn try_from(row: SafeZoneRow) -> Result<Self, Self::Error> {
        Ok(Self {
            zone_id: row.zone_id,
            center: Coordinate::new(row.lat, row.lng),
            radius_meters: row.radius_meters,
            name: row.name,
            address: row.address,
            safety_score: row.safety_score,
            incident_count: row.incident_count,
            last_incident_at: row.last_incident_at,
            class: row.zone_class.parse()?,
            is_user_defined: row.is_user_defined,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
