use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::geo::Coordinate;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocatedFix {
    pub coordinate: Coordinate,
    pub accuracy: Option<f64>,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Error, PartialEq)]
pub enum LocationError {
    #[error("no position fix available")]
    NoFixAvailable,
    #[error("last position fix is {age_secs}s old")]
    Stale { age_secs: i64 },
}

/// Where the dispatcher gets "the current position" from.
pub trait LocationSource: Send + Sync {
    fn current_fix(&self, now: DateTime<Utc>) -> Result<LocatedFix, LocationError>;
}

/// Latest fix reported by the device, rejected once older than `max_age`.
#[derive(Debug, Clone)]
pub struct LastKnownLocation {
    max_age: Duration,
    latest: Option<LocatedFix>,
}

impl LastKnownLocation {
    pub fn new(max_age: Duration) -> Self {
        Self { max_age, latest: None }
    }

    /// Keeps the newest fix; late arrivals are ignored.
    pub fn update(&mut self, fix: LocatedFix) {
        match &self.latest {
            Some(current) if current.captured_at > fix.captured_at => {}
            _ => self.latest = Some(fix),
        }
    }

    #[cfg(test)]
    pub fn latest(&self) -> Option<&LocatedFix> {
        self.latest.as_ref()
    }
}

impl LocationSource for LastKnownLocation {
    fn current_fix(&self, now: DateTime<Utc>) -> Result<LocatedFix, LocationError> {
        let fix = self.latest.ok_or(LocationError::NoFixAvailable)?;
        let age = now - fix.captured_at;
        if age > self.max_age {
            return Err(LocationError::Stale {
                age_secs: age.num_seconds(),
            });
        }
        Ok(fix)
    }
}
