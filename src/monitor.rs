//! Safe-journey monitor.
//!
//! Owns at most one active journey and turns position fixes into arrival, deviation and
//! stall outcomes. Pure state machine: timestamps come from the fixes, persistence and
//! alerting are the caller's business.
//!
//! Known limitation: stall detection is driven by fixes only. If the fix source goes
//! silent the monitor does not notice.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::journey::{Journey, JourneyPlan, JourneyStatus, PositionFix, StopReason};

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub arrival_radius_meters: f64,
    /// Movement between consecutive fixes below this counts as standing still.
    pub min_movement_meters: f64,
    pub stall_window: Duration,
    pub deviation_threshold_meters: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            arrival_radius_meters: 50.0,
            min_movement_meters: 10.0,
            stall_window: Duration::minutes(5),
            deviation_threshold_meters: 500.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixOutcome {
    Continue,
    Arrived,
    Deviated,
    Stalled,
}

#[derive(Debug, Clone)]
pub struct FixReport {
    pub outcome: FixOutcome,
    pub distance_to_destination: f64,
    /// Journey state after the fix was applied.
    pub journey: Journey,
}

#[derive(Debug, Error, PartialEq)]
pub enum MonitorError {
    #[error("journey {0} is already in progress")]
    JourneyAlreadyActive(Uuid),
    #[error("unknown journey {0}")]
    UnknownJourney(Uuid),
    #[error("journey {0} is no longer active")]
    JourneyNotActive(Uuid),
    #[error("fix at {fix} is older than the previous fix at {last}")]
    OutOfOrderFix {
        fix: DateTime<Utc>,
        last: DateTime<Utc>,
    },
    #[error("invalid coordinate ({lat}, {lng})")]
    InvalidCoordinate { lat: f64, lng: f64 },
}

#[derive(Debug, Clone)]
struct ActiveJourney {
    journey: Journey,
    track: Vec<PositionFix>,
    last_movement_at: Option<DateTime<Utc>>,
    /// Set while continuously stalled; cleared by movement.
    stalled: bool,
    closest_distance: f64,
}

impl ActiveJourney {
    fn new(journey: Journey) -> Self {
        let closest_distance = journey.origin.distance_to(&journey.destination);
        Self {
            journey,
            track: Vec::new(),
            last_movement_at: None,
            stalled: false,
            closest_distance,
        }
    }
}

/// Monitor state captured before a transition, restored when the caller cannot persist it.
#[derive(Debug, Clone)]
pub struct MonitorCheckpoint {
    active: Option<ActiveJourney>,
    last_finished: Option<Uuid>,
}

pub struct JourneyMonitor {
    config: MonitorConfig,
    device_id: String,
    active: Option<ActiveJourney>,
    last_finished: Option<Uuid>,
}

impl JourneyMonitor {
    pub fn new(device_id: &str, config: MonitorConfig) -> Self {
        Self {
            config,
            device_id: device_id.to_string(),
            active: None,
            last_finished: None,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn active(&self) -> Option<&Journey> {
        self.active.as_ref().map(|a| &a.journey)
    }

    pub fn track(&self) -> &[PositionFix] {
        self.active.as_ref().map(|a| a.track.as_slice()).unwrap_or(&[])
    }

    pub fn checkpoint(&self) -> MonitorCheckpoint {
        MonitorCheckpoint {
            active: self.active.clone(),
            last_finished: self.last_finished,
        }
    }

    pub fn rollback(&mut self, checkpoint: MonitorCheckpoint) {
        if let Some(active) = &checkpoint.active {
            debug!(journey_id = %active.journey.journey_id, "Monitor rolled back");
        }
        self.active = checkpoint.active;
        self.last_finished = checkpoint.last_finished;
    }

    pub fn start(&mut self, plan: JourneyPlan, started_at: DateTime<Utc>) -> Result<Journey, MonitorError> {
        if let Some(active) = &self.active {
            return Err(MonitorError::JourneyAlreadyActive(active.journey.journey_id));
        }
        for point in [plan.origin, plan.destination] {
            if !point.is_valid() {
                return Err(MonitorError::InvalidCoordinate {
                    lat: point.lat,
                    lng: point.lng,
                });
            }
        }

        let journey = Journey {
            journey_id: Uuid::new_v4(),
            device_id: self.device_id.clone(),
            origin: plan.origin,
            destination: plan.destination,
            start_address: plan.start_address,
            destination_address: plan.destination_address,
            expected_duration_minutes: plan.expected_duration_minutes,
            start_time: started_at,
            end_time: None,
            actual_duration_minutes: None,
            status: JourneyStatus::InProgress,
            has_deviation_alert: false,
            has_stopped_alert: false,
            alert_time: None,
        };

        info!(
            journey_id = %journey.journey_id,
            "Journey started ({}, {}) -> ({}, {})",
            journey.origin.lat, journey.origin.lng, journey.destination.lat, journey.destination.lng
        );
        self.active = Some(ActiveJourney::new(journey.clone()));
        Ok(journey)
    }

    /// Re-attaches a journey that was in progress before a restart.
    pub fn resume(&mut self, journey: Journey, track: Vec<PositionFix>) -> Result<(), MonitorError> {
        if let Some(active) = &self.active {
            return Err(MonitorError::JourneyAlreadyActive(active.journey.journey_id));
        }
        if !journey.is_active() {
            return Err(MonitorError::JourneyNotActive(journey.journey_id));
        }

        let mut active = ActiveJourney::new(journey);
        for fix in &track {
            let distance = fix.coordinate.distance_to(&active.journey.destination);
            active.closest_distance = active.closest_distance.min(distance);
        }

        // Replay the stall clock over the stored track.
        let mut last_movement_at = track.first().map(|f| f.timestamp);
        for pair in track.windows(2) {
            if pair[0].coordinate.distance_to(&pair[1].coordinate) >= self.config.min_movement_meters {
                last_movement_at = Some(pair[1].timestamp);
            }
        }
        let stalled_for = match (last_movement_at, track.last()) {
            (Some(since), Some(last)) => last.timestamp - since,
            _ => Duration::zero(),
        };
        active.last_movement_at = last_movement_at;
        // An alert raised during the current standstill stays latched until movement.
        active.stalled = active.journey.has_stopped_alert && stalled_for >= self.config.stall_window;
        active.track = track;

        info!(
            journey_id = %active.journey.journey_id,
            points = active.track.len(),
            stalled = active.stalled,
            "Journey resumed"
        );
        self.active = Some(active);
        Ok(())
    }

    pub fn on_position_fix(&mut self, fix: PositionFix) -> Result<FixReport, MonitorError> {
        let config = &self.config;
        let active = match self.active.as_mut() {
            Some(a) if a.journey.journey_id == fix.journey_id => a,
            _ if self.last_finished == Some(fix.journey_id) => {
                return Err(MonitorError::JourneyNotActive(fix.journey_id))
            }
            _ => return Err(MonitorError::UnknownJourney(fix.journey_id)),
        };

        if !fix.coordinate.is_valid() {
            return Err(MonitorError::InvalidCoordinate {
                lat: fix.coordinate.lat,
                lng: fix.coordinate.lng,
            });
        }
        let previous = active.track.last().cloned();
        if let Some(prev) = &previous {
            if fix.timestamp < prev.timestamp {
                return Err(MonitorError::OutOfOrderFix {
                    fix: fix.timestamp,
                    last: prev.timestamp,
                });
            }
        }

        let now = fix.timestamp;
        let distance = fix.coordinate.distance_to(&active.journey.destination);
        active.track.push(fix.clone());

        // Arrival wins over everything else.
        if distance <= config.arrival_radius_meters {
            info!(
                journey_id = %active.journey.journey_id,
                distance_m = distance,
                "Destination reached"
            );
            let journey = self
                .finish(StopReason::Completed, now)
                .ok_or(MonitorError::UnknownJourney(fix.journey_id))?;
            return Ok(FixReport {
                outcome: FixOutcome::Arrived,
                distance_to_destination: distance,
                journey,
            });
        }

        let mut outcome = FixOutcome::Continue;

        match &previous {
            None => active.last_movement_at = Some(now),
            Some(prev) => {
                let moved = prev.coordinate.distance_to(&fix.coordinate);
                if moved >= config.min_movement_meters {
                    active.last_movement_at = Some(now);
                    active.stalled = false;
                } else {
                    let since = active.last_movement_at.unwrap_or(prev.timestamp);
                    if !active.stalled && now - since >= config.stall_window {
                        active.stalled = true;
                        active.journey.has_stopped_alert = true;
                        active.journey.status = JourneyStatus::AlertTriggered;
                        active.journey.alert_time = Some(now);
                        outcome = FixOutcome::Stalled;
                        info!(
                            journey_id = %active.journey.journey_id,
                            stopped_secs = (now - since).num_seconds(),
                            "Journey stalled"
                        );
                    }
                }
            }
        }

        active.closest_distance = active.closest_distance.min(distance);

        if outcome == FixOutcome::Continue && !active.journey.has_deviation_alert {
            let off_path = distance - active.closest_distance > config.deviation_threshold_meters;
            let over_time = active
                .journey
                .expected_duration_minutes
                .map(|m| now - active.journey.start_time > Duration::minutes(m as i64))
                .unwrap_or(false);

            if off_path || over_time {
                active.journey.has_deviation_alert = true;
                active.journey.status = JourneyStatus::Deviated;
                active.journey.alert_time = Some(now);
                outcome = FixOutcome::Deviated;
                info!(
                    journey_id = %active.journey.journey_id,
                    distance_m = distance,
                    closest_m = active.closest_distance,
                    over_time,
                    "Journey deviated"
                );
            }
        }

        debug!(
            journey_id = %active.journey.journey_id,
            distance_m = distance,
            outcome = ?outcome,
            "Fix applied"
        );

        Ok(FixReport {
            outcome,
            distance_to_destination: distance,
            journey: active.journey.clone(),
        })
    }

    pub fn stop(
        &mut self,
        journey_id: Uuid,
        reason: StopReason,
        at: DateTime<Utc>,
    ) -> Result<Journey, MonitorError> {
        match &self.active {
            Some(a) if a.journey.journey_id == journey_id => self
                .finish(reason, at)
                .ok_or(MonitorError::UnknownJourney(journey_id)),
            _ if self.last_finished == Some(journey_id) => Err(MonitorError::JourneyNotActive(journey_id)),
            _ => Err(MonitorError::UnknownJourney(journey_id)),
        }
    }

    /// Ends the active journey, dropping all per-journey state.
    fn finish(&mut self, reason: StopReason, at: DateTime<Utc>) -> Option<Journey> {
        let mut journey = self.active.take()?.journey;
        journey.status = reason.into();
        journey.end_time = Some(at);
        journey.actual_duration_minutes = Some((at - journey.start_time).num_minutes() as i32);
        self.last_finished = Some(journey.journey_id);

        info!(
            journey_id = %journey.journey_id,
            status = %journey.status,
            minutes = journey.actual_duration_minutes,
            "Journey finished"
        );
        Some(journey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Coordinate;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_764_396_915 + secs, 0).unwrap()
    }

    fn fix(journey: &Journey, lat: f64, lng: f64, at: DateTime<Utc>) -> PositionFix {
        PositionFix {
            journey_id: journey.journey_id,
            coordinate: Coordinate::new(lat, lng),
            accuracy: 5.0,
            speed: None,
            bearing: None,
            battery_level: None,
            timestamp: at,
        }
    }

    fn monitor_with_journey(dest: Coordinate) -> (JourneyMonitor, Journey) {
        let mut monitor = JourneyMonitor::new("dev-1", MonitorConfig::default());
        let journey = monitor
            .start(JourneyPlan::new(Coordinate::new(0.0, 0.0), dest), t(0))
            .unwrap();
        (monitor, journey)
    }

    #[test]
    fn test_arrival_within_radius() {
        let (mut monitor, journey) = monitor_with_journey(Coordinate::new(0.0, 0.001));
        let report = monitor.on_position_fix(fix(&journey, 0.0, 0.0009, t(60))).unwrap();

        assert_eq!(report.outcome, FixOutcome::Arrived);
        assert!(report.distance_to_destination < 12.0);
        assert_eq!(report.journey.status, JourneyStatus::Completed);
        assert_eq!(report.journey.end_time, Some(t(60)));
        assert_eq!(report.journey.actual_duration_minutes, Some(1));
        assert!(monitor.active().is_none());
    }

    #[test]
    fn test_only_one_active_journey() {
        let (mut monitor, journey) = monitor_with_journey(Coordinate::new(0.0, 0.1));
        let err = monitor
            .start(JourneyPlan::new(Coordinate::new(1.0, 1.0), Coordinate::new(1.0, 1.1)), t(5))
            .unwrap_err();
        assert_eq!(err, MonitorError::JourneyAlreadyActive(journey.journey_id));

        monitor.stop(journey.journey_id, StopReason::Cancelled, t(10)).unwrap();
        assert!(monitor
            .start(JourneyPlan::new(Coordinate::new(1.0, 1.0), Coordinate::new(1.0, 1.1)), t(20))
            .is_ok());
    }

    #[test]
    fn test_stall_raised_once_while_stalled_and_rearmed_by_movement() {
        let (mut monitor, journey) = monitor_with_journey(Coordinate::new(0.0, 0.1));
        // first fix only sets the baseline
        assert_eq!(
            monitor.on_position_fix(fix(&journey, 0.0, 0.0, t(0))).unwrap().outcome,
            FixOutcome::Continue
        );

        let mut stalled = 0;
        for minute in 1..=15 {
            let report = monitor
                .on_position_fix(fix(&journey, 0.0, 0.00001, t(minute * 60)))
                .unwrap();
            if report.outcome == FixOutcome::Stalled {
                stalled += 1;
                assert_eq!(minute, 5);
                assert!(report.journey.has_stopped_alert);
                assert_eq!(report.journey.status, JourneyStatus::AlertTriggered);
            }
        }
        assert_eq!(stalled, 1);

        // ~111m of movement re-arms the latch
        assert_eq!(
            monitor.on_position_fix(fix(&journey, 0.0, 0.001, t(16 * 60))).unwrap().outcome,
            FixOutcome::Continue
        );
        let mut outcomes = Vec::new();
        for minute in 17..=22 {
            outcomes.push(
                monitor
                    .on_position_fix(fix(&journey, 0.0, 0.001, t(minute * 60)))
                    .unwrap()
                    .outcome,
            );
        }
        assert_eq!(
            outcomes.iter().filter(|o| **o == FixOutcome::Stalled).count(),
            1
        );
        assert_eq!(outcomes[4], FixOutcome::Stalled); // minute 21
    }

    #[test]
    fn test_arrival_wins_over_stall_and_deviation() {
        let (mut monitor, journey) = monitor_with_journey(Coordinate::new(0.0, 0.001));
        monitor.on_position_fix(fix(&journey, 0.0, 0.0, t(0))).unwrap();
        // stalled for ten minutes, then a jump straight into the arrival radius
        monitor.on_position_fix(fix(&journey, 0.0, 0.0, t(600))).unwrap();
        let report = monitor.on_position_fix(fix(&journey, 0.0, 0.001, t(601))).unwrap();
        assert_eq!(report.outcome, FixOutcome::Arrived);
    }

    #[test]
    fn test_deviation_by_distance_raised_once() {
        let (mut monitor, journey) = monitor_with_journey(Coordinate::new(0.0, 0.1));
        monitor.on_position_fix(fix(&journey, 0.0, 0.0, t(0))).unwrap();
        // heading away: ~555m further than the start point
        let report = monitor.on_position_fix(fix(&journey, 0.0, -0.005, t(60))).unwrap();
        assert_eq!(report.outcome, FixOutcome::Deviated);
        assert!(report.journey.has_deviation_alert);
        assert_eq!(report.journey.status, JourneyStatus::Deviated);

        let report = monitor.on_position_fix(fix(&journey, 0.0, -0.01, t(120))).unwrap();
        assert_eq!(report.outcome, FixOutcome::Continue);
    }

    #[test]
    fn test_deviation_by_time_budget() {
        let mut monitor = JourneyMonitor::new("dev-1", MonitorConfig::default());
        let mut plan = JourneyPlan::new(Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 0.1));
        plan.expected_duration_minutes = Some(10);
        let journey = monitor.start(plan, t(0)).unwrap();

        let report = monitor.on_position_fix(fix(&journey, 0.0, 0.01, t(9 * 60))).unwrap();
        assert_eq!(report.outcome, FixOutcome::Continue);
        let report = monitor.on_position_fix(fix(&journey, 0.0, 0.02, t(11 * 60))).unwrap();
        assert_eq!(report.outcome, FixOutcome::Deviated);
    }

    #[test]
    fn test_fixes_for_other_or_finished_journeys_are_rejected() {
        let (mut monitor, journey) = monitor_with_journey(Coordinate::new(0.0, 0.1));
        let mut stray = fix(&journey, 0.0, 0.0, t(1));
        stray.journey_id = Uuid::new_v4();
        assert_eq!(
            monitor.on_position_fix(stray.clone()).unwrap_err(),
            MonitorError::UnknownJourney(stray.journey_id)
        );

        monitor.stop(journey.journey_id, StopReason::Cancelled, t(2)).unwrap();
        assert_eq!(
            monitor.on_position_fix(fix(&journey, 0.0, 0.0, t(3))).unwrap_err(),
            MonitorError::JourneyNotActive(journey.journey_id)
        );
        assert_eq!(
            monitor.stop(journey.journey_id, StopReason::Completed, t(4)).unwrap_err(),
            MonitorError::JourneyNotActive(journey.journey_id)
        );
    }

    #[test]
    fn test_out_of_order_fix_is_rejected() {
        let (mut monitor, journey) = monitor_with_journey(Coordinate::new(0.0, 0.1));
        monitor.on_position_fix(fix(&journey, 0.0, 0.0, t(100))).unwrap();
        assert!(matches!(
            monitor.on_position_fix(fix(&journey, 0.0, 0.0, t(50))),
            Err(MonitorError::OutOfOrderFix { .. })
        ));
        assert_eq!(monitor.track().len(), 1);
    }

    #[test]
    fn test_resume_restores_track_and_closest_distance() {
        let (mut first, journey) = monitor_with_journey(Coordinate::new(0.0, 0.1));
        first.on_position_fix(fix(&journey, 0.0, 0.05, t(60))).unwrap();
        let track = first.track().to_vec();
        let snapshot = first.active().cloned().unwrap();

        let mut monitor = JourneyMonitor::new("dev-1", MonitorConfig::default());
        monitor.resume(snapshot, track).unwrap();
        assert_eq!(monitor.track().len(), 1);
        // going back to the origin is more than 500m off the best distance so far
        let report = monitor.on_position_fix(fix(&journey, 0.0, 0.0, t(120))).unwrap();
        assert_eq!(report.outcome, FixOutcome::Deviated);
    }

    fn stalled_count(
        monitor: &mut JourneyMonitor,
        journey: &Journey,
        minutes: std::ops::RangeInclusive<i64>,
        lng: f64,
    ) -> usize {
        minutes
            .filter(|m| {
                monitor
                    .on_position_fix(fix(journey, 0.0, lng, t(m * 60)))
                    .unwrap()
                    .outcome
                    == FixOutcome::Stalled
            })
            .count()
    }

    #[test]
    fn test_resume_keeps_stall_latched_while_still_stopped() {
        let (mut first, journey) = monitor_with_journey(Coordinate::new(0.0, 0.1));
        assert_eq!(stalled_count(&mut first, &journey, 0..=7, 0.0), 1);
        let snapshot = first.active().cloned().unwrap();
        assert!(snapshot.has_stopped_alert);

        let mut monitor = JourneyMonitor::new("dev-1", MonitorConfig::default());
        monitor.resume(snapshot, first.track().to_vec()).unwrap();
        assert_eq!(stalled_count(&mut monitor, &journey, 8..=16, 0.0), 0);

        // moving off re-arms it as usual
        assert_eq!(stalled_count(&mut monitor, &journey, 17..=17, 0.001), 0);
        assert_eq!(stalled_count(&mut monitor, &journey, 18..=22, 0.001), 1);
    }

    #[test]
    fn test_resume_mid_standstill_keeps_the_stall_clock() {
        let (mut first, journey) = monitor_with_journey(Coordinate::new(0.0, 0.1));
        assert_eq!(stalled_count(&mut first, &journey, 0..=3, 0.0), 0);

        let mut monitor = JourneyMonitor::new("dev-1", MonitorConfig::default());
        monitor
            .resume(first.active().cloned().unwrap(), first.track().to_vec())
            .unwrap();
        let report = monitor.on_position_fix(fix(&journey, 0.0, 0.0, t(5 * 60))).unwrap();
        assert_eq!(report.outcome, FixOutcome::Stalled);
    }

    #[test]
    fn test_rollback_restores_finished_journey() {
        let (mut monitor, journey) = monitor_with_journey(Coordinate::new(0.0, 0.001));
        let checkpoint = monitor.checkpoint();
        let report = monitor.on_position_fix(fix(&journey, 0.0, 0.001, t(60))).unwrap();
        assert_eq!(report.outcome, FixOutcome::Arrived);
        assert!(monitor.active().is_none());

        monitor.rollback(checkpoint);
        assert_eq!(monitor.active().map(|j| j.journey_id), Some(journey.journey_id));
        assert!(monitor.track().is_empty());
        let report = monitor.on_position_fix(fix(&journey, 0.0, 0.001, t(61))).unwrap();
        assert_eq!(report.outcome, FixOutcome::Arrived);
    }
}
