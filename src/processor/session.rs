//! One device session: applies device events and timer ticks, in arrival order, to the
//! journey monitor, trigger detector and zone scorer, and dispatches what they raise.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::alerts::dispatcher::{AlertDispatcher, DispatchError, EmergencyReport};
use crate::db::{JourneyStore, StoreError};
use crate::geo::Coordinate;
use crate::location::{LastKnownLocation, LocatedFix};
use crate::models::contact::TrustedContact;
use crate::models::emergency::EmergencyType;
use crate::models::journey::{Journey, JourneyPlan, PositionFix, StopReason};
use crate::models::message::{parse_timestamp, DeviceEvent};
use crate::models::zone::{ZoneId, DEFAULT_RADIUS_METERS};
use crate::monitor::{FixOutcome, FixReport, JourneyMonitor, MonitorError};
use crate::trigger::{TriggerDetector, TriggerOutcome};
use crate::zones::{ZoneError, ZoneScorer};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Monitor(#[from] MonitorError),
    #[error(transparent)]
    Zone(#[from] ZoneError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("no journey in progress")]
    NoActiveJourney,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub fix_max_age: Duration,
    /// Age after which calculated zones without news are dropped.
    pub zone_retention: Duration,
    pub journey_retention: Duration,
    pub event_retention: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            fix_max_age: Duration::minutes(5),
            zone_retention: Duration::days(180),
            journey_retention: Duration::days(30),
            event_retention: Duration::days(90),
        }
    }
}

pub struct Session {
    device_id: String,
    monitor: JourneyMonitor,
    detector: TriggerDetector,
    zones: Arc<ZoneScorer>,
    dispatcher: AlertDispatcher,
    journeys: Arc<dyn JourneyStore>,
    location: LastKnownLocation,
    volume_level: Option<i32>,
    /// Dangerous zones already announced during the current journey.
    warned_zones: HashSet<ZoneId>,
    settings: SessionSettings,
}

impl Session {
    pub fn new(
        monitor: JourneyMonitor,
        detector: TriggerDetector,
        zones: Arc<ZoneScorer>,
        dispatcher: AlertDispatcher,
        journeys: Arc<dyn JourneyStore>,
        device_id: &str,
        settings: SessionSettings,
    ) -> Self {
        Self {
            device_id: device_id.to_string(),
            monitor,
            detector,
            zones,
            dispatcher,
            journeys,
            location: LastKnownLocation::new(settings.fix_max_age),
            volume_level: None,
            warned_zones: HashSet::new(),
            settings,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn active_journey(&self) -> Option<&Journey> {
        self.monitor.active()
    }

    /// Picks up a journey left in progress by a previous run.
    pub async fn restore(&mut self) -> Result<Option<Uuid>, SessionError> {
        let Some(journey) = self.journeys.active_journey(&self.device_id).await? else {
            return Ok(None);
        };
        let track = self.journeys.points_for_journey(journey.journey_id).await?;
        if let Some(last) = track.last() {
            self.location.update(LocatedFix {
                coordinate: last.coordinate,
                accuracy: Some(last.accuracy),
                captured_at: last.timestamp,
            });
        }
        let journey_id = journey.journey_id;
        self.monitor.resume(journey, track)?;
        Ok(Some(journey_id))
    }

    pub async fn handle(&mut self, event: DeviceEvent, received_at: DateTime<Utc>) -> Result<(), SessionError> {
        let at = |raw: Option<String>| {
            raw.as_deref()
                .and_then(parse_timestamp)
                .unwrap_or(received_at)
        };

        match event {
            DeviceEvent::StartJourney {
                start_lat,
                start_lng,
                dest_lat,
                dest_lng,
                start_address,
                dest_address,
                expected_minutes,
                timestamp,
            } => {
                let mut plan = JourneyPlan::new(
                    Coordinate::new(start_lat, start_lng),
                    Coordinate::new(dest_lat, dest_lng),
                );
                plan.start_address = start_address;
                plan.destination_address = dest_address;
                plan.expected_duration_minutes = expected_minutes;
                self.start_journey(plan, at(timestamp)).await?;
            }
            DeviceEvent::StopJourney {
                journey_id,
                reason,
                timestamp,
            } => {
                self.stop_journey(journey_id, reason, at(timestamp)).await?;
            }
            DeviceEvent::CompleteJourney { journey_id, timestamp } => {
                self.stop_journey(journey_id, StopReason::Completed, at(timestamp))
                    .await?;
            }
            DeviceEvent::PositionFix {
                latitude,
                longitude,
                accuracy,
                speed,
                bearing,
                battery_level,
                timestamp,
            } => {
                let fix = LocatedFix {
                    coordinate: Coordinate::new(latitude, longitude),
                    accuracy,
                    captured_at: at(timestamp),
                };
                let battery = battery_level.map(|b| b.round() as i16);
                self.position_fix(fix, speed, bearing, battery).await?;
            }
            DeviceEvent::VolumeLevel { level } => {
                self.volume_level = Some(level.round() as i32);
            }
            DeviceEvent::Panic { timestamp } => {
                self.panic(EmergencyType::ManualTrigger, at(timestamp)).await?;
            }
            DeviceEvent::ReportIncident { lat, lng, timestamp } => {
                let spot = Coordinate::new(lat, lng);
                let zone_id = self.zones.record_incident(&spot, at(timestamp)).await?;
                let radius = self.zones.search_radius_km();
                let score = self.zones.score_near(&spot, radius).await?;
                info!(zone_id, score, "Incident reported");
            }
            DeviceEvent::CreateSafeZone {
                name,
                lat,
                lng,
                radius_meters,
                address,
            } => {
                self.zones
                    .create_user_zone(
                        &name,
                        Coordinate::new(lat, lng),
                        radius_meters.unwrap_or(DEFAULT_RADIUS_METERS),
                        address,
                        received_at,
                    )
                    .await?;
            }
            DeviceEvent::ResolveEmergency { event_id } => {
                self.dispatcher.resolve_emergency(event_id, received_at).await?;
            }
            DeviceEvent::AddContact {
                name,
                phone_number,
                relationship,
                priority,
                receive_sms,
            } => {
                let contact = TrustedContact {
                    contact_id: 0,
                    name,
                    phone_number,
                    relationship,
                    priority: priority.unwrap_or(1),
                    receive_sms: receive_sms.unwrap_or(true),
                    is_active: true,
                    last_notified_at: None,
                };
                self.dispatcher.add_contact(contact).await?;
            }
            DeviceEvent::DeactivateContact { contact_id } => {
                self.dispatcher.deactivate_contact(contact_id).await?;
            }
        }
        Ok(())
    }

    pub async fn start_journey(&mut self, plan: JourneyPlan, at: DateTime<Utc>) -> Result<Journey, SessionError> {
        let checkpoint = self.monitor.checkpoint();
        let journey = self.monitor.start(plan, at)?;
        if let Err(e) = self.journeys.insert_journey(&journey).await {
            // Monitor and store must agree on what is in progress.
            self.monitor.rollback(checkpoint);
            return Err(e.into());
        }
        self.warned_zones.clear();

        if let Err(e) = self.dispatcher.journey_started(&journey).await {
            warn!(journey_id = %journey.journey_id, error = %e, "Journey start notification failed");
        }
        Ok(journey)
    }

    /// Stops the given journey, or the active one when no id is supplied.
    pub async fn stop_journey(
        &mut self,
        journey_id: Option<Uuid>,
        reason: StopReason,
        at: DateTime<Utc>,
    ) -> Result<Journey, SessionError> {
        let journey_id = match journey_id.or_else(|| self.monitor.active().map(|j| j.journey_id)) {
            Some(id) => id,
            None => return Err(SessionError::NoActiveJourney),
        };
        let checkpoint = self.monitor.checkpoint();
        let journey = match self.monitor.stop(journey_id, reason, at) {
            Ok(journey) => journey,
            Err(MonitorError::UnknownJourney(id)) => {
                // May have finished before a restart.
                return Err(match self.journeys.get_journey(id).await? {
                    Some(stored) if !stored.is_active() => MonitorError::JourneyNotActive(id),
                    _ => MonitorError::UnknownJourney(id),
                }
                .into());
            }
            Err(e) => return Err(e.into()),
        };
        if let Err(e) = self.journeys.update_journey(&journey).await {
            self.monitor.rollback(checkpoint);
            return Err(e.into());
        }
        self.warned_zones.clear();

        if reason == StopReason::Completed {
            if let Err(e) = self.dispatcher.journey_completed(&journey, at).await {
                warn!(journey_id = %journey.journey_id, error = %e, "Journey completion notification failed");
            }
        }
        Ok(journey)
    }

    /// Records the fix as the device's location and, during a journey, feeds the monitor.
    pub async fn position_fix(
        &mut self,
        fix: LocatedFix,
        speed: Option<f64>,
        bearing: Option<f64>,
        battery_level: Option<i16>,
    ) -> Result<Option<FixReport>, SessionError> {
        if !fix.coordinate.is_valid() {
            return Err(MonitorError::InvalidCoordinate {
                lat: fix.coordinate.lat,
                lng: fix.coordinate.lng,
            }
            .into());
        }
        self.location.update(fix);

        let Some(journey_id) = self.monitor.active().map(|j| j.journey_id) else {
            return Ok(None);
        };
        let point = PositionFix {
            journey_id,
            coordinate: fix.coordinate,
            accuracy: fix.accuracy.unwrap_or(0.0),
            speed,
            bearing,
            battery_level,
            timestamp: fix.captured_at,
        };

        let checkpoint = self.monitor.checkpoint();
        let report = self.monitor.on_position_fix(point.clone())?;
        if let Err(e) = self.persist_fix(&point, &report).await {
            // Undo the transition so the next fix raises it again.
            self.monitor.rollback(checkpoint);
            warn!(journey_id = %journey_id, outcome = ?report.outcome, error = %e, "Fix not persisted, rolled back");
            return Err(e.into());
        }

        let notified = match report.outcome {
            FixOutcome::Continue => Ok(Vec::new()),
            FixOutcome::Arrived => {
                self.warned_zones.clear();
                self.dispatcher.journey_completed(&report.journey, fix.captured_at).await
            }
            FixOutcome::Deviated => self.dispatcher.journey_deviated(&report.journey, &fix).await,
            FixOutcome::Stalled => {
                let minutes = self.monitor.config().stall_window.num_minutes();
                self.dispatcher.journey_stalled(&report.journey, &fix, minutes).await
            }
        };
        if let Err(e) = notified {
            warn!(journey_id = %journey_id, outcome = ?report.outcome, error = %e, "Journey alert failed");
        }

        if report.outcome != FixOutcome::Arrived {
            self.check_unsafe_zone(journey_id, &fix).await;
        }
        Ok(Some(report))
    }

    async fn persist_fix(&self, point: &PositionFix, report: &FixReport) -> Result<(), StoreError> {
        self.journeys.append_point(point).await?;
        if report.outcome != FixOutcome::Continue {
            self.journeys.update_journey(&report.journey).await?;
        }
        Ok(())
    }

    async fn check_unsafe_zone(&mut self, journey_id: Uuid, fix: &LocatedFix) {
        let radius = self.zones.search_radius_km();
        let zone = match self.zones.most_dangerous_near(&fix.coordinate, radius).await {
            Ok(Some(zone)) => zone,
            Ok(None) => return,
            Err(e) => {
                warn!(journey_id = %journey_id, error = %e, "Zone lookup failed, treating area as neutral");
                return;
            }
        };
        if !self.warned_zones.insert(zone.zone_id) {
            return;
        }

        info!(
            journey_id = %journey_id,
            zone_id = zone.zone_id,
            score = zone.safety_score,
            "Journey entered a dangerous zone"
        );
        if let Err(e) = self
            .dispatcher
            .unsafe_zone_entered(Some(journey_id), fix, zone.safety_score)
            .await
        {
            warn!(zone_id = zone.zone_id, error = %e, "Unsafe zone alert failed");
        }
    }

    pub async fn panic(&mut self, event_type: EmergencyType, at: DateTime<Utc>) -> Result<EmergencyReport, SessionError> {
        Ok(self
            .dispatcher
            .trigger_emergency(&self.location, event_type, at)
            .await?)
    }

    /// Samples the trigger detector with the most recent volume level.
    pub async fn tick(&mut self, now: Instant, wall_clock: DateTime<Utc>) -> Result<Option<EmergencyReport>, SessionError> {
        let Some(level) = self.volume_level else {
            return Ok(None);
        };
        match self.detector.sample(level, now) {
            TriggerOutcome::None => Ok(None),
            TriggerOutcome::Triggered(pattern) => {
                info!(device_id = %self.device_id, pattern = ?pattern, "Panic pattern detected");
                let report = self.panic(EmergencyType::VolumeButtonTrigger, wall_clock).await?;
                Ok(Some(report))
            }
        }
    }

    /// Prunes stale calculated zones, old finished journeys and old emergency events.
    pub async fn housekeeping(&self, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.zones
            .prune_calculated(now - self.settings.zone_retention)
            .await?;
        let journeys = self
            .journeys
            .delete_finished_before(now - self.settings.journey_retention)
            .await?;
        if journeys > 0 {
            info!(journeys, "Pruned finished journeys");
        }
        self.dispatcher
            .prune_events(now - self.settings.event_retention)
            .await?;
        Ok(())
    }

    /// Cancels the pending trigger and the active journey. Nothing fires afterwards.
    pub async fn shutdown(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.detector.reset();
        self.volume_level = None;
        if let Some(journey_id) = self.monitor.active().map(|j| j.journey_id) {
            let checkpoint = self.monitor.checkpoint();
            let journey = self.monitor.stop(journey_id, StopReason::Cancelled, now)?;
            if let Err(e) = self.journeys.update_journey(&journey).await {
                // Left in progress; the next run resumes it.
                self.monitor.rollback(checkpoint);
                return Err(e.into());
            }
        }
        info!(device_id = %self.device_id, "Session shut down");
        Ok(())
    }
}
