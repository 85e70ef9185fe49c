//! Sequencing of emergencies and journey notifications over the stores and sinks.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{sms, Alert, AlertKind, AlertSink};
use crate::db::{ContactStore, EmergencyStore, StoreError};
use crate::geo::Coordinate;
use crate::location::{LocatedFix, LocationError, LocationSource};
use crate::models::contact::TrustedContact;
use crate::models::emergency::{EmergencyEvent, EmergencyType};
use crate::models::journey::Journey;
use crate::models::zone::ZoneId;
use crate::zones::ZoneScorer;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("cannot locate device: {0}")]
    Location(#[from] LocationError),
    #[error("store failed: {0}")]
    Store(#[from] StoreError),
    #[error("emergency event {0} is not active")]
    EventNotActive(i64),
    #[error("unknown emergency event {0}")]
    UnknownEvent(i64),
    #[error("invalid phone number '{0}'")]
    InvalidPhone(String),
    #[error("unknown contact {0}")]
    UnknownContact(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmergencyReport {
    pub event_id: i64,
    pub location: Coordinate,
    pub notified: Vec<String>,
    /// Zone that absorbed the incident, if recording succeeded.
    pub incident_zone: Option<ZoneId>,
}

pub struct AlertDispatcher {
    device_id: String,
    contacts: Arc<dyn ContactStore>,
    events: Arc<dyn EmergencyStore>,
    zones: Arc<ZoneScorer>,
    sinks: Vec<Arc<dyn AlertSink>>,
}

impl AlertDispatcher {
    pub fn new(
        device_id: &str,
        contacts: Arc<dyn ContactStore>,
        events: Arc<dyn EmergencyStore>,
        zones: Arc<ZoneScorer>,
    ) -> Self {
        Self {
            device_id: device_id.to_string(),
            contacts,
            events,
            zones,
            sinks: Vec::new(),
        }
    }

    pub fn add_sink(&mut self, sink: Arc<dyn AlertSink>) {
        self.sinks.push(sink);
    }

    /// Locate, record, notify contacts, then feed the incident into zone scoring.
    pub async fn trigger_emergency(
        &self,
        location: &dyn LocationSource,
        event_type: EmergencyType,
        now: DateTime<Utc>,
    ) -> Result<EmergencyReport, DispatchError> {
        info!(device_id = %self.device_id, event_type = event_type.as_str(), "Triggering emergency");

        let fix = location.current_fix(now).map_err(|e| {
            error!(device_id = %self.device_id, error = %e, "Emergency without a usable location");
            e
        })?;

        let event = EmergencyEvent::new(&self.device_id, event_type, fix.coordinate, fix.accuracy, now);
        let event_id = self.events.insert_event(&event).await?;
        info!(event_id, lat = fix.coordinate.lat, lng = fix.coordinate.lng, "Emergency event created");

        let text = sms::emergency_text(&fix.coordinate, None);
        let notified = self
            .notify(AlertKind::Emergency, None, Some(fix.coordinate), text, now)
            .await?;
        if !notified.is_empty() {
            self.events.mark_sms_sent(event_id, &notified.join(",")).await?;
        }

        let incident_zone = match self.zones.record_incident(&fix.coordinate, now).await {
            Ok(zone_id) => Some(zone_id),
            Err(e) => {
                warn!(event_id, error = %e, "Incident not recorded in zone scores");
                None
            }
        };

        Ok(EmergencyReport {
            event_id,
            location: fix.coordinate,
            notified,
            incident_zone,
        })
    }

    pub async fn resolve_emergency(&self, event_id: i64, now: DateTime<Utc>) -> Result<(), DispatchError> {
        if !self.events.resolve_event(event_id, now).await? {
            return match self.events.get_event(event_id).await? {
                Some(_) => Err(DispatchError::EventNotActive(event_id)),
                None => Err(DispatchError::UnknownEvent(event_id)),
            };
        }
        info!(event_id, "Emergency resolved");
        Ok(())
    }

    /// Drops old emergency records; active ones are kept regardless of age.
    pub async fn prune_events(&self, before: DateTime<Utc>) -> Result<u64, DispatchError> {
        let removed = self.events.delete_events_before(before).await?;
        if removed > 0 {
            info!(removed, "Pruned old emergency events");
        }
        Ok(removed)
    }

    /// Stores a trusted contact with its number normalised.
    pub async fn add_contact(&self, mut contact: TrustedContact) -> Result<i64, DispatchError> {
        if !sms::is_valid_phone(&contact.phone_number) {
            warn!(name = %contact.name, "Rejected contact with invalid phone number");
            return Err(DispatchError::InvalidPhone(contact.phone_number));
        }
        contact.phone_number = sms::normalize_phone(&contact.phone_number);
        let contact_id = self.contacts.insert_contact(&contact).await?;
        info!(contact_id, priority = contact.priority, "Trusted contact added");
        Ok(contact_id)
    }

    pub async fn deactivate_contact(&self, contact_id: i64) -> Result<(), DispatchError> {
        if !self.contacts.set_contact_active(contact_id, false).await? {
            return Err(DispatchError::UnknownContact(contact_id));
        }
        info!(contact_id, "Trusted contact deactivated");
        Ok(())
    }

    pub async fn journey_started(&self, journey: &Journey) -> Result<Vec<String>, DispatchError> {
        let text = sms::journey_start_text(
            journey.start_address.as_deref(),
            journey.destination_address.as_deref(),
            journey.expected_duration_minutes,
        );
        self.notify(
            AlertKind::JourneyStarted,
            Some(journey.journey_id),
            Some(journey.origin),
            text,
            journey.start_time,
        )
        .await
    }

    pub async fn journey_completed(&self, journey: &Journey, now: DateTime<Utc>) -> Result<Vec<String>, DispatchError> {
        let text = sms::journey_complete_text(journey.destination_address.as_deref());
        self.notify(
            AlertKind::JourneyCompleted,
            Some(journey.journey_id),
            Some(journey.destination),
            text,
            now,
        )
        .await
    }

    pub async fn journey_deviated(&self, journey: &Journey, fix: &LocatedFix) -> Result<Vec<String>, DispatchError> {
        self.record_event(EmergencyType::SafeJourneyAlert, fix).await?;
        let text = sms::deviation_text(&fix.coordinate);
        self.notify(
            AlertKind::JourneyDeviated,
            Some(journey.journey_id),
            Some(fix.coordinate),
            text,
            fix.captured_at,
        )
        .await
    }

    pub async fn journey_stalled(
        &self,
        journey: &Journey,
        fix: &LocatedFix,
        stopped_minutes: i64,
    ) -> Result<Vec<String>, DispatchError> {
        self.record_event(EmergencyType::SafeJourneyAlert, fix).await?;
        let text = sms::stopped_text(&fix.coordinate, stopped_minutes);
        self.notify(
            AlertKind::JourneyStopped,
            Some(journey.journey_id),
            Some(fix.coordinate),
            text,
            fix.captured_at,
        )
        .await
    }

    pub async fn unsafe_zone_entered(
        &self,
        journey_id: Option<Uuid>,
        fix: &LocatedFix,
        score: i32,
    ) -> Result<Vec<String>, DispatchError> {
        self.record_event(EmergencyType::UnsafeZoneEntry, fix).await?;
        let text = sms::unsafe_zone_text(&fix.coordinate, score);
        self.notify(
            AlertKind::UnsafeZoneEntry,
            journey_id,
            Some(fix.coordinate),
            text,
            fix.captured_at,
        )
        .await
    }

    async fn record_event(&self, event_type: EmergencyType, fix: &LocatedFix) -> Result<i64, DispatchError> {
        let event = EmergencyEvent::new(
            &self.device_id,
            event_type,
            fix.coordinate,
            fix.accuracy,
            fix.captured_at,
        );
        Ok(self.events.insert_event(&event).await?)
    }

    async fn recipients(&self) -> Result<Vec<TrustedContact>, DispatchError> {
        let contacts = self.contacts.sms_contacts().await?;
        Ok(contacts
            .into_iter()
            .filter(|c| {
                let valid = sms::is_valid_phone(&c.phone_number);
                if !valid {
                    warn!(contact_id = c.contact_id, "Skipping contact with invalid phone number");
                }
                valid
            })
            .collect())
    }

    /// Sends one alert to every contact through all sinks; returns the numbers reached.
    async fn notify(
        &self,
        kind: AlertKind,
        journey_id: Option<Uuid>,
        location: Option<Coordinate>,
        text: String,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, DispatchError> {
        let contacts = self.recipients().await?;
        if contacts.is_empty() {
            warn!(device_id = %self.device_id, kind = ?kind, "No trusted contacts configured");
            return Ok(Vec::new());
        }

        let alert = Alert {
            alert_id: Uuid::new_v4(),
            device_id: self.device_id.clone(),
            kind,
            journey_id,
            location,
            occurred_at: now,
            text,
            recipients: contacts.iter().map(|c| sms::normalize_phone(&c.phone_number)).collect(),
        };

        if self.deliver(&alert).await == 0 {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = contacts.iter().map(|c| c.contact_id).collect();
        self.contacts.mark_notified(&ids, now).await?;
        Ok(alert.recipients)
    }

    /// Fans the alert out to every sink; returns how many accepted it.
    async fn deliver(&self, alert: &Alert) -> usize {
        let results = join_all(self.sinks.iter().map(|sink| sink.deliver(alert))).await;

        let mut delivered = 0;
        for (sink, result) in self.sinks.iter().zip(results) {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => warn!(
                    alert_id = %alert.alert_id,
                    sink = sink.name(),
                    error = %e,
                    "Sink failed to deliver alert"
                ),
            }
        }
        debug!(alert_id = %alert.alert_id, delivered, sinks = self.sinks.len(), "Alert dispatched");
        delivered
    }
}
