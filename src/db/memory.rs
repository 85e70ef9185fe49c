use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{ContactStore, EmergencyStore, JourneyStore, StoreError, ZoneStore};
use crate::geo::BoundingBox;
use crate::models::contact::TrustedContact;
use crate::models::emergency::{EmergencyEvent, EmergencyStatus};
use crate::models::journey::{Journey, PositionFix};
use crate::models::zone::{SafeZone, ZoneId};

#[derive(Default)]
struct Tables {
    journeys: HashMap<Uuid, Journey>,
    points: Vec<(i64, PositionFix)>,
    zones: Vec<SafeZone>,
    contacts: Vec<TrustedContact>,
    events: Vec<EmergencyEvent>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-process store for `STORAGE=memory` runs and tests. State is lost on exit.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail with `StoreError::Unavailable` until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub fn contacts(&self) -> Result<Vec<TrustedContact>, StoreError> {
        Ok(self.lock()?.contacts.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is offline".to_string()));
        }
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl JourneyStore for MemoryStore {
    async fn insert_journey(&self, journey: &Journey) -> Result<(), StoreError> {
        self.lock()?.journeys.insert(journey.journey_id, journey.clone());
        Ok(())
    }

    async fn update_journey(&self, journey: &Journey) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        if let Some(existing) = tables.journeys.get_mut(&journey.journey_id) {
            *existing = journey.clone();
        }
        Ok(())
    }

    async fn get_journey(&self, journey_id: Uuid) -> Result<Option<Journey>, StoreError> {
        Ok(self.lock()?.journeys.get(&journey_id).cloned())
    }

    async fn active_journey(&self, device_id: &str) -> Result<Option<Journey>, StoreError> {
        Ok(self
            .lock()?
            .journeys
            .values()
            .filter(|j| j.device_id == device_id && j.is_active())
            .max_by_key(|j| j.start_time)
            .cloned())
    }

    async fn append_point(&self, fix: &PositionFix) -> Result<i64, StoreError> {
        let mut tables = self.lock()?;
        let id = tables.next_id();
        tables.points.push((id, fix.clone()));
        Ok(id)
    }

    async fn points_for_journey(&self, journey_id: Uuid) -> Result<Vec<PositionFix>, StoreError> {
        let tables = self.lock()?;
        let mut points: Vec<&(i64, PositionFix)> = tables
            .points
            .iter()
            .filter(|(_, p)| p.journey_id == journey_id)
            .collect();
        points.sort_by_key(|(id, p)| (p.timestamp, *id));
        Ok(points.into_iter().map(|(_, p)| p.clone()).collect())
    }

    async fn delete_finished_before(&self, before: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut tables = self.lock()?;
        let doomed: Vec<Uuid> = tables
            .journeys
            .values()
            .filter(|j| j.start_time < before && !j.is_active())
            .map(|j| j.journey_id)
            .collect();
        for id in &doomed {
            tables.journeys.remove(id);
        }
        tables.points.retain(|(_, p)| !doomed.contains(&p.journey_id));
        Ok(doomed.len() as u64)
    }
}

#[async_trait]
impl ZoneStore for MemoryStore {
    async fn zones_in_bounds(&self, bbox: &BoundingBox) -> Result<Vec<SafeZone>, StoreError> {
        Ok(self
            .lock()?
            .zones
            .iter()
            .filter(|z| bbox.contains(&z.center))
            .cloned()
            .collect())
    }

    async fn insert_zone(&self, zone: &SafeZone) -> Result<ZoneId, StoreError> {
        let mut tables = self.lock()?;
        let mut zone = zone.clone();
        zone.zone_id = tables.next_id();
        let id = zone.zone_id;
        tables.zones.push(zone);
        Ok(id)
    }

    async fn update_zone(&self, zone: &SafeZone) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        if let Some(existing) = tables.zones.iter_mut().find(|z| z.zone_id == zone.zone_id) {
            existing.safety_score = zone.safety_score;
            existing.incident_count = zone.incident_count;
            existing.last_incident_at = zone.last_incident_at;
            existing.class = zone.class;
            existing.updated_at = zone.updated_at;
        }
        Ok(())
    }

    async fn zones_below_score(&self, score: i32) -> Result<Vec<SafeZone>, StoreError> {
        let mut zones: Vec<SafeZone> = self
            .lock()?
            .zones
            .iter()
            .filter(|z| z.safety_score < score)
            .cloned()
            .collect();
        zones.sort_by_key(|z| z.safety_score);
        Ok(zones)
    }

    async fn delete_calculated_before(&self, before: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut tables = self.lock()?;
        let count = tables.zones.len();
        tables
            .zones
            .retain(|z| z.is_user_defined || z.updated_at >= before);
        Ok((count - tables.zones.len()) as u64)
    }
}

#[async_trait]
impl ContactStore for MemoryStore {
    async fn sms_contacts(&self) -> Result<Vec<TrustedContact>, StoreError> {
        let mut contacts: Vec<TrustedContact> = self
            .lock()?
            .contacts
            .iter()
            .filter(|c| c.wants_sms())
            .cloned()
            .collect();
        contacts.sort_by_key(|c| (c.priority, c.contact_id));
        Ok(contacts)
    }

    async fn mark_notified(&self, contact_ids: &[i64], at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        for contact in tables.contacts.iter_mut() {
            if contact_ids.contains(&contact.contact_id) {
                contact.last_notified_at = Some(at);
            }
        }
        Ok(())
    }

    async fn insert_contact(&self, contact: &TrustedContact) -> Result<i64, StoreError> {
        let mut tables = self.lock()?;
        let mut contact = contact.clone();
        contact.contact_id = tables.next_id();
        let id = contact.contact_id;
        tables.contacts.push(contact);
        Ok(id)
    }

    async fn set_contact_active(&self, contact_id: i64, active: bool) -> Result<bool, StoreError> {
        let mut tables = self.lock()?;
        match tables.contacts.iter_mut().find(|c| c.contact_id == contact_id) {
            Some(contact) => {
                contact.is_active = active;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl EmergencyStore for MemoryStore {
    async fn insert_event(&self, event: &EmergencyEvent) -> Result<i64, StoreError> {
        let mut tables = self.lock()?;
        let mut event = event.clone();
        event.event_id = tables.next_id();
        let id = event.event_id;
        tables.events.push(event);
        Ok(id)
    }

    async fn get_event(&self, event_id: i64) -> Result<Option<EmergencyEvent>, StoreError> {
        Ok(self
            .lock()?
            .events
            .iter()
            .find(|e| e.event_id == event_id)
            .cloned())
    }

    async fn mark_sms_sent(&self, event_id: i64, recipients: &str) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        if let Some(event) = tables.events.iter_mut().find(|e| e.event_id == event_id) {
            event.sms_sent = true;
            event.sms_recipients = Some(recipients.to_string());
        }
        Ok(())
    }

    async fn resolve_event(&self, event_id: i64, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut tables = self.lock()?;
        match tables
            .events
            .iter_mut()
            .find(|e| e.event_id == event_id && e.status == EmergencyStatus::Active)
        {
            Some(event) => {
                event.status = EmergencyStatus::Resolved;
                event.resolved_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_events_before(&self, before: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut tables = self.lock()?;
        let count = tables.events.len();
        tables
            .events
            .retain(|e| e.status == EmergencyStatus::Active || e.timestamp >= before);
        Ok((count - tables.events.len()) as u64)
    }
}
