use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{queries, ContactStore, DbPool, EmergencyStore, JourneyStore, StoreError, ZoneStore};
use crate::geo::BoundingBox;
use crate::models::contact::TrustedContact;
use crate::models::emergency::{EmergencyEvent, EmergencyEventRow};
use crate::models::journey::{Journey, JourneyPointRow, JourneyRow, PositionFix};
use crate::models::zone::{SafeZone, SafeZoneRow, ZoneId};

/// Postgres-backed implementation of every store trait.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn zones_from_rows(rows: Vec<SafeZoneRow>) -> Result<Vec<SafeZone>, StoreError> {
    rows.into_iter()
        .map(|row| SafeZone::try_from(row).map_err(StoreError::Corrupt))
        .collect()
}

#[async_trait]
impl JourneyStore for PgStore {
    async fn insert_journey(&self, journey: &Journey) -> Result<(), StoreError> {
        sqlx::query(queries::INSERT_JOURNEY)
            .bind(journey.journey_id)
            .bind(&journey.device_id)
            .bind(journey.origin.lat)
            .bind(journey.origin.lng)
            .bind(journey.destination.lat)
            .bind(journey.destination.lng)
            .bind(&journey.start_address)
            .bind(&journey.destination_address)
            .bind(journey.expected_duration_minutes)
            .bind(journey.start_time)
            .bind(journey.status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_journey(&self, journey: &Journey) -> Result<(), StoreError> {
        sqlx::query(queries::UPDATE_JOURNEY)
            .bind(journey.journey_id)
            .bind(journey.end_time)
            .bind(journey.actual_duration_minutes)
            .bind(journey.status.as_str())
            .bind(journey.has_deviation_alert)
            .bind(journey.has_stopped_alert)
            .bind(journey.alert_time)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_journey(&self, journey_id: Uuid) -> Result<Option<Journey>, StoreError> {
        let row = sqlx::query_as::<_, JourneyRow>(queries::SELECT_JOURNEY)
            .bind(journey_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Journey::try_from(r).map_err(StoreError::Corrupt))
            .transpose()
    }

    async fn active_journey(&self, device_id: &str) -> Result<Option<Journey>, StoreError> {
        let row = sqlx::query_as::<_, JourneyRow>(queries::SELECT_ACTIVE_JOURNEY)
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Journey::try_from(r).map_err(StoreError::Corrupt))
            .transpose()
    }

    async fn append_point(&self, fix: &PositionFix) -> Result<i64, StoreError> {
        let point_id: i64 = sqlx::query_scalar(queries::INSERT_JOURNEY_POINT)
            .bind(fix.journey_id)
            .bind(fix.coordinate.lat)
            .bind(fix.coordinate.lng)
            .bind(fix.accuracy)
            .bind(fix.speed)
            .bind(fix.bearing)
            .bind(fix.battery_level)
            .bind(fix.timestamp)
            .fetch_one(&self.pool)
            .await?;
        Ok(point_id)
    }

    async fn points_for_journey(&self, journey_id: Uuid) -> Result<Vec<PositionFix>, StoreError> {
        let rows = sqlx::query_as::<_, JourneyPointRow>(queries::SELECT_JOURNEY_POINTS)
            .bind(journey_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(PositionFix::from).collect())
    }

    async fn delete_finished_before(&self, before: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(queries::DELETE_FINISHED_JOURNEYS)
            .bind(before)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ZoneStore for PgStore {
    async fn zones_in_bounds(&self, bbox: &BoundingBox) -> Result<Vec<SafeZone>, StoreError> {
        let rows = sqlx::query_as::<_, SafeZoneRow>(queries::SELECT_ZONES_IN_BOUNDS)
            .bind(bbox.min_lat)
            .bind(bbox.max_lat)
            .bind(bbox.min_lng)
            .bind(bbox.max_lng)
            .fetch_all(&self.pool)
            .await?;
        zones_from_rows(rows)
    }

    async fn insert_zone(&self, zone: &SafeZone) -> Result<ZoneId, StoreError> {
        let zone_id: i64 = sqlx::query_scalar(queries::INSERT_ZONE)
            .bind(zone.center.lat)
            .bind(zone.center.lng)
            .bind(zone.radius_meters)
            .bind(&zone.name)
            .bind(&zone.address)
            .bind(zone.safety_score)
            .bind(zone.incident_count)
            .bind(zone.last_incident_at)
            .bind(zone.class.as_str())
            .bind(zone.is_user_defined)
            .bind(zone.created_at)
            .bind(zone.updated_at)
            .fetch_one(&self.pool)
            .await?;
        Ok(zone_id)
    }

    async fn update_zone(&self, zone: &SafeZone) -> Result<(), StoreError> {
        sqlx::query(queries::UPDATE_ZONE)
            .bind(zone.zone_id)
            .bind(zone.safety_score)
            .bind(zone.incident_count)
            .bind(zone.last_incident_at)
            .bind(zone.class.as_str())
            .bind(zone.updated_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn zones_below_score(&self, score: i32) -> Result<Vec<SafeZone>, StoreError> {
        let rows = sqlx::query_as::<_, SafeZoneRow>(queries::SELECT_ZONES_BELOW_SCORE)
            .bind(score)
            .fetch_all(&self.pool)
            .await?;
        zones_from_rows(rows)
    }

    async fn delete_calculated_before(&self, before: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(queries::DELETE_OLD_CALCULATED_ZONES)
            .bind(before)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ContactStore for PgStore {
    async fn sms_contacts(&self) -> Result<Vec<TrustedContact>, StoreError> {
        let contacts = sqlx::query_as::<_, TrustedContact>(queries::SELECT_SMS_CONTACTS)
            .fetch_all(&self.pool)
            .await?;
        Ok(contacts)
    }

    async fn mark_notified(&self, contact_ids: &[i64], at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(queries::UPDATE_CONTACTS_NOTIFIED)
            .bind(contact_ids.to_vec())
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_contact(&self, contact: &TrustedContact) -> Result<i64, StoreError> {
        let contact_id: i64 = sqlx::query_scalar(queries::INSERT_CONTACT)
            .bind(&contact.name)
            .bind(&contact.phone_number)
            .bind(&contact.relationship)
            .bind(contact.priority)
            .bind(contact.receive_sms)
            .bind(contact.is_active)
            .fetch_one(&self.pool)
            .await?;
        Ok(contact_id)
    }

    async fn set_contact_active(&self, contact_id: i64, active: bool) -> Result<bool, StoreError> {
        let result = sqlx::query(queries::UPDATE_CONTACT_ACTIVE)
            .bind(contact_id)
            .bind(active)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl EmergencyStore for PgStore {
    async fn insert_event(&self, event: &EmergencyEvent) -> Result<i64, StoreError> {
        let event_id: i64 = sqlx::query_scalar(queries::INSERT_EMERGENCY_EVENT)
            .bind(&event.device_id)
            .bind(event.timestamp)
            .bind(event.location.lat)
            .bind(event.location.lng)
            .bind(event.accuracy)
            .bind(event.event_type.as_str())
            .bind(event.status.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(event_id)
    }

    async fn get_event(&self, event_id: i64) -> Result<Option<EmergencyEvent>, StoreError> {
        let row = sqlx::query_as::<_, EmergencyEventRow>(queries::SELECT_EMERGENCY_EVENT)
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| EmergencyEvent::try_from(r).map_err(StoreError::Corrupt))
            .transpose()
    }

    async fn mark_sms_sent(&self, event_id: i64, recipients: &str) -> Result<(), StoreError> {
        sqlx::query(queries::UPDATE_EMERGENCY_SMS_SENT)
            .bind(event_id)
            .bind(recipients)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn resolve_event(&self, event_id: i64, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query(queries::RESOLVE_EMERGENCY_EVENT)
            .bind(event_id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_events_before(&self, before: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(queries::DELETE_OLD_EMERGENCY_EVENTS)
            .bind(before)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
