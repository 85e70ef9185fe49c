use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::geo::BoundingBox;
use crate::models::contact::TrustedContact;
use crate::models::emergency::EmergencyEvent;
use crate::models::journey::{Journey, PositionFix};
use crate::models::zone::{SafeZone, ZoneId};

pub mod memory;
pub mod postgres;
pub mod queries;

pub type DbPool = Pool<Postgres>;

pub async fn init_pool(database_url: &str) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(50)
        .connect(database_url)
        .await?;
    Ok(pool)
}

pub async fn migrate(pool: &DbPool) -> Result<()> {
    for statement in queries::SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    info!("Schema ready ({} tables)", queries::SCHEMA.len());
    Ok(())
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait JourneyStore: Send + Sync {
    async fn insert_journey(&self, journey: &Journey) -> Result<(), StoreError>;
    async fn update_journey(&self, journey: &Journey) -> Result<(), StoreError>;
    async fn get_journey(&self, journey_id: Uuid) -> Result<Option<Journey>, StoreError>;
    /// Most recent non-terminal journey of a device.
    async fn active_journey(&self, device_id: &str) -> Result<Option<Journey>, StoreError>;
    async fn append_point(&self, fix: &PositionFix) -> Result<i64, StoreError>;
    async fn points_for_journey(&self, journey_id: Uuid) -> Result<Vec<PositionFix>, StoreError>;
    /// Drops finished journeys (and their points) started before the cutoff.
    async fn delete_finished_before(&self, before: DateTime<Utc>) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait ZoneStore: Send + Sync {
    async fn zones_in_bounds(&self, bbox: &BoundingBox) -> Result<Vec<SafeZone>, StoreError>;
    async fn insert_zone(&self, zone: &SafeZone) -> Result<ZoneId, StoreError>;
    /// Persists score, incident count, last incident, class and updated time.
    async fn update_zone(&self, zone: &SafeZone) -> Result<(), StoreError>;
    async fn zones_below_score(&self, score: i32) -> Result<Vec<SafeZone>, StoreError>;
    async fn delete_calculated_before(&self, before: DateTime<Utc>) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait ContactStore: Send + Sync {
    /// Active contacts that accept SMS, by ascending priority.
    async fn sms_contacts(&self) -> Result<Vec<TrustedContact>, StoreError>;
    async fn mark_notified(&self, contact_ids: &[i64], at: DateTime<Utc>) -> Result<(), StoreError>;
    async fn insert_contact(&self, contact: &TrustedContact) -> Result<i64, StoreError>;
    /// Returns false when no contact has that id.
    async fn set_contact_active(&self, contact_id: i64, active: bool) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait EmergencyStore: Send + Sync {
    async fn insert_event(&self, event: &EmergencyEvent) -> Result<i64, StoreError>;
    async fn get_event(&self, event_id: i64) -> Result<Option<EmergencyEvent>, StoreError>;
    async fn mark_sms_sent(&self, event_id: i64, recipients: &str) -> Result<(), StoreError>;
    /// Returns false when the event does not exist or is no longer active.
    async fn resolve_event(&self, event_id: i64, at: DateTime<Utc>) -> Result<bool, StoreError>;
    /// Drops events older than the cutoff unless they are still active.
    async fn delete_events_before(&self, before: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// The store handles a session needs, all backed by one storage engine.
#[derive(Clone)]
pub struct Stores {
    pub journeys: Arc<dyn JourneyStore>,
    pub zones: Arc<dyn ZoneStore>,
    pub contacts: Arc<dyn ContactStore>,
    pub events: Arc<dyn EmergencyStore>,
}

impl Stores {
    pub fn from_backend<S>(store: Arc<S>) -> Self
    where
        S: JourneyStore + ZoneStore + ContactStore + EmergencyStore + 'static,
    {
        Self {
            journeys: store.clone(),
            zones: store.clone(),
            contacts: store.clone(),
            events: store,
        }
    }
}
