//! Safety-zone scoring.
//!
//! Incidents are bucketed into zones by proximity. Each incident decays the nearest
//! zone's score; zones are created on demand. Lookups prefilter with a bounding box in
//! the store, then check exact great-circle distance.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::db::{StoreError, ZoneStore};
use crate::geo::{BoundingBox, Coordinate};
use crate::models::zone::{SafeZone, ZoneClass, ZoneId, MAX_SAFETY_SCORE};

pub const INCIDENT_SCORE_STEP: i32 = 10;
pub const NEW_ZONE_SCORE: i32 = 40;
/// Reported when no zone is nearby.
pub const NEUTRAL_SCORE: i32 = 50;
/// Zones scoring below this make a location dangerous.
pub const DANGER_SCORE_THRESHOLD: i32 = 30;
pub const DEFAULT_SEARCH_RADIUS_KM: f64 = 0.5;

#[derive(Debug, Error)]
pub enum ZoneError {
    #[error("zone store failed: {0}")]
    Store(#[from] StoreError),
    #[error("invalid coordinate ({lat}, {lng})")]
    InvalidCoordinate { lat: f64, lng: f64 },
    #[error("invalid radius {0}")]
    InvalidRadius(f64),
}

/// Score after one more incident, floored at zero.
pub fn decayed_score(score: i32) -> i32 {
    (score - INCIDENT_SCORE_STEP).max(0)
}

pub fn apply_incident(zone: &mut SafeZone, at: DateTime<Utc>) {
    zone.safety_score = decayed_score(zone.safety_score);
    zone.incident_count += 1;
    zone.last_incident_at = Some(at);
    zone.class = ZoneClass::from_score(zone.safety_score);
    zone.updated_at = at;
}

/// Zones within `radius_km` of `at`, nearest first.
pub fn zones_within(zones: Vec<SafeZone>, at: &Coordinate, radius_km: f64) -> Vec<(f64, SafeZone)> {
    let radius_m = radius_km * 1000.0;
    let mut hits: Vec<(f64, SafeZone)> = zones
        .into_iter()
        .map(|z| (z.center.distance_to(at), z))
        .filter(|(d, _)| *d <= radius_m)
        .collect();
    hits.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.zone_id.cmp(&b.1.zone_id)));
    hits
}

pub struct ZoneScorer {
    store: Arc<dyn ZoneStore>,
    search_radius_km: f64,
}

impl ZoneScorer {
    pub fn new(store: Arc<dyn ZoneStore>, search_radius_km: f64) -> Self {
        Self {
            store,
            search_radius_km,
        }
    }

    pub fn search_radius_km(&self) -> f64 {
        self.search_radius_km
    }

    pub async fn zones_near(&self, at: &Coordinate, radius_km: f64) -> Result<Vec<(f64, SafeZone)>, ZoneError> {
        if !at.is_valid() {
            return Err(ZoneError::InvalidCoordinate { lat: at.lat, lng: at.lng });
        }
        if !(radius_km.is_finite() && radius_km >= 0.0) {
            return Err(ZoneError::InvalidRadius(radius_km));
        }
        let candidates = self
            .store
            .zones_in_bounds(&BoundingBox::around(at, radius_km))
            .await?;
        Ok(zones_within(candidates, at, radius_km))
    }

    /// Decays the nearest zone or seeds a new one; returns the affected zone.
    pub async fn record_incident(&self, at: &Coordinate, when: DateTime<Utc>) -> Result<ZoneId, ZoneError> {
        let nearby = self.zones_near(at, self.search_radius_km).await?;

        match nearby.into_iter().next() {
            Some((distance, mut zone)) => {
                apply_incident(&mut zone, when);
                self.store.update_zone(&zone).await?;
                info!(
                    zone_id = zone.zone_id,
                    distance_m = distance,
                    score = zone.safety_score,
                    class = %zone.class,
                    incidents = zone.incident_count,
                    "Incident recorded in existing zone"
                );
                Ok(zone.zone_id)
            }
            None => {
                let zone = SafeZone::from_incident(*at, NEW_ZONE_SCORE, when);
                let zone_id = self.store.insert_zone(&zone).await?;
                info!(zone_id, score = zone.safety_score, "Incident opened a new zone");
                Ok(zone_id)
            }
        }
    }

    /// Lowest score in range, or the neutral score when nothing is nearby.
    pub async fn score_near(&self, at: &Coordinate, radius_km: f64) -> Result<i32, ZoneError> {
        let nearby = self.zones_near(at, radius_km).await?;
        let score = nearby
            .iter()
            .map(|(_, z)| z.safety_score)
            .min()
            .unwrap_or(NEUTRAL_SCORE);
        debug!(lat = at.lat, lng = at.lng, radius_km, score, "Score lookup");
        Ok(score)
    }

    pub async fn is_dangerous(&self, at: &Coordinate, radius_km: f64) -> Result<bool, ZoneError> {
        Ok(self.most_dangerous_near(at, radius_km).await?.is_some())
    }

    /// Most dangerous zone in range scoring below the danger threshold.
    pub async fn most_dangerous_near(&self, at: &Coordinate, radius_km: f64) -> Result<Option<SafeZone>, ZoneError> {
        Ok(self
            .zones_near(at, radius_km)
            .await?
            .into_iter()
            .map(|(_, z)| z)
            .filter(|z| z.safety_score < DANGER_SCORE_THRESHOLD)
            .min_by_key(|z| z.safety_score))
    }

    pub async fn create_user_zone(
        &self,
        name: &str,
        center: Coordinate,
        radius_meters: f64,
        address: Option<String>,
        when: DateTime<Utc>,
    ) -> Result<ZoneId, ZoneError> {
        if !center.is_valid() {
            return Err(ZoneError::InvalidCoordinate { lat: center.lat, lng: center.lng });
        }
        let zone = SafeZone {
            zone_id: 0,
            center,
            radius_meters,
            name: Some(name.to_string()),
            address,
            safety_score: MAX_SAFETY_SCORE,
            incident_count: 0,
            last_incident_at: None,
            class: ZoneClass::Safe,
            is_user_defined: true,
            created_at: when,
            updated_at: when,
        };
        let zone_id = self.store.insert_zone(&zone).await?;
        info!(zone_id, name, "User safe zone created");
        Ok(zone_id)
    }

    pub async fn dangerous_zones(&self) -> Result<Vec<SafeZone>, ZoneError> {
        Ok(self.store.zones_below_score(DANGER_SCORE_THRESHOLD).await?)
    }

    /// Removes calculated zones untouched since `older_than`. User zones are kept.
    pub async fn prune_calculated(&self, older_than: DateTime<Utc>) -> Result<u64, ZoneError> {
        let removed = self.store.delete_calculated_before(older_than).await?;
        if removed > 0 {
            info!(removed, "Pruned stale calculated zones");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use chrono::Duration;

    fn scorer() -> (Arc<MemoryStore>, ZoneScorer) {
        let store = Arc::new(MemoryStore::new());
        let scorer = ZoneScorer::new(store.clone(), DEFAULT_SEARCH_RADIUS_KM);
        (store, scorer)
    }

    async fn zone_with_score(store: &MemoryStore, center: Coordinate, score: i32) -> ZoneId {
        let mut zone = SafeZone::from_incident(center, score, Utc::now());
        zone.incident_count = 0;
        store.insert_zone(&zone).await.unwrap()
    }

    #[tokio::test]
    async fn test_dangerous_zone_seen_across_the_antimeridian() {
        let (store, scorer) = scorer();
        zone_with_score(&store, Coordinate::new(0.0, 179.999), 10).await;

        // ~222m away on the other side of the date line
        let here = Coordinate::new(0.0, -179.999);
        assert_eq!(scorer.score_near(&here, DEFAULT_SEARCH_RADIUS_KM).await.unwrap(), 10);
        assert!(scorer.is_dangerous(&here, DEFAULT_SEARCH_RADIUS_KM).await.unwrap());
    }

    #[test]
    fn test_decay_floors_at_zero() {
        assert_eq!(decayed_score(50), 40);
        assert_eq!(decayed_score(5), 0);
        assert_eq!(decayed_score(0), 0);
    }

    #[tokio::test]
    async fn test_incident_decays_existing_zone_to_warning() {
        let (store, scorer) = scorer();
        let here = Coordinate::new(20.652494, -100.391404);
        let id = zone_with_score(&store, here, 50).await;

        let hit = scorer.record_incident(&here, Utc::now()).await.unwrap();
        assert_eq!(hit, id);

        let zones = store.zones_below_score(101).await.unwrap();
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].safety_score, 40);
        assert_eq!(zones[0].class, ZoneClass::Warning);
        assert_eq!(zones[0].incident_count, 1);
    }

    #[tokio::test]
    async fn test_incident_far_from_zones_creates_new_warning_zone() {
        let (store, scorer) = scorer();
        zone_with_score(&store, Coordinate::new(20.0, -100.0), 80).await;

        let far = Coordinate::new(20.1, -100.0);
        let id = scorer.record_incident(&far, Utc::now()).await.unwrap();
        let zones = store.zones_below_score(101).await.unwrap();
        let created = zones.iter().find(|z| z.zone_id == id).unwrap();
        assert_eq!(created.safety_score, NEW_ZONE_SCORE);
        assert_eq!(created.class, ZoneClass::Warning);
        assert_eq!(created.incident_count, 1);
        assert!(!created.is_user_defined);
    }

    #[tokio::test]
    async fn test_repeated_incidents_never_go_below_zero() {
        let (store, scorer) = scorer();
        let here = Coordinate::new(1.0, 1.0);
        zone_with_score(&store, here, 5).await;

        scorer.record_incident(&here, Utc::now()).await.unwrap();
        scorer.record_incident(&here, Utc::now()).await.unwrap();

        assert_eq!(scorer.score_near(&here, 0.5).await.unwrap(), 0);
        let zones = store.zones_below_score(101).await.unwrap();
        assert_eq!(zones[0].incident_count, 2);
        assert_eq!(zones[0].class, ZoneClass::Dangerous);
    }

    #[tokio::test]
    async fn test_incident_only_touches_nearest_zone() {
        let (store, scorer) = scorer();
        let near = zone_with_score(&store, Coordinate::new(0.0, 0.0001), 60).await;
        let farther = zone_with_score(&store, Coordinate::new(0.0, 0.002), 60).await;

        assert_eq!(scorer.record_incident(&Coordinate::new(0.0, 0.0), Utc::now()).await.unwrap(), near);
        let zones = store.zones_below_score(101).await.unwrap();
        let score_of = |id| zones.iter().find(|z| z.zone_id == id).unwrap().safety_score;
        assert_eq!(score_of(near), 50);
        assert_eq!(score_of(farther), 60);
    }

    #[tokio::test]
    async fn test_score_near_reports_minimum_and_neutral_default() {
        let (store, scorer) = scorer();
        let here = Coordinate::new(10.0, 10.0);
        assert_eq!(scorer.score_near(&here, 0.5).await.unwrap(), NEUTRAL_SCORE);

        zone_with_score(&store, Coordinate::new(10.0, 10.001), 70).await;
        zone_with_score(&store, Coordinate::new(10.001, 10.0), 25).await;
        // outside the radius, ignored
        zone_with_score(&store, Coordinate::new(10.1, 10.0), 0).await;

        assert_eq!(scorer.score_near(&here, 0.5).await.unwrap(), 25);
        assert!(scorer.is_dangerous(&here, 0.5).await.unwrap());
        assert!(!scorer.is_dangerous(&Coordinate::new(10.0, 10.002), 0.15).await.unwrap());
    }

    #[tokio::test]
    async fn test_user_zone_is_safe_and_survives_pruning() {
        let (store, scorer) = scorer();
        let old = Utc::now() - Duration::days(365);
        let id = scorer
            .create_user_zone("Home", Coordinate::new(5.0, 5.0), 100.0, None, old)
            .await
            .unwrap();
        scorer.record_incident(&Coordinate::new(6.0, 6.0), old).await.unwrap();

        let removed = scorer.prune_calculated(Utc::now() - Duration::days(180)).await.unwrap();
        assert_eq!(removed, 1);
        let zones = store.zones_below_score(101).await.unwrap();
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].zone_id, id);
        assert_eq!(zones[0].class, ZoneClass::Safe);
        assert_eq!(zones[0].safety_score, 100);
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let (store, scorer) = scorer();
        store.set_offline(true);
        let here = Coordinate::new(0.0, 0.0);
        assert!(matches!(
            scorer.record_incident(&here, Utc::now()).await,
            Err(ZoneError::Store(StoreError::Unavailable(_)))
        ));
        assert!(matches!(
            scorer.score_near(&here, 0.5).await,
            Err(ZoneError::Store(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_input_is_rejected() {
        let (_store, scorer) = scorer();
        assert!(matches!(
            scorer.score_near(&Coordinate::new(95.0, 0.0), 0.5).await,
            Err(ZoneError::InvalidCoordinate { .. })
        ));
        assert!(matches!(
            scorer.score_near(&Coordinate::new(0.0, 0.0), -1.0).await,
            Err(ZoneError::InvalidRadius(_))
        ));
    }
}
