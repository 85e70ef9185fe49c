use serde::{Deserialize, Serialize};

/// Mean earth radius (IUGG), metres.
pub const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

/// Length of one degree of latitude, kilometres.
const KM_PER_DEGREE_LAT: f64 = 111.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Great-circle distance in metres (haversine).
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        haversine_distance(self, other)
    }

    pub fn maps_url(&self) -> String {
        format!("https://www.google.com/maps?q={},{}", self.lat, self.lng)
    }
}

pub fn haversine_distance(a: &Coordinate, b: &Coordinate) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_phi = (b.lat - a.lat).to_radians();
    let d_lambda = (b.lng - a.lng).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Rounding can push h a hair above 1 for antipodal points.
    let c = 2.0 * h.min(1.0).sqrt().asin();
    EARTH_RADIUS_METERS * c
}

/// Axis-aligned lat/lng box used to prefilter zone lookups before exact distance checks.
///
/// A box that crosses the antimeridian has `min_lng > max_lng`: it covers
/// `[min_lng, 180]` and `[-180, max_lng]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    /// Box that fully contains the circle of `radius_km` around `center`.
    pub fn around(center: &Coordinate, radius_km: f64) -> Self {
        let d_lat = radius_km / KM_PER_DEGREE_LAT;
        let cos_lat = center.lat.to_radians().cos().abs();
        // Near the poles every longitude is within reach.
        let d_lng = if cos_lat < 1e-6 {
            180.0
        } else {
            (radius_km / (KM_PER_DEGREE_LAT * cos_lat)).min(180.0)
        };

        let (min_lng, max_lng) = if d_lng >= 180.0 {
            (-180.0, 180.0)
        } else {
            (wrap_longitude(center.lng - d_lng), wrap_longitude(center.lng + d_lng))
        };

        Self {
            min_lat: (center.lat - d_lat).max(-90.0),
            max_lat: (center.lat + d_lat).min(90.0),
            min_lng,
            max_lng,
        }
    }

    pub fn crosses_antimeridian(&self) -> bool {
        self.min_lng > self.max_lng
    }

    pub fn contains(&self, point: &Coordinate) -> bool {
        let in_lng = if self.crosses_antimeridian() {
            point.lng >= self.min_lng || point.lng <= self.max_lng
        } else {
            point.lng >= self.min_lng && point.lng <= self.max_lng
        };
        point.lat >= self.min_lat && point.lat <= self.max_lat && in_lng
    }
}

fn wrap_longitude(lng: f64) -> f64 {
    if lng > 180.0 {
        lng - 360.0
    } else if lng < -180.0 {
        lng + 360.0
    } else {
        lng
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_is_symmetric_and_zero_on_self() {
        let points = [
            Coordinate::new(0.0, 0.0),
            Coordinate::new(20.652494, -100.391404),
            Coordinate::new(-33.8688, 151.2093),
            Coordinate::new(89.9, 179.9),
        ];
        for a in &points {
            assert_eq!(a.distance_to(a), 0.0);
            for b in &points {
                assert_eq!(a.distance_to(b), b.distance_to(a));
            }
        }
    }

    #[test]
    fn test_london_paris() {
        let london = Coordinate::new(51.5074, -0.1278);
        let paris = Coordinate::new(48.8566, 2.3522);
        let dist = london.distance_to(&paris);
        assert!(dist > 340_000.0 && dist < 350_000.0);
    }

    #[test]
    fn test_small_equatorial_offset() {
        let a = Coordinate::new(0.0, 0.001);
        let b = Coordinate::new(0.0, 0.0009);
        let dist = a.distance_to(&b);
        assert!((dist - 11.1).abs() < 0.2, "got {}", dist);
    }

    #[test]
    fn test_bounding_box_contains_circle() {
        let center = Coordinate::new(20.65, -100.39);
        let bbox = BoundingBox::around(&center, 0.5);
        assert!(bbox.contains(&center));
        // 400m north and 400m east are inside, 2km away is not
        assert!(bbox.contains(&Coordinate::new(20.65 + 0.0036, -100.39)));
        assert!(bbox.contains(&Coordinate::new(20.65, -100.39 + 0.0038)));
        assert!(!bbox.contains(&Coordinate::new(20.67, -100.39)));
    }

    #[test]
    fn test_bounding_box_wraps_at_antimeridian() {
        let west = BoundingBox::around(&Coordinate::new(0.0, -179.999), 0.5);
        assert!(west.crosses_antimeridian());
        assert!(west.contains(&Coordinate::new(0.0, 179.999)));
        assert!(west.contains(&Coordinate::new(0.0, -179.998)));
        assert!(!west.contains(&Coordinate::new(0.0, 179.9)));
        assert!(!west.contains(&Coordinate::new(0.0, 0.0)));

        let east = BoundingBox::around(&Coordinate::new(0.0, 179.999), 0.5);
        assert!(east.crosses_antimeridian());
        assert!(east.contains(&Coordinate::new(0.0, -179.999)));

        assert!(!BoundingBox::around(&Coordinate::new(0.0, 0.0), 0.5).crosses_antimeridian());
    }

    #[test]
    fn test_coordinate_validation() {
        assert!(Coordinate::new(45.0, 90.0).is_valid());
        assert!(!Coordinate::new(91.0, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, f64::NAN).is_valid());
    }
}
