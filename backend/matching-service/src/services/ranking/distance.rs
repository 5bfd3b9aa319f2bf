const EARTH_RADIUS_KM: f64 = 6371.0;

/// Distance reported for candidates that never set a location.
pub const UNSET_DISTANCE_KM: f64 = 99_999.0;

/// Great-circle distance in kilometres.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Distance between a viewer and a candidate as ranking sees it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DistanceBand {
    /// The viewer has no location; distance plays no part.
    Unknown,
    Km(f64),
}

impl DistanceBand {
    /// `None` for either coordinate pair means "unset".
    pub fn between(viewer: Option<(f64, f64)>, candidate: Option<(f64, f64)>) -> Self {
        match (viewer, candidate) {
            (None, _) => DistanceBand::Unknown,
            (Some(_), None) => DistanceBand::Km(UNSET_DISTANCE_KM),
            (Some((vlat, vlng)), Some((clat, clng))) => {
                DistanceBand::Km(haversine_km(vlat, vlng, clat, clng))
            }
        }
    }

    pub fn km(&self) -> Option<f64> {
        match self {
            DistanceBand::Unknown => None,
            DistanceBand::Km(d) => Some(*d),
        }
    }

    pub fn within(&self, max_km: Option<f64>) -> bool {
        match (self, max_km) {
            (_, None) | (DistanceBand::Unknown, _) => true,
            (DistanceBand::Km(d), Some(max)) => *d <= max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_symmetric_and_zero() {
        let (la, lo) = (-33.8688, 151.2093);
        let (lb, lob) = (-37.8136, 144.9631);
        let ab = haversine_km(la, lo, lb, lob);
        let ba = haversine_km(lb, lob, la, lo);
        assert!((ab - ba).abs() < 1e-9);
        assert!((ab - 713.4).abs() < 2.0, "sydney-melbourne was {ab}");
        assert_eq!(haversine_km(la, lo, la, lo), 0.0);
    }

    #[test]
    fn test_unset_candidate_is_far_and_filtered() {
        let band = DistanceBand::between(Some((40.0, -74.0)), None);
        assert_eq!(band.km(), Some(UNSET_DISTANCE_KM));
        assert!(!band.within(Some(20_000.0)));
        assert!(band.within(None));
    }

    #[test]
    fn test_unknown_viewer_ignores_filter() {
        let band = DistanceBand::between(None, Some((1.0, 1.0)));
        assert_eq!(band.km(), None);
        assert!(band.within(Some(1.0)));
    }
}
