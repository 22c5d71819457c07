//! Great-circle proximity filter for presence snapshots.

use crate::models::presence::{LiveUser, UserId};

pub const EARTH_RADIUS_KM: f64 = 6371.0;
/// Users farther than this from a viewer do not appear on the viewer's map.
pub const PROXIMITY_RADIUS_KM: f64 = 25.0;

/// Anything with an identity and (possibly missing) coordinates.
pub trait Located {
    fn id(&self) -> UserId;
    fn latitude(&self) -> Option<f64>;
    fn longitude(&self) -> Option<f64>;

    /// Both coordinates, only when both are present and finite.
    fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude(), self.longitude()) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => Some((lat, lon)),
            _ => None,
        }
    }
}

impl Located for LiveUser {
    fn id(&self) -> UserId {
        self.user_id
    }
    fn latitude(&self) -> Option<f64> {
        self.lat
    }
    fn longitude(&self) -> Option<f64> {
        self.lon
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Nearby<'a, T> {
    pub candidate: &'a T,
    pub distance_km: f64,
    pub is_self: bool,
}

pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let to_rad = |deg: f64| deg.to_radians();
    let dlat = to_rad(lat2 - lat1);
    let dlon = to_rad(lon2 - lon1);
    let a = (dlat / 2.0).sin().powi(2)
        + to_rad(lat1).cos() * to_rad(lat2).cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().min(1.0).asin();
    EARTH_RADIUS_KM * c
}

/// Candidates within `radius_km` (inclusive) of `origin`, in input order.
///
/// The origin's own entry is always kept at distance 0. Candidates without
/// usable coordinates are dropped; an origin without them yields nothing.
pub fn nearby<'a, T: Located>(origin: &T, candidates: &'a [T], radius_km: f64) -> Vec<Nearby<'a, T>> {
    let Some((lat0, lon0)) = origin.coordinates() else {
        return Vec::new();
    };
    let viewer = origin.id();

    candidates
        .iter()
        .filter_map(|candidate| {
            let (lat, lon) = candidate.coordinates()?;
            if candidate.id() == viewer {
                return Some(Nearby {
                    candidate,
                    distance_km: 0.0,
                    is_self: true,
                });
            }
            let distance_km = haversine_km(lat0, lon0, lat, lon);
            (distance_km <= radius_km).then_some(Nearby {
                candidate,
                distance_km,
                is_self: false,
            })
        })
        .collect()
}
