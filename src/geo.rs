//! Small geodesy helpers for matching bikes to stations.

use std::{cmp, fmt::Display};

use serde::{Deserialize, Serialize};

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct Distance(f64);

impl PartialEq for Distance {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl PartialOrd for Distance {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        self.0.partial_cmp(&other.0)
    }
}

impl Distance {
    pub const fn from_meters(distance: f64) -> Self {
        Self(distance)
    }

    pub const fn as_meters(&self) -> f64 {
        self.0
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{}, {}", self.latitude, self.longitude))
    }
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Finite and inside the WGS84 value ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Equirectangular projection of a spherical Earth. Only meant for the
    /// short distances between a bike and the stations around it.
    pub fn planar_distance(&self, other: &Self) -> Distance {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let del_lat = lat2 - lat1;
        let del_lon = (other.longitude - self.longitude).to_radians();
        let mean_lat = (lat1 + lat2) / 2.0;
        Distance::from_meters(
            EARTH_RADIUS_METERS * f64::sqrt(del_lat.powi(2) + (mean_lat.cos() * del_lon).powi(2)),
        )
    }

    /// Degrees of longitude spanned by `distance` at this latitude.
    pub fn longitude_span(&self, distance: Distance) -> f64 {
        let meters_per_degree =
            EARTH_RADIUS_METERS * std::f64::consts::PI / 180.0 * self.latitude.to_radians().cos();
        if meters_per_degree < 1e-6 {
            return 360.0;
        }
        distance.as_meters() / meters_per_degree
    }
}
