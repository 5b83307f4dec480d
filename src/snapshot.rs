//! One poll's worth of vehicle observations.

use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::catalog::LocationCatalog;
use crate::gbfs::{BikeEntry, FreeBikeStatus};
use crate::geo::{Coordinate, Distance};

/// Station identifier as published by the feed.
///
/// GBFS ids are strings; numeric ids serialize as JSON integers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StationId(String);

impl StationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for StationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for StationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // only ids that print back identically, so "007" stays distinct from "7"
        match self.0.parse::<i64>() {
            Ok(n) if n.to_string() == self.0 => serializer.serialize_i64(n),
            _ => serializer.serialize_str(&self.0),
        }
    }
}

/// Where a vehicle was seen: docked at a station or parked free-floating.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationRef {
    Station(StationId),
    FreeFloating(Coordinate),
}

impl LocationRef {
    /// Stations compare by id. Free-floating positions within `tolerance` of
    /// each other are the same place, which absorbs GPS jitter. Identical
    /// positions are always the same place.
    pub fn same_place(&self, other: &Self, tolerance: Distance) -> bool {
        match (self, other) {
            (Self::Station(a), Self::Station(b)) => a == b,
            (Self::FreeFloating(a), Self::FreeFloating(b)) => {
                a == b || a.planar_distance(b) <= tolerance
            }
            _ => false,
        }
    }
}

impl Display for LocationRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Station(id) => write!(f, "station {id}"),
            Self::FreeFloating(position) => write!(f, "free-floating at {position}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub vehicle_id: String,
    pub location: LocationRef,
    /// Reported coordinates when the feed gave no `station_id` and `location`
    /// was inferred from them.
    pub position: Option<Coordinate>,
    pub observed_at: DateTime<Utc>,
    pub disabled: bool,
}

impl Observation {
    pub fn new(
        vehicle_id: impl Into<String>,
        location: LocationRef,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            location,
            position: None,
            observed_at,
            disabled: false,
        }
    }

    /// An observation placed from raw coordinates through `catalog`.
    pub fn at_position(
        vehicle_id: impl Into<String>,
        position: Coordinate,
        catalog: &LocationCatalog,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            position: Some(position),
            ..Self::new(vehicle_id, catalog.locate(position), observed_at)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    pub observations: Vec<Observation>,
}

impl Snapshot {
    pub fn new(taken_at: DateTime<Utc>, observations: Vec<Observation>) -> Self {
        Self {
            taken_at,
            observations,
        }
    }

    /// Builds a snapshot from a `free_bike_status` document. Bikes without a
    /// `station_id` are matched to a nearby station through the catalog.
    /// Bikes carrying neither a station nor coordinates are left out.
    pub fn from_free_bike_status(doc: &FreeBikeStatus, catalog: &LocationCatalog) -> Self {
        let taken_at = doc.last_updated;
        let mut unplaced = 0usize;

        let observations = doc
            .data
            .bikes
            .iter()
            .filter_map(|bike| {
                let Some(mut observation) = place(bike, catalog, taken_at) else {
                    unplaced += 1;
                    return None;
                };
                observation.disabled = bike.is_disabled;
                Some(observation)
            })
            .collect::<Vec<_>>();

        if unplaced > 0 {
            debug!(unplaced, "Bikes without station or coordinates left out of snapshot");
        }

        Self::new(taken_at, observations)
    }
}

fn place(
    bike: &BikeEntry,
    catalog: &LocationCatalog,
    observed_at: DateTime<Utc>,
) -> Option<Observation> {
    if let Some(station_id) = bike.station_id.as_deref().filter(|id| !id.is_empty()) {
        let location = LocationRef::Station(StationId::new(station_id));
        return Some(Observation::new(&bike.bike_id, location, observed_at));
    }
    match (bike.lat, bike.lon) {
        (Some(lat), Some(lon)) => Some(Observation::at_position(
            &bike.bike_id,
            Coordinate::new(lat, lon),
            catalog,
            observed_at,
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StationInfo;
    use crate::gbfs::parse_free_bike_status;

    fn catalog() -> LocationCatalog {
        LocationCatalog::from_stations(
            vec![StationInfo::new(
                "5",
                "Alexanderplatz",
                Coordinate::new(52.5219, 13.4132),
            )],
            Distance::from_meters(10.0),
        )
    }

    #[test]
    fn test_station_id_serializes_numeric_as_integer() {
        assert_eq!(serde_json::to_string(&StationId::new("42")).unwrap(), "42");
        assert_eq!(
            serde_json::to_string(&StationId::new("BER-1")).unwrap(),
            "\"BER-1\""
        );
        assert_eq!(serde_json::to_string(&StationId::new("007")).unwrap(), "\"007\"");
        assert_eq!(serde_json::to_string(&StationId::new("+7")).unwrap(), "\"+7\"");
        assert_eq!(serde_json::to_string(&StationId::new("-3")).unwrap(), "-3");
    }

    #[test]
    fn test_same_place_rules() {
        let tolerance = Distance::from_meters(50.0);
        let a = LocationRef::Station(StationId::new("5"));
        let b = LocationRef::Station(StationId::new("7"));
        let here = LocationRef::FreeFloating(Coordinate::new(52.5200, 13.4050));
        let nearby = LocationRef::FreeFloating(Coordinate::new(52.5201, 13.4051));
        let far = LocationRef::FreeFloating(Coordinate::new(52.5300, 13.4050));

        assert!(a.same_place(&a.clone(), tolerance));
        assert!(!a.same_place(&b, tolerance));
        assert!(here.same_place(&nearby, tolerance));
        assert!(!here.same_place(&far, tolerance));
        assert!(!a.same_place(&here, tolerance));

        // identical positions match even with a broken tolerance
        assert!(here.same_place(&here.clone(), Distance::from_meters(-1.0)));
        assert!(here.same_place(&here.clone(), Distance::from_meters(f64::NAN)));
    }

    #[test]
    fn test_from_free_bike_status_places_bikes() {
        let doc = parse_free_bike_status(
            br#"{"last_updated": 1700000000, "ttl": 60, "data": {"bikes": [
                {"bike_id": "docked-by-id", "station_id": "7", "lat": 0.0, "lon": 0.0},
                {"bike_id": "docked-by-coords", "lat": 52.52191, "lon": 13.41321},
                {"bike_id": "flex", "lat": 52.50, "lon": 13.30, "is_disabled": 1},
                {"bike_id": "nowhere"}
            ]}}"#,
        )
        .unwrap();

        let snapshot = Snapshot::from_free_bike_status(&doc, &catalog());

        assert_eq!(snapshot.taken_at.timestamp(), 1_700_000_000);
        assert_eq!(snapshot.observations.len(), 3);
        assert_eq!(
            snapshot.observations[0].location,
            LocationRef::Station(StationId::new("7"))
        );
        assert_eq!(
            snapshot.observations[1].location,
            LocationRef::Station(StationId::new("5"))
        );
        assert_eq!(
            snapshot.observations[2].location,
            LocationRef::FreeFloating(Coordinate::new(52.50, 13.30))
        );
        assert!(snapshot.observations[2].disabled);
        assert_eq!(snapshot.observations[0].position, None);
        assert_eq!(
            snapshot.observations[1].position,
            Some(Coordinate::new(52.52191, 13.41321))
        );
        assert!(
            snapshot
                .observations
                .iter()
                .all(|o| o.observed_at == snapshot.taken_at)
        );
    }
}
