//! Station metadata lookup.
//!
//! The catalog maps station ids to names and coordinates and resolves a
//! [`LocationRef`] into the denormalized [`ResolvedLocation`] stored on a
//! trip. It is replaced wholesale whenever station information is reloaded.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::gbfs::StationInformation;
use crate::geo::{Coordinate, Distance};
use crate::snapshot::{LocationRef, StationId};

/// Id used for free-floating parking.
pub const FLEX_PARKING_ID: &str = "0";
pub const FLEX_PARKING_NAME: &str = "Flex parking";

/// Bikes reported within this radius of a station are considered docked there.
pub const DEFAULT_DOCK_RADIUS: Distance = Distance::from_meters(10.0);

#[derive(Debug, Clone, PartialEq)]
pub struct StationInfo {
    pub id: StationId,
    pub name: String,
    pub position: Coordinate,
}

impl StationInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>, position: Coordinate) -> Self {
        Self {
            id: StationId::new(id),
            name: name.into(),
            position,
        }
    }
}

/// Self-contained snapshot of a location, copied onto each trip endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedLocation {
    pub id: StationId,
    pub name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl ResolvedLocation {
    fn station(info: &StationInfo) -> Self {
        Self {
            id: info.id.clone(),
            name: Some(info.name.clone()),
            latitude: Some(info.position.latitude),
            longitude: Some(info.position.longitude),
        }
    }

    fn unknown_station(id: &StationId) -> Self {
        Self {
            id: id.clone(),
            name: None,
            latitude: None,
            longitude: None,
        }
    }

    fn flex_parking(position: Coordinate) -> Self {
        Self {
            id: StationId::new(FLEX_PARKING_ID),
            name: Some(FLEX_PARKING_NAME.to_string()),
            latitude: Some(position.latitude),
            longitude: Some(position.longitude),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
    #[error("free-floating position ({0}) is not a valid coordinate")]
    InvalidCoordinate(Coordinate),

    #[error("station reference has an empty id")]
    EmptyStationId,
}

#[derive(Debug, Clone)]
pub struct LocationCatalog {
    // sorted by longitude for the dock search in `locate`
    stations: Vec<StationInfo>,
    index: HashMap<StationId, usize>,
    dock_radius: Distance,
    refreshed_at: Option<DateTime<Utc>>,
}

impl Default for LocationCatalog {
    fn default() -> Self {
        Self::new(DEFAULT_DOCK_RADIUS)
    }
}

impl LocationCatalog {
    pub fn new(dock_radius: Distance) -> Self {
        Self {
            stations: Vec::new(),
            index: HashMap::new(),
            dock_radius,
            refreshed_at: None,
        }
    }

    pub fn from_stations(
        stations: impl IntoIterator<Item = StationInfo>,
        dock_radius: Distance,
    ) -> Self {
        let mut catalog = Self::new(dock_radius);
        catalog.replace(stations);
        catalog
    }

    pub fn from_station_information(doc: &StationInformation, dock_radius: Distance) -> Self {
        let mut catalog = Self::new(dock_radius);
        catalog.refresh(doc);
        catalog
    }

    /// Replaces the stations with those of a freshly fetched document.
    pub fn refresh(&mut self, doc: &StationInformation) {
        self.replace(doc.data.stations.iter().map(|s| {
            StationInfo::new(s.station_id.clone(), s.name.clone(), Coordinate::new(s.lat, s.lon))
        }));
        self.refreshed_at = Some(doc.last_updated);
    }

    /// Replaces every station. Later duplicates of an id win.
    pub fn replace(&mut self, stations: impl IntoIterator<Item = StationInfo>) {
        let mut by_id: HashMap<StationId, StationInfo> = HashMap::new();
        for station in stations {
            if let Some(previous) = by_id.insert(station.id.clone(), station) {
                debug!(station_id = %previous.id, "Duplicate station id in catalog, keeping last entry");
            }
        }

        let mut stations: Vec<StationInfo> = by_id.into_values().collect();
        stations.sort_by(|a, b| a.position.longitude.total_cmp(&b.position.longitude));

        self.index = stations
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();
        self.stations = stations;
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }

    pub fn get(&self, id: &StationId) -> Option<&StationInfo> {
        self.index.get(id).map(|&i| &self.stations[i])
    }

    /// Stations in ascending longitude order.
    pub fn iter(&self) -> impl Iterator<Item = &StationInfo> {
        self.stations.iter()
    }

    /// Resolves a location into station metadata.
    ///
    /// Unknown stations resolve to a placeholder carrying only the id, so a
    /// station added after the last refresh never stops reconstruction.
    ///
    /// # Errors
    ///
    /// Fails for free-floating positions outside valid coordinate ranges and
    /// for empty station ids.
    pub fn resolve(&self, location: &LocationRef) -> Result<ResolvedLocation, ResolveError> {
        match location {
            LocationRef::Station(id) if id.as_str().is_empty() => Err(ResolveError::EmptyStationId),
            LocationRef::Station(id) => Ok(match self.get(id) {
                Some(info) => ResolvedLocation::station(info),
                None => {
                    warn!(station_id = %id, "Station not in catalog, using placeholder");
                    ResolvedLocation::unknown_station(id)
                }
            }),
            LocationRef::FreeFloating(position) if position.is_valid() => {
                Ok(ResolvedLocation::flex_parking(*position))
            }
            LocationRef::FreeFloating(position) => Err(ResolveError::InvalidCoordinate(*position)),
        }
    }

    /// Maps a raw position to the nearest station within the dock radius, or
    /// to a free-floating reference when no station is close enough.
    pub fn locate(&self, position: Coordinate) -> LocationRef {
        if !position.is_valid() {
            return LocationRef::FreeFloating(position);
        }

        let span = position.longitude_span(self.dock_radius);
        let start = self
            .stations
            .partition_point(|s| s.position.longitude < position.longitude - span);

        self.stations[start..]
            .iter()
            .take_while(|s| s.position.longitude <= position.longitude + span)
            .map(|s| (s, s.position.planar_distance(&position)))
            .filter(|(_, d)| *d <= self.dock_radius)
            .min_by(|(_, a), (_, b)| a.as_meters().total_cmp(&b.as_meters()))
            .map_or(LocationRef::FreeFloating(position), |(s, _)| {
                LocationRef::Station(s.id.clone())
            })
    }
}
