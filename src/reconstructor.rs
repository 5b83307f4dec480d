//! Ties the catalog, the vehicle state table and the trip log together.

use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::catalog::LocationCatalog;
use crate::gbfs::{FreeBikeStatus, StationInformation};
use crate::output::write_trips;
use crate::snapshot::Snapshot;
use crate::tracker::{TrackerConfig, VehicleStateTable};
use crate::trip::TripRecord;

/// Append-only list of closed trips, in the order they closed.
#[derive(Debug, Clone, Default)]
pub struct TripLog {
    trips: Vec<TripRecord>,
}

impl TripLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, trips: impl IntoIterator<Item = TripRecord>) {
        self.trips.extend(trips);
    }

    pub fn len(&self) -> usize {
        self.trips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trips.is_empty()
    }

    pub fn as_slice(&self) -> &[TripRecord] {
        &self.trips
    }

    /// Overwrites `path` with the whole log.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        write_trips(path, &self.trips)
    }
}

/// Owns all mutable tracking state. One instance is threaded through the
/// polling loop; nothing about it is global.
#[derive(Debug, Clone)]
pub struct TripReconstructor {
    catalog: LocationCatalog,
    vehicles: VehicleStateTable,
    log: TripLog,
    last_snapshot_at: Option<DateTime<Utc>>,
}

impl TripReconstructor {
    pub fn new(catalog: LocationCatalog, config: TrackerConfig) -> Self {
        Self {
            catalog,
            vehicles: VehicleStateTable::new(config),
            log: TripLog::new(),
            last_snapshot_at: None,
        }
    }

    pub fn catalog(&self) -> &LocationCatalog {
        &self.catalog
    }

    pub fn vehicles(&self) -> &VehicleStateTable {
        &self.vehicles
    }

    pub fn trip_log(&self) -> &TripLog {
        &self.log
    }

    pub fn into_trip_log(self) -> TripLog {
        self.log
    }

    /// Swaps in freshly loaded station metadata. Vehicles already tracked keep
    /// the metadata their current location was resolved with.
    pub fn refresh_catalog(&mut self, doc: &StationInformation) {
        self.catalog.refresh(doc);
        info!(stations = self.catalog.len(), "Station catalog refreshed");
    }

    /// Diffs a snapshot into the vehicle table and appends the closed trips.
    ///
    /// Snapshots not newer than the last applied one are skipped. Returns the
    /// number of trips appended.
    pub fn on_snapshot(&mut self, snapshot: &Snapshot) -> usize {
        if let Some(last) = self.last_snapshot_at.filter(|last| snapshot.taken_at <= *last) {
            debug!(taken_at = %snapshot.taken_at, last = %last, "Feed not updated since last poll, skipping");
            return 0;
        }
        self.last_snapshot_at = Some(snapshot.taken_at);

        let trips = self.vehicles.diff_and_update(snapshot, &self.catalog);
        let closed = trips.len();
        self.log.append(trips);

        debug!(
            observations = snapshot.observations.len(),
            tracked = self.vehicles.len(),
            closed,
            total = self.log.len(),
            "Snapshot applied"
        );
        closed
    }

    pub fn on_free_bike_status(&mut self, doc: &FreeBikeStatus) -> usize {
        let snapshot = Snapshot::from_free_bike_status(doc, &self.catalog);
        self.on_snapshot(&snapshot)
    }
}
