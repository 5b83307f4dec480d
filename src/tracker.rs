//! Per-vehicle state and the snapshot diff that turns location changes into
//! trips.
//!
//! Vehicles are linked across polls by their feed identifier only. Operators
//! that rotate or reuse vehicle ids are not supported: a rotated id looks like
//! a brand new vehicle and its previous identity silently stops producing
//! trips until it is evicted.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, warn};

use crate::catalog::{LocationCatalog, ResolvedLocation};
use crate::geo::{Coordinate, Distance};
use crate::snapshot::{LocationRef, Observation, Snapshot};
use crate::trip::TripRecord;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerConfig {
    /// Free-floating positions closer than this are treated as the same spot.
    pub jitter_tolerance: Distance,
    /// Vehicles missing from the feed for longer than this are forgotten.
    /// `None` keeps them for the lifetime of the process.
    pub grace_window: Option<TimeDelta>,
    /// Location changes faster than this close no trip.
    pub min_trip_duration: TimeDelta,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            jitter_tolerance: Distance::from_meters(50.0),
            grace_window: Some(TimeDelta::hours(24)),
            min_trip_duration: TimeDelta::zero(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VehicleState {
    pub vehicle_id: String,
    pub current_location: LocationRef,
    /// Reported coordinates behind `current_location`, when it was inferred
    /// from them rather than given as a station id.
    pub position: Option<Coordinate>,
    /// Catalog metadata captured when `current_location` was first observed.
    /// `None` when the location could not be resolved.
    pub resolved: Option<ResolvedLocation>,
    pub since: DateTime<Utc>,
    /// Latest snapshot the vehicle appeared in, used only for eviction.
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct VehicleStateTable {
    vehicles: BTreeMap<String, VehicleState>,
    config: TrackerConfig,
}

impl VehicleStateTable {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            vehicles: BTreeMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    pub fn get(&self, vehicle_id: &str) -> Option<&VehicleState> {
        self.vehicles.get(vehicle_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VehicleState> {
        self.vehicles.values()
    }

    /// Applies a snapshot and returns the trips it closes, in vehicle id order.
    ///
    /// Absent vehicles keep their state so a missed poll never breaks a trip
    /// apart. A vehicle seen for the first time only establishes a baseline.
    pub fn diff_and_update(
        &mut self,
        snapshot: &Snapshot,
        catalog: &LocationCatalog,
    ) -> Vec<TripRecord> {
        let mut incoming: HashMap<&str, &Observation> =
            HashMap::with_capacity(snapshot.observations.len());
        for observation in &snapshot.observations {
            if incoming
                .insert(observation.vehicle_id.as_str(), observation)
                .is_some()
            {
                debug!(vehicle_id = %observation.vehicle_id, "Vehicle listed twice in snapshot, keeping last entry");
            }
        }

        let config = self.config;
        let mut trips = Vec::new();
        let mut evicted = 0usize;

        self.vehicles.retain(|vehicle_id, state| {
            let Some(observation) = incoming.get(vehicle_id.as_str()) else {
                let stale = config
                    .grace_window
                    .is_some_and(|grace| snapshot.taken_at - state.last_seen > grace);
                if stale {
                    evicted += 1;
                }
                return !stale;
            };

            if observation.observed_at < state.since {
                warn!(
                    vehicle_id = %vehicle_id,
                    since = %state.since,
                    observed_at = %observation.observed_at,
                    "Observation older than current state, ignoring"
                );
                return true;
            }

            state.last_seen = state.last_seen.max(observation.observed_at);
            if stayed(state, observation, config.jitter_tolerance) {
                return true;
            }

            if let Some(trip) = relocate(state, observation, catalog, &config) {
                trips.push(trip);
            }
            true
        });

        if evicted > 0 {
            debug!(evicted, "Evicted vehicles missing beyond the grace window");
        }

        for (vehicle_id, observation) in incoming {
            if self.vehicles.contains_key(vehicle_id) {
                continue;
            }
            if observation.disabled {
                debug!(vehicle_id, "Skipping disabled vehicle on first sighting");
                continue;
            }
            let resolved = resolve_or_warn(catalog, observation);
            self.vehicles.insert(
                vehicle_id.to_string(),
                VehicleState {
                    vehicle_id: vehicle_id.to_string(),
                    current_location: observation.location.clone(),
                    position: observation.position,
                    resolved,
                    since: observation.observed_at,
                    last_seen: observation.observed_at,
                },
            );
        }

        trips
    }
}

/// Whether `observation` puts the vehicle where `state` already has it.
///
/// Locations inferred from coordinates can flip between a station and
/// free-floating as a bike drifts across the dock radius, so when both sides
/// carry reported coordinates those are compared directly.
fn stayed(state: &VehicleState, observation: &Observation, tolerance: Distance) -> bool {
    if state.current_location.same_place(&observation.location, tolerance) {
        return true;
    }
    match (state.position, observation.position) {
        (Some(from), Some(to)) => from == to || from.planar_distance(&to) <= tolerance,
        _ => false,
    }
}

/// Moves `state` to the observed location and returns the closed trip, if
/// both endpoints resolved and the trip is long enough.
fn relocate(
    state: &mut VehicleState,
    observation: &Observation,
    catalog: &LocationCatalog,
    config: &TrackerConfig,
) -> Option<TripRecord> {
    let end = resolve_or_warn(catalog, observation);
    let started_at = state.since;
    let ended_at = observation.observed_at;

    let trip = match (state.resolved.take(), end.clone()) {
        (Some(start), Some(end)) if ended_at - started_at >= config.min_trip_duration => {
            TripRecord::new(&state.vehicle_id, start, end, started_at, ended_at)
        }
        (Some(_), Some(_)) => {
            debug!(
                vehicle_id = %state.vehicle_id,
                seconds = (ended_at - started_at).num_seconds(),
                "Location change below minimum trip duration, no trip"
            );
            None
        }
        (None, _) => {
            warn!(
                vehicle_id = %state.vehicle_id,
                from = %state.current_location,
                "Departure location was unresolvable, no trip"
            );
            None
        }
        (_, None) => None,
    };

    state.current_location = observation.location.clone();
    state.position = observation.position;
    state.resolved = end;
    state.since = ended_at;
    trip
}

fn resolve_or_warn(catalog: &LocationCatalog, observation: &Observation) -> Option<ResolvedLocation> {
    catalog
        .resolve(&observation.location)
        .inspect_err(|err| {
            warn!(
                vehicle_id = %observation.vehicle_id,
                location = %observation.location,
                error = %err,
                "Cannot resolve vehicle location"
            );
        })
        .ok()
}
