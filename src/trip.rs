//! Completed trip records as written to the trip log.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

use crate::catalog::ResolvedLocation;
use crate::snapshot::StationId;

/// A vehicle's move between two consecutive distinct locations.
///
/// Both endpoints are copied in full so the record stays meaningful after the
/// catalog has been refreshed or dropped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripRecord {
    #[serde(skip)]
    pub vehicle_id: String,
    #[serde(serialize_with = "utc_offset")]
    pub started_at: DateTime<Utc>,
    #[serde(serialize_with = "utc_offset")]
    pub ended_at: DateTime<Utc>,
    /// Whole seconds between `started_at` and `ended_at`.
    pub duration: i64,
    pub start_station_id: StationId,
    pub start_station_name: Option<String>,
    pub start_station_latitude: Option<f64>,
    pub start_station_longitude: Option<f64>,
    pub end_station_id: StationId,
    pub end_station_name: Option<String>,
    pub end_station_latitude: Option<f64>,
    pub end_station_longitude: Option<f64>,
}

impl TripRecord {
    /// Returns `None` when `ended_at` precedes `started_at`.
    pub fn new(
        vehicle_id: impl Into<String>,
        start: ResolvedLocation,
        end: ResolvedLocation,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    ) -> Option<Self> {
        if ended_at < started_at {
            return None;
        }

        Some(Self {
            vehicle_id: vehicle_id.into(),
            started_at,
            ended_at,
            duration: (ended_at - started_at).num_seconds(),
            start_station_id: start.id,
            start_station_name: start.name,
            start_station_latitude: start.latitude,
            start_station_longitude: start.longitude,
            end_station_id: end.id,
            end_station_name: end.name,
            end_station_latitude: end.latitude,
            end_station_longitude: end.longitude,
        })
    }
}

// "2023-11-14T22:13:20+00:00" rather than chrono's default trailing "Z"
fn utc_offset<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::AutoSi, false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn station(id: &str, name: &str) -> ResolvedLocation {
        ResolvedLocation {
            id: StationId::new(id),
            name: Some(name.to_string()),
            latitude: Some(52.5),
            longitude: Some(13.4),
        }
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_duration_in_seconds() {
        let trip = TripRecord::new(
            "X1",
            station("5", "A"),
            station("7", "B"),
            t0(),
            t0() + TimeDelta::seconds(600),
        )
        .unwrap();

        assert_eq!(trip.duration, 600);
        assert_eq!(trip.start_station_id, StationId::new("5"));
        assert_eq!(trip.end_station_id, StationId::new("7"));
    }

    #[test]
    fn test_rejects_negative_interval() {
        let trip = TripRecord::new(
            "X1",
            station("5", "A"),
            station("7", "B"),
            t0(),
            t0() - TimeDelta::seconds(1),
        );
        assert!(trip.is_none());
    }

    #[test]
    fn test_serialized_shape() {
        let trip = TripRecord::new(
            "X1",
            station("5", "Alexanderplatz"),
            ResolvedLocation {
                id: StationId::new("404"),
                name: None,
                latitude: None,
                longitude: None,
            },
            t0(),
            t0() + TimeDelta::seconds(90),
        )
        .unwrap();

        let value = serde_json::to_value(&trip).unwrap();
        let object = value.as_object().unwrap();

        let mut keys: Vec<_> = object.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            [
                "duration",
                "end_station_id",
                "end_station_latitude",
                "end_station_longitude",
                "end_station_name",
                "ended_at",
                "start_station_id",
                "start_station_latitude",
                "start_station_longitude",
                "start_station_name",
                "started_at",
            ]
        );
        assert_eq!(value["started_at"], "2023-11-14T22:13:20+00:00");
        assert_eq!(value["ended_at"], "2023-11-14T22:14:50+00:00");
        assert_eq!(value["duration"], 90);
        assert_eq!(value["start_station_id"], 5);
        assert_eq!(value["start_station_name"], "Alexanderplatz");
        assert_eq!(value["end_station_id"], 404);
        assert!(value["end_station_name"].is_null());
        assert!(value["end_station_latitude"].is_null());
    }
}
