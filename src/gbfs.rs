//! JSON document model for GBFS `station_information` and `free_bike_status`
//! feeds (v1 and v2 layouts).

use anyhow::{Context, Result};
use chrono::{DateTime, SubsecRound, Utc};
use serde::de::{self, Deserializer};
use serde::Deserialize;

/// Common GBFS envelope around every feed's `data` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedEnvelope<T> {
    #[serde(deserialize_with = "timestamp")]
    pub last_updated: DateTime<Utc>,
    /// Seconds until the publisher refreshes the document.
    #[serde(default)]
    pub ttl: Option<u64>,
    pub data: T,
}

pub type StationInformation = FeedEnvelope<StationList>;
pub type FreeBikeStatus = FeedEnvelope<BikeList>;

#[derive(Debug, Clone, Deserialize)]
pub struct StationList {
    pub stations: Vec<StationEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StationEntry {
    #[serde(deserialize_with = "string_or_number")]
    pub station_id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BikeList {
    #[serde(alias = "vehicles")]
    pub bikes: Vec<BikeEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BikeEntry {
    #[serde(alias = "vehicle_id", deserialize_with = "string_or_number")]
    pub bike_id: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub station_id: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    pub is_disabled: bool,
}

/// Decodes a `station_information.json` document.
///
/// # Errors
///
/// Returns an error if the bytes are not a valid station information feed.
pub fn parse_station_information(bytes: &[u8]) -> Result<StationInformation> {
    serde_json::from_slice(bytes).context("invalid station_information document")
}

/// Decodes a `free_bike_status.json` document.
///
/// # Errors
///
/// Returns an error if the bytes are not a valid free bike status feed.
pub fn parse_free_bike_status(bytes: &[u8]) -> Result<FreeBikeStatus> {
    serde_json::from_slice(bytes).context("invalid free_bike_status document")
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Posix(i64),
    Text(String),
}

// whole seconds only, so trip durations match the written timestamps
fn timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    match RawTimestamp::deserialize(deserializer)? {
        RawTimestamp::Posix(secs) => DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| de::Error::custom(format!("timestamp {secs} out of range"))),
        RawTimestamp::Text(text) => DateTime::parse_from_rfc3339(&text)
            .map(|t| t.with_timezone(&Utc).trunc_subsecs(0))
            .map_err(de::Error::custom),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Integer(i64),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(text) => text,
            RawId::Integer(n) => n.to_string(),
        }
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    RawId::deserialize(deserializer).map(String::from)
}

fn optional_string_or_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(Option::<RawId>::deserialize(deserializer)?.map(String::from))
}

// v1 feeds publish 0/1, v2 publishes booleans
fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawFlag {
        Bool(bool),
        Integer(i64),
    }

    Ok(match Option::<RawFlag>::deserialize(deserializer)? {
        Some(RawFlag::Bool(b)) => b,
        Some(RawFlag::Integer(n)) => n != 0,
        None => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_v1_free_bike_status() {
        let json = br#"{
            "last_updated": 1700000000,
            "ttl": 60,
            "data": {"bikes": [
                {"bike_id": "X1", "lat": 52.52, "lon": 13.40, "is_reserved": 0, "is_disabled": 1},
                {"bike_id": "X2", "lat": 52.53, "lon": 13.41, "is_reserved": 0, "is_disabled": 0, "station_id": "5"}
            ]}
        }"#;

        let doc = parse_free_bike_status(json).unwrap();
        assert_eq!(doc.last_updated.timestamp(), 1_700_000_000);
        assert_eq!(doc.ttl, Some(60));
        assert_eq!(doc.data.bikes.len(), 2);
        assert!(doc.data.bikes[0].is_disabled);
        assert_eq!(doc.data.bikes[0].station_id, None);
        assert_eq!(doc.data.bikes[1].station_id.as_deref(), Some("5"));
        assert!(!doc.data.bikes[1].is_disabled);
    }

    #[test]
    fn test_parse_v2_vehicle_aliases_and_booleans() {
        let json = br#"{
            "last_updated": "2023-11-14T22:13:20+00:00",
            "data": {"vehicles": [
                {"vehicle_id": "v-9", "station_id": 17, "is_reserved": false, "is_disabled": true}
            ]}
        }"#;

        let doc = parse_free_bike_status(json).unwrap();
        assert_eq!(doc.last_updated.timestamp(), 1_700_000_000);
        assert_eq!(doc.ttl, None);
        let bike = &doc.data.bikes[0];
        assert_eq!(bike.bike_id, "v-9");
        assert_eq!(bike.station_id.as_deref(), Some("17"));
        assert!(bike.is_disabled);
        assert_eq!(bike.lat, None);
    }

    #[test]
    fn test_parse_station_information_numeric_ids() {
        let json = br#"{
            "last_updated": 1700000000,
            "ttl": 3600,
            "data": {"stations": [
                {"station_id": 5, "name": "Alexanderplatz", "lat": 52.5219, "lon": 13.4132},
                {"station_id": "7", "name": "Hauptbahnhof", "lat": 52.5251, "lon": 13.3694}
            ]}
        }"#;

        let doc = parse_station_information(json).unwrap();
        let ids: Vec<_> = doc.data.stations.iter().map(|s| s.station_id.as_str()).collect();
        assert_eq!(ids, ["5", "7"]);
        assert_eq!(doc.data.stations[0].name, "Alexanderplatz");
    }

    #[test]
    fn test_parse_rejects_malformed_document() {
        assert!(parse_free_bike_status(b"{\"data\": {}}").is_err());
        assert!(parse_station_information(b"not json").is_err());
    }

    #[test]
    fn test_null_station_id_is_none() {
        let json = br#"{"last_updated": 0, "data": {"bikes": [
            {"bike_id": "a", "lat": 1.0, "lon": 2.0, "station_id": null}
        ]}}"#;

        let doc = parse_free_bike_status(json).unwrap();
        assert_eq!(doc.data.bikes[0].station_id, None);
        assert!(!doc.data.bikes[0].is_disabled);
    }

    #[test]
    fn test_fractional_timestamp_truncated_to_seconds() {
        let json = br#"{"last_updated": "2023-11-14T22:13:20.999+00:00", "data": {"bikes": []}}"#;

        let doc = parse_free_bike_status(json).unwrap();
        assert_eq!(doc.last_updated.timestamp(), 1_700_000_000);
        assert_eq!(doc.last_updated.timestamp_subsec_nanos(), 0);
    }
}
