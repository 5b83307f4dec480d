//! Persistence of the trip log.
//!
//! The log is written as one pretty-printed JSON array and replaces any
//! previous file atomically.

use anyhow::{Context, Result};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::trip::TripRecord;

/// Writes `trips` to `path` as a JSON array.
///
/// The data goes to a temporary file next to `path` first and is renamed
/// over it only once fully flushed, so a failed write never leaves a
/// truncated log behind.
pub fn write_trips(path: &Path, trips: &[TripRecord]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
    debug!(tmp = %tmp.path().display(), trips = trips.len(), "Serializing trip log");

    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, trips).context("Failed to serialize trips")?;
        writer.write_all(b"\n")?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;

    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to replace {}", path.display()))?;

    info!(path = %path.display(), trips = trips.len(), "Trip log written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ResolvedLocation;
    use crate::snapshot::StationId;
    use chrono::{DateTime, TimeDelta};

    fn trip(start: &str, end: &str, offset: i64) -> TripRecord {
        let location = |id: &str| ResolvedLocation {
            id: StationId::new(id),
            name: Some(format!("Station {id}")),
            latitude: Some(52.5),
            longitude: Some(13.4),
        };
        let started_at = DateTime::from_timestamp(1_700_000_000 + offset, 0).unwrap();
        TripRecord::new(
            "X1",
            location(start),
            location(end),
            started_at,
            started_at + TimeDelta::seconds(300),
        )
        .unwrap()
    }

    #[test]
    fn test_write_trips_creates_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");

        write_trips(&path, &[trip("5", "7", 0), trip("7", "9", 600)]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        let array = value.as_array().unwrap();
        assert_eq!(array.len(), 2);
        assert_eq!(array[0]["start_station_id"], 5);
        assert_eq!(array[1]["end_station_name"], "Station 9");
    }

    #[test]
    fn test_write_trips_overwrites_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");

        write_trips(&path, &[trip("5", "7", 0), trip("7", "9", 600)]).unwrap();
        write_trips(&path, &[trip("1", "2", 0)]).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 1);

        // no temporary files left behind
        let entries = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_write_empty_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data.json");

        write_trips(&path, &[]).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value, serde_json::json!([]));
    }

    #[test]
    fn test_write_into_missing_parent_that_is_a_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "x").unwrap();

        let result = write_trips(&blocker.join("data.json"), &[]);

        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&blocker).unwrap(), "x");
    }
}
