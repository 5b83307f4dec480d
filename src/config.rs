//! Command-line and environment configuration.
//!
//! Every option can also be set through the environment variable named in
//! its `env` attribute; `.env` files are loaded before parsing.

use std::path::PathBuf;
use std::time::Duration;

use chrono::TimeDelta;
use clap::Args;

use crate::geo::Distance;
use crate::poller::PollSettings;
use crate::tracker::TrackerConfig;

pub const DEFAULT_STATION_INFORMATION_URL: &str =
    "https://gbfs.nextbike.net/maps/gbfs/v1/nextbike_bn/de/station_information.json";
pub const DEFAULT_FREE_BIKE_STATUS_URL: &str =
    "https://gbfs.nextbike.net/maps/gbfs/v1/nextbike_bn/de/free_bike_status.json";

/// Feed endpoints and transport options shared by every subcommand.
#[derive(Debug, Clone, Args)]
pub struct FeedArgs {
    /// GBFS station_information.json URL
    #[arg(long, env = "GBFS_STATION_INFORMATION_URL", default_value = DEFAULT_STATION_INFORMATION_URL)]
    pub station_information_url: String,

    /// GBFS free_bike_status.json URL
    #[arg(long, env = "GBFS_FREE_BIKE_STATUS_URL", default_value = DEFAULT_FREE_BIKE_STATUS_URL)]
    pub free_bike_status_url: String,

    /// HTTP request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT", default_value_t = 30)]
    pub request_timeout: u64,
}

impl FeedArgs {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

#[derive(Debug, Clone, Args)]
pub struct TrackArgs {
    #[command(flatten)]
    pub feed: FeedArgs,

    /// JSON file the trip log is written to on shutdown
    #[arg(short, long, env = "TRIP_LOG_PATH", default_value = "data.json")]
    pub output: PathBuf,

    /// Seconds between polls of free_bike_status
    #[arg(short = 'i', long, env = "POLL_INTERVAL", default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_interval: u64,

    /// Poll on the configured interval even when the feed's ttl is longer
    #[arg(long, env = "IGNORE_TTL", default_value_t = false)]
    pub ignore_ttl: bool,

    /// Seconds between station catalog reloads (0 = load once)
    #[arg(long, env = "STATION_REFRESH", default_value_t = 3600)]
    pub station_refresh: u64,

    /// Seconds a vanished vehicle is remembered (0 = forever)
    #[arg(long, env = "GRACE_WINDOW", default_value_t = 86_400)]
    pub grace_window: u64,

    /// Free-floating moves shorter than this many meters are GPS noise
    #[arg(long, env = "JITTER_METERS", default_value_t = 50.0, value_parser = parse_meters)]
    pub jitter_meters: f64,

    /// Bikes this close to a station (meters) count as docked there
    #[arg(long, env = "DOCK_RADIUS_METERS", default_value_t = 10.0, value_parser = parse_meters)]
    pub dock_radius_meters: f64,

    /// Location changes quicker than this many seconds produce no trip
    #[arg(long, env = "MIN_TRIP_SECS", default_value_t = 0)]
    pub min_trip_secs: u32,
}

impl TrackArgs {
    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            jitter_tolerance: Distance::from_meters(self.jitter_meters),
            grace_window: Some(self.grace_window)
                .filter(|&secs| secs > 0)
                .and_then(|secs| i64::try_from(secs).ok())
                .and_then(TimeDelta::try_seconds),
            min_trip_duration: TimeDelta::seconds(i64::from(self.min_trip_secs)),
        }
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_secs(self.poll_interval),
            station_refresh: (self.station_refresh > 0)
                .then(|| Duration::from_secs(self.station_refresh)),
            follow_ttl: !self.ignore_ttl,
        }
    }

    pub fn dock_radius(&self) -> Distance {
        Distance::from_meters(self.dock_radius_meters)
    }
}

fn parse_meters(value: &str) -> Result<f64, String> {
    let meters: f64 = value
        .parse()
        .map_err(|e| format!("`{value}` is not a number: {e}"))?;
    if !meters.is_finite() || meters < 0.0 {
        return Err(format!("`{value}` must be a finite, non-negative distance"));
    }
    Ok(meters)
}
