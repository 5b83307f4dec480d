//! The polling loop.
//!
//! One fetch at a time, applied in fetch order. Every wait (station refresh,
//! fetch, sleep) races the cancellation token; a fetch interrupted by
//! cancellation is dropped without touching any state.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::reconstructor::TripReconstructor;
use crate::source::FeedSource;

/// Extra wait after a feed's ttl expires, for publisher delays and clock skew.
const TTL_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
pub struct PollSettings {
    pub interval: Duration,
    /// How often to reload station information. `None` keeps the catalog
    /// loaded at startup.
    pub station_refresh: Option<Duration>,
    /// Wait for the feed's advertised ttl when it ends after `interval`.
    pub follow_ttl: bool,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            station_refresh: Some(Duration::from_secs(3600)),
            follow_ttl: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    pub polls: u64,
    pub failed_polls: u64,
    pub trips: u64,
}

/// Time to wait before the next poll.
///
/// This is `interval`, stretched to the end of the feed's ttl (plus a one
/// second grace) when the publisher will not refresh before then.
pub fn next_poll_delay(
    settings: &PollSettings,
    last_updated: DateTime<Utc>,
    ttl: Option<u64>,
    now: DateTime<Utc>,
) -> Duration {
    let Some(refresh_at) = ttl
        .filter(|_| settings.follow_ttl)
        .and_then(|ttl| i64::try_from(ttl).ok())
        .and_then(TimeDelta::try_seconds)
        .and_then(|ttl| last_updated.checked_add_signed(ttl))
    else {
        return settings.interval;
    };
    let until_refresh = (refresh_at - now).to_std().unwrap_or_default() + TTL_GRACE;
    settings.interval.max(until_refresh)
}

/// Polls `source` until `cancel` fires, feeding every snapshot into
/// `reconstructor`. Fetch failures are logged and retried on the next tick.
#[tracing::instrument(skip_all, fields(interval_secs = settings.interval.as_secs()))]
pub async fn run<S: FeedSource>(
    source: &S,
    reconstructor: &mut TripReconstructor,
    settings: &PollSettings,
    cancel: &CancellationToken,
) -> PollReport {
    let mut report = PollReport::default();
    let mut last_refresh = Instant::now();

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let refresh_due = settings
            .station_refresh
            .is_some_and(|every| last_refresh.elapsed() >= every);
        if refresh_due {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = source.station_information() => match result {
                    Ok(doc) => reconstructor.refresh_catalog(&doc),
                    Err(e) => warn!(error = %e, "Station refresh failed, keeping previous catalog"),
                },
            }
            last_refresh = Instant::now();
        }

        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Shutdown requested, discarding in-flight fetch");
                break;
            }
            result = source.free_bike_status() => result,
        };
        report.polls += 1;

        let delay = match fetched {
            Ok(doc) => {
                let closed = reconstructor.on_free_bike_status(&doc);
                report.trips += closed as u64;
                info!(
                    last_updated = %doc.last_updated,
                    bikes = doc.data.bikes.len(),
                    tracked = reconstructor.vehicles().len(),
                    closed,
                    total = reconstructor.trip_log().len(),
                    "Poll complete"
                );
                next_poll_delay(settings, doc.last_updated, doc.ttl, Utc::now())
            }
            Err(e) => {
                report.failed_polls += 1;
                warn!(error = %e, "Free bike status fetch failed, retrying next poll");
                settings.interval
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    info!(
        polls = report.polls,
        failed_polls = report.failed_polls,
        trips = report.trips,
        "Polling stopped"
    );
    report
}

/// Polls until `cancel` fires, then writes the whole trip log to `output`
/// exactly once.
///
/// # Errors
///
/// Fails only when the trip log cannot be written.
pub async fn track_until_cancelled<S: FeedSource>(
    source: &S,
    reconstructor: &mut TripReconstructor,
    settings: &PollSettings,
    cancel: &CancellationToken,
    output: &Path,
) -> Result<PollReport> {
    let report = run(source, reconstructor, settings, cancel).await;

    let log = reconstructor.trip_log();
    log.write_to(output).inspect_err(|e| {
        error!(error = %e, trips = log.len(), path = %output.display(), "Failed to write trip log");
    })?;
    Ok(report)
}
