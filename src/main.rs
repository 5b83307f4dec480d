//! CLI entry point for the bike trip tracker.
//!
//! `track` polls a GBFS feed, reconstructs trips from bikes changing location
//! between polls and writes them out once interrupted. `stations` prints the
//! station catalog a feed publishes.

use anyhow::{Context, Result};
use bike_trip_tracker::{
    catalog::{DEFAULT_DOCK_RADIUS, LocationCatalog},
    config::{FeedArgs, TrackArgs},
    fetch::BasicClient,
    poller,
    reconstructor::TripReconstructor,
    source::{FeedSource, GbfsClient},
};
use clap::{Parser, Subcommand};
use std::ffi::OsStr;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "bike_trip_tracker")]
#[command(about = "Reconstruct bike-share trips from GBFS free bike status polls", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the feed and write reconstructed trips on Ctrl+C
    Track(TrackArgs),
    /// List the stations published by the feed
    Stations(FeedArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/bike_trip_tracker.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("bike_trip_tracker.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Track(args) => track(args).await?,
        Commands::Stations(feed) => list_stations(feed).await?,
    }

    Ok(())
}

fn gbfs_client(feed: &FeedArgs) -> Result<GbfsClient<BasicClient>> {
    let http = BasicClient::with_timeout(feed.request_timeout())
        .context("Failed to build HTTP client")?;
    Ok(GbfsClient::new(
        http,
        feed.station_information_url.clone(),
        feed.free_bike_status_url.clone(),
    ))
}

/// Runs the polling loop until Ctrl+C, then writes the trip log exactly once.
#[tracing::instrument(skip_all, fields(output = %args.output.display()))]
async fn track(args: TrackArgs) -> Result<()> {
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, stopping");
                signal_token.cancel();
            }
            Err(e) => error!(error = %e, "Failed to listen for interrupt"),
        }
    });

    let source = gbfs_client(&args.feed)?;

    let catalog = tokio::select! {
        biased;
        _ = cancel.cancelled() => LocationCatalog::new(args.dock_radius()),
        stations = source.station_information() => {
            let stations = stations.context("Could not load station information")?;
            let catalog = LocationCatalog::from_station_information(&stations, args.dock_radius());
            info!(stations = catalog.len(), "Station catalog loaded");
            catalog
        }
    };

    let mut reconstructor = TripReconstructor::new(catalog, args.tracker_config());

    info!("Polling. Press Ctrl+C to stop and write the trip log.");
    poller::track_until_cancelled(
        &source,
        &mut reconstructor,
        &args.poll_settings(),
        &cancel,
        &args.output,
    )
    .await?;

    Ok(())
}

/// Fetches station information once and logs every station.
#[tracing::instrument(skip_all, fields(url = %feed.station_information_url))]
async fn list_stations(feed: FeedArgs) -> Result<()> {
    let source = gbfs_client(&feed)?;
    let doc = source.station_information().await?;
    let catalog = LocationCatalog::from_station_information(&doc, DEFAULT_DOCK_RADIUS);

    for station in catalog.iter() {
        info!(
            station_id = %station.id,
            name = %station.name,
            position = %station.position,
            "Station"
        );
    }

    info!(
        total = catalog.len(),
        published = doc.data.stations.len(),
        last_updated = %doc.last_updated,
        ttl = doc.ttl,
        "Station list summary"
    );

    Ok(())
}
