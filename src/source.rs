//! Where station information and free bike status documents come from.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::fetch::{HttpClient, fetch_bytes};
use crate::gbfs::{FreeBikeStatus, StationInformation, parse_free_bike_status, parse_station_information};

/// Abstraction over a GBFS publisher.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Returns the current station metadata.
    async fn station_information(&self) -> Result<StationInformation>;

    /// Returns the current vehicle positions.
    async fn free_bike_status(&self) -> Result<FreeBikeStatus>;
}

/// [`FeedSource`] reading the two GBFS endpoints over HTTP.
pub struct GbfsClient<C> {
    client: C,
    station_information_url: String,
    free_bike_status_url: String,
}

impl<C: HttpClient> GbfsClient<C> {
    pub fn new(
        client: C,
        station_information_url: impl Into<String>,
        free_bike_status_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            station_information_url: station_information_url.into(),
            free_bike_status_url: free_bike_status_url.into(),
        }
    }
}

#[async_trait]
impl<C: HttpClient> FeedSource for GbfsClient<C> {
    #[tracing::instrument(skip(self), fields(url = %self.station_information_url))]
    async fn station_information(&self) -> Result<StationInformation> {
        let bytes = fetch_bytes(&self.client, &self.station_information_url)
            .await
            .with_context(|| format!("Failed to fetch {}", self.station_information_url))?;
        debug!(bytes = bytes.len(), "Station information received");
        parse_station_information(&bytes)
    }

    #[tracing::instrument(skip(self), fields(url = %self.free_bike_status_url))]
    async fn free_bike_status(&self) -> Result<FreeBikeStatus> {
        let bytes = fetch_bytes(&self.client, &self.free_bike_status_url)
            .await
            .with_context(|| format!("Failed to fetch {}", self.free_bike_status_url))?;
        debug!(bytes = bytes.len(), "Free bike status received");
        parse_free_bike_status(&bytes)
    }
}
