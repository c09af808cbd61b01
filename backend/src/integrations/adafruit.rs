//! Adafruit IO feed client
//!
//! Feeds live under `<base>/<username>/feeds/<group>.<feed>/data`. Sensor
//! feeds are read, device feeds are written with `1`/`0` to actuate.
//! Without credentials the client stays disabled and every call is a logged
//! no-op returning no data.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::json;

use super::{FeedError, FeedService, FeedValue};
use crate::config::FeedConfig;

#[derive(Deserialize, Debug)]
struct AdafruitDatum {
    value: String,
    created_at: DateTime<Utc>,
}

impl From<AdafruitDatum> for FeedValue {
    fn from(d: AdafruitDatum) -> Self {
        FeedValue::new(d.value, d.created_at)
    }
}

pub struct AdafruitClient {
    client: reqwest::Client,
    base_url: String,
    username: Option<String>,
    api_key: Option<String>,
    group: String,
}

impl AdafruitClient {
    pub fn new(config: &FeedConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build feed HTTP client with timeout, using defaults: {}", e);
                reqwest::Client::new()
            });

        let feed = Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            api_key: config.api_key.clone(),
            group: config.group.clone(),
        };

        if feed.is_enabled() {
            info!("Adafruit IO feed service initialized (group '{}')", feed.group);
        } else {
            warn!("Adafruit IO feed service is disabled (missing ADA_USERNAME or ADAFRUIT_IO_KEY)");
        }
        feed
    }

    fn data_url(&self, feed: &str) -> Option<String> {
        let username = self.username.as_deref()?;
        let key = if self.group.is_empty() {
            feed.to_string()
        } else {
            format!("{}.{}", self.group, feed)
        };
        Some(format!(
            "{}/{}/feeds/{}/data",
            self.base_url,
            urlencoding::encode(username),
            urlencoding::encode(&key)
        ))
    }

    fn api_key(&self) -> &str {
        self.api_key.as_deref().unwrap_or_default()
    }

    async fn get_data(&self, url: &str) -> Result<Vec<FeedValue>, FeedError> {
        let response = self
            .client
            .get(url)
            .header("X-AIO-Key", self.api_key())
            .send()
            .await
            .map_err(|e| FeedError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }

        let data = response
            .json::<Vec<AdafruitDatum>>()
            .await
            .map_err(|e| FeedError::InvalidPayload(e.to_string()))?;

        Ok(data.into_iter().map(FeedValue::from).collect())
    }
}

/// Query string for a ranged read
fn range_query(start: DateTime<Utc>, end: DateTime<Utc>, limit: usize) -> String {
    format!(
        "start_time={}&end_time={}&limit={}",
        urlencoding::encode(&start.to_rfc3339_opts(SecondsFormat::Secs, true)),
        urlencoding::encode(&end.to_rfc3339_opts(SecondsFormat::Secs, true)),
        limit
    )
}

#[async_trait]
impl FeedService for AdafruitClient {
    fn is_enabled(&self) -> bool {
        self.username.is_some() && self.api_key.is_some()
    }

    async fn latest(&self, feed: &str) -> Result<Option<FeedValue>, FeedError> {
        let Some(url) = self.data_url(feed).filter(|_| self.is_enabled()) else {
            debug!("Feed read skipped (disabled): {}", feed);
            return Ok(None);
        };

        let mut data = self.get_data(&format!("{}?limit=1", url)).await?;
        Ok(if data.is_empty() { None } else { Some(data.swap_remove(0)) })
    }

    async fn range(
        &self,
        feed: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<FeedValue>, FeedError> {
        let Some(url) = self.data_url(feed).filter(|_| self.is_enabled()) else {
            debug!("Feed range read skipped (disabled): {}", feed);
            return Ok(Vec::new());
        };

        self.get_data(&format!("{}?{}", url, range_query(start, end, limit)))
            .await
    }

    async fn send(&self, feed: &str, value: &str) -> Result<(), FeedError> {
        let Some(url) = self.data_url(feed).filter(|_| self.is_enabled()) else {
            info!("Feed publish skipped (disabled): feed {}, value {}", feed, value);
            return Ok(());
        };

        info!("Sending to Adafruit IO: feed {}, value {}", feed, value);
        let response = self
            .client
            .post(&url)
            .header("X-AIO-Key", self.api_key())
            .json(&json!({ "value": value }))
            .send()
            .await
            .map_err(|e| FeedError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }
        Ok(())
    }
}
