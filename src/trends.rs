use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::debug;

use crate::config::{parse_base_url, SignalConfig};
use crate::error::ExternalSignalError;
use crate::signals::TrendSource;

#[derive(Debug, Deserialize)]
struct InterestResponse {
    #[serde(default)]
    timeline: Vec<InterestPoint>,
}

#[derive(Debug, Deserialize)]
struct InterestPoint {
    value: f64,
}

/// Search-interest lookup over a fixed recent window.
///
/// The endpoint answers `GET /api/interest?keyword=..&timeframe=..` with a
/// timeline of points on a 0-100 scale, oldest first.
#[derive(Debug, Clone)]
pub struct TrendClient {
    client: Client,
    base_url: Option<Url>,
    window: String,
}

impl TrendClient {
    pub fn new(config: &SignalConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build trends HTTP client")?;
        let base_url = config
            .trends_base_url
            .as_deref()
            .map(parse_base_url)
            .transpose()
            .context("invalid trends base URL")?;

        Ok(Self {
            client,
            base_url,
            window: config.trend_window.clone(),
        })
    }
}

#[async_trait]
impl TrendSource for TrendClient {
    /// Latest interest value, or 0 when the window holds no data.
    async fn latest_interest(&self, query: &str) -> Result<u8, ExternalSignalError> {
        let Some(base_url) = &self.base_url else {
            return Err(ExternalSignalError::NotConfigured);
        };
        let url = base_url
            .join("api/interest")
            .map_err(|err| ExternalSignalError::Transport(err.to_string()))?;

        debug!(query, window = %self.window, "fetching search interest");
        let response = self
            .client
            .get(url)
            .query(&[("keyword", query), ("timeframe", self.window.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExternalSignalError::Status {
                code: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body = response.text().await?;
        let parsed: InterestResponse = serde_json::from_str(&body)
            .map_err(|err| ExternalSignalError::Malformed(err.to_string()))?;

        let latest = parsed.timeline.last().map_or(0.0, |point| point.value);
        if !latest.is_finite() {
            return Err(ExternalSignalError::Malformed(format!(
                "interest value {latest} is not a number"
            )));
        }
        Ok(latest.round().clamp(0.0, 100.0) as u8)
    }
}
