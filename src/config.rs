use std::{env, time::Duration};

use reqwest::Url;
use thiserror::Error;

pub const DEFAULT_NEWS_BASE_URL: &str = "https://newsapi.org";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

/// Heuristic that derives the likely-donor label at load time.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelRule {
    pub gift_threshold: f64,
    pub recency_threshold_months: f64,
}

impl Default for LabelRule {
    fn default() -> Self {
        Self {
            gift_threshold: 10.0,
            recency_threshold_months: 18.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForestConfig {
    pub trees: usize,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self { trees: 50, seed: 42 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentConfig {
    pub clusters: usize,
    pub seed: u64,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            clusters: 7,
            seed: 42,
            max_iterations: 300,
            tolerance: 1e-4,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UrgencyConfig {
    /// Snippets beyond this many are not scored.
    pub max_snippets: usize,
    /// Classifier input limit in tokens; longer snippets are truncated.
    pub max_input_tokens: usize,
}

impl Default for UrgencyConfig {
    fn default() -> Self {
        Self {
            max_snippets: 10,
            max_input_tokens: 512,
        }
    }
}

/// Collaborator endpoints and credentials, read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalConfig {
    pub news_api_key: Option<String>,
    pub news_base_url: String,
    pub news_page_size: usize,
    pub trends_base_url: Option<String>,
    pub trend_window: String,
    pub timeout: Duration,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            news_api_key: None,
            news_base_url: DEFAULT_NEWS_BASE_URL.to_string(),
            news_page_size: 15,
            trends_base_url: None,
            trend_window: "now 7-d".to_string(),
            timeout: Duration::from_millis(10_000),
        }
    }
}

impl SignalConfig {
    /// Reads `NEWS_API_KEY`, `NEWS_API_BASE_URL`, `TRENDS_BASE_URL` and `SIGNAL_TIMEOUT_MS`.
    ///
    /// A missing credential is not an error here; the news collaborator degrades instead.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when `SIGNAL_TIMEOUT_MS` is not a positive integer.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_blank = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let timeout = match non_blank("SIGNAL_TIMEOUT_MS") {
            Some(raw) => Duration::from_millis(parse_positive_u64("SIGNAL_TIMEOUT_MS", &raw)?),
            None => defaults.timeout,
        };

        Ok(Self {
            news_api_key: non_blank("NEWS_API_KEY"),
            news_base_url: non_blank("NEWS_API_BASE_URL").unwrap_or(defaults.news_base_url),
            news_page_size: defaults.news_page_size,
            trends_base_url: non_blank("TRENDS_BASE_URL"),
            trend_window: defaults.trend_window,
            timeout,
        })
    }
}

fn parse_positive_u64(name: &'static str, raw: &str) -> Result<u64, ConfigError> {
    let value = raw
        .trim()
        .parse::<u64>()
        .map_err(|err| ConfigError::Invalid {
            name,
            source: err.into(),
        })?;
    if value == 0 {
        return Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("must be greater than zero"),
        });
    }
    Ok(value)
}

/// Parses a collaborator base URL with a trailing slash, so relative joins
/// append to its path instead of replacing the last segment.
pub fn parse_base_url(raw: &str) -> anyhow::Result<Url> {
    let mut url = Url::parse(raw)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineConfig {
    pub label: LabelRule,
    pub forest: ForestConfig,
    pub segment: SegmentConfig,
    pub urgency: UrgencyConfig,
    pub signals: SignalConfig,
}
