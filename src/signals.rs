use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::UrgencyConfig;
use crate::error::ExternalSignalError;
use crate::models::{Collected, SignalBatch, UrgencyScore};
use crate::sentiment::{truncate_tokens, Sentiment, SentimentClassifier};

pub const SIMULATED_TREND: u8 = 85;
pub const SIMULATED_URGENCY: f64 = 0.78;

/// Article search by keyword. The query is passed through untouched.
#[async_trait]
pub trait NewsSource: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<String>, ExternalSignalError>;
}

/// Latest search-interest magnitude (0-100) for a keyword.
#[async_trait]
pub trait TrendSource: Send + Sync {
    async fn latest_interest(&self, query: &str) -> Result<u8, ExternalSignalError>;
}

/// Gathers crisis signals and reduces them to an urgency score.
pub struct SignalAggregator {
    news: Box<dyn NewsSource>,
    trends: Box<dyn TrendSource>,
    sentiment: Arc<dyn SentimentClassifier>,
    config: UrgencyConfig,
}

impl SignalAggregator {
    pub fn new(
        news: Box<dyn NewsSource>,
        trends: Box<dyn TrendSource>,
        sentiment: Arc<dyn SentimentClassifier>,
        config: UrgencyConfig,
    ) -> Self {
        Self {
            news,
            trends,
            sentiment,
            config,
        }
    }

    /// Queries both collaborators concurrently, once each.
    ///
    /// A failing collaborator contributes an empty snippet list or a zero
    /// trend and is marked degraded; it never aborts the other.
    pub async fn fetch(&self, query: &str) -> SignalBatch {
        let (news, trend) = tokio::join!(self.collect_news(query), self.collect_trend(query));

        let batch = SignalBatch {
            query: query.to_string(),
            news_status: news.status(),
            trend_status: trend.status(),
            snippets: news.into_value(),
            trend_magnitude: trend.into_value(),
        };
        info!(
            query,
            snippets = batch.snippets.len(),
            trend = batch.trend_magnitude,
            source = ?batch.signal_source(),
            "collected crisis signals"
        );
        batch
    }

    async fn collect_news(&self, query: &str) -> Collected<Vec<String>> {
        match self.news.search(query).await {
            Ok(snippets) => Collected::Live(snippets),
            Err(error) => {
                warn!(%error, "news search degraded");
                Collected::Degraded {
                    value: Vec::new(),
                    error,
                }
            }
        }
    }

    async fn collect_trend(&self, query: &str) -> Collected<u8> {
        match self.trends.latest_interest(query).await {
            Ok(value) => Collected::Live(value),
            Err(error) => {
                warn!(%error, "trend lookup degraded");
                Collected::Degraded { value: 0, error }
            }
        }
    }

    /// Fraction of the first `max_snippets` snippets classified negative.
    /// No snippets gives the neutral 0.5.
    pub async fn score_urgency(&self, snippets: &[String]) -> UrgencyScore {
        let sample = &snippets[..snippets.len().min(self.config.max_snippets)];
        if sample.is_empty() {
            return UrgencyScore::neutral();
        }

        let limit = self
            .config
            .max_input_tokens
            .min(self.sentiment.max_input_tokens());
        let inputs: Vec<String> = sample
            .iter()
            .map(|text| truncate_tokens(text, limit).to_string())
            .collect();

        let sentiment = Arc::clone(&self.sentiment);
        let labels = match tokio::task::spawn_blocking(move || sentiment.classify(&inputs)).await {
            Ok(labels) => labels,
            Err(error) => {
                warn!(%error, "sentiment scoring failed; using neutral urgency");
                return UrgencyScore::neutral();
            }
        };
        let negative = labels
            .iter()
            .filter(|label| **label == Sentiment::Negative)
            .count();

        UrgencyScore {
            value: negative as f64 / sample.len() as f64,
            scored: sample.len(),
            negative,
        }
    }
}

/// Fills an offline batch with two synthetic headlines and a high trend.
/// The collaborator statuses keep the errors that took the batch offline.
pub fn simulated_batch(offline: SignalBatch) -> SignalBatch {
    let crisis = &offline.query;
    let snippets = vec![
        format!("Breaking: Conflict escalates in {crisis}"),
        format!("Aid required immediately for {crisis}"),
    ];
    SignalBatch {
        snippets,
        trend_magnitude: SIMULATED_TREND,
        ..offline
    }
}

pub fn simulated_urgency() -> UrgencyScore {
    UrgencyScore {
        value: SIMULATED_URGENCY,
        scored: 0,
        negative: 0,
    }
}
