use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::classifier::ResponsivenessClassifier;
use crate::config::PipelineConfig;
use crate::error::{DataSourceError, ModelFitError, PipelineError};
use crate::models::{
    DonorSource, DonorTable, Provenance, SignalBatch, SignalSource, UrgencyScore,
};
use crate::news::NewsApiClient;
use crate::segment::PersonaSegmenter;
use crate::sentiment::TransformerClassifier;
use crate::signals::{self, SignalAggregator};
use crate::store;
use crate::trends::TrendClient;

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub crisis: String,
    pub data_path: PathBuf,
    /// Replace an offline signal batch with simulated headlines.
    pub simulate_offline: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub crisis: String,
    pub table: DonorTable,
    pub signals: SignalBatch,
    pub urgency: UrgencyScore,
    pub provenance: Provenance,
}

/// Long-lived stages shared by every run in the process.
///
/// Built once at startup; nothing in it is mutated by a run, so sequential
/// runs reuse it freely. Each run owns its own donor table.
pub struct PipelineContext {
    config: PipelineConfig,
    classifier: ResponsivenessClassifier,
    segmenter: PersonaSegmenter,
    signals: SignalAggregator,
}

impl PipelineContext {
    /// Wires the HTTP collaborators and loads the sentiment model once.
    pub fn new(config: PipelineConfig) -> anyhow::Result<Self> {
        let sentiment = Arc::new(TransformerClassifier::load()?);
        let aggregator = SignalAggregator::new(
            Box::new(NewsApiClient::new(&config.signals)?),
            Box::new(TrendClient::new(&config.signals)?),
            sentiment,
            config.urgency.clone(),
        );
        info!(
            news_credential = config.signals.news_api_key.is_some(),
            trends_configured = config.signals.trends_base_url.is_some(),
            "pipeline context ready"
        );
        Ok(Self::with_signals(config, aggregator))
    }

    pub fn with_signals(config: PipelineConfig, signals: SignalAggregator) -> Self {
        Self {
            classifier: ResponsivenessClassifier::new(config.forest.clone()),
            segmenter: PersonaSegmenter::new(config.segment.clone()),
            signals,
            config,
        }
    }

    /// Loads the donor file, substituting the synthetic table only when the
    /// file does not exist. Unreadable or malformed files are reported.
    pub fn load_donors(&self, path: &Path) -> Result<(DonorTable, DonorSource), DataSourceError> {
        match store::load(path, &self.config.label) {
            Ok(table) => Ok((table, DonorSource::File(path.to_path_buf()))),
            Err(DataSourceError::NotFound { path }) => {
                warn!(path = %path.display(), "donor data missing; using synthetic fallback table");
                Ok((
                    store::synthetic_fallback(&self.config.label),
                    DonorSource::SyntheticFallback,
                ))
            }
            Err(err) => Err(err),
        }
    }

    /// Classifier then segmenter: adds the probability and cluster columns.
    pub fn analyze_donors(&self, table: DonorTable) -> Result<DonorTable, ModelFitError> {
        let table = self.classifier.train(table)?;
        self.segmenter.segment(table)
    }

    pub async fn collect_signals(
        &self,
        crisis: &str,
        simulate_offline: bool,
    ) -> (SignalBatch, UrgencyScore, SignalSource) {
        let batch = self.signals.fetch(crisis).await;
        let source = batch.signal_source();

        if simulate_offline && source == SignalSource::Offline {
            warn!(crisis, "signal collaborators offline; using simulated signals");
            return (
                signals::simulated_batch(batch),
                signals::simulated_urgency(),
                SignalSource::Simulated,
            );
        }

        let urgency = self.signals.score_urgency(&batch.snippets).await;
        (batch, urgency, source)
    }

    pub async fn run(&self, request: &AnalysisRequest) -> Result<PipelineOutput, PipelineError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline_run", %run_id, crisis = %request.crisis);

        async {
            let (batch, urgency, signal_source) = self
                .collect_signals(&request.crisis, request.simulate_offline)
                .await;

            let (table, donor_source) = self.load_donors(&request.data_path)?;
            let table = self.analyze_donors(table)?;

            info!(
                donors = table.len(),
                urgency = urgency.value,
                signals = ?signal_source,
                "pipeline run complete"
            );
            Ok::<_, PipelineError>(PipelineOutput {
                run_id,
                generated_at: Utc::now(),
                crisis: request.crisis.clone(),
                table,
                signals: batch,
                urgency,
                provenance: Provenance {
                    donors: donor_source,
                    signals: signal_source,
                },
            })
        }
        .instrument(span)
        .await
    }
}
