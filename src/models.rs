use std::path::PathBuf;

use serde::Serialize;

use crate::error::ExternalSignalError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DonorRecord {
    /// 1-based position in the source table.
    pub row: usize,
    pub age: Option<f64>,
    pub lifetime_gift_amount: Option<f64>,
    pub recent_avg_gift_amount: Option<f64>,
    pub months_since_last_gift: Option<f64>,
    pub recent_response_prop: Option<f64>,
    pub median_household_income: Option<f64>,
    pub likely_donor: bool,
}

/// A donor record plus the columns appended by later pipeline stages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DonorRow {
    #[serde(flatten)]
    pub record: DonorRecord,
    pub probability: Option<f64>,
    pub cluster_id: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DonorTable {
    pub rows: Vec<DonorRow>,
}

impl DonorTable {
    pub fn from_records(records: Vec<DonorRecord>) -> Self {
        Self {
            rows: records
                .into_iter()
                .map(|record| DonorRow {
                    record,
                    probability: None,
                    cluster_id: None,
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows whose lifetime giving is strictly above `min_lifetime_gift`.
    pub fn qualified(&self, min_lifetime_gift: f64) -> Vec<&DonorRow> {
        self.rows
            .iter()
            .filter(|row| {
                row.record
                    .lifetime_gift_amount
                    .is_some_and(|amount| amount > min_lifetime_gift)
            })
            .collect()
    }
}

/// Outcome of one collaborator call: a live value or a degraded default with the error.
#[derive(Debug, Clone, PartialEq)]
pub enum Collected<T> {
    Live(T),
    Degraded { value: T, error: ExternalSignalError },
}

impl<T> Collected<T> {
    pub fn into_value(self) -> T {
        match self {
            Collected::Live(value) => value,
            Collected::Degraded { value, .. } => value,
        }
    }

    pub fn status(&self) -> SourceStatus {
        match self {
            Collected::Live(_) => SourceStatus::Live,
            Collected::Degraded { error, .. } => SourceStatus::Degraded {
                error: error.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceStatus {
    Live,
    Degraded { error: ExternalSignalError },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalBatch {
    pub query: String,
    pub snippets: Vec<String>,
    /// Latest search interest on a 0-100 scale.
    pub trend_magnitude: u8,
    pub news_status: SourceStatus,
    pub trend_status: SourceStatus,
}

impl SignalBatch {
    pub fn signal_source(&self) -> SignalSource {
        match (&self.news_status, &self.trend_status) {
            (SourceStatus::Live, SourceStatus::Live) => SignalSource::Live,
            (SourceStatus::Degraded { .. }, SourceStatus::Degraded { .. }) => {
                SignalSource::Offline
            }
            _ => SignalSource::Partial,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UrgencyScore {
    pub value: f64,
    pub scored: usize,
    pub negative: usize,
}

impl UrgencyScore {
    pub const NEUTRAL: f64 = 0.5;

    pub fn neutral() -> Self {
        Self {
            value: Self::NEUTRAL,
            scored: 0,
            negative: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum DonorSource {
    File(PathBuf),
    SyntheticFallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    /// Both collaborators answered.
    Live,
    /// One collaborator degraded.
    Partial,
    /// Both collaborators degraded; the batch holds defaults only.
    Offline,
    /// Synthetic headlines and a fixed urgency replaced an offline batch.
    Simulated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Provenance {
    pub donors: DonorSource,
    pub signals: SignalSource,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonaSummary {
    pub cluster_id: usize,
    pub donor_count: usize,
    pub avg_age: f64,
    pub avg_lifetime_gift: f64,
    pub avg_probability: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(row: usize, lifetime: Option<f64>) -> DonorRecord {
        DonorRecord {
            row,
            age: Some(40.0),
            lifetime_gift_amount: lifetime,
            recent_avg_gift_amount: None,
            months_since_last_gift: None,
            recent_response_prop: None,
            median_household_income: None,
            likely_donor: false,
        }
    }

    #[test]
    fn qualified_is_strictly_greater_and_skips_missing() {
        let table = DonorTable::from_records(vec![
            record(1, Some(50.0)),
            record(2, Some(50.01)),
            record(3, None),
            record(4, Some(500.0)),
        ]);
        let rows: Vec<usize> = table.qualified(50.0).iter().map(|r| r.record.row).collect();
        assert_eq!(rows, vec![2, 4]);
    }

    #[test]
    fn signal_source_follows_collaborator_status() {
        let degraded = SourceStatus::Degraded {
            error: ExternalSignalError::Timeout,
        };
        let mut batch = SignalBatch {
            query: "flood".to_string(),
            snippets: vec![],
            trend_magnitude: 0,
            news_status: SourceStatus::Live,
            trend_status: SourceStatus::Live,
        };
        assert_eq!(batch.signal_source(), SignalSource::Live);
        batch.trend_status = degraded.clone();
        assert_eq!(batch.signal_source(), SignalSource::Partial);
        batch.news_status = degraded;
        assert_eq!(batch.signal_source(), SignalSource::Offline);
    }

    #[test]
    fn collected_keeps_the_typed_error() {
        let collected: Collected<u8> = Collected::Degraded {
            value: 0,
            error: ExternalSignalError::MissingCredential,
        };
        assert_eq!(
            collected.status(),
            SourceStatus::Degraded {
                error: ExternalSignalError::MissingCredential
            }
        );
        assert_eq!(collected.into_value(), 0);
    }

    #[test]
    fn degraded_status_serializes_error_kind() {
        let status = SourceStatus::Degraded {
            error: ExternalSignalError::Transport("connection refused".to_string()),
        };
        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            serde_json::json!({
                "status": "degraded",
                "error": { "kind": "transport", "detail": "connection refused" }
            })
        );
        assert_eq!(
            serde_json::to_value(SourceStatus::Live).unwrap(),
            serde_json::json!({ "status": "live" })
        );
    }
}
