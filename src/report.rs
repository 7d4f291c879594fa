use std::fmt::Write;

use serde::Serialize;

use crate::campaign::{self, CampaignCopy};
use crate::models::{DonorSource, DonorRow, PersonaSummary, SignalSource};
use crate::pipeline::PipelineOutput;
use crate::segment;

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub min_lifetime_gift: f64,
    pub qualified_donors: usize,
    pub estimated_pipeline_value: u64,
    pub personas: Vec<PersonaSummary>,
    pub copy: CampaignCopy,
}

/// Derives the presentation figures for one run.
///
/// Copy is generated for persona 0, as the dashboard does.
pub fn summarize_run(output: &PipelineOutput, min_lifetime_gift: f64, ask_amount: u32) -> RunSummary {
    let qualified = output.table.qualified(min_lifetime_gift).len();
    RunSummary {
        min_lifetime_gift,
        qualified_donors: qualified,
        estimated_pipeline_value: qualified as u64 * u64::from(ask_amount),
        personas: segment::summarize(&output.table),
        copy: campaign::generate_copy(0, output.urgency.value, &output.crisis, ask_amount),
    }
}

pub fn top_prospects(output: &PipelineOutput, min_lifetime_gift: f64, limit: usize) -> Vec<&DonorRow> {
    let mut prospects = output.table.qualified(min_lifetime_gift);
    prospects.sort_by(|a, b| {
        b.probability
            .unwrap_or(0.0)
            .total_cmp(&a.probability.unwrap_or(0.0))
            .then(a.record.row.cmp(&b.record.row))
    });
    prospects.truncate(limit);
    prospects
}

fn signal_label(source: SignalSource) -> &'static str {
    match source {
        SignalSource::Live => "live",
        SignalSource::Partial => "partial (one source degraded)",
        SignalSource::Offline => "offline (defaults only)",
        SignalSource::Simulated => "simulated",
    }
}

fn fmt_opt(value: Option<f64>, precision: usize) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.precision$}"))
}

pub fn build_report(output: &PipelineOutput, min_lifetime_gift: f64, ask_amount: u32) -> String {
    let summary = summarize_run(output, min_lifetime_gift, ask_amount);
    let mut out = String::new();

    let _ = writeln!(out, "# Crisis Donor Segmentation Report");
    let _ = writeln!(
        out,
        "Generated for {} on {} (run {})",
        output.crisis,
        output.generated_at.format("%Y-%m-%d %H:%M UTC"),
        output.run_id
    );
    let _ = writeln!(out);

    let _ = writeln!(out, "## Crisis Signals");
    let _ = writeln!(out, "- Urgency score: {:.2}", output.urgency.value);
    let _ = writeln!(out, "- Search interest: {}", output.signals.trend_magnitude);
    let _ = writeln!(
        out,
        "- Signal provenance: {}",
        signal_label(output.provenance.signals)
    );
    let donor_source = match &output.provenance.donors {
        DonorSource::File(path) => path.display().to_string(),
        DonorSource::SyntheticFallback => "synthetic fallback table".to_string(),
    };
    let _ = writeln!(out, "- Donor source: {donor_source}");
    let _ = writeln!(out);

    if output.signals.snippets.is_empty() {
        let _ = writeln!(out, "No news signals were ingested for this crisis.");
    } else {
        for snippet in output.signals.snippets.iter().take(5) {
            let _ = writeln!(out, "- {snippet}");
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "## Persona Mix");
    if summary.personas.is_empty() {
        let _ = writeln!(out, "No donors were segmented.");
    } else {
        for persona in &summary.personas {
            let _ = writeln!(
                out,
                "- Cluster {}: {} donors (avg age {:.1}, avg lifetime ${:.2}, avg probability {:.2})",
                persona.cluster_id,
                persona.donor_count,
                persona.avg_age,
                persona.avg_lifetime_gift,
                persona.avg_probability
            );
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "## Top Prospects");
    let _ = writeln!(
        out,
        "{} qualified donors above ${:.0} lifetime giving, est. pipeline value ${}",
        summary.qualified_donors, min_lifetime_gift, summary.estimated_pipeline_value
    );
    let prospects = top_prospects(output, min_lifetime_gift, 10);
    if prospects.is_empty() {
        let _ = writeln!(out, "No donors meet the giving threshold.");
    } else {
        for row in prospects {
            let _ = writeln!(
                out,
                "- Row {} (cluster {}, age {}, lifetime ${}) probability {}",
                row.record.row,
                row.cluster_id.map_or_else(|| "-".to_string(), |c| c.to_string()),
                fmt_opt(row.record.age, 0),
                fmt_opt(row.record.lifetime_gift_amount, 2),
                fmt_opt(row.probability, 2)
            );
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "## Suggested Campaign Copy");
    let _ = writeln!(out, "**{}**", summary.copy.headline);
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", summary.copy.body);
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", summary.copy.ask);
    let _ = writeln!(out);
    let _ = writeln!(out, "Social: {}", summary.copy.social_post(&output.crisis));

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DonorRecord, DonorTable, Provenance, SignalBatch, SourceStatus, UrgencyScore};
    use chrono::Utc;
    use uuid::Uuid;

    fn output(rows: Vec<(f64, f64, usize)>, snippets: Vec<&str>, urgency: f64) -> PipelineOutput {
        let mut table = DonorTable::from_records(
            rows.iter()
                .enumerate()
                .map(|(i, &(lifetime, _, _))| DonorRecord {
                    row: i + 1,
                    age: Some(40.0 + i as f64),
                    lifetime_gift_amount: Some(lifetime),
                    recent_avg_gift_amount: None,
                    months_since_last_gift: None,
                    recent_response_prop: None,
                    median_household_income: None,
                    likely_donor: false,
                })
                .collect(),
        );
        for (row, &(_, p, c)) in table.rows.iter_mut().zip(rows.iter()) {
            row.probability = Some(p);
            row.cluster_id = Some(c);
        }

        PipelineOutput {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            crisis: "Sudan War".to_string(),
            table,
            signals: SignalBatch {
                query: "Sudan War".to_string(),
                snippets: snippets.into_iter().map(str::to_string).collect(),
                trend_magnitude: 64,
                news_status: SourceStatus::Live,
                trend_status: SourceStatus::Live,
            },
            urgency: UrgencyScore {
                value: urgency,
                scored: 2,
                negative: 1,
            },
            provenance: Provenance {
                donors: DonorSource::SyntheticFallback,
                signals: SignalSource::Live,
            },
        }
    }

    #[test]
    fn summary_counts_qualified_donors_and_value() {
        let out = output(
            vec![(20.0, 0.1, 0), (80.0, 0.9, 1), (400.0, 0.5, 1)],
            vec![],
            0.5,
        );
        let summary = summarize_run(&out, 50.0, 50);
        assert_eq!(summary.qualified_donors, 2);
        assert_eq!(summary.estimated_pipeline_value, 100);
        assert_eq!(summary.personas.len(), 2);
        assert_eq!(summary.copy.cluster_id, 0);
    }

    #[test]
    fn prospects_sort_by_probability() {
        let out = output(
            vec![(100.0, 0.2, 0), (100.0, 0.9, 0), (10.0, 1.0, 0), (100.0, 0.5, 0)],
            vec![],
            0.5,
        );
        let rows: Vec<usize> = top_prospects(&out, 50.0, 2)
            .iter()
            .map(|r| r.record.row)
            .collect();
        assert_eq!(rows, vec![2, 4]);
    }

    #[test]
    fn report_includes_sections_and_copy() {
        let out = output(
            vec![(120.0, 0.8, 0)],
            vec!["Fighting spreads", "Aid convoy arrives"],
            0.8,
        );
        let report = build_report(&out, 50.0, 50);
        assert!(report.contains("# Crisis Donor Segmentation Report"));
        assert!(report.contains("- Urgency score: 0.80"));
        assert!(report.contains("- Fighting spreads"));
        assert!(report.contains("- Cluster 0: 1 donors"));
        assert!(report.contains("synthetic fallback table"));
        assert!(report.contains("URGENT ACTION REQUIRED: Help Sudan War Victims"));
        assert!(report.contains("#Relief #SudanWar"));
    }

    #[test]
    fn report_handles_empty_signals_and_no_prospects() {
        let out = output(vec![(5.0, 0.1, 0)], vec![], 0.5);
        let report = build_report(&out, 50.0, 50);
        assert!(report.contains("No news signals were ingested"));
        assert!(report.contains("No donors meet the giving threshold."));
    }
}
