use std::fs::File;
use std::io;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::config::LabelRule;
use crate::error::DataSourceError;
use crate::models::{DonorRecord, DonorTable};

pub const FALLBACK_ROWS: usize = 100;

pub const REQUIRED_COLUMNS: [&str; 6] = [
    "DONOR_AGE",
    "LIFETIME_GIFT_AMOUNT",
    "RECENT_AVG_GIFT_AMT",
    "MONTHS_SINCE_LAST_GIFT",
    "RECENT_RESPONSE_PROP",
    "MEDIAN_HOUSEHOLD_INCOME",
];

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "DONOR_AGE")]
    donor_age: Option<f64>,
    #[serde(rename = "LIFETIME_GIFT_AMOUNT")]
    lifetime_gift_amount: Option<f64>,
    #[serde(rename = "RECENT_AVG_GIFT_AMT")]
    recent_avg_gift_amt: Option<f64>,
    #[serde(rename = "MONTHS_SINCE_LAST_GIFT")]
    months_since_last_gift: Option<f64>,
    #[serde(rename = "RECENT_RESPONSE_PROP")]
    recent_response_prop: Option<f64>,
    #[serde(rename = "MEDIAN_HOUSEHOLD_INCOME")]
    median_household_income: Option<f64>,
}

/// Loads donor records from a CSV file, imputes missing ages with the column
/// median and derives the likely-donor label.
///
/// Values are otherwise passed through unvalidated: negative or out-of-range
/// amounts reach the models as-is.
pub fn load(path: &Path, rule: &LabelRule) -> Result<DonorTable, DataSourceError> {
    let file = File::open(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => DataSourceError::NotFound {
            path: path.to_path_buf(),
        },
        _ => DataSourceError::Open {
            path: path.to_path_buf(),
            source,
        },
    })?;

    let read_error = |source: csv::Error| DataSourceError::Read {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::Reader::from_reader(file);
    if let Some(column) = missing_column(&mut reader).map_err(read_error)? {
        return Err(DataSourceError::MissingColumn {
            path: path.to_path_buf(),
            column,
        });
    }
    let records = read_records(reader, rule).map_err(read_error)?;

    if records.is_empty() {
        return Err(DataSourceError::Empty {
            path: path.to_path_buf(),
        });
    }

    info!(rows = records.len(), path = %path.display(), "loaded donor table");
    Ok(DonorTable::from_records(records))
}

/// First required column absent from the header row, if any.
pub fn missing_column<R: io::Read>(
    reader: &mut csv::Reader<R>,
) -> Result<Option<&'static str>, csv::Error> {
    let headers = reader.headers()?;
    Ok(REQUIRED_COLUMNS
        .into_iter()
        .find(|column| !headers.iter().any(|header| header == *column)))
}

/// Literal `NaN` cells count as missing, like empty ones.
fn present(value: Option<f64>) -> Option<f64> {
    value.filter(|v| !v.is_nan())
}

pub fn read_records<R: io::Read>(
    mut reader: csv::Reader<R>,
    rule: &LabelRule,
) -> Result<Vec<DonorRecord>, csv::Error> {
    let mut records = Vec::new();

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result?;
        let recent_avg_gift_amount = present(row.recent_avg_gift_amt);
        let months_since_last_gift = present(row.months_since_last_gift);

        records.push(DonorRecord {
            row: index + 1,
            age: present(row.donor_age),
            lifetime_gift_amount: present(row.lifetime_gift_amount),
            recent_avg_gift_amount,
            months_since_last_gift,
            recent_response_prop: present(row.recent_response_prop),
            median_household_income: present(row.median_household_income),
            likely_donor: is_likely_donor(rule, recent_avg_gift_amount, months_since_last_gift),
        });
    }

    impute_median_age(&mut records);
    Ok(records)
}

/// Missing inputs never satisfy the rule.
pub fn is_likely_donor(
    rule: &LabelRule,
    recent_avg_gift_amount: Option<f64>,
    months_since_last_gift: Option<f64>,
) -> bool {
    match (recent_avg_gift_amount, months_since_last_gift) {
        (Some(amount), Some(months)) => {
            amount > rule.gift_threshold && months < rule.recency_threshold_months
        }
        _ => false,
    }
}

fn impute_median_age(records: &mut [DonorRecord]) {
    let ages: Vec<f64> = records.iter().filter_map(|r| r.age).collect();
    let Some(median) = median(ages) else {
        debug!("no ages present; leaving age column empty");
        return;
    };

    let mut imputed = 0usize;
    for record in records.iter_mut().filter(|r| r.age.is_none()) {
        record.age = Some(median);
        imputed += 1;
    }
    if imputed > 0 {
        debug!(imputed, median, "imputed missing donor ages");
    }
}

pub fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Stand-in table used when no donor file is available: identical donors aged
/// 30 with 100 in lifetime giving and every other field missing.
pub fn synthetic_fallback(rule: &LabelRule) -> DonorTable {
    let records = (1..=FALLBACK_ROWS)
        .map(|row| DonorRecord {
            row,
            age: Some(30.0),
            lifetime_gift_amount: Some(100.0),
            recent_avg_gift_amount: None,
            months_since_last_gift: None,
            recent_response_prop: None,
            median_household_income: None,
            likely_donor: is_likely_donor(rule, None, None),
        })
        .collect();
    DonorTable::from_records(records)
}
