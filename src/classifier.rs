use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::config::ForestConfig;
use crate::error::ModelFitError;
use crate::models::{DonorRecord, DonorTable};

pub const FEATURE_COLUMNS: [&str; 5] = [
    "DONOR_AGE",
    "LIFETIME_GIFT_AMOUNT",
    "RECENT_RESPONSE_PROP",
    "MONTHS_SINCE_LAST_GIFT",
    "MEDIAN_HOUSEHOLD_INCOME",
];

const FEATURE_COUNT: usize = FEATURE_COLUMNS.len();

type Features = [f64; FEATURE_COUNT];

/// Bagged decision trees predicting the likely-donor label.
///
/// The fit is a point-in-time fit over the whole table: no holdout, no tuning.
/// With the same table and seed every probability is reproduced exactly.
#[derive(Debug, Clone)]
pub struct ResponsivenessClassifier {
    config: ForestConfig,
}

impl ResponsivenessClassifier {
    pub fn new(config: ForestConfig) -> Self {
        Self { config }
    }

    /// Fits the forest on `table` and fills every row's probability column.
    pub fn train(&self, mut table: DonorTable) -> Result<DonorTable, ModelFitError> {
        let features = feature_matrix(&table)?;
        let labels: Vec<bool> = table.rows.iter().map(|r| r.record.likely_donor).collect();

        let forest = RandomForest::fit(&features, &labels, &self.config)?;
        for (row, x) in table.rows.iter_mut().zip(features.iter()) {
            row.probability = Some(forest.predict_proba(x));
        }

        info!(
            rows = table.len(),
            trees = self.config.trees,
            positives = labels.iter().filter(|&&l| l).count(),
            "fitted responsiveness classifier"
        );
        Ok(table)
    }
}

/// Classifier inputs with missing values filled with 0.
fn feature_matrix(table: &DonorTable) -> Result<Vec<Features>, ModelFitError> {
    if table.is_empty() {
        return Err(ModelFitError::EmptyTable);
    }

    table
        .rows
        .iter()
        .map(|row| {
            let x = features_of(&row.record);
            match x.iter().position(|v| !v.is_finite()) {
                Some(column) => Err(ModelFitError::NonFiniteFeature {
                    row: row.record.row,
                    column: FEATURE_COLUMNS[column],
                }),
                None => Ok(x),
            }
        })
        .collect()
}

fn features_of(record: &DonorRecord) -> Features {
    [
        record.age.unwrap_or(0.0),
        record.lifetime_gift_amount.unwrap_or(0.0),
        record.recent_response_prop.unwrap_or(0.0),
        record.months_since_last_gift.unwrap_or(0.0),
        record.median_household_income.unwrap_or(0.0),
    ]
}

#[derive(Debug)]
struct RandomForest {
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    fn fit(x: &[Features], y: &[bool], config: &ForestConfig) -> Result<Self, ModelFitError> {
        if x.is_empty() {
            return Err(ModelFitError::EmptyTable);
        }
        if config.trees == 0 {
            return Err(ModelFitError::InvalidTreeCount);
        }

        let mut rng = StdRng::seed_from_u64(config.seed);
        let n = x.len();
        let trees = (0..config.trees)
            .map(|_| {
                let sample: Vec<usize> = (0..n).map(|_| rng.random_range(0..n)).collect();
                DecisionTree::fit(x, y, sample, &mut rng)
            })
            .collect::<Vec<_>>();

        debug!(
            nodes = trees.iter().map(|t| t.nodes.len()).sum::<usize>(),
            "grew forest"
        );
        Ok(Self { trees })
    }

    fn predict_proba(&self, x: &Features) -> f64 {
        let total: f64 = self.trees.iter().map(|tree| tree.predict(x)).sum();
        (total / self.trees.len() as f64).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy)]
enum Node {
    Leaf {
        positive_rate: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Fully grown CART tree using Gini impurity, stored as a flat node arena.
#[derive(Debug)]
struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    fn fit(x: &[Features], y: &[bool], sample: Vec<usize>, rng: &mut StdRng) -> Self {
        let mut nodes = vec![Node::Leaf { positive_rate: 0.0 }];
        let mut pending = vec![(0usize, sample)];

        while let Some((id, indices)) = pending.pop() {
            let positives = indices.iter().filter(|&&i| y[i]).count();
            let positive_rate = positives as f64 / indices.len() as f64;

            if positives == 0 || positives == indices.len() {
                nodes[id] = Node::Leaf { positive_rate };
                continue;
            }

            let Some((feature, threshold)) = best_split(x, y, &indices, positives, rng) else {
                nodes[id] = Node::Leaf { positive_rate };
                continue;
            };

            let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
                .into_iter()
                .partition(|&i| x[i][feature] <= threshold);

            let left = nodes.len();
            let right = left + 1;
            nodes.push(Node::Leaf { positive_rate: 0.0 });
            nodes.push(Node::Leaf { positive_rate: 0.0 });
            nodes[id] = Node::Split {
                feature,
                threshold,
                left,
                right,
            };
            pending.push((left, left_indices));
            pending.push((right, right_indices));
        }

        Self { nodes }
    }

    fn predict(&self, x: &Features) -> f64 {
        let mut id = 0;
        loop {
            match self.nodes[id] {
                Node::Leaf { positive_rate } => return positive_rate,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if x[feature] <= threshold { left } else { right };
                }
            }
        }
    }
}

/// Lowest weighted Gini split over a random subset of sqrt(features) columns.
/// Further columns are drawn only while every drawn column is constant.
fn best_split(
    x: &[Features],
    y: &[bool],
    indices: &[usize],
    positives: usize,
    rng: &mut StdRng,
) -> Option<(usize, f64)> {
    let max_features = ((FEATURE_COUNT as f64).sqrt() as usize).max(1);
    let mut order: Vec<usize> = (0..FEATURE_COUNT).collect();
    order.shuffle(rng);

    let n = indices.len();
    let mut best: Option<(f64, usize, f64)> = None;

    for (visited, &feature) in order.iter().enumerate() {
        if visited >= max_features && best.is_some() {
            break;
        }

        let mut values: Vec<(f64, bool)> = indices.iter().map(|&i| (x[i][feature], y[i])).collect();
        values.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut left_positives = 0usize;
        for k in 0..n - 1 {
            if values[k].1 {
                left_positives += 1;
            }
            let (lo, hi) = (values[k].0, values[k + 1].0);
            if lo == hi {
                continue;
            }

            let left_n = k + 1;
            let right_n = n - left_n;
            let impurity = left_n as f64 * gini(left_positives, left_n)
                + right_n as f64 * gini(positives - left_positives, right_n);

            if best.map_or(true, |(current, _, _)| impurity < current) {
                let mut threshold = lo / 2.0 + hi / 2.0;
                if threshold == hi || !threshold.is_finite() {
                    threshold = lo;
                }
                best = Some((impurity, feature, threshold));
            }
        }
    }

    best.map(|(_, feature, threshold)| (feature, threshold))
}

fn gini(positives: usize, total: usize) -> f64 {
    let p = positives as f64 / total as f64;
    2.0 * p * (1.0 - p)
}
