use std::collections::{BTreeMap, HashSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::config::SegmentConfig;
use crate::error::ModelFitError;
use crate::models::{DonorTable, PersonaSummary};

pub const SEGMENT_COLUMNS: [&str; 3] = ["DONOR_AGE", "LIFETIME_GIFT_AMOUNT", "probability"];

type Point = [f64; 3];

/// Groups donors into personas with k-means over z-scored age, lifetime giving
/// and predicted probability.
///
/// Cluster ids carry no meaning across runs.
#[derive(Debug, Clone)]
pub struct PersonaSegmenter {
    config: SegmentConfig,
}

impl PersonaSegmenter {
    pub fn new(config: SegmentConfig) -> Self {
        Self { config }
    }

    /// Assigns every row a cluster id in `0..min(K, distinct points)`.
    ///
    /// Missing inputs, including a missing probability, are treated as 0.
    pub fn segment(&self, mut table: DonorTable) -> Result<DonorTable, ModelFitError> {
        if self.config.clusters == 0 {
            return Err(ModelFitError::InvalidClusterCount);
        }
        if table.is_empty() {
            return Err(ModelFitError::EmptyTable);
        }

        let mut raw = Vec::with_capacity(table.len());
        for row in &table.rows {
            let point = [
                row.record.age.unwrap_or(0.0),
                row.record.lifetime_gift_amount.unwrap_or(0.0),
                row.probability.unwrap_or(0.0),
            ];
            if let Some(column) = point.iter().position(|v| !v.is_finite()) {
                return Err(ModelFitError::NonFiniteFeature {
                    row: row.record.row,
                    column: SEGMENT_COLUMNS[column],
                });
            }
            raw.push(point);
        }

        let scaled = standardize(&raw);
        let distinct = distinct_points(&scaled);
        let k = self.config.clusters.min(distinct);
        if k < self.config.clusters {
            warn!(
                requested = self.config.clusters,
                distinct, "fewer distinct donors than personas; reducing cluster count"
            );
        }

        let model = KMeans::fit(&scaled, k, &self.config);
        for (row, &cluster) in table.rows.iter_mut().zip(model.assignments.iter()) {
            row.cluster_id = Some(cluster);
        }

        info!(
            rows = table.len(),
            clusters = k,
            iterations = model.iterations,
            inertia = model.inertia,
            "segmented donors into personas"
        );
        Ok(table)
    }
}

/// Z-scores each column with the population standard deviation.
/// Constant columns are centred but left unscaled.
pub fn standardize(points: &[Point]) -> Vec<Point> {
    if points.is_empty() {
        return Vec::new();
    }
    let n = points.len() as f64;
    let mut mean = [0.0; 3];
    let mut scale = [0.0; 3];

    for d in 0..3 {
        mean[d] = points.iter().map(|p| p[d]).sum::<f64>() / n;
        let variance = points.iter().map(|p| (p[d] - mean[d]).powi(2)).sum::<f64>() / n;
        let std = variance.sqrt();
        scale[d] = if std > f64::EPSILON { std } else { 1.0 };
    }

    points
        .iter()
        .map(|p| {
            let mut z = [0.0; 3];
            for d in 0..3 {
                z[d] = (p[d] - mean[d]) / scale[d];
            }
            z
        })
        .collect()
}

fn distinct_points(points: &[Point]) -> usize {
    points
        .iter()
        // +0.0 folds -0.0 into 0.0
        .map(|p| p.map(|v| (v + 0.0).to_bits()))
        .collect::<HashSet<_>>()
        .len()
}

#[derive(Debug)]
struct KMeans {
    assignments: Vec<usize>,
    inertia: f64,
    iterations: usize,
}

impl KMeans {
    /// Lloyd iterations from a seeded k-means++ start.
    ///
    /// `k` must not exceed the number of distinct points, so every initial
    /// centroid is a different point.
    fn fit(data: &[Point], k: usize, config: &SegmentConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut centroids = init_plus_plus(data, k, &mut rng);
        let k = centroids.len();
        let tolerance = config.tolerance * mean_variance(data);

        let mut assignments = vec![0usize; data.len()];
        let mut iterations = 0;

        while iterations < config.max_iterations {
            iterations += 1;
            assign(data, &centroids, &mut assignments);

            let mut sums = vec![[0.0; 3]; k];
            let mut counts = vec![0usize; k];
            for (point, &cluster) in data.iter().zip(assignments.iter()) {
                for d in 0..3 {
                    sums[cluster][d] += point[d];
                }
                counts[cluster] += 1;
            }

            let mut updated = centroids.clone();
            for j in 0..k {
                if counts[j] > 0 {
                    for d in 0..3 {
                        updated[j][d] = sums[j][d] / counts[j] as f64;
                    }
                }
            }
            relocate_empty_clusters(data, &mut updated, &mut assignments, &mut counts);

            let shift: f64 = centroids
                .iter()
                .zip(updated.iter())
                .map(|(a, b)| distance_sq(a, b))
                .sum();
            centroids = updated;
            if shift <= tolerance {
                break;
            }
        }

        let inertia = assign(data, &centroids, &mut assignments);
        debug!(k, iterations, "k-means converged");
        Self {
            assignments,
            inertia,
            iterations,
        }
    }
}

fn init_plus_plus(data: &[Point], k: usize, rng: &mut StdRng) -> Vec<Point> {
    let mut centroids = Vec::with_capacity(k);
    if k == 0 || data.is_empty() {
        return centroids;
    }
    centroids.push(data[rng.random_range(0..data.len())]);

    let mut closest: Vec<f64> = data.iter().map(|p| distance_sq(p, &centroids[0])).collect();
    while centroids.len() < k {
        let total: f64 = closest.iter().sum();
        if total <= 0.0 {
            break;
        }
        let mut target = rng.random::<f64>() * total;
        let mut chosen = closest.len() - 1;
        for (i, &d) in closest.iter().enumerate() {
            if d <= 0.0 {
                continue;
            }
            if target < d {
                chosen = i;
                break;
            }
            target -= d;
        }
        // Floating point leftovers can land on an existing centroid.
        if closest[chosen] <= 0.0 {
            if let Some(i) = closest.iter().rposition(|&d| d > 0.0) {
                chosen = i;
            }
        }

        let centroid = data[chosen];
        for (d, p) in closest.iter_mut().zip(data.iter()) {
            *d = d.min(distance_sq(p, &centroid));
        }
        centroids.push(centroid);
    }
    centroids
}

/// Assigns every point to its nearest centroid and returns the inertia.
fn assign(data: &[Point], centroids: &[Point], assignments: &mut [usize]) -> f64 {
    let mut inertia = 0.0;
    for (point, slot) in data.iter().zip(assignments.iter_mut()) {
        let mut best = 0;
        let mut best_dist = f64::MAX;
        for (j, centroid) in centroids.iter().enumerate() {
            let dist = distance_sq(point, centroid);
            if dist < best_dist {
                best_dist = dist;
                best = j;
            }
        }
        *slot = best;
        inertia += best_dist;
    }
    inertia
}

/// Moves the point farthest from its centroid into each empty cluster.
fn relocate_empty_clusters(
    data: &[Point],
    centroids: &mut [Point],
    assignments: &mut [usize],
    counts: &mut [usize],
) {
    for j in 0..centroids.len() {
        if counts[j] > 0 {
            continue;
        }
        let mut farthest: Option<(usize, f64)> = None;
        for (i, (point, &cluster)) in data.iter().zip(assignments.iter()).enumerate() {
            if counts[cluster] <= 1 {
                continue;
            }
            let dist = distance_sq(point, &centroids[cluster]);
            if farthest.map_or(true, |(_, best)| dist > best) {
                farthest = Some((i, dist));
            }
        }

        if let Some((i, _)) = farthest {
            counts[assignments[i]] -= 1;
            assignments[i] = j;
            counts[j] = 1;
            centroids[j] = data[i];
        }
    }
}

fn mean_variance(data: &[Point]) -> f64 {
    let n = data.len() as f64;
    let mut total = 0.0;
    for d in 0..3 {
        let mean = data.iter().map(|p| p[d]).sum::<f64>() / n;
        total += data.iter().map(|p| (p[d] - mean).powi(2)).sum::<f64>() / n;
    }
    total / 3.0
}

fn distance_sq(a: &Point, b: &Point) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Per-persona size and feature means, ordered by cluster id.
pub fn summarize(table: &DonorTable) -> Vec<PersonaSummary> {
    #[derive(Default)]
    struct Acc {
        count: usize,
        age: (f64, usize),
        lifetime: (f64, usize),
        probability: (f64, usize),
    }

    fn add(slot: &mut (f64, usize), value: Option<f64>) {
        if let Some(v) = value {
            slot.0 += v;
            slot.1 += 1;
        }
    }

    fn mean(slot: (f64, usize)) -> f64 {
        if slot.1 == 0 {
            0.0
        } else {
            slot.0 / slot.1 as f64
        }
    }

    let mut groups: BTreeMap<usize, Acc> = BTreeMap::new();
    for row in &table.rows {
        let Some(cluster) = row.cluster_id else {
            continue;
        };
        let acc = groups.entry(cluster).or_default();
        acc.count += 1;
        add(&mut acc.age, row.record.age);
        add(&mut acc.lifetime, row.record.lifetime_gift_amount);
        add(&mut acc.probability, row.probability);
    }

    groups
        .into_iter()
        .map(|(cluster_id, acc)| PersonaSummary {
            cluster_id,
            donor_count: acc.count,
            avg_age: mean(acc.age),
            avg_lifetime_gift: mean(acc.lifetime),
            avg_probability: mean(acc.probability),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DonorRecord;

    fn table(points: &[(f64, f64, f64)]) -> DonorTable {
        let mut table = DonorTable::from_records(
            points
                .iter()
                .enumerate()
                .map(|(i, &(age, lifetime, _))| DonorRecord {
                    row: i + 1,
                    age: Some(age),
                    lifetime_gift_amount: Some(lifetime),
                    recent_avg_gift_amount: None,
                    months_since_last_gift: None,
                    recent_response_prop: None,
                    median_household_income: None,
                    likely_donor: false,
                })
                .collect(),
        );
        for (row, &(_, _, p)) in table.rows.iter_mut().zip(points.iter()) {
            row.probability = Some(p);
        }
        table
    }

    fn spread(n: usize) -> Vec<(f64, f64, f64)> {
        (0..n)
            .map(|i| {
                (
                    18.0 + (i * 13 % 70) as f64,
                    (i * 97 % 5000) as f64,
                    (i % 11) as f64 / 10.0,
                )
            })
            .collect()
    }

    #[test]
    fn every_row_gets_a_cluster_below_k() {
        let segmented = PersonaSegmenter::new(SegmentConfig::default())
            .segment(table(&spread(200)))
            .unwrap();
        assert!(segmented
            .rows
            .iter()
            .all(|r| r.cluster_id.is_some_and(|c| c < 7)));
    }

    #[test]
    fn exactly_seven_distinct_rows_fill_seven_clusters() {
        let points: Vec<_> = (0..7)
            .map(|i| (20.0 + 10.0 * i as f64, 100.0 * (i * i) as f64, i as f64 / 7.0))
            .collect();
        let segmented = PersonaSegmenter::new(SegmentConfig::default())
            .segment(table(&points))
            .unwrap();
        let used: HashSet<usize> = segmented.rows.iter().filter_map(|r| r.cluster_id).collect();
        assert_eq!(used.len(), 7);
    }

    #[test]
    fn identical_rows_collapse_to_one_cluster() {
        let points = vec![(30.0, 100.0, 0.0); 100];
        let segmented = PersonaSegmenter::new(SegmentConfig::default())
            .segment(table(&points))
            .unwrap();
        assert!(segmented.rows.iter().all(|r| r.cluster_id == Some(0)));
    }

    #[test]
    fn few_distinct_rows_reduce_cluster_count() {
        let mut points = vec![(30.0, 100.0, 0.2); 5];
        points.extend(vec![(70.0, 900.0, 0.9); 5]);
        points.push((50.0, 400.0, 0.5));
        let segmented = PersonaSegmenter::new(SegmentConfig::default())
            .segment(table(&points))
            .unwrap();
        let used: HashSet<usize> = segmented.rows.iter().filter_map(|r| r.cluster_id).collect();
        assert_eq!(used.len(), 3);
        assert!(used.iter().all(|&c| c < 3));
        assert_eq!(segmented.rows[0].cluster_id, segmented.rows[4].cluster_id);
        assert_ne!(segmented.rows[0].cluster_id, segmented.rows[5].cluster_id);
    }

    #[test]
    fn segmentation_is_reproducible() {
        let segmenter = PersonaSegmenter::new(SegmentConfig::default());
        let a = segmenter.segment(table(&spread(150))).unwrap();
        let b = segmenter.segment(table(&spread(150))).unwrap();
        let ids = |t: &DonorTable| t.rows.iter().map(|r| r.cluster_id).collect::<Vec<_>>();
        assert_eq!(ids(&a), ids(&b));
    }

    #[test]
    fn rejects_empty_table_and_zero_clusters() {
        let segmenter = PersonaSegmenter::new(SegmentConfig::default());
        assert_eq!(
            segmenter.segment(DonorTable::default()).unwrap_err(),
            ModelFitError::EmptyTable
        );
        let zero = PersonaSegmenter::new(SegmentConfig {
            clusters: 0,
            ..SegmentConfig::default()
        });
        assert_eq!(
            zero.segment(table(&spread(10))).unwrap_err(),
            ModelFitError::InvalidClusterCount
        );
    }

    #[test]
    fn standardize_gives_zero_mean_unit_variance() {
        let points = vec![[20.0, 100.0, 0.5], [40.0, 300.0, 0.5], [60.0, 800.0, 0.5]];
        let z = standardize(&points);
        for d in 0..2 {
            let mean: f64 = z.iter().map(|p| p[d]).sum::<f64>() / 3.0;
            let var: f64 = z.iter().map(|p| p[d].powi(2)).sum::<f64>() / 3.0;
            assert!(mean.abs() < 1e-9);
            assert!((var - 1.0).abs() < 1e-9);
        }
        assert!(z.iter().all(|p| p[2] == 0.0));
    }

    #[test]
    fn summarize_groups_by_cluster() {
        let mut t = table(&[(30.0, 100.0, 0.2), (50.0, 300.0, 0.6), (70.0, 500.0, 1.0)]);
        t.rows[0].cluster_id = Some(1);
        t.rows[1].cluster_id = Some(0);
        t.rows[2].cluster_id = Some(1);
        let summary = summarize(&t);
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].cluster_id, 0);
        assert_eq!(summary[0].donor_count, 1);
        assert_eq!(summary[1].donor_count, 2);
        assert!((summary[1].avg_age - 50.0).abs() < 1e-9);
        assert!((summary[1].avg_lifetime_gift - 300.0).abs() < 1e-9);
        assert!((summary[1].avg_probability - 0.6).abs() < 1e-9);
    }
}
