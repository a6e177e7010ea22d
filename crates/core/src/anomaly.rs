//! Batch anomaly scoring with an isolation forest.
//!
//! The forest is fit once over the whole batch's vital-sign matrix and then used to
//! score every row of that same batch, so scores are only meaningful relative to
//! the batch they came from.
//!
//! Scoring follows the usual isolation-forest formulation:
//! - each tree is grown on `min(max_samples, n)` rows drawn without replacement,
//!   splitting on a random non-constant feature at a uniform random threshold,
//!   up to depth `ceil(log2(sample size))`
//! - a row's raw score is `-2^(-E[h(x)] / c(sample size))`, where `h` is the path
//!   length (plus `c(leaf size)` for unresolved leaves)
//! - the decision offset is the `contamination` percentile of the raw batch scores,
//!   and `anomaly_score = raw - offset`; negative means anomaly

use crate::config::ScorerConfig;
use crate::record::{AnomalyAnnotation, AnomalyStatus, TabularRow, VitalSign};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const FEATURES: usize = 3;

/// One row of the imputed vital-sign matrix.
pub type VitalVector = [f64; FEATURES];

/// Euler–Mascheroni constant, used by the harmonic-number approximation in [`average_path_length`].
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Fits an isolation forest per batch and annotates every row.
#[derive(Clone, Debug)]
pub struct AnomalyScorer {
    config: ScorerConfig,
}

impl AnomalyScorer {
    pub fn new(config: ScorerConfig) -> Self {
        Self { config }
    }

    /// Annotate every row of the batch, in input order.
    ///
    /// An empty batch yields an empty annotation set.
    pub fn score(&self, rows: &[TabularRow]) -> Vec<AnomalyAnnotation> {
        self.score_matrix(&impute_vitals(rows))
    }

    /// Annotate a pre-imputed matrix.
    pub fn score_matrix(&self, matrix: &[VitalVector]) -> Vec<AnomalyAnnotation> {
        if matrix.is_empty() {
            return Vec::new();
        }

        let forest = IsolationForest::fit(
            matrix,
            self.config.n_trees(),
            self.config.max_samples(),
            self.config.seed(),
        );
        let raw: Vec<f64> = matrix.iter().map(|x| forest.score_sample(x)).collect();
        let offset = percentile(&raw, self.config.contamination() * 100.0);

        let annotations: Vec<AnomalyAnnotation> = raw
            .into_iter()
            .map(|s| {
                let score = s - offset;
                let status = if score < 0.0 {
                    AnomalyStatus::Anomaly
                } else {
                    AnomalyStatus::Normal
                };
                AnomalyAnnotation { score, status }
            })
            .collect();

        let anomalies = annotations
            .iter()
            .filter(|a| a.status == AnomalyStatus::Anomaly)
            .count();
        tracing::info!(
            rows = annotations.len(),
            anomalies,
            contamination = self.config.contamination(),
            "anomaly scoring complete"
        );

        annotations
    }
}

/// Build the numeric matrix, replacing missing or non-numeric cells with the
/// column mean over the batch. A column with no numeric cells at all is filled
/// with `0.0`.
pub fn impute_vitals(rows: &[TabularRow]) -> Vec<VitalVector> {
    let mut means = [0.0; FEATURES];
    for (feature, vital) in VitalSign::ALL.iter().enumerate() {
        // Running mean, so large finite cells cannot overflow a sum.
        let (mean, count) = rows
            .iter()
            .filter_map(|row| row.vital(*vital))
            .fold((0.0, 0usize), |(mean, count), v| {
                let n = (count + 1) as f64;
                (mean - mean / n + v / n, count + 1)
            });
        if count == 0 {
            if !rows.is_empty() {
                tracing::warn!(
                    column = vital.column(),
                    "column has no numeric values; imputing 0.0"
                );
            }
        } else {
            means[feature] = mean;
        }
    }

    rows.iter()
        .map(|row| {
            let mut vector = means;
            for (feature, vital) in VitalSign::ALL.iter().enumerate() {
                if let Some(v) = row.vital(*vital) {
                    vector[feature] = v;
                }
            }
            vector
        })
        .collect()
}

#[derive(Debug)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
    Leaf {
        size: usize,
    },
}

#[derive(Debug)]
struct IsolationForest {
    trees: Vec<Node>,
    sample_size: usize,
}

impl IsolationForest {
    fn fit(matrix: &[VitalVector], n_trees: usize, max_samples: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let sample_size = max_samples.min(matrix.len());
        let height_limit = (sample_size.max(2) as f64).log2().ceil() as usize;

        let trees = (0..n_trees)
            .map(|_| {
                let mut sample: Vec<&VitalVector> =
                    rand::seq::index::sample(&mut rng, matrix.len(), sample_size)
                        .into_iter()
                        .map(|i| &matrix[i])
                        .collect();
                grow(&mut sample, 0, height_limit, &mut rng)
            })
            .collect();

        Self { trees, sample_size }
    }

    /// Raw isolation score in `[-1, 0)`; lower is more anomalous.
    fn score_sample(&self, x: &VitalVector) -> f64 {
        let normaliser = average_path_length(self.sample_size);
        if normaliser == 0.0 {
            // A single-row sample cannot separate anything.
            return -0.5;
        }
        let mean_depth = self
            .trees
            .iter()
            .map(|tree| path_length(tree, x, 0))
            .sum::<f64>()
            / self.trees.len() as f64;
        -(2f64).powf(-mean_depth / normaliser)
    }
}

fn grow(sample: &mut [&VitalVector], depth: usize, height_limit: usize, rng: &mut StdRng) -> Node {
    if depth >= height_limit || sample.len() <= 1 {
        return Node::Leaf { size: sample.len() };
    }

    // Only features with spread can split this node.
    let candidates: Vec<(usize, f64, f64)> = (0..FEATURES)
        .filter_map(|feature| {
            let (min, max) = sample.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), x| {
                (lo.min(x[feature]), hi.max(x[feature]))
            });
            (max > min).then_some((feature, min, max))
        })
        .collect();
    if candidates.is_empty() {
        return Node::Leaf { size: sample.len() };
    }

    let (feature, min, max) = candidates[rng.gen_range(0..candidates.len())];
    // Interpolate rather than sample `min..max`, whose width can overflow to infinity.
    let t: f64 = rng.gen();
    let threshold = min * (1.0 - t) + max * t;

    let mut split = 0;
    for i in 0..sample.len() {
        if sample[i][feature] < threshold {
            sample.swap(i, split);
            split += 1;
        }
    }
    let (left, right) = sample.split_at_mut(split);

    Node::Split {
        feature,
        threshold,
        left: Box::new(grow(left, depth + 1, height_limit, rng)),
        right: Box::new(grow(right, depth + 1, height_limit, rng)),
    }
}

fn path_length(node: &Node, x: &VitalVector, depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + average_path_length(*size),
        Node::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            if x[*feature] < *threshold {
                path_length(left, x, depth + 1)
            } else {
                path_length(right, x, depth + 1)
            }
        }
    }
}

/// Average path length of an unsuccessful binary-search-tree lookup over `n` items.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Percentile with linear interpolation between closest ranks.
fn percentile(values: &[f64], pct: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = (pct / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(hr: &str, sys: &str, dia: &str) -> TabularRow {
        TabularRow {
            heart_rate: hr.into(),
            blood_pressure_systolic: sys.into(),
            blood_pressure_diastolic: dia.into(),
            ..TabularRow::default()
        }
    }

    /// 95 tightly clustered rows followed by 5 extreme ones.
    fn clustered_batch() -> Vec<TabularRow> {
        let mut rows: Vec<TabularRow> = (0..95)
            .map(|i| {
                row(
                    &(65 + i % 15).to_string(),
                    &(112 + i % 17).to_string(),
                    &(72 + i % 11).to_string(),
                )
            })
            .collect();
        rows.push(row("190", "210", "130"));
        rows.push(row("31", "70", "40"));
        rows.push(row("185", "90", "125"));
        rows.push(row("35", "200", "45"));
        rows.push(row("170", "205", "40"));
        rows
    }

    fn scorer() -> AnomalyScorer {
        AnomalyScorer::new(ScorerConfig::default())
    }

    #[test]
    fn empty_batch_yields_no_annotations() {
        assert!(scorer().score(&[]).is_empty());
    }

    #[test]
    fn every_row_is_annotated_in_order() {
        let rows = clustered_batch();
        let annotations = scorer().score(&rows);
        assert_eq!(annotations.len(), rows.len());
        for a in &annotations {
            assert_eq!(a.status == AnomalyStatus::Anomaly, a.score < 0.0);
        }
    }

    #[test]
    fn anomaly_fraction_tracks_contamination() {
        let annotations = scorer().score(&clustered_batch());
        let anomalies = annotations
            .iter()
            .filter(|a| a.status == AnomalyStatus::Anomaly)
            .count();
        assert!((3..=7).contains(&anomalies), "got {anomalies} anomalies");
    }

    #[test]
    fn extreme_rows_score_lowest() {
        let annotations = scorer().score(&clustered_batch());
        let cluster_min = annotations[..95]
            .iter()
            .map(|a| a.score)
            .fold(f64::INFINITY, f64::min);
        let outliers_max = annotations[95..]
            .iter()
            .map(|a| a.score)
            .fold(f64::NEG_INFINITY, f64::max);
        assert!(outliers_max < cluster_min);
        assert!(annotations[95..]
            .iter()
            .all(|a| a.status == AnomalyStatus::Anomaly));
    }

    #[test]
    fn same_seed_gives_identical_classification() {
        let rows = clustered_batch();
        let first = scorer().score(&rows);
        let second = scorer().score(&rows);
        let statuses = |a: &[AnomalyAnnotation]| a.iter().map(|x| x.status).collect::<Vec<_>>();
        assert_eq!(statuses(&first), statuses(&second));
    }

    #[test]
    fn imputes_missing_cells_with_column_mean() {
        let rows = vec![row("60", "x", ""), row("80", "120", ""), row("", "140", "")];
        let matrix = impute_vitals(&rows);
        assert_eq!(matrix.len(), 3);
        assert_eq!(matrix[2][0], 70.0);
        assert_eq!(matrix[0][1], 130.0);
        // No numeric diastolic values at all: zero fallback.
        assert!(matrix.iter().all(|v| v[2] == 0.0));
    }

    #[test]
    fn imputed_mean_of_huge_values_stays_finite() {
        let rows = vec![row("1e308", "", ""), row("1.5e308", "", ""), row("", "", "")];
        let matrix = impute_vitals(&rows);
        assert!(matrix[2][0].is_finite());
        assert!((matrix[2][0] - 1.25e308).abs() < 1e295);
    }

    #[test]
    fn extreme_opposite_sign_vitals_do_not_panic() {
        let rows = vec![
            row("-1e308", "120", "80"),
            row("1e308", "120", "80"),
            row("72", "120", "80"),
            row("75", "120", "80"),
        ];
        let annotations = scorer().score(&rows);
        assert_eq!(annotations.len(), 4);
        assert!(annotations.iter().all(|a| a.score.is_finite()));
    }

    #[test]
    fn single_row_batch_is_normal() {
        let annotations = scorer().score(&[row("72", "120", "80")]);
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].status, AnomalyStatus::Normal);
    }

    #[test]
    fn constant_batch_has_no_anomalies() {
        let rows: Vec<TabularRow> = (0..20).map(|_| row("72", "120", "80")).collect();
        let annotations = scorer().score(&rows);
        assert!(annotations
            .iter()
            .all(|a| a.status == AnomalyStatus::Normal));
    }

    #[test]
    fn percentile_interpolates_linearly() {
        let values = [4.0, 1.0, 3.0, 2.0, 5.0];
        assert_eq!(percentile(&values, 0.0), 1.0);
        assert_eq!(percentile(&values, 50.0), 3.0);
        assert_eq!(percentile(&values, 100.0), 5.0);
        assert!((percentile(&values, 5.0) - 1.2).abs() < 1e-12);
    }

    #[test]
    fn average_path_length_matches_known_values() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        // c(256) ≈ 10.2448
        assert!((average_path_length(256) - 10.2448).abs() < 1e-3);
    }
}
