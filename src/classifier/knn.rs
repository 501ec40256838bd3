use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// Distance below which a training point counts as an exact hit; exact hits
/// take the whole probability mass, mirroring distance-weighted voting.
const EXACT_MATCH_EPS: f32 = 1e-9;

/// Nearest-neighbor model over feature vectors: fitting stores the training
/// matrix, prediction votes over the k nearest points weighted by inverse
/// distance. Immutable once fitted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KnnModel {
    points: Array2<f32>,
    labels: Vec<usize>,
    n_classes: usize,
    k: usize,
}

impl KnnModel {
    pub fn fit(points: Array2<f32>, labels: Vec<usize>, n_classes: usize, k: usize) -> Self {
        debug_assert_eq!(points.nrows(), labels.len());
        Self {
            points,
            labels,
            n_classes,
            k: k.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Distance to the single nearest training point.
    pub fn nearest_distance(&self, vector: &[f32]) -> f32 {
        self.distances(vector)
            .into_iter()
            .fold(f32::INFINITY, f32::min)
    }

    /// Class-probability distribution from distance-weighted voting over the
    /// k nearest neighbors. Zero-distance neighbors take the full mass.
    pub fn predict_proba(&self, vector: &[f32]) -> Vec<f32> {
        let mut neighbors: Vec<(f32, usize)> = self
            .distances(vector)
            .into_iter()
            .zip(self.labels.iter().copied())
            .collect();
        neighbors.sort_by(|a, b| a.0.total_cmp(&b.0));
        neighbors.truncate(self.k);

        let mut proba = vec![0.0f32; self.n_classes];
        let exact: Vec<&(f32, usize)> = neighbors
            .iter()
            .filter(|(d, _)| *d < EXACT_MATCH_EPS)
            .collect();
        if !exact.is_empty() {
            let share = 1.0 / exact.len() as f32;
            for (_, label) in exact {
                proba[*label] += share;
            }
            return proba;
        }

        let mut total = 0.0f32;
        for (distance, label) in &neighbors {
            let weight = 1.0 / distance;
            proba[*label] += weight;
            total += weight;
        }
        if total > 0.0 {
            for p in &mut proba {
                *p /= total;
            }
        }
        proba
    }

    /// Arg-max class and its probability.
    pub fn predict(&self, vector: &[f32]) -> (usize, f32) {
        let proba = self.predict_proba(vector);
        let mut best = (0, 0.0f32);
        for (idx, p) in proba.into_iter().enumerate() {
            if p > best.1 {
                best = (idx, p);
            }
        }
        best
    }

    /// Mean accuracy over a labeled evaluation set.
    pub fn score(&self, points: &Array2<f32>, labels: &[usize]) -> f32 {
        if labels.is_empty() {
            return 0.0;
        }
        let correct = points
            .rows()
            .into_iter()
            .zip(labels.iter())
            .filter(|(row, expected)| {
                let (predicted, _) = self.predict(row.as_slice().unwrap_or(&[]));
                predicted == **expected
            })
            .count();
        correct as f32 / labels.len() as f32
    }

    fn distances(&self, vector: &[f32]) -> Vec<f32> {
        self.points
            .rows()
            .into_iter()
            .map(|row| euclidean(row, vector))
            .collect()
    }
}

fn euclidean(a: ArrayView1<'_, f32>, b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    fn two_cluster_model(k: usize) -> KnnModel {
        // Class 0 near the origin, class 1 near (1, 1).
        let points = arr2(&[
            [0.0, 0.0],
            [0.1, 0.0],
            [0.0, 0.1],
            [1.0, 1.0],
            [0.9, 1.0],
            [1.0, 0.9],
        ]);
        KnnModel::fit(points, vec![0, 0, 0, 1, 1, 1], 2, k)
    }

    #[test]
    fn nearest_distance_finds_closest_point() {
        let model = two_cluster_model(3);
        assert!((model.nearest_distance(&[0.1, 0.0]) - 0.0).abs() < 1e-6);
        let d = model.nearest_distance(&[0.5, 0.5]);
        assert!((d - (0.4f32.powi(2) + 0.5f32.powi(2)).sqrt()).abs() < 1e-5);
    }

    #[test]
    fn votes_favor_the_near_cluster() {
        let model = two_cluster_model(3);
        let (label, confidence) = model.predict(&[0.05, 0.05]);
        assert_eq!(label, 0);
        assert!(confidence > 0.9);

        let (label, _) = model.predict(&[0.95, 0.95]);
        assert_eq!(label, 1);
    }

    #[test]
    fn exact_match_takes_full_mass() {
        let model = two_cluster_model(3);
        let proba = model.predict_proba(&[1.0, 1.0]);
        assert_eq!(proba, vec![0.0, 1.0]);
    }

    #[test]
    fn proba_sums_to_one() {
        let model = two_cluster_model(5);
        let proba = model.predict_proba(&[0.4, 0.6]);
        let sum: f32 = proba.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn score_counts_correct_predictions() {
        let model = two_cluster_model(3);
        let eval = arr2(&[[0.0, 0.05], [0.95, 1.0]]);
        assert_eq!(model.score(&eval, &[0, 1]), 1.0);
        assert_eq!(model.score(&eval, &[1, 0]), 0.0);
    }

    #[test]
    fn k_larger_than_set_uses_all_points() {
        let points = arr2(&[[0.0, 0.0], [1.0, 1.0]]);
        let model = KnnModel::fit(points, vec![0, 1], 2, 5);
        let (label, _) = model.predict(&[0.1, 0.1]);
        assert_eq!(label, 0);
    }
}
