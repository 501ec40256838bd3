pub mod knn;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::features::FEATURE_LEN;
use crate::storage::Storage;
use crate::types::GestureMap;
use knn::KnnModel;

/// Largest neighbor count considered during voting; shrinks with tiny
/// training sets.
const MAX_NEIGHBORS: usize = 5;
/// Held-out share for evaluation when the sample set allows a split.
const TEST_FRACTION: f32 = 0.2;

/// Trained model plus the label mapping and the accuracy it was persisted
/// with. Replaced atomically by each training run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub model: KnnModel,
    pub classes: Vec<String>,
    pub accuracy: f32,
}

/// Progress milestones emitted during training. The callback runs on the
/// training worker; callers marshal observable side effects back onto the
/// orchestration thread.
pub type ProgressFn<'a> = &'a mut dyn FnMut(u8, f32, &str);

pub struct TrainOutcome {
    pub accuracy: f32,
    pub artifact: Option<ModelArtifact>,
}

/// Decision layer over the nearest-neighbor model: outlier rejection on
/// nearest distance, then a confidence gate on the vote distribution.
pub struct Classifier {
    artifact: Option<ModelArtifact>,
    outlier_distance: f32,
}

impl Classifier {
    pub fn new(outlier_distance: f32) -> Self {
        Self {
            artifact: None,
            outlier_distance,
        }
    }

    /// Restores the persisted model if one exists.
    pub fn load(storage: &Storage, outlier_distance: f32) -> Self {
        let artifact: Option<ModelArtifact> = storage.load_model();
        if let Some(art) = &artifact {
            log::info!(
                "loaded trained model (accuracy {:.1}%, {} samples, {} classes)",
                art.accuracy * 100.0,
                art.model.len(),
                art.model.n_classes()
            );
        }
        Self {
            artifact,
            outlier_distance,
        }
    }

    pub fn model_loaded(&self) -> bool {
        self.artifact.is_some()
    }

    pub fn accuracy(&self) -> f32 {
        self.artifact.as_ref().map(|a| a.accuracy).unwrap_or(0.0)
    }

    pub fn install(&mut self, artifact: ModelArtifact) {
        self.artifact = Some(artifact);
    }

    /// Predicts a label for a feature vector, or `(None, 0.0)`. Never fails:
    /// a missing model, bad dimensionality, or an off-distribution input all
    /// map to "no prediction" so the frame pipeline is never interrupted.
    pub fn predict(&self, vector: &[f32], threshold: f32) -> (Option<String>, f32) {
        let Some(artifact) = &self.artifact else {
            return (None, 0.0);
        };
        if vector.len() != FEATURE_LEN || artifact.model.is_empty() {
            return (None, 0.0);
        }

        // Stage 1: an input far from every training point is rejected
        // outright, whatever the vote distribution says.
        if artifact.model.nearest_distance(vector) > self.outlier_distance {
            return (None, 0.0);
        }

        // Stage 2: the winning class must clear the confidence gate.
        let (idx, confidence) = artifact.model.predict(vector);
        if confidence >= threshold {
            match artifact.classes.get(idx) {
                Some(label) => (Some(label.clone()), confidence),
                None => (None, 0.0),
            }
        } else {
            (None, 0.0)
        }
    }
}

/// Trains a fresh model over every persisted sample, reporting milestone
/// progress, and persists the artifact plus gesture metadata. Returns the
/// accuracy (0.0 on insufficient data) and the artifact to install.
pub fn train(
    storage: &Storage,
    gestures: &GestureMap,
    optimistic_eval: bool,
    progress: ProgressFn,
) -> TrainOutcome {
    let mut vectors: Vec<Vec<f32>> = Vec::new();
    let mut names: Vec<String> = Vec::new();
    for (gesture_id, def) in gestures {
        for sample in storage.load_samples(gesture_id) {
            if sample.len() == FEATURE_LEN {
                vectors.push(sample);
                names.push(def.name.clone());
            }
        }
    }

    let mut classes: Vec<String> = names.clone();
    classes.sort();
    classes.dedup();

    if vectors.len() < 2 || classes.is_empty() {
        log::warn!("not enough training data ({} samples)", vectors.len());
        progress(100, 0.0, "Not enough data");
        return TrainOutcome {
            accuracy: 0.0,
            artifact: None,
        };
    }

    progress(10, 0.0, "Loading samples...");

    let labels: Vec<usize> = names
        .iter()
        .map(|name| classes.iter().position(|c| c == name).unwrap_or(0))
        .collect();

    progress(30, 0.0, "Encoding labels...");

    let splittable = vectors.len() >= 5 && classes.len() >= 2;
    let (train_idx, test_idx) = if splittable {
        stratified_split(&labels, classes.len(), TEST_FRACTION)
    } else if optimistic_eval {
        // Tiny sets train and evaluate on the full data; the reported
        // accuracy is optimistic on purpose and surfaced as-is.
        let all: Vec<usize> = (0..vectors.len()).collect();
        (all.clone(), all)
    } else {
        ((0..vectors.len()).collect(), Vec::new())
    };

    let train_matrix = matrix_from(&vectors, &train_idx);
    let train_labels: Vec<usize> = train_idx.iter().map(|i| labels[*i]).collect();
    let k = MAX_NEIGHBORS.min(train_labels.len());

    progress(50, 0.0, "Training KNN...");
    let model = KnnModel::fit(train_matrix, train_labels, classes.len(), k);

    progress(70, 0.0, "Evaluating...");
    let accuracy = if test_idx.is_empty() {
        0.0
    } else {
        let test_matrix = matrix_from(&vectors, &test_idx);
        let test_labels: Vec<usize> = test_idx.iter().map(|i| labels[*i]).collect();
        model.score(&test_matrix, &test_labels)
    };

    let artifact = ModelArtifact {
        model,
        classes,
        accuracy,
    };
    if let Err(err) = storage.save_model(&artifact) {
        log::warn!("failed to persist model artifact: {err}");
    }
    if let Err(err) = storage.save_model_meta(gestures) {
        log::warn!("failed to persist model metadata: {err}");
    }

    if test_idx.is_empty() && !optimistic_eval {
        progress(100, 0.0, "Not enough data for evaluation");
    } else {
        progress(100, accuracy, "Complete");
    }
    log::info!(
        "training complete, accuracy {:.1}% on {} samples",
        accuracy * 100.0,
        vectors.len()
    );

    TrainOutcome {
        accuracy,
        artifact: Some(artifact),
    }
}

/// Per-class tail holdout: roughly the last fifth of each class's samples in
/// load order becomes the test set, at least one per class with two or more
/// samples. Deterministic, so results are reproducible across runs.
fn stratified_split(
    labels: &[usize],
    n_classes: usize,
    test_fraction: f32,
) -> (Vec<usize>, Vec<usize>) {
    let mut by_class: Vec<Vec<usize>> = vec![Vec::new(); n_classes];
    for (idx, label) in labels.iter().enumerate() {
        by_class[*label].push(idx);
    }

    let mut train = Vec::new();
    let mut test = Vec::new();
    for members in by_class {
        if members.len() < 2 {
            train.extend(members);
            continue;
        }
        let held_out = ((members.len() as f32 * test_fraction).round() as usize)
            .clamp(1, members.len() - 1);
        let cut = members.len() - held_out;
        train.extend(&members[..cut]);
        test.extend(&members[cut..]);
    }
    (train, test)
}

fn matrix_from(vectors: &[Vec<f32>], indices: &[usize]) -> Array2<f32> {
    let mut matrix = Array2::zeros((indices.len(), FEATURE_LEN));
    for (row, idx) in indices.iter().enumerate() {
        for (col, value) in vectors[*idx].iter().enumerate() {
            matrix[[row, col]] = *value;
        }
    }
    matrix
}
