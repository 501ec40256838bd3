use crate::types::Landmarks;

/// Length of the flattened feature vector (21 keypoints x 3 coordinates).
pub const FEATURE_LEN: usize = 63;

/// Converts raw keypoints into a translation and scale invariant feature
/// vector: anchor every keypoint to the wrist, then divide by the maximum
/// absolute coordinate so all values land in [-1, 1]. Scaling is uniform
/// across axes to preserve hand aspect. Degenerate input (all keypoints
/// equal) skips the scale step and yields an all-zero vector.
pub fn feature_vector(landmarks: &Landmarks) -> Vec<f32> {
    let wrist = landmarks[0];
    let mut out = Vec::with_capacity(FEATURE_LEN);
    for point in landmarks {
        out.push(point[0] - wrist[0]);
        out.push(point[1] - wrist[1]);
        out.push(point[2] - wrist[2]);
    }

    let max_abs = out.iter().fold(0.0f32, |acc, v| acc.max(v.abs()));
    if max_abs > 0.0 {
        for v in &mut out {
            *v /= max_abs;
        }
    }
    out
}
