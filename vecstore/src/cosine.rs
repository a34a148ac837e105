/// Compute the cosine similarity between two vectors.
///
/// Returns a value in `[-1, 1]`. Uses f64 intermediate precision.
/// Returns -1.0 for zero vectors or dimension mismatches so they never
/// clear a positive similarity floor.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return -1.0;
    }

    let mut dot: f64 = 0.0;
    let mut norm_a: f64 = 0.0;
    let mut norm_b: f64 = 0.0;

    for (&x, &y) in a.iter().zip(b) {
        let ai = x as f64;
        let bi = y as f64;
        dot += ai * bi;
        norm_a += ai * ai;
        norm_b += bi * bi;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return -1.0;
    }

    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    // Clamp to [-1, 1] to handle floating point errors.
    similarity.clamp(-1.0, 1.0) as f32
}

/// Compute the cosine distance `1 - similarity`, in `[0, 2]`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical() {
        let s = cosine_similarity(&[1.0, 0.0, 0.0], &[1.0, 0.0, 0.0]);
        assert!((s - 1.0).abs() < 0.001, "identical: got {s}");
    }

    #[test]
    fn test_orthogonal() {
        let s = cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]);
        assert!(s.abs() < 0.001, "orthogonal: got {s}");
    }

    #[test]
    fn test_opposite() {
        let d = cosine_distance(&[1.0, 0.0, 0.0], &[-1.0, 0.0, 0.0]);
        assert!((d - 2.0).abs() < 0.001, "opposite: got {d}");
    }

    #[test]
    fn test_scale_invariant() {
        let s = cosine_similarity(&[2.0, 0.0], &[0.92, 0.3919]);
        assert!((s - 0.92).abs() < 0.001, "scaled: got {s}");
    }

    #[test]
    fn test_dimension_mismatch() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), -1.0);
    }

    #[test]
    fn test_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0, 0.0], &[1.0, 0.0, 0.0]), -1.0);
    }
}
