//! Shared numeric helpers for similarity and score aggregation.

/// Compute cosine similarity between two vectors.
/// Returns dot(a,b) / (norm(a) * norm(b)), or 0.0 if either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Normalize a vector to unit length. Returns zero vector if input has zero norm.
pub fn vector_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        vec![0.0; v.len()]
    } else {
        v.iter().map(|x| x / norm).collect()
    }
}

/// Arithmetic mean, 0.0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Population variance, 0.0 for fewer than two values.
pub fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

/// Weighted mean of `(value, weight)` pairs. Falls back to the plain mean
/// when all weights are zero.
pub fn weighted_mean(pairs: &[(f64, f64)]) -> f64 {
    let total_weight: f64 = pairs.iter().map(|(_, w)| w.max(0.0)).sum();
    if total_weight == 0.0 {
        let values: Vec<f64> = pairs.iter().map(|(v, _)| *v).collect();
        return mean(&values);
    }
    pairs.iter().map(|(v, w)| v * w.max(0.0)).sum::<f64>() / total_weight
}
