//! Vector math over fixed-length embeddings
//!
//! Pure functions with no state. Unlike a lenient cosine that maps zero
//! vectors to 0.0, these return errors so that a degenerate embedding can be
//! excluded before it poisons a centroid with NaN.

use thiserror::Error;

/// Errors raised by vector operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VectorError {
    #[error("degenerate vector: zero or non-finite norm")]
    DegenerateVector,

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("centroid of an empty vector set is undefined")]
    EmptyInput,
}

/// Result type for vector operations
pub type VectorResult<T> = Result<T, VectorError>;

/// Euclidean norm of a vector
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// True when a vector cannot take part in a cosine comparison.
pub fn is_degenerate(v: &[f32]) -> bool {
    let norm = l2_norm(v);
    norm == 0.0 || !norm.is_finite()
}

/// Scale a vector to unit length.
pub fn normalize(v: &[f32]) -> VectorResult<Vec<f32>> {
    let norm = l2_norm(v);
    if norm == 0.0 || !norm.is_finite() {
        return Err(VectorError::DegenerateVector);
    }
    Ok(v.iter().map(|x| x / norm).collect())
}

/// Cosine similarity between two vectors of equal dimension.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> VectorResult<f32> {
    if a.len() != b.len() {
        return Err(VectorError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a == 0.0 || norm_b == 0.0 || !norm_a.is_finite() || !norm_b.is_finite() {
        return Err(VectorError::DegenerateVector);
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    Ok(dot / (norm_a * norm_b))
}

/// Element-wise mean of a set of vectors.
///
/// Accumulates in f64 so long-lived clusters with thousands of members do
/// not drift from the exact mean.
pub fn centroid<V: AsRef<[f32]>>(vectors: &[V]) -> VectorResult<Vec<f32>> {
    let first = vectors.first().ok_or(VectorError::EmptyInput)?;
    let dim = first.as_ref().len();
    let mut acc = vec![0.0f64; dim];

    for v in vectors {
        let v = v.as_ref();
        if v.len() != dim {
            return Err(VectorError::DimensionMismatch {
                expected: dim,
                actual: v.len(),
            });
        }
        for (slot, x) in acc.iter_mut().zip(v) {
            *slot += f64::from(*x);
        }
    }

    let n = vectors.len() as f64;
    Ok(acc.into_iter().map(|x| (x / n) as f32).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_correct() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b).unwrap() - 1.0).abs() < 1e-6, "identical vectors");
        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).unwrap().abs() < 1e-6, "orthogonal vectors");
        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d).unwrap() + 1.0).abs() < 1e-6, "opposite vectors");
    }

    #[test]
    fn cosine_similarity_is_scale_invariant() {
        let a = vec![0.9, 0.3, 0.1];
        let b = vec![9.0, 3.0, 1.0];
        assert!((cosine_similarity(&a, &b).unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_zero_vector_is_degenerate() {
        let a = vec![1.0, 0.0];
        let zero = vec![0.0, 0.0];
        assert_eq!(cosine_similarity(&a, &zero), Err(VectorError::DegenerateVector));
        assert_eq!(cosine_similarity(&zero, &a), Err(VectorError::DegenerateVector));
    }

    #[test]
    fn cosine_similarity_rejects_mismatched_dimensions() {
        let err = cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]).unwrap_err();
        assert_eq!(
            err,
            VectorError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        );
    }

    #[test]
    fn centroid_is_element_wise_mean() {
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5]];
        let c = centroid(&vectors).unwrap();
        assert!((c[0] - 0.5).abs() < 1e-6);
        assert!((c[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn centroid_of_single_vector_is_itself() {
        let c = centroid(&[vec![0.25f32, -0.75]]).unwrap();
        assert_eq!(c, vec![0.25, -0.75]);
    }

    #[test]
    fn centroid_empty_input_fails() {
        let empty: Vec<Vec<f32>> = Vec::new();
        assert_eq!(centroid(&empty), Err(VectorError::EmptyInput));
    }

    #[test]
    fn centroid_rejects_ragged_input() {
        let vectors = vec![vec![1.0, 0.0], vec![1.0]];
        assert!(matches!(
            centroid(&vectors),
            Err(VectorError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn normalize_produces_unit_vector() {
        let v = normalize(&[3.0, 4.0]).unwrap();
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        assert!((l2_norm(&v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn degenerate_detection() {
        assert!(is_degenerate(&[0.0, 0.0]));
        assert!(is_degenerate(&[f32::NAN, 1.0]));
        assert!(!is_degenerate(&[0.0, 1e-3]));
    }
}
