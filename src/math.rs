//! Portable vector primitives.
//!
//! The index only needs a handful of dense `f32` operations; they live here
//! as free functions so the distance strategies stay allocation-light.

const NORM_EPSILON: f32 = 1e-9;

/// Dot product of two vectors.
#[inline]
#[must_use]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// L2 norm of a vector.
#[inline]
#[must_use]
pub fn norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// Scale a vector in place by `a`.
#[inline]
pub fn scale_inplace(a: f32, v: &mut [f32]) {
    for x in v {
        *x *= a;
    }
}

/// Normalize a vector to unit L2 norm in place.
///
/// Vectors with a (near-)zero norm are left untouched rather than divided
/// by zero; callers treat the all-zero vector as a degenerate hyperplane.
#[inline]
pub fn normalize_inplace(v: &mut [f32]) {
    let n = norm(v);
    if n > NORM_EPSILON {
        scale_inplace(1.0 / n, v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dot_and_norm() {
        let a = [3.0_f32, 4.0];
        assert!((dot(&a, &a) - 25.0).abs() < 1e-6);
        assert!((norm(&a) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn normalize_handles_zero_vector() {
        let mut v = [0.0_f32, 0.0, 0.0];
        normalize_inplace(&mut v);
        assert_eq!(v, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn normalize_gives_unit_norm() {
        let mut v = [1.1_f32, 1.2, 1.3];
        normalize_inplace(&mut v);
        assert!((norm(&v) - 1.0).abs() < 1e-6);
    }
}
