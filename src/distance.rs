//! Distance strategies and the randomized split estimator.
//!
//! A strategy answers three questions for the forest: how far apart two
//! vectors are, which side of a branch hyperplane a vector falls on, and
//! what hyperplane best splits a full bucket. The split hyperplane comes
//! from [`two_means`], a bounded-iteration clustering heuristic: fast and
//! randomized rather than exact.

use crate::math;
use crate::random::RandomSource;

/// Number of running-average refinement steps in [`two_means`].
const TWO_MEANS_ITERATIONS: usize = 200;

/// Distance strategy used by the forest.
pub trait Distance {
    /// Pairwise distance between two vectors.
    fn distance(&self, x: &[f32], y: &[f32]) -> f32;

    /// Signed distance of `y` from the hyperplane with the given normal.
    fn margin(&self, normal: &[f32], y: &[f32]) -> f32;

    /// Side of the hyperplane `y` falls on: `0` (negative) or `1` (positive).
    ///
    /// Exact ties are broken by a coin flip rather than a fixed default, so
    /// identical vectors spread across both sides instead of piling up.
    fn side(&self, normal: &[f32], y: &[f32], random: &mut dyn RandomSource) -> usize {
        let dot = self.margin(normal, y);
        if dot != 0.0 {
            usize::from(dot > 0.0)
        } else {
            random.flip()
        }
    }

    /// Estimate a split hyperplane normal for a set of member vectors.
    fn create_split(&self, vectors: &[&[f32]], random: &mut dyn RandomSource) -> Vec<f32>;
}

/// Pseudo-cosine (angular) distance.
#[derive(Debug, Clone, Copy, Default)]
pub struct Angular;

impl Distance for Angular {
    /// `2 - 2*cos(x, y)`, in `[0, 4]`.
    ///
    /// Degenerate (zero-norm) inputs return the maximal pseudo-cosine
    /// distance `2.0` instead of dividing by zero.
    fn distance(&self, x: &[f32], y: &[f32]) -> f32 {
        let mut pp = 0.0_f32;
        let mut qq = 0.0_f32;
        let mut pq = 0.0_f32;
        for (xz, yz) in x.iter().zip(y.iter()) {
            pp += xz * xz;
            qq += yz * yz;
            pq += xz * yz;
        }
        let ppqq = pp * qq;
        if ppqq > 0.0 {
            2.0 - 2.0 * pq / ppqq.sqrt()
        } else {
            2.0
        }
    }

    fn margin(&self, normal: &[f32], y: &[f32]) -> f32 {
        math::dot(normal, y)
    }

    fn create_split(&self, vectors: &[&[f32]], random: &mut dyn RandomSource) -> Vec<f32> {
        let (iv, jv) = two_means(self, vectors, random, true);
        let mut v: Vec<f32> = iv.iter().zip(jv.iter()).map(|(a, b)| a - b).collect();
        math::normalize_inplace(&mut v);
        v
    }
}

/// Two-means: derive two cluster centroids from a sample of vectors.
///
/// Picks two distinct random members as initial centroids (unit-normalized
/// when `cosine`), then folds a random member into the nearer centroid for a
/// fixed number of iterations using a running-average update weighted by how
/// many samples each centroid has absorbed.
///
/// Callers must supply at least two vectors.
pub fn two_means(
    distance: &dyn Distance,
    vectors: &[&[f32]],
    random: &mut dyn RandomSource,
    cosine: bool,
) -> (Vec<f32>, Vec<f32>) {
    debug_assert!(vectors.len() >= 2);
    let count = vectors.len();

    let i = random.index(count);
    let mut j = random.index(count - 1);
    if j >= i {
        j += 1;
    }

    let mut iv = vectors[i].to_vec();
    let mut jv = vectors[j].to_vec();

    if cosine {
        math::normalize_inplace(&mut iv);
        math::normalize_inplace(&mut jv);
    }

    let mut ic = 1usize;
    let mut jc = 1usize;

    for _ in 0..TWO_MEANS_ITERATIONS {
        let k = random.index(count);

        let di = ic as f32 * distance.distance(&iv, vectors[k]);
        let dj = jc as f32 * distance.distance(&jv, vectors[k]);

        let norm = if cosine { math::norm(vectors[k]) } else { 1.0 };
        if norm == 0.0 {
            continue;
        }

        if di < dj {
            for (z, x) in iv.iter_mut().enumerate() {
                *x = (*x * ic as f32 + vectors[k][z] / norm) / (ic as f32 + 1.0);
            }
            ic += 1;
        } else if dj < di {
            for (z, x) in jv.iter_mut().enumerate() {
                *x = (*x * jc as f32 + vectors[k][z] / norm) / (jc as f32 + 1.0);
            }
            jc += 1;
        }
    }

    (iv, jv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::{LoopRandom, StdRandom};

    #[test]
    fn angular_distance_of_identical_vectors_is_zero() {
        let a = [1.1_f32, 1.2, 1.3];
        assert!(Angular.distance(&a, &a).abs() < 1e-6);
    }

    #[test]
    fn angular_distance_of_opposite_vectors_is_maximal() {
        let a = [1.0_f32, 0.0];
        let b = [-1.0_f32, 0.0];
        assert!((Angular.distance(&a, &b) - 4.0).abs() < 1e-6);
    }

    #[test]
    fn angular_distance_of_zero_vector_is_fail_safe() {
        let a = [0.0_f32, 0.0];
        let b = [1.0_f32, 2.0];
        assert!((Angular.distance(&a, &b) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn side_uses_flip_on_zero_margin() {
        let mut random = LoopRandom::new(1);
        let normal = [0.0_f32, 0.0, 0.0];
        let y = [1.0_f32, 2.0, 3.0];
        let a = Angular.side(&normal, &y, &mut random);
        let b = Angular.side(&normal, &y, &mut random);
        assert_ne!(a, b);
    }

    #[test]
    fn side_follows_margin_sign() {
        let mut random = LoopRandom::new(1);
        let normal = [1.0_f32, 0.0];
        assert_eq!(Angular.side(&normal, &[2.0, 0.0], &mut random), 1);
        assert_eq!(Angular.side(&normal, &[-2.0, 0.0], &mut random), 0);
    }

    #[test]
    fn create_split_separates_opposed_clusters() {
        let mut random = StdRandom::seeded(1);
        let pos = [1.1_f32, 1.2, 1.3];
        let neg = [-1.1_f32, -1.2, -1.3];
        let members: Vec<&[f32]> = vec![&pos, &neg];
        let normal = Angular.create_split(&members, &mut random);

        let mp = Angular.margin(&normal, &pos);
        let mn = Angular.margin(&normal, &neg);
        assert!(mp * mn < 0.0, "clusters should land on opposite sides");
    }

    #[test]
    fn two_means_is_deterministic_under_fixed_source() {
        let a = [1.0_f32, 0.0];
        let b = [0.0_f32, 1.0];
        let c = [1.0_f32, 1.0];
        let members: Vec<&[f32]> = vec![&a, &b, &c];

        let mut r1 = LoopRandom::new(1);
        let mut r2 = LoopRandom::new(1);
        let m1 = two_means(&Angular, &members, &mut r1, true);
        let m2 = two_means(&Angular, &members, &mut r2, true);
        assert_eq!(m1, m2);
    }
}
