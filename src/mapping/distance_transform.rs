//! Exact Euclidean distance transform
//!
//! Two-pass lower-envelope-of-parabolas algorithm:
//! P. Felzenszwalb and D. Huttenlocher, "Distance Transforms of Sampled
//! Functions", Theory of Computing 8, 2012.
//!
//! Distances are measured between cell centres in cell units.

use nalgebra::DMatrix;

const FAR: f64 = 1e20;

/// 1D squared distance transform of the sampled function `f`
fn transform_1d(f: &[f64], d: &mut [f64]) {
    let n = f.len();
    if n == 0 {
        return;
    }
    let mut v = vec![0usize; n];
    let mut z = vec![0.0f64; n + 1];
    let mut k = 0usize;
    z[0] = f64::NEG_INFINITY;
    z[1] = f64::INFINITY;

    let intersect = |q: usize, p: usize| {
        let (qf, pf) = (q as f64, p as f64);
        ((f[q] + qf * qf) - (f[p] + pf * pf)) / (2.0 * qf - 2.0 * pf)
    };

    for q in 1..n {
        let mut s = intersect(q, v[k]);
        // z[0] is -inf, so this never walks below the first parabola
        while s <= z[k] {
            k -= 1;
            s = intersect(q, v[k]);
        }
        k += 1;
        v[k] = q;
        z[k] = s;
        z[k + 1] = f64::INFINITY;
    }

    k = 0;
    for q in 0..n {
        let qf = q as f64;
        while z[k + 1] < qf {
            k += 1;
        }
        let vk = v[k] as f64;
        d[q] = (qf - vk) * (qf - vk) + f[v[k]];
    }
}

/// Squared Euclidean distance from every cell to the nearest `true` cell.
///
/// Cells are `f64::INFINITY` when the matrix holds no `true` cell.
pub fn squared_distance_transform(features: &DMatrix<bool>) -> DMatrix<f64> {
    let (rows, cols) = features.shape();
    let mut grid = features.map(|f| if f { 0.0 } else { FAR });
    if rows == 0 || cols == 0 {
        return grid;
    }

    // along the second index
    let mut f = vec![0.0; cols];
    let mut d = vec![0.0; cols];
    for r in 0..rows {
        for c in 0..cols {
            f[c] = grid[(r, c)];
        }
        transform_1d(&f, &mut d);
        for c in 0..cols {
            grid[(r, c)] = d[c];
        }
    }

    // along the first index
    let mut f = vec![0.0; rows];
    let mut d = vec![0.0; rows];
    for c in 0..cols {
        for r in 0..rows {
            f[r] = grid[(r, c)];
        }
        transform_1d(&f, &mut d);
        for r in 0..rows {
            grid[(r, c)] = d[r];
        }
    }

    grid.map(|v| if v >= FAR / 2.0 { f64::INFINITY } else { v })
}

/// Euclidean distance (in cells) from every cell to the nearest `true` cell
pub fn distance_transform(features: &DMatrix<bool>) -> DMatrix<f64> {
    squared_distance_transform(features).map(f64::sqrt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn brute_force(features: &DMatrix<bool>) -> DMatrix<f64> {
        let (rows, cols) = features.shape();
        DMatrix::from_fn(rows, cols, |r, c| {
            let mut best = f64::INFINITY;
            for fr in 0..rows {
                for fc in 0..cols {
                    if features[(fr, fc)] {
                        let dr = r as f64 - fr as f64;
                        let dc = c as f64 - fc as f64;
                        best = best.min((dr * dr + dc * dc).sqrt());
                    }
                }
            }
            best
        })
    }

    #[test]
    fn test_single_feature() {
        let mut features = DMatrix::from_element(5, 7, false);
        features[(2, 3)] = true;
        let dist = distance_transform(&features);
        assert_relative_eq!(dist[(2, 3)], 0.0);
        assert_relative_eq!(dist[(2, 4)], 1.0);
        assert_relative_eq!(dist[(0, 0)], (4.0f64 + 9.0).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_no_features_is_infinite() {
        let features = DMatrix::from_element(4, 4, false);
        let dist = distance_transform(&features);
        assert!(dist.iter().all(|d| d.is_infinite()));
    }

    #[test]
    fn test_matches_brute_force_on_random_masks() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let rows = rng.gen_range(1..15);
            let cols = rng.gen_range(1..15);
            let features = DMatrix::from_fn(rows, cols, |_, _| rng.gen_bool(0.1));
            let fast = distance_transform(&features);
            let slow = brute_force(&features);
            for (a, b) in fast.iter().zip(slow.iter()) {
                if b.is_infinite() {
                    assert!(a.is_infinite());
                } else {
                    assert_relative_eq!(*a, *b, epsilon = 1e-9);
                }
            }
        }
    }
}
