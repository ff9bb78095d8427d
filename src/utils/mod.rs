use nalgebra::DMatrix;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use nshare::{IntoNalgebra, IntoNdarray2};
use rayon::prelude::*;
use std::cmp::Ordering;

use crate::error::{PursuitError, Result};

/// Relative threshold on the diagonal of R below which a direction set is
/// treated as rank deficient.
const RANK_TOL: f64 = 1e-12;

/// Column means and standard deviations of a dataset.
#[derive(Debug, Clone)]
pub struct ColumnStats {
    pub mean: Array1<f64>,
    pub std_dev: Array1<f64>,
}

impl ColumnStats {
    /// Population statistics of every column of `x` (N × D).
    pub fn from_data(x: ArrayView2<f64>) -> Result<Self> {
        let mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| PursuitError::config("cannot compute column means of an empty dataset"))?;
        let std_dev = x.std_axis(Axis(0), 0.0);
        Ok(Self { mean, std_dev })
    }
}

/// Centre and/or scale the rows of `x`.
///
/// Columns with zero standard deviation are left unscaled so constant features
/// do not turn into NaNs.
pub fn preprocess(
    x: ArrayView2<f64>,
    mean: Option<&Array1<f64>>,
    std_dev: Option<&Array1<f64>>,
) -> Array2<f64> {
    let mut x_preprocessed = x.to_owned();

    if let Some(m) = mean {
        x_preprocessed
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .for_each(|mut row| {
                row -= m;
            });
    }

    if let Some(s) = std_dev {
        let safe = s.mapv(|v| if v > f64::EPSILON { v } else { 1.0 });
        x_preprocessed
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .for_each(|mut row| {
                row /= &safe;
            });
    }

    x_preprocessed
}

/// Validate that a dataset has a usable shape and only finite values.
pub fn check_dataset(x: ArrayView2<f64>) -> Result<()> {
    let (n, d) = x.dim();
    if n == 0 || d == 0 {
        return Err(PursuitError::config(format!(
            "dataset must have at least one point and one feature, got {} × {}",
            n, d
        )));
    }
    if let Some(((i, j), _)) = x.indexed_iter().find(|(_, v)| !v.is_finite()) {
        return Err(PursuitError::config(format!(
            "dataset contains a non-finite value at ({}, {})",
            i, j
        )));
    }
    Ok(())
}

/// Number of distinct rows of `x`.
pub fn count_distinct_rows(x: ArrayView2<f64>) -> usize {
    // `+ 0.0` folds -0.0 onto 0.0 so both sort as the same key
    let rows: Vec<Vec<f64>> = x
        .outer_iter()
        .map(|row| row.iter().map(|&v| v + 0.0).collect())
        .collect();
    let mut order: Vec<usize> = (0..rows.len()).collect();
    order.sort_by(|&a, &b| lexicographic(&rows[a], &rows[b]));
    order.dedup_by(|a, b| rows[*a] == rows[*b]);
    order.len()
}

fn lexicographic(a: &[f64], b: &[f64]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.total_cmp(y))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

#[inline]
pub fn euclidean(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = x - y;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

/// Full N × N matrix of Euclidean distances between the rows of `x`.
pub fn pairwise_distances(x: ArrayView2<f64>) -> Array2<f64> {
    let n = x.nrows();
    let mut dist = Array2::zeros((n, n));
    dist.axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(i, mut row)| {
            let xi = x.row(i);
            for j in 0..n {
                if j != i {
                    row[j] = euclidean(xi, x.row(j));
                }
            }
        });
    dist
}

/// Orthonormalize the rows of `w` (K × D, K <= D) with a thin QR
/// factorization of `w^T`.
///
/// Row `i` of the result spans the same space as rows `0..=i` of `w` and keeps
/// the orientation of row `i` (diagonal of R forced positive), which makes the
/// result identical to Gram-Schmidt in exact arithmetic. Returns `None` when
/// the rows are (numerically) linearly dependent or not finite.
pub fn orthonormalize_rows(w: ArrayView2<f64>) -> Option<Array2<f64>> {
    let (k, d) = w.dim();
    if k == 0 || k > d || w.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let wt: DMatrix<f64> = w.t().to_owned().into_nalgebra();
    let scale = wt.amax().max(f64::MIN_POSITIVE);
    let qr = wt.qr();
    let r = qr.r();
    let mut q = qr.q();

    for j in 0..k {
        let rjj = r[(j, j)];
        if rjj.abs() <= RANK_TOL * scale {
            return None;
        }
        if rjj < 0.0 {
            q.column_mut(j).neg_mut();
        }
    }

    Some(q.transpose().into_ndarray2().into_owned())
}

/// Largest absolute entry of `W W^T - I`.
pub fn orthonormality_error(w: ArrayView2<f64>) -> f64 {
    let gram = w.dot(&w.t());
    gram.indexed_iter()
        .map(|((i, j), &v)| if i == j { (v - 1.0).abs() } else { v.abs() })
        .fold(0.0, f64::max)
}

pub fn is_orthonormal(w: ArrayView2<f64>, tol: f64) -> bool {
    orthonormality_error(w) <= tol
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_preprocess_centers_and_scales() {
        let x = array![[1.0, 10.0], [3.0, 10.0], [5.0, 10.0]];
        let stats = ColumnStats::from_data(x.view()).unwrap();

        let out = preprocess(x.view(), Some(&stats.mean), Some(&stats.std_dev));

        assert_relative_eq!(out.column(0).sum(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(out.column(0).std(0.0), 1.0, epsilon = 1e-12);
        // constant column is centred but not divided by zero
        assert!(out.column(1).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_check_dataset() {
        assert!(check_dataset(array![[1.0, 2.0]].view()).is_ok());
        assert!(check_dataset(Array2::<f64>::zeros((0, 3)).view()).is_err());
        assert!(check_dataset(array![[1.0, f64::NAN]].view()).is_err());
    }

    #[test]
    fn test_count_distinct_rows() {
        let x = array![[1.0, 2.0], [0.0, 5.0], [1.0, 2.0], [-0.0, 5.0], [2.0, 1.0]];
        assert_eq!(count_distinct_rows(x.view()), 3);
    }

    #[test]
    fn test_pairwise_distances() {
        let x = array![[0.0, 0.0], [3.0, 4.0], [0.0, 1.0]];
        let d = pairwise_distances(x.view());

        assert_relative_eq!(d[[0, 1]], 5.0);
        assert_relative_eq!(d[[1, 0]], 5.0);
        assert_relative_eq!(d[[0, 2]], 1.0);
        assert_relative_eq!(d[[1, 2]], 18.0_f64.sqrt());
        assert!(d.diag().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_orthonormalize_rows() {
        let w = array![[2.0, 0.0, 0.0], [1.0, 1.0, 0.0]];
        let q = orthonormalize_rows(w.view()).unwrap();

        assert!(is_orthonormal(q.view(), 1e-12));
        // first row keeps its direction, second is the orthogonal remainder
        assert_relative_eq!(q[[0, 0]], 1.0, epsilon = 1e-12);
        assert_relative_eq!(q[[1, 1]], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_orthonormalize_keeps_orientation() {
        let w = array![[-3.0, 0.0], [0.0, -0.5]];
        let q = orthonormalize_rows(w.view()).unwrap();

        assert_relative_eq!(q[[0, 0]], -1.0, epsilon = 1e-12);
        assert_relative_eq!(q[[1, 1]], -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_orthonormalize_rejects_dependent_rows() {
        let w = array![[1.0, 2.0, 3.0], [2.0, 4.0, 6.0]];
        assert!(orthonormalize_rows(w.view()).is_none());

        let tall = Array2::<f64>::eye(3);
        assert!(orthonormalize_rows(tall.slice(ndarray::s![.., ..2])).is_none());
    }
}
