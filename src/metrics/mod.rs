//! # Embedding quality metrics
//!
//! Scores for comparing a dataset (N × D) with a low-dimensional embedding of
//! it (N × K), independent of how the embedding was produced.

use ndarray::{Array1, ArrayView2, Axis};
use rayon::prelude::*;

use crate::error::{PursuitError, Result};
use crate::utils::{check_dataset, pairwise_distances};

/// Original distances at or below this are treated as coincident points.
const DEGENERATE_DISTANCE: f64 = 1e-12;

fn check_same_rows(original: ArrayView2<f64>, embedded: ArrayView2<f64>) -> Result<()> {
    check_dataset(original)?;
    check_dataset(embedded)?;
    if original.nrows() != embedded.nrows() {
        return Err(PursuitError::config(format!(
            "original has {} rows, embedding has {}",
            original.nrows(),
            embedded.nrows()
        )));
    }
    Ok(())
}

/// Indices of the other points ordered by distance, ties by index.
fn neighbour_order(distances: &Array1<f64>, i: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..distances.len()).filter(|&j| j != i).collect();
    order.sort_by(|&a, &b| distances[a].total_cmp(&distances[b]).then(a.cmp(&b)));
    order
}

/// Trustworthiness of an embedding
///
/// Penalises points that appear among the `n_neighbors` nearest neighbours in
/// the embedding without being near in the original space, weighted by how far
/// down the original neighbour ranking they sit.
///
/// ### Params
///
/// * `original` - Original data (N × D).
/// * `embedded` - Embedded data (N × K).
/// * `n_neighbors` - Neighbourhood size, must satisfy `1 <= n_neighbors < N / 2`.
///
/// ### Returns
///
/// Score in `[0, 1]`, 1 for perfectly preserved neighbourhoods.
pub fn trustworthiness(
    original: ArrayView2<f64>,
    embedded: ArrayView2<f64>,
    n_neighbors: usize,
) -> Result<f64> {
    check_same_rows(original, embedded)?;
    let n = original.nrows();
    if n_neighbors == 0 || 2 * n_neighbors >= n {
        return Err(PursuitError::config(format!(
            "n_neighbors must be in 1..{} for {} points, got {}",
            n.div_ceil(2),
            n,
            n_neighbors
        )));
    }

    let dist_orig = pairwise_distances(original);
    let dist_emb = pairwise_distances(embedded);
    let k = n_neighbors;

    let penalties: Vec<f64> = (0..n)
        .into_par_iter()
        .map(|i| {
            let orig_order = neighbour_order(&dist_orig.row(i).to_owned(), i);
            let mut rank = vec![0usize; n];
            for (r, &j) in orig_order.iter().enumerate() {
                rank[j] = r + 1;
            }

            neighbour_order(&dist_emb.row(i).to_owned(), i)
                .into_iter()
                .take(k)
                .filter(|&j| rank[j] > k)
                .map(|j| (rank[j] - k) as f64)
                .sum::<f64>()
        })
        .collect();

    let total: f64 = penalties.iter().sum();
    let (n, k) = (n as f64, k as f64);
    Ok(1.0 - 2.0 / (n * k * (2.0 * n - 3.0 * k - 1.0)) * total)
}

/// Mean relative discrepancy `|d_ij - delta_ij| / d_ij` between original and
/// embedded pairwise distances, over all non-coincident pairs.
pub fn distance_distortion(original: ArrayView2<f64>, embedded: ArrayView2<f64>) -> Result<f64> {
    check_same_rows(original, embedded)?;
    let dist_orig = pairwise_distances(original);
    let dist_emb = pairwise_distances(embedded);
    let n = original.nrows();

    let per_row: Vec<(f64, usize)> = (0..n)
        .into_par_iter()
        .map(|i| {
            ((i + 1)..n)
                .filter(|&j| dist_orig[[i, j]] > DEGENERATE_DISTANCE)
                .fold((0.0, 0), |(sum, count), j| {
                    let d = dist_orig[[i, j]];
                    (sum + (d - dist_emb[[i, j]]).abs() / d, count + 1)
                })
        })
        .collect();

    let (sum, count) = per_row
        .iter()
        .fold((0.0, 0), |(s, c), &(rs, rc)| (s + rs, c + rc));
    if count == 0 {
        return Err(PursuitError::InsufficientData {
            distinct: 1,
            required: 2,
        });
    }
    Ok(sum / count as f64)
}

/// Mean squared error of reconstructing `data` (N × D) from its orthogonal
/// projection onto `directions` (K × D, orthonormal rows): `X - X W^T W`.
pub fn linear_reconstruction_error(
    data: ArrayView2<f64>,
    directions: ArrayView2<f64>,
) -> Result<f64> {
    check_dataset(data)?;
    if directions.ncols() != data.ncols() || directions.nrows() == 0 {
        return Err(PursuitError::config(format!(
            "directions must be K × {}, got {} × {}",
            data.ncols(),
            directions.nrows(),
            directions.ncols()
        )));
    }

    let reconstructed = data.dot(&directions.t()).dot(&directions);
    let residual = &data - &reconstructed;
    Ok(residual.iter().map(|v| v * v).sum::<f64>() / residual.len() as f64)
}

/// Mean silhouette coefficient of a labelled embedding.
///
/// Points in singleton clusters score 0. At least two distinct labels are
/// required.
pub fn silhouette(embedded: ArrayView2<f64>, labels: &[usize]) -> Result<f64> {
    check_dataset(embedded)?;
    let n = embedded.nrows();
    if labels.len() != n {
        return Err(PursuitError::config(format!(
            "expected {} labels, got {}",
            n,
            labels.len()
        )));
    }

    let mut clusters: Vec<usize> = labels.to_vec();
    clusters.sort_unstable();
    clusters.dedup();
    if clusters.len() < 2 {
        return Err(PursuitError::config(
            "silhouette needs at least two distinct labels",
        ));
    }
    let sizes: Vec<usize> = clusters
        .iter()
        .map(|c| labels.iter().filter(|&&l| l == *c).count())
        .collect();
    let slot = |label: usize| clusters.binary_search(&label).unwrap_or(0);

    let dist = pairwise_distances(embedded);
    let scores: Vec<f64> = dist
        .axis_iter(Axis(0))
        .into_par_iter()
        .enumerate()
        .map(|(i, row)| {
            let own = slot(labels[i]);
            if sizes[own] < 2 {
                return 0.0;
            }
            let mut sums = vec![0.0; clusters.len()];
            for (j, &d) in row.iter().enumerate() {
                sums[slot(labels[j])] += d;
            }

            let a = sums[own] / (sizes[own] - 1) as f64;
            let b = sums
                .iter()
                .zip(&sizes)
                .enumerate()
                .filter(|(c, _)| *c != own)
                .map(|(_, (s, &size))| s / size as f64)
                .fold(f64::INFINITY, f64::min);

            let denom = a.max(b);
            if denom > 0.0 {
                (b - a) / denom
            } else {
                0.0
            }
        })
        .collect();

    Ok(scores.iter().sum::<f64>() / n as f64)
}
