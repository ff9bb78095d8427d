#![allow(dead_code)]

use ndarray::Array2;
use rand::{rngs::StdRng, Rng, SeedableRng};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Synthetic dataset with five well separated clusters.
///
/// Requires `n_dim >= 3`.
pub fn create_cluster_data(
    n_per_cluster: usize,
    n_dim: usize,
    seed: u64,
) -> (Array2<f64>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let n_total = n_per_cluster * 5;

    let centres = [
        vec![0.0; n_dim],
        (0..n_dim)
            .map(|i| if i == 0 { 20.0 } else { 0.0 })
            .collect::<Vec<_>>(),
        (0..n_dim)
            .map(|i| if i == 1 { 20.0 } else { 0.0 })
            .collect::<Vec<_>>(),
        (0..n_dim)
            .map(|i| if i == 2 { 20.0 } else { 0.0 })
            .collect::<Vec<_>>(),
        vec![10.0; n_dim],
    ];

    let mut data = Array2::zeros((n_total, n_dim));
    let mut labels = Vec::with_capacity(n_total);
    for (cluster_id, centre) in centres.iter().enumerate() {
        for p in 0..n_per_cluster {
            let row = cluster_id * n_per_cluster + p;
            for dim in 0..n_dim {
                let noise: f64 = rng.random::<f64>() * 2.0 - 1.0;
                data[[row, dim]] = centre[dim] + noise;
            }
            labels.push(cluster_id);
        }
    }

    (data, labels)
}

/// Uniform noise in `[-1, 1]^n_dim`.
pub fn create_noise_data(n: usize, n_dim: usize, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::from_shape_simple_fn((n, n_dim), || rng.random::<f64>() * 2.0 - 1.0)
}

/// Points that only vary along the first `k` coordinate axes; the remaining
/// columns are zero.
pub fn create_subspace_data(n: usize, n_dim: usize, k: usize, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::from_shape_fn((n, n_dim), |(_, j)| {
        if j < k {
            rng.random::<f64>() * 4.0 - 2.0
        } else {
            0.0
        }
    })
}

/// The first `k` standard basis vectors of R^d as rows.
pub fn axis_basis(k: usize, d: usize) -> Array2<f64> {
    Array2::from_shape_fn((k, d), |(i, j)| if i == j { 1.0 } else { 0.0 })
}
