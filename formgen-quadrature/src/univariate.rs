//! Gauss-Legendre rules on the reference interval `[0, 1]`.
//!
//! The points are the eigenvalues of the Jacobi matrix of the Legendre polynomials shifted to
//! `[0, 1]`, and the weights the squared first components of the normalized eigenvectors
//! (Golub-Welsch).
use crate::Rule;
use nalgebra::linalg::SymmetricEigen;
use nalgebra::DMatrix;

/// Off-diagonal entry coupling the shifted Legendre polynomials of degree `k - 1` and `k`.
fn jacobi_off_diagonal(k: usize) -> f64 {
    let k = k as f64;
    0.5 * k / (4.0 * k * k - 1.0).sqrt()
}

/// The symmetric tridiagonal matrix whose eigenvalues are the `n` Gauss points on `[0, 1]`.
fn jacobi_matrix(n: usize) -> DMatrix<f64> {
    DMatrix::from_fn(n, n, |i, j| match i.abs_diff(j) {
        0 => 0.5,
        1 => jacobi_off_diagonal(i.max(j)),
        _ => 0.0,
    })
}

/// Gauss-Legendre rule with `num_points` points on `[0, 1]`.
///
/// The rule integrates polynomials of degree `2 * num_points - 1` exactly. Weights sum to the
/// length of the interval and points are returned in increasing order.
///
/// # Panics
///
/// Panics if `num_points` is zero.
pub fn unit_interval_gauss(num_points: usize) -> Rule<1> {
    assert!(num_points > 0, "A Gauss rule needs at least one point.");
    let n = num_points;

    let eigen = SymmetricEigen::new(jacobi_matrix(n));
    let mut nodes: Vec<(f64, f64)> = eigen
        .eigenvalues
        .iter()
        .zip(eigen.eigenvectors.column_iter())
        .map(|(&x, v)| (x, v[0] * v[0]))
        .collect();
    nodes.sort_by(|a, b| a.0.total_cmp(&b.0));

    let total: f64 = nodes.iter().map(|&(_, w)| w).sum();
    for node in &mut nodes {
        node.1 /= total;
    }

    // Points come in pairs mirrored about the midpoint
    for i in 0..n / 2 {
        let j = n - 1 - i;
        let x = 0.5 * (nodes[i].0 + 1.0 - nodes[j].0);
        let w = 0.5 * (nodes[i].1 + nodes[j].1);
        nodes[i] = (x, w);
        nodes[j] = (1.0 - x, w);
    }
    if n % 2 == 1 {
        nodes[n / 2].0 = 0.5;
    }

    nodes.into_iter().map(|(x, w)| (w, [x])).unzip()
}
