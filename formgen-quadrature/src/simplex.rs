//! Collapsed Gauss rules for the reference simplices.
//!
//! A rule with `n` points per axis is obtained by mapping the tensor product Gauss rule on the
//! unit cube onto the simplex with the Duffy transform. The Jacobian of the transform is folded
//! into the weights.

use crate::univariate::unit_interval_gauss;
use crate::{DynamicRule, Error, Rule};

/// Number of Gauss points per axis needed to integrate polynomials of total degree `degree`
/// exactly on the `dim`-dimensional reference simplex.
///
/// The Duffy transform contributes a polynomial factor of degree `dim - 1` along the collapsed
/// axes, which the count accounts for.
pub fn points_per_axis(degree: usize, dim: usize) -> usize {
    ((degree + dim + 1) / 2).max(1)
}

/// Gauss rule for the reference interval `[0, 1]`.
pub fn interval(num_points_per_axis: usize) -> Rule<1> {
    unit_interval_gauss(num_points_per_axis)
}

/// Collapsed Gauss rule for the reference triangle.
pub fn triangle(num_points_per_axis: usize) -> Rule<2> {
    let (weights1d, points1d) = unit_interval_gauss(num_points_per_axis);
    let n = num_points_per_axis;
    let mut weights = Vec::with_capacity(n * n);
    let mut points = Vec::with_capacity(n * n);

    let rule1d_iter = || weights1d.iter().zip(&points1d);

    for (&wu, &[u]) in rule1d_iter() {
        for (&wv, &[v]) in rule1d_iter() {
            weights.push(wu * wv * (1.0 - v));
            points.push([u * (1.0 - v), v]);
        }
    }

    (weights, points)
}

/// Collapsed Gauss rule for the reference tetrahedron.
pub fn tetrahedron(num_points_per_axis: usize) -> Rule<3> {
    let (weights1d, points1d) = unit_interval_gauss(num_points_per_axis);
    let n = num_points_per_axis;
    let mut weights = Vec::with_capacity(n * n * n);
    let mut points = Vec::with_capacity(n * n * n);

    let rule1d_iter = || weights1d.iter().zip(&points1d);

    for (&wu, &[u]) in rule1d_iter() {
        for (&wv, &[v]) in rule1d_iter() {
            for (&ww, &[w]) in rule1d_iter() {
                weights.push(wu * wv * ww * (1.0 - v) * (1.0 - w) * (1.0 - w));
                points.push([u * (1.0 - v) * (1.0 - w), v * (1.0 - w), w]);
            }
        }
    }

    (weights, points)
}

/// A rule for the `dim`-dimensional reference simplex that is exact for polynomials of total
/// degree `degree`.
///
/// Dimension zero gives the single point rule used for the facets of an interval.
pub fn simplex_rule(dim: usize, degree: usize) -> Result<DynamicRule, Error> {
    let n = points_per_axis(degree, dim);
    match dim {
        0 => Ok(DynamicRule {
            weights: vec![1.0],
            points: vec![Vec::new()],
        }),
        1 => Ok(interval(n).into()),
        2 => Ok(triangle(n).into()),
        3 => Ok(tetrahedron(n).into()),
        _ => Err(Error::UnsupportedDimension(dim)),
    }
}
