//! Quadrature rules for the reference simplices of the UFC convention.
//!
//! The reference interval is `[0, 1]`, the reference triangle has the vertices
//! `(0, 0), (1, 0), (0, 1)` and the reference tetrahedron the vertices
//! `(0, 0, 0), (1, 0, 0), (0, 1, 0), (0, 0, 1)`.
//!
//! The simplex rules are collapsed (Duffy) products of Gauss rules. They are designed to be
//! usable without `formgen`, which mainly needs them for tabulating weights and basis values
//! at compile time.

use std::fmt;
use std::fmt::{Display, Formatter};

pub mod simplex;
pub mod univariate;

/// Library-wide error type.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The requested simplex dimension is not supported.
    UnsupportedDimension(usize),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedDimension(dim) => {
                write!(f, "Simplex quadrature is not available in dimension {}", dim)
            }
        }
    }
}

impl std::error::Error for Error {}

/// A D-dimensional point.
pub type Point<const D: usize> = [f64; D];

/// A D-dimensional rule.
pub type Rule<const D: usize> = (Vec<f64>, Vec<Point<D>>);

/// A rule whose dimension is only known at runtime.
///
/// Every point has the same number of coordinates. A zero-dimensional rule (used for the
/// facets of an interval) consists of a single empty point with unit weight.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicRule {
    pub weights: Vec<f64>,
    pub points: Vec<Vec<f64>>,
}

impl DynamicRule {
    pub fn num_points(&self) -> usize {
        self.weights.len()
    }

    pub fn dim(&self) -> usize {
        self.points.first().map(Vec::len).unwrap_or(0)
    }
}

impl<const D: usize> From<Rule<D>> for DynamicRule {
    fn from((weights, points): Rule<D>) -> Self {
        Self {
            weights,
            points: points.into_iter().map(|p| p.to_vec()).collect(),
        }
    }
}

/// Approximates the integral of `f` with the given rule.
pub fn integrate<const D: usize>(rule: &Rule<D>, f: impl Fn(&Point<D>) -> f64) -> f64 {
    let (weights, points) = rule;
    weights.iter().zip(points).map(|(w, p)| w * f(p)).sum()
}
