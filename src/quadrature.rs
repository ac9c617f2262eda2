//! Quadrature rules on the reference cell and its facets.
use crate::cell::{map_facet_points, CellShape};
use crate::error::CompileError;
use formgen_quadrature::simplex::simplex_rule;

/// Errors returned by quadrature methods.
pub use formgen_quadrature::Error as QuadratureError;

/// A quadrature rule whose points are given in reference cell coordinates.
///
/// Facet rules keep the weights of the reference facet, so integrals over a physical facet
/// are obtained by scaling with the facet determinant.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceRule {
    weights: Vec<f64>,
    points: Vec<Vec<f64>>,
}

impl ReferenceRule {
    /// A rule for the reference cell, exact for polynomials of the given degree.
    pub fn cell(shape: CellShape, degree: usize) -> Result<Self, CompileError> {
        let rule = simplex_rule(shape.topological_dimension(), degree)?;
        Ok(Self {
            weights: rule.weights,
            points: rule.points,
        })
    }

    /// A rule for one facet of the reference cell, exact for polynomials of the given degree.
    pub fn facet(shape: CellShape, facet: usize, degree: usize) -> Result<Self, CompileError> {
        let rule = simplex_rule(shape.topological_dimension() - 1, degree)?;
        Ok(Self {
            points: map_facet_points(shape, facet, &rule.points),
            weights: rule.weights,
        })
    }

    /// A cell rule if `facet` is `None`, otherwise a rule for the given facet.
    pub fn new(shape: CellShape, facet: Option<usize>, degree: usize) -> Result<Self, CompileError> {
        match facet {
            None => Self::cell(shape, degree),
            Some(facet) => Self::facet(shape, facet, degree),
        }
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn points(&self) -> &[Vec<f64>] {
        &self.points
    }

    pub fn num_points(&self) -> usize {
        self.weights.len()
    }

    /// Approximates the integral of the given function using this quadrature rule.
    pub fn integrate(&self, f: impl Fn(&[f64]) -> f64) -> f64 {
        self.weights
            .iter()
            .zip(&self.points)
            .map(|(w, p)| w * f(p))
            .sum()
    }
}
