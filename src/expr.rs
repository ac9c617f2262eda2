//! Symbolic geometry expressions.
//!
//! Geometry tensors and the coefficients of the quadrature loops are products of Jacobian
//! entries, inverse Jacobian entries and powers of the determinant. They are kept symbolic
//! until a [`TensorFormat`](crate::format::TensorFormat) turns them into text, or a cell map
//! evaluates them.
use crate::cell::Restriction;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Mul;

/// A scalar geometric quantity available in a generated routine.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GeometrySymbol {
    /// `J[row][col]`, derivative of physical coordinate `row` with respect to reference
    /// coordinate `col`.
    Jacobian {
        restriction: Option<Restriction>,
        row: usize,
        col: usize,
    },
    /// `K[row][col]`, derivative of reference coordinate `row` with respect to physical
    /// coordinate `col`.
    InverseJacobian {
        restriction: Option<Restriction>,
        row: usize,
        col: usize,
    },
    /// The (pseudo-)determinant of the Jacobian.
    Determinant { restriction: Option<Restriction> },
    /// The measure scaling of the integration domain: `|detJ|` for cells and the facet
    /// determinant for facets.
    ScaleFactor,
}

/// A product `coefficient * prod_k s_k^p_k` of geometry symbols.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoMonomial {
    coefficient: f64,
    powers: BTreeMap<GeometrySymbol, i32>,
}

impl GeoMonomial {
    pub fn constant(coefficient: f64) -> Self {
        Self {
            coefficient,
            powers: BTreeMap::new(),
        }
    }

    pub fn symbol(symbol: GeometrySymbol) -> Self {
        Self::power(symbol, 1)
    }

    pub fn power(symbol: GeometrySymbol, exponent: i32) -> Self {
        let mut powers = BTreeMap::new();
        if exponent != 0 {
            powers.insert(symbol, exponent);
        }
        Self {
            coefficient: 1.0,
            powers,
        }
    }

    pub fn coefficient(&self) -> f64 {
        self.coefficient
    }

    /// Symbols with non-zero exponents, ordered by symbol.
    pub fn powers(&self) -> &BTreeMap<GeometrySymbol, i32> {
        &self.powers
    }

    pub fn is_constant(&self) -> bool {
        self.powers.is_empty()
    }

    pub fn scaled(mut self, factor: f64) -> Self {
        self.coefficient *= factor;
        self
    }

    /// The same powers with coefficient one.
    pub fn normalized(&self) -> Self {
        Self {
            coefficient: 1.0,
            powers: self.powers.clone(),
        }
    }

    /// Evaluates the monomial given values for every symbol.
    pub fn evaluate(&self, value_of: &impl Fn(&GeometrySymbol) -> f64) -> f64 {
        self.powers
            .iter()
            .fold(self.coefficient, |acc, (symbol, &exponent)| acc * value_of(symbol).powi(exponent))
    }

    /// Number of multiplications and divisions needed to evaluate the monomial.
    pub fn num_operations(&self) -> usize {
        let num_factors: usize = self.powers.values().map(|p| p.unsigned_abs() as usize).sum();
        let coefficient_factor = usize::from(self.coefficient.abs() != 1.0);
        (num_factors + coefficient_factor).saturating_sub(1)
    }
}

impl Mul for GeoMonomial {
    type Output = GeoMonomial;

    fn mul(mut self, rhs: GeoMonomial) -> GeoMonomial {
        self.coefficient *= rhs.coefficient;
        for (symbol, exponent) in rhs.powers {
            let entry = self.powers.entry(symbol).or_insert(0);
            *entry += exponent;
            if *entry == 0 {
                self.powers.remove(&symbol);
            }
        }
        self
    }
}

impl<'a> Mul<&'a GeoMonomial> for &'a GeoMonomial {
    type Output = GeoMonomial;

    fn mul(self, rhs: &'a GeoMonomial) -> GeoMonomial {
        self.clone() * rhs.clone()
    }
}

/// A sum of geometry monomials in canonical form.
///
/// Monomials with identical powers are merged and terms are ordered by their powers, so two
/// sums that are equal up to reordering compare equal and format identically.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoSum {
    terms: Vec<GeoMonomial>,
}

impl GeoSum {
    pub fn from_terms(terms: impl IntoIterator<Item = GeoMonomial>) -> Self {
        let mut merged: BTreeMap<Vec<(GeometrySymbol, i32)>, GeoMonomial> = BTreeMap::new();
        for term in terms {
            let key: Vec<_> = term.powers.iter().map(|(s, p)| (*s, *p)).collect();
            let coefficient = term.coefficient;
            merged
                .entry(key)
                .and_modify(|existing| existing.coefficient += coefficient)
                .or_insert(term);
        }
        let terms = merged
            .into_values()
            .filter(|term| term.coefficient != 0.0)
            .collect();
        Self { terms }
    }

    pub fn terms(&self) -> &[GeoMonomial] {
        &self.terms
    }

    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn evaluate(&self, value_of: &impl Fn(&GeometrySymbol) -> f64) -> f64 {
        self.terms.iter().map(|term| term.evaluate(value_of)).sum()
    }

    /// Operations needed to evaluate every monomial plus the additions joining them.
    pub fn num_operations(&self) -> usize {
        let products: usize = self.terms.iter().map(GeoMonomial::num_operations).sum();
        products + self.terms.len().saturating_sub(1)
    }
}

impl From<GeoMonomial> for GeoSum {
    fn from(monomial: GeoMonomial) -> Self {
        Self::from_terms([monomial])
    }
}
