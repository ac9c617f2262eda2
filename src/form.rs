//! Input forms: sums of monomials of basis functions under an integral.
use crate::cell::{CellDims, CellShape, IntegralKind, Restriction};
use crate::element::ElementDescriptor;
use crate::error::CompileError;
use serde::{Deserialize, Serialize};

/// One basis function, possibly differentiated, appearing in a monomial.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BasisFactor {
    /// Number of the argument the basis function is drawn from.
    pub argument: usize,
    /// Physical value component.
    #[serde(default)]
    pub component: usize,
    /// Physical axes of the partial derivatives, in order of application.
    #[serde(default)]
    pub derivatives: Vec<usize>,
    /// Side of an interior facet the basis function is restricted to.
    #[serde(default)]
    pub restriction: Option<Restriction>,
}

impl BasisFactor {
    pub fn new(argument: usize) -> Self {
        Self {
            argument,
            component: 0,
            derivatives: Vec::new(),
            restriction: None,
        }
    }

    pub fn with_component(mut self, component: usize) -> Self {
        self.component = component;
        self
    }

    pub fn with_derivative(mut self, axis: usize) -> Self {
        self.derivatives.push(axis);
        self
    }

    pub fn with_restriction(mut self, restriction: Restriction) -> Self {
        self.restriction = Some(restriction);
        self
    }

    pub fn order(&self) -> usize {
        self.derivatives.len()
    }
}

fn default_coefficient() -> f64 {
    1.0
}

/// A constant times a product of basis functions, integrated over one kind of domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monomial {
    pub integral: IntegralKind,
    /// Sub-domain identifier of the integral.
    #[serde(default)]
    pub domain: usize,
    #[serde(default = "default_coefficient")]
    pub coefficient: f64,
    /// Overrides the estimated polynomial degree of the integrand.
    #[serde(default)]
    pub quadrature_degree: Option<usize>,
    pub factors: Vec<BasisFactor>,
}

impl Monomial {
    pub fn new(integral: IntegralKind, factors: Vec<BasisFactor>) -> Self {
        Self {
            integral,
            domain: 0,
            coefficient: 1.0,
            quadrature_degree: None,
            factors,
        }
    }

    pub fn with_domain(mut self, domain: usize) -> Self {
        self.domain = domain;
        self
    }

    pub fn with_coefficient(mut self, coefficient: f64) -> Self {
        self.coefficient = coefficient;
        self
    }

    pub fn with_quadrature_degree(mut self, degree: usize) -> Self {
        self.quadrature_degree = Some(degree);
        self
    }
}

/// A multilinear form over the arguments' finite element spaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Form {
    pub name: String,
    pub cell: CellShape,
    pub geometric_dimension: usize,
    /// Elements of the arguments, test function first.
    pub arguments: Vec<ElementDescriptor>,
    pub monomials: Vec<Monomial>,
}

impl Form {
    pub fn new(name: impl Into<String>, cell: CellShape, geometric_dimension: usize) -> Self {
        Self {
            name: name.into(),
            cell,
            geometric_dimension,
            arguments: Vec::new(),
            monomials: Vec::new(),
        }
    }

    pub fn with_argument(mut self, element: ElementDescriptor) -> Self {
        self.arguments.push(element);
        self
    }

    pub fn with_monomial(mut self, monomial: Monomial) -> Self {
        self.monomials.push(monomial);
        self
    }

    pub fn rank(&self) -> usize {
        self.arguments.len()
    }

    pub fn dims(&self) -> Result<CellDims, CompileError> {
        CellDims::new(self.cell.topological_dimension(), self.geometric_dimension)
    }

    /// Local space dimensions of the arguments.
    pub fn argument_dims(&self) -> Vec<usize> {
        self.arguments.iter().map(ElementDescriptor::space_dimension).collect()
    }

    /// Estimated polynomial degree of the integrand, unless overridden.
    pub fn quadrature_degree(&self, monomial: &Monomial) -> usize {
        monomial.quadrature_degree.unwrap_or_else(|| {
            monomial
                .factors
                .iter()
                .map(|factor| {
                    let degree = self.arguments.get(factor.argument).map_or(0, |element| element.degree);
                    degree.saturating_sub(factor.order())
                })
                .sum()
        })
    }

    /// Returns the factors of a monomial ordered by argument number.
    ///
    /// Fails if an argument does not appear exactly once, if a factor refers to a missing
    /// argument, component or axis, if an argument lives on another cell than the form, or if
    /// the restrictions do not match the integral.
    pub fn validate_monomial<'a>(&self, monomial: &'a Monomial) -> Result<Vec<&'a BasisFactor>, CompileError> {
        let dims = self.dims()?;
        let mut ordered: Vec<Option<&BasisFactor>> = vec![None; self.rank()];

        for factor in &monomial.factors {
            let element = self.arguments.get(factor.argument).ok_or_else(|| {
                CompileError::InvalidMonomial(format!("argument {} does not exist", factor.argument))
            })?;
            if element.cell != self.cell {
                return Err(CompileError::InvalidMonomial(format!(
                    "argument {} is defined on a {}, but the form is integrated over a {}",
                    factor.argument, element.cell, self.cell
                )));
            }
            let slot = &mut ordered[factor.argument];
            if slot.is_some() {
                return Err(CompileError::InvalidMonomial(format!(
                    "argument {} appears more than once",
                    factor.argument
                )));
            }
            *slot = Some(factor);

            if factor.component >= element.physical_value_size().max(1) {
                return Err(CompileError::InvalidMonomial(format!(
                    "component {} out of range for {}",
                    factor.component, element
                )));
            }
            if let Some(axis) = factor.derivatives.iter().find(|&&axis| axis >= dims.gdim()) {
                return Err(CompileError::InvalidMonomial(format!(
                    "derivative along axis {} in {} dimensions",
                    axis,
                    dims.gdim()
                )));
            }
            let restricted = factor.restriction.is_some();
            let interior = monomial.integral == IntegralKind::InteriorFacet;
            if restricted != interior {
                return Err(CompileError::InvalidMonomial(format!(
                    "basis functions must be restricted exactly on interior facets (argument {})",
                    factor.argument
                )));
            }
        }

        ordered
            .into_iter()
            .enumerate()
            .map(|(argument, factor)| {
                factor.ok_or_else(|| CompileError::InvalidMonomial(format!("argument {} is missing", argument)))
            })
            .collect()
    }
}
