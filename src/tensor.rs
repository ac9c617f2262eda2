//! Tensor representation of element tensors.
//!
//! For affinely mapped elements the element tensor of a monomial factors as
//! `A_i = sum_a A0_ia GK_a`, where the reference tensor `A0` only depends on the reference
//! basis functions and is computed at compile time, and the geometry tensor `GK` is a product
//! of inverse Jacobian entries evaluated at runtime.
use crate::basis::BasisTabulator;
use crate::cell::IntegralKind;
use crate::element::MappingKind;
use crate::error::CompileError;
use crate::expr::{GeoMonomial, GeometrySymbol};
use crate::form::Form;
use crate::format::TensorFormat;
use crate::geometry::AffineCellMap;
use crate::index::{Index, IndexContext, MultiIndex};
use crate::quadrature::ReferenceRule;
use log::debug;

/// Reference tensor entries with a magnitude below this threshold are treated as zero.
pub const EPSILON: f64 = 3e-16;

/// The precomputed tensor `A0` of one term.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceTensor {
    i: MultiIndex,
    a: MultiIndex,
    values: Vec<f64>,
}

impl ReferenceTensor {
    /// Creates a reference tensor from values stored row-major, primary indices first.
    ///
    /// # Panics
    ///
    /// Panics if the number of values does not match the index ranges.
    pub fn new(i: MultiIndex, a: MultiIndex, values: Vec<f64>) -> Self {
        assert_eq!(
            values.len(),
            i.num_tuples() * a.num_tuples(),
            "Number of values must match the index ranges."
        );
        Self { i, a, values }
    }

    pub fn from_fn(i: MultiIndex, a: MultiIndex, f: impl Fn(&[usize], &[usize]) -> f64) -> Self {
        let mut values = Vec::with_capacity(i.num_tuples() * a.num_tuples());
        for i_tuple in i.tuples() {
            for a_tuple in a.tuples() {
                values.push(f(&i_tuple, &a_tuple));
            }
        }
        Self::new(i, a, values)
    }

    /// The primary multi-index.
    pub fn i(&self) -> &MultiIndex {
        &self.i
    }

    /// The secondary multi-index.
    pub fn a(&self) -> &MultiIndex {
        &self.a
    }

    pub fn value(&self, i: &[usize], a: &[usize]) -> f64 {
        self.values[self.i.linear_index(i) * self.a.num_tuples() + self.a.linear_index(a)]
    }
}

/// A factor of a geometry tensor.
///
/// The indices of a geometry factor are fixed or secondary.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum GeometryFactor {
    ScaleFactor,
    Determinant(i32),
    Jacobian(Index, Index),
    InverseJacobian(Index, Index),
}

/// The runtime tensor `GK` of one term.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryTensor {
    a: MultiIndex,
    coefficient: f64,
    factors: Vec<GeometryFactor>,
}

impl GeometryTensor {
    /// # Panics
    ///
    /// Panics if a factor carries a primary index.
    pub fn new(a: MultiIndex, coefficient: f64, factors: Vec<GeometryFactor>) -> Self {
        let has_primary = factors.iter().any(|factor| match factor {
            GeometryFactor::Jacobian(r, c) | GeometryFactor::InverseJacobian(r, c) => {
                matches!(r, Index::Primary(_)) || matches!(c, Index::Primary(_))
            }
            _ => false,
        });
        assert!(!has_primary, "Geometry tensors cannot depend on primary indices.");
        Self { a, coefficient, factors }
    }

    pub fn a(&self) -> &MultiIndex {
        &self.a
    }

    /// The symbolic value of the entry with the given secondary index tuple.
    pub fn evaluate(&self, a: &[usize]) -> GeoMonomial {
        let offset = self.a.secondary_offset();
        let resolve = |index: &Index| index.resolve(&[], a, offset);
        self.factors
            .iter()
            .fold(GeoMonomial::constant(self.coefficient), |product, factor| {
                let factor = match factor {
                    GeometryFactor::ScaleFactor => GeoMonomial::symbol(GeometrySymbol::ScaleFactor),
                    GeometryFactor::Determinant(power) => {
                        GeoMonomial::power(GeometrySymbol::Determinant { restriction: None }, *power)
                    }
                    GeometryFactor::Jacobian(r, c) => GeoMonomial::symbol(GeometrySymbol::Jacobian {
                        restriction: None,
                        row: resolve(r),
                        col: resolve(c),
                    }),
                    GeometryFactor::InverseJacobian(r, c) => GeoMonomial::symbol(GeometrySymbol::InverseJacobian {
                        restriction: None,
                        row: resolve(r),
                        col: resolve(c),
                    }),
                };
                product * factor
            })
    }
}

/// A pair of a reference tensor and a geometry tensor over the same secondary indices.
#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    a0: ReferenceTensor,
    gk: GeometryTensor,
}

impl Term {
    /// # Panics
    ///
    /// Panics if the secondary ranges of the tensors differ.
    pub fn new(a0: ReferenceTensor, gk: GeometryTensor) -> Self {
        assert_eq!(
            a0.a().dims(),
            gk.a().dims(),
            "Reference and geometry tensor must share the secondary index range."
        );
        Self { a0, gk }
    }

    pub fn reference_tensor(&self) -> &ReferenceTensor {
        &self.a0
    }

    pub fn geometry_tensor(&self) -> &GeometryTensor {
        &self.gk
    }
}

/// A named value in the generated code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Declaration {
    pub name: String,
    pub value: String,
}

impl Declaration {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// The element tensor of all terms of one integral.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementTensor {
    terms: Vec<Term>,
    integral: IntegralKind,
    domain: usize,
    a0: Vec<Declaration>,
    gk: Vec<Declaration>,
    ak: Vec<Declaration>,
}

impl ElementTensor {
    /// Builds the reference, geometry and element tensor declarations.
    ///
    /// Fails with [`CompileError::RankMismatch`] unless all terms share the same primary
    /// index range.
    pub fn new(
        terms: Vec<Term>,
        integral: IntegralKind,
        domain: usize,
        format: &impl TensorFormat,
    ) -> Result<Self, CompileError> {
        if let Some(first) = terms.first() {
            let expected = first.a0.i().dims();
            if let Some(term) = terms.iter().find(|term| term.a0.i().dims() != expected) {
                return Err(CompileError::RankMismatch {
                    expected: expected.to_vec(),
                    actual: term.a0.i().dims().to_vec(),
                });
            }
        }

        let a0 = Self::reference_tensor_declarations(&terms, format);
        let gk = Self::geometry_tensor_declarations(&terms, format);
        let ak = Self::element_tensor_declarations(&terms, format);
        Ok(Self {
            terms,
            integral,
            domain,
            a0,
            gk,
            ak,
        })
    }

    fn reference_tensor_declarations(terms: &[Term], format: &impl TensorFormat) -> Vec<Declaration> {
        let mut declarations = Vec::new();
        for (j, term) in terms.iter().enumerate() {
            let a0 = &term.a0;
            for i in a0.i().tuples() {
                for a in a0.a().tuples() {
                    let name = format.reference_tensor_name(j, &i, &a);
                    declarations.push(Declaration::new(name, format.floating_point(a0.value(&i, &a))));
                }
            }
        }
        declarations
    }

    fn geometry_tensor_declarations(terms: &[Term], format: &impl TensorFormat) -> Vec<Declaration> {
        let mut declarations = Vec::new();
        for (j, term) in terms.iter().enumerate() {
            for a in term.gk.a().tuples() {
                let name = format.geometry_tensor_name(j, &a);
                declarations.push(Declaration::new(name, format.monomial(&term.gk.evaluate(&a))));
            }
        }
        declarations
    }

    fn element_tensor_declarations(terms: &[Term], format: &impl TensorFormat) -> Vec<Declaration> {
        let first = match terms.first() {
            Some(first) => first,
            None => return Vec::new(),
        };

        let mut declarations = Vec::new();
        let primary = first.a0.i();
        for i in primary.tuples() {
            let mut value = String::new();
            for (j, term) in terms.iter().enumerate() {
                for a in term.a0.a().tuples() {
                    let a0 = term.a0.value(&i, &a);
                    if a0.abs() <= EPSILON {
                        continue;
                    }
                    let gk = format.geometry_tensor_name(j, &a);
                    let (separator, magnitude) = match (value.is_empty(), a0 < 0.0) {
                        (true, _) => ("", a0),
                        (false, true) => (" - ", -a0),
                        (false, false) => (" + ", a0),
                    };
                    value.push_str(separator);
                    value.push_str(&format.floating_point(magnitude));
                    value.push_str(format.multiplication());
                    value.push_str(&gk);
                }
            }
            if value.is_empty() {
                value = format.floating_point(0.0);
            }
            let name = format.element_tensor_name(&i, primary.linear_index(&i));
            declarations.push(Declaration::new(name, value));
        }
        declarations
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    pub fn integral(&self) -> IntegralKind {
        self.integral
    }

    pub fn domain(&self) -> usize {
        self.domain
    }

    /// Reference tensor declarations.
    pub fn a0(&self) -> &[Declaration] {
        &self.a0
    }

    /// Geometry tensor declarations.
    pub fn gk(&self) -> &[Declaration] {
        &self.gk
    }

    /// Element tensor declarations.
    pub fn ak(&self) -> &[Declaration] {
        &self.ak
    }

    /// Evaluates the element tensor numerically, skipping the same reference tensor entries
    /// as the declarations do.
    pub fn evaluate_with(&self, value_of: impl Fn(&GeometrySymbol) -> f64) -> Vec<f64> {
        let first = match self.terms.first() {
            Some(first) => first,
            None => return Vec::new(),
        };
        first
            .a0
            .i()
            .tuples()
            .iter()
            .map(|i| {
                let mut value = 0.0;
                for term in &self.terms {
                    for a in term.a0.a().tuples() {
                        let a0 = term.a0.value(i, &a);
                        if a0.abs() > EPSILON {
                            value += a0 * term.gk.evaluate(&a).evaluate(&value_of);
                        }
                    }
                }
                value
            })
            .collect()
    }

    /// Evaluates the element tensor of a cell integral on the given cell.
    pub fn evaluate(&self, map: &AffineCellMap) -> Vec<f64> {
        self.evaluate_with(|symbol| map.symbol_value(symbol))
    }
}

/// Builds the element tensor of a list of terms.
pub fn build_element_tensor(
    terms: Vec<Term>,
    integral: IntegralKind,
    domain: usize,
    format: &impl TensorFormat,
) -> Result<ElementTensor, CompileError> {
    ElementTensor::new(terms, integral, domain, format)
}

/// Whether the monomials can be compiled with the tensor representation.
///
/// This requires affinely mapped elements and excludes interior facets, whose integrands
/// couple two cells.
pub fn supports_tensor_representation(form: &Form, integral: IntegralKind) -> bool {
    integral != IntegralKind::InteriorFacet
        && form
            .arguments
            .iter()
            .all(|element| element.mapping == MappingKind::Affine)
}

/// Computes the terms of the tensor representation of some monomials of a form.
///
/// Each derivative of a basis function contributes one secondary index running over the
/// reference axes, contracted with an entry of the inverse Jacobian. For facet integrals the
/// reference tensor is computed on the given facet.
pub fn tensor_terms(
    form: &Form,
    monomials: &[&crate::form::Monomial],
    facet: Option<usize>,
    primary: &MultiIndex,
    context: &mut IndexContext,
    tabulator: &impl BasisTabulator,
) -> Result<Vec<Term>, CompileError> {
    let tdim = form.cell.topological_dimension();
    let mut terms = Vec::with_capacity(monomials.len());

    for monomial in monomials {
        let factors = form.validate_monomial(monomial)?;
        let rule = ReferenceRule::new(form.cell, facet, form.quadrature_degree(monomial))?;

        let num_secondary: usize = factors.iter().map(|factor| factor.order()).sum();
        let a = MultiIndex::secondary(context, &vec![tdim; num_secondary]);

        let mut geometry_factors = vec![GeometryFactor::ScaleFactor];
        let mut secondary = a.indices().iter();
        let mut tables = Vec::with_capacity(factors.len());
        for factor in &factors {
            let element = &form.arguments[factor.argument];
            tables.push(tabulator.tabulate(element, rule.points(), factor.order())?);
            for &axis in &factor.derivatives {
                if let Some(&index) = secondary.next() {
                    geometry_factors.push(GeometryFactor::InverseJacobian(index, Index::Fixed(axis)));
                }
            }
        }

        let a0 = ReferenceTensor::from_fn(primary.clone(), a.clone(), |i, a| {
            let mut offset = 0;
            // Position of each factor's derivative tuple among the derivative combinations
            let derivative_numbers: Vec<usize> = factors
                .iter()
                .map(|factor| {
                    let axes = &a[offset..offset + factor.order()];
                    offset += factor.order();
                    axes.iter().fold(0, |number, &axis| number * tdim + axis)
                })
                .collect();

            (0..rule.num_points())
                .map(|p| {
                    factors
                        .iter()
                        .zip(&tables)
                        .zip(&derivative_numbers)
                        .fold(rule.weights()[p], |product, ((factor, table), &d)| {
                            product * table.get(p, i[factor.argument], d, factor.component)
                        })
                })
                .sum()
        });

        debug!(
            "Reference tensor with primary dimensions {:?} and secondary dimensions {:?}",
            primary.dims(),
            a.dims()
        );
        terms.push(Term::new(a0, GeometryTensor::new(a, monomial.coefficient, geometry_factors)));
    }

    Ok(terms)
}
