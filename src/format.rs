//! Output formats for generated code and documentation.
//!
//! [`TensorFormat`] holds the naming and arithmetic primitives needed to print element
//! tensors; [`CodeFormat`] adds the statements the quadrature generator emits.
use crate::cell::{IntegralKind, Restriction};
use crate::expr::{GeoMonomial, GeoSum, GeometrySymbol};

mod cpp;
mod latex;

pub use cpp::CppFormat;
pub use latex::{write_latex_document, LatexFormat};

pub trait TensorFormat {
    fn floating_point(&self, value: f64) -> String;

    /// Operator placed between the factors of a product.
    fn multiplication(&self) -> &'static str;

    fn geometry_symbol(&self, symbol: &GeometrySymbol) -> String;

    fn reference_tensor_name(&self, term: usize, i: &[usize], a: &[usize]) -> String;

    fn geometry_tensor_name(&self, term: usize, a: &[usize]) -> String;

    /// Name of an element tensor entry, `linear_index` being its position in the flat output.
    fn element_tensor_name(&self, i: &[usize], linear_index: usize) -> String;

    fn division(&self, numerator: &str, denominator: &str) -> String {
        format!("{}/{}", numerator, denominator)
    }

    fn grouping(&self, expression: &str) -> String {
        format!("({})", expression)
    }

    fn product(&self, factors: &[String]) -> String {
        factors.join(self.multiplication())
    }

    fn monomial(&self, monomial: &GeoMonomial) -> String {
        let coefficient = monomial.coefficient();
        let mut numerator = Vec::new();
        let mut denominator = Vec::new();
        if coefficient.abs() != 1.0 {
            numerator.push(self.floating_point(coefficient.abs()));
        }
        for (symbol, &exponent) in monomial.powers() {
            let name = self.geometry_symbol(symbol);
            let target = if exponent > 0 { &mut numerator } else { &mut denominator };
            for _ in 0..exponent.unsigned_abs() {
                target.push(name.clone());
            }
        }

        let mut text = if numerator.is_empty() {
            self.floating_point(1.0)
        } else {
            self.product(&numerator)
        };
        if !denominator.is_empty() {
            let denominator = if denominator.len() == 1 {
                denominator.remove(0)
            } else {
                self.grouping(&self.product(&denominator))
            };
            text = self.division(&text, &denominator);
        }
        if coefficient < 0.0 {
            format!("-{}", text)
        } else {
            text
        }
    }

    fn sum(&self, sum: &GeoSum) -> String {
        if sum.is_zero() {
            return self.floating_point(0.0);
        }
        let mut text = String::new();
        for term in sum.terms() {
            let term = self.monomial(term);
            if text.is_empty() {
                text = term;
            } else if let Some(negated) = term.strip_prefix('-') {
                text.push_str(" - ");
                text.push_str(negated);
            } else {
                text.push_str(" + ");
                text.push_str(&term);
            }
        }
        text
    }
}

/// Statements of a generated element tensor routine.
///
/// Every method returns a single statement or declaration without indentation. Declarations
/// spanning several lines separate them with `'\n'`.
pub trait CodeFormat: TensorFormat {
    fn comment(&self, text: &str) -> String;

    fn is_comment(&self, line: &str) -> bool {
        line.trim_start().starts_with(self.comment("").trim_end())
    }

    /// Name of the scalar declared by a single-line statement, if it is such a declaration.
    fn declared_name(&self, statement: &str) -> Option<String>;

    fn const_float_declaration(&self, name: &str, value: &str) -> String;

    /// Declares quadrature weights, as a scalar when there is a single weight.
    fn weight_declaration(&self, name: &str, weights: &[f64]) -> String;

    /// Declares a `[point][column]` table of basis function values.
    fn table_declaration(&self, name: &str, values: &[Vec<f64>]) -> String;

    fn nonzero_columns_declaration(&self, name: &str, columns: &[usize]) -> String;

    fn weight_name(&self, term: usize) -> String {
        format!("W{}", term)
    }

    fn table_name(&self, number: usize) -> String {
        format!("FE{}", number)
    }

    fn nonzero_columns_name(&self, number: usize) -> String {
        format!("nzc{}", number)
    }

    fn geometry_constant_name(&self, number: usize) -> String {
        format!("G{}", number)
    }

    fn quadrature_point_variable(&self) -> &'static str;

    fn facet_variable(&self, restriction: Option<Restriction>) -> String;

    fn loop_begin(&self, variable: &str, begin: usize, end: usize) -> String;

    fn block_begin(&self) -> &'static str;

    fn block_end(&self) -> &'static str;

    fn array_access(&self, name: &str, index: &str) -> String;

    fn matrix_access(&self, name: &str, row: &str, col: &str) -> String;

    fn element_tensor_access(&self, index: &str) -> String;

    fn assign(&self, target: &str, value: &str) -> String;

    fn add_assign(&self, target: &str, value: &str) -> String;

    fn switch_begin(&self, variable: &str) -> String;

    fn case_label(&self, value: usize) -> String;

    fn break_statement(&self) -> &'static str;

    /// Statement aborting the routine at runtime with the given message.
    fn error_statement(&self, message: &str) -> String;

    fn routine_begin(&self, name: &str, kind: IntegralKind) -> String;

    fn routine_end(&self) -> String {
        self.block_end().to_string()
    }
}
