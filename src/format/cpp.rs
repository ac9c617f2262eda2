use crate::cell::{restriction_suffix, IntegralKind, Restriction};
use crate::expr::GeometrySymbol;
use crate::format::{CodeFormat, TensorFormat};
use itertools::Itertools;

/// Plain C++ routines following the UFC calling convention.
#[derive(Debug, Copy, Clone, Default)]
pub struct CppFormat;

fn join_indices(indices: &[usize]) -> String {
    indices.iter().join("_")
}

impl TensorFormat for CppFormat {
    fn floating_point(&self, value: f64) -> String {
        if value == 0.0 {
            // Avoids printing negative zero
            "0.0".to_string()
        } else {
            format!("{:?}", value)
        }
    }

    fn multiplication(&self) -> &'static str {
        "*"
    }

    fn geometry_symbol(&self, symbol: &GeometrySymbol) -> String {
        match *symbol {
            GeometrySymbol::Jacobian { restriction, row, col } => {
                format!("J{}_{}{}", restriction_suffix(restriction), row, col)
            }
            GeometrySymbol::InverseJacobian { restriction, row, col } => {
                format!("K{}_{}{}", restriction_suffix(restriction), row, col)
            }
            GeometrySymbol::Determinant { restriction } => format!("detJ{}", restriction_suffix(restriction)),
            GeometrySymbol::ScaleFactor => "det".to_string(),
        }
    }

    fn reference_tensor_name(&self, term: usize, i: &[usize], a: &[usize]) -> String {
        let mut name = format!("A{}", term);
        for indices in [i, a] {
            if !indices.is_empty() {
                name.push('_');
                name.push_str(&join_indices(indices));
            }
        }
        name
    }

    fn geometry_tensor_name(&self, term: usize, a: &[usize]) -> String {
        if a.is_empty() {
            format!("G{}", term)
        } else {
            format!("G{}_{}", term, join_indices(a))
        }
    }

    fn element_tensor_name(&self, _i: &[usize], linear_index: usize) -> String {
        format!("A[{}]", linear_index)
    }
}

impl CodeFormat for CppFormat {
    fn comment(&self, text: &str) -> String {
        format!("// {}", text)
    }

    fn declared_name(&self, statement: &str) -> Option<String> {
        let declaration = statement
            .strip_prefix("const double ")
            .or_else(|| statement.strip_prefix("double "))?;
        let (name, _) = declaration.split_once(" = ")?;
        let is_identifier = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        (is_identifier && statement.ends_with(';')).then(|| name.to_string())
    }

    fn const_float_declaration(&self, name: &str, value: &str) -> String {
        format!("const double {} = {};", name, value)
    }

    fn weight_declaration(&self, name: &str, weights: &[f64]) -> String {
        if weights.len() == 1 {
            format!("static const double {} = {};", name, self.floating_point(weights[0]))
        } else {
            format!(
                "static const double {}[{}] = {{{}}};",
                name,
                weights.len(),
                weights.iter().map(|&w| self.floating_point(w)).join(", ")
            )
        }
    }

    fn table_declaration(&self, name: &str, values: &[Vec<f64>]) -> String {
        let num_columns = values.first().map(Vec::len).unwrap_or(0);
        let rows = values
            .iter()
            .map(|row| format!("{{{}}}", row.iter().map(|&v| self.floating_point(v)).join(", ")))
            .join(",\n");
        format!(
            "static const double {}[{}][{}] = \\\n{{{}}};",
            name,
            values.len(),
            num_columns,
            rows
        )
    }

    fn nonzero_columns_declaration(&self, name: &str, columns: &[usize]) -> String {
        format!(
            "static const unsigned int {}[{}] = {{{}}};",
            name,
            columns.len(),
            columns.iter().join(", ")
        )
    }

    fn quadrature_point_variable(&self) -> &'static str {
        "ip"
    }

    fn facet_variable(&self, restriction: Option<Restriction>) -> String {
        format!("facet{}", restriction_suffix(restriction))
    }

    fn loop_begin(&self, variable: &str, begin: usize, end: usize) -> String {
        format!(
            "for (unsigned int {v} = {}; {v} < {}; {v}++)",
            begin,
            end,
            v = variable
        )
    }

    fn block_begin(&self) -> &'static str {
        "{"
    }

    fn block_end(&self) -> &'static str {
        "}"
    }

    fn array_access(&self, name: &str, index: &str) -> String {
        format!("{}[{}]", name, index)
    }

    fn matrix_access(&self, name: &str, row: &str, col: &str) -> String {
        format!("{}[{}][{}]", name, row, col)
    }

    fn element_tensor_access(&self, index: &str) -> String {
        format!("A[{}]", index)
    }

    fn assign(&self, target: &str, value: &str) -> String {
        format!("{} = {};", target, value)
    }

    fn add_assign(&self, target: &str, value: &str) -> String {
        format!("{} += {};", target, value)
    }

    fn switch_begin(&self, variable: &str) -> String {
        format!("switch ({})", variable)
    }

    fn case_label(&self, value: usize) -> String {
        format!("case {}:", value)
    }

    fn break_statement(&self) -> &'static str {
        "break;"
    }

    fn error_statement(&self, message: &str) -> String {
        format!("throw std::runtime_error(\"{}\");", message.replace('"', "\\\""))
    }

    fn routine_begin(&self, name: &str, kind: IntegralKind) -> String {
        let arguments = match kind {
            IntegralKind::Cell => "double* A, const ufc::cell& c",
            IntegralKind::ExteriorFacet => "double* A, const ufc::cell& c, unsigned int facet",
            IntegralKind::InteriorFacet => {
                "double* A, const ufc::cell& c0, const ufc::cell& c1, unsigned int facet0, unsigned int facet1"
            }
        };
        format!("void {}({})\n{{", name, arguments)
    }
}
