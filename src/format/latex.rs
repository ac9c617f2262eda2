use crate::cell::Restriction;
use crate::expr::GeometrySymbol;
use crate::format::TensorFormat;
use crate::tensor::{ElementTensor, EPSILON};
use eyre::WrapErr;
use itertools::Itertools;
use std::io::Write;

/// Documentation renderer printing element tensors as LaTeX equations.
#[derive(Debug, Copy, Clone, Default)]
pub struct LatexFormat;

fn one_based(indices: &[usize], separator: &str) -> String {
    indices.iter().map(|index| index + 1).join(separator)
}

fn restricted(symbol: String, restriction: Option<Restriction>) -> String {
    match restriction {
        None => symbol,
        Some(Restriction::Plus) => format!("\\left({}\\right)^{{+}}", symbol),
        Some(Restriction::Minus) => format!("\\left({}\\right)^{{-}}", symbol),
    }
}

impl TensorFormat for LatexFormat {
    fn floating_point(&self, value: f64) -> String {
        if (value.round() - value).abs() < EPSILON {
            format!("{}", value.round() as i64)
        } else {
            format!("{:.3}", value)
        }
    }

    fn multiplication(&self) -> &'static str {
        " "
    }

    fn geometry_symbol(&self, symbol: &GeometrySymbol) -> String {
        match *symbol {
            GeometrySymbol::Jacobian { restriction, row, col } => restricted(
                format!("\\frac{{\\partial x_{{{}}}}}{{\\partial X_{{{}}}}}", row + 1, col + 1),
                restriction,
            ),
            GeometrySymbol::InverseJacobian { restriction, row, col } => restricted(
                format!("\\frac{{\\partial X_{{{}}}}}{{\\partial x_{{{}}}}}", row + 1, col + 1),
                restriction,
            ),
            GeometrySymbol::Determinant { restriction } => restricted("\\det F_K'".to_string(), restriction),
            GeometrySymbol::ScaleFactor => "|\\det F_K'|".to_string(),
        }
    }

    fn reference_tensor_name(&self, term: usize, i: &[usize], a: &[usize]) -> String {
        format!("A^{{0,{}}}_{{{};{}}}", term + 1, one_based(i, ""), one_based(a, ""))
    }

    fn geometry_tensor_name(&self, term: usize, a: &[usize]) -> String {
        format!("G_{{K,{}}}^{{{}}}", term + 1, one_based(a, ","))
    }

    fn element_tensor_name(&self, i: &[usize], _linear_index: usize) -> String {
        format!("A^K_{{{}}}", one_based(i, ""))
    }

    fn division(&self, numerator: &str, denominator: &str) -> String {
        format!("\\frac{{{}}}{{{}}}", numerator, denominator)
    }
}

fn equation_array<'a>(
    out: &mut impl Write,
    declarations: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> std::io::Result<()> {
    writeln!(out, "\\begin{{equation}}")?;
    writeln!(out, "  \\begin{{array}}{{rcl}}")?;
    for (name, value) in declarations {
        writeln!(out, "    {} &=& {} \\\\", name, value)?;
    }
    writeln!(out, "  \\end{{array}}")?;
    writeln!(out, "\\end{{equation}}")?;
    writeln!(out)
}

/// Prints a reference tensor of primary and secondary rank two as a matrix of matrices,
/// once with each of the multi-indices leading.
fn reference_tensor_tables(out: &mut impl Write, tensor: &ElementTensor, format: &LatexFormat) -> std::io::Result<()> {
    let a0 = tensor.terms()[0].reference_tensor();
    let (i_dims, a_dims) = (a0.i().dims(), a0.a().dims());

    for i_leading in [true, false] {
        let (outer, inner) = if i_leading { (i_dims, a_dims) } else { (a_dims, i_dims) };
        let title = if i_leading { "$i$" } else { "$\\alpha$" };
        writeln!(out, "\\subsubsection{{Reference tensor ({} leading index)}}", title)?;
        writeln!(out)?;
        writeln!(out, "\\begin{{center}}")?;
        writeln!(out, "\\begin{{tabular}}{{|{}|}}", vec!["c"; outer[1]].join("|"))?;
        writeln!(out, "\\hline")?;
        for o0 in 0..outer[0] {
            for o1 in 0..outer[1] {
                writeln!(out, "\\begin{{tabular}}{{{}}}", "c".repeat(inner[1]))?;
                for n0 in 0..inner[0] {
                    let row = (0..inner[1])
                        .map(|n1| {
                            let value = if i_leading {
                                a0.value(&[o0, o1], &[n0, n1])
                            } else {
                                a0.value(&[n0, n1], &[o0, o1])
                            };
                            format.floating_point(value)
                        })
                        .join(" & ");
                    writeln!(out, "{}\\\\", row)?;
                }
                writeln!(out, "\\end{{tabular}}")?;
                if o1 + 1 < outer[1] {
                    writeln!(out, "&")?;
                }
            }
            writeln!(out, "\\\\\\hline")?;
        }
        writeln!(out, "\\end{{tabular}}")?;
        writeln!(out, "\\end{{center}}")?;
        writeln!(out)?;
    }
    Ok(())
}

/// Writes a LaTeX document describing the evaluation of the given element tensors.
///
/// Each tensor gets its own subsection with the given title. The tensors should have been
/// built with [`LatexFormat`].
pub fn write_latex_document(
    out: &mut impl Write,
    name: &str,
    tensors: &[(&str, &ElementTensor)],
) -> eyre::Result<()> {
    let format = LatexFormat;
    let mut write_all = || -> std::io::Result<()> {
        writeln!(out, "\\documentclass[12pt]{{article}}")?;
        writeln!(out)?;
        writeln!(out, "\\begin{{document}}")?;
        writeln!(out)?;
        writeln!(out, "\\title{{{}}}", name)?;
        writeln!(out, "\\author{{Automatically generated by formgen}}")?;
        writeln!(out, "\\date{{\\today}}")?;
        writeln!(out, "\\maketitle")?;
        writeln!(out)?;
        writeln!(out, "\\section{{Form {}}}", name)?;

        for (title, tensor) in tensors {
            if tensor.terms().is_empty() {
                continue;
            }
            writeln!(out, "\\subsection{{{}}}", title)?;
            writeln!(out, "\\subsubsection{{Evaluation of the geometry tensor}}")?;
            writeln!(out)?;
            equation_array(out, tensor.gk().iter().map(|d| (d.name.as_str(), d.value.as_str())))?;
            writeln!(out, "\\subsubsection{{Evaluation of the element tensor}}")?;
            writeln!(out)?;
            equation_array(out, tensor.ak().iter().map(|d| (d.name.as_str(), d.value.as_str())))?;

            let a0 = tensor.terms()[0].reference_tensor();
            if tensor.terms().len() == 1 && a0.i().rank() == 2 && a0.a().rank() == 2 {
                reference_tensor_tables(out, tensor, &format)?;
            }
        }

        writeln!(out, "\\end{{document}}")
    };
    write_all().wrap_err_with(|| format!("failed to write LaTeX document for form {}", name))
}
