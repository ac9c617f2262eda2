//! Tabulated weights and basis function values shared by the terms of one integral.
use crate::basis::BasisTable;
use crate::cell::CellDims;
use crate::codegen::buffer::CodeBuffer;
use crate::derivatives::derivative_transform;
use crate::element::ElementDescriptor;
use crate::error::CompileError;
use crate::expr::{GeoMonomial, GeometrySymbol};
use crate::form::BasisFactor;
use crate::format::CodeFormat;
use crate::geometry::{value_transform, SymbolicMap};
use itertools::Itertools;
use ordered_float::OrderedFloat;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

/// Values `[point][dof]` of one basis factor, to be multiplied by `geometry`.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorTable {
    pub geometry: GeoMonomial,
    pub values: Vec<Vec<f64>>,
}

/// Splits a physical basis factor into reference tables with geometric coefficients.
///
/// The physical value is `sum_k geometry_k * values_k`, combining the value transform of each
/// dof with the derivative transform of the factor. Values with magnitude below `epsilon` are
/// set to zero and tables without any non-zero value are dropped.
pub fn expand_factor(
    element: &ElementDescriptor,
    factor: &BasisFactor,
    reference: &BasisTable,
    dims: CellDims,
    epsilon: f64,
) -> Result<Vec<FactorTable>, CompileError> {
    let map = SymbolicMap {
        dims,
        restriction: factor.restriction,
    };
    let transform = derivative_transform(factor.order(), &map);
    let derivative = factor
        .derivatives
        .iter()
        .fold(0, |number, &axis| number * dims.gdim() + axis);
    let (num_points, num_dofs) = (reference.num_points(), reference.num_dofs());

    let mut tables: BTreeMap<Vec<(GeometrySymbol, i32)>, FactorTable> = BTreeMap::new();
    for (dof, dof_data) in element.dofs.iter().enumerate() {
        let num_physical = dof_data.mapping.num_physical_components(dims.gdim());
        let physical_range = dof_data.physical_offset..dof_data.physical_offset + num_physical;
        if !physical_range.contains(&factor.component) {
            continue;
        }
        let mapped = value_transform(
            dof_data.mapping,
            factor.component - dof_data.physical_offset,
            dof_data.num_components,
            &map,
        )?;

        for (s, chain) in transform[derivative].iter().enumerate() {
            for (jj, entry) in mapped.row.iter().enumerate() {
                let coefficient = &(chain * &mapped.scale) * entry;
                let key = coefficient.powers().iter().map(|(symbol, power)| (*symbol, *power)).collect();
                let table = tables.entry(key).or_insert_with(|| FactorTable {
                    geometry: coefficient.normalized(),
                    values: vec![vec![0.0; num_dofs]; num_points],
                });
                for (p, row) in table.values.iter_mut().enumerate() {
                    row[dof] += coefficient.coefficient() * reference.get(p, dof, s, dof_data.reference_offset + jj);
                }
            }
        }
    }

    Ok(tables
        .into_values()
        .filter_map(|mut table| {
            table
                .values
                .iter_mut()
                .flatten()
                .filter(|v| v.abs() < epsilon)
                .for_each(|v| *v = 0.0);
            let nonzero = table.values.iter().flatten().any(|&v| v != 0.0);
            nonzero.then_some(table)
        })
        .collect())
}

/// A registered table as seen from the loops using it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableRef {
    pub name: String,
    pub num_columns: usize,
    /// Array mapping table columns to dofs, if the table only holds non-zero columns.
    pub nonzero_columns: Option<String>,
}

type TableKey = Vec<Vec<OrderedFloat<f64>>>;

/// Deduplicates basis tables by their values.
#[derive(Debug, Default)]
pub struct TableRegistry {
    compress_columns: bool,
    names: FxHashMap<TableKey, usize>,
    tables: Vec<Vec<Vec<f64>>>,
    column_names: FxHashMap<Vec<usize>, usize>,
    columns: Vec<Vec<usize>>,
}

impl TableRegistry {
    pub fn new(compress_columns: bool) -> Self {
        Self {
            compress_columns,
            ..Default::default()
        }
    }

    pub fn register(&mut self, values: &[Vec<f64>], format: &impl CodeFormat) -> TableRef {
        let num_dofs = values.first().map_or(0, Vec::len);
        let nonzero: Vec<usize> = (0..num_dofs)
            .filter(|&dof| values.iter().any(|row| row[dof] != 0.0))
            .collect();

        let (values, nonzero_columns) = if self.compress_columns && nonzero.len() < num_dofs {
            let compressed: Vec<Vec<f64>> = values
                .iter()
                .map(|row| nonzero.iter().map(|&dof| row[dof]).collect())
                .collect();
            let next = self.columns.len();
            let number = *self.column_names.entry(nonzero.clone()).or_insert(next);
            if number == next {
                self.columns.push(nonzero);
            }
            (compressed, Some(format.nonzero_columns_name(number)))
        } else {
            (values.to_vec(), None)
        };

        let key: TableKey = values
            .iter()
            .map(|row| row.iter().copied().map(OrderedFloat).collect())
            .collect();
        let next = self.tables.len();
        let number = *self.names.entry(key).or_insert(next);
        let num_columns = values.first().map_or(0, Vec::len);
        if number == next {
            self.tables.push(values);
        }

        TableRef {
            name: format.table_name(number),
            num_columns,
            nonzero_columns,
        }
    }

    pub fn num_tables(&self) -> usize {
        self.tables.len()
    }

    pub fn declarations(&self, format: &impl CodeFormat) -> CodeBuffer {
        let mut code = CodeBuffer::new();
        for (number, values) in self.tables.iter().enumerate() {
            code.blank();
            code.push(format.table_declaration(&format.table_name(number), values));
        }
        for (number, columns) in self.columns.iter().enumerate() {
            code.blank();
            code.push(format.comment("Array of non-zero columns"));
            code.push(format.nonzero_columns_declaration(&format.nonzero_columns_name(number), columns));
        }
        code
    }
}

/// Deduplicates quadrature weights across terms.
#[derive(Debug, Default)]
pub struct WeightRegistry {
    groups: Vec<(Vec<f64>, Vec<usize>)>,
    index: FxHashMap<Vec<OrderedFloat<f64>>, usize>,
}

/// Python-style tuple of term numbers, `(0,)` or `(0, 1)`.
pub fn term_tuple(terms: &[usize]) -> String {
    match terms {
        [single] => format!("({},)", single),
        _ => format!("({})", terms.iter().join(", ")),
    }
}

impl WeightRegistry {
    /// Returns the name of the weights of the given term, shared with the first term having
    /// identical weights.
    pub fn register(&mut self, term: usize, weights: &[f64], format: &impl CodeFormat) -> String {
        let key = weights.iter().copied().map(OrderedFloat).collect();
        let next = self.groups.len();
        let group = *self.index.entry(key).or_insert(next);
        if group == next {
            self.groups.push((weights.to_vec(), vec![term]));
        } else {
            self.groups[group].1.push(term);
        }
        format.weight_name(self.groups[group].1[0])
    }

    pub fn declarations(&self, format: &impl CodeFormat) -> CodeBuffer {
        let mut code = CodeBuffer::new();
        for (weights, terms) in &self.groups {
            let comment = match terms.as_slice() {
                [term] => format!("Array of quadrature weights (tensor/monomial term {})", term),
                _ => format!("Array of quadrature weights (tensor/monomial terms {})", term_tuple(terms)),
            };
            code.push(format.comment(&comment));
            code.push(format.weight_declaration(&format.weight_name(terms[0]), weights));
        }
        code
    }
}
