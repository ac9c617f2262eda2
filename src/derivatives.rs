//! Mapping of reference derivatives to physical derivatives.
//!
//! A derivative of order `k` is identified by the ordered tuple of axes it differentiates
//! along. By the chain rule, the physical derivative along `(g_1, ..., g_k)` is the sum over
//! reference tuples `(t_1, ..., t_k)` of `prod_m K[t_m][g_m]` times the reference derivative.
use crate::basis::BasisTable;
use crate::element::ElementDescriptor;
use crate::error::CompileError;
use crate::geometry::{value_transform, AffineCellMap, MapEntries};
use itertools::Itertools;

/// All ordered tuples of `order` axes in `0..dim`, in lexicographic order.
///
/// Order zero has the single empty tuple.
pub fn derivative_combinations(dim: usize, order: usize) -> Vec<Vec<usize>> {
    if order == 0 {
        return vec![Vec::new()];
    }
    (0..order).map(|_| 0..dim).multi_cartesian_product().collect()
}

pub fn num_derivatives(dim: usize, order: usize) -> usize {
    dim.pow(order as u32)
}

/// The `num_derivatives(gdim, order) x num_derivatives(tdim, order)` matrix taking reference
/// derivatives to physical derivatives.
pub fn derivative_transform<M: MapEntries>(order: usize, map: &M) -> Vec<Vec<M::Scalar>> {
    let dims = map.dims();
    let combinations_t = derivative_combinations(dims.tdim(), order);
    let combinations_g = derivative_combinations(dims.gdim(), order);

    combinations_g
        .iter()
        .map(|combination_g| {
            combinations_t
                .iter()
                .map(|combination_t| {
                    combination_t
                        .iter()
                        .zip(combination_g)
                        .fold(map.one(), |entry, (&t, &g)| entry * map.inverse_jacobian_entry(t, g))
                })
                .collect()
        })
        .collect()
}

/// Maps tabulated reference values and derivatives of an element to the physical cell.
///
/// Values are first mapped by the value transform of each dof's mapping, then the derivatives
/// are transformed. The result is indexed by `[point][dof][physical derivative][physical
/// component]`.
pub fn transform_reference_basis_derivatives(
    element: &ElementDescriptor,
    reference_values: &BasisTable,
    order: usize,
    map: &AffineCellMap,
) -> Result<BasisTable, CompileError> {
    let dims = map.dims();
    let num_derivatives_t = num_derivatives(dims.tdim(), order);
    let num_derivatives_g = num_derivatives(dims.gdim(), order);
    assert_eq!(
        reference_values.num_derivatives(),
        num_derivatives_t,
        "Reference table does not hold derivatives of the requested order."
    );
    assert_eq!(reference_values.num_dofs(), element.space_dimension());

    let transform = derivative_transform(order, map);
    let num_physical_components = element.physical_value_size().max(1);
    let mut values = BasisTable::zeros(
        reference_values.num_points(),
        element.space_dimension(),
        num_derivatives_g,
        num_physical_components,
    );

    for (dof, dof_data) in element.dofs.iter().enumerate() {
        let transforms: Vec<_> = (0..dof_data.mapping.num_physical_components(dims.gdim()))
            .map(|i| value_transform(dof_data.mapping, i, dof_data.num_components, map))
            .collect::<Result<_, _>>()?;

        for point in 0..reference_values.num_points() {
            for s in 0..num_derivatives_t {
                let reference: Vec<f64> = (0..dof_data.num_components)
                    .map(|jj| reference_values.get(point, dof, s, dof_data.reference_offset + jj))
                    .collect();
                for (i, value_transform) in transforms.iter().enumerate() {
                    let mapped_value = value_transform.apply(&reference);
                    for (r, transform_row) in transform.iter().enumerate() {
                        *values.get_mut(point, dof, r, dof_data.physical_offset + i) += transform_row[s] * mapped_value;
                    }
                }
            }
        }
    }

    Ok(values)
}
