//! Tabulation of reference basis functions.
use crate::derivatives::{derivative_combinations, num_derivatives};
use crate::element::{ElementDescriptor, ElementFamily};
use crate::error::CompileError;

/// Values of reference basis functions or their derivatives at a set of points.
///
/// Entries are indexed by `[point][dof][derivative][component]`, where `derivative` numbers
/// the combinations of reference axes returned by
/// [`derivative_combinations`](crate::derivatives::derivative_combinations).
#[derive(Debug, Clone, PartialEq)]
pub struct BasisTable {
    num_points: usize,
    num_dofs: usize,
    num_derivatives: usize,
    num_components: usize,
    values: Vec<f64>,
}

impl BasisTable {
    pub fn zeros(num_points: usize, num_dofs: usize, num_derivatives: usize, num_components: usize) -> Self {
        Self {
            num_points,
            num_dofs,
            num_derivatives,
            num_components,
            values: vec![0.0; num_points * num_dofs * num_derivatives * num_components],
        }
    }

    pub fn num_points(&self) -> usize {
        self.num_points
    }

    pub fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    pub fn num_derivatives(&self) -> usize {
        self.num_derivatives
    }

    pub fn num_components(&self) -> usize {
        self.num_components
    }

    fn offset(&self, point: usize, dof: usize, derivative: usize, component: usize) -> usize {
        assert!(point < self.num_points, "Point index out of bounds.");
        assert!(dof < self.num_dofs, "Dof index out of bounds.");
        assert!(derivative < self.num_derivatives, "Derivative index out of bounds.");
        assert!(component < self.num_components, "Component index out of bounds.");
        ((point * self.num_dofs + dof) * self.num_derivatives + derivative) * self.num_components + component
    }

    pub fn get(&self, point: usize, dof: usize, derivative: usize, component: usize) -> f64 {
        self.values[self.offset(point, dof, derivative, component)]
    }

    pub fn get_mut(&mut self, point: usize, dof: usize, derivative: usize, component: usize) -> &mut f64 {
        let offset = self.offset(point, dof, derivative, component);
        &mut self.values[offset]
    }

    /// The `[point][dof]` matrix of one derivative of one component.
    pub fn slice(&self, derivative: usize, component: usize) -> Vec<Vec<f64>> {
        (0..self.num_points)
            .map(|point| {
                (0..self.num_dofs)
                    .map(|dof| self.get(point, dof, derivative, component))
                    .collect()
            })
            .collect()
    }
}

/// Evaluates reference basis functions of finite elements.
pub trait BasisTabulator {
    /// Tabulates all derivatives of exactly the given order at the given reference points.
    ///
    /// Fails with [`CompileError::UnsupportedElement`] if the element cannot be tabulated.
    fn tabulate(&self, element: &ElementDescriptor, points: &[Vec<f64>], order: usize)
        -> Result<BasisTable, CompileError>;
}

/// Tabulates the Lagrange elements of degree at most one on simplices.
///
/// Degree one elements use the barycentric basis `phi_0 = 1 - sum_k x_k`,
/// `phi_k = x_(k - 1)`, the discontinuous degree zero element is the constant one.
#[derive(Debug, Copy, Clone, Default)]
pub struct LagrangeTabulator;

impl LagrangeTabulator {
    fn scalar_basis(degree: usize, tdim: usize, point: &[f64], combination: &[usize]) -> Vec<f64> {
        match (degree, combination.len()) {
            (0, 0) => vec![1.0],
            (0, _) => vec![0.0],
            (_, 0) => {
                let mut values = Vec::with_capacity(tdim + 1);
                values.push(1.0 - point.iter().sum::<f64>());
                values.extend_from_slice(point);
                values
            }
            (_, 1) => {
                let axis = combination[0];
                let mut values = vec![0.0; tdim + 1];
                values[0] = -1.0;
                values[axis + 1] = 1.0;
                values
            }
            _ => vec![0.0; tdim + 1],
        }
    }
}

impl BasisTabulator for LagrangeTabulator {
    fn tabulate(
        &self,
        element: &ElementDescriptor,
        points: &[Vec<f64>],
        order: usize,
    ) -> Result<BasisTable, CompileError> {
        let supported = match element.family {
            ElementFamily::Lagrange => element.degree == 1,
            ElementFamily::DiscontinuousLagrange | ElementFamily::VectorLagrange => element.degree <= 1,
            _ => false,
        };
        if !supported {
            return Err(CompileError::UnsupportedElement(element.to_string()));
        }

        let tdim = element.cell.topological_dimension();
        if let Some(point) = points.iter().find(|point| point.len() != tdim) {
            return Err(CompileError::UnsupportedElement(format!(
                "{} cannot be tabulated at points with {} coordinates",
                element,
                point.len()
            )));
        }
        let num_components = element.reference_value_size().max(1);
        let combinations = derivative_combinations(tdim, order);
        let mut table = BasisTable::zeros(points.len(), element.space_dimension(), num_derivatives(tdim, order), num_components);

        for (p, point) in points.iter().enumerate() {
            for (d, combination) in combinations.iter().enumerate() {
                let scalar = Self::scalar_basis(element.degree, tdim, point, combination);
                for (dof, dof_data) in element.dofs.iter().enumerate() {
                    let component = dof_data.reference_offset;
                    *table.get_mut(p, dof, d, component) = scalar[dof % scalar.len()];
                }
            }
        }
        Ok(table)
    }
}
