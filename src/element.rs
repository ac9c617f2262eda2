//! Descriptions of the finite elements that basis functions are drawn from.
use crate::cell::CellShape;
use crate::error::CompileError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How reference basis function values are mapped to the physical cell.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MappingKind {
    Affine,
    CovariantPiola,
    ContravariantPiola,
    DoubleCovariantPiola,
    DoubleContravariantPiola,
}

impl MappingKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Affine => "affine",
            Self::CovariantPiola => "covariant piola",
            Self::ContravariantPiola => "contravariant piola",
            Self::DoubleCovariantPiola => "double covariant piola",
            Self::DoubleContravariantPiola => "double contravariant piola",
        }
    }

    /// Number of reference components a basis function with this mapping has.
    pub fn num_reference_components(&self, tdim: usize) -> usize {
        match self {
            Self::Affine => 1,
            Self::CovariantPiola | Self::ContravariantPiola => tdim,
            Self::DoubleCovariantPiola | Self::DoubleContravariantPiola => tdim * tdim,
        }
    }

    /// Number of physical components a mapped basis function has.
    pub fn num_physical_components(&self, gdim: usize) -> usize {
        match self {
            Self::Affine => 1,
            Self::CovariantPiola | Self::ContravariantPiola => gdim,
            Self::DoubleCovariantPiola | Self::DoubleContravariantPiola => gdim * gdim,
        }
    }
}

impl FromStr for MappingKind {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.replace('_', " ").to_lowercase().as_str() {
            "affine" => Ok(Self::Affine),
            "covariant piola" => Ok(Self::CovariantPiola),
            "contravariant piola" => Ok(Self::ContravariantPiola),
            "double covariant piola" => Ok(Self::DoubleCovariantPiola),
            "double contravariant piola" => Ok(Self::DoubleContravariantPiola),
            _ => Err(CompileError::UnknownMapping(s.to_string())),
        }
    }
}

impl TryFrom<String> for MappingKind {
    type Error = CompileError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MappingKind> for String {
    fn from(mapping: MappingKind) -> Self {
        mapping.name().to_string()
    }
}

impl fmt::Display for MappingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ElementFamily {
    Lagrange,
    DiscontinuousLagrange,
    VectorLagrange,
    RaviartThomas,
    Nedelec,
}

impl ElementFamily {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Lagrange => "Lagrange",
            Self::DiscontinuousLagrange => "Discontinuous Lagrange",
            Self::VectorLagrange => "Vector Lagrange",
            Self::RaviartThomas => "Raviart-Thomas",
            Self::Nedelec => "Nedelec 1st kind H(curl)",
        }
    }
}

/// Mapping data of a single degree of freedom.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DofData {
    pub mapping: MappingKind,
    /// First reference component of the basis function's value.
    pub reference_offset: usize,
    /// First physical component the mapped value is written to.
    pub physical_offset: usize,
    /// Number of reference components of the basis function's value.
    pub num_components: usize,
}

/// A finite element as seen by the code generator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementDescriptor {
    pub family: ElementFamily,
    pub cell: CellShape,
    pub degree: usize,
    /// Physical value shape, empty for scalar elements.
    pub value_shape: Vec<usize>,
    pub reference_value_shape: Vec<usize>,
    pub mapping: MappingKind,
    pub dofs: Vec<DofData>,
}

/// Dimension of the space of polynomials of the given degree on a simplex.
fn num_scalar_dofs(cell: CellShape, degree: usize) -> usize {
    let tdim = cell.topological_dimension();
    (1..=tdim).fold(1, |n, k| n * (degree + k) / k)
}

fn affine_dofs(num_dofs: usize, component: usize) -> impl Iterator<Item = DofData> {
    (0..num_dofs).map(move |_| DofData {
        mapping: MappingKind::Affine,
        reference_offset: component,
        physical_offset: component,
        num_components: 1,
    })
}

fn piola_dofs(num_dofs: usize, mapping: MappingKind, tdim: usize) -> Vec<DofData> {
    (0..num_dofs)
        .map(|_| DofData {
            mapping,
            reference_offset: 0,
            physical_offset: 0,
            num_components: mapping.num_reference_components(tdim),
        })
        .collect()
}

impl ElementDescriptor {
    pub fn lagrange(cell: CellShape, degree: usize) -> Self {
        Self::scalar(ElementFamily::Lagrange, cell, degree)
    }

    pub fn discontinuous_lagrange(cell: CellShape, degree: usize) -> Self {
        Self::scalar(ElementFamily::DiscontinuousLagrange, cell, degree)
    }

    fn scalar(family: ElementFamily, cell: CellShape, degree: usize) -> Self {
        Self {
            family,
            cell,
            degree,
            value_shape: Vec::new(),
            reference_value_shape: Vec::new(),
            mapping: MappingKind::Affine,
            dofs: affine_dofs(num_scalar_dofs(cell, degree), 0).collect(),
        }
    }

    /// A vector-valued Lagrange element with `num_components` components.
    ///
    /// The dofs are blocked by component: all dofs of component 0 come first.
    pub fn vector_lagrange(cell: CellShape, degree: usize, num_components: usize) -> Self {
        let n = num_scalar_dofs(cell, degree);
        Self {
            family: ElementFamily::VectorLagrange,
            cell,
            degree,
            value_shape: vec![num_components],
            reference_value_shape: vec![num_components],
            mapping: MappingKind::Affine,
            dofs: (0..num_components)
                .flat_map(|component| affine_dofs(n, component))
                .collect(),
        }
    }

    /// Lowest order Raviart-Thomas element, one dof per facet.
    pub fn raviart_thomas(cell: CellShape, gdim: usize) -> Self {
        let tdim = cell.topological_dimension();
        Self {
            family: ElementFamily::RaviartThomas,
            cell,
            degree: 1,
            value_shape: vec![gdim],
            reference_value_shape: vec![tdim],
            mapping: MappingKind::ContravariantPiola,
            dofs: piola_dofs(cell.num_facets(), MappingKind::ContravariantPiola, tdim),
        }
    }

    /// Lowest order Nedelec element of the first kind, one dof per edge.
    pub fn nedelec(cell: CellShape, gdim: usize) -> Self {
        let tdim = cell.topological_dimension();
        let num_edges = cell.num_vertices() * (cell.num_vertices() - 1) / 2;
        Self {
            family: ElementFamily::Nedelec,
            cell,
            degree: 1,
            value_shape: vec![gdim],
            reference_value_shape: vec![tdim],
            mapping: MappingKind::CovariantPiola,
            dofs: piola_dofs(num_edges, MappingKind::CovariantPiola, tdim),
        }
    }

    pub fn space_dimension(&self) -> usize {
        self.dofs.len()
    }

    pub fn reference_value_size(&self) -> usize {
        self.reference_value_shape.iter().product()
    }

    pub fn physical_value_size(&self) -> usize {
        self.value_shape.iter().product()
    }
}

impl fmt::Display for ElementDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{} on a {} of degree {}>",
            self.family.name(),
            self.cell,
            self.degree
        )
    }
}
