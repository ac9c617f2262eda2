//! Reference cells, dimension pairs and integral kinds.
use crate::error::CompileError;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Shape of a simplicial reference cell.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellShape {
    Interval,
    Triangle,
    Tetrahedron,
}

impl CellShape {
    pub fn from_topological_dimension(tdim: usize) -> Option<Self> {
        match tdim {
            1 => Some(Self::Interval),
            2 => Some(Self::Triangle),
            3 => Some(Self::Tetrahedron),
            _ => None,
        }
    }

    pub fn topological_dimension(&self) -> usize {
        match self {
            Self::Interval => 1,
            Self::Triangle => 2,
            Self::Tetrahedron => 3,
        }
    }

    pub fn num_vertices(&self) -> usize {
        self.topological_dimension() + 1
    }

    pub fn num_facets(&self) -> usize {
        self.topological_dimension() + 1
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Interval => "interval",
            Self::Triangle => "triangle",
            Self::Tetrahedron => "tetrahedron",
        }
    }

    /// Measure of the reference cell, `1 / tdim!`.
    pub fn reference_volume(&self) -> f64 {
        match self {
            Self::Interval => 1.0,
            Self::Triangle => 0.5,
            Self::Tetrahedron => 1.0 / 6.0,
        }
    }

    /// Vertices of the reference cell, one column per vertex.
    ///
    /// Vertex 0 is the origin and vertex `k + 1` is the `k`-th unit vector.
    pub fn reference_vertices(&self) -> DMatrix<f64> {
        let tdim = self.topological_dimension();
        DMatrix::from_fn(tdim, tdim + 1, |row, col| if col == row + 1 { 1.0 } else { 0.0 })
    }

    /// Local vertex numbers of the given facet.
    ///
    /// Facet `f` is the sub-simplex opposite to vertex `f`, except for intervals where facet
    /// `f` is vertex `f` itself.
    ///
    /// # Panics
    ///
    /// Panics if the facet index is out of bounds.
    pub fn facet_vertices(&self, facet: usize) -> Vec<usize> {
        assert!(facet < self.num_facets(), "Facet index out of bounds.");
        match self {
            Self::Interval => vec![facet],
            _ => (0..self.num_vertices()).filter(|&v| v != facet).collect(),
        }
    }

    /// The local vertex that does not lie on the given facet.
    pub fn facet_opposite_vertex(&self, facet: usize) -> usize {
        match self {
            Self::Interval => 1 - facet,
            _ => facet,
        }
    }
}

impl fmt::Display for CellShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A supported pair of topological and geometric dimension.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "(usize, usize)", into = "(usize, usize)")]
pub struct CellDims {
    tdim: usize,
    gdim: usize,
}

impl CellDims {
    /// Checks that `1 <= tdim <= gdim <= 3`.
    pub fn new(tdim: usize, gdim: usize) -> Result<Self, CompileError> {
        if (1..=3).contains(&tdim) && (tdim..=3).contains(&gdim) {
            Ok(Self { tdim, gdim })
        } else {
            Err(CompileError::UnsupportedDimensions { tdim, gdim })
        }
    }

    pub fn tdim(&self) -> usize {
        self.tdim
    }

    pub fn gdim(&self) -> usize {
        self.gdim
    }

    /// Whether the cell is embedded in a higher-dimensional space.
    pub fn is_manifold(&self) -> bool {
        self.tdim < self.gdim
    }

    pub fn shape(&self) -> CellShape {
        match self.tdim {
            1 => CellShape::Interval,
            2 => CellShape::Triangle,
            _ => CellShape::Tetrahedron,
        }
    }

    /// All supported dimension pairs, ordered by (tdim, gdim).
    pub fn all() -> Vec<CellDims> {
        let mut dims = Vec::new();
        for tdim in 1..=3 {
            for gdim in tdim..=3 {
                dims.push(CellDims { tdim, gdim });
            }
        }
        dims
    }
}

impl TryFrom<(usize, usize)> for CellDims {
    type Error = CompileError;

    fn try_from((tdim, gdim): (usize, usize)) -> Result<Self, Self::Error> {
        Self::new(tdim, gdim)
    }
}

impl From<CellDims> for (usize, usize) {
    fn from(dims: CellDims) -> Self {
        (dims.tdim, dims.gdim)
    }
}

/// The domain an integral is taken over.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegralKind {
    Cell,
    ExteriorFacet,
    InteriorFacet,
}

impl IntegralKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cell => "cell",
            Self::ExteriorFacet => "exterior_facet",
            Self::InteriorFacet => "interior_facet",
        }
    }
}

/// The side of an interior facet a quantity is restricted to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Restriction {
    #[serde(rename = "+")]
    Plus,
    #[serde(rename = "-")]
    Minus,
}

impl Restriction {
    /// Position of the restricted cell in the pair of cells sharing an interior facet.
    pub fn side(&self) -> usize {
        match self {
            Self::Plus => 0,
            Self::Minus => 1,
        }
    }
}

/// Suffix appended to the names of geometric quantities of a restricted cell.
pub fn restriction_suffix(restriction: Option<Restriction>) -> &'static str {
    match restriction {
        None => "",
        Some(Restriction::Plus) => "0",
        Some(Restriction::Minus) => "1",
    }
}

/// Maps points of a reference facet rule into the coordinates of the reference cell.
///
/// The facet rule lives on the `(tdim - 1)`-dimensional reference simplex, whose vertex `k`
/// is mapped onto the `k`-th vertex of the facet.
pub fn map_facet_points(shape: CellShape, facet: usize, facet_points: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let reference = shape.reference_vertices();
    let facet_vertices = shape.facet_vertices(facet);
    let origin = reference.column(facet_vertices[0]);

    facet_points
        .iter()
        .map(|s| {
            let mut x = origin.clone_owned();
            for (k, s_k) in s.iter().enumerate() {
                let edge = reference.column(facet_vertices[k + 1]) - origin;
                x += edge * *s_k;
            }
            x.iter().copied().collect()
        })
        .collect()
}
