//! Affine simplex geometry for every supported pair of topological and geometric dimension.
//!
//! Vertex coordinates are stored column-wise in a `gdim x (tdim + 1)` matrix. The Jacobian
//! `J` is `gdim x tdim` with `J[g][t] = x[t + 1][g] - x[0][g]`, and the (pseudo-)inverse
//! `K` is `tdim x gdim`. Every function here is a closed-form formula that matches the
//! generated code produced by [`snippets`].
use crate::cell::{CellDims, CellShape, Restriction};
use crate::element::MappingKind;
use crate::error::CompileError;
use crate::expr::{GeoMonomial, GeometrySymbol};
use nalgebra::{DMatrix, DVector, Vector3};
use std::ops::Mul;

pub mod snippets;

fn assert_vertex_shape(vertices: &DMatrix<f64>, dims: CellDims) {
    assert_eq!(
        vertices.nrows(),
        dims.gdim(),
        "Vertex coordinates must have one row per geometric dimension."
    );
    assert_eq!(
        vertices.ncols(),
        dims.tdim() + 1,
        "Vertex coordinates must have one column per vertex."
    );
}

fn edge(vertices: &DMatrix<f64>, from: usize, to: usize) -> DVector<f64> {
    vertices.column(to) - vertices.column(from)
}

fn cross(a: &DVector<f64>, b: &DVector<f64>) -> DVector<f64> {
    let a = Vector3::new(a[0], a[1], a[2]);
    let b = Vector3::new(b[0], b[1], b[2]);
    let c = a.cross(&b);
    DVector::from_column_slice(c.as_slice())
}

/// Jacobian of the affine map from the reference cell.
pub fn jacobian(vertices: &DMatrix<f64>, dims: CellDims) -> DMatrix<f64> {
    assert_vertex_shape(vertices, dims);
    DMatrix::from_fn(dims.gdim(), dims.tdim(), |g, t| vertices[(g, t + 1)] - vertices[(g, 0)])
}

/// Computes the determinant and inverse of the Jacobian.
///
/// For manifold cells the pseudo-determinant `sqrt(det(J^T J))` and the pseudo-inverse
/// `(J^T J)^-1 J^T` are returned instead. Degenerate cells give non-finite values.
pub fn inverse_jacobian(j: &DMatrix<f64>, dims: CellDims) -> (f64, DMatrix<f64>) {
    let (tdim, gdim) = (dims.tdim(), dims.gdim());
    assert_eq!(j.shape(), (gdim, tdim), "Jacobian must be gdim x tdim.");
    let j = |r: usize, c: usize| j[(r, c)];

    match (tdim, gdim) {
        (1, 1) => {
            let det = j(0, 0);
            (det, DMatrix::from_element(1, 1, 1.0 / det))
        }
        (2, 2) => {
            let det = j(0, 0) * j(1, 1) - j(0, 1) * j(1, 0);
            let k = DMatrix::from_row_slice(2, 2, &[j(1, 1), -j(0, 1), -j(1, 0), j(0, 0)]) / det;
            (det, k)
        }
        (3, 3) => {
            let d = DMatrix::from_row_slice(
                3,
                3,
                &[
                    j(1, 1) * j(2, 2) - j(1, 2) * j(2, 1),
                    j(1, 2) * j(2, 0) - j(1, 0) * j(2, 2),
                    j(1, 0) * j(2, 1) - j(1, 1) * j(2, 0),
                    j(0, 2) * j(2, 1) - j(0, 1) * j(2, 2),
                    j(0, 0) * j(2, 2) - j(0, 2) * j(2, 0),
                    j(0, 1) * j(2, 0) - j(0, 0) * j(2, 1),
                    j(0, 1) * j(1, 2) - j(0, 2) * j(1, 1),
                    j(0, 2) * j(1, 0) - j(0, 0) * j(1, 2),
                    j(0, 0) * j(1, 1) - j(0, 1) * j(1, 0),
                ],
            );
            let det = j(0, 0) * d[(0, 0)] + j(1, 0) * d[(1, 0)] + j(2, 0) * d[(2, 0)];
            (det, d.transpose() / det)
        }
        (1, _) => {
            let det2: f64 = (0..gdim).map(|g| j(g, 0) * j(g, 0)).sum();
            let k = DMatrix::from_fn(1, gdim, |_, g| j(g, 0) / det2);
            (det2.sqrt(), k)
        }
        _ => {
            // Triangle in 3D
            let d0 = j(1, 0) * j(2, 1) - j(2, 0) * j(1, 1);
            let d1 = -(j(0, 0) * j(2, 1) - j(2, 0) * j(0, 1));
            let d2 = j(0, 0) * j(1, 1) - j(1, 0) * j(0, 1);
            let det = (d0 * d0 + d1 * d1 + d2 * d2).sqrt();

            let n1: f64 = (0..3).map(|g| j(g, 0) * j(g, 0)).sum();
            let n2: f64 = (0..3).map(|g| j(g, 1) * j(g, 1)).sum();
            let m: f64 = (0..3).map(|g| j(g, 0) * j(g, 1)).sum();
            let den = n1 * n2 - m * m;

            let k = DMatrix::from_fn(2, 3, |t, g| match t {
                0 => (j(g, 0) * n2 - j(g, 1) * m) / den,
                _ => (-j(g, 0) * m + j(g, 1) * n1) / den,
            });
            (det, k)
        }
    }
}

/// Applies the orientation marker of a manifold cell to its pseudo-determinant.
///
/// Marker 1 means the cell is oriented "down" and flips the sign, any other non-zero marker
/// leaves the determinant unchanged.
pub fn orientation_adjust(det: f64, orientation_marker: i32) -> Result<f64, CompileError> {
    match orientation_marker {
        0 => Err(CompileError::UndefinedOrientation),
        1 => Ok(-det),
        _ => Ok(det),
    }
}

/// Ratio between the measure of a physical facet and the measure of the reference facet.
pub fn facet_determinant(vertices: &DMatrix<f64>, dims: CellDims, facet: usize) -> f64 {
    assert_vertex_shape(vertices, dims);
    let facet_vertices = dims.shape().facet_vertices(facet);
    match dims.tdim() {
        1 => 1.0,
        2 => edge(vertices, facet_vertices[0], facet_vertices[1]).norm(),
        _ => {
            let a = edge(vertices, facet_vertices[0], facet_vertices[1]);
            let b = edge(vertices, facet_vertices[0], facet_vertices[2]);
            cross(&a, &b).norm()
        }
    }
}

/// Outward unit normal of a facet.
///
/// The normal of a manifold triangle's edge lies in the plane of the triangle. It is the edge
/// rotated by a quarter turn about the cell normal (Rodrigues' formula), then normalized and
/// oriented away from the opposite vertex.
pub fn facet_normal(vertices: &DMatrix<f64>, dims: CellDims, facet: usize) -> DVector<f64> {
    assert_vertex_shape(vertices, dims);
    let shape = dims.shape();
    let facet_vertices = shape.facet_vertices(facet);
    let opposite = shape.facet_opposite_vertex(facet);
    let x = |v: usize, g: usize| vertices[(g, v)];

    match (dims.tdim(), dims.gdim()) {
        (1, 1) => {
            let direction = if facet == 0 { x(0, 0) > x(1, 0) } else { x(1, 0) > x(0, 0) };
            DVector::from_element(1, if direction { 1.0 } else { -1.0 })
        }
        (1, _) => {
            let n = if facet == 0 { edge(vertices, 1, 0) } else { edge(vertices, 0, 1) };
            n.normalize()
        }
        (2, 2) => {
            let (v0, v1) = (facet_vertices[0], facet_vertices[1]);
            let dx = edge(vertices, v0, v1);
            let det = dx.norm();
            let direction = dx[1] * (x(opposite, 0) - x(v0, 0)) - dx[0] * (x(opposite, 1) - x(v0, 1)) < 0.0;
            let n = DVector::from_column_slice(&[dx[1] / det, -dx[0] / det]);
            if direction {
                n
            } else {
                -n
            }
        }
        (3, 3) => {
            let v0 = facet_vertices[0];
            let a = cross(&edge(vertices, v0, facet_vertices[1]), &edge(vertices, v0, facet_vertices[2]));
            let det = a.norm();
            let direction = a.dot(&edge(vertices, v0, opposite)) < 0.0;
            if direction {
                a / det
            } else {
                -a / det
            }
        }
        _ => {
            let v0 = facet_vertices[0];
            let e = edge(vertices, v0, facet_vertices[1]);
            let k = cross(&edge(vertices, 0, 1), &edge(vertices, 0, 2)).normalize();
            let n = cross(&k, &e) + &k * k.dot(&e);
            let n = n.normalize();
            if n.dot(&edge(vertices, v0, opposite)) > 0.0 {
                -n
            } else {
                n
            }
        }
    }
}

/// Volume of the physical cell, `|detJ|` scaled by the reference measure.
pub fn cell_volume(det: f64, tdim: usize) -> f64 {
    let reference_volume = CellShape::from_topological_dimension(tdim)
        .map(|shape| shape.reference_volume())
        .unwrap_or(1.0);
    det.abs() * reference_volume
}

/// Radius of the circumscribed sphere of the cell.
pub fn circumradius(vertices: &DMatrix<f64>, dims: CellDims) -> f64 {
    let j = jacobian(vertices, dims);
    let (det, _) = inverse_jacobian(&j, dims);
    let volume = cell_volume(det, dims.tdim());
    let length = |a: usize, b: usize| edge(vertices, a, b).norm();

    match dims.tdim() {
        1 => det.abs(),
        2 => 0.25 * (length(1, 2) * length(0, 2) * length(0, 1)) / volume,
        _ => {
            let la = length(1, 2) * length(0, 3);
            let lb = length(0, 2) * length(1, 3);
            let lc = length(0, 1) * length(2, 3);
            let s = 0.5 * (la + lb + lc);
            let area = (s * (s - la) * (s - lb) * (s - lc)).sqrt();
            area / (6.0 * volume)
        }
    }
}

/// Measure of a physical facet given its facet determinant.
pub fn facet_area(facet_det: f64, tdim: usize) -> f64 {
    match tdim {
        1 => 1.0,
        2 => facet_det,
        _ => facet_det / 2.0,
    }
}

/// Maps a point of the reference cell to the physical cell, `y = x0 + J X`.
pub fn map_to_physical(vertices: &DMatrix<f64>, reference_point: &[f64]) -> DVector<f64> {
    let w0 = 1.0 - reference_point.iter().sum::<f64>();
    let mut y = vertices.column(0) * w0;
    for (k, x_k) in reference_point.iter().enumerate() {
        y += vertices.column(k + 1) * *x_k;
    }
    y
}

/// Pulls a physical point back to reference coordinates, `X = K (x - x0)`.
///
/// For manifold cells the pseudo-inverse gives the reference coordinates of the orthogonal
/// projection of the point onto the plane of the cell.
pub fn reference_coordinate_map(
    physical_point: &DVector<f64>,
    vertices: &DMatrix<f64>,
    inverse_jacobian: &DMatrix<f64>,
) -> DVector<f64> {
    inverse_jacobian * (physical_point - vertices.column(0))
}

/// The affine map of one physical cell together with its derived quantities.
#[derive(Debug, Clone, PartialEq)]
pub struct AffineCellMap {
    dims: CellDims,
    vertices: DMatrix<f64>,
    jacobian: DMatrix<f64>,
    inverse_jacobian: DMatrix<f64>,
    determinant: f64,
}

impl AffineCellMap {
    pub fn new(vertices: DMatrix<f64>, dims: CellDims) -> Self {
        let jacobian = jacobian(&vertices, dims);
        let (determinant, inverse_jacobian) = inverse_jacobian(&jacobian, dims);
        Self {
            dims,
            vertices,
            jacobian,
            inverse_jacobian,
            determinant,
        }
    }

    /// Constructs the map of a manifold cell carrying an orientation marker.
    pub fn with_orientation(vertices: DMatrix<f64>, dims: CellDims, orientation_marker: i32) -> Result<Self, CompileError> {
        let mut map = Self::new(vertices, dims);
        if dims.is_manifold() {
            map.determinant = orientation_adjust(map.determinant, orientation_marker)?;
        }
        Ok(map)
    }

    pub fn vertices(&self) -> &DMatrix<f64> {
        &self.vertices
    }

    pub fn jacobian(&self) -> &DMatrix<f64> {
        &self.jacobian
    }

    pub fn inverse_jacobian(&self) -> &DMatrix<f64> {
        &self.inverse_jacobian
    }

    pub fn determinant(&self) -> f64 {
        self.determinant
    }

    pub fn volume(&self) -> f64 {
        cell_volume(self.determinant, self.dims.tdim())
    }

    pub fn circumradius(&self) -> f64 {
        circumradius(&self.vertices, self.dims)
    }

    pub fn facet_determinant(&self, facet: usize) -> f64 {
        facet_determinant(&self.vertices, self.dims, facet)
    }

    pub fn facet_normal(&self, facet: usize) -> DVector<f64> {
        facet_normal(&self.vertices, self.dims, facet)
    }

    pub fn to_physical(&self, reference_point: &[f64]) -> DVector<f64> {
        map_to_physical(&self.vertices, reference_point)
    }

    pub fn to_reference(&self, physical_point: &DVector<f64>) -> DVector<f64> {
        reference_coordinate_map(physical_point, &self.vertices, &self.inverse_jacobian)
    }

    /// Value of a geometry symbol on this cell.
    ///
    /// The scale factor is taken to be `|detJ|`, restrictions are ignored.
    pub fn symbol_value(&self, symbol: &GeometrySymbol) -> f64 {
        match *symbol {
            GeometrySymbol::Jacobian { row, col, .. } => self.jacobian[(row, col)],
            GeometrySymbol::InverseJacobian { row, col, .. } => self.inverse_jacobian[(row, col)],
            GeometrySymbol::Determinant { .. } => self.determinant,
            GeometrySymbol::ScaleFactor => self.determinant.abs(),
        }
    }
}

/// Access to the entries of a cell map, either numeric or symbolic.
pub trait MapEntries {
    type Scalar: Clone + Mul<Output = Self::Scalar>;

    fn dims(&self) -> CellDims;
    fn one(&self) -> Self::Scalar;
    fn jacobian_entry(&self, row: usize, col: usize) -> Self::Scalar;
    fn inverse_jacobian_entry(&self, row: usize, col: usize) -> Self::Scalar;
    fn inverse_determinant(&self) -> Self::Scalar;
}

impl MapEntries for AffineCellMap {
    type Scalar = f64;

    fn dims(&self) -> CellDims {
        self.dims
    }

    fn one(&self) -> f64 {
        1.0
    }

    fn jacobian_entry(&self, row: usize, col: usize) -> f64 {
        self.jacobian[(row, col)]
    }

    fn inverse_jacobian_entry(&self, row: usize, col: usize) -> f64 {
        self.inverse_jacobian[(row, col)]
    }

    fn inverse_determinant(&self) -> f64 {
        1.0 / self.determinant
    }
}

/// The cell map of a generated routine, whose entries are the symbols declared by the
/// geometry snippets.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SymbolicMap {
    pub dims: CellDims,
    pub restriction: Option<Restriction>,
}

impl MapEntries for SymbolicMap {
    type Scalar = GeoMonomial;

    fn dims(&self) -> CellDims {
        self.dims
    }

    fn one(&self) -> GeoMonomial {
        GeoMonomial::constant(1.0)
    }

    fn jacobian_entry(&self, row: usize, col: usize) -> GeoMonomial {
        GeoMonomial::symbol(GeometrySymbol::Jacobian {
            restriction: self.restriction,
            row,
            col,
        })
    }

    fn inverse_jacobian_entry(&self, row: usize, col: usize) -> GeoMonomial {
        GeoMonomial::symbol(GeometrySymbol::InverseJacobian {
            restriction: self.restriction,
            row,
            col,
        })
    }

    fn inverse_determinant(&self) -> GeoMonomial {
        GeoMonomial::power(
            GeometrySymbol::Determinant {
                restriction: self.restriction,
            },
            -1,
        )
    }
}

/// Linear map from the reference components of a basis function to one physical component.
///
/// The physical component equals `scale * sum_j row[j] * reference[j]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueTransform<S> {
    pub scale: S,
    pub row: Vec<S>,
    pub num_physical_components: usize,
}

impl ValueTransform<f64> {
    pub fn apply(&self, reference_values: &[f64]) -> f64 {
        let sum: f64 = self
            .row
            .iter()
            .zip(reference_values)
            .map(|(m, v)| m * v)
            .sum();
        self.scale * sum
    }
}

/// Computes the value transform of a mapping for the given physical component.
///
/// Tensor-valued components are numbered row-major, component `i` being the entry
/// `(i / gdim, i % gdim)`.
pub fn value_transform<M: MapEntries>(
    mapping: MappingKind,
    component: usize,
    num_reference_components: usize,
    map: &M,
) -> Result<ValueTransform<M::Scalar>, CompileError> {
    let (tdim, gdim) = (map.dims().tdim(), map.dims().gdim());
    let expected = mapping.num_reference_components(tdim);
    if num_reference_components != expected {
        return Err(CompileError::InvalidValueShape {
            mapping: mapping.name().to_string(),
            expected,
            actual: num_reference_components,
        });
    }

    let (scale, row) = match mapping {
        MappingKind::Affine => (map.one(), vec![map.one()]),
        MappingKind::ContravariantPiola => (
            map.inverse_determinant(),
            (0..tdim).map(|jj| map.jacobian_entry(component, jj)).collect(),
        ),
        MappingKind::CovariantPiola => (
            map.one(),
            (0..tdim)
                .map(|jj| map.inverse_jacobian_entry(jj, component))
                .collect(),
        ),
        MappingKind::DoubleCovariantPiola => {
            let (i0, i1) = (component / gdim, component % gdim);
            let row = (0..tdim)
                .flat_map(|jj| (0..tdim).map(move |kk| (jj, kk)))
                .map(|(jj, kk)| map.inverse_jacobian_entry(jj, i0) * map.inverse_jacobian_entry(kk, i1))
                .collect();
            (map.one(), row)
        }
        MappingKind::DoubleContravariantPiola => {
            let (i0, i1) = (component / gdim, component % gdim);
            let row = (0..tdim)
                .flat_map(|jj| (0..tdim).map(move |kk| (jj, kk)))
                .map(|(jj, kk)| map.jacobian_entry(i0, jj) * map.jacobian_entry(i1, kk))
                .collect();
            (map.inverse_determinant() * map.inverse_determinant(), row)
        }
    };

    Ok(ValueTransform {
        scale,
        row,
        num_physical_components: mapping.num_physical_components(gdim),
    })
}

/// Parses a mapping name and computes its value transform.
pub fn value_transform_by_name<M: MapEntries>(
    mapping: &str,
    component: usize,
    num_reference_components: usize,
    map: &M,
) -> Result<ValueTransform<M::Scalar>, CompileError> {
    value_transform(mapping.parse()?, component, num_reference_components, map)
}
