//! Formula text computing the geometric quantities inside a generated routine.
//!
//! Every snippet is plain C++ operating on the vertex coordinates `x[v][g]` of a UFC cell.
//! Quantities of a restricted cell carry the restriction suffix (`J0_01`, `detJ1`, ...).
use crate::cell::{restriction_suffix, CellDims, Restriction};
use crate::error::CompileError;
use itertools::Itertools;

/// Semantic key of a geometry snippet.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GeometrySnippet {
    Jacobian,
    InverseJacobian,
    Orientation,
    ScaleFactor,
    FacetDeterminant,
    FacetNormal,
    CellVolume,
    Circumradius,
    FacetArea,
    /// Physical coordinates `X[g]` of quadrature point `ip`, read from the reference point
    /// table `ip_points[ip][t]`.
    IpCoordinates,
}

impl GeometrySnippet {
    /// Snippets whose declarations this snippet reads.
    pub fn requires(&self) -> &'static [GeometrySnippet] {
        use GeometrySnippet::*;
        match self {
            Jacobian => &[],
            InverseJacobian => &[Jacobian],
            Orientation => &[InverseJacobian],
            ScaleFactor => &[InverseJacobian],
            FacetDeterminant => &[Jacobian],
            FacetNormal => &[FacetDeterminant],
            CellVolume => &[InverseJacobian],
            Circumradius => &[CellVolume],
            FacetArea => &[FacetDeterminant],
            IpCoordinates => &[Jacobian],
        }
    }
}

/// Adds the prerequisites of the given snippets and orders them so that every declaration
/// precedes its first use.
pub fn with_dependencies(keys: impl IntoIterator<Item = GeometrySnippet>) -> Vec<GeometrySnippet> {
    fn visit(key: GeometrySnippet, ordered: &mut Vec<GeometrySnippet>) {
        if ordered.contains(&key) {
            return;
        }
        for &dependency in key.requires() {
            visit(dependency, ordered);
        }
        ordered.push(key);
    }

    let mut ordered = Vec::new();
    for key in keys.into_iter().sorted() {
        visit(key, &mut ordered);
    }
    ordered
}

/// Like [`snippet`], but validates a raw dimension pair first.
pub fn snippet_for(
    key: GeometrySnippet,
    tdim: usize,
    gdim: usize,
    restriction: Option<Restriction>,
) -> Result<String, CompileError> {
    Ok(snippet(key, CellDims::new(tdim, gdim)?, restriction))
}

/// Returns the code declaring the quantity named by `key`.
pub fn snippet(key: GeometrySnippet, dims: CellDims, restriction: Option<Restriction>) -> String {
    let r = restriction_suffix(restriction);
    match key {
        GeometrySnippet::Jacobian => jacobian(dims, r),
        GeometrySnippet::InverseJacobian => inverse_jacobian(dims, r),
        GeometrySnippet::Orientation => orientation(dims, r),
        GeometrySnippet::ScaleFactor => "// Set scale factor\nconst double det = std::abs(detJ);\n".to_string(),
        GeometrySnippet::FacetDeterminant => facet_determinant(dims, facet_side(restriction)),
        GeometrySnippet::FacetNormal => facet_normal(dims, restriction),
        GeometrySnippet::CellVolume => format!(
            "// Cell volume\nconst double volume{r} = std::abs(detJ{r}){};\n",
            match dims.tdim() {
                1 => "",
                2 => "/2.0",
                _ => "/6.0",
            }
        ),
        GeometrySnippet::Circumradius => circumradius(dims, r),
        GeometrySnippet::FacetArea => match dims.tdim() {
            1 => "// Facet area\nconst double facet_area = 1.0;\n".to_string(),
            2 => "// Facet area\nconst double facet_area = det;\n".to_string(),
            _ => "// Facet area (det is scaled by the area of the reference triangle)\n\
                  const double facet_area = det/2.0;\n"
                .to_string(),
        },
        GeometrySnippet::IpCoordinates => ip_coordinates(dims, r),
    }
}

/// Facet quantities of an interior facet are computed on the '+' cell.
fn facet_side(restriction: Option<Restriction>) -> &'static str {
    restriction_suffix(restriction.map(|_| Restriction::Plus))
}

/// Terminates every line, blank ones included.
fn join_lines(lines: Vec<String>) -> String {
    lines.into_iter().map(|line| line + "\n").collect()
}

fn sum_of_squares(terms: impl IntoIterator<Item = String>) -> String {
    terms.into_iter().map(|t| format!("{t}*{t}")).join(" + ")
}

fn jacobian(dims: CellDims, r: &str) -> String {
    let mut code: Vec<String> = Vec::new();
    if dims.is_manifold() {
        code.push(format!("// Geometric dimension {}, topological dimension {}", dims.gdim(), dims.tdim()));
    }
    code.push("// Extract vertex coordinates".into());
    code.push(format!("const double * const * x{r} = c{r}.coordinates;"));
    code.push(String::new());
    code.push("// Compute Jacobian of affine map from reference cell".into());
    for g in 0..dims.gdim() {
        for t in 0..dims.tdim() {
            code.push(format!("const double J{r}_{g}{t} = x{r}[{}][{g}] - x{r}[0][{g}];", t + 1));
        }
    }
    join_lines(code)
}

fn inverse_jacobian(dims: CellDims, r: &str) -> String {
    let j = |g: usize, t: usize| format!("J{r}_{g}{t}");
    let mut code: Vec<String> = Vec::new();
    // The pseudo-determinant may be flipped by the orientation snippet
    let det_decl = if dims.is_manifold() { "double" } else { "const double" };

    match (dims.tdim(), dims.gdim()) {
        (1, 1) => {
            code.push("// Compute determinant of Jacobian".into());
            code.push(format!("const double detJ{r} = {};", j(0, 0)));
            code.push(String::new());
            code.push("// Compute inverse of Jacobian".into());
            code.push(format!("const double K{r}_00 = 1.0 / detJ{r};"));
        }
        (2, 2) => {
            code.push("// Compute determinant of Jacobian".into());
            code.push(format!("const double detJ{r} = {}*{} - {}*{};", j(0, 0), j(1, 1), j(0, 1), j(1, 0)));
            code.push(String::new());
            code.push("// Compute inverse of Jacobian".into());
            code.push(format!("const double K{r}_00 =  {} / detJ{r};", j(1, 1)));
            code.push(format!("const double K{r}_01 = -{} / detJ{r};", j(0, 1)));
            code.push(format!("const double K{r}_10 = -{} / detJ{r};", j(1, 0)));
            code.push(format!("const double K{r}_11 =  {} / detJ{r};", j(0, 0)));
        }
        (3, 3) => {
            // Cofactor d_ab multiplies J_ab in the expansion of the determinant
            let cofactor = |a: usize, b: usize| {
                let (a1, a2) = ((a + 1) % 3, (a + 2) % 3);
                let (b1, b2) = ((b + 1) % 3, (b + 2) % 3);
                format!("{}*{} - {}*{}", j(a1, b1), j(a2, b2), j(a1, b2), j(a2, b1))
            };
            code.push("// Compute sub determinants".into());
            for a in 0..3 {
                for b in 0..3 {
                    code.push(format!("const double d{r}_{a}{b} = {};", cofactor(a, b)));
                }
            }
            code.push(String::new());
            code.push("// Compute determinant of Jacobian".into());
            code.push(format!(
                "const double detJ{r} = {}*d{r}_00 + {}*d{r}_10 + {}*d{r}_20;",
                j(0, 0),
                j(1, 0),
                j(2, 0)
            ));
            code.push(String::new());
            code.push("// Compute inverse of Jacobian".into());
            for t in 0..3 {
                for g in 0..3 {
                    code.push(format!("const double K{r}_{t}{g} = d{r}_{g}{t} / detJ{r};"));
                }
            }
        }
        (1, gdim) => {
            code.push("// Compute pseudodeterminant of Jacobian".into());
            code.push(format!(
                "const double detJ2{r} = {};",
                sum_of_squares((0..gdim).map(|g| j(g, 0)))
            ));
            code.push(format!("{det_decl} detJ{r} = std::sqrt(detJ2{r});"));
            code.push(String::new());
            code.push("// Compute pseudoinverse of Jacobian".into());
            for g in 0..gdim {
                code.push(format!("const double K{r}_0{g} = {} / detJ2{r};", j(g, 0)));
            }
        }
        _ => {
            code.push("// Compute pseudodeterminant of Jacobian".into());
            code.push(format!("const double d{r}_0 = {}*{} - {}*{};", j(1, 0), j(2, 1), j(2, 0), j(1, 1)));
            code.push(format!("const double d{r}_1 = -({}*{} - {}*{});", j(0, 0), j(2, 1), j(2, 0), j(0, 1)));
            code.push(format!("const double d{r}_2 = {}*{} - {}*{};", j(0, 0), j(1, 1), j(1, 0), j(0, 1)));
            code.push(format!(
                "const double detJ2{r} = {};",
                sum_of_squares((0..3).map(|k| format!("d{r}_{k}")))
            ));
            code.push(format!("{det_decl} detJ{r} = std::sqrt(detJ2{r});"));
            code.push(String::new());
            code.push("// Compute some common factors for the pseudoinverse".into());
            code.push(format!("const double n{r}_1 = {};", sum_of_squares((0..3).map(|g| j(g, 0)))));
            code.push(format!("const double n{r}_2 = {};", sum_of_squares((0..3).map(|g| j(g, 1)))));
            code.push(format!(
                "const double m{r} = {};",
                (0..3).map(|g| format!("{}*{}", j(g, 0), j(g, 1))).join(" + ")
            ));
            code.push(format!("const double den{r} = n{r}_1*n{r}_2 - m{r}*m{r};"));
            code.push(String::new());
            code.push("// Compute pseudoinverse of Jacobian".into());
            for g in 0..3 {
                code.push(format!(
                    "const double K{r}_0{g} = ({}*n{r}_2 - {}*m{r}) / den{r};",
                    j(g, 0),
                    j(g, 1)
                ));
            }
            for g in 0..3 {
                code.push(format!(
                    "const double K{r}_1{g} = (-{}*m{r} + {}*n{r}_1) / den{r};",
                    j(g, 0),
                    j(g, 1)
                ));
            }
        }
    }
    join_lines(code)
}

fn orientation(dims: CellDims, r: &str) -> String {
    if !dims.is_manifold() {
        return String::new();
    }
    format!(
        "// Extract orientation\n\
         const int orientation_marker{r} = c{r}.orientation;\n\
         if (orientation_marker{r} == 0)\n  \
         throw std::runtime_error(\"cell orientation must be defined (not 0)\");\n\
         // (If orientation_marker == 1 = down, multiply detJ by -1)\n\
         else if (orientation_marker{r} == 1)\n  \
         detJ{r} *= -1;\n"
    )
}

fn facet_determinant(dims: CellDims, r: &str) -> String {
    let mut code: Vec<String> = Vec::new();
    match dims.tdim() {
        1 => {
            code.push("// Facet determinant of a vertex".into());
            code.push("const double det = 1.0;".into());
        }
        2 => {
            code.push("// Get vertices on edge".into());
            code.push("static const unsigned int edge_vertices[3][2] = {{1, 2}, {0, 2}, {0, 1}};".into());
            code.push(format!("const unsigned int v0 = edge_vertices[facet{r}][0];"));
            code.push(format!("const unsigned int v1 = edge_vertices[facet{r}][1];"));
            code.push(String::new());
            code.push("// Compute scale factor (length of edge scaled by length of reference interval)".into());
            for g in 0..dims.gdim() {
                code.push(format!("const double dx{g} = x{r}[v1][{g}] - x{r}[v0][{g}];"));
            }
            code.push(format!(
                "const double det = std::sqrt({});",
                sum_of_squares((0..dims.gdim()).map(|g| format!("dx{g}")))
            ));
        }
        _ => {
            code.push("// Get vertices on face".into());
            code.push("static const unsigned int face_vertices[4][3] = {{1, 2, 3}, {0, 2, 3}, {0, 1, 3}, {0, 1, 2}};".into());
            for k in 0..3 {
                code.push(format!("const unsigned int v{k} = face_vertices[facet{r}][{k}];"));
            }
            code.push(String::new());
            code.push("// Compute scale factor (area of face scaled by area of reference triangle)".into());
            let e = |v: &str, g: usize| format!("(x{r}[{v}][{g}] - x{r}[v0][{g}])");
            for k in 0..3 {
                let (a, b) = ((k + 1) % 3, (k + 2) % 3);
                code.push(format!(
                    "const double a{k} = {}*{} - {}*{};",
                    e("v1", a),
                    e("v2", b),
                    e("v1", b),
                    e("v2", a)
                ));
            }
            code.push("const double det = std::sqrt(a0*a0 + a1*a1 + a2*a2);".into());
        }
    }
    join_lines(code)
}

fn facet_normal(dims: CellDims, restriction: Option<Restriction>) -> String {
    let r = restriction_suffix(restriction);
    let side = facet_side(restriction);
    // The '-' normal is the negated '+' normal
    let negate = if restriction == Some(Restriction::Minus) { "!" } else { "" };
    let mut code: Vec<String> = Vec::new();

    match (dims.tdim(), dims.gdim()) {
        (1, 1) => {
            code.push(format!(
                "const bool direction = facet{side} == 0 ? x{side}[0][0] > x{side}[1][0] : x{side}[1][0] > x{side}[0][0];"
            ));
            code.push("// Facet normals are 1.0 or -1.0:   (-1.0) <-- X------X --> (1.0)".into());
            code.push(format!("const double n{r} = {negate}direction ? 1.0 : -1.0;"));
        }
        (2, 2) => {
            code.push(format!(
                "const bool direction = dx1*(x{side}[facet{side}][0] - x{side}[v0][0]) - dx0*(x{side}[facet{side}][1] - x{side}[v0][1]) < 0;"
            ));
            code.push("// Compute facet normals from the facet scale factor constants".into());
            code.push(format!("const double n{r}0 = {negate}direction ? dx1 / det : -dx1 / det;"));
            code.push(format!("const double n{r}1 = {negate}direction ? -dx0 / det : dx0 / det;"));
        }
        (3, 3) => {
            code.push(format!(
                "const bool direction = {} < 0;",
                (0..3)
                    .map(|g| format!("a{g}*(x{side}[facet{side}][{g}] - x{side}[v0][{g}])"))
                    .join(" + ")
            ));
            code.push("// Compute facet normals from the facet scale factor constants".into());
            for g in 0..3 {
                code.push(format!("const double n{r}{g} = {negate}direction ? a{g} / det : -a{g} / det;"));
            }
        }
        (1, gdim) => {
            let sign = if negate.is_empty() { "" } else { "-" };
            code.push("// Compute facet normal".into());
            for g in 0..gdim {
                code.push(format!(
                    "const double _n{r}{g} = facet{side} == 0 ? x{side}[0][{g}] - x{side}[1][{g}] : x{side}[1][{g}] - x{side}[0][{g}];"
                ));
            }
            code.push(format!(
                "const double n{r}_length = std::sqrt({});",
                sum_of_squares((0..gdim).map(|g| format!("_n{r}{g}")))
            ));
            for g in 0..gdim {
                code.push(format!("const double n{r}{g} = {sign}_n{r}{g} / n{r}_length;"));
            }
        }
        _ => {
            let sign = if negate.is_empty() { "" } else { "-" };
            let e = |v: usize, g: usize| format!("(x{side}[{v}][{g}] - x{side}[0][{g}])");
            code.push("// Compute facet normal n via Rodrigues' rotation formula:".into());
            code.push("//   n = k x e  + k (k . e)".into());
            code.push("// where e is the edge vector (dx0, dx1, dx2) and k is the unit cell normal".into());
            for g in 0..3 {
                let (a, b) = ((g + 1) % 3, (g + 2) % 3);
                code.push(format!(
                    "const double _k{r}{g} = {}*{} - {}*{};",
                    e(1, a),
                    e(2, b),
                    e(1, b),
                    e(2, a)
                ));
            }
            code.push(format!(
                "const double _k{r}_length = std::sqrt({});",
                sum_of_squares((0..3).map(|g| format!("_k{r}{g}")))
            ));
            for g in 0..3 {
                code.push(format!("const double k{r}{g} = _k{r}{g} / _k{r}_length;"));
            }
            code.push(format!("const double k{r}dote = k{r}0*dx0 + k{r}1*dx1 + k{r}2*dx2;"));
            for g in 0..3 {
                let (a, b) = ((g + 1) % 3, (g + 2) % 3);
                code.push(format!(
                    "const double _n{r}{g} = (k{r}{a}*dx{b} - k{r}{b}*dx{a}) + k{r}{g}*k{r}dote;"
                ));
            }
            code.push("// Orient the normal away from the vertex opposite to the facet".into());
            code.push(format!(
                "const bool direction = {} < 0;",
                (0..3)
                    .map(|g| format!("_n{r}{g}*(x{side}[facet{side}][{g}] - x{side}[v0][{g}])"))
                    .join(" + ")
            ));
            for g in 0..3 {
                code.push(format!(
                    "const double n{r}{g} = {sign}(direction ? _n{r}{g} / det : -_n{r}{g} / det);"
                ));
            }
        }
    }
    join_lines(code)
}

/// Affine map `X = x_0 + J X_ref` of the current quadrature point.
fn ip_coordinates(dims: CellDims, r: &str) -> String {
    let mut code = vec![
        "// Map quadrature point ip to physical coordinates".to_string(),
        format!("double X{r}[{}];", dims.gdim()),
    ];
    for g in 0..dims.gdim() {
        let terms = (0..dims.tdim()).map(|t| format!(" + J{r}_{g}{t}*ip_points[ip][{t}]"));
        code.push(format!("X{r}[{g}] = x{r}[0][{g}]{};", terms.collect::<String>()));
    }
    join_lines(code)
}

fn circumradius(dims: CellDims, r: &str) -> String {
    let gdim = dims.gdim();
    let length = |a: usize, b: usize| {
        let squares = (0..gdim).map(|g| format!("(x{r}[{b}][{g}] - x{r}[{a}][{g}])"));
        format!("const double v{a}v{b}{r} = std::sqrt({});", sum_of_squares(squares))
    };
    let mut code: Vec<String> = Vec::new();
    match dims.tdim() {
        1 => {
            code.push("// Compute circumradius, in 1D it is equal to the cell volume".into());
            code.push(format!("const double circumradius{r} = std::abs(detJ{r});"));
        }
        2 => {
            code.push("// Compute circumradius of triangle".into());
            for (a, b) in [(1, 2), (0, 2), (0, 1)] {
                code.push(length(a, b));
            }
            code.push(String::new());
            code.push(format!(
                "const double circumradius{r} = 0.25*(v1v2{r}*v0v2{r}*v0v1{r})/(volume{r});"
            ));
        }
        _ => {
            code.push("// Compute circumradius".into());
            for (a, b) in [(1, 2), (0, 2), (0, 1), (0, 3), (1, 3), (2, 3)] {
                code.push(length(a, b));
            }
            code.push(format!("const double la{r} = v1v2{r}*v0v3{r};"));
            code.push(format!("const double lb{r} = v0v2{r}*v1v3{r};"));
            code.push(format!("const double lc{r} = v0v1{r}*v2v3{r};"));
            code.push(format!("const double s{r} = 0.5*(la{r} + lb{r} + lc{r});"));
            code.push(format!(
                "const double area{r} = std::sqrt(s{r}*(s{r} - la{r})*(s{r} - lb{r})*(s{r} - lc{r}));"
            ));
            code.push(String::new());
            code.push(format!("const double circumradius{r} = area{r} / (6.0*volume{r});"));
        }
    }
    join_lines(code)
}
