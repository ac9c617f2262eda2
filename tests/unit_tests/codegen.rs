use crate::{laplace_form, mass_form};
use formgen::basis::{BasisTable, BasisTabulator, LagrangeTabulator};
use formgen::cell::{CellDims, CellShape, IntegralKind, Restriction};
use formgen::codegen::{expand_factor, FactorTable, QuadratureGenerator};
use formgen::compiler::IntegralOutcome;
use formgen::element::ElementDescriptor;
use formgen::expr::GeometrySymbol;
use formgen::form::{BasisFactor, Form, Monomial};
use formgen::format::CppFormat;
use formgen::geometry::AffineCellMap;
use formgen::quadrature::ReferenceRule;
use formgen::tensor::EPSILON;
use formgen::{CompileError, FormCompiler, GeneratorOptions};
use matrixcompare::assert_scalar_eq;
use nalgebra::DMatrix;

fn compile(form: &Form, options: GeneratorOptions) -> formgen::CompiledForm {
    FormCompiler::new(CppFormat, LagrangeTabulator, options).compile(form)
}

fn code_of(form: &Form, kind: IntegralKind, options: GeneratorOptions) -> String {
    let compiled = compile(form, options);
    let integral = compiled.integral(kind, 0).expect("integral should exist");
    assert!(
        matches!(integral.outcome, IntegralOutcome::Emitted { .. }),
        "unexpected outcome {:?}",
        integral.outcome
    );
    integral.code.clone()
}

/// Tabulates the lowest order Raviart-Thomas basis on the reference triangle.
struct RaviartThomasTabulator;

impl BasisTabulator for RaviartThomasTabulator {
    fn tabulate(&self, element: &ElementDescriptor, points: &[Vec<f64>], order: usize) -> Result<BasisTable, CompileError> {
        let mut table = BasisTable::zeros(points.len(), 3, 2usize.pow(order as u32), 2);
        if order == 0 {
            assert_eq!(element.space_dimension(), 3);
            for (p, point) in points.iter().enumerate() {
                let (x, y) = (point[0], point[1]);
                for (dof, value) in [(x, y), (x - 1.0, y), (x, y - 1.0)].into_iter().enumerate() {
                    *table.get_mut(p, dof, 0, 0) = value.0;
                    *table.get_mut(p, dof, 0, 1) = value.1;
                }
            }
        }
        Ok(table)
    }
}

/// Only supports tabulation up to first derivatives.
struct FirstOrderTabulator;

impl BasisTabulator for FirstOrderTabulator {
    fn tabulate(&self, element: &ElementDescriptor, points: &[Vec<f64>], order: usize) -> Result<BasisTable, CompileError> {
        if order > 1 {
            return Err(CompileError::UnsupportedElement(element.to_string()));
        }
        LagrangeTabulator.tabulate(element, points, order)
    }
}

#[test]
fn interval_laplace_with_a_single_point() {
    let code = code_of(&laplace_form(CellShape::Interval), IntegralKind::Cell, GeneratorOptions::default());

    assert!(code.starts_with("void laplace_cell_integral_0(double* A, const ufc::cell& c)\n{\n"));
    assert!(code.contains("    const double J_00 = x[1][0] - x[0][0];"));
    assert!(code.contains("    const double det = std::abs(detJ);"));
    assert!(code.contains("    // Reset values of the element tensor block"));
    assert!(code.contains("    for (unsigned int j = 0; j < 4; j++)"));
    assert!(code.contains("    // Array of quadrature weights (tensor/monomial term 0)"));
    assert!(code.contains("    static const double W0 = 1.0;"));
    assert!(code.contains("static const double FE0[1][2] = \\\n    {{-1.0, 1.0}};"));
    assert!(code.contains("    const double G0 = K_00*K_00*det;"));
    assert!(code.contains("    // Loop quadrature points (tensor/monomial terms (0,))"));
    assert!(code.contains("    // Number of operations to compute element tensor for following IP loop = 16"));
    assert!(code.contains("    // Only 1 integration point, omitting IP loop."));
    assert!(code.contains("            A[j*2 + k] += W0*FE0[0][j]*FE0[0][k]*G0;"));
    assert!(code.ends_with("}\n"));
}

#[test]
fn operation_counts_include_geometry_constants() {
    let compiled = compile(&laplace_form(CellShape::Interval), GeneratorOptions::default());
    let integral = compiled.integral(IntegralKind::Cell, 0).unwrap();
    // 16 in the point loop and 2 for K_00*K_00*det
    assert_eq!(integral.outcome, IntegralOutcome::Emitted { num_operations: 18 });
    assert!(integral
        .code
        .contains("// Number of operations to compute geometry constants = 2"));
}

#[test]
fn terms_with_equal_weights_share_them() {
    let element = ElementDescriptor::lagrange(CellShape::Interval, 1);
    let form = Form::new("weighted", CellShape::Interval, 1)
        .with_argument(element.clone())
        .with_argument(element)
        .with_monomial(Monomial::new(IntegralKind::Cell, vec![BasisFactor::new(0), BasisFactor::new(1)]))
        .with_monomial(
            Monomial::new(IntegralKind::Cell, vec![BasisFactor::new(0), BasisFactor::new(1)]).with_coefficient(2.0),
        );

    let code = code_of(&form, IntegralKind::Cell, GeneratorOptions::default());
    assert_eq!(
        code.matches("// Array of quadrature weights (tensor/monomial terms (0, 1))")
            .count(),
        1
    );
    assert!(code.contains("static const double W0[2] = {"));
    assert!(!code.contains("W1"));
    assert!(code.contains("for (unsigned int ip = 0; ip < 2; ip++)"));
    // Both terms are summed into one geometry constant
    assert!(code.contains("const double G0 = 3.0*det;"));
    assert_eq!(code.matches("+= W0[ip]*FE0[ip][j]*FE0[ip][k]*G0;").count(), 1);

    let unoptimised = code_of(&form, IntegralKind::Cell, GeneratorOptions::default().with_optimisation_level(0));
    assert!(unoptimised.contains("const double G0 = det;"));
    assert!(unoptimised.contains("const double G1 = 2.0*det;"));
    assert!(unoptimised.contains("+= W0[ip]*FE0[ip][j]*FE0[ip][k]*G1;"));
}

#[test]
fn vector_components_loop_over_nonzero_columns() {
    let element = ElementDescriptor::vector_lagrange(CellShape::Triangle, 1, 2);
    let form = Form::new("component", CellShape::Triangle, 2)
        .with_argument(element.clone())
        .with_argument(element)
        .with_monomial(Monomial::new(
            IntegralKind::Cell,
            vec![BasisFactor::new(0).with_component(1), BasisFactor::new(1).with_component(1)],
        ));

    let code = code_of(&form, IntegralKind::Cell, GeneratorOptions::default());
    assert!(code.contains("// Array of non-zero columns"));
    assert!(code.contains("static const unsigned int nzc0[3] = {3, 4, 5};"));
    assert!(code.contains("static const double FE0[4][3] = \\"));
    assert!(code.contains("A[nzc0[j]*6 + nzc0[k]] += W0[ip]*FE0[ip][j]*FE0[ip][k]*G0;"));

    let uncompressed = code_of(&form, IntegralKind::Cell, GeneratorOptions::default().with_optimisation_level(0));
    assert!(!uncompressed.contains("nzc0"));
    assert!(uncompressed.contains("static const double FE0[4][6] = \\"));
    assert!(uncompressed.contains("A[j*6 + k] += "));
}

#[test]
fn piola_mapped_factors_divide_by_the_determinant() {
    let element = ElementDescriptor::raviart_thomas(CellShape::Triangle, 2);
    let form = Form::new("rt_mass", CellShape::Triangle, 2)
        .with_argument(element.clone())
        .with_argument(element)
        .with_monomial(Monomial::new(IntegralKind::Cell, vec![BasisFactor::new(0), BasisFactor::new(1)]));

    let compiled = FormCompiler::new(CppFormat, RaviartThomasTabulator, GeneratorOptions::default()).compile(&form);
    assert_eq!(compiled.failures().count(), 0);
    let code = &compiled.integral(IntegralKind::Cell, 0).unwrap().code;
    assert!(code.contains("J_00*J_00*det/(detJ*detJ)"));
    assert!(code.contains("J_00*J_01*det/(detJ*detJ)"));
    assert!(code.contains("const double detJ = J_00*J_11 - J_01*J_10;"));
}

#[test]
fn exterior_facets_switch_over_the_facet() {
    let element = ElementDescriptor::lagrange(CellShape::Interval, 1);
    let form = Form::new("boundary", CellShape::Interval, 1)
        .with_argument(element.clone())
        .with_argument(element)
        .with_monomial(Monomial::new(
            IntegralKind::ExteriorFacet,
            vec![BasisFactor::new(0), BasisFactor::new(1)],
        ));

    let code = code_of(&form, IntegralKind::ExteriorFacet, GeneratorOptions::default());
    assert!(code.starts_with(
        "void boundary_exterior_facet_integral_0(double* A, const ufc::cell& c, unsigned int facet)\n"
    ));
    assert!(code.contains("    // Facet determinant of a vertex\n    const double det = 1.0;"));
    assert!(code.contains("    // Compute element tensor for all facets\n    switch (facet)\n    {\n    case 0:\n"));
    assert!(code.contains("    case 1:\n        {\n"));
    assert!(code.contains("static const unsigned int nzc0[1] = {0};"));
    assert!(code.contains("static const unsigned int nzc0[1] = {1};"));
    assert!(code.contains("A[nzc0[j]*2 + nzc0[k]] += W0*FE0[0][j]*FE0[0][k]*G0;"));
    assert_eq!(code.matches("        break;").count(), 2);
}

#[test]
fn interior_facets_offset_the_minus_side() {
    let element = ElementDescriptor::lagrange(CellShape::Interval, 1);
    let form = Form::new("jump", CellShape::Interval, 1)
        .with_argument(element.clone())
        .with_argument(element)
        .with_monomial(Monomial::new(
            IntegralKind::InteriorFacet,
            vec![
                BasisFactor::new(0).with_restriction(Restriction::Plus),
                BasisFactor::new(1).with_restriction(Restriction::Minus),
            ],
        ));

    let code = code_of(&form, IntegralKind::InteriorFacet, GeneratorOptions::default());
    assert!(code.contains("const ufc::cell& c0, const ufc::cell& c1, unsigned int facet0, unsigned int facet1"));
    assert!(code.contains("const double * const * x0 = c0.coordinates;"));
    assert!(code.contains("const double * const * x1 = c1.coordinates;"));
    assert!(code.contains("// Compute element tensor for all facet-facet combinations"));
    assert!(code.contains("switch (facet0)"));
    assert!(code.contains("switch (facet1)"));
    assert!(code.contains("for (unsigned int j = 0; j < 16; j++)"));
    assert!(code.contains("A[nzc0[j]*4 + nzc0[k] + 2] += "));
    assert_eq!(code.matches("case 1:").count(), 3);
}

#[test]
fn empty_integrals_only_reset_the_tensor() {
    let element = ElementDescriptor::lagrange(CellShape::Triangle, 1);
    let form = Form::new("sparse_domains", CellShape::Triangle, 2)
        .with_argument(element)
        .with_monomial(Monomial::new(IntegralKind::Cell, vec![BasisFactor::new(0)]).with_domain(1));

    let compiled = compile(&form, GeneratorOptions::default());
    let empty = compiled.integral(IntegralKind::Cell, 0).unwrap();
    assert_eq!(empty.outcome, IntegralOutcome::Empty);
    assert_eq!(
        empty.code,
        "void sparse_domains_cell_integral_0(double* A, const ufc::cell& c)\n\
         {\n    // Reset values of the element tensor block\n    for (unsigned int j = 0; j < 3; j++)\n    {\n        A[j] = 0.0;\n    }\n\n}\n"
    );
    assert!(matches!(
        compiled.integral(IntegralKind::Cell, 1).unwrap().outcome,
        IntegralOutcome::Emitted { .. }
    ));
}

#[test]
fn reset_can_be_disabled() {
    let code = code_of(
        &mass_form(CellShape::Triangle, 2),
        IntegralKind::Cell,
        GeneratorOptions::default().with_reset_tensor(false),
    );
    assert!(!code.contains("Reset values of the element tensor block"));
    assert!(code.contains("A[j*3 + k] += W0[ip]*FE0[ip][j]*FE0[ip][k]*G0;"));
}

#[test]
fn only_geometry_read_by_the_routine_is_declared() {
    let mass = code_of(&mass_form(CellShape::Triangle, 2), IntegralKind::Cell, GeneratorOptions::default());
    assert!(mass.contains("    const double detJ = J_00*J_11 - J_01*J_10;\n\n    // Set scale factor\n"));
    assert!(!mass.contains("K_"));
    assert!(!mass.contains("// Compute inverse of Jacobian"));

    let laplace = code_of(&laplace_form(CellShape::Triangle), IntegralKind::Cell, GeneratorOptions::default());
    for entry in ["K_00", "K_01", "K_10", "K_11"] {
        assert!(laplace.contains(&format!("    const double {} = ", entry)));
    }

    // Facet integrals of values only need the facet determinant
    let element = ElementDescriptor::lagrange(CellShape::Triangle, 1);
    let form = Form::new("boundary_mass", CellShape::Triangle, 2)
        .with_argument(element.clone())
        .with_argument(element)
        .with_monomial(Monomial::new(
            IntegralKind::ExteriorFacet,
            vec![BasisFactor::new(0), BasisFactor::new(1)],
        ));
    let facet = code_of(&form, IntegralKind::ExteriorFacet, GeneratorOptions::default());
    assert!(facet.contains("    const double * const * x = c.coordinates;"));
    assert!(facet.contains("    const double det = std::sqrt(dx0*dx0 + dx1*dx1);"));
    assert!(!facet.contains("J_"));
    assert!(!facet.contains("detJ"));
    assert!(!facet.contains("\n\n\n"));
}

#[test]
fn failing_integrals_become_error_stubs() {
    let element = ElementDescriptor::lagrange(CellShape::Triangle, 1);
    let form = Form::new("partial", CellShape::Triangle, 2)
        .with_argument(element.clone())
        .with_argument(element)
        .with_monomial(Monomial::new(IntegralKind::Cell, vec![BasisFactor::new(0), BasisFactor::new(1)]))
        .with_monomial(Monomial::new(
            IntegralKind::ExteriorFacet,
            vec![
                BasisFactor::new(0).with_derivative(0).with_derivative(1),
                BasisFactor::new(1),
            ],
        ));

    let compiled = FormCompiler::new(CppFormat, FirstOrderTabulator, GeneratorOptions::default()).compile(&form);
    let failures: Vec<_> = compiled.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].kind, IntegralKind::ExteriorFacet);
    assert!(matches!(failures[0].error, CompileError::UnsupportedElement(_)));

    let stub = &compiled.integral(IntegralKind::ExteriorFacet, 0).unwrap().code;
    assert!(stub.contains("// Code generation failed for exterior_facet integral 0: Unable to tabulate element"));
    assert!(stub.contains("throw std::runtime_error(\"exterior_facet integral 0: Unable to tabulate element"));
    assert!(matches!(
        compiled.integral(IntegralKind::Cell, 0).unwrap().outcome,
        IntegralOutcome::Emitted { .. }
    ));
}

#[test]
fn vanishing_terms_are_skipped() {
    // Second derivatives of linear elements are zero
    let element = ElementDescriptor::lagrange(CellShape::Interval, 1);
    let form = Form::new("curvature", CellShape::Interval, 1)
        .with_argument(element.clone())
        .with_argument(element)
        .with_monomial(Monomial::new(
            IntegralKind::Cell,
            vec![BasisFactor::new(0).with_derivative(0).with_derivative(0), BasisFactor::new(1)],
        ))
        .with_monomial(Monomial::new(IntegralKind::Cell, vec![BasisFactor::new(0), BasisFactor::new(1)]));

    let code = code_of(&form, IntegralKind::Cell, GeneratorOptions::default());
    assert!(code.contains("(tensor/monomial term 1)"));
    assert!(!code.contains("(tensor/monomial term 0)"));
    assert!(code.contains("Loop quadrature points (tensor/monomial terms (1,))"));
}

#[test]
fn generator_can_be_driven_directly() {
    let form = mass_form(CellShape::Interval, 1);
    let options = GeneratorOptions::default();
    let generator = QuadratureGenerator::new(&CppFormat, &LagrangeTabulator, &options);
    let monomials: Vec<&Monomial> = form.monomials.iter().collect();
    let generated = generator
        .generate(&form, IntegralKind::Cell, "mass_routine", &monomials)
        .unwrap();
    assert!(generated.code.starts_with("void mass_routine("));
    // 4 iterations of 4 operations at 2 points, plus nothing for the plain scale factor
    assert_eq!(generated.num_operations, 32);
}

/// Accumulates the element tensor of a bilinear cell integral from the same expanded tables,
/// weights and geometry coefficients the generated point loops combine.
fn accumulate_cell_tensor(form: &Form, map: &AffineCellMap) -> Vec<f64> {
    let dims = form.dims().unwrap();
    let n = form.argument_dims();
    assert_eq!(n.len(), 2);
    let value_of = |symbol: &GeometrySymbol| map.symbol_value(symbol);

    let mut a = vec![0.0; n[0] * n[1]];
    for monomial in &form.monomials {
        let factors = form.validate_monomial(monomial).unwrap();
        let rule = ReferenceRule::cell(form.cell, form.quadrature_degree(monomial)).unwrap();
        let expanded: Vec<Vec<FactorTable>> = factors
            .iter()
            .map(|factor| {
                let element = &form.arguments[factor.argument];
                let reference = LagrangeTabulator.tabulate(element, rule.points(), factor.order()).unwrap();
                expand_factor(element, factor, &reference, dims, EPSILON).unwrap()
            })
            .collect();

        let scale = monomial.coefficient * map.symbol_value(&GeometrySymbol::ScaleFactor);
        for test in &expanded[0] {
            for trial in &expanded[1] {
                let g = scale * test.geometry.evaluate(&value_of) * trial.geometry.evaluate(&value_of);
                for (p, &w) in rule.weights().iter().enumerate() {
                    for j in 0..n[0] {
                        for k in 0..n[1] {
                            a[j * n[1] + k] += w * test.values[p][j] * trial.values[p][k] * g;
                        }
                    }
                }
            }
        }
    }
    a
}

fn tensor_of(form: &Form, map: &AffineCellMap) -> Vec<f64> {
    let mut compiler: FormCompiler = FormCompiler::default();
    let tensors = compiler.element_tensors(form, &CppFormat).unwrap();
    assert_eq!(tensors.len(), 1);
    tensors[0].1.evaluate(map)
}

#[test]
fn quadrature_tables_reproduce_the_element_tensor_on_a_distorted_triangle() {
    let vertices = DMatrix::from_column_slice(2, 3, &[0.5, 0.2, 2.0, 0.4, 0.8, 1.7]);
    let map = AffineCellMap::new(vertices, CellDims::new(2, 2).unwrap());

    let mass = mass_form(CellShape::Triangle, 2);
    let accumulated = accumulate_cell_tensor(&mass, &map);
    let contracted = tensor_of(&mass, &map);
    let area = map.volume();
    for j in 0..3 {
        for k in 0..3 {
            // int phi_j phi_k = |T| (1 + delta_jk) / 12
            let exact = area * if j == k { 2.0 } else { 1.0 } / 12.0;
            assert_scalar_eq!(accumulated[j * 3 + k], exact, comp = abs, tol = 1e-14);
            assert_scalar_eq!(contracted[j * 3 + k], exact, comp = abs, tol = 1e-14);
        }
    }

    let laplace = laplace_form(CellShape::Triangle);
    let accumulated = accumulate_cell_tensor(&laplace, &map);
    let contracted = tensor_of(&laplace, &map);
    assert_eq!(accumulated.len(), 9);
    for (a, b) in accumulated.iter().zip(&contracted) {
        assert_scalar_eq!(*a, *b, comp = abs, tol = 1e-13);
    }
    // Constants lie in the kernel of the stiffness matrix
    for j in 0..3 {
        let row_sum: f64 = accumulated[j * 3..j * 3 + 3].iter().sum();
        assert_scalar_eq!(row_sum, 0.0, comp = abs, tol = 1e-13);
    }
    assert!(accumulated[0] > 0.0);
}

#[test]
fn quadrature_tables_reproduce_the_element_tensor_on_a_distorted_tetrahedron() {
    let vertices = DMatrix::from_column_slice(3, 4, &[0.1, 0.0, 0.2, 1.3, 0.1, 0.0, 0.2, 0.9, 0.1, 0.3, 0.4, 1.1]);
    let map = AffineCellMap::new(vertices, CellDims::new(3, 3).unwrap());

    for form in [laplace_form(CellShape::Tetrahedron), mass_form(CellShape::Tetrahedron, 3)] {
        let accumulated = accumulate_cell_tensor(&form, &map);
        let contracted = tensor_of(&form, &map);
        assert_eq!(accumulated.len(), 16);
        for (a, b) in accumulated.iter().zip(&contracted) {
            assert_scalar_eq!(*a, *b, comp = abs, tol = 1e-13);
        }
    }
}
