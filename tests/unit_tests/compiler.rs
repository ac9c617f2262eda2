use crate::{laplace_form, mass_form};
use formgen::basis::LagrangeTabulator;
use formgen::cell::{CellShape, IntegralKind, Restriction};
use formgen::compiler::IntegralOutcome;
use formgen::element::ElementDescriptor;
use formgen::error::CompileError;
use formgen::form::{BasisFactor, Form, Monomial};
use formgen::format::CppFormat;
use formgen::{FormCompiler, GeneratorOptions, Representation};

fn default_compiler() -> FormCompiler {
    FormCompiler::default()
}

fn tensor_options() -> GeneratorOptions {
    GeneratorOptions::default().with_representation(Representation::Tensor)
}

#[test]
fn compiling_twice_gives_identical_code() {
    let form = laplace_form(CellShape::Tetrahedron);
    let mut compiler = default_compiler();
    let first = compiler.compile(&form);
    let second = compiler.compile(&form);
    assert_eq!(first, second);

    let mut tensor_compiler = FormCompiler::new(CppFormat, LagrangeTabulator, tensor_options());
    assert_eq!(tensor_compiler.compile(&form), tensor_compiler.compile(&form));
}

#[test]
fn every_domain_up_to_the_largest_gets_a_routine() {
    let element = ElementDescriptor::lagrange(CellShape::Triangle, 1);
    let form = Form::new("domains", CellShape::Triangle, 2)
        .with_argument(element)
        .with_monomial(Monomial::new(IntegralKind::Cell, vec![BasisFactor::new(0)]).with_domain(2))
        .with_monomial(Monomial::new(IntegralKind::ExteriorFacet, vec![BasisFactor::new(0)]));

    let compiled = default_compiler().compile(&form);
    let routines: Vec<_> = compiled.integrals.iter().map(|integral| integral.name.as_str()).collect();
    assert_eq!(
        routines,
        vec![
            "domains_cell_integral_0",
            "domains_cell_integral_1",
            "domains_cell_integral_2",
            "domains_exterior_facet_integral_0"
        ]
    );
    assert_eq!(compiled.integrals[1].outcome, IntegralOutcome::Empty);
    assert!(compiled.integral(IntegralKind::InteriorFacet, 0).is_none());
}

#[test]
fn arguments_on_another_cell_fail_per_integral() {
    let element = ElementDescriptor::lagrange(CellShape::Tetrahedron, 1);
    let form = Form::new("mismatch", CellShape::Triangle, 2)
        .with_argument(element)
        .with_monomial(Monomial::new(IntegralKind::Cell, vec![BasisFactor::new(0)]))
        .with_monomial(Monomial::new(IntegralKind::ExteriorFacet, vec![BasisFactor::new(0).with_derivative(1)]));

    let mut compiler = default_compiler();
    let compiled = compiler.compile(&form);
    assert_eq!(compiled.integrals.len(), 2);
    for integral in &compiled.integrals {
        let IntegralOutcome::Failed(error) = &integral.outcome else {
            panic!("{} should have failed", integral.name);
        };
        assert!(matches!(error.error, CompileError::InvalidMonomial(_)));
        assert!(integral.code.contains("argument 0 is defined on a tetrahedron, but the form is integrated over a triangle"));
        assert!(integral.code.contains("throw std::runtime_error("));
    }

    let mut tensor_compiler = FormCompiler::new(CppFormat, LagrangeTabulator, tensor_options());
    assert_eq!(tensor_compiler.compile(&form).failures().count(), 2);
    assert!(tensor_compiler.element_tensors(&form, &CppFormat).is_err());

    // The compiler stays usable for well-formed forms
    let laplace = compiler.compile(&laplace_form(CellShape::Triangle));
    assert_eq!(laplace.failures().count(), 0);
}

#[test]
fn routine_prefix_can_be_overridden() {
    let options = GeneratorOptions::default().with_routine_name("poisson");
    let compiled = FormCompiler::new(CppFormat, LagrangeTabulator, options).compile(&laplace_form(CellShape::Triangle));
    assert_eq!(compiled.name, "laplace");
    assert!(compiled.code().starts_with("void poisson_cell_integral_0("));
}

#[test]
fn tensor_representation_contracts_geometry_tensors() {
    let form = laplace_form(CellShape::Triangle);
    let compiled = FormCompiler::new(CppFormat, LagrangeTabulator, tensor_options()).compile(&form);
    let integral = compiled.integral(IntegralKind::Cell, 0).unwrap();
    let code = &integral.code;

    assert!(code.contains("    // Compute geometry tensors"));
    assert!(code.contains("    // Number of operations to compute geometry tensors = 16"));
    assert!(code.contains("    const double G0_0_0 = K_00*K_00*det;"));
    assert!(code.contains("    const double G1_1_0 = K_01*K_11*det;"));
    assert!(code.contains("    // Compute element tensor"));
    assert!(code.contains("    A[0] += 0.5*G0_0_0 + 0.5*G0_0_1 + 0.5*G0_1_0 + 0.5*G0_1_1"));
    assert!(code.contains("    A[5] += 0.5*G0_0_1 + 0.5*G1_0_1;"));
    assert!(code.contains("    const double det = std::abs(detJ);"));
    assert!(!code.contains("Loop quadrature points"));
    assert!(matches!(integral.outcome, IntegralOutcome::Emitted { .. }));
}

#[test]
fn tensor_representation_falls_back_to_quadrature() {
    let element = ElementDescriptor::lagrange(CellShape::Interval, 1);
    let form = Form::new("jump", CellShape::Interval, 1)
        .with_argument(element.clone())
        .with_argument(element)
        .with_monomial(Monomial::new(IntegralKind::Cell, vec![BasisFactor::new(0), BasisFactor::new(1)]))
        .with_monomial(Monomial::new(
            IntegralKind::InteriorFacet,
            vec![
                BasisFactor::new(0).with_restriction(Restriction::Plus),
                BasisFactor::new(1).with_restriction(Restriction::Minus),
            ],
        ));

    let compiled = FormCompiler::new(CppFormat, LagrangeTabulator, tensor_options()).compile(&form);
    assert_eq!(compiled.failures().count(), 0);
    let cell = &compiled.integral(IntegralKind::Cell, 0).unwrap().code;
    assert!(cell.contains("// Compute geometry tensors"));
    let interior = &compiled.integral(IntegralKind::InteriorFacet, 0).unwrap().code;
    assert!(interior.contains("Loop quadrature points"));
    assert!(!interior.contains("// Compute geometry tensors"));
}

#[test]
fn tensor_and_quadrature_agree_on_exterior_facets() {
    let element = ElementDescriptor::lagrange(CellShape::Triangle, 1);
    let form = Form::new("robin", CellShape::Triangle, 2)
        .with_argument(element.clone())
        .with_argument(element)
        .with_monomial(Monomial::new(
            IntegralKind::ExteriorFacet,
            vec![BasisFactor::new(0), BasisFactor::new(1)],
        ));

    let compiled = FormCompiler::new(CppFormat, LagrangeTabulator, tensor_options()).compile(&form);
    let code = &compiled.integral(IntegralKind::ExteriorFacet, 0).unwrap().code;
    assert!(code.contains("switch (facet)"));
    assert_eq!(code.matches("// Compute geometry tensors").count(), 3);
    assert!(code.contains("const double G0 = det;"));
}

#[test]
fn element_tensors_are_named_by_integral_and_facet() {
    let element = ElementDescriptor::lagrange(CellShape::Interval, 1);
    let form = Form::new("both", CellShape::Interval, 1)
        .with_argument(element.clone())
        .with_argument(element)
        .with_monomial(Monomial::new(IntegralKind::Cell, vec![BasisFactor::new(0), BasisFactor::new(1)]))
        .with_monomial(Monomial::new(
            IntegralKind::ExteriorFacet,
            vec![BasisFactor::new(0), BasisFactor::new(1)],
        ));

    let tensors = default_compiler().element_tensors(&form, &CppFormat).unwrap();
    let names: Vec<_> = tensors.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "cell integral 0",
            "exterior facet integral 0 (facet 0)",
            "exterior facet integral 0 (facet 1)"
        ]
    );
    // Facet 1 is the vertex x = 1, where only the second basis function is non-zero
    let facet1 = &tensors[2].1;
    let values = facet1.evaluate_with(|_| 1.0);
    assert_eq!(values, vec![0.0, 0.0, 0.0, 1.0]);
}

#[test]
fn options_deserialize_with_defaults() {
    let options: GeneratorOptions = serde_json::from_str(r#"{ "optimisation_level": 0, "representation": "tensor" }"#).unwrap();
    assert_eq!(
        options,
        GeneratorOptions::default()
            .with_optimisation_level(0)
            .with_representation(Representation::Tensor)
    );

    let empty: GeneratorOptions = serde_json::from_str("{}").unwrap();
    assert_eq!(empty, GeneratorOptions::default());
    assert!(serde_json::from_str::<GeneratorOptions>(r#"{ "representation": "uflacs" }"#).is_err());
}

#[test]
fn forms_round_trip_through_json() {
    let form = mass_form(CellShape::Tetrahedron, 3)
        .with_monomial(
            Monomial::new(
                IntegralKind::ExteriorFacet,
                vec![BasisFactor::new(0).with_derivative(2), BasisFactor::new(1)],
            )
            .with_coefficient(-0.5)
            .with_domain(1),
        )
        .with_argument(ElementDescriptor::nedelec(CellShape::Tetrahedron, 3));
    let json = serde_json::to_string(&form).unwrap();
    let parsed: Form = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, form);
}

#[test]
fn monomials_parse_with_defaults() {
    let json = r#"{
        "integral": "interior_facet",
        "factors": [
            { "argument": 0, "restriction": "+" },
            { "argument": 1, "derivatives": [1], "restriction": "-" }
        ]
    }"#;
    let monomial: Monomial = serde_json::from_str(json).unwrap();
    assert_eq!(
        monomial,
        Monomial::new(
            IntegralKind::InteriorFacet,
            vec![
                BasisFactor::new(0).with_restriction(Restriction::Plus),
                BasisFactor::new(1).with_derivative(1).with_restriction(Restriction::Minus),
            ],
        )
    );
}

#[test]
fn written_code_matches_the_routines() {
    let compiled = default_compiler().compile(&mass_form(CellShape::Interval, 2));
    let mut out = Vec::new();
    compiled.write_code(&mut out).unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), compiled.code());
}
