use crate::{laplace_form, mass_form};
use formgen::basis::LagrangeTabulator;
use formgen::cell::{CellDims, CellShape, IntegralKind, Restriction};
use formgen::element::ElementDescriptor;
use formgen::expr::GeometrySymbol;
use formgen::form::{BasisFactor, Form, Monomial};
use formgen::format::CppFormat;
use formgen::geometry::AffineCellMap;
use formgen::index::{Index, IndexContext, MultiIndex};
use formgen::tensor::{
    build_element_tensor, supports_tensor_representation, tensor_terms, Declaration, ElementTensor,
    GeometryFactor, GeometryTensor, ReferenceTensor, Term,
};
use formgen::CompileError;
use matrixcompare::assert_scalar_eq;
use nalgebra::DMatrix;

fn scalar_term(value: f64, coefficient: f64) -> Term {
    Term::new(
        ReferenceTensor::new(MultiIndex::empty(), MultiIndex::empty(), vec![value]),
        GeometryTensor::new(MultiIndex::empty(), coefficient, Vec::new()),
    )
}

fn assert_values(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len());
    for (&a, &e) in actual.iter().zip(expected) {
        assert_scalar_eq!(a, e, comp = abs, tol = 1e-14);
    }
}

#[test]
fn scalar_element_tensor_is_the_product_of_both_tensors() {
    let tensor = ElementTensor::new(vec![scalar_term(2.0, 3.0)], IntegralKind::Cell, 0, &CppFormat).unwrap();

    assert_eq!(tensor.a0(), &[Declaration::new("A0", "2.0")]);
    assert_eq!(tensor.gk(), &[Declaration::new("G0", "3.0")]);
    assert_eq!(tensor.ak(), &[Declaration::new("A[0]", "2.0*G0")]);
    assert_values(&tensor.evaluate_with(|_| 1.0), &[6.0]);
}

#[test]
fn tiny_reference_entries_are_omitted() {
    let mut context = IndexContext::new();
    let a = MultiIndex::secondary(&mut context, &[3]);
    let a0 = ReferenceTensor::new(MultiIndex::empty(), a.clone(), vec![1e-20, 0.5, -0.25]);
    let gk = GeometryTensor::new(a, 1.0, Vec::new());
    let tensor = build_element_tensor(vec![Term::new(a0, gk)], IntegralKind::Cell, 0, &CppFormat).unwrap();

    assert_eq!(tensor.ak()[0].value, "0.5*G0_1 - 0.25*G0_2");
    assert_values(&tensor.evaluate_with(|_| 1.0), &[0.25]);

    let zero = ElementTensor::new(vec![scalar_term(1e-20, 1.0)], IntegralKind::Cell, 0, &CppFormat).unwrap();
    assert_eq!(zero.ak(), &[Declaration::new("A[0]", "0.0")]);
    assert_values(&zero.evaluate_with(|_| 1.0), &[0.0]);
}

#[test]
fn terms_are_summed_into_each_entry() {
    let tensor = ElementTensor::new(
        vec![scalar_term(2.0, 1.0), scalar_term(-1.5, 4.0)],
        IntegralKind::Cell,
        0,
        &CppFormat,
    )
    .unwrap();
    assert_eq!(tensor.gk().len(), 2);
    assert_eq!(tensor.ak()[0].value, "2.0*G0 - 1.5*G1");
    assert_values(&tensor.evaluate_with(|_| 1.0), &[-4.0]);
}

#[test]
fn mismatching_primary_ranges_are_rejected() {
    let mut context = IndexContext::new();
    let i = MultiIndex::primary(&mut context, &[2]);
    let vector_term = Term::new(
        ReferenceTensor::new(i, MultiIndex::empty(), vec![1.0, 2.0]),
        GeometryTensor::new(MultiIndex::empty(), 1.0, Vec::new()),
    );
    let result = ElementTensor::new(vec![vector_term, scalar_term(1.0, 1.0)], IntegralKind::Cell, 0, &CppFormat);
    assert_eq!(
        result,
        Err(CompileError::RankMismatch {
            expected: vec![2],
            actual: vec![]
        })
    );
}

#[test]
fn geometry_tensor_entries_resolve_secondary_indices() {
    let mut context = IndexContext::new();
    // Shift the identifiers so resolution must use the offset
    let _ = MultiIndex::secondary(&mut context, &[2, 2]);
    let a = MultiIndex::secondary(&mut context, &[2]);
    let index = a.indices()[0];
    let gk = GeometryTensor::new(
        a,
        0.5,
        vec![
            GeometryFactor::ScaleFactor,
            GeometryFactor::InverseJacobian(index, Index::Fixed(1)),
            GeometryFactor::Determinant(-1),
        ],
    );

    let entry = gk.evaluate(&[1]);
    assert_eq!(entry.coefficient(), 0.5);
    let symbols: Vec<_> = entry.powers().iter().map(|(symbol, &power)| (*symbol, power)).collect();
    assert_eq!(
        symbols,
        vec![
            (
                GeometrySymbol::InverseJacobian {
                    restriction: None,
                    row: 1,
                    col: 1
                },
                1
            ),
            (GeometrySymbol::Determinant { restriction: None }, -1),
            (GeometrySymbol::ScaleFactor, 1),
        ]
    );
}

#[test]
#[should_panic]
fn geometry_tensors_reject_primary_indices() {
    let mut context = IndexContext::new();
    let i = context.primary();
    let _ = GeometryTensor::new(
        MultiIndex::empty(),
        1.0,
        vec![GeometryFactor::Jacobian(i, Index::Fixed(0))],
    );
}

#[test]
fn laplace_on_the_reference_triangle() {
    let form = laplace_form(CellShape::Triangle);
    let mut context = IndexContext::new();
    let primary = MultiIndex::primary(&mut context, &form.argument_dims());
    let monomials: Vec<&Monomial> = form.monomials.iter().collect();
    let terms = tensor_terms(&form, &monomials, None, &primary, &mut context, &LagrangeTabulator).unwrap();
    assert_eq!(terms.len(), 2);
    assert_eq!(terms[0].reference_tensor().a().dims(), &[2, 2]);

    let tensor = ElementTensor::new(terms, IntegralKind::Cell, 0, &CppFormat).unwrap();
    assert_eq!(tensor.ak().len(), 9);
    assert_eq!(tensor.gk()[0], Declaration::new("G0_0_0", "K_00*K_00*det"));

    let map = AffineCellMap::new(
        CellShape::Triangle.reference_vertices(),
        CellDims::new(2, 2).unwrap(),
    );
    #[rustfmt::skip]
    let expected = [
         1.0, -0.5, -0.5,
        -0.5,  0.5,  0.0,
        -0.5,  0.0,  0.5,
    ];
    assert_values(&tensor.evaluate(&map), &expected);
}

#[test]
fn laplace_scales_inversely_with_the_interval_length() {
    let form = laplace_form(CellShape::Interval);
    let mut context = IndexContext::new();
    let primary = MultiIndex::primary(&mut context, &form.argument_dims());
    let monomials: Vec<&Monomial> = form.monomials.iter().collect();
    let terms = tensor_terms(&form, &monomials, None, &primary, &mut context, &LagrangeTabulator).unwrap();
    let tensor = ElementTensor::new(terms, IntegralKind::Cell, 0, &CppFormat).unwrap();

    let map = AffineCellMap::new(
        DMatrix::from_column_slice(1, 2, &[1.0, 5.0]),
        CellDims::new(1, 1).unwrap(),
    );
    assert_values(&tensor.evaluate(&map), &[0.25, -0.25, -0.25, 0.25]);
}

#[test]
fn facet_mass_tensor_uses_the_facet_rule() {
    let element = ElementDescriptor::lagrange(CellShape::Triangle, 1);
    let form = Form::new("facet_mass", CellShape::Triangle, 2)
        .with_argument(element.clone())
        .with_argument(element)
        .with_monomial(Monomial::new(
            IntegralKind::ExteriorFacet,
            vec![BasisFactor::new(0), BasisFactor::new(1)],
        ));
    let mut context = IndexContext::new();
    let primary = MultiIndex::primary(&mut context, &form.argument_dims());
    let monomials: Vec<&Monomial> = form.monomials.iter().collect();
    let terms = tensor_terms(&form, &monomials, Some(0), &primary, &mut context, &LagrangeTabulator).unwrap();
    let tensor = ElementTensor::new(terms, IntegralKind::ExteriorFacet, 0, &CppFormat).unwrap();

    // Facet 0 of the reference triangle has length sqrt(2)
    let facet_det = 2.0_f64.sqrt();
    let values = tensor.evaluate_with(|symbol| match symbol {
        GeometrySymbol::ScaleFactor => facet_det,
        _ => 1.0,
    });
    let (diagonal, off_diagonal) = (facet_det / 3.0, facet_det / 6.0);
    #[rustfmt::skip]
    let expected = [
        0.0, 0.0, 0.0,
        0.0, diagonal, off_diagonal,
        0.0, off_diagonal, diagonal,
    ];
    assert_values(&values, &expected);
}

#[test]
fn tensor_representation_requires_affine_arguments_off_interior_facets() {
    let mass = mass_form(CellShape::Triangle, 2);
    assert!(supports_tensor_representation(&mass, IntegralKind::Cell));
    assert!(supports_tensor_representation(&mass, IntegralKind::ExteriorFacet));
    assert!(!supports_tensor_representation(&mass, IntegralKind::InteriorFacet));

    let rt = ElementDescriptor::raviart_thomas(CellShape::Triangle, 2);
    let piola = Form::new("piola", CellShape::Triangle, 2)
        .with_argument(rt)
        .with_monomial(Monomial::new(IntegralKind::Cell, vec![BasisFactor::new(0)]));
    assert!(!supports_tensor_representation(&piola, IntegralKind::Cell));
}

#[test]
fn restricted_factors_are_rejected_on_cells() {
    let element = ElementDescriptor::lagrange(CellShape::Interval, 1);
    let form = Form::new("restricted", CellShape::Interval, 1)
        .with_argument(element)
        .with_monomial(Monomial::new(
            IntegralKind::Cell,
            vec![BasisFactor::new(0).with_restriction(Restriction::Plus)],
        ));
    let mut context = IndexContext::new();
    let primary = MultiIndex::primary(&mut context, &form.argument_dims());
    let monomials: Vec<&Monomial> = form.monomials.iter().collect();
    let result = tensor_terms(&form, &monomials, None, &primary, &mut context, &LagrangeTabulator);
    assert!(matches!(result, Err(CompileError::InvalidMonomial(_))));
}
