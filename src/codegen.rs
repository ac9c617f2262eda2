//! Code generation for element tensor routines.
//!
//! The quadrature representation evaluates every term of an integral at the points of a
//! quadrature rule. Weights and basis function tables are tabulated once per integral and
//! shared by all terms with identical values, terms with the same number of points share one
//! loop over the points, and geometry coefficients are computed once before the loops.
//!
//! The tensor representation instead contracts precomputed reference tensors with geometry
//! tensors, see [`crate::tensor`].
use crate::basis::BasisTabulator;
use crate::cell::{CellDims, IntegralKind, Restriction};
use crate::compiler::GeneratorOptions;
use crate::error::{CompileError, IntegralError};
use crate::expr::{GeoMonomial, GeoSum, GeometrySymbol};
use crate::form::{Form, Monomial};
use crate::format::CodeFormat;
use crate::geometry::snippets::{snippet, with_dependencies, GeometrySnippet};
use crate::index::{IndexContext, MultiIndex};
use crate::quadrature::ReferenceRule;
use crate::tensor::{tensor_terms, ElementTensor, EPSILON};
use itertools::Itertools;
use log::debug;
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};

mod buffer;
mod tables;

pub use buffer::CodeBuffer;
pub use tables::{expand_factor, term_tuple, FactorTable, TableRef, TableRegistry, WeightRegistry};

/// Code of one generated routine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedIntegral {
    pub code: String,
    /// Operations per call of the routine, excluding the geometry snippets. For facet
    /// integrals this is the maximum over all facets.
    pub num_operations: usize,
}

/// Code computing the element tensor for one facet (or facet pair) of an integral.
#[derive(Debug, Default)]
struct CaseCode {
    code: CodeBuffer,
    symbols: BTreeSet<GeometrySymbol>,
    num_operations: usize,
}

/// A table used by one argument, together with the offset of the argument's dofs within
/// the macro element of an interior facet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct ArgumentTable {
    table: TableRef,
    offset: usize,
}

/// One product of basis tables and its geometry coefficient.
#[derive(Debug, Clone)]
struct Contribution {
    geometry: GeoMonomial,
    tables: Vec<ArgumentTable>,
}

#[derive(Debug)]
struct TermCode {
    number: usize,
    weights: String,
    num_points: usize,
    contributions: Vec<Contribution>,
}

/// Accumulation statements sharing one loop nest over the arguments' dofs.
#[derive(Debug)]
struct LoopNest {
    ranges: Vec<usize>,
    statements: Vec<String>,
    operations_per_iteration: usize,
}

/// Caches scoped to the code generation of one facet (or facet pair) of an integral.
#[derive(Debug)]
struct ElementTensorBuilder {
    weights: WeightRegistry,
    tables: TableRegistry,
    geo_terms: FxHashMap<String, usize>,
    geo_constants: Vec<(String, usize)>,
    symbols: BTreeSet<GeometrySymbol>,
}

impl ElementTensorBuilder {
    fn new(compress_columns: bool) -> Self {
        Self {
            weights: WeightRegistry::default(),
            tables: TableRegistry::new(compress_columns),
            geo_terms: FxHashMap::default(),
            geo_constants: Vec::new(),
            symbols: BTreeSet::new(),
        }
    }

    /// Returns the name of the constant holding the given geometry expression, numbering
    /// new expressions in order of first use.
    fn geometry_constant(&mut self, sum: &GeoSum, format: &impl CodeFormat) -> String {
        let value = format.sum(sum);
        let next = self.geo_constants.len();
        let number = *self.geo_terms.entry(value.clone()).or_insert(next);
        if number == next {
            self.symbols
                .extend(sum.terms().iter().flat_map(|term| term.powers().keys().copied()));
            self.geo_constants.push((value, sum.num_operations()));
        }
        format.geometry_constant_name(number)
    }

    fn geometry_declarations(&self, format: &impl CodeFormat) -> (CodeBuffer, usize) {
        let mut code = CodeBuffer::new();
        let num_operations = self.geo_constants.iter().map(|(_, ops)| ops).sum();
        code.blank();
        if num_operations > 0 {
            code.push(format.comment(&format!(
                "Number of operations to compute geometry constants = {}",
                num_operations
            )));
        }
        for (number, (value, _)) in self.geo_constants.iter().enumerate() {
            code.push(format.const_float_declaration(&format.geometry_constant_name(number), value));
        }
        (code, num_operations)
    }
}

fn loop_variable(argument: usize) -> String {
    match argument {
        0 => "j".to_string(),
        1 => "k".to_string(),
        2 => "l".to_string(),
        3 => "m".to_string(),
        _ => format!("i{}", argument),
    }
}

/// Dimensions of the element tensor, doubled on interior facets.
fn macro_dims(form: &Form, kind: IntegralKind) -> Vec<usize> {
    let factor = if kind == IntegralKind::InteriorFacet { 2 } else { 1 };
    form.argument_dims().into_iter().map(|n| factor * n).collect()
}

/// Generates element tensor routines with a given output format and basis tabulator.
#[derive(Debug)]
pub struct QuadratureGenerator<'a, F, T> {
    format: &'a F,
    tabulator: &'a T,
    options: &'a GeneratorOptions,
}

impl<'a, F, T> QuadratureGenerator<'a, F, T>
where
    F: CodeFormat,
    T: BasisTabulator,
{
    pub fn new(format: &'a F, tabulator: &'a T, options: &'a GeneratorOptions) -> Self {
        Self {
            format,
            tabulator,
            options,
        }
    }

    /// Generates the routine of one integral using the quadrature representation.
    ///
    /// All monomials must belong to the given integral kind. Without monomials, the routine
    /// only resets the element tensor.
    pub fn generate(
        &self,
        form: &Form,
        kind: IntegralKind,
        name: &str,
        monomials: &[&Monomial],
    ) -> Result<GeneratedIntegral, CompileError> {
        let dims = form.dims()?;
        self.routine(form, kind, name, monomials.is_empty(), |facet0, facet1| {
            self.quadrature_case(form, dims, kind, monomials, (facet0, facet1))
        })
    }

    /// Generates the routine of one integral using the tensor representation.
    ///
    /// The primary multi-index must span the arguments of the form.
    #[allow(clippy::too_many_arguments)]
    pub fn generate_tensor(
        &self,
        form: &Form,
        kind: IntegralKind,
        domain: usize,
        name: &str,
        monomials: &[&Monomial],
        primary: &MultiIndex,
        context: &mut IndexContext,
    ) -> Result<GeneratedIntegral, CompileError> {
        self.routine(form, kind, name, monomials.is_empty(), |facet, _| {
            self.tensor_case(form, kind, domain, monomials, facet, primary, context)
        })
    }

    /// A routine that fails at runtime, standing in for an integral whose code could not be
    /// generated.
    pub fn error_stub(&self, name: &str, error: &IntegralError) -> String {
        let format = self.format;
        let mut code = CodeBuffer::new();
        code.push(format.routine_begin(name, error.kind));
        code.indent();
        code.push(format.comment(&format!("Code generation failed for {}", error)));
        code.push(format.error_statement(&error.to_string()));
        code.dedent();
        code.push(format.routine_end());
        code.to_string()
    }

    fn routine(
        &self,
        form: &Form,
        kind: IntegralKind,
        name: &str,
        empty: bool,
        mut case: impl FnMut(Option<usize>, Option<usize>) -> Result<CaseCode, CompileError>,
    ) -> Result<GeneratedIntegral, CompileError> {
        let dims = form.dims()?;
        let format = self.format;
        let mut body = CodeBuffer::new();
        let mut symbols = BTreeSet::new();
        let mut num_operations = 0;

        if empty {
            debug!("No terms for {} integral, only resetting the element tensor", kind.name());
            body.append(self.reset(&macro_dims(form, kind)));
        } else {
            let num_facets = form.cell.num_facets();
            match kind {
                IntegralKind::Cell => {
                    let cell = case(None, None)?;
                    debug!("Number of operations to compute tensor: {}", cell.num_operations);
                    symbols = cell.symbols;
                    num_operations = cell.num_operations;
                    body = cell.code;
                }
                IntegralKind::ExteriorFacet => {
                    let mut cases = Vec::with_capacity(num_facets);
                    for facet in 0..num_facets {
                        let facet_case = case(Some(facet), None)?;
                        debug!(
                            "Number of operations to compute tensor for facet {}: {}",
                            facet, facet_case.num_operations
                        );
                        symbols.extend(facet_case.symbols);
                        num_operations = num_operations.max(facet_case.num_operations);
                        cases.push(facet_case.code);
                    }
                    body.push(format.comment("Compute element tensor for all facets"));
                    body.append(self.switch(&format.facet_variable(None), cases));
                }
                IntegralKind::InteriorFacet => {
                    let mut outer = Vec::with_capacity(num_facets);
                    for facet0 in 0..num_facets {
                        let mut inner = Vec::with_capacity(num_facets);
                        for facet1 in 0..num_facets {
                            let facet_case = case(Some(facet0), Some(facet1))?;
                            debug!(
                                "Number of operations to compute tensor for facets ({}, {}): {}",
                                facet0, facet1, facet_case.num_operations
                            );
                            symbols.extend(facet_case.symbols);
                            num_operations = num_operations.max(facet_case.num_operations);
                            inner.push(facet_case.code);
                        }
                        outer.push(self.switch(&format.facet_variable(Some(Restriction::Minus)), inner));
                    }
                    body.push(format.comment("Compute element tensor for all facet-facet combinations"));
                    body.append(self.switch(&format.facet_variable(Some(Restriction::Plus)), outer));
                }
            }
        }

        let mut code = CodeBuffer::new();
        code.push(format.routine_begin(name, kind));
        code.indent();
        if !empty {
            let mut prelude = self.geometry_prelude(dims, kind, &symbols);
            prelude.remove_unused_declarations(&body, format);
            code.append(prelude);
            code.blank();
        }
        code.append(body);
        code.dedent();
        code.push(format.routine_end());

        Ok(GeneratedIntegral {
            code: code.to_string(),
            num_operations,
        })
    }

    fn switch(&self, variable: &str, cases: Vec<CodeBuffer>) -> CodeBuffer {
        let format = self.format;
        let mut code = CodeBuffer::new();
        code.push(format.switch_begin(variable));
        code.push(format.block_begin());
        for (value, case) in cases.into_iter().enumerate() {
            code.push(format.case_label(value));
            code.indent();
            code.push(format.block_begin());
            code.indent();
            code.append(case);
            code.dedent();
            code.push(format.block_end());
            code.push(format.break_statement());
            code.dedent();
        }
        code.push(format.block_end());
        code
    }

    /// Geometry snippets declaring every symbol used by the routine. The snippets declare
    /// whole matrices, entries the body never reads are pruned afterwards.
    fn geometry_prelude(
        &self,
        dims: CellDims,
        kind: IntegralKind,
        symbols: &BTreeSet<GeometrySymbol>,
    ) -> CodeBuffer {
        let restrictions = match kind {
            IntegralKind::InteriorFacet => vec![Some(Restriction::Plus), Some(Restriction::Minus)],
            _ => vec![None],
        };

        let mut code = CodeBuffer::new();
        for restriction in restrictions {
            let mut keys = vec![GeometrySnippet::Jacobian, GeometrySnippet::InverseJacobian];
            if dims.is_manifold() && symbols.contains(&GeometrySymbol::Determinant { restriction }) {
                keys.push(GeometrySnippet::Orientation);
            }
            match (kind, restriction) {
                (IntegralKind::Cell, _) => keys.push(GeometrySnippet::ScaleFactor),
                (_, None) | (_, Some(Restriction::Plus)) => keys.push(GeometrySnippet::FacetDeterminant),
                _ => {}
            }
            for key in with_dependencies(keys) {
                code.push(snippet(key, dims, restriction));
                code.blank();
            }
        }
        code
    }

    fn reset(&self, macro_dims: &[usize]) -> CodeBuffer {
        let format = self.format;
        let size: usize = macro_dims.iter().product();
        let variable = loop_variable(0);
        let mut code = CodeBuffer::new();
        code.push(format.comment("Reset values of the element tensor block"));
        code.push(format.loop_begin(&variable, 0, size));
        code.push(format.block_begin());
        code.indent();
        code.push(format.assign(
            &format.element_tensor_access(&variable),
            &format.floating_point(0.0),
        ));
        code.dedent();
        code.push(format.block_end());
        code.blank();
        code
    }

    fn quadrature_case(
        &self,
        form: &Form,
        dims: CellDims,
        kind: IntegralKind,
        monomials: &[&Monomial],
        facets: (Option<usize>, Option<usize>),
    ) -> Result<CaseCode, CompileError> {
        let format = self.format;
        let mut builder = ElementTensorBuilder::new(self.options.optimisation_level >= 1);

        let mut groups: BTreeMap<usize, Vec<TermCode>> = BTreeMap::new();
        for (number, monomial) in monomials.iter().enumerate() {
            if let Some(term) = self.term(&mut builder, form, dims, number, monomial, facets)? {
                groups.entry(term.num_points).or_default().push(term);
            }
        }

        let macro_dims = macro_dims(form, kind);
        let mut loops = CodeBuffer::new();
        let mut num_operations = 0;
        for (&num_points, terms) in &groups {
            let (group_code, group_operations) = self.point_loop(&mut builder, &macro_dims, num_points, terms);
            loops.blank();
            loops.append(group_code);
            num_operations += group_operations;
        }

        let mut code = CodeBuffer::new();
        if self.options.reset_tensor {
            code.append(self.reset(&macro_dims));
        }
        code.append(builder.weights.declarations(format));
        code.append(builder.tables.declarations(format));
        let (geometry, geometry_operations) = builder.geometry_declarations(format);
        code.append(geometry);
        code.append(loops);

        Ok(CaseCode {
            code,
            symbols: builder.symbols,
            num_operations: num_operations + geometry_operations,
        })
    }

    /// Tabulates the factors of one monomial, returning `None` if all its tables vanish.
    fn term(
        &self,
        builder: &mut ElementTensorBuilder,
        form: &Form,
        dims: CellDims,
        number: usize,
        monomial: &Monomial,
        facets: (Option<usize>, Option<usize>),
    ) -> Result<Option<TermCode>, CompileError> {
        let factors = form.validate_monomial(monomial)?;
        let degree = form.quadrature_degree(monomial);
        let rule = ReferenceRule::new(form.cell, facets.0, degree)?;
        let minus_rule = match facets.1 {
            Some(facet) => Some(ReferenceRule::facet(form.cell, facet, degree)?),
            None => None,
        };

        let mut expanded = Vec::with_capacity(factors.len());
        for factor in &factors {
            let element = &form.arguments[factor.argument];
            let (points, offset) = match (factor.restriction, &minus_rule) {
                (Some(Restriction::Minus), Some(minus)) => (minus.points(), element.space_dimension()),
                _ => (rule.points(), 0),
            };
            let reference = self.tabulator.tabulate(element, points, factor.order())?;
            let tables = expand_factor(element, factor, &reference, dims, self.options.epsilon)?;
            expanded.push((tables, offset));
        }

        if expanded.iter().any(|(tables, _)| tables.is_empty()) {
            debug!("Term {} vanishes at all quadrature points", number);
            return Ok(None);
        }

        let scale = GeoMonomial::symbol(GeometrySymbol::ScaleFactor).scaled(monomial.coefficient);
        let contributions = if expanded.is_empty() {
            vec![Contribution {
                geometry: scale,
                tables: Vec::new(),
            }]
        } else {
            expanded
                .iter()
                .map(|(tables, _)| 0..tables.len())
                .multi_cartesian_product()
                .map(|choice| {
                    let mut geometry = scale.clone();
                    let mut tables = Vec::with_capacity(choice.len());
                    for ((factor_tables, offset), &k) in expanded.iter().zip(&choice) {
                        geometry = geometry * factor_tables[k].geometry.clone();
                        tables.push(ArgumentTable {
                            table: builder.tables.register(&factor_tables[k].values, self.format),
                            offset: *offset,
                        });
                    }
                    Contribution { geometry, tables }
                })
                .collect()
        };

        Ok(Some(TermCode {
            number,
            weights: builder.weights.register(number, rule.weights(), self.format),
            num_points: rule.num_points(),
            contributions,
        }))
    }

    /// Emits the terms sharing a number of quadrature points, returning the code and its
    /// number of operations.
    fn point_loop(
        &self,
        builder: &mut ElementTensorBuilder,
        macro_dims: &[usize],
        num_points: usize,
        terms: &[TermCode],
    ) -> (CodeBuffer, usize) {
        let format = self.format;
        let ip = match num_points {
            1 => "0".to_string(),
            _ => format.quadrature_point_variable().to_string(),
        };

        // Contributions with identical weights and tables are summed into one geometry factor
        let factorise = self.options.optimisation_level >= 2;
        let mut entries: Vec<(&str, &[ArgumentTable], Vec<GeoMonomial>)> = Vec::new();
        let mut entry_index: FxHashMap<(&str, &[ArgumentTable]), usize> = FxHashMap::default();
        for term in terms {
            for contribution in &term.contributions {
                let key = (term.weights.as_str(), contribution.tables.as_slice());
                let existing = match factorise {
                    true => entry_index.get(&key).copied(),
                    false => None,
                };
                match existing {
                    Some(entry) => entries[entry].2.push(contribution.geometry.clone()),
                    None => {
                        entry_index.insert(key, entries.len());
                        entries.push((key.0, key.1, vec![contribution.geometry.clone()]));
                    }
                }
            }
        }

        let mut nests: Vec<LoopNest> = Vec::new();
        let mut nest_index: FxHashMap<Vec<(usize, Option<String>, usize)>, usize> = FxHashMap::default();
        for (weights, tables, geometry) in entries {
            let sum = GeoSum::from_terms(geometry);
            if sum.is_zero() {
                continue;
            }

            let mut factors = Vec::with_capacity(tables.len() + 2);
            factors.push(match num_points {
                1 => weights.to_string(),
                _ => format.array_access(weights, &ip),
            });
            for (argument, table) in tables.iter().enumerate() {
                factors.push(format.matrix_access(&table.table.name, &ip, &loop_variable(argument)));
            }
            match sum.terms() {
                [constant] if constant.is_constant() => {
                    if constant.coefficient() != 1.0 {
                        factors.push(format.floating_point(constant.coefficient()));
                    }
                }
                _ => factors.push(builder.geometry_constant(&sum, format)),
            }

            let target = format.element_tensor_access(&self.element_tensor_index(tables, macro_dims));
            let statement = format.add_assign(&target, &format.product(&factors));
            let signature: Vec<_> = tables
                .iter()
                .map(|t| (t.table.num_columns, t.table.nonzero_columns.clone(), t.offset))
                .collect();
            let next = nests.len();
            let nest = *nest_index.entry(signature).or_insert(next);
            if nest == next {
                nests.push(LoopNest {
                    ranges: tables.iter().map(|t| t.table.num_columns).collect(),
                    statements: Vec::new(),
                    operations_per_iteration: 0,
                });
            }
            // Products between the factors plus the accumulation
            nests[nest].operations_per_iteration += factors.len();
            nests[nest].statements.push(statement);
        }

        let mut body = CodeBuffer::new();
        let mut operations_per_point = 0;
        for nest in &nests {
            for (argument, &range) in nest.ranges.iter().enumerate() {
                body.push(format.loop_begin(&loop_variable(argument), 0, range));
                body.push(format.block_begin());
                body.indent();
            }
            for statement in &nest.statements {
                body.push(statement);
            }
            for _ in &nest.ranges {
                body.dedent();
                body.push(format.block_end());
            }
            operations_per_point += nest.operations_per_iteration * nest.ranges.iter().product::<usize>();
        }
        let num_operations = operations_per_point * num_points;

        let numbers: Vec<usize> = terms.iter().map(|term| term.number).collect();
        let mut code = CodeBuffer::new();
        code.push(format.comment(&format!(
            "Loop quadrature points (tensor/monomial terms {})",
            term_tuple(&numbers)
        )));
        code.push(format.comment(&format!(
            "Number of operations to compute element tensor for following IP loop = {}",
            num_operations
        )));
        if num_points > 1 {
            code.push(format.loop_begin(&ip, 0, num_points));
            code.push(format.block_begin());
            code.indent();
            code.append(body);
            code.dedent();
            code.push(format.block_end());
        } else {
            code.push(format.comment("Only 1 integration point, omitting IP loop."));
            code.append(body);
        }
        (code, num_operations)
    }

    /// Row-major position in the element tensor of the entry updated inside a loop nest.
    fn element_tensor_index(&self, tables: &[ArgumentTable], macro_dims: &[usize]) -> String {
        let format = self.format;
        if tables.is_empty() {
            return "0".to_string();
        }
        tables
            .iter()
            .enumerate()
            .map(|(argument, table)| {
                let variable = loop_variable(argument);
                let mut index = match &table.table.nonzero_columns {
                    Some(columns) => format.array_access(columns, &variable),
                    None => variable,
                };
                let stride: usize = macro_dims[argument + 1..].iter().product();
                if table.offset > 0 {
                    index = format!("{} + {}", index, table.offset);
                    if stride != 1 {
                        index = format.grouping(&index);
                    }
                }
                match stride {
                    1 => index,
                    _ => format!("{}{}{}", index, format.multiplication(), stride),
                }
            })
            .join(" + ")
    }

    #[allow(clippy::too_many_arguments)]
    fn tensor_case(
        &self,
        form: &Form,
        kind: IntegralKind,
        domain: usize,
        monomials: &[&Monomial],
        facet: Option<usize>,
        primary: &MultiIndex,
        context: &mut IndexContext,
    ) -> Result<CaseCode, CompileError> {
        let format = self.format;
        let terms = tensor_terms(form, monomials, facet, primary, context, self.tabulator)?;
        let tensor = ElementTensor::new(terms, kind, domain, format)?;

        let mut symbols = BTreeSet::new();
        let mut geometry_operations = 0;
        let mut element_operations = 0;
        for term in tensor.terms() {
            let (a0, gk) = (term.reference_tensor(), term.geometry_tensor());
            for a in gk.a().tuples() {
                let entry = gk.evaluate(&a);
                geometry_operations += entry.num_operations();
                symbols.extend(entry.powers().keys().copied());
            }
            for i in a0.i().tuples() {
                let nonzero = a0
                    .a()
                    .tuples()
                    .iter()
                    .filter(|a| a0.value(&i, a).abs() > EPSILON)
                    .count();
                // Products, the additions between them and the accumulation
                element_operations += 2 * nonzero;
            }
        }

        let mut code = CodeBuffer::new();
        if self.options.reset_tensor {
            code.append(self.reset(&macro_dims(form, kind)));
        }
        code.push(format.comment("Compute geometry tensors"));
        code.push(format.comment(&format!(
            "Number of operations to compute geometry tensors = {}",
            geometry_operations
        )));
        for declaration in tensor.gk() {
            code.push(format.const_float_declaration(&declaration.name, &declaration.value));
        }
        code.blank();
        code.push(format.comment("Compute element tensor"));
        code.push(format.comment(&format!(
            "Number of operations to compute element tensor = {}",
            element_operations
        )));
        let zero = format.floating_point(0.0);
        for declaration in tensor.ak().iter().filter(|d| d.value != zero) {
            code.push(format.add_assign(&declaration.name, &declaration.value));
        }

        Ok(CaseCode {
            code,
            symbols,
            num_operations: geometry_operations + element_operations,
        })
    }
}
