//! Compilation of whole forms into element tensor routines.
use crate::basis::{BasisTabulator, LagrangeTabulator};
use crate::cell::IntegralKind;
use crate::codegen::QuadratureGenerator;
use crate::error::{CompileError, IntegralError};
use crate::form::{Form, Monomial};
use crate::format::{CodeFormat, CppFormat, TensorFormat};
use crate::index::{IndexContext, MultiIndex};
use crate::tensor::{supports_tensor_representation, tensor_terms, ElementTensor, EPSILON};
use eyre::WrapErr;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Strategy used to compute element tensors.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Representation {
    Quadrature,
    /// Contraction of precomputed reference tensors. Integrals the tensor representation
    /// cannot express are compiled with quadrature instead.
    Tensor,
}

impl Default for Representation {
    fn default() -> Self {
        Self::Quadrature
    }
}

/// Options controlling code generation.
///
/// Optimisation level 0 emits every term as is, level 1 additionally restricts loops to the
/// non-zero columns of basis tables, and level 2 also sums the geometry of terms sharing
/// weights and tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorOptions {
    pub optimisation_level: u8,
    /// Tabulated values with a smaller magnitude are treated as zero.
    pub epsilon: f64,
    pub reset_tensor: bool,
    /// Prefix of the generated routines, defaults to the form name.
    pub routine_name: Option<String>,
    pub representation: Representation,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            optimisation_level: 2,
            epsilon: EPSILON,
            reset_tensor: true,
            routine_name: None,
            representation: Representation::default(),
        }
    }
}

impl GeneratorOptions {
    pub fn with_optimisation_level(mut self, level: u8) -> Self {
        self.optimisation_level = level;
        self
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_reset_tensor(mut self, reset: bool) -> Self {
        self.reset_tensor = reset;
        self
    }

    pub fn with_routine_name(mut self, name: impl Into<String>) -> Self {
        self.routine_name = Some(name.into());
        self
    }

    pub fn with_representation(mut self, representation: Representation) -> Self {
        self.representation = representation;
        self
    }
}

/// How the routine of an integral came about.
#[derive(Debug, Clone, PartialEq)]
pub enum IntegralOutcome {
    Emitted { num_operations: usize },
    /// No terms on this domain, the routine only resets the element tensor.
    Empty,
    /// Code generation failed, the routine raises the error at runtime.
    Failed(IntegralError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledIntegral {
    pub kind: IntegralKind,
    pub domain: usize,
    pub name: String,
    pub code: String,
    pub outcome: IntegralOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledForm {
    pub name: String,
    pub integrals: Vec<CompiledIntegral>,
}

impl CompiledForm {
    /// Integrals whose code generation failed.
    pub fn failures(&self) -> impl Iterator<Item = &IntegralError> {
        self.integrals.iter().filter_map(|integral| match &integral.outcome {
            IntegralOutcome::Failed(error) => Some(error),
            _ => None,
        })
    }

    pub fn integral(&self, kind: IntegralKind, domain: usize) -> Option<&CompiledIntegral> {
        self.integrals
            .iter()
            .find(|integral| integral.kind == kind && integral.domain == domain)
    }

    /// All routines, separated by blank lines.
    pub fn code(&self) -> String {
        self.integrals
            .iter()
            .map(|integral| integral.code.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn write_code(&self, out: &mut impl Write) -> eyre::Result<()> {
        for (i, integral) in self.integrals.iter().enumerate() {
            if i > 0 {
                writeln!(out)?;
            }
            out.write_all(integral.code.as_bytes())
                .wrap_err_with(|| format!("failed to write routine {}", integral.name))?;
        }
        out.flush().wrap_err("failed to flush generated code")
    }
}

/// Monomials of a form grouped by integral kind and domain.
///
/// Every domain up to the largest one used by a kind gets an entry, so unused domains yield
/// empty routines.
fn integrals_of(form: &Form) -> Vec<(IntegralKind, usize, Vec<&Monomial>)> {
    let mut integrals = Vec::new();
    for kind in [
        IntegralKind::Cell,
        IntegralKind::ExteriorFacet,
        IntegralKind::InteriorFacet,
    ] {
        let monomials: Vec<&Monomial> = form
            .monomials
            .iter()
            .filter(|monomial| monomial.integral == kind)
            .collect();
        if let Some(max_domain) = monomials.iter().map(|monomial| monomial.domain).max() {
            for domain in 0..=max_domain {
                let on_domain = monomials
                    .iter()
                    .copied()
                    .filter(|monomial| monomial.domain == domain)
                    .collect();
                integrals.push((kind, domain, on_domain));
            }
        }
    }
    integrals
}

/// Compiles forms one at a time, owning the index context shared by all integrals of a
/// form.
#[derive(Debug)]
pub struct FormCompiler<F = CppFormat, T = LagrangeTabulator> {
    format: F,
    tabulator: T,
    options: GeneratorOptions,
    context: IndexContext,
}

impl Default for FormCompiler {
    fn default() -> Self {
        Self::new(CppFormat, LagrangeTabulator, GeneratorOptions::default())
    }
}

impl<F, T> FormCompiler<F, T>
where
    F: CodeFormat,
    T: BasisTabulator,
{
    pub fn new(format: F, tabulator: T, options: GeneratorOptions) -> Self {
        Self {
            format,
            tabulator,
            options,
            context: IndexContext::new(),
        }
    }

    pub fn options(&self) -> &GeneratorOptions {
        &self.options
    }

    fn routine_name(&self, form: &Form, kind: IntegralKind, domain: usize) -> String {
        let prefix = self.options.routine_name.as_deref().unwrap_or(&form.name);
        format!("{}_{}_integral_{}", prefix, kind.name(), domain)
    }

    /// Generates one routine per integral of the form.
    ///
    /// Integrals that fail are replaced by routines raising the error, the remaining
    /// integrals are unaffected.
    pub fn compile(&mut self, form: &Form) -> CompiledForm {
        self.context.reset();
        let primary = MultiIndex::primary(&mut self.context, &form.argument_dims());
        let generator = QuadratureGenerator::new(&self.format, &self.tabulator, &self.options);

        let mut integrals = Vec::new();
        for (kind, domain, monomials) in integrals_of(form) {
            let name = self.routine_name(form, kind, domain);
            debug!("Compiling {} ({} terms)", name, monomials.len());

            let use_tensor = match self.options.representation {
                Representation::Quadrature => false,
                Representation::Tensor if supports_tensor_representation(form, kind) => true,
                Representation::Tensor => {
                    info!("Tensor representation not available for {}, using quadrature", name);
                    false
                }
            };
            let generated = if use_tensor {
                generator.generate_tensor(form, kind, domain, &name, &monomials, &primary, &mut self.context)
            } else {
                generator.generate(form, kind, &name, &monomials)
            };

            let integral = match generated {
                Ok(generated) => {
                    let outcome = if monomials.is_empty() {
                        IntegralOutcome::Empty
                    } else {
                        IntegralOutcome::Emitted {
                            num_operations: generated.num_operations,
                        }
                    };
                    CompiledIntegral {
                        kind,
                        domain,
                        name,
                        code: generated.code,
                        outcome,
                    }
                }
                Err(error) => {
                    let error = error.in_integral(kind, domain);
                    warn!("Replacing {} by an error stub: {}", name, error);
                    CompiledIntegral {
                        kind,
                        domain,
                        code: generator.error_stub(&name, &error),
                        name,
                        outcome: IntegralOutcome::Failed(error),
                    }
                }
            };
            integrals.push(integral);
        }

        info!(
            "Compiled form {}: {} integrals, {} failed",
            form.name,
            integrals.len(),
            integrals
                .iter()
                .filter(|integral| matches!(integral.outcome, IntegralOutcome::Failed(_)))
                .count()
        );
        CompiledForm {
            name: form.name.clone(),
            integrals,
        }
    }

    /// Builds the element tensors of the cell integrals and the exterior facet integrals
    /// (one per facet), named for documentation.
    pub fn element_tensors(
        &mut self,
        form: &Form,
        format: &impl TensorFormat,
    ) -> Result<Vec<(String, ElementTensor)>, IntegralError> {
        self.context.reset();
        let primary = MultiIndex::primary(&mut self.context, &form.argument_dims());

        let mut tensors = Vec::new();
        for (kind, domain, monomials) in integrals_of(form) {
            if monomials.is_empty() || !supports_tensor_representation(form, kind) {
                continue;
            }
            let facets: Vec<Option<usize>> = match kind {
                IntegralKind::Cell => vec![None],
                _ => (0..form.cell.num_facets()).map(Some).collect(),
            };
            for facet in facets {
                let tensor = tensor_terms(form, &monomials, facet, &primary, &mut self.context, &self.tabulator)
                    .and_then(|terms| ElementTensor::new(terms, kind, domain, format))
                    .map_err(|error: CompileError| error.in_integral(kind, domain))?;
                let name = match facet {
                    None => format!("{} integral {}", kind.name(), domain),
                    Some(facet) => format!("{} integral {} (facet {})", kind.name(), domain, facet),
                };
                tensors.push((name.replace('_', " "), tensor));
            }
        }
        Ok(tensors)
    }
}
