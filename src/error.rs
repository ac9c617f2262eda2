//! Errors raised while compiling forms.
use crate::cell::IntegralKind;
use std::error::Error;
use std::fmt;
use std::fmt::{Display, Formatter};

/// Library-wide error type.
///
/// Every error aborts only the construction it was raised in (one element tensor or one
/// integral). The form compiler turns it into a diagnostic for that integral and carries on
/// with the remaining integrals.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum CompileError {
    /// An index was requested with a kind other than fixed, primary or secondary.
    UnknownIndexKind(String),
    /// The terms of one element tensor disagree on the primary rank or dimensions.
    RankMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    /// A manifold cell did not carry an orientation marker.
    UndefinedOrientation,
    /// The mapping kind is not one of the supported Piola-type maps.
    UnknownMapping(String),
    /// The basis tabulator cannot tabulate the requested element.
    UnsupportedElement(String),
    /// The pair of topological and geometric dimension is not supported.
    UnsupportedDimensions { tdim: usize, gdim: usize },
    /// A value mapping was applied to reference values of the wrong size.
    InvalidValueShape {
        mapping: String,
        expected: usize,
        actual: usize,
    },
    /// A monomial does not contain every argument exactly once.
    InvalidMonomial(String),
    /// No quadrature rule could be produced.
    Quadrature(formgen_quadrature::Error),
}

impl CompileError {
    /// Returns the error annotated with the integral it was raised in.
    pub fn in_integral(self, kind: IntegralKind, domain: usize) -> IntegralError {
        IntegralError {
            kind,
            domain,
            error: self,
        }
    }
}

impl Display for CompileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownIndexKind(kind) => write!(f, "Unknown index type {}", kind),
            Self::RankMismatch { expected, actual } => write!(
                f,
                "Terms of element tensor have mismatching primary dimensions: expected {:?}, got {:?}",
                expected, actual
            ),
            Self::UndefinedOrientation => write!(f, "cell orientation must be defined (not 0)"),
            Self::UnknownMapping(mapping) => write!(f, "Unknown mapping: {}", mapping),
            Self::UnsupportedElement(element) => write!(f, "Unable to tabulate element: {}", element),
            Self::UnsupportedDimensions { tdim, gdim } => write!(
                f,
                "Unsupported dimensions: topological dimension {}, geometric dimension {}",
                tdim, gdim
            ),
            Self::InvalidValueShape {
                mapping,
                expected,
                actual,
            } => write!(
                f,
                "Mapping {} expects {} reference components, got {}",
                mapping, expected, actual
            ),
            Self::InvalidMonomial(reason) => write!(f, "Invalid monomial: {}", reason),
            Self::Quadrature(err) => write!(f, "Quadrature error: {}", err),
        }
    }
}

impl Error for CompileError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Quadrature(err) => Some(err),
            _ => None,
        }
    }
}

impl From<formgen_quadrature::Error> for CompileError {
    fn from(err: formgen_quadrature::Error) -> Self {
        Self::Quadrature(err)
    }
}

/// A [`CompileError`] tagged with the integral that failed.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegralError {
    pub kind: IntegralKind,
    pub domain: usize,
    pub error: CompileError,
}

impl Display for IntegralError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} integral {}: {}", self.kind.name(), self.domain, self.error)
    }
}

impl Error for IntegralError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.error)
    }
}
