//! A form compiler for finite element variational forms.
//!
//! A [`Form`](form::Form) is a list of monomials, products of (derivatives of) basis functions
//! integrated over cells or facets. The [`FormCompiler`](compiler::FormCompiler) turns every
//! integral of a form into a routine computing the element tensor of a cell or facet, using
//! either the quadrature representation ([`codegen`]) or the tensor representation
//! ([`tensor`]).
pub mod basis;
pub mod cell;
pub mod codegen;
pub mod compiler;
pub mod derivatives;
pub mod element;
pub mod error;
pub mod expr;
pub mod form;
pub mod format;
pub mod geometry;
pub mod index;
pub mod quadrature;
pub mod tensor;

pub use compiler::{CompiledForm, FormCompiler, GeneratorOptions, Representation};
pub use error::CompileError;

pub extern crate nalgebra;
