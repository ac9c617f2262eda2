//! Index algebra for reference, geometry and element tensors.
//!
//! An element tensor `A_i = sum_a A0_ia GK_a` has a *primary* multi-index `i` ranging over the
//! basis functions of the arguments and a *secondary* multi-index `a` which is contracted.
//! Indices are allocated from an [`IndexContext`], which owns one counter per free index kind.
use crate::error::CompileError;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of an [`Index`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    Fixed,
    Primary,
    Secondary,
}

impl FromStr for IndexKind {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fixed" => Ok(Self::Fixed),
            "primary" => Ok(Self::Primary),
            "secondary" => Ok(Self::Secondary),
            other => Err(CompileError::UnknownIndexKind(other.to_string())),
        }
    }
}

/// A tensor index.
///
/// Free indices carry the identifier they were allocated with; the identifier is the position
/// in the multi-index they are resolved against.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Index {
    Fixed(usize),
    Primary(usize),
    Secondary(usize),
}

impl Index {
    pub fn kind(&self) -> IndexKind {
        match self {
            Self::Fixed(_) => IndexKind::Fixed,
            Self::Primary(_) => IndexKind::Primary,
            Self::Secondary(_) => IndexKind::Secondary,
        }
    }

    /// Returns the concrete value of the index.
    ///
    /// Secondary indices are resolved relative to `secondary_offset`, the identifier of the
    /// first secondary index of the term the secondary multi-index belongs to.
    ///
    /// # Panics
    ///
    /// Panics if the multi-index is too short for the identifier of a free index.
    pub fn resolve(&self, primary: &[usize], secondary: &[usize], secondary_offset: usize) -> usize {
        match *self {
            Self::Fixed(value) => value,
            Self::Primary(id) => primary[id],
            Self::Secondary(id) => secondary[id - secondary_offset],
        }
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(value) => write!(f, "{}", value),
            Self::Primary(id) => write!(f, "i{}", id),
            Self::Secondary(id) => write!(f, "a{}", id),
        }
    }
}

/// Owns the counters free indices are allocated from.
///
/// A single context must be used for one compilation at a time and reset before the next one,
/// which makes the generated names reproducible.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexContext {
    next_primary: usize,
    next_secondary: usize,
}

impl IndexContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fixed(&self, value: usize) -> Index {
        Index::Fixed(value)
    }

    pub fn primary(&mut self) -> Index {
        let index = Index::Primary(self.next_primary);
        self.next_primary += 1;
        index
    }

    pub fn secondary(&mut self) -> Index {
        let index = Index::Secondary(self.next_secondary);
        self.next_secondary += 1;
        index
    }

    /// Allocates an index of the given kind.
    ///
    /// `kind` is `"primary"`, `"secondary"` or the decimal value of a fixed index.
    pub fn parse_index(&mut self, kind: &str) -> Result<Index, CompileError> {
        if let Ok(value) = kind.parse::<usize>() {
            return Ok(self.fixed(value));
        }
        match kind.parse::<IndexKind>()? {
            IndexKind::Primary => Ok(self.primary()),
            IndexKind::Secondary => Ok(self.secondary()),
            IndexKind::Fixed => Err(CompileError::UnknownIndexKind(kind.to_string())),
        }
    }

    pub fn reset(&mut self) {
        self.next_primary = 0;
        self.next_secondary = 0;
    }

    /// Number of primary and secondary indices allocated since the last reset.
    pub fn counts(&self) -> (usize, usize) {
        (self.next_primary, self.next_secondary)
    }
}

/// An ordered sequence of indices together with the range of each index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MultiIndex {
    indices: Vec<Index>,
    dims: Vec<usize>,
}

impl MultiIndex {
    /// Creates a multi-index from explicit indices.
    ///
    /// # Panics
    ///
    /// Panics if the number of indices and dimensions differ.
    pub fn new(indices: Vec<Index>, dims: Vec<usize>) -> Self {
        assert_eq!(indices.len(), dims.len(), "Each index needs exactly one dimension.");
        Self { indices, dims }
    }

    /// Allocates one primary index per dimension.
    pub fn primary(context: &mut IndexContext, dims: &[usize]) -> Self {
        let indices = dims.iter().map(|_| context.primary()).collect();
        Self::new(indices, dims.to_vec())
    }

    /// Allocates one secondary index per dimension.
    pub fn secondary(context: &mut IndexContext, dims: &[usize]) -> Self {
        let indices = dims.iter().map(|_| context.secondary()).collect();
        Self::new(indices, dims.to_vec())
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    pub fn rank(&self) -> usize {
        self.indices.len()
    }

    pub fn indices(&self) -> &[Index] {
        &self.indices
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Number of index tuples in the range.
    pub fn num_tuples(&self) -> usize {
        self.dims.iter().product()
    }

    /// Enumerates all index tuples in row-major order.
    ///
    /// A multi-index of rank zero has a single, empty tuple.
    pub fn tuples(&self) -> Vec<Vec<usize>> {
        if self.dims.is_empty() {
            return vec![Vec::new()];
        }
        self.dims
            .iter()
            .map(|&dim| 0..dim)
            .multi_cartesian_product()
            .collect()
    }

    /// Row-major position of a tuple in [`tuples`](Self::tuples).
    pub fn linear_index(&self, tuple: &[usize]) -> usize {
        debug_assert_eq!(tuple.len(), self.dims.len());
        tuple
            .iter()
            .zip(&self.dims)
            .fold(0, |offset, (&value, &dim)| offset * dim + value)
    }

    /// Identifier of the first secondary index, used to resolve secondary indices against
    /// tuples of this multi-index.
    pub fn secondary_offset(&self) -> usize {
        self.indices
            .iter()
            .filter_map(|index| match index {
                Index::Secondary(id) => Some(*id),
                _ => None,
            })
            .min()
            .unwrap_or(0)
    }
}
