use std::fmt;

use crate::dim::Dim;

/// Selects part of one dimension: a single index, which drops the dimension, or a half open
/// range, which keeps it with reduced extent.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Slice {
    dim: Dim,
    begin: usize,
    end: Option<usize>,
}

impl Slice {
    /// Select a single position along `dim`. The dimension is removed from the result.
    pub fn index(dim: Dim, index: usize) -> Self {
        Self {
            dim,
            begin: index,
            end: None,
        }
    }

    /// Select `begin..end` along `dim`. The dimension is kept with extent `end - begin`.
    pub fn range(dim: Dim, begin: usize, end: usize) -> Self {
        Self {
            dim,
            begin,
            end: Some(end),
        }
    }

    pub fn dim(&self) -> Dim {
        self.dim
    }

    pub fn begin(&self) -> usize {
        self.begin
    }

    pub fn end(&self) -> Option<usize> {
        self.end
    }

    pub fn is_range(&self) -> bool {
        self.end.is_some()
    }
}

impl fmt::Display for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            None => write!(f, "Slice({}, {})", self.dim, self.begin),
            Some(end) => write!(f, "Slice({}, {}, {})", self.dim, self.begin, end),
        }
    }
}
