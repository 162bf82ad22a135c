use std::collections::BTreeMap;
use std::fmt;

use crate::{
    dim::Dim,
    dimensions::Dimensions,
    errors::{Error, Result},
};

/// What a dataset knows about the extent of one dimension.
///
/// A dimension first seen through a single variable is `Pending`: that variable may be a bin edge
/// coordinate or a data item, and the next insertion on the same dimension decides which. Once
/// decided, the extent is `Known` and holds the number of bins.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Extent {
    Unset,

    /// Only sparse variables use this dimension.
    Sparse,

    /// Extent seen so far, not yet reconciled with a bin edge coordinate.
    Pending(usize),

    /// Logical extent, excluding the extra element of bin edges.
    Known(usize),
}

impl Extent {
    /// Logical extent of a dense dimension.
    pub fn dense(self) -> Option<usize> {
        match self {
            Self::Pending(extent) | Self::Known(extent) => Some(extent),
            Self::Unset | Self::Sparse => None,
        }
    }

    /// Reconcile `self` with a new dense `extent`.
    ///
    /// `is_coord` is set when the incoming variable is the dimension-coordinate of `dim`, in which
    /// case it may be a bin edge coordinate with one extra element.
    ///
    fn reconcile(self, dim: Dim, extent: usize, is_coord: bool) -> Result<Self> {
        let mismatch = |held: usize| {
            Error::length_mismatch(format!(
                "extent {extent} of {dim} does not match extent {held} of the dataset."
            ))
        };

        match self {
            Self::Unset | Self::Sparse => Ok(Self::Pending(extent)),
            Self::Pending(held) => {
                if extent == held {
                    Ok(self)
                } else if is_coord && extent == held + 1 {
                    Ok(Self::Known(held))
                } else if !is_coord && extent + 1 == held {
                    Ok(Self::Known(extent))
                } else {
                    Err(mismatch(held))
                }
            }
            Self::Known(held) => {
                // Bin edges fit in either role. Data one longer than the known extent is
                // tolerated for backward compatibility, a coordinate without the extra edge is not.
                if (!is_coord && extent == held) || extent == held + 1 {
                    Ok(self)
                } else {
                    Err(mismatch(held))
                }
            }
        }
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => write!(f, "unset"),
            Self::Sparse => write!(f, "sparse"),
            Self::Pending(extent) => write!(f, "{extent} (pending)"),
            Self::Known(extent) => write!(f, "{extent}"),
        }
    }
}

/// Authoritative extent of every dimension used by the variables of a dataset.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtentTable {
    extents: BTreeMap<Dim, Extent>,
}

impl ExtentTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, dim: Dim) -> Extent {
        self.extents.get(&dim).copied().unwrap_or(Extent::Unset)
    }

    pub fn contains(&self, dim: Dim) -> bool {
        self.extents.contains_key(&dim)
    }

    pub fn is_empty(&self) -> bool {
        self.extents.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Dim, Extent)> + '_ {
        self.extents.iter().map(|(&dim, &extent)| (dim, extent))
    }

    /// Fold the dimensions of one variable into the table.
    ///
    /// `coord_dim` names the dimension the variable is a coordinate for, if any. Nothing is changed
    /// if any dimension is rejected.
    ///
    pub fn merge(&mut self, dims: &Dimensions, coord_dim: Option<Dim>) -> Result<()> {
        let mut merged = self.extents.clone();
        for (dim, extent) in dims.iter() {
            let held = merged.get(&dim).copied().unwrap_or(Extent::Unset);
            merged.insert(dim, held.reconcile(dim, extent, coord_dim == Some(dim))?);
        }
        if let Some(dim) = dims.sparse_dim() {
            // A sparse extent never overrides what dense variables established.
            merged.entry(dim).or_insert(Extent::Sparse);
        }
        self.extents = merged;

        Ok(())
    }

    /// Logical extents of all dense dimensions.
    pub fn dimensions(&self) -> BTreeMap<Dim, usize> {
        self.extents
            .iter()
            .filter_map(|(&dim, extent)| extent.dense().map(|extent| (dim, extent)))
            .collect()
    }

    /// Dimensions that are only used as sparse dimensions.
    pub fn sparse_dims(&self) -> impl Iterator<Item = Dim> + '_ {
        self.extents
            .iter()
            .filter(|(_, &extent)| extent == Extent::Sparse)
            .map(|(&dim, _)| dim)
    }

    pub fn rename(&mut self, from: Dim, to: Dim) {
        if let Some(extent) = self.extents.remove(&from) {
            self.extents.insert(to, extent);
        }
    }

    pub fn clear(&mut self) {
        self.extents.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(pairs: &[(Dim, usize)]) -> Dimensions {
        Dimensions::from_pairs(pairs).unwrap()
    }

    #[test]
    fn test_first_insertion_is_pending() {
        let mut table = ExtentTable::new();
        assert_eq!(table.get(Dim::X), Extent::Unset);
        table.merge(&dims(&[(Dim::X, 3), (Dim::Y, 0)]), None).unwrap();
        assert_eq!(table.get(Dim::X), Extent::Pending(3));
        assert_eq!(table.get(Dim::Y), Extent::Pending(0));
        assert_eq!(
            table.dimensions(),
            BTreeMap::from([(Dim::X, 3), (Dim::Y, 0)])
        );
    }

    #[test]
    fn test_coord_then_data() {
        let mut table = ExtentTable::new();
        table.merge(&dims(&[(Dim::X, 4)]), Some(Dim::X)).unwrap();
        table.merge(&dims(&[(Dim::X, 3)]), None).unwrap();
        assert_eq!(table.get(Dim::X), Extent::Known(3));

        // Further edges and data fit, anything else does not.
        table.merge(&dims(&[(Dim::X, 4)]), Some(Dim::X)).unwrap();
        table.merge(&dims(&[(Dim::X, 3)]), None).unwrap();
        let err = table.merge(&dims(&[(Dim::X, 5)]), None).unwrap_err();
        assert!(matches!(err, Error::LengthMismatch(_)));
        assert!(err.to_string().starts_with("Length mismatch on insertion"));
    }

    #[test]
    fn test_known_extent_requires_edges_for_coord() {
        let mut table = ExtentTable::new();
        table.merge(&dims(&[(Dim::X, 4)]), None).unwrap();
        table.merge(&dims(&[(Dim::X, 3)]), None).unwrap();
        assert_eq!(table.get(Dim::X), Extent::Known(3));

        let before = table.clone();
        let err = table.merge(&dims(&[(Dim::X, 3)]), Some(Dim::X)).unwrap_err();
        assert!(matches!(err, Error::LengthMismatch(_)));
        assert_eq!(table, before);

        table.merge(&dims(&[(Dim::X, 4)]), Some(Dim::X)).unwrap();
        assert_eq!(table.get(Dim::X), Extent::Known(3));
    }

    #[test]
    fn test_data_then_coord() {
        let mut table = ExtentTable::new();
        table.merge(&dims(&[(Dim::X, 3)]), None).unwrap();
        table.merge(&dims(&[(Dim::X, 4)]), Some(Dim::X)).unwrap();
        assert_eq!(table.get(Dim::X), Extent::Known(3));
        assert_eq!(table.dimensions()[&Dim::X], 3);
    }

    #[test]
    fn test_data_two_longer_fails() {
        let mut table = ExtentTable::new();
        table.merge(&dims(&[(Dim::X, 4)]), Some(Dim::X)).unwrap();
        let err = table.merge(&dims(&[(Dim::X, 5)]), None).unwrap_err();
        assert!(matches!(err, Error::LengthMismatch(_)));

        let mut table = ExtentTable::new();
        table.merge(&dims(&[(Dim::X, 3)]), None).unwrap();
        assert!(table.merge(&dims(&[(Dim::X, 5)]), None).is_err());
        assert!(table.merge(&dims(&[(Dim::X, 2)]), Some(Dim::X)).is_err());
    }

    #[test]
    fn test_coord_for_other_dim_is_not_an_edge() {
        let mut table = ExtentTable::new();
        table.merge(&dims(&[(Dim::X, 3)]), None).unwrap();
        // A 2-d coordinate for `Y` cannot be a bin edge along `X`.
        let err = table
            .merge(&dims(&[(Dim::X, 4), (Dim::Y, 2)]), Some(Dim::Y))
            .unwrap_err();
        assert!(matches!(err, Error::LengthMismatch(_)));
    }

    #[test]
    fn test_known_extent_tolerates_longer_data() {
        // Intentionally permissive: once the bin count is known, data one longer is accepted,
        // while a coordinate two longer is not.
        let mut table = ExtentTable::new();
        table.merge(&dims(&[(Dim::X, 4)]), Some(Dim::X)).unwrap();
        table.merge(&dims(&[(Dim::X, 3)]), None).unwrap();
        table.merge(&dims(&[(Dim::X, 4)]), None).unwrap();
        assert_eq!(table.get(Dim::X), Extent::Known(3));
        assert!(table.merge(&dims(&[(Dim::X, 5)]), Some(Dim::X)).is_err());
    }

    #[test]
    fn test_failed_merge_leaves_table_unchanged() {
        let mut table = ExtentTable::new();
        table.merge(&dims(&[(Dim::X, 3)]), None).unwrap();
        let before = table.clone();
        assert!(table
            .merge(&dims(&[(Dim::Y, 2), (Dim::X, 7)]), None)
            .is_err());
        assert_eq!(table, before);
        assert!(!table.contains(Dim::Y));
    }

    #[test]
    fn test_sparse() {
        let mut table = ExtentTable::new();
        let sparse = Dimensions::with_sparse(&[(Dim::X, 2)], Dim::Tof).unwrap();
        table.merge(&sparse, None).unwrap();
        assert_eq!(table.get(Dim::Tof), Extent::Sparse);
        assert_eq!(table.sparse_dims().collect::<Vec<_>>(), vec![Dim::Tof]);
        assert!(!table.dimensions().contains_key(&Dim::Tof));

        // Dense data decides the extent, later sparse variables do not change it.
        table.merge(&dims(&[(Dim::Tof, 5)]), None).unwrap();
        assert_eq!(table.get(Dim::Tof), Extent::Pending(5));
        table.merge(&sparse, None).unwrap();
        assert_eq!(table.get(Dim::Tof), Extent::Pending(5));
    }

    #[test]
    fn test_rename_and_clear() {
        let mut table = ExtentTable::new();
        table.merge(&dims(&[(Dim::X, 3)]), None).unwrap();
        table.rename(Dim::X, Dim::Z);
        assert_eq!(table.get(Dim::X), Extent::Unset);
        assert_eq!(table.get(Dim::Z), Extent::Pending(3));
        table.clear();
        assert!(table.is_empty());
    }
}
