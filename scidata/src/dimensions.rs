use std::fmt;

use crate::{
    dim::Dim,
    errors::{Error, Result},
    slice::Slice,
};

/// Ordered labels and extents of a variable.
///
/// Dense labels are stored outermost first, so the last label is the innermost (fastest varying)
/// dimension in memory. A variable may additionally have one sparse dimension, which is always
/// innermost, has a per-element length, and does not contribute to the volume.
///
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Dimensions {
    labels: Vec<Dim>,
    shape: Vec<usize>,
    sparse: Option<Dim>,
}

impl Dimensions {
    /// Dimensions of a scalar
    pub fn new() -> Self {
        Self::default()
    }

    /// Build dimensions from `(label, extent)` pairs, outermost first.
    ///
    /// Fails if a label appears twice.
    ///
    pub fn from_pairs(pairs: &[(Dim, usize)]) -> Result<Self> {
        let mut dims = Self::new();
        for &(dim, extent) in pairs {
            dims.add_inner(dim, extent)?;
        }

        Ok(dims)
    }

    /// Build dimensions from dense `(label, extent)` pairs plus a sparse innermost label.
    pub fn with_sparse(pairs: &[(Dim, usize)], sparse: Dim) -> Result<Self> {
        let mut dims = Self::from_pairs(pairs)?;
        dims.add_sparse(sparse)?;

        Ok(dims)
    }

    /// Number of elements, excluding the sparse dimension.
    pub fn volume(&self) -> usize {
        self.shape.iter().product()
    }

    /// Number of dense dimensions.
    pub fn ndim(&self) -> usize {
        self.labels.len()
    }

    /// `true` for a dense scalar.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty() && self.sparse.is_none()
    }

    pub fn labels(&self) -> &[Dim] {
        &self.labels
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn iter(&self) -> impl Iterator<Item = (Dim, usize)> + '_ {
        self.labels.iter().copied().zip(self.shape.iter().copied())
    }

    pub fn sparse_dim(&self) -> Option<Dim> {
        self.sparse
    }

    pub fn is_sparse(&self) -> bool {
        self.sparse.is_some()
    }

    /// Dense copy of these dimensions, with the sparse label dropped.
    pub fn dense(&self) -> Self {
        Self {
            labels: self.labels.clone(),
            shape: self.shape.clone(),
            sparse: None,
        }
    }

    /// Extent of a dense dimension, if present.
    pub fn get(&self, dim: Dim) -> Option<usize> {
        self.index(dim).map(|i| self.shape[i])
    }

    /// Extent of a dense dimension.
    ///
    /// Fails with a dimension error if `dim` is not a dense dimension of `self`.
    ///
    pub fn extent(&self, dim: Dim) -> Result<usize> {
        self.get(dim)
            .ok_or_else(|| Error::dimension(format!("Expected dimension {dim} in {self}.")))
    }

    /// Position of a dense dimension, outermost being 0.
    pub fn index(&self, dim: Dim) -> Option<usize> {
        self.labels.iter().position(|&label| label == dim)
    }

    /// `true` if `dim` is a dense dimension of `self`.
    pub fn contains(&self, dim: Dim) -> bool {
        self.labels.contains(&dim)
    }

    /// `true` if every dimension of `other` is present in `self` with the same extent.
    ///
    /// Order is not taken into account. A sparse dimension of `other` must be the sparse
    /// dimension of `self`.
    ///
    pub fn contains_all(&self, other: &Dimensions) -> bool {
        if other.sparse.is_some() && other.sparse != self.sparse {
            return false;
        }

        other.iter().all(|(dim, extent)| self.get(dim) == Some(extent))
    }

    /// The innermost dense dimension.
    pub fn inner(&self) -> Option<Dim> {
        self.labels.last().copied()
    }

    /// Row major stride of `dim`, in elements.
    pub fn offset(&self, dim: Dim) -> Result<usize> {
        let index = self
            .index(dim)
            .ok_or_else(|| Error::dimension(format!("Expected dimension {dim} in {self}.")))?;

        Ok(self.shape[index + 1..].iter().product())
    }

    /// Row major strides of all dense dimensions, in elements.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1; self.ndim()];
        for i in (0..self.ndim().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * self.shape[i + 1];
        }

        strides
    }

    /// `true` if a block with these dimensions, taken from a buffer laid out according to
    /// `parent`, is a single contiguous stretch of memory.
    ///
    /// That is the case when the labels of `self` are the innermost labels of `parent` and all
    /// extents other than the outermost of `self` match.
    ///
    pub fn is_contiguous_in(&self, parent: &Dimensions) -> bool {
        if parent == self {
            return true;
        }
        if parent.ndim() < self.ndim() {
            return false;
        }

        let offset = parent.ndim() - self.ndim();
        for i in 0..self.ndim() {
            if parent.labels[i + offset] != self.labels[i] {
                return false;
            }
            if i > 0 && parent.shape[i + offset] != self.shape[i] {
                return false;
            }
        }

        true
    }

    /// Add a new outermost dimension.
    pub fn add(&mut self, dim: Dim, extent: usize) -> Result<()> {
        self.check_new_label(dim)?;
        self.labels.insert(0, dim);
        self.shape.insert(0, extent);

        Ok(())
    }

    /// Add a new innermost dense dimension.
    pub fn add_inner(&mut self, dim: Dim, extent: usize) -> Result<()> {
        self.check_new_label(dim)?;
        self.labels.push(dim);
        self.shape.push(extent);

        Ok(())
    }

    /// Mark `dim` as the sparse dimension.
    pub fn add_sparse(&mut self, dim: Dim) -> Result<()> {
        if self.sparse.is_some() {
            return Err(Error::dimension(format!(
                "Cannot add sparse dimension {dim} to {self}, there is one already."
            )));
        }
        self.check_new_label(dim)?;
        self.sparse = Some(dim);

        Ok(())
    }

    /// Change the extent of an existing dense dimension.
    pub fn resize(&mut self, dim: Dim, extent: usize) -> Result<()> {
        let index = self
            .index(dim)
            .ok_or_else(|| Error::dimension(format!("Cannot resize {dim}, not in {self}.")))?;
        self.shape[index] = extent;

        Ok(())
    }

    /// Remove a dense or sparse dimension.
    pub fn erase(&mut self, dim: Dim) -> Result<()> {
        if self.sparse == Some(dim) {
            self.sparse = None;
            return Ok(());
        }

        let index = self
            .index(dim)
            .ok_or_else(|| Error::dimension(format!("Cannot erase {dim}, not in {self}.")))?;
        self.labels.remove(index);
        self.shape.remove(index);

        Ok(())
    }

    /// Replace label `from` by `to`. No-op if `from` is not present.
    pub fn relabel(&mut self, from: Dim, to: Dim) -> Result<()> {
        if from == to {
            return Ok(());
        }
        if let Some(index) = self.index(from) {
            self.check_new_label(to)?;
            self.labels[index] = to;
        } else if self.sparse == Some(from) {
            self.check_new_label(to)?;
            self.sparse = Some(to);
        }

        Ok(())
    }

    /// Validate `slice` against these dimensions.
    pub fn check_slice(&self, slice: &Slice) -> Result<()> {
        let valid = match (self.get(slice.dim()), slice.end()) {
            (Some(extent), None) => slice.begin() < extent,
            (Some(extent), Some(end)) => slice.begin() <= end && end <= extent,
            (None, _) => false,
        };

        if valid {
            Ok(())
        } else {
            Err(Error::dimension(format!(
                "Expected {slice} to be in {self}."
            )))
        }
    }

    /// Dimensions of the result of applying `slice`.
    pub fn slice(&self, slice: &Slice) -> Result<Dimensions> {
        self.check_slice(slice)?;
        let mut dims = self.clone();
        match slice.end() {
            None => dims.erase(slice.dim())?,
            Some(end) => dims.resize(slice.dim(), end - slice.begin())?,
        }

        Ok(dims)
    }

    /// Union of `self` and `other`. Labels only in `other` are added as outer dimensions, keeping
    /// their relative order.
    ///
    /// Fails if a shared label has different extents.
    ///
    pub fn merge(&self, other: &Dimensions) -> Result<Dimensions> {
        let mut out = self.clone();
        for (&dim, &extent) in other.labels.iter().zip(&other.shape).rev() {
            match self.get(dim) {
                Some(own) if own != extent => {
                    return Err(Error::dimension(format!(
                        "Cannot merge {self} and {other}, extents of {dim} differ."
                    )));
                }
                Some(_) => {}
                None => out.add(dim, extent)?,
            }
        }

        Ok(out)
    }

    fn check_new_label(&self, dim: Dim) -> Result<()> {
        if self.contains(dim) || self.sparse == Some(dim) {
            Err(Error::dimension(format!("Duplicate dimension {dim} in {self}.")))
        } else {
            Ok(())
        }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (dim, extent)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{dim}: {extent}")?;
        }
        if let Some(dim) = self.sparse {
            if !self.labels.is_empty() {
                write!(f, ", ")?;
            }
            write!(f, "{dim}: sparse")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xyz() -> Dimensions {
        Dimensions::from_pairs(&[(Dim::X, 4), (Dim::Y, 3), (Dim::Z, 2)]).unwrap()
    }

    #[test]
    fn test_equality_respects_order() {
        let a = Dimensions::from_pairs(&[(Dim::X, 2), (Dim::Y, 3)]).unwrap();
        let b = Dimensions::from_pairs(&[(Dim::Y, 3), (Dim::X, 2)]).unwrap();
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert!(a.contains_all(&b));
        assert!(b.contains_all(&a));
    }

    #[test]
    fn test_equality_sparse() {
        let a = Dimensions::with_sparse(&[(Dim::X, 2)], Dim::Tof).unwrap();
        let b = Dimensions::from_pairs(&[(Dim::X, 2)]).unwrap();
        let c = Dimensions::with_sparse(&[(Dim::X, 2)], Dim::Energy).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, Dimensions::with_sparse(&[(Dim::X, 2)], Dim::Tof).unwrap());
        assert_eq!(a.volume(), 2);
        assert_eq!(a.dense(), b);
    }

    #[test]
    fn test_duplicate_label() {
        let err = Dimensions::from_pairs(&[(Dim::X, 2), (Dim::X, 3)]).unwrap_err();
        assert!(matches!(err, Error::Dimension(_)));
        assert!(Dimensions::with_sparse(&[(Dim::X, 2)], Dim::X).is_err());
    }

    #[test]
    fn test_volume_and_strides() {
        let dims = xyz();
        assert_eq!(dims.volume(), 24);
        assert_eq!(dims.strides(), vec![6, 2, 1]);
        assert_eq!(dims.offset(Dim::X).unwrap(), 6);
        assert_eq!(dims.offset(Dim::Z).unwrap(), 1);
        assert!(dims.offset(Dim::Tof).is_err());
        assert_eq!(Dimensions::new().volume(), 1);
        assert_eq!(dims.inner(), Some(Dim::Z));
    }

    #[test]
    fn test_add_resize_erase() {
        let mut dims = Dimensions::new();
        dims.add(Dim::X, 2).unwrap();
        dims.add(Dim::Y, 3).unwrap();
        assert_eq!(dims.labels(), &[Dim::Y, Dim::X]);
        dims.add_inner(Dim::Z, 4).unwrap();
        assert_eq!(dims.labels(), &[Dim::Y, Dim::X, Dim::Z]);
        dims.resize(Dim::X, 5).unwrap();
        assert_eq!(dims.get(Dim::X), Some(5));
        dims.erase(Dim::Y).unwrap();
        assert_eq!(dims.shape(), &[5, 4]);
        assert!(dims.erase(Dim::Y).is_err());
        assert!(dims.resize(Dim::Tof, 1).is_err());
    }

    #[test]
    fn test_relabel() {
        let mut dims = xyz();
        dims.relabel(Dim::Y, Dim::Tof).unwrap();
        assert_eq!(dims.labels(), &[Dim::X, Dim::Tof, Dim::Z]);
        assert!(dims.relabel(Dim::X, Dim::Z).is_err());
        dims.relabel(Dim::Energy, Dim::Q).unwrap();
        assert_eq!(dims.labels(), &[Dim::X, Dim::Tof, Dim::Z]);
    }

    #[test]
    fn test_is_contiguous_in() {
        let parent = xyz();
        let yz = Dimensions::from_pairs(&[(Dim::Y, 3), (Dim::Z, 2)]).unwrap();
        let y1z = Dimensions::from_pairs(&[(Dim::Y, 1), (Dim::Z, 2)]).unwrap();
        let x2yz = Dimensions::from_pairs(&[(Dim::X, 2), (Dim::Y, 3), (Dim::Z, 2)]).unwrap();
        let xz = Dimensions::from_pairs(&[(Dim::X, 4), (Dim::Z, 2)]).unwrap();
        let z1 = Dimensions::from_pairs(&[(Dim::Z, 1)]).unwrap();
        assert!(parent.is_contiguous_in(&parent));
        assert!(yz.is_contiguous_in(&parent));
        assert!(y1z.is_contiguous_in(&parent));
        assert!(x2yz.is_contiguous_in(&parent));
        assert!(z1.is_contiguous_in(&parent));
        assert!(!xz.is_contiguous_in(&parent));
        assert!(!parent.is_contiguous_in(&yz));
    }

    #[test]
    fn test_slice() {
        let dims = xyz();
        let sliced = dims.slice(&Slice::index(Dim::Y, 2)).unwrap();
        assert_eq!(sliced, Dimensions::from_pairs(&[(Dim::X, 4), (Dim::Z, 2)]).unwrap());
        let sliced = dims.slice(&Slice::range(Dim::X, 1, 3)).unwrap();
        assert_eq!(sliced.shape(), &[2, 3, 2]);
        let empty = dims.slice(&Slice::range(Dim::X, 4, 4)).unwrap();
        assert_eq!(empty.volume(), 0);

        assert!(dims.slice(&Slice::index(Dim::Y, 3)).is_err());
        assert!(dims.slice(&Slice::range(Dim::X, 3, 5)).is_err());
        assert!(dims.slice(&Slice::range(Dim::X, 3, 2)).is_err());
        assert!(dims.slice(&Slice::index(Dim::Tof, 0)).is_err());
    }

    #[test]
    fn test_merge() {
        let a = Dimensions::from_pairs(&[(Dim::X, 2)]).unwrap();
        let b = Dimensions::from_pairs(&[(Dim::Y, 3), (Dim::X, 2)]).unwrap();
        assert_eq!(a.merge(&b).unwrap(), b);
        let yz = Dimensions::from_pairs(&[(Dim::Y, 3), (Dim::Z, 4)]).unwrap();
        assert_eq!(
            a.merge(&yz).unwrap(),
            Dimensions::from_pairs(&[(Dim::Y, 3), (Dim::Z, 4), (Dim::X, 2)]).unwrap()
        );
        let c = Dimensions::from_pairs(&[(Dim::X, 3)]).unwrap();
        assert!(a.merge(&c).is_err());
    }

    #[test]
    fn test_display() {
        let dims = Dimensions::with_sparse(&[(Dim::X, 2)], Dim::Tof).unwrap();
        assert_eq!(format!("{dims}"), "{Dim::X: 2, Dim::Tof: sparse}");
    }
}
