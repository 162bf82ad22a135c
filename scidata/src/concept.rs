//! Type erased element storage.
//!
//! A variable holds its elements in a [`VariableConcept`], a tagged union with one owning
//! `ndarray` array per element type. Slices of a variable are expressed as [`ConceptView`] and
//! [`ConceptViewMut`], the same union over borrowed strided views. Every operation dispatches on
//! the tag once and then runs a monomorphic loop, so a dtype mismatch is detected before any
//! element is touched.
//!
//! Owned arrays are always in standard (row major) layout, matching the order of the labels in
//! the variable's [`Dimensions`].

use std::{fmt::Debug, mem, ops::Range};

use ndarray::{
    arr0, ArrayBase, ArrayD, ArrayViewD, ArrayViewMutD, Axis, IxDyn, RawData, Slice as AxisSlice,
    Zip,
};
use num_traits::{cast, Float};
use rayon::prelude::*;

use crate::{
    config,
    dimensions::Dimensions,
    dtype::{Capability, DType, Vector3d},
    errors::{Error, Result},
};

/// An element type that can be stored in a variable.
///
/// The methods are checked casts between the erased storage and concrete `ndarray` types.
/// They return `None` if the storage holds a different element type.
///
pub trait Element: Clone + Debug + Default + PartialEq + Send + Sync + 'static {
    const DTYPE: DType;

    fn wrap(array: ArrayD<Self>) -> VariableConcept;
    fn cast(concept: &VariableConcept) -> Option<&ArrayD<Self>>;
    fn cast_mut(concept: &mut VariableConcept) -> Option<&mut ArrayD<Self>>;
    fn cast_view(view: ConceptView<'_>) -> Option<ArrayViewD<'_, Self>>;
    fn cast_view_mut(view: ConceptViewMut<'_>) -> Option<ArrayViewMutD<'_, Self>>;
}

/// Owning storage, one contiguous buffer sized to the volume of the variable.
#[derive(Clone, Debug, PartialEq)]
pub enum VariableConcept {
    F64(ArrayD<f64>),
    F32(ArrayD<f32>),
    I64(ArrayD<i64>),
    I32(ArrayD<i32>),
    Bool(ArrayD<bool>),
    String(ArrayD<String>),
    Vector3d(ArrayD<Vector3d>),
    SparseF64(ArrayD<Vec<f64>>),
    SparseF32(ArrayD<Vec<f32>>),
}

/// Read-only strided view into a [`VariableConcept`].
#[derive(Clone, Debug)]
pub enum ConceptView<'a> {
    F64(ArrayViewD<'a, f64>),
    F32(ArrayViewD<'a, f32>),
    I64(ArrayViewD<'a, i64>),
    I32(ArrayViewD<'a, i32>),
    Bool(ArrayViewD<'a, bool>),
    String(ArrayViewD<'a, String>),
    Vector3d(ArrayViewD<'a, Vector3d>),
    SparseF64(ArrayViewD<'a, Vec<f64>>),
    SparseF32(ArrayViewD<'a, Vec<f32>>),
}

/// Mutable strided view into a [`VariableConcept`]. Views never change the shape of the storage
/// they borrow.
#[derive(Debug)]
pub enum ConceptViewMut<'a> {
    F64(ArrayViewMutD<'a, f64>),
    F32(ArrayViewMutD<'a, f32>),
    I64(ArrayViewMutD<'a, i64>),
    I32(ArrayViewMutD<'a, i32>),
    Bool(ArrayViewMutD<'a, bool>),
    String(ArrayViewMutD<'a, String>),
    Vector3d(ArrayViewMutD<'a, Vector3d>),
    SparseF64(ArrayViewMutD<'a, Vec<f64>>),
    SparseF32(ArrayViewMutD<'a, Vec<f32>>),
}

/// In-place element-wise operation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    fn capability(self) -> Capability {
        match self {
            Self::Add => Capability::Addable,
            _ => Capability::Arithmetic,
        }
    }
}

macro_rules! element {
    ($type:ty, $variant:ident) => {
        impl Element for $type {
            const DTYPE: DType = DType::$variant;

            fn wrap(array: ArrayD<Self>) -> VariableConcept {
                VariableConcept::$variant(array)
            }

            fn cast(concept: &VariableConcept) -> Option<&ArrayD<Self>> {
                match concept {
                    VariableConcept::$variant(array) => Some(array),
                    _ => None,
                }
            }

            fn cast_mut(concept: &mut VariableConcept) -> Option<&mut ArrayD<Self>> {
                match concept {
                    VariableConcept::$variant(array) => Some(array),
                    _ => None,
                }
            }

            fn cast_view(view: ConceptView<'_>) -> Option<ArrayViewD<'_, Self>> {
                match view {
                    ConceptView::$variant(array) => Some(array),
                    _ => None,
                }
            }

            fn cast_view_mut(view: ConceptViewMut<'_>) -> Option<ArrayViewMutD<'_, Self>> {
                match view {
                    ConceptViewMut::$variant(array) => Some(array),
                    _ => None,
                }
            }
        }
    };
}

element!(f64, F64);
element!(f32, F32);
element!(i64, I64);
element!(i32, I32);
element!(bool, Bool);
element!(String, String);
element!(Vector3d, Vector3d);
element!(Vec<f64>, SparseF64);
element!(Vec<f32>, SparseF32);

/// Run `$body` with `$inner` bound to the array of whatever variant `$value` is.
macro_rules! dispatch {
    ($enum:ident, $value:expr, $inner:ident => $body:expr) => {
        match $value {
            $enum::F64($inner) => $body,
            $enum::F32($inner) => $body,
            $enum::I64($inner) => $body,
            $enum::I32($inner) => $body,
            $enum::Bool($inner) => $body,
            $enum::String($inner) => $body,
            $enum::Vector3d($inner) => $body,
            $enum::SparseF64($inner) => $body,
            $enum::SparseF32($inner) => $body,
        }
    };
}

/// Like `dispatch!`, wrapping the result back into the same variant of `$to`.
macro_rules! map_concept {
    ($from:ident => $to:ident, $value:expr, $inner:ident => $body:expr) => {
        match $value {
            $from::F64($inner) => $to::F64($body),
            $from::F32($inner) => $to::F32($body),
            $from::I64($inner) => $to::I64($body),
            $from::I32($inner) => $to::I32($body),
            $from::Bool($inner) => $to::Bool($body),
            $from::String($inner) => $to::String($body),
            $from::Vector3d($inner) => $to::Vector3d($body),
            $from::SparseF64($inner) => $to::SparseF64($body),
            $from::SparseF32($inner) => $to::SparseF32($body),
        }
    };
}

/// Match a pair of operands holding the same element type.
macro_rules! pairwise {
    ($lhs:ident, $rhs:ident, $value:expr, ($a:ident, $b:ident) => $body:expr, $fallback:pat => $otherwise:expr) => {
        match $value {
            ($lhs::F64($a), $rhs::F64($b)) => $body,
            ($lhs::F32($a), $rhs::F32($b)) => $body,
            ($lhs::I64($a), $rhs::I64($b)) => $body,
            ($lhs::I32($a), $rhs::I32($b)) => $body,
            ($lhs::Bool($a), $rhs::Bool($b)) => $body,
            ($lhs::String($a), $rhs::String($b)) => $body,
            ($lhs::Vector3d($a), $rhs::Vector3d($b)) => $body,
            ($lhs::SparseF64($a), $rhs::SparseF64($b)) => $body,
            ($lhs::SparseF32($a), $rhs::SparseF32($b)) => $body,
            $fallback => $otherwise,
        }
    };
}

/// Apply one of the arithmetic operators element-wise, selected at runtime.
macro_rules! arithmetic {
    ($op:expr, $apply:ident ( $($arg:expr),* )) => {
        match $op {
            BinaryOp::Add => $apply($($arg,)* &|x, y| *x += *y),
            BinaryOp::Sub => $apply($($arg,)* &|x, y| *x -= *y),
            BinaryOp::Mul => $apply($($arg,)* &|x, y| *x *= *y),
            BinaryOp::Div => $apply($($arg,)* &|x, y| *x /= *y),
        }
    };
}

impl VariableConcept {
    /// Default initialized storage: zeros for numbers, empty strings and empty event lists.
    pub fn zeros(dtype: DType, shape: &[usize]) -> Self {
        let shape = IxDyn(shape);
        match dtype {
            DType::F64 => Self::F64(ArrayD::default(shape)),
            DType::F32 => Self::F32(ArrayD::default(shape)),
            DType::I64 => Self::I64(ArrayD::default(shape)),
            DType::I32 => Self::I32(ArrayD::default(shape)),
            DType::Bool => Self::Bool(ArrayD::default(shape)),
            DType::String => Self::String(ArrayD::default(shape)),
            DType::Vector3d => Self::Vector3d(ArrayD::default(shape)),
            DType::SparseF64 => Self::SparseF64(ArrayD::default(shape)),
            DType::SparseF32 => Self::SparseF32(ArrayD::default(shape)),
        }
    }

    /// 0-d storage holding `value`, for combining with storage of type `dtype`.
    ///
    /// Numbers are converted to `dtype`. 3-vectors are combined with plain `f64` factors.
    ///
    pub fn scalar(dtype: DType, value: f64) -> Result<Self> {
        let unrepresentable = || Error::type_error(format!("Cannot represent {value} as {dtype}."));
        if matches!(dtype, DType::I64 | DType::I32) && value.fract() != 0.0 {
            return Err(unrepresentable());
        }
        match dtype {
            DType::F64 | DType::Vector3d => Ok(Self::F64(arr0(value).into_dyn())),
            DType::F32 => Ok(Self::F32(
                arr0(cast::<f64, f32>(value).ok_or_else(unrepresentable)?).into_dyn(),
            )),
            DType::I64 => Ok(Self::I64(
                arr0(cast::<f64, i64>(value).ok_or_else(unrepresentable)?).into_dyn(),
            )),
            DType::I32 => Ok(Self::I32(
                arr0(cast::<f64, i32>(value).ok_or_else(unrepresentable)?).into_dyn(),
            )),
            _ => Err(Error::type_error(format!(
                "Cannot apply operation with scalar to {dtype}."
            ))),
        }
    }

    pub fn dtype(&self) -> DType {
        self.view().dtype()
    }

    pub fn len(&self) -> usize {
        dispatch!(VariableConcept, self, array => array.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn view(&self) -> ConceptView<'_> {
        map_concept!(VariableConcept => ConceptView, self, array => array.view())
    }

    pub fn view_mut(&mut self) -> ConceptViewMut<'_> {
        map_concept!(VariableConcept => ConceptViewMut, self, array => array.view_mut())
    }

    /// Same elements in a new shape of equal volume.
    pub fn into_shape(self, shape: &[usize]) -> Result<Self> {
        let volume: usize = shape.iter().product();
        if volume != self.len() {
            return Err(Error::dimension(format!(
                "Cannot reshape to dimensions with different volume, {} != {volume}.",
                self.len()
            )));
        }

        dispatch!(VariableConcept, self, array => array
            .into_shape(IxDyn(shape))
            .map(Element::wrap)
            .map_err(|err| Error::dimension(err.to_string())))
    }
}

impl<'a> ConceptView<'a> {
    pub fn dtype(&self) -> DType {
        match self {
            Self::F64(_) => DType::F64,
            Self::F32(_) => DType::F32,
            Self::I64(_) => DType::I64,
            Self::I32(_) => DType::I32,
            Self::Bool(_) => DType::Bool,
            Self::String(_) => DType::String,
            Self::Vector3d(_) => DType::Vector3d,
            Self::SparseF64(_) => DType::SparseF64,
            Self::SparseF32(_) => DType::SparseF32,
        }
    }

    pub fn shape(&self) -> &[usize] {
        dispatch!(ConceptView, self, array => array.shape())
    }

    pub fn len(&self) -> usize {
        dispatch!(ConceptView, self, array => array.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `true` if the view covers a single contiguous stretch in row major order.
    pub fn is_contiguous(&self) -> bool {
        dispatch!(ConceptView, self, array => array.is_standard_layout())
    }

    /// Deep copy into owned storage in standard layout.
    pub fn to_owned(&self) -> VariableConcept {
        map_concept!(ConceptView => VariableConcept, self, array => array
            .as_standard_layout()
            .into_owned())
    }

    /// Restrict the view along `axis`: a single index removes the axis, a range keeps it.
    pub fn select_axis(self, axis: usize, begin: usize, end: Option<usize>) -> Self {
        map_concept!(ConceptView => ConceptView, self, array => select(array, axis, begin, end))
    }

    /// Reorder the axes to follow `target`, inserting length one axes for labels of `target`
    /// missing in `dims`.
    pub fn align(self, dims: &Dimensions, target: &Dimensions) -> Result<Self> {
        Ok(map_concept!(ConceptView => ConceptView, self, array => align_axes(array, dims, target)?))
    }

    /// Gather the positions `indices` along `axis` into new storage.
    pub fn gather(&self, axis: usize, indices: &[usize]) -> VariableConcept {
        map_concept!(ConceptView => VariableConcept, self, array => standard(
            array.select(Axis(axis), indices)
        ))
    }

    /// Address range spanned by the elements of this view.
    pub fn memory_span(&self) -> Range<usize> {
        dispatch!(ConceptView, self, array => memory_span(array))
    }

    /// `true` if both views could share memory.
    pub fn overlaps(&self, other: &ConceptView) -> bool {
        let (a, b) = (self.memory_span(), other.memory_span());
        !a.is_empty() && !b.is_empty() && a.start < b.end && b.start < a.end
    }

    /// Element-wise equality of views with equal shape and type.
    pub fn equals(&self, other: &ConceptView) -> bool {
        pairwise!(ConceptView, ConceptView, (self, other), (a, b) => array_equal(a, b), _ => false)
    }

    /// Magnitude of each element: absolute values for numbers, Euclidean norm for 3-vectors.
    pub fn norm(&self) -> Result<VariableConcept> {
        match self {
            Self::F64(array) => Ok(VariableConcept::F64(standard(array.mapv(f64::abs)))),
            Self::F32(array) => Ok(VariableConcept::F32(standard(array.mapv(f32::abs)))),
            Self::I64(array) => Ok(VariableConcept::I64(standard(array.mapv(|x| x.abs())))),
            Self::I32(array) => Ok(VariableConcept::I32(standard(array.mapv(|x| x.abs())))),
            Self::Vector3d(array) => Ok(VariableConcept::F64(standard(array.map(Vector3d::norm)))),
            other => Err(requires(other.dtype(), Capability::Arithmetic)),
        }
    }
}

/// Join two views along `axis`. Both must hold the same element type and have equal extents
/// along all other axes.
pub fn concatenate(axis: usize, a: &ConceptView, b: &ConceptView) -> Result<VariableConcept> {
    pairwise!(ConceptView, ConceptView, (a, b), (a, b) => ndarray::concatenate(
            Axis(axis),
            &[a.view(), b.view()]
        )
        .map(|array| Element::wrap(standard(array)))
        .map_err(|err| Error::dimension(format!("Cannot concatenate: {err}"))),
        (a, b) => Err(Error::dtype_mismatch(a.dtype(), b.dtype())))
}

impl<'a> ConceptViewMut<'a> {
    pub fn dtype(&self) -> DType {
        self.reborrow().dtype()
    }

    /// Read-only view of the same elements.
    pub fn reborrow(&self) -> ConceptView<'_> {
        map_concept!(ConceptViewMut => ConceptView, self, array => array.view())
    }

    pub fn select_axis(self, axis: usize, begin: usize, end: Option<usize>) -> Self {
        map_concept!(ConceptViewMut => ConceptViewMut, self, array => select(array, axis, begin, end))
    }

    /// Copy `other` into `self`, broadcasting `other` if it has fewer dimensions.
    pub fn assign(&mut self, dims: &Dimensions, other: &ConceptView, other_dims: &Dimensions) -> Result<()> {
        pairwise!(ConceptViewMut, ConceptView, (self, other), (a, b) => apply_in_place(
                a, dims, b, other_dims, &|x, y| x.clone_from(y)
            ),
            (a, b) => Err(Error::dtype_mismatch(a.dtype(), b.dtype())))
    }

    /// Apply `op` element-wise with `other` as right hand side.
    ///
    /// `other` is broadcast over dimensions of `self` it lacks. Dimensions of `other` that `self`
    /// lacks are accumulated into `self`, which is how reductions are implemented.
    ///
    pub fn apply(
        &mut self,
        op: BinaryOp,
        dims: &Dimensions,
        other: &ConceptView,
        other_dims: &Dimensions,
    ) -> Result<()> {
        match (self, other, op) {
            (Self::F64(a), ConceptView::F64(b), _) => arithmetic!(op, apply_in_place(a, dims, b, other_dims)),
            (Self::F32(a), ConceptView::F32(b), _) => arithmetic!(op, apply_in_place(a, dims, b, other_dims)),
            (Self::I64(a), ConceptView::I64(b), _) => arithmetic!(op, apply_in_place(a, dims, b, other_dims)),
            (Self::I32(a), ConceptView::I32(b), _) => arithmetic!(op, apply_in_place(a, dims, b, other_dims)),
            (Self::Vector3d(a), ConceptView::Vector3d(b), BinaryOp::Add | BinaryOp::Sub) => {
                arithmetic!(op, apply_in_place(a, dims, b, other_dims))
            }
            (Self::Vector3d(a), ConceptView::F64(b), BinaryOp::Mul) => {
                apply_in_place(a, dims, b, other_dims, &|x, y| *x *= *y)
            }
            (Self::Vector3d(a), ConceptView::F64(b), BinaryOp::Div) => {
                apply_in_place(a, dims, b, other_dims, &|x, y| *x /= *y)
            }
            (Self::SparseF64(a), ConceptView::SparseF64(b), BinaryOp::Add) => {
                apply_in_place(a, dims, b, other_dims, &|x, y| x.extend_from_slice(y))
            }
            (Self::SparseF32(a), ConceptView::SparseF32(b), BinaryOp::Add) => {
                apply_in_place(a, dims, b, other_dims, &|x, y| x.extend_from_slice(y))
            }
            (lhs, rhs, op) => Err(incompatible(lhs.dtype(), rhs.dtype(), op.capability())),
        }
    }

    /// Apply `op` between two ranges of the same storage along `axis`, `target op= source`.
    ///
    /// If the memory spanned by the two ranges intersects, the source range is copied first.
    ///
    pub fn apply_within(
        &mut self,
        op: BinaryOp,
        dims: &Dimensions,
        axis: usize,
        target: Range<usize>,
        source: Range<usize>,
    ) -> Result<()> {
        match self {
            Self::F64(a) => arithmetic!(op, apply_within(a, dims, axis, target, source)),
            Self::F32(a) => arithmetic!(op, apply_within(a, dims, axis, target, source)),
            Self::I64(a) => arithmetic!(op, apply_within(a, dims, axis, target, source)),
            Self::I32(a) => arithmetic!(op, apply_within(a, dims, axis, target, source)),
            Self::Vector3d(a) => arithmetic!(op, apply_within(a, dims, axis, target, source)),
            other => Err(requires(other.dtype(), Capability::Arithmetic)),
        }
    }

    pub fn sqrt(&mut self) -> Result<()> {
        match self {
            Self::F64(a) => a.mapv_inplace(f64::sqrt),
            Self::F32(a) => a.mapv_inplace(f32::sqrt),
            other => return Err(requires(other.dtype(), Capability::FloatingPoint)),
        }

        Ok(())
    }

    /// Replace each element `x` by `value / x`.
    pub fn reciprocal_times(&mut self, value: f64) -> Result<()> {
        match self {
            Self::F64(a) => reciprocal_times(a, value),
            Self::F32(a) => reciprocal_times(a, value),
            other => Err(requires(other.dtype(), Capability::FloatingPoint)),
        }
    }
}

pub(crate) fn requires(dtype: DType, capability: Capability) -> Error {
    Error::type_error(format!(
        "Cannot apply operation, requires {capability} type, got {dtype}."
    ))
}

fn incompatible(lhs: DType, rhs: DType, capability: Capability) -> Error {
    if lhs.supports(capability) {
        Error::dtype_mismatch(lhs, rhs)
    } else {
        requires(lhs, capability)
    }
}

/// Convert to standard layout if not already.
fn standard<T: Clone>(array: ArrayD<T>) -> ArrayD<T> {
    if array.is_standard_layout() {
        array
    } else {
        array.as_standard_layout().into_owned()
    }
}

fn select<S: RawData>(
    mut array: ArrayBase<S, IxDyn>,
    axis: usize,
    begin: usize,
    end: Option<usize>,
) -> ArrayBase<S, IxDyn> {
    match end {
        None => array.index_axis_move(Axis(axis), begin),
        Some(end) => {
            array.slice_axis_inplace(Axis(axis), AxisSlice::new(begin as isize, Some(end as isize), 1));
            array
        }
    }
}

fn array_equal<T: PartialEq>(a: &ArrayViewD<T>, b: &ArrayViewD<T>) -> bool {
    if a.shape() != b.shape() {
        return false;
    }
    match (a.as_slice(), b.as_slice()) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}

fn memory_span<A, S: RawData<Elem = A>>(array: &ArrayBase<S, IxDyn>) -> Range<usize> {
    let size = mem::size_of::<A>() as isize;
    if array.is_empty() || size == 0 {
        return 0..0;
    }

    let (mut low, mut high) = (0isize, 0isize);
    for (&len, &stride) in array.shape().iter().zip(array.strides()) {
        let extent = (len as isize - 1) * stride;
        if extent < 0 {
            low += extent;
        } else {
            high += extent;
        }
    }

    let ptr = array.as_ptr() as isize;
    (ptr + low * size) as usize..(ptr + (high + 1) * size) as usize
}

/// Reorder the axes of `view` (labelled by `dims`) to follow the labels of `target`, inserting
/// length one axes for labels missing in `dims`.
pub(crate) fn align_axes<'a, T>(
    view: ArrayViewD<'a, T>,
    dims: &Dimensions,
    target: &Dimensions,
) -> Result<ArrayViewD<'a, T>> {
    let order: Vec<usize> = target
        .labels()
        .iter()
        .filter_map(|&dim| dims.index(dim))
        .collect();
    if order.len() != dims.ndim() {
        return Err(Error::dimension(format!(
            "Cannot broadcast {dims} to {target}."
        )));
    }

    let mut view = view.permuted_axes(IxDyn(&order));
    for (i, &dim) in target.labels().iter().enumerate() {
        if !dims.contains(dim) {
            view = view.insert_axis(Axis(i));
        }
    }

    Ok(view)
}

pub(crate) fn broadcast<'b, T>(aligned: &'b ArrayViewD<'_, T>, target: &Dimensions) -> Result<ArrayViewD<'b, T>> {
    aligned
        .broadcast(IxDyn(target.shape()))
        .ok_or_else(|| Error::dimension(format!("Cannot broadcast {:?} to {target}.", aligned.shape())))
}

/// Apply `op(lhs_element, rhs_element)` for all elements of `lhs`.
///
/// Four paths exist depending on which operands are contiguous with matching layout. Strided
/// iteration through `Zip` is only used when neither operand allows plain slice iteration, or
/// when the workload is large enough to go parallel.
///
pub(crate) fn apply_in_place<T, U, F>(
    lhs: &mut ArrayViewMutD<'_, T>,
    lhs_dims: &Dimensions,
    rhs: &ArrayViewD<'_, U>,
    rhs_dims: &Dimensions,
    op: &F,
) -> Result<()>
where
    T: Send,
    U: Sync,
    F: Fn(&mut T, &U) + Send + Sync,
{
    if let Some(axis) = rhs_dims.labels().iter().position(|&dim| !lhs_dims.contains(dim)) {
        // Accumulate over a dimension that only the right hand side has
        let mut sub_dims = rhs_dims.clone();
        sub_dims.erase(rhs_dims.labels()[axis])?;
        for sub in rhs.axis_iter(Axis(axis)) {
            apply_in_place(lhs, lhs_dims, &sub, &sub_dims, op)?;
        }
        return Ok(());
    }
    if !lhs_dims.dense().contains_all(&rhs_dims.dense()) {
        return Err(Error::dimension(format!(
            "Expected {lhs_dims} to contain {rhs_dims}."
        )));
    }

    let parallel = config::for_workload(lhs.len()).allows_parallel();
    let rhs_slice = if lhs_dims.labels() == rhs_dims.labels() {
        rhs.as_slice()
    } else {
        None
    };

    if let (Some(target), Some(source)) = (lhs.as_slice_mut(), rhs_slice) {
        log::trace!("apply: contiguous operands, parallel={parallel}");
        if parallel {
            config::install(|| {
                target
                    .par_iter_mut()
                    .zip(source.par_iter())
                    .for_each(|(x, y)| op(x, y))
            });
        } else {
            for (x, y) in target.iter_mut().zip(source) {
                op(x, y);
            }
        }
        return Ok(());
    }

    if !parallel {
        if let Some(target) = lhs.as_slice_mut() {
            log::trace!("apply: contiguous left hand side");
            let aligned = align_axes(rhs.view(), rhs_dims, lhs_dims)?;
            let source = broadcast(&aligned, lhs_dims)?;
            for (x, y) in target.iter_mut().zip(source.iter()) {
                op(x, y);
            }
            return Ok(());
        }
        if let Some(source) = rhs_slice {
            log::trace!("apply: contiguous right hand side");
            for (x, y) in lhs.iter_mut().zip(source) {
                op(x, y);
            }
            return Ok(());
        }
    }

    log::trace!("apply: strided operands, parallel={parallel}");
    let aligned = align_axes(rhs.view(), rhs_dims, lhs_dims)?;
    let source = broadcast(&aligned, lhs_dims)?;
    let zip = Zip::from(lhs).and(&source);
    if parallel {
        config::install(|| zip.par_for_each(|x, y| op(x, y)));
    } else {
        zip.for_each(|x, y| op(x, y));
    }

    Ok(())
}

fn apply_within<T, F>(
    array: &mut ArrayViewMutD<'_, T>,
    dims: &Dimensions,
    axis: usize,
    target: Range<usize>,
    source: Range<usize>,
    op: &F,
) -> Result<()>
where
    T: Clone + Send + Sync,
    F: Fn(&mut T, &T) + Send + Sync,
{
    let extent = array.len_of(Axis(axis));
    if target.len() != source.len() || target.end > extent || source.end > extent {
        return Err(Error::dimension(format!(
            "Invalid ranges {target:?} and {source:?} for extent {extent}."
        )));
    }
    let mut part_dims = dims.clone();
    part_dims.resize(dims.labels()[axis], target.len())?;

    let source_view = select(array.view(), axis, source.start, Some(source.end));
    let target_view = select(array.view(), axis, target.start, Some(target.end));
    let overlap = {
        let (a, b) = (memory_span(&source_view), memory_span(&target_view));
        !a.is_empty() && !b.is_empty() && a.start < b.end && b.start < a.end
    };

    if overlap {
        log::trace!("apply_within: ranges overlap, copying source");
        let copy = source_view.as_standard_layout().into_owned();
        let mut target_view = select(array.view_mut(), axis, target.start, Some(target.end));
        return apply_in_place(&mut target_view, &part_dims, &copy.view(), &part_dims, op);
    }

    // Disjoint memory implies disjoint index ranges, so the two can be split apart.
    let (mut target_view, source_view) = if target.start < source.start {
        let (low, high) = array.view_mut().split_at(Axis(axis), source.start);
        (
            select(low, axis, target.start, Some(target.end)),
            select(high, axis, 0, Some(source.len())),
        )
    } else {
        let (low, high) = array.view_mut().split_at(Axis(axis), target.start);
        (
            select(high, axis, 0, Some(target.len())),
            select(low, axis, source.start, Some(source.end)),
        )
    };

    apply_in_place(&mut target_view, &part_dims, &source_view.view(), &part_dims, op)
}

fn reciprocal_times<T: Float>(array: &mut ArrayViewMutD<'_, T>, value: f64) -> Result<()> {
    let value = T::from(value)
        .ok_or_else(|| Error::type_error(format!("Cannot represent {value} as element type.")))?;
    array.mapv_inplace(|x| value / x);

    Ok(())
}
