use std::ops::Range;

use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, IxDyn};

use crate::{
    arithmetic,
    concept::{BinaryOp, ConceptView, ConceptViewMut, Element, VariableConcept},
    dim::Dim,
    dimensions::Dimensions,
    dtype::DType,
    errors::{Error, Result},
    slice::Slice,
    units::Unit,
};

/// Semantic role of a variable within a dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tag {
    Coord,
    Labels,
    Attr,
    Mask,
    Data,
}

/// A multi-dimensional array with named dimensions, a unit, and optional variances.
///
/// The element type is erased: values are held in a [`VariableConcept`] and typed access is a
/// checked cast that fails with [`Error::Type`] on mismatch. Cloning a `Variable` deep copies its
/// buffers. Equality is deep, comparing tag, name, unit, dimensions, values, and variances.
///
#[derive(Clone, Debug, PartialEq)]
pub struct Variable {
    tag: Tag,
    name: String,
    unit: Unit,
    dims: Dimensions,
    values: VariableConcept,
    variances: Option<VariableConcept>,
}

/// Slice of one dimension resolved to an axis position at the time it was applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct AxisSelection {
    axis: usize,
    begin: usize,
    end: Option<usize>,
}

impl AxisSelection {
    fn resolve(dims: &Dimensions, slice: &Slice) -> Result<Self> {
        dims.check_slice(slice)?;
        let axis = dims
            .index(slice.dim())
            .ok_or_else(|| Error::dimension(format!("Expected {slice} to be in {dims}.")))?;

        Ok(Self {
            axis,
            begin: slice.begin(),
            end: slice.end(),
        })
    }
}

fn select<'b>(concept: &'b VariableConcept, slices: &[AxisSelection]) -> ConceptView<'b> {
    slices.iter().fold(concept.view(), |view, s| {
        view.select_axis(s.axis, s.begin, s.end)
    })
}

fn select_mut<'b>(concept: &'b mut VariableConcept, slices: &[AxisSelection]) -> ConceptViewMut<'b> {
    slices.iter().fold(concept.view_mut(), |view, s| {
        view.select_axis(s.axis, s.begin, s.end)
    })
}

fn check_sparse(dtype: DType, dims: &Dimensions) -> Result<()> {
    if dtype.is_sparse() == dims.is_sparse() {
        Ok(())
    } else if dims.is_sparse() {
        Err(Error::dimension(format!(
            "Dimensions {dims} are sparse but element type {dtype} is not."
        )))
    } else {
        Err(Error::dimension(format!(
            "Element type {dtype} is sparse but dimensions {dims} are not."
        )))
    }
}

fn from_vec<T: Element>(dims: &Dimensions, values: Vec<T>) -> Result<VariableConcept> {
    let len = values.len();
    ArrayD::from_shape_vec(IxDyn(dims.shape()), values)
        .map(T::wrap)
        .map_err(|_| {
            Error::dimension(format!(
                "Creating Variable: data size does not match volume, {len} != {}.",
                dims.volume()
            ))
        })
}

impl Variable {
    /// Create a variable from a buffer of values in row major order.
    ///
    /// # Arguments
    ///
    /// * `tag` - Role of the variable.
    /// * `unit` - Physical unit of the values.
    /// * `dims` - Dimensions, the volume of which must equal the length of `values`. Sparse
    ///   dimensions require a sparse element type, e.g. `Vec<f64>`, and vice versa.
    /// * `values` - The values.
    ///
    pub fn new<T: Element>(tag: Tag, unit: Unit, dims: Dimensions, values: Vec<T>) -> Result<Self> {
        check_sparse(T::DTYPE, &dims)?;
        let values = from_vec(&dims, values)?;

        Ok(Self {
            tag,
            name: String::new(),
            unit,
            dims,
            values,
            variances: None,
        })
    }

    /// Create a variable with values and variances. Only floating point types carry variances.
    pub fn with_variances<T: Element>(
        tag: Tag,
        unit: Unit,
        dims: Dimensions,
        values: Vec<T>,
        variances: Vec<T>,
    ) -> Result<Self> {
        let mut variable = Self::new(tag, unit, dims, values)?;
        variable.set_variances(variances)?;

        Ok(variable)
    }

    /// Default initialized variable of the given element type.
    pub fn zeros(tag: Tag, dtype: DType, unit: Unit, dims: Dimensions) -> Result<Self> {
        check_sparse(dtype, &dims)?;

        Ok(Self {
            tag,
            name: String::new(),
            unit,
            values: VariableConcept::zeros(dtype, dims.shape()),
            dims,
            variances: None,
        })
    }

    /// Dimensionless 0-d data variable.
    pub fn scalar(value: f64) -> Self {
        Self {
            tag: Tag::Data,
            name: String::new(),
            unit: Unit::dimensionless(),
            dims: Dimensions::new(),
            values: VariableConcept::F64(ndarray::arr0(value).into_dyn()),
            variances: None,
        }
    }

    /// Default initialized variable shaped like `dims`, with the same tag, name, unit, element
    /// type, and presence of variances as `prototype`.
    pub(crate) fn zeros_like(prototype: &VariableConstView, dims: Dimensions) -> Self {
        let dtype = prototype.dtype();
        let variances = prototype
            .has_variances()
            .then(|| VariableConcept::zeros(dtype, dims.shape()));

        Self {
            tag: prototype.tag(),
            name: prototype.name().to_string(),
            unit: prototype.unit(),
            values: VariableConcept::zeros(dtype, dims.shape()),
            dims,
            variances,
        }
    }

    pub(crate) fn from_parts(
        prototype: &VariableConstView,
        dims: Dimensions,
        values: VariableConcept,
        variances: Option<VariableConcept>,
    ) -> Self {
        Self {
            tag: prototype.tag(),
            name: prototype.name().to_string(),
            unit: prototype.unit(),
            dims,
            values,
            variances,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn set_tag(&mut self, tag: Tag) {
        self.tag = tag;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }

    pub fn set_unit(&mut self, unit: Unit) {
        self.unit = unit;
    }

    pub fn dims(&self) -> &Dimensions {
        &self.dims
    }

    pub fn dtype(&self) -> DType {
        self.values.dtype()
    }

    pub fn has_variances(&self) -> bool {
        self.variances.is_some()
    }

    /// Attach variances, replacing existing ones.
    pub fn set_variances<T: Element>(&mut self, variances: Vec<T>) -> Result<()> {
        if !T::DTYPE.is_float() {
            return Err(Error::variances(format!(
                "Variances are only supported for floating point types, got {}.",
                T::DTYPE
            )));
        }
        if T::DTYPE != self.dtype() {
            return Err(Error::dtype_mismatch(self.dtype(), T::DTYPE));
        }
        self.variances = Some(from_vec(&self.dims, variances)?);

        Ok(())
    }

    pub fn drop_variances(&mut self) {
        self.variances = None;
    }

    /// Attach zero variances if there are none yet.
    pub(crate) fn init_variances(&mut self) -> Result<()> {
        if !self.dtype().is_float() {
            return Err(Error::variances(format!(
                "Variances are only supported for floating point types, got {}.",
                self.dtype()
            )));
        }
        if self.variances.is_none() {
            self.variances = Some(VariableConcept::zeros(self.dtype(), self.dims.shape()));
        }

        Ok(())
    }

    /// Disjoint borrows of dimensions, values and variances.
    pub(crate) fn parts_mut(
        &mut self,
    ) -> (&Dimensions, &mut VariableConcept, Option<&mut VariableConcept>) {
        (&self.dims, &mut self.values, self.variances.as_mut())
    }

    /// Change the dimensions. Values are kept if the volume is unchanged and reset to their
    /// default otherwise.
    pub fn set_dims(&mut self, dims: Dimensions) -> Result<()> {
        check_sparse(self.dtype(), &dims)?;
        if dims.volume() == self.dims.volume() {
            self.values = self.values.clone().into_shape(dims.shape())?;
            if let Some(variances) = &self.variances {
                self.variances = Some(variances.clone().into_shape(dims.shape())?);
            }
        } else {
            log::trace!("set_dims: reallocating {} to {dims}", self.dims);
            let dtype = self.dtype();
            self.values = VariableConcept::zeros(dtype, dims.shape());
            if self.variances.is_some() {
                self.variances = Some(VariableConcept::zeros(dtype, dims.shape()));
            }
        }
        self.dims = dims;

        Ok(())
    }

    /// Same elements with new dimensions of equal volume.
    pub fn reshape(mut self, dims: Dimensions) -> Result<Self> {
        check_sparse(self.dtype(), &dims)?;
        self.values = self.values.into_shape(dims.shape())?;
        self.variances = match self.variances {
            Some(variances) => Some(variances.into_shape(dims.shape())?),
            None => None,
        };
        self.dims = dims;

        Ok(self)
    }

    /// Replace dimension label `from` by `to`. No-op if `from` is absent.
    pub fn rename(&mut self, from: Dim, to: Dim) -> Result<()> {
        self.dims.relabel(from, to)
    }

    pub fn concept(&self) -> &VariableConcept {
        &self.values
    }

    pub fn data(&self) -> ConceptView<'_> {
        self.values.view()
    }

    pub fn values<T: Element>(&self) -> Result<ArrayViewD<'_, T>> {
        T::cast(&self.values)
            .map(|array| array.view())
            .ok_or_else(|| Error::dtype_mismatch(T::DTYPE, self.dtype()))
    }

    pub fn values_mut<T: Element>(&mut self) -> Result<ArrayViewMutD<'_, T>> {
        let dtype = self.dtype();
        T::cast_mut(&mut self.values)
            .map(|array| array.view_mut())
            .ok_or_else(|| Error::dtype_mismatch(T::DTYPE, dtype))
    }

    /// The values as a flat slice in row major order.
    pub fn values_slice<T: Element>(&self) -> Result<&[T]> {
        T::cast(&self.values)
            .ok_or_else(|| Error::dtype_mismatch(T::DTYPE, self.dtype()))?
            .as_slice()
            .ok_or_else(|| Error::dimension("Values are not contiguous."))
    }

    pub fn variances<T: Element>(&self) -> Result<ArrayViewD<'_, T>> {
        let variances = self.variances.as_ref().ok_or_else(no_variances)?;
        T::cast(variances)
            .map(|array| array.view())
            .ok_or_else(|| Error::dtype_mismatch(T::DTYPE, self.dtype()))
    }

    pub fn variances_mut<T: Element>(&mut self) -> Result<ArrayViewMutD<'_, T>> {
        let dtype = self.dtype();
        let variances = self.variances.as_mut().ok_or_else(no_variances)?;
        T::cast_mut(variances)
            .map(|array| array.view_mut())
            .ok_or_else(|| Error::dtype_mismatch(T::DTYPE, dtype))
    }

    pub fn variances_slice<T: Element>(&self) -> Result<&[T]> {
        let variances = self.variances.as_ref().ok_or_else(no_variances)?;
        T::cast(variances)
            .ok_or_else(|| Error::dtype_mismatch(T::DTYPE, self.dtype()))?
            .as_slice()
            .ok_or_else(|| Error::dimension("Variances are not contiguous."))
    }

    pub fn view(&self) -> VariableConstView<'_> {
        VariableConstView {
            variable: self,
            slices: vec![],
            dims: self.dims.clone(),
        }
    }

    pub fn view_mut(&mut self) -> VariableView<'_> {
        let dims = self.dims.clone();
        VariableView {
            variable: self,
            slices: vec![],
            dims,
        }
    }

    pub fn slice(&self, slice: Slice) -> Result<VariableConstView<'_>> {
        self.view().slice(slice)
    }

    pub fn slice_mut(&mut self, slice: Slice) -> Result<VariableView<'_>> {
        self.view_mut().slice(slice)
    }

    pub fn add_assign(&mut self, other: &impl AsVariableView) -> Result<()> {
        self.view_mut().add_assign(other)
    }

    pub fn sub_assign(&mut self, other: &impl AsVariableView) -> Result<()> {
        self.view_mut().sub_assign(other)
    }

    pub fn mul_assign(&mut self, other: &impl AsVariableView) -> Result<()> {
        self.view_mut().mul_assign(other)
    }

    pub fn div_assign(&mut self, other: &impl AsVariableView) -> Result<()> {
        self.view_mut().div_assign(other)
    }

    pub fn apply_scalar(&mut self, op: BinaryOp, value: f64) -> Result<()> {
        self.view_mut().apply_scalar(op, value)
    }

    /// In-place `target op= source` between two ranges of `dim` of this variable.
    ///
    /// The ranges may overlap, in which case `source` is read before any element of `target` is
    /// written.
    ///
    pub fn apply_within(
        &mut self,
        op: BinaryOp,
        dim: Dim,
        target: Range<usize>,
        source: Range<usize>,
    ) -> Result<()> {
        if self.has_variances() {
            return Err(Error::variances(
                "Operations within a variable are not supported for variables with variances.",
            ));
        }
        let axis = self
            .dims
            .index(dim)
            .ok_or_else(|| Error::dimension(format!("Expected {dim} in {}.", self.dims)))?;

        self.values
            .view_mut()
            .apply_within(op, &self.dims, axis, target, source)
    }
}

fn no_variances() -> Error {
    Error::variances("Variable has no variances.")
}

/// Anything that can be read as a [`VariableConstView`].
pub trait AsVariableView {
    fn as_view(&self) -> VariableConstView<'_>;
}

impl AsVariableView for Variable {
    fn as_view(&self) -> VariableConstView<'_> {
        self.view()
    }
}

impl<'a> AsVariableView for VariableConstView<'a> {
    fn as_view(&self) -> VariableConstView<'_> {
        self.clone()
    }
}

impl<'a> AsVariableView for VariableView<'a> {
    fn as_view(&self) -> VariableConstView<'_> {
        self.as_const()
    }
}

/// Read-only view of a variable, restricted by a chain of slices.
#[derive(Clone, Debug)]
pub struct VariableConstView<'a> {
    variable: &'a Variable,
    slices: Vec<AxisSelection>,
    dims: Dimensions,
}

impl<'a> VariableConstView<'a> {
    /// Narrow this view further. Slices compose: indices are relative to the current view.
    pub fn slice(&self, slice: Slice) -> Result<Self> {
        let selection = AxisSelection::resolve(&self.dims, &slice)?;
        let mut slices = self.slices.clone();
        slices.push(selection);

        Ok(Self {
            variable: self.variable,
            slices,
            dims: self.dims.slice(&slice)?,
        })
    }

    pub fn tag(&self) -> Tag {
        self.variable.tag
    }

    pub fn name(&self) -> &'a str {
        &self.variable.name
    }

    pub fn unit(&self) -> Unit {
        self.variable.unit
    }

    pub fn dims(&self) -> &Dimensions {
        &self.dims
    }

    pub fn dtype(&self) -> DType {
        self.variable.dtype()
    }

    pub fn has_variances(&self) -> bool {
        self.variable.has_variances()
    }

    /// `true` if this view covers the whole variable.
    pub fn is_full(&self) -> bool {
        self.slices.is_empty()
    }

    pub fn data(&self) -> ConceptView<'a> {
        select(&self.variable.values, &self.slices)
    }

    pub fn variance_data(&self) -> Option<ConceptView<'a>> {
        self.variable
            .variances
            .as_ref()
            .map(|variances| select(variances, &self.slices))
    }

    pub fn values<T: Element>(&self) -> Result<ArrayViewD<'a, T>> {
        T::cast_view(self.data()).ok_or_else(|| Error::dtype_mismatch(T::DTYPE, self.dtype()))
    }

    pub fn variances<T: Element>(&self) -> Result<ArrayViewD<'a, T>> {
        let variances = self.variance_data().ok_or_else(no_variances)?;
        T::cast_view(variances).ok_or_else(|| Error::dtype_mismatch(T::DTYPE, self.dtype()))
    }

    /// Deep copy of the viewed elements.
    pub fn to_owned(&self) -> Variable {
        Variable::from_parts(
            self,
            self.dims.clone(),
            self.data().to_owned(),
            self.variance_data().map(|variances| variances.to_owned()),
        )
    }

    /// Copy of the viewed elements with new dimensions of equal volume.
    pub fn reshape(&self, dims: Dimensions) -> Result<Variable> {
        self.to_owned().reshape(dims)
    }

    /// Equality of unit, dimensions, values and variances, ignoring tag and name.
    pub(crate) fn same_content(&self, other: &VariableConstView) -> bool {
        self.unit() == other.unit()
            && self.dims == other.dims
            && self.data().equals(&other.data())
            && match (self.variance_data(), other.variance_data()) {
                (None, None) => true,
                (Some(a), Some(b)) => a.equals(&b),
                _ => false,
            }
    }
}

impl PartialEq for VariableConstView<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.tag() == other.tag() && self.name() == other.name() && self.same_content(other)
    }
}

impl PartialEq<Variable> for VariableConstView<'_> {
    fn eq(&self, other: &Variable) -> bool {
        *self == other.view()
    }
}

impl PartialEq<VariableConstView<'_>> for Variable {
    fn eq(&self, other: &VariableConstView<'_>) -> bool {
        self.view() == *other
    }
}

/// Mutable view of a variable, restricted by a chain of slices. Writes go directly to the
/// variable's buffers.
#[derive(Debug)]
pub struct VariableView<'a> {
    variable: &'a mut Variable,
    slices: Vec<AxisSelection>,
    dims: Dimensions,
}

impl<'a> VariableView<'a> {
    pub fn slice(self, slice: Slice) -> Result<Self> {
        let selection = AxisSelection::resolve(&self.dims, &slice)?;
        let dims = self.dims.slice(&slice)?;
        let mut slices = self.slices;
        slices.push(selection);

        Ok(Self {
            variable: self.variable,
            slices,
            dims,
        })
    }

    pub fn as_const(&self) -> VariableConstView<'_> {
        VariableConstView {
            variable: &*self.variable,
            slices: self.slices.clone(),
            dims: self.dims.clone(),
        }
    }

    pub fn dims(&self) -> &Dimensions {
        &self.dims
    }

    pub fn dtype(&self) -> DType {
        self.variable.dtype()
    }

    pub fn unit(&self) -> Unit {
        self.variable.unit
    }

    pub fn has_variances(&self) -> bool {
        self.variable.has_variances()
    }

    /// Set the unit of the underlying variable.
    ///
    /// A view on part of a variable cannot change the unit, since that would change the meaning
    /// of elements outside the view.
    ///
    pub fn set_unit(&mut self, unit: Unit) -> Result<()> {
        if unit != self.variable.unit && !self.slices.is_empty() {
            return Err(Error::unit(format!(
                "Partial view on data of variable cannot be used to change the unit from {} to \
                 {unit}.",
                self.variable.unit
            )));
        }
        self.variable.unit = unit;

        Ok(())
    }

    pub fn data_mut(&mut self) -> ConceptViewMut<'_> {
        select_mut(&mut self.variable.values, &self.slices)
    }

    pub fn values_mut<T: Element>(&mut self) -> Result<ArrayViewMutD<'_, T>> {
        let dtype = self.dtype();
        T::cast_view_mut(self.data_mut()).ok_or_else(|| Error::dtype_mismatch(T::DTYPE, dtype))
    }

    pub fn variances_mut<T: Element>(&mut self) -> Result<ArrayViewMutD<'_, T>> {
        let dtype = self.dtype();
        let variances = self.variable.variances.as_mut().ok_or_else(no_variances)?;
        T::cast_view_mut(select_mut(variances, &self.slices))
            .ok_or_else(|| Error::dtype_mismatch(T::DTYPE, dtype))
    }

    /// Copy values and variances of `other` into the viewed elements.
    ///
    /// `other` is broadcast if it lacks dimensions of `self`. The unit is taken from `other`.
    ///
    pub fn assign(&mut self, other: &impl AsVariableView) -> Result<()> {
        let other = other.as_view();
        self.expect_contains(other.dims())?;
        if self.has_variances() != other.has_variances() {
            return Err(Error::variances(
                "Either both or none of the operands must have variances.",
            ));
        }
        if self.dtype() != other.dtype() {
            return Err(Error::dtype_mismatch(self.dtype(), other.dtype()));
        }
        self.set_unit(other.unit())?;

        let mut values = select_mut(&mut self.variable.values, &self.slices);
        values.assign(&self.dims, &other.data(), other.dims())?;
        if let (Some(variances), Some(other_variances)) =
            (self.variable.variances.as_mut(), other.variance_data())
        {
            let mut variances = select_mut(variances, &self.slices);
            variances.assign(&self.dims, &other_variances, other.dims())?;
        }

        Ok(())
    }

    pub fn add_assign(&mut self, other: &impl AsVariableView) -> Result<()> {
        self.apply(BinaryOp::Add, &other.as_view())
    }

    pub fn sub_assign(&mut self, other: &impl AsVariableView) -> Result<()> {
        self.apply(BinaryOp::Sub, &other.as_view())
    }

    pub fn mul_assign(&mut self, other: &impl AsVariableView) -> Result<()> {
        self.apply(BinaryOp::Mul, &other.as_view())
    }

    pub fn div_assign(&mut self, other: &impl AsVariableView) -> Result<()> {
        self.apply(BinaryOp::Div, &other.as_view())
    }

    /// `self op= other` for values, with variances propagated.
    ///
    /// The dimensions of `other` must be contained in those of `self`. Addition and subtraction
    /// require equal units.
    ///
    pub fn apply(&mut self, op: BinaryOp, other: &VariableConstView) -> Result<()> {
        self.expect_contains(other.dims())?;
        let unit = match op {
            BinaryOp::Add | BinaryOp::Sub => {
                self.unit().expect_equal(&other.unit())?;
                self.unit()
            }
            BinaryOp::Mul => self.unit() * other.unit(),
            BinaryOp::Div => self.unit() / other.unit(),
        };
        if unit != self.unit() && !self.slices.is_empty() {
            return Err(Error::unit(format!(
                "Partial view on data of variable cannot be used to change the unit from {} to \
                 {unit}.",
                self.unit()
            )));
        }

        let mut values = select_mut(&mut self.variable.values, &self.slices);
        let mut variances = self
            .variable
            .variances
            .as_mut()
            .map(|variances| select_mut(variances, &self.slices));
        arithmetic::apply_with_variances(
            op,
            &self.dims,
            &mut values,
            variances.as_mut(),
            other.dims(),
            &other.data(),
            other.variance_data().as_ref(),
        )?;
        self.variable.unit = unit;

        Ok(())
    }

    /// `self op= value`. Multiplication and division scale variances by `value²`.
    pub fn apply_scalar(&mut self, op: BinaryOp, value: f64) -> Result<()> {
        let dtype = self.dtype();
        let scalar = VariableConcept::scalar(dtype, value)?;
        let scalar_dims = Dimensions::new();

        let mut values = select_mut(&mut self.variable.values, &self.slices);
        values.apply(op, &self.dims, &scalar.view(), &scalar_dims)?;
        if let (Some(variances), BinaryOp::Mul | BinaryOp::Div) =
            (self.variable.variances.as_mut(), op)
        {
            let squared = VariableConcept::scalar(dtype, value * value)?;
            let mut variances = select_mut(variances, &self.slices);
            variances.apply(op, &self.dims, &squared.view(), &scalar_dims)?;
        }

        Ok(())
    }

    fn expect_contains(&self, dims: &Dimensions) -> Result<()> {
        if self.dims.contains_all(dims) {
            Ok(())
        } else {
            Err(Error::dimension(format!(
                "Expected {} to contain {dims}.",
                self.dims
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use ndarray::array;

    fn xy() -> Dimensions {
        Dimensions::from_pairs(&[(Dim::X, 2), (Dim::Y, 3)]).unwrap()
    }

    fn data_xy() -> Variable {
        Variable::new(Tag::Data, Unit::m(), xy(), (1..7).map(f64::from).collect()).unwrap()
    }

    #[test]
    fn test_new() {
        let var = data_xy();
        assert_eq!(var.dtype(), DType::F64);
        assert_eq!(var.dims(), &xy());
        assert_eq!(var.unit(), Unit::m());
        assert!(!var.has_variances());
        assert_eq!(var.values_slice::<f64>().unwrap(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_new_volume_mismatch() {
        let err = Variable::new(Tag::Data, Unit::m(), xy(), vec![1.0; 5]).unwrap_err();
        assert!(matches!(err, Error::Dimension(_)));
    }

    #[test]
    fn test_new_sparse() {
        let dims = Dimensions::with_sparse(&[(Dim::X, 2)], Dim::Tof).unwrap();
        let var = Variable::new(
            Tag::Data,
            Unit::counts(),
            dims.clone(),
            vec![vec![1.0, 2.0], vec![3.0]],
        )
        .unwrap();
        assert_eq!(var.dtype(), DType::SparseF64);
        assert!(Variable::new(Tag::Data, Unit::counts(), dims, vec![1.0, 2.0]).is_err());
        assert!(Variable::new(Tag::Data, Unit::counts(), xy(), vec![Vec::<f64>::new(); 6]).is_err());
    }

    #[test]
    fn test_typed_access_checks_dtype() {
        let var = data_xy();
        let err = var.values::<f32>().unwrap_err();
        assert_eq!(err, Error::Type("Expected item dtype float32, got float64.".to_string()));
        assert!(var.values::<f64>().is_ok());
        assert!(matches!(var.variances::<f64>(), Err(Error::Variances(_))));
    }

    #[test]
    fn test_variances() {
        let var = Variable::with_variances(
            Tag::Data,
            Unit::counts(),
            xy(),
            vec![1.0; 6],
            vec![2.0; 6],
        )
        .unwrap();
        assert!(var.has_variances());
        assert_eq!(var.variances_slice::<f64>().unwrap(), &[2.0; 6]);

        let err = Variable::with_variances(
            Tag::Data,
            Unit::counts(),
            xy(),
            vec![1; 6],
            vec![2; 6],
        )
        .unwrap_err();
        assert!(matches!(err, Error::Variances(_)));
    }

    #[test]
    fn test_equality_is_deep() {
        let a = data_xy();
        let mut b = data_xy();
        assert_eq!(a, b);
        b.set_name("b");
        assert_ne!(a, b);
        let mut c = data_xy();
        c.set_tag(Tag::Coord);
        assert_ne!(a, c);
        let mut d = data_xy();
        d.set_unit(Unit::s());
        assert_ne!(a, d);
        let mut e = data_xy();
        e.values_mut::<f64>().unwrap()[[1, 2]] = 0.0;
        assert_ne!(a, e);
        let f = data_xy().reshape(Dimensions::from_pairs(&[(Dim::X, 3), (Dim::Y, 2)]).unwrap()).unwrap();
        assert_ne!(a, f);
    }

    #[test]
    fn test_clone_is_deep() {
        let a = data_xy();
        let mut b = a.clone();
        b.values_mut::<f64>().unwrap()[[0, 0]] = 10.0;
        assert_eq!(a.values::<f64>().unwrap()[[0, 0]], 1.0);
    }

    #[test]
    fn test_slice_index() {
        let var = data_xy();
        let row = var.slice(Slice::index(Dim::X, 1)).unwrap();
        assert_eq!(row.dims(), &Dimensions::from_pairs(&[(Dim::Y, 3)]).unwrap());
        assert_eq!(row.values::<f64>().unwrap(), array![4.0, 5.0, 6.0].into_dyn());
    }

    #[test]
    fn test_slice_chain() {
        let var = data_xy();
        let view = var
            .slice(Slice::range(Dim::Y, 1, 3))
            .unwrap()
            .slice(Slice::index(Dim::X, 0))
            .unwrap()
            .slice(Slice::range(Dim::Y, 1, 2))
            .unwrap();
        assert_eq!(view.dims(), &Dimensions::from_pairs(&[(Dim::Y, 1)]).unwrap());
        assert_eq!(view.values::<f64>().unwrap(), array![3.0].into_dyn());

        assert!(var.slice(Slice::index(Dim::Z, 0)).is_err());
        assert!(var.slice(Slice::range(Dim::Y, 2, 4)).is_err());
    }

    #[test]
    fn test_slice_sparse_dim_fails() {
        let dims = Dimensions::with_sparse(&[(Dim::X, 2)], Dim::Tof).unwrap();
        let var = Variable::new(Tag::Data, Unit::counts(), dims, vec![vec![1.0], vec![]]).unwrap();
        assert!(matches!(
            var.slice(Slice::index(Dim::Tof, 0)),
            Err(Error::Dimension(_))
        ));
        let element = var.slice(Slice::index(Dim::X, 0)).unwrap();
        assert_eq!(element.dims().sparse_dim(), Some(Dim::Tof));
    }

    #[test]
    fn test_view_to_owned_equals_hand_built() {
        let var = data_xy();
        let view = var.slice(Slice::range(Dim::Y, 0, 2)).unwrap();
        let expected = Variable::new(
            Tag::Data,
            Unit::m(),
            Dimensions::from_pairs(&[(Dim::X, 2), (Dim::Y, 2)]).unwrap(),
            vec![1.0, 2.0, 4.0, 5.0],
        )
        .unwrap();
        assert_eq!(view, expected);
        assert_eq!(view.to_owned(), expected);
    }

    #[test]
    fn test_assign_to_slice_writes_through() {
        let mut var = data_xy();
        let column = Variable::new(
            Tag::Data,
            Unit::m(),
            Dimensions::from_pairs(&[(Dim::X, 2)]).unwrap(),
            vec![0.0, -1.0],
        )
        .unwrap();
        var.slice_mut(Slice::index(Dim::Y, 1)).unwrap().assign(&column).unwrap();
        assert_eq!(var.values_slice::<f64>().unwrap(), &[1.0, 0.0, 3.0, 4.0, -1.0, 6.0]);
    }

    #[test]
    fn test_assign_broadcasts() {
        let mut var = data_xy();
        let row = Variable::new(
            Tag::Data,
            Unit::m(),
            Dimensions::from_pairs(&[(Dim::Y, 3)]).unwrap(),
            vec![7.0, 8.0, 9.0],
        )
        .unwrap();
        var.view_mut().assign(&row).unwrap();
        assert_eq!(var.values_slice::<f64>().unwrap(), &[7.0, 8.0, 9.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_assign_partial_cannot_change_unit() {
        let mut var = data_xy();
        let other = Variable::new(
            Tag::Data,
            Unit::s(),
            Dimensions::from_pairs(&[(Dim::Y, 3)]).unwrap(),
            vec![0.0; 3],
        )
        .unwrap();
        let mut row = var.slice_mut(Slice::index(Dim::X, 0)).unwrap();
        assert!(matches!(row.assign(&other), Err(Error::Unit(_))));
    }

    #[test]
    fn test_set_dims() {
        let mut var = data_xy();
        var.set_dims(Dimensions::from_pairs(&[(Dim::Z, 6)]).unwrap()).unwrap();
        assert_eq!(var.values_slice::<f64>().unwrap(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        var.set_dims(Dimensions::from_pairs(&[(Dim::Z, 2)]).unwrap()).unwrap();
        assert_eq!(var.values_slice::<f64>().unwrap(), &[0.0, 0.0]);
    }

    #[test]
    fn test_reshape_requires_same_volume() {
        let var = data_xy();
        let err = var
            .view()
            .reshape(Dimensions::from_pairs(&[(Dim::Z, 5)]).unwrap())
            .unwrap_err();
        assert!(matches!(err, Error::Dimension(_)));
        let reshaped = var
            .slice(Slice::range(Dim::Y, 1, 3))
            .unwrap()
            .reshape(Dimensions::from_pairs(&[(Dim::Z, 4)]).unwrap())
            .unwrap();
        assert_eq!(reshaped.values_slice::<f64>().unwrap(), &[2.0, 3.0, 5.0, 6.0]);
    }

    #[test]
    fn test_add_assign_requires_equal_units() {
        let mut a = data_xy();
        let b = data_xy();
        a.add_assign(&b).unwrap();
        assert_eq!(a.values_slice::<f64>().unwrap(), &[2.0, 4.0, 6.0, 8.0, 10.0, 12.0]);

        let mut c = b.clone();
        c.set_unit(Unit::s());
        assert!(matches!(a.add_assign(&c), Err(Error::Unit(_))));
    }

    #[test]
    fn test_add_assign_requires_contained_dims() {
        let mut row = Variable::new(
            Tag::Data,
            Unit::m(),
            Dimensions::from_pairs(&[(Dim::Y, 3)]).unwrap(),
            vec![0.0; 3],
        )
        .unwrap();
        let err = row.add_assign(&data_xy()).unwrap_err();
        assert!(matches!(err, Error::Dimension(_)));
    }

    #[test]
    fn test_mul_assign_units() {
        let mut a = data_xy();
        a.mul_assign(&data_xy()).unwrap();
        assert_eq!(a.unit(), Unit::m() * Unit::m());
        a.div_assign(&data_xy()).unwrap();
        assert_eq!(a, data_xy());

        let b = data_xy();
        let mut slice = a.slice_mut(Slice::index(Dim::X, 0)).unwrap();
        let err = slice.mul_assign(&b.slice(Slice::index(Dim::X, 1)).unwrap()).unwrap_err();
        assert!(matches!(err, Error::Unit(_)));
    }

    #[test]
    fn test_slice_op_slice() {
        let mut a = data_xy();
        let b = data_xy();
        a.slice_mut(Slice::index(Dim::X, 0))
            .unwrap()
            .add_assign(&b.slice(Slice::index(Dim::X, 1)).unwrap())
            .unwrap();
        assert_eq!(a.values_slice::<f64>().unwrap(), &[5.0, 7.0, 9.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_apply_scalar() {
        let mut var = Variable::with_variances(
            Tag::Data,
            Unit::counts(),
            xy(),
            vec![1.0; 6],
            vec![1.0; 6],
        )
        .unwrap();
        var.apply_scalar(BinaryOp::Mul, 3.0).unwrap();
        assert_eq!(var.values_slice::<f64>().unwrap(), &[3.0; 6]);
        assert_eq!(var.variances_slice::<f64>().unwrap(), &[9.0; 6]);
        var.apply_scalar(BinaryOp::Add, 1.0).unwrap();
        assert_eq!(var.values_slice::<f64>().unwrap(), &[4.0; 6]);
        assert_eq!(var.variances_slice::<f64>().unwrap(), &[9.0; 6]);

        let mut ints = Variable::new(Tag::Data, Unit::counts(), xy(), vec![2i32; 6]).unwrap();
        ints.apply_scalar(BinaryOp::Div, 2.0).unwrap();
        assert_eq!(ints.values_slice::<i32>().unwrap(), &[1; 6]);

        // Fractional factors are not silently truncated for integers.
        let err = ints.apply_scalar(BinaryOp::Mul, 0.5).unwrap_err();
        assert!(matches!(err, Error::Type(_)));
        assert_eq!(ints.values_slice::<i32>().unwrap(), &[1; 6]);
    }

    #[test]
    fn test_apply_within() {
        let mut edges = Variable::new(
            Tag::Coord,
            Unit::us(),
            Dimensions::from_pairs(&[(Dim::Tof, 4)]).unwrap(),
            vec![1.0, 2.0, 4.0, 8.0],
        )
        .unwrap();
        edges.apply_within(BinaryOp::Sub, Dim::Tof, 1..4, 0..3).unwrap();
        assert_eq!(edges.values_slice::<f64>().unwrap(), &[1.0, 1.0, 2.0, 4.0]);
        assert!(edges.apply_within(BinaryOp::Sub, Dim::X, 1..4, 0..3).is_err());
    }
}
