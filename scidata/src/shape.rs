//! Operations that change the shape of a variable: splitting, joining, reductions and
//! reordering along one dimension.

use crate::{
    concept::{self, BinaryOp, ConceptView},
    dim::Dim,
    dimensions::Dimensions,
    dtype::Capability,
    errors::{Error, Result},
    slice::Slice,
    variable::{AsVariableView, Variable, VariableConstView},
};

/// Split `var` along `dim` at `indices`, which must be sorted and within the extent of `dim`.
///
/// `n` indices produce `n + 1` variables. Concatenating the pieces restores `var`.
///
pub fn split(var: &impl AsVariableView, dim: Dim, indices: &[usize]) -> Result<Vec<Variable>> {
    let var = var.as_view();
    let extent = var.dims().extent(dim)?;

    let mut bounds = Vec::with_capacity(indices.len() + 2);
    bounds.push(0);
    bounds.extend_from_slice(indices);
    bounds.push(extent);
    if bounds.windows(2).any(|w| w[0] > w[1]) {
        return Err(Error::invalid_argument(format!(
            "Split indices {indices:?} must be sorted and within the extent {extent} of {dim}."
        )));
    }

    bounds
        .windows(2)
        .map(|w| Ok(var.slice(Slice::range(dim, w[0], w[1]))?.to_owned()))
        .collect()
}

/// Join `a` and `b` along `dim`.
///
/// Operands lacking `dim` count as having extent one. If neither has it, `dim` becomes a new
/// outer dimension of extent two. When `dim` is the sparse dimension, the event lists of
/// matching elements are joined instead.
///
pub fn concatenate(a: &impl AsVariableView, b: &impl AsVariableView, dim: Dim) -> Result<Variable> {
    let (a, b) = (a.as_view(), b.as_view());
    if a.dtype() != b.dtype() {
        return Err(Error::type_error(format!(
            "Cannot concatenate Variables: Data types do not match, {} and {}.",
            a.dtype(),
            b.dtype()
        )));
    }
    if a.unit() != b.unit() {
        return Err(Error::unit(format!(
            "Cannot concatenate Variables: Units do not match, {} and {}.",
            a.unit(),
            b.unit()
        )));
    }
    if a.tag() != b.tag() {
        return Err(Error::invalid_argument(format!(
            "Cannot concatenate Variables: Roles do not match, {:?} and {:?}.",
            a.tag(),
            b.tag()
        )));
    }
    if a.has_variances() != b.has_variances() {
        return Err(Error::variances(
            "Cannot concatenate Variables: Either both or none must have variances.",
        ));
    }

    if a.dims().sparse_dim() == Some(dim) {
        return concatenate_sparse(&a, &b);
    }

    let mut a_rest = a.dims().clone();
    let mut b_rest = b.dims().clone();
    let a_extent = remove_dim(&mut a_rest, dim)?;
    let b_extent = remove_dim(&mut b_rest, dim)?;
    if !(a_rest.contains_all(&b_rest) && b_rest.contains_all(&a_rest)) {
        return Err(Error::dimension(format!(
            "Cannot concatenate Variables: Dimensions {} and {} do not match along {dim}.",
            a.dims(),
            b.dims()
        )));
    }

    let mut dims = if a.dims().contains(dim) {
        a.dims().clone()
    } else if b.dims().contains(dim) {
        b.dims().clone()
    } else {
        let mut dims = a.dims().clone();
        dims.add(dim, 1)?;
        dims
    };
    dims.resize(dim, a_extent + b_extent)?;
    let axis = dims
        .index(dim)
        .ok_or_else(|| Error::dimension(format!("Expected {dim} in {dims}.")))?;

    let join = |x: ConceptView, y: ConceptView| -> Result<_> {
        concept::concatenate(axis, &x.align(a.dims(), &dims)?, &y.align(b.dims(), &dims)?)
    };
    let values = join(a.data(), b.data())?;
    let variances = match (a.variance_data(), b.variance_data()) {
        (Some(x), Some(y)) => Some(join(x, y)?),
        _ => None,
    };

    Ok(Variable::from_parts(&a, dims, values, variances))
}

fn remove_dim(dims: &mut Dimensions, dim: Dim) -> Result<usize> {
    match dims.get(dim) {
        Some(extent) => {
            dims.erase(dim)?;
            Ok(extent)
        }
        None => Ok(1),
    }
}

fn concatenate_sparse(a: &VariableConstView, b: &VariableConstView) -> Result<Variable> {
    if a.dims() != b.dims() {
        return Err(Error::dimension(format!(
            "Cannot concatenate sparse Variables with dimensions {} and {}.",
            a.dims(),
            b.dims()
        )));
    }
    let mut out = a.to_owned();
    {
        let (dims, values, variances) = out.parts_mut();
        values
            .view_mut()
            .apply(BinaryOp::Add, dims, &b.data(), b.dims())?;
        if let (Some(variances), Some(other)) = (variances, b.variance_data()) {
            variances
                .view_mut()
                .apply(BinaryOp::Add, dims, &other, b.dims())?;
        }
    }

    Ok(out)
}

/// Sum over `dim`, removing it.
pub fn sum(var: &impl AsVariableView, dim: Dim) -> Result<Variable> {
    let var = var.as_view();
    let mut dims = var.dims().clone();
    if !dims.contains(dim) {
        return Err(Error::dimension(format!(
            "Cannot sum over {dim}, not in {}.",
            var.dims()
        )));
    }
    dims.erase(dim)?;

    let mut out = Variable::zeros_like(&var, dims);
    {
        let (dims, values, variances) = out.parts_mut();
        values
            .view_mut()
            .apply(BinaryOp::Add, dims, &var.data(), var.dims())?;
        if let (Some(variances), Some(other)) = (variances, var.variance_data()) {
            variances
                .view_mut()
                .apply(BinaryOp::Add, dims, &other, var.dims())?;
        }
    }

    Ok(out)
}

/// Mean over `dim`, removing it. Variances of the mean are those of the sum scaled by `1/N²`.
pub fn mean(var: &impl AsVariableView, dim: Dim) -> Result<Variable> {
    let var = var.as_view();
    if !var.dtype().supports(Capability::FloatingPoint) {
        return Err(concept::requires(var.dtype(), Capability::FloatingPoint));
    }
    let n = var.dims().extent(dim)?;
    let mut out = sum(&var, dim)?;
    out.apply_scalar(BinaryOp::Mul, 1.0 / n as f64)?;

    Ok(out)
}

/// Reorder `dim` so that position `i` of the result holds position `indices[i]` of `var`.
pub fn permute(var: &impl AsVariableView, dim: Dim, indices: &[usize]) -> Result<Variable> {
    let var = var.as_view();
    let extent = var.dims().extent(dim)?;
    if indices.len() != extent {
        return Err(Error::invalid_argument(format!(
            "Expected {extent} indices to permute {dim}, got {}.",
            indices.len()
        )));
    }
    let mut seen = vec![false; extent];
    for &index in indices {
        match seen.get_mut(index) {
            Some(seen) if !*seen => *seen = true,
            _ => {
                return Err(Error::invalid_argument(format!(
                    "Indices {indices:?} are not a permutation of {extent} positions along {dim}."
                )))
            }
        }
    }

    gather(&var, dim, indices)
}

pub fn reverse(var: &impl AsVariableView, dim: Dim) -> Result<Variable> {
    let var = var.as_view();
    let indices: Vec<usize> = (0..var.dims().extent(dim)?).rev().collect();

    gather(&var, dim, &indices)
}

/// Keep the positions along the dimension of `mask` where `mask` is `true`.
///
/// `mask` must be a 1-D variable of element type `bool`.
///
pub fn filter(var: &impl AsVariableView, mask: &impl AsVariableView) -> Result<Variable> {
    let var = var.as_view();
    let (dim, kept, len) = filter_indices(&mask.as_view())?;
    if var.dims().get(dim) != Some(len) {
        return Err(Error::dimension(format!(
            "Filter mask of length {len} does not match {}.",
            var.dims()
        )));
    }

    gather(&var, dim, &kept)
}

/// Dimension, kept positions and length of a 1-D boolean mask.
pub(crate) fn filter_indices(mask: &VariableConstView) -> Result<(Dim, Vec<usize>, usize)> {
    let dim = match (mask.dims().labels(), mask.dims().is_sparse()) {
        ([dim], false) => *dim,
        _ => {
            return Err(Error::invalid_argument(format!(
                "Filter mask must be one-dimensional, got {}.",
                mask.dims()
            )))
        }
    };
    let flags = mask.values::<bool>().map_err(|_| {
        Error::invalid_argument(format!(
            "Filter mask must have element type bool, got {}.",
            mask.dtype()
        ))
    })?;
    let kept = flags
        .iter()
        .enumerate()
        .filter(|(_, &keep)| keep)
        .map(|(i, _)| i)
        .collect();

    Ok((dim, kept, flags.len()))
}

/// Stable ordering of the positions of a 1-D key variable.
pub(crate) fn sort_indices(key: &VariableConstView) -> Result<(Dim, Vec<usize>)> {
    let dim = match (key.dims().labels(), key.dims().is_sparse()) {
        ([dim], false) => *dim,
        _ => {
            return Err(Error::invalid_argument(format!(
                "Sort key must be one-dimensional, got {}.",
                key.dims()
            )))
        }
    };
    let mut indices: Vec<usize> = (0..key.dims().volume()).collect();
    match key.data() {
        ConceptView::F64(a) => indices.sort_by(|&i, &j| a[[i]].total_cmp(&a[[j]])),
        ConceptView::F32(a) => indices.sort_by(|&i, &j| a[[i]].total_cmp(&a[[j]])),
        ConceptView::I64(a) => indices.sort_by_key(|&i| a[[i]]),
        ConceptView::I32(a) => indices.sort_by_key(|&i| a[[i]]),
        ConceptView::Bool(a) => indices.sort_by_key(|&i| a[[i]]),
        ConceptView::String(a) => indices.sort_by(|&i, &j| a[[i]].cmp(&a[[j]])),
        other => {
            return Err(Error::invalid_argument(format!(
                "Cannot sort by element type {}.",
                other.dtype()
            )))
        }
    }

    Ok((dim, indices))
}

/// Sort `var` along the dimension of the 1-D `key`.
pub fn sort(var: &impl AsVariableView, key: &impl AsVariableView) -> Result<Variable> {
    let var = var.as_view();
    let key = key.as_view();
    let (dim, indices) = sort_indices(&key)?;
    if var.dims().get(dim) != Some(indices.len()) {
        return Err(Error::dimension(format!(
            "Sort key {} does not match {}.",
            key.dims(),
            var.dims()
        )));
    }

    gather(&var, dim, &indices)
}

/// Copy of `var` holding the positions `indices` along `dim`.
pub(crate) fn gather(var: &VariableConstView, dim: Dim, indices: &[usize]) -> Result<Variable> {
    let axis = var
        .dims()
        .index(dim)
        .ok_or_else(|| Error::dimension(format!("Expected {dim} in {}.", var.dims())))?;
    let extent = var.dims().shape()[axis];
    if let Some(bad) = indices.iter().find(|&&i| i >= extent) {
        return Err(Error::invalid_argument(format!(
            "Index {bad} is out of range for {dim} with extent {extent}."
        )));
    }

    let mut dims = var.dims().clone();
    dims.resize(dim, indices.len())?;
    let values = var.data().gather(axis, indices);
    let variances = var.variance_data().map(|v| v.gather(axis, indices));

    Ok(Variable::from_parts(var, dims, values, variances))
}
