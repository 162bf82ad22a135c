//! Element-wise arithmetic between variables.
//!
//! Variances of the two operands are treated as uncorrelated and propagate as
//!
//! * `a + b`, `a - b`: `var(a) + var(b)`
//! * `a * b`: `var(a) * b² + var(b) * a²`
//! * `a / b`: `(var(a) + var(b) * (a / b)²) / b²`
//!
//! The free functions in this module return new variables. The right hand operand is broadcast
//! to the dimensions of the left hand operand, and the left hand operand is first broadcast to
//! the union of both if it lacks dimensions of the right hand side.

use ndarray::ArrayViewMutD;
use num_traits::Float;
use rayon::prelude::*;

use crate::{
    concept::{BinaryOp, ConceptView, ConceptViewMut, VariableConcept},
    config,
    dimensions::Dimensions,
    errors::{Error, Result},
    variable::{AsVariableView, Variable, VariableConstView},
};

/// `values op= other_values`, updating `variances` according to the propagation rules.
pub(crate) fn apply_with_variances(
    op: BinaryOp,
    dims: &Dimensions,
    values: &mut ConceptViewMut,
    variances: Option<&mut ConceptViewMut>,
    other_dims: &Dimensions,
    other_values: &ConceptView,
    other_variances: Option<&ConceptView>,
) -> Result<()> {
    let Some(variances) = variances else {
        if other_variances.is_some() {
            return Err(Error::variances(
                "Cannot apply an operand with variances to a variable without variances.",
            ));
        }
        return values.apply(op, dims, other_values, other_dims);
    };

    match op {
        BinaryOp::Add | BinaryOp::Sub => {
            values.apply(op, dims, other_values, other_dims)?;
            if let Some(other_variances) = other_variances {
                variances.apply(BinaryOp::Add, dims, other_variances, other_dims)?;
            }
        }
        BinaryOp::Mul => {
            if let Some(other_variances) = other_variances {
                if dims == other_dims
                    && fused_times(values, variances, other_values, other_variances)
                {
                    return Ok(());
                }
            }

            let other_squared = squared(other_values, other_dims)?;
            match other_variances {
                Some(other_variances) => {
                    let mut term = squared(&values.reborrow(), dims)?;
                    term.view_mut()
                        .apply(BinaryOp::Mul, dims, other_variances, other_dims)?;
                    variances.apply(BinaryOp::Mul, dims, &other_squared.view(), other_dims)?;
                    variances.apply(BinaryOp::Add, dims, &term.view(), dims)?;
                }
                None => {
                    variances.apply(BinaryOp::Mul, dims, &other_squared.view(), other_dims)?;
                }
            }
            values.apply(BinaryOp::Mul, dims, other_values, other_dims)?;
        }
        BinaryOp::Div => {
            let other_squared = squared(other_values, other_dims)?;
            if let Some(other_variances) = other_variances {
                let mut ratio = values.reborrow().to_owned();
                ratio
                    .view_mut()
                    .apply(BinaryOp::Div, dims, other_values, other_dims)?;
                let mut term = squared(&ratio.view(), dims)?;
                term.view_mut()
                    .apply(BinaryOp::Mul, dims, other_variances, other_dims)?;
                variances.apply(BinaryOp::Add, dims, &term.view(), dims)?;
            }
            variances.apply(BinaryOp::Div, dims, &other_squared.view(), other_dims)?;
            values.apply(BinaryOp::Div, dims, other_values, other_dims)?;
        }
    }

    Ok(())
}

fn squared(values: &ConceptView, dims: &Dimensions) -> Result<VariableConcept> {
    let mut squared = values.to_owned();
    squared.view_mut().apply(BinaryOp::Mul, dims, values, dims)?;

    Ok(squared)
}

/// Single pass over values and variances of both operands. Only possible when all four buffers
/// are contiguous with the same layout. Returns `false` without touching anything otherwise.
fn fused_times(
    values: &mut ConceptViewMut,
    variances: &mut ConceptViewMut,
    other_values: &ConceptView,
    other_variances: &ConceptView,
) -> bool {
    match (values, variances, other_values, other_variances) {
        (
            ConceptViewMut::F64(a),
            ConceptViewMut::F64(va),
            ConceptView::F64(b),
            ConceptView::F64(vb),
        ) => fused_times_typed(a, va, b.as_slice(), vb.as_slice()),
        (
            ConceptViewMut::F32(a),
            ConceptViewMut::F32(va),
            ConceptView::F32(b),
            ConceptView::F32(vb),
        ) => fused_times_typed(a, va, b.as_slice(), vb.as_slice()),
        _ => false,
    }
}

fn fused_times_typed<T: Float + Send + Sync>(
    a: &mut ArrayViewMutD<'_, T>,
    va: &mut ArrayViewMutD<'_, T>,
    b: Option<&[T]>,
    vb: Option<&[T]>,
) -> bool {
    let (Some(a), Some(va), Some(b), Some(vb)) = (a.as_slice_mut(), va.as_slice_mut(), b, vb) else {
        return false;
    };
    if a.len() != b.len() {
        return false;
    }

    let parallel = config::for_workload(a.len()).allows_parallel();
    log::trace!("times: fused variance loop, parallel={parallel}");
    let update = |(((x, vx), y), vy): (((&mut T, &mut T), &T), &T)| {
        *vx = *vx * *y * *y + *vy * *x * *x;
        *x = *x * *y;
    };
    if parallel {
        config::install(|| {
            a.par_iter_mut()
                .zip(va.par_iter_mut())
                .zip(b.par_iter())
                .zip(vb.par_iter())
                .for_each(update)
        });
    } else {
        a.iter_mut()
            .zip(va.iter_mut())
            .zip(b.iter())
            .zip(vb.iter())
            .for_each(update);
    }

    true
}

fn binary(op: BinaryOp, a: &VariableConstView, b: &VariableConstView) -> Result<Variable> {
    let mut out = if a.dims().contains_all(b.dims()) {
        a.to_owned()
    } else {
        broadcast(a, b.dims())?
    };
    if b.has_variances() && !out.has_variances() {
        out.init_variances()?;
    }
    out.view_mut().apply(op, b)?;

    Ok(out)
}

pub fn plus(a: &impl AsVariableView, b: &impl AsVariableView) -> Result<Variable> {
    binary(BinaryOp::Add, &a.as_view(), &b.as_view())
}

pub fn minus(a: &impl AsVariableView, b: &impl AsVariableView) -> Result<Variable> {
    binary(BinaryOp::Sub, &a.as_view(), &b.as_view())
}

pub fn times(a: &impl AsVariableView, b: &impl AsVariableView) -> Result<Variable> {
    binary(BinaryOp::Mul, &a.as_view(), &b.as_view())
}

pub fn divide(a: &impl AsVariableView, b: &impl AsVariableView) -> Result<Variable> {
    binary(BinaryOp::Div, &a.as_view(), &b.as_view())
}

/// Copy of `var` extended to also span `dims`. Missing labels are added as outer dimensions.
pub fn broadcast(var: &impl AsVariableView, dims: &Dimensions) -> Result<Variable> {
    let var = var.as_view();
    let target = var.dims().merge(dims)?;
    let mut out = Variable::zeros_like(&var, target);
    out.view_mut().assign(&var)?;

    Ok(out)
}

/// Magnitude of each element. 3-vectors become `f64`.
pub fn norm(var: &impl AsVariableView) -> Result<Variable> {
    let var = var.as_view();
    if var.has_variances() {
        return Err(Error::variances(
            "Cannot compute the norm of a variable with variances.",
        ));
    }
    let values = var.data().norm()?;

    Ok(Variable::from_parts(&var, var.dims().clone(), values, None))
}

/// Element-wise square root. The unit must have even powers.
pub fn sqrt(var: &impl AsVariableView) -> Result<Variable> {
    let var = var.as_view();
    let unit = var.unit().sqrt()?;
    let mut out = var.to_owned();
    {
        let (dims, values, variances) = out.parts_mut();
        if let Some(variances) = variances {
            // var(sqrt(x)) = var(x) / 4x
            let mut denominator = values.clone();
            let four = VariableConcept::scalar(values.dtype(), 4.0)?;
            denominator
                .view_mut()
                .apply(BinaryOp::Mul, dims, &four.view(), &Dimensions::new())?;
            variances
                .view_mut()
                .apply(BinaryOp::Div, dims, &denominator.view(), dims)?;
        }
        values.view_mut().sqrt()?;
    }
    out.set_unit(unit);

    Ok(out)
}

/// `value / var` for floating point variables.
pub fn reciprocal_times(var: &impl AsVariableView, value: f64) -> Result<Variable> {
    let var = var.as_view();
    let mut out = var.to_owned();
    {
        let (dims, values, variances) = out.parts_mut();
        let old = variances.is_some().then(|| values.clone());
        values.view_mut().reciprocal_times(value)?;
        if let (Some(variances), Some(old)) = (variances, old) {
            // var(c / x) = var(x) * (c / x²)²
            let mut factor = values.clone();
            factor
                .view_mut()
                .apply(BinaryOp::Div, dims, &old.view(), dims)?;
            let factor = squared(&factor.view(), dims)?;
            variances
                .view_mut()
                .apply(BinaryOp::Mul, dims, &factor.view(), dims)?;
        }
    }
    out.set_unit(var.unit().powi(-1));

    Ok(out)
}
