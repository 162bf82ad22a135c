//! Redistribution of histogrammed values onto new bin edges.
//!
//! Each old bin contributes to every overlapping new bin in proportion to the overlap, so the
//! total along the rebinned dimension is preserved where the new edges cover the old ones.

use ndarray::{ArrayD, ArrayView1, ArrayViewD, ArrayViewMut1, Axis, IxDyn, Zip};
use num_traits::{cast, Float};

use crate::{
    concept::{align_axes, broadcast, requires, ConceptView, VariableConcept},
    config,
    counts,
    dim::Dim,
    dimensions::Dimensions,
    dtype::{Capability, DType},
    errors::{Error, Result},
    units::Unit,
    variable::{AsVariableView, Variable, VariableConstView},
};

/// Rebin `var` along `dim` from `old_edges` to `new_edges`.
///
/// `var` must hold counts (or squared counts) or a counts density. A density is converted to
/// counts with the old bin widths, rebinned, and converted back with the new widths.
///
/// Bin edges are either 1-D along `dim` or have the same dimensions as the data they bin, with
/// one extra element along `dim`.
///
pub fn rebin(
    var: &impl AsVariableView,
    dim: Dim,
    old_edges: &impl AsVariableView,
    new_edges: &impl AsVariableView,
) -> Result<Variable> {
    let (var, old_edges, new_edges) = (var.as_view(), old_edges.as_view(), new_edges.as_view());
    if var.dims().is_sparse() {
        return Err(Error::dimension(format!(
            "Cannot rebin sparse data with dimensions {}.",
            var.dims()
        )));
    }

    let unit = var.unit();
    if unit.is_counts() || unit == Unit::counts().powi(2) {
        rebin_counts(&var, dim, &old_edges, &new_edges)
    } else if unit.is_counts_density() {
        log::debug!("rebin: converting {} from density", var.name());
        let counts = counts::from_density(&var, dim, &old_edges)?;
        let rebinned = rebin_counts(&counts.view(), dim, &old_edges, &new_edges)?;
        counts::to_density(&rebinned, dim, &new_edges)
    } else {
        Err(Error::unit(format!(
            "Expected counts or counts-density, got {unit}."
        )))
    }
}

fn rebin_counts(
    var: &VariableConstView,
    dim: Dim,
    old_edges: &VariableConstView,
    new_edges: &VariableConstView,
) -> Result<Variable> {
    let extent = var.dims().extent(dim)?;
    let old_len = old_edges.dims().extent(dim)?;
    if old_len != extent + 1 {
        return Err(Error::invalid_argument(format!(
            "Old bin edges along {dim} have length {old_len}, expected {}.",
            extent + 1
        )));
    }
    let new_len = new_edges.dims().extent(dim)?;
    if new_len < 2 {
        return Err(Error::invalid_argument(format!(
            "New bin edges along {dim} need at least two elements, got {new_len}."
        )));
    }

    let mut dims = var.dims().clone();
    dims.resize(dim, new_len - 1)?;
    let mut old_target = var.dims().clone();
    old_target.resize(dim, old_len)?;
    let mut new_target = dims.clone();
    new_target.resize(dim, new_len)?;
    expect_edge_dims(old_edges.dims(), dim, &old_target)?;
    expect_edge_dims(new_edges.dims(), dim, &new_target)?;

    let axis = var
        .dims()
        .index(dim)
        .map(Axis)
        .ok_or_else(|| Error::dimension(format!("Expected {dim} in {}.", var.dims())))?;
    let old_values = edge_values(old_edges)?;
    let new_values = edge_values(new_edges)?;
    let old_aligned = align_axes(old_values.view(), old_edges.dims(), &old_target)?;
    let new_aligned = align_axes(new_values.view(), new_edges.dims(), &new_target)?;
    let edges = Edges {
        old: broadcast(&old_aligned, &old_target)?,
        new: broadcast(&new_aligned, &new_target)?,
        axis,
        shape: dims.shape().to_vec(),
    };
    log::debug!(
        "rebin: {} along {dim}, {} to {} bins",
        var.name(),
        extent,
        new_len - 1
    );

    let values = edges.apply(var.data())?;
    let variances = var.variance_data().map(|data| edges.apply(data)).transpose()?;

    Ok(Variable::from_parts(var, dims, values, variances))
}

/// Edges must be 1-D along `dim` or span exactly the dimensions of `target`.
fn expect_edge_dims(edges: &Dimensions, dim: Dim, target: &Dimensions) -> Result<()> {
    let joint = edges.ndim() == 1 && edges.contains(dim);
    let matching = edges.contains_all(target) && target.contains_all(edges);
    if joint || matching {
        Ok(())
    } else {
        Err(Error::not_implemented(format!(
            "Rebinning with bin edges {edges} is only supported for 1-D edges or edges matching \
             {target}."
        )))
    }
}

fn edge_values(edges: &VariableConstView) -> Result<ArrayD<f64>> {
    match edges.dtype() {
        DType::F64 => Ok(edges.values::<f64>()?.to_owned()),
        DType::F32 => Ok(edges.values::<f32>()?.mapv(f64::from)),
        dtype => Err(requires(dtype, Capability::FloatingPoint)),
    }
}

/// Old and new bin edges, broadcast to the shape of the data they bin.
struct Edges<'a> {
    old: ArrayViewD<'a, f64>,
    new: ArrayViewD<'a, f64>,
    axis: Axis,
    shape: Vec<usize>,
}

impl Edges<'_> {
    fn apply(&self, data: ConceptView) -> Result<VariableConcept> {
        match data {
            ConceptView::F64(values) => Ok(VariableConcept::F64(self.rebin(&values))),
            ConceptView::F32(values) => Ok(VariableConcept::F32(self.rebin(&values))),
            other => Err(requires(other.dtype(), Capability::FloatingPoint)),
        }
    }

    fn rebin<T>(&self, values: &ArrayViewD<'_, T>) -> ArrayD<T>
    where
        T: Float + Send + Sync,
    {
        let mut out = ArrayD::from_elem(IxDyn(&self.shape), T::zero());
        let zip = Zip::from(values.lanes(self.axis))
            .and(out.lanes_mut(self.axis))
            .and(self.old.lanes(self.axis))
            .and(self.new.lanes(self.axis));
        if config::for_workload(out_len(&self.shape)).allows_parallel() {
            config::install(|| zip.par_for_each(rebin_lane::<T>));
        } else {
            zip.for_each(rebin_lane::<T>);
        }

        out
    }
}

fn out_len(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Rebin a single lane.
///
/// Bins with a NaN edge are skipped.
///
fn rebin_lane<T: Float>(old: ArrayView1<T>, mut new: ArrayViewMut1<T>, xo: ArrayView1<f64>, xn: ArrayView1<f64>) {
    let (old_size, new_size) = (old.len(), new.len());
    let (mut iold, mut inew) = (0, 0);
    while iold < old_size && inew < new_size {
        let (xo_low, xo_high) = (xo[iold], xo[iold + 1]);
        let (xn_low, xn_high) = (xn[inew], xn[inew + 1]);

        if xn_low.is_nan() || xn_high.is_nan() || xn_high <= xo_low {
            inew += 1;
        } else if xo_low.is_nan() || xo_high.is_nan() || xo_high <= xn_low {
            iold += 1;
        } else {
            let delta = xo_high.min(xn_high) - xo_low.max(xn_low);
            let fraction: T = cast(delta / (xo_high - xo_low)).unwrap_or_else(T::nan);
            new[inew] = new[inew] + old[iold] * fraction;
            if xn_high > xo_high {
                iold += 1;
            } else {
                inew += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::{rngs::StdRng, Rng, SeedableRng};

    use crate::{
        testing::{coord, dims},
        variable::Tag,
    };

    fn counts(pairs: &[(Dim, usize)], values: Vec<f64>) -> Variable {
        Variable::new(Tag::Data, Unit::counts(), dims(pairs), values).unwrap()
    }

    fn values(var: &Variable) -> Vec<f64> {
        var.values::<f64>().unwrap().iter().copied().collect()
    }

    #[test]
    fn test_merge_bins() {
        let var = counts(&[(Dim::X, 3)], vec![1.0, 2.0, 3.0]);
        let old = coord(Dim::X, &[0.0, 1.0, 2.0, 4.0]);
        let new = coord(Dim::X, &[0.0, 2.0, 4.0]);
        let rebinned = rebin(&var, Dim::X, &old, &new).unwrap();
        assert_eq!(rebinned.dims(), &dims(&[(Dim::X, 2)]));
        assert_eq!(values(&rebinned), vec![3.0, 3.0]);
        assert_eq!(rebinned.unit(), Unit::counts());
    }

    #[test]
    fn test_split_bins() {
        let var = counts(&[(Dim::X, 1)], vec![2.0]);
        let old = coord(Dim::X, &[0.0, 2.0]);
        let new = coord(Dim::X, &[0.0, 0.5, 2.0, 3.0]);
        let rebinned = rebin(&var, Dim::X, &old, &new).unwrap();
        assert_eq!(values(&rebinned), vec![0.5, 1.5, 0.0]);
    }

    #[test]
    fn test_outer_dimension() {
        // X is the outer dimension, lanes run across rows.
        let var = counts(&[(Dim::X, 2), (Dim::Y, 3)], vec![1.0, 2.0, 3.0, 10.0, 20.0, 30.0]);
        let old = coord(Dim::X, &[0.0, 1.0, 2.0]);
        let new = coord(Dim::X, &[0.0, 2.0]);
        let rebinned = rebin(&var, Dim::X, &old, &new).unwrap();
        assert_eq!(rebinned.dims(), &dims(&[(Dim::X, 1), (Dim::Y, 3)]));
        assert_eq!(values(&rebinned), vec![11.0, 22.0, 33.0]);
    }

    #[test]
    fn test_variances() {
        let mut var = counts(&[(Dim::X, 4)], vec![1.0, 1.0, 1.0, 1.0]);
        var.set_variances(vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let old = coord(Dim::X, &[0.0, 1.0, 2.0, 3.0, 4.0]);
        let new = coord(Dim::X, &[0.0, 2.0, 4.0]);
        let rebinned = rebin(&var, Dim::X, &old, &new).unwrap();
        assert_eq!(values(&rebinned), vec![2.0, 2.0]);
        let variances: Vec<f64> = rebinned.variances::<f64>().unwrap().iter().copied().collect();
        assert_eq!(variances, vec![3.0, 7.0]);
    }

    #[test]
    fn test_conserves_counts() {
        let mut rng = StdRng::seed_from_u64(7);
        let n = 50;
        let data: Vec<f64> = (0..n).map(|_| rng.gen_range(0.0..100.0)).collect();
        let total: f64 = data.iter().sum();
        let old: Vec<f64> = (0..=n).map(|i| i as f64).collect();

        let mut inner: Vec<f64> = (0..17).map(|_| rng.gen_range(0.0..n as f64)).collect();
        inner.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let mut new = vec![0.0];
        new.extend(inner);
        new.push(n as f64);

        let var = counts(&[(Dim::Tof, n)], data);
        let rebinned = rebin(&var, Dim::Tof, &coord(Dim::Tof, &old), &coord(Dim::Tof, &new)).unwrap();
        let rebinned_total: f64 = values(&rebinned).iter().sum();
        assert!((rebinned_total - total).abs() < 1e-9 * total);
    }

    #[test]
    fn test_nan_edges_are_skipped() {
        let var = counts(&[(Dim::X, 3)], vec![1.0, 2.0, 3.0]);
        let old = coord(Dim::X, &[0.0, 1.0, 2.0, 4.0]);
        let new = coord(Dim::X, &[0.0, 2.0, f64::NAN]);
        let rebinned = rebin(&var, Dim::X, &old, &new).unwrap();
        assert_eq!(values(&rebinned), vec![3.0, 0.0]);
    }

    #[test]
    fn test_edges_per_row() {
        let var = counts(&[(Dim::Y, 2), (Dim::X, 2)], vec![1.0, 1.0, 4.0, 4.0]);
        let old = Variable::new(
            Tag::Coord,
            Unit::dimensionless(),
            dims(&[(Dim::Y, 2), (Dim::X, 3)]),
            vec![0.0, 1.0, 2.0, 0.0, 2.0, 4.0],
        )
        .unwrap();
        let new = coord(Dim::X, &[0.0, 2.0, 4.0]);
        let rebinned = rebin(&var, Dim::X, &old, &new).unwrap();
        assert_eq!(values(&rebinned), vec![2.0, 0.0, 4.0, 4.0]);
    }

    #[test]
    fn test_f32() {
        let var = Variable::new(Tag::Data, Unit::counts(), dims(&[(Dim::X, 2)]), vec![1.0f32, 3.0]).unwrap();
        let old = coord(Dim::X, &[0.0, 1.0, 2.0]);
        let new = coord(Dim::X, &[0.0, 2.0]);
        let rebinned = rebin(&var, Dim::X, &old, &new).unwrap();
        assert_eq!(rebinned.dtype(), DType::F32);
        assert_eq!(rebinned.values::<f32>().unwrap().iter().copied().collect::<Vec<_>>(), vec![4.0]);
    }

    #[test]
    fn test_density() {
        let var = Variable::new(
            Tag::Data,
            Unit::counts() / Unit::us(),
            dims(&[(Dim::Tof, 2)]),
            vec![1.0, 3.0],
        )
        .unwrap();
        let mut old = coord(Dim::Tof, &[0.0, 1.0, 3.0]);
        old.set_unit(Unit::us());
        let mut new = coord(Dim::Tof, &[0.0, 3.0]);
        new.set_unit(Unit::us());
        let rebinned = rebin(&var, Dim::Tof, &old, &new).unwrap();
        assert_eq!(rebinned.unit(), Unit::counts() / Unit::us());
        let value = values(&rebinned)[0];
        assert!((value - 7.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_invalid_input() {
        let old = coord(Dim::X, &[0.0, 1.0, 2.0, 4.0]);
        let new = coord(Dim::X, &[0.0, 4.0]);

        let var = Variable::new(Tag::Data, Unit::m(), dims(&[(Dim::X, 3)]), vec![1.0; 3]).unwrap();
        assert!(matches!(rebin(&var, Dim::X, &old, &new).unwrap_err(), Error::Unit(_)));

        let var = counts(&[(Dim::X, 2)], vec![1.0; 2]);
        assert!(matches!(
            rebin(&var, Dim::X, &old, &new).unwrap_err(),
            Error::InvalidArgument(_)
        ));

        let var = counts(&[(Dim::X, 3)], vec![1.0; 3]);
        let edges = Variable::new(
            Tag::Coord,
            Unit::dimensionless(),
            dims(&[(Dim::Z, 2), (Dim::X, 4)]),
            vec![0.0; 8],
        )
        .unwrap();
        assert!(matches!(
            rebin(&var, Dim::X, &edges, &new).unwrap_err(),
            Error::NotImplemented(_)
        ));

        let var = Variable::new(Tag::Data, Unit::counts(), dims(&[(Dim::X, 3)]), vec![1i64; 3]).unwrap();
        assert!(matches!(rebin(&var, Dim::X, &old, &new).unwrap_err(), Error::Type(_)));
    }
}
