//! Operations on whole datasets.
//!
//! In-place binary operations match items by name. Every coordinate and label of the right hand
//! side must be present on the left hand side with equal content. A right hand side consisting
//! of a single item whose name is absent on the left is applied to every left hand side item
//! with values. All checks run before the first item is modified.

use crate::{
    concept::BinaryOp,
    dataset::Dataset,
    dim::Dim,
    errors::{Error, Result},
    proxy::{expect_superset, AsDatasetProxy, DataConstProxy, DatasetConstProxy, DatasetProxy},
    rebin,
    shape,
    slice::Slice,
    variable::{AsVariableView, Tag, Variable, VariableConstView},
};

/// Pairs of (left hand side item name, right hand side item) to combine.
fn match_items<'r>(lhs: &DatasetConstProxy, rhs: &DatasetConstProxy<'r>) -> Result<Vec<(String, DataConstProxy<'r>)>> {
    let mut pairs = vec![];
    for item in rhs.iter() {
        if lhs.contains(item.name()) {
            pairs.push((item.name().to_string(), item));
            continue;
        }

        let unique = rhs.iter().filter(DataConstProxy::has_data).count() == 1;
        if !(unique && item.has_data()) {
            return Err(Error::not_found(
                "Right-hand-side in binary operation contains variable that is not present in \
                 left-hand-side.",
            ));
        }
        let targets: Vec<String> = lhs
            .iter()
            .filter(DataConstProxy::has_data)
            .map(|target| target.name().to_string())
            .collect();
        if targets.is_empty() {
            return Err(Error::not_found(format!(
                "Cannot broadcast {} in binary operation, left-hand-side has no data items.",
                item.name()
            )));
        }
        log::debug!("broadcasting {} to {} items", item.name(), targets.len());
        pairs.extend(targets.into_iter().map(|name| (name, item.clone())));
    }

    Ok(pairs)
}

/// Validate `lhs op= rhs` without modifying anything.
fn plan<'r>(
    lhs: &DatasetConstProxy,
    op: BinaryOp,
    rhs: &DatasetConstProxy<'r>,
) -> Result<(Vec<(String, DataConstProxy<'r>)>, Vec<String>)> {
    expect_superset(&lhs.coords()?, &rhs.coords()?, "coordinate")?;
    expect_superset(&lhs.labels()?, &rhs.labels()?, "labels")?;

    let pairs = match_items(lhs, rhs)?;
    for (name, other) in &pairs {
        let item = lhs.item(name)?;
        expect_superset(&item.coords()?, &other.coords()?, "coordinate")?;
        expect_superset(&item.labels()?, &other.labels()?, "labels")?;

        let (data, other_data) = (item.data()?, other.data()?);
        if !data.dims().contains_all(other_data.dims()) {
            return Err(Error::dimension(format!(
                "Expected {} of {name} to contain {} of {}.",
                data.dims(),
                other_data.dims(),
                other.name()
            )));
        }
        if matches!(op, BinaryOp::Add | BinaryOp::Sub) {
            data.unit().expect_equal(&other_data.unit())?;
        }
        if op == BinaryOp::Mul && data.has_variances() != other_data.has_variances() {
            return Err(Error::variances(
                "Either both or none of the operands must have a variance for their values.",
            ));
        }
    }

    let held = lhs.attrs()?;
    let attrs = rhs
        .attrs()?
        .iter()
        .filter(|(name, attr)| held.get(name.as_str()).map_or(false, |held| !held.same_content(attr)))
        .map(|(name, _)| name.clone())
        .collect();

    Ok((pairs, attrs))
}

fn apply_in_place(lhs: &mut DatasetProxy, op: BinaryOp, rhs: &impl AsDatasetProxy) -> Result<()> {
    let rhs = rhs.as_proxy();
    let (pairs, attrs) = plan(&lhs.as_const(), op, &rhs)?;
    log::debug!("{op:?}: {} items, {} attributes", pairs.len(), attrs.len());

    for (name, other) in &pairs {
        lhs.item_mut(name)?.apply(op, &other.data()?)?;
    }
    let rhs_attrs = rhs.attrs()?;
    for name in &attrs {
        if let Some(attr) = rhs_attrs.get(name.as_str()) {
            lhs.attr_mut(name)?.apply(op, attr)?;
        }
    }

    Ok(())
}

fn binary(op: BinaryOp, a: &impl AsDatasetProxy, b: &impl AsDatasetProxy) -> Result<Dataset> {
    let (a, b) = (a.as_proxy(), b.as_proxy());
    let mut out = a.to_dataset()?;
    for (name, other) in match_items(&a, &b)? {
        if !other.has_variances() {
            continue;
        }
        if let Some(data) = out.items.get_mut(name.as_str()).and_then(|item| item.data.as_mut()) {
            if !data.has_variances() {
                data.init_variances()?;
            }
        }
    }
    apply_in_place(&mut out.as_proxy_mut(), op, &b)?;

    Ok(out)
}

pub fn plus(a: &impl AsDatasetProxy, b: &impl AsDatasetProxy) -> Result<Dataset> {
    binary(BinaryOp::Add, a, b)
}

pub fn minus(a: &impl AsDatasetProxy, b: &impl AsDatasetProxy) -> Result<Dataset> {
    binary(BinaryOp::Sub, a, b)
}

pub fn times(a: &impl AsDatasetProxy, b: &impl AsDatasetProxy) -> Result<Dataset> {
    binary(BinaryOp::Mul, a, b)
}

pub fn divide(a: &impl AsDatasetProxy, b: &impl AsDatasetProxy) -> Result<Dataset> {
    binary(BinaryOp::Div, a, b)
}

impl DatasetProxy<'_> {
    pub fn add_assign(&mut self, other: &impl AsDatasetProxy) -> Result<()> {
        apply_in_place(self, BinaryOp::Add, other)
    }

    pub fn sub_assign(&mut self, other: &impl AsDatasetProxy) -> Result<()> {
        apply_in_place(self, BinaryOp::Sub, other)
    }

    pub fn mul_assign(&mut self, other: &impl AsDatasetProxy) -> Result<()> {
        apply_in_place(self, BinaryOp::Mul, other)
    }

    pub fn div_assign(&mut self, other: &impl AsDatasetProxy) -> Result<()> {
        apply_in_place(self, BinaryOp::Div, other)
    }
}

impl Dataset {
    pub fn add_assign(&mut self, other: &impl AsDatasetProxy) -> Result<()> {
        self.as_proxy_mut().add_assign(other)
    }

    pub fn sub_assign(&mut self, other: &impl AsDatasetProxy) -> Result<()> {
        self.as_proxy_mut().sub_assign(other)
    }

    pub fn mul_assign(&mut self, other: &impl AsDatasetProxy) -> Result<()> {
        self.as_proxy_mut().mul_assign(other)
    }

    pub fn div_assign(&mut self, other: &impl AsDatasetProxy) -> Result<()> {
        self.as_proxy_mut().div_assign(other)
    }

    /// `data op= value` for every item with values.
    pub fn apply_scalar(&mut self, op: BinaryOp, value: f64) -> Result<()> {
        self.as_proxy_mut().apply_scalar(op, value)
    }
}

/// Build a new dataset by mapping every variable of `dataset`.
///
/// `f` receives each variable and, for dimension-coordinates, the dimension it is keyed by.
/// Returning `None` drops the variable. An item whose values are dropped is dropped entirely.
///
fn transform<F>(dataset: &DatasetConstProxy, mut f: F) -> Result<Dataset>
where
    F: FnMut(&VariableConstView, Option<Dim>) -> Result<Option<Variable>>,
{
    let mut out = Dataset::new();
    for (&dim, coord) in dataset.coords()?.iter() {
        if let Some(coord) = f(coord, Some(dim))? {
            out.set_coord(dim, coord)?;
        }
    }
    for (name, labels) in dataset.labels()?.iter() {
        if let Some(labels) = f(labels, None)? {
            out.set_labels(name, labels)?;
        }
    }
    for (name, mask) in dataset.masks()?.iter() {
        if let Some(mask) = f(mask, None)? {
            out.set_mask(name, mask)?;
        }
    }
    for (name, attr) in dataset.attrs()?.iter() {
        if let Some(attr) = f(attr, None)? {
            out.set_attr(name, attr)?;
        }
    }

    for item in dataset.iter() {
        let name = item.name();
        if let Some(data) = item.data_opt()? {
            match f(&data, None)? {
                Some(data) => out.set_data(name, data)?,
                None => continue,
            }
        }
        if let Some(coord) = item.sparse_coord()? {
            if let Some(coord) = f(&coord, None)? {
                out.set_sparse_coord(name, coord)?;
            }
        }
        if !out.contains(name) {
            continue;
        }
        for (key, labels) in item.sparse_labels()?.iter() {
            if let Some(labels) = f(labels, None)? {
                out.set_sparse_labels(name, key, labels)?;
            }
        }
        for (key, attr) in item.attrs()?.iter() {
            if let Some(attr) = f(attr, None)? {
                out.set_item_attr(name, key, attr)?;
            }
        }
    }

    Ok(out)
}

/// Union of the items of `a` and `b`.
///
/// Items, coordinates, labels, masks and attributes present in both must be equal.
///
pub fn merge(a: &impl AsDatasetProxy, b: &impl AsDatasetProxy) -> Result<Dataset> {
    let mut out = a.as_proxy().to_dataset()?;
    let b = b.as_proxy();
    let conflict = |what: String| Error::invalid_argument(format!("Cannot merge datasets, {what} differs."));

    for (&dim, coord) in b.coords()?.iter() {
        let held = out.coords().get(&dim).map(|held| held.same_content(coord));
        match held {
            Some(true) => {}
            Some(false) => return Err(conflict(format!("coordinate for {dim}"))),
            None => out.set_coord(dim, coord.to_owned())?,
        }
    }
    for (name, labels) in b.labels()?.iter() {
        let held = out.labels().get(name.as_str()).map(|held| held.same_content(labels));
        match held {
            Some(true) => {}
            Some(false) => return Err(conflict(format!("labels {name}"))),
            None => out.set_labels(name, labels.to_owned())?,
        }
    }
    for (name, mask) in b.masks()?.iter() {
        let held = out.masks().get(name.as_str()).map(|held| held.same_content(mask));
        match held {
            Some(true) => {}
            Some(false) => return Err(conflict(format!("mask {name}"))),
            None => out.set_mask(name, mask.to_owned())?,
        }
    }
    for (name, attr) in b.attrs()?.iter() {
        let held = out.attrs().get(name.as_str()).map(|held| held.same_content(attr));
        match held {
            Some(true) => {}
            Some(false) => return Err(conflict(format!("attribute {name}"))),
            None => out.set_attr(name, attr.to_owned())?,
        }
    }

    for item in b.iter() {
        let held = out.find(item.name()).map(|held| held == item);
        match held {
            Some(true) => {}
            Some(false) => return Err(conflict(format!("data item {}", item.name()))),
            None => out.set_item(item.name(), &item)?,
        }
    }

    Ok(out)
}

/// Split `dataset` along `dim` at `indices`. Items that do not depend on `dim` are copied into
/// every part.
pub fn split(dataset: &impl AsDatasetProxy, dim: Dim, indices: &[usize]) -> Result<Vec<Dataset>> {
    let dataset = dataset.as_proxy();
    let extent = dataset
        .dimensions()
        .get(&dim)
        .copied()
        .ok_or_else(|| Error::dimension(format!("Cannot split dataset along {dim}, not present.")))?;

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
        .map(|w| {
            let mut part = dataset.slice(Slice::range(dim, w[0], w[1]))?.to_dataset()?;
            for item in dataset.iter() {
                if !item.dims()?.contains(dim) {
                    part.set_item(item.name(), &item)?;
                }
            }
            Ok(part)
        })
        .collect()
}

/// Join two variables of datasets with logical extents `extents` along `dim`.
fn join(a: &VariableConstView, b: &VariableConstView, dim: Dim, extents: (Option<usize>, Option<usize>)) -> Result<Variable> {
    if a.dims().sparse_dim() == Some(dim) {
        return shape::concatenate(a, b, dim);
    }

    match a.dims().get(dim) {
        Some(held) if Some(held) != extents.0 => {
            let edges = b.dims().get(dim).filter(|&len| Some(len) == extents.1.map(|e| e + 1));
            let len = edges.ok_or_else(|| {
                Error::invalid_argument(format!(
                    "Cannot concatenate {}, expected bin edges along {dim} in both operands.",
                    a.name()
                ))
            })?;
            let last = a.slice(Slice::range(dim, held - 1, held))?;
            let first = b.slice(Slice::range(dim, 0, 1))?;
            if !last.same_content(&first) {
                return Err(Error::invalid_argument(format!(
                    "Cannot concatenate {}, last bin edge of first operand does not match first \
                     bin edge of second operand.",
                    a.name()
                )));
            }
            shape::concatenate(a, &b.slice(Slice::range(dim, 1, len))?, dim)
        }
        Some(_) => shape::concatenate(a, b, dim),
        None if a.same_content(b) => Ok(a.to_owned()),
        None if extents.0.is_some() => Err(Error::invalid_argument(format!(
            "Cannot concatenate {}, it does not depend on {dim} but differs between operands.",
            a.name()
        ))),
        None => shape::concatenate(a, b, dim),
    }
}

/// Join `a` and `b` along `dim`.
///
/// Only items present in both operands are kept. Bin edge coordinates must share the boundary
/// edge, which appears once in the result.
///
pub fn concatenate(a: &impl AsDatasetProxy, b: &impl AsDatasetProxy, dim: Dim) -> Result<Dataset> {
    let (a, b) = (a.as_proxy(), b.as_proxy());
    let extents = (
        a.dimensions().get(&dim).copied(),
        b.dimensions().get(&dim).copied(),
    );
    let missing = |what: String| Error::not_found(format!("Cannot concatenate, {what} is missing in second operand."));

    let mut out = Dataset::new();
    let other = b.coords()?;
    for (&key, coord) in a.coords()?.iter() {
        let other = other.get(&key).ok_or_else(|| missing(format!("coordinate for {key}")))?;
        out.set_coord(key, join(coord, other, dim, extents)?)?;
    }
    let other = b.labels()?;
    for (name, labels) in a.labels()?.iter() {
        let other = other.get(name.as_str()).ok_or_else(|| missing(format!("labels {name}")))?;
        out.set_labels(name, join(labels, other, dim, extents)?)?;
    }
    let other = b.masks()?;
    for (name, mask) in a.masks()?.iter() {
        let other = other.get(name.as_str()).ok_or_else(|| missing(format!("mask {name}")))?;
        out.set_mask(name, join(mask, other, dim, extents)?)?;
    }
    let other = b.attrs()?;
    for (name, attr) in a.attrs()?.iter() {
        let other = other.get(name.as_str()).ok_or_else(|| missing(format!("attribute {name}")))?;
        out.set_attr(name, join(attr, other, dim, extents)?)?;
    }

    for item in a.iter() {
        let other = match b.item(item.name()) {
            Ok(other) => other,
            Err(_) => {
                log::debug!("concatenate: dropping {}, not present in second operand", item.name());
                continue;
            }
        };
        let name = item.name();
        if let (Some(data), Some(other)) = (item.data_opt()?, other.data_opt()?) {
            out.set_data(name, join(&data, &other, dim, extents)?)?;
        }
        if let (Some(coord), Some(other)) = (item.sparse_coord()?, other.sparse_coord()?) {
            out.set_sparse_coord(name, join(&coord, &other, dim, extents)?)?;
        }
        if !out.contains(name) {
            continue;
        }
        let other_labels = other.sparse_labels()?;
        for (key, labels) in item.sparse_labels()?.iter() {
            if let Some(other) = other_labels.get(key.as_str()) {
                out.set_sparse_labels(name, key, join(labels, other, dim, extents)?)?;
            }
        }
        let other_attrs = other.attrs()?;
        for (key, attr) in item.attrs()?.iter() {
            if let Some(other) = other_attrs.get(key.as_str()) {
                out.set_item_attr(name, key, join(attr, other, dim, extents)?)?;
            }
        }
    }

    Ok(out)
}

/// Sum over `dim`.
///
/// Values depending on `dim` are summed. Everything else depending on `dim` is dropped, the rest
/// is copied.
///
pub fn sum(dataset: &impl AsDatasetProxy, dim: Dim) -> Result<Dataset> {
    transform(&dataset.as_proxy(), |var, _| {
        if !var.dims().contains(dim) {
            Ok(Some(var.to_owned()))
        } else if var.tag() == Tag::Data {
            shape::sum(var, dim).map(Some)
        } else {
            Ok(None)
        }
    })
}

/// Mean over `dim`, like [`sum`].
///
/// Fails if a coordinate for another dimension depends on `dim`.
///
pub fn mean(dataset: &impl AsDatasetProxy, dim: Dim) -> Result<Dataset> {
    let dataset = dataset.as_proxy();
    for (&key, coord) in dataset.coords()?.iter() {
        if key != dim && coord.dims().contains(dim) {
            return Err(Error::dimension(format!(
                "Cannot compute mean over {dim}, coordinate for {key} depends on it."
            )));
        }
    }

    transform(&dataset, |var, _| {
        if !var.dims().contains(dim) {
            Ok(Some(var.to_owned()))
        } else if var.tag() == Tag::Data {
            shape::mean(var, dim).map(Some)
        } else {
            Ok(None)
        }
    })
}

/// Keep the positions along the dimension of the 1-D boolean `mask` where it is `true`.
pub fn filter(dataset: &impl AsDatasetProxy, mask: &impl AsVariableView) -> Result<Dataset> {
    let dataset = dataset.as_proxy();
    let (dim, kept, len) = shape::filter_indices(&mask.as_view())?;
    if let Some(&extent) = dataset.dimensions().get(&dim) {
        if extent != len {
            return Err(Error::dimension(format!(
                "Filter mask of length {len} does not match extent {extent} of {dim}."
            )));
        }
    }

    transform(&dataset, |var, _| match var.dims().get(dim) {
        None => Ok(Some(var.to_owned())),
        Some(extent) if extent == len => shape::gather(var, dim, &kept).map(Some),
        Some(_) => Err(Error::invalid_argument(format!(
            "Cannot filter {}, it holds bin edges along {dim}.",
            var.name()
        ))),
    })
}

/// Sort along the dimension of the 1-D `key`, typically a coordinate or labels of `dataset`.
pub fn sort(dataset: &impl AsDatasetProxy, key: &impl AsVariableView) -> Result<Dataset> {
    let dataset = dataset.as_proxy();
    let (dim, indices) = shape::sort_indices(&key.as_view())?;
    if dataset.dimensions().get(&dim) != Some(&indices.len()) {
        return Err(Error::invalid_argument("Axis for sorting cannot be a bin-edge axis."));
    }

    transform(&dataset, |var, _| match var.dims().get(dim) {
        None => Ok(Some(var.to_owned())),
        Some(extent) if extent == indices.len() => shape::gather(var, dim, &indices).map(Some),
        Some(_) => Err(Error::invalid_argument("Axis for sorting cannot be a bin-edge axis.")),
    })
}

/// Rebin every item along `dim` onto the bin edges `coord`.
///
/// The dataset must hold bin edges for `dim`. Values are redistributed with [`rebin::rebin`],
/// the coordinate is replaced by `coord`, and all other variables depending on `dim` are
/// dropped.
///
pub fn rebin(dataset: &impl AsDatasetProxy, dim: Dim, coord: &impl AsVariableView) -> Result<Dataset> {
    let dataset = dataset.as_proxy();
    let new_coord = coord.as_view();
    let coords = dataset.coords()?;
    let old_coord = coords
        .get(&dim)
        .ok_or_else(|| Error::not_found(format!("Cannot rebin, no coordinate for {dim}.")))?;
    let extent = dataset
        .dimensions()
        .get(&dim)
        .copied()
        .ok_or_else(|| Error::dimension(format!("Cannot rebin, dataset does not have {dim}.")))?;
    if old_coord.dims().get(dim) != Some(extent + 1) {
        return Err(Error::invalid_argument(format!(
            "Cannot rebin {dim}, the existing coordinate does not hold bin edges."
        )));
    }
    let (mut old_aux, mut new_aux) = (old_coord.dims().clone(), new_coord.dims().clone());
    old_aux.erase(dim)?;
    new_aux.erase(dim)?;
    if old_aux != new_aux {
        return Err(Error::invalid_argument(format!(
            "Cannot rebin {dim}, dimensions {} of the new coordinate do not match {}.",
            new_coord.dims(),
            old_coord.dims()
        )));
    }

    transform(&dataset, |var, coord_dim| {
        if coord_dim == Some(dim) {
            Ok(Some(new_coord.to_owned()))
        } else if !var.dims().contains(dim) {
            Ok(Some(var.to_owned()))
        } else if var.tag() == Tag::Data {
            rebin::rebin(var, dim, old_coord, &new_coord).map(Some)
        } else {
            log::debug!("rebin: dropping {:?} {}, it depends on {dim}", var.tag(), var.name());
            Ok(None)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::BTreeMap;

    use crate::{
        dimensions::Dimensions,
        testing::{self, coord, dims},
        units::Unit,
    };

    fn values(dataset: &Dataset, name: &str) -> Vec<f64> {
        dataset
            .item(name)
            .unwrap()
            .data()
            .unwrap()
            .values::<f64>()
            .unwrap()
            .iter()
            .copied()
            .collect()
    }

    fn variances(dataset: &Dataset, name: &str) -> Vec<f64> {
        dataset
            .item(name)
            .unwrap()
            .data()
            .unwrap()
            .variances::<f64>()
            .unwrap()
            .iter()
            .copied()
            .collect()
    }

    fn dimensionless(pairs: &[(Dim, usize)], values: Vec<f64>) -> Variable {
        Variable::new(Tag::Data, Unit::dimensionless(), dims(pairs), values).unwrap()
    }

    #[test]
    fn test_add_assign_matches_names() {
        testing::init_logging();
        let mut a = testing::histogram();
        let b = testing::histogram();
        a.add_assign(&b).unwrap();
        assert_eq!(values(&a, "b"), vec![2.0, 4.0, 6.0]);
        assert_eq!(values(&a, "a"), vec![0.0, 2.0, 4.0, 6.0, 8.0, 10.0]);
        assert_eq!(variances(&a, "a"), vec![2.0, 4.0, 6.0, 8.0, 10.0, 12.0]);
    }

    #[test]
    fn test_broadcast_single_item() {
        let mut lhs = Dataset::new();
        lhs.set_data("a", dimensionless(&[(Dim::Y, 2), (Dim::X, 3)], vec![1.0; 6])).unwrap();
        lhs.set_data("b", dimensionless(&[(Dim::X, 3)], vec![1.0; 3])).unwrap();
        let mut rhs = Dataset::new();
        rhs.set_data("offset", dimensionless(&[(Dim::X, 3)], vec![1.0, 2.0, 3.0])).unwrap();

        lhs.add_assign(&rhs).unwrap();
        assert_eq!(values(&lhs, "a"), vec![2.0, 3.0, 4.0, 2.0, 3.0, 4.0]);
        assert_eq!(values(&lhs, "b"), vec![2.0, 3.0, 4.0]);

        let err = Dataset::new().add_assign(&rhs).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_unmatched_names_fail() {
        let mut lhs = testing::histogram();
        let mut rhs = Dataset::new();
        rhs.set_data("x", dimensionless(&[(Dim::X, 3)], vec![1.0; 3])).unwrap();
        rhs.set_data("y", dimensionless(&[(Dim::X, 3)], vec![1.0; 3])).unwrap();
        let err = lhs.add_assign(&rhs).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(lhs, testing::histogram());
    }

    #[test]
    fn test_coord_mismatch_leaves_lhs_untouched() {
        let mut lhs = testing::histogram();
        let mut rhs = testing::histogram();
        rhs.coord_mut(Dim::Y).unwrap().values_mut::<f64>().unwrap()[[1]] = 0.0;
        let err = lhs.add_assign(&rhs).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(lhs, testing::histogram());

        let mut rhs = testing::histogram();
        rhs.set_coord(Dim::Z, coord(Dim::Z, &[1.0])).unwrap();
        assert!(lhs.add_assign(&rhs).unwrap_err().is_not_found());
    }

    #[test]
    fn test_unit_mismatch_is_fatal() {
        let mut lhs = testing::histogram();
        let mut rhs = testing::histogram();
        rhs.item_mut("b").unwrap().set_unit(Unit::m()).unwrap();
        let err = lhs.add_assign(&rhs).unwrap_err();
        assert!(matches!(err, Error::Unit(_)));
        assert_eq!(lhs, testing::histogram());
    }

    #[test]
    fn test_mul_requires_matching_variances() {
        let mut lhs = testing::histogram();
        let mut rhs = testing::histogram();
        rhs.erase("b").unwrap();
        let a = rhs.item("a").unwrap().data().unwrap().to_owned();
        let mut plain = a.clone();
        plain.drop_variances();
        rhs.set_data("a", plain).unwrap();

        let err = lhs.mul_assign(&rhs).unwrap_err();
        assert!(matches!(err, Error::Variances(_)));

        rhs.set_data("a", a).unwrap();
        lhs.mul_assign(&rhs).unwrap();
        assert_eq!(values(&lhs, "a"), vec![0.0, 1.0, 4.0, 9.0, 16.0, 25.0]);
        assert_eq!(lhs.item("a").unwrap().unit().unwrap(), Unit::counts().powi(2));
    }

    #[test]
    fn test_free_functions_init_variances() {
        let a = testing::histogram();
        let mut b = Dataset::new();
        let mut offset = dimensionless(&[(Dim::X, 3)], vec![1.0; 3]);
        offset.set_unit(Unit::counts());
        offset.set_variances(vec![0.5; 3]).unwrap();
        b.set_data("b", offset).unwrap();

        let sum = plus(&a, &b).unwrap();
        assert_eq!(values(&sum, "b"), vec![2.0, 3.0, 4.0]);
        assert_eq!(variances(&sum, "b"), vec![0.5; 3]);
        assert_eq!(values(&sum, "a"), values(&a, "a"));
        assert!(!a.item("b").unwrap().has_variances());

        let difference = minus(&a, &b).unwrap();
        assert_eq!(values(&difference, "b"), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_times_and_divide() {
        let a = testing::histogram();
        let mut b = Dataset::new();
        b.set_data("b", dimensionless(&[(Dim::X, 3)], vec![2.0; 3])).unwrap();

        let product = times(&a, &b).unwrap();
        assert_eq!(values(&product, "b"), vec![2.0, 4.0, 6.0]);
        let quotient = divide(&a, &b).unwrap();
        assert_eq!(values(&quotient, "b"), vec![0.5, 1.0, 1.5]);
    }

    #[test]
    fn test_attrs_combine_when_different() {
        let mut a = testing::histogram();
        let mut b = testing::histogram();
        b.attr_mut("attr").unwrap().values_mut::<f64>().unwrap().fill(2.0);
        a.add_assign(&b).unwrap();
        let attr = a.attrs().get("attr").unwrap().values::<f64>().unwrap().to_owned();
        assert_eq!(attr.iter().copied().collect::<Vec<_>>(), vec![3.0]);
    }

    #[test]
    fn test_scalar_ops() {
        let mut dataset = testing::histogram();
        dataset.apply_scalar(BinaryOp::Mul, 2.0).unwrap();
        assert_eq!(values(&dataset, "b"), vec![2.0, 4.0, 6.0]);
        assert_eq!(variances(&dataset, "a"), vec![4.0, 8.0, 12.0, 16.0, 20.0, 24.0]);
        dataset.apply_scalar(BinaryOp::Sub, 1.0).unwrap();
        assert_eq!(values(&dataset, "b"), vec![1.0, 3.0, 5.0]);
    }

    #[test]
    fn test_sliced_in_place_op() {
        let mut dataset = testing::histogram();
        let other = testing::histogram();
        let rhs = other.slice(Slice::range(Dim::X, 0, 1)).unwrap();
        dataset
            .slice_mut(Slice::range(Dim::X, 2, 3))
            .unwrap()
            .add_assign(&rhs)
            .unwrap_err();

        // Matching coordinates are required, so combine with a slice at the same position.
        let rhs = other.slice(Slice::range(Dim::X, 2, 3)).unwrap();
        dataset
            .slice_mut(Slice::range(Dim::X, 2, 3))
            .unwrap()
            .add_assign(&rhs)
            .unwrap();
        assert_eq!(values(&dataset, "b"), vec![1.0, 2.0, 6.0]);
    }

    #[test]
    fn test_merge() {
        let a = testing::histogram();
        let mut b = Dataset::new();
        b.set_coord(Dim::X, coord(Dim::X, &[0.0, 1.0, 2.0, 4.0])).unwrap();
        b.set_data("c", dimensionless(&[(Dim::X, 3)], vec![1.0; 3])).unwrap();

        let merged = merge(&a, &b).unwrap();
        assert_eq!(merged.len(), 3);
        assert!(merged.contains("c"));
        assert_eq!(merge(&a, &a).unwrap(), a);

        b.set_coord(Dim::X, coord(Dim::X, &[0.0, 1.0, 2.0, 5.0])).unwrap();
        let err = merge(&a, &b).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_split_concatenate_round_trip() {
        let dataset = testing::histogram();
        let parts = split(&dataset, Dim::X, &[1]).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].dimensions()[&Dim::X], 1);
        assert_eq!(parts[1].dimensions()[&Dim::X], 2);
        assert_eq!(
            parts[1].coords().get(&Dim::X).unwrap().values::<f64>().unwrap().len(),
            3
        );

        let joined = concatenate(&parts[0], &parts[1], Dim::X).unwrap();
        assert_eq!(joined, dataset);
    }

    #[test]
    fn test_split_copies_independent_items() {
        let mut dataset = testing::histogram();
        dataset.set_data("c", dimensionless(&[(Dim::Y, 2)], vec![1.0, 2.0])).unwrap();
        let parts = split(&dataset, Dim::X, &[2]).unwrap();
        for part in &parts {
            assert_eq!(part.item("c").unwrap(), dataset.item("c").unwrap());
        }
        assert_eq!(concatenate(&parts[0], &parts[1], Dim::X).unwrap(), dataset);
        assert!(split(&dataset, Dim::X, &[4]).is_err());
    }

    #[test]
    fn test_concatenate_requires_shared_edge() {
        let dataset = testing::histogram();
        let first = dataset.slice(Slice::range(Dim::X, 0, 1)).unwrap();
        let last = dataset.slice(Slice::range(Dim::X, 2, 3)).unwrap();
        let err = concatenate(&first, &last, Dim::X).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_concatenate_new_dim() {
        let mut a = Dataset::new();
        a.set_coord(Dim::X, coord(Dim::X, &[1.0, 2.0])).unwrap();
        a.set_data("a", dimensionless(&[(Dim::X, 2)], vec![1.0, 2.0])).unwrap();
        let mut b = a.clone();
        b.item_mut("a").unwrap().data_mut().unwrap().values_mut::<f64>().unwrap().fill(3.0);

        let joined = concatenate(&a, &b, Dim::Y).unwrap();
        assert_eq!(joined.dimensions(), BTreeMap::from([(Dim::X, 2), (Dim::Y, 2)]));
        assert_eq!(values(&joined, "a"), vec![1.0, 2.0, 3.0, 3.0]);
        assert_eq!(joined.coords().get(&Dim::X).unwrap().dims(), &dims(&[(Dim::X, 2)]));
    }

    #[test]
    fn test_sum_and_mean() {
        let dataset = testing::histogram();
        let summed = sum(&dataset, Dim::Y).unwrap();
        assert_eq!(values(&summed, "a"), vec![3.0, 5.0, 7.0]);
        assert_eq!(variances(&summed, "a"), vec![5.0, 7.0, 9.0]);
        assert_eq!(values(&summed, "b"), values(&dataset, "b"));
        assert!(!summed.coords().contains(&Dim::Y));
        assert!(summed.coords().contains(&Dim::X));

        let averaged = mean(&dataset, Dim::X).unwrap();
        assert_eq!(values(&averaged, "a"), vec![1.0, 4.0]);
        assert_eq!(values(&averaged, "b"), vec![2.0]);
        assert!(!averaged.coords().contains(&Dim::X));
        assert!(!averaged.labels().contains("l"));
        assert!(averaged.attrs().contains("attr"));
    }

    #[test]
    fn test_mean_rejects_dependent_coord() {
        let mut dataset = testing::histogram();
        dataset.set_coord(Dim::Z, coord(Dim::X, &[1.0, 2.0, 3.0])).unwrap();
        let err = mean(&dataset, Dim::X).unwrap_err();
        assert!(matches!(err, Error::Dimension(_)));
    }

    #[test]
    fn test_filter() {
        let mut dataset = Dataset::new();
        dataset.set_coord(Dim::X, coord(Dim::X, &[1.0, 2.0, 3.0])).unwrap();
        dataset.set_data("a", dimensionless(&[(Dim::X, 3)], vec![10.0, 20.0, 30.0])).unwrap();
        dataset.set_data("c", dimensionless(&[(Dim::Y, 1)], vec![5.0])).unwrap();
        let mask = Variable::new(Tag::Mask, Unit::dimensionless(), dims(&[(Dim::X, 3)]), vec![true, false, true]).unwrap();

        let filtered = filter(&dataset, &mask).unwrap();
        assert_eq!(values(&filtered, "a"), vec![10.0, 30.0]);
        assert_eq!(values(&filtered, "c"), vec![5.0]);
        assert_eq!(filtered.dimensions()[&Dim::X], 2);

        let err = filter(&testing::histogram(), &mask).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_sort() {
        let mut dataset = Dataset::new();
        dataset.set_coord(Dim::X, coord(Dim::X, &[3.0, 1.0, 2.0])).unwrap();
        dataset.set_data("a", dimensionless(&[(Dim::X, 3)], vec![30.0, 10.0, 20.0])).unwrap();

        let key = dataset.coords().get(&Dim::X).unwrap().clone();
        let sorted = sort(&dataset, &key).unwrap();
        assert_eq!(values(&sorted, "a"), vec![10.0, 20.0, 30.0]);
        let coords = sorted.coords();
        let x = coords.get(&Dim::X).unwrap().values::<f64>().unwrap();
        assert_eq!(x.iter().copied().collect::<Vec<_>>(), vec![1.0, 2.0, 3.0]);

        let histogram = testing::histogram();
        let edges = histogram.coords().get(&Dim::X).unwrap().clone();
        let err = sort(&histogram, &edges).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_rebin_dataset() {
        let dataset = testing::histogram();
        let edges = coord(Dim::X, &[0.0, 2.0, 4.0]);
        let rebinned = rebin(&dataset, Dim::X, &edges).unwrap();

        assert_eq!(rebinned.dimensions()[&Dim::X], 2);
        assert_eq!(values(&rebinned, "a"), vec![1.0, 2.0, 7.0, 5.0]);
        assert_eq!(variances(&rebinned, "a"), vec![3.0, 3.0, 9.0, 6.0]);
        assert_eq!(values(&rebinned, "b"), vec![3.0, 3.0]);
        assert!(rebinned.coords().get(&Dim::X).unwrap().same_content(&edges.view()));
        assert!(rebinned.coords().contains(&Dim::Y));
        assert!(!rebinned.labels().contains("l"));
        assert!(!rebinned.masks().contains("m"));

        let wrong = Variable::new(
            Tag::Coord,
            Unit::us(),
            Dimensions::from_pairs(&[(Dim::Z, 2), (Dim::X, 3)]).unwrap(),
            vec![0.0; 6],
        )
        .unwrap();
        assert!(rebin(&dataset, Dim::X, &wrong).is_err());
    }
}
