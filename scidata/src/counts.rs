//! Conversion between counts and counts densities.
//!
//! A histogram in counts becomes a density by dividing each bin by its width along the binned
//! dimension, and back by multiplying.

use crate::{
    concept::BinaryOp,
    dataset::Dataset,
    dim::Dim,
    errors::{Error, Result},
    proxy::AsDatasetProxy,
    slice::Slice,
    variable::{AsVariableView, Tag, Variable},
};

/// Width of each bin along `dim` of the bin edges `edges`.
///
/// The result has one element less than `edges` along `dim`. Variances of the edges are
/// ignored.
///
pub fn bin_widths(edges: &impl AsVariableView, dim: Dim) -> Result<Variable> {
    let mut widths = edges.as_view().to_owned();
    widths.drop_variances();
    let n = widths.dims().extent(dim)?;
    if n < 2 {
        return Err(Error::invalid_argument(format!(
            "Bin edges along {dim} need at least two elements, got {n}."
        )));
    }
    widths.apply_within(BinaryOp::Sub, dim, 1..n, 0..n - 1)?;
    let widths = widths.slice(Slice::range(dim, 1, n))?.to_owned();

    Ok(widths)
}

/// Divide counts by the widths of their bins along `dim`.
pub fn to_density(var: &impl AsVariableView, dim: Dim, edges: &impl AsVariableView) -> Result<Variable> {
    let var = var.as_view();
    if !var.unit().is_counts() {
        return Err(Error::unit(format!(
            "Cannot convert {} with unit {} to a density, expected counts.",
            var.name(),
            var.unit()
        )));
    }
    let mut out = var.to_owned();
    out.div_assign(&bin_widths(edges, dim)?)?;

    Ok(out)
}

/// Multiply a counts density by the widths of its bins along `dim`.
pub fn from_density(var: &impl AsVariableView, dim: Dim, edges: &impl AsVariableView) -> Result<Variable> {
    let var = var.as_view();
    if !var.unit().is_counts_density() {
        return Err(Error::unit(format!(
            "Cannot convert {} with unit {} from a density, expected counts-density.",
            var.name(),
            var.unit()
        )));
    }
    let mut out = var.to_owned();
    out.mul_assign(&bin_widths(edges, dim)?)?;

    Ok(out)
}

/// Apply `convert` to every item whose values depend on `dim`, using the dataset's bin edges
/// for `dim`.
fn convert_dataset<F>(dataset: &impl AsDatasetProxy, dim: Dim, convert: F) -> Result<Dataset>
where
    F: Fn(&Variable, &Variable) -> Result<Variable>,
{
    let proxy = dataset.as_proxy();
    let edges = proxy
        .coords()?
        .get(&dim)
        .map(|edges| edges.to_owned())
        .ok_or_else(|| Error::not_found(format!("Expected a coordinate for {dim} in dataset.")))?;
    let extent = proxy.dimensions().get(&dim).copied();
    if extent.map(|extent| extent + 1) != edges.dims().get(dim) {
        return Err(Error::invalid_argument(format!(
            "Coordinate for {dim} does not hold bin edges."
        )));
    }

    let mut out = proxy.to_dataset()?;
    let names: Vec<String> = out
        .iter()
        .filter(|item| item.dims().map_or(false, |dims| dims.contains(dim)) && item.has_data())
        .map(|item| item.name().to_string())
        .collect();
    for name in names {
        if let Some(data) = out.items.get_mut(name.as_str()).and_then(|item| item.data.as_mut()) {
            let mut converted = convert(data, &edges)?;
            converted.set_tag(Tag::Data);
            *data = converted;
        }
    }

    Ok(out)
}

/// [`to_density`] for every item of `dataset` that depends on `dim`.
pub fn dataset_to_density(dataset: &impl AsDatasetProxy, dim: Dim) -> Result<Dataset> {
    convert_dataset(dataset, dim, |data, edges| to_density(data, dim, edges))
}

/// [`from_density`] for every item of `dataset` that depends on `dim`.
pub fn dataset_from_density(dataset: &impl AsDatasetProxy, dim: Dim) -> Result<Dataset> {
    convert_dataset(dataset, dim, |data, edges| from_density(data, dim, edges))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{
        testing::{self, coord, dims},
        units::Unit,
    };

    fn values(var: &Variable) -> Vec<f64> {
        var.values::<f64>().unwrap().iter().copied().collect()
    }

    #[test]
    fn test_bin_widths() {
        let mut edges = coord(Dim::X, &[0.0, 1.0, 3.0, 6.0]);
        edges.set_unit(Unit::us());
        let widths = bin_widths(&edges, Dim::X).unwrap();
        assert_eq!(widths.dims(), &dims(&[(Dim::X, 3)]));
        assert_eq!(values(&widths), vec![1.0, 2.0, 3.0]);
        assert_eq!(widths.unit(), Unit::us());

        assert!(bin_widths(&coord(Dim::X, &[1.0]), Dim::X).is_err());
        assert!(bin_widths(&edges, Dim::Y).is_err());
    }

    #[test]
    fn test_round_trip() {
        let mut edges = coord(Dim::X, &[0.0, 1.0, 3.0]);
        edges.set_unit(Unit::us());
        let mut var = Variable::new(Tag::Data, Unit::counts(), dims(&[(Dim::Y, 2), (Dim::X, 2)]), vec![1.0, 4.0, 2.0, 8.0]).unwrap();
        var.set_variances(vec![1.0, 4.0, 2.0, 8.0]).unwrap();

        let density = to_density(&var, Dim::X, &edges).unwrap();
        assert_eq!(density.unit(), Unit::counts() / Unit::us());
        assert_eq!(values(&density), vec![1.0, 2.0, 2.0, 4.0]);
        let variances: Vec<f64> = density.variances::<f64>().unwrap().iter().copied().collect();
        assert_eq!(variances, vec![1.0, 1.0, 2.0, 2.0]);

        let counts = from_density(&density, Dim::X, &edges).unwrap();
        assert_eq!(counts, var);
    }

    #[test]
    fn test_unit_checks() {
        let mut edges = coord(Dim::X, &[0.0, 1.0]);
        edges.set_unit(Unit::us());
        let var = Variable::new(Tag::Data, Unit::m(), dims(&[(Dim::X, 1)]), vec![1.0]).unwrap();
        assert!(matches!(to_density(&var, Dim::X, &edges).unwrap_err(), Error::Unit(_)));
        assert!(matches!(from_density(&var, Dim::X, &edges).unwrap_err(), Error::Unit(_)));
    }

    #[test]
    fn test_dataset() {
        let mut dataset = testing::histogram();
        dataset.coord_mut(Dim::X).unwrap().set_unit(Unit::us()).unwrap();

        let density = dataset_to_density(&dataset, Dim::X).unwrap();
        let b = density.item("b").unwrap().data().unwrap().to_owned();
        assert_eq!(values(&b), vec![1.0, 2.0, 1.5]);
        assert_eq!(b.unit(), Unit::counts() / Unit::us());
        assert!(density.item("a").unwrap().unit().unwrap().is_counts_density());

        let counts = dataset_from_density(&density, Dim::X).unwrap();
        assert_eq!(counts, dataset);

        assert!(dataset_to_density(&dataset, Dim::Y).is_err());
    }
}
