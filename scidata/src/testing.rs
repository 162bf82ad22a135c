use crate::{
    dataset::Dataset,
    dim::Dim,
    dimensions::Dimensions,
    units::Unit,
    variable::{Tag, Variable},
};

/// Route `log` output through the test harness. Safe to call from every test.
pub(crate) fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .is_test(true)
        .try_init();
}

pub(crate) fn dims(pairs: &[(Dim, usize)]) -> Dimensions {
    Dimensions::from_pairs(pairs).unwrap()
}

/// Dimensionless 1-D coordinate along `dim`.
pub(crate) fn coord(dim: Dim, values: &[f64]) -> Variable {
    Variable::new(
        Tag::Coord,
        Unit::dimensionless(),
        dims(&[(dim, values.len())]),
        values.to_vec(),
    )
    .unwrap()
}

/// Event lists shaped by `pairs`, with `sparse` as the sparse dimension.
pub(crate) fn sparse(pairs: &[(Dim, usize)], sparse: Dim, events: Vec<Vec<f64>>) -> Variable {
    let dims = Dimensions::with_sparse(pairs, sparse).unwrap();
    Variable::new(Tag::Data, Unit::counts(), dims, events).unwrap()
}

/// A small histogram:
///
/// * bin edges `[0, 1, 2, 4]` along `X` and point coordinates `[10, 20]` along `Y`
/// * `a`: counts with variances, `{Y: 2, X: 3}`, values `0..6`, variances `1..=6`
/// * `b`: counts without variances, `{X: 3}`, values `[1, 2, 3]`
/// * labels `l` and mask `m` along `X`, and a scalar attribute `attr`
///
pub(crate) fn histogram() -> Dataset {
    let mut dataset = Dataset::new();
    dataset
        .set_coord(Dim::X, coord(Dim::X, &[0.0, 1.0, 2.0, 4.0]))
        .unwrap();
    dataset
        .set_coord(Dim::Y, coord(Dim::Y, &[10.0, 20.0]))
        .unwrap();

    let mut a = Variable::new(
        Tag::Data,
        Unit::counts(),
        dims(&[(Dim::Y, 2), (Dim::X, 3)]),
        (0..6).map(f64::from).collect::<Vec<_>>(),
    )
    .unwrap();
    a.set_variances((1..=6).map(f64::from).collect::<Vec<f64>>()).unwrap();
    dataset.set_data("a", a).unwrap();

    let b = Variable::new(
        Tag::Data,
        Unit::counts(),
        dims(&[(Dim::X, 3)]),
        vec![1.0, 2.0, 3.0],
    )
    .unwrap();
    dataset.set_data("b", b).unwrap();

    let labels = Variable::new(
        Tag::Labels,
        Unit::dimensionless(),
        dims(&[(Dim::X, 3)]),
        vec![5.0, 6.0, 7.0],
    )
    .unwrap();
    dataset.set_labels("l", labels).unwrap();
    let mask = Variable::new(
        Tag::Mask,
        Unit::dimensionless(),
        dims(&[(Dim::X, 3)]),
        vec![false, true, false],
    )
    .unwrap();
    dataset.set_mask("m", mask).unwrap();
    dataset.set_attr("attr", Variable::scalar(1.0)).unwrap();

    dataset
}
