//! Borrowed, possibly sliced, views of a dataset and its items.
//!
//! A proxy holds the chain of slices applied so far, each paired with the extent of the sliced
//! dimension at the time it was applied. A variable whose extent along that dimension is one
//! larger holds bin edges: a range `begin..end` selects edges `begin..end + 1`, and an index `i`
//! selects the two edges `i..i + 2` of bin `i`, keeping the dimension.

use std::{borrow::Borrow, collections::BTreeMap, fmt};

use crate::{
    concept::BinaryOp,
    dataset::{DataItem, Dataset},
    dim::Dim,
    dimensions::Dimensions,
    dtype::DType,
    errors::{Error, Result},
    item_map::ItemMap,
    slice::Slice,
    units::Unit,
    variable::{AsVariableView, Variable, VariableConstView, VariableView},
};

pub(crate) type SliceList = Vec<(Slice, usize)>;

/// The slices to apply to a variable with dimensions `dims`, adjusted for bin edges.
///
/// Slices of dimensions the variable does not have are skipped.
///
pub(crate) fn resolve_slices(dims: &Dimensions, slices: &[(Slice, usize)]) -> Result<Vec<Slice>> {
    let mut dims = dims.clone();
    let mut resolved = Vec::with_capacity(slices.len());
    for &(slice, extent) in slices {
        let held = match dims.get(slice.dim()) {
            Some(held) => held,
            None => continue,
        };
        let slice = if held == extent {
            slice
        } else if held == extent + 1 {
            let begin = slice.begin();
            Slice::range(slice.dim(), begin, slice.end().unwrap_or(begin + 1) + 1)
        } else {
            return Err(Error::dimension(format!(
                "Cannot apply {slice} to {dims}, expected an extent of {extent} or {}.",
                extent + 1
            )));
        };
        dims = dims.slice(&slice)?;
        resolved.push(slice);
    }

    Ok(resolved)
}

pub(crate) fn make_slice<'a>(variable: &'a Variable, slices: &[(Slice, usize)]) -> Result<VariableConstView<'a>> {
    resolve_slices(variable.dims(), slices)?
        .into_iter()
        .try_fold(variable.view(), |view, slice| view.slice(slice))
}

pub(crate) fn make_slice_mut<'a>(
    variable: &'a mut Variable,
    slices: &[(Slice, usize)],
) -> Result<VariableView<'a>> {
    let resolved = resolve_slices(variable.dims(), slices)?;
    resolved
        .into_iter()
        .try_fold(variable.view_mut(), |view, slice| view.slice(slice))
}

/// `true` if `variable` should be visible from an item with dimensions `item_dims`.
///
/// Dimension-coordinates apply if the item has their dimension, all other variables if the item
/// has their inner dimension. Variables depending on the sparse dimension of the item are
/// shadowed by the item's own sparse coordinate and labels.
///
fn applies_to(variable: &Variable, item_dims: &Dimensions, coord_dim: Option<Dim>) -> bool {
    let dims = variable.dims();
    let relevant = match coord_dim {
        Some(dim) => dims.is_empty() || item_dims.contains(dim),
        None => dims.inner().map_or(true, |inner| item_dims.contains(inner)),
    };
    let shadowed = item_dims
        .sparse_dim()
        .map_or(false, |sparse| dims.contains(sparse));

    relevant && !shadowed
}

/// Sliced views of the variables in one role, keyed by dimension or name.
#[derive(Clone, Debug)]
pub struct Items<'a, K> {
    entries: Vec<(K, VariableConstView<'a>)>,
}

impl<'a, K: Clone + PartialEq> Items<'a, K> {
    pub(crate) fn full(map: &'a ItemMap<K, Variable>) -> Self {
        Self {
            entries: map
                .iter()
                .map(|(key, variable)| (key.clone(), variable.view()))
                .collect(),
        }
    }

    fn sliced(
        map: &'a ItemMap<K, Variable>,
        slices: &[(Slice, usize)],
        keep: impl Fn(&K, &Variable) -> bool,
    ) -> Result<Self> {
        let entries = map
            .iter()
            .filter(|&(key, variable)| keep(key, variable))
            .map(|(key, variable)| Ok((key.clone(), make_slice(variable, slices)?)))
            .collect::<Result<_>>()?;

        Ok(Self { entries })
    }

    fn push(&mut self, key: K, view: VariableConstView<'a>) {
        self.entries.push((key, view));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&VariableConstView<'a>>
    where
        K: Borrow<Q>,
        Q: PartialEq + ?Sized,
    {
        self.entries
            .iter()
            .find(|(k, _)| k.borrow() == key)
            .map(|(_, view)| view)
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: PartialEq + ?Sized,
    {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &VariableConstView<'a>)> {
        self.entries.iter().map(|(key, view)| (key, view))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().map(|(key, _)| key)
    }
}

/// Order insensitive. Tags and names of the variables are not compared.
impl<K: Clone + PartialEq> PartialEq for Items<'_, K> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self.iter().all(|(key, view)| {
                other
                    .get(key)
                    .map_or(false, |other| view.same_content(other))
            })
    }
}

/// Fails unless every variable in `rhs` is present in `lhs` with equal content.
pub(crate) fn expect_superset<K>(lhs: &Items<K>, rhs: &Items<K>, role: &str) -> Result<()>
where
    K: Clone + PartialEq + fmt::Display,
{
    for (key, view) in rhs.iter() {
        match lhs.get(key) {
            Some(held) if held.same_content(view) => {}
            Some(_) => {
                return Err(Error::invalid_argument(format!(
                    "Expected {role} {key} of both operands to match."
                )));
            }
            None => {
                return Err(Error::not_found(format!(
                    "Expected {role} {key} of right hand side to be present in left hand side."
                )));
            }
        }
    }

    Ok(())
}

fn both_equal<T: PartialEq>(a: Result<T>, b: Result<T>) -> bool {
    matches!((a, b), (Ok(a), Ok(b)) if a == b)
}

/// Read-only view of one data item, with the coordinates, labels and masks that apply to it.
#[derive(Clone, Debug)]
pub struct DataConstProxy<'a> {
    coords: &'a ItemMap<Dim, Variable>,
    labels: &'a ItemMap<String, Variable>,
    masks: &'a ItemMap<String, Variable>,
    name: &'a str,
    item: &'a DataItem,
    slices: SliceList,
}

impl<'a> DataConstProxy<'a> {
    pub(crate) fn new(dataset: &'a Dataset, name: &'a str, item: &'a DataItem, slices: SliceList) -> Self {
        Self {
            coords: &dataset.coords,
            labels: &dataset.labels,
            masks: &dataset.masks,
            name,
            item,
            slices,
        }
    }

    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn has_data(&self) -> bool {
        self.item.data.is_some()
    }

    pub fn has_variances(&self) -> bool {
        self.item
            .data
            .as_ref()
            .map_or(false, Variable::has_variances)
    }

    /// The values, failing with [`Error::NotFound`] for an item that only has a sparse
    /// coordinate.
    pub fn data(&self) -> Result<VariableConstView<'a>> {
        self.data_opt()?.ok_or_else(|| {
            Error::not_found(format!("Data item {} has no values.", self.name))
        })
    }

    pub fn data_opt(&self) -> Result<Option<VariableConstView<'a>>> {
        self.item
            .data
            .as_ref()
            .map(|data| make_slice(data, &self.slices))
            .transpose()
    }

    /// Dimensions of the values, or of the sparse coordinate for an item without values.
    pub fn dims(&self) -> Result<Dimensions> {
        let variable = self
            .item
            .data
            .as_ref()
            .or(self.item.coord.as_ref())
            .ok_or_else(|| Error::not_found(format!("Data item {} is empty.", self.name)))?;

        Ok(make_slice(variable, &self.slices)?.dims().clone())
    }

    pub fn dtype(&self) -> Result<DType> {
        Ok(self.data()?.dtype())
    }

    pub fn unit(&self) -> Result<Unit> {
        Ok(self.data()?.unit())
    }

    /// Dimension-coordinates of the item, including its sparse coordinate.
    pub fn coords(&self) -> Result<Items<'a, Dim>> {
        let dims = self.dims()?;
        let mut coords = Items::sliced(self.coords, &self.slices, |&dim, coord| {
            applies_to(coord, &dims, Some(dim))
        })?;
        if let Some(coord) = &self.item.coord {
            if let Some(sparse_dim) = coord.dims().sparse_dim() {
                coords.push(sparse_dim, make_slice(coord, &self.slices)?);
            }
        }

        Ok(coords)
    }

    /// Labels of the item, including its sparse labels.
    pub fn labels(&self) -> Result<Items<'a, String>> {
        let dims = self.dims()?;
        let mut labels = Items::sliced(self.labels, &self.slices, |_, labels| {
            applies_to(labels, &dims, None)
        })?;
        for (name, sparse) in self.item.labels.iter() {
            labels.push(name.clone(), make_slice(sparse, &self.slices)?);
        }

        Ok(labels)
    }

    pub fn masks(&self) -> Result<Items<'a, String>> {
        let dims = self.dims()?;
        Items::sliced(self.masks, &self.slices, |_, mask| applies_to(mask, &dims, None))
    }

    /// Attributes of the item. Dataset attributes are not included.
    pub fn attrs(&self) -> Result<Items<'a, String>> {
        let dims = self.dims()?;
        Items::sliced(&self.item.attrs, &self.slices, |_, attr| {
            applies_to(attr, &dims, None)
        })
    }

    pub fn sparse_coord(&self) -> Result<Option<VariableConstView<'a>>> {
        self.item
            .coord
            .as_ref()
            .map(|coord| make_slice(coord, &self.slices))
            .transpose()
    }

    pub fn sparse_labels(&self) -> Result<Items<'a, String>> {
        Items::sliced(&self.item.labels, &self.slices, |_, _| true)
    }

    pub fn slice(&self, slice: Slice) -> Result<Self> {
        let dims = self.dims()?;
        dims.check_slice(&slice)?;
        let mut sliced = self.clone();
        sliced.slices.push((slice, dims.extent(slice.dim())?));

        Ok(sliced)
    }

    pub fn slices(&self) -> Vec<Slice> {
        self.slices.iter().map(|&(slice, _)| slice).collect()
    }
}

/// Items compare equal if their values and everything that applies to them are equal. Names are
/// not compared.
impl PartialEq for DataConstProxy<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.has_data() == other.has_data()
            && self.has_variances() == other.has_variances()
            && both_equal(self.coords(), other.coords())
            && both_equal(self.labels(), other.labels())
            && both_equal(self.masks(), other.masks())
            && both_equal(self.attrs(), other.attrs())
            && match (self.data_opt(), other.data_opt()) {
                (Ok(Some(a)), Ok(Some(b))) => a.same_content(&b),
                (Ok(None), Ok(None)) => true,
                _ => false,
            }
    }
}

/// Mutable view of one data item.
///
/// Values and coordinates can be modified in place. Nothing can be inserted or removed, so the
/// extents of the dataset stay valid.
///
#[derive(Debug)]
pub struct DataProxy<'a> {
    coords: &'a mut ItemMap<Dim, Variable>,
    labels: &'a mut ItemMap<String, Variable>,
    masks: &'a mut ItemMap<String, Variable>,
    name: &'a str,
    item: &'a mut DataItem,
    slices: SliceList,
}

impl<'a> DataProxy<'a> {
    pub(crate) fn find(dataset: &'a mut Dataset, name: &str, slices: SliceList) -> Option<Self> {
        let Dataset {
            coords,
            labels,
            masks,
            items,
            ..
        } = dataset;
        let (name, item) = items.iter_mut().find(|(key, _)| key.as_str() == name)?;

        Some(Self {
            coords,
            labels,
            masks,
            name,
            item,
            slices,
        })
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn as_const(&self) -> DataConstProxy<'_> {
        DataConstProxy {
            coords: &*self.coords,
            labels: &*self.labels,
            masks: &*self.masks,
            name: self.name,
            item: &*self.item,
            slices: self.slices.clone(),
        }
    }

    pub fn slice(self, slice: Slice) -> Result<Self> {
        let entry = {
            let dims = self.as_const().dims()?;
            dims.check_slice(&slice)?;
            (slice, dims.extent(slice.dim())?)
        };
        let mut sliced = self;
        sliced.slices.push(entry);

        Ok(sliced)
    }

    pub fn data_mut(&mut self) -> Result<VariableView<'_>> {
        let name = self.name;
        let data = self
            .item
            .data
            .as_mut()
            .ok_or_else(|| Error::not_found(format!("Data item {name} has no values.")))?;
        make_slice_mut(data, &self.slices)
    }

    /// Mutable access to a coordinate of the item, which may be its sparse coordinate.
    pub fn coord_mut(&mut self, dim: Dim) -> Result<VariableView<'_>> {
        let sparse = self
            .item
            .coord
            .as_ref()
            .map_or(false, |coord| coord.dims().sparse_dim() == Some(dim));
        if sparse {
            let coord = self
                .item
                .coord
                .as_mut()
                .ok_or_else(|| Error::not_found(format!("Expected sparse coordinate for {dim}.")))?;
            return make_slice_mut(coord, &self.slices);
        }

        if !self.as_const().coords()?.contains(&dim) {
            return Err(Error::not_found(format!(
                "Expected coordinate for {dim} in {}.",
                self.name
            )));
        }
        let coord = self
            .coords
            .get_mut(&dim)
            .ok_or_else(|| Error::not_found(format!("Expected coordinate for {dim}.")))?;
        make_slice_mut(coord, &self.slices)
    }

    /// Mutable access to labels of the item, which may be its sparse labels.
    pub fn labels_mut(&mut self, name: &str) -> Result<VariableView<'_>> {
        if self.item.labels.contains(name) {
            let labels = self
                .item
                .labels
                .get_mut(name)
                .ok_or_else(|| Error::not_found(format!("Expected sparse labels {name}.")))?;
            return make_slice_mut(labels, &self.slices);
        }

        if !self.as_const().labels()?.contains(name) {
            return Err(Error::not_found(format!(
                "Expected labels {name} in {}.",
                self.name
            )));
        }
        let labels = self
            .labels
            .get_mut(name)
            .ok_or_else(|| Error::not_found(format!("Expected labels {name}.")))?;
        make_slice_mut(labels, &self.slices)
    }

    pub fn mask_mut(&mut self, name: &str) -> Result<VariableView<'_>> {
        if !self.as_const().masks()?.contains(name) {
            return Err(Error::not_found(format!(
                "Expected mask {name} in {}.",
                self.name
            )));
        }
        let mask = self
            .masks
            .get_mut(name)
            .ok_or_else(|| Error::not_found(format!("Expected mask {name}.")))?;
        make_slice_mut(mask, &self.slices)
    }

    pub fn attr_mut(&mut self, name: &str) -> Result<VariableView<'_>> {
        let item_name = self.name;
        let attr = self
            .item
            .attrs
            .get_mut(name)
            .ok_or_else(|| Error::not_found(format!("Expected attribute {name} in {item_name}.")))?;
        make_slice_mut(attr, &self.slices)
    }

    /// Change the unit of the values. Fails for a sliced item.
    pub fn set_unit(&mut self, unit: Unit) -> Result<()> {
        self.data_mut()?.set_unit(unit)
    }

    /// `data op= other` with variances propagated.
    pub fn apply(&mut self, op: BinaryOp, other: &impl AsVariableView) -> Result<()> {
        self.data_mut()?.apply(op, &other.as_view())
    }

    /// `data op= other.data`, after checking that the coordinates and labels of `other` match.
    pub fn apply_item(&mut self, op: BinaryOp, other: &DataConstProxy) -> Result<()> {
        {
            let lhs = self.as_const();
            expect_superset(&lhs.coords()?, &other.coords()?, "coordinate")?;
            expect_superset(&lhs.labels()?, &other.labels()?, "labels")?;
        }
        self.apply(op, &other.data()?)
    }

    pub fn add_assign(&mut self, other: &DataConstProxy) -> Result<()> {
        self.apply_item(BinaryOp::Add, other)
    }

    pub fn sub_assign(&mut self, other: &DataConstProxy) -> Result<()> {
        self.apply_item(BinaryOp::Sub, other)
    }

    pub fn mul_assign(&mut self, other: &DataConstProxy) -> Result<()> {
        self.apply_item(BinaryOp::Mul, other)
    }

    pub fn div_assign(&mut self, other: &DataConstProxy) -> Result<()> {
        self.apply_item(BinaryOp::Div, other)
    }
}

/// A dataset slice that does not borrow the dataset.
///
/// Re-attach it with [`Dataset::attach`], which fails if the dataset was structurally modified in
/// the meantime.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DetachedSlice {
    slices: Vec<Slice>,
    epoch: u64,
}

impl DetachedSlice {
    pub fn slices(&self) -> &[Slice] {
        &self.slices
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// Read-only view of a dataset, possibly sliced.
///
/// Slicing keeps only the items that depend on the sliced dimension. Dataset level coordinates,
/// labels, masks and attributes are all kept, sliced where they depend on the dimension.
///
#[derive(Clone, Debug)]
pub struct DatasetConstProxy<'a> {
    dataset: &'a Dataset,
    names: Vec<&'a str>,
    slices: SliceList,
}

impl<'a> DatasetConstProxy<'a> {
    pub(crate) fn new(dataset: &'a Dataset) -> Self {
        Self {
            dataset,
            names: dataset.items.keys().map(String::as_str).collect(),
            slices: vec![],
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.names.iter().copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(&name)
    }

    pub fn item(&self, name: &str) -> Result<DataConstProxy<'a>> {
        if !self.contains(name) {
            return Err(Error::not_found(format!(
                "Could not find data with name {name}."
            )));
        }
        self.dataset
            .items
            .iter()
            .find(|(key, _)| key.as_str() == name)
            .map(|(key, item)| DataConstProxy::new(self.dataset, key, item, self.slices.clone()))
            .ok_or_else(|| Error::not_found(format!("Could not find data with name {name}.")))
    }

    pub fn iter(&self) -> impl Iterator<Item = DataConstProxy<'a>> + '_ {
        let dataset = self.dataset;
        dataset
            .items
            .iter()
            .filter(move |(name, _)| self.contains(name))
            .map(move |(name, item)| DataConstProxy::new(dataset, name, item, self.slices.clone()))
    }

    pub fn coords(&self) -> Result<Items<'a, Dim>> {
        Items::sliced(&self.dataset.coords, &self.slices, |_, _| true)
    }

    pub fn labels(&self) -> Result<Items<'a, String>> {
        Items::sliced(&self.dataset.labels, &self.slices, |_, _| true)
    }

    pub fn masks(&self) -> Result<Items<'a, String>> {
        Items::sliced(&self.dataset.masks, &self.slices, |_, _| true)
    }

    pub fn attrs(&self) -> Result<Items<'a, String>> {
        Items::sliced(&self.dataset.attrs, &self.slices, |_, _| true)
    }

    /// Extents of the dense dimensions after slicing.
    pub fn dimensions(&self) -> BTreeMap<Dim, usize> {
        let mut dims = self.dataset.dimensions();
        for (slice, _) in &self.slices {
            match slice.end() {
                None => dims.remove(&slice.dim()),
                Some(end) => dims.insert(slice.dim(), end - slice.begin()),
            };
        }

        dims
    }

    pub fn slice(&self, slice: Slice) -> Result<Self> {
        let dim = slice.dim();
        let mut names = vec![];
        let mut extent: Option<usize> = None;
        for item in self.iter() {
            if let Some(held) = item.dims()?.get(dim) {
                names.push(item.name());
                extent = Some(extent.map_or(held, |extent| extent.min(held)));
            }
        }
        let extent = match extent {
            Some(extent) => extent,
            None => self.dimensions().get(&dim).copied().ok_or_else(|| {
                Error::dimension(format!("Cannot apply {slice}, dataset does not have {dim}."))
            })?,
        };
        Dimensions::from_pairs(&[(dim, extent)])?.check_slice(&slice)?;
        log::trace!("slice: {slice} of {} items", names.len());

        let mut slices = self.slices.clone();
        slices.push((slice, extent));

        Ok(Self {
            dataset: self.dataset,
            names,
            slices,
        })
    }

    pub fn slices(&self) -> Vec<Slice> {
        self.slices.iter().map(|&(slice, _)| slice).collect()
    }

    pub(crate) fn slice_list(&self) -> &[(Slice, usize)] {
        &self.slices
    }

    /// Keep the slices without borrowing the dataset.
    pub fn detach(&self) -> DetachedSlice {
        DetachedSlice {
            slices: self.slices(),
            epoch: self.dataset.epoch(),
        }
    }

    /// Deep copy of the viewed part of the dataset.
    pub fn to_dataset(&self) -> Result<Dataset> {
        let mut dataset = Dataset::new();
        for (&dim, coord) in self.coords()?.iter() {
            dataset.set_coord(dim, coord.to_owned())?;
        }
        for (name, labels) in self.labels()?.iter() {
            dataset.set_labels(name, labels.to_owned())?;
        }
        for (name, mask) in self.masks()?.iter() {
            dataset.set_mask(name, mask.to_owned())?;
        }
        for (name, attr) in self.attrs()?.iter() {
            dataset.set_attr(name, attr.to_owned())?;
        }
        for item in self.iter() {
            dataset.set_item(item.name(), &item)?;
        }

        Ok(dataset)
    }
}

impl PartialEq for DatasetConstProxy<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && both_equal(self.coords(), other.coords())
            && both_equal(self.labels(), other.labels())
            && both_equal(self.masks(), other.masks())
            && both_equal(self.attrs(), other.attrs())
            && self
                .iter()
                .all(|item| other.item(item.name()).map_or(false, |other| item == other))
    }
}

/// Mutable view of a dataset, possibly sliced. Like [`DataProxy`], it gives access to values but
/// cannot change the structure of the dataset.
#[derive(Debug)]
pub struct DatasetProxy<'a> {
    dataset: &'a mut Dataset,
    names: Vec<String>,
    slices: SliceList,
}

impl<'a> DatasetProxy<'a> {
    pub(crate) fn new(dataset: &'a mut Dataset) -> Self {
        let names = dataset.items.keys().cloned().collect();
        Self {
            dataset,
            names,
            slices: vec![],
        }
    }

    pub fn as_const(&self) -> DatasetConstProxy<'_> {
        DatasetConstProxy {
            dataset: &*self.dataset,
            names: self.names.iter().map(String::as_str).collect(),
            slices: self.slices.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn slice(self, slice: Slice) -> Result<Self> {
        let (names, slices) = {
            let sliced = self.as_const().slice(slice)?;
            let names: Vec<String> = sliced.names().map(str::to_string).collect();
            (names, sliced.slices)
        };

        Ok(Self {
            dataset: self.dataset,
            names,
            slices,
        })
    }

    pub fn item_mut(&mut self, name: &str) -> Result<DataProxy<'_>> {
        if !self.names.iter().any(|held| held == name) {
            return Err(Error::not_found(format!(
                "Could not find data with name {name}."
            )));
        }
        DataProxy::find(self.dataset, name, self.slices.clone())
            .ok_or_else(|| Error::not_found(format!("Could not find data with name {name}.")))
    }

    pub fn coord_mut(&mut self, dim: Dim) -> Result<VariableView<'_>> {
        let coord = self
            .dataset
            .coords
            .get_mut(&dim)
            .ok_or_else(|| Error::not_found(format!("Could not find coordinate for {dim}.")))?;
        make_slice_mut(coord, &self.slices)
    }

    pub fn labels_mut(&mut self, name: &str) -> Result<VariableView<'_>> {
        let labels = self
            .dataset
            .labels
            .get_mut(name)
            .ok_or_else(|| Error::not_found(format!("Could not find labels {name}.")))?;
        make_slice_mut(labels, &self.slices)
    }

    pub fn mask_mut(&mut self, name: &str) -> Result<VariableView<'_>> {
        let mask = self
            .dataset
            .masks
            .get_mut(name)
            .ok_or_else(|| Error::not_found(format!("Could not find mask {name}.")))?;
        make_slice_mut(mask, &self.slices)
    }

    pub fn attr_mut(&mut self, name: &str) -> Result<VariableView<'_>> {
        let attr = self
            .dataset
            .attrs
            .get_mut(name)
            .ok_or_else(|| Error::not_found(format!("Could not find attribute {name}.")))?;
        make_slice_mut(attr, &self.slices)
    }

    /// `data op= value` for every item with values.
    pub fn apply_scalar(&mut self, op: BinaryOp, value: f64) -> Result<()> {
        for name in self.names.clone() {
            let mut item = self.item_mut(&name)?;
            if item.as_const().has_data() {
                item.data_mut()?.apply_scalar(op, value)?;
            }
        }

        Ok(())
    }
}

/// Anything that can be viewed as a read-only dataset proxy.
pub trait AsDatasetProxy {
    fn as_proxy(&self) -> DatasetConstProxy<'_>;
}

impl AsDatasetProxy for Dataset {
    fn as_proxy(&self) -> DatasetConstProxy<'_> {
        DatasetConstProxy::new(self)
    }
}

impl AsDatasetProxy for DatasetConstProxy<'_> {
    fn as_proxy(&self) -> DatasetConstProxy<'_> {
        self.clone()
    }
}

impl AsDatasetProxy for DatasetProxy<'_> {
    fn as_proxy(&self) -> DatasetConstProxy<'_> {
        self.as_const()
    }
}
