//! A collection of data items sharing coordinates, labels, masks and attributes, with one
//! consistent extent per dimension.

use std::{borrow::Borrow, collections::BTreeMap, fmt};

use crate::{
    dim::Dim,
    dimensions::Dimensions,
    dtype::DType,
    errors::{Error, Result},
    extents::ExtentTable,
    item_map::ItemMap,
    proxy::{DataConstProxy, DataProxy, DatasetConstProxy, DatasetProxy, DetachedSlice, Items},
    slice::Slice,
    variable::{Tag, Variable, VariableView},
};

/// One named entry of a dataset.
///
/// An item has values, a sparse coordinate, or both. Sparse labels require one of the two.
///
#[derive(Clone, Debug, Default)]
pub(crate) struct DataItem {
    pub(crate) data: Option<Variable>,
    pub(crate) coord: Option<Variable>,
    pub(crate) labels: ItemMap<String, Variable>,
    pub(crate) attrs: ItemMap<String, Variable>,
}

impl DataItem {
    /// Dimensions of the values, or of the sparse coordinate if there are no values.
    pub(crate) fn dims(&self) -> Option<&Dimensions> {
        self.data.as_ref().or(self.coord.as_ref()).map(Variable::dims)
    }
}

/// Variables keyed by role, plus the extent table that keeps their dimensions consistent.
///
/// Every insertion is checked against the extents established so far, allowing a
/// dimension-coordinate to hold one more element than the data along its dimension (bin
/// edges). Removing or replacing a variable recomputes the table from the remaining variables.
///
/// Proxies borrow the dataset, so a structural mutation cannot happen while one is alive. A
/// [`DetachedSlice`] records the epoch it was taken at and is rejected by [`Dataset::attach`]
/// once the dataset has changed.
///
#[derive(Clone, Debug, Default)]
pub struct Dataset {
    pub(crate) coords: ItemMap<Dim, Variable>,
    pub(crate) labels: ItemMap<String, Variable>,
    pub(crate) masks: ItemMap<String, Variable>,
    pub(crate) attrs: ItemMap<String, Variable>,
    pub(crate) items: ItemMap<String, DataItem>,
    extents: ExtentTable,
    epoch: u64,
}

type Slot<K> = fn(&mut Dataset) -> &mut ItemMap<K, Variable>;

fn expect_dense(variable: &Variable, role: &str) -> Result<()> {
    if variable.dims().is_sparse() {
        Err(Error::dimension(format!(
            "Cannot insert sparse variable as {role}, dimensions are {}.",
            variable.dims()
        )))
    } else {
        Ok(())
    }
}

fn expect_sparse(variable: &Variable, role: &str) -> Result<Dim> {
    variable.dims().sparse_dim().ok_or_else(|| {
        Error::dimension(format!(
            "Variable passed as {role} does not contain sparse data, dimensions are {}.",
            variable.dims()
        ))
    })
}

fn missing(what: impl fmt::Display) -> Error {
    Error::not_found(format!("Could not find {what} in dataset."))
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dataset with one data item per `(name, values)` pair.
    pub fn from_items<S: Into<String>>(items: impl IntoIterator<Item = (S, Variable)>) -> Result<Self> {
        let mut dataset = Self::new();
        for (name, data) in items {
            dataset.set_data(&name.into(), data)?;
        }

        Ok(dataset)
    }

    /// Number of data items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.contains(name)
    }

    /// Names of the data items in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    /// Generation counter, incremented by every structural mutation.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Logical extents of all dense dimensions. Bin edges are not counted.
    pub fn dimensions(&self) -> BTreeMap<Dim, usize> {
        self.extents.dimensions()
    }

    pub fn extents(&self) -> &ExtentTable {
        &self.extents
    }

    pub fn coords(&self) -> Items<'_, Dim> {
        Items::full(&self.coords)
    }

    pub fn labels(&self) -> Items<'_, String> {
        Items::full(&self.labels)
    }

    pub fn masks(&self) -> Items<'_, String> {
        Items::full(&self.masks)
    }

    pub fn attrs(&self) -> Items<'_, String> {
        Items::full(&self.attrs)
    }

    /// The data item `name`, with the coordinates, labels and masks that apply to it.
    pub fn item(&self, name: &str) -> Result<DataConstProxy<'_>> {
        self.find(name)
            .ok_or_else(|| missing(format_args!("data with name {name}")))
    }

    pub fn find(&self, name: &str) -> Option<DataConstProxy<'_>> {
        self.items
            .iter()
            .find(|(key, _)| key.as_str() == name)
            .map(|(key, item)| DataConstProxy::new(self, key, item, vec![]))
    }

    pub fn item_mut(&mut self, name: &str) -> Result<DataProxy<'_>> {
        DataProxy::find(self, name, vec![])
            .ok_or_else(|| missing(format_args!("data with name {name}")))
    }

    /// Data items in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = DataConstProxy<'_>> {
        self.items
            .iter()
            .map(move |(name, item)| DataConstProxy::new(self, name, item, vec![]))
    }

    pub fn as_proxy(&self) -> DatasetConstProxy<'_> {
        DatasetConstProxy::new(self)
    }

    pub fn as_proxy_mut(&mut self) -> DatasetProxy<'_> {
        DatasetProxy::new(self)
    }

    pub fn slice(&self, slice: Slice) -> Result<DatasetConstProxy<'_>> {
        self.as_proxy().slice(slice)
    }

    pub fn slice_mut(&mut self, slice: Slice) -> Result<DatasetProxy<'_>> {
        self.as_proxy_mut().slice(slice)
    }

    /// Re-resolve a detached slice against this dataset.
    ///
    /// Fails with [`Error::StaleProxy`] if the dataset was structurally modified after the slice
    /// was detached.
    ///
    pub fn attach(&self, detached: &DetachedSlice) -> Result<DatasetConstProxy<'_>> {
        self.expect_epoch(detached)?;
        detached
            .slices()
            .iter()
            .try_fold(self.as_proxy(), |proxy, &slice| proxy.slice(slice))
    }

    pub fn attach_mut(&mut self, detached: &DetachedSlice) -> Result<DatasetProxy<'_>> {
        self.expect_epoch(detached)?;
        detached
            .slices()
            .iter()
            .try_fold(self.as_proxy_mut(), |proxy, &slice| proxy.slice(slice))
    }

    fn expect_epoch(&self, detached: &DetachedSlice) -> Result<()> {
        if detached.epoch() == self.epoch {
            Ok(())
        } else {
            Err(Error::StaleProxy {
                created: detached.epoch(),
                current: self.epoch,
            })
        }
    }

    pub fn coord_mut(&mut self, dim: Dim) -> Result<VariableView<'_>> {
        self.coords
            .get_mut(&dim)
            .map(Variable::view_mut)
            .ok_or_else(|| missing(format_args!("coordinate for {dim}")))
    }

    pub fn labels_mut(&mut self, name: &str) -> Result<VariableView<'_>> {
        self.labels
            .get_mut(name)
            .map(Variable::view_mut)
            .ok_or_else(|| missing(format_args!("labels {name}")))
    }

    pub fn mask_mut(&mut self, name: &str) -> Result<VariableView<'_>> {
        self.masks
            .get_mut(name)
            .map(Variable::view_mut)
            .ok_or_else(|| missing(format_args!("mask {name}")))
    }

    pub fn attr_mut(&mut self, name: &str) -> Result<VariableView<'_>> {
        self.attrs
            .get_mut(name)
            .map(Variable::view_mut)
            .ok_or_else(|| missing(format_args!("attribute {name}")))
    }

    /// Insert or replace the dimension-coordinate for `dim`.
    ///
    /// The coordinate may have one more element along `dim` than the data, in which case it
    /// holds bin edges.
    ///
    pub fn set_coord(&mut self, dim: Dim, mut coord: Variable) -> Result<()> {
        expect_dense(&coord, "coordinate")?;
        coord.set_tag(Tag::Coord);
        log::debug!("set_coord: {dim} with dimensions {}", coord.dims());
        self.insert_variable(|dataset| &mut dataset.coords, dim, coord, Some(dim))
    }

    /// Insert or replace the labels `name`. Label names are unrelated to item names.
    pub fn set_labels(&mut self, name: &str, mut labels: Variable) -> Result<()> {
        expect_dense(&labels, "labels")?;
        labels.set_tag(Tag::Labels);
        labels.set_name(name);
        log::debug!("set_labels: {name} with dimensions {}", labels.dims());
        self.insert_variable(|dataset| &mut dataset.labels, name.to_string(), labels, None)
    }

    /// Insert or replace the mask `name`. Masks hold booleans.
    pub fn set_mask(&mut self, name: &str, mut mask: Variable) -> Result<()> {
        expect_dense(&mask, "mask")?;
        if mask.dtype() != DType::Bool {
            return Err(Error::type_error(format!(
                "Masks must hold booleans, got {}.",
                mask.dtype()
            )));
        }
        mask.set_tag(Tag::Mask);
        mask.set_name(name);
        log::debug!("set_mask: {name} with dimensions {}", mask.dims());
        self.insert_variable(|dataset| &mut dataset.masks, name.to_string(), mask, None)
    }

    /// Insert or replace the dataset attribute `name`.
    pub fn set_attr(&mut self, name: &str, mut attr: Variable) -> Result<()> {
        expect_dense(&attr, "attribute")?;
        attr.set_tag(Tag::Attr);
        attr.set_name(name);
        log::debug!("set_attr: {name} with dimensions {}", attr.dims());
        self.insert_variable(|dataset| &mut dataset.attrs, name.to_string(), attr, None)
    }

    /// Insert or replace the values of item `name`, creating the item if needed.
    ///
    /// Sparse values cannot be combined with a dense item and vice versa.
    ///
    pub fn set_data(&mut self, name: &str, mut data: Variable) -> Result<()> {
        data.set_tag(Tag::Data);
        data.set_name(name);
        log::debug!("set_data: {name} with dimensions {}", data.dims());

        match self.items.get_mut(name) {
            Some(item) => {
                let held = item.dims().map(Dimensions::sparse_dim);
                if held != Some(data.dims().sparse_dim()) {
                    return Err(Error::dimension(
                        "Cannot set dense values or variances if coordinates are sparse or vice \
                         versa.",
                    ));
                }
                let previous = item.data.replace(data);
                let name = name.to_string();
                self.rebuild_or_revert(move |dataset| {
                    if let Some(item) = dataset.items.get_mut(name.as_str()) {
                        item.data = previous;
                    }
                })?;
            }
            None => {
                self.extents.merge(data.dims(), None)?;
                self.items.insert(
                    name.to_string(),
                    DataItem {
                        data: Some(data),
                        ..DataItem::default()
                    },
                );
            }
        }
        self.epoch += 1;

        Ok(())
    }

    /// Insert a copy of `item` as `name`, including its coordinates, labels and masks.
    ///
    /// Coordinates, labels and masks already present must be equal to those of `item`.
    ///
    pub fn set_item(&mut self, name: &str, item: &DataConstProxy) -> Result<()> {
        let sparse_coord = item.sparse_coord()?;
        let sparse_dim = sparse_coord.as_ref().and_then(|coord| coord.dims().sparse_dim());
        for (&dim, coord) in item.coords()?.iter() {
            if Some(dim) == sparse_dim {
                continue;
            }
            match self.coords.get(&dim) {
                Some(held) if !held.view().same_content(coord) => {
                    return Err(Error::invalid_argument(format!(
                        "Cannot insert {name}: coordinate for {dim} does not match."
                    )));
                }
                Some(_) => {}
                None => self.set_coord(dim, coord.to_owned())?,
            }
        }
        for (key, labels) in item.labels()?.iter() {
            if labels.dims().is_sparse() {
                continue;
            }
            match self.labels.get(key.as_str()) {
                Some(held) if !held.view().same_content(labels) => {
                    return Err(Error::invalid_argument(format!(
                        "Cannot insert {name}: labels {key} do not match."
                    )));
                }
                Some(_) => {}
                None => self.set_labels(key, labels.to_owned())?,
            }
        }
        for (key, mask) in item.masks()?.iter() {
            match self.masks.get(key.as_str()) {
                Some(held) if !held.view().same_content(mask) => {
                    return Err(Error::invalid_argument(format!(
                        "Cannot insert {name}: mask {key} does not match."
                    )));
                }
                Some(_) => {}
                None => self.set_mask(key, mask.to_owned())?,
            }
        }

        if let Some(data) = item.data_opt()? {
            self.set_data(name, data.to_owned())?;
        }
        if let Some(coord) = sparse_coord {
            self.set_sparse_coord(name, coord.to_owned())?;
        }
        for (key, labels) in item.sparse_labels()?.iter() {
            self.set_sparse_labels(name, key, labels.to_owned())?;
        }
        for (key, attr) in item.attrs()?.iter() {
            self.set_item_attr(name, key, attr.to_owned())?;
        }

        Ok(())
    }

    /// Insert or replace the attribute `attr_name` of item `name`.
    ///
    /// The attribute must not have dimensions the item lacks.
    ///
    pub fn set_item_attr(&mut self, name: &str, attr_name: &str, mut attr: Variable) -> Result<()> {
        expect_dense(&attr, "attribute")?;
        let item = self
            .items
            .get_mut(name)
            .ok_or_else(|| missing(format_args!("data with name {name}")))?;
        let fits = item.dims().map_or(false, |dims| dims.contains_all(attr.dims()));
        if !fits {
            return Err(Error::dimension(
                "Attribute dimensions must match and not exceed dimensions of data.",
            ));
        }
        attr.set_tag(Tag::Attr);
        attr.set_name(attr_name);
        log::debug!("set_item_attr: {name}.{attr_name} with dimensions {}", attr.dims());
        item.attrs.insert(attr_name.to_string(), attr);
        self.epoch += 1;

        Ok(())
    }

    /// Insert or replace the sparse coordinate of item `name`, creating the item if needed.
    pub fn set_sparse_coord(&mut self, name: &str, mut coord: Variable) -> Result<()> {
        let sparse_dim = expect_sparse(&coord, "sparse coordinate")?;
        coord.set_tag(Tag::Coord);
        coord.set_name(name);
        log::debug!("set_sparse_coord: {name} with dimensions {}", coord.dims());

        match self.items.get_mut(name) {
            Some(item) => {
                let conflict = item
                    .data
                    .iter()
                    .chain(item.labels.values())
                    .any(|var| var.dims().sparse_dim() != Some(sparse_dim));
                if conflict {
                    return Err(Error::dimension(
                        "Cannot set sparse coordinate if values or variances are not sparse.",
                    ));
                }
                if item.coord.is_some() {
                    let previous = item.coord.replace(coord);
                    let name = name.to_string();
                    self.rebuild_or_revert(move |dataset| {
                        if let Some(item) = dataset.items.get_mut(name.as_str()) {
                            item.coord = previous;
                        }
                    })?;
                } else {
                    self.extents.merge(coord.dims(), None)?;
                    item.coord = Some(coord);
                }
            }
            None => {
                self.extents.merge(coord.dims(), None)?;
                self.items.insert(
                    name.to_string(),
                    DataItem {
                        coord: Some(coord),
                        ..DataItem::default()
                    },
                );
            }
        }
        self.epoch += 1;

        Ok(())
    }

    /// Insert or replace the sparse labels `label_name` of item `name`.
    ///
    /// The item must already have sparse values or a sparse coordinate.
    ///
    pub fn set_sparse_labels(&mut self, name: &str, label_name: &str, mut labels: Variable) -> Result<()> {
        let sparse_dim = expect_sparse(&labels, "sparse labels")?;
        labels.set_tag(Tag::Labels);
        labels.set_name(label_name);
        log::debug!(
            "set_sparse_labels: {name}.{label_name} with dimensions {}",
            labels.dims()
        );

        let item = self
            .items
            .get_mut(name)
            .ok_or_else(|| missing(format_args!("data with name {name}")))?;
        if item.data.is_none() && item.coord.is_none() {
            return Err(Error::dimension(
                "Cannot set sparse labels: Require either values or a sparse coord.",
            ));
        }
        let conflict = item
            .data
            .iter()
            .chain(item.coord.iter())
            .any(|var| var.dims().sparse_dim() != Some(sparse_dim));
        if conflict {
            return Err(Error::dimension(
                "Cannot set sparse labels if values or variances are not sparse.",
            ));
        }

        if item.labels.contains(label_name) {
            let previous = item.labels.insert(label_name.to_string(), labels);
            let (name, label_name) = (name.to_string(), label_name.to_string());
            self.rebuild_or_revert(move |dataset| {
                if let (Some(item), Some(previous)) = (dataset.items.get_mut(name.as_str()), previous) {
                    item.labels.insert(label_name, previous);
                }
            })?;
        } else {
            self.extents.merge(labels.dims(), None)?;
            item.labels.insert(label_name.to_string(), labels);
        }
        self.epoch += 1;

        Ok(())
    }

    /// Remove the data item `name` with its sparse coordinate, sparse labels and attributes.
    pub fn erase(&mut self, name: &str) -> Result<()> {
        self.items
            .remove(name)
            .ok_or_else(|| missing(format_args!("data with name {name}")))?;
        log::debug!("erase: {name}");
        self.commit_erase()
    }

    pub fn erase_coord(&mut self, dim: Dim) -> Result<Variable> {
        self.erase_variable(|dataset| &mut dataset.coords, &dim, "coordinate")
    }

    pub fn erase_labels(&mut self, name: &str) -> Result<Variable> {
        self.erase_variable(|dataset| &mut dataset.labels, name, "labels")
    }

    pub fn erase_mask(&mut self, name: &str) -> Result<Variable> {
        self.erase_variable(|dataset| &mut dataset.masks, name, "mask")
    }

    pub fn erase_attr(&mut self, name: &str) -> Result<Variable> {
        self.erase_variable(|dataset| &mut dataset.attrs, name, "attribute")
    }

    pub fn erase_item_attr(&mut self, name: &str, attr_name: &str) -> Result<Variable> {
        let attr = self
            .items
            .get_mut(name)
            .and_then(|item| item.attrs.remove(attr_name))
            .ok_or_else(|| missing(format_args!("attribute {attr_name} of {name}")))?;
        log::debug!("erase_item_attr: {name}.{attr_name}");
        self.epoch += 1;

        Ok(attr)
    }

    /// Remove the sparse coordinate of item `name`. An item left without values is removed.
    pub fn erase_sparse_coord(&mut self, name: &str) -> Result<Variable> {
        let item = self
            .items
            .get_mut(name)
            .ok_or_else(|| missing(format_args!("sparse data with name {name}")))?;
        let coord = item
            .coord
            .take()
            .ok_or_else(|| missing(format_args!("sparse coordinate of {name}")))?;
        if item.data.is_none() {
            self.items.remove(name);
        }
        log::debug!("erase_sparse_coord: {name}");
        self.commit_erase()?;

        Ok(coord)
    }

    pub fn erase_sparse_labels(&mut self, name: &str, label_name: &str) -> Result<Variable> {
        let labels = self
            .items
            .get_mut(name)
            .and_then(|item| item.labels.remove(label_name))
            .ok_or_else(|| missing(format_args!("sparse labels {label_name} of {name}")))?;
        log::debug!("erase_sparse_labels: {name}.{label_name}");
        self.commit_erase()?;

        Ok(labels)
    }

    /// Rename dimension `from` to `to` in every variable.
    ///
    /// Fails if `to` is already used. Does nothing if `from` is not used.
    ///
    pub fn rename(&mut self, from: Dim, to: Dim) -> Result<()> {
        if self.extents.contains(to) {
            return Err(Error::dimension(format!(
                "Cannot rename {from} to {to}, duplicate dimension."
            )));
        }
        if !self.extents.contains(from) {
            return Ok(());
        }

        log::debug!("rename: {from} to {to}");
        self.extents.rename(from, to);
        self.coords.rekey(&from, to);
        for variable in self.variables_mut() {
            variable.rename(from, to)?;
        }
        self.epoch += 1;

        Ok(())
    }

    /// Remove everything.
    pub fn clear(&mut self) {
        log::debug!("clear");
        self.coords.clear();
        self.labels.clear();
        self.masks.clear();
        self.attrs.clear();
        self.items.clear();
        self.extents.clear();
        self.epoch += 1;
    }

    fn variables_mut(&mut self) -> impl Iterator<Item = &mut Variable> {
        let items = self.items.values_mut().flat_map(|item| {
            item.data
                .iter_mut()
                .chain(item.coord.iter_mut())
                .chain(item.labels.values_mut())
                .chain(item.attrs.values_mut())
        });

        self.coords
            .values_mut()
            .chain(self.labels.values_mut())
            .chain(self.masks.values_mut())
            .chain(self.attrs.values_mut())
            .chain(items)
    }

    fn insert_variable<K: PartialEq + Clone>(
        &mut self,
        slot: Slot<K>,
        key: K,
        variable: Variable,
        coord_dim: Option<Dim>,
    ) -> Result<()> {
        if slot(self).contains(&key) {
            let previous = slot(self).insert(key.clone(), variable);
            self.rebuild_or_revert(move |dataset| {
                if let Some(previous) = previous {
                    slot(dataset).insert(key, previous);
                }
            })?;
        } else {
            self.extents.merge(variable.dims(), coord_dim)?;
            slot(self).insert(key, variable);
        }
        self.epoch += 1;

        Ok(())
    }

    fn erase_variable<K, Q>(&mut self, slot: Slot<K>, key: &Q, role: &str) -> Result<Variable>
    where
        K: PartialEq + Borrow<Q>,
        Q: PartialEq + fmt::Display + ?Sized,
    {
        let variable = slot(self)
            .remove(key)
            .ok_or_else(|| missing(format_args!("{role} {key}")))?;
        log::debug!("erase: {role} {key}");
        self.commit_erase()?;

        Ok(variable)
    }

    fn commit_erase(&mut self) -> Result<()> {
        self.extents = self.rebuild()?;
        self.epoch += 1;

        Ok(())
    }

    /// Recompute the table if the new state is consistent, otherwise call `revert` to restore the
    /// previous state.
    fn rebuild_or_revert(&mut self, revert: impl FnOnce(&mut Self)) -> Result<()> {
        match self.rebuild() {
            Ok(extents) => {
                self.extents = extents;
                Ok(())
            }
            Err(err) => {
                revert(self);
                Err(err)
            }
        }
    }

    /// Extent table computed from scratch. Data first, then coordinates, then everything else.
    fn rebuild(&self) -> Result<ExtentTable> {
        log::debug!("rebuilding extent table of dataset with {} items", self.len());
        let mut extents = ExtentTable::new();
        for dims in self.items.values().filter_map(DataItem::dims) {
            extents.merge(dims, None)?;
        }
        for (&dim, coord) in self.coords.iter() {
            extents.merge(coord.dims(), Some(dim))?;
        }
        let others = self
            .labels
            .values()
            .chain(self.masks.values())
            .chain(self.attrs.values());
        for variable in others {
            extents.merge(variable.dims(), None)?;
        }

        Ok(extents)
    }
}

impl PartialEq for Dataset {
    fn eq(&self, other: &Self) -> bool {
        self.as_proxy() == other.as_proxy()
    }
}

impl PartialEq<DatasetConstProxy<'_>> for Dataset {
    fn eq(&self, other: &DatasetConstProxy<'_>) -> bool {
        self.as_proxy() == *other
    }
}

impl PartialEq<Dataset> for DatasetConstProxy<'_> {
    fn eq(&self, other: &Dataset) -> bool {
        *self == other.as_proxy()
    }
}
