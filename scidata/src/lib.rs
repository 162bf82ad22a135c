//! Labeled, unit-aware multi-dimensional arrays.
//!
//! A [`Variable`] is an n-dimensional array with named dimensions, a physical unit, and optional
//! variances. A [`Dataset`] groups variables that share dimensions into coordinates, labels,
//! masks, attributes, and named data items, and keeps their extents consistent, including bin
//! edge coordinates that hold one more element than the data they bin.

mod concept;
mod dataset;
mod dim;
mod dimensions;
mod dtype;
mod errors;
mod extents;
mod item_map;
mod proxy;
mod slice;
mod units;
mod variable;

pub mod arithmetic;
pub mod config;
pub mod counts;
pub mod dataset_ops;
pub mod rebin;
pub mod shape;

#[cfg(test)]
mod testing;

pub use concept::BinaryOp;
pub use concept::ConceptView;
pub use concept::ConceptViewMut;
pub use concept::Element;
pub use concept::VariableConcept;
pub use dataset::Dataset;
pub use dim::Dim;
pub use dimensions::Dimensions;
pub use dtype::Capability;
pub use dtype::DType;
pub use dtype::Vector3d;
pub use errors::Error;
pub use errors::Result;
pub use extents::Extent;
pub use extents::ExtentTable;
pub use proxy::AsDatasetProxy;
pub use proxy::DataConstProxy;
pub use proxy::DataProxy;
pub use proxy::DatasetConstProxy;
pub use proxy::DatasetProxy;
pub use proxy::DetachedSlice;
pub use proxy::Items;
pub use slice::Slice;
pub use units::Unit;
pub use variable::AsVariableView;
pub use variable::Tag;
pub use variable::Variable;
pub use variable::VariableConstView;
pub use variable::VariableView;
