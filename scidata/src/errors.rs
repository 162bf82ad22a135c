use std::result;

use thiserror::Error;

use crate::dtype::DType;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Element type mismatch or missing capability
    #[error("Type error: {0}")]
    Type(String),

    /// Shape or rank mismatch, invalid slice, sparse/dense conflict
    #[error("Dimension error: {0}")]
    Dimension(String),

    /// Dimension merge rejected an extent while inserting into a dataset
    #[error("Length mismatch on insertion: {0}")]
    LengthMismatch(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unit error: {0}")]
    Unit(String),

    #[error("Variances error: {0}")]
    Variances(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// A detached slice was attached to a dataset that changed structurally since.
    #[error("Stale proxy: created at epoch {created}, dataset is at epoch {current}")]
    StaleProxy { created: u64, current: u64 },
}

impl Error {
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::Type(msg.into())
    }

    pub fn dimension(msg: impl Into<String>) -> Self {
        Self::Dimension(msg.into())
    }

    pub fn length_mismatch(msg: impl Into<String>) -> Self {
        Self::LengthMismatch(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn unit(msg: impl Into<String>) -> Self {
        Self::Unit(msg.into())
    }

    pub fn variances(msg: impl Into<String>) -> Self {
        Self::Variances(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn not_implemented(msg: impl Into<String>) -> Self {
        Self::NotImplemented(msg.into())
    }

    /// Error for a checked cast from erased storage to a concrete element type.
    pub(crate) fn dtype_mismatch(expected: DType, actual: DType) -> Self {
        Self::Type(format!("Expected item dtype {expected}, got {actual}."))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type Result<T> = result::Result<T, Error>;
