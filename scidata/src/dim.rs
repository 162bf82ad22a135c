use std::fmt;

/// Label of a named axis.
///
/// Labels are a closed set so they can be compared and hashed cheaply and used as keys for
/// dimension-coordinates.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dim {
    Detector,
    Energy,
    Event,
    Position,
    Q,
    Row,
    Spectrum,
    Temperature,
    Time,
    Tof,
    X,
    Y,
    Z,
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dim::{self:?}")
    }
}
