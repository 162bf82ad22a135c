use std::{
    fmt,
    ops::{Div, Mul},
};

use crate::errors::{Error, Result};

const N_BASE: usize = 7;

/// Base units a [`Unit`] is composed of, in display order.
const BASE_NAMES: [&str; N_BASE] = ["counts", "m", "s", "us", "K", "Angstrom", "meV"];

const COUNTS: usize = 0;
const METER: usize = 1;
const SECOND: usize = 2;
const MICROSECOND: usize = 3;
const KELVIN: usize = 4;
const ANGSTROM: usize = 5;
const MEV: usize = 6;

/// Physical unit as a product of integer powers of base units.
///
/// No conversion between base units is attempted, so `m` and `Angstrom` are unrelated units.
///
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Unit {
    powers: [i8; N_BASE],
}

impl Unit {
    fn base(index: usize) -> Self {
        let mut powers = [0; N_BASE];
        powers[index] = 1;

        Self { powers }
    }

    pub fn dimensionless() -> Self {
        Self::default()
    }

    pub fn counts() -> Self {
        Self::base(COUNTS)
    }

    pub fn m() -> Self {
        Self::base(METER)
    }

    pub fn s() -> Self {
        Self::base(SECOND)
    }

    pub fn us() -> Self {
        Self::base(MICROSECOND)
    }

    pub fn kelvin() -> Self {
        Self::base(KELVIN)
    }

    pub fn angstrom() -> Self {
        Self::base(ANGSTROM)
    }

    pub fn mev() -> Self {
        Self::base(MEV)
    }

    pub fn is_dimensionless(&self) -> bool {
        self.powers.iter().all(|&p| p == 0)
    }

    /// `true` for plain counts.
    pub fn is_counts(&self) -> bool {
        *self == Self::counts()
    }

    /// `true` for counts divided by some other unit, e.g. `counts/us`.
    pub fn is_counts_density(&self) -> bool {
        self.powers[COUNTS] == 1
            && self
                .powers
                .iter()
                .enumerate()
                .any(|(i, &p)| i != COUNTS && p != 0)
            && self
                .powers
                .iter()
                .enumerate()
                .all(|(i, &p)| i == COUNTS || p <= 0)
    }

    /// Integer power of a unit
    pub fn powi(&self, n: i8) -> Self {
        let mut powers = self.powers;
        for p in powers.iter_mut() {
            *p *= n;
        }

        Self { powers }
    }

    /// Square root of a unit.
    ///
    /// Fails unless all exponents are even.
    ///
    pub fn sqrt(&self) -> Result<Self> {
        if self.powers.iter().any(|p| p % 2 != 0) {
            return Err(Error::unit(format!("Unsupported unit as result of sqrt: sqrt({self}).")));
        }
        let mut powers = self.powers;
        for p in powers.iter_mut() {
            *p /= 2;
        }

        Ok(Self { powers })
    }

    /// Fails unless `self` and `other` are the same unit.
    pub fn expect_equal(&self, other: &Unit) -> Result<()> {
        if self == other {
            Ok(())
        } else {
            Err(Error::unit(format!("Expected {self} to be equal to {other}.")))
        }
    }
}

impl Mul for Unit {
    type Output = Unit;

    fn mul(self, other: Unit) -> Unit {
        let mut powers = self.powers;
        for (p, q) in powers.iter_mut().zip(other.powers) {
            *p += q;
        }

        Unit { powers }
    }
}

impl Div for Unit {
    type Output = Unit;

    fn div(self, other: Unit) -> Unit {
        self * other.powi(-1)
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dimensionless() {
            return write!(f, "dimensionless");
        }

        let factor = |p: i8, name: &str| match p {
            1 => name.to_string(),
            p => format!("{name}^{p}"),
        };
        let numerator: Vec<String> = BASE_NAMES
            .iter()
            .zip(self.powers)
            .filter(|(_, p)| *p > 0)
            .map(|(name, p)| factor(p, *name))
            .collect();
        let denominator: Vec<String> = BASE_NAMES
            .iter()
            .zip(self.powers)
            .filter(|(_, p)| *p < 0)
            .map(|(name, p)| factor(-p, *name))
            .collect();

        let numerator = if numerator.is_empty() {
            "1".to_string()
        } else {
            numerator.join("*")
        };
        if denominator.is_empty() {
            write!(f, "{numerator}")
        } else {
            write!(f, "{numerator}/{}", denominator.join("/"))
        }
    }
}
