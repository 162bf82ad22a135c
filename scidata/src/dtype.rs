use std::{
    fmt,
    ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Sub, SubAssign},
};

/// Runtime tag of the element type held by a variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DType {
    F64,
    F32,
    I64,
    I32,
    Bool,
    String,
    Vector3d,
    SparseF64,
    SparseF32,
}

/// Operations an element type supports, each level including the ones below it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Capability {
    None,
    Addable,
    Arithmetic,
    FloatingPoint,
}

impl DType {
    pub fn capability(self) -> Capability {
        match self {
            Self::F64 | Self::F32 => Capability::FloatingPoint,
            Self::I64 | Self::I32 | Self::Vector3d => Capability::Arithmetic,
            Self::SparseF64 | Self::SparseF32 => Capability::Addable,
            Self::Bool | Self::String => Capability::None,
        }
    }

    pub fn supports(self, capability: Capability) -> bool {
        self.capability() >= capability
    }

    pub fn is_sparse(self) -> bool {
        matches!(self, Self::SparseF64 | Self::SparseF32)
    }

    pub fn is_float(self) -> bool {
        matches!(self, Self::F64 | Self::F32)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::F64 => "float64",
            Self::F32 => "float32",
            Self::I64 => "int64",
            Self::I32 => "int32",
            Self::Bool => "bool",
            Self::String => "string",
            Self::Vector3d => "vector_3_float64",
            Self::SparseF64 => "sparse_float64",
            Self::SparseF32 => "sparse_float32",
        };
        write!(f, "{name}")
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "any",
            Self::Addable => "addable",
            Self::Arithmetic => "arithmetic",
            Self::FloatingPoint => "floating-point",
        };
        write!(f, "{name}")
    }
}

/// Cartesian 3-vector, e.g. a detector position.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vector3d(pub [f64; 3]);

impl Vector3d {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self([x, y, z])
    }

    pub fn norm(&self) -> f64 {
        self.0.iter().map(|c| c * c).sum::<f64>().sqrt()
    }
}

impl Add for Vector3d {
    type Output = Vector3d;

    fn add(mut self, other: Vector3d) -> Vector3d {
        self += other;
        self
    }
}

impl Sub for Vector3d {
    type Output = Vector3d;

    fn sub(mut self, other: Vector3d) -> Vector3d {
        self -= other;
        self
    }
}

impl Mul<f64> for Vector3d {
    type Output = Vector3d;

    fn mul(mut self, factor: f64) -> Vector3d {
        self *= factor;
        self
    }
}

impl Div<f64> for Vector3d {
    type Output = Vector3d;

    fn div(mut self, divisor: f64) -> Vector3d {
        self /= divisor;
        self
    }
}

impl AddAssign for Vector3d {
    fn add_assign(&mut self, other: Vector3d) {
        for (a, b) in self.0.iter_mut().zip(other.0) {
            *a += b;
        }
    }
}

impl SubAssign for Vector3d {
    fn sub_assign(&mut self, other: Vector3d) {
        for (a, b) in self.0.iter_mut().zip(other.0) {
            *a -= b;
        }
    }
}

/// Element-wise product
impl MulAssign for Vector3d {
    fn mul_assign(&mut self, other: Vector3d) {
        for (a, b) in self.0.iter_mut().zip(other.0) {
            *a *= b;
        }
    }
}

/// Element-wise quotient
impl DivAssign for Vector3d {
    fn div_assign(&mut self, other: Vector3d) {
        for (a, b) in self.0.iter_mut().zip(other.0) {
            *a /= b;
        }
    }
}

impl MulAssign<f64> for Vector3d {
    fn mul_assign(&mut self, factor: f64) {
        for a in self.0.iter_mut() {
            *a *= factor;
        }
    }
}

impl DivAssign<f64> for Vector3d {
    fn div_assign(&mut self, divisor: f64) {
        for a in self.0.iter_mut() {
            *a /= divisor;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities() {
        assert!(DType::F64.supports(Capability::FloatingPoint));
        assert!(DType::F32.supports(Capability::Addable));
        assert!(DType::I32.supports(Capability::Arithmetic));
        assert!(!DType::I64.supports(Capability::FloatingPoint));
        assert!(DType::Vector3d.supports(Capability::Arithmetic));
        assert!(DType::SparseF64.supports(Capability::Addable));
        assert!(!DType::SparseF64.supports(Capability::Arithmetic));
        assert!(!DType::String.supports(Capability::Addable));
        assert!(DType::Bool.supports(Capability::None));
    }

    #[test]
    fn test_vector3d() {
        let a = Vector3d::new(3.0, 0.0, 4.0);
        assert_eq!(a.norm(), 5.0);
        assert_eq!(a + a, a * 2.0);
        assert_eq!(a - a, Vector3d::default());
        assert_eq!((a * 4.0) / 2.0, a * 2.0);
    }
}
