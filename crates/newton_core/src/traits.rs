use crate::error::DomainError;
use num_traits::{One, Zero};
use std::fmt::Debug;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// A trait for types an expression tree can be evaluated over.
/// `f64` gives plain values; `Dual` carries a slope alongside the value.
///
/// Domain checks are made on `value()`, so every implementor must expose the
/// real part it would report to the user.
pub trait Scalar:
    Copy
    + Debug
    + Zero
    + One
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + 'static
{
    /// Lifts a constant (zero slope) into the scalar type.
    fn constant(value: f64) -> Self;

    /// Real part of the scalar.
    fn value(self) -> f64;

    fn powf(self, exponent: Self) -> Self;
    fn sqrt(self) -> Self;
    fn exp(self) -> Self;
    fn ln(self) -> Self;
    fn sin(self) -> Self;
    fn cos(self) -> Self;
    fn tan(self) -> Self;
}

impl Scalar for f64 {
    fn constant(value: f64) -> Self {
        value
    }
    fn value(self) -> f64 {
        self
    }
    fn powf(self, exponent: Self) -> Self {
        f64::powf(self, exponent)
    }
    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }
    fn exp(self) -> Self {
        f64::exp(self)
    }
    fn ln(self) -> Self {
        f64::ln(self)
    }
    fn sin(self) -> Self {
        f64::sin(self)
    }
    fn cos(self) -> Self {
        f64::cos(self)
    }
    fn tan(self) -> Self {
        f64::tan(self)
    }
}

/// A real function of one real variable whose evaluation may be undefined.
///
/// The Newton iterator only ever talks to `f` and `f'` through this trait, so
/// compiled expressions and plain closures are interchangeable.
pub trait RealFunction {
    fn eval(&self, x: f64) -> Result<f64, DomainError>;
}

impl<F> RealFunction for F
where
    F: Fn(f64) -> Result<f64, DomainError>,
{
    fn eval(&self, x: f64) -> Result<f64, DomainError> {
        self(x)
    }
}
