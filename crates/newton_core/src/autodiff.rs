use crate::traits::Scalar;
use num_traits::{One, Zero};
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Dual number for forward-mode AD.
/// val: value
/// eps: derivative with respect to the seeded variable
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Dual {
    pub val: f64,
    pub eps: f64,
}

impl Dual {
    pub fn new(val: f64, eps: f64) -> Self {
        Self { val, eps }
    }

    /// Seeds the independent variable: d/dx x = 1.
    pub fn variable(val: f64) -> Self {
        Self::new(val, 1.0)
    }
}

impl Zero for Dual {
    fn zero() -> Self {
        Self::new(0.0, 0.0)
    }
    fn is_zero(&self) -> bool {
        self.val == 0.0 && self.eps == 0.0
    }
}

impl One for Dual {
    fn one() -> Self {
        Self::new(1.0, 0.0)
    }
}

impl Add for Dual {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.val + rhs.val, self.eps + rhs.eps)
    }
}

impl Sub for Dual {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.val - rhs.val, self.eps - rhs.eps)
    }
}

impl Mul for Dual {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::new(self.val * rhs.val, self.val * rhs.eps + self.eps * rhs.val)
    }
}

impl Div for Dual {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        let denom = rhs.val * rhs.val;
        Self::new(
            self.val / rhs.val,
            (self.eps * rhs.val - self.val * rhs.eps) / denom,
        )
    }
}

impl Neg for Dual {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.val, -self.eps)
    }
}

impl Scalar for Dual {
    fn constant(value: f64) -> Self {
        Self::new(value, 0.0)
    }

    fn value(self) -> f64 {
        self.val
    }

    fn powf(self, n: Self) -> Self {
        let val_pow = self.val.powf(n.val);
        // A constant exponent must not touch ln(base): the base may be negative.
        let eps_new = if n.eps == 0.0 {
            n.val * self.val.powf(n.val - 1.0) * self.eps
        } else {
            val_pow * (n.eps * self.val.ln() + n.val * self.eps / self.val)
        };
        Self::new(val_pow, eps_new)
    }

    fn sqrt(self) -> Self {
        let s = self.val.sqrt();
        Self::new(s, self.eps / (2.0 * s))
    }

    fn exp(self) -> Self {
        let e = self.val.exp();
        Self::new(e, e * self.eps)
    }

    fn ln(self) -> Self {
        Self::new(self.val.ln(), self.eps / self.val)
    }

    fn sin(self) -> Self {
        Self::new(self.val.sin(), self.eps * self.val.cos())
    }

    fn cos(self) -> Self {
        Self::new(self.val.cos(), -self.eps * self.val.sin())
    }

    fn tan(self) -> Self {
        let t = self.val.tan();
        Self::new(t, self.eps * (1.0 + t * t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_rule_is_carried_by_eps() {
        let x = Dual::variable(3.0);
        let y = x * x + Dual::constant(2.0) * x;
        assert_eq!(y.val, 15.0);
        assert_eq!(y.eps, 8.0);
    }

    #[test]
    fn quotient_matches_closed_form() {
        let x = Dual::variable(2.0);
        let y = Dual::one() / x;
        assert!((y.val - 0.5).abs() < 1e-15);
        assert!((y.eps + 0.25).abs() < 1e-15);
    }

    #[test]
    fn constant_exponent_handles_negative_base() {
        let x = Dual::variable(-2.0);
        let y = x.powf(Dual::constant(3.0));
        assert_eq!(y.val, -8.0);
        assert!((y.eps - 12.0).abs() < 1e-12);
    }

    #[test]
    fn variable_exponent_uses_log_rule() {
        // d/dx 2^x = 2^x ln 2
        let x = Dual::variable(3.0);
        let y = Dual::constant(2.0).powf(x);
        assert!((y.val - 8.0).abs() < 1e-12);
        assert!((y.eps - 8.0 * 2f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn transcendental_slopes() {
        let x = Dual::variable(0.5);
        assert!((x.sin().eps - 0.5f64.cos()).abs() < 1e-15);
        assert!((x.cos().eps + 0.5f64.sin()).abs() < 1e-15);
        assert!((x.exp().eps - 0.5f64.exp()).abs() < 1e-15);
        assert!((x.ln().eps - 2.0).abs() < 1e-15);
        assert!((x.sqrt().eps - 0.5 / 0.5f64.sqrt()).abs() < 1e-15);
        let t = 0.5f64.tan();
        assert!((x.tan().eps - (1.0 + t * t)).abs() < 1e-15);
    }
}
