use crate::error::ParseError;
use crate::expression::{CompiledFunction, Compiler};
use crate::newton::{run_with, RunParameters, Safeguards};
use crate::symbolic::differentiate;
use crate::trace::RunOutcome;
use anyhow::{bail, Result};
use log::debug;
use serde::{Deserialize, Serialize};

/// Where the derivative of a [`Problem`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivativeOrigin {
    Supplied,
    Derived,
}

/// A function together with the derivative Newton's method will use.
#[derive(Debug, Clone, PartialEq)]
pub struct Problem {
    function: CompiledFunction,
    derivative: CompiledFunction,
    origin: DerivativeOrigin,
}

/// Result of comparing the derivative against the dual-number slope of the
/// function on a grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivativeCheck {
    pub samples: usize,
    pub checked: usize,
    pub skipped: usize,
    pub max_deviation: f64,
    /// Grid point of `max_deviation`, if any point was checked.
    pub worst_point: Option<f64>,
    pub within_tolerance: bool,
}

impl Problem {
    /// Compiles `function_text` over `x`. A missing or blank derivative text
    /// means the derivative is derived symbolically.
    pub fn compile(function_text: &str, derivative_text: Option<&str>) -> Result<Self, ParseError> {
        Self::with_compiler(&Compiler::default(), function_text, derivative_text)
    }

    pub fn with_compiler(
        compiler: &Compiler,
        function_text: &str,
        derivative_text: Option<&str>,
    ) -> Result<Self, ParseError> {
        let function = compiler.compile(function_text)?;
        let supplied = derivative_text.map(str::trim).filter(|text| !text.is_empty());
        let (derivative, origin) = match supplied {
            Some(text) => (compiler.compile(text)?, DerivativeOrigin::Supplied),
            None => {
                let derived = compiler.compile_expr(differentiate(function.expr()));
                debug!("derived f'({}) = {}", compiler.variable(), derived.source());
                (derived, DerivativeOrigin::Derived)
            }
        };
        Ok(Self {
            function,
            derivative,
            origin,
        })
    }

    pub fn function(&self) -> &CompiledFunction {
        &self.function
    }

    pub fn derivative(&self) -> &CompiledFunction {
        &self.derivative
    }

    pub fn origin(&self) -> DerivativeOrigin {
        self.origin
    }

    pub fn variable(&self) -> &str {
        self.function.variable()
    }

    pub fn function_text(&self) -> &str {
        self.function.source()
    }

    pub fn derivative_text(&self) -> &str {
        self.derivative.source()
    }

    pub fn run(&self, params: &RunParameters) -> Result<RunOutcome> {
        self.run_with(params, &Safeguards::default())
    }

    pub fn run_with(&self, params: &RunParameters, safeguards: &Safeguards) -> Result<RunOutcome> {
        run_with(&self.function, &self.derivative, params, safeguards)
    }

    /// Compares the derivative with the exact slope of the function at
    /// `samples` evenly spaced points of `[start, end]`.
    pub fn check_derivative(
        &self,
        start: f64,
        end: f64,
        samples: usize,
        tolerance: f64,
    ) -> Result<DerivativeCheck> {
        if !start.is_finite() || !end.is_finite() {
            bail!("start and end must be finite.");
        }
        if start >= end {
            bail!("start must be less than end.");
        }
        if samples < 2 {
            bail!("samples must be at least 2.");
        }
        if !(tolerance >= 0.0) || !tolerance.is_finite() {
            bail!("tolerance must be non-negative and finite.");
        }

        let step = (end - start) / (samples - 1) as f64;
        let mut checked = 0;
        let mut skipped = 0;
        let mut max_deviation = 0.0_f64;
        let mut worst_point = None;

        for i in 0..samples {
            let x = if i + 1 == samples {
                end
            } else {
                start + step * i as f64
            };
            let slope = self.function.eval_with_slope(x).map(|(_, slope)| slope);
            let (Ok(slope), Ok(value)) = (slope, self.derivative.eval(x)) else {
                skipped += 1;
                continue;
            };
            checked += 1;
            let deviation = (value - slope).abs();
            if worst_point.is_none() || deviation > max_deviation {
                max_deviation = deviation;
                worst_point = Some(x);
            }
        }

        Ok(DerivativeCheck {
            samples,
            checked,
            skipped,
            max_deviation,
            worst_point,
            within_tolerance: checked > 0 && max_deviation <= tolerance,
        })
    }
}
