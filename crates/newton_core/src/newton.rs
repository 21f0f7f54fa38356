use crate::trace::{IterationStep, Quantity, RunOutcome, StallReason, Termination};
use crate::traits::RealFunction;
use anyhow::{bail, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// `|f'(x)|` below this is treated as a vanishing derivative.
pub const DEFAULT_DERIVATIVE_FLOOR: f64 = 1e-12;
/// `|x_k|` above this is treated as divergence.
pub const DEFAULT_DIVERGENCE_BOUND: f64 = 1e10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunParameters {
    pub x0: f64,
    pub epsilon: f64,
    pub max_iter: usize,
}

impl RunParameters {
    pub fn new(x0: f64, epsilon: f64, max_iter: usize) -> Self {
        Self {
            x0,
            epsilon,
            max_iter,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.x0.is_finite() {
            bail!("x0 must be finite (got {}).", self.x0);
        }
        if !(self.epsilon > 0.0) || !self.epsilon.is_finite() {
            bail!("epsilon must be positive and finite (got {}).", self.epsilon);
        }
        if self.max_iter == 0 {
            bail!("max_iter must be greater than zero.");
        }
        Ok(())
    }
}

/// Numeric cut-offs of the iteration. Tunable, with documented defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Safeguards {
    pub derivative_floor: f64,
    pub divergence_bound: f64,
}

impl Default for Safeguards {
    fn default() -> Self {
        Self {
            derivative_floor: DEFAULT_DERIVATIVE_FLOOR,
            divergence_bound: DEFAULT_DIVERGENCE_BOUND,
        }
    }
}

impl Safeguards {
    pub fn validate(&self) -> Result<()> {
        if !(self.derivative_floor > 0.0) || !self.derivative_floor.is_finite() {
            bail!(
                "derivative_floor must be positive and finite (got {}).",
                self.derivative_floor
            );
        }
        if !(self.divergence_bound > 0.0) || !self.divergence_bound.is_finite() {
            bail!(
                "divergence_bound must be positive and finite (got {}).",
                self.divergence_bound
            );
        }
        Ok(())
    }
}

/// Resumable Newton-Raphson state machine.
///
/// Starts in `Running(0, x0)`; every [`Newton::step`] either completes one
/// iteration (appending to the trace) or moves to a terminal state. Once
/// terminated, further calls are no-ops.
pub struct Newton<F, G> {
    f: F,
    fprime: G,
    params: RunParameters,
    safeguards: Safeguards,
    k: usize,
    x: f64,
    // f(x) carried over from the previous iteration
    fx: Option<f64>,
    trace: Vec<IterationStep>,
    termination: Option<Termination>,
}

impl<F: RealFunction, G: RealFunction> Newton<F, G> {
    pub fn new(f: F, fprime: G, params: RunParameters, safeguards: Safeguards) -> Result<Self> {
        params.validate()?;
        safeguards.validate()?;
        Ok(Self {
            f,
            fprime,
            params,
            safeguards,
            k: 0,
            x: params.x0,
            fx: None,
            trace: Vec::with_capacity(params.max_iter.min(1024)),
            termination: None,
        })
    }

    pub fn params(&self) -> &RunParameters {
        &self.params
    }

    pub fn safeguards(&self) -> &Safeguards {
        &self.safeguards
    }

    /// Number of completed iterations.
    pub fn iterations(&self) -> usize {
        self.k
    }

    /// Current iterate `x_k`.
    pub fn current(&self) -> f64 {
        self.x
    }

    pub fn trace(&self) -> &[IterationStep] {
        &self.trace
    }

    pub fn termination(&self) -> Option<&Termination> {
        self.termination.as_ref()
    }

    pub fn is_done(&self) -> bool {
        self.termination.is_some()
    }

    /// Runs one iteration. Returns the terminal state once it is reached.
    pub fn step(&mut self) -> Option<&Termination> {
        if self.termination.is_some() {
            return self.termination.as_ref();
        }

        let k = self.k + 1;
        let x_prev = self.x;

        let fx_prev = match self.fx.take() {
            Some(value) => value,
            None => match self.f.eval(x_prev) {
                Ok(value) => value,
                Err(error) => {
                    return self.finish(Termination::NumericError {
                        iteration: k,
                        x: x_prev,
                        quantity: Quantity::Function,
                        error,
                    })
                }
            },
        };

        let dfx = match self.fprime.eval(x_prev) {
            Ok(value) => value,
            Err(error) => {
                return self.finish(Termination::NumericError {
                    iteration: k,
                    x: x_prev,
                    quantity: Quantity::Derivative,
                    error,
                })
            }
        };

        if dfx.abs() < self.safeguards.derivative_floor {
            return self.finish(Termination::ZeroDerivative {
                iteration: k,
                x: x_prev,
                derivative: dfx,
            });
        }

        let x_next = x_prev - fx_prev / dfx;
        if !x_next.is_finite() {
            return self.finish(Termination::DivergedOrStalled {
                last_iterate: x_next,
                iterations: k,
                reason: StallReason::NonFinite,
            });
        }

        let error = (x_next - x_prev).abs();
        let fx_next = match self.f.eval(x_next) {
            Ok(value) => value,
            Err(error) => {
                return self.finish(Termination::NumericError {
                    iteration: k,
                    x: x_next,
                    quantity: Quantity::Function,
                    error,
                })
            }
        };

        debug!("iteration {k}: x = {x_next:e}, f(x) = {fx_next:e}, error = {error:e}");
        self.trace.push(IterationStep {
            k,
            x: x_next,
            fx: fx_next,
            error,
        });
        self.k = k;
        self.x = x_next;
        self.fx = Some(fx_next);

        if error < self.params.epsilon {
            return self.finish(Termination::Converged {
                root: x_next,
                iterations: k,
            });
        }

        if x_next.abs() > self.safeguards.divergence_bound {
            return self.finish(Termination::DivergedOrStalled {
                last_iterate: x_next,
                iterations: k,
                reason: StallReason::MagnitudeBound {
                    bound: self.safeguards.divergence_bound,
                },
            });
        }

        if k >= self.params.max_iter {
            return self.finish(Termination::DivergedOrStalled {
                last_iterate: x_next,
                iterations: k,
                reason: StallReason::IterationBudget,
            });
        }

        None
    }

    /// Steps until a terminal state and returns the outcome.
    pub fn run_to_end(mut self) -> RunOutcome {
        while self.step().is_none() {}
        self.into_outcome()
            .unwrap_or_else(|| unreachable!("loop exits only once terminated"))
    }

    /// Snapshot of the outcome, or `None` while still running.
    pub fn outcome(&self) -> Option<RunOutcome> {
        let termination = self.termination.clone()?;
        Some(RunOutcome {
            termination,
            trace: self.trace.clone(),
        })
    }

    /// The outcome, or `None` while still running.
    pub fn into_outcome(self) -> Option<RunOutcome> {
        let termination = self.termination?;
        Some(RunOutcome {
            termination,
            trace: self.trace,
        })
    }

    fn finish(&mut self, termination: Termination) -> Option<&Termination> {
        match &termination {
            Termination::Converged { .. } => info!("newton: {termination}"),
            _ => warn!("newton: {termination}"),
        }
        self.termination = Some(termination);
        self.termination.as_ref()
    }
}

/// Runs Newton-Raphson on `f` with derivative `fprime` using default safeguards.
///
/// Invalid parameters are rejected before the first evaluation; every
/// evaluation failure after that ends up in the returned [`RunOutcome`].
pub fn run<F, G>(f: &F, fprime: &G, params: &RunParameters) -> Result<RunOutcome>
where
    F: RealFunction + ?Sized,
    G: RealFunction + ?Sized,
{
    run_with(f, fprime, params, &Safeguards::default())
}

pub fn run_with<F, G>(
    f: &F,
    fprime: &G,
    params: &RunParameters,
    safeguards: &Safeguards,
) -> Result<RunOutcome>
where
    F: RealFunction + ?Sized,
    G: RealFunction + ?Sized,
{
    let newton = Newton::new(
        |x: f64| f.eval(x),
        |x: f64| fprime.eval(x),
        *params,
        *safeguards,
    )?;
    Ok(newton.run_to_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DomainError;
    use proptest::prelude::*;
    use std::cell::Cell;

    fn assert_err_contains<T: std::fmt::Debug>(result: Result<T>, needle: &str) {
        let err = result.expect_err("expected error");
        let message = format!("{err}");
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    fn quadratic(x: f64) -> Result<f64, DomainError> {
        Ok(x * x - 4.0)
    }

    fn quadratic_slope(x: f64) -> Result<f64, DomainError> {
        Ok(2.0 * x)
    }

    fn checked_log(x: f64) -> Result<f64, DomainError> {
        if x <= 0.0 {
            return Err(DomainError::LogOfNonPositive { arg: x });
        }
        Ok(x.ln())
    }

    #[test]
    fn quadratic_converges_with_expected_iterates() {
        let outcome = run(&quadratic, &quadratic_slope, &RunParameters::new(1.0, 1e-4, 50))
            .expect("run should start");

        let xs: Vec<f64> = outcome.trace().iter().map(|s| s.x).collect();
        let expected = [2.5, 2.05, 2.000609756097561, 2.0000000929222947];
        for (x, e) in xs.iter().zip(expected.iter()) {
            assert!((x - e).abs() < 1e-12, "iterate {x} vs {e}");
        }
        assert_eq!(outcome.iterations(), 5);
        assert_eq!(outcome.trace().len(), 5);
        let root = outcome.root().expect("should converge");
        assert!((root - 2.0).abs() < 1e-12);

        let ks: Vec<usize> = outcome.trace().iter().map(|s| s.k).collect();
        assert_eq!(ks, vec![1, 2, 3, 4, 5]);
        assert!((outcome.trace()[0].fx - 2.25).abs() < 1e-15);
        assert!((outcome.trace()[0].error - 1.5).abs() < 1e-15);
    }

    #[test]
    fn quadratic_error_roughly_squares_near_root() {
        let outcome = run(&quadratic, &quadratic_slope, &RunParameters::new(1.0, 1e-12, 50))
            .expect("run should start");
        let errors: Vec<f64> = outcome.trace().iter().map(|s| s.error).collect();
        // e_{k+1} ~ e_k^2 / (2 * root) once close to the root
        for pair in errors[2..].windows(2) {
            if pair[1] == 0.0 {
                break;
            }
            let ratio = pair[1] / (pair[0] * pair[0]);
            assert!(ratio > 0.1 && ratio < 1.0, "ratio {ratio} for {pair:?}");
        }
    }

    #[test]
    fn convergence_is_reported_at_first_satisfying_iteration() {
        let eps = 1e-4;
        let outcome = run(&quadratic, &quadratic_slope, &RunParameters::new(1.0, eps, 50))
            .expect("run should start");
        let (last, earlier) = outcome.trace().split_last().expect("non-empty trace");
        assert!(last.error < eps);
        assert!(earlier.iter().all(|s| s.error >= eps));
    }

    #[test]
    fn vanishing_derivative_stops_before_dividing() {
        let f = |x: f64| Ok(x * x);
        let df = |x: f64| Ok(2.0 * x);
        let outcome = run(&f, &df, &RunParameters::new(0.0, 1e-8, 10)).expect("run should start");
        assert_eq!(
            outcome.termination(),
            &Termination::ZeroDerivative {
                iteration: 1,
                x: 0.0,
                derivative: 0.0
            }
        );
        assert!(outcome.trace().is_empty());
    }

    #[test]
    fn derivative_floor_is_configurable() {
        let f = |x: f64| Ok(x - 1.0);
        let df = |_x: f64| Ok(1e-6);
        let params = RunParameters::new(0.0, 1e-8, 10);
        let strict = Safeguards {
            derivative_floor: 1e-5,
            ..Safeguards::default()
        };
        let outcome = run_with(&f, &df, &params, &strict).expect("run should start");
        assert!(matches!(
            outcome.termination(),
            Termination::ZeroDerivative { iteration: 1, .. }
        ));
        let outcome = run(&f, &df, &params).expect("run should start");
        assert!(!matches!(
            outcome.termination(),
            Termination::ZeroDerivative { .. }
        ));
    }

    #[test]
    fn domain_error_in_function_is_captured() {
        let df = |x: f64| Ok(1.0 / x);
        let outcome = run(&checked_log, &df, &RunParameters::new(-1.0, 1e-8, 10))
            .expect("run should start");
        assert_eq!(
            outcome.termination(),
            &Termination::NumericError {
                iteration: 1,
                x: -1.0,
                quantity: Quantity::Function,
                error: DomainError::LogOfNonPositive { arg: -1.0 },
            }
        );
        assert!(outcome.trace().is_empty());
        assert!(outcome.status_line().contains("f(x) undefined"));
    }

    #[test]
    fn domain_error_in_derivative_is_captured() {
        let f = |x: f64| Ok(x - 3.0);
        let df = |x: f64| {
            if x == 0.0 {
                Err(DomainError::DivisionByZero)
            } else {
                Ok(1.0 / x)
            }
        };
        let outcome = run(&f, &df, &RunParameters::new(0.0, 1e-8, 10)).expect("run should start");
        assert!(matches!(
            outcome.termination(),
            Termination::NumericError {
                iteration: 1,
                quantity: Quantity::Derivative,
                error: DomainError::DivisionByZero,
                ..
            }
        ));
    }

    #[test]
    fn domain_error_at_new_iterate_keeps_completed_steps_only() {
        // From x0 = 3 the first log step overshoots below zero.
        let df = |x: f64| Ok(1.0 / x);
        let outcome = run(&checked_log, &df, &RunParameters::new(3.0, 1e-8, 10))
            .expect("run should start");
        match outcome.termination() {
            Termination::NumericError {
                iteration,
                x,
                quantity,
                ..
            } => {
                assert_eq!(*iteration, 1);
                assert_eq!(*quantity, Quantity::Function);
                assert!((x - (3.0 - 3.0 * 3f64.ln())).abs() < 1e-12);
            }
            other => panic!("expected numeric error, got {other:?}"),
        }
        assert!(outcome.trace().is_empty());
    }

    #[test]
    fn no_real_root_exhausts_iteration_budget() {
        let f = |x: f64| Ok(x * x + 1.0);
        let df = |x: f64| Ok(2.0 * x);
        for max_iter in [1, 7, 25] {
            let outcome =
                run(&f, &df, &RunParameters::new(0.5, 1e-6, max_iter)).expect("run should start");
            assert!(matches!(
                outcome.termination(),
                Termination::DivergedOrStalled {
                    reason: StallReason::IterationBudget,
                    ..
                }
            ));
            assert_eq!(outcome.iterations(), max_iter);
            assert_eq!(outcome.trace().len(), max_iter);
            assert_eq!(outcome.trace().last().map(|s| s.k), Some(max_iter));
        }
    }

    #[test]
    fn runaway_iterates_hit_magnitude_bound() {
        let df = |_x: f64| Ok(1.0);
        let outcome = run(&quadratic, &df, &RunParameters::new(1.0, 1e-4, 50))
            .expect("run should start");
        match outcome.termination() {
            Termination::DivergedOrStalled {
                last_iterate,
                iterations,
                reason: StallReason::MagnitudeBound { bound },
            } => {
                assert_eq!(*iterations, 6);
                assert_eq!(*bound, DEFAULT_DIVERGENCE_BOUND);
                assert!(last_iterate.abs() > DEFAULT_DIVERGENCE_BOUND);
            }
            other => panic!("expected magnitude divergence, got {other:?}"),
        }
        assert_eq!(outcome.trace().len(), 6);
    }

    #[test]
    fn non_finite_update_is_divergence() {
        let f = |_x: f64| Ok(1e300);
        let df = |_x: f64| Ok(1e-10);
        let safeguards = Safeguards {
            derivative_floor: 1e-300,
            ..Safeguards::default()
        };
        let outcome = run_with(&f, &df, &RunParameters::new(0.0, 1e-8, 10), &safeguards)
            .expect("run should start");
        assert!(matches!(
            outcome.termination(),
            Termination::DivergedOrStalled {
                iterations: 1,
                reason: StallReason::NonFinite,
                ..
            }
        ));
        assert!(outcome.trace().is_empty());
    }

    #[test]
    fn non_finite_iterate_is_never_evaluated_or_recorded() {
        let evaluated_at = std::cell::RefCell::new(Vec::new());
        let f = |x: f64| {
            evaluated_at.borrow_mut().push(x);
            Ok(1e300)
        };
        let df = |x: f64| Ok(if x > -1.5 { 1e300 } else { 1e-10 });
        let safeguards = Safeguards {
            derivative_floor: 1e-300,
            ..Safeguards::default()
        };
        let outcome = run_with(&f, &df, &RunParameters::new(0.0, 1e-8, 10), &safeguards)
            .expect("run should start");

        match outcome.termination() {
            Termination::DivergedOrStalled {
                last_iterate,
                iterations,
                reason: StallReason::NonFinite,
            } => {
                assert_eq!(*iterations, 3);
                assert!(!last_iterate.is_finite());
            }
            other => panic!("expected non-finite divergence, got {other:?}"),
        }
        let xs: Vec<f64> = outcome.trace().iter().map(|s| s.x).collect();
        assert_eq!(xs, vec![-1.0, -2.0]);
        assert!(evaluated_at.borrow().iter().all(|x| x.is_finite()));
    }

    #[test]
    fn function_is_evaluated_once_per_iteration() {
        let calls = Cell::new(0usize);
        let f = |x: f64| {
            calls.set(calls.get() + 1);
            Ok(x * x - 4.0)
        };
        let outcome = run(&f, &quadratic_slope, &RunParameters::new(1.0, 1e-4, 50))
            .expect("run should start");
        assert_eq!(calls.get(), outcome.iterations() + 1);
    }

    #[test]
    fn stepping_matches_one_shot_run() {
        let params = RunParameters::new(1.0, 1e-10, 50);
        let mut newton =
            Newton::new(quadratic, quadratic_slope, params, Safeguards::default()).expect("newton");
        assert_eq!(newton.iterations(), 0);
        assert_eq!(newton.current(), 1.0);
        assert!(newton.step().is_none());
        assert_eq!(newton.iterations(), 1);
        assert_eq!(newton.current(), 2.5);
        while newton.step().is_none() {}
        assert!(newton.is_done());

        let before = newton.trace().len();
        let again = newton.step().cloned();
        assert_eq!(newton.trace().len(), before);
        assert_eq!(again.as_ref(), newton.termination());

        let stepped = newton.into_outcome().expect("terminated");
        let one_shot = run(&quadratic, &quadratic_slope, &params).expect("run should start");
        assert_eq!(stepped, one_shot);
    }

    #[test]
    fn unfinished_stepper_has_no_outcome() {
        let newton = Newton::new(
            quadratic,
            quadratic_slope,
            RunParameters::new(1.0, 1e-4, 50),
            Safeguards::default(),
        )
        .expect("newton");
        assert!(newton.into_outcome().is_none());
    }

    #[test]
    fn rejects_invalid_parameters() {
        let f = quadratic;
        let df = quadratic_slope;
        assert_err_contains(
            run(&f, &df, &RunParameters::new(f64::NAN, 1e-4, 10)),
            "x0 must be finite",
        );
        assert_err_contains(
            run(&f, &df, &RunParameters::new(1.0, 0.0, 10)),
            "epsilon must be positive",
        );
        assert_err_contains(
            run(&f, &df, &RunParameters::new(1.0, f64::NAN, 10)),
            "epsilon must be positive",
        );
        assert_err_contains(
            run(&f, &df, &RunParameters::new(1.0, 1e-4, 0)),
            "max_iter must be greater than zero",
        );
        assert_err_contains(
            run_with(
                &f,
                &df,
                &RunParameters::new(1.0, 1e-4, 10),
                &Safeguards {
                    derivative_floor: -1.0,
                    ..Safeguards::default()
                },
            ),
            "derivative_floor",
        );
        assert_err_contains(
            run_with(
                &f,
                &df,
                &RunParameters::new(1.0, 1e-4, 10),
                &Safeguards {
                    divergence_bound: f64::INFINITY,
                    ..Safeguards::default()
                },
            ),
            "divergence_bound",
        );
    }

    #[test]
    fn safeguards_fill_missing_fields_from_defaults() {
        let partial: Safeguards =
            serde_json::from_str(r#"{ "divergence_bound": 100.0 }"#).expect("deserialize");
        assert_eq!(partial.derivative_floor, DEFAULT_DERIVATIVE_FLOOR);
        assert_eq!(partial.divergence_bound, 100.0);
    }

    proptest! {
        #[test]
        fn converged_runs_stop_at_first_small_error(
            x0 in prop_oneof![-50.0f64..-0.01, 0.01f64..50.0],
            exponent in 2i32..12,
        ) {
            let eps = 10f64.powi(-exponent);
            let outcome = run(&quadratic, &quadratic_slope, &RunParameters::new(x0, eps, 200))
                .expect("run should start");
            if let Some(root) = outcome.root() {
                prop_assert!((root.abs() - 2.0).abs() < 1e-3);
                let (last, earlier) = outcome.trace().split_last().expect("non-empty trace");
                prop_assert!(last.error < eps);
                prop_assert!(earlier.iter().all(|s| s.error >= eps));
                prop_assert_eq!(outcome.iterations(), outcome.trace().len());
            }
        }

        #[test]
        fn identical_parameters_give_identical_outcomes(
            x0 in -20.0f64..20.0,
            max_iter in 1usize..80,
        ) {
            let f = |x: f64| Ok(x * x * x - 2.0 * x + 2.0);
            let df = |x: f64| Ok(3.0 * x * x - 2.0);
            let params = RunParameters::new(x0, 1e-9, max_iter);
            let first = run(&f, &df, &params).expect("run should start");
            let second = run(&f, &df, &params).expect("run should start");
            prop_assert_eq!(
                serde_json::to_string(&first).expect("serialize"),
                serde_json::to_string(&second).expect("serialize")
            );
        }
    }
}
