//! Iteration records and terminal classification of a Newton run.

use crate::error::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One completed iteration: `x` is the new iterate `x_k`, `fx` is `f(x_k)`
/// and `error` is `|x_k - x_{k-1}|`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IterationStep {
    pub k: usize,
    pub x: f64,
    pub fx: f64,
    pub error: f64,
}

/// Which quantity failed to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quantity {
    Function,
    Derivative,
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quantity::Function => f.write_str("f(x)"),
            Quantity::Derivative => f.write_str("f'(x)"),
        }
    }
}

/// Why a run ended without converging.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StallReason {
    /// `max_iter` iterations ran without meeting the tolerance.
    IterationBudget,
    /// `|x_k|` exceeded the configured divergence bound.
    MagnitudeBound { bound: f64 },
    /// The update produced NaN or an infinity. The run stops before `f` is
    /// evaluated there, so the failing iterate is not in the trace.
    NonFinite,
}

/// Terminal state of the Newton state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Termination {
    Converged {
        root: f64,
        iterations: usize,
    },
    DivergedOrStalled {
        last_iterate: f64,
        iterations: usize,
        reason: StallReason,
    },
    ZeroDerivative {
        iteration: usize,
        x: f64,
        derivative: f64,
    },
    NumericError {
        iteration: usize,
        x: f64,
        quantity: Quantity,
        error: DomainError,
    },
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Converged { root, iterations } => write!(
                f,
                "converged to x = {root:.15} after {iterations} iteration(s)"
            ),
            Termination::DivergedOrStalled {
                last_iterate,
                iterations,
                reason,
            } => match reason {
                StallReason::IterationBudget => write!(
                    f,
                    "did not converge within iteration budget of {iterations} (last x = {last_iterate:e})"
                ),
                StallReason::MagnitudeBound { bound } => write!(
                    f,
                    "diverged at iteration {iterations}: |x| = {:e} exceeded bound {bound:e}",
                    last_iterate.abs()
                ),
                StallReason::NonFinite => write!(
                    f,
                    "diverged at iteration {iterations}: iterate became non-finite ({last_iterate})"
                ),
            },
            Termination::ZeroDerivative {
                iteration,
                x,
                derivative,
            } => write!(
                f,
                "derivative vanished at iteration {iteration} (f'({x}) = {derivative:e}); choose another initial guess"
            ),
            Termination::NumericError {
                iteration,
                x,
                quantity,
                error,
            } => write!(
                f,
                "{quantity} undefined at x = {x} in iteration {iteration}: {error}"
            ),
        }
    }
}

/// Outcome of a run: terminal state plus every completed iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub termination: Termination,
    pub trace: Vec<IterationStep>,
}

impl RunOutcome {
    pub fn termination(&self) -> &Termination {
        &self.termination
    }

    pub fn trace(&self) -> &[IterationStep] {
        &self.trace
    }

    pub fn converged(&self) -> bool {
        matches!(self.termination, Termination::Converged { .. })
    }

    /// The root, if the run converged.
    pub fn root(&self) -> Option<f64> {
        match self.termination {
            Termination::Converged { root, .. } => Some(root),
            _ => None,
        }
    }

    /// Iteration at which the run ended (the failing one for error states).
    pub fn iterations(&self) -> usize {
        match self.termination {
            Termination::Converged { iterations, .. }
            | Termination::DivergedOrStalled { iterations, .. } => iterations,
            Termination::ZeroDerivative { iteration, .. }
            | Termination::NumericError { iteration, .. } => iteration,
        }
    }

    /// Last point the run reached.
    pub fn last_iterate(&self) -> f64 {
        match self.termination {
            Termination::Converged { root, .. } => root,
            Termination::DivergedOrStalled { last_iterate, .. } => last_iterate,
            Termination::ZeroDerivative { x, .. } | Termination::NumericError { x, .. } => x,
        }
    }

    pub fn status_line(&self) -> String {
        self.termination.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trace() -> Vec<IterationStep> {
        vec![
            IterationStep {
                k: 1,
                x: 2.5,
                fx: 2.25,
                error: 1.5,
            },
            IterationStep {
                k: 2,
                x: 2.05,
                fx: 0.20249999999999968,
                error: 0.4500000000000002,
            },
        ]
    }

    #[test]
    fn trace_round_trips_through_json() {
        let outcome = RunOutcome {
            termination: Termination::DivergedOrStalled {
                last_iterate: 2.05,
                iterations: 2,
                reason: StallReason::IterationBudget,
            },
            trace: sample_trace(),
        };
        let json = serde_json::to_string(&outcome).expect("serialize");
        let back: RunOutcome = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, outcome);
        for (a, b) in back.trace.iter().zip(outcome.trace.iter()) {
            assert_eq!(a.x.to_bits(), b.x.to_bits());
            assert_eq!(a.fx.to_bits(), b.fx.to_bits());
            assert_eq!(a.error.to_bits(), b.error.to_bits());
        }
    }

    #[test]
    fn termination_is_tagged_in_json() {
        let termination = Termination::NumericError {
            iteration: 1,
            x: -1.0,
            quantity: Quantity::Function,
            error: DomainError::LogOfNonPositive { arg: -1.0 },
        };
        let value = serde_json::to_value(&termination).expect("serialize");
        assert_eq!(value["status"], "numeric_error");
        assert_eq!(value["quantity"], "function");
        assert_eq!(value["error"]["kind"], "log_of_non_positive");
        let back: Termination = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, termination);
    }

    #[test]
    fn accessors_follow_termination() {
        let outcome = RunOutcome {
            termination: Termination::ZeroDerivative {
                iteration: 3,
                x: 0.0,
                derivative: 0.0,
            },
            trace: sample_trace(),
        };
        assert!(!outcome.converged());
        assert_eq!(outcome.root(), None);
        assert_eq!(outcome.iterations(), 3);
        assert_eq!(outcome.last_iterate(), 0.0);
        assert!(outcome.status_line().contains("choose another initial guess"));
    }

    #[test]
    fn status_lines_distinguish_non_convergence() {
        let budget = Termination::DivergedOrStalled {
            last_iterate: 0.1,
            iterations: 50,
            reason: StallReason::IterationBudget,
        };
        let bound = Termination::DivergedOrStalled {
            last_iterate: -4.8e14,
            iterations: 6,
            reason: StallReason::MagnitudeBound { bound: 1e10 },
        };
        let non_finite = Termination::DivergedOrStalled {
            last_iterate: f64::INFINITY,
            iterations: 2,
            reason: StallReason::NonFinite,
        };
        assert!(budget.to_string().contains("iteration budget of 50"));
        assert!(bound.to_string().contains("exceeded bound"));
        assert!(non_finite.to_string().contains("non-finite"));
        assert_ne!(budget.to_string(), bound.to_string());
    }

    #[test]
    fn numeric_error_names_quantity_and_reason() {
        let termination = Termination::NumericError {
            iteration: 1,
            x: -1.0,
            quantity: Quantity::Derivative,
            error: DomainError::DivisionByZero,
        };
        let line = termination.to_string();
        assert!(line.contains("f'(x) undefined"));
        assert!(line.contains("iteration 1"));
        assert!(line.contains("division by zero"));
    }
}
