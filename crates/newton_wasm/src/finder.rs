//! One-shot root finding over a compiled function/derivative pair.

use anyhow::Context;
use newton_core::{
    run_batch, Compiler, DerivativeOrigin, Problem, Report, RunOutcome, RunParameters, Safeguards,
};
use serde::Deserialize;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

/// Run configuration accepted by `solve_with`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SolveConfig {
    x0: f64,
    epsilon: f64,
    max_iter: usize,
    #[serde(default)]
    safeguards: Safeguards,
}

impl SolveConfig {
    fn params(&self) -> RunParameters {
        RunParameters::new(self.x0, self.epsilon, self.max_iter)
    }
}

/// Compiles the function and its derivative. A blank derivative is derived;
/// a blank variable name falls back to `x`.
pub(crate) fn build_problem(
    function: &str,
    derivative: Option<&str>,
    variable: Option<&str>,
) -> anyhow::Result<Problem> {
    let compiler = match variable.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => Compiler::new(name),
        None => Compiler::default(),
    };
    Problem::with_compiler(&compiler, function, derivative).context("Failed to compile expressions")
}

#[wasm_bindgen]
pub struct WasmRootFinder {
    problem: Problem,
}

#[wasm_bindgen]
impl WasmRootFinder {
    #[wasm_bindgen(constructor)]
    pub fn new(
        function: &str,
        derivative: Option<String>,
        variable: Option<String>,
    ) -> Result<WasmRootFinder, JsValue> {
        console_error_panic_hook::set_once();

        let problem = build_problem(function, derivative.as_deref(), variable.as_deref())
            .map_err(|e| JsValue::from_str(&format!("{e:#}")))?;
        Ok(WasmRootFinder::from_problem(problem))
    }

    pub fn function_text(&self) -> String {
        self.problem.function_text().to_string()
    }

    pub fn derivative_text(&self) -> String {
        self.problem.derivative_text().to_string()
    }

    pub fn derivative_was_derived(&self) -> bool {
        self.problem.origin() == DerivativeOrigin::Derived
    }

    pub fn solve(&self, x0: f64, epsilon: f64, max_iter: u32) -> Result<JsValue, JsValue> {
        let outcome = self
            .problem
            .run(&RunParameters::new(x0, epsilon, max_iter as usize))
            .map_err(|e| JsValue::from_str(&format!("Newton run failed: {e:#}")))?;

        to_value(&outcome).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    /// Like `solve`, with parameters and optional safeguards read from
    /// `{ x0, epsilon, max_iter, safeguards? }`.
    pub fn solve_with(&self, config: JsValue) -> Result<JsValue, JsValue> {
        let config: SolveConfig = from_value(config)
            .map_err(|e| JsValue::from_str(&format!("Invalid solve config: {}", e)))?;
        let outcome = self
            .solve_config(&config)
            .map_err(|e| JsValue::from_str(&format!("Newton run failed: {e:#}")))?;

        to_value(&outcome).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    pub fn solve_many(
        &self,
        guesses: Vec<f64>,
        epsilon: f64,
        max_iter: u32,
    ) -> Result<JsValue, JsValue> {
        let outcomes = self
            .solve_guesses(&guesses, epsilon, max_iter as usize)
            .map_err(|e| JsValue::from_str(&format!("Batch solve failed: {e:#}")))?;

        to_value(&outcomes).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    pub fn report(&self, x0: f64, epsilon: f64, max_iter: u32) -> Result<String, JsValue> {
        self.render_report(&RunParameters::new(x0, epsilon, max_iter as usize))
            .map_err(|e| JsValue::from_str(&format!("Newton run failed: {e:#}")))
    }

    pub fn check_derivative(
        &self,
        start: f64,
        end: f64,
        samples: u32,
        tolerance: f64,
    ) -> Result<JsValue, JsValue> {
        let check = self
            .problem
            .check_derivative(start, end, samples as usize, tolerance)
            .map_err(|e| JsValue::from_str(&format!("Derivative check failed: {e:#}")))?;

        to_value(&check).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }
}

impl WasmRootFinder {
    pub(crate) fn from_problem(problem: Problem) -> Self {
        Self { problem }
    }

    pub(crate) fn solve_config(&self, config: &SolveConfig) -> anyhow::Result<RunOutcome> {
        self.problem.run_with(&config.params(), &config.safeguards)
    }

    pub(crate) fn solve_guesses(
        &self,
        guesses: &[f64],
        epsilon: f64,
        max_iter: usize,
    ) -> anyhow::Result<Vec<RunOutcome>> {
        run_batch(
            self.problem.function(),
            self.problem.derivative(),
            guesses,
            epsilon,
            max_iter,
            &Safeguards::default(),
        )
    }

    pub(crate) fn render_report(&self, params: &RunParameters) -> anyhow::Result<String> {
        let outcome = self.problem.run(params)?;
        Ok(Report::for_problem(&self.problem, params, &outcome).to_string())
    }
}


#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::WasmRootFinder;
    use newton_core::{DerivativeCheck, RunOutcome};
    use serde_wasm_bindgen::from_value;
    use wasm_bindgen_test::wasm_bindgen_test;

    #[wasm_bindgen_test]
    fn derives_and_solves() {
        let finder = WasmRootFinder::new("x^2 - 4", None, None).expect("finder");
        assert!(finder.derivative_was_derived());
        assert_eq!(finder.derivative_text(), "2*x");

        let outcome: RunOutcome =
            from_value(finder.solve(1.0, 1e-4, 50).expect("solve")).expect("outcome");
        assert_eq!(outcome.iterations(), 5);
        assert_eq!(outcome.trace().len(), 5);
    }

    #[wasm_bindgen_test]
    fn rejects_unknown_variable() {
        let result = WasmRootFinder::new("x + y", None, None);
        let message = result
            .err()
            .and_then(|err| err.as_string())
            .unwrap_or_default();
        assert!(message.contains("Failed to compile expressions"));
    }

    #[wasm_bindgen_test]
    fn rejects_zero_iterations() {
        let finder = WasmRootFinder::new("x", Some("1".to_string()), None).expect("finder");
        let message = finder
            .solve(0.0, 1e-6, 0)
            .err()
            .and_then(|err| err.as_string())
            .unwrap_or_default();
        assert!(message.contains("max_iter must be greater than zero"));
    }

    #[wasm_bindgen_test]
    fn audit_flags_wrong_derivative() {
        let finder = WasmRootFinder::new("x^2", Some("10".to_string()), None).expect("finder");
        assert!(!finder.derivative_was_derived());
        let check: DerivativeCheck =
            from_value(finder.check_derivative(0.0, 1.0, 3, 1e-6).expect("check")).expect("check");
        assert!(!check.within_tolerance);
    }
}
