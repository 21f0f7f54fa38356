//! Stepped Newton runner, so the UI can report progress between batches.

use crate::finder::build_problem;
use newton_core::{
    CompiledFunction, IterationStep, Newton, Problem, RunOutcome, RunParameters, Safeguards,
};
use serde::Serialize;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

/// Progress payload for the stepped runner.
#[derive(Debug, Serialize)]
struct NewtonProgress {
    done: bool,
    iterations: usize,
    max_iter: usize,
    x: f64,
    last_step: Option<IterationStep>,
    status: Option<String>,
}

#[wasm_bindgen]
pub struct WasmNewtonRunner {
    newton: Newton<CompiledFunction, CompiledFunction>,
    derivative_text: String,
}

#[wasm_bindgen]
impl WasmNewtonRunner {
    /// `safeguards` may be `undefined`/`null` for the defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(
        function: &str,
        derivative: Option<String>,
        variable: Option<String>,
        x0: f64,
        epsilon: f64,
        max_iter: u32,
        safeguards: JsValue,
    ) -> Result<WasmNewtonRunner, JsValue> {
        console_error_panic_hook::set_once();

        let problem = build_problem(function, derivative.as_deref(), variable.as_deref())
            .map_err(|e| JsValue::from_str(&format!("{e:#}")))?;
        let safeguards = if safeguards.is_undefined() || safeguards.is_null() {
            Safeguards::default()
        } else {
            from_value(safeguards)
                .map_err(|e| JsValue::from_str(&format!("Invalid safeguards: {}", e)))?
        };

        Self::from_problem(
            &problem,
            RunParameters::new(x0, epsilon, max_iter as usize),
            safeguards,
        )
        .map_err(|e| JsValue::from_str(&format!("Invalid run parameters: {e:#}")))
    }

    pub fn derivative_text(&self) -> String {
        self.derivative_text.clone()
    }

    pub fn is_done(&self) -> bool {
        self.newton.is_done()
    }

    pub fn run_steps(&mut self, batch_size: u32) -> Result<JsValue, JsValue> {
        let progress = self.advance(batch_size as usize);
        to_value(&progress).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    pub fn get_progress(&self) -> Result<JsValue, JsValue> {
        to_value(&self.progress())
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    pub fn get_result(&self) -> Result<JsValue, JsValue> {
        let outcome = self
            .outcome()
            .ok_or_else(|| JsValue::from_str("Newton runner has not finished yet."))?;

        to_value(&outcome).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }
}

impl WasmNewtonRunner {
    pub(crate) fn from_problem(
        problem: &Problem,
        params: RunParameters,
        safeguards: Safeguards,
    ) -> anyhow::Result<Self> {
        let newton = Newton::new(
            problem.function().clone(),
            problem.derivative().clone(),
            params,
            safeguards,
        )?;
        Ok(Self {
            newton,
            derivative_text: problem.derivative_text().to_string(),
        })
    }

    fn advance(&mut self, batch_size: usize) -> NewtonProgress {
        for _ in 0..batch_size {
            if self.newton.step().is_some() {
                break;
            }
        }
        self.progress()
    }

    fn progress(&self) -> NewtonProgress {
        NewtonProgress {
            done: self.newton.is_done(),
            iterations: self.newton.iterations(),
            max_iter: self.newton.params().max_iter,
            x: self.newton.current(),
            last_step: self.newton.trace().last().copied(),
            status: self.newton.termination().map(ToString::to_string),
        }
    }

    fn outcome(&self) -> Option<RunOutcome> {
        self.newton.outcome()
    }
}


#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::WasmNewtonRunner;
    use newton_core::RunOutcome;
    use serde_wasm_bindgen::from_value;
    use wasm_bindgen::JsValue;
    use wasm_bindgen_test::wasm_bindgen_test;

    #[wasm_bindgen_test]
    fn result_is_unavailable_until_done() {
        let mut runner =
            WasmNewtonRunner::new("cos(x) - x", None, None, 1.0, 1e-12, 50, JsValue::UNDEFINED)
                .expect("runner");
        let message = runner
            .get_result()
            .err()
            .and_then(|err| err.as_string())
            .unwrap_or_default();
        assert!(message.contains("has not finished"));

        while !runner.is_done() {
            runner.run_steps(1).expect("progress");
        }
        let outcome: RunOutcome = from_value(runner.get_result().expect("result")).expect("outcome");
        let root = outcome.root().expect("converges");
        assert!((root - 0.7390851332151607).abs() < 1e-12);
    }

    #[wasm_bindgen_test]
    fn rejects_bad_epsilon() {
        let result = WasmNewtonRunner::new("x", None, None, 0.0, 0.0, 10, JsValue::NULL);
        let message = result
            .err()
            .and_then(|err| err.as_string())
            .unwrap_or_default();
        assert!(message.contains("Invalid run parameters"));
    }
}
