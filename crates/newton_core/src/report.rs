use crate::newton::RunParameters;
use crate::problem::Problem;
use crate::trace::{RunOutcome, Termination};
use std::fmt;

const TITLE: &str = "Newton-Raphson Method";
const RULE_WIDTH: usize = 4 + 3 * 19;

/// Plain-text summary of a finished run followed by its iteration table.
#[derive(Debug, Clone, Copy)]
pub struct Report<'a> {
    function_text: &'a str,
    derivative_text: &'a str,
    params: &'a RunParameters,
    outcome: &'a RunOutcome,
}

impl<'a> Report<'a> {
    pub fn new(
        function_text: &'a str,
        derivative_text: &'a str,
        params: &'a RunParameters,
        outcome: &'a RunOutcome,
    ) -> Self {
        Self {
            function_text,
            derivative_text,
            params,
            outcome,
        }
    }

    pub fn for_problem(problem: &'a Problem, params: &'a RunParameters, outcome: &'a RunOutcome) -> Self {
        Self::new(
            problem.function_text(),
            problem.derivative_text(),
            params,
            outcome,
        )
    }
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(RULE_WIDTH);
        writeln!(f, "{rule}")?;
        writeln!(f, "{TITLE:^width$}", width = RULE_WIDTH)?;
        writeln!(f, "{rule}")?;
        writeln!(f, "f(x)    = {}", self.function_text)?;
        writeln!(f, "f'(x)   = {}", self.derivative_text)?;
        writeln!(f, "x0      = {}", self.params.x0)?;
        writeln!(f, "epsilon = {:e}", self.params.epsilon)?;
        writeln!(f)?;

        match self.outcome.termination() {
            Termination::Converged { root, .. } => writeln!(f, "root       = {root:.15}")?,
            _ => writeln!(f, "root       = none")?,
        }
        writeln!(f, "iterations = {}", self.outcome.iterations())?;
        writeln!(f, "status     = {}", self.outcome.status_line())?;
        writeln!(f)?;

        writeln!(
            f,
            "{:>4} {:>18} {:>18} {:>18}",
            "k", "x_k", "f(x_k)", "error"
        )?;
        writeln!(f, "{}", "-".repeat(RULE_WIDTH))?;
        for step in self.outcome.trace() {
            writeln!(
                f,
                "{:>4} {:>18.10e} {:>18.10e} {:>18.10e}",
                step.k, step.x, step.fx, step.error
            )?;
        }
        Ok(())
    }
}
