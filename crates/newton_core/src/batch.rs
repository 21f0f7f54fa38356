use crate::newton::{run_with, RunParameters, Safeguards};
use crate::trace::RunOutcome;
use crate::traits::RealFunction;
use anyhow::{Context, Result};
use log::debug;
use rayon::prelude::*;

/// Runs one independent search per initial guess, in parallel.
///
/// Every guess is validated before any run starts. Outcomes are returned in
/// the order of `guesses`.
pub fn run_batch<F, G>(
    f: &F,
    fprime: &G,
    guesses: &[f64],
    epsilon: f64,
    max_iter: usize,
    safeguards: &Safeguards,
) -> Result<Vec<RunOutcome>>
where
    F: RealFunction + Sync + ?Sized,
    G: RealFunction + Sync + ?Sized,
{
    safeguards.validate()?;
    let params: Vec<RunParameters> = guesses
        .iter()
        .map(|&x0| RunParameters::new(x0, epsilon, max_iter))
        .collect();
    for (index, p) in params.iter().enumerate() {
        p.validate()
            .with_context(|| format!("Invalid initial guess at index {index}"))?;
    }

    debug!("solving {} initial guesses", params.len());
    params
        .par_iter()
        .map(|p| run_with(f, fprime, p, safeguards))
        .collect()
}
