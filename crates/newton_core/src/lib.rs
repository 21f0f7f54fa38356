//! The `newton_core` crate finds real roots of single-variable functions with
//! the Newton-Raphson method.
//! Functions are given as text, parsed into a small expression tree and, when
//! no derivative is supplied, differentiated symbolically.
//!
//! Key components:
//! - **Expression**: tokenizer, parser and evaluator over a closed grammar (`Compiler`, `CompiledFunction`).
//! - **Symbolic**: derivative rules and simplification over `Expr`.
//! - **Newton**: the resumable iteration state machine (`Newton`) and one-shot `run`.
//! - **Trace**: `IterationStep`, `Termination` and `RunOutcome`.
//! - **Autodiff**: Dual numbers, used to audit derivatives against exact slopes.
pub mod autodiff;
pub mod batch;
pub mod error;
pub mod expression;
pub mod newton;
pub mod problem;
pub mod report;
pub mod symbolic;
pub mod trace;
pub mod traits;

pub use batch::run_batch;
pub use error::{DomainError, ParseError};
pub use expression::{CompiledFunction, Compiler, Expr};
pub use newton::{run, run_with, Newton, RunParameters, Safeguards};
pub use problem::{DerivativeCheck, DerivativeOrigin, Problem};
pub use report::Report;
pub use trace::{IterationStep, Quantity, RunOutcome, StallReason, Termination};
