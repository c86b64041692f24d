//! The two-pass evaluator (spec §4.7 "Two-pass loading", §9 "Control flow via StepResult").

pub mod expression;
pub mod statement;
pub mod term_object;

use crate::{value::AmlValue, AmlError};

/// Which of the two passes is currently running (spec §4.7).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PassType {
    /// Creates namespace nodes for every statically discoverable name. Runs at table-load time,
    /// before any method can safely execute, so expressions are still evaluated (a `Name`'s
    /// initializer, an `If`'s predicate) but invoking a `Method` is rejected.
    Declaration,
    /// The full evaluator; method invocation is only permitted here.
    Full,
}

/// The outcome of executing one statement or one block (spec §9: replaces the C original's
/// shared `PendingInterruptionEvent` flag with an explicit discriminated return).
#[derive(Debug)]
pub enum StepResult {
    Normal,
    Break,
    Continue,
    Return(AmlValue),
    Fatal(AmlError),
}

impl StepResult {
    pub fn is_normal(&self) -> bool {
        matches!(self, StepResult::Normal)
    }

    /// Folds an `AmlError` produced mid-block into the `StepResult` domain, so callers can use
    /// `?` freely and convert at the boundary with `.into_step()`.
    pub fn from_result(result: Result<StepResult, AmlError>) -> StepResult {
        match result {
            Ok(step) => step,
            Err(err) => StepResult::Fatal(err),
        }
    }
}

pub trait IntoStepResult {
    fn into_step(self) -> StepResult;
}

impl IntoStepResult for Result<StepResult, AmlError> {
    fn into_step(self) -> StepResult {
        StepResult::from_result(self)
    }
}
