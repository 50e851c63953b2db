//! [`CoreError`] is the single error enum surfaced by this crate, built with [`thiserror`] the
//! same way the teacher crate this workspace grew out of keeps its own error surface in one
//! place. Predicate-shaped failures (`strict_on?`, `on?`, shift-search exhaustion) are deliberately
//! *not* represented here — per the propagation policy, those surface as `false`/`None` return
//! values rather than errors. Only structural failures reach this type.

use std::fmt;
use thiserror::Error;

/// A single diagnostic produced while loading a persisted schedule document.
///
/// # See Also
/// - [`CoreError::ValidationError`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// 1-based line number of the offending node, within the source document.
    pub line: usize,
    /// 1-based column number of the offending node, within its line.
    pub column: usize,
    /// Human-readable description of what is wrong.
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.column, self.message)
    }
}

/// The error kinds a caller of this crate's public operations can observe.
///
/// # See Also
/// - [`crate::time_pattern::TimePattern::materialize`] raises [`CoreError::Unreconcilable`]
/// - [`crate::scheduler::Scheduler::build`] raises [`CoreError::Cycle`],
///   [`CoreError::UnsatisfiableDependency`] and [`CoreError::InvalidArgument`]
/// - [`crate::persistence::load_tasks`] raises [`CoreError::ValidationError`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A pattern scalar (the `FieldPattern` grammar from the persisted task format) was malformed,
    /// or a step was zero/negative.
    #[error("invalid pattern `{0}`: {1}")]
    InvalidPattern(String, String),

    /// [`TimePattern::materialize`](crate::time_pattern::TimePattern::materialize) could not
    /// reconcile the week-of-year, day-of-week and day-of-year constraints within its bounded
    /// iteration budget.
    #[error("time pattern could not be reconciled after {0} iterations")]
    Unreconcilable(usize),

    /// A structural precondition was violated: non-positive stagger, an unknown dependency id,
    /// `parallel < 1`, `duration < 0`, or a `schema_version` newer than this crate supports.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The dependency graph given to [`Scheduler::build`](crate::scheduler::Scheduler::build)
    /// contains a cycle; the task id below is one member of the cycle.
    #[error("dependency graph has a cycle involving task `{0}`")]
    Cycle(String),

    /// A task could not be placed within the scheduling window, but other tasks declared a
    /// dependency on it.
    #[error("task `{0}` has dependents but could not be placed")]
    UnsatisfiableDependency(String),

    /// One or more problems were found while loading a persisted schedule document. Errors are
    /// accumulated rather than short-circuited, so this always carries at least one issue.
    #[error("{} validation error(s) while loading schedule document", .0.len())]
    ValidationError(Vec<ValidationIssue>),
}

/// Convenience alias used throughout the crate.
pub type CoreResult<T> = Result<T, CoreError>;
