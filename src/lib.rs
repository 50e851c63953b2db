//! `virtualdate` is a calendar-and-scheduling core: [`FieldPattern`] and [`TimePattern`] describe
//! recurring points and ranges in civil time, [`TaskPattern`] layers due/omit/shift/dependency
//! semantics for a single scheduled item on top of them, and [`Scheduler`] composes a task set
//! into a deterministic, explained [`ScheduledInstance`] list over a `[from, to)` window.
//!
//! Persistence ([`persistence`]) and iCalendar export ([`export`]) sit at the edges; everything
//! else in the crate is pure, synchronous, and single-threaded by design — see each module's own
//! documentation for the details it owns.

pub mod calendar;
pub mod errors;
pub mod explanation;
pub mod export;
pub mod field_pattern;
pub mod persistence;
pub mod scheduler;
pub mod shift_search;
pub mod task_pattern;
pub mod time_pattern;

pub use errors::{CoreError, CoreResult, ValidationIssue};
pub use explanation::Explanation;
pub use field_pattern::FieldPattern;
pub use scheduler::{ScheduledInstance, Scheduler};
pub use shift_search::{ShiftOutcome, ShiftSearch};
pub use task_pattern::{InstantOrPattern, OnResult, ResolveResult, ShiftPolicy, TaskPattern, TriState};
pub use time_pattern::TimePattern;
