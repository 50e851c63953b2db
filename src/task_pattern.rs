//! [`TaskPattern`] is the user-facing scheduled item: the thing a caller actually constructs and
//! hands to a [`Scheduler`](crate::scheduler::Scheduler). It composes [`TimePattern`] for its
//! due/omit/begin/end/deadline slots and [`ShiftSearch`] for its shift policy, the way the teacher
//! crate layers its own user-facing task type over its lower-level calendar primitives.

use crate::explanation::Explanation;
use crate::shift_search::{ShiftOutcome, ShiftSearch};
use crate::time_pattern::TimePattern;
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashSet;
use typed_builder::TypedBuilder;

/// Either a fixed instant or a recurring [`TimePattern`], used for `begin`, `end`, and `deadline`.
#[derive(Clone)]
pub enum InstantOrPattern {
    Instant(DateTime<Utc>),
    Pattern(TimePattern),
}

/// A hard override for [`TaskPattern::on`], or the natural outcome of `strict_on?`/`resolve`:
/// unknown, a plain boolean, or a shift duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TriState {
    /// The task makes no claim either way — equivalent to the source's `null`.
    Unknown,
    Bool(bool),
    Duration(TimeDelta),
}

/// `shift`/`on`'s tri-state-plus-disabled encoding: `null` (unset/inherit), a plain boolean
/// override, or a shift duration.
#[derive(Clone, Copy, PartialEq)]
pub enum OnResult {
    Null,
    False,
    True,
    Duration(TimeDelta),
}

/// The result of [`TaskPattern::resolve`]: a concrete instant when a shift applied, or the raw
/// `strict_on?` verdict otherwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResolveResult {
    Instant(DateTime<Utc>),
    True,
    Unknown,
    False,
}

/// A task's shift policy: never shift, always report true without shifting, or shift forward by
/// a fixed duration when due-but-omitted.
#[derive(Clone, Copy, PartialEq)]
pub enum ShiftPolicy {
    Null,
    False,
    True,
    Duration(TimeDelta),
}

impl Default for ShiftPolicy {
    fn default() -> Self {
        ShiftPolicy::False
    }
}

/// The user-facing scheduled item.
///
/// # Construction
/// Build one via [`TaskPattern::builder`]. `id` is required; every other field defaults per
/// §3.3 (`parallel` = 1, `max_shifts` = 1500, `shift`/`on` = their "unset" variant, everything
/// else empty/zero).
#[derive(Clone, TypedBuilder)]
pub struct TaskPattern {
    /// Unique within a [`Scheduler`](crate::scheduler::Scheduler)'s task set.
    #[builder(setter(into))]
    pub id: String,
    #[builder(default, setter(strip_option))]
    pub begin: Option<InstantOrPattern>,
    #[builder(default, setter(strip_option))]
    pub end: Option<InstantOrPattern>,
    #[builder(default)]
    pub due: Vec<TimePattern>,
    #[builder(default)]
    pub omit: Vec<TimePattern>,
    #[builder(default)]
    pub shift: ShiftPolicy,
    #[builder(default, setter(strip_option))]
    pub max_shift: Option<TimeDelta>,
    #[builder(default = 1500)]
    pub max_shifts: u32,
    #[builder(default)]
    pub on: OnResult,
    #[builder(default = TimeDelta::zero())]
    pub duration: TimeDelta,
    #[builder(default)]
    pub flags: HashSet<String>,
    #[builder(default = 1)]
    pub parallel: i64,
    #[builder(default = 0)]
    pub priority: i64,
    #[builder(default = false)]
    pub fixed: bool,
    #[builder(default, setter(strip_option))]
    pub stagger: Option<TimeDelta>,
    #[builder(default, setter(strip_option))]
    pub deadline: Option<InstantOrPattern>,
    #[builder(default)]
    pub depends_on_ids: Vec<String>,
}

impl Default for OnResult {
    fn default() -> Self {
        OnResult::Null
    }
}

impl TaskPattern {
    fn shift_search(&self) -> Option<ShiftSearch> {
        match self.shift {
            ShiftPolicy::Duration(d) if !d.is_zero() => {
                Some(ShiftSearch { shift: d, max_shift: self.max_shift, max_shifts: self.max_shifts })
            }
            _ => None,
        }
    }

    /// §4.5: the conjunction of "any due pattern's date matches" and "any due pattern's time
    /// matches", evaluated as two independent any-of aggregates across the whole `due` list, not
    /// one pattern's date-and-time both matching. An empty list is always due.
    fn due_matches(&self, t: DateTime<Utc>) -> bool {
        if self.due.is_empty() {
            return true;
        }
        self.due.iter().any(|p| p.matches_date(&t)) && self.due.iter().any(|p| p.matches_time(&t))
    }

    /// §4.5: the conjunction of "any omit pattern's date matches" and "any omit pattern's time
    /// matches", evaluated as two independent any-of aggregates across the whole `omit` list. An
    /// empty list is never omitted.
    fn omit_matches(&self, t: DateTime<Utc>) -> bool {
        if self.omit.is_empty() {
            return false;
        }
        self.omit.iter().any(|p| p.matches_date(&t)) && self.omit.iter().any(|p| p.matches_time(&t))
    }

    /// Whether `t` falls within this task's `omit` list, independent of `due` — used by the
    /// scheduler's stagger expansion (§4.6 step 3b), which only needs to skip omitted offsets, not
    /// re-check the base due recurrence that already produced `earliest`.
    pub fn is_omitted(&self, t: DateTime<Utc>) -> bool {
        self.omit_matches(t)
    }

    fn within_begin_end(&self, t: DateTime<Utc>) -> bool {
        let begin_ok = match &self.begin {
            None => true,
            Some(InstantOrPattern::Instant(begin)) => *begin <= t,
            Some(InstantOrPattern::Pattern(pattern)) => pattern.matches(&t),
        };
        let end_ok = match &self.end {
            None => true,
            Some(InstantOrPattern::Instant(end)) => t <= *end,
            Some(InstantOrPattern::Pattern(pattern)) => pattern.matches(&t),
        };
        begin_ok && end_ok
    }

    /// Resolves `t` to a concrete instant, materializing against `hint` if `t` is a
    /// [`TimePattern`].
    fn resolve_instant_or_pattern(value: &InstantOrPattern, hint: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match value {
            InstantOrPattern::Instant(instant) => Some(*instant),
            InstantOrPattern::Pattern(pattern) => pattern.materialize(hint).ok(),
        }
    }

    /// §4.5 `strict_on?`: is `t` due, and if due-but-omitted, does the shift policy recover it?
    pub fn strict_on(&self, t: DateTime<Utc>, hint: DateTime<Utc>) -> TriState {
        let _ = hint;
        if let OnResult::Duration(d) = self.on {
            return TriState::Duration(d);
        }
        match self.on {
            OnResult::Null => {}
            OnResult::False => return TriState::Bool(false),
            OnResult::True => return TriState::Bool(true),
            OnResult::Duration(_) => unreachable!(),
        }

        if !self.within_begin_end(t) {
            return TriState::Unknown;
        }

        let due = self.due_matches(t);
        let omitted = self.omit_matches(t);

        if !due {
            return TriState::Unknown;
        }
        if due && !omitted {
            return TriState::Bool(true);
        }

        match self.shift {
            ShiftPolicy::Null => TriState::Unknown,
            ShiftPolicy::False => TriState::Bool(false),
            ShiftPolicy::True => TriState::Bool(true),
            ShiftPolicy::Duration(d) => {
                if d.is_zero() {
                    return TriState::Bool(false);
                }
                let search = ShiftSearch { shift: d, max_shift: self.max_shift, max_shifts: self.max_shifts };
                match search.forward_shift(t, |candidate| self.omit_matches(candidate)) {
                    ShiftOutcome::Found(delta) => TriState::Duration(delta),
                    ShiftOutcome::NotFound => TriState::Bool(false),
                }
            }
        }
    }

    /// §4.5 `on?`: does `t` count as a placement of this task, whether directly or via a shift
    /// originating from some earlier base instant?
    pub fn on(&self, t: DateTime<Utc>, hint: DateTime<Utc>) -> bool {
        if matches!(self.strict_on(t, hint), TriState::Bool(true)) {
            return true;
        }
        if let Some(search) = self.shift_search() {
            return search.is_reachable_from_base(t, |base| match self.strict_on(base, hint) {
                TriState::Duration(delta) => Some(delta),
                _ => None,
            });
        }
        false
    }

    /// §4.5 `resolve`: the concrete placement instant when `strict_on?` yields a duration,
    /// otherwise the raw verdict.
    pub fn resolve(&self, t: DateTime<Utc>, hint: DateTime<Utc>) -> ResolveResult {
        match self.strict_on(t, hint) {
            TriState::Duration(delta) => ResolveResult::Instant(t + delta),
            TriState::Bool(true) => ResolveResult::True,
            TriState::Bool(false) => ResolveResult::False,
            TriState::Unknown => ResolveResult::Unknown,
        }
    }

    /// Materializes `deadline` (if set) against `hint`, if it is a [`TimePattern`]; returns the
    /// instant as-is if concrete.
    pub fn deadline_at(&self, hint: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.deadline.as_ref().and_then(|value| Self::resolve_instant_or_pattern(value, hint))
    }

    /// The set of flags a placed instance of this task should be checked against for parallelism
    /// purposes; an empty `flags` set is replaced by a synthetic flag unique to this task, so that
    /// an unflagged task's own `parallel` quota is still enforced against its own instances only.
    pub fn parallelism_flags(&self) -> HashSet<String> {
        if self.flags.is_empty() {
            HashSet::from([format!("__task:{}", self.id)])
        } else {
            self.flags.clone()
        }
    }
}

/// An explained candidate placement, used internally by the scheduler while it negotiates
/// conflicts; exposed so loaders/tests can inspect the trace that produced a final instance.
#[derive(Clone)]
pub struct Candidate {
    pub start: DateTime<Utc>,
    pub explanation: Explanation,
}
