//! [`FieldPattern`] is the atomic value used in every slot of a
//! [`TimePattern`](crate::time_pattern::TimePattern). It is a small tagged union rather than a
//! trait object: unlike the teacher crate's `TaskCalendarField` (a `dyn Trait` per field, one
//! implementation per behavior), every inhabitant here is plain data with one exception
//! ([`FieldPattern::Predicate`]), which keeps `Clone`/`PartialEq`/serialization straightforward
//! for the five data-carrying variants without forcing the predicate escape hatch onto all of
//! them.

use std::fmt;
use std::sync::Arc;

/// The atomic value held by each of a [`TimePattern`](crate::time_pattern::TimePattern)'s 11
/// slots.
///
/// # Wrap law
/// Any negative integer `n` carried by [`FieldPattern::Exact`], an element of
/// [`FieldPattern::List`], or an endpoint of [`FieldPattern::Range`]/[`FieldPattern::Stepped`], is
/// wrapped to `max + n + 1` when the slot's `max` is known, lazily at match time (never at
/// construction — the same stored pattern can be matched against candidates from differently
/// sized months, so the anchor cannot be baked in up front). A negative index therefore counts
/// back from the end: `-1` means "the last valid value", `-2` the one before it, and so on.
///
/// # Non-goals
/// [`FieldPattern::Predicate`] is intentionally not serializable — see
/// [`crate::persistence`] for how loaders round-trip it.
#[derive(Clone)]
pub enum FieldPattern {
    /// Matches any value.
    Unset,
    /// Matches iff the flag is `true`.
    Always(bool),
    /// Matches the given integer exactly, after wrap.
    Exact(i32),
    /// Matches if any element equals the value, after wrap.
    List(Vec<i32>),
    /// Matches if the value falls within `[lo, hi]` (inclusive) or `[lo, hi)` (exclusive),
    /// depending on the bool, after wrapping both endpoints.
    Range(i32, i32, bool),
    /// Matches `lo + k * step` for some `k >= 0` with `lo + k * step <= hi`, after wrapping both
    /// endpoints. `step` is always positive.
    Stepped(i32, i32, i32),
    /// Matches iff the callback returns `true`. The callback receives the *unwrapped* candidate
    /// value, never the pattern's own values (there are none to wrap).
    Predicate(Arc<dyn Fn(i32) -> bool + Send + Sync>),
}

impl fmt::Debug for FieldPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldPattern::Unset => write!(f, "Unset"),
            FieldPattern::Always(b) => write!(f, "Always({b})"),
            FieldPattern::Exact(n) => write!(f, "Exact({n})"),
            FieldPattern::List(v) => write!(f, "List({v:?})"),
            FieldPattern::Range(lo, hi, incl) => write!(f, "Range({lo}, {hi}, inclusive={incl})"),
            FieldPattern::Stepped(lo, hi, step) => write!(f, "Stepped({lo}, {hi}, step={step})"),
            FieldPattern::Predicate(_) => write!(f, "Predicate(<fn>)"),
        }
    }
}

impl PartialEq for FieldPattern {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldPattern::Unset, FieldPattern::Unset) => true,
            (FieldPattern::Always(a), FieldPattern::Always(b)) => a == b,
            (FieldPattern::Exact(a), FieldPattern::Exact(b)) => a == b,
            (FieldPattern::List(a), FieldPattern::List(b)) => a == b,
            (FieldPattern::Range(a, b, c), FieldPattern::Range(d, e, f)) => (a, b, c) == (d, e, f),
            (FieldPattern::Stepped(a, b, c), FieldPattern::Stepped(d, e, f)) => {
                (a, b, c) == (d, e, f)
            }
            // Closures have no meaningful structural equality; two predicates are equal only if
            // they are literally the same allocation.
            (FieldPattern::Predicate(a), FieldPattern::Predicate(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Default for FieldPattern {
    fn default() -> Self {
        FieldPattern::Unset
    }
}

fn wrap(value: i32, max: Option<i32>) -> i32 {
    if value < 0 {
        match max {
            Some(max) => max + value + 1,
            None => value,
        }
    } else {
        value
    }
}

impl FieldPattern {
    /// Does `value` (already in its natural, non-negative civil representation) match this
    /// pattern, given the slot's `max` (its wrap anchor, e.g. `days_in_month` for the day slot)?
    pub fn matches(&self, value: i32, max: Option<i32>) -> bool {
        match self {
            FieldPattern::Unset => true,
            FieldPattern::Always(b) => *b,
            FieldPattern::Exact(n) => wrap(*n, max) == value,
            FieldPattern::List(items) => items.iter().any(|&n| wrap(n, max) == value),
            FieldPattern::Range(lo, hi, inclusive) => {
                let lo = wrap(*lo, max);
                let hi = wrap(*hi, max);
                if *inclusive { lo <= value && value <= hi } else { lo <= value && value < hi }
            }
            FieldPattern::Stepped(lo, hi, step) => {
                let lo = wrap(*lo, max);
                let hi = wrap(*hi, max);
                *step > 0 && value >= lo && value <= hi && (value - lo) % step == 0
            }
            FieldPattern::Predicate(f) => f(value),
        }
    }

    /// Deterministic ascending enumeration of this pattern's matching values. [`FieldPattern::Unset`]
    /// and [`FieldPattern::Predicate`] cannot be enumerated and expand to a single-element sequence
    /// containing a clone of themselves.
    pub fn expand(&self, max: Option<i32>) -> Vec<FieldPattern> {
        match self {
            FieldPattern::Unset | FieldPattern::Predicate(_) => vec![self.clone()],
            FieldPattern::Exact(_) | FieldPattern::Always(_) => vec![self.clone()],
            FieldPattern::List(items) => {
                let mut wrapped: Vec<i32> = items.iter().map(|&n| wrap(n, max)).collect();
                wrapped.sort_unstable();
                wrapped.dedup();
                wrapped.into_iter().map(FieldPattern::Exact).collect()
            }
            FieldPattern::Range(lo, hi, inclusive) => {
                let lo = wrap(*lo, max);
                let hi = wrap(*hi, max);
                let upper = if *inclusive { hi } else { hi - 1 };
                (lo..=upper).map(FieldPattern::Exact).collect()
            }
            FieldPattern::Stepped(lo, hi, step) => {
                let lo = wrap(*lo, max);
                let hi = wrap(*hi, max);
                let mut out = Vec::new();
                let mut current = lo;
                while current <= hi {
                    out.push(FieldPattern::Exact(current));
                    current += step;
                }
                out
            }
        }
    }

    /// Chooses a concrete value for this slot: `default` if it already matches (or if `strict` is
    /// `false`, unconditionally), otherwise the smallest matching value. [`FieldPattern::Unset`]
    /// and [`FieldPattern::Always`] always return `default`, since neither pins a concrete value.
    pub fn materialize(&self, default: i32, max: Option<i32>, strict: bool) -> i32 {
        if !strict {
            return default;
        }
        match self {
            FieldPattern::Unset | FieldPattern::Always(_) => default,
            _ => {
                if self.matches(default, max) {
                    return default;
                }
                let upper = max.unwrap_or(9_999);
                for candidate in 0..=upper {
                    if self.matches(candidate, max) {
                        return candidate;
                    }
                }
                default
            }
        }
    }
}
