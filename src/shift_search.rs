//! [`ShiftSearch`] is the bounded, deterministic state machine used to re-place a due-but-omitted
//! occurrence (forward search) and to decide whether a shifted occurrence effectively covers a
//! queried instant (inverse reachability). Both procedures are plain bounded loops rather than
//! anything recursive, in keeping with the synchronous, single-threaded contract the rest of this
//! crate holds itself to.

use chrono::{DateTime, TimeDelta, Utc};

/// The outcome of [`ShiftSearch::forward_shift`]: either a delta that clears the stop predicate,
/// or bound exhaustion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftOutcome {
    /// A delta `d` such that `stop_predicate(base + d)` is false.
    Found(TimeDelta),
    /// `max_shifts` or `max_shift` was exceeded before a clearing instant was found.
    NotFound,
}

/// Parameters shared by [`ShiftSearch::forward_shift`] and [`ShiftSearch::is_reachable_from_base`]:
/// the fixed step (`shift`), an optional absolute-distance cap (`max_shift`), and a hard iteration
/// cap (`max_shifts`).
#[derive(Debug, Clone, Copy)]
pub struct ShiftSearch {
    pub shift: TimeDelta,
    pub max_shift: Option<TimeDelta>,
    pub max_shifts: u32,
}

impl ShiftSearch {
    /// Starting at `base`, repeatedly adds `shift` until `stop_predicate` returns `false` for the
    /// running instant, or a bound is exceeded.
    ///
    /// A `shift` of zero duration returns [`ShiftOutcome::NotFound`] immediately — advancing by
    /// zero can never clear a stop predicate, and looping would never terminate.
    pub fn forward_shift(&self, base: DateTime<Utc>, stop_predicate: impl Fn(DateTime<Utc>) -> bool) -> ShiftOutcome {
        if self.shift.is_zero() {
            return ShiftOutcome::NotFound;
        }
        let mut current = base;
        let mut shifts_taken = 0u32;
        loop {
            if shifts_taken > self.max_shifts {
                return ShiftOutcome::NotFound;
            }
            current += self.shift;
            shifts_taken += 1;
            if let Some(max_shift) = self.max_shift {
                if (current - base).abs() > max_shift {
                    return ShiftOutcome::NotFound;
                }
            }
            if !stop_predicate(current) {
                return ShiftOutcome::Found(current - base);
            }
        }
    }

    /// Walks candidate base instants `target - k * shift` for `k = 1, 2, ...` up to `max_shifts`,
    /// asking `resolver` at each one; returns `true` as soon as some candidate's resolved delta
    /// lands exactly on `target`.
    ///
    /// `resolver` mirrors `strict_on?` restricted to the duration-result case: it returns `Some(delta)`
    /// when the base instant is itself due-but-shiftable with that delta, or `None` when it is not
    /// (a base instant that is merely "on" without a duration result can never be reached this way,
    /// matching the contract that a `True` at the base does not imply reachability of `target`).
    pub fn is_reachable_from_base(
        &self,
        target: DateTime<Utc>,
        resolver: impl Fn(DateTime<Utc>) -> Option<TimeDelta>,
    ) -> bool {
        if self.shift.is_zero() {
            return false;
        }
        let mut base = target;
        for _ in 0..self.max_shifts {
            base -= self.shift;
            if let Some(max_shift) = self.max_shift {
                if (target - base).abs() > max_shift {
                    return false;
                }
            }
            if let Some(delta) = resolver(base) {
                if base + delta == target {
                    return true;
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn zero_shift_is_never_found() {
        let search = ShiftSearch { shift: TimeDelta::zero(), max_shift: None, max_shifts: 10 };
        let outcome = search.forward_shift(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(), |_| true);
        assert_eq!(outcome, ShiftOutcome::NotFound);
    }

    #[test]
    fn forward_shift_stops_as_soon_as_the_predicate_clears() {
        let search =
            ShiftSearch { shift: TimeDelta::days(1), max_shift: Some(TimeDelta::days(10)), max_shifts: 1500 };
        let base = Utc.with_ymd_and_hms(2017, 3, 15, 0, 0, 0).unwrap();
        // Omitted on day 15 and 16 only.
        let omitted = |t: DateTime<Utc>| (t - base).num_days() < 2;
        let outcome = search.forward_shift(base, omitted);
        assert_eq!(outcome, ShiftOutcome::Found(TimeDelta::days(2)));
    }

    #[test]
    fn forward_shift_rejects_when_max_shift_is_too_small() {
        let search = ShiftSearch { shift: TimeDelta::days(1), max_shift: Some(TimeDelta::days(1)), max_shifts: 1500 };
        let base = Utc.with_ymd_and_hms(2017, 3, 15, 0, 0, 0).unwrap();
        let always_omitted = |_: DateTime<Utc>| true;
        let outcome = search.forward_shift(base, always_omitted);
        assert_eq!(outcome, ShiftOutcome::NotFound);
    }

    #[test]
    fn inverse_reachability_finds_the_stepping_back_base() {
        let search = ShiftSearch { shift: TimeDelta::days(1), max_shift: Some(TimeDelta::days(5)), max_shifts: 10 };
        let target = Utc.with_ymd_and_hms(2017, 3, 16, 0, 0, 0).unwrap();
        let resolver = |base: DateTime<Utc>| {
            if base == Utc.with_ymd_and_hms(2017, 3, 15, 0, 0, 0).unwrap() {
                Some(TimeDelta::days(1))
            } else {
                None
            }
        };
        assert!(search.is_reachable_from_base(target, resolver));
    }

    #[test]
    fn inverse_reachability_is_false_when_no_base_resolves_exactly_onto_target() {
        let search = ShiftSearch { shift: TimeDelta::days(1), max_shift: Some(TimeDelta::days(5)), max_shifts: 10 };
        let target = Utc.with_ymd_and_hms(2017, 3, 16, 0, 0, 0).unwrap();
        assert!(!search.is_reachable_from_base(target, |_| None));
    }
}
