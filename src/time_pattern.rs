//! [`TimePattern`] describes a recurring or broadly-defined moment in civil time: a record of 11
//! [`FieldPattern`] slots plus an optional IANA location, built the way the teacher crate's
//! `TaskScheduleCalendar` is built — via [`typed_builder::TypedBuilder`], one field per civil
//! component, every field defaulting to "don't care".

use crate::calendar;
use crate::errors::{CoreError, CoreResult};
use crate::field_pattern::FieldPattern;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use typed_builder::TypedBuilder;

/// Maximum number of passes [`TimePattern::materialize`] will spend reconciling the week-of-year,
/// day-of-week, and day-of-year slots against each other before giving up.
const MAX_RECONCILE_PASSES: usize = 10;

/// A recurrence (or broad moment) in civil time: 11 [`FieldPattern`] slots plus an optional
/// location. Every instant this crate reasons about is canonically a `DateTime<Utc>`; when a
/// pattern carries a `location`, matching and materialization are performed against that
/// location's civil fields instead of UTC's, per §4.3.
///
/// # Construction
/// Build one via [`TimePattern::builder`]. Every slot defaults to [`FieldPattern::Unset`] (matches
/// anything) and `location` defaults to `None` (UTC civil fields).
///
/// # Cloning
/// Cheap — every slot is plain data or an `Arc`-backed predicate.
#[derive(Clone, TypedBuilder)]
pub struct TimePattern {
    #[builder(default)]
    pub year: FieldPattern,
    #[builder(default)]
    pub month: FieldPattern,
    #[builder(default)]
    pub day: FieldPattern,
    #[builder(default)]
    pub week: FieldPattern,
    #[builder(default)]
    pub day_of_week: FieldPattern,
    #[builder(default)]
    pub day_of_year: FieldPattern,
    #[builder(default)]
    pub hour: FieldPattern,
    #[builder(default)]
    pub minute: FieldPattern,
    #[builder(default)]
    pub second: FieldPattern,
    #[builder(default)]
    pub millisecond: FieldPattern,
    #[builder(default)]
    pub nanosecond: FieldPattern,
    #[builder(default, setter(strip_option))]
    pub location: Option<Tz>,
}

/// The civil fields of an instant, in whatever location a [`TimePattern`] cares about.
struct CivilFields {
    naive: NaiveDateTime,
}

impl CivilFields {
    fn of(instant: DateTime<Utc>, location: Option<Tz>) -> Self {
        let naive = match location {
            Some(tz) => instant.with_timezone(&tz).naive_local(),
            None => instant.naive_utc(),
        };
        CivilFields { naive }
    }

    fn date(&self) -> NaiveDate {
        self.naive.date()
    }
}

impl TimePattern {
    /// Conjunction of [`TimePattern::matches_date`] and [`TimePattern::matches_time`].
    pub fn matches(&self, instant: &DateTime<Utc>) -> bool {
        self.matches_date(instant) && self.matches_time(instant)
    }

    /// Per-slot conjunction over the 6 date slots: year, month, day, week, day-of-week,
    /// day-of-year. An all-`Unset` pattern matches every date.
    pub fn matches_date(&self, instant: &DateTime<Utc>) -> bool {
        let civil = CivilFields::of(*instant, self.location);
        let date = civil.date();
        self.year.matches(date.year(), Some(9_999))
            && self.month.matches(date.month() as i32, Some(12))
            && self.day.matches(date.day() as i32, Some(calendar::days_in_month(date.year(), date.month()) as i32))
            && self.week.matches(calendar::week_of_year(date) as i32, Some(calendar::weeks_in_year(date.year()) as i32))
            && self.day_of_week.matches(calendar::day_of_week(date) as i32, Some(7))
            && self.day_of_year.matches(calendar::day_of_year(date) as i32, Some(calendar::days_in_year(date.year()) as i32))
    }

    /// Per-slot conjunction over the 5 time slots: hour, minute, second, millisecond, nanosecond.
    /// An all-`Unset` pattern matches every time of day.
    pub fn matches_time(&self, instant: &DateTime<Utc>) -> bool {
        let civil = CivilFields::of(*instant, self.location);
        let t = civil.naive.time();
        self.hour.matches(t.hour() as i32, Some(23))
            && self.minute.matches(t.minute() as i32, Some(59))
            && self.second.matches(t.second() as i32, Some(59))
            && self.millisecond.matches((t.nanosecond() / 1_000_000) as i32, Some(999))
            && self.nanosecond.matches((t.nanosecond() % 1_000_000_000) as i32, Some(999_999_999))
    }

    /// Builds a [`TimePattern`] whose 11 slots are pinned to `t`'s own civil fields (as
    /// [`FieldPattern::Exact`]), in `location` if given, else UTC. The resulting pattern matches
    /// exactly `t` and nothing else — the invariant `TimePattern::from_instant(t).matches(t)` holds
    /// unconditionally (see the crate-level property tests).
    ///
    /// `include_millis` and `include_nanos` control whether the millisecond/nanosecond slots are
    /// pinned or left `Unset`; a caller building a rigid pattern to then clear selected slots with
    /// [`TimePattern::clear_time`]/[`TimePattern::clear_date`] will usually want both `true`.
    pub fn from_instant(
        t: DateTime<Utc>,
        location: Option<Tz>,
        include_millis: bool,
        include_nanos: bool,
    ) -> Self {
        let civil = CivilFields::of(t, location);
        let date = civil.date();
        let time = civil.naive.time();
        TimePattern {
            year: FieldPattern::Exact(date.year()),
            month: FieldPattern::Exact(date.month() as i32),
            day: FieldPattern::Exact(date.day() as i32),
            week: FieldPattern::Exact(calendar::week_of_year(date) as i32),
            day_of_week: FieldPattern::Exact(calendar::day_of_week(date) as i32),
            day_of_year: FieldPattern::Exact(calendar::day_of_year(date) as i32),
            hour: FieldPattern::Exact(time.hour() as i32),
            minute: FieldPattern::Exact(time.minute() as i32),
            second: FieldPattern::Exact(time.second() as i32),
            millisecond: if include_millis {
                FieldPattern::Exact((time.nanosecond() / 1_000_000) as i32)
            } else {
                FieldPattern::Unset
            },
            nanosecond: if include_nanos {
                FieldPattern::Exact((time.nanosecond() % 1_000_000_000) as i32)
            } else {
                FieldPattern::Unset
            },
            location,
        }
    }

    /// Returns a clone with `hour` through `nanosecond` reset to [`FieldPattern::Unset`].
    pub fn clear_time(&self) -> Self {
        let mut cleared = self.clone();
        cleared.hour = FieldPattern::Unset;
        cleared.minute = FieldPattern::Unset;
        cleared.second = FieldPattern::Unset;
        cleared.millisecond = FieldPattern::Unset;
        cleared.nanosecond = FieldPattern::Unset;
        cleared
    }

    /// Returns a clone with `year` through `day_of_year` reset to [`FieldPattern::Unset`].
    pub fn clear_date(&self) -> Self {
        let mut cleared = self.clone();
        cleared.year = FieldPattern::Unset;
        cleared.month = FieldPattern::Unset;
        cleared.day = FieldPattern::Unset;
        cleared.week = FieldPattern::Unset;
        cleared.day_of_week = FieldPattern::Unset;
        cleared.day_of_year = FieldPattern::Unset;
        cleared
    }

    /// Converts this pattern into a single concrete instant, using `hint` to fill in any
    /// `Unset`/`Always` slot and to break ties for under-constrained slots.
    ///
    /// `year`, `month`, `day`, `hour`, `minute`, `second`, `millisecond` and `nanosecond` are
    /// chosen directly via [`FieldPattern::materialize`] against `hint`'s corresponding civil
    /// field; `week`, `day_of_week` and `day_of_year` are then reconciled against the resulting
    /// date by repeatedly nudging it forward (in days, or weeks for `week`) until all three agree
    /// or [`MAX_RECONCILE_PASSES`] is exhausted, in which case [`CoreError::Unreconcilable`] is
    /// raised.
    pub fn materialize(&self, hint: DateTime<Utc>) -> CoreResult<DateTime<Utc>> {
        let civil = CivilFields::of(hint, self.location);
        let date = civil.date();
        let time = civil.naive.time();

        let year = self.year.materialize(date.year(), Some(9_999), true);
        let month = self.month.materialize(date.month() as i32, Some(12), true).clamp(1, 12) as u32;
        let day_max = calendar::days_in_month(year, month) as i32;
        let day = self.day.materialize(date.day().min(day_max as u32) as i32, Some(day_max), true).clamp(1, day_max) as u32;
        let hour = self.hour.materialize(time.hour() as i32, Some(23), true).clamp(0, 23) as u32;
        let minute = self.minute.materialize(time.minute() as i32, Some(59), true).clamp(0, 59) as u32;
        let second = self.second.materialize(time.second() as i32, Some(59), true).clamp(0, 59) as u32;
        let millisecond = self
            .millisecond
            .materialize((time.nanosecond() / 1_000_000) as i32, Some(999), true)
            .clamp(0, 999) as u32;
        let nanosecond = self
            .nanosecond
            .materialize((time.nanosecond() % 1_000_000_000) as i32, Some(999_999_999), true)
            .clamp(0, 999_999_999) as u32;

        let naive_date =
            NaiveDate::from_ymd_opt(year, month, day).ok_or(CoreError::Unreconcilable(0))?;
        let naive_time = NaiveTime::from_hms_nano_opt(hour, minute, second, millisecond * 1_000_000 + nanosecond)
            .ok_or(CoreError::Unreconcilable(0))?;
        let mut naive = NaiveDateTime::new(naive_date, naive_time);

        for _ in 0..MAX_RECONCILE_PASSES {
            let mut reconciled = true;

            if !matches!(self.week, FieldPattern::Unset) {
                let date = naive.date();
                let current = calendar::week_of_year(date) as i32;
                let wrap = calendar::weeks_in_year(date.year()) as i32;
                let required = self.week.materialize(current, Some(wrap), true);
                let delta = (required - current).rem_euclid(wrap);
                if delta != 0 {
                    naive += chrono::Duration::weeks(delta as i64);
                    reconciled = false;
                }
            }

            if !matches!(self.day_of_week, FieldPattern::Unset) {
                let date = naive.date();
                let current = calendar::day_of_week(date) as i32;
                let required = self.day_of_week.materialize(current, Some(7), true);
                let delta = (required - current).rem_euclid(7);
                if delta != 0 {
                    naive += chrono::Duration::days(delta as i64);
                    reconciled = false;
                }
            }

            if !matches!(self.day_of_year, FieldPattern::Unset) {
                let date = naive.date();
                let current = calendar::day_of_year(date) as i32;
                let wrap = calendar::days_in_year(date.year()) as i32;
                let required = self.day_of_year.materialize(current, Some(wrap), true);
                let delta = (required - current).rem_euclid(wrap);
                if delta != 0 {
                    naive += chrono::Duration::days(delta as i64);
                    reconciled = false;
                }
            }

            if reconciled {
                return Ok(self.naive_to_instant(naive));
            }
        }

        Err(CoreError::Unreconcilable(MAX_RECONCILE_PASSES))
    }

    fn naive_to_instant(&self, naive: NaiveDateTime) -> DateTime<Utc> {
        match self.location {
            Some(tz) => tz
                .from_local_datetime(&naive)
                .single()
                .unwrap_or_else(|| tz.from_utc_datetime(&naive))
                .with_timezone(&Utc),
            None => Utc.from_utc_datetime(&naive),
        }
    }

    /// Cartesian-product expansion over the 11 slots' [`FieldPattern::expand`] sequences, with
    /// `year` varying outermost and `nanosecond` innermost. `Unset`/`Predicate` slots are
    /// preserved rather than enumerated.
    pub fn expand(&self) -> Vec<TimePattern> {
        // The `max` for each slot depends on the concrete year/month being enumerated for day,
        // week and day_of_year; to keep expansion deterministic and independent of a hint, those
        // three slots expand against a representative non-leap year / 31-day month when they are
        // not already pinned to a single exact value (mirroring how the scheduler never expands
        // a `TaskPattern`'s due list outside of `TimePattern::materialize`, which always nails
        // down a concrete year/month first).
        let year_opts = self.year.expand(Some(9_999));
        let mut out = Vec::new();
        for year in &year_opts {
            let year_val = exact_or(year, 9999);
            let month_opts = self.month.expand(Some(12));
            for month in &month_opts {
                let month_val = exact_or(month, 1).clamp(1, 12);
                let day_max = calendar::days_in_month(year_val, month_val as u32) as i32;
                let day_opts = self.day.expand(Some(day_max));
                for day in &day_opts {
                    let week_opts = self.week.expand(Some(53));
                    for week in &week_opts {
                        let dow_opts = self.day_of_week.expand(Some(7));
                        for dow in &dow_opts {
                            let doy_max = calendar::days_in_year(year_val) as i32;
                            let doy_opts = self.day_of_year.expand(Some(doy_max));
                            for doy in &doy_opts {
                                let hour_opts = self.hour.expand(Some(23));
                                for hour in &hour_opts {
                                    let minute_opts = self.minute.expand(Some(59));
                                    for minute in &minute_opts {
                                        let second_opts = self.second.expand(Some(59));
                                        for second in &second_opts {
                                            let milli_opts = self.millisecond.expand(Some(999));
                                            for milli in &milli_opts {
                                                let nano_opts =
                                                    self.nanosecond.expand(Some(999_999_999));
                                                for nano in &nano_opts {
                                                    out.push(TimePattern {
                                                        year: year.clone(),
                                                        month: month.clone(),
                                                        day: day.clone(),
                                                        week: week.clone(),
                                                        day_of_week: dow.clone(),
                                                        day_of_year: doy.clone(),
                                                        hour: hour.clone(),
                                                        minute: minute.clone(),
                                                        second: second.clone(),
                                                        millisecond: milli.clone(),
                                                        nanosecond: nano.clone(),
                                                        location: self.location,
                                                    });
                                                }
                                            }
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
        out
    }
}

fn exact_or(pattern: &FieldPattern, default: i32) -> i32 {
    match pattern {
        FieldPattern::Exact(n) => *n,
        _ => default,
    }
}
