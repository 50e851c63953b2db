//! Pure functions over civil year/month/day triples and instants.
//!
//! [`TimePattern`](crate::time_pattern::TimePattern) and the scheduler lean on `chrono` for the
//! actual Gregorian/ISO arithmetic; this module is the thin seam between that arithmetic and the
//! rest of the crate, so the wrap-anchor and reconciliation logic in [`crate::field_pattern`] and
//! [`crate::time_pattern`] never has to reach into `chrono` directly.

use chrono::{Datelike, NaiveDate};

/// Number of days in `year`/`month` (1-based month), honoring Gregorian leap rules.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let first_of_next =
        NaiveDate::from_ymd_opt(next_year, next_month, 1).expect("month is in 1..=12");
    first_of_next
        .pred_opt()
        .expect("the day before the first of a month always exists")
        .day()
}

/// `365` or `366`, depending on whether `year` is a Gregorian leap year.
pub fn days_in_year(year: i32) -> u32 {
    if NaiveDate::from_ymd_opt(year, 2, 29).is_some() { 366 } else { 365 }
}

/// ISO day-of-week, Monday = 1 .. Sunday = 7.
pub fn day_of_week(date: NaiveDate) -> u32 {
    date.weekday().number_from_monday()
}

/// 1-based ordinal day within the year.
pub fn day_of_year(date: NaiveDate) -> u32 {
    date.ordinal()
}

/// ISO week number of `date`, with a non-standard wrap convention at the year boundary: rather
/// than reporting that a leading January date belongs to week 52/53 of the *previous* year (as
/// plain ISO-8601 would), it is reported as week `0` of the *current* year; a trailing December
/// date that ISO would assign to week 1 of *next* year is reported as week `53` of the current
/// year. This keeps every returned week number attached to `date`'s own calendar year, which is
/// what [`TimePattern`](crate::time_pattern::TimePattern)'s `week` slot wraps against.
pub fn week_of_year(date: NaiveDate) -> u32 {
    let iso = date.iso_week();
    match iso.year().cmp(&date.year()) {
        std::cmp::Ordering::Less => 0,
        std::cmp::Ordering::Greater => 53,
        std::cmp::Ordering::Equal => iso.week(),
    }
}

/// The highest ISO week number that occurs in `year` (52 or 53), i.e. the wrap anchor used to
/// materialize the `week` slot. December 28th always falls in the last ISO week of its year.
pub fn weeks_in_year(year: i32) -> u32 {
    NaiveDate::from_ymd_opt(year, 12, 28)
        .expect("december 28th always exists")
        .iso_week()
        .week()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leap_years_have_29_days_in_february() {
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2023, 2), 28);
        assert_eq!(days_in_month(1900, 2), 28); // divisible by 100 but not 400
        assert_eq!(days_in_month(2000, 2), 29); // divisible by 400
    }

    #[test]
    fn days_in_year_matches_leap_rule() {
        assert_eq!(days_in_year(2024), 366);
        assert_eq!(days_in_year(2023), 365);
    }

    #[test]
    fn week_zero_wraps_leading_january_days() {
        // 2023-01-01 is a Sunday, ISO-wise it belongs to week 52 of 2022.
        let date = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        assert_eq!(week_of_year(date), 0);
    }

    #[test]
    fn week_53_wraps_trailing_december_days() {
        // 2018-12-31 is a Monday, ISO-wise it belongs to week 1 of 2019.
        let date = NaiveDate::from_ymd_opt(2018, 12, 31).unwrap();
        assert_eq!(week_of_year(date), 53);
    }

    #[test]
    fn weeks_in_year_is_52_or_53() {
        assert_eq!(weeks_in_year(2023), 52);
        assert_eq!(weeks_in_year(2020), 53);
    }

    #[test]
    fn day_of_week_is_monday_based() {
        let monday = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(day_of_week(monday), 1);
        let sunday = NaiveDate::from_ymd_opt(2024, 1, 7).unwrap();
        assert_eq!(day_of_week(sunday), 7);
    }
}
