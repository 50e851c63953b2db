//! Integration tests for the eight end-to-end seed scenarios from the calendar/scheduler spec's
//! testable-properties section. Named after what each scenario demonstrates, not its spec tag.

use chrono::{TimeDelta, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::Once;
use virtualdate::field_pattern::FieldPattern;
use virtualdate::scheduler::Scheduler;
use virtualdate::task_pattern::{ShiftPolicy, TaskPattern};
use virtualdate::time_pattern::TimePattern;

static TRACING_INIT: Once = Once::new();

/// Installs the `tracing_subscriber` fmt subscriber once per test binary so that the
/// `debug!`/`trace!` calls `Scheduler::build` emits are actually rendered somewhere
/// (to the test harness's captured writer) instead of going to a no-op default
/// subscriber, matching how a caller wires up `tracing` for this crate.
fn init_tracing() {
    TRACING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(
                "virtualdate=trace".parse().expect("static directive parses"),
            ))
            .try_init()
            .ok();
    });
}

fn on(month: i32, day: i32) -> TimePattern {
    TimePattern::builder().month(FieldPattern::Exact(month)).day(FieldPattern::Exact(day)).build()
}

#[test]
fn negative_day_wrap_matches_the_last_day_of_the_month_only() {
    let pattern = on(5, -2);
    assert!(pattern.matches(&Utc.with_ymd_and_hms(2018, 5, 30, 0, 0, 0).unwrap()));
    assert!(!pattern.matches(&Utc.with_ymd_and_hms(2018, 5, 31, 0, 0, 0).unwrap()));
}

#[test]
fn stepped_day_range_matches_only_the_arithmetic_progression() {
    let pattern = TimePattern::builder()
        .month(FieldPattern::Exact(3))
        .day(FieldPattern::Stepped(10, 20, 2))
        .build();
    assert!(pattern.matches(&Utc.with_ymd_and_hms(2017, 3, 16, 0, 0, 0).unwrap()));
    assert!(!pattern.matches(&Utc.with_ymd_and_hms(2017, 3, 15, 0, 0, 0).unwrap()));
}

#[test]
fn due_but_omitted_instant_recovers_one_day_later_via_shift() {
    let task = TaskPattern::builder()
        .id("t1")
        .due(vec![on(3, 15)])
        .omit(vec![on(3, 15)])
        .shift(ShiftPolicy::Duration(TimeDelta::days(1)))
        .build();
    let t = Utc.with_ymd_and_hms(2017, 3, 15, 0, 0, 0).unwrap();
    let shifted = task.resolve(t, t);
    assert_eq!(
        shifted,
        virtualdate::task_pattern::ResolveResult::Instant(Utc.with_ymd_and_hms(2017, 3, 16, 0, 0, 0).unwrap())
    );
    let next_day = Utc.with_ymd_and_hms(2017, 3, 16, 0, 0, 0).unwrap();
    assert!(task.on(next_day, next_day));
}

#[test]
fn max_shift_smaller_than_the_omit_window_rejects_the_occurrence() {
    let task = TaskPattern::builder()
        .id("t1")
        .due(vec![TimePattern::builder()
            .year(FieldPattern::Exact(2017))
            .month(FieldPattern::Exact(3))
            .day(FieldPattern::Exact(15))
            .build()])
        .omit(vec![TimePattern::builder()
            .year(FieldPattern::Exact(2017))
            .month(FieldPattern::Exact(3))
            .day(FieldPattern::Range(15, 16, true))
            .build()])
        .shift(ShiftPolicy::Duration(TimeDelta::days(1)))
        .max_shift(TimeDelta::days(1))
        .build();
    let t = Utc.with_ymd_and_hms(2017, 3, 15, 0, 0, 0).unwrap();
    assert!(!task.on(t, t));
}

#[test]
fn a_fixed_dependency_pushes_its_dependent_past_its_finish() {
    init_tracing();
    let a = TaskPattern::builder()
        .id("A")
        .due(vec![TimePattern::builder()
            .hour(FieldPattern::Exact(9))
            .minute(FieldPattern::Exact(0))
            .second(FieldPattern::Exact(0))
            .build()])
        .duration(TimeDelta::hours(2))
        .fixed(true)
        .build();
    let b = TaskPattern::builder()
        .id("B")
        .due(vec![TimePattern::builder()
            .hour(FieldPattern::Exact(9))
            .minute(FieldPattern::Exact(0))
            .second(FieldPattern::Exact(0))
            .build()])
        .duration(TimeDelta::hours(1))
        .depends_on_ids(vec!["A".to_string()])
        .build();

    let scheduler = Scheduler::new(vec![a, b]);
    let from = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap();
    let to = Utc.with_ymd_and_hms(2023, 6, 2, 0, 0, 0).unwrap();
    let result = scheduler.build(from, to).unwrap();

    let a_instance = result.iter().find(|i| i.task_id == "A").unwrap();
    let b_instance = result.iter().find(|i| i.task_id == "B").unwrap();
    assert_eq!(a_instance.finish, Utc.with_ymd_and_hms(2023, 6, 1, 11, 0, 0).unwrap());
    assert!(b_instance.start >= a_instance.finish);
}

#[test]
fn stagger_with_parallel_three_produces_exactly_three_half_hour_spaced_instances() {
    init_tracing();
    let due = TimePattern::builder()
        .year(FieldPattern::Exact(2023))
        .month(FieldPattern::Exact(5))
        .day(FieldPattern::Exact(10))
        .hour(FieldPattern::Exact(10))
        .minute(FieldPattern::Exact(0))
        .second(FieldPattern::Exact(0))
        .build();
    let task = TaskPattern::builder()
        .id("staggered")
        .due(vec![due])
        .duration(TimeDelta::hours(1))
        .parallel(3)
        .stagger(TimeDelta::minutes(30))
        .build();
    let scheduler = Scheduler::new(vec![task]);
    let from = Utc.with_ymd_and_hms(2023, 5, 10, 0, 0, 0).unwrap();
    let to = Utc.with_ymd_and_hms(2023, 5, 11, 0, 0, 0).unwrap();
    let result = scheduler.build(from, to).unwrap();

    let starts: Vec<_> = result.iter().map(|i| i.start).collect();
    assert_eq!(
        starts,
        vec![
            Utc.with_ymd_and_hms(2023, 5, 10, 10, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2023, 5, 10, 10, 30, 0).unwrap(),
            Utc.with_ymd_and_hms(2023, 5, 10, 11, 0, 0).unwrap(),
        ]
    );
}

#[test]
fn a_shared_flag_parallel_quota_of_two_shifts_the_third_task_past_the_first_two() {
    init_tracing();
    let due = TimePattern::builder()
        .hour(FieldPattern::Exact(10))
        .minute(FieldPattern::Exact(0))
        .second(FieldPattern::Exact(0))
        .build();
    let flags = HashSet::from(["meeting".to_string()]);
    let tasks: Vec<TaskPattern> = ["one", "two", "three"]
        .into_iter()
        .map(|id| {
            TaskPattern::builder()
                .id(id)
                .due(vec![due.clone()])
                .duration(TimeDelta::hours(1))
                .parallel(2)
                .flags(flags.clone())
                .build()
        })
        .collect();
    let scheduler = Scheduler::new(tasks);
    let from = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
    let to = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap();
    let result = scheduler.build(from, to).unwrap();
    assert_eq!(result.len(), 3);

    let ten_oclock = Utc.with_ymd_and_hms(2023, 1, 1, 10, 0, 0).unwrap();
    let eleven_oclock = Utc.with_ymd_and_hms(2023, 1, 1, 11, 0, 0).unwrap();
    let at_ten = result.iter().filter(|i| i.start == ten_oclock).count();
    assert_eq!(at_ten, 2);
    let shifted = result.iter().find(|i| i.start != ten_oclock).unwrap();
    assert!(shifted.start >= eleven_oclock);
}

#[test]
fn a_missed_deadline_drops_the_instance_entirely() {
    let due = TimePattern::builder()
        .hour(FieldPattern::Exact(9))
        .minute(FieldPattern::Exact(0))
        .second(FieldPattern::Exact(0))
        .build();
    let deadline = virtualdate::task_pattern::InstantOrPattern::Pattern(
        TimePattern::builder()
            .hour(FieldPattern::Exact(10))
            .minute(FieldPattern::Exact(0))
            .second(FieldPattern::Exact(0))
            .build(),
    );
    let task = TaskPattern::builder()
        .id("late")
        .due(vec![due])
        .duration(TimeDelta::hours(2))
        .deadline(deadline)
        .build();
    let scheduler = Scheduler::new(vec![task]);
    let from = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
    let to = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap();
    let result = scheduler.build(from, to).unwrap();
    assert!(result.is_empty());
}

#[test]
fn schedule_build_is_deterministic_across_repeated_calls() {
    let due = TimePattern::builder()
        .hour(FieldPattern::Exact(9))
        .minute(FieldPattern::Exact(0))
        .second(FieldPattern::Exact(0))
        .build();
    let tasks = vec![
        TaskPattern::builder().id("a").due(vec![due.clone()]).duration(TimeDelta::minutes(30)).priority(1).build(),
        TaskPattern::builder().id("b").due(vec![due]).duration(TimeDelta::minutes(45)).priority(2).build(),
    ];
    let from = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
    let to = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap();

    let scheduler = Scheduler::new(tasks);
    let first = scheduler.build(from, to).unwrap();
    let second = scheduler.build(from, to).unwrap();

    let shape = |instances: &[virtualdate::scheduler::ScheduledInstance]| {
        instances.iter().map(|i| (i.task_id.clone(), i.start, i.finish)).collect::<Vec<_>>()
    };
    assert_eq!(shape(&first), shape(&second));
}
