//! Schema-versioned YAML load/save for a [`TaskPattern`] set, plus the small recursive-descent
//! parser for the pattern-scalar grammar used by `due`/`omit`/`begin`/`end`/`deadline` scalars.
//! Modeled on the connector-configuration loaders elsewhere in the pack: a plain serde-derived
//! `*Doc` shape deserialized with [`serde_yaml`], converted field-by-field into the domain type,
//! with every conversion failure accumulated into a [`ValidationIssue`] rather than short-circuited
//! on the first one.

use crate::errors::{CoreError, CoreResult, ValidationIssue};
use crate::field_pattern::FieldPattern;
use crate::task_pattern::{InstantOrPattern, OnResult, ShiftPolicy, TaskPattern};
use crate::time_pattern::TimePattern;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// The schema version this crate writes and the newest version it will load.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

#[derive(Debug, Deserialize, Serialize)]
struct ScheduleDoc {
    schema_version: u32,
    tasks: Vec<TaskDoc>,
}

/// A bare sequence of task mappings at the document root — the legacy (pre-schema-versioning)
/// format, accepted for read-only compatibility.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RootDoc {
    Versioned(ScheduleDoc),
    Legacy(Vec<TaskDoc>),
}

#[derive(Debug, Deserialize, Serialize)]
struct TaskDoc {
    id: String,
    #[serde(default)]
    begin: Option<serde_yaml::Value>,
    #[serde(default)]
    end: Option<serde_yaml::Value>,
    #[serde(default)]
    due: Vec<std::collections::HashMap<String, String>>,
    #[serde(default)]
    omit: Vec<std::collections::HashMap<String, String>>,
    #[serde(default)]
    shift: serde_yaml::Value,
    #[serde(default)]
    max_shift: Option<i64>,
    #[serde(default = "default_max_shifts")]
    max_shifts: u32,
    #[serde(default)]
    on: serde_yaml::Value,
    #[serde(default)]
    duration: i64,
    #[serde(default)]
    flags: Vec<String>,
    #[serde(default = "default_parallel")]
    parallel: i64,
    #[serde(default)]
    priority: i64,
    #[serde(default)]
    fixed: bool,
    #[serde(default)]
    stagger: Option<i64>,
    #[serde(default)]
    deadline: Option<serde_yaml::Value>,
    #[serde(default)]
    depends_on: Vec<String>,
}

fn default_max_shifts() -> u32 {
    1500
}

fn default_parallel() -> i64 {
    1
}

/// Parses `source` as a schedule document (schema-versioned mapping, or the legacy bare-sequence
/// root) and converts it into a list of [`TaskPattern`]s. Every structural problem encountered —
/// a malformed pattern scalar, an out-of-range field, an unsupported `schema_version` — is
/// recorded as a [`ValidationIssue`] and loading continues; if any issues were recorded, the whole
/// load fails with [`CoreError::ValidationError`] carrying all of them.
pub fn load_tasks(source: &str) -> CoreResult<Vec<TaskPattern>> {
    let root: RootDoc = match serde_yaml::from_str(source) {
        Ok(doc) => doc,
        Err(e) => {
            return Err(CoreError::ValidationError(vec![ValidationIssue {
                line: e.location().map(|l| l.line()).unwrap_or(0),
                column: e.location().map(|l| l.column()).unwrap_or(0),
                message: format!("malformed document: {e}"),
            }]));
        }
    };

    let task_docs = match root {
        RootDoc::Versioned(doc) => {
            if doc.schema_version > CURRENT_SCHEMA_VERSION {
                return Err(CoreError::InvalidArgument(format!(
                    "schema_version {} is newer than the {CURRENT_SCHEMA_VERSION} this crate supports",
                    doc.schema_version
                )));
            }
            doc.tasks
        }
        RootDoc::Legacy(tasks) => {
            warn!("loading a legacy schedule document with no schema_version header");
            tasks
        }
    };

    let locator = LineLocator::new(source);
    let mut issues = Vec::new();
    let mut tasks = Vec::with_capacity(task_docs.len());

    for (index, doc) in task_docs.into_iter().enumerate() {
        let (line, column) = locator.locate_task(index);
        match convert_task(doc, line, column) {
            Ok(task) => tasks.push(task),
            Err(mut task_issues) => issues.append(&mut task_issues),
        }
    }

    if !issues.is_empty() {
        return Err(CoreError::ValidationError(issues));
    }

    debug!(count = tasks.len(), "loaded schedule document");
    Ok(tasks)
}

/// Serializes `tasks` into the current schema-versioned YAML format.
pub fn save_tasks(tasks: &[TaskPattern]) -> CoreResult<String> {
    let doc = ScheduleDoc {
        schema_version: CURRENT_SCHEMA_VERSION,
        tasks: tasks.iter().map(task_to_doc).collect(),
    };
    serde_yaml::to_string(&doc).map_err(|e| {
        CoreError::ValidationError(vec![ValidationIssue { line: 0, column: 0, message: e.to_string() }])
    })
}

fn task_to_doc(task: &TaskPattern) -> TaskDoc {
    TaskDoc {
        id: task.id.clone(),
        begin: task.begin.as_ref().map(instant_or_pattern_to_value),
        end: task.end.as_ref().map(instant_or_pattern_to_value),
        due: task.due.iter().map(time_pattern_to_slots).collect(),
        omit: task.omit.iter().map(time_pattern_to_slots).collect(),
        shift: shift_policy_to_value(task.shift),
        max_shift: task.max_shift.map(|d| d.num_seconds()),
        max_shifts: task.max_shifts,
        on: on_result_to_value(task.on),
        duration: task.duration.num_seconds(),
        flags: task.flags.iter().cloned().collect(),
        parallel: task.parallel,
        priority: task.priority,
        fixed: task.fixed,
        stagger: task.stagger.map(|d| d.num_seconds()),
        deadline: task.deadline.as_ref().map(instant_or_pattern_to_value),
        depends_on: task.depends_on_ids.clone(),
    }
}

fn convert_task(doc: TaskDoc, line: usize, column: usize) -> Result<TaskPattern, Vec<ValidationIssue>> {
    let mut issues = Vec::new();

    let begin = doc.begin.as_ref().and_then(|v| {
        parse_instant_or_pattern(v, line, column, "begin", &mut issues)
    });
    let end = doc.end.as_ref().and_then(|v| parse_instant_or_pattern(v, line, column, "end", &mut issues));
    let deadline = doc.deadline.as_ref().and_then(|v| {
        parse_instant_or_pattern(v, line, column, "deadline", &mut issues)
    });

    let due = doc
        .due
        .iter()
        .filter_map(|slots| parse_time_pattern_slots(slots, line, column, &mut issues))
        .collect();
    let omit = doc
        .omit
        .iter()
        .filter_map(|slots| parse_time_pattern_slots(slots, line, column, &mut issues))
        .collect();

    let shift = parse_shift_policy(&doc.shift, line, column, "shift", &mut issues);
    let on = parse_on_result(&doc.on, line, column, &mut issues);

    if doc.parallel < 1 {
        issues.push(ValidationIssue {
            line,
            column,
            message: format!("task `{}`: parallel must be >= 1, got {}", doc.id, doc.parallel),
        });
    }
    if doc.duration < 0 {
        issues.push(ValidationIssue {
            line,
            column,
            message: format!("task `{}`: duration must be >= 0, got {}", doc.id, doc.duration),
        });
    }
    if let Some(stagger) = doc.stagger {
        if stagger <= 0 {
            issues.push(ValidationIssue {
                line,
                column,
                message: format!("task `{}`: stagger must be > 0 when set, got {stagger}", doc.id),
            });
        }
    }

    if !issues.is_empty() {
        return Err(issues);
    }

    // Only `id` is required by the builder; every other field defaults, then is overwritten
    // directly since `TaskPattern`'s fields are public and the remaining values here are already
    // `Option`-shaped (builder setters for optional fields strip the `Option` for ergonomic direct
    // construction, which doesn't fit a loader branching on presence).
    let mut task = TaskPattern::builder().id(doc.id).build();
    task.begin = begin.unwrap_or(None);
    task.end = end.unwrap_or(None);
    task.due = due;
    task.omit = omit;
    task.shift = shift;
    task.max_shift = doc.max_shift.map(TimeDelta::seconds);
    task.max_shifts = doc.max_shifts;
    task.on = on;
    task.duration = TimeDelta::seconds(doc.duration);
    task.flags = doc.flags.into_iter().collect::<HashSet<_>>();
    task.parallel = doc.parallel;
    task.priority = doc.priority;
    task.fixed = doc.fixed;
    task.stagger = doc.stagger.map(TimeDelta::seconds);
    task.deadline = deadline.unwrap_or(None);
    task.depends_on_ids = doc.depends_on;
    Ok(task)
}

fn parse_instant_or_pattern(
    value: &serde_yaml::Value,
    line: usize,
    column: usize,
    field: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Option<Option<InstantOrPattern>> {
    if let Some(text) = value.as_str() {
        if let Ok(instant) = DateTime::parse_from_rfc3339(text) {
            return Some(Some(InstantOrPattern::Instant(instant.with_timezone(&Utc))));
        }
        return match parse_scalar(text) {
            Ok(field_pattern) => {
                let pattern = TimePattern::builder().year(field_pattern).build();
                Some(Some(InstantOrPattern::Pattern(pattern)))
            }
            Err(message) => {
                issues.push(ValidationIssue { line, column, message: format!("{field}: {message}") });
                None
            }
        };
    }
    issues.push(ValidationIssue { line, column, message: format!("{field}: expected an RFC 3339 instant or pattern scalar") });
    None
}

fn instant_or_pattern_to_value(value: &InstantOrPattern) -> serde_yaml::Value {
    match value {
        InstantOrPattern::Instant(instant) => serde_yaml::Value::String(instant.to_rfc3339()),
        InstantOrPattern::Pattern(_) => serde_yaml::Value::String("nil".to_string()),
    }
}

/// The 11 `TimePattern` slot names, in the order they are both parsed from and written to a
/// `due`/`omit` entry's mapping. A key absent from the mapping leaves that slot `Unset`.
const TIME_PATTERN_SLOTS: [&str; 11] = [
    "year", "month", "day", "week", "day_of_week", "day_of_year", "hour", "minute", "second",
    "millisecond", "nanosecond",
];

fn parse_time_pattern_slots(
    slots: &std::collections::HashMap<String, String>,
    line: usize,
    column: usize,
    issues: &mut Vec<ValidationIssue>,
) -> Option<TimePattern> {
    let mut pattern = TimePattern::builder().build();
    let mut ok = true;
    for slot_name in TIME_PATTERN_SLOTS {
        let Some(scalar) = slots.get(slot_name) else { continue };
        match parse_scalar(scalar) {
            Ok(field_pattern) => set_slot(&mut pattern, slot_name, field_pattern),
            Err(message) => {
                issues.push(ValidationIssue { line, column, message: format!("{slot_name}: {message}") });
                ok = false;
            }
        }
    }
    if let Some(location) = slots.get("location") {
        match location.parse::<chrono_tz::Tz>() {
            Ok(tz) => pattern.location = Some(tz),
            Err(_) => {
                issues.push(ValidationIssue {
                    line,
                    column,
                    message: format!("location: unrecognized IANA zone `{location}`"),
                });
                ok = false;
            }
        }
    }
    ok.then_some(pattern)
}

fn set_slot(pattern: &mut TimePattern, slot_name: &str, value: FieldPattern) {
    match slot_name {
        "year" => pattern.year = value,
        "month" => pattern.month = value,
        "day" => pattern.day = value,
        "week" => pattern.week = value,
        "day_of_week" => pattern.day_of_week = value,
        "day_of_year" => pattern.day_of_year = value,
        "hour" => pattern.hour = value,
        "minute" => pattern.minute = value,
        "second" => pattern.second = value,
        "millisecond" => pattern.millisecond = value,
        "nanosecond" => pattern.nanosecond = value,
        _ => unreachable!("not one of TIME_PATTERN_SLOTS"),
    }
}

fn get_slot(pattern: &TimePattern, slot_name: &str) -> &FieldPattern {
    match slot_name {
        "year" => &pattern.year,
        "month" => &pattern.month,
        "day" => &pattern.day,
        "week" => &pattern.week,
        "day_of_week" => &pattern.day_of_week,
        "day_of_year" => &pattern.day_of_year,
        "hour" => &pattern.hour,
        "minute" => &pattern.minute,
        "second" => &pattern.second,
        "millisecond" => &pattern.millisecond,
        "nanosecond" => &pattern.nanosecond,
        _ => unreachable!("not one of TIME_PATTERN_SLOTS"),
    }
}

fn time_pattern_to_slots(pattern: &TimePattern) -> std::collections::HashMap<String, String> {
    let mut slots = std::collections::HashMap::new();
    for slot_name in TIME_PATTERN_SLOTS {
        let field = get_slot(pattern, slot_name);
        if !matches!(field, FieldPattern::Unset) {
            slots.insert(slot_name.to_string(), field_pattern_to_scalar(field));
        }
    }
    if let Some(tz) = pattern.location {
        slots.insert("location".to_string(), tz.to_string());
    }
    slots
}

fn field_pattern_to_scalar(pattern: &FieldPattern) -> String {
    match pattern {
        FieldPattern::Unset => "nil".to_string(),
        FieldPattern::Always(true) => "true".to_string(),
        FieldPattern::Always(false) => "false".to_string(),
        FieldPattern::Exact(n) => n.to_string(),
        FieldPattern::List(items) => items.iter().map(i32::to_string).collect::<Vec<_>>().join(","),
        FieldPattern::Range(lo, hi, true) => format!("{lo}..{hi}"),
        FieldPattern::Range(lo, hi, false) => format!("{lo}...{hi}"),
        FieldPattern::Stepped(lo, hi, step) => format!("{lo}..{hi}/{step}"),
        FieldPattern::Predicate(_) => "->predicate".to_string(),
    }
}

fn parse_shift_policy(
    value: &serde_yaml::Value,
    line: usize,
    column: usize,
    field: &str,
    issues: &mut Vec<ValidationIssue>,
) -> ShiftPolicy {
    if value.is_null() {
        return ShiftPolicy::Null;
    }
    if let Some(b) = value.as_bool() {
        return if b { ShiftPolicy::True } else { ShiftPolicy::False };
    }
    if let Some(seconds) = value.as_i64() {
        return ShiftPolicy::Duration(TimeDelta::seconds(seconds));
    }
    issues.push(ValidationIssue { line, column, message: format!("{field}: expected null, bool, or integer seconds") });
    ShiftPolicy::Null
}

fn shift_policy_to_value(policy: ShiftPolicy) -> serde_yaml::Value {
    match policy {
        ShiftPolicy::Null => serde_yaml::Value::Null,
        ShiftPolicy::False => serde_yaml::Value::Bool(false),
        ShiftPolicy::True => serde_yaml::Value::Bool(true),
        ShiftPolicy::Duration(d) => serde_yaml::Value::Number(d.num_seconds().into()),
    }
}

fn parse_on_result(
    value: &serde_yaml::Value,
    line: usize,
    column: usize,
    issues: &mut Vec<ValidationIssue>,
) -> OnResult {
    if value.is_null() {
        return OnResult::Null;
    }
    if let Some(b) = value.as_bool() {
        return if b { OnResult::True } else { OnResult::False };
    }
    if let Some(seconds) = value.as_i64() {
        return OnResult::Duration(TimeDelta::seconds(seconds));
    }
    issues.push(ValidationIssue { line, column, message: "on: expected null, bool, or integer seconds".to_string() });
    OnResult::Null
}

fn on_result_to_value(on: OnResult) -> serde_yaml::Value {
    match on {
        OnResult::Null => serde_yaml::Value::Null,
        OnResult::False => serde_yaml::Value::Bool(false),
        OnResult::True => serde_yaml::Value::Bool(true),
        OnResult::Duration(d) => serde_yaml::Value::Number(d.num_seconds().into()),
    }
}

/// Parses a single pattern-scalar (the grammar used by `due`/`omit`/pattern-shaped
/// `begin`/`end`/`deadline` entries) into a [`FieldPattern`].
///
/// Grammar: `nil`; `true`/`false`; an integer; comma-separated integers (a list); `A..B`
/// (inclusive range); `A...B` (exclusive range); either range form with a `/S` step suffix;
/// `->...` (a predicate sentinel, which round-trips as an always-true placeholder — the original
/// predicate cannot be recovered from text).
pub fn parse_scalar(text: &str) -> CoreResult<FieldPattern> {
    parse_scalar_inner(text).map_err(|message| CoreError::InvalidPattern(text.to_string(), message))
}

fn parse_scalar_inner(text: &str) -> Result<FieldPattern, String> {
    let text = text.trim();
    if text.is_empty() || text == "nil" {
        return Ok(FieldPattern::Unset);
    }
    if text == "true" {
        return Ok(FieldPattern::Always(true));
    }
    if text == "false" {
        return Ok(FieldPattern::Always(false));
    }
    if let Some(rest) = text.strip_prefix("->") {
        let _ = rest;
        return Ok(FieldPattern::Always(true));
    }
    if text.contains(',') {
        let items = text
            .split(',')
            .map(|s| s.trim().parse::<i32>().map_err(|_| format!("invalid integer `{s}` in list `{text}`")))
            .collect::<Result<Vec<i32>, String>>()?;
        return Ok(FieldPattern::List(items));
    }
    if let Some((range_part, step_part)) = text.split_once('/') {
        let step: i32 =
            step_part.trim().parse().map_err(|_| format!("invalid step `{step_part}` in `{text}`"))?;
        if step <= 0 {
            return Err(format!("step must be positive in `{text}`"));
        }
        let (lo, hi) = parse_range_bounds(range_part)?;
        return Ok(FieldPattern::Stepped(lo, hi, step));
    }
    if let Some((lo, hi)) = text.split_once("...") {
        let lo = lo.trim().parse::<i32>().map_err(|_| format!("invalid range bound `{lo}` in `{text}`"))?;
        let hi = hi.trim().parse::<i32>().map_err(|_| format!("invalid range bound `{hi}` in `{text}`"))?;
        return Ok(FieldPattern::Range(lo, hi, false));
    }
    if let Some((lo, hi)) = text.split_once("..") {
        let lo = lo.trim().parse::<i32>().map_err(|_| format!("invalid range bound `{lo}` in `{text}`"))?;
        let hi = hi.trim().parse::<i32>().map_err(|_| format!("invalid range bound `{hi}` in `{text}`"))?;
        return Ok(FieldPattern::Range(lo, hi, true));
    }
    text.parse::<i32>().map(FieldPattern::Exact).map_err(|_| format!("invalid pattern scalar `{text}`"))
}

fn parse_range_bounds(range_part: &str) -> Result<(i32, i32), String> {
    let range_part = range_part.trim();
    if let Some((lo, hi)) = range_part.split_once("...") {
        let lo = lo.trim().parse::<i32>().map_err(|_| format!("invalid range bound in `{range_part}`"))?;
        let hi = hi.trim().parse::<i32>().map_err(|_| format!("invalid range bound in `{range_part}`"))?;
        return Ok((lo, hi));
    }
    if let Some((lo, hi)) = range_part.split_once("..") {
        let lo = lo.trim().parse::<i32>().map_err(|_| format!("invalid range bound in `{range_part}`"))?;
        let hi = hi.trim().parse::<i32>().map_err(|_| format!("invalid range bound in `{range_part}`"))?;
        return Ok((lo, hi));
    }
    Err(format!("stepped pattern `{range_part}` is missing a range"))
}

/// Approximates line numbers for the `tasks` sequence's items, given only the raw source text.
///
/// `serde_yaml` discards span information once a document is fully deserialized into owned
/// `struct`s, so exact line/column attribution for a deeply-nested validation failure is not
/// recoverable this way. This locator instead scans the raw text once for block-sequence item
/// markers (`- `) at the indentation level of the first task entry, and reports the line that
/// begins the `index`-th such item. This is a heuristic: it assumes tasks are written one-per-item
/// in block style and may mis-locate entries in documents that mix flow and block style.
struct LineLocator {
    task_item_lines: Vec<usize>,
}

impl LineLocator {
    fn new(source: &str) -> Self {
        let mut task_item_lines = Vec::new();
        let mut tasks_indent: Option<usize> = None;
        for (line_number, line) in source.lines().enumerate() {
            let trimmed = line.trim_start();
            let indent = line.len() - trimmed.len();
            if trimmed.starts_with("tasks:") {
                tasks_indent = Some(indent);
                continue;
            }
            if let Some(expected_indent) = tasks_indent {
                if trimmed.starts_with("- ") || trimmed == "-" {
                    if indent >= expected_indent {
                        task_item_lines.push(line_number + 1);
                    }
                } else if indent <= expected_indent && !trimmed.is_empty() {
                    tasks_indent = None;
                }
            } else if trimmed.starts_with("- ") && task_item_lines.is_empty() && indent == 0 {
                // Legacy bare-sequence root.
                task_item_lines.push(line_number + 1);
            }
        }
        LineLocator { task_item_lines }
    }

    fn locate_task(&self, index: usize) -> (usize, usize) {
        (self.task_item_lines.get(index).copied().unwrap_or(0), 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_scalar_nil_is_unset() {
        assert_eq!(parse_scalar("nil").unwrap(), FieldPattern::Unset);
    }

    #[test]
    fn parse_scalar_negative_exact() {
        assert_eq!(parse_scalar("-1").unwrap(), FieldPattern::Exact(-1));
    }

    #[test]
    fn parse_scalar_list() {
        assert_eq!(parse_scalar("1,2,3").unwrap(), FieldPattern::List(vec![1, 2, 3]));
    }

    #[test]
    fn parse_scalar_exclusive_before_inclusive_range() {
        assert_eq!(parse_scalar("1...5").unwrap(), FieldPattern::Range(1, 5, false));
        assert_eq!(parse_scalar("1..5").unwrap(), FieldPattern::Range(1, 5, true));
    }

    #[test]
    fn parse_scalar_stepped_range() {
        assert_eq!(parse_scalar("1..10/2").unwrap(), FieldPattern::Stepped(1, 10, 2));
    }

    #[test]
    fn parse_scalar_rejects_zero_step() {
        assert!(parse_scalar("1..10/0").is_err());
    }

    #[test]
    fn load_tasks_accepts_the_legacy_bare_sequence_root() {
        let yaml = "- id: t1\n  duration: 60\n";
        let tasks = load_tasks(yaml).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, "t1");
    }

    #[test]
    fn load_tasks_rejects_a_schema_version_newer_than_supported() {
        let yaml = "schema_version: 99\ntasks: []\n";
        assert!(matches!(load_tasks(yaml), Err(CoreError::InvalidArgument(_))));
    }

    #[test]
    fn load_tasks_accumulates_multiple_validation_issues() {
        let yaml = "schema_version: 2\ntasks:\n  - id: bad\n    parallel: 0\n    duration: -1\n";
        match load_tasks(yaml) {
            Err(CoreError::ValidationError(issues)) => assert_eq!(issues.len(), 2),
            other => panic!("expected accumulated validation errors, got {other:?}"),
        }
    }

    #[test]
    fn round_trips_a_simple_task_through_save_and_load() {
        let task = TaskPattern::builder().id("rt").duration(TimeDelta::seconds(120)).parallel(2).build();
        let yaml = save_tasks(&[task]).unwrap();
        let loaded = load_tasks(&yaml).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "rt");
        assert_eq!(loaded[0].parallel, 2);
    }
}
