//! [`Scheduler`] composes a set of [`TaskPattern`]s across a `[from, to)` window into a sorted
//! list of [`ScheduledInstance`]s: topological dependency ordering, candidate generation,
//! conflict resolution, parallelism enforcement, deadline rejection, and a per-instance
//! [`Explanation`] trace — built the same deliberate, single-pass, bounded-loop way the teacher
//! crate's own scheduling core is built, rather than reaching for backtracking search.

use crate::explanation::Explanation;
use crate::errors::{CoreError, CoreResult};
use crate::task_pattern::{ResolveResult, TaskPattern};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

/// Hard cap on the number of minute-resolution steps [`earliest_start_time`] will take while
/// scanning forward from a window's `from` instant.
const EARLIEST_START_STEP_CAP: u32 = 10_000;

/// A finished placement: the owning task's id, its start/finish, and the explanation trace that
/// led to it. Never mutated after [`Scheduler::build`] returns.
#[derive(Clone)]
pub struct ScheduledInstance {
    pub task_id: String,
    pub start: DateTime<Utc>,
    pub finish: DateTime<Utc>,
    pub explanation: Explanation,
    pub flags: HashSet<String>,
}

impl ScheduledInstance {
    /// Half-open overlap test: `[self.start, self.finish)` vs `[other_start, other_finish)`, with
    /// a zero-duration instance additionally covering an exact-match query instant.
    fn overlaps(&self, start: DateTime<Utc>, finish: DateTime<Utc>) -> bool {
        self.start < finish && start < self.finish
    }

    /// §4.6 `on_in_schedule?`: does this instance cover `t`, honoring the half-open rule (and the
    /// zero-duration exact-match exception)?
    pub fn covers(&self, t: DateTime<Utc>) -> bool {
        if self.start == self.finish {
            return self.start == t;
        }
        self.start <= t && t < self.finish
    }
}

/// Owns a task set and builds schedules over arbitrary windows. Cheap to construct; a scheduler
/// may be reused across windows as long as its task list is not mutated while a `build` is in
/// flight (callers enforce — see the crate's concurrency notes).
pub struct Scheduler {
    tasks: Vec<TaskPattern>,
}

impl Scheduler {
    /// Builds a scheduler over `tasks`. Dependency ids are resolved (and checked for existence and
    /// cycles) only inside [`Scheduler::build`], not here — constructing a `Scheduler` never fails.
    pub fn new(tasks: Vec<TaskPattern>) -> Self {
        Scheduler { tasks }
    }

    pub fn tasks(&self) -> &[TaskPattern] {
        &self.tasks
    }

    /// Builds the sorted schedule for `[from, to)`.
    pub fn build(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> CoreResult<Vec<ScheduledInstance>> {
        let order = self.topological_order()?;
        let dependents = self.dependents_by_index();

        let index_of: HashMap<&str, usize> =
            self.tasks.iter().enumerate().map(|(i, t)| (t.id.as_str(), i)).collect();

        let mut placed: Vec<ScheduledInstance> = Vec::new();
        let mut placed_finish_by_index: HashMap<usize, Vec<DateTime<Utc>>> = HashMap::new();

        for &task_index in &order {
            let task = &self.tasks[task_index];

            let mut dep_floor: Option<DateTime<Utc>> = None;
            let mut any_dep_unplaced = false;
            for dep_id in &task.depends_on_ids {
                match index_of.get(dep_id.as_str()) {
                    Some(&dep_index) => match placed_finish_by_index.get(&dep_index) {
                        Some(finishes) => {
                            let max_finish = finishes.iter().max().copied().unwrap();
                            dep_floor = Some(dep_floor.map_or(max_finish, |f: DateTime<Utc>| f.max(max_finish)));
                        }
                        None => any_dep_unplaced = true,
                    },
                    None => {
                        return Err(CoreError::InvalidArgument(format!(
                            "task `{}` depends on unknown task `{dep_id}`",
                            task.id
                        )));
                    }
                }
            }

            let has_dependents = !dependents.get(&task_index).map(|v| v.is_empty()).unwrap_or(true);

            if any_dep_unplaced {
                if has_dependents {
                    debug!(task = %task.id, "unsatisfiable: an unplaced dependency blocks a task with dependents");
                    return Err(CoreError::UnsatisfiableDependency(task.id.clone()));
                }
                trace!(task = %task.id, "dropped: an unplaced dependency blocks a task with no dependents");
                continue;
            }

            let candidates = self.generate_candidates(task, from, to)?;

            let mut placed_any = false;
            for candidate_start in candidates {
                let mut explanation = Explanation::new();
                explanation.push(format!("candidate generated at {candidate_start}"));
                trace!(task = %task.id, %candidate_start, "candidate generated");

                let start = match dep_floor {
                    Some(floor) if floor > candidate_start => {
                        explanation.push(format!("raised to dependency floor {floor}"));
                        trace!(task = %task.id, %candidate_start, %floor, "raised to dependency floor");
                        floor
                    }
                    _ => candidate_start,
                };

                if let Some(instance) = self.schedule_candidate(
                    task,
                    start,
                    to,
                    &mut placed,
                    has_dependents,
                    &mut explanation,
                ) {
                    debug!(task = %task.id, start = %instance.start, finish = %instance.finish, "placed");
                    placed_finish_by_index.entry(task_index).or_default().push(instance.finish);
                    placed.push(instance);
                    placed_any = true;
                }
            }

            if !placed_any && has_dependents {
                debug!(task = %task.id, "unsatisfiable: no candidate could be placed for a task with dependents");
                return Err(CoreError::UnsatisfiableDependency(task.id.clone()));
            }
        }

        placed.sort_by_key(|instance| instance.start);
        Ok(placed)
    }

    /// Kahn's algorithm with the deterministic tie-break `(fixed desc, priority desc, id asc)`;
    /// doubles as cycle detection — if the emitted order does not cover every task, some residual
    /// indegree-nonzero subset forms a cycle.
    fn topological_order(&self) -> CoreResult<Vec<usize>> {
        let n = self.tasks.len();
        let index_of: HashMap<&str, usize> =
            self.tasks.iter().enumerate().map(|(i, t)| (t.id.as_str(), i)).collect();

        let mut indegree = vec![0u32; n];
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, task) in self.tasks.iter().enumerate() {
            for dep_id in &task.depends_on_ids {
                let dep_index = *index_of.get(dep_id.as_str()).ok_or_else(|| {
                    CoreError::InvalidArgument(format!(
                        "task `{}` depends on unknown task `{dep_id}`",
                        task.id
                    ))
                })?;
                successors[dep_index].push(i);
                indegree[i] += 1;
            }
        }

        let mut remaining: HashSet<usize> = (0..n).collect();
        let mut order = Vec::with_capacity(n);

        while !remaining.is_empty() {
            let next = remaining
                .iter()
                .copied()
                .filter(|&i| indegree[i] == 0)
                .max_by(|&a, &b| {
                    let ta = &self.tasks[a];
                    let tb = &self.tasks[b];
                    ta.fixed
                        .cmp(&tb.fixed)
                        .then(ta.priority.cmp(&tb.priority))
                        .then(tb.id.cmp(&ta.id))
                });

            let Some(chosen) = next else {
                let stuck = remaining.iter().min().copied().unwrap();
                return Err(CoreError::Cycle(self.tasks[stuck].id.clone()));
            };

            remaining.remove(&chosen);
            order.push(chosen);
            for &succ in &successors[chosen] {
                indegree[succ] -= 1;
            }
        }

        Ok(order)
    }

    fn dependents_by_index(&self) -> HashMap<usize, Vec<usize>> {
        let index_of: HashMap<&str, usize> =
            self.tasks.iter().enumerate().map(|(i, t)| (t.id.as_str(), i)).collect();
        let mut dependents: HashMap<usize, Vec<usize>> = HashMap::new();
        for (i, task) in self.tasks.iter().enumerate() {
            for dep_id in &task.depends_on_ids {
                if let Some(&dep_index) = index_of.get(dep_id.as_str()) {
                    dependents.entry(dep_index).or_default().push(i);
                }
            }
        }
        dependents
    }

    /// §4.6 step 3b: generates the candidate start instants for one task within `[from, to)`.
    fn generate_candidates(
        &self,
        task: &TaskPattern,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> CoreResult<Vec<DateTime<Utc>>> {
        let earliest = match earliest_start_time(task, from, to)? {
            Some(instant) => instant,
            None => return Ok(Vec::new()),
        };

        let parallel = task.parallel.max(1);
        match task.stagger {
            Some(stagger) if parallel > 1 => {
                if stagger <= TimeDelta::zero() {
                    return Err(CoreError::InvalidArgument(format!(
                        "task `{}` has non-positive stagger",
                        task.id
                    )));
                }
                let mut out = Vec::new();
                for i in 0..parallel {
                    let candidate = earliest + stagger * i as i32;
                    if candidate >= to {
                        break;
                    }
                    if task.is_omitted(candidate) {
                        continue;
                    }
                    out.push(candidate);
                }
                Ok(out)
            }
            Some(stagger) if stagger <= TimeDelta::zero() => Err(CoreError::InvalidArgument(format!(
                "task `{}` has non-positive stagger",
                task.id
            ))),
            _ => Ok(vec![earliest]),
        }
    }

    /// §4.6 `schedule_candidate`: negotiates `start` against already-placed instances, mutating
    /// `start` and possibly evicting conflicting movable instances from `placed`, until the
    /// candidate is accepted or rejected outright.
    fn schedule_candidate(
        &self,
        task: &TaskPattern,
        mut start: DateTime<Utc>,
        horizon: DateTime<Utc>,
        placed: &mut Vec<ScheduledInstance>,
        has_dependents: bool,
        explanation: &mut Explanation,
    ) -> Option<ScheduledInstance> {
        loop {
            let finish = start + task.duration;
            if finish > horizon {
                explanation.push("rejected: would exceed the scheduling horizon".to_string());
                debug!(task = %task.id, %start, %finish, %horizon, "rejected: would exceed the scheduling horizon");
                return None;
            }

            if let Some(deadline) = task.deadline_at(start) {
                if finish > deadline {
                    explanation.push("rejected: would miss the task's deadline".to_string());
                    debug!(task = %task.id, %start, %finish, %deadline, "rejected: would miss the task's deadline");
                    return None;
                }
            }

            if self.acceptable_parallelism(task, start, finish, placed) {
                explanation.push(format!("accepted at {start}"));
                trace!(task = %task.id, %start, %finish, "accepted");
                return Some(ScheduledInstance {
                    task_id: task.id.clone(),
                    start,
                    finish,
                    explanation: explanation.clone(),
                    flags: task.flags.clone(),
                });
            }

            let conflict_index = placed.iter().position(|p| p.overlaps(start, finish) && flags_conflict(task, p, self));
            let Some(conflict_index) = conflict_index else {
                // No literal overlap found by flag, but acceptable_parallelism failed: this can
                // only happen if every overlapping instance belongs to a different flag bucket
                // that is itself saturated; nothing further can be negotiated.
                explanation.push("rejected: parallelism quota exhausted with no single movable conflict".to_string());
                debug!(task = %task.id, %start, %finish, "rejected: parallelism quota exhausted with no single movable conflict");
                return None;
            };

            let conflict_fixed = self.task_fixed_for_instance(&placed[conflict_index]);

            if conflict_fixed && has_dependents {
                explanation.push("accepted over a fixed conflict: dependency obligation takes precedence".to_string());
                debug!(task = %task.id, %start, conflict = %placed[conflict_index].task_id, "accepted over a fixed conflict: dependency obligation takes precedence");
                return Some(ScheduledInstance {
                    task_id: task.id.clone(),
                    start,
                    finish,
                    explanation: explanation.clone(),
                    flags: task.flags.clone(),
                });
            }

            if conflict_fixed && task.fixed {
                explanation.push("rejected: both the candidate and the conflict are fixed".to_string());
                debug!(task = %task.id, %start, conflict = %placed[conflict_index].task_id, "rejected: both the candidate and the conflict are fixed");
                return None;
            }

            if conflict_fixed {
                let conflict_finish = placed[conflict_index].finish;
                explanation.push(format!("deferred past fixed conflict to {conflict_finish}"));
                trace!(task = %task.id, conflict = %placed[conflict_index].task_id, %conflict_finish, "deferred past fixed conflict");
                start = conflict_finish;
                continue;
            }

            if task.fixed {
                explanation.push("evicted a movable conflict in favor of the fixed candidate".to_string());
                debug!(task = %task.id, evicted = %placed[conflict_index].task_id, "evicted a movable conflict in favor of the fixed candidate");
                placed.remove(conflict_index);
                continue;
            }

            let conflict_priority = self.task_priority_for_instance(&placed[conflict_index]);
            if task.priority > conflict_priority {
                explanation.push("evicted a lower-priority conflict".to_string());
                debug!(task = %task.id, priority = task.priority, evicted = %placed[conflict_index].task_id, evicted_priority = conflict_priority, "evicted a lower-priority conflict");
                placed.remove(conflict_index);
                continue;
            }
            if task.priority < conflict_priority {
                let conflict_finish = placed[conflict_index].finish;
                explanation.push(format!("deferred past higher-priority conflict to {conflict_finish}"));
                trace!(task = %task.id, priority = task.priority, conflict = %placed[conflict_index].task_id, conflict_priority, %conflict_finish, "deferred past higher-priority conflict");
                start = conflict_finish;
                continue;
            }

            let shift_span = match task.shift_span() {
                Some(span) if span > TimeDelta::zero() => span,
                _ => TimeDelta::minutes(1),
            };
            explanation.push(format!("shifted forward by {shift_span} to break an equal-priority conflict"));
            trace!(task = %task.id, %shift_span, conflict = %placed[conflict_index].task_id, "shifted forward to break an equal-priority conflict");
            start += shift_span;
        }
    }

    fn task_fixed_for_instance(&self, instance: &ScheduledInstance) -> bool {
        self.tasks.iter().find(|t| t.id == instance.task_id).map(|t| t.fixed).unwrap_or(false)
    }

    fn task_priority_for_instance(&self, instance: &ScheduledInstance) -> i64 {
        self.tasks.iter().find(|t| t.id == instance.task_id).map(|t| t.priority).unwrap_or(0)
    }

    fn owning_flags(&self, instance: &ScheduledInstance) -> HashSet<String> {
        self.tasks
            .iter()
            .find(|t| t.id == instance.task_id)
            .map(|t| t.parallelism_flags())
            .unwrap_or_default()
    }

    /// §4.6 `acceptable_parallelism?`: for every flag the candidate task carries (or its synthetic
    /// per-task flag if it has none), the number of already-placed, overlapping instances whose
    /// owning task shares that flag must stay strictly below `parallel`.
    fn acceptable_parallelism(
        &self,
        task: &TaskPattern,
        start: DateTime<Utc>,
        finish: DateTime<Utc>,
        placed: &[ScheduledInstance],
    ) -> bool {
        let flags = task.parallelism_flags();
        let parallel = task.parallel.max(1);
        for flag in &flags {
            let count = placed
                .iter()
                .filter(|p| p.overlaps(start, finish) && self.owning_flags(p).contains(flag))
                .count() as i64;
            if count >= parallel {
                return false;
            }
        }
        true
    }
}

/// §4.6 `earliest_start_time`: scans forward from `from` at minute resolution, honoring
/// `strict_on?`, up to [`EARLIEST_START_STEP_CAP`] steps.
fn earliest_start_time(
    task: &TaskPattern,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> CoreResult<Option<DateTime<Utc>>> {
    let mut cursor = from;
    for _ in 0..EARLIEST_START_STEP_CAP {
        if cursor >= to {
            return Ok(None);
        }
        match task.resolve(cursor, cursor) {
            ResolveResult::Instant(instant) => cursor = instant,
            ResolveResult::True => return Ok(Some(cursor)),
            ResolveResult::Unknown | ResolveResult::False => cursor += TimeDelta::minutes(1),
        }
    }
    Ok(None)
}

fn flags_conflict(task: &TaskPattern, instance: &ScheduledInstance, scheduler: &Scheduler) -> bool {
    !task.parallelism_flags().is_disjoint(&scheduler.owning_flags(instance))
}

impl TaskPattern {
    fn shift_span(&self) -> Option<TimeDelta> {
        match self.shift {
            crate::task_pattern::ShiftPolicy::Duration(d) => Some(d),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_pattern::FieldPattern;
    use crate::task_pattern::ShiftPolicy;
    use crate::time_pattern::TimePattern;
    use chrono::TimeZone;

    fn daily_at(hour: i32) -> TimePattern {
        TimePattern::builder().hour(FieldPattern::Exact(hour)).minute(FieldPattern::Exact(0)).second(FieldPattern::Exact(0)).build()
    }

    #[test]
    fn single_task_places_at_its_earliest_due_instant() {
        let task = TaskPattern::builder()
            .id("a")
            .due(vec![daily_at(9)])
            .duration(TimeDelta::hours(1))
            .build();
        let scheduler = Scheduler::new(vec![task]);
        let from = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 0).unwrap();
        let result = scheduler.build(from, to).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].start, Utc.with_ymd_and_hms(2020, 1, 1, 9, 0, 0).unwrap());
    }

    #[test]
    fn dependency_is_placed_after_its_predecessor_finishes() {
        let first = TaskPattern::builder().id("first").due(vec![daily_at(9)]).duration(TimeDelta::hours(2)).build();
        let second = TaskPattern::builder()
            .id("second")
            .due(vec![daily_at(9)])
            .duration(TimeDelta::hours(1))
            .depends_on_ids(vec!["first".to_string()])
            .build();
        let scheduler = Scheduler::new(vec![first, second]);
        let from = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2020, 1, 3, 0, 0, 0).unwrap();
        let result = scheduler.build(from, to).unwrap();
        let second_instance = result.iter().find(|i| i.task_id == "second").unwrap();
        let first_instance = result.iter().find(|i| i.task_id == "first").unwrap();
        assert!(second_instance.start >= first_instance.finish);
    }

    #[test]
    fn cycle_is_rejected() {
        let a = TaskPattern::builder().id("a").depends_on_ids(vec!["b".to_string()]).build();
        let b = TaskPattern::builder().id("b").depends_on_ids(vec!["a".to_string()]).build();
        let scheduler = Scheduler::new(vec![a, b]);
        let from = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 0).unwrap();
        assert!(matches!(scheduler.build(from, to), Err(CoreError::Cycle(_))));
    }

    #[test]
    fn fixed_conflict_defers_a_movable_task() {
        let fixed = TaskPattern::builder()
            .id("fixed")
            .due(vec![daily_at(9)])
            .duration(TimeDelta::hours(2))
            .fixed(true)
            .priority(0)
            .build();
        let movable = TaskPattern::builder()
            .id("movable")
            .due(vec![daily_at(9)])
            .duration(TimeDelta::hours(1))
            .priority(0)
            .build();
        let scheduler = Scheduler::new(vec![fixed, movable]);
        let from = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 0).unwrap();
        let result = scheduler.build(from, to).unwrap();
        let fixed_instance = result.iter().find(|i| i.task_id == "fixed").unwrap();
        let movable_instance = result.iter().find(|i| i.task_id == "movable").unwrap();
        assert!(movable_instance.start >= fixed_instance.finish);
    }

    #[test]
    fn parallel_quota_of_one_serializes_same_flagged_tasks() {
        let a = TaskPattern::builder().id("a").due(vec![daily_at(9)]).duration(TimeDelta::hours(1)).flags(HashSet::from(["shared".to_string()])).build();
        let b = TaskPattern::builder().id("b").due(vec![daily_at(9)]).duration(TimeDelta::hours(1)).flags(HashSet::from(["shared".to_string()])).build();
        let scheduler = Scheduler::new(vec![a, b]);
        let from = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 0).unwrap();
        let result = scheduler.build(from, to).unwrap();
        assert_eq!(result.len(), 2);
        assert!(!result[0].overlaps(result[1].start, result[1].finish));
    }
}
