//! Kappa critical path and pace projection.
//!
//! Two independent estimates of how far a player is from finishing a goal:
//!
//! - the **critical path floor**, a lower bound on sequential completions
//!   still required (longest chain of incomplete predecessors, plus any
//!   player-level gap at the end of that chain);
//! - a **pace projection** from recent completion timestamps, with a
//!   confidence grade and dampening for short observation windows.
//!
//! ```
//! use questline_logic::kappa::{compute_confidence, dampen_pace, Confidence};
//!
//! assert_eq!(compute_confidence(15, 7.0), Some(Confidence::High));
//! assert!((dampen_pace(30.0, 1.0) - 10.0).abs() < 1e-9);
//! ```

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::invalidation::{goal_metrics, Goal};
use crate::model::{index_tasks, Task, TaskId, TaskLookup};
use crate::progress::{ProgressSnapshot, DAY_MS};

/// Sample windows shorter than this many days are dampened.
pub const FULL_CONFIDENCE_DAYS: f64 = 3.0;

/// Result of [`compute_critical_path_floor`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticalPath {
    pub floor: u32,
    /// The remaining task at the end of the longest chain.
    pub longest_chain_task_id: Option<TaskId>,
}

/// Minimum number of sequential completions still required.
///
/// Each remaining task contributes 1 plus the length of its longest chain
/// of `predecessors` that are not in `completed`. Task requirements are not
/// chain steps. Ties keep the first task encountered. When the end task's
/// `min_player_level` exceeds `player_level`, the gap is added. Cyclic
/// predecessor data yields a finite floor of at least 1.
pub fn compute_critical_path_floor(
    remaining: &[&Task],
    all_by_id: &TaskLookup<'_>,
    completed: &HashSet<TaskId>,
    player_level: u32,
) -> CriticalPath {
    let mut memo: HashMap<&str, u32> = HashMap::new();
    let mut best: Option<(&Task, u32)> = None;

    for &task in remaining {
        let length = chain_length(task, all_by_id, completed, &mut memo);
        if best.map_or(true, |(_, len)| length > len) {
            best = Some((task, length));
        }
    }

    let Some((end, length)) = best else {
        return CriticalPath::default();
    };
    let level_gap = end.min_player_level.saturating_sub(player_level);
    CriticalPath {
        floor: length.max(1) + level_gap,
        longest_chain_task_id: Some(end.id.clone()),
    }
}

/// Longest incomplete chain ending at `start`, counting `start` itself.
///
/// Post-order walk with an explicit stack. A parent still on the current
/// path (a cycle) contributes nothing.
fn chain_length<'a>(
    start: &'a Task,
    all_by_id: &TaskLookup<'a>,
    completed: &HashSet<TaskId>,
    memo: &mut HashMap<&'a str, u32>,
) -> u32 {
    let incomplete_parents = |task: &'a Task| {
        task.predecessors
            .iter()
            .map(String::as_str)
            .filter(|p| !completed.contains(*p))
            .filter_map(|p| all_by_id.get(p).copied())
            .collect::<Vec<&'a Task>>()
    };

    let mut on_path: HashSet<&str> = HashSet::new();
    let mut stack: Vec<(&'a Task, bool)> = vec![(start, false)];
    while let Some((task, expanded)) = stack.pop() {
        let id = task.id.as_str();
        if memo.contains_key(id) {
            continue;
        }
        if expanded {
            let longest_parent = incomplete_parents(task)
                .iter()
                .filter_map(|p| memo.get(p.id.as_str()))
                .max()
                .copied()
                .unwrap_or(0);
            memo.insert(id, longest_parent + 1);
            on_path.remove(id);
            continue;
        }
        if !on_path.insert(id) {
            continue;
        }
        stack.push((task, true));
        for parent in incomplete_parents(task) {
            let pid = parent.id.as_str();
            if !memo.contains_key(pid) && !on_path.contains(pid) {
                stack.push((parent, false));
            }
        }
    }
    memo.get(start.id.as_str()).copied().unwrap_or(1)
}

/// How far a pace projection can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// Grade a sample. Fewer than 3 completions is too little to project.
pub fn compute_confidence(sample_count: u32, sample_days: f64) -> Option<Confidence> {
    if sample_count < 3 {
        None
    } else if sample_count >= 15 && sample_days >= 7.0 {
        Some(Confidence::High)
    } else if sample_count >= 7 && sample_days >= 3.0 {
        Some(Confidence::Medium)
    } else {
        Some(Confidence::Low)
    }
}

/// Scale down pace measured over fewer than [`FULL_CONFIDENCE_DAYS`] days.
pub fn dampen_pace(raw_pace: f64, sample_days: f64) -> f64 {
    if sample_days >= FULL_CONFIDENCE_DAYS {
        raw_pace
    } else {
        raw_pace * (sample_days.max(0.0) / FULL_CONFIDENCE_DAYS)
    }
}

/// Completions observed in a trailing window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PaceSample {
    pub count: u32,
    /// Span from the earliest sampled completion to `now`, at least one
    /// day when anything was sampled.
    pub days: f64,
}

impl PaceSample {
    /// Sample completion timestamps that fall in `(now - window, now]`.
    pub fn from_completions(
        timestamps: impl IntoIterator<Item = i64>,
        now: i64,
        window_days: u32,
    ) -> Self {
        let cutoff = now - i64::from(window_days) * DAY_MS;
        let mut count = 0u32;
        let mut earliest: Option<i64> = None;
        for ts in timestamps {
            if ts > cutoff && ts <= now {
                count += 1;
                earliest = Some(earliest.map_or(ts, |e| e.min(ts)));
            }
        }
        let days = match earliest {
            Some(first) => ((now - first) as f64 / DAY_MS as f64).max(1.0),
            None => 0.0,
        };
        Self { count, days }
    }

    /// Completions per day before dampening.
    pub fn raw_pace(&self) -> f64 {
        if self.days <= 0.0 {
            0.0
        } else {
            self.count as f64 / self.days
        }
    }
}

/// Forecast for a goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalProjection {
    pub remaining: u32,
    pub critical_path: CriticalPath,
    pub confidence: Option<Confidence>,
    /// Dampened completions per day.
    pub pace_per_day: f64,
    /// `None` when there is not enough data or no pace at all.
    pub estimated_days: Option<f64>,
}

pub fn project_goal(
    remaining: u32,
    critical_path: CriticalPath,
    sample: &PaceSample,
) -> GoalProjection {
    let confidence = compute_confidence(sample.count, sample.days);
    let pace_per_day = dampen_pace(sample.raw_pace(), sample.days);
    let estimated_days = if remaining == 0 {
        Some(0.0)
    } else if confidence.is_some() && pace_per_day > 0.0 {
        Some(remaining as f64 / pace_per_day)
    } else {
        None
    };
    GoalProjection {
        remaining,
        critical_path,
        confidence,
        pace_per_day,
        estimated_days,
    }
}

/// Full kappa forecast from raw tasks and a progress snapshot.
///
/// Uses the snapshot's faction and player level, and samples the
/// completion timestamps of valid kappa tasks.
pub fn project_kappa(
    tasks: &[Task],
    progress: &ProgressSnapshot,
    window_days: u32,
    now: i64,
) -> GoalProjection {
    let lookup = index_tasks(tasks);
    let metrics = goal_metrics(Goal::Kappa, progress.faction, progress, tasks);

    let completed: HashSet<TaskId> = tasks
        .iter()
        .filter(|t| progress.task_flags(&t.id).is_completed())
        .map(|t| t.id.clone())
        .collect();
    let remaining: Vec<&Task> = metrics
        .remaining
        .iter()
        .filter_map(|id| lookup.get(id.as_str()).copied())
        .collect();
    let path = compute_critical_path_floor(&remaining, &lookup, &completed, progress.player_level);

    let timestamps = tasks
        .iter()
        .filter(|t| t.kappa_required)
        .map(|t| progress.task_flags(&t.id))
        .filter(|f| f.is_completed())
        .filter_map(|f| f.timestamp);
    let sample = PaceSample::from_completions(timestamps, now, window_days);

    project_goal(metrics.remaining.len() as u32, path, &sample)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TaskRequirement;
    use crate::progress::{CompletionRecord, TaskCompletion};

    fn task(id: &str, preds: &[&str]) -> Task {
        Task {
            id: id.into(),
            predecessors: preds.iter().map(|p| p.to_string()).collect(),
            kappa_required: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_floor_empty() {
        let tasks: Vec<Task> = vec![task("a", &[])];
        let lookup = index_tasks(&tasks);
        let path = compute_critical_path_floor(&[], &lookup, &HashSet::new(), 10);
        assert_eq!(path.floor, 0);
        assert_eq!(path.longest_chain_task_id, None);
    }

    #[test]
    fn test_floor_linear_chain() {
        let tasks = vec![task("a", &[]), task("b", &["a"]), task("c", &["b"])];
        let lookup = index_tasks(&tasks);
        let remaining: Vec<&Task> = tasks.iter().collect();
        let path = compute_critical_path_floor(&remaining, &lookup, &HashSet::new(), 1);
        assert_eq!(path.floor, 3);
        assert_eq!(path.longest_chain_task_id.as_deref(), Some("c"));
    }

    #[test]
    fn test_floor_skips_completed_predecessors() {
        let tasks = vec![task("a", &[]), task("b", &["a"]), task("c", &["b"])];
        let lookup = index_tasks(&tasks);
        let remaining: Vec<&Task> = vec![&tasks[2]];
        let completed = HashSet::from(["a".to_string()]);
        let path = compute_critical_path_floor(&remaining, &lookup, &completed, 1);
        assert_eq!(path.floor, 2);
    }

    #[test]
    fn test_floor_single_task_counts_itself() {
        let tasks = vec![task("solo", &[])];
        let lookup = index_tasks(&tasks);
        let path = compute_critical_path_floor(&[&tasks[0]], &lookup, &HashSet::new(), 1);
        assert_eq!(path.floor, 1);
    }

    #[test]
    fn test_floor_adds_level_gap() {
        let mut c = task("c", &["b"]);
        c.min_player_level = 15;
        let tasks = vec![task("a", &[]), task("b", &["a"]), c];
        let lookup = index_tasks(&tasks);
        let remaining: Vec<&Task> = tasks.iter().collect();
        let path = compute_critical_path_floor(&remaining, &lookup, &HashSet::new(), 10);
        assert_eq!(path.floor, 3 + 5);
        let path = compute_critical_path_floor(&remaining, &lookup, &HashSet::new(), 20);
        assert_eq!(path.floor, 3);
    }

    #[test]
    fn test_floor_tie_keeps_first() {
        let tasks = vec![task("x", &[]), task("y", &[])];
        let lookup = index_tasks(&tasks);
        let remaining: Vec<&Task> = tasks.iter().collect();
        let path = compute_critical_path_floor(&remaining, &lookup, &HashSet::new(), 1);
        assert_eq!(path.longest_chain_task_id.as_deref(), Some("x"));
    }

    #[test]
    fn test_floor_diamond() {
        // a → b → d, a → c → d, plus e → c
        let tasks = vec![
            task("a", &[]),
            task("b", &["a"]),
            task("e", &[]),
            task("c", &["a", "e"]),
            task("d", &["b", "c"]),
        ];
        let lookup = index_tasks(&tasks);
        let path = compute_critical_path_floor(&[&tasks[4]], &lookup, &HashSet::new(), 1);
        assert_eq!(path.floor, 3);
    }

    #[test]
    fn test_floor_cycle_is_finite() {
        let tasks = vec![task("a", &["c"]), task("b", &["a"]), task("c", &["b"])];
        let lookup = index_tasks(&tasks);
        let remaining: Vec<&Task> = tasks.iter().collect();
        let path = compute_critical_path_floor(&remaining, &lookup, &HashSet::new(), 1);
        assert!(path.floor >= 1);
        assert!(path.floor <= 3);
    }

    #[test]
    fn test_failed_only_requirement_is_not_a_chain_step() {
        let mut x = task("x", &[]);
        x.kappa_required = false;
        let mut c = task("c", &[]);
        c.task_requirements.push(TaskRequirement {
            task: "x".into(),
            status: vec!["failed".into()],
        });
        let tasks = vec![x, c];
        let lookup = index_tasks(&tasks);
        let path = compute_critical_path_floor(&[&tasks[1]], &lookup, &HashSet::new(), 0);
        assert_eq!(path.floor, 1);

        let mut p = ProgressSnapshot::default();
        p.tasks.insert(
            "x".into(),
            TaskCompletion::Record(CompletionRecord {
                failed: true,
                ..Default::default()
            }),
        );
        let projection = project_kappa(&tasks, &p, 30, 10 * DAY_MS);
        assert_eq!(projection.remaining, 1);
        assert_eq!(projection.critical_path.floor, 1);
        assert_eq!(projection.critical_path.longest_chain_task_id.as_deref(), Some("c"));
    }

    #[test]
    fn test_confidence_grades() {
        assert_eq!(compute_confidence(2, 10.0), None);
        assert_eq!(compute_confidence(37, 1.0), Some(Confidence::Low));
        assert_eq!(compute_confidence(7, 3.0), Some(Confidence::Medium));
        assert_eq!(compute_confidence(15, 7.0), Some(Confidence::High));
        assert_eq!(compute_confidence(15, 6.0), Some(Confidence::Medium));
        assert_eq!(compute_confidence(6, 30.0), Some(Confidence::Low));
        assert_eq!(compute_confidence(3, 0.0), Some(Confidence::Low));
    }

    #[test]
    fn test_dampen_pace() {
        assert!((dampen_pace(30.0, 1.0) - 10.0).abs() < 1e-9);
        assert!((dampen_pace(30.0, 2.0) - 20.0).abs() < 1e-9);
        assert_eq!(dampen_pace(5.0, 3.0), 5.0);
        assert_eq!(dampen_pace(5.0, 12.0), 5.0);
        assert_eq!(dampen_pace(0.0, 1.0), 0.0);
        assert_eq!(dampen_pace(9.0, -2.0), 0.0);
    }

    #[test]
    fn test_pace_sample_window() {
        let now = 100 * DAY_MS;
        let stamps = vec![
            now - 40 * DAY_MS, // outside 30-day window
            now - 10 * DAY_MS,
            now - 5 * DAY_MS,
            now - DAY_MS / 2,
            now + DAY_MS, // future, ignored
        ];
        let sample = PaceSample::from_completions(stamps, now, 30);
        assert_eq!(sample.count, 3);
        assert!((sample.days - 10.0).abs() < 1e-9);
        assert!((sample.raw_pace() - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_pace_sample_short_span_is_one_day() {
        let now = 10 * DAY_MS;
        let sample = PaceSample::from_completions(vec![now - 1000, now - 10], now, 30);
        assert_eq!(sample.count, 2);
        assert_eq!(sample.days, 1.0);
        assert_eq!(PaceSample::from_completions(Vec::new(), now, 30).raw_pace(), 0.0);
    }

    #[test]
    fn test_project_goal() {
        let sample = PaceSample {
            count: 20,
            days: 10.0,
        };
        let projection = project_goal(10, CriticalPath::default(), &sample);
        assert_eq!(projection.confidence, Some(Confidence::High));
        assert!((projection.pace_per_day - 2.0).abs() < 1e-9);
        assert!((projection.estimated_days.unwrap() - 5.0).abs() < 1e-9);

        let thin = PaceSample { count: 2, days: 10.0 };
        assert_eq!(project_goal(10, CriticalPath::default(), &thin).estimated_days, None);
        assert_eq!(project_goal(0, CriticalPath::default(), &thin).estimated_days, Some(0.0));
    }

    #[test]
    fn test_project_kappa() {
        let now = 50 * DAY_MS;
        let mut tasks: Vec<Task> = (0..6)
            .map(|i| {
                let preds: Vec<String> = if i == 0 { vec![] } else { vec![format!("t{}", i - 1)] };
                Task {
                    id: format!("t{}", i),
                    predecessors: preds,
                    kappa_required: true,
                    ..Default::default()
                }
            })
            .collect();
        tasks[5].min_player_level = 30;
        let mut p = ProgressSnapshot::default();
        p.player_level = 20;
        for i in 0..3 {
            p.tasks.insert(
                format!("t{}", i),
                TaskCompletion::Record(CompletionRecord {
                    complete: true,
                    timestamp: Some(now - (i as i64 + 1) * DAY_MS * 2),
                    ..Default::default()
                }),
            );
        }
        let projection = project_kappa(&tasks, &p, 30, now);
        assert_eq!(projection.remaining, 3);
        // t3 → t4 → t5, plus a 10-level gap at t5.
        assert_eq!(projection.critical_path.floor, 13);
        assert_eq!(projection.critical_path.longest_chain_task_id.as_deref(), Some("t5"));
        assert_eq!(projection.confidence, Some(Confidence::Low));
        // 3 completions over 6 days.
        assert!((projection.pace_per_day - 0.5).abs() < 1e-9);
        assert!((projection.estimated_days.unwrap() - 6.0).abs() < 1e-9);
    }
}
