//! Progress invalidation and goal metrics.
//!
//! Stored completions can contradict the branch a player is actually on:
//! a task for the other faction marked done, a task completed after its
//! prerequisite was failed through an alternative, and so on. This pass
//! flags such tasks so that aggregate counts can leave them out. It never
//! changes stored progress.
//!
//! Rules:
//! - a task whose faction does not admit the player's faction is invalid;
//! - a failed task is invalid (its branch is closed);
//! - a task that needs an invalid task completed (through a requirement that
//!   only a completion satisfies, or an uncovered predecessor) is invalid
//!   too, whether or not it is itself marked complete. Requirements that a
//!   failure also satisfies do not propagate.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::model::{Faction, Task, TaskId};
use crate::progress::ProgressSnapshot;
use crate::requirements::RequirementCondition;

/// Ids of tasks whose progress must be excluded from derived totals.
pub fn compute_invalid_progress(
    faction: Faction,
    progress: &ProgressSnapshot,
    tasks: &[Task],
) -> HashSet<TaskId> {
    // parent id → tasks that need the parent completed
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for task in tasks {
        for parent in completion_parents(task) {
            dependents.entry(parent).or_default().push(task.id.as_str());
        }
    }

    let mut invalid: HashSet<TaskId> = HashSet::new();
    let mut queue: Vec<&str> = Vec::new();
    for task in tasks {
        let wrong_faction = !task.faction_name.admits(faction);
        if wrong_faction || progress.task_flags(&task.id).failed {
            if invalid.insert(task.id.clone()) {
                queue.push(task.id.as_str());
            }
        }
    }

    while let Some(id) = queue.pop() {
        let Some(children) = dependents.get(id) else {
            continue;
        };
        for &child in children {
            if invalid.insert(child.to_string()) {
                queue.push(child);
            }
        }
    }
    log::debug!("{} of {} tasks flagged invalid", invalid.len(), tasks.len());
    invalid
}

/// Parents whose completion `task` depends on.
fn completion_parents(task: &Task) -> impl Iterator<Item = &str> {
    task.task_requirements
        .iter()
        .filter(|r| r.condition() == RequirementCondition::Completed)
        .map(|r| r.task.as_str())
        .chain(task.uncovered_predecessors())
}

/// Tasks the player's faction can take.
pub fn eligible_tasks(tasks: &[Task], faction: Faction) -> Vec<&Task> {
    tasks
        .iter()
        .filter(|t| t.faction_name.admits(faction))
        .collect()
}

/// A long-chain completion goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Goal {
    Kappa,
    Lightkeeper,
}

impl Goal {
    pub fn includes(self, task: &Task) -> bool {
        match self {
            Goal::Kappa => task.kappa_required,
            Goal::Lightkeeper => task.lightkeeper_required,
        }
    }
}

/// Trustworthy progress toward a goal: invalid tasks are excluded from both
/// `completed` and `total`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalMetrics {
    pub completed: u32,
    pub total: u32,
    /// Valid, not-yet-completed goal tasks in input order.
    pub remaining: Vec<TaskId>,
}

impl GoalMetrics {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

pub fn goal_metrics(
    goal: Goal,
    faction: Faction,
    progress: &ProgressSnapshot,
    tasks: &[Task],
) -> GoalMetrics {
    let invalid = compute_invalid_progress(faction, progress, tasks);
    let mut metrics = GoalMetrics::default();
    for task in tasks.iter().filter(|t| goal.includes(t)) {
        if invalid.contains(&task.id) {
            continue;
        }
        metrics.total += 1;
        if progress.task_flags(&task.id).is_completed() {
            metrics.completed += 1;
        } else {
            metrics.remaining.push(task.id.clone());
        }
    }
    metrics
}
