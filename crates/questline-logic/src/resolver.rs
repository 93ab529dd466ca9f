//! Task and hideout-module availability derivation.
//!
//! State is never stored. Every query re-derives it from the completion
//! flags in a [`ProgressSnapshot`] plus the requirement records:
//!
//! 1. failed → [`TaskState::Failed`]
//! 2. complete → [`TaskState::Completed`]
//! 3. every task requirement and every uncovered predecessor satisfied →
//!    [`TaskState::Active`] if any objective has progress, otherwise
//!    [`TaskState::Available`]
//! 4. otherwise [`TaskState::Locked`]

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{HideoutStation, StationLevel, Task, TaskId};
use crate::progress::ProgressSnapshot;
use crate::requirements::{
    level_prerequisites_met, task_requirement_met, RequirementPolicy, StationLevels,
};

/// Derived task state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Locked,
    Available,
    Active,
    Completed,
    Failed,
}

impl TaskState {
    /// Completed or failed: no further progress possible.
    pub fn is_resolved(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }

    /// Available or active: the player can work on it now.
    pub fn is_open(self) -> bool {
        matches!(self, TaskState::Available | TaskState::Active)
    }
}

/// Whether every requirement gating `task` is satisfied.
pub fn requirements_met(
    task: &Task,
    progress: &ProgressSnapshot,
    policy: &RequirementPolicy,
) -> bool {
    if policy.require_player_level && progress.player_level < task.min_player_level {
        return false;
    }
    task.task_requirements
        .iter()
        .all(|req| task_requirement_met(req, progress))
        && task
            .uncovered_predecessors()
            .all(|pred| progress.task_flags(pred).is_completed())
}

/// Any objective of `task` has a recorded count or completion.
pub fn has_objective_progress(task: &Task, progress: &ProgressSnapshot) -> bool {
    task.objectives
        .iter()
        .any(|o| progress.objective(&o.id).has_progress())
}

pub fn derive_task_state(
    task: &Task,
    progress: &ProgressSnapshot,
    policy: &RequirementPolicy,
) -> TaskState {
    let flags = progress.task_flags(&task.id);
    if flags.failed {
        return TaskState::Failed;
    }
    if flags.complete {
        return TaskState::Completed;
    }
    if !requirements_met(task, progress, policy) {
        return TaskState::Locked;
    }
    if has_objective_progress(task, progress) {
        TaskState::Active
    } else {
        TaskState::Available
    }
}

pub fn derive_task_states(
    tasks: &[Task],
    progress: &ProgressSnapshot,
    policy: &RequirementPolicy,
) -> HashMap<TaskId, TaskState> {
    tasks
        .iter()
        .map(|t| (t.id.clone(), derive_task_state(t, progress, policy)))
        .collect()
}

/// Tally of derived task states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCounts {
    pub locked: u32,
    pub available: u32,
    pub active: u32,
    pub completed: u32,
    pub failed: u32,
}

impl StateCounts {
    pub fn from_states<'a>(states: impl IntoIterator<Item = &'a TaskState>) -> Self {
        let mut counts = Self::default();
        for state in states {
            match state {
                TaskState::Locked => counts.locked += 1,
                TaskState::Available => counts.available += 1,
                TaskState::Active => counts.active += 1,
                TaskState::Completed => counts.completed += 1,
                TaskState::Failed => counts.failed += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> u32 {
        self.locked + self.available + self.active + self.completed + self.failed
    }
}

// ── Hideout ────────────────────────────────────────────────────────────

/// Derived state of one station level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleState {
    Locked,
    Available,
    Active,
    Completed,
}

pub fn derive_module_state(
    station: &HideoutStation,
    level: &StationLevel,
    progress: &ProgressSnapshot,
    station_levels: &StationLevels,
    policy: &RequirementPolicy,
) -> ModuleState {
    if progress.module_complete(&level.id) {
        return ModuleState::Completed;
    }
    let previous_built = station
        .previous_level(level.level)
        .map_or(true, |prev| progress.module_complete(&prev.id));
    if !previous_built || !level_prerequisites_met(level, progress, station_levels, policy) {
        return ModuleState::Locked;
    }
    let started = level
        .item_requirements
        .iter()
        .any(|r| progress.part(&r.id).has_progress());
    if started {
        ModuleState::Active
    } else {
        ModuleState::Available
    }
}

/// State of every level of every station, keyed by module id.
pub fn derive_station_states(
    stations: &[HideoutStation],
    progress: &ProgressSnapshot,
    policy: &RequirementPolicy,
) -> HashMap<String, ModuleState> {
    let station_levels = StationLevels::from_progress(stations, progress);
    stations
        .iter()
        .flat_map(|station| {
            let station_levels = &station_levels;
            station.levels.iter().map(move |level| {
                (
                    level.id.clone(),
                    derive_module_state(station, level, progress, station_levels, policy),
                )
            })
        })
        .collect()
}
