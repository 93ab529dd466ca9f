//! Completion records, the progress snapshot, and the patch/store boundary.
//!
//! The engine only ever *reads* a [`ProgressSnapshot`]. Every mutation is
//! expressed as a [`ProgressPatch`] and handed to a [`ProgressStore`], which
//! applies the whole batch or nothing.
//!
//! Task completion records come in two historical shapes (a bare boolean,
//! or an object with `complete`/`failed` flags). Both are modelled by
//! [`TaskCompletion`] and must be read through [`completion_flags`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::model::{Faction, TaskId};

/// Milliseconds in a day; timestamps are epoch milliseconds.
pub const DAY_MS: i64 = 86_400_000;

/// Object-shaped task completion record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionRecord {
    pub complete: bool,
    pub failed: bool,
    /// Set when the player failed the task by hand rather than through an
    /// alternative being completed.
    pub manual: bool,
    pub timestamp: Option<i64>,
}

/// A stored task completion, in either of its historical shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskCompletion {
    Legacy(bool),
    Record(CompletionRecord),
}

/// Normalized view of a task completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompletionFlags {
    pub complete: bool,
    pub failed: bool,
    pub manual: bool,
    pub timestamp: Option<i64>,
}

impl CompletionFlags {
    /// Complete and not failed.
    pub fn is_completed(&self) -> bool {
        self.complete && !self.failed
    }
}

impl From<CompletionRecord> for CompletionFlags {
    fn from(r: CompletionRecord) -> Self {
        CompletionFlags {
            complete: r.complete,
            failed: r.failed,
            manual: r.manual,
            timestamp: r.timestamp,
        }
    }
}

/// The single accessor every call site uses to read a task completion.
pub fn completion_flags(entry: Option<&TaskCompletion>) -> CompletionFlags {
    match entry {
        None => CompletionFlags::default(),
        Some(TaskCompletion::Legacy(complete)) => CompletionFlags {
            complete: *complete,
            ..Default::default()
        },
        Some(TaskCompletion::Record(record)) => CompletionFlags::from(*record),
    }
}

/// Progress on a countable requirement (task objective or hideout part).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectiveProgress {
    pub complete: bool,
    pub count: u32,
    pub timestamp: Option<i64>,
}

impl ObjectiveProgress {
    /// Any count or completion recorded.
    pub fn has_progress(&self) -> bool {
        self.complete || self.count > 0
    }
}

/// Completion of a hideout module (one station level).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleProgress {
    pub complete: bool,
    pub timestamp: Option<i64>,
}

/// Read-only snapshot of a player's progress for one game mode / profile.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProgressSnapshot {
    pub player_level: u32,
    pub faction: Faction,
    pub tasks: HashMap<TaskId, TaskCompletion>,
    pub objectives: HashMap<String, ObjectiveProgress>,
    pub hideout_modules: HashMap<String, ModuleProgress>,
    pub hideout_parts: HashMap<String, ObjectiveProgress>,
    /// Live skill levels reported by the game.
    pub skills: HashMap<String, f64>,
    /// Cached skill levels derived from earlier sessions.
    pub derived_skills: HashMap<String, f64>,
    pub traders: HashMap<String, u32>,
}

impl ProgressSnapshot {
    pub fn task_flags(&self, task_id: &str) -> CompletionFlags {
        completion_flags(self.tasks.get(task_id))
    }

    pub fn objective(&self, objective_id: &str) -> ObjectiveProgress {
        self.objectives
            .get(objective_id)
            .copied()
            .unwrap_or_default()
    }

    pub fn part(&self, part_id: &str) -> ObjectiveProgress {
        self.hideout_parts.get(part_id).copied().unwrap_or_default()
    }

    pub fn module_complete(&self, module_id: &str) -> bool {
        self.hideout_modules
            .get(module_id)
            .map_or(false, |m| m.complete)
    }

    /// Current skill level, preferring the live value over the cached one.
    pub fn skill_level(&self, name: &str) -> f64 {
        self.skills
            .get(name)
            .or_else(|| self.derived_skills.get(name))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn trader_level(&self, trader_id: &str) -> u32 {
        self.traders.get(trader_id).copied().unwrap_or(1)
    }

    /// Apply every update in order. Later updates to the same id win.
    pub fn apply_patch(&mut self, patch: &ProgressPatch) {
        for update in patch.updates() {
            match update {
                ProgressUpdate::Task { id, record } => {
                    self.tasks
                        .insert(id.clone(), TaskCompletion::Record(*record));
                }
                ProgressUpdate::Objective { id, progress } => {
                    self.objectives.insert(id.clone(), *progress);
                }
                ProgressUpdate::HideoutPart { id, progress } => {
                    self.hideout_parts.insert(id.clone(), *progress);
                }
                ProgressUpdate::HideoutModule { id, progress } => {
                    self.hideout_modules.insert(id.clone(), *progress);
                }
            }
        }
    }
}

/// A single proposed write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ProgressUpdate {
    Task { id: TaskId, record: CompletionRecord },
    Objective { id: String, progress: ObjectiveProgress },
    HideoutPart { id: String, progress: ObjectiveProgress },
    HideoutModule { id: String, progress: ModuleProgress },
}

impl ProgressUpdate {
    pub fn id(&self) -> &str {
        match self {
            ProgressUpdate::Task { id, .. }
            | ProgressUpdate::Objective { id, .. }
            | ProgressUpdate::HideoutPart { id, .. }
            | ProgressUpdate::HideoutModule { id, .. } => id,
        }
    }
}

/// An ordered batch of writes, applied atomically by a store.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProgressPatch {
    updates: Vec<ProgressUpdate>,
}

impl ProgressPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, update: ProgressUpdate) {
        self.updates.push(update);
    }

    pub fn updates(&self) -> &[ProgressUpdate] {
        &self.updates
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// The most recent task record queued for `task_id`.
    pub fn task_record(&self, task_id: &str) -> Option<CompletionRecord> {
        self.updates.iter().rev().find_map(|u| match u {
            ProgressUpdate::Task { id, record } if id == task_id => Some(*record),
            _ => None,
        })
    }
}

/// The external progress store. Implementations must apply a patch
/// atomically: on error, none of its updates may be visible.
pub trait ProgressStore {
    fn snapshot(&self) -> &ProgressSnapshot;
    fn apply(&mut self, patch: &ProgressPatch) -> Result<(), StoreError>;
}

/// In-memory store used by the harness and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    snapshot: ProgressSnapshot,
    /// Number of patches committed.
    revision: u64,
}

impl MemoryStore {
    pub fn new(snapshot: ProgressSnapshot) -> Self {
        Self {
            snapshot,
            revision: 0,
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn into_snapshot(self) -> ProgressSnapshot {
        self.snapshot
    }
}

impl ProgressStore for MemoryStore {
    fn snapshot(&self) -> &ProgressSnapshot {
        &self.snapshot
    }

    fn apply(&mut self, patch: &ProgressPatch) -> Result<(), StoreError> {
        if let Some(bad) = patch.updates().iter().find(|u| u.id().trim().is_empty()) {
            return Err(StoreError::Rejected(format!("update with empty id: {:?}", bad)));
        }
        // Validation is complete, so applying cannot fail halfway.
        self.snapshot.apply_patch(patch);
        self.revision += 1;
        Ok(())
    }
}
