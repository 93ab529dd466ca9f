//! Task mutations expressed as patches.
//!
//! None of these functions write anything. Each returns a [`ProgressPatch`]
//! describing the writes, which the caller hands to a
//! [`ProgressStore`] via [`apply_patch`].
//!
//! Completing a task fails its alternatives, unless an alternative is
//! already complete in its own right. Decisions inside one patch see the
//! writes queued earlier in the same patch.

use std::collections::HashSet;

use crate::error::EngineError;
use crate::model::{Task, TaskLookup};
use crate::progress::{
    CompletionFlags, CompletionRecord, ObjectiveProgress, ProgressPatch, ProgressSnapshot,
    ProgressStore, ProgressUpdate,
};
use crate::requirements::RequirementCondition;

/// Mark `task` complete, complete its objectives and fail its alternatives.
pub fn complete_task(
    task: &Task,
    lookup: &TaskLookup<'_>,
    progress: &ProgressSnapshot,
    now: i64,
) -> ProgressPatch {
    let mut builder = PatchBuilder::new(progress, now);
    builder.complete(task, lookup);
    builder.finish()
}

/// Reset `task` and its objectives. Alternatives stay failed.
pub fn uncomplete_task(task: &Task) -> ProgressPatch {
    let mut patch = ProgressPatch::new();
    patch.push(ProgressUpdate::Task {
        id: task.id.clone(),
        record: CompletionRecord::default(),
    });
    for objective in &task.objectives {
        patch.push(ProgressUpdate::Objective {
            id: objective.id.clone(),
            progress: ObjectiveProgress::default(),
        });
    }
    patch
}

/// Mark `task` failed by hand and clear its objectives.
pub fn fail_task(task: &Task, now: i64) -> ProgressPatch {
    let mut patch = ProgressPatch::new();
    push_failure(&mut patch, &task.id, Some(task), true, now);
    patch
}

/// Resolve whatever `task` depends on so that it becomes reachable.
///
/// Failed-only requirements fail their target; every other requirement,
/// and every predecessor not named by a requirement, completes its target
/// (with the usual objective and alternative cascade).
pub fn satisfy_requirements(
    task: &Task,
    lookup: &TaskLookup<'_>,
    progress: &ProgressSnapshot,
    now: i64,
) -> ProgressPatch {
    let mut builder = PatchBuilder::new(progress, now);
    let mut covered: HashSet<&str> = HashSet::new();

    for req in &task.task_requirements {
        covered.insert(req.task.as_str());
        let flags = builder.flags(&req.task);
        match req.condition() {
            RequirementCondition::FailedOnly => {
                if !flags.failed {
                    builder.fail(&req.task, lookup);
                }
            }
            RequirementCondition::Resolved => {
                if !flags.failed && !flags.complete {
                    builder.complete_id(&req.task, lookup);
                }
            }
            RequirementCondition::Completed => {
                if !flags.is_completed() {
                    builder.complete_id(&req.task, lookup);
                }
            }
        }
    }
    for pred in &task.predecessors {
        if covered.contains(pred.as_str()) {
            continue;
        }
        if !builder.flags(pred).is_completed() {
            builder.complete_id(pred, lookup);
        }
    }
    builder.finish()
}

/// Hand a patch to the store. A store failure means nothing was applied.
pub fn apply_patch<S: ProgressStore + ?Sized>(
    store: &mut S,
    patch: &ProgressPatch,
) -> Result<(), EngineError> {
    if patch.is_empty() {
        return Ok(());
    }
    store.apply(patch)?;
    log::debug!("applied progress patch with {} updates", patch.len());
    Ok(())
}

/// Accumulates a patch while answering "what is this task's state after
/// the writes queued so far?".
struct PatchBuilder<'a> {
    progress: &'a ProgressSnapshot,
    patch: ProgressPatch,
    now: i64,
}

impl<'a> PatchBuilder<'a> {
    fn new(progress: &'a ProgressSnapshot, now: i64) -> Self {
        Self {
            progress,
            patch: ProgressPatch::new(),
            now,
        }
    }

    fn flags(&self, task_id: &str) -> CompletionFlags {
        self.patch
            .task_record(task_id)
            .map(CompletionFlags::from)
            .unwrap_or_else(|| self.progress.task_flags(task_id))
    }

    fn complete_id(&mut self, task_id: &str, lookup: &TaskLookup<'_>) {
        match lookup.get(task_id) {
            Some(task) => self.complete(task, lookup),
            None => {
                log::warn!("completing unknown task {} without cascade", task_id);
                self.patch.push(ProgressUpdate::Task {
                    id: task_id.to_string(),
                    record: self.completed_record(),
                });
            }
        }
    }

    fn complete(&mut self, task: &Task, lookup: &TaskLookup<'_>) {
        self.patch.push(ProgressUpdate::Task {
            id: task.id.clone(),
            record: self.completed_record(),
        });
        for objective in &task.objectives {
            let count = if objective.count > 0 {
                objective.count
            } else {
                self.progress.objective(&objective.id).count
            };
            self.patch.push(ProgressUpdate::Objective {
                id: objective.id.clone(),
                progress: ObjectiveProgress {
                    complete: true,
                    count,
                    timestamp: Some(self.now),
                },
            });
        }
        for alternative in &task.alternatives {
            if *alternative == task.id || self.flags(alternative).is_completed() {
                continue;
            }
            self.fail(alternative, lookup);
        }
    }

    /// Fail a task as a consequence of another action (not by hand).
    fn fail(&mut self, task_id: &str, lookup: &TaskLookup<'_>) {
        let task = lookup.get(task_id).copied();
        push_failure(&mut self.patch, task_id, task, false, self.now);
    }

    fn completed_record(&self) -> CompletionRecord {
        CompletionRecord {
            complete: true,
            failed: false,
            manual: false,
            timestamp: Some(self.now),
        }
    }

    fn finish(self) -> ProgressPatch {
        self.patch
    }
}

fn push_failure(
    patch: &mut ProgressPatch,
    task_id: &str,
    task: Option<&Task>,
    manual: bool,
    now: i64,
) {
    patch.push(ProgressUpdate::Task {
        id: task_id.to_string(),
        record: CompletionRecord {
            complete: false,
            failed: true,
            manual,
            timestamp: Some(now),
        },
    });
    for objective in task.map(|t| t.objectives.as_slice()).unwrap_or_default() {
        patch.push(ProgressUpdate::Objective {
            id: objective.id.clone(),
            progress: ObjectiveProgress::default(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::model::{index_tasks, TaskObjective, TaskRequirement};
    use crate::progress::{MemoryStore, TaskCompletion};
    use crate::requirements::RequirementPolicy;
    use crate::resolver::{derive_task_state, TaskState};

    const NOW: i64 = 1_700_000_000_000;

    fn task(id: &str, count: u32) -> Task {
        Task {
            id: id.into(),
            objectives: vec![TaskObjective {
                id: format!("{}-obj", id),
                task_id: id.into(),
                count,
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    /// a and b are mutually exclusive branches.
    fn branching() -> Vec<Task> {
        let mut a = task("a", 4);
        a.alternatives = vec!["b".into()];
        let mut b = task("b", 2);
        b.alternatives = vec!["a".into()];
        vec![a, b]
    }

    fn applied(progress: &ProgressSnapshot, patch: &ProgressPatch) -> ProgressSnapshot {
        let mut next = progress.clone();
        next.apply_patch(patch);
        next
    }

    #[test]
    fn test_complete_stamps_objectives() {
        let tasks = branching();
        let lookup = index_tasks(&tasks);
        let p = ProgressSnapshot::default();
        let next = applied(&p, &complete_task(&tasks[0], &lookup, &p, NOW));
        assert!(next.task_flags("a").is_completed());
        assert_eq!(next.task_flags("a").timestamp, Some(NOW));
        let obj = next.objective("a-obj");
        assert!(obj.complete);
        assert_eq!(obj.count, 4);
    }

    #[test]
    fn test_complete_keeps_count_for_uncounted_objective() {
        let t = task("a", 0);
        let tasks = vec![t];
        let lookup = index_tasks(&tasks);
        let mut p = ProgressSnapshot::default();
        p.objectives.insert(
            "a-obj".into(),
            ObjectiveProgress {
                complete: false,
                count: 7,
                timestamp: None,
            },
        );
        let next = applied(&p, &complete_task(&tasks[0], &lookup, &p, NOW));
        assert_eq!(next.objective("a-obj").count, 7);
        assert!(next.objective("a-obj").complete);
    }

    #[test]
    fn test_complete_fails_alternative() {
        let tasks = branching();
        let lookup = index_tasks(&tasks);
        let mut p = ProgressSnapshot::default();
        p.objectives.insert(
            "b-obj".into(),
            ObjectiveProgress {
                complete: false,
                count: 1,
                timestamp: None,
            },
        );
        let next = applied(&p, &complete_task(&tasks[0], &lookup, &p, NOW));
        let policy = RequirementPolicy::default();
        assert_eq!(derive_task_state(&tasks[1], &next, &policy), TaskState::Failed);
        assert!(!next.task_flags("b").manual);
        assert_eq!(next.objective("b-obj"), ObjectiveProgress::default());
    }

    #[test]
    fn test_complete_leaves_finished_alternative() {
        let tasks = branching();
        let lookup = index_tasks(&tasks);
        let mut p = ProgressSnapshot::default();
        p.tasks.insert("b".into(), TaskCompletion::Legacy(true));
        let patch = complete_task(&tasks[0], &lookup, &p, NOW);
        assert!(patch.task_record("b").is_none());
        let next = applied(&p, &patch);
        assert_eq!(
            derive_task_state(&tasks[1], &next, &RequirementPolicy::default()),
            TaskState::Completed
        );
    }

    #[test]
    fn test_uncomplete_does_not_resurrect_alternative() {
        let tasks = branching();
        let lookup = index_tasks(&tasks);
        let p = ProgressSnapshot::default();
        let done = applied(&p, &complete_task(&tasks[0], &lookup, &p, NOW));
        let undone = applied(&done, &uncomplete_task(&tasks[0]));
        assert!(!undone.task_flags("a").complete);
        assert_eq!(undone.objective("a-obj"), ObjectiveProgress::default());
        assert!(undone.task_flags("b").failed);
    }

    #[test]
    fn test_fail_task_is_manual() {
        let t = task("a", 2);
        let mut p = ProgressSnapshot::default();
        p.objectives.insert(
            "a-obj".into(),
            ObjectiveProgress {
                complete: true,
                count: 2,
                timestamp: Some(1),
            },
        );
        let next = applied(&p, &fail_task(&t, NOW));
        let flags = next.task_flags("a");
        assert!(flags.failed && flags.manual && !flags.complete);
        assert_eq!(next.objective("a-obj").count, 0);
        assert!(!next.objective("a-obj").complete);
    }

    #[test]
    fn test_satisfy_requirements_makes_task_available() {
        let root = task("root", 1);
        let mut mid = task("mid", 1);
        mid.predecessors = vec!["root".into()];
        let mut branch = task("branch", 1);
        branch.alternatives = vec!["other".into()];
        let other = task("other", 1);
        let mut target = task("target", 1);
        target.predecessors = vec!["mid".into(), "other".into()];
        target.task_requirements = vec![TaskRequirement {
            task: "other".into(),
            status: vec!["failed".into()],
        }];
        let tasks = vec![root, mid, branch, other, target];
        let lookup = index_tasks(&tasks);
        let p = ProgressSnapshot::default();

        let patch = satisfy_requirements(&tasks[4], &lookup, &p, NOW);
        let next = applied(&p, &patch);
        assert!(next.task_flags("other").failed);
        assert!(next.task_flags("mid").is_completed());
        // Predecessors of predecessors are not touched.
        assert!(!next.task_flags("root").complete);
        assert_eq!(
            derive_task_state(&tasks[4], &next, &RequirementPolicy::default()),
            TaskState::Available
        );
    }

    #[test]
    fn test_satisfy_requirements_sees_queued_writes() {
        // Completing "x" fails "y"; a later requirement asks for "y" complete.
        let mut x = task("x", 1);
        x.alternatives = vec!["y".into()];
        let y = task("y", 1);
        let mut target = task("t", 1);
        target.task_requirements = vec![
            TaskRequirement {
                task: "x".into(),
                status: vec!["complete".into()],
            },
            TaskRequirement {
                task: "y".into(),
                status: vec!["complete".into()],
            },
        ];
        let tasks = vec![x, y, target];
        let lookup = index_tasks(&tasks);
        let p = ProgressSnapshot::default();
        let next = applied(&p, &satisfy_requirements(&tasks[2], &lookup, &p, NOW));
        assert!(next.task_flags("y").is_completed());
        assert!(next.task_flags("x").is_completed());
    }

    #[test]
    fn test_satisfy_requirements_skips_already_satisfied() {
        let mut target = task("t", 1);
        target.predecessors = vec!["done".into()];
        let tasks = vec![task("done", 1), target];
        let lookup = index_tasks(&tasks);
        let mut p = ProgressSnapshot::default();
        p.tasks.insert("done".into(), TaskCompletion::Legacy(true));
        assert!(satisfy_requirements(&tasks[1], &lookup, &p, NOW).is_empty());
    }

    struct OfflineStore(ProgressSnapshot);

    impl ProgressStore for OfflineStore {
        fn snapshot(&self) -> &ProgressSnapshot {
            &self.0
        }

        fn apply(&mut self, _patch: &ProgressPatch) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("offline".into()))
        }
    }

    #[test]
    fn test_apply_patch_propagates_store_failure() {
        let t = task("a", 1);
        let mut store = OfflineStore(ProgressSnapshot::default());
        let result = apply_patch(&mut store, &fail_task(&t, NOW));
        assert!(matches!(result, Err(EngineError::ProgressUpdateFailed(_))));
    }

    #[test]
    fn test_apply_patch_to_memory_store() {
        let tasks = branching();
        let lookup = index_tasks(&tasks);
        let mut store = MemoryStore::default();
        let patch = complete_task(&tasks[0], &lookup, store.snapshot(), NOW);
        apply_patch(&mut store, &patch).unwrap();
        assert!(store.snapshot().task_flags("a").is_completed());
        assert!(store.snapshot().task_flags("b").failed);
    }
}
