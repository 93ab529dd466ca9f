//! Item requirement distribution.
//!
//! When a player picks up items, [`distribute_items`] decides which
//! outstanding objectives receive them. Allocation is greedy and
//! deterministic:
//!
//! 1. task needs sorted kappa-first, then by ascending `min_player_level`
//! 2. hideout needs sorted by ascending station level
//! 3. each list split into found-in-raid (FIR) and non-FIR needs, order kept
//! 4. phases: task FIR ← FIR pool; task non-FIR ← non-FIR pool, then FIR
//!    overflow; hideout FIR ← FIR pool; hideout non-FIR ← non-FIR pool, then
//!    FIR overflow
//!
//! [`apply_distribution`] and [`reset_objectives`] turn the result into one
//! atomic patch each.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::model::{HideoutStation, Task};
use crate::progress::{
    ObjectiveProgress, ProgressPatch, ProgressSnapshot, ProgressStore, ProgressUpdate,
};
use crate::requirements::RequirementPolicy;
use crate::resolver::derive_task_state;

/// Which progress map an update targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NeedKind {
    TaskObjective,
    HideoutPart,
}

/// An outstanding task objective that wants items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskItemNeed {
    /// Objective id.
    pub id: String,
    pub task_id: String,
    pub count: u32,
    pub found_in_raid: bool,
    pub current_count: u32,
    pub kappa_required: bool,
    pub min_player_level: u32,
}

/// An outstanding hideout module part that wants items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HideoutItemNeed {
    /// Part id.
    pub id: String,
    pub station_id: String,
    pub station_level: u32,
    pub count: u32,
    pub found_in_raid: bool,
    pub current_count: u32,
}

/// Common view of both need shapes.
pub trait ItemNeed {
    const KIND: NeedKind;
    fn id(&self) -> &str;
    fn target(&self) -> u32;
    fn current(&self) -> u32;
    fn found_in_raid(&self) -> bool;

    fn shortfall(&self) -> u32 {
        self.target().saturating_sub(self.current())
    }
}

impl ItemNeed for TaskItemNeed {
    const KIND: NeedKind = NeedKind::TaskObjective;
    fn id(&self) -> &str {
        &self.id
    }
    fn target(&self) -> u32 {
        self.count
    }
    fn current(&self) -> u32 {
        self.current_count
    }
    fn found_in_raid(&self) -> bool {
        self.found_in_raid
    }
}

impl ItemNeed for HideoutItemNeed {
    const KIND: NeedKind = NeedKind::HideoutPart;
    fn id(&self) -> &str {
        &self.id
    }
    fn target(&self) -> u32 {
        self.count
    }
    fn current(&self) -> u32 {
        self.current_count
    }
    fn found_in_raid(&self) -> bool {
        self.found_in_raid
    }
}

/// One proposed count change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionUpdate {
    pub id: String,
    pub kind: NeedKind,
    pub new_count: u32,
    pub needed_total: u32,
}

impl DistributionUpdate {
    pub fn assigned(&self, previous: u32) -> u32 {
        self.new_count.saturating_sub(previous)
    }
}

/// Result of [`distribute_items`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Distribution {
    pub updates: Vec<DistributionUpdate>,
    pub remaining_fir: u32,
    pub remaining_non_fir: u32,
}

#[derive(Debug, Clone, Copy)]
struct Pools {
    fir: u32,
    non_fir: u32,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    /// FIR needs draw only from the FIR pool.
    FirOnly,
    /// Non-FIR needs draw from the non-FIR pool, then overflow into FIR.
    NonFirWithOverflow,
}

pub fn distribute_items(
    fir_count: u32,
    non_fir_count: u32,
    task_needs: &[TaskItemNeed],
    hideout_needs: &[HideoutItemNeed],
) -> Distribution {
    let mut tasks: Vec<&TaskItemNeed> = task_needs.iter().collect();
    tasks.sort_by_key(|n| (!n.kappa_required, n.min_player_level));
    let mut hideout: Vec<&HideoutItemNeed> = hideout_needs.iter().collect();
    hideout.sort_by_key(|n| n.station_level);

    let mut pools = Pools {
        fir: fir_count,
        non_fir: non_fir_count,
    };
    let mut updates = Vec::new();

    let (task_fir, task_plain): (Vec<_>, Vec<_>) =
        tasks.into_iter().partition(|n| n.found_in_raid);
    let (hideout_fir, hideout_plain): (Vec<_>, Vec<_>) =
        hideout.into_iter().partition(|n| n.found_in_raid);

    allocate(&task_fir, Phase::FirOnly, &mut pools, &mut updates);
    allocate(&task_plain, Phase::NonFirWithOverflow, &mut pools, &mut updates);
    allocate(&hideout_fir, Phase::FirOnly, &mut pools, &mut updates);
    allocate(&hideout_plain, Phase::NonFirWithOverflow, &mut pools, &mut updates);

    log::debug!(
        "distributed {} FIR / {} non-FIR into {} updates, {} / {} left",
        fir_count,
        non_fir_count,
        updates.len(),
        pools.fir,
        pools.non_fir
    );
    Distribution {
        updates,
        remaining_fir: pools.fir,
        remaining_non_fir: pools.non_fir,
    }
}

fn allocate<N: ItemNeed>(
    needs: &[&N],
    phase: Phase,
    pools: &mut Pools,
    updates: &mut Vec<DistributionUpdate>,
) {
    for need in needs {
        let needed = need.shortfall();
        if needed == 0 {
            continue;
        }
        let assigned = match phase {
            Phase::FirOnly => take(&mut pools.fir, needed),
            Phase::NonFirWithOverflow => {
                let plain = take(&mut pools.non_fir, needed);
                plain + take(&mut pools.fir, needed - plain)
            }
        };
        if assigned > 0 {
            updates.push(DistributionUpdate {
                id: need.id().to_string(),
                kind: N::KIND,
                new_count: need.current() + assigned,
                needed_total: need.target(),
            });
        }
    }
}

fn take(pool: &mut u32, wanted: u32) -> u32 {
    let taken = wanted.min(*pool);
    *pool -= taken;
    taken
}

/// Build the patch for a set of updates against the current snapshot.
///
/// Each target's count is set, `complete` is set when the count reaches
/// the needed total, and the completion timestamp is stamped only when the
/// target turns complete (an existing stamp is kept).
pub fn distribution_patch(
    progress: &ProgressSnapshot,
    updates: &[DistributionUpdate],
    now: i64,
) -> ProgressPatch {
    let mut patch = ProgressPatch::new();
    for update in updates {
        let previous = match update.kind {
            NeedKind::TaskObjective => progress.objective(&update.id),
            NeedKind::HideoutPart => progress.part(&update.id),
        };
        let complete = update.new_count >= update.needed_total;
        let timestamp = match (complete, previous.complete) {
            (false, _) => None,
            (true, true) => previous.timestamp.or(Some(now)),
            (true, false) => Some(now),
        };
        let next = ObjectiveProgress {
            complete,
            count: update.new_count,
            timestamp,
        };
        patch.push(progress_update(update.kind, update.id.clone(), next));
    }
    patch
}

/// Apply a distribution to the store as one patch.
pub fn apply_distribution<S: ProgressStore + ?Sized>(
    store: &mut S,
    updates: &[DistributionUpdate],
    now: i64,
) -> Result<(), EngineError> {
    let patch = distribution_patch(store.snapshot(), updates, now);
    crate::actions::apply_patch(store, &patch)
}

/// Reference to a single objective or part.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeedRef {
    pub id: String,
    pub kind: NeedKind,
}

impl NeedRef {
    pub fn task_objective(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: NeedKind::TaskObjective,
        }
    }

    pub fn hideout_part(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: NeedKind::HideoutPart,
        }
    }
}

/// Patch zeroing count, completion and timestamp of every target.
pub fn reset_patch(targets: &[NeedRef]) -> ProgressPatch {
    let mut patch = ProgressPatch::new();
    for target in targets {
        patch.push(progress_update(
            target.kind,
            target.id.clone(),
            ObjectiveProgress::default(),
        ));
    }
    patch
}

/// Reset every target in one atomic patch.
pub fn reset_objectives<S: ProgressStore + ?Sized>(
    store: &mut S,
    targets: &[NeedRef],
) -> Result<(), EngineError> {
    crate::actions::apply_patch(store, &reset_patch(targets))
}

fn progress_update(kind: NeedKind, id: String, progress: ObjectiveProgress) -> ProgressUpdate {
    match kind {
        NeedKind::TaskObjective => ProgressUpdate::Objective { id, progress },
        NeedKind::HideoutPart => ProgressUpdate::HideoutPart { id, progress },
    }
}

// ── Collecting needs ───────────────────────────────────────────────────

/// Outstanding task objectives that want `item_id`.
///
/// Tasks that are completed or failed are skipped, as are objectives that
/// are already complete or have no countable target.
pub fn task_needs_for_item(
    item_id: &str,
    tasks: &[Task],
    progress: &ProgressSnapshot,
    policy: &RequirementPolicy,
) -> Vec<TaskItemNeed> {
    let mut needs = Vec::new();
    for task in tasks {
        if derive_task_state(task, progress, policy).is_resolved() {
            continue;
        }
        for objective in &task.objectives {
            let wants_item = objective.item.as_ref().map_or(false, |i| i.id == item_id);
            if !wants_item || objective.count == 0 {
                continue;
            }
            let current = progress.objective(&objective.id);
            if current.complete {
                continue;
            }
            needs.push(TaskItemNeed {
                id: objective.id.clone(),
                task_id: task.id.clone(),
                count: objective.count,
                found_in_raid: objective.found_in_raid,
                current_count: current.count,
                kappa_required: task.kappa_required,
                min_player_level: task.min_player_level,
            });
        }
    }
    needs
}

/// Outstanding hideout parts that want `item_id`, from modules not yet built.
pub fn hideout_needs_for_item(
    item_id: &str,
    stations: &[HideoutStation],
    progress: &ProgressSnapshot,
) -> Vec<HideoutItemNeed> {
    let mut needs = Vec::new();
    for station in stations {
        for level in &station.levels {
            if progress.module_complete(&level.id) {
                continue;
            }
            for req in &level.item_requirements {
                let wants_item = req.item.as_ref().map_or(false, |i| i.id == item_id);
                let current = progress.part(&req.id);
                if !wants_item || req.count == 0 || current.complete {
                    continue;
                }
                needs.push(HideoutItemNeed {
                    id: req.id.clone(),
                    station_id: station.id.clone(),
                    station_level: level.level,
                    count: req.count,
                    found_in_raid: req.found_in_raid,
                    current_count: current.count,
                });
            }
        }
    }
    needs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ItemRef, ItemRequirement, StationLevel, TaskObjective};
    use crate::progress::MemoryStore;

    const NOW: i64 = 1_700_000_000_000;

    fn task_need(id: &str, count: u32, fir: bool, kappa: bool, level: u32) -> TaskItemNeed {
        TaskItemNeed {
            id: id.into(),
            task_id: format!("task-{}", id),
            count,
            found_in_raid: fir,
            current_count: 0,
            kappa_required: kappa,
            min_player_level: level,
        }
    }

    fn hideout_need(id: &str, count: u32, fir: bool, station_level: u32) -> HideoutItemNeed {
        HideoutItemNeed {
            id: id.into(),
            station_id: "medstation".into(),
            station_level,
            count,
            found_in_raid: fir,
            current_count: 0,
        }
    }

    #[test]
    fn test_fir_split_across_two_objectives() {
        let needs = vec![
            task_need("first", 2, true, true, 1),
            task_need("second", 2, true, true, 5),
        ];
        let result = distribute_items(3, 0, &needs, &[]);
        assert_eq!(result.updates.len(), 2);
        assert_eq!(result.updates[0].id, "first");
        assert_eq!(result.updates[0].new_count, 2);
        assert_eq!(result.updates[1].id, "second");
        assert_eq!(result.updates[1].new_count, 1);
        assert_eq!(result.remaining_fir, 0);
    }

    #[test]
    fn test_kappa_sorted_before_level() {
        let needs = vec![
            task_need("side", 1, true, false, 1),
            task_need("kappa-high", 1, true, true, 40),
            task_need("kappa-low", 1, true, true, 10),
        ];
        let result = distribute_items(2, 0, &needs, &[]);
        let ids: Vec<_> = result.updates.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["kappa-low", "kappa-high"]);
    }

    #[test]
    fn test_non_fir_overflows_into_fir() {
        let needs = vec![task_need("plain", 5, false, true, 1)];
        let result = distribute_items(4, 2, &needs, &[]);
        assert_eq!(result.updates[0].new_count, 5);
        assert_eq!(result.remaining_non_fir, 0);
        assert_eq!(result.remaining_fir, 1);
    }

    #[test]
    fn test_fir_need_ignores_non_fir_pool() {
        let needs = vec![task_need("fir", 3, true, true, 1)];
        let result = distribute_items(0, 10, &needs, &[]);
        assert!(result.updates.is_empty());
        assert_eq!(result.remaining_non_fir, 10);
    }

    #[test]
    fn test_task_phases_before_hideout() {
        let tasks = vec![task_need("t", 2, false, false, 1)];
        let hideout = vec![hideout_need("h2", 2, false, 2), hideout_need("h1", 2, false, 1)];
        let result = distribute_items(0, 5, &tasks, &hideout);
        let ids: Vec<_> = result.updates.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["t", "h1", "h2"]);
        assert_eq!(result.updates[2].new_count, 1);
        assert_eq!(result.updates[1].kind, NeedKind::HideoutPart);
    }

    #[test]
    fn test_fir_task_phase_runs_before_non_fir_overflow() {
        // The plain need would overflow into FIR, but FIR needs come first.
        let needs = vec![
            task_need("plain", 2, false, true, 1),
            task_need("fir", 2, true, false, 50),
        ];
        let result = distribute_items(2, 0, &needs, &[]);
        assert_eq!(result.updates.len(), 1);
        assert_eq!(result.updates[0].id, "fir");
    }

    #[test]
    fn test_partial_progress_respected() {
        let mut need = task_need("a", 5, false, true, 1);
        need.current_count = 4;
        let result = distribute_items(0, 10, &[need], &[]);
        assert_eq!(result.updates[0].new_count, 5);
        assert_eq!(result.updates[0].needed_total, 5);
        assert_eq!(result.remaining_non_fir, 9);
    }

    #[test]
    fn test_overfilled_need_gets_nothing() {
        let mut need = task_need("a", 2, false, true, 1);
        need.current_count = 3;
        let result = distribute_items(5, 5, &[need], &[]);
        assert!(result.updates.is_empty());
        assert_eq!((result.remaining_fir, result.remaining_non_fir), (5, 5));
    }

    #[test]
    fn test_distribution_patch_timestamps() {
        let mut p = ProgressSnapshot::default();
        p.objectives.insert(
            "done".into(),
            ObjectiveProgress {
                complete: true,
                count: 2,
                timestamp: Some(42),
            },
        );
        let updates = vec![
            DistributionUpdate {
                id: "fresh".into(),
                kind: NeedKind::TaskObjective,
                new_count: 3,
                needed_total: 3,
            },
            DistributionUpdate {
                id: "partial".into(),
                kind: NeedKind::HideoutPart,
                new_count: 1,
                needed_total: 3,
            },
            DistributionUpdate {
                id: "done".into(),
                kind: NeedKind::TaskObjective,
                new_count: 3,
                needed_total: 2,
            },
        ];
        let mut next = p.clone();
        next.apply_patch(&distribution_patch(&p, &updates, NOW));
        assert_eq!(
            next.objective("fresh"),
            ObjectiveProgress {
                complete: true,
                count: 3,
                timestamp: Some(NOW)
            }
        );
        assert_eq!(
            next.part("partial"),
            ObjectiveProgress {
                complete: false,
                count: 1,
                timestamp: None
            }
        );
        assert_eq!(next.objective("done").timestamp, Some(42));
    }

    #[test]
    fn test_apply_and_reset_through_store() {
        let mut store = MemoryStore::default();
        let needs = vec![task_need("a", 2, false, true, 1)];
        let result = distribute_items(0, 2, &needs, &[]);
        apply_distribution(&mut store, &result.updates, NOW).unwrap();
        assert!(store.snapshot().objective("a").complete);
        assert_eq!(store.revision(), 1);

        reset_objectives(&mut store, &[NeedRef::task_objective("a")]).unwrap();
        assert_eq!(store.snapshot().objective("a"), ObjectiveProgress::default());
        assert_eq!(store.revision(), 2);
    }

    #[test]
    fn test_reset_then_redistribute_matches_fresh_apply() {
        let needs = vec![task_need("a", 3, false, true, 1)];
        let parts = vec![hideout_need("p", 2, false, 1)];
        let targets = [NeedRef::task_objective("a"), NeedRef::hideout_part("p")];

        let mut prior = ProgressSnapshot::default();
        prior.objectives.insert(
            "a".into(),
            ObjectiveProgress {
                complete: true,
                count: 3,
                timestamp: Some(NOW - 500),
            },
        );
        prior.hideout_parts.insert(
            "p".into(),
            ObjectiveProgress {
                complete: false,
                count: 1,
                timestamp: None,
            },
        );
        let mut reset_store = MemoryStore::new(prior);
        reset_objectives(&mut reset_store, &targets).unwrap();
        let after_reset = reset_store.snapshot();
        assert_eq!(after_reset.objective("a").count, 0);
        assert_eq!(after_reset.part("p").count, 0);
        let result = distribute_items(0, 5, &needs, &parts);
        apply_distribution(&mut reset_store, &result.updates, NOW).unwrap();

        let mut fresh_store = MemoryStore::default();
        let result = distribute_items(0, 5, &needs, &parts);
        assert_eq!(result.remaining_non_fir, 0);
        apply_distribution(&mut fresh_store, &result.updates, NOW).unwrap();

        let reset = reset_store.into_snapshot();
        let fresh = fresh_store.into_snapshot();
        assert_eq!(reset.objective("a").count, 3);
        assert!(reset.objective("a").complete);
        assert_eq!(reset.objective("a").timestamp, Some(NOW));
        assert_eq!(reset.part("p").count, 2);
        assert_eq!(reset, fresh);
    }

    #[test]
    fn test_collect_needs() {
        let salewa = ItemRef {
            id: "salewa".into(),
            name: "Salewa".into(),
        };
        let tasks = vec![
            Task {
                id: "shortage".into(),
                kappa_required: true,
                objectives: vec![
                    TaskObjective {
                        id: "shortage-salewa".into(),
                        task_id: "shortage".into(),
                        count: 3,
                        found_in_raid: true,
                        item: Some(salewa.clone()),
                    },
                    TaskObjective {
                        id: "shortage-visit".into(),
                        task_id: "shortage".into(),
                        count: 0,
                        found_in_raid: false,
                        item: None,
                    },
                ],
                ..Default::default()
            },
            Task {
                id: "locked".into(),
                predecessors: vec!["shortage".into()],
                objectives: vec![TaskObjective {
                    id: "locked-salewa".into(),
                    task_id: "locked".into(),
                    count: 1,
                    found_in_raid: false,
                    item: Some(salewa.clone()),
                }],
                ..Default::default()
            },
        ];
        let stations = vec![HideoutStation {
            id: "medstation".into(),
            name: "Medstation".into(),
            levels: vec![StationLevel {
                id: "med-1".into(),
                level: 1,
                item_requirements: vec![ItemRequirement {
                    id: "med-1-salewa".into(),
                    item: Some(salewa),
                    count: 2,
                    found_in_raid: false,
                }],
                ..Default::default()
            }],
        }];
        let p = ProgressSnapshot::default();
        let policy = RequirementPolicy::default();
        // Locked tasks still need their items; only resolved tasks are skipped.
        let task_needs = task_needs_for_item("salewa", &tasks, &p, &policy);
        assert_eq!(task_needs.len(), 2);
        assert!(task_needs[0].kappa_required);
        let hideout = hideout_needs_for_item("salewa", &stations, &p);
        assert_eq!(hideout.len(), 1);
        assert_eq!(hideout[0].station_level, 1);
        assert!(hideout_needs_for_item("bandage", &stations, &p).is_empty());
    }
}
