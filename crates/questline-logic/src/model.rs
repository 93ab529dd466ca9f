//! Reference entities: tasks, objectives, hideout stations and their
//! requirement records.
//!
//! These are immutable snapshots delivered by the data source. Field names
//! follow the camelCase JSON the data source emits.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Task identifier.
pub type TaskId = String;

/// Lookup of task id → task, built once per query with [`index_tasks`].
pub type TaskLookup<'a> = HashMap<&'a str, &'a Task>;

/// Player faction. Tasks tagged `Any` are available to everyone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Faction {
    #[default]
    #[serde(rename = "Any")]
    Any,
    #[serde(rename = "USEC")]
    Usec,
    #[serde(rename = "BEAR")]
    Bear,
}

impl Faction {
    /// Whether a task tagged with `self` can be taken by a player of `player`.
    ///
    /// A player whose faction is unknown (`Any`) is admitted everywhere.
    pub fn admits(self, player: Faction) -> bool {
        self == Faction::Any || player == Faction::Any || self == player
    }
}

/// Minimal item reference carried by objectives and hideout requirements.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItemRef {
    pub id: String,
    pub name: String,
}

/// A single objective of a task.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskObjective {
    pub id: String,
    pub task_id: TaskId,
    /// Target quantity. Zero for objectives with no countable target.
    pub count: u32,
    pub found_in_raid: bool,
    pub item: Option<ItemRef>,
}

/// Cross-task requirement: `task` must be in one of the `status` states.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskRequirement {
    pub task: TaskId,
    pub status: Vec<String>,
}

/// A task (quest) definition.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub trader_id: Option<String>,
    pub objectives: Vec<TaskObjective>,
    /// Tasks that must be resolved before this one is reachable.
    pub predecessors: Vec<TaskId>,
    /// Mutually exclusive siblings: completing this task fails them.
    pub alternatives: Vec<TaskId>,
    pub task_requirements: Vec<TaskRequirement>,
    pub kappa_required: bool,
    pub lightkeeper_required: bool,
    pub min_player_level: u32,
    pub faction_name: Faction,
}

impl Task {
    /// Immediate parents: `predecessors`, or the requirement targets when no
    /// predecessors are listed.
    pub fn parent_ids(&self) -> Vec<&str> {
        if self.predecessors.is_empty() {
            self.task_requirements
                .iter()
                .map(|r| r.task.as_str())
                .collect()
        } else {
            self.predecessors.iter().map(String::as_str).collect()
        }
    }

    /// Predecessors that are not already named by an explicit requirement.
    pub fn uncovered_predecessors(&self) -> impl Iterator<Item = &str> {
        self.predecessors
            .iter()
            .map(String::as_str)
            .filter(move |p| !self.task_requirements.iter().any(|r| r.task == *p))
    }
}

/// Index a task slice by id. Later duplicates shadow earlier ones.
pub fn index_tasks(tasks: &[Task]) -> TaskLookup<'_> {
    tasks.iter().map(|t| (t.id.as_str(), t)).collect()
}

// ── Hideout ────────────────────────────────────────────────────────────

/// Requires another station to be at `level` or above.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StationLevelRequirement {
    pub station: String,
    pub level: u32,
}

/// Requires a player skill at `level` or above.
///
/// Both fields are optional so that malformed records still load; the
/// predicate treats them as satisfied.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SkillRequirement {
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient_number")]
    pub level: Option<f64>,
}

/// Requires a trader loyalty level of `value` or above.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TraderRequirement {
    pub trader_id: Option<String>,
    #[serde(deserialize_with = "lenient_number")]
    pub value: Option<f64>,
}

/// An item hand-in for a hideout module ("part").
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItemRequirement {
    pub id: String,
    pub item: Option<ItemRef>,
    pub count: u32,
    pub found_in_raid: bool,
}

/// One buildable level ("module") of a station.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StationLevel {
    /// Module id, the key used by hideout progress records.
    pub id: String,
    pub level: u32,
    pub item_requirements: Vec<ItemRequirement>,
    pub station_level_requirements: Vec<StationLevelRequirement>,
    pub skill_requirements: Vec<SkillRequirement>,
    pub trader_requirements: Vec<TraderRequirement>,
}

/// A hideout station with its ordered levels.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HideoutStation {
    pub id: String,
    pub name: String,
    pub levels: Vec<StationLevel>,
}

impl HideoutStation {
    /// The level definition directly below `level`, if any.
    pub fn previous_level(&self, level: u32) -> Option<&StationLevel> {
        self.levels.iter().find(|l| l.level + 1 == level)
    }
}

/// Accept numbers, numeric strings, or anything else (mapped to `None`).
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
        Other(serde::de::IgnoredAny),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Number(n)) if n.is_finite() => Some(n),
        Some(Raw::Text(s)) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    })
}
