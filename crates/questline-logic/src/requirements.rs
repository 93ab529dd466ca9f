//! Requirement satisfaction predicates.
//!
//! Each predicate answers "is this requirement met right now?" for one
//! requirement record. Every hideout category can be switched off through
//! [`RequirementPolicy`]; a disabled category is always satisfied.
//!
//! Malformed records (missing names, non-numeric levels) never block
//! progress: they are logged and treated as satisfied.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{
    HideoutStation, SkillRequirement, StationLevel, StationLevelRequirement, TaskRequirement,
    TraderRequirement,
};
use crate::progress::ProgressSnapshot;

/// Strictness preferences: which requirement categories block progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequirementPolicy {
    pub require_station_levels: bool,
    pub require_skill_levels: bool,
    pub require_trader_loyalty: bool,
    /// Gate task availability on `min_player_level`. Off by default.
    pub require_player_level: bool,
}

impl Default for RequirementPolicy {
    fn default() -> Self {
        Self {
            require_station_levels: true,
            require_skill_levels: true,
            require_trader_loyalty: true,
            require_player_level: false,
        }
    }
}

impl RequirementPolicy {
    /// Every category disabled.
    pub fn lenient() -> Self {
        Self {
            require_station_levels: false,
            require_skill_levels: false,
            require_trader_loyalty: false,
            require_player_level: false,
        }
    }
}

/// Current built level of every station (0 when nothing is built).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StationLevels(HashMap<String, u32>);

impl StationLevels {
    /// A station's level is the highest level whose module is complete.
    pub fn from_progress(stations: &[HideoutStation], progress: &ProgressSnapshot) -> Self {
        let levels = stations
            .iter()
            .map(|station| {
                let built = station
                    .levels
                    .iter()
                    .filter(|l| progress.module_complete(&l.id))
                    .map(|l| l.level)
                    .max()
                    .unwrap_or(0);
                (station.id.clone(), built)
            })
            .collect();
        Self(levels)
    }

    pub fn get(&self, station_id: &str) -> u32 {
        self.0.get(station_id).copied().unwrap_or(0)
    }
}

impl FromIterator<(String, u32)> for StationLevels {
    fn from_iter<I: IntoIterator<Item = (String, u32)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

pub fn station_level_met(
    req: &StationLevelRequirement,
    station_levels: &StationLevels,
    policy: &RequirementPolicy,
) -> bool {
    if !policy.require_station_levels {
        return true;
    }
    station_levels.get(&req.station) >= req.level
}

pub fn skill_met(
    req: &SkillRequirement,
    progress: &ProgressSnapshot,
    policy: &RequirementPolicy,
) -> bool {
    if !policy.require_skill_levels {
        return true;
    }
    let (Some(name), Some(level)) = (non_empty(req.name.as_deref()), req.level) else {
        log::warn!("malformed skill requirement treated as met: {:?}", req);
        return true;
    };
    progress.skill_level(name) >= level
}

pub fn trader_loyalty_met(
    req: &TraderRequirement,
    progress: &ProgressSnapshot,
    policy: &RequirementPolicy,
) -> bool {
    if !policy.require_trader_loyalty {
        return true;
    }
    let (Some(trader_id), Some(value)) = (non_empty(req.trader_id.as_deref()), req.value) else {
        log::warn!("malformed trader requirement treated as met: {:?}", req);
        return true;
    };
    progress.trader_level(trader_id) as f64 >= value
}

/// All station, skill and trader requirements of a level. Empty lists pass.
pub fn level_prerequisites_met(
    level: &StationLevel,
    progress: &ProgressSnapshot,
    station_levels: &StationLevels,
    policy: &RequirementPolicy,
) -> bool {
    level
        .station_level_requirements
        .iter()
        .all(|r| station_level_met(r, station_levels, policy))
        && level
            .skill_requirements
            .iter()
            .all(|r| skill_met(r, progress, policy))
        && level
            .trader_requirements
            .iter()
            .all(|r| trader_loyalty_met(r, progress, policy))
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

// ── Task requirements ──────────────────────────────────────────────────

/// What a task requirement's status set asks of its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequirementCondition {
    /// Target must be complete and not failed.
    Completed,
    /// Target must be failed.
    FailedOnly,
    /// Target must be either complete or failed.
    Resolved,
}

const COMPLETION_STATUSES: [&str; 5] = ["complete", "completed", "active", "accept", "accepted"];

impl RequirementCondition {
    pub fn from_statuses(statuses: &[String]) -> Self {
        let has = |wanted: &str| statuses.iter().any(|s| s.eq_ignore_ascii_case(wanted));
        let failed = has("failed");
        let completion = COMPLETION_STATUSES.iter().any(|s| has(*s));
        match (failed, completion) {
            (true, false) => RequirementCondition::FailedOnly,
            (true, true) => RequirementCondition::Resolved,
            _ => RequirementCondition::Completed,
        }
    }
}

impl TaskRequirement {
    pub fn condition(&self) -> RequirementCondition {
        RequirementCondition::from_statuses(&self.status)
    }
}

pub fn task_requirement_met(req: &TaskRequirement, progress: &ProgressSnapshot) -> bool {
    let flags = progress.task_flags(&req.task);
    match req.condition() {
        RequirementCondition::Completed => flags.is_completed(),
        RequirementCondition::FailedOnly => flags.failed,
        RequirementCondition::Resolved => flags.failed || flags.complete,
    }
}
