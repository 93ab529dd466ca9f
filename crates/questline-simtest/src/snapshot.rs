//! Binary save/load of a progress snapshot.
//!
//! Uses bincode. Task completions are written in their normalized record
//! shape since bincode cannot carry the untagged legacy form; loading
//! therefore always yields `TaskCompletion::Record` entries.

use std::collections::HashMap;
use std::io::{Read, Write};

use questline_logic::model::{Faction, TaskId};
use questline_logic::progress::{
    completion_flags, CompletionRecord, ModuleProgress, ObjectiveProgress, ProgressSnapshot,
    TaskCompletion,
};
use serde::{Deserialize, Serialize};

/// Version number for the snapshot format (increment when format changes)
const SAVE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct SaveData {
    version: u32,
    player_level: u32,
    faction: Faction,
    tasks: HashMap<TaskId, CompletionRecord>,
    objectives: HashMap<String, ObjectiveProgress>,
    hideout_modules: HashMap<String, ModuleProgress>,
    hideout_parts: HashMap<String, ObjectiveProgress>,
    skills: HashMap<String, f64>,
    derived_skills: HashMap<String, f64>,
    traders: HashMap<String, u32>,
}

/// Rewrite every task completion in record form.
pub fn normalized(snapshot: &ProgressSnapshot) -> ProgressSnapshot {
    let mut out = snapshot.clone();
    for entry in out.tasks.values_mut() {
        *entry = TaskCompletion::Record(record_of(entry));
    }
    out
}

fn record_of(entry: &TaskCompletion) -> CompletionRecord {
    let flags = completion_flags(Some(entry));
    CompletionRecord {
        complete: flags.complete,
        failed: flags.failed,
        manual: flags.manual,
        timestamp: flags.timestamp,
    }
}

pub fn save_snapshot<W: Write>(writer: W, snapshot: &ProgressSnapshot) -> Result<(), SaveError> {
    let data = SaveData {
        version: SAVE_VERSION,
        player_level: snapshot.player_level,
        faction: snapshot.faction,
        tasks: snapshot
            .tasks
            .iter()
            .map(|(id, entry)| (id.clone(), record_of(entry)))
            .collect(),
        objectives: snapshot.objectives.clone(),
        hideout_modules: snapshot.hideout_modules.clone(),
        hideout_parts: snapshot.hideout_parts.clone(),
        skills: snapshot.skills.clone(),
        derived_skills: snapshot.derived_skills.clone(),
        traders: snapshot.traders.clone(),
    };
    bincode::serialize_into(writer, &data)?;
    Ok(())
}

pub fn load_snapshot<R: Read>(reader: R) -> Result<ProgressSnapshot, SaveError> {
    let data: SaveData = bincode::deserialize_from(reader)?;
    if data.version != SAVE_VERSION {
        return Err(SaveError::VersionMismatch {
            expected: SAVE_VERSION,
            found: data.version,
        });
    }
    Ok(ProgressSnapshot {
        player_level: data.player_level,
        faction: data.faction,
        tasks: data
            .tasks
            .into_iter()
            .map(|(id, record)| (id, TaskCompletion::Record(record)))
            .collect(),
        objectives: data.objectives,
        hideout_modules: data.hideout_modules,
        hideout_parts: data.hideout_parts,
        skills: data.skills,
        derived_skills: data.derived_skills,
        traders: data.traders,
    })
}

/// Errors that can occur during save/load
#[derive(Debug)]
pub enum SaveError {
    Io(std::io::Error),
    Bincode(bincode::Error),
    VersionMismatch { expected: u32, found: u32 },
}

impl From<std::io::Error> for SaveError {
    fn from(e: std::io::Error) -> Self {
        SaveError::Io(e)
    }
}

impl From<bincode::Error> for SaveError {
    fn from(e: bincode::Error) -> Self {
        SaveError::Bincode(e)
    }
}

impl std::fmt::Display for SaveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SaveError::Io(e) => write!(f, "IO error: {}", e),
            SaveError::Bincode(e) => write!(f, "Serialization error: {}", e),
            SaveError::VersionMismatch { expected, found } => write!(
                f,
                "Snapshot version mismatch: expected {}, found {}",
                expected, found
            ),
        }
    }
}

impl std::error::Error for SaveError {}
