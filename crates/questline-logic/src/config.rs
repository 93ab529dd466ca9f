//! Engine configuration.
//!
//! Settings that change how progress is derived rather than what the
//! player has done. The harness reads these from JSON; the library only
//! defines the shape and validates it.
//!
//! ```
//! use questline_logic::config::{validate_config, EngineConfig};
//!
//! let mut config = EngineConfig::default();
//! config.pace_window_days = 14;
//! assert!(validate_config(&config).is_empty());
//! ```

use serde::{Deserialize, Serialize};

use crate::requirements::RequirementPolicy;

/// Default trailing window for pace sampling.
pub const DEFAULT_PACE_WINDOW_DAYS: u32 = 30;

/// Longest accepted pace window.
pub const MAX_PACE_WINDOW_DAYS: u32 = 365;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Which hideout and task gates are enforced.
    pub policy: RequirementPolicy,
    /// Days of completion history used for pace projection.
    pub pace_window_days: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            policy: RequirementPolicy::default(),
            pace_window_days: DEFAULT_PACE_WINDOW_DAYS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Pace window outside `1..=365` days.
    WindowOutOfRange(u32),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::WindowOutOfRange(days) => write!(
                f,
                "Pace window of {} days is outside 1..={}",
                days, MAX_PACE_WINDOW_DAYS
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Validate a configuration, returning all errors found.
pub fn validate_config(config: &EngineConfig) -> Vec<ConfigError> {
    let mut errors = Vec::new();
    if !(1..=MAX_PACE_WINDOW_DAYS).contains(&config.pace_window_days) {
        errors.push(ConfigError::WindowOutOfRange(config.pace_window_days));
    }
    errors
}
