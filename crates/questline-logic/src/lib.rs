//! Pure progress logic for Questline.
//!
//! This crate derives everything a quest tracker shows from two inputs:
//! static game data (tasks, hideout stations) and a player's stored
//! progress. No state is cached between calls. Functions take plain data
//! and return results; writes are expressed as [`progress::ProgressPatch`]
//! values applied through a [`progress::ProgressStore`].
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`actions`] | Complete / uncomplete / fail tasks and satisfy prerequisites |
//! | [`config`] | Engine configuration and validation |
//! | [`distribution`] | Greedy allocation of picked-up items to objectives |
//! | [`error`] | Graph, store and engine error types |
//! | [`graph`] | Cycle-safe dependency graph and ancestor traversal |
//! | [`invalidation`] | Branch-contradicting progress and goal metrics |
//! | [`kappa`] | Critical path floor, pace confidence and projection |
//! | [`model`] | Task, objective and hideout data records |
//! | [`progress`] | Progress snapshot, patches and the store trait |
//! | [`requirements`] | Requirement policy and per-requirement predicates |
//! | [`resolver`] | Task and hideout module state derivation |

pub mod actions;
pub mod config;
pub mod distribution;
pub mod error;
pub mod graph;
pub mod invalidation;
pub mod kappa;
pub mod model;
pub mod progress;
pub mod requirements;
pub mod resolver;
