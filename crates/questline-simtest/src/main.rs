//! Questline Headless Validation Harness
//!
//! Drives the progress engine against the bundled dataset and an
//! in-memory progress store. Runs entirely in-process.
//!
//! Usage:
//!   cargo run -p questline-simtest
//!   cargo run -p questline-simtest -- --verbose
//!   cargo run -p questline-simtest -- --config my_config.json --snapshot-out progress.bin

mod snapshot;

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};

use questline_logic::actions::{self, complete_task, satisfy_requirements, uncomplete_task};
use questline_logic::config::{validate_config, EngineConfig};
use questline_logic::distribution::{self, NeedKind, NeedRef};
use questline_logic::graph::{build_task_graph, DependencyGraph, EdgeInsert};
use questline_logic::invalidation::{compute_invalid_progress, goal_metrics, Goal};
use questline_logic::kappa::{self, Confidence, PaceSample};
use questline_logic::model::{index_tasks, HideoutStation, Task};
use questline_logic::progress::{MemoryStore, ProgressSnapshot, ProgressStore};
use questline_logic::requirements::RequirementPolicy;
use questline_logic::resolver::{
    derive_station_states, derive_task_state, derive_task_states, ModuleState, StateCounts,
    TaskState,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// ── Bundled dataset (same JSON the integration tests use) ───────────────
const TASKS_JSON: &str = include_str!("../../../data/tasks.json");
const HIDEOUT_JSON: &str = include_str!("../../../data/hideout.json");
const PROGRESS_JSON: &str = include_str!("../../../data/progress.json");
const CONFIG_JSON: &str = include_str!("../../../data/config.json");

/// Reference clock the fixture timestamps are written against.
const NOW: i64 = 1_760_000_000_000;

// ── Test harness ────────────────────────────────────────────────────────

struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

fn check(name: &str, passed: bool, detail: impl Into<String>) -> TestResult {
    TestResult {
        name: name.into(),
        passed,
        detail: detail.into(),
    }
}

struct Dataset {
    tasks: Vec<Task>,
    stations: Vec<HideoutStation>,
    progress: ProgressSnapshot,
    config: EngineConfig,
}

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let verbose = args.iter().any(|a| a == "--verbose");
    let config_path = arg_value(&args, "--config");
    let snapshot_out = arg_value(&args, "--snapshot-out");
    println!("=== Questline Validation Harness ===\n");

    let mut results = Vec::new();

    // 1. Dataset and configuration
    let dataset = match load_dataset(config_path.as_deref(), &mut results) {
        Some(d) => d,
        None => {
            report(&results, verbose);
            std::process::exit(1);
        }
    };

    // 2. Dependency graph
    results.extend(validate_graph(&dataset, verbose));

    // 3. Availability derivation
    results.extend(validate_availability(&dataset, verbose));

    // 4. Invalidation and goal metrics
    results.extend(validate_invalidation(&dataset, verbose));

    // 5. Kappa projection
    results.extend(validate_kappa(&dataset, verbose));

    // 6. Mutations through the store
    results.extend(validate_actions(&dataset, verbose));

    // 7. Item distribution
    results.extend(validate_distribution(&dataset, verbose));

    // 8. Snapshot persistence
    results.extend(validate_persistence(&dataset, snapshot_out.as_deref()));

    let failed = report(&results, verbose);
    if failed > 0 {
        std::process::exit(1);
    }
}

/// Print the summary and return the number of failures.
fn report(results: &[TestResult], verbose: bool) -> usize {
    println!();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.iter().filter(|r| !r.passed).count();
    let total = results.len();

    for r in results {
        let icon = if r.passed { "✓" } else { "✗" };
        if !r.passed || verbose {
            println!("  {} {}: {}", icon, r.name, r.detail);
        }
    }

    println!(
        "\n=== RESULT: {}/{} passed, {} failed ===",
        passed, total, failed
    );
    failed
}

// ── 1. Dataset ──────────────────────────────────────────────────────────

fn load_dataset(config_path: Option<&str>, results: &mut Vec<TestResult>) -> Option<Dataset> {
    println!("--- Dataset ---");

    fn parse<T: serde::de::DeserializeOwned>(
        name: &str,
        json: &str,
        results: &mut Vec<TestResult>,
    ) -> Option<T> {
        match serde_json::from_str(json) {
            Ok(v) => Some(v),
            Err(e) => {
                results.push(check(name, false, format!("JSON parse error: {}", e)));
                None
            }
        }
    }

    let config_json = match config_path {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                results.push(check("config_read", false, format!("{}: {}", path, e)));
                return None;
            }
        },
        None => CONFIG_JSON.to_string(),
    };

    let tasks: Vec<Task> = parse("tasks_parse", TASKS_JSON, results)?;
    let stations: Vec<HideoutStation> = parse("hideout_parse", HIDEOUT_JSON, results)?;
    let progress: ProgressSnapshot = parse("progress_parse", PROGRESS_JSON, results)?;
    let config: EngineConfig = parse("config_parse", &config_json, results)?;

    results.push(check(
        "dataset_not_empty",
        !tasks.is_empty() && !stations.is_empty(),
        format!("{} tasks, {} stations", tasks.len(), stations.len()),
    ));

    let unique: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
    results.push(check(
        "task_ids_unique",
        unique.len() == tasks.len(),
        format!("{} unique of {}", unique.len(), tasks.len()),
    ));

    let errors = validate_config(&config);
    results.push(check(
        "config_valid",
        errors.is_empty(),
        if errors.is_empty() {
            format!(
                "window {} days, {}",
                config.pace_window_days,
                config_path.unwrap_or("bundled config")
            )
        } else {
            errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ")
        },
    ));
    if !errors.is_empty() {
        return None;
    }

    Some(Dataset {
        tasks,
        stations,
        progress,
        config,
    })
}

// ── 2. Dependency Graph ─────────────────────────────────────────────────

fn validate_graph(data: &Dataset, verbose: bool) -> Vec<TestResult> {
    println!("--- Dependency Graph ---");
    let mut results = Vec::new();

    let graph = build_task_graph(&data.tasks);
    results.push(check(
        "graph_one_node_per_task",
        graph.node_count() == data.tasks.len(),
        format!("{} nodes, {} edges", graph.node_count(), graph.edge_count()),
    ));

    let self_reaching: Vec<&String> = graph
        .nodes()
        .iter()
        .filter(|n| {
            graph
                .get_predecessors(n.as_str())
                .map_or(true, |anc| anc.contains(*n))
        })
        .collect();
    results.push(check(
        "graph_no_self_ancestry",
        self_reaching.is_empty(),
        format!("{} nodes reach themselves", self_reaching.len()),
    ));

    let mut probe: DependencyGraph = DependencyGraph::new();
    probe.safe_add_edge("a", "b");
    probe.safe_add_edge("b", "c");
    let back = probe.safe_add_edge("c", "a");
    let self_loop = probe.safe_add_edge("a", "a");
    results.push(check(
        "graph_rejects_cycles",
        back == EdgeInsert::WouldCycle && self_loop == EdgeInsert::SelfLoop,
        format!("c→a {:?}, a→a {:?}", back, self_loop),
    ));

    // Random stress: every reversed edge must be refused.
    let mut rng = StdRng::seed_from_u64(42);
    let mut stress: DependencyGraph = DependencyGraph::new();
    let mut inserted = Vec::new();
    for _ in 0..2_000 {
        let a = format!("n{}", rng.gen_range(0..300));
        let b = format!("n{}", rng.gen_range(0..300));
        if stress.safe_add_edge(a.clone(), b.clone()) == EdgeInsert::Inserted {
            inserted.push((a, b));
        }
    }
    let rejected_reversals = inserted
        .iter()
        .filter(|(a, b)| stress.safe_add_edge(b.clone(), a.clone()).is_rejected())
        .count();
    results.push(check(
        "graph_stress_acyclic",
        rejected_reversals == inserted.len(),
        format!(
            "{} edges inserted, {} reversals refused",
            inserted.len(),
            rejected_reversals
        ),
    ));

    if verbose {
        let mut roots: Vec<&str> = graph
            .nodes()
            .iter()
            .filter(|n| graph.in_neighbors(n.as_str()).map_or(false, |v| v.is_empty()))
            .map(String::as_str)
            .collect();
        roots.sort_unstable();
        println!("  Root tasks: {}", roots.join(", "));
    }

    results
}

// ── 3. Availability ─────────────────────────────────────────────────────

fn validate_availability(data: &Dataset, verbose: bool) -> Vec<TestResult> {
    println!("--- Availability ---");
    let mut results = Vec::new();
    let policy = data.config.policy;

    let states = derive_task_states(&data.tasks, &data.progress, &policy);
    let again = derive_task_states(&data.tasks, &data.progress, &policy);
    results.push(check(
        "states_idempotent",
        states == again,
        "two derivations agree",
    ));

    let counts = StateCounts::from_states(states.values());
    results.push(check(
        "states_cover_all_tasks",
        counts.total() as usize == data.tasks.len(),
        format!(
            "locked={} available={} active={} completed={} failed={}",
            counts.locked, counts.available, counts.active, counts.completed, counts.failed
        ),
    ));

    // Every open task has all completion-type parents completed.
    let lookup = index_tasks(&data.tasks);
    let mut violations = 0;
    for task in &data.tasks {
        if !states[&task.id].is_open() {
            continue;
        }
        for pred in task.uncovered_predecessors() {
            if lookup.contains_key(pred) && !data.progress.task_flags(pred).is_completed() {
                violations += 1;
            }
        }
    }
    results.push(check(
        "open_tasks_have_parents_done",
        violations == 0,
        format!("{} violations", violations),
    ));

    let modules = derive_station_states(&data.stations, &data.progress, &policy);
    let level_count: usize = data.stations.iter().map(|s| s.levels.len()).sum();
    results.push(check(
        "modules_cover_all_levels",
        modules.len() == level_count,
        format!("{} module states", modules.len()),
    ));

    let lenient =
        derive_station_states(&data.stations, &data.progress, &RequirementPolicy::lenient());
    let unlocked_by_lenient = modules
        .iter()
        .filter(|(id, state)| {
            **state == ModuleState::Locked && lenient[*id] != ModuleState::Locked
        })
        .count();
    let locked_by_lenient = modules
        .iter()
        .filter(|(id, state)| {
            **state != ModuleState::Locked && lenient[*id] == ModuleState::Locked
        })
        .count();
    results.push(check(
        "lenient_policy_only_unlocks",
        locked_by_lenient == 0,
        format!("{} modules unlocked by lenient policy", unlocked_by_lenient),
    ));

    if verbose {
        let mut ids: Vec<&String> = modules.keys().collect();
        ids.sort();
        for id in ids {
            println!("  {:10} {:?}", id, modules[id]);
        }
    }

    results
}

// ── 4. Invalidation ─────────────────────────────────────────────────────

fn validate_invalidation(data: &Dataset, verbose: bool) -> Vec<TestResult> {
    println!("--- Invalidation ---");
    let mut results = Vec::new();
    let faction = data.progress.faction;

    let before = data.progress.clone();
    let invalid = compute_invalid_progress(faction, &data.progress, &data.tasks);
    results.push(check(
        "invalidation_read_only",
        before == data.progress,
        format!("{} tasks flagged", invalid.len()),
    ));

    let wrong_faction_valid = data
        .tasks
        .iter()
        .filter(|t| !t.faction_name.admits(faction) && !invalid.contains(&t.id))
        .count();
    results.push(check(
        "invalidation_wrong_faction",
        wrong_faction_valid == 0,
        format!("{} wrong-faction tasks left valid", wrong_faction_valid),
    ));

    for goal in [Goal::Kappa, Goal::Lightkeeper] {
        let metrics = goal_metrics(goal, faction, &data.progress, &data.tasks);
        let counted_invalid = metrics
            .remaining
            .iter()
            .filter(|id| invalid.contains(*id))
            .count();
        results.push(check(
            &format!("goal_{:?}_consistent", goal).to_lowercase(),
            metrics.completed <= metrics.total
                && metrics.remaining.len() as u32 == metrics.total - metrics.completed
                && counted_invalid == 0,
            format!(
                "{}/{} ({:.0}%)",
                metrics.completed,
                metrics.total,
                metrics.fraction() * 100.0
            ),
        ));
    }

    if verbose && !invalid.is_empty() {
        let mut ids: Vec<&String> = invalid.iter().collect();
        ids.sort();
        println!("  Invalid: {:?}", ids);
    }

    results
}

// ── 5. Kappa ────────────────────────────────────────────────────────────

fn validate_kappa(data: &Dataset, verbose: bool) -> Vec<TestResult> {
    println!("--- Kappa Projection ---");
    let mut results = Vec::new();

    let projection = kappa::project_kappa(
        &data.tasks,
        &data.progress,
        data.config.pace_window_days,
        NOW,
    );
    results.push(check(
        "kappa_floor_bounded",
        projection.remaining == 0 || projection.critical_path.floor >= 1,
        format!(
            "floor {} ending at {:?}",
            projection.critical_path.floor, projection.critical_path.longest_chain_task_id
        ),
    ));

    let estimate_consistent = match projection.estimated_days {
        Some(days) => days >= 0.0,
        None => projection.confidence.is_none() || projection.pace_per_day == 0.0,
    };
    results.push(check(
        "kappa_estimate_consistent",
        estimate_consistent,
        format!(
            "{} remaining, pace {:.2}/day, confidence {:?}, estimate {:?}",
            projection.remaining,
            projection.pace_per_day,
            projection.confidence,
            projection.estimated_days
        ),
    ));

    let thresholds = [
        (kappa::compute_confidence(2, 30.0), None),
        (kappa::compute_confidence(3, 0.5), Some(Confidence::Low)),
        (kappa::compute_confidence(7, 3.0), Some(Confidence::Medium)),
        (kappa::compute_confidence(15, 7.0), Some(Confidence::High)),
        (kappa::compute_confidence(15, 6.9), Some(Confidence::Medium)),
    ];
    let mismatches = thresholds.iter().filter(|(got, want)| got != want).count();
    results.push(check(
        "kappa_confidence_thresholds",
        mismatches == 0,
        format!("{} mismatches", mismatches),
    ));

    let dampened = kappa::dampen_pace(6.0, 1.5);
    results.push(check(
        "kappa_dampening",
        (dampened - 3.0).abs() < 1e-9 && kappa::dampen_pace(6.0, 5.0) == 6.0,
        format!("6.0/day over 1.5 days → {:.2}", dampened),
    ));

    if verbose {
        for window in [7, 14, 30, 90] {
            let timestamps = data
                .progress
                .tasks
                .keys()
                .filter_map(|id| data.progress.task_flags(id).timestamp);
            let sample = PaceSample::from_completions(timestamps, NOW, window);
            println!(
                "  {:3} day window: {} completions over {:.1} days",
                window, sample.count, sample.days
            );
        }
    }

    results
}

// ── 6. Actions ──────────────────────────────────────────────────────────

fn validate_actions(data: &Dataset, _verbose: bool) -> Vec<TestResult> {
    println!("--- Actions ---");
    let mut results = Vec::new();
    let lookup = index_tasks(&data.tasks);
    // Satisfying requirements never raises the player level.
    let policy = RequirementPolicy {
        require_player_level: false,
        ..data.config.policy
    };

    // Satisfying a locked task's requirements opens it.
    let mut store = MemoryStore::new(data.progress.clone());
    let states = derive_task_states(&data.tasks, store.snapshot(), &policy);
    let mut locked: Vec<&Task> = data
        .tasks
        .iter()
        .filter(|t| states[&t.id] == TaskState::Locked)
        .collect();
    locked.sort_by(|a, b| a.id.cmp(&b.id));
    let mut opened = 0;
    let mut store_errors = Vec::new();
    for task in &locked {
        let mut trial = MemoryStore::new(store.snapshot().clone());
        let patch = satisfy_requirements(task, &lookup, trial.snapshot(), NOW);
        if let Err(e) = actions::apply_patch(&mut trial, &patch) {
            store_errors.push(e.to_string());
            continue;
        }
        if derive_task_state(task, trial.snapshot(), &policy).is_open() {
            opened += 1;
        }
    }
    results.push(check(
        "satisfy_opens_locked_tasks",
        opened == locked.len() && store_errors.is_empty(),
        format!("{}/{} opened", opened, locked.len()),
    ));

    // Completing a task with alternatives fails the siblings.
    let with_alternatives = data.tasks.iter().find(|t| !t.alternatives.is_empty());
    if let Some(task) = with_alternatives {
        let patch = complete_task(task, &lookup, store.snapshot(), NOW);
        let applied = actions::apply_patch(&mut store, &patch);
        let siblings_failed = task
            .alternatives
            .iter()
            .all(|alt| store.snapshot().task_flags(alt).failed);
        results.push(check(
            "complete_fails_alternatives",
            applied.is_ok() && siblings_failed,
            format!("{} → {:?} failed", task.id, task.alternatives),
        ));

        let patch = uncomplete_task(task);
        let reverted = actions::apply_patch(&mut store, &patch).is_ok()
            && !store.snapshot().task_flags(&task.id).complete;
        let alternatives_kept = task
            .alternatives
            .iter()
            .all(|alt| store.snapshot().task_flags(alt).failed);
        results.push(check(
            "uncomplete_keeps_alternatives",
            reverted && alternatives_kept,
            format!("store revision {}", store.revision()),
        ));
    }

    results
}

// ── 7. Distribution ─────────────────────────────────────────────────────

fn validate_distribution(data: &Dataset, verbose: bool) -> Vec<TestResult> {
    println!("--- Item Distribution ---");
    let mut results = Vec::new();
    let policy = data.config.policy;

    let mut items: Vec<&str> = data
        .tasks
        .iter()
        .flat_map(|t| t.objectives.iter())
        .filter_map(|o| o.item.as_ref().map(|i| i.id.as_str()))
        .collect();
    items.sort_unstable();
    items.dedup();

    let mut store = MemoryStore::new(data.progress.clone());
    let mut over_assigned = 0;
    let mut conserved = true;
    let mut touched: Vec<NeedRef> = Vec::new();
    for item in &items {
        let task_needs =
            distribution::task_needs_for_item(item, &data.tasks, store.snapshot(), &policy);
        let hideout_needs =
            distribution::hideout_needs_for_item(item, &data.stations, store.snapshot());
        let (fir, non_fir) = (2, 2);
        let result = distribution::distribute_items(fir, non_fir, &task_needs, &hideout_needs);

        let assigned: u32 = result
            .updates
            .iter()
            .map(|u| {
                let previous = match u.kind {
                    NeedKind::TaskObjective => store.snapshot().objective(&u.id).count,
                    NeedKind::HideoutPart => store.snapshot().part(&u.id).count,
                };
                if u.new_count > u.needed_total {
                    over_assigned += 1;
                }
                u.assigned(previous)
            })
            .sum();
        if assigned + result.remaining_fir + result.remaining_non_fir != fir + non_fir {
            conserved = false;
        }
        if verbose {
            println!(
                "  {:14} {} updates, {} FIR / {} non-FIR left",
                item,
                result.updates.len(),
                result.remaining_fir,
                result.remaining_non_fir
            );
        }
        touched.extend(result.updates.iter().map(|u| NeedRef {
            id: u.id.clone(),
            kind: u.kind,
        }));
        if let Err(e) = distribution::apply_distribution(&mut store, &result.updates, NOW) {
            results.push(check("distribution_apply", false, e.to_string()));
            return results;
        }
    }
    results.push(check(
        "distribution_within_need",
        over_assigned == 0,
        format!("{} items distributed", items.len()),
    ));
    results.push(check(
        "distribution_conserves_supply",
        conserved,
        "assigned + remaining == supplied",
    ));

    let reset = distribution::reset_objectives(&mut store, &touched);
    let all_cleared = touched.iter().all(|t| match t.kind {
        NeedKind::TaskObjective => !store.snapshot().objective(&t.id).has_progress(),
        NeedKind::HideoutPart => !store.snapshot().part(&t.id).has_progress(),
    });
    results.push(check(
        "distribution_reset",
        reset.is_ok() && all_cleared,
        format!("{} targets reset", touched.len()),
    ));

    results
}

// ── 8. Persistence ──────────────────────────────────────────────────────

fn validate_persistence(data: &Dataset, snapshot_out: Option<&str>) -> Vec<TestResult> {
    println!("--- Snapshot Persistence ---");
    let mut results = Vec::new();
    let expected = snapshot::normalized(&data.progress);

    let loaded = match snapshot_out {
        Some(path) => {
            let saved = File::create(path)
                .map_err(snapshot::SaveError::from)
                .and_then(|f| {
                    let mut writer = BufWriter::new(f);
                    snapshot::save_snapshot(&mut writer, &data.progress)?;
                    writer.flush()?;
                    Ok(())
                });
            saved.and_then(|_| {
                let f = File::open(path)?;
                snapshot::load_snapshot(BufReader::new(f))
            })
        }
        None => {
            let mut buf = Vec::new();
            snapshot::save_snapshot(&mut buf, &data.progress)
                .and_then(|_| snapshot::load_snapshot(buf.as_slice()))
        }
    };

    match loaded {
        Ok(snapshot) => results.push(check(
            "snapshot_roundtrip",
            snapshot == expected,
            format!(
                "{} task records, {}",
                snapshot.tasks.len(),
                snapshot_out.unwrap_or("in memory")
            ),
        )),
        Err(e) => results.push(check("snapshot_roundtrip", false, e.to_string())),
    }

    results
}
