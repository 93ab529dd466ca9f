//! Directed dependency graph with cycle-guarded insertion.
//!
//! `DependencyGraph` knows nothing about tasks: nodes are any hashable id,
//! and an edge `a → b` means "`a` must resolve before `b`". Nodes live in an
//! arena (`Vec`) and adjacency is stored as arena indices, so traversal is a
//! plain worklist over `usize`s.
//!
//! Callers should insert edges through [`DependencyGraph::safe_add_edge`],
//! which refuses any edge that would close a cycle. Traversals are bounded
//! by a visited set regardless, so a cycle inserted through the raw
//! [`DependencyGraph::merge_edge`] can never hang them.

use std::borrow::Borrow;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

use crate::error::GraphError;
use crate::model::{Task, TaskId, TaskLookup};

/// Outcome of [`DependencyGraph::safe_add_edge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeInsert {
    Inserted,
    AlreadyPresent,
    /// Rejected: source and target are the same node.
    SelfLoop,
    /// Rejected: target already reaches source.
    WouldCycle,
}

impl EdgeInsert {
    pub fn is_rejected(self) -> bool {
        matches!(self, EdgeInsert::SelfLoop | EdgeInsert::WouldCycle)
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    In,
    Out,
}

/// Directed graph over ids of type `N`.
#[derive(Debug, Clone)]
pub struct DependencyGraph<N = TaskId> {
    nodes: Vec<N>,
    index: HashMap<N, usize>,
    /// node slot → successor slots
    outs: Vec<Vec<usize>>,
    /// node slot → predecessor slots
    ins: Vec<Vec<usize>>,
}

impl<N> Default for DependencyGraph<N> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            outs: Vec::new(),
            ins: Vec::new(),
        }
    }
}

impl<N: Clone + Eq + Hash + fmt::Display> DependencyGraph<N> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node if absent. Idempotent.
    pub fn merge_node(&mut self, id: impl Into<N>) {
        self.slot(id.into());
    }

    /// Insert `source → target`, creating either node if needed. Idempotent.
    ///
    /// This does not check for cycles; prefer [`Self::safe_add_edge`].
    pub fn merge_edge(&mut self, source: impl Into<N>, target: impl Into<N>) {
        let s = self.slot(source.into());
        let t = self.slot(target.into());
        self.link(s, t);
    }

    /// Insert `source → target` unless it would create a cycle.
    ///
    /// Rejected edges are logged and skipped; the graph is left unchanged.
    pub fn safe_add_edge(&mut self, source: impl Into<N>, target: impl Into<N>) -> EdgeInsert {
        let source = source.into();
        let target = target.into();
        if source == target {
            log::warn!("skipping self-referencing dependency on {}", source);
            return EdgeInsert::SelfLoop;
        }
        let s = self.slot(source);
        let t = self.slot(target);
        if self.outs[s].contains(&t) {
            return EdgeInsert::AlreadyPresent;
        }
        if self.reaches(t, s) {
            log::warn!(
                "skipping dependency {} -> {}: would create a cycle",
                self.nodes[s],
                self.nodes[t]
            );
            return EdgeInsert::WouldCycle;
        }
        self.link(s, t);
        EdgeInsert::Inserted
    }

    pub fn has_node<Q>(&self, id: &Q) -> bool
    where
        N: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.contains_key(id)
    }

    /// Immediate predecessors of `id`.
    pub fn in_neighbors<Q>(&self, id: &Q) -> Result<Vec<N>, GraphError>
    where
        N: Borrow<Q>,
        Q: Hash + Eq + fmt::Display + ?Sized,
    {
        let slot = self.lookup(id)?;
        Ok(self.ins[slot].iter().map(|&i| self.nodes[i].clone()).collect())
    }

    /// Immediate successors of `id`.
    pub fn out_neighbors<Q>(&self, id: &Q) -> Result<Vec<N>, GraphError>
    where
        N: Borrow<Q>,
        Q: Hash + Eq + fmt::Display + ?Sized,
    {
        let slot = self.lookup(id)?;
        Ok(self.outs[slot].iter().map(|&i| self.nodes[i].clone()).collect())
    }

    /// All node ids, in insertion order.
    pub fn nodes(&self) -> &[N] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.outs.iter().map(Vec::len).sum()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.index.clear();
        self.outs.clear();
        self.ins.clear();
    }

    /// Every node that can reach `id` (its transitive ancestors).
    ///
    /// `id` itself is never part of the result, even on cyclic data.
    pub fn get_predecessors<Q>(&self, id: &Q) -> Result<HashSet<N>, GraphError>
    where
        N: Borrow<Q>,
        Q: Hash + Eq + fmt::Display + ?Sized,
    {
        let slot = self.lookup(id)?;
        Ok(self.closure(slot, Direction::In))
    }

    /// Every node reachable from `id` (its transitive descendants).
    pub fn get_successors<Q>(&self, id: &Q) -> Result<HashSet<N>, GraphError>
    where
        N: Borrow<Q>,
        Q: Hash + Eq + fmt::Display + ?Sized,
    {
        let slot = self.lookup(id)?;
        Ok(self.closure(slot, Direction::Out))
    }

    fn lookup<Q>(&self, id: &Q) -> Result<usize, GraphError>
    where
        N: Borrow<Q>,
        Q: Hash + Eq + fmt::Display + ?Sized,
    {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))
    }

    fn slot(&mut self, id: N) -> usize {
        if let Some(&slot) = self.index.get(&id) {
            return slot;
        }
        let slot = self.nodes.len();
        self.index.insert(id.clone(), slot);
        self.nodes.push(id);
        self.outs.push(Vec::new());
        self.ins.push(Vec::new());
        slot
    }

    fn link(&mut self, s: usize, t: usize) {
        if !self.outs[s].contains(&t) {
            self.outs[s].push(t);
            self.ins[t].push(s);
        }
    }

    fn adjacent(&self, slot: usize, direction: Direction) -> &[usize] {
        match direction {
            Direction::In => &self.ins[slot],
            Direction::Out => &self.outs[slot],
        }
    }

    /// Depth-first walk from `start`; each node is expanded at most once.
    fn closure(&self, start: usize, direction: Direction) -> HashSet<N> {
        let mut visited = HashSet::from([start]);
        let mut result = HashSet::new();
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            for &next in self.adjacent(current, direction) {
                if visited.insert(next) {
                    result.insert(self.nodes[next].clone());
                    stack.push(next);
                }
            }
        }
        result
    }

    /// Whether `to` is reachable from `from` over out-edges.
    fn reaches(&self, from: usize, to: usize) -> bool {
        let mut visited = HashSet::from([from]);
        let mut stack = vec![from];
        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            for &next in &self.outs[current] {
                if visited.insert(next) {
                    stack.push(next);
                }
            }
        }
        false
    }
}

/// Build a fresh task graph: one node per task, one guarded edge per
/// parent → task relation whose parent is a known task.
pub fn build_task_graph(tasks: &[Task]) -> DependencyGraph<TaskId> {
    let mut graph = DependencyGraph::new();
    for task in tasks {
        graph.merge_node(task.id.as_str());
    }
    let mut rejected = 0usize;
    for task in tasks {
        for parent in task.parent_ids() {
            if !graph.has_node(parent) {
                continue;
            }
            if graph.safe_add_edge(parent, task.id.as_str()).is_rejected() {
                rejected += 1;
            }
        }
    }
    log::debug!(
        "task graph: {} nodes, {} edges, {} rejected",
        graph.node_count(),
        graph.edge_count(),
        rejected
    );
    graph
}

/// Collect `seeds` plus every transitive parent reachable through
/// [`Task::parent_ids`]. Ids missing from `tasks_by_id` are not followed.
pub fn collect_ancestor_task_ids<'a>(
    seeds: impl IntoIterator<Item = &'a str>,
    tasks_by_id: &TaskLookup<'_>,
) -> HashSet<TaskId> {
    let mut collected: HashSet<TaskId> = HashSet::new();
    let mut stack: Vec<String> = Vec::new();
    for seed in seeds {
        if collected.insert(seed.to_string()) {
            stack.push(seed.to_string());
        }
    }
    while let Some(id) = stack.pop() {
        let Some(task) = tasks_by_id.get(id.as_str()) else {
            continue;
        };
        for parent in task.parent_ids() {
            if tasks_by_id.contains_key(parent) && collected.insert(parent.to_string()) {
                stack.push(parent.to_string());
            }
        }
    }
    collected
}

/// A trader's task line plus every prerequisite from other traders.
pub fn collect_trader_line(trader_id: &str, tasks_by_id: &TaskLookup<'_>) -> HashSet<TaskId> {
    let seeds = tasks_by_id
        .values()
        .filter(|t| t.trader_id.as_deref() == Some(trader_id))
        .map(|t| t.id.as_str());
    collect_ancestor_task_ids(seeds, tasks_by_id)
}
