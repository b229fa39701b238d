//! Dependency graph between declared indicators.
//!
//! # Edge Direction
//!
//! ```text
//! A → B  means  "B depends on A"  (A is a precedent of B)
//! ```
//!
//! This makes "what is affected if A is missing?" trivial: follow outgoing edges.

use rustc_hash::{FxHashMap, FxHashSet};

/// Position of an indicator in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndicatorId(pub usize);

/// Bidirectional adjacency over indicators.
///
/// # Invariants
///
/// 1. **Bidirectional consistency:** If A ∈ preds[B] then B ∈ succs[A], and vice versa.
/// 2. **No dangling entries:** Empty sets are removed, not stored.
#[derive(Default, Debug, Clone)]
pub struct DepGraph {
    /// B -> {A1, A2, ...}: indicators B reads.
    preds: FxHashMap<IndicatorId, FxHashSet<IndicatorId>>,
    /// A -> {B1, B2, ...}: indicators that read A.
    succs: FxHashMap<IndicatorId, FxHashSet<IndicatorId>>,
}

impl DepGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indicators that depend directly on `id`, sorted.
    pub fn dependents(&self, id: IndicatorId) -> Vec<IndicatorId> {
        sorted(self.succs.get(&id))
    }

    /// Every indicator reachable from `id` along dependent edges, sorted.
    pub fn downstream(&self, id: IndicatorId) -> Vec<IndicatorId> {
        let mut visited = FxHashSet::default();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(deps) = self.succs.get(&current) {
                for &dep in deps {
                    if visited.insert(dep) {
                        stack.push(dep);
                    }
                }
            }
        }
        visited.remove(&id);
        let mut out: Vec<IndicatorId> = visited.into_iter().collect();
        out.sort();
        out
    }

    /// Replace all edges into `id` atomically.
    pub fn replace_edges(&mut self, id: IndicatorId, new_preds: FxHashSet<IndicatorId>) {
        if let Some(old_preds) = self.preds.remove(&id) {
            for pred in old_preds {
                if let Some(deps) = self.succs.get_mut(&pred) {
                    deps.remove(&id);
                    if deps.is_empty() {
                        self.succs.remove(&pred);
                    }
                }
            }
        }

        if new_preds.is_empty() {
            return;
        }

        for pred in &new_preds {
            self.succs.entry(*pred).or_default().insert(id);
        }
        self.preds.insert(id, new_preds);
    }

    /// Topological order of `count` indicators: precedents before dependents.
    ///
    /// Kahn's algorithm; among ready indicators the smallest `rank` is taken
    /// first, so the order is deterministic. Returns the unordered remainder
    /// if the graph has a cycle.
    pub fn topo_order<K, F>(&self, count: usize, rank: F) -> Result<Vec<IndicatorId>, Vec<IndicatorId>>
    where
        K: Ord,
        F: Fn(IndicatorId) -> K,
    {
        let mut in_degree: Vec<usize> = (0..count)
            .map(|i| self.preds.get(&IndicatorId(i)).map_or(0, |p| p.len()))
            .collect();

        let mut ready: Vec<IndicatorId> = (0..count)
            .filter(|&i| in_degree[i] == 0)
            .map(IndicatorId)
            .collect();
        let mut result = Vec::with_capacity(count);

        while !ready.is_empty() {
            // Pick the smallest rank among ready indicators
            let mut best = 0;
            for i in 1..ready.len() {
                if rank(ready[i]) < rank(ready[best]) {
                    best = i;
                }
            }
            let id = ready.swap_remove(best);
            result.push(id);

            for dep in self.dependents(id) {
                if let Some(deg) = in_degree.get_mut(dep.0) {
                    *deg = deg.saturating_sub(1);
                    if *deg == 0 {
                        ready.push(dep);
                    }
                }
            }
        }

        if result.len() < count {
            let placed: FxHashSet<IndicatorId> = result.iter().copied().collect();
            let remainder = (0..count)
                .map(IndicatorId)
                .filter(|id| !placed.contains(id))
                .collect();
            return Err(remainder);
        }

        Ok(result)
    }

    /// Check all invariants. Panics if any are violated.
    #[cfg(test)]
    pub fn assert_consistent(&self) {
        for (id, preds) in &self.preds {
            assert!(!preds.is_empty(), "empty pred set stored for {id:?}");
            for pred in preds {
                assert!(
                    self.succs.get(pred).map_or(false, |s| s.contains(id)),
                    "missing succ edge {pred:?} -> {id:?}"
                );
            }
        }
        for (id, succs) in &self.succs {
            assert!(!succs.is_empty(), "empty succ set stored for {id:?}");
            for succ in succs {
                assert!(
                    self.preds.get(succ).map_or(false, |p| p.contains(id)),
                    "missing pred edge {succ:?} <- {id:?}"
                );
            }
        }
    }
}

fn sorted(set: Option<&FxHashSet<IndicatorId>>) -> Vec<IndicatorId> {
    let mut out: Vec<IndicatorId> = set.into_iter().flat_map(|s| s.iter().copied()).collect();
    out.sort();
    out
}
