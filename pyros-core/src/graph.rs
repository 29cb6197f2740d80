/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Topic dependency ordering.
//!
//! [`DependencyGraph`] turns the registration-ordered list of Topics into an
//! execution order in which every Topic comes after all Topics it depends on.
//!
//! # Ordering policy
//! Kahn's algorithm with a min-heap keyed on registration index: whenever
//! several Topics are ready, the one registered first runs first.  The result
//! is therefore
//!
//! * a valid topological order (producers before consumers),
//! * deterministic across calls on identical input, and
//! * stable – mutually independent Topics keep their registration order.
//!
//! The graph works on indices only; names are resolved once in
//! [`DependencyGraph::from_names`].

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};

use tracing::debug;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Failure modes of dependency resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// At least one cycle exists.  Carries the indices of every node that
    /// could not be ordered, ascending.
    Cycle { unresolved: Vec<usize> },

    /// Node `node` names a dependency that is not in the graph.
    UnknownDependency { node: usize, dependency: String },
}

impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphError::Cycle { unresolved } => {
                write!(f, "dependency cycle among nodes {unresolved:?}")
            }
            GraphError::UnknownDependency { node, dependency } => {
                write!(f, "node {node} depends on unknown node '{dependency}'")
            }
        }
    }
}

impl std::error::Error for GraphError {}

// ── DependencyGraph ───────────────────────────────────────────────────────────

/// Directed dependency graph over `n` nodes identified by index.
///
/// `deps[i]` holds the nodes that `i` depends on.  A `BTreeSet` so duplicate
/// declarations collapse and iteration stays deterministic.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    deps: Vec<BTreeSet<usize>>,
}

impl DependencyGraph {
    /// Create a graph with `n` nodes and no edges.
    pub fn new(n: usize) -> Self {
        Self {
            deps: vec![BTreeSet::new(); n],
        }
    }

    /// Build a graph from `(name, dependency names)` pairs.
    ///
    /// Index `i` in the graph is entry `i` of `nodes`.  If a name appears more
    /// than once, dependencies on it resolve to its first occurrence; the
    /// duplicate itself is reported later by the scheduler's name check.
    ///
    /// # Errors
    /// [`GraphError::UnknownDependency`] if a dependency names no node.
    pub fn from_names<'a, I, D>(nodes: I) -> Result<Self, GraphError>
    where
        I: IntoIterator<Item = (&'a str, D)>,
        D: IntoIterator<Item = String>,
    {
        let entries: Vec<(&str, Vec<String>)> = nodes
            .into_iter()
            .map(|(name, deps)| (name, deps.into_iter().collect()))
            .collect();

        let mut index: HashMap<&str, usize> = HashMap::with_capacity(entries.len());
        for (i, (name, _)) in entries.iter().enumerate() {
            index.entry(*name).or_insert(i);
        }

        let mut graph = Self::new(entries.len());
        for (i, (_, deps)) in entries.iter().enumerate() {
            for dep in deps {
                let Some(&j) = index.get(dep.as_str()) else {
                    return Err(GraphError::UnknownDependency {
                        node: i,
                        dependency: dep.clone(),
                    });
                };
                graph.add_dependency(i, j);
            }
        }
        Ok(graph)
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.deps.len()
    }

    /// Returns `true` if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.deps.is_empty()
    }

    /// Declare that `node` depends on `on` (`on` must run first).
    ///
    /// # Panics
    /// If either index is out of range.
    pub fn add_dependency(&mut self, node: usize, on: usize) {
        assert!(on < self.deps.len(), "dependency index {on} out of range");
        self.deps[node].insert(on);
    }

    /// Compute the stable topological order.
    ///
    /// Returns the node indices in execution order.
    ///
    /// # Errors
    /// [`GraphError::Cycle`] if the graph is not acyclic.  A self-dependency
    /// counts as a cycle.
    pub fn topological_order(&self) -> Result<Vec<usize>, GraphError> {
        let n = self.deps.len();

        // in_degree[i] = number of unresolved dependencies of i
        let mut in_degree: Vec<usize> = self.deps.iter().map(BTreeSet::len).collect();
        // dependents[j] = nodes waiting on j
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, deps) in self.deps.iter().enumerate() {
            for &j in deps {
                dependents[j].push(i);
            }
        }

        // Min-heap on registration index → stable tie-breaking
        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, &d)| d == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(n);
        while let Some(Reverse(i)) = ready.pop() {
            order.push(i);
            for &k in &dependents[i] {
                in_degree[k] -= 1;
                if in_degree[k] == 0 {
                    ready.push(Reverse(k));
                }
            }
        }

        if order.len() != n {
            let unresolved: Vec<usize> = (0..n).filter(|&i| in_degree[i] > 0).collect();
            debug!(?unresolved, "dependency cycle detected");
            return Err(GraphError::Cycle { unresolved });
        }

        Ok(order)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(nodes: &[(&'static str, &[&str])]) -> Result<DependencyGraph, GraphError> {
        DependencyGraph::from_names(
            nodes
                .iter()
                .map(|(name, deps)| (*name, deps.iter().map(|d| d.to_string()))),
        )
    }

    /// Every node appears after all of its dependencies.
    fn assert_valid_order(g: &DependencyGraph, order: &[usize]) {
        assert_eq!(order.len(), g.len());
        let pos: HashMap<usize, usize> = order.iter().enumerate().map(|(p, &i)| (i, p)).collect();
        for (i, deps) in g.deps.iter().enumerate() {
            for d in deps {
                assert!(pos[d] < pos[&i], "node {i} ordered before its dependency {d}");
            }
        }
    }

    // ── Ordering ──────────────────────────────────────────────────────────────

    #[test]
    fn dependency_is_ordered_first() {
        // B depends on A, but B is registered first
        let g = graph(&[("B", &["A"]), ("A", &[])]).unwrap();
        assert_eq!(g.topological_order().unwrap(), vec![1, 0]);
    }

    #[test]
    fn independent_nodes_keep_registration_order() {
        let g = graph(&[("X", &[]), ("Y", &[])]).unwrap();
        assert_eq!(g.topological_order().unwrap(), vec![0, 1]);

        let g = graph(&[("Y", &[]), ("X", &[])]).unwrap();
        assert_eq!(g.topological_order().unwrap(), vec![0, 1]);
    }

    #[test]
    fn diamond_is_valid_and_stable() {
        //      a
        //    /   \
        //   b     c
        //    \   /
        //      d
        let g = graph(&[
            ("d", &["b", "c"]),
            ("c", &["a"]),
            ("b", &["a"]),
            ("a", &[]),
        ])
        .unwrap();
        let order = g.topological_order().unwrap();
        assert_valid_order(&g, &order);
        // a, then c before b (registration order), then d
        assert_eq!(order, vec![3, 1, 2, 0]);
    }

    #[test]
    fn order_is_deterministic() {
        let g = graph(&[
            ("e", &["a"]),
            ("a", &[]),
            ("f", &[]),
            ("b", &["f", "a"]),
            ("c", &["b"]),
        ])
        .unwrap();
        let reference = g.topological_order().unwrap();
        assert_valid_order(&g, &reference);
        for _ in 0..50 {
            assert_eq!(g.topological_order().unwrap(), reference);
        }
    }

    #[test]
    fn duplicate_dependency_counts_once() {
        let g = graph(&[("B", &["A", "A"]), ("A", &[])]).unwrap();
        assert_eq!(g.topological_order().unwrap(), vec![1, 0]);
    }

    #[test]
    fn empty_graph_orders_to_empty() {
        let g = DependencyGraph::new(0);
        assert!(g.is_empty());
        assert_eq!(g.topological_order().unwrap(), Vec::<usize>::new());
    }

    // ── Failures ──────────────────────────────────────────────────────────────

    #[test]
    fn two_node_cycle_is_detected() {
        let g = graph(&[("A", &["B"]), ("B", &["A"]), ("C", &[])]).unwrap();
        assert_eq!(
            g.topological_order().unwrap_err(),
            GraphError::Cycle {
                unresolved: vec![0, 1]
            }
        );
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let g = graph(&[("A", &["A"])]).unwrap();
        assert!(matches!(
            g.topological_order(),
            Err(GraphError::Cycle { .. })
        ));
    }

    #[test]
    fn downstream_of_cycle_is_unresolved() {
        // C depends on a cycle → also unresolvable
        let g = graph(&[("A", &["B"]), ("B", &["A"]), ("C", &["A"])]).unwrap();
        let GraphError::Cycle { unresolved } = g.topological_order().unwrap_err() else {
            panic!("expected cycle");
        };
        assert_eq!(unresolved, vec![0, 1, 2]);
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let err = graph(&[("A", &["ghost"])]).unwrap_err();
        assert_eq!(
            err,
            GraphError::UnknownDependency {
                node: 0,
                dependency: "ghost".into()
            }
        );
    }

    #[test]
    fn duplicate_names_resolve_to_first_occurrence() {
        let g = graph(&[("A", &[]), ("B", &["A"]), ("A", &[])]).unwrap();
        assert_eq!(g.topological_order().unwrap(), vec![0, 1, 2]);
    }
}
