//! A deterministic dependency graph with Kahn-style topological sort.
//!
//! Used for setup task ordering, per-task action ordering, and material
//! evaluation ordering. Ties are always broken by declaration order: among
//! the nodes whose predecessors have all been emitted, the one added first
//! is emitted next. The result is therefore a pure function of the node
//! declaration order and the edge set.

use std::collections::BTreeSet;
use std::fmt;
use std::hash::Hash;

use indexmap::{IndexMap, IndexSet};

/// The graph contains a cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CycleError<K> {
    /// Nodes that lie on a cycle or between cycles, in declaration order.
    pub members: Vec<K>,
}

impl<K: fmt::Debug> fmt::Display for CycleError<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dependency cycle among {:?}", self.members)
    }
}

impl<K: fmt::Debug> std::error::Error for CycleError<K> {}

/// Directed graph over keys of type `K`, with edges meaning
/// "`before` must come before `after`".
#[derive(Clone, Debug)]
pub struct DependencyGraph<K> {
    nodes: IndexMap<K, IndexSet<usize>>,
}

impl<K: Clone + Eq + Hash> Default for DependencyGraph<K> {
    fn default() -> Self {
        Self {
            nodes: IndexMap::new(),
        }
    }
}

impl<K: Clone + Eq + Hash> DependencyGraph<K> {
    /// An empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node. Adding an existing node keeps its original position.
    pub fn add_node(&mut self, key: K) -> usize {
        let entry = self.nodes.entry(key);
        let idx = entry.index();
        entry.or_default();
        idx
    }

    /// Add an edge; both endpoints are added as nodes if absent.
    /// Self-edges are recorded and reported as a cycle by [`sort`](Self::sort).
    pub fn add_edge(&mut self, before: K, after: K) {
        let b = self.add_node(before);
        let a = self.add_node(after);
        if let Some((_, succ)) = self.nodes.get_index_mut(b) {
            succ.insert(a);
        }
    }

    /// Returns `true` if the node is present.
    pub fn contains(&self, key: &K) -> bool {
        self.nodes.contains_key(key)
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in declaration order.
    pub fn nodes(&self) -> impl Iterator<Item = &K> {
        self.nodes.keys()
    }

    /// Topological order with declaration-order tie-break.
    pub fn sort(&self) -> Result<Vec<K>, CycleError<K>> {
        let n = self.nodes.len();
        let mut in_degree = vec![0usize; n];
        for succ in self.nodes.values() {
            for &s in succ {
                in_degree[s] += 1;
            }
        }

        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        let mut emitted = vec![false; n];

        while let Some(i) = ready.pop_first() {
            emitted[i] = true;
            order.push(i);
            if let Some((_, succ)) = self.nodes.get_index(i) {
                for &s in succ {
                    in_degree[s] -= 1;
                    if in_degree[s] == 0 {
                        ready.insert(s);
                    }
                }
            }
        }

        if order.len() == n {
            return Ok(order.into_iter().map(|i| self.key(i)).collect());
        }

        Err(CycleError {
            members: self.cycle_members(&emitted),
        })
    }

    fn key(&self, i: usize) -> K {
        self.nodes
            .get_index(i)
            .map(|(k, _)| k.clone())
            .unwrap_or_else(|| unreachable!("node index {i} out of range"))
    }

    // The nodes Kahn could not emit are cycles plus anything downstream of
    // them. Repeatedly pruning nodes with no remaining successor strips the
    // downstream tail and leaves only the nodes that actually lie on, or
    // between, cycles.
    fn cycle_members(&self, emitted: &[bool]) -> Vec<K> {
        let mut alive: Vec<bool> = emitted.iter().map(|e| !e).collect();
        loop {
            let mut changed = false;
            for (i, (_, succ)) in self.nodes.iter().enumerate() {
                if alive[i] && !succ.iter().any(|&s| alive[s]) {
                    alive[i] = false;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        (0..alive.len())
            .filter(|&i| alive[i])
            .map(|i| self.key(i))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn unordered_nodes_keep_declaration_order() {
        let mut g = DependencyGraph::new();
        for k in ["c", "a", "b"] {
            g.add_node(k);
        }
        assert_eq!(g.sort().unwrap(), vec!["c", "a", "b"]);
    }

    #[test]
    fn edges_override_declaration_order() {
        let mut g = DependencyGraph::new();
        g.add_node("a");
        g.add_node("b");
        g.add_node("c");
        g.add_edge("c", "a");
        assert_eq!(g.sort().unwrap(), vec!["b", "c", "a"]);
    }

    #[test]
    fn smallest_ready_index_wins() {
        // d depends on a; b and c are free. After emitting a, both b and d
        // are ready; b was declared first.
        let mut g = DependencyGraph::new();
        for k in ["a", "b", "c", "d"] {
            g.add_node(k);
        }
        g.add_edge("a", "d");
        assert_eq!(g.sort().unwrap(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn cycle_reports_only_cycle_members() {
        let mut g = DependencyGraph::new();
        g.add_node("free");
        g.add_edge("x", "y");
        g.add_edge("y", "z");
        g.add_edge("z", "x");
        g.add_edge("z", "tail");
        match g.sort() {
            Err(CycleError { members }) => assert_eq!(members, vec!["x", "y", "z"]),
            other => panic!("expected CycleError, got {other:?}"),
        }
    }

    #[test]
    fn self_edge_is_a_cycle() {
        let mut g = DependencyGraph::new();
        g.add_edge("m", "m");
        assert_eq!(
            g.sort(),
            Err(CycleError {
                members: vec!["m"]
            })
        );
    }

    fn arb_dag() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
        (1usize..12).prop_flat_map(|n| {
            let edges = prop::collection::vec((0..n, 0..n), 0..24).prop_map(|pairs| {
                pairs
                    .into_iter()
                    .filter(|(a, b)| a != b)
                    .map(|(a, b)| (a.min(b), a.max(b)))
                    .collect::<Vec<_>>()
            });
            (Just(n), edges)
        })
    }

    fn build(n: usize, edges: &[(usize, usize)], perm: bool) -> DependencyGraph<usize> {
        let mut g = DependencyGraph::new();
        // Declaration order is reversed in the `perm` case so edge
        // direction and declaration order disagree.
        let order: Vec<usize> = if perm {
            (0..n).rev().collect()
        } else {
            (0..n).collect()
        };
        for i in order {
            g.add_node(i);
        }
        for &(a, b) in edges {
            g.add_edge(a, b);
        }
        g
    }

    proptest! {
        #[test]
        fn sort_respects_every_edge((n, edges) in arb_dag(), perm in any::<bool>()) {
            let g = build(n, &edges, perm);
            let order = g.sort().unwrap();
            prop_assert_eq!(order.len(), n);
            let pos: Vec<usize> = {
                let mut p = vec![0; n];
                for (i, &k) in order.iter().enumerate() {
                    p[k] = i;
                }
                p
            };
            for &(a, b) in &edges {
                prop_assert!(pos[a] < pos[b]);
            }
        }

        #[test]
        fn sort_is_deterministic((n, edges) in arb_dag(), perm in any::<bool>()) {
            let first = build(n, &edges, perm).sort().unwrap();
            let second = build(n, &edges, perm).sort().unwrap();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn back_edge_creates_cycle((n, edges) in arb_dag()) {
            prop_assume!(!edges.is_empty());
            let mut g = build(n, &edges, false);
            let (a, b) = edges[0];
            g.add_edge(b, a);
            let err = g.sort().unwrap_err();
            prop_assert!(err.members.contains(&a));
            prop_assert!(err.members.contains(&b));
        }
    }
}
