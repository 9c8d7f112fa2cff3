//! # Dependency Analysis
//!
//! Orders the nodes of a graph so that every producer comes before its
//! consumers. Value links and execution links both count as dependencies.
//!
//! Ordering uses Kahn's algorithm with a min-heap of ready nodes, so among
//! nodes that are ready at the same time the lowest id always goes first and
//! the result depends only on graph content. Nodes that can never become ready
//! (cycle members and everything downstream of a cycle) are appended in
//! ascending id order. Cycle membership comes from petgraph's Kosaraju
//! strongly-connected-components pass over those leftover nodes; neither pass
//! recurses, so deep or cyclic graphs cannot overflow the stack.

use crate::graph::{GraphDescription, NodeId};
use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DependencyOrder {
    /// Every node exactly once: topologically sorted prefix, then the
    /// unorderable remainder by ascending id.
    pub order: Vec<NodeId>,
    /// Length of the topologically sorted prefix of `order`.
    pub sorted: usize,
    /// Nodes that sit on a dependency cycle.
    pub cyclic: BTreeSet<NodeId>,
}

impl DependencyOrder {
    pub fn is_acyclic(&self) -> bool {
        self.sorted == self.order.len()
    }

    pub fn is_cyclic(&self, node: NodeId) -> bool {
        self.cyclic.contains(&node)
    }

    /// The topologically sorted prefix.
    pub fn sorted(&self) -> &[NodeId] {
        &self.order[..self.sorted]
    }
}

/// Adjacency over links whose endpoints both exist.
fn edges(graph: &GraphDescription) -> BTreeMap<NodeId, Vec<NodeId>> {
    let mut successors: BTreeMap<NodeId, Vec<NodeId>> =
        graph.nodes().map(|node| (node.id(), Vec::new())).collect();

    for link in graph.links() {
        if !graph.contains_node(link.to_node) {
            continue;
        }
        if let Some(targets) = successors.get_mut(&link.from_node) {
            targets.push(link.to_node);
        }
    }

    successors
}

pub fn dependency_order(graph: &GraphDescription) -> DependencyOrder {
    let successors = edges(graph);

    let mut in_degree: BTreeMap<NodeId, usize> =
        successors.keys().map(|&id| (id, 0)).collect();
    for targets in successors.values() {
        for target in targets {
            if let Some(degree) = in_degree.get_mut(target) {
                *degree += 1;
            }
        }
    }

    let mut ready: BinaryHeap<Reverse<NodeId>> = in_degree
        .iter()
        .filter(|&(_, &degree)| degree == 0)
        .map(|(&id, _)| Reverse(id))
        .collect();

    let mut order = Vec::with_capacity(successors.len());
    while let Some(Reverse(id)) = ready.pop() {
        order.push(id);
        for target in successors.get(&id).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(target) {
                *degree -= 1;
                if *degree == 0 {
                    ready.push(Reverse(*target));
                }
            }
        }
    }

    let sorted = order.len();
    let placed: BTreeSet<NodeId> = order.iter().copied().collect();
    let remainder: BTreeSet<NodeId> = successors
        .keys()
        .copied()
        .filter(|id| !placed.contains(id))
        .collect();

    let cyclic = if remainder.is_empty() {
        BTreeSet::new()
    } else {
        tracing::debug!("[NGC] {} node(s) could not be ordered", remainder.len());
        cycle_members(&successors, &remainder)
    };

    order.extend(remainder.iter().copied());

    DependencyOrder {
        order,
        sorted,
        cyclic,
    }
}

/// Nodes in a strongly connected component of size > 1, or with a self-loop,
/// restricted to `candidates`.
fn cycle_members(
    successors: &BTreeMap<NodeId, Vec<NodeId>>,
    candidates: &BTreeSet<NodeId>,
) -> BTreeSet<NodeId> {
    let mut graph: DiGraph<NodeId, ()> = DiGraph::with_capacity(candidates.len(), candidates.len());
    let indices: BTreeMap<NodeId, NodeIndex> = candidates
        .iter()
        .map(|&id| (id, graph.add_node(id)))
        .collect();

    for (id, &from) in &indices {
        for target in successors.get(id).into_iter().flatten() {
            if let Some(&to) = indices.get(target) {
                graph.add_edge(from, to, ());
            }
        }
    }

    kosaraju_scc(&graph)
        .into_iter()
        .filter(|component| match component.as_slice() {
            [single] => graph.contains_edge(*single, *single),
            _ => true,
        })
        .flatten()
        .map(|index| graph[index])
        .collect()
}
