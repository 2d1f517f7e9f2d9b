//! Topological ordering of pipeline graphs.
//!
//! Update ordering only ever concerns the upstream closure of the node being
//! updated; nodes outside it are neither planned nor executed.

use crate::core::error::{GraphError, GraphResult, NodeId};
use crate::graph::structure::PipelineGraph;
use std::collections::{HashMap, HashSet, VecDeque};

/// Analyzer for graph topology.
pub struct TopologyAnalyzer<'a> {
    graph: &'a PipelineGraph,
}

impl<'a> TopologyAnalyzer<'a> {
    pub fn new(graph: &'a PipelineGraph) -> Self {
        Self { graph }
    }

    /// Topological order of the whole graph (Kahn's algorithm).
    pub fn topological_sort(&self) -> GraphResult<Vec<NodeId>> {
        let all: Vec<NodeId> = self.graph.node_ids().collect();
        self.sort_subset(&all)
    }

    /// The terminal node and everything upstream of it, producers first.
    pub fn upstream_order(&self, terminal: NodeId) -> GraphResult<Vec<NodeId>> {
        if !self.graph.has_node(terminal) {
            return Err(GraphError::NodeNotFound(terminal));
        }
        let closure: HashSet<NodeId> = self
            .graph
            .get_upstream(terminal)
            .into_iter()
            .chain(std::iter::once(terminal))
            .collect();
        // keep graph insertion order so ties resolve the same way every time
        let subset: Vec<NodeId> = self
            .graph
            .node_ids()
            .filter(|id| closure.contains(id))
            .collect();
        self.sort_subset(&subset)
    }

    fn sort_subset(&self, subset: &[NodeId]) -> GraphResult<Vec<NodeId>> {
        let members: HashSet<NodeId> = subset.iter().copied().collect();
        let mut in_degree: HashMap<NodeId, usize> = subset.iter().map(|&id| (id, 0)).collect();
        let mut adjacency: HashMap<NodeId, Vec<NodeId>> = HashMap::new();

        for conn in self.graph.connections() {
            let (from, to) = (conn.from.node_id, conn.to.node_id);
            if members.contains(&from) && members.contains(&to) {
                adjacency.entry(from).or_default().push(to);
                *in_degree.entry(to).or_default() += 1;
            }
        }

        let mut queue: VecDeque<NodeId> = subset
            .iter()
            .copied()
            .filter(|id| in_degree.get(id) == Some(&0))
            .collect();
        let mut result = Vec::with_capacity(subset.len());

        while let Some(node) = queue.pop_front() {
            result.push(node);
            for &neighbor in adjacency.get(&node).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(&neighbor) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(neighbor);
                    }
                }
            }
        }

        // Nodes never released from the queue sit on a cycle
        if result.len() != subset.len() {
            let nodes: Vec<NodeId> = subset
                .iter()
                .copied()
                .filter(|id| in_degree.get(id).is_some_and(|&d| d > 0))
                .collect();
            return Err(GraphError::PipelineCycle { nodes });
        }

        Ok(result)
    }

    /// Check if the graph has any cycles.
    pub fn has_cycle(&self) -> bool {
        self.topological_sort().is_err()
    }

    /// Longest chain of producers above a node.
    pub fn node_depth(&self, node_id: NodeId) -> GraphResult<usize> {
        let order = self.upstream_order(node_id)?;
        let mut depth: HashMap<NodeId, usize> = HashMap::new();
        for id in &order {
            let d = self
                .graph
                .connections_to(*id)
                .filter_map(|c| depth.get(&c.from.node_id))
                .map(|d| d + 1)
                .max()
                .unwrap_or(0);
            depth.insert(*id, d);
        }
        Ok(depth.get(&node_id).copied().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::intensity::ShiftScale;

    #[test]
    fn test_upstream_order_excludes_unrelated_nodes() {
        let mut graph = PipelineGraph::new();
        let a = graph.add(ShiftScale::<u8>::new());
        let b = graph.add(ShiftScale::<u8>::new());
        let c = graph.add(ShiftScale::<u8>::new());
        let unrelated = graph.add(ShiftScale::<u8>::new());
        graph.connect(a, "output", b, "input").unwrap();
        graph.connect(b, "output", c, "input").unwrap();
        graph.connect(a, "output", unrelated, "input").unwrap();

        let analyzer = TopologyAnalyzer::new(&graph);
        assert_eq!(analyzer.upstream_order(c).unwrap(), vec![a, b, c]);
        assert_eq!(analyzer.upstream_order(b).unwrap(), vec![a, b]);
        assert_eq!(analyzer.node_depth(c).unwrap(), 2);
        assert!(!analyzer.has_cycle());
    }

    #[test]
    fn test_topological_sort_respects_edges() {
        let mut graph = PipelineGraph::new();
        let c = graph.add(ShiftScale::<u8>::new());
        let a = graph.add(ShiftScale::<u8>::new());
        let b = graph.add(ShiftScale::<u8>::new());
        graph.connect(a, "output", b, "input").unwrap();
        graph.connect(b, "output", c, "input").unwrap();

        let sorted = TopologyAnalyzer::new(&graph).topological_sort().unwrap();
        let pos = |id| sorted.iter().position(|&n| n == id).unwrap();
        assert!(pos(a) < pos(b));
        assert!(pos(b) < pos(c));
    }

    #[test]
    fn test_unknown_terminal() {
        let graph = PipelineGraph::new();
        assert!(matches!(
            TopologyAnalyzer::new(&graph).upstream_order(NodeId::new()),
            Err(GraphError::NodeNotFound(_))
        ));
    }
}
