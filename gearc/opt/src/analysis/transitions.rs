use gearc_utils::{Error, GearResult};
use itertools::Itertools;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;

/// Edges of the state machine, collected while lowering state transitions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransitionGraph {
    pub max_state: u32,
    /// `(from, to)` pairs in the order they were lowered.
    pub edges: Vec<(u32, u32)>,
}

impl TransitionGraph {
    pub fn new(max_state: u32) -> Self {
        Self {
            max_state,
            edges: vec![],
        }
    }

    pub fn add(&mut self, from: u32, to: u32) {
        if !self.edges.contains(&(from, to)) {
            self.edges.push((from, to));
        }
    }

    /// States not reachable from the reset state, in increasing order.
    pub fn unreachable(&self) -> Vec<u32> {
        let mut graph = DiGraph::<(), u32>::from_edges(self.edges.iter().copied());
        while graph.node_count() <= self.max_state as usize {
            graph.add_node(());
        }
        let mut seen = vec![false; graph.node_count()];
        let mut dfs = Dfs::new(&graph, NodeIndex::new(0));
        while let Some(n) = dfs.next(&graph) {
            seen[n.index()] = true;
        }
        (0..=self.max_state).filter(|s| !seen[*s as usize]).collect()
    }

    /// Validate that all states are reachable in the transition graph.
    pub fn validate(&self) -> GearResult<()> {
        let unreachable = self.unreachable();
        if unreachable.is_empty() {
            Ok(())
        } else {
            Err(Error::malformed_structure(format!(
                "State transition graph has unreachable states: {}",
                unreachable.iter().join(", ")
            )))
        }
    }
}
