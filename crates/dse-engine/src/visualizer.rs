//! Observer boundary for the explored state space.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use dse_store::{Tuple, Version};
use indexmap::IndexSet;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;

use crate::objective::Fitness;

/// Receives every state, transition and solution the adapter produces.
pub trait ModelVisualizerAdapter: Send {
    /// A version was committed for the first time.
    fn add_state(&mut self, _version: Version, _fitness: &Fitness) {}

    /// The adapter moved from `from` to `to`. Backtracking is reported with
    /// a `backtrack(reason)` label and an empty tuple.
    fn add_transition(&mut self, from: Version, to: Version, label: &str, activation: &Tuple);

    /// `version` was recorded as a solution.
    fn add_solution(&mut self, version: Version);
}

/// A recorded state.
#[derive(Debug, Clone, PartialEq)]
pub struct StateNode {
    pub version: Version,
    pub fitness: Option<Fitness>,
}

/// A recorded transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionEdge {
    pub label: String,
    pub activation: Tuple,
}

/// The state space seen so far.
#[derive(Debug, Default)]
pub struct StateSpace {
    graph: StableDiGraph<StateNode, TransitionEdge>,
    index: HashMap<Version, NodeIndex>,
    solutions: IndexSet<Version>,
}

impl StateSpace {
    /// The recorded graph.
    pub fn graph(&self) -> &StableDiGraph<StateNode, TransitionEdge> {
        &self.graph
    }

    pub fn state_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn transition_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Solutions in discovery order.
    pub fn solutions(&self) -> &IndexSet<Version> {
        &self.solutions
    }

    /// Labels of every recorded transition from `from` to `to`.
    pub fn transitions_between(&self, from: Version, to: Version) -> Vec<&str> {
        let (Some(&a), Some(&b)) = (self.index.get(&from), self.index.get(&to)) else {
            return Vec::new();
        };
        self.graph
            .edges_connecting(a, b)
            .map(|edge| edge.weight().label.as_str())
            .collect()
    }

    fn node(&mut self, version: Version) -> NodeIndex {
        if let Some(&index) = self.index.get(&version) {
            return index;
        }
        let index = self.graph.add_node(StateNode {
            version,
            fitness: None,
        });
        self.index.insert(version, index);
        index
    }
}

/// Visualizer that records into a shared [`StateSpace`] without rendering.
///
/// Clones share the same recording, so a test can keep one handle and pass
/// another to the adapter.
#[derive(Debug, Clone, Default)]
pub struct StateSpaceRecorder {
    space: Arc<Mutex<StateSpace>>,
}

impl StateSpaceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the recording for inspection.
    pub fn state_space(&self) -> MutexGuard<'_, StateSpace> {
        match self.space.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl ModelVisualizerAdapter for StateSpaceRecorder {
    fn add_state(&mut self, version: Version, fitness: &Fitness) {
        let mut space = self.state_space();
        let index = space.node(version);
        if let Some(node) = space.graph.node_weight_mut(index) {
            node.fitness = Some(fitness.clone());
        }
    }

    fn add_transition(&mut self, from: Version, to: Version, label: &str, activation: &Tuple) {
        let mut space = self.state_space();
        let a = space.node(from);
        let b = space.node(to);
        space.graph.add_edge(
            a,
            b,
            TransitionEdge {
                label: label.to_string(),
                activation: activation.clone(),
            },
        );
    }

    fn add_solution(&mut self, version: Version) {
        let mut space = self.state_space();
        space.node(version);
        space.solutions.insert(version);
    }
}
