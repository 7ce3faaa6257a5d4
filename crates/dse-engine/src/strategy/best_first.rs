use std::cmp::Ordering;

use dse_store::Version;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::{depth_limit_reached, solution_limit_reached, Strategy};
use crate::adapter::DesignSpaceExplorationAdapter;
use crate::error::DseResult;
use crate::objective::{Fitness, ObjectiveComparatorHelper};

/// Limits of a best-first search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BestFirstConfig {
    /// Do not expand states this deep. `None` is unbounded.
    pub max_depth: Option<usize>,

    /// Stop after this many solutions. `None` is unbounded.
    pub max_solutions: Option<usize>,

    /// Backtrack from a solution instead of expanding it.
    pub backtrack_from_solution: bool,

    /// Only descend into a child that is strictly better than its parent.
    pub only_better_first: bool,
}

impl Default for BestFirstConfig {
    fn default() -> Self {
        Self {
            max_depth: None,
            max_solutions: None,
            backtrack_from_solution: true,
            only_better_first: false,
        }
    }
}

impl BestFirstConfig {
    pub fn with_depth_limit(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_solution_limit(mut self, solutions: usize) -> Self {
        self.max_solutions = Some(solutions);
        self
    }

    pub fn continue_if_hard_objectives_fulfilled(mut self) -> Self {
        self.backtrack_from_solution = false;
        self
    }

    pub fn go_on_only_if_fitness_is_better(mut self) -> Self {
        self.only_better_first = true;
        self
    }
}

/// A state waiting to be expanded.
#[derive(Debug, Clone)]
struct FrontierEntry {
    trajectory: Vec<Version>,
    fitness: Fitness,
}

impl FrontierEntry {
    fn state(&self) -> Option<Version> {
        self.trajectory.last().copied()
    }
}

/// Greedy search that always expands the best known state.
///
/// Every valid, non-solution state reached is kept on a frontier together
/// with its fitness. The search keeps descending while each child is at
/// least as good as its parent, and otherwise jumps back to the best entry
/// of the frontier by restoring its trajectory. An entry leaves the
/// frontier when its last untraversed activation is fired.
#[derive(Debug, Clone, Default)]
pub struct BestFirstStrategy {
    config: BestFirstConfig,
}

impl BestFirstStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: BestFirstConfig) -> Self {
        Self { config }
    }

    pub fn with_depth_limit(self, depth: usize) -> Self {
        Self::with_config(self.config.with_depth_limit(depth))
    }

    pub fn with_solution_limit(self, solutions: usize) -> Self {
        Self::with_config(self.config.with_solution_limit(solutions))
    }

    pub fn continue_if_hard_objectives_fulfilled(self) -> Self {
        Self::with_config(self.config.continue_if_hard_objectives_fulfilled())
    }

    pub fn go_on_only_if_fitness_is_better(self) -> Self {
        Self::with_config(self.config.go_on_only_if_fitness_is_better())
    }

    pub fn config(&self) -> &BestFirstConfig {
        &self.config
    }
}

/// Index of the best entry. Ties go to the one queued first.
fn best_entry(frontier: &[FrontierEntry], comparator: &ObjectiveComparatorHelper) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (index, entry) in frontier.iter().enumerate() {
        match best {
            Some(current)
                if comparator.compare(&entry.fitness, &frontier[current].fitness)
                    != Ordering::Greater => {}
            _ => best = Some(index),
        }
    }
    best
}

fn remove_entry(frontier: &mut Vec<FrontierEntry>, state: Option<Version>) {
    if let Some(position) = frontier.iter().position(|entry| entry.state() == state) {
        frontier.remove(position);
    }
}

impl Strategy for BestFirstStrategy {
    fn explore(&mut self, adapter: &mut DesignSpaceExplorationAdapter) -> DseResult<()> {
        if self.config.max_solutions == Some(0) {
            return Ok(());
        }
        let comparator = adapter.objective_comparator_helper().clone();

        if !adapter.check_global_constraints()? {
            debug!("best_first_root_invalid");
            return Ok(());
        }
        let root_fitness = adapter.fitness()?;
        if root_fitness.satisfies_hard_objectives() {
            adapter.new_solution();
            if self.config.backtrack_from_solution
                || solution_limit_reached(adapter, self.config.max_solutions)
            {
                return Ok(());
            }
        }
        if depth_limit_reached(adapter, self.config.max_depth) {
            return Ok(());
        }

        let mut frontier = vec![FrontierEntry {
            trajectory: adapter.trajectory().to_vec(),
            fitness: root_fitness,
        }];
        let mut current: Option<FrontierEntry> = None;

        loop {
            let entry = match current.take() {
                Some(entry) => entry,
                None => {
                    let Some(best) = best_entry(&frontier, &comparator) else {
                        debug!(solutions = adapter.solutions().len(), "best_first_exhausted");
                        return Ok(());
                    };
                    let entry = frontier[best].clone();
                    adapter.restore_trajectory(entry.trajectory.clone())?;
                    trace!(state = ?entry.state(), fitness = %entry.fitness, "best_first_jump");
                    entry
                }
            };

            let activations = adapter.untraversed_activations()?;
            if activations.is_empty() {
                remove_entry(&mut frontier, entry.state());
                continue;
            }

            let last = activations.len() - 1;
            for (index, activation) in activations.iter().enumerate() {
                if index == last {
                    remove_entry(&mut frontier, entry.state());
                }
                if !adapter.fire_activation(activation)? {
                    continue;
                }
                if adapter.is_current_state_already_traversed() {
                    adapter.backtrack_with_reason("visited")?;
                    continue;
                }
                if !adapter.check_global_constraints()? {
                    adapter.backtrack_with_reason("global constraint")?;
                    continue;
                }

                let fitness = adapter.fitness()?;
                if fitness.satisfies_hard_objectives() {
                    adapter.new_solution();
                    if solution_limit_reached(adapter, self.config.max_solutions) {
                        return Ok(());
                    }
                    if self.config.backtrack_from_solution {
                        adapter.backtrack_with_reason("solution")?;
                        continue;
                    }
                }
                if depth_limit_reached(adapter, self.config.max_depth) {
                    adapter.backtrack_with_reason("depth limit")?;
                    continue;
                }

                let next = FrontierEntry {
                    trajectory: adapter.trajectory().to_vec(),
                    fitness,
                };
                frontier.push(next.clone());

                match comparator.compare(&entry.fitness, &next.fitness) {
                    Ordering::Less => {
                        current = Some(next);
                        break;
                    }
                    Ordering::Equal if !self.config.only_better_first => {
                        current = Some(next);
                        break;
                    }
                    Ordering::Equal => {
                        adapter.backtrack_with_reason("not better")?;
                    }
                    // The parent stays better; reselect from the frontier.
                    Ordering::Greater => break,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::objective::{DepthObjective, Objective};

    fn version(id: u64) -> Version {
        serde_json::from_str(&id.to_string()).unwrap()
    }

    fn entry(id: u64, cost: f64) -> FrontierEntry {
        let mut fitness = Fitness::new();
        fitness.insert("cost", cost);
        FrontierEntry {
            trajectory: vec![version(0), version(id)],
            fitness,
        }
    }

    #[test]
    fn test_best_entry_prefers_lower_cost() {
        let objectives: Vec<Arc<dyn Objective>> = vec![Arc::new(DepthObjective::new("cost"))];
        let comparator = ObjectiveComparatorHelper::new(&objectives);
        let frontier = vec![entry(1, 3.0), entry(2, 1.0), entry(3, 1.0)];
        assert_eq!(best_entry(&frontier, &comparator), Some(1));
        assert_eq!(best_entry(&[], &comparator), None);

        // Without objectives nothing dominates, so the first entry wins.
        let unordered = ObjectiveComparatorHelper::default();
        assert_eq!(best_entry(&frontier, &unordered), Some(0));
    }

    #[test]
    fn test_remove_entry_by_state() {
        let mut frontier = vec![entry(1, 3.0), entry(2, 1.0)];
        remove_entry(&mut frontier, Some(version(1)));
        assert_eq!(frontier.len(), 1);
        assert_eq!(frontier[0].state(), Some(version(2)));
        remove_entry(&mut frontier, Some(version(7)));
        assert_eq!(frontier.len(), 1);
    }

    #[test]
    fn test_config_builders() {
        let strategy = BestFirstStrategy::new()
            .with_depth_limit(4)
            .with_solution_limit(2)
            .go_on_only_if_fitness_is_better();
        assert_eq!(strategy.config().max_depth, Some(4));
        assert_eq!(strategy.config().max_solutions, Some(2));
        assert!(strategy.config().only_better_first);
        assert!(strategy.config().backtrack_from_solution);
    }
}
