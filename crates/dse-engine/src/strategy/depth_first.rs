use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{depth_limit_reached, solution_limit_reached, Strategy};
use crate::adapter::DesignSpaceExplorationAdapter;
use crate::error::DseResult;

/// Limits of a depth-first search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthFirstConfig {
    /// Do not fire from states this deep. `None` is unbounded.
    pub max_depth: Option<usize>,

    /// Stop after this many solutions. `None` is unbounded.
    pub max_solutions: Option<usize>,

    /// Backtrack from a solution instead of searching below it.
    pub backtrack_from_solution: bool,
}

impl Default for DepthFirstConfig {
    fn default() -> Self {
        Self {
            max_depth: None,
            max_solutions: None,
            backtrack_from_solution: true,
        }
    }
}

impl DepthFirstConfig {
    pub fn with_depth_limit(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_solution_limit(mut self, solutions: usize) -> Self {
        self.max_solutions = Some(solutions);
        self
    }

    /// Keep expanding solutions.
    pub fn continue_if_hard_objectives_fulfilled(mut self) -> Self {
        self.backtrack_from_solution = false;
        self
    }
}

/// Randomized exhaustive depth-first search with backtracking.
///
/// From every state it fires a random untraversed activation, and backtracks
/// when a state violates a global constraint, is a solution, hits the depth
/// limit or has no untraversed activation left. It terminates when the root
/// is exhausted or the solution limit is reached. Without a depth limit it
/// only terminates on finite state spaces.
#[derive(Debug, Clone, Default)]
pub struct DepthFirstStrategy {
    config: DepthFirstConfig,
}

impl DepthFirstStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: DepthFirstConfig) -> Self {
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

    pub fn config(&self) -> &DepthFirstConfig {
        &self.config
    }

    /// Evaluate the state just reached. Returns the reason to leave it, if any.
    fn evaluate(&self, adapter: &mut DesignSpaceExplorationAdapter) -> DseResult<Option<&'static str>> {
        if !adapter.check_global_constraints()? {
            return Ok(Some("global constraint"));
        }
        if adapter.fitness()?.satisfies_hard_objectives() {
            adapter.new_solution();
            if self.config.backtrack_from_solution {
                return Ok(Some("solution"));
            }
        }
        if depth_limit_reached(adapter, self.config.max_depth) {
            return Ok(Some("depth limit"));
        }
        Ok(None)
    }
}

impl Strategy for DepthFirstStrategy {
    fn explore(&mut self, adapter: &mut DesignSpaceExplorationAdapter) -> DseResult<()> {
        if self.config.max_solutions == Some(0) {
            return Ok(());
        }
        let mut reached_new_state = true;
        loop {
            if reached_new_state {
                reached_new_state = false;
                let leave = self.evaluate(adapter)?;
                if solution_limit_reached(adapter, self.config.max_solutions) {
                    debug!(solutions = adapter.solutions().len(), "depth_first_solution_limit");
                    return Ok(());
                }
                if let Some(reason) = leave {
                    if !adapter.backtrack_with_reason(reason)? {
                        return Ok(());
                    }
                    continue;
                }
            }

            if adapter.fire_random_activation()? {
                if adapter.is_current_state_already_traversed() {
                    adapter.backtrack_with_reason("visited")?;
                } else {
                    reached_new_state = true;
                }
                continue;
            }

            // A guard may have rejected the chosen activation; retry while any is left.
            if adapter.untraversed_activations()?.is_empty()
                && !adapter.backtrack_with_reason("exhausted")?
            {
                debug!(solutions = adapter.solutions().len(), "depth_first_exhausted");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_partial_json() {
        let config: DepthFirstConfig = serde_json::from_str(r#"{ "max_depth": 3 }"#).unwrap();
        assert_eq!(config, DepthFirstConfig::default().with_depth_limit(3));
        assert!(config.backtrack_from_solution);
    }

    #[test]
    fn test_strategy_builders() {
        let strategy = DepthFirstStrategy::new()
            .with_solution_limit(5)
            .continue_if_hard_objectives_fulfilled();
        assert_eq!(strategy.config().max_solutions, Some(5));
        assert_eq!(strategy.config().max_depth, None);
        assert!(!strategy.config().backtrack_from_solution);
    }
}
