//! Search strategies.
//!
//! A strategy decides which activation to fire and when to backtrack or stop.
//! It drives the adapter through its public operations only and runs until it
//! returns; the adapter never stops a strategy on its own.

mod best_first;
mod depth_first;

pub use best_first::{BestFirstConfig, BestFirstStrategy};
pub use depth_first::{DepthFirstConfig, DepthFirstStrategy};

use crate::adapter::DesignSpaceExplorationAdapter;
use crate::error::DseResult;

/// Pluggable search policy.
pub trait Strategy: Send {
    /// Called once after the root is committed, before [`Strategy::explore`].
    fn init_strategy(&mut self, _adapter: &mut DesignSpaceExplorationAdapter) -> DseResult<()> {
        Ok(())
    }

    /// Run the search.
    fn explore(&mut self, adapter: &mut DesignSpaceExplorationAdapter) -> DseResult<()>;
}

impl<F> Strategy for F
where
    F: FnMut(&mut DesignSpaceExplorationAdapter) -> DseResult<()> + Send,
{
    fn explore(&mut self, adapter: &mut DesignSpaceExplorationAdapter) -> DseResult<()> {
        self(adapter)
    }
}

// Termination checks shared by the bundled strategies.
fn solution_limit_reached(adapter: &DesignSpaceExplorationAdapter, limit: Option<usize>) -> bool {
    limit.is_some_and(|limit| adapter.solutions().len() >= limit)
}

fn depth_limit_reached(adapter: &DesignSpaceExplorationAdapter, limit: Option<usize>) -> bool {
    limit.is_some_and(|limit| adapter.depth() >= limit)
}
