//! Design-space exploration over versioned graph models with rule-driven transitions.
//!
//! An exploration starts from one committed model version and repeatedly fires
//! transformation rules on it. Every firing commits a new version, so the
//! search can step back to any earlier state in constant time and try another
//! choice. A pluggable [`Strategy`] decides what to fire, when to backtrack and
//! when to stop; objectives score each reached state and decide which states
//! count as solutions.
//!
//! ## Core Concepts
//!
//! - **Action**: A compiled list of literals with a static variable-to-slot plan
//! - **TransformationRule**: A precondition query plus the action fired on each match
//! - **Activation**: A (rule, match) pair, one executable choice in one state
//! - **Objective**: Scores a state; hard objectives gate which states are solutions
//! - **Fitness**: The named objective values of one state
//! - **Trajectory**: The versions from the root to the current state
//!
//! ## The Search Loop
//!
//! ```text
//! root = commit()
//! loop {
//!     strategy picks a ∈ untraversed[current]
//!     fire(a) -> commit() -> trajectory.push(v)
//!     check global constraints, fitness, solution
//!     backtrack() -> restore(parent) -> trajectory.pop()
//! }
//! ```

pub mod action;
mod adapter;
mod config;
mod error;
mod exploration;
mod objective;
mod rule;
pub mod strategy;
mod visualizer;

pub use action::{
    Action, ActionBuilder, ActionLiteral, BoundAction, BoundActionLiteral, CheckLiteral,
    CreateObjectLiteral, DeleteObjectLiteral, PutLiteral, Variable,
};
pub use adapter::{DesignSpaceExplorationAdapter, ExplorationPhase};
pub use config::ExplorationConfig;
pub use error::{DseError, DseResult};
pub use exploration::{DesignSpaceExploration, DesignSpaceExplorationBuilder};
pub use objective::{
    AlwaysSatisfiedObjective, DepthObjective, Fitness, Objective, ObjectiveComparatorHelper,
    ObjectiveContext, ObjectiveDirection, QueryObjective,
};
pub use rule::{Activation, PreparedRule, TransformationRule};
pub use strategy::{
    BestFirstConfig, BestFirstStrategy, DepthFirstConfig, DepthFirstStrategy, Strategy,
};
pub use visualizer::{ModelVisualizerAdapter, StateNode, StateSpace, StateSpaceRecorder, TransitionEdge};
