//! Error types for the exploration engine.

use dse_store::StoreError;
use thiserror::Error;

use crate::adapter::ExplorationPhase;

/// Result type alias for exploration operations.
pub type DseResult<T> = Result<T, DseError>;

/// Errors that can occur while compiling rules or exploring a design space.
#[derive(Debug, Error)]
pub enum DseError {
    /// Error raised by the underlying model store.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// An action literal reads a variable that no earlier literal produced.
    #[error("literal {literal} reads unbound variable {variable}")]
    UnboundVariable { literal: usize, variable: String },

    /// An action literal lists the same output variable twice.
    #[error("literal {literal} produces {variable} more than once")]
    DuplicateOutputVariable { literal: usize, variable: String },

    /// An action literal produces a variable that is already bound.
    #[error("literal {literal} produces already bound variable {variable}")]
    VariableAlreadyBound { literal: usize, variable: String },

    /// A rule parameter list names the same variable twice.
    #[error("duplicate parameter {variable}")]
    DuplicateParameter { variable: String },

    /// Two transformation rules share a name.
    #[error("transformation rule registered twice: {name}")]
    DuplicateRule { name: String },

    /// A tuple or precondition does not match the arity of the rule or literal it is used with.
    #[error("arity mismatch for {name}: expected {expected}, got {actual}")]
    ArityMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// A bound action was fired while a previous firing had not completed.
    #[error("bound action fired while already firing")]
    ReentrantFire,

    /// The exploration was built without a strategy.
    #[error("no strategy configured")]
    MissingStrategy,

    /// An adapter operation was called in a phase that does not allow it.
    #[error("{operation} is not allowed while the adapter is {phase:?}")]
    InvalidPhase {
        operation: &'static str,
        phase: ExplorationPhase,
    },

    /// Every node id of the `u32` counter was allocated.
    #[error("node ids exhausted")]
    NodeIdsExhausted,

    /// A trajectory must contain at least the root version.
    #[error("trajectory is empty")]
    EmptyTrajectory,

    /// Configuration (de)serialization error.
    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

impl DseError {
    /// Returns true if the error was raised by a cancellation point.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Store(error) if error.is_cancelled())
    }

    /// Returns true for errors detected while setting up an exploration.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Store(
                StoreError::UnknownSymbol { .. }
                    | StoreError::DuplicateSymbol { .. }
                    | StoreError::UnknownVersion { .. }
            ) | Self::UnboundVariable { .. }
                | Self::DuplicateOutputVariable { .. }
                | Self::VariableAlreadyBound { .. }
                | Self::DuplicateParameter { .. }
                | Self::DuplicateRule { .. }
                | Self::ArityMismatch { .. }
                | Self::MissingStrategy
                | Self::Config(_)
        )
    }
}
