//! Error types for the model store.

use thiserror::Error;

use crate::store::Version;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while configuring or mutating a model store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A symbol was used that the store was not built with.
    #[error("unknown symbol: {name}")]
    UnknownSymbol { name: String },

    /// The same symbol was registered twice.
    #[error("symbol registered twice: {name}")]
    DuplicateSymbol { name: String },

    /// A version id was not produced by this store.
    #[error("unknown version: {version}")]
    UnknownVersion { version: Version },

    /// A tuple did not match the arity of the symbol or query it was used with.
    #[error("arity mismatch for {name}: expected {expected}, got {actual}")]
    ArityMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// An interpretation handle or snapshot holds another value type than expected.
    #[error("interpretation does not hold values of symbol {name}")]
    SymbolTypeMismatch { name: String },

    /// A query referenced by id was never registered with the engine.
    #[error("unknown result set: {id}")]
    UnknownResultSet { id: usize },

    /// Cooperative cancellation was requested.
    #[error("operation cancelled")]
    Cancelled,
}

impl StoreError {
    /// Returns true if this error was raised by a cancellation point.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
