//! Versioned in-memory graph models with O(1) snapshots and restores.
//!
//! A [`ModelStore`] fixes a schema of [`Symbol`]s and owns a registry of
//! committed versions. Each [`Model`] is a single-threaded working copy that
//! can commit its content into a new [`Version`] or restore any version the
//! store has seen, including versions committed by other models.
//!
//! ## Core Concepts
//!
//! - **Tuple**: Fixed-arity vector of node ids, used as an interpretation key
//! - **Symbol**: Relation schema with a name, arity and typed default value
//! - **Interpretation**: A model's map from tuples to one symbol's values
//! - **Version**: Opaque id of an immutable committed snapshot
//! - **Query**: Named pattern whose matches an engine keeps as a result set
//!
//! ## Snapshot Model
//!
//! ```text
//! Model.commit()    -> Version   // share structure with the previous snapshot
//! Model.restore(v)               // swap in the snapshot, notify one change per differing key
//! ```
//!
//! Every store registers an arity-0 `MODEL_SIZE` counter first, which
//! higher layers use to allocate fresh node ids.

mod cancellation;
mod error;
mod interpretation;
mod model;
mod query;
mod store;
mod symbol;
mod tuple;

pub use cancellation::CancellationToken;
pub use error::{StoreError, StoreResult};
pub use interpretation::{Change, DiffEntry, Interpretation};
pub use model::{ListenerId, Model, ModelListener};
pub use query::{Query, QueryEngine, RecomputingQueryEngine, ResultSetId};
pub use store::{ModelStore, ModelStoreBuilder, Version, NODE_COUNT_SYMBOL};
pub use symbol::{AnySymbol, Symbol, SymbolKey, Value};
pub use tuple::{NodeId, Tuple};
