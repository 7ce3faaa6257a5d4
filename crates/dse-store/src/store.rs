//! Version registry shared by every model of one schema.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cancellation::CancellationToken;
use crate::error::{StoreError, StoreResult};
use crate::interpretation::Snapshot;
use crate::model::Model;
use crate::symbol::{AnySymbol, Symbol, SymbolKey};

/// Name of the scalar symbol that counts allocated nodes.
pub const NODE_COUNT_SYMBOL: &str = "MODEL_SIZE";

/// Opaque id of a committed model state.
///
/// Ids are allocated by the store in commit order and are only meaningful for
/// the store that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    /// Raw sequence number.
    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Committed content of every interpretation, in slot order.
pub(crate) struct ModelSnapshot {
    pub(crate) interpretations: Vec<Snapshot>,
}

struct VersionRegistry {
    next: u64,
    snapshots: HashMap<Version, Arc<ModelSnapshot>>,
}

struct StoreInner {
    symbols: Vec<AnySymbol>,
    slots: HashMap<SymbolKey, usize>,
    node_count: Symbol<u32>,
    initial: Arc<ModelSnapshot>,
    versions: RwLock<VersionRegistry>,
    cancellation: CancellationToken,
}

/// Immutable schema plus the registry of committed versions.
///
/// Cloning is cheap and every clone refers to the same registry, so models
/// created on different threads can restore each other's versions.
#[derive(Clone)]
pub struct ModelStore {
    inner: Arc<StoreInner>,
}

impl ModelStore {
    /// Start configuring a store.
    pub fn builder() -> ModelStoreBuilder {
        ModelStoreBuilder::default()
    }

    /// Registered symbols in slot order. The node-count symbol is always first.
    pub fn symbols(&self) -> &[AnySymbol] {
        &self.inner.symbols
    }

    /// The arity-0 counter used to allocate fresh node ids.
    pub fn node_count_symbol(&self) -> &Symbol<u32> {
        &self.inner.node_count
    }

    /// Whether `symbol` is part of this store's schema.
    pub fn contains_symbol(&self, symbol: impl Into<AnySymbol>) -> bool {
        self.inner.slots.contains_key(&symbol.into().key())
    }

    /// Version of the all-default model every store starts from.
    pub fn initial_version(&self) -> Version {
        Version(0)
    }

    /// Create a model positioned at the initial version.
    pub fn create_model(&self) -> Model {
        Model::initial(
            self.clone(),
            self.initial_version(),
            Arc::clone(&self.inner.initial),
        )
    }

    /// Create a model positioned at a previously committed version.
    pub fn create_model_at(&self, version: Version) -> StoreResult<Model> {
        let snapshot = self.snapshot(version)?;
        Model::from_snapshot(self.clone(), version, snapshot)
    }

    /// Whether `version` was committed through this store.
    pub fn contains_version(&self, version: Version) -> bool {
        self.read_versions().snapshots.contains_key(&version)
    }

    /// Number of distinct versions, including the initial one.
    pub fn version_count(&self) -> usize {
        self.read_versions().snapshots.len()
    }

    /// Token polled by every model of this store.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.inner.cancellation
    }

    /// Returns true if both handles refer to the same store.
    pub fn same_store(&self, other: &ModelStore) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn slot_of(&self, key: SymbolKey) -> Option<usize> {
        self.inner.slots.get(&key).copied()
    }

    pub(crate) fn snapshot(&self, version: Version) -> StoreResult<Arc<ModelSnapshot>> {
        self.read_versions()
            .snapshots
            .get(&version)
            .cloned()
            .ok_or(StoreError::UnknownVersion { version })
    }

    pub(crate) fn publish(&self, snapshot: Arc<ModelSnapshot>) -> Version {
        let mut versions = self.write_versions();
        let version = Version(versions.next);
        versions.next += 1;
        versions.snapshots.insert(version, snapshot);
        version
    }

    fn read_versions(&self) -> RwLockReadGuard<'_, VersionRegistry> {
        match self.inner.versions.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_versions(&self) -> RwLockWriteGuard<'_, VersionRegistry> {
        match self.inner.versions.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl fmt::Debug for ModelStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelStore")
            .field("symbols", &self.inner.symbols)
            .field("versions", &self.version_count())
            .finish()
    }
}

/// Builder for [`ModelStore`]. Consumed by [`ModelStoreBuilder::build`].
#[derive(Debug, Default)]
pub struct ModelStoreBuilder {
    symbols: Vec<AnySymbol>,
    cancellation: Option<CancellationToken>,
}

impl ModelStoreBuilder {
    /// Register a symbol.
    pub fn symbol(mut self, symbol: impl Into<AnySymbol>) -> Self {
        self.symbols.push(symbol.into());
        self
    }

    /// Register several symbols.
    pub fn symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<AnySymbol>,
    {
        self.symbols.extend(symbols.into_iter().map(Into::into));
        self
    }

    /// Share an externally owned cancellation token.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Freeze the schema and register the initial version.
    pub fn build(self) -> StoreResult<ModelStore> {
        let node_count = Symbol::new(NODE_COUNT_SYMBOL, 0, 0u32);
        let mut symbols: Vec<AnySymbol> = Vec::with_capacity(self.symbols.len() + 1);
        symbols.push(AnySymbol::from(&node_count));
        symbols.extend(self.symbols);

        let mut slots = HashMap::with_capacity(symbols.len());
        for (slot, symbol) in symbols.iter().enumerate() {
            if slots.insert(symbol.key(), slot).is_some() {
                return Err(StoreError::DuplicateSymbol {
                    name: symbol.name().to_string(),
                });
            }
        }

        let initial = Arc::new(ModelSnapshot {
            interpretations: symbols
                .iter()
                .map(|symbol| symbol.descriptor().empty_snapshot())
                .collect(),
        });
        let mut snapshots = HashMap::new();
        snapshots.insert(Version(0), Arc::clone(&initial));

        debug!(symbols = symbols.len(), "model_store_built");

        Ok(ModelStore {
            inner: Arc::new(StoreInner {
                symbols,
                slots,
                node_count,
                initial,
                versions: RwLock::new(VersionRegistry { next: 1, snapshots }),
                cancellation: self.cancellation.unwrap_or_default(),
            }),
        })
    }
}
