//! Mutable working copy of a store's schema.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::{StoreError, StoreResult};
use crate::interpretation::{
    diff_maps, downcast_snapshot, AnyInterpretation, Change, DiffEntry, Interpretation,
    VersionedInterpretation,
};
use crate::store::{ModelSnapshot, ModelStore, Version};
use crate::symbol::{Symbol, Value};
use crate::tuple::Tuple;

/// Observer of a model's commit, restore and write events.
///
/// `before_*` callbacks run in reverse registration order and every other
/// callback runs in registration order. Listeners receive events only; they
/// cannot reach back into the model while it is notifying them.
pub trait ModelListener: Send {
    /// Called before a commit starts.
    fn before_commit(&mut self) {}

    /// Called after a commit produced or reused `version`.
    fn after_commit(&mut self, _version: Version) {}

    /// Called before the model starts restoring `version`.
    fn before_restore(&mut self, _version: Version) {}

    /// Called after the model finished restoring `version`.
    fn after_restore(&mut self, _version: Version) {}

    /// Called once per key whose value changed, either written or restored.
    fn changed(&mut self, _change: &Change) {}
}

/// Handle returned by [`Model::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Working copy of every interpretation of a store.
///
/// A model is owned by a single thread; concurrency comes from creating one
/// model per thread on a shared [`ModelStore`].
pub struct Model {
    store: ModelStore,
    state: Version,
    base: Arc<ModelSnapshot>,
    interpretations: Vec<Box<dyn AnyInterpretation>>,
    uncommitted_changes: bool,
    listeners: Vec<(ListenerId, Box<dyn ModelListener>)>,
    next_listener: u64,
    notifications: VecDeque<Change>,
    modification_count: u64,
}

impl Model {
    /// A model at the initial version. Fresh interpretations already hold
    /// the all-default content of the initial snapshot.
    pub(crate) fn initial(store: ModelStore, state: Version, snapshot: Arc<ModelSnapshot>) -> Self {
        let interpretations = store
            .symbols()
            .iter()
            .map(|symbol| symbol.descriptor().new_interpretation())
            .collect();
        Self {
            store,
            state,
            base: snapshot,
            interpretations,
            uncommitted_changes: false,
            listeners: Vec::new(),
            next_listener: 0,
            notifications: VecDeque::new(),
            modification_count: 0,
        }
    }

    /// A model holding the content of a committed snapshot.
    pub(crate) fn from_snapshot(
        store: ModelStore,
        state: Version,
        snapshot: Arc<ModelSnapshot>,
    ) -> StoreResult<Self> {
        let mut model = Self::initial(store, state, Arc::clone(&snapshot));
        let mut discarded = Vec::new();
        for (interpretation, target) in model
            .interpretations
            .iter_mut()
            .zip(snapshot.interpretations.iter())
        {
            interpretation.restore(target, &mut discarded)?;
        }
        Ok(model)
    }

    /// The store this model belongs to.
    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    /// Version most recently committed or restored.
    pub fn state(&self) -> Version {
        self.state
    }

    /// Whether any write happened since the last commit or restore.
    pub fn has_uncommitted_changes(&self) -> bool {
        self.uncommitted_changes
    }

    /// Counter bumped by every effective write and every restore that changed content.
    pub fn modification_count(&self) -> u64 {
        self.modification_count
    }

    /// Fail with [`StoreError::Cancelled`] if the store's token was cancelled.
    pub fn check_cancelled(&self) -> StoreResult<()> {
        self.store.cancellation_token().check()
    }

    /// Resolve the interpretation handle of `symbol`.
    pub fn interpretation<T: Value>(&self, symbol: &Symbol<T>) -> StoreResult<Interpretation<T>> {
        let slot = self
            .store
            .slot_of(symbol.key())
            .ok_or_else(|| StoreError::UnknownSymbol {
                name: symbol.name().to_string(),
            })?;
        Ok(Interpretation::new(slot, symbol.clone()))
    }

    /// Current value of `key`, or the symbol default if it was never written.
    pub fn get<T: Value>(&self, interpretation: &Interpretation<T>, key: &Tuple) -> StoreResult<T> {
        check_arity(interpretation.symbol(), key)?;
        Ok(self.typed(interpretation)?.get(key))
    }

    /// Write `value` under `key` and return the previous value.
    pub fn put<T: Value>(
        &mut self,
        interpretation: &Interpretation<T>,
        key: Tuple,
        value: T,
    ) -> StoreResult<T> {
        check_arity(interpretation.symbol(), &key)?;
        let symbol = interpretation.symbol().key();
        let target = self.typed_mut(interpretation)?;
        let (previous, changed) = target.put(key.clone(), value);
        if changed {
            self.uncommitted_changes = true;
            self.modification_count += 1;
            self.notifications.push_back(Change {
                symbol,
                key,
                restoring: false,
            });
            self.dispatch_notifications();
        }
        Ok(previous)
    }

    /// Iterate over every key holding a non-default value, in key order.
    pub fn cursor<'a, T: Value>(
        &'a self,
        interpretation: &Interpretation<T>,
    ) -> StoreResult<impl Iterator<Item = (&'a Tuple, &'a T)> + 'a> {
        Ok(self.typed(interpretation)?.map().iter())
    }

    /// Number of keys holding a non-default value.
    pub fn size<T: Value>(&self, interpretation: &Interpretation<T>) -> StoreResult<usize> {
        Ok(self.typed(interpretation)?.map().len())
    }

    /// Every key of `interpretation` whose value differs between two committed versions.
    pub fn diff_cursor<T: Value>(
        &self,
        interpretation: &Interpretation<T>,
        from: Version,
        to: Version,
    ) -> StoreResult<Vec<DiffEntry<T>>> {
        let symbol = interpretation.symbol();
        let from_snapshot = self.store.snapshot(from)?;
        let to_snapshot = self.store.snapshot(to)?;
        let slot = interpretation.slot();
        let missing = || StoreError::UnknownSymbol {
            name: symbol.name().to_string(),
        };
        let from_map = downcast_snapshot::<T>(
            from_snapshot.interpretations.get(slot).ok_or_else(missing)?,
            symbol.name(),
        )?;
        let to_map = downcast_snapshot::<T>(
            to_snapshot.interpretations.get(slot).ok_or_else(missing)?,
            symbol.name(),
        )?;
        Ok(diff_maps(from_map, to_map, symbol.default_value()))
    }

    /// Freeze the working content into a version.
    ///
    /// A commit without writes since the last commit or restore returns the
    /// current version instead of registering a new one.
    pub fn commit(&mut self) -> StoreResult<Version> {
        self.check_cancelled()?;
        for (_, listener) in self.listeners.iter_mut().rev() {
            listener.before_commit();
        }
        if self.uncommitted_changes {
            let mut interpretations = Vec::with_capacity(self.interpretations.len());
            for (interpretation, previous) in self
                .interpretations
                .iter_mut()
                .zip(self.base.interpretations.iter())
            {
                interpretations.push(if interpretation.has_pending_changes() {
                    interpretation.commit()
                } else {
                    Arc::clone(previous)
                });
            }
            let snapshot = Arc::new(ModelSnapshot { interpretations });
            let parent = self.state;
            self.state = self.store.publish(Arc::clone(&snapshot));
            self.base = snapshot;
            self.uncommitted_changes = false;
            debug!(parent = %parent, version = %self.state, "model_commit");
        } else {
            trace!(version = %self.state, "model_commit_unchanged");
        }
        let version = self.state;
        for (_, listener) in self.listeners.iter_mut() {
            listener.after_commit(version);
        }
        Ok(version)
    }

    /// Replace the working content with a committed version, discarding
    /// uncommitted writes. Listeners see one restoring change per key that differs.
    pub fn restore(&mut self, version: Version) -> StoreResult<()> {
        self.check_cancelled()?;
        let snapshot = self.store.snapshot(version)?;
        for (_, listener) in self.listeners.iter_mut().rev() {
            listener.before_restore(version);
        }
        let mut changes = Vec::new();
        for (interpretation, target) in self
            .interpretations
            .iter_mut()
            .zip(snapshot.interpretations.iter())
        {
            interpretation.restore(target, &mut changes)?;
        }
        let from = self.state;
        self.base = snapshot;
        self.state = version;
        self.uncommitted_changes = false;
        if !changes.is_empty() {
            self.modification_count += 1;
        }
        debug!(from = %from, to = %version, changes = changes.len(), "model_restore");
        self.notifications.extend(changes);
        self.dispatch_notifications();
        for (_, listener) in self.listeners.iter_mut() {
            listener.after_restore(version);
        }
        Ok(())
    }

    /// Register a listener.
    pub fn add_listener(&mut self, listener: impl ModelListener + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Unregister a listener. Returns false if it was not registered.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener, _)| *listener != id);
        self.listeners.len() != before
    }

    fn dispatch_notifications(&mut self) {
        while let Some(change) = self.notifications.pop_front() {
            for (_, listener) in self.listeners.iter_mut() {
                listener.changed(&change);
            }
        }
    }

    fn typed<T: Value>(
        &self,
        interpretation: &Interpretation<T>,
    ) -> StoreResult<&VersionedInterpretation<T>> {
        let symbol = interpretation.symbol();
        self.interpretations
            .get(interpretation.slot())
            .and_then(|any| any.as_any().downcast_ref::<VersionedInterpretation<T>>())
            .filter(|typed| typed.symbol() == symbol)
            .ok_or_else(|| StoreError::SymbolTypeMismatch {
                name: symbol.name().to_string(),
            })
    }

    fn typed_mut<T: Value>(
        &mut self,
        interpretation: &Interpretation<T>,
    ) -> StoreResult<&mut VersionedInterpretation<T>> {
        let symbol = interpretation.symbol();
        self.interpretations
            .get_mut(interpretation.slot())
            .and_then(|any| any.as_any_mut().downcast_mut::<VersionedInterpretation<T>>())
            .filter(|typed| typed.symbol() == symbol)
            .ok_or_else(|| StoreError::SymbolTypeMismatch {
                name: symbol.name().to_string(),
            })
    }
}

fn check_arity<T: Value>(symbol: &Symbol<T>, key: &Tuple) -> StoreResult<()> {
    if key.arity() == symbol.arity() {
        Ok(())
    } else {
        Err(StoreError::ArityMismatch {
            name: symbol.name().to_string(),
            expected: symbol.arity(),
            actual: key.arity(),
        })
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("state", &self.state)
            .field("uncommitted_changes", &self.uncommitted_changes)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::AnySymbol;

    fn store_with(symbol: &Symbol<bool>) -> ModelStore {
        ModelStore::builder().symbol(symbol).build().unwrap()
    }

    #[test]
    fn test_unknown_symbol() {
        let store = store_with(&Symbol::relation("a", 1));
        let model = store.create_model();
        let stranger = Symbol::relation("b", 1);

        assert_eq!(
            model.interpretation(&stranger).unwrap_err(),
            StoreError::UnknownSymbol { name: "b".into() }
        );
    }

    #[test]
    fn test_put_checks_arity() {
        let edge = Symbol::relation("edge", 2);
        let store = store_with(&edge);
        let mut model = store.create_model();
        let interpretation = model.interpretation(&edge).unwrap();

        let err = model
            .put(&interpretation, Tuple::of1(0), true)
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::ArityMismatch {
                name: "edge".into(),
                expected: 2,
                actual: 1
            }
        );
        assert!(!model.has_uncommitted_changes());
    }

    #[test]
    fn test_noop_write_keeps_model_clean() {
        let node = Symbol::relation("node", 1);
        let store = store_with(&node);
        let mut model = store.create_model();
        let interpretation = model.interpretation(&node).unwrap();

        assert!(!model.put(&interpretation, Tuple::of1(0), false).unwrap());
        assert!(!model.has_uncommitted_changes());
        assert_eq!(model.modification_count(), 0);
        assert_eq!(model.commit().unwrap(), store.initial_version());
    }

    #[test]
    fn test_mismatched_snapshot_rejected() {
        let node = Symbol::relation("node", 1);
        let store = store_with(&node);
        let counter = AnySymbol::from(&Symbol::new("counter", 1, 0u32));
        let snapshot = Arc::new(ModelSnapshot {
            interpretations: vec![
                store.symbols()[0].descriptor().empty_snapshot(),
                counter.descriptor().empty_snapshot(),
            ],
        });

        let err = Model::from_snapshot(store.clone(), store.initial_version(), snapshot)
            .map(|_| ())
            .unwrap_err();
        assert_eq!(err, StoreError::SymbolTypeMismatch { name: "node".into() });
    }

    #[test]
    fn test_remove_listener() {
        struct Silent;
        impl ModelListener for Silent {}

        let store = store_with(&Symbol::relation("a", 1));
        let mut model = store.create_model();
        let id = model.add_listener(Silent);
        assert!(model.remove_listener(id));
        assert!(!model.remove_listener(id));
    }
}
