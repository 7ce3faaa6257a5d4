//! Per-model maps from tuples to symbol values.
//!
//! Each interpretation keeps its working content in a persistent ordered map.
//! Committing clones that map, which shares structure with every earlier
//! snapshot, so a commit costs O(1) and committed snapshots are immutable.

use std::any::Any;
use std::cmp::Ordering;
use std::iter::Peekable;
use std::marker::PhantomData;
use std::sync::Arc;

use im::OrdMap;

use crate::error::{StoreError, StoreResult};
use crate::symbol::{Symbol, SymbolKey, Value};
use crate::tuple::Tuple;

/// A committed, immutable interpretation map with its value type erased.
pub(crate) type Snapshot = Arc<dyn Any + Send + Sync>;

/// Resolved handle to the live map of one symbol inside a model.
///
/// Obtain it from [`Model::interpretation`](crate::Model::interpretation); reads
/// and writes go through the owning model. A handle stays valid for every model
/// created by the same store.
pub struct Interpretation<T> {
    slot: usize,
    symbol: Symbol<T>,
    _value: PhantomData<fn() -> T>,
}

impl<T: Value> Interpretation<T> {
    pub(crate) fn new(slot: usize, symbol: Symbol<T>) -> Self {
        Self {
            slot,
            symbol,
            _value: PhantomData,
        }
    }

    /// The symbol this interpretation stores.
    pub fn symbol(&self) -> &Symbol<T> {
        &self.symbol
    }

    pub(crate) fn slot(&self) -> usize {
        self.slot
    }
}

impl<T> Clone for Interpretation<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot,
            symbol: self.symbol.clone(),
            _value: PhantomData,
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Interpretation<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpretation")
            .field("slot", &self.slot)
            .field("symbol", &self.symbol)
            .finish()
    }
}

/// A single key whose value differs between two versions.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffEntry<T> {
    /// Key that changed.
    pub key: Tuple,
    /// Value in the older version (the default if absent).
    pub from_value: T,
    /// Value in the newer version (the default if absent).
    pub to_value: T,
}

/// Notification that one key of one interpretation changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    /// Symbol whose interpretation changed.
    pub symbol: SymbolKey,
    /// Key that was written.
    pub key: Tuple,
    /// True when the change comes from restoring an earlier version.
    pub restoring: bool,
}

/// Live content of one symbol within one model.
pub(crate) struct VersionedInterpretation<T: Value> {
    symbol: Symbol<T>,
    map: OrdMap<Tuple, T>,
    pending: bool,
}

impl<T: Value> VersionedInterpretation<T> {
    pub(crate) fn new(symbol: Symbol<T>) -> Self {
        Self {
            symbol,
            map: OrdMap::new(),
            pending: false,
        }
    }

    pub(crate) fn get(&self, key: &Tuple) -> T {
        self.map
            .get(key)
            .cloned()
            .unwrap_or_else(|| self.symbol.default_value().clone())
    }

    /// Write `value`, returning the previous value and whether it differed.
    /// Writing the default removes the key.
    pub(crate) fn put(&mut self, key: Tuple, value: T) -> (T, bool) {
        let default = self.symbol.default_value();
        let changed = match self.map.get(&key) {
            Some(current) => *current != value,
            None => value != *default,
        };
        let previous = if value == *default {
            self.map.remove(&key)
        } else {
            self.map.insert(key, value)
        };
        if changed {
            self.pending = true;
        }
        (previous.unwrap_or_else(|| default.clone()), changed)
    }

    pub(crate) fn symbol(&self) -> &Symbol<T> {
        &self.symbol
    }

    pub(crate) fn map(&self) -> &OrdMap<Tuple, T> {
        &self.map
    }
}

/// Object-safe operations the model needs on interpretations of any value type.
pub(crate) trait AnyInterpretation: Send + Sync {
    fn symbol_key(&self) -> SymbolKey;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn has_pending_changes(&self) -> bool;
    fn len(&self) -> usize;
    /// Freeze the working content and clear the pending flag.
    fn commit(&mut self) -> Snapshot;
    /// Replace the working content with `snapshot`, reporting every key that differs.
    fn restore(&mut self, snapshot: &Snapshot, changes: &mut Vec<Change>) -> StoreResult<()>;
}

impl<T: Value> AnyInterpretation for VersionedInterpretation<T> {
    fn symbol_key(&self) -> SymbolKey {
        self.symbol.key()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn has_pending_changes(&self) -> bool {
        self.pending
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn commit(&mut self) -> Snapshot {
        self.pending = false;
        Arc::new(self.map.clone())
    }

    fn restore(&mut self, snapshot: &Snapshot, changes: &mut Vec<Change>) -> StoreResult<()> {
        let target = downcast_snapshot::<T>(snapshot, self.symbol.name())?;
        if !self.map.ptr_eq(target) {
            let key = self.symbol.key();
            for entry in diff_maps(&self.map, target, self.symbol.default_value()) {
                changes.push(Change {
                    symbol: key,
                    key: entry.key,
                    restoring: true,
                });
            }
            self.map = target.clone();
        }
        self.pending = false;
        Ok(())
    }
}

pub(crate) fn downcast_snapshot<'a, T: Value>(
    snapshot: &'a Snapshot,
    name: &str,
) -> StoreResult<&'a OrdMap<Tuple, T>> {
    snapshot
        .downcast_ref::<OrdMap<Tuple, T>>()
        .ok_or_else(|| StoreError::SymbolTypeMismatch {
            name: name.to_string(),
        })
}

/// Merge two ordered maps into the list of keys whose values differ.
pub(crate) fn diff_maps<T: Value>(
    from: &OrdMap<Tuple, T>,
    to: &OrdMap<Tuple, T>,
    default: &T,
) -> Vec<DiffEntry<T>> {
    let mut diff = Vec::new();
    if from.ptr_eq(to) {
        return diff;
    }
    let mut left: Peekable<_> = from.iter().peekable();
    let mut right: Peekable<_> = to.iter().peekable();
    loop {
        let order = match (left.peek(), right.peek()) {
            (None, None) => break,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some((a, _)), Some((b, _))) => a.cmp(b),
        };
        match order {
            Ordering::Less => {
                if let Some((key, value)) = left.next() {
                    diff.push(DiffEntry {
                        key: key.clone(),
                        from_value: value.clone(),
                        to_value: default.clone(),
                    });
                }
            }
            Ordering::Greater => {
                if let Some((key, value)) = right.next() {
                    diff.push(DiffEntry {
                        key: key.clone(),
                        from_value: default.clone(),
                        to_value: value.clone(),
                    });
                }
            }
            Ordering::Equal => {
                if let (Some((key, old)), Some((_, new))) = (left.next(), right.next()) {
                    if old != new {
                        diff.push(DiffEntry {
                            key: key.clone(),
                            from_value: old.clone(),
                            to_value: new.clone(),
                        });
                    }
                }
            }
        }
    }
    diff
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_default_removes_key() {
        let symbol = Symbol::relation("edge", 2);
        let mut interpretation = VersionedInterpretation::new(symbol);

        assert_eq!(interpretation.put(Tuple::of2(0, 1), true), (false, true));
        assert_eq!(interpretation.len(), 1);
        assert_eq!(interpretation.put(Tuple::of2(0, 1), false), (true, true));
        assert_eq!(interpretation.len(), 0);
        assert!(!interpretation.get(&Tuple::of2(0, 1)));
    }

    #[test]
    fn test_noop_put_is_not_pending() {
        let symbol = Symbol::new("score", 1, 0i32);
        let mut interpretation = VersionedInterpretation::new(symbol);

        assert_eq!(interpretation.put(Tuple::of1(3), 0), (0, false));
        assert!(!interpretation.has_pending_changes());
        assert_eq!(interpretation.put(Tuple::of1(3), 5), (0, true));
        assert!(interpretation.has_pending_changes());
    }

    #[test]
    fn test_diff_maps() {
        let mut from = OrdMap::new();
        from.insert(Tuple::of1(0), 1);
        from.insert(Tuple::of1(1), 2);
        let mut to = from.clone();
        to.remove(&Tuple::of1(0));
        to.insert(Tuple::of1(1), 3);
        to.insert(Tuple::of1(2), 4);

        let diff = diff_maps(&from, &to, &0);
        assert_eq!(
            diff,
            vec![
                DiffEntry {
                    key: Tuple::of1(0),
                    from_value: 1,
                    to_value: 0
                },
                DiffEntry {
                    key: Tuple::of1(1),
                    from_value: 2,
                    to_value: 3
                },
                DiffEntry {
                    key: Tuple::of1(2),
                    from_value: 0,
                    to_value: 4
                },
            ]
        );
        assert!(diff_maps(&from, &from.clone(), &0).is_empty());
    }

    #[test]
    fn test_restore_reports_changes() {
        let symbol = Symbol::relation("node", 1);
        let key = symbol.key();
        let mut interpretation = VersionedInterpretation::new(symbol);
        interpretation.put(Tuple::of1(0), true);
        let snapshot = interpretation.commit();
        interpretation.put(Tuple::of1(1), true);

        let mut changes = Vec::new();
        interpretation.restore(&snapshot, &mut changes).unwrap();

        assert_eq!(
            changes,
            vec![Change {
                symbol: key,
                key: Tuple::of1(1),
                restoring: true
            }]
        );
        assert!(!interpretation.has_pending_changes());
        assert!(!interpretation.get(&Tuple::of1(1)));
    }
}
