//! Named relation schemas.
//!
//! A [`Symbol`] fixes the name, arity, value type and default value of one
//! relation or attribute. Symbols are compared by identity: two symbols with
//! the same name are still distinct schemas.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use im::OrdMap;

use crate::interpretation::{AnyInterpretation, Snapshot, VersionedInterpretation};
use crate::tuple::Tuple;

/// Values that can be stored in an interpretation.
pub trait Value: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {}

impl<T> Value for T where T: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {}

/// Identity of a symbol, stable for as long as the symbol is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolKey(usize);

struct SymbolInner<T> {
    name: String,
    arity: usize,
    default_value: T,
}

/// Immutable relation schema with a typed value domain.
pub struct Symbol<T>(Arc<SymbolInner<T>>);

impl<T: Value> Symbol<T> {
    /// Create a new symbol.
    pub fn new(name: impl Into<String>, arity: usize, default_value: T) -> Self {
        Self(Arc::new(SymbolInner {
            name: name.into(),
            arity,
            default_value,
        }))
    }

    /// Symbol name.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Number of tuple elements a key must have.
    pub fn arity(&self) -> usize {
        self.0.arity
    }

    /// Value reported for keys that were never written.
    pub fn default_value(&self) -> &T {
        &self.0.default_value
    }

    /// Identity key of this symbol.
    pub fn key(&self) -> SymbolKey {
        SymbolKey(Arc::as_ptr(&self.0) as *const () as usize)
    }
}

impl Symbol<bool> {
    /// A boolean relation that defaults to `false`.
    pub fn relation(name: impl Into<String>, arity: usize) -> Self {
        Self::new(name, arity, false)
    }
}

impl<T> Clone for Symbol<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> PartialEq for Symbol<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T> Eq for Symbol<T> {}

impl<T> Hash for Symbol<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as *const () as usize).hash(state);
    }
}

impl<T: fmt::Debug> fmt::Debug for Symbol<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Symbol")
            .field("name", &self.0.name)
            .field("arity", &self.0.arity)
            .field("default_value", &self.0.default_value)
            .finish()
    }
}

impl<T> fmt::Display for Symbol<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.0.name, self.0.arity)
    }
}

/// Type-erased view of a symbol, used by the store to build interpretations.
pub(crate) trait SymbolDescriptor: Send + Sync {
    fn key(&self) -> SymbolKey;
    fn name(&self) -> &str;
    fn arity(&self) -> usize;
    fn new_interpretation(&self) -> Box<dyn AnyInterpretation>;
    fn empty_snapshot(&self) -> Snapshot;
}

impl<T: Value> SymbolDescriptor for Symbol<T> {
    fn key(&self) -> SymbolKey {
        Symbol::key(self)
    }

    fn name(&self) -> &str {
        Symbol::name(self)
    }

    fn arity(&self) -> usize {
        Symbol::arity(self)
    }

    fn new_interpretation(&self) -> Box<dyn AnyInterpretation> {
        Box::new(VersionedInterpretation::new(self.clone()))
    }

    fn empty_snapshot(&self) -> Snapshot {
        let empty: OrdMap<Tuple, T> = OrdMap::new();
        Arc::new(empty) as Arc<dyn Any + Send + Sync>
    }
}

/// A symbol of any value type, as handed to the store builder.
#[derive(Clone)]
pub struct AnySymbol(Arc<dyn SymbolDescriptor>);

impl AnySymbol {
    /// Symbol name.
    pub fn name(&self) -> &str {
        self.0.name()
    }

    /// Symbol arity.
    pub fn arity(&self) -> usize {
        self.0.arity()
    }

    /// Identity key of the wrapped symbol.
    pub fn key(&self) -> SymbolKey {
        self.0.key()
    }

    pub(crate) fn descriptor(&self) -> &dyn SymbolDescriptor {
        self.0.as_ref()
    }
}

impl<T: Value> From<Symbol<T>> for AnySymbol {
    fn from(symbol: Symbol<T>) -> Self {
        Self(Arc::new(symbol))
    }
}

impl<T: Value> From<&Symbol<T>> for AnySymbol {
    fn from(symbol: &Symbol<T>) -> Self {
        Self(Arc::new(symbol.clone()))
    }
}

impl fmt::Debug for AnySymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AnySymbol({}/{})", self.name(), self.arity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_equality() {
        let a = Symbol::relation("Person", 1);
        let b = Symbol::relation("Person", 1);

        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_ne!(a.key(), b.key());
        assert_eq!(AnySymbol::from(&a).key(), a.key());
    }

    #[test]
    fn test_schema_accessors() {
        let weight = Symbol::new("weight", 2, 0i64);
        assert_eq!(weight.name(), "weight");
        assert_eq!(weight.arity(), 2);
        assert_eq!(*weight.default_value(), 0);
        assert_eq!(weight.to_string(), "weight/2");
    }
}
