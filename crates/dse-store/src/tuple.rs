//! Fixed-arity node id vectors.
//!
//! Tuples of up to four elements are stored inline; longer ones share a
//! heap allocation. Equality, hashing and ordering are by value.

use std::fmt;
use std::ops::Index;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Identifier of a node in a graph-shaped model.
pub type NodeId = u32;

const INLINE: usize = 4;

/// Immutable fixed-length sequence of node ids.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tuple(Repr);

// Unused inline slots are always zero, so the derived impls compare by value.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Repr {
    Inline { len: u8, items: [NodeId; INLINE] },
    Heap(Arc<[NodeId]>),
}

impl Tuple {
    /// The 0-ary tuple, used as the key of global scalars.
    pub const fn of0() -> Self {
        Self(Repr::Inline {
            len: 0,
            items: [0; INLINE],
        })
    }

    /// Create a 1-tuple.
    pub const fn of1(a: NodeId) -> Self {
        Self(Repr::Inline {
            len: 1,
            items: [a, 0, 0, 0],
        })
    }

    /// Create a 2-tuple.
    pub const fn of2(a: NodeId, b: NodeId) -> Self {
        Self(Repr::Inline {
            len: 2,
            items: [a, b, 0, 0],
        })
    }

    /// Create a 3-tuple.
    pub const fn of3(a: NodeId, b: NodeId, c: NodeId) -> Self {
        Self(Repr::Inline {
            len: 3,
            items: [a, b, c, 0],
        })
    }

    /// Create a 4-tuple.
    pub const fn of4(a: NodeId, b: NodeId, c: NodeId, d: NodeId) -> Self {
        Self(Repr::Inline {
            len: 4,
            items: [a, b, c, d],
        })
    }

    /// Create a tuple of any arity from a slice.
    pub fn from_slice(items: &[NodeId]) -> Self {
        match *items {
            [] => Self::of0(),
            [a] => Self::of1(a),
            [a, b] => Self::of2(a, b),
            [a, b, c] => Self::of3(a, b, c),
            [a, b, c, d] => Self::of4(a, b, c, d),
            _ => Self(Repr::Heap(Arc::from(items))),
        }
    }

    /// Number of elements.
    pub fn arity(&self) -> usize {
        match &self.0 {
            Repr::Inline { len, .. } => usize::from(*len),
            Repr::Heap(items) => items.len(),
        }
    }

    /// Element at `index`, if in range.
    pub fn get(&self, index: usize) -> Option<NodeId> {
        self.as_slice().get(index).copied()
    }

    /// View the elements as a slice.
    pub fn as_slice(&self) -> &[NodeId] {
        match &self.0 {
            Repr::Inline { len, items } => &items[..usize::from(*len)],
            Repr::Heap(items) => items,
        }
    }

    /// Iterate over the elements.
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.as_slice().iter().copied()
    }
}

impl Default for Tuple {
    fn default() -> Self {
        Self::of0()
    }
}

impl Index<usize> for Tuple {
    type Output = NodeId;

    fn index(&self, index: usize) -> &NodeId {
        &self.as_slice()[index]
    }
}

impl From<&[NodeId]> for Tuple {
    fn from(items: &[NodeId]) -> Self {
        Self::from_slice(items)
    }
}

impl From<Vec<NodeId>> for Tuple {
    fn from(items: Vec<NodeId>) -> Self {
        Self::from_slice(&items)
    }
}

impl<const N: usize> From<[NodeId; N]> for Tuple {
    fn from(items: [NodeId; N]) -> Self {
        Self::from_slice(&items)
    }
}

impl FromIterator<NodeId> for Tuple {
    fn from_iter<I: IntoIterator<Item = NodeId>>(iter: I) -> Self {
        let items: Vec<NodeId> = iter.into_iter().collect();
        Self::from_slice(&items)
    }
}

impl fmt::Debug for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, item) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{item}")?;
        }
        write!(f, "]")
    }
}

impl Serialize for Tuple {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.as_slice())
    }
}

impl<'de> Deserialize<'de> for Tuple {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let items = Vec::<NodeId>::deserialize(deserializer)?;
        Ok(Self::from(items))
    }
}
