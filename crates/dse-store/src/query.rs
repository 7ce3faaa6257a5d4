//! Named queries and the engine that materializes their result sets.

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::error::{StoreError, StoreResult};
use crate::model::Model;
use crate::symbol::Symbol;
use crate::tuple::Tuple;

type Evaluator = dyn Fn(&Model) -> StoreResult<Vec<Tuple>> + Send + Sync;

/// Named pattern over a model whose matches are tuples of a fixed arity.
#[derive(Clone)]
pub struct Query {
    name: Arc<str>,
    arity: usize,
    evaluate: Arc<Evaluator>,
}

impl Query {
    /// Create a query from an evaluation function.
    pub fn new<F>(name: impl Into<Arc<str>>, arity: usize, evaluate: F) -> Self
    where
        F: Fn(&Model) -> StoreResult<Vec<Tuple>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            arity,
            evaluate: Arc::new(evaluate),
        }
    }

    /// A query matching every key where `relation` holds.
    pub fn relation(name: impl Into<Arc<str>>, relation: &Symbol<bool>) -> Self {
        let symbol = relation.clone();
        Self::new(name, relation.arity(), move |model| {
            let interpretation = model.interpretation(&symbol)?;
            Ok(model
                .cursor(&interpretation)?
                .filter(|(_, value)| **value)
                .map(|(key, _)| key.clone())
                .collect())
        })
    }

    /// Query name, for logging. Two queries may share a name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Arity of every match.
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Whether `other` is this query or a clone of it.
    pub fn same_query(&self, other: &Query) -> bool {
        Arc::ptr_eq(&self.evaluate, &other.evaluate)
    }

    /// Evaluate against `model`, returning sorted, distinct matches.
    pub fn evaluate(&self, model: &Model) -> StoreResult<Vec<Tuple>> {
        let mut matches = (self.evaluate)(model)?;
        if let Some(bad) = matches.iter().find(|tuple| tuple.arity() != self.arity) {
            return Err(StoreError::ArityMismatch {
                name: self.name.to_string(),
                expected: self.arity,
                actual: bad.arity(),
            });
        }
        matches.sort_unstable();
        matches.dedup();
        Ok(matches)
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

/// Handle of a registered result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResultSetId(usize);

impl ResultSetId {
    /// Registration index.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Maintains result sets for one model.
///
/// Result sets reflect the model as of the last [`QueryEngine::flush_changes`];
/// writes made since then are invisible until the next flush.
pub trait QueryEngine: Send {
    /// Register `query`, or return the existing result set of `query` or one of its clones.
    fn result_set(&mut self, model: &Model, query: &Query) -> StoreResult<ResultSetId>;

    /// Bring every result set up to date with `model`.
    fn flush_changes(&mut self, model: &Model) -> StoreResult<()>;

    /// Whether `model` changed since the last flush.
    fn has_pending_changes(&self, model: &Model) -> bool;

    /// Number of matches.
    fn size(&self, id: ResultSetId) -> StoreResult<usize>;

    /// Match at `index` in the engine's stable order.
    fn key(&self, id: ResultSetId, index: usize) -> StoreResult<Option<Tuple>>;

    /// All matches in the engine's stable order.
    fn keys(&self, id: ResultSetId) -> StoreResult<&[Tuple]>;

    /// Whether `tuple` is a match.
    fn contains(&self, id: ResultSetId, tuple: &Tuple) -> StoreResult<bool>;
}

struct ResultSet {
    query: Query,
    matches: Vec<Tuple>,
}

/// Engine that re-evaluates every query when the model changed.
#[derive(Default)]
pub struct RecomputingQueryEngine {
    result_sets: Vec<ResultSet>,
    synced_at: Option<u64>,
}

impl RecomputingQueryEngine {
    /// Create an engine with no result sets.
    pub fn new() -> Self {
        Self::default()
    }

    fn result(&self, id: ResultSetId) -> StoreResult<&ResultSet> {
        self.result_sets
            .get(id.0)
            .ok_or(StoreError::UnknownResultSet { id: id.0 })
    }
}

impl QueryEngine for RecomputingQueryEngine {
    fn result_set(&mut self, model: &Model, query: &Query) -> StoreResult<ResultSetId> {
        if let Some(index) = self
            .result_sets
            .iter()
            .position(|result_set| result_set.query.same_query(query))
        {
            return Ok(ResultSetId(index));
        }
        // A fresh result set must agree with the others, so a stale engine syncs first.
        self.flush_changes(model)?;
        let matches = query.evaluate(model)?;
        let id = ResultSetId(self.result_sets.len());
        self.result_sets.push(ResultSet {
            query: query.clone(),
            matches,
        });
        trace!(query = query.name(), result_set = id.0, "query_registered");
        Ok(id)
    }

    fn flush_changes(&mut self, model: &Model) -> StoreResult<()> {
        if !self.has_pending_changes(model) {
            return Ok(());
        }
        for result_set in &mut self.result_sets {
            result_set.matches = result_set.query.evaluate(model)?;
        }
        self.synced_at = Some(model.modification_count());
        trace!(
            result_sets = self.result_sets.len(),
            modification = model.modification_count(),
            "query_engine_flush"
        );
        Ok(())
    }

    fn has_pending_changes(&self, model: &Model) -> bool {
        self.synced_at != Some(model.modification_count())
    }

    fn size(&self, id: ResultSetId) -> StoreResult<usize> {
        Ok(self.result(id)?.matches.len())
    }

    fn key(&self, id: ResultSetId, index: usize) -> StoreResult<Option<Tuple>> {
        Ok(self.result(id)?.matches.get(index).cloned())
    }

    fn keys(&self, id: ResultSetId) -> StoreResult<&[Tuple]> {
        Ok(&self.result(id)?.matches)
    }

    fn contains(&self, id: ResultSetId, tuple: &Tuple) -> StoreResult<bool> {
        Ok(self.result(id)?.matches.binary_search(tuple).is_ok())
    }
}

impl fmt::Debug for RecomputingQueryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecomputingQueryEngine")
            .field("result_sets", &self.result_sets.len())
            .field("synced_at", &self.synced_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ModelStore;

    #[test]
    fn test_results_visible_after_flush() {
        let node = Symbol::relation("node", 1);
        let store = ModelStore::builder().symbol(&node).build().unwrap();
        let mut model = store.create_model();
        let interpretation = model.interpretation(&node).unwrap();
        let mut engine = RecomputingQueryEngine::new();
        let nodes = engine
            .result_set(&model, &Query::relation("nodes", &node))
            .unwrap();
        assert_eq!(engine.size(nodes).unwrap(), 0);

        model.put(&interpretation, Tuple::of1(2), true).unwrap();
        model.put(&interpretation, Tuple::of1(1), true).unwrap();
        assert!(engine.has_pending_changes(&model));
        assert_eq!(engine.size(nodes).unwrap(), 0);

        engine.flush_changes(&model).unwrap();
        assert_eq!(engine.keys(nodes).unwrap(), &[Tuple::of1(1), Tuple::of1(2)]);
        assert!(engine.contains(nodes, &Tuple::of1(2)).unwrap());
        assert_eq!(engine.key(nodes, 2).unwrap(), None);
    }

    #[test]
    fn test_clones_share_result_set() {
        let store = ModelStore::builder().build().unwrap();
        let model = store.create_model();
        let mut engine = RecomputingQueryEngine::new();
        let query = Query::new("q", 0, |_| Ok(vec![Tuple::of0()]));
        let first = engine.result_set(&model, &query).unwrap();
        let second = engine.result_set(&model, &query.clone()).unwrap();

        assert_eq!(first, second);
        assert_eq!(engine.size(first).unwrap(), 1);
    }

    #[test]
    fn test_same_name_different_query_gets_own_result_set() {
        let node = Symbol::relation("node", 1);
        let person = Symbol::relation("person", 1);
        let store = ModelStore::builder().symbol(&node).symbol(&person).build().unwrap();
        let mut model = store.create_model();
        let nodes = model.interpretation(&node).unwrap();
        model.put(&nodes, Tuple::of1(0), true).unwrap();

        let mut engine = RecomputingQueryEngine::new();
        let by_node = engine
            .result_set(&model, &Query::relation("check", &node))
            .unwrap();
        let by_person = engine
            .result_set(&model, &Query::relation("check", &person))
            .unwrap();

        assert_ne!(by_node, by_person);
        assert_eq!(engine.size(by_node).unwrap(), 1);
        assert_eq!(engine.size(by_person).unwrap(), 0);
    }

    #[test]
    fn test_wrong_arity_match_rejected() {
        let store = ModelStore::builder().build().unwrap();
        let model = store.create_model();
        let query = Query::new("bad", 2, |_| Ok(vec![Tuple::of1(0)]));

        assert!(matches!(
            query.evaluate(&model),
            Err(StoreError::ArityMismatch { expected: 2, actual: 1, .. })
        ));
        assert_eq!(
            RecomputingQueryEngine::new()
                .size(ResultSetId(3))
                .unwrap_err(),
            StoreError::UnknownResultSet { id: 3 }
        );
    }
}
