//! Transformation rules and their activations.

use std::fmt;
use std::sync::Arc;

use dse_store::{Model, Query, QueryEngine, ResultSetId, Tuple};
use rand::Rng;
use tracing::debug;

use crate::action::{Action, BoundAction};
use crate::error::{DseError, DseResult};

/// A precondition query coupled with the action fired on each of its matches.
#[derive(Debug, Clone)]
pub struct TransformationRule {
    name: Arc<str>,
    precondition: Query,
    action: Arc<Action>,
}

impl TransformationRule {
    /// Create a rule. The precondition arity must equal the action arity.
    pub fn new(name: impl Into<Arc<str>>, precondition: Query, action: Action) -> DseResult<Self> {
        let name = name.into();
        if precondition.arity() != action.arity() {
            return Err(DseError::ArityMismatch {
                name: name.to_string(),
                expected: action.arity(),
                actual: precondition.arity(),
            });
        }
        Ok(Self {
            name,
            precondition,
            action: Arc::new(action),
        })
    }

    /// Rule name. Unique within one exploration.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Query whose matches are the activations of this rule.
    pub fn precondition(&self) -> &Query {
        &self.precondition
    }

    /// Compiled effect.
    pub fn action(&self) -> &Arc<Action> {
        &self.action
    }

    /// Register the precondition with `engine` and bind the action to `model`.
    pub fn prepare(&self, model: &Model, engine: &mut dyn QueryEngine) -> DseResult<PreparedRule> {
        self.action.check_store(model.store())?;
        let result_set = engine.result_set(model, &self.precondition)?;
        debug!(rule = %self.name, result_set = result_set.index(), "rule_prepared");
        Ok(PreparedRule {
            rule: self.clone(),
            result_set,
            bound: BoundAction::new(Arc::clone(&self.action)),
        })
    }
}

/// One executable choice: a rule together with a precondition match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Activation {
    rule: Arc<str>,
    tuple: Tuple,
}

impl Activation {
    /// Create an activation of the rule named `rule`.
    pub fn new(rule: impl Into<Arc<str>>, tuple: Tuple) -> Self {
        Self {
            rule: rule.into(),
            tuple,
        }
    }

    /// Name of the rule this activation belongs to.
    pub fn rule_name(&self) -> &str {
        &self.rule
    }

    /// Precondition match the action fires on.
    pub fn tuple(&self) -> &Tuple {
        &self.tuple
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.rule, self.tuple)
    }
}

/// A rule bound to one model and query engine.
///
/// Indexed access follows the engine's result order, which is stable until
/// the next flush.
#[derive(Debug)]
pub struct PreparedRule {
    rule: TransformationRule,
    result_set: ResultSetId,
    bound: BoundAction,
}

impl PreparedRule {
    /// The underlying rule.
    pub fn rule(&self) -> &TransformationRule {
        &self.rule
    }

    /// Rule name.
    pub fn name(&self) -> &str {
        self.rule.name()
    }

    /// Number of current matches.
    pub fn activation_count(&self, engine: &dyn QueryEngine) -> DseResult<usize> {
        Ok(engine.size(self.result_set)?)
    }

    /// The `index`-th current match.
    pub fn activation(&self, engine: &dyn QueryEngine, index: usize) -> DseResult<Option<Activation>> {
        Ok(engine
            .key(self.result_set, index)?
            .map(|tuple| Activation::new(Arc::clone(&self.rule.name), tuple)))
    }

    /// Every current match, in engine order.
    pub fn all_activations(&self, engine: &dyn QueryEngine) -> DseResult<Vec<Activation>> {
        Ok(engine
            .keys(self.result_set)?
            .iter()
            .map(|tuple| Activation::new(Arc::clone(&self.rule.name), tuple.clone()))
            .collect())
    }

    /// A uniformly chosen current match, or `None` if there is none.
    pub fn random_activation<R: Rng + ?Sized>(
        &self,
        engine: &dyn QueryEngine,
        rng: &mut R,
    ) -> DseResult<Option<Activation>> {
        let count = self.activation_count(engine)?;
        if count == 0 {
            return Ok(None);
        }
        self.activation(engine, rng.random_range(0..count))
    }

    /// Whether `tuple` is a current match.
    pub fn is_active(&self, engine: &dyn QueryEngine, tuple: &Tuple) -> DseResult<bool> {
        Ok(engine.contains(self.result_set, tuple)?)
    }

    /// Fire the action on `tuple` and flush the engine so the next enumeration sees the result.
    pub fn fire_activation(
        &mut self,
        model: &mut Model,
        engine: &mut dyn QueryEngine,
        tuple: &Tuple,
    ) -> DseResult<bool> {
        let fired = self.bound.fire(model, tuple)?;
        engine.flush_changes(model)?;
        Ok(fired)
    }
}
