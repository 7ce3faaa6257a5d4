//! The exploration problem: rules, constraints, objectives and strategy.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use dse_store::{Model, Query, QueryEngine};
use tracing::debug;

use crate::adapter::{AdapterParts, DesignSpaceExplorationAdapter};
use crate::config::ExplorationConfig;
use crate::error::{DseError, DseResult};
use crate::objective::Objective;
use crate::rule::TransformationRule;
use crate::strategy::Strategy;

type StrategyFactory = dyn Fn() -> Box<dyn Strategy> + Send + Sync;

/// Immutable description of a design-space exploration.
///
/// One exploration may create any number of adapters, each over its own
/// model. Clones share the description.
#[derive(Clone)]
pub struct DesignSpaceExploration {
    inner: Arc<ExplorationInner>,
}

struct ExplorationInner {
    rules: Vec<TransformationRule>,
    global_constraints: Vec<Query>,
    objectives: Vec<Arc<dyn Objective>>,
    strategy: Option<Arc<StrategyFactory>>,
    config: ExplorationConfig,
}

impl DesignSpaceExploration {
    /// Start describing an exploration.
    pub fn builder() -> DesignSpaceExplorationBuilder {
        DesignSpaceExplorationBuilder::default()
    }

    /// Rules in registration order.
    pub fn transformations(&self) -> &[TransformationRule] {
        &self.inner.rules
    }

    /// Queries that must have no match in a valid state.
    pub fn global_constraints(&self) -> &[Query] {
        &self.inner.global_constraints
    }

    /// Objectives in evaluation order.
    pub fn objectives(&self) -> &[Arc<dyn Objective>] {
        &self.inner.objectives
    }

    /// Configuration every adapter starts with.
    pub fn config(&self) -> &ExplorationConfig {
        &self.inner.config
    }

    /// Bind the exploration to `model`. Every adapter gets a fresh copy of
    /// the configured strategy.
    pub fn create_adapter(
        &self,
        model: Model,
        engine: impl QueryEngine + 'static,
    ) -> DseResult<DesignSpaceExplorationAdapter> {
        self.create_adapter_with(model, Box::new(engine))
    }

    /// Like [`create_adapter`](Self::create_adapter), for an already boxed engine.
    pub fn create_adapter_with(
        &self,
        model: Model,
        engine: Box<dyn QueryEngine>,
    ) -> DseResult<DesignSpaceExplorationAdapter> {
        let parts = AdapterParts {
            rules: &self.inner.rules,
            global_constraints: &self.inner.global_constraints,
            objectives: self.inner.objectives.clone(),
            strategy: self.inner.strategy.as_ref().map(|factory| factory()),
            config: self.inner.config.clone(),
        };
        DesignSpaceExplorationAdapter::new(model, engine, parts)
    }
}

impl fmt::Debug for DesignSpaceExploration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DesignSpaceExploration")
            .field(
                "rules",
                &self.inner.rules.iter().map(TransformationRule::name).collect::<Vec<_>>(),
            )
            .field("global_constraints", &self.inner.global_constraints.len())
            .field("objectives", &self.inner.objectives)
            .field("has_strategy", &self.inner.strategy.is_some())
            .field("config", &self.inner.config)
            .finish()
    }
}

/// Builder for [`DesignSpaceExploration`].
#[derive(Default)]
pub struct DesignSpaceExplorationBuilder {
    rules: Vec<TransformationRule>,
    global_constraints: Vec<Query>,
    objectives: Vec<Arc<dyn Objective>>,
    strategy: Option<Arc<StrategyFactory>>,
    config: ExplorationConfig,
}

impl DesignSpaceExplorationBuilder {
    /// Add a rule. Rule names must be unique.
    pub fn transformation(mut self, rule: TransformationRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Add several rules, keeping their order.
    pub fn transformations(mut self, rules: impl IntoIterator<Item = TransformationRule>) -> Self {
        self.rules.extend(rules);
        self
    }

    /// A query that must have no match in a valid state.
    pub fn global_constraint(mut self, query: Query) -> Self {
        self.global_constraints.push(query);
        self
    }

    /// Objectives are evaluated in the order they are added.
    pub fn objective(mut self, objective: impl Objective + 'static) -> Self {
        self.objectives.push(Arc::new(objective));
        self
    }

    /// Strategy cloned into every adapter.
    pub fn strategy<S>(mut self, strategy: S) -> Self
    where
        S: Strategy + Clone + Sync + 'static,
    {
        self.strategy = Some(Arc::new(move || Box::new(strategy.clone()) as Box<dyn Strategy>));
        self
    }

    /// Replace the default configuration.
    pub fn config(mut self, config: ExplorationConfig) -> Self {
        self.config = config;
        self
    }

    /// Freeze the description.
    ///
    /// Fails with [`DseError::DuplicateRule`] if two rules share a name.
    pub fn build(self) -> DseResult<DesignSpaceExploration> {
        let mut names = HashSet::with_capacity(self.rules.len());
        for rule in &self.rules {
            if !names.insert(rule.name()) {
                return Err(DseError::DuplicateRule {
                    name: rule.name().to_string(),
                });
            }
        }
        debug!(
            rules = self.rules.len(),
            global_constraints = self.global_constraints.len(),
            objectives = self.objectives.len(),
            "exploration_built"
        );
        Ok(DesignSpaceExploration {
            inner: Arc::new(ExplorationInner {
                rules: self.rules,
                global_constraints: self.global_constraints,
                objectives: self.objectives,
                strategy: self.strategy,
                config: self.config,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use dse_store::{ModelStore, RecomputingQueryEngine, Symbol};

    use super::*;
    use crate::action::{Action, PutLiteral};
    use crate::strategy::DepthFirstStrategy;

    fn mark_rule(name: &str, person: &Symbol<bool>) -> TransformationRule {
        let action = Action::builder()
            .parameter("x")
            .literal(PutLiteral::remove(person, ["x"]))
            .build()
            .unwrap();
        TransformationRule::new(name, Query::relation("person", person), action).unwrap()
    }

    #[test]
    fn test_duplicate_rule_rejected() {
        let person = Symbol::<bool>::new("Person", 1, false);
        let error = DesignSpaceExploration::builder()
            .transformation(mark_rule("mark", &person))
            .transformation(mark_rule("mark", &person))
            .build()
            .unwrap_err();
        assert!(matches!(error, DseError::DuplicateRule { ref name } if name == "mark"));
        assert!(error.is_configuration());
    }

    #[test]
    fn test_adapters_get_their_own_strategy() {
        let person = Symbol::<bool>::new("Person", 1, false);
        let store = ModelStore::builder().symbol(person.clone()).build().unwrap();
        let exploration = DesignSpaceExploration::builder()
            .transformation(mark_rule("mark", &person))
            .strategy(DepthFirstStrategy::new().with_depth_limit(1))
            .config(ExplorationConfig::seeded(3))
            .build()
            .unwrap();

        for _ in 0..2 {
            let mut adapter = exploration
                .create_adapter(store.create_model(), RecomputingQueryEngine::new())
                .unwrap();
            assert_eq!(adapter.config().seed, 3);
            // No hard objective, so the root already is a solution.
            assert_eq!(adapter.explore().unwrap(), vec![store.initial_version()]);
        }
    }

    #[test]
    fn test_missing_strategy() {
        let store = ModelStore::builder().build().unwrap();
        let exploration = DesignSpaceExploration::builder().build().unwrap();
        let mut adapter = exploration
            .create_adapter(store.create_model(), RecomputingQueryEngine::new())
            .unwrap();
        assert!(matches!(adapter.explore(), Err(DseError::MissingStrategy)));
    }
}
