//! The search controller.
//!
//! A [`DesignSpaceExplorationAdapter`] owns one model and its query engine and
//! tracks the search state a [`Strategy`] needs: the trajectory from the root
//! to the current version, which activations were already fired from each
//! visited version, the solutions found so far and a seedable random source.
//!
//! ## Bookkeeping
//!
//! ```text
//! untraversed[v] ∪ traversed[v] = activations of v at first visit
//! untraversed[v] ∩ traversed[v] = ∅
//! trajectory = [root, .., model.state()]
//! ```
//!
//! Version ids are allocated by the store in commit order, so "already
//! traversed" means "this exact version id was registered before", not
//! "an isomorphic model was seen before".

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dse_store::{Interpretation, Model, Query, QueryEngine, ResultSetId, Tuple, Version};
use indexmap::IndexSet;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, trace};

use crate::action::allocate_node;
use crate::config::ExplorationConfig;
use crate::error::{DseError, DseResult};
use crate::objective::{Fitness, Objective, ObjectiveComparatorHelper, ObjectiveContext};
use crate::rule::{Activation, PreparedRule, TransformationRule};
use crate::strategy::Strategy;
use crate::visualizer::ModelVisualizerAdapter;

/// Lifecycle of an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExplorationPhase {
    /// Created, root not committed yet.
    Fresh,
    /// Root committed; a strategy may drive the search.
    Exploring,
    /// The strategy returned or failed.
    Terminated,
}

/// Everything an adapter is built from.
pub(crate) struct AdapterParts<'a> {
    pub(crate) rules: &'a [TransformationRule],
    pub(crate) global_constraints: &'a [Query],
    pub(crate) objectives: Vec<Arc<dyn Objective>>,
    pub(crate) strategy: Option<Box<dyn Strategy>>,
    pub(crate) config: ExplorationConfig,
}

/// Drives one model through the design space.
pub struct DesignSpaceExplorationAdapter {
    model: Model,
    engine: Box<dyn QueryEngine>,
    rules: Vec<PreparedRule>,
    rule_index: HashMap<Arc<str>, usize>,
    global_constraints: Vec<ResultSetId>,
    objectives: Vec<Arc<dyn Objective>>,
    comparator: ObjectiveComparatorHelper,
    size: Interpretation<u32>,
    trajectory: Vec<Version>,
    untraversed: HashMap<Version, IndexSet<Activation>>,
    traversed: HashMap<Version, IndexSet<Activation>>,
    solutions: IndexSet<Version>,
    fitness_cache: HashMap<Version, Fitness>,
    rng: ChaCha8Rng,
    is_new_state: bool,
    phase: ExplorationPhase,
    visualizer: Option<Box<dyn ModelVisualizerAdapter>>,
    strategy: Option<Box<dyn Strategy>>,
    config: ExplorationConfig,
}

impl DesignSpaceExplorationAdapter {
    pub(crate) fn new(
        model: Model,
        mut engine: Box<dyn QueryEngine>,
        parts: AdapterParts<'_>,
    ) -> DseResult<Self> {
        let mut rules = Vec::with_capacity(parts.rules.len());
        let mut rule_index = HashMap::with_capacity(parts.rules.len());
        for rule in parts.rules {
            let name: Arc<str> = Arc::from(rule.name());
            if rule_index.insert(name, rules.len()).is_some() {
                return Err(DseError::DuplicateRule {
                    name: rule.name().to_string(),
                });
            }
            rules.push(rule.prepare(&model, engine.as_mut())?);
        }
        let global_constraints = parts
            .global_constraints
            .iter()
            .map(|query| engine.result_set(&model, query))
            .collect::<Result<Vec<_>, _>>()?;
        let size = model.interpretation(model.store().node_count_symbol())?;
        let comparator = ObjectiveComparatorHelper::new(&parts.objectives);

        debug!(
            rules = rules.len(),
            global_constraints = global_constraints.len(),
            objectives = parts.objectives.len(),
            seed = parts.config.seed,
            "exploration_adapter_created"
        );

        Ok(Self {
            model,
            engine,
            rules,
            rule_index,
            global_constraints,
            objectives: parts.objectives,
            comparator,
            size,
            trajectory: Vec::new(),
            untraversed: HashMap::new(),
            traversed: HashMap::new(),
            solutions: IndexSet::new(),
            fitness_cache: HashMap::new(),
            rng: ChaCha8Rng::seed_from_u64(parts.config.seed),
            is_new_state: false,
            phase: ExplorationPhase::Fresh,
            visualizer: None,
            strategy: parts.strategy,
            config: parts.config,
        })
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Commit the current content as the trajectory root and register it.
    ///
    /// [`explore`](Self::explore) calls this itself; call it directly only to
    /// drive the adapter by hand.
    pub fn start(&mut self) -> DseResult<Version> {
        if self.phase != ExplorationPhase::Fresh {
            return Err(DseError::InvalidPhase {
                operation: "start",
                phase: self.phase,
            });
        }
        let root = self.model.commit()?;
        self.engine.flush_changes(&self.model)?;
        self.trajectory = vec![root];
        self.register_state(root)?;
        self.is_new_state = true;
        self.phase = ExplorationPhase::Exploring;
        info!(
            root = %root,
            activations = self.untraversed.get(&root).map_or(0, IndexSet::len),
            "exploration_start"
        );
        Ok(root)
    }

    /// Run the configured strategy and return the solutions it found.
    pub fn explore(&mut self) -> DseResult<Vec<Version>> {
        let mut strategy = self.strategy.take().ok_or(DseError::MissingStrategy)?;
        let outcome = self.explore_with(strategy.as_mut());
        self.strategy = Some(strategy);
        outcome
    }

    /// Run `strategy` instead of the configured one.
    ///
    /// Errors raised by the strategy, cancellation included, end the
    /// exploration and are returned as is.
    pub fn explore_with(&mut self, strategy: &mut dyn Strategy) -> DseResult<Vec<Version>> {
        self.start()?;
        let outcome = strategy
            .init_strategy(self)
            .and_then(|()| strategy.explore(self));
        self.phase = ExplorationPhase::Terminated;
        if let Err(error) = &outcome {
            info!(error = %error, "exploration_aborted");
        }
        outcome?;
        info!(
            solutions = self.solutions.len(),
            states = self.untraversed.len(),
            "exploration_complete"
        );
        Ok(self.solutions.iter().copied().collect())
    }

    pub fn phase(&self) -> ExplorationPhase {
        self.phase
    }

    fn ensure_exploring(&self, operation: &'static str) -> DseResult<()> {
        if self.phase == ExplorationPhase::Exploring {
            Ok(())
        } else {
            Err(DseError::InvalidPhase {
                operation,
                phase: self.phase,
            })
        }
    }

    // ========================================================================
    // Moves
    // ========================================================================

    /// Fire `activation` from the current version.
    ///
    /// Returns `Ok(false)` without side effects if `activation` is neither a
    /// stored nor a live untraversed activation of the current version, e.g.
    /// one captured before a backtrack.
    ///
    /// If a guard literal rejects the activation, the adapter goes further
    /// than [`BoundAction::fire`](crate::BoundAction::fire), which keeps the
    /// writes made before the guard: it restores the current version, which
    /// also drops any uncommitted writes made through
    /// [`model_mut`](Self::model_mut), marks the activation traversed and
    /// returns `Ok(false)`.
    pub fn fire_activation(&mut self, activation: &Activation) -> DseResult<bool> {
        self.ensure_exploring("fire_activation")?;
        let from = self.model.state();
        let Some(rule) = self.rule_index.get(activation.rule_name()).copied() else {
            debug!(activation = %activation, state = %from, "unknown_rule_rejected");
            return Ok(false);
        };
        let stored = self
            .untraversed
            .get(&from)
            .is_some_and(|untraversed| untraversed.contains(activation));
        if !stored && !self.untraversed_activations()?.contains(activation) {
            debug!(activation = %activation, state = %from, "stale_activation_rejected");
            return Ok(false);
        }
        self.fire_untraversed(rule, activation)
    }

    /// Fire a uniformly chosen activation that was not yet fired from here.
    ///
    /// Returns `Ok(false)` if there is none, or if a guard rejected the chosen one.
    pub fn fire_random_activation(&mut self) -> DseResult<bool> {
        self.ensure_exploring("fire_random_activation")?;
        let candidates = self.untraversed_activations()?;
        if candidates.is_empty() {
            return Ok(false);
        }
        let index = self.rng.random_range(0..candidates.len());
        let Some(activation) = candidates.get_index(index) else {
            return Ok(false);
        };
        match self.rule_index.get(activation.rule_name()).copied() {
            Some(rule) => self.fire_untraversed(rule, activation),
            None => Ok(false),
        }
    }

    /// Fire an activation known to be untraversed from the current version.
    fn fire_untraversed(&mut self, rule: usize, activation: &Activation) -> DseResult<bool> {
        let from = self.model.state();
        let fired = self.rules[rule].fire_activation(
            &mut self.model,
            self.engine.as_mut(),
            activation.tuple(),
        )?;
        self.mark_traversed(from, activation);

        if !fired {
            if self.model.has_uncommitted_changes() {
                self.model.restore(from)?;
                self.engine.flush_changes(&self.model)?;
            }
            trace!(activation = %activation, "activation_guard_failed");
            return Ok(false);
        }

        let to = self.model.commit()?;
        self.trajectory.push(to);
        self.is_new_state = !self.untraversed.contains_key(&to);
        if self.is_new_state {
            self.register_state(to)?;
        }
        debug!(
            from = %from,
            to = %to,
            activation = %activation,
            new_state = self.is_new_state,
            depth = self.depth(),
            "activation_fired"
        );

        if self.visualizer.is_some() {
            let fitness = if self.is_new_state {
                Some(self.fitness()?)
            } else {
                None
            };
            if let Some(visualizer) = self.visualizer.as_mut() {
                if let Some(fitness) = &fitness {
                    visualizer.add_state(to, fitness);
                }
                visualizer.add_transition(from, to, activation.rule_name(), activation.tuple());
            }
        }
        Ok(true)
    }

    /// Step back to the parent version. Returns `Ok(false)` at the root.
    pub fn backtrack(&mut self) -> DseResult<bool> {
        self.backtrack_with_reason("")
    }

    /// Like [`backtrack`](Self::backtrack), labelling the visualized transition with `reason`.
    pub fn backtrack_with_reason(&mut self, reason: &str) -> DseResult<bool> {
        self.ensure_exploring("backtrack")?;
        let &[.., parent, current] = self.trajectory.as_slice() else {
            return Ok(false);
        };
        self.model.restore(parent)?;
        self.engine.flush_changes(&self.model)?;
        self.trajectory.pop();
        trace!(from = %current, to = %parent, reason, "backtrack");
        if let Some(visualizer) = self.visualizer.as_mut() {
            visualizer.add_transition(
                current,
                parent,
                &format!("backtrack({reason})"),
                &Tuple::of0(),
            );
        }
        Ok(true)
    }

    /// Jump to the tail of a previously recorded trajectory.
    ///
    /// A tail this adapter never visited, e.g. one committed by another model
    /// of the same store, is registered like a newly reached state.
    pub fn restore_trajectory(&mut self, trajectory: Vec<Version>) -> DseResult<()> {
        self.ensure_exploring("restore_trajectory")?;
        let Some(&tail) = trajectory.last() else {
            return Err(DseError::EmptyTrajectory);
        };
        self.model.restore(tail)?;
        self.engine.flush_changes(&self.model)?;
        let newly_registered = !self.untraversed.contains_key(&tail);
        if newly_registered {
            self.register_state(tail)?;
        }
        trace!(to = %tail, depth = trajectory.len() - 1, newly_registered, "trajectory_restored");
        self.trajectory = trajectory;
        Ok(())
    }

    // ========================================================================
    // Evaluation
    // ========================================================================

    /// Whether every global constraint has no match.
    pub fn check_global_constraints(&mut self) -> DseResult<bool> {
        self.engine.flush_changes(&self.model)?;
        for &constraint in &self.global_constraints {
            if self.engine.size(constraint)? > 0 {
                trace!(state = %self.model.state(), "global_constraint_violated");
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Evaluate every objective on the current content.
    pub fn calculate_fitness(&mut self) -> DseResult<Fitness> {
        self.engine.flush_changes(&self.model)?;
        let depth = self.depth();
        let mut context = ObjectiveContext::new(&self.model, self.engine.as_mut(), depth);
        let mut fitness = Fitness::new();
        let mut satisfied = true;
        for objective in &self.objectives {
            let value = objective.fitness(&mut context)?;
            fitness.insert(objective.name(), value);
            if objective.is_hard_objective() && !objective.satisfies_hard_objective(value) {
                satisfied = false;
            }
        }
        fitness.set_satisfies_hard_objectives(satisfied);
        Ok(fitness)
    }

    /// Fitness of the current state, memoized per committed version.
    pub fn fitness(&mut self) -> DseResult<Fitness> {
        if !self.config.cache_fitness || self.model.has_uncommitted_changes() {
            return self.calculate_fitness();
        }
        let state = self.model.state();
        if let Some(fitness) = self.fitness_cache.get(&state) {
            return Ok(fitness.clone());
        }
        let fitness = self.calculate_fitness()?;
        self.fitness_cache.insert(state, fitness.clone());
        Ok(fitness)
    }

    /// Record the current version as a solution. Returns false if it already was one.
    pub fn new_solution(&mut self) -> bool {
        let state = self.model.state();
        if !self.solutions.insert(state) {
            return false;
        }
        info!(state = %state, depth = self.depth(), total = self.solutions.len(), "solution_found");
        if let Some(visualizer) = self.visualizer.as_mut() {
            visualizer.add_solution(state);
        }
        true
    }

    /// Solutions in discovery order.
    pub fn solutions(&self) -> &IndexSet<Version> {
        &self.solutions
    }

    pub fn objective_comparator_helper(&self) -> &ObjectiveComparatorHelper {
        &self.comparator
    }

    // ========================================================================
    // Objects
    // ========================================================================

    /// Allocate a fresh node id.
    pub fn create_object(&mut self) -> DseResult<Tuple> {
        allocate_node(&mut self.model, &self.size)
    }

    /// Delete a node. Deletion is a tombstone: ids are never reused and the
    /// node counter is left unchanged.
    pub fn delete_object(&mut self, tuple: &Tuple) -> DseResult<Tuple> {
        if tuple.arity() != 1 {
            return Err(DseError::ArityMismatch {
                name: "delete_object".to_string(),
                expected: 1,
                actual: tuple.arity(),
            });
        }
        Ok(tuple.clone())
    }

    /// Number of node ids allocated so far.
    pub fn model_size(&self) -> DseResult<u32> {
        Ok(self.model.get(&self.size, &Tuple::of0())?)
    }

    // ========================================================================
    // Search state
    // ========================================================================

    /// Whether the version reached by the last fire had been registered before.
    pub fn is_current_state_already_traversed(&self) -> bool {
        !self.is_new_state
    }

    /// Whether the current version also appears earlier on the trajectory,
    /// i.e. the path from the root runs through a cycle.
    pub fn is_current_in_trajectory(&self) -> bool {
        match self.trajectory.split_last() {
            Some((current, earlier)) => earlier.contains(current),
            None => false,
        }
    }

    /// Number of fires between the root and the current version.
    pub fn depth(&self) -> usize {
        self.trajectory.len().saturating_sub(1)
    }

    pub fn trajectory(&self) -> &[Version] {
        &self.trajectory
    }

    /// Every current activation of every rule, in rule order.
    pub fn all_activations(&mut self) -> DseResult<Vec<Activation>> {
        self.engine.flush_changes(&self.model)?;
        let mut activations = Vec::new();
        for rule in &self.rules {
            activations.extend(rule.all_activations(self.engine.as_ref())?);
        }
        Ok(activations)
    }

    /// Current activations not yet fired from the current version.
    ///
    /// The result is recomputed from the live matches and replaces the
    /// stored untraversed set of a registered, clean state.
    pub fn untraversed_activations(&mut self) -> DseResult<IndexSet<Activation>> {
        let state = self.model.state();
        let live: IndexSet<Activation> = self
            .all_activations()?
            .into_iter()
            .filter(|activation| {
                self.traversed
                    .get(&state)
                    .map_or(true, |traversed| !traversed.contains(activation))
            })
            .collect();
        if !self.model.has_uncommitted_changes() && self.untraversed.contains_key(&state) {
            self.untraversed.insert(state, live.clone());
        }
        Ok(live)
    }

    /// Stored untraversed activations of a visited version.
    pub fn untraversed_at(&self, version: Version) -> Option<&IndexSet<Activation>> {
        self.untraversed.get(&version)
    }

    /// Activations already fired from a visited version.
    pub fn traversed_at(&self, version: Version) -> Option<&IndexSet<Activation>> {
        self.traversed.get(&version)
    }

    /// Number of registered versions.
    pub fn visited_count(&self) -> usize {
        self.untraversed.len()
    }

    fn register_state(&mut self, version: Version) -> DseResult<()> {
        let activations: IndexSet<Activation> = self.all_activations()?.into_iter().collect();
        self.untraversed.insert(version, activations);
        self.traversed.insert(version, IndexSet::new());
        Ok(())
    }

    fn mark_traversed(&mut self, version: Version, activation: &Activation) {
        if let Some(untraversed) = self.untraversed.get_mut(&version) {
            untraversed.shift_remove(activation);
        }
        self.traversed
            .entry(version)
            .or_default()
            .insert(activation.clone());
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Reseed the random source.
    pub fn set_random_seed(&mut self, seed: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
    }

    /// Replace the random source.
    pub fn set_random(&mut self, rng: ChaCha8Rng) {
        self.rng = rng;
    }

    /// The random source, for strategies that make their own random choices.
    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    /// Add a rule after creation. Versions visited before see its activations
    /// the next time their untraversed activations are recomputed.
    pub fn add_transformation_rule(&mut self, rule: TransformationRule) -> DseResult<()> {
        let name: Arc<str> = Arc::from(rule.name());
        if self.rule_index.contains_key(&name) {
            return Err(DseError::DuplicateRule {
                name: rule.name().to_string(),
            });
        }
        let prepared = rule.prepare(&self.model, self.engine.as_mut())?;
        self.rule_index.insert(name, self.rules.len());
        self.rules.push(prepared);
        Ok(())
    }

    /// Names of the prepared rules, in registration order.
    pub fn rule_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.rules.iter().map(PreparedRule::name)
    }

    pub fn set_visualizer(&mut self, visualizer: impl ModelVisualizerAdapter + 'static) {
        self.visualizer = Some(Box::new(visualizer));
    }

    pub fn config(&self) -> &ExplorationConfig {
        &self.config
    }

    // ========================================================================
    // Model access
    // ========================================================================

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Mutable access for writes outside of rules. Call
    /// [`flush_changes`](Self::flush_changes) before reading activations.
    pub fn model_mut(&mut self) -> &mut Model {
        &mut self.model
    }

    pub fn query_engine(&self) -> &dyn QueryEngine {
        self.engine.as_ref()
    }

    /// Bring the query engine up to date with the model.
    pub fn flush_changes(&mut self) -> DseResult<()> {
        Ok(self.engine.flush_changes(&self.model)?)
    }

    /// Give back the model, ending the adapter's lifetime.
    pub fn into_model(self) -> Model {
        self.model
    }
}

impl fmt::Debug for DesignSpaceExplorationAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DesignSpaceExplorationAdapter")
            .field("phase", &self.phase)
            .field("state", &self.model.state())
            .field("trajectory", &self.trajectory)
            .field("solutions", &self.solutions)
            .finish()
    }
}
