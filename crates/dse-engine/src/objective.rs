//! Objectives, fitness values and dominance comparison.
//!
//! Every evaluated state gets a [`Fitness`]: one value per objective, in
//! configuration order, plus a flag telling whether every hard objective is
//! satisfied. Only hard objectives gate solutions; soft objectives only rank
//! states through [`ObjectiveComparatorHelper`].

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use dse_store::{Model, Query, QueryEngine};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::DseResult;

/// Whether lower or higher fitness values are better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveDirection {
    /// Lower is better.
    #[default]
    Minimize,
    /// Higher is better.
    Maximize,
}

impl ObjectiveDirection {
    /// Order two values so that `Greater` means `a` is better.
    pub fn compare(self, a: f64, b: f64) -> Ordering {
        match self {
            Self::Minimize => b.total_cmp(&a),
            Self::Maximize => a.total_cmp(&b),
        }
    }
}

/// What an objective may inspect while scoring a state.
pub struct ObjectiveContext<'a> {
    model: &'a Model,
    engine: &'a mut dyn QueryEngine,
    depth: usize,
}

impl<'a> ObjectiveContext<'a> {
    /// Create a context for the current state of `model`.
    pub fn new(model: &'a Model, engine: &'a mut dyn QueryEngine, depth: usize) -> Self {
        Self {
            model,
            engine,
            depth,
        }
    }

    /// The model being scored.
    pub fn model(&self) -> &Model {
        self.model
    }

    /// Trajectory depth of the current state.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Number of current matches of `query`, registering it on first use.
    pub fn result_size(&mut self, query: &Query) -> DseResult<usize> {
        let id = self.engine.result_set(self.model, query)?;
        Ok(self.engine.size(id)?)
    }
}

/// Pluggable per-state score.
pub trait Objective: fmt::Debug + Send + Sync {
    /// Name used as the key in [`Fitness`].
    fn name(&self) -> &str;

    /// Which values are better.
    fn direction(&self) -> ObjectiveDirection {
        ObjectiveDirection::Minimize
    }

    /// Hard objectives must be satisfied for a state to be a solution.
    fn is_hard_objective(&self) -> bool {
        false
    }

    /// Whether `fitness` satisfies this objective. Only consulted for hard objectives.
    fn satisfies_hard_objective(&self, _fitness: f64) -> bool {
        true
    }

    /// Score the current state.
    fn fitness(&self, context: &mut ObjectiveContext<'_>) -> DseResult<f64>;
}

/// Objective values of one state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Fitness {
    values: IndexMap<String, f64>,
    satisfies_hard_objectives: bool,
}

impl Fitness {
    /// Create an empty fitness.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the value of an objective.
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), value);
    }

    /// Value of the objective named `name`.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// All values in objective order.
    pub fn values(&self) -> &IndexMap<String, f64> {
        &self.values
    }

    /// Whether every hard objective holds.
    pub fn satisfies_hard_objectives(&self) -> bool {
        self.satisfies_hard_objectives
    }

    pub fn set_satisfies_hard_objectives(&mut self, satisfied: bool) {
        self.satisfies_hard_objectives = satisfied;
    }
}

impl fmt::Display for Fitness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        write!(f, "}}")?;
        if self.satisfies_hard_objectives {
            write!(f, " hard-ok")?;
        }
        Ok(())
    }
}

/// Compares fitness values by Pareto dominance over the configured objectives.
#[derive(Debug, Clone, Default)]
pub struct ObjectiveComparatorHelper {
    objectives: Vec<(String, ObjectiveDirection)>,
}

impl ObjectiveComparatorHelper {
    /// Build a comparator over `objectives`.
    pub fn new(objectives: &[Arc<dyn Objective>]) -> Self {
        Self {
            objectives: objectives
                .iter()
                .map(|objective| (objective.name().to_string(), objective.direction()))
                .collect(),
        }
    }

    /// `Greater` if `a` dominates `b`, `Less` if `b` dominates `a`, `Equal` otherwise.
    ///
    /// Objectives missing from either fitness are ignored.
    pub fn compare(&self, a: &Fitness, b: &Fitness) -> Ordering {
        let mut a_better = false;
        let mut b_better = false;
        for (name, direction) in &self.objectives {
            let (Some(left), Some(right)) = (a.get(name), b.get(name)) else {
                continue;
            };
            match direction.compare(left, right) {
                Ordering::Greater => a_better = true,
                Ordering::Less => b_better = true,
                Ordering::Equal => {}
            }
            if a_better && b_better {
                break;
            }
        }
        match (a_better, b_better) {
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            _ => Ordering::Equal,
        }
    }

    /// Whether `a` is strictly better than `b` in the dominance order.
    pub fn dominates(&self, a: &Fitness, b: &Fitness) -> bool {
        self.compare(a, b) == Ordering::Greater
    }

    /// Indices of the fitnesses no other entry dominates, in input order.
    pub fn pareto_front(&self, fitnesses: &[Fitness]) -> Vec<usize> {
        (0..fitnesses.len())
            .filter(|&i| {
                !fitnesses
                    .iter()
                    .any(|other| self.dominates(other, &fitnesses[i]))
            })
            .collect()
    }
}

/// Weighted number of matches of a query. Lower is better.
///
/// As a hard objective it is satisfied only when the query has no match.
#[derive(Debug, Clone)]
pub struct QueryObjective {
    name: String,
    query: Query,
    weight: f64,
    hard: bool,
}

impl QueryObjective {
    /// Count matches of `query` with weight 1.
    pub fn new(name: impl Into<String>, query: Query) -> Self {
        Self {
            name: name.into(),
            query,
            weight: 1.0,
            hard: false,
        }
    }

    /// Multiply the match count by `weight`.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Require the query to have no match in a solution.
    pub fn hard(mut self) -> Self {
        self.hard = true;
        self
    }
}

impl Objective for QueryObjective {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_hard_objective(&self) -> bool {
        self.hard
    }

    fn satisfies_hard_objective(&self, fitness: f64) -> bool {
        fitness == 0.0
    }

    fn fitness(&self, context: &mut ObjectiveContext<'_>) -> DseResult<f64> {
        Ok(context.result_size(&self.query)? as f64 * self.weight)
    }
}

/// Trajectory depth, optionally bounded.
#[derive(Debug, Clone)]
pub struct DepthObjective {
    name: String,
    direction: ObjectiveDirection,
    min_depth: Option<usize>,
    max_depth: Option<usize>,
}

impl DepthObjective {
    /// Prefer shallow states, without bounds.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: ObjectiveDirection::Minimize,
            min_depth: None,
            max_depth: None,
        }
    }

    pub fn with_direction(mut self, direction: ObjectiveDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Solutions must be at least `depth` steps from the root.
    pub fn with_min_depth(mut self, depth: usize) -> Self {
        self.min_depth = Some(depth);
        self
    }

    /// Solutions must be at most `depth` steps from the root.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }
}

impl Objective for DepthObjective {
    fn name(&self) -> &str {
        &self.name
    }

    fn direction(&self) -> ObjectiveDirection {
        self.direction
    }

    fn is_hard_objective(&self) -> bool {
        self.min_depth.is_some() || self.max_depth.is_some()
    }

    fn satisfies_hard_objective(&self, fitness: f64) -> bool {
        let above = self.min_depth.map_or(true, |min| fitness >= min as f64);
        let below = self.max_depth.map_or(true, |max| fitness <= max as f64);
        above && below
    }

    fn fitness(&self, context: &mut ObjectiveContext<'_>) -> DseResult<f64> {
        Ok(context.depth() as f64)
    }
}

/// Hard objective every state satisfies: makes every valid state a solution.
#[derive(Debug, Clone)]
pub struct AlwaysSatisfiedObjective {
    name: String,
}

impl AlwaysSatisfiedObjective {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for AlwaysSatisfiedObjective {
    fn default() -> Self {
        Self::new("always_satisfied")
    }
}

impl Objective for AlwaysSatisfiedObjective {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_hard_objective(&self) -> bool {
        true
    }

    fn fitness(&self, _context: &mut ObjectiveContext<'_>) -> DseResult<f64> {
        Ok(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fitness(values: &[(&str, f64)]) -> Fitness {
        let mut fitness = Fitness::new();
        for (name, value) in values {
            fitness.insert(*name, *value);
        }
        fitness
    }

    fn helper() -> ObjectiveComparatorHelper {
        let objectives: Vec<Arc<dyn Objective>> = vec![
            Arc::new(DepthObjective::new("cost")),
            Arc::new(DepthObjective::new("gain").with_direction(ObjectiveDirection::Maximize)),
        ];
        ObjectiveComparatorHelper::new(&objectives)
    }

    #[test]
    fn test_dominance() {
        let helper = helper();
        let good = fitness(&[("cost", 1.0), ("gain", 5.0)]);
        let bad = fitness(&[("cost", 2.0), ("gain", 5.0)]);
        let traded = fitness(&[("cost", 0.0), ("gain", 1.0)]);

        assert_eq!(helper.compare(&good, &bad), Ordering::Greater);
        assert_eq!(helper.compare(&bad, &good), Ordering::Less);
        assert_eq!(helper.compare(&good, &traded), Ordering::Equal);
        assert_eq!(helper.compare(&good, &good), Ordering::Equal);
        assert!(helper.dominates(&good, &bad));
    }

    #[test]
    fn test_pareto_front() {
        let helper = helper();
        let front = helper.pareto_front(&[
            fitness(&[("cost", 2.0), ("gain", 5.0)]),
            fitness(&[("cost", 1.0), ("gain", 5.0)]),
            fitness(&[("cost", 0.0), ("gain", 1.0)]),
        ]);
        assert_eq!(front, vec![1, 2]);
    }

    #[test]
    fn test_depth_bounds() {
        let unbounded = DepthObjective::new("depth");
        assert!(!unbounded.is_hard_objective());

        let bounded = DepthObjective::new("depth").with_min_depth(1).with_max_depth(3);
        assert!(bounded.is_hard_objective());
        assert!(!bounded.satisfies_hard_objective(0.0));
        assert!(bounded.satisfies_hard_objective(2.0));
        assert!(!bounded.satisfies_hard_objective(4.0));
    }

    #[test]
    fn test_fitness_serde() {
        let mut value = fitness(&[("b", 2.0), ("a", 1.0)]);
        value.set_satisfies_hard_objectives(true);
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(
            json,
            r#"{"values":{"b":2.0,"a":1.0},"satisfies_hard_objectives":true}"#
        );
        assert_eq!(value.to_string(), "{b=2, a=1} hard-ok");
    }
}
